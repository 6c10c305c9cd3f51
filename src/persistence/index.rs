//! In-memory player index with a flat-file backing store.
//!
//! The file is read once at startup and is authoritative only until then;
//! afterwards the table in memory is the source of truth and the file is
//! rewritten on flush. Each line is `id name level flags last [clan]`, and a
//! lone `~` ends the file.

use crate::error::{PfileError, PfileResult};
use crate::persistence::tag::{decode_flag_word, encode_flag_word};
use crate::telemetry::logging::format_date;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Write;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

const SECS_PER_DAY: i64 = 86_400;

bitflags::bitflags! {
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct IndexFlags: u32 {
        const DELETED    = 0x01;
        const NODELETE   = 0x02;
        const SELFDELETE = 0x04;
        const NOWIZLIST  = 0x08;
        const INCLAN     = 0x10;
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    pub id: i64,
    pub name: String,
    pub level: i32,
    pub flags: IndexFlags,
    pub last: i64,
    pub clan: i32,
}

impl IndexEntry {
    pub fn new(id: i64, name: &str) -> Self {
        Self {
            id,
            name: name.to_lowercase(),
            level: 0,
            flags: IndexFlags::empty(),
            last: 0,
            clan: 0,
        }
    }

    fn parse(line: &str) -> Option<Self> {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() != 5 && fields.len() != 6 {
            return None;
        }
        let clan = match fields.get(5) {
            Some(clan) => clan.parse().ok()?,
            None => 0,
        };
        Some(Self {
            id: fields[0].parse().ok()?,
            name: fields[1].to_lowercase(),
            level: fields[2].parse().ok()?,
            flags: IndexFlags::from_bits_truncate(decode_flag_word(fields[3])?),
            last: fields[4].parse().ok()?,
            clan,
        })
    }

    fn format_into(&self, out: &mut String) {
        let _ = writeln!(
            out,
            "{} {} {} {} {} {}",
            self.id,
            self.name,
            self.level,
            encode_flag_word(self.flags.bits()),
            self.last,
            self.clan
        );
    }
}

/// Inactivity limit for characters up to `level`. `days` of 0 never purges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanCriterion {
    pub level: i32,
    pub days: i64,
}

pub fn default_clean_criteria() -> Vec<CleanCriterion> {
    [(0, 0), (1, 4), (4, 7), (10, 30), (30, 60), (33, 90)]
        .into_iter()
        .map(|(level, days)| CleanCriterion { level, days })
        .collect()
}

#[derive(Debug)]
pub struct PlayerIndex {
    path: PathBuf,
    entries: BTreeMap<String, IndexEntry>,
    top_id: i64,
    dirty: bool,
}

impl PlayerIndex {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            entries: BTreeMap::new(),
            top_id: 0,
            dirty: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Replaces the table with the contents of the index file. A missing file
    /// gives an empty index.
    pub fn rebuild_from_index_file(&mut self) -> PfileResult<usize> {
        self.teardown();
        let data = match fs::read_to_string(&self.path) {
            Ok(data) => data,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(path = %self.path.display(), "no player index, starting empty");
                return Ok(0);
            }
            Err(err) => return Err(PfileError::io("read", &self.path, err)),
        };

        for (line_no, line) in data.lines().enumerate() {
            let line = line.trim();
            if line == "~" {
                break;
            }
            if line.is_empty() {
                continue;
            }
            let Some(entry) = IndexEntry::parse(line) else {
                warn!(line = line_no + 1, "skipping malformed index line {:?}", line);
                continue;
            };
            if self.entries.contains_key(&entry.name) {
                warn!(player = %entry.name, "duplicate index entry ignored");
                continue;
            }
            self.top_id = self.top_id.max(entry.id);
            self.entries.insert(entry.name.clone(), entry);
        }
        self.dirty = false;
        info!(players = self.entries.len(), top_id = self.top_id, "player index loaded");
        Ok(self.entries.len())
    }

    pub fn lookup_by_name(&self, name: &str) -> Option<&IndexEntry> {
        self.entries.get(&name.to_lowercase())
    }

    pub fn lookup_by_id(&self, id: i64) -> Option<&str> {
        self.entries
            .values()
            .find(|entry| entry.id == id)
            .map(|entry| entry.name.as_str())
    }

    /// Adds or replaces the row for `entry.name`. Ids never move: a row
    /// keeps the id it was created with, and no two names share one.
    pub fn insert_or_update(&mut self, mut entry: IndexEntry) -> PfileResult<()> {
        entry.name = entry.name.to_lowercase();
        if let Some(current) = self.entries.get(&entry.name) {
            if current == &entry {
                return Ok(());
            }
            if current.id != entry.id {
                return Err(self.inconsistent(
                    &entry.name,
                    format!("id change from {} to {} refused", current.id, entry.id),
                ));
            }
        } else if let Some(owner) = self.lookup_by_id(entry.id) {
            let detail = format!("id {} already belongs to {}", entry.id, owner);
            return Err(self.inconsistent(&entry.name, detail));
        }
        self.top_id = self.top_id.max(entry.id);
        self.entries.insert(entry.name.clone(), entry);
        self.dirty = true;
        Ok(())
    }

    fn inconsistent(&self, name: &str, detail: String) -> PfileError {
        warn!(player = %name, "{}", detail);
        PfileError::IndexInconsistency {
            name: name.to_string(),
            detail,
        }
    }

    /// Id for `name`, adding a fresh row with the next id if it has none.
    pub fn create_entry(&mut self, name: &str) -> i64 {
        if let Some(entry) = self.lookup_by_name(name) {
            return entry.id;
        }
        self.top_id += 1;
        let entry = IndexEntry::new(self.top_id, name);
        let id = entry.id;
        self.entries.insert(entry.name.clone(), entry);
        self.dirty = true;
        id
    }

    pub fn remove(&mut self, name: &str) -> Option<IndexEntry> {
        let removed = self.entries.remove(&name.to_lowercase());
        if removed.is_some() {
            self.dirty = true;
        }
        removed
    }

    /// Rewrites the index file when there are unsaved changes or `force` is
    /// set. Returns whether the file was written. The new contents go to
    /// `<index>.tmp` and are renamed over the old file.
    pub fn flush_to_index_file(&mut self, force: bool) -> PfileResult<bool> {
        if !self.dirty && !force {
            return Ok(false);
        }
        let mut out = String::new();
        for entry in self.entries.values() {
            entry.format_into(&mut out);
        }
        out.push_str("~\n");
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .map_err(|err| PfileError::io("create directory", parent, err))?;
        }
        let temp_path = self.path.with_extension("tmp");
        fs::write(&temp_path, out).map_err(|err| PfileError::io("write", &temp_path, err))?;
        if let Err(err) = fs::rename(&temp_path, &self.path) {
            let _ = fs::remove_file(&temp_path);
            return Err(PfileError::io("rename", &self.path, err));
        }
        self.dirty = false;
        Ok(true)
    }

    pub fn teardown(&mut self) {
        self.entries.clear();
        self.top_id = 0;
        self.dirty = false;
    }

    /// Drops deleted entries and entries idle past their level band's limit.
    /// Returns the removed entries so their files can be unlinked.
    pub fn clean(&mut self, criteria: &[CleanCriterion], now: i64) -> Vec<IndexEntry> {
        let doomed: Vec<String> = self
            .entries
            .values()
            .filter(|entry| should_purge(entry, criteria, now))
            .map(|entry| entry.name.clone())
            .collect();
        let mut removed = Vec::with_capacity(doomed.len());
        for name in doomed {
            if let Some(entry) = self.remove(&name) {
                info!(
                    "PCLEAN: {} Lev: {} Last: {}",
                    entry.name,
                    entry.level,
                    format_date(entry.last)
                );
                removed.push(entry);
            }
        }
        removed
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn top_id(&self) -> i64 {
        self.top_id
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &IndexEntry> {
        self.entries.values()
    }
}

fn should_purge(entry: &IndexEntry, criteria: &[CleanCriterion], now: i64) -> bool {
    if entry.flags.contains(IndexFlags::NODELETE) {
        return false;
    }
    if entry.flags.contains(IndexFlags::DELETED) {
        return true;
    }
    let Some(band) = criteria.iter().find(|band| entry.level <= band.level) else {
        return false;
    };
    band.days > 0 && now.saturating_sub(entry.last) > band.days.saturating_mul(SECS_PER_DAY)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn index_in(dir: &TempDir) -> PlayerIndex {
        PlayerIndex::new(dir.path().join("plrfiles").join("index"))
    }

    #[test]
    fn missing_file_yields_empty_index() {
        let dir = TempDir::new().expect("tempdir");
        let mut index = index_in(&dir);
        assert_eq!(index.rebuild_from_index_file().expect("rebuild"), 0);
        assert!(index.is_empty());
    }

    #[test]
    fn flush_and_rebuild() {
        let dir = TempDir::new().expect("tempdir");
        let mut index = index_in(&dir);
        let id = index.create_entry("Aldric");
        assert_eq!(id, 1);
        let mut entry = index.lookup_by_name("ALDRIC").expect("entry").clone();
        entry.level = 12;
        entry.flags = IndexFlags::NODELETE | IndexFlags::INCLAN;
        entry.clan = 4;
        index.insert_or_update(entry.clone()).expect("update");
        index.create_entry("bryn");
        assert!(index.flush_to_index_file(false).expect("flush"));
        assert!(!index.flush_to_index_file(false).expect("clean flush"));

        let text = fs::read_to_string(index.path()).expect("read");
        assert_eq!(text, "1 aldric 12 be 0 4\n2 bryn 0 0 0 0\n~\n");

        let mut reloaded = index_in(&dir);
        assert_eq!(reloaded.rebuild_from_index_file().expect("rebuild"), 2);
        assert_eq!(reloaded.lookup_by_name("aldric"), Some(&entry));
        assert_eq!(reloaded.lookup_by_id(2), Some("bryn"));
        assert_eq!(reloaded.top_id(), 2);
        assert_eq!(reloaded.create_entry("cora"), 3);
    }

    #[test]
    fn old_lines_without_clan_and_bad_lines() {
        let dir = TempDir::new().expect("tempdir");
        let mut index = index_in(&dir);
        fs::create_dir_all(index.path().parent().expect("parent")).expect("mkdir");
        fs::write(
            index.path(),
            "7 Aldric 3 a 1000\nnot an entry\n9 bryn 1 0 2000 2\n~\n11 ghost 1 0 0\n",
        )
        .expect("write");
        assert_eq!(index.rebuild_from_index_file().expect("rebuild"), 2);
        let aldric = index.lookup_by_name("aldric").expect("aldric");
        assert_eq!(aldric.clan, 0);
        assert_eq!(aldric.flags, IndexFlags::DELETED);
        assert!(index.lookup_by_name("ghost").is_none());
        assert_eq!(index.top_id(), 9);
        assert!(!index.is_dirty());
    }

    #[test]
    fn unchanged_update_keeps_index_clean() {
        let dir = TempDir::new().expect("tempdir");
        let mut index = index_in(&dir);
        index.create_entry("aldric");
        index.flush_to_index_file(false).expect("flush");
        let entry = index.lookup_by_name("aldric").expect("entry").clone();
        index.insert_or_update(entry).expect("update");
        assert!(!index.is_dirty());
    }

    #[test]
    fn clean_honours_bands_and_nodelete() {
        let dir = TempDir::new().expect("tempdir");
        let mut index = index_in(&dir);
        let now = 100 * SECS_PER_DAY;
        let mut add = |name: &str, level: i32, idle_days: i64, flags: IndexFlags| {
            let mut entry = IndexEntry::new(index.top_id() + 1, name);
            entry.level = level;
            entry.last = now - idle_days * SECS_PER_DAY;
            entry.flags = flags;
            index.insert_or_update(entry).expect("insert");
        };
        add("fresh", 1, 2, IndexFlags::empty());
        add("stale", 1, 5, IndexFlags::empty());
        add("newbie", 0, 99, IndexFlags::empty());
        add("veteran", 20, 45, IndexFlags::empty());
        add("gone", 50, 0, IndexFlags::DELETED);
        add("keeper", 1, 99, IndexFlags::NODELETE | IndexFlags::DELETED);

        let removed: Vec<String> = index
            .clean(&default_clean_criteria(), now)
            .into_iter()
            .map(|entry| entry.name)
            .collect();
        assert_eq!(removed, vec!["gone".to_string(), "stale".to_string()]);
        assert!(index.lookup_by_name("keeper").is_some());
        assert!(index.lookup_by_name("veteran").is_some());
        assert!(index.is_dirty());
    }

    #[test]
    fn ids_stay_unique_and_fixed() {
        let dir = TempDir::new().expect("tempdir");
        let mut index = index_in(&dir);
        assert_eq!(index.create_entry("aldric"), 1);
        let stolen = IndexEntry::new(1, "Bryn");
        assert!(matches!(
            index.insert_or_update(stolen),
            Err(PfileError::IndexInconsistency { .. })
        ));
        assert!(index.lookup_by_name("bryn").is_none());

        let mut moved = index.lookup_by_name("aldric").expect("entry").clone();
        moved.id = 7;
        assert!(index.insert_or_update(moved).is_err());
        assert_eq!(index.lookup_by_name("aldric").map(|entry| entry.id), Some(1));
        assert_eq!(index.top_id(), 1);
    }

    #[test]
    fn flush_leaves_no_temp_file() {
        let dir = TempDir::new().expect("tempdir");
        let mut index = index_in(&dir);
        index.create_entry("aldric");
        index.flush_to_index_file(false).expect("flush");
        index.create_entry("bryn");
        index.flush_to_index_file(false).expect("second flush");
        assert!(!index.path().with_extension("tmp").exists());
        let text = fs::read_to_string(index.path()).expect("read");
        assert_eq!(text, "1 aldric 0 0 0 0\n2 bryn 0 0 0 0\n~\n");
    }

    #[test]
    fn extreme_last_seen_does_not_overflow() {
        let dir = TempDir::new().expect("tempdir");
        let mut index = index_in(&dir);
        fs::create_dir_all(index.path().parent().expect("parent")).expect("mkdir");
        fs::write(index.path(), "1 aldric 3 0 -9223372036854775808\n~\n").expect("write");
        index.rebuild_from_index_file().expect("rebuild");
        let criteria = [CleanCriterion {
            level: 5,
            days: i64::MAX,
        }];
        assert!(index.clean(&criteria, i64::MAX).is_empty());
        let removed = index.clean(&default_clean_criteria(), 100 * SECS_PER_DAY);
        assert_eq!(removed.len(), 1);
    }
}
