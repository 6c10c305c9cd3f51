use crate::config::PersistenceConfig;
use crate::entities::flags::plr;
use crate::entities::player::PlayerRecord;
use crate::error::{PfileError, PfileResult};
use crate::persistence::index::{IndexEntry, IndexFlags, PlayerIndex};
use crate::persistence::reader::{read_record, LoadReport};
use crate::persistence::shard::{path_for, path_for_kind, FILE_KINDS};
use crate::persistence::snapshot::{check_savable, Unsavable};
use crate::persistence::writer::{write_record, SaveMode, WriteSummary};
use crate::telemetry::logging::unix_timestamp;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

const INDEX_FILE: &str = "index";

#[derive(Debug)]
pub struct PfileStore {
    root: PathBuf,
    index: PlayerIndex,
    config: PersistenceConfig,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoadedRecord {
    pub record: PlayerRecord,
    pub report: LoadReport,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    Saved(WriteSummary),
    Skipped(Unsavable),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeleteReport {
    pub name: String,
    pub removed: Vec<PathBuf>,
    pub absent: Vec<PathBuf>,
}

#[derive(Debug, Default)]
pub struct ValidationReport {
    pub players: usize,
    pub clean: usize,
    pub with_anomalies: usize,
    pub anomalies: usize,
    pub missing: Vec<String>,
    pub errors: Vec<String>,
}

fn valid_name(name: &str) -> PfileResult<()> {
    if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(PfileError::InvalidName(name.to_string()));
    }
    Ok(())
}

impl PfileStore {
    /// Opens the store under `root` and loads the player index.
    pub fn open(root: impl Into<PathBuf>, config: PersistenceConfig) -> PfileResult<Self> {
        let root = root.into();
        let mut index = PlayerIndex::new(root.join("plrfiles").join(INDEX_FILE));
        index.rebuild_from_index_file()?;
        Ok(Self {
            root,
            index,
            config,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn index(&self) -> &PlayerIndex {
        &self.index
    }

    pub fn config(&self) -> &PersistenceConfig {
        &self.config
    }

    pub fn record_path(&self, name: &str) -> PfileResult<PathBuf> {
        valid_name(name)?;
        path_for(name)
            .map(|path| self.root.join(path))
            .ok_or_else(|| PfileError::InvalidName(name.to_string()))
    }

    pub fn load(&self, name: &str) -> PfileResult<LoadedRecord> {
        valid_name(name)?;
        let Some(entry) = self.index.lookup_by_name(name) else {
            return Err(PfileError::NotFound(name.to_string()));
        };
        let path = self.record_path(&entry.name)?;
        match read_record(&path, &entry.name) {
            Ok((record, report)) => {
                if record.id != entry.id {
                    warn!(
                        player = %entry.name,
                        file_id = record.id,
                        index_id = entry.id,
                        "record id disagrees with index"
                    );
                }
                Ok(LoadedRecord { record, report })
            }
            Err(err) if err.is_not_found() => {
                error!(player = %entry.name, path = %path.display(), "indexed player has no record file");
                Err(PfileError::IndexInconsistency {
                    name: entry.name.clone(),
                    detail: format!("no record file at {}", path.display()),
                })
            }
            Err(err) => Err(err),
        }
    }

    /// Saves `record` and refreshes its index row. An unsavable record, or
    /// one whose name has no index row, is left alone and reported as
    /// skipped. New characters are registered with `create_index_entry`
    /// first.
    pub fn save(&mut self, record: &mut PlayerRecord, mode: SaveMode) -> PfileResult<SaveOutcome> {
        if let Err(reason) = check_savable(record) {
            debug!(player = %record.name, %reason, "save skipped");
            return Ok(SaveOutcome::Skipped(reason));
        }
        let path = self.record_path(&record.name)?;
        let Some(indexed_id) = self.index.lookup_by_name(&record.name).map(|entry| entry.id) else {
            debug!(player = %record.name, "save skipped, not in the player index");
            return Ok(SaveOutcome::Skipped(Unsavable::NotIndexed));
        };
        if record.id != 0 && record.id != indexed_id {
            let detail = format!("record carries id {}, index has {}", record.id, indexed_id);
            error!(player = %record.name, "{}", detail);
            return Err(PfileError::IndexInconsistency {
                name: record.name.to_lowercase(),
                detail,
            });
        }

        let previous = (record.id, record.last_logon);
        record.id = indexed_id;
        record.last_logon = unix_timestamp();

        let result = write_record(&path, record, mode, &self.config.write_options())
            .and_then(|summary| self.update_index(record).map(|()| summary));
        match result {
            Ok(summary) => Ok(SaveOutcome::Saved(summary)),
            Err(err) => {
                (record.id, record.last_logon) = previous;
                error!(player = %record.name, "save failed: {}", err);
                Err(err)
            }
        }
    }

    fn update_index(&mut self, record: &PlayerRecord) -> PfileResult<()> {
        let mut entry = self
            .index
            .lookup_by_name(&record.name)
            .cloned()
            .unwrap_or_else(|| IndexEntry::new(record.id, &record.name));
        entry.id = record.id;
        entry.level = record.level;
        entry.last = record.last_logon;
        entry.clan = record.clan;

        let flags = &record.act_flags;
        entry.flags.set(IndexFlags::DELETED, flags.has(plr::DELETED));
        entry.flags.set(
            IndexFlags::NODELETE,
            flags.has(plr::NODELETE) || flags.has(plr::CRYO),
        );
        entry.flags.set(
            IndexFlags::NOWIZLIST,
            flags.has(plr::FROZEN) || flags.has(plr::NOWIZLIST),
        );
        entry.flags.set(IndexFlags::INCLAN, record.clan != 0);
        self.index.insert_or_update(entry)
    }

    /// Id for a new character, reusing the row if the name is already known.
    pub fn create_index_entry(&mut self, name: &str) -> PfileResult<i64> {
        let path = self.record_path(name)?;
        if self.index.lookup_by_name(name).is_none() && path.exists() {
            warn!(
                player = %name.to_lowercase(),
                path = %path.display(),
                "record file exists without an index entry"
            );
        }
        Ok(self.index.create_entry(name))
    }

    /// Removes every file the player owns, then the index row. If any file
    /// cannot be removed the row is kept and the failure is returned.
    pub fn delete(&mut self, name: &str) -> PfileResult<DeleteReport> {
        valid_name(name)?;
        let Some(entry) = self.index.lookup_by_name(name).cloned() else {
            return Err(PfileError::NotFound(name.to_string()));
        };
        let report = self.remove_files(&entry.name)?;
        self.index.remove(&entry.name);
        self.index.flush_to_index_file(false)?;
        info!(player = %entry.name, files = report.removed.len(), "player deleted");
        Ok(report)
    }

    fn remove_files(&self, name: &str) -> PfileResult<DeleteReport> {
        let mut report = DeleteReport {
            name: name.to_string(),
            ..DeleteReport::default()
        };
        let mut failures = Vec::new();
        for kind in FILE_KINDS {
            let Some(relative) = path_for_kind(name, kind) else {
                continue;
            };
            let path = self.root.join(relative);
            match fs::remove_file(&path) {
                Ok(()) => report.removed.push(path),
                Err(err) if err.kind() == ErrorKind::NotFound => report.absent.push(path),
                Err(err) => failures.push(format!("{}: {}", path.display(), err)),
            }
        }
        if report.absent.iter().any(|path| path.extension().is_some_and(|ext| ext == "plr")) {
            warn!(player = %name, "indexed player had no record file");
        }
        if !failures.is_empty() {
            let detail = format!(
                "partial deletion, removed {} file(s), failed: {}",
                report.removed.len(),
                failures.join("; ")
            );
            error!(player = %name, "{}", detail);
            return Err(PfileError::IndexInconsistency {
                name: name.to_string(),
                detail,
            });
        }
        Ok(report)
    }

    /// Purges deleted and long-idle players, per the configured criteria.
    pub fn clean(&mut self, now: i64) -> PfileResult<Vec<DeleteReport>> {
        let purged = self.index.clean(&self.config.clean_criteria, now);
        let mut reports = Vec::with_capacity(purged.len());
        for entry in purged {
            match self.remove_files(&entry.name) {
                Ok(report) => reports.push(report),
                Err(err) => error!(player = %entry.name, "clean left files behind: {}", err),
            }
        }
        self.index.flush_to_index_file(false)?;
        Ok(reports)
    }

    /// Loads every indexed player and tallies what the reader reported.
    pub fn validate(&self) -> ValidationReport {
        let mut report = ValidationReport::default();
        for entry in self.index.iter() {
            report.players += 1;
            match self.load(&entry.name) {
                Ok(loaded) if loaded.report.is_clean() => report.clean += 1,
                Ok(loaded) => {
                    report.with_anomalies += 1;
                    report.anomalies += loaded.report.anomalies.len();
                }
                Err(PfileError::IndexInconsistency { name, .. }) => report.missing.push(name),
                Err(err) => report.errors.push(err.to_string()),
            }
        }
        report
    }

    pub fn flush_index(&mut self, force: bool) -> PfileResult<bool> {
        self.index.flush_to_index_file(force)
    }
}
