use crate::entities::player::PlayerRecord;
use crate::error::{PfileError, PfileResult};
use crate::persistence::buffer::{RecordBuffer, INITIAL_CAPACITY};
use crate::persistence::defaults::{fields, Emit, FieldKind, FieldSpec};
use crate::persistence::snapshot::{with_snapshot, Held};
use crate::persistence::subrecord::{codecs, write_section, EncodeSource};
use crate::persistence::tag;
use std::ffi::OsString;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

pub const DEFAULT_LAG_THRESHOLD: Duration = Duration::from_millis(260);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SaveMode {
    #[default]
    Normal,
    /// Final save of a character leaving the game; transient sections such
    /// as pending events are not written.
    Extracting,
}

#[derive(Debug, Clone, Copy)]
pub struct WriteOptions {
    pub buffer_capacity: usize,
    pub atomic_replace: bool,
    pub lag_threshold: Duration,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            buffer_capacity: INITIAL_CAPACITY,
            atomic_replace: false,
            lag_threshold: DEFAULT_LAG_THRESHOLD,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteSummary {
    pub bytes: usize,
    pub elapsed: Duration,
}

/// Serializes a stripped record plus its held state.
pub fn encode_record(
    record: &PlayerRecord,
    held: &Held,
    mode: SaveMode,
    capacity: usize,
) -> PfileResult<RecordBuffer> {
    let mut out = RecordBuffer::with_capacity(capacity)?;
    let source = EncodeSource { record, held, mode };
    if encode_into(&source, &mut out).is_err() {
        return Err(out.failure().unwrap_or(PfileError::BufferAllocation {
            requested: out.capacity(),
        }));
    }
    Ok(out)
}

fn encode_into(source: &EncodeSource<'_>, out: &mut RecordBuffer) -> fmt::Result {
    for spec in fields() {
        write_field(spec, source.record, out)?;
    }
    for codec in codecs() {
        write_section(codec.as_ref(), source, out)?;
    }
    Ok(())
}

fn write_field(spec: &FieldSpec, record: &PlayerRecord, out: &mut RecordBuffer) -> fmt::Result {
    if spec.emit == Emit::IfNotDefault && spec.is_default(record) {
        return Ok(());
    }
    match &spec.kind {
        FieldKind::Int { get, .. } => tag::write_line(out, spec.tag, get(record)),
        FieldKind::Pair { get, .. } => {
            let (first, second) = get(record);
            tag::write_line(out, spec.tag, tag::encode_pair(first, second))
        }
        FieldKind::Flags { get, .. } => {
            tag::write_line(out, spec.tag, tag::encode_flags(&get(record).words()))
        }
        FieldKind::Text { get, .. } => {
            // Single-line fields end at the first line break.
            let value = get(record).lines().next().unwrap_or_default();
            tag::write_line(out, spec.tag, value)
        }
        FieldKind::Block { get, .. } => tag::write_block(out, spec.tag, get(record)),
        FieldKind::IntList { get, .. } => {
            for value in get(record) {
                tag::write_line(out, spec.tag, value)?;
            }
            Ok(())
        }
        FieldKind::FlagRows { words, get, .. } => {
            for (index, row) in get(record).iter().enumerate() {
                if row.is_empty() {
                    continue;
                }
                let encoded = row.words()[..*words]
                    .iter()
                    .map(|word| tag::encode_flag_word(*word))
                    .collect::<Vec<_>>()
                    .join(" ");
                tag::write_line(out, spec.tag, format_args!("{} {}", index, encoded))?;
            }
            Ok(())
        }
    }
}

/// Writes `record` to `path`. Equipment and effects are detached for the
/// duration of the encode and are back in place when this returns, whether
/// or not the write succeeded.
pub fn write_record(
    path: &Path,
    record: &mut PlayerRecord,
    mode: SaveMode,
    options: &WriteOptions,
) -> PfileResult<WriteSummary> {
    let started = Instant::now();
    let buffer = with_snapshot(record, |raw, held| {
        encode_record(raw, held, mode, options.buffer_capacity)
    })?;
    let bytes = buffer.finish()?;
    commit(path, &bytes, options.atomic_replace)?;

    let elapsed = started.elapsed();
    if elapsed > options.lag_threshold {
        warn!(
            target: "lag",
            "save_char({}) took {}ms (buffer: {} bytes)",
            record.name,
            elapsed.as_millis(),
            bytes.len()
        );
    }
    debug!(player = %record.name, bytes = bytes.len(), "record written");
    Ok(WriteSummary {
        bytes: bytes.len(),
        elapsed,
    })
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".tmp");
    PathBuf::from(name)
}

fn commit(path: &Path, bytes: &[u8], atomic_replace: bool) -> PfileResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|err| PfileError::io("create directory", parent, err))?;
    }
    if !atomic_replace {
        return fs::write(path, bytes).map_err(|err| PfileError::io("write", path, err));
    }
    let temp = temp_path(path);
    fs::write(&temp, bytes).map_err(|err| PfileError::io("write", &temp, err))?;
    if let Err(err) = fs::rename(&temp, path) {
        let _ = fs::remove_file(&temp);
        return Err(PfileError::io("rename", path, err));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::effects::{ActiveEffect, ApplyLocation};
    use crate::entities::equipment::{EquippedItem, WearSlot};
    use crate::persistence::defaults::new_record;
    use tempfile::TempDir;

    fn encode(record: &mut PlayerRecord, mode: SaveMode) -> String {
        let buffer = with_snapshot(record, |raw, held| {
            encode_record(raw, held, mode, INITIAL_CAPACITY)
        })
        .expect("encode");
        String::from_utf8(buffer.finish().expect("bytes")).expect("utf8")
    }

    #[test]
    fn defaults_are_elided() {
        let mut record = new_record("Aldric");
        let text = encode(&mut record, SaveMode::Normal);
        assert!(text.starts_with("Name: Aldric\n"));
        assert!(text.contains("Id  : 0\n"));
        assert!(text.contains("Last: 0\n"));
        assert!(!text.contains("Page"));
        assert!(!text.contains("Size"));
        assert!(!text.contains("Str "));
        assert!(!text.contains("Affs"));
    }

    #[test]
    fn non_default_fields_are_written() {
        let mut record = new_record("Aldric");
        record.page_length = 60;
        record.size = 2;
        record.pools.hit = 20;
        record.pools.max_hit = 30;
        record.description = "A tall man.\nScarred.".to_string();
        let text = encode(&mut record, SaveMode::Normal);
        assert!(text.contains("Page: 60\n"));
        assert!(text.contains("Size: 2\n"));
        assert!(text.contains("Hit : 20/30\n"));
        assert!(text.contains("Desc:\nA tall man.\nScarred.\n~\n"));
    }

    #[test]
    fn single_line_text_stops_at_line_break() {
        let mut record = new_record("Aldric");
        record.title = "the Brave\nand Bold".to_string();
        let text = encode(&mut record, SaveMode::Normal);
        assert!(text.contains("Titl: the Brave\n"));
        assert!(!text.contains("and Bold"));
    }

    #[test]
    fn held_state_is_written_and_restored() {
        let mut record = new_record("Aldric");
        record.abilities.str = 14;
        record.equip(
            WearSlot::Body,
            EquippedItem::new(3040).with_apply(ApplyLocation::Str.code(), 1),
        );
        record
            .add_effect(ActiveEffect::new(31, 10, ApplyLocation::Str, 2))
            .expect("room");
        let text = encode(&mut record, SaveMode::Normal);
        assert!(text.contains("Str : 14/0\n"));
        assert!(text.contains("Eqpt:\n5 3040 1 1\n-1 -1\n"));
        assert!(text.contains("Affs:\n31 10 2 1 0 0 0 0 0 0\n"));
        assert_eq!(record.derived().abilities.str, 17);
    }

    #[test]
    fn extracting_save_skips_events() {
        let mut record = new_record("Aldric");
        record.events.set(2, 30).expect("in range");
        assert!(encode(&mut record, SaveMode::Normal).contains("Evnt:\n2 30\n-1 -1\n"));
        assert!(!encode(&mut record, SaveMode::Extracting).contains("Evnt"));
    }

    #[test]
    fn writes_replace_prior_contents() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("A-E").join("aldric.plr");
        let mut record = new_record("Aldric");
        record.title = "a rather long title for the first save".to_string();
        write_record(&path, &mut record, SaveMode::Normal, &WriteOptions::default())
            .expect("first write");
        record.title.clear();
        let summary = write_record(&path, &mut record, SaveMode::Normal, &WriteOptions::default())
            .expect("second write");
        let on_disk = fs::read_to_string(&path).expect("read");
        assert_eq!(on_disk.len(), summary.bytes);
        assert!(!on_disk.contains("Titl"));
    }

    #[test]
    fn atomic_replace_leaves_no_temp_file() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("aldric.plr");
        let options = WriteOptions {
            atomic_replace: true,
            ..WriteOptions::default()
        };
        let mut record = new_record("Aldric");
        write_record(&path, &mut record, SaveMode::Normal, &options).expect("write");
        assert!(path.exists());
        assert!(!temp_path(&path).exists());
    }
}
