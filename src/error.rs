use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PfileError {
    #[error("no such identity: {0}")]
    NotFound(String),

    #[error("{action} failed for {}: {source}", path.display())]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("index inconsistency for {name}: {detail}")]
    IndexInconsistency { name: String, detail: String },

    #[error("record buffer allocation failed at {requested} bytes")]
    BufferAllocation { requested: usize },

    #[error("config {}: {detail}", path.display())]
    Config { path: PathBuf, detail: String },

    #[error("invalid player name {0:?}")]
    InvalidName(String),

    #[error("{0}")]
    Usage(String),
}

pub type PfileResult<T> = Result<T, PfileError>;

impl PfileError {
    pub fn io(action: &'static str, path: &Path, source: std::io::Error) -> Self {
        PfileError::Io {
            action,
            path: path.to_path_buf(),
            source,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, PfileError::NotFound(_))
    }
}

/// Per-field problems met while reading a record. These never abort a load;
/// the field keeps its default and reading continues.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoadAnomaly {
    #[error("unparsable line {line:?}")]
    Unparsable { line: String },

    #[error("malformed {tag} value {value:?}")]
    MalformedLine { tag: String, value: String },

    #[error("{tag} index {index} out of range")]
    OutOfRangeIndex { tag: String, index: i64 },

    #[error("unknown tag {tag}")]
    UnknownTag { tag: String },

    #[error("{tag} section ended without its terminator")]
    Truncated { tag: String },
}
