use crate::error::{PfileError, PfileResult};
use crate::persistence::index::{default_clean_criteria, CleanCriterion};
use crate::persistence::writer::WriteOptions;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

const USAGE: &str = "usage: pfile <lib-root> [list | show <name> | validate | delete <name> | clean]";
const CONFIG_FILE: &str = "pfile.yaml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    List,
    Show(String),
    Validate,
    Delete(String),
    Clean,
}

#[derive(Debug)]
pub struct AppConfig {
    pub root: PathBuf,
    pub command: Command,
    pub persistence: PersistenceConfig,
}

impl AppConfig {
    pub fn from_args(args: &[String]) -> PfileResult<Self> {
        if args.len() < 2 {
            return Err(PfileError::Usage(USAGE.to_string()));
        }

        let root = Path::new(&args[1]).to_path_buf();
        let name = args.get(3).cloned();
        let command = match (args.get(2).map(String::as_str), name) {
            (None, _) | (Some("list"), _) => Command::List,
            (Some("show"), Some(name)) => Command::Show(name),
            (Some("validate"), _) => Command::Validate,
            (Some("delete"), Some(name)) => Command::Delete(name),
            (Some("clean"), _) => Command::Clean,
            _ => return Err(PfileError::Usage(USAGE.to_string())),
        };

        let config_path = std::env::var("PFILE_CONFIG")
            .ok()
            .and_then(|value| {
                let trimmed = value.trim();
                if trimmed.is_empty() {
                    None
                } else {
                    Some(PathBuf::from(trimmed))
                }
            });
        let persistence = match config_path {
            Some(path) => PersistenceConfig::load(&path)?,
            None => {
                let path = root.join(CONFIG_FILE);
                if path.exists() {
                    PersistenceConfig::load(&path)?
                } else {
                    PersistenceConfig::default()
                }
            }
        };

        Ok(Self {
            root,
            command,
            persistence,
        })
    }
}

/// Tunables read from `pfile.yaml`. Missing keys take their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistenceConfig {
    pub lag_threshold_ms: u64,
    pub buffer_capacity: usize,
    pub atomic_replace: bool,
    pub log_filter: String,
    pub clean_criteria: Vec<CleanCriterion>,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            lag_threshold_ms: 260,
            buffer_capacity: 64 * 1024,
            atomic_replace: false,
            log_filter: "info".to_string(),
            clean_criteria: default_clean_criteria(),
        }
    }
}

impl PersistenceConfig {
    pub fn load(path: &Path) -> PfileResult<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|err| PfileError::io("read config", path, err))?;
        Self::from_yaml(&text).map_err(|detail| PfileError::Config {
            path: path.to_path_buf(),
            detail,
        })
    }

    pub fn from_yaml(text: &str) -> Result<Self, String> {
        let mut config: Self = serde_yaml::from_str(text).map_err(|err| err.to_string())?;
        if config.buffer_capacity == 0 {
            return Err("buffer_capacity must be positive".to_string());
        }
        config.clean_criteria.sort_by_key(|criterion| criterion.level);
        Ok(config)
    }

    pub fn write_options(&self) -> WriteOptions {
        WriteOptions {
            buffer_capacity: self.buffer_capacity,
            atomic_replace: self.atomic_replace,
            lag_threshold: Duration::from_millis(self.lag_threshold_ms),
        }
    }
}
