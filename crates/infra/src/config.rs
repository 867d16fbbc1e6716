//! Runtime configuration from the environment.

use std::path::PathBuf;

use supplysync_observability::LogFormat;

pub const STORE_PATH_VAR: &str = "SUPPLYSYNC_STORE_PATH";
pub const AUDIT_DIR_VAR: &str = "SUPPLYSYNC_AUDIT_DIR";
pub const PROFILE_VAR: &str = "SUPPLYSYNC_PROFILE";
pub const LOG_FORMAT_VAR: &str = "SUPPLYSYNC_LOG_FORMAT";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("{var} is set but empty")]
    Empty { var: &'static str },
    #[error("invalid {var}: {reason}")]
    Invalid { var: &'static str, reason: String },
}

/// Where a sync run reads and writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    /// JSON document backing the supply item store.
    pub store_path: PathBuf,
    /// Directory receiving `supplier_import_<timestamp>.log` files.
    pub audit_dir: PathBuf,
    /// Built-in profile name.
    pub profile: String,
    pub log_format: LogFormat,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            store_path: PathBuf::from("supplysync-store.json"),
            audit_dir: PathBuf::from("log"),
            profile: "alltron".to_string(),
            log_format: LogFormat::Json,
        }
    }
}

impl SyncConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build from an arbitrary variable source; unset variables keep defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let get = |var: &'static str| -> Result<Option<String>, ConfigError> {
            match lookup(var) {
                None => Ok(None),
                Some(v) if v.trim().is_empty() => Err(ConfigError::Empty { var }),
                Some(v) => Ok(Some(v.trim().to_string())),
            }
        };

        if let Some(v) = get(STORE_PATH_VAR)? {
            config.store_path = PathBuf::from(v);
        }
        if let Some(v) = get(AUDIT_DIR_VAR)? {
            config.audit_dir = PathBuf::from(v);
        }
        if let Some(v) = get(PROFILE_VAR)? {
            config.profile = v;
        }
        if let Some(v) = get(LOG_FORMAT_VAR)? {
            config.log_format = v.parse().map_err(|e: supplysync_observability::UnknownLogFormat| {
                ConfigError::Invalid {
                    var: LOG_FORMAT_VAR,
                    reason: e.to_string(),
                }
            })?;
        }
        Ok(config)
    }
}
