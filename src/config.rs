//! Run configuration.
//!
//! A `CustodianConfig` is built once (from a JSON file plus CLI overrides) and
//! passed by reference to every component.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Retention windows, all expressed in calendar months.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionWindows {
    /// Months data is kept after a student or employee expiration date.
    /// Default: 12
    pub after_expiration_months: u32,

    /// Months data is kept after the last modification of the account folder.
    /// Default: 24
    pub after_access_months: u32,

    /// Months an archive artifact is kept before the sweeper removes it.
    /// Default: 12
    pub archive_months: u32,
}

impl Default for RetentionWindows {
    fn default() -> Self {
        Self {
            after_expiration_months: 12,
            after_access_months: 24,
            archive_months: 12,
        }
    }
}

/// Configuration for one custodian run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CustodianConfig {
    /// Directory holding one sub-directory per account.
    pub data_root: PathBuf,

    /// Directory receiving staging folders, artifacts and manifests.
    pub archive_root: PathBuf,

    pub retention: RetentionWindows,

    /// Upper bound on concurrent folder-sizing workers.
    /// Default: 50
    pub worker_threads: usize,

    /// Batch is closed once its uncompressed size reaches this many MB.
    /// Default: 30000
    pub max_archive_size_mb: f64,

    /// Data-root entries that are never treated as accounts.
    pub ignore: Vec<String>,

    /// Ask the operator before moving any data.
    pub confirm_before_archive: bool,

    /// Evaluate and size accounts but skip the archival pipeline.
    pub disable_archiving: bool,

    /// Only process the first N account ids (sorted).
    pub account_limit: Option<usize>,

    /// Emit progress telemetry every N completed items.
    pub progress_interval: Option<usize>,

    /// Log one line per account processed.
    pub verbose: bool,
}

impl Default for CustodianConfig {
    fn default() -> Self {
        Self {
            data_root: PathBuf::from("/DataStore/StudentData"),
            archive_root: PathBuf::from("/DataStore/Archive"),
            retention: RetentionWindows::default(),
            worker_threads: 50,
            max_archive_size_mb: 30_000.0,
            ignore: vec!["aquota.user".to_string(), "lost+found".to_string()],
            confirm_before_archive: false,
            disable_archiving: false,
            account_limit: None,
            progress_interval: None,
            verbose: true,
        }
    }
}

impl CustodianConfig {
    pub fn new(data_root: impl Into<PathBuf>, archive_root: impl Into<PathBuf>) -> Self {
        Self {
            data_root: data_root.into(),
            archive_root: archive_root.into(),
            ..Default::default()
        }
    }

    /// Load a config document. Missing keys take their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read(path)?;
        let config: Self = serde_json::from_slice(&data)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.worker_threads == 0 {
            return Err(Error::InvalidConfig(
                "worker_threads must be at least 1".to_string(),
            ));
        }
        if !(self.max_archive_size_mb > 0.0) {
            return Err(Error::InvalidConfig(format!(
                "max_archive_size_mb must be positive, got {}",
                self.max_archive_size_mb
            )));
        }
        if self.progress_interval == Some(0) {
            return Err(Error::InvalidConfig(
                "progress_interval must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn is_ignored(&self, name: &str) -> bool {
        self.ignore.iter().any(|ignored| ignored == name)
    }
}
