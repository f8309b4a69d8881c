//! Naming of staging directories, artifacts and manifests in the archive
//! store: `{YYYY}_{MM}_{DD}_{HH}_{MM}_{batch}` plus `.zip` or
//! `_manifest.json`.

use std::fmt;
use std::path::{Path, PathBuf};

use time::{Date, Month, OffsetDateTime};

const DELIMITER: char = '_';
const ARTIFACT_EXTENSION: &str = "zip";
const MANIFEST_SUFFIX: &str = "_manifest.json";

/// Run timestamp shared by every artifact of one invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunStamp {
    pub date: Date,
    pub hour: u8,
    pub minute: u8,
}

impl RunStamp {
    pub fn new(date: Date, hour: u8, minute: u8) -> Self {
        Self { date, hour, minute }
    }
}

impl From<OffsetDateTime> for RunStamp {
    fn from(value: OffsetDateTime) -> Self {
        Self {
            date: value.date(),
            hour: value.hour(),
            minute: value.minute(),
        }
    }
}

impl fmt::Display for RunStamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:04}_{:02}_{:02}_{:02}_{:02}",
            self.date.year(),
            self.date.month() as u8,
            self.date.day(),
            self.hour,
            self.minute
        )
    }
}

#[derive(Debug, Clone)]
pub struct ArchiveLayout {
    root: PathBuf,
}

impl ArchiveLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Base name shared by the staging directory, artifact and manifest.
    pub fn batch_name(&self, stamp: RunStamp, batch: usize) -> String {
        format!("{stamp}{DELIMITER}{batch}")
    }

    pub fn staging_dir(&self, stamp: RunStamp, batch: usize) -> PathBuf {
        self.root.join(self.batch_name(stamp, batch))
    }

    pub fn artifact_path(&self, stamp: RunStamp, batch: usize) -> PathBuf {
        self.root
            .join(format!("{}.{ARTIFACT_EXTENSION}", self.batch_name(stamp, batch)))
    }

    pub fn manifest_path(&self, stamp: RunStamp, batch: usize) -> PathBuf {
        self.root
            .join(format!("{}{MANIFEST_SUFFIX}", self.batch_name(stamp, batch)))
    }
}

pub fn is_manifest_name(name: &str) -> bool {
    name.ends_with(MANIFEST_SUFFIX)
}

/// Date embedded in the first three `_`-separated tokens of an archive
/// store entry, if they read as year, month and day.
pub fn embedded_date(name: &str) -> Option<Date> {
    let mut tokens = name.split(DELIMITER);
    let year = tokens.next()?.parse::<i32>().ok()?;
    let month = tokens.next()?.parse::<u8>().ok()?;
    let day = tokens.next()?.parse::<u8>().ok()?;
    let month = Month::try_from(month).ok()?;
    Date::from_calendar_date(year, month, day).ok()
}
