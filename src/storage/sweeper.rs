//! Expiry of archive artifacts past the archive retention window.

use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;

use time::Date;

use crate::error::Result;
use crate::lifecycle::calendar::retention_end;
use crate::storage::layout::{embedded_date, is_manifest_name, ArchiveLayout};

#[derive(Debug, Clone, Default)]
pub struct SweepReport {
    pub scanned: usize,
    pub deleted: Vec<PathBuf>,
    /// Entries whose name carries no date, plus leftover staging directories.
    pub skipped: usize,
    pub errors: Vec<String>,
}

/// Scans the archive store and deletes artifacts whose embedded date plus
/// the retention window is on or before today. Manifests are never removed.
#[derive(Debug, Clone)]
pub struct RetentionSweeper {
    layout: ArchiveLayout,
    retention_months: u32,
}

impl RetentionSweeper {
    pub fn new(layout: ArchiveLayout, retention_months: u32) -> Self {
        Self {
            layout,
            retention_months,
        }
    }

    pub fn sweep(&self, today: Date) -> Result<SweepReport> {
        let mut report = SweepReport::default();
        let entries = match fs::read_dir(self.layout.root()) {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                log::warn!(
                    "archive store {} does not exist, skipping removal of old archives",
                    self.layout.root().display()
                );
                return Ok(report);
            }
            Err(err) => return Err(err.into()),
        };

        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    log::error!("failed to read {}: {err}", self.layout.root().display());
                    report.errors.push(err.to_string());
                    continue;
                }
            };
            report.scanned += 1;
            let name = entry.file_name().to_string_lossy().into_owned();
            if is_manifest_name(&name) {
                continue;
            }
            let Some(created) = embedded_date(&name) else {
                report.skipped += 1;
                continue;
            };
            let Some(expires) = retention_end(created, self.retention_months) else {
                log::warn!("{name} is dated past the end of the calendar, keeping it");
                report.skipped += 1;
                continue;
            };
            if (expires - today).whole_days() > 0 {
                continue;
            }

            let path = entry.path();
            // Staging directories left behind by a failed compression are
            // kept for manual recovery.
            if fs::symlink_metadata(&path).map_or(false, |meta| meta.is_dir()) {
                log::warn!("expired staging directory left for manual recovery: {}", path.display());
                report.skipped += 1;
                continue;
            }

            log::info!("removing old archive: {}", path.display());
            match fs::remove_file(&path) {
                Ok(()) => report.deleted.push(path),
                Err(err) if err.kind() == ErrorKind::NotFound => {}
                Err(err) => {
                    log::error!("failed to remove {}: {err}", path.display());
                    report.errors.push(format!("{}: {err}", path.display()));
                }
            }
        }

        report.deleted.sort();
        Ok(report)
    }
}
