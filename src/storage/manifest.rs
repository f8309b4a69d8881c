use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::account::{AccountRecord, ActiveStatus, Decision, Enrollment};
use crate::error::Result;
use crate::lifecycle::calendar::format_date;
use crate::storage::compressor::publish;
use crate::storage::layout::RunStamp;

/// Key of the run metadata object; sorts ahead of every account id.
pub const RUN_KEY: &str = "0_run_stats";
const INDENT: &[u8] = b"    ";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunMetadata {
    pub date: String,
    pub batch_index: usize,
    pub accounts_archived: usize,
    pub archive_size_mb: f64,
}

/// Snapshot of one archived account, dates as `YYYY-MM-DD`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub id: String,
    pub display_name: String,
    pub enrollment: Enrollment,
    pub active_status: ActiveStatus,
    pub student_expiration: Option<String>,
    pub employee_expiration: Option<String>,
    pub modified: String,
    pub path: String,
    pub size_mb: Option<f64>,
    pub decision: Option<Decision>,
}

impl From<&AccountRecord> for ManifestEntry {
    fn from(record: &AccountRecord) -> Self {
        Self {
            id: record.id.clone(),
            display_name: record.display_name.clone(),
            enrollment: record.enrollment,
            active_status: record.active_status,
            student_expiration: record.student_expiration.map(format_date),
            employee_expiration: record.employee_expiration.map(format_date),
            modified: format_date(record.modified),
            path: record.path.to_string_lossy().into_owned(),
            size_mb: record.size_mb,
            decision: record.decision,
        }
    }
}

/// Audit record of one archived batch, keyed by account id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchiveManifest {
    #[serde(rename = "0_run_stats")]
    pub run: RunMetadata,
    #[serde(flatten)]
    pub entries: BTreeMap<String, ManifestEntry>,
}

impl ArchiveManifest {
    pub fn new(stamp: RunStamp, batch_index: usize, accounts: &[AccountRecord]) -> Self {
        let entries: BTreeMap<_, _> = accounts
            .iter()
            .map(|record| (record.id.clone(), ManifestEntry::from(record)))
            .collect();
        let archive_size_mb = accounts.iter().map(AccountRecord::size_or_zero).sum();
        Self {
            run: RunMetadata {
                date: stamp.to_string(),
                batch_index,
                accounts_archived: accounts.len(),
                archive_size_mb,
            },
            entries,
        }
    }

    /// Indented, key-sorted JSON text.
    pub fn to_pretty_json(&self) -> Result<Vec<u8>> {
        // serde_json's object map is ordered, so going through a Value sorts
        // every level of keys.
        let value = serde_json::to_value(self)?;
        let mut out = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(INDENT);
        let mut serializer = serde_json::Serializer::with_formatter(&mut out, formatter);
        value.serialize(&mut serializer)?;
        out.push(b'\n');
        Ok(out)
    }

    /// Write through a temp file so a reader never sees a torn manifest. An
    /// existing manifest at `path` is never replaced.
    pub fn write(&self, path: &Path) -> Result<()> {
        let data = self.to_pretty_json()?;
        let tmp = path.with_extension("json.tmp");
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&tmp)?;
        file.write_all(&data)?;
        file.sync_all()?;
        drop(file);
        publish(&tmp, path).map_err(|err| {
            let _ = std::fs::remove_file(&tmp);
            err
        })
    }

    pub fn read(path: &Path) -> Result<Self> {
        let data = std::fs::read(path)?;
        Ok(serde_json::from_slice(&data)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use time::{Date, Month};

    fn record(id: &str, size_mb: f64) -> AccountRecord {
        AccountRecord {
            id: id.to_string(),
            display_name: format!("{id} display"),
            enrollment: Enrollment::Unknown,
            active_status: ActiveStatus::Inactive,
            student_expiration: Some(Date::from_calendar_date(2019, Month::May, 31).unwrap()),
            employee_expiration: None,
            modified: Date::from_calendar_date(2021, Month::January, 2).unwrap(),
            path: format!("/data/{id}").into(),
            size_mb: Some(size_mb),
            decision: Some(Decision::Delete),
        }
    }

    fn stamp() -> RunStamp {
        RunStamp::new(Date::from_calendar_date(2024, Month::October, 1).unwrap(), 23, 5)
    }

    #[test]
    fn test_manifest_round_trip() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("2024_10_01_23_05_1_manifest.json");
        let manifest = ArchiveManifest::new(stamp(), 1, &[record("zed", 1.5), record("amy", 2.0)]);
        manifest.write(&path).unwrap();

        let parsed = ArchiveManifest::read(&path).unwrap();
        assert_eq!(parsed, manifest);
        assert_eq!(parsed.run.date, "2024_10_01_23_05");
        assert_eq!(parsed.run.batch_index, 1);
        assert_eq!(parsed.run.accounts_archived, 2);
        assert_eq!(parsed.run.archive_size_mb, 3.5);
        assert_eq!(parsed.entries.keys().collect::<Vec<_>>(), vec!["amy", "zed"]);
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn test_manifest_write_keeps_existing_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("2024_10_01_23_05_0_manifest.json");
        ArchiveManifest::new(stamp(), 0, &[record("amy", 1.0)]).write(&path).unwrap();

        let err = ArchiveManifest::new(stamp(), 0, &[record("bob", 1.0)])
            .write(&path)
            .unwrap_err();
        assert!(matches!(err, crate::error::Error::ArtifactExists { .. }));

        let kept = ArchiveManifest::read(&path).unwrap();
        assert_eq!(kept.entries.keys().collect::<Vec<_>>(), vec!["amy"]);
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn test_manifest_text_is_sorted_and_indented() {
        let manifest = ArchiveManifest::new(stamp(), 0, &[record("bob", 1.0)]);
        let text = String::from_utf8(manifest.to_pretty_json().unwrap()).unwrap();

        let run_pos = text.find(RUN_KEY).unwrap();
        let bob_pos = text.find("\"bob\"").unwrap();
        assert!(run_pos < bob_pos);
        assert!(text.contains("\n    \"0_run_stats\": {"));
        assert!(text.contains("\"student_expiration\": \"2019-05-31\""));
        assert!(text.contains("\"modified\": \"2021-01-02\""));
        assert!(text.contains("\"enrollment\": \"unknown\""));

        let active = text.find("\"active_status\"").unwrap();
        let display = text.find("\"display_name\"").unwrap();
        assert!(active < display);
    }
}
