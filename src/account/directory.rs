use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::time::Instant;

use serde::{Deserialize, Deserializer};
use time::{Date, OffsetDateTime};

use crate::account::AccountRecord;
use crate::config::CustodianConfig;
use crate::error::{Error, Result};
use crate::lifecycle::calendar::parse_date;
use crate::lifecycle::ProgressTracker;

/// Attributes the directory service holds for one account.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AccountAttributes {
    pub display_name: String,
    #[serde(default)]
    pub enrolled: Option<bool>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default, deserialize_with = "optional_date")]
    pub student_expiration: Option<Date>,
    #[serde(default, deserialize_with = "optional_date")]
    pub employee_expiration: Option<Date>,
}

fn optional_date<'de, D>(deserializer: D) -> std::result::Result<Option<Date>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(text) => parse_date(text)
            .map(Some)
            .map_err(serde::de::Error::custom),
    }
}

/// Account attribute service.
///
/// `bind` failing aborts the run before any data is touched. `lookup`
/// returns `Ok(None)` when the directory has no entry for the id.
pub trait AttributeLookup {
    fn bind(&mut self) -> Result<()>;

    fn lookup(&mut self, id: &str) -> Result<Option<AccountAttributes>>;

    fn unbind(&mut self) {}
}

/// Directory backed by a JSON document: `{ "<id>": { "display_name": .. } }`.
#[derive(Debug, Clone)]
pub struct JsonDirectory {
    source: Option<PathBuf>,
    entries: Option<HashMap<String, AccountAttributes>>,
}

impl JsonDirectory {
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self {
            source: Some(path.into()),
            entries: None,
        }
    }

    pub fn from_entries(entries: HashMap<String, AccountAttributes>) -> Self {
        Self {
            source: None,
            entries: Some(entries),
        }
    }
}

impl AttributeLookup for JsonDirectory {
    fn bind(&mut self) -> Result<()> {
        let Some(source) = &self.source else {
            return Ok(());
        };
        let data = std::fs::read(source)
            .map_err(|err| Error::DirectoryBind(format!("{}: {err}", source.display())))?;
        let entries = serde_json::from_slice(&data)
            .map_err(|err| Error::DirectoryBind(format!("{}: {err}", source.display())))?;
        self.entries = Some(entries);
        Ok(())
    }

    fn lookup(&mut self, id: &str) -> Result<Option<AccountAttributes>> {
        let entries = self.entries.as_ref().ok_or_else(|| Error::Lookup {
            id: id.to_string(),
            message: "directory not bound".to_string(),
        })?;
        Ok(entries.get(id).cloned())
    }

    fn unbind(&mut self) {
        if self.source.is_some() {
            self.entries = None;
        }
    }
}

/// List account ids under the data root: ignore-list entries dropped,
/// sorted, then truncated to `account_limit`.
pub fn scan_account_ids(config: &CustodianConfig) -> Result<Vec<String>> {
    let entries = match std::fs::read_dir(&config.data_root) {
        Ok(entries) => entries,
        Err(err) if err.kind() == ErrorKind::NotFound => {
            return Err(Error::MissingDataRoot {
                path: config.data_root.clone(),
            });
        }
        Err(err) => return Err(err.into()),
    };

    let mut ids = Vec::new();
    for entry in entries {
        let entry = entry?;
        let name = match entry.file_name().into_string() {
            Ok(name) => name,
            Err(raw) => {
                log::warn!("skipping non utf-8 entry in data root: {:?}", raw);
                continue;
            }
        };
        if config.is_ignored(&name) {
            continue;
        }
        ids.push(name);
    }
    ids.sort();

    if let Some(limit) = config.account_limit {
        if ids.len() > limit {
            log::info!("limiting run to the first {limit} accounts");
            ids.truncate(limit);
        }
    }
    Ok(ids)
}

/// Bind the directory, resolve every id into a record, then unbind.
///
/// Accounts whose data directory vanished since the scan are skipped.
pub fn lookup_accounts<L: AttributeLookup + ?Sized>(
    lookup: &mut L,
    ids: &[String],
    config: &CustodianConfig,
) -> Result<Vec<AccountRecord>> {
    lookup.bind()?;
    let result = resolve_all(lookup, ids, config);
    lookup.unbind();
    result
}

fn resolve_all<L: AttributeLookup + ?Sized>(
    lookup: &mut L,
    ids: &[String],
    config: &CustodianConfig,
) -> Result<Vec<AccountRecord>> {
    let mut progress = ProgressTracker::new("lookup", ids.len(), config.progress_interval);
    let mut records = Vec::with_capacity(ids.len());

    for id in ids {
        let start = Instant::now();
        let path = config.data_root.join(id);
        let modified = match std::fs::metadata(&path).and_then(|meta| meta.modified()) {
            Ok(modified) => OffsetDateTime::from(modified).date(),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                log::warn!("account {id} disappeared from {}, skipping", path.display());
                continue;
            }
            Err(err) => return Err(err.into()),
        };

        if config.verbose {
            log::info!("looking up account {id}");
        }
        let attributes = lookup.lookup(id)?;
        records.push(AccountRecord::from_lookup(id.as_str(), attributes, path, modified));
        progress.record(start.elapsed());
    }

    log::info!("looked up {} accounts", records.len());
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::{ActiveStatus, Enrollment};
    use tempfile::TempDir;

    #[test]
    fn test_scan_filters_sorts_and_limits() {
        let temp = TempDir::new().unwrap();
        for name in ["carol", "alice", "lost+found", "bob"] {
            std::fs::create_dir(temp.path().join(name)).unwrap();
        }
        std::fs::write(temp.path().join("aquota.user"), b"quota").unwrap();

        let mut config = CustodianConfig::new(temp.path(), temp.path().join("archive"));
        assert_eq!(scan_account_ids(&config).unwrap(), vec!["alice", "bob", "carol"]);

        config.account_limit = Some(2);
        assert_eq!(scan_account_ids(&config).unwrap(), vec!["alice", "bob"]);
    }

    #[test]
    fn test_scan_missing_root_is_fatal() {
        let temp = TempDir::new().unwrap();
        let config = CustodianConfig::new(temp.path().join("nope"), temp.path());
        let err = scan_account_ids(&config).unwrap_err();
        assert!(matches!(err, Error::MissingDataRoot { .. }));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_json_directory_bind_failure() {
        let temp = TempDir::new().unwrap();
        let mut directory = JsonDirectory::open(temp.path().join("missing.json"));
        let err = directory.bind().unwrap_err();
        assert!(matches!(err, Error::DirectoryBind(_)));
    }

    #[test]
    fn test_json_directory_lookup() {
        let temp = TempDir::new().unwrap();
        let doc = temp.path().join("directory.json");
        std::fs::write(
            &doc,
            r#"{
                "alice": {
                    "display_name": "Alice",
                    "enrolled": false,
                    "status": "active",
                    "student_expiration": "2020-05-31",
                    "employee_expiration": ""
                }
            }"#,
        )
        .unwrap();

        let mut directory = JsonDirectory::open(&doc);
        assert!(directory.lookup("alice").is_err());
        directory.bind().unwrap();

        let alice = directory.lookup("alice").unwrap().unwrap();
        assert_eq!(alice.display_name, "Alice");
        assert_eq!(alice.enrolled, Some(false));
        assert!(alice.student_expiration.is_some());
        assert!(alice.employee_expiration.is_none());
        assert!(directory.lookup("mallory").unwrap().is_none());
    }

    #[test]
    fn test_lookup_accounts_builds_records() {
        let temp = TempDir::new().unwrap();
        std::fs::create_dir(temp.path().join("alice")).unwrap();
        std::fs::create_dir(temp.path().join("ghost")).unwrap();

        let mut entries = HashMap::new();
        entries.insert(
            "alice".to_string(),
            AccountAttributes {
                display_name: "Alice".to_string(),
                enrolled: Some(true),
                ..Default::default()
            },
        );
        let mut directory = JsonDirectory::from_entries(entries);

        let config = CustodianConfig::new(temp.path(), temp.path().join("archive"));
        let ids = vec!["alice".to_string(), "ghost".to_string(), "vanished".to_string()];
        let records = lookup_accounts(&mut directory, &ids, &config).unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].enrollment, Enrollment::Enrolled);
        assert_eq!(records[0].path, temp.path().join("alice"));
        assert_eq!(records[1].id, "ghost");
        assert_eq!(records[1].active_status, ActiveStatus::Inactive);
    }
}
