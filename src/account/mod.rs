//! Account records and the directory lookup seam.

mod directory;

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use time::Date;

pub use directory::{
    lookup_accounts, scan_account_ids, AccountAttributes, AttributeLookup, JsonDirectory,
};

const NOT_IN_DIRECTORY: &str = "not in directory";

/// Enrollment flag as reported by the directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Enrollment {
    Enrolled,
    NotEnrolled,
    Unknown,
}

impl From<Option<bool>> for Enrollment {
    fn from(value: Option<bool>) -> Self {
        match value {
            Some(true) => Enrollment::Enrolled,
            Some(false) => Enrollment::NotEnrolled,
            None => Enrollment::Unknown,
        }
    }
}

/// Account-active status as reported by the directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActiveStatus {
    Active,
    Inactive,
    Unknown,
}

impl ActiveStatus {
    /// Map the directory's free-form status text.
    pub fn from_status_text(text: Option<&str>) -> Self {
        match text.map(str::trim) {
            None | Some("") => ActiveStatus::Unknown,
            Some(text)
                if text.eq_ignore_ascii_case("deleted") || text.eq_ignore_ascii_case("inactive") =>
            {
                ActiveStatus::Inactive
            }
            Some(_) => ActiveStatus::Active,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Keep,
    Delete,
}

impl Decision {
    pub fn from_keep(keep: bool) -> Self {
        if keep {
            Decision::Keep
        } else {
            Decision::Delete
        }
    }
}

/// One account found under the data root.
#[derive(Debug, Clone, PartialEq)]
pub struct AccountRecord {
    pub id: String,
    pub display_name: String,
    pub enrollment: Enrollment,
    pub active_status: ActiveStatus,
    pub student_expiration: Option<Date>,
    pub employee_expiration: Option<Date>,
    /// Modification date of the account's data directory.
    pub modified: Date,
    pub path: PathBuf,
    /// Populated by the sizing pool, only for accounts selected for archival.
    pub size_mb: Option<f64>,
    /// Populated once by the retention policy, before sizing.
    pub decision: Option<Decision>,
}

impl AccountRecord {
    /// Build a record from a directory lookup result. `None` means the
    /// directory has no entry for `id`.
    pub fn from_lookup(
        id: impl Into<String>,
        attributes: Option<AccountAttributes>,
        path: impl Into<PathBuf>,
        modified: Date,
    ) -> Self {
        let id = id.into();
        let path = path.into();
        match attributes {
            Some(attrs) => Self {
                id,
                display_name: attrs.display_name,
                enrollment: Enrollment::from(attrs.enrolled),
                active_status: ActiveStatus::from_status_text(attrs.status.as_deref()),
                student_expiration: attrs.student_expiration,
                employee_expiration: attrs.employee_expiration,
                modified,
                path,
                size_mb: None,
                decision: None,
            },
            None => Self {
                id,
                display_name: NOT_IN_DIRECTORY.to_string(),
                enrollment: Enrollment::Unknown,
                active_status: ActiveStatus::Inactive,
                student_expiration: None,
                employee_expiration: None,
                modified,
                path,
                size_mb: None,
                decision: None,
            },
        }
    }

    /// Eligible accounts are the ones decided for deletion.
    pub fn is_eligible(&self) -> bool {
        self.decision == Some(Decision::Delete)
    }

    pub fn size_or_zero(&self) -> f64 {
        self.size_mb.unwrap_or(0.0)
    }
}
