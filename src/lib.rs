//! Retention sweeps for per-account data.
//!
//! Each run decides, per account under a data root, whether its data is kept
//! or archived; sizes the accounts selected for archival on a bounded worker
//! pool; moves them into size-bounded zip artifacts with a JSON manifest per
//! batch; and finally expires artifacts older than the archive window.

pub mod account;
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod run;
pub mod storage;

pub use account::{AccountRecord, AttributeLookup, Decision, JsonDirectory};
pub use config::CustodianConfig;
pub use error::{Error, Result};
pub use run::{AutoConfirm, Confirm, Custodian};
