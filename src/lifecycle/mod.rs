//! Account lifecycle: retention decisions, sizing and batch planning.
//!
//! This module decides which accounts leave live storage and prepares them
//! for the archival pipeline:
//! - Retention policy evaluation (keep / delete)
//! - Concurrent folder sizing of accounts selected for deletion
//! - Greedy partition of those accounts into size-bounded batches
//! - Progress telemetry and run statistics
//!
//! # Example
//!
//! ```rust,ignore
//! use custodian::config::RetentionWindows;
//! use custodian::lifecycle::{ArchiveBatchPlanner, FolderSizeWorkerPool, RetentionPolicy};
//!
//! let policy = RetentionPolicy::new(RetentionWindows::default(), today);
//! policy.apply(&mut records);
//!
//! FolderSizeWorkerPool::new(8).run(&mut records)?;
//!
//! let eligible = records.into_iter().filter(|r| r.is_eligible());
//! let batches = ArchiveBatchPlanner::new(30_000.0).plan(eligible);
//! ```

pub mod calendar;
mod planner;
mod policy;
mod progress;
mod sizing;
mod stats;

pub use planner::{ArchiveBatch, ArchiveBatchPlanner};
pub use policy::RetentionPolicy;
pub use progress::{format_duration, ProgressTracker};
pub use sizing::{folder_size_bytes, FolderSizeWorkerPool, SizingStats};
pub use stats::RunReport;
