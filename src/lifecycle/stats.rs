//! Statistics for a custodian run.

use std::time::Duration;

use crate::lifecycle::progress::format_duration;
use crate::storage::{BatchReport, BatchStatus, SweepReport};

/// Statistics from one custodian run.
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    /// Account directories found under the data root (after filtering).
    pub scanned_count: usize,

    /// Accounts resolved against the directory.
    pub evaluated_count: usize,

    /// Accounts decided for deletion.
    pub eligible_count: usize,

    /// Uncompressed size of the eligible set, in MB.
    pub eligible_size_mb: f64,

    /// One report per archival batch, in batch order.
    pub batches: Vec<BatchReport>,

    /// Result of the archive expiry pass.
    pub sweep: SweepReport,

    /// Whether the archival step was skipped by configuration.
    pub archiving_disabled: bool,

    /// Errors encountered during the run.
    pub errors: Vec<String>,

    /// Time taken for the run.
    pub duration: Duration,
}

impl RunReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_batch(&mut self, batch: BatchReport) {
        for error in &batch.errors {
            self.errors.push(format!("batch {}: {error}", batch.index));
        }
        self.batches.push(batch);
    }

    pub fn record_sweep(&mut self, sweep: SweepReport) {
        self.errors.extend(sweep.errors.iter().cloned());
        self.sweep = sweep;
    }

    pub fn record_error(&mut self, error: String) {
        self.errors.push(error);
    }

    pub fn archived_count(&self) -> usize {
        self.batches.iter().map(|batch| batch.archived.len()).sum()
    }

    pub fn batches_with(&self, status: BatchStatus) -> usize {
        self.batches.iter().filter(|batch| batch.status == status).count()
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn summary(&self) -> String {
        format!(
            "Scanned: {}, Eligible: {} ({:.3} MB), Archived: {} in {} batches \
             ({} skipped, {} uncompressed), Expired archives removed: {}, Errors: {}, Runtime: {}",
            self.scanned_count,
            self.eligible_count,
            self.eligible_size_mb,
            self.archived_count(),
            self.batches_with(BatchStatus::Archived),
            self.batches_with(BatchStatus::Skipped),
            self.batches_with(BatchStatus::CompressionFailed),
            self.sweep.deleted.len(),
            self.errors.len(),
            format_duration(self.duration)
        )
    }
}
