//! One custodian invocation: scan, decide, size, archive, expire.

use std::time::Instant;

use time::{Date, OffsetDateTime};

use crate::account::{lookup_accounts, scan_account_ids, AccountRecord, AttributeLookup};
use crate::config::CustodianConfig;
use crate::error::{Error, Result};
use crate::lifecycle::{ArchiveBatchPlanner, FolderSizeWorkerPool, RetentionPolicy, RunReport};
use crate::storage::{ArchiveLayout, ArchivePipeline, RetentionSweeper, RunStamp, SweepReport};

/// Operator confirmation asked before any data is moved.
pub trait Confirm {
    fn confirm(&mut self, accounts: usize, size_mb: f64) -> bool;
}

/// Confirms everything; for unattended runs.
#[derive(Debug, Clone, Copy, Default)]
pub struct AutoConfirm;

impl Confirm for AutoConfirm {
    fn confirm(&mut self, _accounts: usize, _size_mb: f64) -> bool {
        true
    }
}

pub struct Custodian<L: AttributeLookup> {
    config: CustodianConfig,
    lookup: L,
}

impl<L: AttributeLookup> Custodian<L> {
    pub fn new(config: CustodianConfig, lookup: L) -> Result<Self> {
        config.validate()?;
        Ok(Self { config, lookup })
    }

    pub fn config(&self) -> &CustodianConfig {
        &self.config
    }

    fn layout(&self) -> ArchiveLayout {
        ArchiveLayout::new(&self.config.archive_root)
    }

    /// Run every stage once. `now` names the artifacts and fixes "today" for
    /// every retention comparison.
    ///
    /// Missing data root, a failed directory bind and a refused confirmation
    /// abort before any data is moved; batch and sweep failures are only
    /// reported.
    pub fn run(&mut self, now: OffsetDateTime, confirm: &mut dyn Confirm) -> Result<RunReport> {
        let start = Instant::now();
        let today = now.date();
        let mut report = RunReport::new();

        log::info!("scanning data root {}", self.config.data_root.display());
        let ids = scan_account_ids(&self.config)?;
        report.scanned_count = ids.len();

        let mut records = lookup_accounts(&mut self.lookup, &ids, &self.config)?;
        report.evaluated_count = records.len();

        let policy = RetentionPolicy::new(self.config.retention, today);
        report.eligible_count = policy.apply(&mut records);

        log::info!("sizing {} accounts selected for archival", report.eligible_count);
        let sizing = FolderSizeWorkerPool::from_config(&self.config).run(&mut records)?;
        report.eligible_size_mb = sizing.total_mb;

        let eligible: Vec<AccountRecord> =
            records.into_iter().filter(AccountRecord::is_eligible).collect();

        if eligible.is_empty() {
            log::info!("no accounts found that could be archived");
        } else {
            self.log_eligible(&eligible, report.eligible_size_mb);
            if self.config.disable_archiving {
                log::info!("archiving is disabled in the config, skipping archive step");
                report.archiving_disabled = true;
            } else {
                if self.config.confirm_before_archive
                    && !confirm.confirm(eligible.len(), report.eligible_size_mb)
                {
                    return Err(Error::Cancelled);
                }
                self.archive(eligible, now, &mut report)?;
            }
        }

        match self.sweep(today) {
            Ok(sweep) => report.record_sweep(sweep),
            Err(err) => {
                log::error!("removing old archives failed: {err}");
                report.record_error(format!("sweep: {err}"));
            }
        }
        report.duration = start.elapsed();
        log::info!("{}", report.summary());
        Ok(report)
    }

    /// Expire old artifacts only.
    pub fn sweep(&self, today: Date) -> Result<SweepReport> {
        RetentionSweeper::new(self.layout(), self.config.retention.archive_months).sweep(today)
    }

    fn archive(
        &self,
        eligible: Vec<AccountRecord>,
        now: OffsetDateTime,
        report: &mut RunReport,
    ) -> Result<()> {
        std::fs::create_dir_all(&self.config.archive_root)?;

        let batches = ArchiveBatchPlanner::new(self.config.max_archive_size_mb).plan(eligible);
        log::info!("archiving in {} batches", batches.len());

        let pipeline = ArchivePipeline::new(self.layout(), RunStamp::from(now))
            .verbose(self.config.verbose);
        for (index, batch) in batches.iter().enumerate() {
            report.record_batch(pipeline.process(index, batch));
        }
        Ok(())
    }

    fn log_eligible(&self, eligible: &[AccountRecord], size_mb: f64) {
        if self.config.verbose {
            for account in eligible {
                log::info!(
                    "to archive: {} ({}) {:.3} MB at {}",
                    account.id,
                    account.display_name,
                    account.size_or_zero(),
                    account.path.display()
                );
            }
        }
        log::info!("size of archive before compression: {size_mb:.3} MB");
        log::info!("number of accounts to be archived: {}", eligible.len());
    }
}
