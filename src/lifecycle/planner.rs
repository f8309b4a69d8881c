//! Greedy partition of eligible accounts into size-bounded batches.

use crate::account::AccountRecord;

/// Accounts archived together into one artifact.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ArchiveBatch {
    pub accounts: Vec<AccountRecord>,
    pub size_mb: f64,
}

impl ArchiveBatch {
    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    fn push(&mut self, account: AccountRecord) {
        self.size_mb += account.size_or_zero();
        self.accounts.push(account);
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ArchiveBatchPlanner {
    max_batch_mb: f64,
}

impl ArchiveBatchPlanner {
    pub fn new(max_batch_mb: f64) -> Self {
        Self { max_batch_mb }
    }

    /// Stream `accounts` in order, closing a batch as soon as its running
    /// size reaches the maximum. A non-empty trailing batch is always kept.
    pub fn plan<I>(&self, accounts: I) -> Vec<ArchiveBatch>
    where
        I: IntoIterator<Item = AccountRecord>,
    {
        let mut batches = Vec::new();
        let mut current = ArchiveBatch::default();
        for account in accounts {
            current.push(account);
            if current.size_mb >= self.max_batch_mb {
                batches.push(std::mem::take(&mut current));
            }
        }
        if !current.is_empty() {
            batches.push(current);
        }
        batches
    }
}
