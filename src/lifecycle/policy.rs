//! Retention decision: keep an account's data or select it for archival.

use time::Date;

use crate::account::{AccountRecord, ActiveStatus, Decision, Enrollment};
use crate::config::RetentionWindows;
use crate::lifecycle::calendar::within_retention;

/// Evaluates keep/delete for account records against a fixed `today`.
#[derive(Debug, Clone, Copy)]
pub struct RetentionPolicy {
    windows: RetentionWindows,
    today: Date,
}

impl RetentionPolicy {
    pub fn new(windows: RetentionWindows, today: Date) -> Self {
        Self { windows, today }
    }

    /// `true` keeps the account's data, `false` selects it for archival.
    pub fn keep(&self, record: &AccountRecord) -> bool {
        match record.enrollment {
            Enrollment::Enrolled => true,
            Enrollment::Unknown if record.active_status == ActiveStatus::Inactive => false,
            Enrollment::Unknown | Enrollment::NotEnrolled => self.keep_by_expiration(record),
        }
    }

    pub fn decide(&self, record: &AccountRecord) -> Decision {
        Decision::from_keep(self.keep(record))
    }

    /// Record the decision on every account that has none yet.
    pub fn apply(&self, records: &mut [AccountRecord]) -> usize {
        let mut eligible = 0;
        for record in records.iter_mut() {
            let decision = match record.decision {
                Some(decision) => decision,
                None => {
                    let decision = self.decide(record);
                    record.decision = Some(decision);
                    decision
                }
            };
            if decision == Decision::Delete {
                eligible += 1;
            }
        }
        eligible
    }

    fn keep_by_expiration(&self, record: &AccountRecord) -> bool {
        let expiration_months = self.windows.after_expiration_months;
        match (record.student_expiration, record.employee_expiration) {
            (None, None) => within_retention(
                record.modified,
                self.windows.after_access_months,
                self.today,
            ),
            (None, Some(employee)) => within_retention(employee, expiration_months, self.today),
            (Some(student), employee) => {
                if within_retention(student, expiration_months, self.today) {
                    return true;
                }
                match employee {
                    Some(employee) => within_retention(employee, expiration_months, self.today),
                    None => false,
                }
            }
        }
    }
}
