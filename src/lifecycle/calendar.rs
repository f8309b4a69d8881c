//! Calendar-month arithmetic and the date text format used in manifests.

use time::macros::format_description;
use time::{Date, Month};

use crate::error::{Error, Result};

/// Add `months` calendar months to `date`, clamping the day to the last
/// valid day of the target month (Jan 31 + 1 month = Feb 28/29).
pub fn add_months(date: Date, months: u32) -> Result<Date> {
    let zero_based = date.month() as i64 - 1 + months as i64;
    let year = date.year() as i64 + zero_based.div_euclid(12);
    let month_number = (zero_based.rem_euclid(12) + 1) as u8;

    let year = i32::try_from(year)
        .map_err(|_| Error::InvalidDate(format!("{date} + {months} months overflows")))?;
    let month = Month::try_from(month_number)
        .map_err(|err| Error::InvalidDate(format!("month {month_number}: {err}")))?;
    let day = date.day().min(days_in_month(year, month));

    Date::from_calendar_date(year, month, day)
        .map_err(|err| Error::InvalidDate(format!("{date} + {months} months: {err}")))
}

/// Last day of a retention window, or `None` when it ends past the last
/// representable date.
pub fn retention_end(reference: Date, months: u32) -> Option<Date> {
    add_months(reference, months).ok()
}

/// True when `reference + months` is strictly after `today`. A window ending
/// today counts as expired; one ending beyond the calendar never expires.
pub fn within_retention(reference: Date, months: u32, today: Date) -> bool {
    match retention_end(reference, months) {
        Some(expires) => (expires - today).whole_days() > 0,
        None => true,
    }
}

pub fn days_in_month(year: i32, month: Month) -> u8 {
    match month {
        Month::February => {
            if time::util::is_leap_year(year) {
                29
            } else {
                28
            }
        }
        Month::April | Month::June | Month::September | Month::November => 30,
        _ => 31,
    }
}

pub fn format_date(date: Date) -> String {
    format!(
        "{:04}-{:02}-{:02}",
        date.year(),
        date.month() as u8,
        date.day()
    )
}

/// Parse `YYYY-MM-DD`.
pub fn parse_date(text: &str) -> Result<Date> {
    Date::parse(text, format_description!("[year]-[month]-[day]"))
        .map_err(|err| Error::InvalidDate(format!("{text}: {err}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(year: i32, month: Month, day: u8) -> Date {
        Date::from_calendar_date(year, month, day).unwrap()
    }

    #[test]
    fn test_add_months_clamps_day() {
        assert_eq!(
            add_months(date(2023, Month::January, 31), 1).unwrap(),
            date(2023, Month::February, 28)
        );
        assert_eq!(
            add_months(date(2024, Month::January, 31), 1).unwrap(),
            date(2024, Month::February, 29)
        );
        assert_eq!(
            add_months(date(2023, Month::March, 31), 1).unwrap(),
            date(2023, Month::April, 30)
        );
    }

    #[test]
    fn test_add_months_rolls_year() {
        assert_eq!(
            add_months(date(2023, Month::December, 15), 1).unwrap(),
            date(2024, Month::January, 15)
        );
        assert_eq!(
            add_months(date(2022, Month::February, 28), 24).unwrap(),
            date(2024, Month::February, 28)
        );
        assert_eq!(
            add_months(date(2020, Month::February, 29), 12).unwrap(),
            date(2021, Month::February, 28)
        );
        assert_eq!(
            add_months(date(2023, Month::May, 9), 0).unwrap(),
            date(2023, Month::May, 9)
        );
    }

    #[test]
    fn test_within_retention_boundary() {
        let today = date(2024, Month::June, 10);
        // Expires today: out of retention.
        assert!(!within_retention(date(2023, Month::June, 10), 12, today));
        // Expires tomorrow: still retained.
        assert!(within_retention(date(2023, Month::June, 11), 12, today));
        assert!(!within_retention(date(2023, Month::June, 9), 12, today));
    }

    #[test]
    fn test_add_months_out_of_range() {
        assert!(add_months(date(9999, Month::December, 1), 1).is_err());
    }

    #[test]
    fn test_window_past_calendar_end_never_expires() {
        let sentinel = date(9999, Month::December, 31);
        assert_eq!(retention_end(sentinel, 12), None);
        assert!(within_retention(sentinel, 12, date(2024, Month::June, 10)));
        assert_eq!(
            retention_end(date(9998, Month::December, 31), 12),
            Some(sentinel)
        );
    }

    #[test]
    fn test_date_text() {
        let d = date(2021, Month::March, 7);
        assert_eq!(format_date(d), "2021-03-07");
        assert_eq!(parse_date("2021-03-07").unwrap(), d);
        assert!(parse_date("03/07/21").is_err());
    }
}
