use chrono::{Datelike, Duration, Months, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};

use crate::errors::{BillingError, Result};

/// the month/year a statement cycle closes in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillingCycle {
    pub month: u32,
    pub year: i32,
}

impl BillingCycle {
    /// the cycle one month later, rolling the year over December
    pub fn next(self) -> Self {
        if self.month == 12 {
            BillingCycle { month: 1, year: self.year + 1 }
        } else {
            BillingCycle { month: self.month + 1, year: self.year }
        }
    }
}

/// which cycle a purchase on `date` accrues into
///
/// purchases on or after the closing day belong to the next month's
/// statement.
pub fn cycle_of(closing_day: u8, date: NaiveDate) -> BillingCycle {
    let cycle = BillingCycle { month: date.month(), year: date.year() };

    if date.day() < u32::from(closing_day) {
        cycle
    } else {
        cycle.next()
    }
}

/// the date a cycle's statement closes
///
/// the closing day is clamped to the cycle month's length, so a card
/// closing on the 31st closes February's statement on the 28th/29th.
pub fn cycle_closing_date(cycle: BillingCycle, closing_day: u8) -> Result<NaiveDate> {
    let day = u32::from(closing_day).min(days_in_month(cycle.year, cycle.month));

    NaiveDate::from_ymd_opt(cycle.year, cycle.month, day).ok_or_else(|| BillingError::InvalidDate {
        message: format!("no closing date for {}-{:02}-{:02}", cycle.year, cycle.month, day),
    })
}

/// the date a cycle's statement is due, rolled forward off weekends
///
/// a due day earlier than the closing day means payment falls in the month
/// after the statement closes.
pub fn cycle_due_date(cycle: BillingCycle, closing_day: u8, due_day: u8) -> Result<NaiveDate> {
    let due_cycle = if due_day < closing_day { cycle.next() } else { cycle };
    let day = u32::from(due_day).min(days_in_month(due_cycle.year, due_cycle.month));

    let due = NaiveDate::from_ymd_opt(due_cycle.year, due_cycle.month, day).ok_or_else(|| {
        BillingError::InvalidDate {
            message: format!("no due date for {}-{:02}-{:02}", due_cycle.year, due_cycle.month, day),
        }
    })?;

    Ok(next_business_day(due))
}

/// the next weekday on or after `date`
pub fn next_business_day(date: NaiveDate) -> NaiveDate {
    match date.weekday() {
        Weekday::Sat => date + Duration::days(2),
        Weekday::Sun => date + Duration::days(1),
        _ => date,
    }
}

/// anchor date locating the cycle after the one closing on `closing_date`
///
/// one month forward, one day back: the day before the next closing always
/// maps into the next cycle, even when month lengths clamp the closing day.
pub fn next_cycle_anchor(closing_date: NaiveDate) -> Result<NaiveDate> {
    closing_date
        .checked_add_months(Months::new(1))
        .map(|d| d - Duration::days(1))
        .ok_or_else(|| BillingError::InvalidDate {
            message: format!("no month after {closing_date}"),
        })
}

fn days_in_month(year: i32, month: u32) -> u32 {
    match month {
        1 | 3 | 5 | 7 | 8 | 10 | 12 => 31,
        4 | 6 | 9 | 11 => 30,
        2 if is_leap_year(year) => 29,
        _ => 28,
    }
}

fn is_leap_year(year: i32) -> bool {
    (year % 4 == 0 && year % 100 != 0) || (year % 400 == 0)
}
