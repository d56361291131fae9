//! Month windows for date-range pagination

use chrono::{Datelike, Months, NaiveDate};

use crate::error::{IngestError, Result};

/// Date format used by the API and by `DATE_INIT`
pub const DATE_FORMAT: &str = "%d/%m/%Y";

/// One calendar month, both ends inclusive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateWindow {
    /// Window covering the month that starts at `start`
    pub fn for_month(start: NaiveDate) -> Self {
        Self {
            start,
            end: month_end(start),
        }
    }

    pub fn start_param(&self) -> String {
        self.start.format(DATE_FORMAT).to_string()
    }

    pub fn end_param(&self) -> String {
        self.end.format(DATE_FORMAT).to_string()
    }
}

/// Parse a dd/mm/yyyy date
pub fn parse_start_date(value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), DATE_FORMAT)
        .map_err(|_| IngestError::InvalidDate(value.to_string()))
}

/// First day of every month from `start`'s month through `today`, ascending
pub fn month_starts(start: NaiveDate, today: NaiveDate) -> Vec<NaiveDate> {
    let mut starts = Vec::new();
    let Some(mut current) = NaiveDate::from_ymd_opt(start.year(), start.month(), 1) else {
        return starts;
    };

    while current <= today {
        starts.push(current);
        match current.checked_add_months(Months::new(1)) {
            Some(next) => current = next,
            None => break,
        }
    }

    starts
}

/// Last calendar day of `date`'s month
pub fn month_end(date: NaiveDate) -> NaiveDate {
    NaiveDate::from_ymd_opt(date.year(), date.month(), 1)
        .and_then(|first| first.checked_add_months(Months::new(1)))
        .and_then(|next| next.pred_opt())
        .unwrap_or(date)
}

/// Month-start dates from `start` (dd/mm/yyyy) through `today`, formatted dd/mm/yyyy
pub fn generate_date_range(start: &str, today: NaiveDate) -> Result<Vec<String>> {
    let start = parse_start_date(start)?;
    Ok(month_starts(start, today)
        .into_iter()
        .map(|d| d.format(DATE_FORMAT).to_string())
        .collect())
}

/// Month windows from `start` (dd/mm/yyyy) through `today`
pub fn month_windows(start: &str, today: NaiveDate) -> Result<Vec<DateWindow>> {
    let start = parse_start_date(start)?;
    Ok(month_starts(start, today)
        .into_iter()
        .map(DateWindow::for_month)
        .collect())
}
