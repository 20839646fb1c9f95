use crate::error::{ExtractError, Result};
use chrono::{Days, NaiveDate};

pub const DEFAULT_DAYS_BEFORE: u32 = 5;
pub const DEFAULT_DAYS_AFTER: u32 = 0;

/// Inclusive day window around an event date
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtractionWindow {
    pub days_before: u32,
    pub days_after: u32,
}

impl ExtractionWindow {
    pub fn new(days_before: u32, days_after: u32) -> Self {
        Self {
            days_before,
            days_after,
        }
    }

    /// Checked constructor for signed user input
    pub fn try_new(days_before: i64, days_after: i64) -> Result<Self> {
        match (u32::try_from(days_before), u32::try_from(days_after)) {
            (Ok(before), Ok(after)) => Ok(Self::new(before, after)),
            _ => Err(ExtractError::InvalidWindow {
                days_before,
                days_after,
            }),
        }
    }

    /// Closed interval `[event - days_before, event + days_after]`.
    ///
    /// Saturates at the calendar limits instead of failing.
    pub fn bounds(&self, event_date: NaiveDate) -> (NaiveDate, NaiveDate) {
        let start = event_date
            .checked_sub_days(Days::new(u64::from(self.days_before)))
            .unwrap_or(NaiveDate::MIN);
        let end = event_date
            .checked_add_days(Days::new(u64::from(self.days_after)))
            .unwrap_or(NaiveDate::MAX);
        (start, end)
    }

    pub fn contains(&self, event_date: NaiveDate, date: NaiveDate) -> bool {
        let (start, end) = self.bounds(event_date);
        start <= date && date <= end
    }
}

impl Default for ExtractionWindow {
    fn default() -> Self {
        Self::new(DEFAULT_DAYS_BEFORE, DEFAULT_DAYS_AFTER)
    }
}
