//! crates/for_me_core/src/calendar.rs
//!
//! Month grid generation for the calendar screen.

use chrono::{Datelike, Months, NaiveDate};
use serde::Serialize;

use crate::domain::DailyRecord;

/// A month being displayed, anchored on its first day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CalendarMonth {
    first: NaiveDate,
}

impl CalendarMonth {
    pub fn new(year: i32, month: u32) -> Option<Self> {
        NaiveDate::from_ymd_opt(year, month, 1).map(|first| Self { first })
    }

    pub fn containing(date: NaiveDate) -> Self {
        Self { first: date.with_day(1).unwrap_or(date) }
    }

    pub fn year(&self) -> i32 {
        self.first.year()
    }

    pub fn month(&self) -> u32 {
        self.first.month()
    }

    pub fn previous(&self) -> Self {
        Self { first: self.first.checked_sub_months(Months::new(1)).unwrap_or(self.first) }
    }

    pub fn next(&self) -> Self {
        Self { first: self.first.checked_add_months(Months::new(1)).unwrap_or(self.first) }
    }

    pub fn days_in_month(&self) -> u32 {
        let next = self.next().first;
        if next == self.first {
            // Only reachable at chrono's maximum date.
            return 31;
        }
        (next - self.first).num_days() as u32
    }

    /// Sunday-first grid: blanks before the first weekday, then each day, then
    /// blanks up to a whole number of weeks.
    pub fn grid(&self) -> Vec<Option<NaiveDate>> {
        let leading = self.first.weekday().num_days_from_sunday() as usize;
        let mut cells: Vec<Option<NaiveDate>> = vec![None; leading];
        cells.extend(self.first.iter_days().take(self.days_in_month() as usize).map(Some));
        while cells.len() % 7 != 0 {
            cells.push(None);
        }
        cells
    }
}

/// Convenience for `CalendarMonth::new(year, month).grid()`.
pub fn month_grid(year: i32, month: u32) -> Option<Vec<Option<NaiveDate>>> {
    CalendarMonth::new(year, month).map(|month| month.grid())
}

/// A day is marked when it has a score or at least one task.
pub fn has_marker(record: Option<&DailyRecord>) -> bool {
    record.is_some_and(DailyRecord::has_content)
}
