use std::fmt;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

/// Calendar month in which the financial year begins (April).
pub const FINANCIAL_YEAR_START_MONTH: u32 = 4;

/// A monthly pay period, written as `YYYY-MM`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PayPeriod {
    year: i32,
    month: u32,
}

impl PayPeriod {
    pub fn new(
        year: i32,
        month: u32,
    ) -> Option<Self> {
        if (1..=12).contains(&month) && NaiveDate::from_ymd_opt(year, month, 1).is_some() {
            Some(Self { year, month })
        } else {
            None
        }
    }

    /// Parses `YYYY-MM`.
    pub fn parse(s: &str) -> Option<Self> {
        let (year, month) = s.trim().split_once('-')?;
        if month.len() != 2 {
            return None;
        }
        Self::new(year.parse().ok()?, month.parse().ok()?)
    }

    pub fn containing(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    pub fn first_day(&self) -> NaiveDate {
        NaiveDate::from_ymd_opt(self.year, self.month, 1)
            .unwrap_or(NaiveDate::MIN)
    }

    pub fn last_day(&self) -> NaiveDate {
        self.next()
            .first_day()
            .pred_opt()
            .unwrap_or(NaiveDate::MAX)
    }

    pub fn days_in_month(&self) -> u32 {
        self.last_day().day()
    }

    pub fn next(&self) -> Self {
        if self.month == 12 {
            Self {
                year: self.year + 1,
                month: 1,
            }
        } else {
            Self {
                year: self.year,
                month: self.month + 1,
            }
        }
    }

    pub fn financial_year(&self) -> FinancialYear {
        if self.month >= FINANCIAL_YEAR_START_MONTH {
            FinancialYear::new(self.year)
        } else {
            FinancialYear::new(self.year - 1)
        }
    }

    /// Months left in the financial year, counting this one (April = 12, March = 1).
    pub fn months_remaining_in_financial_year(&self) -> u32 {
        let offset = (self.month + 12 - FINANCIAL_YEAR_START_MONTH) % 12;
        12 - offset
    }
}

impl fmt::Display for PayPeriod {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

/// An April-to-March financial year, identified by the calendar year it starts in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FinancialYear(i32);

impl FinancialYear {
    pub fn new(start_year: i32) -> Self {
        Self(start_year)
    }

    pub fn start_year(&self) -> i32 {
        self.0
    }

    pub fn first_period(&self) -> PayPeriod {
        PayPeriod {
            year: self.0,
            month: FINANCIAL_YEAR_START_MONTH,
        }
    }

    pub fn last_period(&self) -> PayPeriod {
        PayPeriod {
            year: self.0 + 1,
            month: FINANCIAL_YEAR_START_MONTH - 1,
        }
    }

    pub fn contains(
        &self,
        period: PayPeriod,
    ) -> bool {
        period.financial_year() == *self
    }
}

impl fmt::Display for FinancialYear {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "{}-{:02}", self.0, (self.0 + 1).rem_euclid(100))
    }
}
