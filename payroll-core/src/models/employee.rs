use chrono::{Datelike, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};

use super::TaxRegime;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Organization {
    pub id: i64,
    pub name: String,
    pub default_regime: TaxRegime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkWeekPolicy {
    FiveDay,
    SixDay,
}

impl WorkWeekPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FiveDay => "five_day",
            Self::SixDay => "six_day",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "five_day" => Some(Self::FiveDay),
            "six_day" => Some(Self::SixDay),
            _ => None,
        }
    }

    pub fn is_working_day(
        &self,
        date: NaiveDate,
    ) -> bool {
        match (self, date.weekday()) {
            (_, Weekday::Sun) => false,
            (Self::FiveDay, Weekday::Sat) => false,
            _ => true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Employee {
    pub id: i64,
    pub organization_id: i64,
    pub full_name: String,
    pub department: Option<String>,
    pub job_title: Option<String>,
    pub work_week: WorkWeekPolicy,
    pub join_date: NaiveDate,
    pub exit_date: Option<NaiveDate>,
    /// Elected regime; `None` falls back to the organization default.
    pub tax_regime: Option<TaxRegime>,
    pub is_active: bool,
}

/// For adding employees to the directory (no id)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewEmployee {
    pub organization_id: i64,
    pub full_name: String,
    pub department: Option<String>,
    pub job_title: Option<String>,
    pub work_week: WorkWeekPolicy,
    pub join_date: NaiveDate,
    pub exit_date: Option<NaiveDate>,
    pub tax_regime: Option<TaxRegime>,
}

impl Employee {
    /// The regime TDS is computed under: the employee's election, else the
    /// organization default.
    pub fn effective_regime(
        &self,
        organization: &Organization,
    ) -> TaxRegime {
        self.tax_regime.unwrap_or(organization.default_regime)
    }

    pub fn is_employed_on(
        &self,
        date: NaiveDate,
    ) -> bool {
        date >= self.join_date && self.exit_date.is_none_or(|exit| date <= exit)
    }
}
