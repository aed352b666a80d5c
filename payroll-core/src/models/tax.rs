use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaxRegime {
    Old,
    New,
}

impl TaxRegime {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Old => "old",
            Self::New => "new",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "old" => Some(Self::Old),
            "new" => Some(Self::New),
            _ => None,
        }
    }

    /// Whether approved investment declarations reduce taxable income.
    pub fn allows_declarations(&self) -> bool {
        matches!(self, Self::Old)
    }
}

/// One progressive slab: income above `min_income` and up to `max_income`
/// is taxed at `rate`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxSlab {
    pub regime: TaxRegime,
    pub financial_year: i32,
    pub min_income: Decimal,
    pub max_income: Option<Decimal>,
    pub rate: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxRegimeConfig {
    pub regime: TaxRegime,
    pub financial_year: i32,
    pub standard_deduction: Decimal,
    pub rebate_income_limit: Decimal,
    pub rebate_max: Decimal,
    pub cess_rate: Decimal,
}

/// Provident-fund parameters, versioned by the date they take effect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatutoryRates {
    pub effective_from: NaiveDate,
    pub pf_wage_ceiling: Decimal,
    pub pf_employee_rate: Decimal,
    pub pf_employer_rate: Decimal,
}
