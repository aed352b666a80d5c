//! Provident-fund contributions.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::calculations::common::{non_negative, round_half_up};
use crate::models::StatutoryRates;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StatutoryError {
    #[error("no statutory rates in effect on {0}")]
    NoRatesInEffect(NaiveDate),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatutoryDeductions {
    pub pf_employee: Decimal,
    pub pf_employer: Decimal,
}

/// Picks the rate version with the latest `effective_from` on or before `as_of`.
pub fn rates_in_effect(
    versions: &[StatutoryRates],
    as_of: NaiveDate,
) -> Result<&StatutoryRates, StatutoryError> {
    versions
        .iter()
        .filter(|r| r.effective_from <= as_of)
        .max_by_key(|r| r.effective_from)
        .ok_or(StatutoryError::NoRatesInEffect(as_of))
}

#[derive(Debug, Clone)]
pub struct StatutoryCalculator<'a> {
    rates: &'a StatutoryRates,
    scale: u32,
}

impl<'a> StatutoryCalculator<'a> {
    pub fn new(
        rates: &'a StatutoryRates,
        scale: u32,
    ) -> Self {
        Self { rates, scale }
    }

    /// Computes both PF contributions on the month's earned basic.
    pub fn compute(
        &self,
        basic_monthly: Decimal,
    ) -> StatutoryDeductions {
        let wage = self.pf_wage(basic_monthly);

        StatutoryDeductions {
            pf_employee: round_half_up(wage * self.rates.pf_employee_rate, self.scale),
            pf_employer: round_half_up(wage * self.rates.pf_employer_rate, self.scale),
        }
    }

    fn pf_wage(
        &self,
        basic_monthly: Decimal,
    ) -> Decimal {
        non_negative(basic_monthly).min(self.rates.pf_wage_ceiling)
    }
}
