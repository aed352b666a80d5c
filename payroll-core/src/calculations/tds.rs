//! Monthly tax-deducted-at-source (TDS) worksheet.
//!
//! The annual liability is projected from the structure's taxable earnings
//! and spread evenly over the months left in the financial year, after
//! netting off what earlier runs of the year already withheld.
//!
//! # Worksheet Structure
//!
//! | Line | Description |
//! |------|-------------|
//! | 1    | Annual taxable gross |
//! | 2    | Standard deduction for the regime |
//! | 3    | Approved declarations, capped per section (old regime only) |
//! | 4    | Taxable income (Line 1 - Line 2 - Line 3, minimum 0) |
//! | 5    | Tax from progressive slabs |
//! | 6    | Rebate (up to the regime maximum when Line 4 is within the limit) |
//! | 7    | Cess on (Line 5 - Line 6) |
//! | 8    | Annual tax (Line 5 - Line 6 + Line 7) |
//! | 9    | Withheld earlier in the financial year |
//! | 10   | Remaining tax (Line 8 - Line 9, minimum 0) |
//! | 11   | Monthly TDS (Line 10 / months remaining) |
//!
//! # Example
//!
//! ```
//! use rust_decimal_macros::dec;
//! use payroll_core::calculations::{TdsInput, TdsWorksheet};
//! use payroll_core::{TaxRegime, TaxRegimeConfig, TaxSlab};
//!
//! let slab = |min, max, rate| TaxSlab {
//!     regime: TaxRegime::New,
//!     financial_year: 2025,
//!     min_income: min,
//!     max_income: max,
//!     rate,
//! };
//! let slabs = vec![
//!     slab(dec!(0), Some(dec!(400000)), dec!(0)),
//!     slab(dec!(400000), Some(dec!(800000)), dec!(0.05)),
//!     slab(dec!(800000), Some(dec!(1200000)), dec!(0.10)),
//!     slab(dec!(1200000), Some(dec!(1600000)), dec!(0.15)),
//!     slab(dec!(1600000), Some(dec!(2000000)), dec!(0.20)),
//!     slab(dec!(2000000), Some(dec!(2400000)), dec!(0.25)),
//!     slab(dec!(2400000), None, dec!(0.30)),
//! ];
//! let config = TaxRegimeConfig {
//!     regime: TaxRegime::New,
//!     financial_year: 2025,
//!     standard_deduction: dec!(75000),
//!     rebate_income_limit: dec!(1200000),
//!     rebate_max: dec!(60000),
//!     cess_rate: dec!(0.04),
//! };
//!
//! let worksheet = TdsWorksheet::new(&slabs, &config, &[], 0);
//! let result = worksheet
//!     .calculate(&TdsInput {
//!         annual_taxable_gross: dec!(1800000),
//!         declarations: Vec::new(),
//!         tds_withheld: dec!(0),
//!         months_remaining: 12,
//!     })
//!     .unwrap();
//!
//! assert_eq!(result.taxable_income, dec!(1725000));
//! assert_eq!(result.annual_tax, dec!(150800));
//! assert_eq!(result.monthly_tds, dec!(12567));
//! ```

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::calculations::common::{non_negative, round_half_up};
use crate::models::{DeclarationStatus, InvestmentDeclaration, InvestmentSection, TaxRegimeConfig, TaxSlab};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TdsError {
    #[error("no tax slabs provided")]
    NoTaxSlabs,

    #[error("tax slabs do not cover taxable income {0}")]
    IncomeNotCovered(Decimal),

    #[error("no months remain in the financial year")]
    NoMonthsRemaining,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TdsInput {
    pub annual_taxable_gross: Decimal,

    /// Declarations for the employee and financial year. Only approved ones count.
    pub declarations: Vec<InvestmentDeclaration>,

    /// TDS already deducted by earlier posted runs of the financial year.
    pub tds_withheld: Decimal,

    /// Months left in the financial year, counting the current one.
    pub months_remaining: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TdsResult {
    pub declaration_deduction: Decimal,
    pub taxable_income: Decimal,
    pub slab_tax: Decimal,
    pub rebate: Decimal,
    pub cess: Decimal,
    pub annual_tax: Decimal,
    pub remaining_tax: Decimal,
    pub monthly_tds: Decimal,
}

#[derive(Debug, Clone)]
pub struct TdsWorksheet<'a> {
    slabs: &'a [TaxSlab],
    config: &'a TaxRegimeConfig,
    sections: &'a [InvestmentSection],
    scale: u32,
}

impl<'a> TdsWorksheet<'a> {
    /// `slabs` must all belong to the regime and financial year of `config`.
    pub fn new(
        slabs: &'a [TaxSlab],
        config: &'a TaxRegimeConfig,
        sections: &'a [InvestmentSection],
        scale: u32,
    ) -> Self {
        Self {
            slabs,
            config,
            sections,
            scale,
        }
    }

    /// # Errors
    ///
    /// Returns [`TdsError`] if no slabs were provided, the slabs stop short of
    /// the taxable income, or `months_remaining` is zero.
    pub fn calculate(
        &self,
        input: &TdsInput,
    ) -> Result<TdsResult, TdsError> {
        if self.slabs.is_empty() {
            return Err(TdsError::NoTaxSlabs);
        }
        if input.months_remaining == 0 {
            return Err(TdsError::NoMonthsRemaining);
        }

        let declaration_deduction = self.declaration_deduction(&input.declarations);
        let taxable_income = self.taxable_income(input.annual_taxable_gross, declaration_deduction);
        let slab_tax = self.slab_tax(taxable_income)?;
        let rebate = self.rebate(taxable_income, slab_tax);
        let cess = self.cess(slab_tax - rebate);
        let annual_tax = round_half_up(slab_tax - rebate + cess, self.scale);
        let remaining_tax = non_negative(annual_tax - input.tds_withheld);
        let monthly_tds = self.monthly_tds(remaining_tax, input.months_remaining);

        Ok(TdsResult {
            declaration_deduction,
            taxable_income,
            slab_tax,
            rebate,
            cess,
            annual_tax,
            remaining_tax,
            monthly_tds,
        })
    }

    /// Sums approved amounts per section, then caps each section total.
    ///
    /// Declarations for sections not in the reference list are ignored.
    fn declaration_deduction(
        &self,
        declarations: &[InvestmentDeclaration],
    ) -> Decimal {
        if !self.config.regime.allows_declarations() {
            return Decimal::ZERO;
        }

        let mut per_section: BTreeMap<&str, Decimal> = BTreeMap::new();
        for declaration in declarations
            .iter()
            .filter(|d| d.status == DeclarationStatus::Approved)
            .filter(|d| d.financial_year == self.config.financial_year)
        {
            *per_section
                .entry(declaration.section_code.as_str())
                .or_default() += declaration.approved_amount;
        }

        per_section
            .into_iter()
            .filter_map(|(code, amount)| {
                let section = self.sections.iter().find(|s| s.code == code);
                if section.is_none() {
                    tracing::warn!(section = code, "ignoring declaration for unknown section");
                }
                section.map(|s| s.cap(amount))
            })
            .sum()
    }

    fn taxable_income(
        &self,
        annual_taxable_gross: Decimal,
        declaration_deduction: Decimal,
    ) -> Decimal {
        non_negative(annual_taxable_gross - self.config.standard_deduction - declaration_deduction)
    }

    /// Applies each slab's rate to the part of income that falls inside it.
    fn slab_tax(
        &self,
        taxable_income: Decimal,
    ) -> Result<Decimal, TdsError> {
        if taxable_income.is_zero() {
            return Ok(Decimal::ZERO);
        }

        let mut slabs: Vec<&TaxSlab> = self.slabs.iter().collect();
        slabs.sort_by_key(|s| s.min_income);

        let covered = slabs
            .iter()
            .any(|s| s.max_income.is_none_or(|max| taxable_income <= max));
        if !covered {
            return Err(TdsError::IncomeNotCovered(taxable_income));
        }

        let tax = slabs
            .iter()
            .map(|s| {
                let upper = s.max_income.map_or(taxable_income, |max| taxable_income.min(max));
                non_negative(upper - s.min_income) * s.rate
            })
            .sum();

        Ok(tax)
    }

    fn rebate(
        &self,
        taxable_income: Decimal,
        slab_tax: Decimal,
    ) -> Decimal {
        if taxable_income <= self.config.rebate_income_limit {
            slab_tax.min(self.config.rebate_max)
        } else {
            Decimal::ZERO
        }
    }

    fn cess(
        &self,
        tax_after_rebate: Decimal,
    ) -> Decimal {
        tax_after_rebate * self.config.cess_rate
    }

    fn monthly_tds(
        &self,
        remaining_tax: Decimal,
        months_remaining: u32,
    ) -> Decimal {
        non_negative(round_half_up(
            remaining_tax / Decimal::from(months_remaining),
            self.scale,
        ))
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use pretty_assertions::assert_eq;
    use rust_decimal_macros::dec;

    use super::*;
    use crate::models::TaxRegime;

    fn slab(
        regime: TaxRegime,
        min: Decimal,
        max: Option<Decimal>,
        rate: Decimal,
    ) -> TaxSlab {
        TaxSlab {
            regime,
            financial_year: 2025,
            min_income: min,
            max_income: max,
            rate,
        }
    }

    fn new_regime_slabs() -> Vec<TaxSlab> {
        let r = TaxRegime::New;
        vec![
            slab(r, dec!(0), Some(dec!(400000)), dec!(0)),
            slab(r, dec!(400000), Some(dec!(800000)), dec!(0.05)),
            slab(r, dec!(800000), Some(dec!(1200000)), dec!(0.10)),
            slab(r, dec!(1200000), Some(dec!(1600000)), dec!(0.15)),
            slab(r, dec!(1600000), Some(dec!(2000000)), dec!(0.20)),
            slab(r, dec!(2000000), Some(dec!(2400000)), dec!(0.25)),
            slab(r, dec!(2400000), None, dec!(0.30)),
        ]
    }

    fn old_regime_slabs() -> Vec<TaxSlab> {
        let r = TaxRegime::Old;
        vec![
            slab(r, dec!(0), Some(dec!(250000)), dec!(0)),
            slab(r, dec!(250000), Some(dec!(500000)), dec!(0.05)),
            slab(r, dec!(500000), Some(dec!(1000000)), dec!(0.20)),
            slab(r, dec!(1000000), None, dec!(0.30)),
        ]
    }

    fn new_regime_config() -> TaxRegimeConfig {
        TaxRegimeConfig {
            regime: TaxRegime::New,
            financial_year: 2025,
            standard_deduction: dec!(75000),
            rebate_income_limit: dec!(1200000),
            rebate_max: dec!(60000),
            cess_rate: dec!(0.04),
        }
    }

    fn old_regime_config() -> TaxRegimeConfig {
        TaxRegimeConfig {
            regime: TaxRegime::Old,
            financial_year: 2025,
            standard_deduction: dec!(50000),
            rebate_income_limit: dec!(500000),
            rebate_max: dec!(12500),
            cess_rate: dec!(0.04),
        }
    }

    fn sections() -> Vec<InvestmentSection> {
        vec![
            InvestmentSection {
                code: "80C".to_string(),
                description: "Life insurance, PPF, ELSS".to_string(),
                max_amount: dec!(150000),
            },
            InvestmentSection {
                code: "80D".to_string(),
                description: "Health insurance".to_string(),
                max_amount: dec!(25000),
            },
            InvestmentSection {
                code: "80G".to_string(),
                description: "Donations".to_string(),
                max_amount: dec!(0),
            },
        ]
    }

    fn declaration(
        section: &str,
        declared: Decimal,
        approved: Decimal,
        status: DeclarationStatus,
    ) -> InvestmentDeclaration {
        let at = Utc.with_ymd_and_hms(2025, 5, 1, 0, 0, 0).unwrap();
        InvestmentDeclaration {
            id: 1,
            employee_id: 1,
            financial_year: 2025,
            section_code: section.to_string(),
            declared_amount: declared,
            approved_amount: approved,
            status,
            reviewed_by: None,
            created_at: at,
            updated_at: at,
        }
    }

    fn input(annual_taxable_gross: Decimal) -> TdsInput {
        TdsInput {
            annual_taxable_gross,
            declarations: Vec::new(),
            tds_withheld: dec!(0),
            months_remaining: 12,
        }
    }

    // =========================================================================
    // New regime tests
    // =========================================================================

    #[test]
    fn new_regime_rebate_zeroes_tax_within_limit() {
        let slabs = new_regime_slabs();
        let config = new_regime_config();
        let worksheet = TdsWorksheet::new(&slabs, &config, &[], 0);

        let result = worksheet.calculate(&input(dec!(1200000))).unwrap();

        assert_eq!(result.taxable_income, dec!(1125000));
        assert_eq!(result.slab_tax, dec!(52500));
        assert_eq!(result.rebate, dec!(52500));
        assert_eq!(result.annual_tax, dec!(0));
        assert_eq!(result.monthly_tds, dec!(0));
    }

    #[test]
    fn new_regime_above_rebate_limit() {
        let slabs = new_regime_slabs();
        let config = new_regime_config();
        let worksheet = TdsWorksheet::new(&slabs, &config, &[], 0);

        let result = worksheet.calculate(&input(dec!(1800000))).unwrap();

        assert_eq!(result.slab_tax, dec!(145000));
        assert_eq!(result.rebate, dec!(0));
        assert_eq!(result.cess, dec!(5800));
        assert_eq!(result.annual_tax, dec!(150800));
        assert_eq!(result.monthly_tds, dec!(12567));
    }

    #[test]
    fn new_regime_ignores_declarations() {
        let slabs = new_regime_slabs();
        let config = new_regime_config();
        let sections = sections();
        let worksheet = TdsWorksheet::new(&slabs, &config, &sections, 0);
        let mut input = input(dec!(1800000));
        input.declarations = vec![declaration(
            "80C",
            dec!(150000),
            dec!(150000),
            DeclarationStatus::Approved,
        )];

        let result = worksheet.calculate(&input).unwrap();

        assert_eq!(result.declaration_deduction, dec!(0));
        assert_eq!(result.taxable_income, dec!(1725000));
    }

    #[test]
    fn top_slab_is_open_ended() {
        let slabs = new_regime_slabs();
        let config = new_regime_config();
        let worksheet = TdsWorksheet::new(&slabs, &config, &[], 0);

        let result = worksheet.calculate(&input(dec!(3075000))).unwrap();

        // 20000 + 40000 + 60000 + 80000 + 100000 + 30% of 600000
        assert_eq!(result.slab_tax, dec!(480000));
    }

    // =========================================================================
    // Old regime tests
    // =========================================================================

    #[test]
    fn old_regime_caps_section_80c() {
        let slabs = old_regime_slabs();
        let config = old_regime_config();
        let sections = sections();
        let worksheet = TdsWorksheet::new(&slabs, &config, &sections, 0);
        let mut input = input(dec!(1200000));
        input.declarations = vec![
            declaration("80C", dec!(120000), dec!(120000), DeclarationStatus::Approved),
            declaration("80C", dec!(80000), dec!(80000), DeclarationStatus::Approved),
        ];

        let result = worksheet.calculate(&input).unwrap();

        assert_eq!(result.declaration_deduction, dec!(150000));
        assert_eq!(result.taxable_income, dec!(1000000));
        assert_eq!(result.slab_tax, dec!(112500));
        assert_eq!(result.annual_tax, dec!(117000));
        assert_eq!(result.monthly_tds, dec!(9750));
    }

    #[test]
    fn old_regime_counts_only_approved_declarations() {
        let slabs = old_regime_slabs();
        let config = old_regime_config();
        let sections = sections();
        let worksheet = TdsWorksheet::new(&slabs, &config, &sections, 0);
        let mut input = input(dec!(1200000));
        input.declarations = vec![
            declaration("80C", dec!(100000), dec!(0), DeclarationStatus::Submitted),
            declaration("80D", dec!(20000), dec!(0), DeclarationStatus::Rejected),
            declaration("80D", dec!(30000), dec!(25000), DeclarationStatus::Approved),
        ];

        let result = worksheet.calculate(&input).unwrap();

        assert_eq!(result.declaration_deduction, dec!(25000));
    }

    #[test]
    fn uncapped_section_counts_in_full() {
        let slabs = old_regime_slabs();
        let config = old_regime_config();
        let sections = sections();
        let worksheet = TdsWorksheet::new(&slabs, &config, &sections, 0);
        let mut input = input(dec!(1200000));
        input.declarations = vec![declaration(
            "80G",
            dec!(400000),
            dec!(400000),
            DeclarationStatus::Approved,
        )];

        let result = worksheet.calculate(&input).unwrap();

        assert_eq!(result.declaration_deduction, dec!(400000));
    }

    #[test]
    fn unknown_section_is_ignored() {
        let slabs = old_regime_slabs();
        let config = old_regime_config();
        let sections = sections();
        let worksheet = TdsWorksheet::new(&slabs, &config, &sections, 0);
        let mut input = input(dec!(1200000));
        input.declarations = vec![declaration(
            "99Z",
            dec!(50000),
            dec!(50000),
            DeclarationStatus::Approved,
        )];

        let result = worksheet.calculate(&input).unwrap();

        assert_eq!(result.declaration_deduction, dec!(0));
    }

    #[test]
    fn old_regime_rebate_within_limit() {
        let slabs = old_regime_slabs();
        let config = old_regime_config();
        let worksheet = TdsWorksheet::new(&slabs, &config, &[], 0);

        let result = worksheet.calculate(&input(dec!(550000))).unwrap();

        assert_eq!(result.taxable_income, dec!(500000));
        assert_eq!(result.slab_tax, dec!(12500));
        assert_eq!(result.rebate, dec!(12500));
        assert_eq!(result.annual_tax, dec!(0));
    }

    // =========================================================================
    // Withholding tests
    // =========================================================================

    #[test]
    fn withheld_tax_is_spread_over_remaining_months() {
        let slabs = new_regime_slabs();
        let config = new_regime_config();
        let worksheet = TdsWorksheet::new(&slabs, &config, &[], 0);
        let mut input = input(dec!(1800000));
        input.tds_withheld = dec!(62835);
        input.months_remaining = 7;

        let result = worksheet.calculate(&input).unwrap();

        assert_eq!(result.remaining_tax, dec!(87965));
        assert_eq!(result.monthly_tds, dec!(12566));
    }

    #[test]
    fn over_withholding_clamps_to_zero() {
        let slabs = new_regime_slabs();
        let config = new_regime_config();
        let worksheet = TdsWorksheet::new(&slabs, &config, &[], 0);
        let mut input = input(dec!(1800000));
        input.tds_withheld = dec!(200000);
        input.months_remaining = 1;

        let result = worksheet.calculate(&input).unwrap();

        assert_eq!(result.remaining_tax, dec!(0));
        assert_eq!(result.monthly_tds, dec!(0));
    }

    #[test]
    fn income_below_standard_deduction_has_no_tax() {
        let slabs = new_regime_slabs();
        let config = new_regime_config();
        let worksheet = TdsWorksheet::new(&slabs, &config, &[], 0);

        let result = worksheet.calculate(&input(dec!(60000))).unwrap();

        assert_eq!(result.taxable_income, dec!(0));
        assert_eq!(result.monthly_tds, dec!(0));
    }

    // =========================================================================
    // Error tests
    // =========================================================================

    #[test]
    fn no_slabs_is_an_error() {
        let config = new_regime_config();
        let worksheet = TdsWorksheet::new(&[], &config, &[], 0);

        assert_eq!(
            worksheet.calculate(&input(dec!(1000000))),
            Err(TdsError::NoTaxSlabs)
        );
    }

    #[test]
    fn slabs_not_covering_income_is_an_error() {
        let mut slabs = new_regime_slabs();
        slabs.pop();
        let config = new_regime_config();
        let worksheet = TdsWorksheet::new(&slabs, &config, &[], 0);

        assert_eq!(
            worksheet.calculate(&input(dec!(3075000))),
            Err(TdsError::IncomeNotCovered(dec!(3000000)))
        );
    }

    #[test]
    fn zero_months_remaining_is_an_error() {
        let slabs = new_regime_slabs();
        let config = new_regime_config();
        let worksheet = TdsWorksheet::new(&slabs, &config, &[], 0);
        let mut input = input(dec!(1000000));
        input.months_remaining = 0;

        assert_eq!(worksheet.calculate(&input), Err(TdsError::NoMonthsRemaining));
    }
}
