use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::TaxRegime;

/// Amounts that roll up into run totals.
pub trait PayrollAmounts {
    fn gross_earnings(&self) -> Decimal;
    fn total_deductions(&self) -> Decimal;
    fn net_pay(&self) -> Decimal;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayrollEntry {
    pub id: i64,
    pub run_id: i64,
    pub employee_id: i64,
    pub regime: TaxRegime,
    pub annual_ctc: Decimal,
    pub working_days: i64,
    pub paid_days: Decimal,
    pub lwp_days: Decimal,
    pub lwp_deduction: Decimal,
    /// Monthly earnings after loss-of-pay.
    pub gross_earnings: Decimal,
    pub pf_employee: Decimal,
    pub pf_employer: Decimal,
    /// Deduction components of the compensation structure for the month.
    pub other_deductions: Decimal,
    pub tds_amount: Decimal,
    pub tds_overridden: bool,
    pub total_deductions: Decimal,
    pub net_pay: Decimal,
}

impl PayrollEntry {
    /// Replaces the TDS figure and rebalances deductions and net pay.
    pub fn with_tds_override(
        mut self,
        tds_amount: Decimal,
    ) -> Self {
        self.tds_amount = tds_amount;
        self.tds_overridden = true;
        self.total_deductions = self.pf_employee + self.other_deductions + tds_amount;
        self.net_pay = self.gross_earnings - self.total_deductions;
        self
    }
}

impl PayrollAmounts for PayrollEntry {
    fn gross_earnings(&self) -> Decimal {
        self.gross_earnings
    }

    fn total_deductions(&self) -> Decimal {
        self.total_deductions
    }

    fn net_pay(&self) -> Decimal {
        self.net_pay
    }
}

/// A computed entry not yet attached to a stored run row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPayrollEntry {
    pub employee_id: i64,
    pub regime: TaxRegime,
    pub annual_ctc: Decimal,
    pub working_days: i64,
    pub paid_days: Decimal,
    pub lwp_days: Decimal,
    pub lwp_deduction: Decimal,
    pub gross_earnings: Decimal,
    pub pf_employee: Decimal,
    pub pf_employer: Decimal,
    pub other_deductions: Decimal,
    pub tds_amount: Decimal,
    pub total_deductions: Decimal,
    pub net_pay: Decimal,
}

impl NewPayrollEntry {
    pub fn into_entry(
        self,
        id: i64,
        run_id: i64,
    ) -> PayrollEntry {
        PayrollEntry {
            id,
            run_id,
            employee_id: self.employee_id,
            regime: self.regime,
            annual_ctc: self.annual_ctc,
            working_days: self.working_days,
            paid_days: self.paid_days,
            lwp_days: self.lwp_days,
            lwp_deduction: self.lwp_deduction,
            gross_earnings: self.gross_earnings,
            pf_employee: self.pf_employee,
            pf_employer: self.pf_employer,
            other_deductions: self.other_deductions,
            tds_amount: self.tds_amount,
            tds_overridden: false,
            total_deductions: self.total_deductions,
            net_pay: self.net_pay,
        }
    }
}

impl PayrollAmounts for NewPayrollEntry {
    fn gross_earnings(&self) -> Decimal {
        self.gross_earnings
    }

    fn total_deductions(&self) -> Decimal {
        self.total_deductions
    }

    fn net_pay(&self) -> Decimal {
        self.net_pay
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rust_decimal_macros::dec;

    use super::*;
    use crate::models::RunTotals;

    fn entry(
        employee_id: i64,
        gross: Decimal,
        pf: Decimal,
        tds: Decimal,
    ) -> NewPayrollEntry {
        NewPayrollEntry {
            employee_id,
            regime: TaxRegime::New,
            annual_ctc: gross * dec!(12),
            working_days: 22,
            paid_days: dec!(22),
            lwp_days: dec!(0),
            lwp_deduction: dec!(0),
            gross_earnings: gross,
            pf_employee: pf,
            pf_employer: pf,
            other_deductions: dec!(0),
            tds_amount: tds,
            total_deductions: pf + tds,
            net_pay: gross - pf - tds,
        }
    }

    #[test]
    fn totals_are_exact_sums() {
        let entries = vec![
            entry(1, dec!(100000), dec!(1800), dec!(7500)),
            entry(2, dec!(45000.50), dec!(1800), dec!(0)),
            entry(3, dec!(62000.25), dec!(1500.03), dec!(1200.10)),
        ];

        let totals = RunTotals::from_entries(&entries);

        assert_eq!(totals.employee_count, 3);
        assert_eq!(totals.total_gross, dec!(207000.75));
        assert_eq!(totals.total_deductions, dec!(13800.13));
        assert_eq!(totals.total_net, dec!(193200.62));
        assert!(totals.is_balanced());
    }

    #[test]
    fn totals_of_no_entries_are_zero() {
        let entries: Vec<NewPayrollEntry> = Vec::new();

        let totals = RunTotals::from_entries(&entries);

        assert_eq!(totals, RunTotals::default());
        assert!(totals.is_balanced());
    }

    #[test]
    fn tds_override_rebalances_entry() {
        let stored = entry(1, dec!(100000), dec!(1800), dec!(7500)).into_entry(10, 5);

        let edited = stored.with_tds_override(dec!(5000));

        assert_eq!(edited.tds_amount, dec!(5000));
        assert!(edited.tds_overridden);
        assert_eq!(edited.total_deductions, dec!(6800));
        assert_eq!(edited.net_pay, dec!(93200));
    }

    #[test]
    fn tds_override_keeps_other_deductions() {
        let mut computed = entry(1, dec!(50000), dec!(1800), dec!(0));
        computed.other_deductions = dec!(200);
        computed.total_deductions = dec!(2000);
        computed.net_pay = dec!(48000);

        let edited = computed.into_entry(11, 5).with_tds_override(dec!(1000));

        assert_eq!(edited.total_deductions, dec!(3000));
        assert_eq!(edited.net_pay, dec!(47000));
    }
}
