//! Plain-text rendering of engine results for the terminal.

use std::fmt::Write;

use payroll_core::{
    CompensationStructure, GenerationIssue, InvestmentDeclaration, PayrollEntry, PayrollRun,
    RunSnapshot,
};

fn who(user: &Option<String>) -> &str {
    user.as_deref().unwrap_or("-")
}

pub fn run_summary(run: &PayrollRun) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "run {} ({})", run.id, run.pay_period);
    let _ = writeln!(out, "  status       {}", run.status);
    let _ = writeln!(
        out,
        "  employees    {} paid, {} skipped",
        run.employee_count, run.skipped_count
    );
    let _ = writeln!(out, "  gross        {}", run.total_gross);
    let _ = writeln!(out, "  deductions   {}", run.total_deductions);
    let _ = writeln!(out, "  net          {}", run.total_net);
    let _ = writeln!(out, "  created by   {} at {}", run.created_by, run.created_at);
    let _ = writeln!(out, "  reviewed by  {}", who(&run.reviewed_by));
    let _ = writeln!(out, "  approved by  {}", who(&run.approved_by));
    let _ = writeln!(out, "  locked by    {}", who(&run.locked_by));
    out
}

pub fn run_table(runs: &[PayrollRun]) -> String {
    let mut out = format!(
        "{:>6}  {:<8}  {:<12}  {:>9}  {:>14}  {:>14}\n",
        "id", "period", "status", "employees", "gross", "net"
    );
    for run in runs {
        let _ = writeln!(
            out,
            "{:>6}  {:<8}  {:<12}  {:>9}  {:>14}  {:>14}",
            run.id,
            run.pay_period.to_string(),
            run.status.as_str(),
            run.employee_count,
            run.total_gross,
            run.total_net
        );
    }
    out
}

pub fn entry_table(entries: &[PayrollEntry]) -> String {
    let mut out = format!(
        "{:>8}  {:<6}  {:>8}  {:>10}  {:>12}  {:>10}  {:>10}  {:>11}  {:>12}\n",
        "employee", "regime", "paid", "lwp", "gross", "pf", "other", "tds", "net"
    );
    for e in entries {
        let tds = if e.tds_overridden {
            format!("{}*", e.tds_amount)
        } else {
            e.tds_amount.to_string()
        };
        let _ = writeln!(
            out,
            "{:>8}  {:<6}  {:>8}  {:>10}  {:>12}  {:>10}  {:>10}  {:>11}  {:>12}",
            e.employee_id,
            e.regime.as_str(),
            format!("{}/{}", e.paid_days, e.working_days),
            e.lwp_deduction,
            e.gross_earnings,
            e.pf_employee,
            e.other_deductions,
            tds,
            e.net_pay
        );
    }
    if entries.iter().any(|e| e.tds_overridden) {
        out.push_str("* TDS set manually\n");
    }
    out
}

pub fn issue_table(issues: &[GenerationIssue]) -> String {
    if issues.is_empty() {
        return "no employees skipped\n".to_string();
    }
    let mut out = String::new();
    for issue in issues {
        let _ = writeln!(
            out,
            "employee {:>6}  {:<20}  {}",
            issue.employee_id,
            issue.reason.as_str(),
            issue.detail
        );
    }
    out
}

pub fn declaration_table(declarations: &[InvestmentDeclaration]) -> String {
    let mut out = format!(
        "{:>6}  {:>4}  {:<10}  {:>12}  {:>12}  {:<9}  {}\n",
        "id", "fy", "section", "declared", "approved", "status", "reviewer"
    );
    for d in declarations {
        let _ = writeln!(
            out,
            "{:>6}  {:>4}  {:<10}  {:>12}  {:>12}  {:<9}  {}",
            d.id,
            d.financial_year,
            d.section_code,
            d.declared_amount,
            d.approved_amount,
            d.status.as_str(),
            who(&d.reviewed_by)
        );
    }
    out
}

pub fn compensation_history(structures: &[CompensationStructure]) -> String {
    let mut out = String::new();
    for s in structures {
        let until = s
            .effective_to
            .map(|d| d.to_string())
            .unwrap_or_else(|| "open".to_string());
        let _ = writeln!(
            out,
            "revision {} (structure {}): CTC {} from {} to {}{}",
            s.revision_number,
            s.id,
            s.annual_ctc,
            s.effective_from,
            until,
            if s.is_active { "" } else { " [inactive]" }
        );
        for c in &s.components {
            let _ = writeln!(
                out,
                "  {:<10} {:<28} {:<9} {:>12}",
                c.code,
                c.name,
                c.component_type.as_str(),
                c.annual_amount
            );
        }
    }
    out
}

/// Serializes a snapshot as TOML for payslip and filing tools.
pub fn snapshot_toml(snapshot: &RunSnapshot) -> Result<String, toml::ser::Error> {
    toml::to_string_pretty(snapshot)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use payroll_core::{PayPeriod, RunStatus, SkipReason, TaxRegime};
    use pretty_assertions::assert_eq;
    use rust_decimal_macros::dec;

    fn run() -> PayrollRun {
        let at = Utc.with_ymd_and_hms(2025, 10, 1, 9, 0, 0).unwrap();
        PayrollRun {
            id: 4,
            organization_id: 1,
            pay_period: PayPeriod::new(2025, 9).unwrap(),
            status: RunStatus::Approved,
            employee_count: 1,
            skipped_count: 1,
            total_gross: dec!(50000),
            total_deductions: dec!(1800),
            total_net: dec!(48200),
            created_by: "hr@acme".to_string(),
            reviewed_by: Some("hr@acme".to_string()),
            approved_by: Some("cfo@acme".to_string()),
            locked_by: None,
            created_at: at,
            reviewed_at: Some(at),
            approved_at: Some(at),
            locked_at: None,
            updated_at: at,
        }
    }

    fn entry(tds_overridden: bool) -> PayrollEntry {
        PayrollEntry {
            id: 10,
            run_id: 4,
            employee_id: 7,
            regime: TaxRegime::New,
            annual_ctc: dec!(600000),
            working_days: 22,
            paid_days: dec!(22),
            lwp_days: dec!(0),
            lwp_deduction: dec!(0),
            gross_earnings: dec!(50000),
            pf_employee: dec!(1800),
            pf_employer: dec!(1800),
            other_deductions: dec!(0),
            tds_amount: dec!(0),
            tds_overridden,
            total_deductions: dec!(1800),
            net_pay: dec!(48200),
        }
    }

    #[test]
    fn summary_shows_stamps() {
        let text = run_summary(&run());

        assert!(text.starts_with("run 4 (2025-09)\n"));
        assert!(text.contains("approved by  cfo@acme"));
        assert!(text.contains("locked by    -"));
    }

    #[test]
    fn run_table_has_one_line_per_run() {
        let text = run_table(&[run(), run()]);

        assert_eq!(text.lines().count(), 3);
        assert!(text.lines().nth(1).unwrap().contains("approved"));
    }

    #[test]
    fn overridden_tds_is_flagged() {
        assert!(!entry_table(&[entry(false)]).contains('*'));

        let text = entry_table(&[entry(true)]);
        assert!(text.contains("0*"));
        assert!(text.ends_with("* TDS set manually\n"));
    }

    #[test]
    fn issues_list_reason_codes() {
        let text = issue_table(&[GenerationIssue {
            employee_id: 12,
            reason: SkipReason::NoCompensation,
            detail: "no structure on 2025-09-30".to_string(),
        }]);

        assert!(text.contains("no_compensation"));
        assert_eq!(issue_table(&[]), "no employees skipped\n");
    }

    #[test]
    fn snapshot_exports_as_toml() {
        let snapshot = RunSnapshot {
            run: run(),
            entries: vec![entry(false)],
            skipped: vec![],
        };

        let text = snapshot_toml(&snapshot).unwrap();
        assert!(text.contains("[run]"));
        assert!(text.contains("[[entries]]"));
        assert!(text.contains("net_pay = \"48200\""));
    }
}
