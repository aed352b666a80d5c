//! Run generation and entry recomputation.

use std::collections::{HashMap, HashSet};
use std::slice;

use futures::stream::{self, StreamExt, TryStreamExt};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{PayrollEngine, ensure_editable};
use crate::auth::{Action, Actor};
use crate::calculations::common::{monthly, non_negative};
use crate::calculations::compensation::{self, CompensationError};
use crate::calculations::{
    AttendanceProrator, StatutoryCalculator, TdsInput, TdsWorksheet, rates_in_effect,
};
use crate::db::RepositoryError;
use crate::error::{PayrollError, not_found, run_conflict};
use crate::models::{
    Employee, GenerationIssue, InvestmentSection, NewPayrollEntry, NewPayrollRun, Organization,
    PayPeriod, PayrollEntry, PayrollRun, RunStatus, SkipReason, StatusChange, StatutoryRates,
    TaxRegime, TaxRegimeConfig, TaxSlab,
};

/// Outcome of a successful generation.
///
/// The run is `completed`; employees that could not be paid are listed in
/// `skipped` rather than failing the whole run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationReport {
    pub run: PayrollRun,
    pub skipped: Vec<GenerationIssue>,
}

impl GenerationReport {
    pub fn has_skipped(&self) -> bool {
        !self.skipped.is_empty()
    }
}

struct RegimeRules {
    slabs: Vec<TaxSlab>,
    config: TaxRegimeConfig,
}

/// Reference data shared by every employee of one run.
struct RunContext<'a> {
    organization: &'a Organization,
    pay_period: PayPeriod,
    rates: StatutoryRates,
    sections: Vec<InvestmentSection>,
    regimes: HashMap<TaxRegime, RegimeRules>,
}

enum Outcome {
    Entry(NewPayrollEntry),
    Skipped(GenerationIssue),
}

impl PayrollEngine {
    /// Creates and computes the organization's run for `pay_period`.
    ///
    /// # Errors
    ///
    /// [`PayrollError::DuplicateRun`] if the period already has a run. The
    /// run is inserted already claimed as `processing`, so no other caller
    /// can pick it up as a draft. A failure after that leaves it in
    /// `processing`, from where [`regenerate`](Self::regenerate) can retry it.
    pub async fn generate(
        &self,
        user: &str,
        organization_id: i64,
        pay_period: PayPeriod,
    ) -> Result<GenerationReport, PayrollError> {
        let actor = self.authorize(user, Action::Generate).await?;
        let organization = self
            .repo
            .get_organization(organization_id)
            .await
            .map_err(not_found(format!("organization {organization_id}")))?;

        let duplicate = || PayrollError::DuplicateRun {
            organization_id,
            pay_period,
        };

        if self.repo.find_run(organization_id, pay_period).await?.is_some() {
            return Err(duplicate());
        }

        let run = self
            .repo
            .create_run(NewPayrollRun {
                organization_id,
                pay_period,
                status: RunStatus::Processing,
                created_by: actor.user_id.clone(),
                created_at: self.clock.now(),
            })
            .await
            .map_err(|err| match err {
                RepositoryError::Duplicate(_) => duplicate(),
                other => other.into(),
            })?;

        tracing::info!(run_id = run.id, organization_id, %pay_period, user, "created payroll run");

        let _lease = self.guard.acquire(run.id)?;
        self.process(&organization, run, &actor).await
    }

    /// Recomputes every entry of a draft, processing or completed run.
    pub async fn regenerate(
        &self,
        user: &str,
        organization_id: i64,
        run_id: i64,
    ) -> Result<GenerationReport, PayrollError> {
        let actor = self.authorize(user, Action::Regenerate).await?;
        let _lease = self.guard.acquire(run_id)?;

        let run = self.load_run(organization_id, run_id).await?;
        ensure_editable(&run, Action::Regenerate)?;

        let organization = self
            .repo
            .get_organization(organization_id)
            .await
            .map_err(not_found(format!("organization {organization_id}")))?;

        tracing::info!(run_id, status = %run.status, user, "regenerating payroll run");
        self.process(&organization, run, &actor).await
    }

    /// Recomputes one employee's entry from current compensation and attendance.
    pub async fn recompute_entry(
        &self,
        user: &str,
        organization_id: i64,
        run_id: i64,
        employee_id: i64,
    ) -> Result<PayrollEntry, PayrollError> {
        self.authorize(user, Action::EditEntry).await?;
        let _lease = self.guard.acquire(run_id)?;

        let (run, existing) = self.editable_entry(organization_id, run_id, employee_id).await?;

        let organization = self
            .repo
            .get_organization(organization_id)
            .await
            .map_err(not_found(format!("organization {organization_id}")))?;
        let employee = self
            .repo
            .get_employee(organization_id, employee_id)
            .await
            .map_err(not_found(format!("employee {employee_id}")))?;

        let context = self
            .load_context(&organization, run.pay_period, slice::from_ref(&employee))
            .await?;

        let entry = match self.compute_employee(&employee, &context).await? {
            Outcome::Entry(entry) => entry.into_entry(existing.id, run.id),
            Outcome::Skipped(issue) => {
                return Err(PayrollError::InvalidInput(format!(
                    "employee {employee_id} can no longer be paid in run {run_id}: {}",
                    issue.detail
                )));
            }
        };

        let run = self
            .repo
            .update_entry(&entry, run.status)
            .await
            .map_err(run_conflict(run.id))?;

        tracing::info!(run_id, employee_id, user, total_net = %run.total_net, "recomputed payroll entry");
        Ok(entry)
    }

    /// Replaces the computed TDS of one entry with a manual figure.
    pub async fn override_tds(
        &self,
        user: &str,
        organization_id: i64,
        run_id: i64,
        employee_id: i64,
        tds_amount: Decimal,
    ) -> Result<PayrollEntry, PayrollError> {
        self.authorize(user, Action::EditEntry).await?;
        let _lease = self.guard.acquire(run_id)?;

        let (run, existing) = self.editable_entry(organization_id, run_id, employee_id).await?;

        let ceiling = non_negative(
            existing.gross_earnings - existing.pf_employee - existing.other_deductions,
        );
        if tds_amount.is_sign_negative() || tds_amount > ceiling {
            return Err(PayrollError::InvalidInput(format!(
                "TDS override must be between 0 and {ceiling}, got {tds_amount}"
            )));
        }

        let entry = existing.with_tds_override(tds_amount);
        let run = self
            .repo
            .update_entry(&entry, run.status)
            .await
            .map_err(run_conflict(run.id))?;

        tracing::info!(run_id, employee_id, user, %tds_amount, total_net = %run.total_net, "overrode TDS");
        Ok(entry)
    }

    /// Loads a run whose entries may be edited, and one of its entries.
    ///
    /// Entries only exist once a run has completed, so draft and processing
    /// runs are refused as well as immutable ones.
    async fn editable_entry(
        &self,
        organization_id: i64,
        run_id: i64,
        employee_id: i64,
    ) -> Result<(PayrollRun, PayrollEntry), PayrollError> {
        let run = self.load_run(organization_id, run_id).await?;
        ensure_editable(&run, Action::EditEntry)?;
        if run.status != RunStatus::Completed {
            return Err(PayrollError::InvalidTransition {
                run_id,
                from: run.status,
                action: Action::EditEntry,
            });
        }

        let entry = self
            .repo
            .get_entry(run.id, employee_id)
            .await
            .map_err(not_found(format!("entry for employee {employee_id} in run {run_id}")))?;

        Ok((run, entry))
    }

    /// Claims the run, computes all active employees and stores the result.
    async fn process(
        &self,
        organization: &Organization,
        run: PayrollRun,
        actor: &Actor,
    ) -> Result<GenerationReport, PayrollError> {
        let run_id = run.id;

        if run.status != RunStatus::Processing {
            self.repo
                .transition_run(&StatusChange {
                    run_id,
                    from: run.status,
                    to: RunStatus::Processing,
                    actor: actor.user_id.clone(),
                    at: self.clock.now(),
                })
                .await
                .map_err(run_conflict(run_id))?;
        }

        let (entries, skipped) = match self.compute_all(organization, run.pay_period).await {
            Ok(computed) => computed,
            Err(err) => {
                tracing::error!(run_id, error = %err, "generation failed; run left in processing");
                return Err(err);
            }
        };

        let run = self
            .repo
            .store_run_results(
                &entries,
                &skipped,
                &StatusChange {
                    run_id,
                    from: RunStatus::Processing,
                    to: RunStatus::Completed,
                    actor: actor.user_id.clone(),
                    at: self.clock.now(),
                },
            )
            .await
            .map_err(run_conflict(run_id))?;

        tracing::info!(
            run_id,
            employees = run.employee_count,
            skipped = run.skipped_count,
            total_gross = %run.total_gross,
            total_net = %run.total_net,
            "payroll run completed"
        );

        Ok(GenerationReport { run, skipped })
    }

    async fn compute_all(
        &self,
        organization: &Organization,
        pay_period: PayPeriod,
    ) -> Result<(Vec<NewPayrollEntry>, Vec<GenerationIssue>), PayrollError> {
        let employees = self.repo.list_active_employees(organization.id).await?;
        let context = self.load_context(organization, pay_period, &employees).await?;

        let outcomes: Vec<Outcome> = stream::iter(&employees)
            .map(|employee| self.compute_employee(employee, &context))
            .buffered(self.config.concurrency())
            .try_collect()
            .await?;

        let mut entries = Vec::with_capacity(outcomes.len());
        let mut skipped = Vec::new();
        for outcome in outcomes {
            match outcome {
                Outcome::Entry(entry) => entries.push(entry),
                Outcome::Skipped(issue) => skipped.push(issue),
            }
        }

        Ok((entries, skipped))
    }

    /// Loads rates, sections and the slabs of every regime the employees use.
    async fn load_context<'a>(
        &self,
        organization: &'a Organization,
        pay_period: PayPeriod,
        employees: &[Employee],
    ) -> Result<RunContext<'a>, PayrollError> {
        let versions = self.repo.list_statutory_rates().await?;
        let rates = rates_in_effect(&versions, pay_period.first_day())?.clone();
        let sections = self.repo.list_investment_sections().await?;

        let financial_year = pay_period.financial_year().start_year();
        let needed: HashSet<TaxRegime> = employees
            .iter()
            .map(|e| e.effective_regime(organization))
            .collect();

        let mut regimes = HashMap::new();
        for regime in needed {
            regimes.insert(regime, self.load_regime_rules(regime, financial_year).await?);
        }

        Ok(RunContext {
            organization,
            pay_period,
            rates,
            sections,
            regimes,
        })
    }

    async fn load_regime_rules(
        &self,
        regime: TaxRegime,
        financial_year: i32,
    ) -> Result<RegimeRules, PayrollError> {
        let missing = || {
            PayrollError::StatutoryConfigMissing(format!(
                "{} regime rules for financial year {financial_year}",
                regime.as_str()
            ))
        };

        let slabs = self.repo.get_tax_slabs(regime, financial_year).await?;
        if slabs.is_empty() {
            return Err(missing());
        }

        let config = self
            .repo
            .get_regime_config(regime, financial_year)
            .await
            .map_err(|err| match err {
                RepositoryError::NotFound => missing(),
                other => other.into(),
            })?;

        Ok(RegimeRules { slabs, config })
    }

    /// Computes one employee's entry, or the reason they are left out.
    ///
    /// Only store and rule-table failures are returned as errors; problems
    /// with the employee's own data become a skip.
    async fn compute_employee(
        &self,
        employee: &Employee,
        context: &RunContext<'_>,
    ) -> Result<Outcome, PayrollError> {
        let scale = self.config.currency_scale;
        let pay_period = context.pay_period;

        let skip = |reason: SkipReason, detail: String| -> Result<Outcome, PayrollError> {
            tracing::warn!(
                employee_id = employee.id,
                %pay_period,
                reason = reason.as_str(),
                %detail,
                "skipping employee"
            );
            Ok(Outcome::Skipped(GenerationIssue {
                employee_id: employee.id,
                reason,
                detail,
            }))
        };

        let structures = self.repo.list_compensation_structures(employee.id).await?;
        let structure = match compensation::resolve(employee.id, &structures, pay_period.last_day()) {
            Ok(structure) => structure,
            Err(err @ CompensationError::NotFound { .. }) => {
                return skip(SkipReason::NoCompensation, err.to_string());
            }
            Err(err) => return skip(SkipReason::InvalidCompensation, err.to_string()),
        };

        if let Err(err) = compensation::validate_stored(structure, scale) {
            return skip(SkipReason::InvalidCompensation, err.to_string());
        }
        let Some(annual_basic) = structure.annual_basic() else {
            return skip(
                SkipReason::InvalidCompensation,
                CompensationError::MissingBasic.to_string(),
            );
        };

        let attendance = self
            .repo
            .list_attendance(employee.id, pay_period.first_day(), pay_period.last_day())
            .await?;

        let gross_monthly = monthly(structure.annual_earnings(), scale);
        let proration = match AttendanceProrator::new(employee, pay_period, scale)
            .prorate(&attendance, gross_monthly)
        {
            Ok(proration) => proration,
            Err(err) => return skip(SkipReason::NoWorkingDays, err.to_string()),
        };

        let gross_earnings = non_negative(gross_monthly - proration.lwp_deduction);
        let earned_basic = proration.earned(monthly(annual_basic, scale), scale);
        let pf = StatutoryCalculator::new(&context.rates, scale).compute(earned_basic);

        let regime = employee.effective_regime(context.organization);
        let rules = context.regimes.get(&regime).ok_or_else(|| {
            PayrollError::StatutoryConfigMissing(format!("{} regime rules", regime.as_str()))
        })?;

        let financial_year = pay_period.financial_year();
        let declarations = if regime.allows_declarations() {
            self.repo
                .list_declarations(employee.id, financial_year.start_year())
                .await?
        } else {
            Vec::new()
        };
        let tds_withheld = self
            .repo
            .tds_withheld(employee.id, financial_year, pay_period)
            .await?;

        let tds = TdsWorksheet::new(&rules.slabs, &rules.config, &context.sections, scale).calculate(
            &TdsInput {
                annual_taxable_gross: structure.annual_taxable_earnings(),
                declarations,
                tds_withheld,
                months_remaining: pay_period.months_remaining_in_financial_year(),
            },
        )?;

        // Net pay never goes negative: in a short month fixed deductions give
        // way to PF, and TDS gives way to both.
        let other_deductions = monthly(structure.annual_deductions(), scale)
            .min(non_negative(gross_earnings - pf.pf_employee));
        let tds_amount = tds
            .monthly_tds
            .min(non_negative(gross_earnings - pf.pf_employee - other_deductions));
        let total_deductions = pf.pf_employee + other_deductions + tds_amount;

        tracing::debug!(
            employee_id = employee.id,
            regime = regime.as_str(),
            %gross_earnings,
            pf_employee = %pf.pf_employee,
            %other_deductions,
            annual_tax = %tds.annual_tax,
            %tds_amount,
            "computed payroll entry"
        );

        Ok(Outcome::Entry(NewPayrollEntry {
            employee_id: employee.id,
            regime,
            annual_ctc: structure.annual_ctc,
            working_days: proration.working_days,
            paid_days: proration.paid_days,
            lwp_days: proration.lwp_days,
            lwp_deduction: proration.lwp_deduction,
            gross_earnings,
            pf_employee: pf.pf_employee,
            pf_employer: pf.pf_employer,
            other_deductions,
            tds_amount,
            total_deductions,
            net_pay: gross_earnings - total_deductions,
        }))
    }
}
