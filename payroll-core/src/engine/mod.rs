//! Payroll operations exposed to the host application.
//!
//! Every operation takes the acting user and an explicit organization id,
//! resolves the user's role and checks it with [`can`] before touching
//! the store.

mod compensation;
mod declarations;
mod generator;
mod guard;
mod lifecycle;

use serde::{Deserialize, Serialize};

use crate::auth::{Action, Actor, RoleResolver, can};
use crate::clock::Clock;
use crate::config::PayrollConfig;
use crate::db::PayrollRepository;
use crate::error::{PayrollError, not_found};
use crate::models::{GenerationIssue, PayrollEntry, PayrollRun, RunStatus};

pub use generator::GenerationReport;
pub use guard::{RunGuard, RunLease};

/// Owned, read-only view of a posted run for payslip and filing exports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSnapshot {
    pub run: PayrollRun,
    pub entries: Vec<PayrollEntry>,
    pub skipped: Vec<GenerationIssue>,
}

pub struct PayrollEngine {
    repo: Box<dyn PayrollRepository>,
    roles: Box<dyn RoleResolver>,
    clock: Box<dyn Clock>,
    config: PayrollConfig,
    guard: RunGuard,
}

impl PayrollEngine {
    pub fn new(
        repo: Box<dyn PayrollRepository>,
        roles: Box<dyn RoleResolver>,
        clock: Box<dyn Clock>,
        config: PayrollConfig,
    ) -> Self {
        Self {
            repo,
            roles,
            clock,
            config,
            guard: RunGuard::default(),
        }
    }

    pub fn config(&self) -> &PayrollConfig {
        &self.config
    }

    /// Direct access to the store, for reference data and directory upkeep.
    pub fn repository(&self) -> &dyn PayrollRepository {
        self.repo.as_ref()
    }

    async fn authorize(
        &self,
        user: &str,
        action: Action,
    ) -> Result<Actor, PayrollError> {
        let unauthorized = || PayrollError::Unauthorized {
            user: user.to_string(),
            action,
        };

        let role = self.roles.current_role(user).await.ok_or_else(unauthorized)?;
        if !can(role, action) {
            tracing::warn!(user, role = %role, action = %action, "permission denied");
            return Err(unauthorized());
        }

        Ok(Actor {
            user_id: user.to_string(),
            role,
        })
    }

    async fn load_run(
        &self,
        organization_id: i64,
        run_id: i64,
    ) -> Result<PayrollRun, PayrollError> {
        self.repo
            .get_run(organization_id, run_id)
            .await
            .map_err(not_found(format!("payroll run {run_id}")))
    }

    pub async fn get_run(
        &self,
        user: &str,
        organization_id: i64,
        run_id: i64,
    ) -> Result<PayrollRun, PayrollError> {
        self.authorize(user, Action::View).await?;
        self.load_run(organization_id, run_id).await
    }

    pub async fn list_runs(
        &self,
        user: &str,
        organization_id: i64,
    ) -> Result<Vec<PayrollRun>, PayrollError> {
        self.authorize(user, Action::View).await?;
        Ok(self.repo.list_runs(organization_id).await?)
    }

    pub async fn list_entries(
        &self,
        user: &str,
        organization_id: i64,
        run_id: i64,
    ) -> Result<Vec<PayrollEntry>, PayrollError> {
        self.authorize(user, Action::View).await?;
        let run = self.load_run(organization_id, run_id).await?;
        Ok(self.repo.list_entries(run.id).await?)
    }

    /// Employees left out of the run and why.
    pub async fn generation_log(
        &self,
        user: &str,
        organization_id: i64,
        run_id: i64,
    ) -> Result<Vec<GenerationIssue>, PayrollError> {
        self.authorize(user, Action::View).await?;
        let run = self.load_run(organization_id, run_id).await?;
        Ok(self.repo.list_generation_log(run.id).await?)
    }

    /// Snapshot of a completed or later run.
    ///
    /// Draft and processing runs have no stable entries and are refused
    /// with [`PayrollError::InvalidTransition`].
    pub async fn export_snapshot(
        &self,
        user: &str,
        organization_id: i64,
        run_id: i64,
    ) -> Result<RunSnapshot, PayrollError> {
        self.authorize(user, Action::Export).await?;
        let run = self.load_run(organization_id, run_id).await?;

        if !run.status.is_posted() {
            return Err(PayrollError::InvalidTransition {
                run_id,
                from: run.status,
                action: Action::Export,
            });
        }

        let entries = self.repo.list_entries(run.id).await?;
        let skipped = self.repo.list_generation_log(run.id).await?;

        tracing::info!(run_id, status = %run.status, entries = entries.len(), "exported run snapshot");
        Ok(RunSnapshot {
            run,
            entries,
            skipped,
        })
    }
}

/// Rejects writes (other than status transitions) on runs past completion.
///
/// Approved and locked runs are immutable; a run under review has to be
/// approved or go through a new run before it changes.
fn ensure_editable(
    run: &PayrollRun,
    action: Action,
) -> Result<(), PayrollError> {
    match run.status {
        status if status.is_immutable() => Err(PayrollError::ImmutableRun {
            run_id: run.id,
            status,
        }),
        status if status.is_editable() => Ok(()),
        status => Err(PayrollError::InvalidTransition {
            run_id: run.id,
            from: status,
            action,
        }),
    }
}

/// Checks a lifecycle move from the run's current status to `to`.
fn ensure_transition(
    run: &PayrollRun,
    to: RunStatus,
    action: Action,
) -> Result<(), PayrollError> {
    if run.status.can_transition_to(to) {
        return Ok(());
    }

    if run.status.is_immutable() {
        return Err(PayrollError::ImmutableRun {
            run_id: run.id,
            status: run.status,
        });
    }

    Err(PayrollError::InvalidTransition {
        run_id: run.id,
        from: run.status,
        action,
    })
}
