//! Approval state machine: review, approval, lock and deletion.

use super::{PayrollEngine, ensure_editable, ensure_transition};
use crate::auth::Action;
use crate::error::{PayrollError, run_conflict};
use crate::models::{PayrollRun, RunStatus, StatusChange};

impl PayrollEngine {
    /// `completed → under_review`
    pub async fn submit_for_review(
        &self,
        user: &str,
        organization_id: i64,
        run_id: i64,
    ) -> Result<PayrollRun, PayrollError> {
        self.advance(user, organization_id, run_id, RunStatus::UnderReview, Action::SubmitForReview)
            .await
    }

    /// `under_review → approved`
    pub async fn approve(
        &self,
        user: &str,
        organization_id: i64,
        run_id: i64,
    ) -> Result<PayrollRun, PayrollError> {
        self.advance(user, organization_id, run_id, RunStatus::Approved, Action::Approve)
            .await
    }

    /// `approved → locked`. Terminal.
    pub async fn lock(
        &self,
        user: &str,
        organization_id: i64,
        run_id: i64,
    ) -> Result<PayrollRun, PayrollError> {
        self.advance(user, organization_id, run_id, RunStatus::Locked, Action::Lock)
            .await
    }

    /// Deletes a draft, processing or completed run together with its entries.
    pub async fn delete(
        &self,
        user: &str,
        organization_id: i64,
        run_id: i64,
    ) -> Result<(), PayrollError> {
        self.authorize(user, Action::Delete).await?;
        let _lease = self.guard.acquire(run_id)?;

        let run = self.load_run(organization_id, run_id).await?;
        ensure_editable(&run, Action::Delete)?;

        self.repo
            .delete_run(run.id, run.status)
            .await
            .map_err(run_conflict(run.id))?;

        tracing::info!(run_id, status = %run.status, user, "deleted payroll run");
        Ok(())
    }

    async fn advance(
        &self,
        user: &str,
        organization_id: i64,
        run_id: i64,
        to: RunStatus,
        action: Action,
    ) -> Result<PayrollRun, PayrollError> {
        let actor = self.authorize(user, action).await?;
        let _lease = self.guard.acquire(run_id)?;

        let run = self.load_run(organization_id, run_id).await?;
        ensure_transition(&run, to, action)?;

        if to == RunStatus::Approved && self.config.require_distinct_approver {
            let prepared_by_actor = run.created_by == actor.user_id
                || run.reviewed_by.as_deref() == Some(actor.user_id.as_str());
            if prepared_by_actor {
                tracing::warn!(run_id, user, "approver prepared the run");
                return Err(PayrollError::Unauthorized {
                    user: actor.user_id,
                    action,
                });
            }
        }

        let updated = self
            .repo
            .transition_run(&StatusChange {
                run_id: run.id,
                from: run.status,
                to,
                actor: actor.user_id.clone(),
                at: self.clock.now(),
            })
            .await
            .map_err(run_conflict(run.id))?;

        tracing::info!(run_id, from = %run.status, to = %updated.status, user, "payroll run transitioned");
        Ok(updated)
    }
}
