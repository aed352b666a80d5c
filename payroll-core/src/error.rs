use thiserror::Error;

use crate::auth::Action;
use crate::calculations::{CompensationError, DeclarationError, StatutoryError, TdsError};
use crate::db::RepositoryError;
use crate::models::{PayPeriod, RunStatus};

/// Errors surfaced by every [`PayrollEngine`](crate::engine::PayrollEngine) operation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PayrollError {
    #[error("organization {organization_id} already has a payroll run for {pay_period}")]
    DuplicateRun {
        organization_id: i64,
        pay_period: PayPeriod,
    },

    #[error("{0} not found")]
    NotFound(String),

    #[error("payroll run {run_id} is {status} and cannot be changed")]
    ImmutableRun { run_id: i64, status: RunStatus },

    #[error("cannot {action} payroll run {run_id} while it is {from}")]
    InvalidTransition {
        run_id: i64,
        from: RunStatus,
        action: Action,
    },

    #[error("user '{user}' is not allowed to {action}")]
    Unauthorized { user: String, action: Action },

    #[error("statutory configuration missing: {0}")]
    StatutoryConfigMissing(String),

    #[error("payroll run {run_id} was changed by another operation")]
    Conflict { run_id: i64 },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl From<CompensationError> for PayrollError {
    fn from(err: CompensationError) -> Self {
        Self::InvalidInput(err.to_string())
    }
}

impl From<DeclarationError> for PayrollError {
    fn from(err: DeclarationError) -> Self {
        Self::InvalidInput(err.to_string())
    }
}

impl From<StatutoryError> for PayrollError {
    fn from(err: StatutoryError) -> Self {
        Self::StatutoryConfigMissing(err.to_string())
    }
}

impl From<TdsError> for PayrollError {
    fn from(err: TdsError) -> Self {
        Self::StatutoryConfigMissing(err.to_string())
    }
}

/// Maps a repository `NotFound` to a named [`PayrollError::NotFound`].
pub(crate) fn not_found(what: impl Into<String>) -> impl FnOnce(RepositoryError) -> PayrollError {
    let what = what.into();
    move |err| match err {
        RepositoryError::NotFound => PayrollError::NotFound(what),
        other => PayrollError::Repository(other),
    }
}

/// Maps a lost compare-and-swap on `run_id` to [`PayrollError::Conflict`].
pub(crate) fn run_conflict(run_id: i64) -> impl FnOnce(RepositoryError) -> PayrollError {
    move |err| match err {
        RepositoryError::Conflict(_) => PayrollError::Conflict { run_id },
        RepositoryError::Immutable(status) => PayrollError::ImmutableRun { run_id, status },
        RepositoryError::NotFound => PayrollError::NotFound(format!("payroll run {run_id}")),
        other => PayrollError::Repository(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refused_change_keeps_the_stored_status() {
        let err = run_conflict(7)(RepositoryError::Immutable(RunStatus::Approved));

        assert_eq!(
            err,
            PayrollError::ImmutableRun {
                run_id: 7,
                status: RunStatus::Approved,
            }
        );
    }

    #[test]
    fn lost_swap_is_a_conflict() {
        let err = run_conflict(7)(RepositoryError::Conflict("payroll run 7 is completed".into()));

        assert_eq!(err, PayrollError::Conflict { run_id: 7 });
    }
}
