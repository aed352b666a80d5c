//! Compensation assignment and revision.

use super::PayrollEngine;
use crate::auth::Action;
use crate::calculations::compensation;
use crate::db::RepositoryError;
use crate::error::{PayrollError, not_found};
use crate::models::{CompensationStructure, NewCompensationStructure};

impl PayrollEngine {
    /// Gives an employee their first compensation structure.
    pub async fn assign_compensation(
        &self,
        user: &str,
        organization_id: i64,
        structure: NewCompensationStructure,
    ) -> Result<CompensationStructure, PayrollError> {
        self.authorize(user, Action::ManageCompensation).await?;
        let employee = self
            .repo
            .get_employee(organization_id, structure.employee_id)
            .await
            .map_err(not_found(format!("employee {}", structure.employee_id)))?;

        compensation::validate_new(&structure, self.config.currency_scale)?;

        if structure.effective_from < employee.join_date {
            return Err(PayrollError::InvalidInput(format!(
                "compensation cannot start before join date {}",
                employee.join_date
            )));
        }

        let existing = self.repo.list_compensation_structures(employee.id).await?;
        if !existing.is_empty() {
            return Err(PayrollError::InvalidInput(format!(
                "employee {} already has compensation; revise it instead",
                employee.id
            )));
        }

        let stored = self.repo.create_compensation_structure(structure).await?;

        tracing::info!(employee_id = employee.id, structure_id = stored.id, annual_ctc = %stored.annual_ctc, user, "compensation assigned");
        Ok(stored)
    }

    /// Closes the active structure the day before `revision` takes effect
    /// and opens `revision` in its place.
    pub async fn revise_compensation(
        &self,
        user: &str,
        organization_id: i64,
        revision: NewCompensationStructure,
    ) -> Result<CompensationStructure, PayrollError> {
        self.authorize(user, Action::ManageCompensation).await?;
        let employee_id = revision.employee_id;
        self.repo
            .get_employee(organization_id, employee_id)
            .await
            .map_err(not_found(format!("employee {employee_id}")))?;

        compensation::validate_new(&revision, self.config.currency_scale)?;

        let existing = self.repo.list_compensation_structures(employee_id).await?;
        let current = existing
            .iter()
            .find(|s| s.is_active && s.effective_to.is_none())
            .ok_or_else(|| {
                PayrollError::InvalidInput(format!(
                    "employee {employee_id} has no active compensation to revise"
                ))
            })?;

        let close_on = compensation::closing_date(current, &revision)?;
        let current_id = current.id;

        let stored = self
            .repo
            .revise_compensation_structure(current_id, close_on, revision)
            .await
            .map_err(|err| match err {
                RepositoryError::Conflict(_) => PayrollError::InvalidInput(format!(
                    "compensation of employee {employee_id} changed during revision"
                )),
                other => other.into(),
            })?;

        tracing::info!(
            employee_id,
            closed = current_id,
            opened = stored.id,
            revision = stored.revision_number,
            user,
            "compensation revised"
        );
        Ok(stored)
    }

    pub async fn compensation_history(
        &self,
        user: &str,
        organization_id: i64,
        employee_id: i64,
    ) -> Result<Vec<CompensationStructure>, PayrollError> {
        self.authorize(user, Action::View).await?;
        self.repo
            .get_employee(organization_id, employee_id)
            .await
            .map_err(not_found(format!("employee {employee_id}")))?;

        Ok(self.repo.list_compensation_structures(employee_id).await?)
    }
}
