//! Investment declaration ledger.

use rust_decimal::Decimal;

use super::PayrollEngine;
use crate::auth::Action;
use crate::calculations::declarations;
use crate::db::RepositoryError;
use crate::error::{PayrollError, not_found};
use crate::models::{InvestmentDeclaration, NewInvestmentDeclaration};

impl PayrollEngine {
    pub async fn submit_declaration(
        &self,
        user: &str,
        organization_id: i64,
        declaration: NewInvestmentDeclaration,
    ) -> Result<InvestmentDeclaration, PayrollError> {
        self.authorize(user, Action::SubmitDeclaration).await?;
        self.repo
            .get_employee(organization_id, declaration.employee_id)
            .await
            .map_err(not_found(format!("employee {}", declaration.employee_id)))?;

        let sections = self.repo.list_investment_sections().await?;
        declarations::validate_new(&declaration, &sections)?;

        let employee_id = declaration.employee_id;
        let section = declaration.section_code.clone();
        let financial_year = declaration.financial_year;

        let stored = self
            .repo
            .create_declaration(declaration, self.clock.now())
            .await
            .map_err(|err| match err {
                RepositoryError::Duplicate(_) => PayrollError::InvalidInput(format!(
                    "employee {employee_id} already declared {section} for {financial_year}"
                )),
                other => other.into(),
            })?;

        tracing::info!(declaration_id = stored.id, employee_id, section = %stored.section_code, "declaration submitted");
        Ok(stored)
    }

    /// Approves a submitted declaration, optionally for less than declared.
    pub async fn approve_declaration(
        &self,
        user: &str,
        organization_id: i64,
        declaration_id: i64,
        amount: Option<Decimal>,
    ) -> Result<InvestmentDeclaration, PayrollError> {
        self.authorize(user, Action::ReviewDeclaration).await?;
        let current = self.load_declaration(organization_id, declaration_id).await?;

        let sections = self.repo.list_investment_sections().await?;
        let section = sections
            .iter()
            .find(|s| s.code == current.section_code)
            .ok_or_else(|| {
                PayrollError::InvalidInput(format!("unknown investment section {}", current.section_code))
            })?;

        let reviewed = declarations::approve(&current, section, amount, user, self.clock.now())?;
        self.store_review(&reviewed).await?;

        tracing::info!(declaration_id, approved_amount = %reviewed.approved_amount, user, "declaration approved");
        Ok(reviewed)
    }

    pub async fn reject_declaration(
        &self,
        user: &str,
        organization_id: i64,
        declaration_id: i64,
    ) -> Result<InvestmentDeclaration, PayrollError> {
        self.authorize(user, Action::ReviewDeclaration).await?;
        let current = self.load_declaration(organization_id, declaration_id).await?;

        let reviewed = declarations::reject(&current, user, self.clock.now())?;
        self.store_review(&reviewed).await?;

        tracing::info!(declaration_id, user, "declaration rejected");
        Ok(reviewed)
    }

    pub async fn list_declarations(
        &self,
        user: &str,
        organization_id: i64,
        employee_id: i64,
        financial_year: i32,
    ) -> Result<Vec<InvestmentDeclaration>, PayrollError> {
        self.authorize(user, Action::View).await?;
        self.repo
            .get_employee(organization_id, employee_id)
            .await
            .map_err(not_found(format!("employee {employee_id}")))?;

        Ok(self.repo.list_declarations(employee_id, financial_year).await?)
    }

    /// Loads a declaration, checking its employee belongs to the organization.
    async fn load_declaration(
        &self,
        organization_id: i64,
        declaration_id: i64,
    ) -> Result<InvestmentDeclaration, PayrollError> {
        let declaration = self
            .repo
            .get_declaration(declaration_id)
            .await
            .map_err(not_found(format!("declaration {declaration_id}")))?;

        self.repo
            .get_employee(organization_id, declaration.employee_id)
            .await
            .map_err(not_found(format!("declaration {declaration_id}")))?;

        Ok(declaration)
    }

    async fn store_review(
        &self,
        reviewed: &InvestmentDeclaration,
    ) -> Result<(), PayrollError> {
        self.repo
            .update_declaration(reviewed)
            .await
            .map_err(|err| match err {
                RepositoryError::Conflict(_) => PayrollError::InvalidInput(format!(
                    "declaration {} was reviewed by another user",
                    reviewed.id
                )),
                other => other.into(),
            })
    }
}
