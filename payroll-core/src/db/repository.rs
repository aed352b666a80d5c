use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use thiserror::Error;

use crate::models::{
    AttendanceRecord, CompensationStructure, Employee, FinancialYear, GenerationIssue,
    InvestmentDeclaration, InvestmentSection, NewCompensationStructure, NewEmployee,
    NewInvestmentDeclaration, NewPayrollEntry, NewPayrollRun, Organization, PayPeriod,
    PayrollEntry, PayrollRun, RunStatus, StatusChange, StatutoryRates, TaxRegime,
    TaxRegimeConfig, TaxSlab,
};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RepositoryError {
    #[error("Record not found")]
    NotFound,

    #[error("Duplicate record: {0}")]
    Duplicate(String),

    /// A compare-and-swap lost: the row was no longer in the expected state.
    #[error("Concurrent modification: {0}")]
    Conflict(String),

    /// The store refused to change an approved or locked run or its entries.
    #[error("Immutable record: payroll run is {0}")]
    Immutable(RunStatus),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

#[async_trait]
pub trait PayrollRepository: Send + Sync {
    // Organizations and employee directory
    async fn create_organization(
        &self,
        name: &str,
        default_regime: TaxRegime,
    ) -> Result<Organization, RepositoryError>;

    async fn get_organization(
        &self,
        organization_id: i64,
    ) -> Result<Organization, RepositoryError>;

    async fn create_employee(
        &self,
        employee: NewEmployee,
    ) -> Result<Employee, RepositoryError>;

    async fn get_employee(
        &self,
        organization_id: i64,
        employee_id: i64,
    ) -> Result<Employee, RepositoryError>;

    async fn list_active_employees(
        &self,
        organization_id: i64,
    ) -> Result<Vec<Employee>, RepositoryError>;

    // Attendance
    /// Inserts records, replacing any existing record for the same employee and date.
    async fn record_attendance(
        &self,
        records: &[AttendanceRecord],
    ) -> Result<(), RepositoryError>;

    async fn list_attendance(
        &self,
        employee_id: i64,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<AttendanceRecord>, RepositoryError>;

    // Compensation
    async fn list_compensation_structures(
        &self,
        employee_id: i64,
    ) -> Result<Vec<CompensationStructure>, RepositoryError>;

    /// Stores an employee's first structure as revision 1.
    async fn create_compensation_structure(
        &self,
        structure: NewCompensationStructure,
    ) -> Result<CompensationStructure, RepositoryError>;

    /// Closes `current_id` on `close_on` and opens `revision` in one transaction.
    ///
    /// Fails with [`RepositoryError::Conflict`] if `current_id` is no longer
    /// the active structure.
    async fn revise_compensation_structure(
        &self,
        current_id: i64,
        close_on: NaiveDate,
        revision: NewCompensationStructure,
    ) -> Result<CompensationStructure, RepositoryError>;

    // Tax rule store
    async fn get_tax_slabs(
        &self,
        regime: TaxRegime,
        financial_year: i32,
    ) -> Result<Vec<TaxSlab>, RepositoryError>;

    async fn insert_tax_slab(
        &self,
        slab: &TaxSlab,
    ) -> Result<(), RepositoryError>;

    async fn delete_tax_slabs(
        &self,
        regime: TaxRegime,
        financial_year: i32,
    ) -> Result<(), RepositoryError>;

    async fn get_regime_config(
        &self,
        regime: TaxRegime,
        financial_year: i32,
    ) -> Result<TaxRegimeConfig, RepositoryError>;

    async fn list_statutory_rates(&self) -> Result<Vec<StatutoryRates>, RepositoryError>;

    async fn list_investment_sections(&self) -> Result<Vec<InvestmentSection>, RepositoryError>;

    // Investment declarations
    async fn create_declaration(
        &self,
        declaration: NewInvestmentDeclaration,
        at: DateTime<Utc>,
    ) -> Result<InvestmentDeclaration, RepositoryError>;

    async fn get_declaration(
        &self,
        declaration_id: i64,
    ) -> Result<InvestmentDeclaration, RepositoryError>;

    /// Writes a review outcome; only a still-submitted declaration may be updated.
    async fn update_declaration(
        &self,
        declaration: &InvestmentDeclaration,
    ) -> Result<(), RepositoryError>;

    async fn list_declarations(
        &self,
        employee_id: i64,
        financial_year: i32,
    ) -> Result<Vec<InvestmentDeclaration>, RepositoryError>;

    // Payroll runs
    /// Fails with [`RepositoryError::Duplicate`] if the organization already
    /// has a run for the period, and with [`RepositoryError::Conflict`] if
    /// `run.status` is neither draft nor processing.
    async fn create_run(
        &self,
        run: NewPayrollRun,
    ) -> Result<PayrollRun, RepositoryError>;

    async fn get_run(
        &self,
        organization_id: i64,
        run_id: i64,
    ) -> Result<PayrollRun, RepositoryError>;

    async fn find_run(
        &self,
        organization_id: i64,
        pay_period: PayPeriod,
    ) -> Result<Option<PayrollRun>, RepositoryError>;

    async fn list_runs(
        &self,
        organization_id: i64,
    ) -> Result<Vec<PayrollRun>, RepositoryError>;

    /// Compare-and-swap on the run status. Also stamps the actor and time
    /// columns belonging to the target status.
    async fn transition_run(
        &self,
        change: &StatusChange,
    ) -> Result<PayrollRun, RepositoryError>;

    /// Replaces the run's entries and generation log, recomputes its totals
    /// and applies `change`, all in one transaction.
    async fn store_run_results(
        &self,
        entries: &[NewPayrollEntry],
        issues: &[GenerationIssue],
        change: &StatusChange,
    ) -> Result<PayrollRun, RepositoryError>;

    /// Rewrites one entry and the run totals in one transaction, provided the
    /// run is still in `expected`.
    async fn update_entry(
        &self,
        entry: &PayrollEntry,
        expected: RunStatus,
    ) -> Result<PayrollRun, RepositoryError>;

    /// Deletes the run and, by cascade, its entries, provided it is still in `expected`.
    async fn delete_run(
        &self,
        run_id: i64,
        expected: RunStatus,
    ) -> Result<(), RepositoryError>;

    async fn get_entry(
        &self,
        run_id: i64,
        employee_id: i64,
    ) -> Result<PayrollEntry, RepositoryError>;

    async fn list_entries(
        &self,
        run_id: i64,
    ) -> Result<Vec<PayrollEntry>, RepositoryError>;

    async fn list_generation_log(
        &self,
        run_id: i64,
    ) -> Result<Vec<GenerationIssue>, RepositoryError>;

    /// TDS deducted from the employee by posted runs of `financial_year`
    /// for periods before `before`.
    async fn tds_withheld(
        &self,
        employee_id: i64,
        financial_year: FinancialYear,
        before: PayPeriod,
    ) -> Result<Decimal, RepositoryError>;
}
