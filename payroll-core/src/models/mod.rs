mod attendance;
mod compensation;
mod declaration;
mod employee;
mod pay_period;
mod payroll_entry;
mod payroll_run;
mod tax;

pub use attendance::{AttendanceRecord, AttendanceStatus};
pub use compensation::{
    BASIC_COMPONENT_CODE, CompensationComponent, CompensationStructure, ComponentType,
    NewCompensationComponent, NewCompensationStructure,
};
pub use declaration::{
    DeclarationStatus, InvestmentDeclaration, InvestmentSection, NewInvestmentDeclaration,
};
pub use employee::{Employee, NewEmployee, Organization, WorkWeekPolicy};
pub use pay_period::{FINANCIAL_YEAR_START_MONTH, FinancialYear, PayPeriod};
pub use payroll_entry::{NewPayrollEntry, PayrollAmounts, PayrollEntry};
pub use payroll_run::{
    GenerationIssue, NewPayrollRun, PayrollRun, RunStatus, RunTotals, SkipReason, StatusChange,
};
pub use tax::{StatutoryRates, TaxRegime, TaxRegimeConfig, TaxSlab};
