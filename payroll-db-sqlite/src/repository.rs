use std::path::Path;
use std::str::FromStr;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use payroll_core::{
    AttendanceRecord, AttendanceStatus, CompensationComponent, CompensationStructure,
    ComponentType, DeclarationStatus, Employee, FinancialYear, GenerationIssue,
    InvestmentDeclaration, InvestmentSection, NewCompensationStructure, NewEmployee,
    NewInvestmentDeclaration, NewPayrollEntry, NewPayrollRun, Organization, PayPeriod,
    PayrollEntry, PayrollRepository, PayrollRun, RepositoryError, RunStatus, RunTotals,
    SkipReason, StatusChange, StatutoryRates, TaxRegime, TaxRegimeConfig, TaxSlab,
    WorkWeekPolicy,
};
use rust_decimal::Decimal;
use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{Decode, Row, Sqlite, Type};

use crate::decimal::{decimal_to_text, get_decimal, get_optional_decimal};

/// Message raised by the immutability triggers in the migrations.
/// Prefix of the trigger messages; the run's status follows it.
const IMMUTABLE_RUN: &str = "immutable payroll run: ";

const EMPLOYEE_COLUMNS: &str = "id, organization_id, full_name, department, job_title, work_week,
     join_date, exit_date, tax_regime, is_active";

const DECLARATION_COLUMNS: &str = "id, employee_id, financial_year, section_code, declared_amount,
     approved_amount, status, reviewed_by, created_at, updated_at";

const RUN_COLUMNS: &str = "id, organization_id, pay_period, status, employee_count, skipped_count,
     total_gross, total_deductions, total_net, created_by, reviewed_by, approved_by, locked_by,
     created_at, reviewed_at, approved_at, locked_at, updated_at";

const ENTRY_COLUMNS: &str = "id, run_id, employee_id, regime, annual_ctc, working_days, paid_days,
     lwp_days, lwp_deduction, gross_earnings, pf_employee, pf_employer, other_deductions,
     tds_amount, tds_overridden, total_deductions, net_pay";

pub struct SqliteRepository {
    pool: SqlitePool,
}

impl SqliteRepository {
    /// Opens `database_url`, which may be a bare file path, a `sqlite:` URL
    /// or `:memory:`. Missing database files are created.
    pub async fn new(database_url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)
            .with_context(|| format!("Invalid database url: {}", database_url))?
            .create_if_missing(true)
            .foreign_keys(true);

        // Every connection to ":memory:" would otherwise see its own empty
        // database, so an in-memory pool holds exactly one long-lived connection.
        let in_memory = database_url.contains(":memory:");
        let pool_options = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(5)
        };

        let pool = pool_options
            .connect_with(options)
            .await
            .with_context(|| format!("Failed to connect to database: {}", database_url))?;
        Ok(Self { pool })
    }

    pub async fn new_with_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .context("Failed to run database migrations")?;
        Ok(())
    }

    /// Load and execute all SQL seed files from the specified directory.
    /// Files are executed in alphabetical order by filename.
    pub async fn run_seeds(
        &self,
        seeds_dir: &Path,
    ) -> Result<()> {
        let mut entries: Vec<_> = std::fs::read_dir(seeds_dir)
            .with_context(|| format!("Failed to read seeds directory '{}'", seeds_dir.display()))?
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.path().extension().is_some_and(|ext| ext == "sql"))
            .collect();

        entries.sort_by_key(|entry| entry.file_name());

        for entry in entries {
            let path = entry.path();
            let sql = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read seed file '{}'", path.display()))?;

            sqlx::raw_sql(&sql)
                .execute(&self.pool)
                .await
                .with_context(|| format!("Failed to execute seed file '{}'", path.display()))?;

            tracing::debug!(seed = %path.display(), "applied seed file");
        }

        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

// Error and column helpers

fn db_error(e: sqlx::Error) -> RepositoryError {
    if let sqlx::Error::Database(db) = &e {
        if db.is_unique_violation() {
            return RepositoryError::Duplicate(db.message().to_string());
        }
        if let Some(status) = db
            .message()
            .strip_prefix(IMMUTABLE_RUN)
            .and_then(RunStatus::parse)
        {
            return RepositoryError::Immutable(status);
        }
    }
    RepositoryError::Database(e.to_string())
}

fn col<'r, T>(
    row: &'r SqliteRow,
    column: &str,
) -> Result<T, RepositoryError>
where
    T: Decode<'r, Sqlite> + Type<Sqlite>,
{
    row.try_get(column)
        .map_err(|e| RepositoryError::Database(format!("Failed to get {}: {}", column, e)))
}

fn parsed<T>(
    row: &SqliteRow,
    column: &str,
    parse: fn(&str) -> Option<T>,
) -> Result<T, RepositoryError> {
    let raw: String = col(row, column)?;
    parse(&raw).ok_or_else(|| {
        RepositoryError::Database(format!("Unexpected value '{}' in column '{}'", raw, column))
    })
}

fn optional_parsed<T>(
    row: &SqliteRow,
    column: &str,
    parse: fn(&str) -> Option<T>,
) -> Result<Option<T>, RepositoryError> {
    let raw: Option<String> = col(row, column)?;
    raw.map(|raw| {
        parse(&raw).ok_or_else(|| {
            RepositoryError::Database(format!("Unexpected value '{}' in column '{}'", raw, column))
        })
    })
    .transpose()
}

fn posted_statuses() -> String {
    RunStatus::POSTED
        .iter()
        .map(|status| format!("'{}'", status.as_str()))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Columns stamped when a run enters `status`.
fn stamp_columns(status: RunStatus) -> Option<(&'static str, &'static str)> {
    match status {
        RunStatus::UnderReview => Some(("reviewed_by", "reviewed_at")),
        RunStatus::Approved => Some(("approved_by", "approved_at")),
        RunStatus::Locked => Some(("locked_by", "locked_at")),
        _ => None,
    }
}

// Row mappers

fn row_to_organization(row: &SqliteRow) -> Result<Organization, RepositoryError> {
    Ok(Organization {
        id: col(row, "id")?,
        name: col(row, "name")?,
        default_regime: parsed(row, "default_regime", TaxRegime::parse)?,
    })
}

fn row_to_employee(row: &SqliteRow) -> Result<Employee, RepositoryError> {
    Ok(Employee {
        id: col(row, "id")?,
        organization_id: col(row, "organization_id")?,
        full_name: col(row, "full_name")?,
        department: col(row, "department")?,
        job_title: col(row, "job_title")?,
        work_week: parsed(row, "work_week", WorkWeekPolicy::parse)?,
        join_date: col(row, "join_date")?,
        exit_date: col(row, "exit_date")?,
        tax_regime: optional_parsed(row, "tax_regime", TaxRegime::parse)?,
        is_active: col(row, "is_active")?,
    })
}

fn row_to_attendance(row: &SqliteRow) -> Result<AttendanceRecord, RepositoryError> {
    Ok(AttendanceRecord {
        employee_id: col(row, "employee_id")?,
        date: col(row, "date")?,
        status: parsed(row, "status", AttendanceStatus::parse)?,
    })
}

fn row_to_structure(row: &SqliteRow) -> Result<CompensationStructure, RepositoryError> {
    Ok(CompensationStructure {
        id: col(row, "id")?,
        employee_id: col(row, "employee_id")?,
        annual_ctc: get_decimal(row, "annual_ctc")?,
        effective_from: col(row, "effective_from")?,
        effective_to: col(row, "effective_to")?,
        revision_number: col(row, "revision_number")?,
        is_active: col(row, "is_active")?,
        components: Vec::new(),
    })
}

fn row_to_component(row: &SqliteRow) -> Result<CompensationComponent, RepositoryError> {
    Ok(CompensationComponent {
        id: col(row, "id")?,
        structure_id: col(row, "structure_id")?,
        code: col(row, "code")?,
        name: col(row, "name")?,
        component_type: parsed(row, "component_type", ComponentType::parse)?,
        annual_amount: get_decimal(row, "annual_amount")?,
        percentage_of_basic: get_optional_decimal(row, "percentage_of_basic")?,
        is_taxable: col(row, "is_taxable")?,
        display_order: col(row, "display_order")?,
    })
}

fn row_to_tax_slab(row: &SqliteRow) -> Result<TaxSlab, RepositoryError> {
    Ok(TaxSlab {
        regime: parsed(row, "regime", TaxRegime::parse)?,
        financial_year: col(row, "financial_year")?,
        min_income: get_decimal(row, "min_income")?,
        max_income: get_optional_decimal(row, "max_income")?,
        rate: get_decimal(row, "rate")?,
    })
}

fn row_to_regime_config(row: &SqliteRow) -> Result<TaxRegimeConfig, RepositoryError> {
    Ok(TaxRegimeConfig {
        regime: parsed(row, "regime", TaxRegime::parse)?,
        financial_year: col(row, "financial_year")?,
        standard_deduction: get_decimal(row, "standard_deduction")?,
        rebate_income_limit: get_decimal(row, "rebate_income_limit")?,
        rebate_max: get_decimal(row, "rebate_max")?,
        cess_rate: get_decimal(row, "cess_rate")?,
    })
}

fn row_to_statutory_rates(row: &SqliteRow) -> Result<StatutoryRates, RepositoryError> {
    Ok(StatutoryRates {
        effective_from: col(row, "effective_from")?,
        pf_wage_ceiling: get_decimal(row, "pf_wage_ceiling")?,
        pf_employee_rate: get_decimal(row, "pf_employee_rate")?,
        pf_employer_rate: get_decimal(row, "pf_employer_rate")?,
    })
}

fn row_to_section(row: &SqliteRow) -> Result<InvestmentSection, RepositoryError> {
    Ok(InvestmentSection {
        code: col(row, "code")?,
        description: col(row, "description")?,
        max_amount: get_decimal(row, "max_amount")?,
    })
}

fn row_to_declaration(row: &SqliteRow) -> Result<InvestmentDeclaration, RepositoryError> {
    Ok(InvestmentDeclaration {
        id: col(row, "id")?,
        employee_id: col(row, "employee_id")?,
        financial_year: col(row, "financial_year")?,
        section_code: col(row, "section_code")?,
        declared_amount: get_decimal(row, "declared_amount")?,
        approved_amount: get_decimal(row, "approved_amount")?,
        status: parsed(row, "status", DeclarationStatus::parse)?,
        reviewed_by: col(row, "reviewed_by")?,
        created_at: col::<DateTime<Utc>>(row, "created_at")?,
        updated_at: col::<DateTime<Utc>>(row, "updated_at")?,
    })
}

fn row_to_run(row: &SqliteRow) -> Result<PayrollRun, RepositoryError> {
    Ok(PayrollRun {
        id: col(row, "id")?,
        organization_id: col(row, "organization_id")?,
        pay_period: parsed(row, "pay_period", PayPeriod::parse)?,
        status: parsed(row, "status", RunStatus::parse)?,
        employee_count: col(row, "employee_count")?,
        skipped_count: col(row, "skipped_count")?,
        total_gross: get_decimal(row, "total_gross")?,
        total_deductions: get_decimal(row, "total_deductions")?,
        total_net: get_decimal(row, "total_net")?,
        created_by: col(row, "created_by")?,
        reviewed_by: col(row, "reviewed_by")?,
        approved_by: col(row, "approved_by")?,
        locked_by: col(row, "locked_by")?,
        created_at: col::<DateTime<Utc>>(row, "created_at")?,
        reviewed_at: col::<Option<DateTime<Utc>>>(row, "reviewed_at")?,
        approved_at: col::<Option<DateTime<Utc>>>(row, "approved_at")?,
        locked_at: col::<Option<DateTime<Utc>>>(row, "locked_at")?,
        updated_at: col::<DateTime<Utc>>(row, "updated_at")?,
    })
}

fn row_to_entry(row: &SqliteRow) -> Result<PayrollEntry, RepositoryError> {
    Ok(PayrollEntry {
        id: col(row, "id")?,
        run_id: col(row, "run_id")?,
        employee_id: col(row, "employee_id")?,
        regime: parsed(row, "regime", TaxRegime::parse)?,
        annual_ctc: get_decimal(row, "annual_ctc")?,
        working_days: col(row, "working_days")?,
        paid_days: get_decimal(row, "paid_days")?,
        lwp_days: get_decimal(row, "lwp_days")?,
        lwp_deduction: get_decimal(row, "lwp_deduction")?,
        gross_earnings: get_decimal(row, "gross_earnings")?,
        pf_employee: get_decimal(row, "pf_employee")?,
        pf_employer: get_decimal(row, "pf_employer")?,
        other_deductions: get_decimal(row, "other_deductions")?,
        tds_amount: get_decimal(row, "tds_amount")?,
        tds_overridden: col(row, "tds_overridden")?,
        total_deductions: get_decimal(row, "total_deductions")?,
        net_pay: get_decimal(row, "net_pay")?,
    })
}

fn row_to_issue(row: &SqliteRow) -> Result<GenerationIssue, RepositoryError> {
    Ok(GenerationIssue {
        employee_id: col(row, "employee_id")?,
        reason: parsed(row, "reason", SkipReason::parse)?,
        detail: col(row, "detail")?,
    })
}

// Statements shared by the transactional operations

async fn fetch_run(
    conn: &mut SqliteConnection,
    run_id: i64,
) -> Result<PayrollRun, RepositoryError> {
    let row = sqlx::query(&format!("SELECT {RUN_COLUMNS} FROM payroll_runs WHERE id = ?"))
        .bind(run_id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(db_error)?
        .ok_or(RepositoryError::NotFound)?;

    row_to_run(&row)
}

/// Explains why a compare-and-swap on `run_id` matched no row.
async fn lost_run_cas(
    conn: &mut SqliteConnection,
    run_id: i64,
    expected: RunStatus,
) -> RepositoryError {
    match fetch_run(conn, run_id).await {
        Ok(run) if run.status.is_immutable() && run.status != expected => {
            RepositoryError::Immutable(run.status)
        }
        Ok(run) => RepositoryError::Conflict(format!(
            "payroll run {} is {}, expected {}",
            run_id, run.status, expected
        )),
        Err(err) => err,
    }
}

async fn insert_structure(
    conn: &mut SqliteConnection,
    structure: NewCompensationStructure,
    revision_number: i32,
) -> Result<CompensationStructure, RepositoryError> {
    let result = sqlx::query(
        "INSERT INTO compensation_structures
            (employee_id, annual_ctc, effective_from, effective_to, revision_number, is_active)
         VALUES (?, ?, ?, NULL, ?, 1)",
    )
    .bind(structure.employee_id)
    .bind(decimal_to_text(structure.annual_ctc))
    .bind(structure.effective_from)
    .bind(revision_number)
    .execute(&mut *conn)
    .await
    .map_err(db_error)?;

    let structure_id = result.last_insert_rowid();
    let mut components = Vec::with_capacity(structure.components.len());

    for component in structure.components {
        let result = sqlx::query(
            "INSERT INTO compensation_components
                (structure_id, code, name, component_type, annual_amount,
                 percentage_of_basic, is_taxable, display_order)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(structure_id)
        .bind(&component.code)
        .bind(&component.name)
        .bind(component.component_type.as_str())
        .bind(decimal_to_text(component.annual_amount))
        .bind(component.percentage_of_basic.map(decimal_to_text))
        .bind(component.is_taxable)
        .bind(component.display_order)
        .execute(&mut *conn)
        .await
        .map_err(db_error)?;

        components.push(CompensationComponent {
            id: result.last_insert_rowid(),
            structure_id,
            code: component.code,
            name: component.name,
            component_type: component.component_type,
            annual_amount: component.annual_amount,
            percentage_of_basic: component.percentage_of_basic,
            is_taxable: component.is_taxable,
            display_order: component.display_order,
        });
    }

    components.sort_by_key(|c| (c.display_order, c.id));

    Ok(CompensationStructure {
        id: structure_id,
        employee_id: structure.employee_id,
        annual_ctc: structure.annual_ctc,
        effective_from: structure.effective_from,
        effective_to: None,
        revision_number,
        is_active: true,
        components,
    })
}

async fn insert_entry(
    conn: &mut SqliteConnection,
    run_id: i64,
    entry: &NewPayrollEntry,
) -> Result<(), RepositoryError> {
    sqlx::query(
        "INSERT INTO payroll_entries
            (run_id, employee_id, regime, annual_ctc, working_days, paid_days, lwp_days,
             lwp_deduction, gross_earnings, pf_employee, pf_employer, other_deductions,
             tds_amount, tds_overridden, total_deductions, net_pay)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 0, ?, ?)",
    )
    .bind(run_id)
    .bind(entry.employee_id)
    .bind(entry.regime.as_str())
    .bind(decimal_to_text(entry.annual_ctc))
    .bind(entry.working_days)
    .bind(decimal_to_text(entry.paid_days))
    .bind(decimal_to_text(entry.lwp_days))
    .bind(decimal_to_text(entry.lwp_deduction))
    .bind(decimal_to_text(entry.gross_earnings))
    .bind(decimal_to_text(entry.pf_employee))
    .bind(decimal_to_text(entry.pf_employer))
    .bind(decimal_to_text(entry.other_deductions))
    .bind(decimal_to_text(entry.tds_amount))
    .bind(decimal_to_text(entry.total_deductions))
    .bind(decimal_to_text(entry.net_pay))
    .execute(&mut *conn)
    .await
    .map_err(db_error)?;

    Ok(())
}

async fn entries_of(
    conn: &mut SqliteConnection,
    run_id: i64,
) -> Result<Vec<PayrollEntry>, RepositoryError> {
    let rows = sqlx::query(&format!(
        "SELECT {ENTRY_COLUMNS} FROM payroll_entries WHERE run_id = ? ORDER BY employee_id"
    ))
    .bind(run_id)
    .fetch_all(&mut *conn)
    .await
    .map_err(db_error)?;

    rows.iter().map(row_to_entry).collect()
}

async fn write_totals(
    conn: &mut SqliteConnection,
    run_id: i64,
    expected: RunStatus,
    totals: RunTotals,
) -> Result<(), RepositoryError> {
    let result = sqlx::query(
        "UPDATE payroll_runs
         SET employee_count = ?, total_gross = ?, total_deductions = ?, total_net = ?
         WHERE id = ? AND status = ?",
    )
    .bind(totals.employee_count)
    .bind(decimal_to_text(totals.total_gross))
    .bind(decimal_to_text(totals.total_deductions))
    .bind(decimal_to_text(totals.total_net))
    .bind(run_id)
    .bind(expected.as_str())
    .execute(&mut *conn)
    .await
    .map_err(db_error)?;

    if result.rows_affected() == 0 {
        return Err(lost_run_cas(conn, run_id, expected).await);
    }

    Ok(())
}

/// Moves the run from `change.from` to `change.to`, stamping reviewer,
/// approver or locker columns as needed.
async fn apply_status_change(
    conn: &mut SqliteConnection,
    change: &StatusChange,
) -> Result<(), RepositoryError> {
    let stamp = stamp_columns(change.to)
        .map(|(by, at)| format!(", {by} = ?, {at} = ?"))
        .unwrap_or_default();
    let sql = format!("UPDATE payroll_runs SET status = ?, updated_at = ?{stamp} WHERE id = ? AND status = ?");

    let mut query = sqlx::query(&sql).bind(change.to.as_str()).bind(change.at);
    if stamp_columns(change.to).is_some() {
        query = query.bind(&change.actor).bind(change.at);
    }

    let result = query
        .bind(change.run_id)
        .bind(change.from.as_str())
        .execute(&mut *conn)
        .await
        .map_err(db_error)?;

    if result.rows_affected() == 0 {
        return Err(lost_run_cas(conn, change.run_id, change.from).await);
    }

    Ok(())
}

#[async_trait]
impl PayrollRepository for SqliteRepository {
    async fn create_organization(
        &self,
        name: &str,
        default_regime: TaxRegime,
    ) -> Result<Organization, RepositoryError> {
        let result = sqlx::query("INSERT INTO organizations (name, default_regime) VALUES (?, ?)")
            .bind(name)
            .bind(default_regime.as_str())
            .execute(&self.pool)
            .await
            .map_err(db_error)?;

        Ok(Organization {
            id: result.last_insert_rowid(),
            name: name.to_string(),
            default_regime,
        })
    }

    async fn get_organization(
        &self,
        organization_id: i64,
    ) -> Result<Organization, RepositoryError> {
        let row = sqlx::query("SELECT id, name, default_regime FROM organizations WHERE id = ?")
            .bind(organization_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?
            .ok_or(RepositoryError::NotFound)?;

        row_to_organization(&row)
    }

    async fn create_employee(
        &self,
        employee: NewEmployee,
    ) -> Result<Employee, RepositoryError> {
        let result = sqlx::query(
            "INSERT INTO employees
                (organization_id, full_name, department, job_title, work_week,
                 join_date, exit_date, tax_regime, is_active)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, 1)",
        )
        .bind(employee.organization_id)
        .bind(&employee.full_name)
        .bind(&employee.department)
        .bind(&employee.job_title)
        .bind(employee.work_week.as_str())
        .bind(employee.join_date)
        .bind(employee.exit_date)
        .bind(employee.tax_regime.map(|r| r.as_str()))
        .execute(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(Employee {
            id: result.last_insert_rowid(),
            organization_id: employee.organization_id,
            full_name: employee.full_name,
            department: employee.department,
            job_title: employee.job_title,
            work_week: employee.work_week,
            join_date: employee.join_date,
            exit_date: employee.exit_date,
            tax_regime: employee.tax_regime,
            is_active: true,
        })
    }

    async fn get_employee(
        &self,
        organization_id: i64,
        employee_id: i64,
    ) -> Result<Employee, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {EMPLOYEE_COLUMNS} FROM employees WHERE id = ? AND organization_id = ?"
        ))
        .bind(employee_id)
        .bind(organization_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?
        .ok_or(RepositoryError::NotFound)?;

        row_to_employee(&row)
    }

    async fn list_active_employees(
        &self,
        organization_id: i64,
    ) -> Result<Vec<Employee>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {EMPLOYEE_COLUMNS} FROM employees
             WHERE organization_id = ? AND is_active = 1
             ORDER BY id"
        ))
        .bind(organization_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;

        rows.iter().map(row_to_employee).collect()
    }

    async fn record_attendance(
        &self,
        records: &[AttendanceRecord],
    ) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await.map_err(db_error)?;

        for record in records {
            sqlx::query(
                "INSERT INTO attendance (employee_id, date, status) VALUES (?, ?, ?)
                 ON CONFLICT (employee_id, date) DO UPDATE SET status = excluded.status",
            )
            .bind(record.employee_id)
            .bind(record.date)
            .bind(record.status.as_str())
            .execute(&mut *tx)
            .await
            .map_err(db_error)?;
        }

        tx.commit().await.map_err(db_error)?;
        Ok(())
    }

    async fn list_attendance(
        &self,
        employee_id: i64,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<AttendanceRecord>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT employee_id, date, status FROM attendance
             WHERE employee_id = ? AND date BETWEEN ? AND ?
             ORDER BY date",
        )
        .bind(employee_id)
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;

        rows.iter().map(row_to_attendance).collect()
    }

    async fn list_compensation_structures(
        &self,
        employee_id: i64,
    ) -> Result<Vec<CompensationStructure>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, employee_id, annual_ctc, effective_from, effective_to,
                    revision_number, is_active
             FROM compensation_structures
             WHERE employee_id = ?
             ORDER BY revision_number",
        )
        .bind(employee_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;

        let mut structures = rows
            .iter()
            .map(row_to_structure)
            .collect::<Result<Vec<_>, _>>()?;

        let component_rows = sqlx::query(
            "SELECT c.id, c.structure_id, c.code, c.name, c.component_type, c.annual_amount,
                    c.percentage_of_basic, c.is_taxable, c.display_order
             FROM compensation_components c
             JOIN compensation_structures s ON s.id = c.structure_id
             WHERE s.employee_id = ?
             ORDER BY c.structure_id, c.display_order, c.id",
        )
        .bind(employee_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;

        for row in &component_rows {
            let component = row_to_component(row)?;
            if let Some(structure) = structures.iter_mut().find(|s| s.id == component.structure_id) {
                structure.components.push(component);
            }
        }

        Ok(structures)
    }

    async fn create_compensation_structure(
        &self,
        structure: NewCompensationStructure,
    ) -> Result<CompensationStructure, RepositoryError> {
        let mut tx = self.pool.begin().await.map_err(db_error)?;
        let stored = insert_structure(&mut tx, structure, 1).await?;
        tx.commit().await.map_err(db_error)?;
        Ok(stored)
    }

    async fn revise_compensation_structure(
        &self,
        current_id: i64,
        close_on: NaiveDate,
        revision: NewCompensationStructure,
    ) -> Result<CompensationStructure, RepositoryError> {
        let mut tx = self.pool.begin().await.map_err(db_error)?;

        let row = sqlx::query(
            "SELECT revision_number FROM compensation_structures WHERE id = ? AND employee_id = ?",
        )
        .bind(current_id)
        .bind(revision.employee_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_error)?
        .ok_or(RepositoryError::NotFound)?;
        let current_revision: i32 = col(&row, "revision_number")?;

        let closed = sqlx::query(
            "UPDATE compensation_structures SET effective_to = ?, is_active = 0
             WHERE id = ? AND is_active = 1 AND effective_to IS NULL",
        )
        .bind(close_on)
        .bind(current_id)
        .execute(&mut *tx)
        .await
        .map_err(db_error)?;

        if closed.rows_affected() == 0 {
            return Err(RepositoryError::Conflict(format!(
                "compensation structure {} is no longer active",
                current_id
            )));
        }

        let stored = insert_structure(&mut tx, revision, current_revision + 1).await?;
        tx.commit().await.map_err(db_error)?;
        Ok(stored)
    }

    async fn get_tax_slabs(
        &self,
        regime: TaxRegime,
        financial_year: i32,
    ) -> Result<Vec<TaxSlab>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT regime, financial_year, min_income, max_income, rate
             FROM tax_slabs WHERE regime = ? AND financial_year = ?",
        )
        .bind(regime.as_str())
        .bind(financial_year)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;

        // Amounts are TEXT, so order numerically here rather than in SQL.
        let mut slabs = rows
            .iter()
            .map(row_to_tax_slab)
            .collect::<Result<Vec<_>, _>>()?;
        slabs.sort_by(|a, b| a.min_income.cmp(&b.min_income));
        Ok(slabs)
    }

    async fn insert_tax_slab(
        &self,
        slab: &TaxSlab,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO tax_slabs (regime, financial_year, min_income, max_income, rate)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(slab.regime.as_str())
        .bind(slab.financial_year)
        .bind(decimal_to_text(slab.min_income))
        .bind(slab.max_income.map(decimal_to_text))
        .bind(decimal_to_text(slab.rate))
        .execute(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(())
    }

    async fn delete_tax_slabs(
        &self,
        regime: TaxRegime,
        financial_year: i32,
    ) -> Result<(), RepositoryError> {
        sqlx::query("DELETE FROM tax_slabs WHERE regime = ? AND financial_year = ?")
            .bind(regime.as_str())
            .bind(financial_year)
            .execute(&self.pool)
            .await
            .map_err(db_error)?;

        Ok(())
    }

    async fn get_regime_config(
        &self,
        regime: TaxRegime,
        financial_year: i32,
    ) -> Result<TaxRegimeConfig, RepositoryError> {
        let row = sqlx::query(
            "SELECT regime, financial_year, standard_deduction, rebate_income_limit,
                    rebate_max, cess_rate
             FROM tax_regime_config WHERE regime = ? AND financial_year = ?",
        )
        .bind(regime.as_str())
        .bind(financial_year)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?
        .ok_or(RepositoryError::NotFound)?;

        row_to_regime_config(&row)
    }

    async fn list_statutory_rates(&self) -> Result<Vec<StatutoryRates>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT effective_from, pf_wage_ceiling, pf_employee_rate, pf_employer_rate
             FROM statutory_rates ORDER BY effective_from",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;

        rows.iter().map(row_to_statutory_rates).collect()
    }

    async fn list_investment_sections(&self) -> Result<Vec<InvestmentSection>, RepositoryError> {
        let rows = sqlx::query("SELECT code, description, max_amount FROM investment_sections ORDER BY code")
            .fetch_all(&self.pool)
            .await
            .map_err(db_error)?;

        rows.iter().map(row_to_section).collect()
    }

    async fn create_declaration(
        &self,
        declaration: NewInvestmentDeclaration,
        at: DateTime<Utc>,
    ) -> Result<InvestmentDeclaration, RepositoryError> {
        let result = sqlx::query(
            "INSERT INTO investment_declarations
                (employee_id, financial_year, section_code, declared_amount, approved_amount,
                 status, reviewed_by, created_at, updated_at)
             VALUES (?, ?, ?, ?, '0', ?, NULL, ?, ?)",
        )
        .bind(declaration.employee_id)
        .bind(declaration.financial_year)
        .bind(&declaration.section_code)
        .bind(decimal_to_text(declaration.declared_amount))
        .bind(DeclarationStatus::Submitted.as_str())
        .bind(at)
        .bind(at)
        .execute(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(InvestmentDeclaration {
            id: result.last_insert_rowid(),
            employee_id: declaration.employee_id,
            financial_year: declaration.financial_year,
            section_code: declaration.section_code,
            declared_amount: declaration.declared_amount,
            approved_amount: Decimal::ZERO,
            status: DeclarationStatus::Submitted,
            reviewed_by: None,
            created_at: at,
            updated_at: at,
        })
    }

    async fn get_declaration(
        &self,
        declaration_id: i64,
    ) -> Result<InvestmentDeclaration, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {DECLARATION_COLUMNS} FROM investment_declarations WHERE id = ?"
        ))
        .bind(declaration_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?
        .ok_or(RepositoryError::NotFound)?;

        row_to_declaration(&row)
    }

    async fn update_declaration(
        &self,
        declaration: &InvestmentDeclaration,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            "UPDATE investment_declarations
             SET approved_amount = ?, status = ?, reviewed_by = ?, updated_at = ?
             WHERE id = ? AND status = ?",
        )
        .bind(decimal_to_text(declaration.approved_amount))
        .bind(declaration.status.as_str())
        .bind(&declaration.reviewed_by)
        .bind(declaration.updated_at)
        .bind(declaration.id)
        .bind(DeclarationStatus::Submitted.as_str())
        .execute(&self.pool)
        .await
        .map_err(db_error)?;

        if result.rows_affected() == 0 {
            let current = self.get_declaration(declaration.id).await?;
            return Err(RepositoryError::Conflict(format!(
                "declaration {} is already {}",
                declaration.id,
                current.status.as_str()
            )));
        }

        Ok(())
    }

    async fn list_declarations(
        &self,
        employee_id: i64,
        financial_year: i32,
    ) -> Result<Vec<InvestmentDeclaration>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {DECLARATION_COLUMNS} FROM investment_declarations
             WHERE employee_id = ? AND financial_year = ?
             ORDER BY section_code"
        ))
        .bind(employee_id)
        .bind(financial_year)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;

        rows.iter().map(row_to_declaration).collect()
    }

    async fn create_run(
        &self,
        run: NewPayrollRun,
    ) -> Result<PayrollRun, RepositoryError> {
        if !matches!(run.status, RunStatus::Draft | RunStatus::Processing) {
            return Err(RepositoryError::Conflict(format!(
                "payroll run cannot start as {}",
                run.status
            )));
        }

        let result = sqlx::query(
            "INSERT INTO payroll_runs
                (organization_id, pay_period, status, created_by, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(run.organization_id)
        .bind(run.pay_period.to_string())
        .bind(run.status.as_str())
        .bind(&run.created_by)
        .bind(run.created_at)
        .bind(run.created_at)
        .execute(&self.pool)
        .await
        .map_err(db_error)?;

        self.get_run(run.organization_id, result.last_insert_rowid())
            .await
    }

    async fn get_run(
        &self,
        organization_id: i64,
        run_id: i64,
    ) -> Result<PayrollRun, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {RUN_COLUMNS} FROM payroll_runs WHERE id = ? AND organization_id = ?"
        ))
        .bind(run_id)
        .bind(organization_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?
        .ok_or(RepositoryError::NotFound)?;

        row_to_run(&row)
    }

    async fn find_run(
        &self,
        organization_id: i64,
        pay_period: PayPeriod,
    ) -> Result<Option<PayrollRun>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {RUN_COLUMNS} FROM payroll_runs WHERE organization_id = ? AND pay_period = ?"
        ))
        .bind(organization_id)
        .bind(pay_period.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;

        row.as_ref().map(row_to_run).transpose()
    }

    async fn list_runs(
        &self,
        organization_id: i64,
    ) -> Result<Vec<PayrollRun>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {RUN_COLUMNS} FROM payroll_runs
             WHERE organization_id = ?
             ORDER BY pay_period DESC"
        ))
        .bind(organization_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;

        rows.iter().map(row_to_run).collect()
    }

    async fn transition_run(
        &self,
        change: &StatusChange,
    ) -> Result<PayrollRun, RepositoryError> {
        let mut tx = self.pool.begin().await.map_err(db_error)?;

        apply_status_change(&mut tx, change).await?;
        let run = fetch_run(&mut tx, change.run_id).await?;

        tx.commit().await.map_err(db_error)?;
        Ok(run)
    }

    async fn store_run_results(
        &self,
        entries: &[NewPayrollEntry],
        issues: &[GenerationIssue],
        change: &StatusChange,
    ) -> Result<PayrollRun, RepositoryError> {
        let run_id = change.run_id;
        let mut tx = self.pool.begin().await.map_err(db_error)?;

        apply_status_change(&mut tx, change).await?;

        sqlx::query("DELETE FROM payroll_entries WHERE run_id = ?")
            .bind(run_id)
            .execute(&mut *tx)
            .await
            .map_err(db_error)?;
        sqlx::query("DELETE FROM payroll_generation_log WHERE run_id = ?")
            .bind(run_id)
            .execute(&mut *tx)
            .await
            .map_err(db_error)?;

        for entry in entries {
            insert_entry(&mut tx, run_id, entry).await?;
        }

        for issue in issues {
            sqlx::query(
                "INSERT INTO payroll_generation_log (run_id, employee_id, reason, detail)
                 VALUES (?, ?, ?, ?)",
            )
            .bind(run_id)
            .bind(issue.employee_id)
            .bind(issue.reason.as_str())
            .bind(&issue.detail)
            .execute(&mut *tx)
            .await
            .map_err(db_error)?;
        }

        sqlx::query("UPDATE payroll_runs SET skipped_count = ? WHERE id = ?")
            .bind(issues.len() as i64)
            .bind(run_id)
            .execute(&mut *tx)
            .await
            .map_err(db_error)?;

        write_totals(&mut tx, run_id, change.to, RunTotals::from_entries(entries)).await?;
        let run = fetch_run(&mut tx, run_id).await?;

        tx.commit().await.map_err(db_error)?;
        Ok(run)
    }

    async fn update_entry(
        &self,
        entry: &PayrollEntry,
        expected: RunStatus,
    ) -> Result<PayrollRun, RepositoryError> {
        let mut tx = self.pool.begin().await.map_err(db_error)?;

        let run = fetch_run(&mut tx, entry.run_id).await?;
        if run.status != expected {
            return Err(lost_run_cas(&mut tx, entry.run_id, expected).await);
        }

        let result = sqlx::query(
            "UPDATE payroll_entries
             SET regime = ?, annual_ctc = ?, working_days = ?, paid_days = ?, lwp_days = ?,
                 lwp_deduction = ?, gross_earnings = ?, pf_employee = ?, pf_employer = ?,
                 other_deductions = ?, tds_amount = ?, tds_overridden = ?,
                 total_deductions = ?, net_pay = ?
             WHERE id = ? AND run_id = ?",
        )
        .bind(entry.regime.as_str())
        .bind(decimal_to_text(entry.annual_ctc))
        .bind(entry.working_days)
        .bind(decimal_to_text(entry.paid_days))
        .bind(decimal_to_text(entry.lwp_days))
        .bind(decimal_to_text(entry.lwp_deduction))
        .bind(decimal_to_text(entry.gross_earnings))
        .bind(decimal_to_text(entry.pf_employee))
        .bind(decimal_to_text(entry.pf_employer))
        .bind(decimal_to_text(entry.other_deductions))
        .bind(decimal_to_text(entry.tds_amount))
        .bind(entry.tds_overridden)
        .bind(decimal_to_text(entry.total_deductions))
        .bind(decimal_to_text(entry.net_pay))
        .bind(entry.id)
        .bind(entry.run_id)
        .execute(&mut *tx)
        .await
        .map_err(db_error)?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }

        let entries = entries_of(&mut tx, entry.run_id).await?;
        write_totals(&mut tx, entry.run_id, expected, RunTotals::from_entries(&entries)).await?;
        let run = fetch_run(&mut tx, entry.run_id).await?;

        tx.commit().await.map_err(db_error)?;
        Ok(run)
    }

    async fn delete_run(
        &self,
        run_id: i64,
        expected: RunStatus,
    ) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await.map_err(db_error)?;

        let result = sqlx::query("DELETE FROM payroll_runs WHERE id = ? AND status = ?")
            .bind(run_id)
            .bind(expected.as_str())
            .execute(&mut *tx)
            .await
            .map_err(db_error)?;

        if result.rows_affected() == 0 {
            return Err(lost_run_cas(&mut tx, run_id, expected).await);
        }

        tx.commit().await.map_err(db_error)?;
        Ok(())
    }

    async fn get_entry(
        &self,
        run_id: i64,
        employee_id: i64,
    ) -> Result<PayrollEntry, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {ENTRY_COLUMNS} FROM payroll_entries WHERE run_id = ? AND employee_id = ?"
        ))
        .bind(run_id)
        .bind(employee_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?
        .ok_or(RepositoryError::NotFound)?;

        row_to_entry(&row)
    }

    async fn list_entries(
        &self,
        run_id: i64,
    ) -> Result<Vec<PayrollEntry>, RepositoryError> {
        let mut conn = self.pool.acquire().await.map_err(db_error)?;
        entries_of(&mut conn, run_id).await
    }

    async fn list_generation_log(
        &self,
        run_id: i64,
    ) -> Result<Vec<GenerationIssue>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT employee_id, reason, detail FROM payroll_generation_log
             WHERE run_id = ? ORDER BY employee_id, id",
        )
        .bind(run_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;

        rows.iter().map(row_to_issue).collect()
    }

    async fn tds_withheld(
        &self,
        employee_id: i64,
        financial_year: FinancialYear,
        before: PayPeriod,
    ) -> Result<Decimal, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT e.tds_amount
             FROM payroll_entries e
             JOIN payroll_runs r ON r.id = e.run_id
             WHERE e.employee_id = ?
               AND r.pay_period >= ? AND r.pay_period <= ? AND r.pay_period < ?
               AND r.status IN ({})",
            posted_statuses()
        ))
        .bind(employee_id)
        .bind(financial_year.first_period().to_string())
        .bind(financial_year.last_period().to_string())
        .bind(before.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;

        rows.iter()
            .map(|row| get_decimal(row, "tds_amount"))
            .sum()
    }
}
