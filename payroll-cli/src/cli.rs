//! Command-line surface of the `payroll` binary.

use std::path::PathBuf;

use anyhow::Context;
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use payroll_core::{
    NewCompensationStructure, NewEmployee, NewInvestmentDeclaration, PayPeriod, PayrollEngine,
    TaxRegime, WorkWeekPolicy,
};
use rust_decimal::Decimal;
use tracing::info;

use crate::config::CliConfig;
use crate::{csv_import, report};

/// Monthly payroll with statutory deductions and an approval workflow.
///
/// Settings come from `payroll.toml` (or `--config`); the flags below
/// override the file.
#[derive(Debug, Parser)]
#[command(name = "payroll", version)]
pub struct Cli {
    /// TOML configuration file.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Database backend, overriding `[database].backend`.
    #[arg(long, global = true)]
    pub backend: Option<String>,

    /// Connection string, overriding `[database].connection_string`.
    /// For SQLite this is a file path (e.g. `payroll.db`) or `:memory:`.
    #[arg(long, global = true)]
    pub db: Option<String>,

    /// Log filter used when RUST_LOG is unset, overriding `[logging].level`.
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Acting user; must appear in the `[users]` table.
    #[arg(long, short, global = true)]
    pub user: Option<String>,

    /// Organization the command applies to.
    #[arg(long, global = true, default_value_t = 1)]
    pub org: i64,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    pub fn apply_overrides(
        &self,
        config: &mut CliConfig,
    ) {
        if let Some(backend) = &self.backend {
            config.database.backend = backend.clone();
        }
        if let Some(db) = &self.db {
            config.database.connection_string = db.clone();
        }
        if let Some(level) = &self.log_level {
            config.logging.level = level.clone();
        }
    }

    fn user(&self) -> anyhow::Result<&str> {
        self.user
            .as_deref()
            .context("this command needs an acting user; pass --user")
    }
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Organizations.
    #[command(subcommand)]
    Org(OrgCommand),

    /// Employee directory.
    #[command(subcommand)]
    Employee(EmployeeCommand),

    /// Attendance records.
    #[command(subcommand)]
    Attendance(AttendanceCommand),

    /// Compensation structures.
    #[command(subcommand)]
    Compensation(CompensationCommand),

    /// Investment declarations.
    #[command(subcommand)]
    Declaration(DeclarationCommand),

    /// Payroll runs.
    #[command(subcommand)]
    Run(RunCommand),
}

#[derive(Debug, Subcommand)]
pub enum OrgCommand {
    Create {
        #[arg(long)]
        name: String,

        /// Tax regime for employees without their own election.
        #[arg(long, default_value = "new", value_parser = parse_regime)]
        regime: TaxRegime,
    },
}

#[derive(Debug, Subcommand)]
pub enum EmployeeCommand {
    Add(EmployeeArgs),
}

#[derive(Debug, Args)]
pub struct EmployeeArgs {
    #[arg(long)]
    pub name: String,

    #[arg(long)]
    pub join_date: NaiveDate,

    #[arg(long)]
    pub exit_date: Option<NaiveDate>,

    #[arg(long)]
    pub department: Option<String>,

    #[arg(long)]
    pub title: Option<String>,

    /// `five_day` or `six_day`.
    #[arg(long, default_value = "five_day", value_parser = parse_work_week)]
    pub work_week: WorkWeekPolicy,

    /// Elected regime; the organization default applies when omitted.
    #[arg(long, value_parser = parse_regime)]
    pub regime: Option<TaxRegime>,
}

#[derive(Debug, Subcommand)]
pub enum AttendanceCommand {
    /// Load `employee_id,date,status` rows, replacing existing days.
    Import {
        #[arg(long)]
        file: PathBuf,
    },
}

#[derive(Debug, Args)]
pub struct StructureArgs {
    #[arg(long)]
    pub employee: i64,

    #[arg(long)]
    pub effective_from: NaiveDate,

    #[arg(long)]
    pub ctc: Decimal,

    /// Components CSV (`code,name,component_type,annual_amount,...`).
    #[arg(long)]
    pub components: PathBuf,
}

impl StructureArgs {
    fn load(&self) -> anyhow::Result<NewCompensationStructure> {
        let components = csv_import::components_from_file(&self.components)?;
        Ok(NewCompensationStructure {
            employee_id: self.employee,
            annual_ctc: self.ctc,
            effective_from: self.effective_from,
            components,
        })
    }
}

#[derive(Debug, Subcommand)]
pub enum CompensationCommand {
    /// First structure for a new hire.
    Assign(StructureArgs),

    /// Replace the active structure from a later date.
    Revise(StructureArgs),

    History {
        #[arg(long)]
        employee: i64,
    },
}

#[derive(Debug, Subcommand)]
pub enum DeclarationCommand {
    Submit {
        #[arg(long)]
        employee: i64,

        /// Year the financial year starts in, e.g. 2025 for 2025-26.
        #[arg(long)]
        fy: i32,

        #[arg(long)]
        section: String,

        #[arg(long)]
        amount: Decimal,
    },

    /// Approve, optionally for less than was declared.
    Approve {
        #[arg(long)]
        id: i64,

        #[arg(long)]
        amount: Option<Decimal>,
    },

    Reject {
        #[arg(long)]
        id: i64,
    },

    List {
        #[arg(long)]
        employee: i64,

        #[arg(long)]
        fy: i32,
    },
}

#[derive(Debug, Subcommand)]
pub enum RunCommand {
    /// Create and compute the run for a `YYYY-MM` period.
    Generate {
        #[arg(long, value_parser = parse_period)]
        period: PayPeriod,
    },

    /// Recompute every entry of an unreviewed run.
    Regenerate {
        #[arg(long)]
        run: i64,
    },

    /// Recompute one employee's entry from current data.
    Recompute {
        #[arg(long)]
        run: i64,

        #[arg(long)]
        employee: i64,
    },

    /// Replace one employee's computed TDS.
    OverrideTds {
        #[arg(long)]
        run: i64,

        #[arg(long)]
        employee: i64,

        #[arg(long)]
        amount: Decimal,
    },

    Submit {
        #[arg(long)]
        run: i64,
    },

    Approve {
        #[arg(long)]
        run: i64,
    },

    Lock {
        #[arg(long)]
        run: i64,
    },

    Delete {
        #[arg(long)]
        run: i64,
    },

    Show {
        #[arg(long)]
        run: i64,
    },

    List,

    Entries {
        #[arg(long)]
        run: i64,
    },

    /// Employees skipped by the last generation.
    Log {
        #[arg(long)]
        run: i64,
    },

    /// Write the run as TOML to stdout or `--output`.
    Export {
        #[arg(long)]
        run: i64,

        #[arg(long)]
        output: Option<PathBuf>,
    },
}

pub fn parse_period(s: &str) -> Result<PayPeriod, String> {
    PayPeriod::parse(s).ok_or_else(|| format!("'{s}' is not a YYYY-MM pay period"))
}

pub fn parse_regime(s: &str) -> Result<TaxRegime, String> {
    TaxRegime::parse(&s.to_ascii_lowercase()).ok_or_else(|| format!("unknown tax regime '{s}'"))
}

pub fn parse_work_week(s: &str) -> Result<WorkWeekPolicy, String> {
    WorkWeekPolicy::parse(&s.to_ascii_lowercase())
        .ok_or_else(|| format!("unknown work week '{s}'; expected five_day or six_day"))
}

/// Runs the parsed command and returns what should be printed.
pub async fn execute(
    cli: &Cli,
    engine: &PayrollEngine,
) -> anyhow::Result<String> {
    let org = cli.org;

    match &cli.command {
        Command::Org(OrgCommand::Create { name, regime }) => {
            let created = engine.repository().create_organization(name, *regime).await?;
            info!(organization_id = created.id, "organization created");
            Ok(format!("organization {} created: {}\n", created.id, created.name))
        }

        Command::Employee(EmployeeCommand::Add(args)) => {
            let employee = engine
                .repository()
                .create_employee(NewEmployee {
                    organization_id: org,
                    full_name: args.name.clone(),
                    department: args.department.clone(),
                    job_title: args.title.clone(),
                    work_week: args.work_week,
                    join_date: args.join_date,
                    exit_date: args.exit_date,
                    tax_regime: args.regime,
                })
                .await?;
            info!(employee_id = employee.id, organization_id = org, "employee added");
            Ok(format!("employee {} added: {}\n", employee.id, employee.full_name))
        }

        Command::Attendance(AttendanceCommand::Import { file }) => {
            let records = csv_import::attendance_from_file(file)?;
            for employee_id in distinct_employees(&records) {
                engine
                    .repository()
                    .get_employee(org, employee_id)
                    .await
                    .with_context(|| format!("employee {employee_id} in '{}'", file.display()))?;
            }
            engine.repository().record_attendance(&records).await?;
            info!(count = records.len(), file = %file.display(), "attendance imported");
            Ok(format!("{} attendance records imported\n", records.len()))
        }

        Command::Compensation(command) => compensation(cli, engine, command).await,
        Command::Declaration(command) => declaration(cli, engine, command).await,
        Command::Run(command) => run(cli, engine, command).await,
    }
}

fn distinct_employees(records: &[payroll_core::AttendanceRecord]) -> Vec<i64> {
    let mut ids: Vec<i64> = records.iter().map(|r| r.employee_id).collect();
    ids.sort_unstable();
    ids.dedup();
    ids
}

async fn compensation(
    cli: &Cli,
    engine: &PayrollEngine,
    command: &CompensationCommand,
) -> anyhow::Result<String> {
    let user = cli.user()?;
    match command {
        CompensationCommand::Assign(args) => {
            let stored = engine.assign_compensation(user, cli.org, args.load()?).await?;
            Ok(report::compensation_history(std::slice::from_ref(&stored)))
        }
        CompensationCommand::Revise(args) => {
            let stored = engine.revise_compensation(user, cli.org, args.load()?).await?;
            Ok(report::compensation_history(std::slice::from_ref(&stored)))
        }
        CompensationCommand::History { employee } => {
            let history = engine.compensation_history(user, cli.org, *employee).await?;
            Ok(report::compensation_history(&history))
        }
    }
}

async fn declaration(
    cli: &Cli,
    engine: &PayrollEngine,
    command: &DeclarationCommand,
) -> anyhow::Result<String> {
    let user = cli.user()?;
    let declarations = match command {
        DeclarationCommand::Submit {
            employee,
            fy,
            section,
            amount,
        } => vec![
            engine
                .submit_declaration(
                    user,
                    cli.org,
                    NewInvestmentDeclaration {
                        employee_id: *employee,
                        financial_year: *fy,
                        section_code: section.clone(),
                        declared_amount: *amount,
                    },
                )
                .await?,
        ],
        DeclarationCommand::Approve { id, amount } => {
            vec![engine.approve_declaration(user, cli.org, *id, *amount).await?]
        }
        DeclarationCommand::Reject { id } => {
            vec![engine.reject_declaration(user, cli.org, *id).await?]
        }
        DeclarationCommand::List { employee, fy } => {
            engine.list_declarations(user, cli.org, *employee, *fy).await?
        }
    };
    Ok(report::declaration_table(&declarations))
}

async fn run(
    cli: &Cli,
    engine: &PayrollEngine,
    command: &RunCommand,
) -> anyhow::Result<String> {
    let user = cli.user()?;
    let org = cli.org;

    let out = match command {
        RunCommand::Generate { period } => {
            let generated = engine.generate(user, org, *period).await?;
            format!(
                "{}{}",
                report::run_summary(&generated.run),
                report::issue_table(&generated.skipped)
            )
        }
        RunCommand::Regenerate { run } => {
            let generated = engine.regenerate(user, org, *run).await?;
            format!(
                "{}{}",
                report::run_summary(&generated.run),
                report::issue_table(&generated.skipped)
            )
        }
        RunCommand::Recompute { run, employee } => {
            let entry = engine.recompute_entry(user, org, *run, *employee).await?;
            report::entry_table(std::slice::from_ref(&entry))
        }
        RunCommand::OverrideTds {
            run,
            employee,
            amount,
        } => {
            let entry = engine.override_tds(user, org, *run, *employee, *amount).await?;
            report::entry_table(std::slice::from_ref(&entry))
        }
        RunCommand::Submit { run } => {
            report::run_summary(&engine.submit_for_review(user, org, *run).await?)
        }
        RunCommand::Approve { run } => report::run_summary(&engine.approve(user, org, *run).await?),
        RunCommand::Lock { run } => report::run_summary(&engine.lock(user, org, *run).await?),
        RunCommand::Delete { run } => {
            engine.delete(user, org, *run).await?;
            format!("run {run} deleted\n")
        }
        RunCommand::Show { run } => report::run_summary(&engine.get_run(user, org, *run).await?),
        RunCommand::List => report::run_table(&engine.list_runs(user, org).await?),
        RunCommand::Entries { run } => {
            report::entry_table(&engine.list_entries(user, org, *run).await?)
        }
        RunCommand::Log { run } => {
            report::issue_table(&engine.generation_log(user, org, *run).await?)
        }
        RunCommand::Export { run, output } => {
            let snapshot = engine.export_snapshot(user, org, *run).await?;
            let text = report::snapshot_toml(&snapshot).context("cannot serialize run")?;
            match output {
                Some(path) => {
                    std::fs::write(path, text)
                        .with_context(|| format!("cannot write '{}'", path.display()))?;
                    format!("run {run} exported to {}\n", path.display())
                }
                None => text,
            }
        }
    };
    Ok(out)
}
