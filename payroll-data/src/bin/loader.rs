use std::fs::File;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use payroll_data::TaxSlabLoader;
use payroll_db_sqlite::SqliteRepository;
use tracing_subscriber::EnvFilter;

/// Load income tax slabs from a CSV file into the payroll database.
///
/// The CSV file should have the following columns:
/// - financial_year: year the financial year starts in (e.g., 2025 for 2025-26)
/// - regime: `old` or `new`
/// - min_income: lower bound of the slab
/// - max_income: upper bound (empty for the top slab)
/// - rate: marginal rate as a decimal (e.g., 0.05)
///
/// Each (financial_year, regime) group in the file replaces the stored
/// schedule for that year and regime.
#[derive(Parser, Debug)]
#[command(name = "payroll-data-loader")]
#[command(version, about, long_about = None)]
struct Args {
    /// CSV file with the slab schedules
    #[arg(short, long)]
    file: PathBuf,

    /// SQLite database path or URL; created if missing
    #[arg(short, long, default_value = "payroll.db")]
    database: String,

    /// Apply schema migrations first
    #[arg(short, long, default_value_t = false)]
    migrate: bool,

    /// Seed directory to run after migrations (regime configs must exist before slabs load)
    #[arg(short, long)]
    seeds: Option<PathBuf>,

    /// Validate the file and print the schedules without touching the database
    #[arg(long, default_value_t = false)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .without_time()
        .with_target(false)
        .init();

    let args = Args::parse();

    let file = File::open(&args.file)
        .with_context(|| format!("cannot open {}", args.file.display()))?;
    let records = TaxSlabLoader::parse(file)
        .with_context(|| format!("cannot parse {}", args.file.display()))?;
    let schedules = TaxSlabLoader::validate(&records)
        .with_context(|| format!("invalid slab schedule in {}", args.file.display()))?;

    for schedule in &schedules {
        println!(
            "FY {}-{:02} {:<3} regime: {} slabs, top rate {}",
            schedule.financial_year,
            (schedule.financial_year + 1) % 100,
            schedule.regime.as_str(),
            schedule.slabs.len(),
            schedule.top_rate().unwrap_or_default()
        );
    }

    if args.dry_run {
        println!("Dry run: {} records valid, nothing written.", records.len());
        return Ok(());
    }

    let repo = SqliteRepository::new(&args.database)
        .await
        .with_context(|| format!("cannot open database {}", args.database))?;

    if args.migrate {
        repo.run_migrations()
            .await
            .context("migrations failed")?;
        tracing::info!("migrations applied");
    }

    if let Some(seeds_dir) = &args.seeds {
        repo.run_seeds(seeds_dir)
            .await
            .with_context(|| format!("seeding from {} failed", seeds_dir.display()))?;
        tracing::info!(dir = %seeds_dir.display(), "seeds applied");
    }

    let inserted = TaxSlabLoader::load(&repo, &records)
        .await
        .context("loading tax slabs failed")?;

    println!("Loaded {inserted} tax slabs into {}.", args.database);

    Ok(())
}
