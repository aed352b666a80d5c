use clap::Parser;
use tracing::debug;

use payroll_cli::cli::{self, Cli};
use payroll_cli::config::CliConfig;
use payroll_cli::{app, logging};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = CliConfig::discover(cli.config.as_deref())?;
    cli.apply_overrides(&mut config);

    logging::init_logging(&config.logging.level);
    if let Some(path) = &config.logging.file {
        logging::enable_file_logging(path)?;
    }

    debug!(
        backend = %config.database.backend,
        connection = %config.database.connection_string,
        "opening payroll store"
    );
    let engine = app::open_engine(&config).await?;

    let output = cli::execute(&cli, &engine).await?;
    print!("{output}");

    Ok(())
}
