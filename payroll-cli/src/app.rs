//! Wiring from configuration to a ready [`PayrollEngine`].

use anyhow::Context;
use payroll_core::db::RepositoryRegistry;
use payroll_core::{Clock, PayrollEngine, SystemClock};
use payroll_db_sqlite::SqliteRepositoryFactory;

use crate::config::CliConfig;

/// Registry with every backend compiled into this binary.
pub fn build_registry() -> RepositoryRegistry {
    let mut registry = RepositoryRegistry::new();
    registry.register(Box::new(SqliteRepositoryFactory));
    registry
}

/// Opens the configured store and builds an engine on the system clock.
pub async fn open_engine(config: &CliConfig) -> anyhow::Result<PayrollEngine> {
    open_engine_with_clock(config, Box::new(SystemClock)).await
}

pub async fn open_engine_with_clock(
    config: &CliConfig,
    clock: Box<dyn Clock>,
) -> anyhow::Result<PayrollEngine> {
    let registry = build_registry();
    let repo = registry.create(&config.database).await.with_context(|| {
        format!(
            "cannot open {} store '{}' (available backends: {})",
            config.database.backend,
            config.database.connection_string,
            registry.available_backends().join(", ")
        )
    })?;

    Ok(PayrollEngine::new(
        repo,
        Box::new(config.role_resolver()),
        clock,
        config.engine.clone(),
    ))
}
