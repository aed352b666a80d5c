use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::repository::{PayrollRepository, RepositoryError};

/// Backend-agnostic connection configuration.
///
/// `backend` must match the [`RepositoryFactory::backend_name`] of a
/// registered factory. `connection_string` is passed through to that
/// factory unchanged; its meaning is backend-specific.
///
/// | backend    | connection_string examples          |
/// |------------|-------------------------------------|
/// | `sqlite`   | `payroll.db`, `:memory:`            |
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DbConfig {
    /// Lowercase identifier matching a registered factory (e.g. `"sqlite"`).
    pub backend: String,
    /// Opaque value forwarded to the factory's `create` method.
    pub connection_string: String,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            backend: "sqlite".to_string(),
            connection_string: ":memory:".to_string(),
        }
    }
}

/// One implementation per database backend. Each backend crate exports a
/// single unit struct that implements this trait and is registered with a
/// [`RepositoryRegistry`] at startup.
#[async_trait]
pub trait RepositoryFactory: Send + Sync {
    /// Unique, lowercase identifier for this backend.
    fn backend_name(&self) -> &'static str;

    /// Open (or create) a connection and return a ready-to-use repository.
    /// Implementations are free to run migrations or warm connection pools
    /// inside this method.
    async fn create(
        &self,
        config: &DbConfig,
    ) -> Result<Box<dyn PayrollRepository>, RepositoryError>;
}

/// Registry of [`RepositoryFactory`] instances, keyed by backend name.
///
/// Typical lifetime:
/// 1. Create with `RepositoryRegistry::new()`.
/// 2. Call `register` once per known backend.
/// 3. Call `create` whenever a new repository is needed.
pub struct RepositoryRegistry {
    factories: HashMap<&'static str, Box<dyn RepositoryFactory>>,
}

impl RepositoryRegistry {
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Register a backend factory, replacing any factory with the same name.
    pub fn register(
        &mut self,
        factory: Box<dyn RepositoryFactory>,
    ) {
        self.factories.insert(factory.backend_name(), factory);
    }

    /// Names of every registered backend, sorted alphabetically.
    pub fn available_backends(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.factories.keys().copied().collect();
        names.sort_unstable();
        names
    }

    /// Dispatch to the factory that matches `config.backend`.
    ///
    /// # Errors
    /// * [`RepositoryError::Configuration`] when no factory is registered for
    ///   the requested backend name.
    /// * Any error the chosen factory itself returns.
    pub async fn create(
        &self,
        config: &DbConfig,
    ) -> Result<Box<dyn PayrollRepository>, RepositoryError> {
        let factory = self
            .factories
            .get(config.backend.as_str())
            .ok_or_else(|| {
                RepositoryError::Configuration(format!(
                    "unknown backend '{}'; available: {:?}",
                    config.backend,
                    self.available_backends()
                ))
            })?;

        tracing::debug!(backend = %config.backend, "creating repository");
        factory.create(config).await
    }
}

impl Default for RepositoryRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    use async_trait::async_trait;
    use chrono::{DateTime, NaiveDate, Utc};
    use rust_decimal::Decimal;

    use super::{
        DbConfig, PayrollRepository, RepositoryError, RepositoryFactory, RepositoryRegistry,
    };
    use crate::models::{
        AttendanceRecord, CompensationStructure, Employee, FinancialYear, GenerationIssue,
        InvestmentDeclaration, InvestmentSection, NewCompensationStructure, NewEmployee,
        NewInvestmentDeclaration, NewPayrollEntry, NewPayrollRun, Organization, PayPeriod,
        PayrollEntry, PayrollRun, RunStatus, StatusChange, StatutoryRates, TaxRegime,
        TaxRegimeConfig, TaxSlab,
    };

    // Every method is `unimplemented!()`; the tests only verify that the
    // registry routes to the correct factory.
    struct StubRepository;

    #[async_trait]
    impl PayrollRepository for StubRepository {
        async fn create_organization(
            &self,
            _name: &str,
            _default_regime: TaxRegime,
        ) -> Result<Organization, RepositoryError> {
            unimplemented!()
        }
        async fn get_organization(
            &self,
            _organization_id: i64,
        ) -> Result<Organization, RepositoryError> {
            unimplemented!()
        }
        async fn create_employee(
            &self,
            _employee: NewEmployee,
        ) -> Result<Employee, RepositoryError> {
            unimplemented!()
        }
        async fn get_employee(
            &self,
            _organization_id: i64,
            _employee_id: i64,
        ) -> Result<Employee, RepositoryError> {
            unimplemented!()
        }
        async fn list_active_employees(
            &self,
            _organization_id: i64,
        ) -> Result<Vec<Employee>, RepositoryError> {
            unimplemented!()
        }
        async fn record_attendance(
            &self,
            _records: &[AttendanceRecord],
        ) -> Result<(), RepositoryError> {
            unimplemented!()
        }
        async fn list_attendance(
            &self,
            _employee_id: i64,
            _from: NaiveDate,
            _to: NaiveDate,
        ) -> Result<Vec<AttendanceRecord>, RepositoryError> {
            unimplemented!()
        }
        async fn list_compensation_structures(
            &self,
            _employee_id: i64,
        ) -> Result<Vec<CompensationStructure>, RepositoryError> {
            unimplemented!()
        }
        async fn create_compensation_structure(
            &self,
            _structure: NewCompensationStructure,
        ) -> Result<CompensationStructure, RepositoryError> {
            unimplemented!()
        }
        async fn revise_compensation_structure(
            &self,
            _current_id: i64,
            _close_on: NaiveDate,
            _revision: NewCompensationStructure,
        ) -> Result<CompensationStructure, RepositoryError> {
            unimplemented!()
        }
        async fn get_tax_slabs(
            &self,
            _regime: TaxRegime,
            _financial_year: i32,
        ) -> Result<Vec<TaxSlab>, RepositoryError> {
            unimplemented!()
        }
        async fn insert_tax_slab(
            &self,
            _slab: &TaxSlab,
        ) -> Result<(), RepositoryError> {
            unimplemented!()
        }
        async fn delete_tax_slabs(
            &self,
            _regime: TaxRegime,
            _financial_year: i32,
        ) -> Result<(), RepositoryError> {
            unimplemented!()
        }
        async fn get_regime_config(
            &self,
            _regime: TaxRegime,
            _financial_year: i32,
        ) -> Result<TaxRegimeConfig, RepositoryError> {
            unimplemented!()
        }
        async fn list_statutory_rates(&self) -> Result<Vec<StatutoryRates>, RepositoryError> {
            unimplemented!()
        }
        async fn list_investment_sections(
            &self
        ) -> Result<Vec<InvestmentSection>, RepositoryError> {
            unimplemented!()
        }
        async fn create_declaration(
            &self,
            _declaration: NewInvestmentDeclaration,
            _at: DateTime<Utc>,
        ) -> Result<InvestmentDeclaration, RepositoryError> {
            unimplemented!()
        }
        async fn get_declaration(
            &self,
            _declaration_id: i64,
        ) -> Result<InvestmentDeclaration, RepositoryError> {
            unimplemented!()
        }
        async fn update_declaration(
            &self,
            _declaration: &InvestmentDeclaration,
        ) -> Result<(), RepositoryError> {
            unimplemented!()
        }
        async fn list_declarations(
            &self,
            _employee_id: i64,
            _financial_year: i32,
        ) -> Result<Vec<InvestmentDeclaration>, RepositoryError> {
            unimplemented!()
        }
        async fn create_run(
            &self,
            _run: NewPayrollRun,
        ) -> Result<PayrollRun, RepositoryError> {
            unimplemented!()
        }
        async fn get_run(
            &self,
            _organization_id: i64,
            _run_id: i64,
        ) -> Result<PayrollRun, RepositoryError> {
            unimplemented!()
        }
        async fn find_run(
            &self,
            _organization_id: i64,
            _pay_period: PayPeriod,
        ) -> Result<Option<PayrollRun>, RepositoryError> {
            unimplemented!()
        }
        async fn list_runs(
            &self,
            _organization_id: i64,
        ) -> Result<Vec<PayrollRun>, RepositoryError> {
            unimplemented!()
        }
        async fn transition_run(
            &self,
            _change: &StatusChange,
        ) -> Result<PayrollRun, RepositoryError> {
            unimplemented!()
        }
        async fn store_run_results(
            &self,
            _entries: &[NewPayrollEntry],
            _issues: &[GenerationIssue],
            _change: &StatusChange,
        ) -> Result<PayrollRun, RepositoryError> {
            unimplemented!()
        }
        async fn update_entry(
            &self,
            _entry: &PayrollEntry,
            _expected: RunStatus,
        ) -> Result<PayrollRun, RepositoryError> {
            unimplemented!()
        }
        async fn delete_run(
            &self,
            _run_id: i64,
            _expected: RunStatus,
        ) -> Result<(), RepositoryError> {
            unimplemented!()
        }
        async fn get_entry(
            &self,
            _run_id: i64,
            _employee_id: i64,
        ) -> Result<PayrollEntry, RepositoryError> {
            unimplemented!()
        }
        async fn list_entries(
            &self,
            _run_id: i64,
        ) -> Result<Vec<PayrollEntry>, RepositoryError> {
            unimplemented!()
        }
        async fn list_generation_log(
            &self,
            _run_id: i64,
        ) -> Result<Vec<GenerationIssue>, RepositoryError> {
            unimplemented!()
        }
        async fn tds_withheld(
            &self,
            _employee_id: i64,
            _financial_year: FinancialYear,
            _before: PayPeriod,
        ) -> Result<Decimal, RepositoryError> {
            unimplemented!()
        }
    }

    /// A factory whose `create` flips an `AtomicBool` and returns a
    /// [`StubRepository`], so tests can prove that `create` was called.
    struct StubFactory {
        name: &'static str,
        called: Arc<AtomicBool>,
    }

    #[async_trait]
    impl RepositoryFactory for StubFactory {
        fn backend_name(&self) -> &'static str {
            self.name
        }
        async fn create(
            &self,
            _config: &DbConfig,
        ) -> Result<Box<dyn PayrollRepository>, RepositoryError> {
            self.called.store(true, Ordering::SeqCst);
            Ok(Box::new(StubRepository))
        }
    }

    /// A factory that always returns a `Connection` error.
    struct FailingFactory;

    #[async_trait]
    impl RepositoryFactory for FailingFactory {
        fn backend_name(&self) -> &'static str {
            "failing"
        }
        async fn create(
            &self,
            _config: &DbConfig,
        ) -> Result<Box<dyn PayrollRepository>, RepositoryError> {
            Err(RepositoryError::Connection("intentional failure".to_string()))
        }
    }

    fn stub_factory(name: &'static str) -> (Box<dyn RepositoryFactory>, Arc<AtomicBool>) {
        let flag = Arc::new(AtomicBool::new(false));
        (
            Box::new(StubFactory {
                name,
                called: flag.clone(),
            }),
            flag,
        )
    }

    fn config(backend: &str) -> DbConfig {
        DbConfig {
            backend: backend.to_string(),
            connection_string: ":memory:".to_string(),
        }
    }

    // ── DbConfig ─────────────────────────────────────────────────────────
    #[test]
    fn dbconfig_default_is_sqlite_memory() {
        let cfg = DbConfig::default();
        assert_eq!(cfg.backend, "sqlite");
        assert_eq!(cfg.connection_string, ":memory:");
    }

    // ── registration ─────────────────────────────────────────────────────
    #[test]
    fn new_registry_has_no_backends() {
        assert!(RepositoryRegistry::new().available_backends().is_empty());
    }

    #[test]
    fn available_backends_is_sorted() {
        let mut reg = RepositoryRegistry::new();
        let (f1, _) = stub_factory("sqlite");
        let (f2, _) = stub_factory("postgres");
        reg.register(f1);
        reg.register(f2);
        assert_eq!(reg.available_backends(), vec!["postgres", "sqlite"]);
    }

    #[test]
    fn duplicate_registration_replaces_previous() {
        let mut reg = RepositoryRegistry::new();
        let (old, _) = stub_factory("sqlite");
        let (new, _) = stub_factory("sqlite");
        reg.register(old);
        reg.register(new);
        assert_eq!(reg.available_backends(), vec!["sqlite"]);
    }

    // ── dispatch ─────────────────────────────────────────────────────────
    #[tokio::test]
    async fn create_calls_matching_factory_only() {
        let mut reg = RepositoryRegistry::new();
        let (sqlite_factory, sqlite_called) = stub_factory("sqlite");
        let (postgres_factory, postgres_called) = stub_factory("postgres");
        reg.register(sqlite_factory);
        reg.register(postgres_factory);

        let result = reg.create(&config("sqlite")).await;

        assert!(result.is_ok(), "expected Ok, got {:#?}", result.err());
        assert!(sqlite_called.load(Ordering::SeqCst));
        assert!(!postgres_called.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn configuration_error_names_requested_and_available_backends() {
        let mut reg = RepositoryRegistry::new();
        let (f, _) = stub_factory("sqlite");
        reg.register(f);

        match reg.create(&config("postgres")).await {
            Err(RepositoryError::Configuration(msg)) => {
                assert!(msg.contains("postgres"), "error should name the requested backend");
                assert!(msg.contains("sqlite"), "error should list available backends");
            }
            Err(other) => panic!("expected Configuration error, got {other:#?}"),
            Ok(_) => panic!("expected Configuration error, got a repository"),
        }
    }

    #[tokio::test]
    async fn create_propagates_factory_error() {
        let mut reg = RepositoryRegistry::new();
        reg.register(Box::new(FailingFactory));

        let result = reg.create(&config("failing")).await;

        assert!(matches!(
            result,
            Err(RepositoryError::Connection(msg)) if msg == "intentional failure"
        ));
    }
}
