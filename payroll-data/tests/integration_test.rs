//! Integration tests for tax slab loading using the SQLite backend.

use payroll_core::{PayrollRepository, TaxRegime};
use payroll_data::{TaxSlabLoader, TaxSlabLoaderError};
use payroll_db_sqlite::SqliteRepository;
use pretty_assertions::assert_eq;
use rust_decimal_macros::dec;
use sqlx::sqlite::SqlitePoolOptions;

const TEST_CSV_2026: &str = include_str!("../test-data/tax_slabs_2026.csv");

/// Sets up a test database with migrations run but no regime configuration.
async fn setup_test_db_without_config() -> SqliteRepository {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("Failed to create in-memory database");

    let repo = SqliteRepository::new_with_pool(pool).await;
    repo.run_migrations()
        .await
        .expect("Failed to run migrations");

    repo
}

async fn setup_test_db() -> SqliteRepository {
    let repo = setup_test_db_without_config().await;

    sqlx::query(
        "INSERT INTO tax_regime_config
            (regime, financial_year, standard_deduction, rebate_income_limit, rebate_max, cess_rate)
         VALUES
            ('new', 2026, '75000', '1200000', '60000', '0.04'),
            ('old', 2026, '50000', '500000', '12500', '0.04')",
    )
    .execute(repo.pool())
    .await
    .expect("Failed to insert regime config");

    repo
}

#[tokio::test]
async fn test_load_all_2026_slabs() {
    let repo = setup_test_db().await;

    let records = TaxSlabLoader::parse(TEST_CSV_2026.as_bytes()).expect("Failed to parse CSV");
    let inserted = TaxSlabLoader::load(&repo, &records)
        .await
        .expect("Failed to load slabs");

    assert_eq!(inserted, 11);
}

#[tokio::test]
async fn test_load_and_retrieve_new_regime_slabs() {
    let repo = setup_test_db().await;

    let records = TaxSlabLoader::parse(TEST_CSV_2026.as_bytes()).expect("Failed to parse CSV");
    TaxSlabLoader::load(&repo, &records)
        .await
        .expect("Failed to load slabs");

    let slabs = repo
        .get_tax_slabs(TaxRegime::New, 2026)
        .await
        .expect("Failed to get slabs");

    assert_eq!(slabs.len(), 7);
    assert_eq!(slabs[0].min_income, dec!(0));
    assert_eq!(slabs[0].rate, dec!(0));
    assert_eq!(slabs[3].min_income, dec!(1200000));
    assert_eq!(slabs[3].max_income, Some(dec!(1600000)));
    assert_eq!(slabs[3].rate, dec!(0.15));
    assert_eq!(slabs[6].max_income, None);
    assert_eq!(slabs[6].rate, dec!(0.30));
}

#[tokio::test]
async fn test_reload_is_idempotent() {
    let repo = setup_test_db().await;
    let records = TaxSlabLoader::parse(TEST_CSV_2026.as_bytes()).expect("Failed to parse CSV");

    TaxSlabLoader::load(&repo, &records)
        .await
        .expect("First load failed");
    TaxSlabLoader::load(&repo, &records)
        .await
        .expect("Second load failed");

    let old = repo
        .get_tax_slabs(TaxRegime::Old, 2026)
        .await
        .expect("Failed to get slabs");
    assert_eq!(old.len(), 4);
}

#[tokio::test]
async fn test_load_without_regime_config_fails() {
    let repo = setup_test_db_without_config().await;
    let records = TaxSlabLoader::parse(TEST_CSV_2026.as_bytes()).expect("Failed to parse CSV");

    let result = TaxSlabLoader::load(&repo, &records).await;

    match result {
        Err(TaxSlabLoaderError::RegimeConfigNotFound {
            regime,
            financial_year,
        }) => {
            assert_eq!(regime, "new");
            assert_eq!(financial_year, 2026);
        }
        other => panic!("expected RegimeConfigNotFound, got {other:?}"),
    }
}

#[tokio::test]
async fn test_invalid_group_writes_nothing() {
    let repo = setup_test_db().await;
    let csv = "financial_year,regime,min_income,max_income,rate
2026,new,0,400000,0
2026,new,400000,,0.05
2026,old,0,250000,0
2026,old,300000,,0.05
";
    let records = TaxSlabLoader::parse(csv.as_bytes()).expect("Failed to parse CSV");

    let result = TaxSlabLoader::load(&repo, &records).await;

    assert!(matches!(result, Err(TaxSlabLoaderError::InvalidSlabs { .. })));
    let new = repo
        .get_tax_slabs(TaxRegime::New, 2026)
        .await
        .expect("Failed to get slabs");
    assert!(new.is_empty());
}

#[tokio::test]
async fn test_unknown_regime_is_rejected() {
    let repo = setup_test_db().await;
    let csv = "financial_year,regime,min_income,max_income,rate\n2026,flat,0,,0.10\n";
    let records = TaxSlabLoader::parse(csv.as_bytes()).expect("Failed to parse CSV");

    let result = TaxSlabLoader::load(&repo, &records).await;

    assert!(matches!(result, Err(TaxSlabLoaderError::InvalidRegime(r)) if r == "flat"));
}
