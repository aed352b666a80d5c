use std::collections::BTreeMap;
use std::io::Read;

use payroll_core::{PayrollRepository, RepositoryError, TaxRegime, TaxSlab};
use rust_decimal::Decimal;
use serde::Deserialize;
use thiserror::Error;

/// Errors that can occur when loading tax slab data.
#[derive(Debug, Error)]
pub enum TaxSlabLoaderError {
    #[error("CSV parse error: {0}")]
    CsvParse(String),

    #[error("Invalid regime '{0}' (expected 'old' or 'new')")]
    InvalidRegime(String),

    #[error("Invalid slabs for {regime} regime, financial year {financial_year}: {reason}")]
    InvalidSlabs {
        regime: String,
        financial_year: i32,
        reason: String,
    },

    #[error(
        "No {regime} regime configuration for financial year {financial_year} (have you run the seeds?)"
    )]
    RegimeConfigNotFound { regime: String, financial_year: i32 },

    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),
}

impl From<csv::Error> for TaxSlabLoaderError {
    fn from(err: csv::Error) -> Self {
        TaxSlabLoaderError::CsvParse(err.to_string())
    }
}

/// A single record from the tax slabs CSV file.
///
/// - `financial_year`: the year the financial year starts in (2025 for 2025-26)
/// - `regime`: `old` or `new`
/// - `min_income`: lower bound of the slab
/// - `max_income`: upper bound (empty for the open-ended top slab)
/// - `rate`: marginal rate as a decimal (e.g., 0.05 for 5%)
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct TaxSlabRecord {
    pub financial_year: i32,
    pub regime: String,
    pub min_income: Decimal,
    #[serde(deserialize_with = "deserialize_optional_decimal")]
    pub max_income: Option<Decimal>,
    pub rate: Decimal,
}

fn deserialize_optional_decimal<'de, D>(deserializer: D) -> Result<Option<Decimal>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s: Option<String> = Option::deserialize(deserializer)?;
    match s {
        Some(s) if s.trim().is_empty() => Ok(None),
        Some(s) => s
            .trim()
            .parse::<Decimal>()
            .map(Some)
            .map_err(serde::de::Error::custom),
        None => Ok(None),
    }
}

fn parse_regime(regime: &str) -> Result<TaxRegime, TaxSlabLoaderError> {
    TaxRegime::parse(regime.trim()).ok_or_else(|| TaxSlabLoaderError::InvalidRegime(regime.to_string()))
}

/// Checks that a regime's slabs start at zero, touch end to end and finish
/// with a single open-ended slab.
fn check_contiguous(
    regime: TaxRegime,
    financial_year: i32,
    slabs: &mut [TaxSlab],
) -> Result<(), TaxSlabLoaderError> {
    let invalid = |reason: String| TaxSlabLoaderError::InvalidSlabs {
        regime: regime.as_str().to_string(),
        financial_year,
        reason,
    };

    slabs.sort_by_key(|s| s.min_income);

    let mut expected_min = Decimal::ZERO;
    for (i, slab) in slabs.iter().enumerate() {
        if slab.min_income != expected_min {
            return Err(invalid(format!(
                "slab starts at {}, expected {}",
                slab.min_income, expected_min
            )));
        }
        if slab.rate < Decimal::ZERO || slab.rate > Decimal::ONE {
            return Err(invalid(format!("rate {} is outside 0..=1", slab.rate)));
        }
        match slab.max_income {
            Some(max) if max <= slab.min_income => {
                return Err(invalid(format!("slab {}..{} is empty", slab.min_income, max)));
            }
            Some(max) => expected_min = max,
            None if i + 1 != slabs.len() => {
                return Err(invalid("only the top slab may be open-ended".to_string()));
            }
            None => return Ok(()),
        }
    }

    Err(invalid("top slab must be open-ended".to_string()))
}

/// One regime's complete slab schedule for a financial year, sorted by
/// lower bound.
#[derive(Debug, Clone, PartialEq)]
pub struct SlabSchedule {
    pub financial_year: i32,
    pub regime: TaxRegime,
    pub slabs: Vec<TaxSlab>,
}

impl SlabSchedule {
    /// Marginal rate of the open-ended top slab.
    pub fn top_rate(&self) -> Option<Decimal> {
        self.slabs.last().map(|s| s.rate)
    }
}

/// Loader for tax slab data from CSV files.
///
/// Reads CSV data and writes it through the [`PayrollRepository`] trait, so
/// it works with any backend.
pub struct TaxSlabLoader;

impl TaxSlabLoader {
    /// Parse tax slab records from a CSV reader.
    pub fn parse<R: Read>(reader: R) -> Result<Vec<TaxSlabRecord>, TaxSlabLoaderError> {
        let mut csv_reader = csv::Reader::from_reader(reader);
        let mut records = Vec::new();

        for result in csv_reader.deserialize() {
            let record: TaxSlabRecord = result?;
            records.push(record);
        }

        Ok(records)
    }

    /// Groups records by (financial_year, regime) and checks each group is
    /// a complete, contiguous schedule. Nothing is written.
    pub fn validate(records: &[TaxSlabRecord]) -> Result<Vec<SlabSchedule>, TaxSlabLoaderError> {
        let mut groups: BTreeMap<(i32, &'static str), SlabSchedule> = BTreeMap::new();

        for record in records {
            let regime = parse_regime(&record.regime)?;
            groups
                .entry((record.financial_year, regime.as_str()))
                .or_insert_with(|| SlabSchedule {
                    financial_year: record.financial_year,
                    regime,
                    slabs: Vec::new(),
                })
                .slabs
                .push(TaxSlab {
                    regime,
                    financial_year: record.financial_year,
                    min_income: record.min_income,
                    max_income: record.max_income,
                    rate: record.rate,
                });
        }

        let mut schedules: Vec<SlabSchedule> = groups.into_values().collect();
        for schedule in &mut schedules {
            check_contiguous(schedule.regime, schedule.financial_year, &mut schedule.slabs)?;
        }
        Ok(schedules)
    }

    /// Load tax slab records into the database.
    ///
    /// For each (financial_year, regime) group this method will:
    /// 1. Validate that the slabs are contiguous
    /// 2. Check the regime has a configuration for that year
    /// 3. Delete any existing slabs for the group
    /// 4. Insert the new slabs
    ///
    /// Every group is validated before anything is written, and reloading
    /// the same file produces the same result.
    pub async fn load<R: PayrollRepository + ?Sized>(
        repo: &R,
        records: &[TaxSlabRecord],
    ) -> Result<usize, TaxSlabLoaderError> {
        let schedules = Self::validate(records)?;

        let mut inserted = 0;
        for SlabSchedule {
            financial_year,
            regime,
            slabs,
        } in &schedules
        {
            repo.get_regime_config(*regime, *financial_year)
                .await
                .map_err(|e| match e {
                    RepositoryError::NotFound => TaxSlabLoaderError::RegimeConfigNotFound {
                        regime: regime.as_str().to_string(),
                        financial_year: *financial_year,
                    },
                    other => TaxSlabLoaderError::Repository(other),
                })?;

            repo.delete_tax_slabs(*regime, *financial_year).await?;

            for slab in slabs {
                repo.insert_tax_slab(slab).await?;
                inserted += 1;
            }

            tracing::info!(
                regime = regime.as_str(),
                financial_year,
                slabs = slabs.len(),
                "loaded tax slabs"
            );
        }

        Ok(inserted)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rust_decimal_macros::dec;

    use super::*;

    const TEST_CSV: &str = r#"financial_year,regime,min_income,max_income,rate
2025,new,0,400000,0
2025,new,400000,800000,0.05
2025,new,800000,1200000,0.10
2025,new,1200000,1600000,0.15
2025,new,1600000,2000000,0.20
2025,new,2000000,2400000,0.25
2025,new,2400000,,0.30
2025,old,0,250000,0
2025,old,250000,500000,0.05
2025,old,500000,1000000,0.20
2025,old,1000000,,0.30
"#;

    fn slabs_of(
        records: &[TaxSlabRecord],
        regime: TaxRegime,
    ) -> Vec<TaxSlab> {
        records
            .iter()
            .filter(|r| r.regime == regime.as_str())
            .map(|r| TaxSlab {
                regime,
                financial_year: r.financial_year,
                min_income: r.min_income,
                max_income: r.max_income,
                rate: r.rate,
            })
            .collect()
    }

    #[test]
    fn test_parse_csv_single_slab() {
        let csv = "financial_year,regime,min_income,max_income,rate\n2025,new,400000,800000,0.05";

        let records = TaxSlabLoader::parse(csv.as_bytes()).expect("Failed to parse CSV");

        assert_eq!(
            records,
            vec![TaxSlabRecord {
                financial_year: 2025,
                regime: "new".to_string(),
                min_income: dec!(400000),
                max_income: Some(dec!(800000)),
                rate: dec!(0.05),
            }]
        );
    }

    #[test]
    fn test_parse_csv_open_ended_top_slab() {
        let csv = "financial_year,regime,min_income,max_income,rate\n2025,old,1000000,,0.30";

        let records = TaxSlabLoader::parse(csv.as_bytes()).expect("Failed to parse CSV");

        assert_eq!(records[0].max_income, None);
        assert_eq!(records[0].rate, dec!(0.30));
    }

    #[test]
    fn test_parse_csv_both_regimes() {
        let records = TaxSlabLoader::parse(TEST_CSV.as_bytes()).expect("Failed to parse CSV");

        assert_eq!(records.len(), 11);
        assert_eq!(records.iter().filter(|r| r.regime == "new").count(), 7);
        assert_eq!(records.iter().filter(|r| r.regime == "old").count(), 4);
    }

    #[test]
    fn test_parse_invalid_csv_missing_column() {
        let csv = "financial_year,regime,min_income\n2025,new,0";

        let err = TaxSlabLoader::parse(csv.as_bytes()).expect_err("Should fail for missing column");

        let TaxSlabLoaderError::CsvParse(msg) = err else {
            panic!("Expected CsvParse error, got: {:?}", err);
        };
        assert!(msg.contains("missing field"), "Expected 'missing field' in error, got: {}", msg);
    }

    #[test]
    fn test_parse_invalid_csv_bad_decimal() {
        let csv = "financial_year,regime,min_income,max_income,rate\n2025,new,abc,400000,0";

        let result = TaxSlabLoader::parse(csv.as_bytes());

        assert!(matches!(result, Err(TaxSlabLoaderError::CsvParse(_))));
    }

    #[test]
    fn test_parse_empty_csv() {
        let csv = "financial_year,regime,min_income,max_income,rate\n";

        let records = TaxSlabLoader::parse(csv.as_bytes()).expect("Failed to parse CSV");

        assert!(records.is_empty());
    }

    #[test]
    fn test_parse_regime() {
        assert_eq!(parse_regime("new").ok(), Some(TaxRegime::New));
        assert_eq!(parse_regime(" old ").ok(), Some(TaxRegime::Old));
        assert!(matches!(
            parse_regime("flat"),
            Err(TaxSlabLoaderError::InvalidRegime(r)) if r == "flat"
        ));
    }

    #[test]
    fn test_contiguous_slabs_accepted_in_any_order() {
        let records = TaxSlabLoader::parse(TEST_CSV.as_bytes()).expect("Failed to parse CSV");
        let mut slabs = slabs_of(&records, TaxRegime::Old);
        slabs.reverse();

        let result = check_contiguous(TaxRegime::Old, 2025, &mut slabs);

        assert!(result.is_ok());
        assert_eq!(slabs[0].min_income, dec!(0));
    }

    #[test]
    fn test_gap_between_slabs_rejected() {
        let records = TaxSlabLoader::parse(TEST_CSV.as_bytes()).expect("Failed to parse CSV");
        let mut slabs = slabs_of(&records, TaxRegime::Old);
        slabs.remove(1);

        let result = check_contiguous(TaxRegime::Old, 2025, &mut slabs);

        assert!(matches!(
            result,
            Err(TaxSlabLoaderError::InvalidSlabs { reason, .. }) if reason == "slab starts at 500000, expected 250000"
        ));
    }

    #[test]
    fn test_bounded_top_slab_rejected() {
        let records = TaxSlabLoader::parse(TEST_CSV.as_bytes()).expect("Failed to parse CSV");
        let mut slabs = slabs_of(&records, TaxRegime::Old);
        slabs.pop();

        let result = check_contiguous(TaxRegime::Old, 2025, &mut slabs);

        assert!(matches!(
            result,
            Err(TaxSlabLoaderError::InvalidSlabs { reason, .. }) if reason == "top slab must be open-ended"
        ));
    }

    #[test]
    fn test_rate_above_one_rejected() {
        let mut slabs = vec![TaxSlab {
            regime: TaxRegime::New,
            financial_year: 2025,
            min_income: dec!(0),
            max_income: None,
            rate: dec!(30),
        }];

        let result = check_contiguous(TaxRegime::New, 2025, &mut slabs);

        assert!(matches!(result, Err(TaxSlabLoaderError::InvalidSlabs { .. })));
    }

    #[test]
    fn test_validate_groups_by_year_and_regime() {
        let records = TaxSlabLoader::parse(TEST_CSV.as_bytes()).expect("Failed to parse CSV");
        let schedules = TaxSlabLoader::validate(&records).expect("schedules should validate");

        let summary: Vec<_> = schedules
            .iter()
            .map(|s| (s.financial_year, s.regime, s.slabs.len(), s.top_rate()))
            .collect();
        assert_eq!(
            summary,
            vec![
                (2025, TaxRegime::New, 7, Some(dec!(0.30))),
                (2025, TaxRegime::Old, 4, Some(dec!(0.30))),
            ]
        );
    }

    #[test]
    fn test_validate_reports_bad_group() {
        let csv = "financial_year,regime,min_income,max_income,rate\n2026,old,0,250000,0\n2026,old,300000,,0.3";
        let records = TaxSlabLoader::parse(csv.as_bytes()).expect("Failed to parse CSV");

        match TaxSlabLoader::validate(&records) {
            Err(TaxSlabLoaderError::InvalidSlabs { financial_year, .. }) => assert_eq!(financial_year, 2026),
            other => panic!("expected InvalidSlabs, got {other:?}"),
        }
    }
}
