//! Compensation structure resolution and validation.
//!
//! An employee has a chain of structures with non-overlapping effective
//! ranges; exactly one of them is open-ended. Resolution picks the structure
//! covering a date, validation enforces the component invariants before a
//! structure is stored or used in a run.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use thiserror::Error;

use crate::calculations::common::round_half_up;
use crate::models::{
    BASIC_COMPONENT_CODE, CompensationStructure, ComponentType, NewCompensationStructure,
};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CompensationError {
    #[error("no compensation structure for employee {employee_id} as of {as_of}")]
    NotFound { employee_id: i64, as_of: NaiveDate },

    #[error("{count} compensation structures overlap for employee {employee_id} on {as_of}")]
    Overlapping {
        employee_id: i64,
        as_of: NaiveDate,
        count: usize,
    },

    #[error("annual CTC must be positive, got {0}")]
    NonPositiveCtc(Decimal),

    #[error("earning components sum to {actual}, expected annual CTC {expected}")]
    ComponentSumMismatch { expected: Decimal, actual: Decimal },

    #[error("structure has no {BASIC_COMPONENT_CODE} earning component")]
    MissingBasic,

    #[error("component {code} is {actual}, expected {expected} from its percentage of basic")]
    PercentageMismatch {
        code: String,
        expected: Decimal,
        actual: Decimal,
    },

    #[error("component {0} has a negative amount")]
    NegativeComponent(String),

    #[error("revision must take effect after {current_from}, got {new_from}")]
    RevisionNotAfterCurrent {
        current_from: NaiveDate,
        new_from: NaiveDate,
    },
}

/// Selects the structure in force on `as_of`.
///
/// # Errors
///
/// [`CompensationError::NotFound`] when no structure covers the date and
/// [`CompensationError::Overlapping`] when more than one does.
pub fn resolve(
    employee_id: i64,
    structures: &[CompensationStructure],
    as_of: NaiveDate,
) -> Result<&CompensationStructure, CompensationError> {
    let mut covering = structures.iter().filter(|s| s.covers(as_of));

    let found = covering
        .next()
        .ok_or(CompensationError::NotFound { employee_id, as_of })?;

    let extra = covering.count();
    if extra > 0 {
        return Err(CompensationError::Overlapping {
            employee_id,
            as_of,
            count: extra + 1,
        });
    }

    Ok(found)
}

/// Checks a structure about to be stored.
pub fn validate_new(
    structure: &NewCompensationStructure,
    scale: u32,
) -> Result<(), CompensationError> {
    let components = structure
        .components
        .iter()
        .map(|c| (c.code.as_str(), c.component_type, c.annual_amount, c.percentage_of_basic));

    check_components(structure.annual_ctc, components, scale)
}

/// Checks a stored structure before it feeds a payroll entry.
pub fn validate_stored(
    structure: &CompensationStructure,
    scale: u32,
) -> Result<(), CompensationError> {
    let components = structure
        .components
        .iter()
        .map(|c| (c.code.as_str(), c.component_type, c.annual_amount, c.percentage_of_basic));

    check_components(structure.annual_ctc, components, scale)
}

/// Returns the `effective_to` date the current structure gets when `revision` replaces it.
pub fn closing_date(
    current: &CompensationStructure,
    revision: &NewCompensationStructure,
) -> Result<NaiveDate, CompensationError> {
    let invalid = CompensationError::RevisionNotAfterCurrent {
        current_from: current.effective_from,
        new_from: revision.effective_from,
    };

    if revision.effective_from <= current.effective_from {
        return Err(invalid);
    }

    revision.effective_from.pred_opt().ok_or(invalid)
}

fn check_components<'a>(
    annual_ctc: Decimal,
    components: impl Iterator<Item = (&'a str, ComponentType, Decimal, Option<Decimal>)> + Clone,
    scale: u32,
) -> Result<(), CompensationError> {
    if annual_ctc <= Decimal::ZERO {
        return Err(CompensationError::NonPositiveCtc(annual_ctc));
    }

    if let Some((code, ..)) = components.clone().find(|(_, _, amount, _)| amount.is_sign_negative()) {
        return Err(CompensationError::NegativeComponent(code.to_string()));
    }

    let earnings: Decimal = components
        .clone()
        .filter(|(_, kind, _, _)| *kind == ComponentType::Earning)
        .map(|(_, _, amount, _)| amount)
        .sum();

    if earnings != annual_ctc {
        return Err(CompensationError::ComponentSumMismatch {
            expected: annual_ctc,
            actual: earnings,
        });
    }

    let basic = components
        .clone()
        .find(|(code, kind, _, _)| *kind == ComponentType::Earning && *code == BASIC_COMPONENT_CODE)
        .map(|(_, _, amount, _)| amount)
        .ok_or(CompensationError::MissingBasic)?;

    for (code, _, amount, percentage) in components {
        let Some(percentage) = percentage else {
            continue;
        };
        let expected = round_half_up(basic * percentage / Decimal::ONE_HUNDRED, scale);
        if expected != amount {
            return Err(CompensationError::PercentageMismatch {
                code: code.to_string(),
                expected,
                actual: amount,
            });
        }
    }

    Ok(())
}
