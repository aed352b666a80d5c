//! Investment declaration review rules.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use thiserror::Error;

use crate::models::{
    DeclarationStatus, InvestmentDeclaration, InvestmentSection, NewInvestmentDeclaration,
};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DeclarationError {
    #[error("unknown investment section {0}")]
    UnknownSection(String),

    #[error("declared amount must be positive, got {0}")]
    NonPositiveAmount(Decimal),

    #[error("declaration {id} is already {status}")]
    AlreadyReviewed {
        id: i64,
        status: &'static str,
    },
}

/// Looks up the section a new declaration claims against and checks the amount.
pub fn validate_new<'a>(
    declaration: &NewInvestmentDeclaration,
    sections: &'a [InvestmentSection],
) -> Result<&'a InvestmentSection, DeclarationError> {
    if declaration.declared_amount <= Decimal::ZERO {
        return Err(DeclarationError::NonPositiveAmount(declaration.declared_amount));
    }

    sections
        .iter()
        .find(|s| s.code == declaration.section_code)
        .ok_or_else(|| DeclarationError::UnknownSection(declaration.section_code.clone()))
}

/// Approves a submitted declaration.
///
/// The approved amount is the reviewer's figure (or the declared amount when
/// none is given), never more than declared and never more than the
/// section cap.
pub fn approve(
    declaration: &InvestmentDeclaration,
    section: &InvestmentSection,
    requested: Option<Decimal>,
    reviewer: &str,
    at: DateTime<Utc>,
) -> Result<InvestmentDeclaration, DeclarationError> {
    ensure_pending(declaration)?;

    let requested = requested.unwrap_or(declaration.declared_amount);
    if requested <= Decimal::ZERO {
        return Err(DeclarationError::NonPositiveAmount(requested));
    }

    let approved_amount = section.cap(requested.min(declaration.declared_amount));

    Ok(InvestmentDeclaration {
        approved_amount,
        status: DeclarationStatus::Approved,
        reviewed_by: Some(reviewer.to_string()),
        updated_at: at,
        ..declaration.clone()
    })
}

pub fn reject(
    declaration: &InvestmentDeclaration,
    reviewer: &str,
    at: DateTime<Utc>,
) -> Result<InvestmentDeclaration, DeclarationError> {
    ensure_pending(declaration)?;

    Ok(InvestmentDeclaration {
        approved_amount: Decimal::ZERO,
        status: DeclarationStatus::Rejected,
        reviewed_by: Some(reviewer.to_string()),
        updated_at: at,
        ..declaration.clone()
    })
}

fn ensure_pending(declaration: &InvestmentDeclaration) -> Result<(), DeclarationError> {
    match declaration.status {
        DeclarationStatus::Submitted => Ok(()),
        status => Err(DeclarationError::AlreadyReviewed {
            id: declaration.id,
            status: status.as_str(),
        }),
    }
}
