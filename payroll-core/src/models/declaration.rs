use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A tax-saving section (e.g. `80C`) and its statutory cap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvestmentSection {
    pub code: String,
    pub description: String,
    /// Zero means the section is uncapped.
    pub max_amount: Decimal,
}

impl InvestmentSection {
    pub fn cap(
        &self,
        amount: Decimal,
    ) -> Decimal {
        if self.max_amount > Decimal::ZERO {
            amount.min(self.max_amount)
        } else {
            amount
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeclarationStatus {
    Submitted,
    Approved,
    Rejected,
}

impl DeclarationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Submitted => "submitted",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "submitted" => Some(Self::Submitted),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvestmentDeclaration {
    pub id: i64,
    pub employee_id: i64,
    pub financial_year: i32,
    pub section_code: String,
    pub declared_amount: Decimal,
    pub approved_amount: Decimal,
    pub status: DeclarationStatus,
    pub reviewed_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// For submitting new declarations (no id, review fields or timestamps)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewInvestmentDeclaration {
    pub employee_id: i64,
    pub financial_year: i32,
    pub section_code: String,
    pub declared_amount: Decimal,
}
