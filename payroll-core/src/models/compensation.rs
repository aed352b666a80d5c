use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Component code that identifies basic pay.
pub const BASIC_COMPONENT_CODE: &str = "BASIC";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentType {
    Earning,
    Deduction,
}

impl ComponentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Earning => "earning",
            Self::Deduction => "deduction",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "earning" => Some(Self::Earning),
            "deduction" => Some(Self::Deduction),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompensationComponent {
    pub id: i64,
    pub structure_id: i64,
    pub code: String,
    pub name: String,
    pub component_type: ComponentType,
    pub annual_amount: Decimal,
    pub percentage_of_basic: Option<Decimal>,
    pub is_taxable: bool,
    pub display_order: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompensationStructure {
    pub id: i64,
    pub employee_id: i64,
    pub annual_ctc: Decimal,
    pub effective_from: NaiveDate,
    pub effective_to: Option<NaiveDate>,
    pub revision_number: i32,
    pub is_active: bool,
    pub components: Vec<CompensationComponent>,
}

impl CompensationStructure {
    pub fn covers(
        &self,
        date: NaiveDate,
    ) -> bool {
        self.effective_from <= date && self.effective_to.is_none_or(|to| date <= to)
    }

    pub fn earnings(&self) -> impl Iterator<Item = &CompensationComponent> {
        self.components
            .iter()
            .filter(|c| c.component_type == ComponentType::Earning)
    }

    pub fn annual_earnings(&self) -> Decimal {
        self.earnings().map(|c| c.annual_amount).sum()
    }

    /// Fixed deductions such as professional tax, recovered from net pay.
    pub fn annual_deductions(&self) -> Decimal {
        self.components
            .iter()
            .filter(|c| c.component_type == ComponentType::Deduction)
            .map(|c| c.annual_amount)
            .sum()
    }

    pub fn annual_taxable_earnings(&self) -> Decimal {
        self.earnings()
            .filter(|c| c.is_taxable)
            .map(|c| c.annual_amount)
            .sum()
    }

    pub fn annual_basic(&self) -> Option<Decimal> {
        self.earnings()
            .find(|c| c.code == BASIC_COMPONENT_CODE)
            .map(|c| c.annual_amount)
    }
}

/// For creating new components (no ids)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewCompensationComponent {
    pub code: String,
    pub name: String,
    pub component_type: ComponentType,
    pub annual_amount: Decimal,
    pub percentage_of_basic: Option<Decimal>,
    pub is_taxable: bool,
    pub display_order: i32,
}

/// For creating new structures (no ids, revision assigned by the store)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewCompensationStructure {
    pub employee_id: i64,
    pub annual_ctc: Decimal,
    pub effective_from: NaiveDate,
    pub components: Vec<NewCompensationComponent>,
}

impl NewCompensationStructure {
    pub fn annual_earnings(&self) -> Decimal {
        self.components
            .iter()
            .filter(|c| c.component_type == ComponentType::Earning)
            .map(|c| c.annual_amount)
            .sum()
    }

    pub fn annual_basic(&self) -> Option<Decimal> {
        self.components
            .iter()
            .find(|c| c.component_type == ComponentType::Earning && c.code == BASIC_COMPONENT_CODE)
            .map(|c| c.annual_amount)
    }
}
