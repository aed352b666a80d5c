use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{PayPeriod, PayrollAmounts};

/// Lifecycle status of a payroll run.
///
/// The only forward path is
/// `Draft → Processing → Completed → UnderReview → Approved → Locked`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Draft,
    Processing,
    Completed,
    UnderReview,
    Approved,
    Locked,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::UnderReview => "under_review",
            Self::Approved => "approved",
            Self::Locked => "locked",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "draft" => Some(Self::Draft),
            "processing" => Some(Self::Processing),
            "completed" => Some(Self::Completed),
            "under_review" => Some(Self::UnderReview),
            "approved" => Some(Self::Approved),
            "locked" => Some(Self::Locked),
            _ => None,
        }
    }

    /// The single status this one may move to, if any.
    pub fn next(&self) -> Option<Self> {
        match self {
            Self::Draft => Some(Self::Processing),
            Self::Processing => Some(Self::Completed),
            Self::Completed => Some(Self::UnderReview),
            Self::UnderReview => Some(Self::Approved),
            Self::Approved => Some(Self::Locked),
            Self::Locked => None,
        }
    }

    pub fn can_transition_to(
        &self,
        to: RunStatus,
    ) -> bool {
        self.next() == Some(to)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Locked)
    }

    /// Approved and locked runs reject every write except `Approved → Locked`.
    pub fn is_immutable(&self) -> bool {
        matches!(self, Self::Approved | Self::Locked)
    }

    /// Statuses in which the run may be deleted, regenerated or have entries edited.
    pub fn is_editable(&self) -> bool {
        matches!(self, Self::Draft | Self::Processing | Self::Completed)
    }

    /// Statuses whose entries count as posted (TDS withheld, exportable).
    pub fn is_posted(&self) -> bool {
        matches!(
            self,
            Self::Completed | Self::UnderReview | Self::Approved | Self::Locked
        )
    }

    pub const POSTED: [RunStatus; 4] = [
        Self::Completed,
        Self::UnderReview,
        Self::Approved,
        Self::Locked,
    ];
}

impl fmt::Display for RunStatus {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayrollRun {
    pub id: i64,
    pub organization_id: i64,
    pub pay_period: PayPeriod,
    pub status: RunStatus,
    pub employee_count: i64,
    pub skipped_count: i64,
    pub total_gross: Decimal,
    pub total_deductions: Decimal,
    pub total_net: Decimal,
    pub created_by: String,
    pub reviewed_by: Option<String>,
    pub approved_by: Option<String>,
    pub locked_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub approved_at: Option<DateTime<Utc>>,
    pub locked_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl PayrollRun {
    pub fn totals(&self) -> RunTotals {
        RunTotals {
            employee_count: self.employee_count,
            total_gross: self.total_gross,
            total_deductions: self.total_deductions,
            total_net: self.total_net,
        }
    }
}

/// For creating new runs, in `Draft` or already claimed as `Processing`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPayrollRun {
    pub organization_id: i64,
    pub pay_period: PayPeriod,
    pub status: RunStatus,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
}

/// A compare-and-swap status change: applied only if the run is still in `from`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusChange {
    pub run_id: i64,
    pub from: RunStatus,
    pub to: RunStatus,
    pub actor: String,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunTotals {
    pub employee_count: i64,
    pub total_gross: Decimal,
    pub total_deductions: Decimal,
    pub total_net: Decimal,
}

impl RunTotals {
    /// Exact sums over the given entries.
    pub fn from_entries<'a, E, I>(entries: I) -> Self
    where
        E: PayrollAmounts + 'a,
        I: IntoIterator<Item = &'a E>,
    {
        entries
            .into_iter()
            .fold(RunTotals::default(), |mut totals, entry| {
                totals.employee_count += 1;
                totals.total_gross += entry.gross_earnings();
                totals.total_deductions += entry.total_deductions();
                totals.total_net += entry.net_pay();
                totals
            })
    }

    pub fn is_balanced(&self) -> bool {
        self.total_net == self.total_gross - self.total_deductions
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    NoCompensation,
    InvalidCompensation,
    NoWorkingDays,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NoCompensation => "no_compensation",
            Self::InvalidCompensation => "invalid_compensation",
            Self::NoWorkingDays => "no_working_days",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "no_compensation" => Some(Self::NoCompensation),
            "invalid_compensation" => Some(Self::InvalidCompensation),
            "no_working_days" => Some(Self::NoWorkingDays),
            _ => None,
        }
    }
}

/// An employee left out of a run, kept on the run's generation log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationIssue {
    pub employee_id: i64,
    pub reason: SkipReason,
    pub detail: String,
}
