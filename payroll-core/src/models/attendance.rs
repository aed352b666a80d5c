use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttendanceStatus {
    Present,
    HalfDay,
    ApprovedLeave,
    Holiday,
    Absent,
}

impl AttendanceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Present => "present",
            Self::HalfDay => "half_day",
            Self::ApprovedLeave => "approved_leave",
            Self::Holiday => "holiday",
            Self::Absent => "absent",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "present" => Some(Self::Present),
            "half_day" => Some(Self::HalfDay),
            "approved_leave" => Some(Self::ApprovedLeave),
            "holiday" => Some(Self::Holiday),
            "absent" => Some(Self::Absent),
            _ => None,
        }
    }

    /// Fraction of the day that is paid.
    pub fn paid_credit(&self) -> Decimal {
        match self {
            Self::Present | Self::ApprovedLeave | Self::Holiday => Decimal::ONE,
            Self::HalfDay => Decimal::new(5, 1),
            Self::Absent => Decimal::ZERO,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendanceRecord {
    pub employee_id: i64,
    pub date: NaiveDate,
    pub status: AttendanceStatus,
}
