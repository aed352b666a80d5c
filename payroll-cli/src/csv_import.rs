//! CSV import for attendance and compensation components.
//!
//! Headers are matched by name, so column order does not matter.
//!
//! ## Attendance
//!
//! | Column        | Type    | Notes                                                           |
//! |---------------|---------|-----------------------------------------------------------------|
//! | `employee_id` | integer |                                                                 |
//! | `date`        | date    | `YYYY-MM-DD`                                                    |
//! | `status`      | string  | `present`, `half_day`, `approved_leave`, `holiday` or `absent`  |
//!
//! ```csv
//! employee_id,date,status
//! 7,2025-09-01,present
//! 7,2025-09-02,half_day
//! ```
//!
//! ## Compensation components
//!
//! | Column                | Required | Type    | Notes                                   |
//! |-----------------------|----------|---------|-----------------------------------------|
//! | `code`                | yes      | string  | `BASIC` marks basic pay                 |
//! | `name`                | yes      | string  |                                         |
//! | `component_type`      | yes      | string  | `earning` or `deduction`                |
//! | `annual_amount`       | yes      | decimal |                                         |
//! | `percentage_of_basic` | no       | decimal | Percent, e.g. `40` for 40% of basic     |
//! | `is_taxable`          | no       | bool    | Defaults to `true`                      |
//!
//! Components keep their file order as display order.

use std::path::Path;

use chrono::NaiveDate;
use payroll_core::{AttendanceRecord, AttendanceStatus, ComponentType, NewCompensationComponent};
use rust_decimal::Decimal;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct AttendanceRow {
    employee_id: i64,
    date: NaiveDate,
    status: String,
}

#[derive(Debug, Deserialize)]
struct ComponentRow {
    code: String,
    name: String,
    component_type: String,
    annual_amount: Decimal,
    percentage_of_basic: Option<Decimal>,
    is_taxable: Option<bool>,
}

/// Errors that can occur while reading an import file.
#[derive(Debug, thiserror::Error)]
pub enum CsvImportError {
    #[error("cannot read '{path}': {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    /// Structural problems, missing required columns or type mismatches.
    #[error("CSV parse error: {0}")]
    Parse(#[from] csv::Error),

    /// `row` is 1-based; the header is row 0.
    #[error("unrecognised attendance status '{status}' on row {row}")]
    InvalidStatus { status: String, row: usize },

    #[error("unrecognised component type '{value}' on row {row}")]
    InvalidComponentType { value: String, row: usize },

    #[error("the file has no data rows")]
    Empty,
}

fn reader(input: &str) -> csv::Reader<&[u8]> {
    csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .flexible(false)
        .from_reader(input.as_bytes())
}

fn read_file(path: &Path) -> Result<String, CsvImportError> {
    std::fs::read_to_string(path).map_err(|source| CsvImportError::Io {
        path: path.display().to_string(),
        source,
    })
}

fn non_empty<T>(rows: Vec<T>) -> Result<Vec<T>, CsvImportError> {
    if rows.is_empty() {
        Err(CsvImportError::Empty)
    } else {
        Ok(rows)
    }
}

pub fn attendance_from_str(input: &str) -> Result<Vec<AttendanceRecord>, CsvImportError> {
    let records = reader(input)
        .deserialize::<AttendanceRow>()
        .enumerate()
        .map(|(idx, result)| {
            let row = result?;
            let status = AttendanceStatus::parse(&row.status.to_ascii_lowercase()).ok_or(
                CsvImportError::InvalidStatus {
                    status: row.status,
                    row: idx + 1,
                },
            )?;
            Ok(AttendanceRecord {
                employee_id: row.employee_id,
                date: row.date,
                status,
            })
        })
        .collect::<Result<Vec<_>, CsvImportError>>()?;

    non_empty(records)
}

pub fn attendance_from_file(path: &Path) -> Result<Vec<AttendanceRecord>, CsvImportError> {
    attendance_from_str(&read_file(path)?)
}

pub fn components_from_str(input: &str) -> Result<Vec<NewCompensationComponent>, CsvImportError> {
    let components = reader(input)
        .deserialize::<ComponentRow>()
        .enumerate()
        .map(|(idx, result)| {
            let row = result?;
            let component_type = ComponentType::parse(&row.component_type.to_ascii_lowercase())
                .ok_or(CsvImportError::InvalidComponentType {
                    value: row.component_type,
                    row: idx + 1,
                })?;
            Ok(NewCompensationComponent {
                code: row.code,
                name: row.name,
                component_type,
                annual_amount: row.annual_amount,
                percentage_of_basic: row.percentage_of_basic,
                is_taxable: row.is_taxable.unwrap_or(true),
                display_order: i32::try_from(idx + 1).unwrap_or(i32::MAX),
            })
        })
        .collect::<Result<Vec<_>, CsvImportError>>()?;

    non_empty(components)
}

pub fn components_from_file(path: &Path) -> Result<Vec<NewCompensationComponent>, CsvImportError> {
    components_from_str(&read_file(path)?)
}
