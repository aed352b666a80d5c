//! Pure payroll calculations.
//!
//! Nothing in this module touches storage; the engine loads the inputs and
//! feeds them in.

pub mod common;
pub mod compensation;
pub mod declarations;
pub mod proration;
pub mod statutory;
pub mod tds;

pub use compensation::CompensationError;
pub use declarations::DeclarationError;
pub use proration::{AttendanceProrator, Proration, ProrationError};
pub use statutory::{StatutoryCalculator, StatutoryDeductions, StatutoryError, rates_in_effect};
pub use tds::{TdsError, TdsInput, TdsResult, TdsWorksheet};
