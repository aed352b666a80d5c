//! Common utility functions for payroll calculations.
//!
//! Shared rounding and clamping used by every calculator, so that all money
//! figures in a run are rounded the same way.

use rust_decimal::{Decimal, RoundingStrategy};

/// Rounds a decimal value to `scale` decimal places using half-up rounding.
///
/// Values exactly at the midpoint are rounded away from zero. A `scale` of
/// zero rounds to whole currency units, two to paise/cents.
///
/// # Examples
///
/// ```
/// use rust_decimal_macros::dec;
/// use payroll_core::calculations::common::round_half_up;
///
/// assert_eq!(round_half_up(dec!(9090.909), 0), dec!(9091));
/// assert_eq!(round_half_up(dec!(123.455), 2), dec!(123.46));
/// assert_eq!(round_half_up(dec!(123.454), 2), dec!(123.45));
/// assert_eq!(round_half_up(dec!(-0.5), 0), dec!(-1)); // Away from zero
/// ```
pub fn round_half_up(
    value: Decimal,
    scale: u32,
) -> Decimal {
    value.round_dp_with_strategy(scale, RoundingStrategy::MidpointAwayFromZero)
}

/// Clamps a value to zero or above.
///
/// # Examples
///
/// ```
/// use rust_decimal_macros::dec;
/// use payroll_core::calculations::common::non_negative;
///
/// assert_eq!(non_negative(dec!(-12.50)), dec!(0));
/// assert_eq!(non_negative(dec!(12.50)), dec!(12.50));
/// ```
pub fn non_negative(value: Decimal) -> Decimal {
    value.max(Decimal::ZERO)
}

/// Splits an annual amount into a rounded monthly figure.
pub fn monthly(
    annual: Decimal,
    scale: u32,
) -> Decimal {
    round_half_up(annual / Decimal::from(12), scale)
}
