//! Decimal-backed arithmetic for ledger amounts.
//!
//! Quantities such as `0.1 + 0.2` grams must not drift, so every operation is
//! carried out in `rust_decimal` and rounded to [`PRECISION`] places. Values that a
//! `Decimal` cannot hold fall back to plain float math.

use rust_decimal::Decimal;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};

pub const PRECISION: u32 = 8;

/// Tolerance for equality and "is zero" checks on amounts.
pub const EPSILON: f64 = 1e-8;

fn to_decimal(value: f64) -> Option<Decimal> {
    Decimal::from_f64(value)
}

fn from_decimal(value: Decimal) -> Option<f64> {
    value.round_dp(PRECISION).to_f64()
}

fn apply(
    a: f64,
    b: f64,
    op: impl Fn(Decimal, Decimal) -> Option<Decimal>,
    fallback: impl Fn(f64, f64) -> f64,
) -> f64 {
    to_decimal(a)
        .zip(to_decimal(b))
        .and_then(|(x, y)| op(x, y))
        .and_then(from_decimal)
        .unwrap_or_else(|| fallback(a, b))
}

pub fn add(a: f64, b: f64) -> f64 {
    apply(a, b, |x, y| x.checked_add(y), |x, y| x + y)
}

pub fn sub(a: f64, b: f64) -> f64 {
    apply(a, b, |x, y| x.checked_sub(y), |x, y| x - y)
}

pub fn mul(a: f64, b: f64) -> f64 {
    apply(a, b, |x, y| x.checked_mul(y), |x, y| x * y)
}

/// Returns `None` when dividing by (near) zero.
pub fn div(a: f64, b: f64) -> Option<f64> {
    if b.abs() < EPSILON {
        return None;
    }
    Some(apply(a, b, |x, y| x.checked_div(y), |x, y| x / y))
}

pub fn sum(values: impl IntoIterator<Item = f64>) -> f64 {
    values.into_iter().fold(0.0, add)
}

pub fn approx_eq(a: f64, b: f64) -> bool {
    (a - b).abs() < EPSILON
}

/// A usable ledger amount: finite and strictly above the tolerance.
pub fn is_positive_amount(value: f64) -> bool {
    value.is_finite() && value > EPSILON
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_does_not_drift() {
        assert_eq!(add(0.1, 0.2), 0.3);
        assert_eq!(sum([0.1, 0.1, 0.1]), 0.3);
    }

    #[test]
    fn test_sub_and_mul() {
        assert_eq!(sub(1.0, 0.9), 0.1);
        assert_eq!(mul(2.5, 3.3), 8.25);
        assert_eq!(mul(1.1, 1.1), 1.21);
    }

    #[test]
    fn test_div_by_zero_is_none() {
        assert_eq!(div(1.0, 0.0), None);
        assert_eq!(div(10.0, 4.0), Some(2.5));
    }

    #[test]
    fn test_falls_back_for_non_finite_values() {
        assert!(add(f64::INFINITY, 1.0).is_infinite());
    }

    #[test]
    fn test_positive_amount() {
        assert!(is_positive_amount(0.01));
        assert!(!is_positive_amount(0.0));
        assert!(!is_positive_amount(-1.0));
        assert!(!is_positive_amount(f64::NAN));
        assert!(!is_positive_amount(f64::INFINITY));
        assert!(approx_eq(1.0, 1.0 + 1e-10));
    }
}
