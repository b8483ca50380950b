//! Amount type
//!
//! Domain primitive for transfer amounts. Amounts are validated at
//! construction time and expose a canonical minimal-denomination integer,
//! so that `100`, `100.0` and `100.000` describe the same transfer.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Maximum decimal places (18, the common on-chain token precision)
pub const MAX_SCALE: u32 = 18;

/// Amount represents a validated, strictly positive transfer value.
///
/// # Invariants
/// - Value is always positive (> 0)
/// - Maximum 18 decimal places
/// - Representable as an `i128` count of 10^-18 units
///
/// # Example
/// ```
/// use rust_decimal::Decimal;
/// use transfer_compliance::domain::Amount;
///
/// let amount = Amount::new(Decimal::new(15, 1)).unwrap();
/// assert_eq!(amount.units(), 1_500_000_000_000_000_000);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Amount {
    value: Decimal,
    units: i128,
}

/// Errors that can occur when creating an Amount
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AmountError {
    #[error("Amount must be positive (got {0})")]
    NotPositive(Decimal),

    #[error("Amount has too many decimal places (max {MAX_SCALE}, got {0})")]
    TooManyDecimals(u32),

    #[error("Amount is too large to express in minimal units")]
    Overflow,

    #[error("Invalid amount format: {0}")]
    ParseError(String),
}

impl Amount {
    /// Create a new Amount with validation.
    ///
    /// # Errors
    /// - `AmountError::NotPositive` if value <= 0
    /// - `AmountError::TooManyDecimals` if more than 18 decimal places
    /// - `AmountError::Overflow` if the unit count does not fit in an `i128`
    pub fn new(value: Decimal) -> Result<Self, AmountError> {
        if value <= Decimal::ZERO {
            return Err(AmountError::NotPositive(value));
        }

        let value = value.normalize();
        if value.scale() > MAX_SCALE {
            return Err(AmountError::TooManyDecimals(value.scale()));
        }

        let units = 10i128
            .checked_pow(MAX_SCALE - value.scale())
            .and_then(|factor| value.mantissa().checked_mul(factor))
            .ok_or(AmountError::Overflow)?;

        Ok(Self { value, units })
    }

    /// Get the underlying Decimal value.
    pub fn value(&self) -> Decimal {
        self.value
    }

    /// Count of minimal-denomination units (10^-18).
    pub fn units(&self) -> i128 {
        self.units
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value)
    }
}

impl FromStr for Amount {
    type Err = AmountError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let decimal = Decimal::from_str_exact(s.trim())
            .map_err(|e| AmountError::ParseError(e.to_string()))?;
        Amount::new(decimal)
    }
}

impl TryFrom<String> for Amount {
    type Error = AmountError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Amount::from_str(&value)
    }
}

impl From<Amount> for String {
    fn from(amount: Amount) -> Self {
        amount.value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_amount_positive() {
        let amount = Amount::new(dec!(100));
        assert!(amount.is_ok());
        assert_eq!(amount.unwrap().value(), dec!(100));
    }

    #[test]
    fn test_amount_zero_rejected() {
        let amount = Amount::new(Decimal::ZERO);
        assert!(matches!(amount, Err(AmountError::NotPositive(_))));
    }

    #[test]
    fn test_amount_negative_rejected() {
        let amount = Amount::new(dec!(-1.5));
        assert!(matches!(amount, Err(AmountError::NotPositive(_))));
    }

    #[test]
    fn test_amount_too_many_decimals() {
        // 19 decimal places
        let amount = Amount::new(Decimal::new(1, 19));
        assert!(matches!(amount, Err(AmountError::TooManyDecimals(19))));
    }

    #[test]
    fn test_large_supply_amounts_accepted() {
        let amount: Amount = "100000000000".parse().unwrap();
        assert_eq!(amount.units(), 100_000_000_000 * 10i128.pow(18));

        let amount: Amount = "170000000000000000000.5".parse().unwrap();
        assert_eq!(amount.units(), 170_000_000_000_000_000_000_500_000_000_000_000_000);
    }

    #[test]
    fn test_amount_overflow() {
        // 10^21 tokens is 10^39 units, past i128::MAX
        let amount = Amount::new(dec!(1000000000000000000000));
        assert!(matches!(amount, Err(AmountError::Overflow)));
    }

    #[test]
    fn test_units_ignore_trailing_zeros() {
        let a: Amount = "100".parse().unwrap();
        let b: Amount = "100.000".parse().unwrap();
        assert_eq!(a.units(), b.units());
        assert_eq!(a, b);
        assert_eq!(a.units(), 100_000_000_000_000_000_000);
    }

    #[test]
    fn test_smallest_unit() {
        let amount: Amount = "0.000000000000000001".parse().unwrap();
        assert_eq!(amount.units(), 1);
    }

    #[test]
    fn test_amount_from_str_rejects_garbage() {
        let amount: Result<Amount, _> = "12abc".parse();
        assert!(matches!(amount, Err(AmountError::ParseError(_))));

        let amount: Result<Amount, _> = "".parse();
        assert!(matches!(amount, Err(AmountError::ParseError(_))));
    }
}
