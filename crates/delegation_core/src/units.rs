//! Conversion between smallest-unit integers and 18-decimal display amounts.

use rust_decimal::Decimal;
use thiserror::Error;

pub const DECIMALS: u32 = 18;

/// Largest smallest-unit amount `to_display` accepts: the 96-bit mantissa of
/// `Decimal`, a little over 79.2 billion whole units. A record above it fails
/// its whole tick.
pub const MAX_DISPLAYABLE: u128 = (1 << 96) - 1;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UnitError {
    #[error("amount {0} cannot be represented as a decimal")]
    Overflow(u128),
    #[error("amount must not be negative: {0}")]
    Negative(Decimal),
    #[error("amount {0} has more than 18 decimal places")]
    TooPrecise(Decimal),
    #[error("amount {0} does not fit in the smallest unit")]
    OutOfRange(Decimal),
}

/// Fails with `UnitError::Overflow` above `MAX_DISPLAYABLE`.
pub fn to_display(smallest_unit: u128) -> Result<Decimal, UnitError> {
    if smallest_unit > MAX_DISPLAYABLE {
        return Err(UnitError::Overflow(smallest_unit));
    }
    let mantissa = i128::try_from(smallest_unit).map_err(|_| UnitError::Overflow(smallest_unit))?;
    Decimal::try_from_i128_with_scale(mantissa, DECIMALS)
        .map(|value| value.normalize())
        .map_err(|_| UnitError::Overflow(smallest_unit))
}

pub fn to_smallest_unit(amount: Decimal) -> Result<u128, UnitError> {
    if amount.is_sign_negative() && !amount.is_zero() {
        return Err(UnitError::Negative(amount));
    }
    let amount = amount.normalize();
    let scale = amount.scale();
    if scale > DECIMALS {
        return Err(UnitError::TooPrecise(amount));
    }
    let factor = 10i128
        .checked_pow(DECIMALS - scale)
        .ok_or(UnitError::OutOfRange(amount))?;
    amount
        .mantissa()
        .checked_mul(factor)
        .and_then(|value| u128::try_from(value).ok())
        .ok_or(UnitError::OutOfRange(amount))
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    const ONE: u128 = 1_000_000_000_000_000_000;

    #[test]
    fn converts_whole_units() {
        assert_eq!(to_display(3 * ONE).expect("display"), Decimal::from(3));
        assert_eq!(
            to_smallest_unit(Decimal::from(5)).expect("smallest"),
            5 * ONE
        );
    }

    #[test]
    fn keeps_full_precision() {
        assert_eq!(
            to_display(1).expect("display"),
            Decimal::from_str("0.000000000000000001").expect("decimal")
        );
        assert_eq!(
            to_smallest_unit(Decimal::from_str("0.000000000000000001").expect("decimal"))
                .expect("smallest"),
            1
        );
    }

    #[test]
    fn round_trips_representable_values() {
        for value in [
            0u128,
            1,
            999,
            ONE - 1,
            ONE,
            123_456_789_012_345_678_901,
            MAX_DISPLAYABLE,
        ] {
            let display = to_display(value).expect("display");
            assert_eq!(to_smallest_unit(display).expect("smallest"), value);
        }
    }

    #[test]
    fn rejects_values_outside_the_decimal_mantissa() {
        assert_eq!(MAX_DISPLAYABLE / ONE, 79_228_162_514);
        assert_eq!(
            to_display(MAX_DISPLAYABLE + 1),
            Err(UnitError::Overflow(MAX_DISPLAYABLE + 1))
        );
        assert_eq!(to_display(u128::MAX), Err(UnitError::Overflow(u128::MAX)));
    }

    #[test]
    fn rejects_negative_and_sub_unit_amounts() {
        assert!(matches!(
            to_smallest_unit(Decimal::from(-1)),
            Err(UnitError::Negative(_))
        ));
        assert!(matches!(
            to_smallest_unit(Decimal::from_str("0.0000000000000000001").expect("decimal")),
            Err(UnitError::TooPrecise(_))
        ));
    }

    #[test]
    fn trailing_zeros_do_not_count_as_precision() {
        let amount = Decimal::from_str("1.50000000000000000000").expect("decimal");
        assert_eq!(to_smallest_unit(amount).expect("smallest"), ONE + ONE / 2);
    }
}
