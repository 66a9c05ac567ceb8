use std::str::FromStr;

use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;
use shared::domain::FundingRecord;
use thiserror::Error;
use tracing::warn;

use crate::units::{to_display, UnitError, DECIMALS};

const SLIDER_DECIMALS: u32 = 2;

/// Delegatable total of the loaded records, bounded by the ceiling when one applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReconciledAmount {
    pub raw: Decimal,
    pub ceiling: Option<Decimal>,
    pub effective: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AmountValidationError {
    #[error("Provide correct number")]
    NotNumeric(String),
    #[error("Enter value greater than 0")]
    NotPositive,
    #[error("The donations you are delegating have combined value of {maximum}. Do not input higher amount than that.")]
    ExceedsMaximum { maximum: Decimal },
    #[error("Amounts are limited to 18 decimal places")]
    TooPrecise,
}

pub fn reconcile(
    records: &[FundingRecord],
    ceiling: Option<Decimal>,
) -> Result<ReconciledAmount, UnitError> {
    let total = records.iter().try_fold(0u128, |sum, record| {
        sum.checked_add(record.amount_remaining)
            .ok_or(UnitError::Overflow(u128::MAX))
    })?;
    let raw = to_display(total)?;
    let effective = match ceiling {
        Some(ceiling) if ceiling < raw => ceiling,
        _ => raw,
    };
    Ok(ReconciledAmount {
        raw,
        ceiling,
        effective,
    })
}

/// Parses an externally supplied ceiling. Non-numeric and negative values are
/// treated as absent.
pub fn parse_ceiling(text: Option<&str>) -> Option<Decimal> {
    let text = text?.trim();
    if text.is_empty() {
        return None;
    }
    match Decimal::from_str(text) {
        Ok(ceiling) if !ceiling.is_sign_negative() => Some(ceiling.normalize()),
        Ok(ceiling) => {
            warn!(%ceiling, "delegation: ignoring negative ceiling");
            None
        }
        Err(err) => {
            warn!(ceiling = text, %err, "delegation: ignoring non-numeric ceiling");
            None
        }
    }
}

/// Validates a directly entered amount: numeric and `0 < amount <= maximum`.
pub fn validate_amount(text: &str, maximum: Decimal) -> Result<Decimal, AmountValidationError> {
    let trimmed = text.trim();
    let amount = Decimal::from_str(trimmed)
        .map_err(|_| AmountValidationError::NotNumeric(trimmed.to_string()))?
        .normalize();
    if amount <= Decimal::ZERO {
        return Err(AmountValidationError::NotPositive);
    }
    if amount > maximum {
        return Err(AmountValidationError::ExceedsMaximum { maximum });
    }
    if amount.scale() > DECIMALS {
        return Err(AmountValidationError::TooPrecise);
    }
    Ok(amount)
}

/// Slider position to amount: two decimals, never above `maximum`, never below zero.
pub fn slide_amount(position: Decimal, maximum: Decimal) -> Decimal {
    let rounded = position
        .round_dp_with_strategy(SLIDER_DECIMALS, RoundingStrategy::MidpointAwayFromZero)
        .normalize();
    rounded.clamp(Decimal::ZERO, maximum)
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use shared::domain::{DonationStatus, RecordId};

    use super::*;

    const ONE: u128 = 1_000_000_000_000_000_000;

    fn record(id: &str, amount_remaining: u128) -> FundingRecord {
        FundingRecord {
            id: RecordId::new(id),
            amount_remaining,
            status: DonationStatus::Waiting,
            created_at: Utc.with_ymd_and_hms(2018, 3, 1, 0, 0, 0).unwrap(),
        }
    }

    fn dec(text: &str) -> Decimal {
        Decimal::from_str(text).expect("decimal")
    }

    #[test]
    fn empty_record_set_reconciles_to_zero() {
        let amount = reconcile(&[], Some(dec("2"))).expect("reconcile");
        assert_eq!(amount.raw, Decimal::ZERO);
        assert_eq!(amount.effective, Decimal::ZERO);
    }

    #[test]
    fn sums_every_record_without_a_ceiling() {
        let amount = reconcile(&[record("a", 3 * ONE), record("b", 2 * ONE)], None)
            .expect("reconcile");
        assert_eq!(amount.effective, Decimal::from(5));
        assert_eq!(amount.ceiling, None);
    }

    #[test]
    fn clamps_to_a_lower_ceiling_only() {
        let records = [record("a", 3 * ONE), record("b", 2 * ONE)];
        assert_eq!(
            reconcile(&records, Some(dec("2"))).expect("lower").effective,
            dec("2")
        );
        assert_eq!(
            reconcile(&records, Some(dec("7.5"))).expect("higher").effective,
            Decimal::from(5)
        );
    }

    #[test]
    fn matches_the_sum_of_individually_converted_amounts() {
        let remaining = [1u128, ONE / 3, 7 * ONE + 11, 42];
        let records: Vec<_> = remaining
            .iter()
            .enumerate()
            .map(|(i, r)| record(&i.to_string(), *r))
            .collect();
        let expected: Decimal = remaining
            .iter()
            .map(|r| to_display(*r).expect("display"))
            .sum();
        assert_eq!(reconcile(&records, None).expect("reconcile").effective, expected);
    }

    #[test]
    fn overflowing_totals_are_errors() {
        let records = [record("a", u128::MAX), record("b", 1)];
        assert!(reconcile(&records, None).is_err());
    }

    #[test]
    fn invalid_ceilings_are_treated_as_absent() {
        assert_eq!(parse_ceiling(Some("not a number")), None);
        assert_eq!(parse_ceiling(Some("-1")), None);
        assert_eq!(parse_ceiling(Some("  ")), None);
        assert_eq!(parse_ceiling(None), None);
        assert_eq!(parse_ceiling(Some("2.50")), Some(dec("2.5")));
    }

    #[test]
    fn validation_enforces_bounds() {
        let maximum = dec("2");
        assert_eq!(validate_amount("1.5", maximum), Ok(dec("1.5")));
        assert_eq!(validate_amount("2", maximum), Ok(dec("2")));
        assert_eq!(validate_amount("0", maximum), Err(AmountValidationError::NotPositive));
        assert_eq!(validate_amount("-1", maximum), Err(AmountValidationError::NotPositive));
        assert_eq!(
            validate_amount("3", maximum),
            Err(AmountValidationError::ExceedsMaximum { maximum })
        );
        assert!(matches!(
            validate_amount("abc", maximum),
            Err(AmountValidationError::NotNumeric(_))
        ));
    }

    #[test]
    fn slider_rounds_to_two_places_and_clamps() {
        let maximum = dec("5");
        assert_eq!(slide_amount(dec("1.234"), maximum), dec("1.23"));
        assert_eq!(slide_amount(dec("1.235"), maximum), dec("1.24"));
        assert_eq!(slide_amount(dec("7"), maximum), maximum);
        assert_eq!(slide_amount(dec("-1"), maximum), Decimal::ZERO);
    }
}
