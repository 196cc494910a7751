use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};

use crate::utils::error::AppError;

const MINOR_UNITS_PER_MAJOR: i64 = 100;

/// Converts a major-unit amount (naira) into the processor's minor unit (kobo).
pub fn to_minor_units(amount: Decimal) -> Result<i64, AppError> {
    (amount * Decimal::from(MINOR_UNITS_PER_MAJOR))
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i64()
        .ok_or_else(|| AppError::ValidationError(format!("Amount {amount} is out of range")))
}

pub fn from_minor_units(amount: i64) -> Decimal {
    Decimal::new(amount, 2)
}
