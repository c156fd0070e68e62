//! Amount limits and unit conversion
//!
//! Domain amounts are major units. Some providers speak minor units on the
//! wire (kobo, pesewas, cents); conversion is explicit and never truncates.

use crate::error::{PaymentError, PaymentResult};
use crate::payments::types::{Currency, Provider};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde_json::Value;
use std::str::FromStr;

/// Transactable range for one currency, in major units
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AmountLimits {
    pub currency: Currency,
    pub min: Decimal,
    pub max: Decimal,
}

impl AmountLimits {
    pub const fn new(currency: Currency, min: Decimal, max: Decimal) -> Self {
        Self { currency, min, max }
    }

    pub fn contains(&self, amount: Decimal) -> bool {
        amount >= self.min && amount <= self.max
    }
}

pub fn limits_for(limits: &[AmountLimits], currency: Currency) -> Option<&AmountLimits> {
    limits.iter().find(|limit| limit.currency == currency)
}

/// Rejects unsupported currencies, out-of-range amounts and amounts more
/// precise than the currency's minor unit.
pub fn check_amount(
    provider: Provider,
    limits: &[AmountLimits],
    amount: Decimal,
    currency: Currency,
) -> PaymentResult<()> {
    let limit = limits_for(limits, currency).ok_or_else(|| {
        PaymentError::validation(
            Some("currency"),
            format!("{} does not support currency {}", provider, currency),
        )
    })?;

    if !limit.contains(amount) {
        return Err(PaymentError::validation(
            Some("amount"),
            format!(
                "Amount {} {} is outside the allowed range [{}, {}] for {}",
                amount, currency, limit.min, limit.max, provider
            ),
        ));
    }

    check_precision(amount, currency)
}

fn check_precision(amount: Decimal, currency: Currency) -> PaymentResult<()> {
    check_scale(amount, currency.minor_unit_exponent()).map_err(|_| {
        PaymentError::validation(
            Some("amount"),
            format!(
                "Amount {} has more than {} decimal places for {}",
                amount,
                currency.minor_unit_exponent(),
                currency
            ),
        )
    })
}

fn check_scale(amount: Decimal, exponent: u32) -> PaymentResult<()> {
    if amount.normalize().scale() > exponent {
        return Err(PaymentError::validation(
            Some("amount"),
            format!("Amount {} has more than {} decimal places", amount, exponent),
        ));
    }
    Ok(())
}

/// Major units to the integer minor-unit amount providers expect.
pub fn to_minor_units(amount: Decimal, currency: Currency) -> PaymentResult<i64> {
    check_precision(amount, currency)?;
    scale_to_minor(amount, currency.minor_unit_exponent())
}

pub fn from_minor_units(minor: Decimal, currency: Currency) -> Decimal {
    scale_from_minor(minor, currency.minor_unit_exponent())
}

/// Like [`to_minor_units`] for a fixed exponent, when the currency is not
/// known but the provider uses one subunit for everything it supports.
pub fn scale_to_minor(amount: Decimal, exponent: u32) -> PaymentResult<i64> {
    check_scale(amount, exponent)?;
    amount
        .checked_mul(Decimal::from(10_i64.pow(exponent)))
        .and_then(|minor| minor.to_i64())
        .ok_or_else(|| PaymentError::validation(Some("amount"), format!("Amount {} is too large", amount)))
}

/// Rejects zero and negative amounts, e.g. for partial refunds.
pub fn ensure_positive(amount: Decimal) -> PaymentResult<()> {
    if amount <= Decimal::ZERO {
        return Err(PaymentError::validation(
            Some("amount"),
            format!("Amount must be positive, got {}", amount),
        ));
    }
    Ok(())
}

pub fn scale_from_minor(minor: Decimal, exponent: u32) -> Decimal {
    minor / Decimal::from(10_i64.pow(exponent))
}

/// Reads an amount that providers send either as a JSON number or a string.
pub fn decimal_from_json(value: &Value) -> Option<Decimal> {
    match value {
        Value::Number(n) => match n.as_i64() {
            Some(i) => Some(Decimal::from(i)),
            None => {
                let text = n.to_string();
                Decimal::from_str(&text)
                    .or_else(|_| Decimal::from_scientific(&text))
                    .ok()
            }
        },
        Value::String(s) => Decimal::from_str(s.trim()).ok(),
        _ => None,
    }
}

/// Renders an amount as a JSON number, integral when possible.
pub fn decimal_to_json(amount: Decimal) -> Value {
    if amount.fract().is_zero() {
        if let Some(i) = amount.to_i64() {
            return Value::from(i);
        }
    }
    amount
        .to_f64()
        .and_then(serde_json::Number::from_f64)
        .map(Value::Number)
        .unwrap_or_else(|| Value::String(amount.to_string()))
}
