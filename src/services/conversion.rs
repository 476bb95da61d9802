use crate::{
    error::PaymentError,
    models::{Conversion, RateQuote, TOKEN_DISPLAY_DECIMALS},
};
use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;

/// Smallest fiat amount a request may be issued for.
pub const MIN_FIAT_AMOUNT: Decimal = dec!(0.01);

/// Converts a fiat amount with a quote of token units per 1 fiat unit.
///
/// The token amount is rounded (midpoint away from zero) and rescaled to
/// six decimals, so `10 * 2.0` yields `20.000000`.
pub fn convert(fiat_amount: Decimal, quote: &RateQuote) -> Result<Conversion, PaymentError> {
    let token_amount = token_amount(fiat_amount, quote.rate)?;

    Ok(Conversion {
        fiat_amount,
        fiat_currency: quote.pair.base.clone(),
        rate_units_per_fiat: quote.rate,
        token_amount,
        rate_timestamp: quote.timestamp,
    })
}

pub fn token_amount(fiat_amount: Decimal, rate_units_per_fiat: Decimal) -> Result<Decimal, PaymentError> {
    if fiat_amount <= Decimal::ZERO {
        return Err(PaymentError::InvalidAmount(format!(
            "Fiat amount must be positive, got {}",
            fiat_amount
        )));
    }
    if fiat_amount < MIN_FIAT_AMOUNT {
        return Err(PaymentError::InvalidAmount(format!(
            "Fiat amount {} is below the minimum of {}",
            fiat_amount, MIN_FIAT_AMOUNT
        )));
    }
    if rate_units_per_fiat <= Decimal::ZERO {
        return Err(PaymentError::InvalidAmount(format!(
            "Rate must be positive, got {}",
            rate_units_per_fiat
        )));
    }

    let mut amount = fiat_amount
        .checked_mul(rate_units_per_fiat)
        .ok_or_else(|| PaymentError::InvalidAmount("Token amount overflows".to_string()))?
        .round_dp_with_strategy(TOKEN_DISPLAY_DECIMALS, RoundingStrategy::MidpointAwayFromZero);
    amount.rescale(TOKEN_DISPLAY_DECIMALS);

    if amount.is_zero() {
        return Err(PaymentError::InvalidAmount(
            "Token amount rounds to zero".to_string(),
        ));
    }

    Ok(amount)
}
