//! Coin amounts and fee arithmetic.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors produced by coin validation and price arithmetic.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CoinError {
	#[error("Empty denom")]
	EmptyDenom,
	#[error("Fee {fee} larger than amount {amount}")]
	FeeLargerThanAmount { fee: u128, amount: u128 },
	#[error("Price is not positive: amount {amount}, fee {fee}, bridging fee {bridging_fee}")]
	PriceNotPositive {
		amount: u128,
		fee: u128,
		bridging_fee: u128,
	},
	#[error("Invalid amount: {0}")]
	InvalidAmount(String),
}

/// A single-denomination token amount.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coin {
	pub denom: String,
	pub amount: u128,
}

impl Coin {
	pub fn new(denom: impl Into<String>, amount: u128) -> Self {
		Self {
			denom: denom.into(),
			amount,
		}
	}

	pub fn is_zero(&self) -> bool {
		self.amount == 0
	}

	pub fn validate(&self) -> Result<(), CoinError> {
		if self.denom.is_empty() {
			return Err(CoinError::EmptyDenom);
		}
		Ok(())
	}
}

impl std::fmt::Display for Coin {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}{}", self.amount, self.denom)
	}
}

/// Parses a decimal-string token amount. Transfer payloads carry amounts as
/// strings, so every entry point funnels through here.
pub fn parse_amount(s: &str) -> Result<u128, CoinError> {
	s.parse::<u128>()
		.map_err(|_| CoinError::InvalidAmount(s.to_string()))
}

/// Multiplies an integer amount by a decimal rate, truncating toward zero.
///
/// Used for bridging fees and the ack-error/timeout fee multipliers. Rates are
/// validated to lie in [0, 1), so the product always fits back into u128.
pub fn mul_rate(amount: u128, rate: Decimal) -> u128 {
	let product = Decimal::from_u128_retaining(amount) * rate;
	product.trunc().to_u128().unwrap_or(0)
}

/// Computes a demand order price: `amount - fee - rate * amount`.
///
/// Rejects fees larger than the amount and non-positive results, matching the
/// order creation invariants.
pub fn price_with_bridging_fee(amount: u128, fee: u128, rate: Decimal) -> Result<u128, CoinError> {
	if fee > amount {
		return Err(CoinError::FeeLargerThanAmount { fee, amount });
	}
	let bridging_fee = mul_rate(amount, rate);
	let price = amount
		.checked_sub(fee)
		.and_then(|p| p.checked_sub(bridging_fee))
		.unwrap_or(0);
	if price == 0 {
		return Err(CoinError::PriceNotPositive {
			amount,
			fee,
			bridging_fee,
		});
	}
	Ok(price)
}

/// Decimal helper for u128. Decimal holds 96 bits; transfer amounts beyond
/// that saturate, which only over-estimates fees and never the price.
trait FromU128 {
	fn from_u128_retaining(v: u128) -> Decimal;
}

impl FromU128 for Decimal {
	fn from_u128_retaining(v: u128) -> Decimal {
		Decimal::try_from(v).unwrap_or(Decimal::MAX)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use rust_decimal::Decimal;

	#[test]
	fn price_subtracts_fee_and_bridging_fee() {
		// amount 1000, fee 100, rate 1% -> 1000 - 100 - 10 = 890
		let price = price_with_bridging_fee(1000, 100, Decimal::new(1, 2)).unwrap();
		assert_eq!(price, 890);
	}

	#[test]
	fn price_rejects_fee_larger_than_amount() {
		let err = price_with_bridging_fee(100, 101, Decimal::ZERO).unwrap_err();
		assert!(matches!(err, CoinError::FeeLargerThanAmount { .. }));
	}

	#[test]
	fn price_rejects_non_positive_result() {
		// amount 100, fee 100 -> price 0
		let err = price_with_bridging_fee(100, 100, Decimal::ZERO).unwrap_err();
		assert!(matches!(err, CoinError::PriceNotPositive { .. }));
	}

	#[test]
	fn rate_multiplication_truncates() {
		assert_eq!(mul_rate(999, Decimal::new(1, 2)), 9);
		assert_eq!(mul_rate(1000, Decimal::new(15, 4)), 1);
		assert_eq!(mul_rate(0, Decimal::new(5, 1)), 0);
	}
}
