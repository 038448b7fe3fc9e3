//! Delegated fulfillment: an LP grants an operator the right to fulfill
//! orders on its behalf, under per-rollapp criteria and a mutable spend limit.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use hub_types::coin::Coin;

use crate::EibcError;

/// Per-rollapp constraints of a fulfillment grant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RollappCriteria {
	pub rollapp_id: String,
	/// Allowed order denoms; empty means any.
	#[serde(default)]
	pub denoms: Vec<String>,
	/// Minimum share of the order volume the LP must earn, as a rate of
	/// price + fee.
	pub min_lp_fee_percentage: Decimal,
	/// Per-denom price caps; empty means uncapped.
	#[serde(default)]
	pub max_price: Vec<Coin>,
	/// Share of the order fee forwarded to the operator.
	pub operator_fee_share: Decimal,
	/// Whether fulfillments must wait until the packet's proof height is
	/// covered by a posted (not necessarily finalized) state update.
	pub settlement_validated: bool,
}

/// A fulfillment grant: per-rollapp criteria plus a top-level spend limit
/// shared across all of them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FulfillOrderAuthorization {
	pub rollapps: Vec<RollappCriteria>,
	/// Remaining budget; empty means unlimited.
	#[serde(default)]
	pub spend_limit: Vec<Coin>,
}

/// The parameters of one delegated fulfillment, checked against the grant.
#[derive(Debug, Clone)]
pub struct AuthorizedFulfillment {
	pub rollapp_id: String,
	pub price: Coin,
	pub expected_fee: u128,
	pub operator_fee_share: Decimal,
	pub settlement_validated: bool,
}

/// Outcome of accepting a fulfillment against a grant. `delete` retires the
/// grant; `updated` replaces it with a reduced spend limit.
#[derive(Debug, Clone, PartialEq)]
pub struct AcceptResponse {
	pub delete: bool,
	pub updated: Option<FulfillOrderAuthorization>,
}

impl FulfillOrderAuthorization {
	pub fn new(rollapps: Vec<RollappCriteria>, spend_limit: Vec<Coin>) -> Self {
		Self {
			rollapps,
			spend_limit,
		}
	}

	pub fn validate_basic(&self) -> Result<(), EibcError> {
		let mut seen = std::collections::HashSet::new();
		for criteria in &self.rollapps {
			if criteria.rollapp_id.is_empty() {
				return Err(EibcError::InvalidAuthorization(
					"rollapp_id cannot be empty".to_string(),
				));
			}
			if !seen.insert(&criteria.rollapp_id) {
				return Err(EibcError::InvalidAuthorization(format!(
					"duplicate rollapp_id {}",
					criteria.rollapp_id
				)));
			}
			if criteria.min_lp_fee_percentage < Decimal::ZERO {
				return Err(EibcError::InvalidAuthorization(format!(
					"min_lp_fee_percentage cannot be negative for rollapp_id {}",
					criteria.rollapp_id
				)));
			}
			if criteria.operator_fee_share < Decimal::ZERO
				|| criteria.operator_fee_share > Decimal::ONE
			{
				return Err(EibcError::InvalidAuthorization(format!(
					"operator_fee_share must be between 0 and 1 for rollapp_id {}",
					criteria.rollapp_id
				)));
			}
			let mut denoms = std::collections::HashSet::new();
			for denom in &criteria.denoms {
				if !denoms.insert(denom) {
					return Err(EibcError::InvalidAuthorization(format!(
						"duplicate denoms in the list for rollapp_id {}",
						criteria.rollapp_id
					)));
				}
			}
		}
		Ok(())
	}

	/// Checks the fulfillment against the grant and computes the follow-up:
	/// spend the price from the limit, retiring the grant when it hits zero.
	pub fn accept(&self, m: &AuthorizedFulfillment) -> Result<AcceptResponse, EibcError> {
		let criteria = self
			.rollapps
			.iter()
			.find(|criteria| criteria.rollapp_id == m.rollapp_id)
			.ok_or_else(|| {
				EibcError::Unauthorized(format!("rollapp {} is not authorized", m.rollapp_id))
			})?;

		if criteria.settlement_validated != m.settlement_validated {
			return Err(EibcError::Unauthorized(
				"settlement validation flag mismatch".to_string(),
			));
		}
		if criteria.operator_fee_share != m.operator_fee_share {
			return Err(EibcError::Unauthorized(
				"operator fee share mismatch".to_string(),
			));
		}
		if !criteria.denoms.is_empty() && !criteria.denoms.contains(&m.price.denom) {
			return Err(EibcError::Unauthorized(format!(
				"denom {} is not authorized",
				m.price.denom
			)));
		}

		// The LP keeps fee - operator share of it; that has to clear the
		// minimum rate over the full transfer volume (price + fee).
		let fee = decimal(m.expected_fee);
		let operator_fee = fee * criteria.operator_fee_share;
		let lp_fee = fee - operator_fee;
		let volume = decimal(m.price.amount) + fee;
		let min_lp_fee = volume * criteria.min_lp_fee_percentage;
		if lp_fee < min_lp_fee {
			return Err(EibcError::Unauthorized(format!(
				"order LP fee {} is less than minimum LP fee {}",
				lp_fee, min_lp_fee
			)));
		}

		if !criteria.max_price.is_empty() {
			let cap = criteria
				.max_price
				.iter()
				.find(|coin| coin.denom == m.price.denom)
				.map_or(0, |coin| coin.amount);
			if m.price.amount > cap {
				return Err(EibcError::Unauthorized(
					"order price exceeds max price".to_string(),
				));
			}
		}

		if self.spend_limit.is_empty() {
			return Ok(AcceptResponse {
				delete: false,
				updated: None,
			});
		}

		let mut spend_left = self.spend_limit.clone();
		let entry = spend_left
			.iter_mut()
			.find(|coin| coin.denom == m.price.denom)
			.ok_or(EibcError::SpendLimitExhausted)?;
		if entry.amount < m.price.amount {
			return Err(EibcError::SpendLimitExhausted);
		}
		entry.amount -= m.price.amount;
		spend_left.retain(|coin| coin.amount > 0);

		if spend_left.is_empty() {
			return Ok(AcceptResponse {
				delete: true,
				updated: None,
			});
		}
		Ok(AcceptResponse {
			delete: false,
			updated: Some(FulfillOrderAuthorization {
				rollapps: self.rollapps.clone(),
				spend_limit: spend_left,
			}),
		})
	}
}

/// The operator's cut of an order fee under the given share, truncated.
pub fn operator_fee_amount(fee: u128, operator_fee_share: Decimal) -> u128 {
	(decimal(fee) * operator_fee_share).trunc().to_u128().unwrap_or(0)
}

fn decimal(v: u128) -> Decimal {
	Decimal::try_from(v).unwrap_or(Decimal::MAX)
}

#[cfg(test)]
mod tests {
	use super::*;

	fn criteria() -> RollappCriteria {
		RollappCriteria {
			rollapp_id: "rollapp_1234-1".to_string(),
			denoms: vec![],
			min_lp_fee_percentage: Decimal::ZERO,
			max_price: vec![],
			operator_fee_share: Decimal::ZERO,
			settlement_validated: false,
		}
	}

	fn fulfillment(price: u128, fee: u128) -> AuthorizedFulfillment {
		AuthorizedFulfillment {
			rollapp_id: "rollapp_1234-1".to_string(),
			price: Coin::new("adym", price),
			expected_fee: fee,
			operator_fee_share: Decimal::ZERO,
			settlement_validated: false,
		}
	}

	#[test]
	fn unknown_rollapp_is_unauthorized() {
		let auth = FulfillOrderAuthorization::new(vec![criteria()], vec![]);
		let mut m = fulfillment(100, 10);
		m.rollapp_id = "other".to_string();
		assert!(matches!(auth.accept(&m), Err(EibcError::Unauthorized(_))));
	}

	#[test]
	fn lp_fee_must_clear_minimum() {
		let mut c = criteria();
		// 2% of volume, operator takes half the fee
		c.min_lp_fee_percentage = Decimal::new(2, 2);
		c.operator_fee_share = Decimal::new(5, 1);
		let auth = FulfillOrderAuthorization::new(vec![c], vec![]);

		// volume 1000, min lp fee 20, lp keeps 40/2 = 20 -> ok
		let mut ok = fulfillment(960, 40);
		ok.operator_fee_share = Decimal::new(5, 1);
		assert!(auth.accept(&ok).is_ok());

		// lp keeps 30/2 = 15 < 2% of 1000 -> rejected
		let mut low = fulfillment(970, 30);
		low.operator_fee_share = Decimal::new(5, 1);
		assert!(matches!(auth.accept(&low), Err(EibcError::Unauthorized(_))));
	}

	#[test]
	fn max_price_caps_the_order() {
		let mut c = criteria();
		c.max_price = vec![Coin::new("adym", 500)];
		let auth = FulfillOrderAuthorization::new(vec![c], vec![]);
		assert!(auth.accept(&fulfillment(500, 1)).is_ok());
		assert!(matches!(
			auth.accept(&fulfillment(501, 1)),
			Err(EibcError::Unauthorized(_)),
		));
	}

	#[test]
	fn spend_limit_decreases_and_retires_grant() {
		let auth =
			FulfillOrderAuthorization::new(vec![criteria()], vec![Coin::new("adym", 300)]);

		let resp = auth.accept(&fulfillment(100, 1)).unwrap();
		assert!(!resp.delete);
		let updated = resp.updated.unwrap();
		assert_eq!(updated.spend_limit, vec![Coin::new("adym", 200)]);

		// spending exactly the rest deletes the grant
		let resp = updated.accept(&fulfillment(200, 1)).unwrap();
		assert!(resp.delete);
		assert!(resp.updated.is_none());

		// overspending fails
		assert!(matches!(
			auth.accept(&fulfillment(301, 1)),
			Err(EibcError::SpendLimitExhausted),
		));
	}

	#[test]
	fn mismatched_flags_are_unauthorized() {
		let auth = FulfillOrderAuthorization::new(vec![criteria()], vec![]);
		let mut m = fulfillment(100, 1);
		m.settlement_validated = true;
		assert!(matches!(auth.accept(&m), Err(EibcError::Unauthorized(_))));

		let mut m = fulfillment(100, 1);
		m.operator_fee_share = Decimal::new(1, 1);
		assert!(matches!(auth.accept(&m), Err(EibcError::Unauthorized(_))));
	}

	#[test]
	fn validate_rejects_duplicates_and_bad_rates() {
		let auth = FulfillOrderAuthorization::new(vec![criteria(), criteria()], vec![]);
		assert!(auth.validate_basic().is_err());

		let mut c = criteria();
		c.operator_fee_share = Decimal::new(11, 1);
		let auth = FulfillOrderAuthorization::new(vec![c], vec![]);
		assert!(auth.validate_basic().is_err());
	}
}
