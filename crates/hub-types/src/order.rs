//! Demand orders: tradable claims on pending rollapp packets.

use serde::{Deserialize, Serialize};
use sha3::{Digest, Sha3_256};
use thiserror::Error;

use crate::coin::Coin;
use crate::hooks::CompletionHookCall;
use crate::packet::{PacketStatus, PacketType, RollappPacket};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum OrderError {
	#[error("Price must be positive")]
	EmptyPrice,
	#[error("Price and fee must share one denom")]
	MultipleDenoms,
	#[error("Invalid denom: {0}")]
	InvalidDenom(String),
	#[error("Recipient cannot be empty")]
	EmptyRecipient,
	#[error("Creation height cannot be zero")]
	ZeroCreationHeight,
	#[error("Demand order already fulfilled")]
	AlreadyFulfilled,
	#[error("Demand order inactive")]
	Inactive,
}

/// A tradable claim on a pending packet's proceeds.
///
/// The id is a pure function of the tracking packet's key, so re-processing
/// the same packet can never create a duplicate order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DemandOrder {
	pub id: String,
	pub tracking_packet_key: Vec<u8>,
	pub tracking_packet_status: PacketStatus,
	pub price: Coin,
	pub fee: Coin,
	/// Original beneficiary of the transfer.
	pub recipient: String,
	/// Write-once: set by fulfillment, never cleared.
	#[serde(default)]
	pub fulfiller_address: Option<String>,
	pub rollapp_id: String,
	pub order_type: PacketType,
	#[serde(default)]
	pub completion_hook: Option<CompletionHookCall>,
	pub creation_height: u64,
}

impl DemandOrder {
	/// Creates an order tracking the given packet. Price is what a market
	/// maker pays to buy the claim (the recipient receives it straight away);
	/// fee is what the market maker earns in return.
	pub fn new(
		packet: &RollappPacket,
		price: u128,
		fee: u128,
		denom: impl Into<String>,
		recipient: impl Into<String>,
		creation_height: u64,
	) -> Self {
		let denom = denom.into();
		let tracking_packet_key = packet.key();
		Self {
			id: order_id_from_packet_key(&tracking_packet_key),
			tracking_packet_key,
			tracking_packet_status: PacketStatus::Pending,
			price: Coin::new(denom.clone(), price),
			fee: Coin::new(denom, fee),
			recipient: recipient.into(),
			fulfiller_address: None,
			rollapp_id: packet.rollapp_id.clone(),
			order_type: packet.packet_type,
			completion_hook: None,
			creation_height,
		}
	}

	/// Store key: `status_prefix ++ "/" ++ id ++ "/"`, keyed by the tracking
	/// packet's status so orders transition with their packets.
	pub fn key(&self) -> Vec<u8> {
		order_key(self.tracking_packet_status, &self.id)
	}

	pub fn denom(&self) -> &str {
		&self.price.denom
	}

	pub fn is_fulfilled(&self) -> bool {
		self.fulfiller_address.is_some()
	}

	pub fn validate_basic(&self) -> Result<(), OrderError> {
		if self.price.is_zero() {
			return Err(OrderError::EmptyPrice);
		}
		if self.fee.denom != self.price.denom {
			return Err(OrderError::MultipleDenoms);
		}
		self.price
			.validate()
			.map_err(|e| OrderError::InvalidDenom(e.to_string()))?;
		if self.recipient.is_empty() {
			return Err(OrderError::EmptyRecipient);
		}
		if self.creation_height == 0 {
			return Err(OrderError::ZeroCreationHeight);
		}
		Ok(())
	}

	/// An order is outstanding while unfulfilled and its packet is pending.
	pub fn validate_outstanding(&self) -> Result<(), OrderError> {
		if self.is_fulfilled() {
			return Err(OrderError::AlreadyFulfilled);
		}
		if self.tracking_packet_status != PacketStatus::Pending {
			return Err(OrderError::Inactive);
		}
		Ok(())
	}
}

/// Derives the order id from the tracking packet key. The packet key doubles
/// as the foreign key, so the same packet always maps to the same order.
pub fn order_id_from_packet_key(packet_key: &[u8]) -> String {
	let hash = Sha3_256::digest(packet_key);
	hex::encode(hash)
}

/// Builds an order store key for the given status and id.
pub fn order_key(status: PacketStatus, id: &str) -> Vec<u8> {
	let mut key = Vec::with_capacity(2 + 1 + id.len() + 1);
	key.extend_from_slice(&status.key_prefix());
	key.push(b'/');
	key.extend_from_slice(id.as_bytes());
	key.push(b'/');
	key
}
