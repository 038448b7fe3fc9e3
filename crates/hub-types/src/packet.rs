//! Rollapp packet model and key layout.
//!
//! A `RollappPacket` is one directional leg of a cross-chain transfer tied to
//! a rollapp, held in a delayed-acknowledgement state until the rollapp's
//! state finalizes. The packet store key encodes status, rollapp and proof
//! height so that a prefix scan visits packets in ascending height order; the
//! byte layout is compatibility-critical and must not change.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::coin::parse_amount;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PacketError {
	#[error("Rollapp id cannot be empty")]
	EmptyRollappId,
	#[error("Relayer cannot be empty")]
	EmptyRelayer,
	#[error("Proof height cannot be zero")]
	ZeroProofHeight,
	#[error("Packet data: {0}")]
	Data(String),
	#[error("Invalid transfer payload: {0}")]
	InvalidTransfer(String),
}

/// Opaque transfer-protocol envelope: ports, channels, sequence, payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferPacket {
	pub source_port: String,
	pub source_channel: String,
	pub destination_port: String,
	pub destination_channel: String,
	pub sequence: u64,
	/// JSON-encoded `TransferPacketData`.
	pub data: Vec<u8>,
	pub timeout_height: u64,
	pub timeout_timestamp: u64,
}

/// Fungible-token payload carried in `TransferPacket::data`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferPacketData {
	pub denom: String,
	/// Decimal-string amount, per the transfer protocol wire format.
	pub amount: String,
	pub sender: String,
	pub receiver: String,
	#[serde(default)]
	pub memo: String,
}

impl TransferPacketData {
	pub fn validate_basic(&self) -> Result<(), PacketError> {
		if self.denom.is_empty() {
			return Err(PacketError::InvalidTransfer("empty denom".into()));
		}
		if self.sender.is_empty() {
			return Err(PacketError::InvalidTransfer("empty sender".into()));
		}
		if self.receiver.is_empty() {
			return Err(PacketError::InvalidTransfer("empty receiver".into()));
		}
		let amount = parse_amount(&self.amount)
			.map_err(|e| PacketError::InvalidTransfer(e.to_string()))?;
		if amount == 0 {
			return Err(PacketError::InvalidTransfer("amount is zero".into()));
		}
		Ok(())
	}

	pub fn to_bytes(&self) -> Vec<u8> {
		// serde_json cannot fail on this struct
		serde_json::to_vec(self).unwrap_or_default()
	}
}

/// Which transfer-protocol callback this packet is waiting to replay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PacketType {
	OnRecv,
	OnAck,
	OnTimeout,
}

impl std::fmt::Display for PacketType {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		let s = match self {
			PacketType::OnRecv => "ON_RECV",
			PacketType::OnAck => "ON_ACK",
			PacketType::OnTimeout => "ON_TIMEOUT",
		};
		f.write_str(s)
	}
}

/// Packet lifecycle status. Transitions are monotonic:
/// Pending -> Finalized or Pending -> Reverted, never back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PacketStatus {
	Pending,
	Finalized,
	Reverted,
}

impl PacketStatus {
	/// Two-byte store prefix. The values are part of the persisted key layout.
	pub fn key_prefix(&self) -> [u8; 2] {
		match self {
			PacketStatus::Pending => [0x00, 0x01],
			PacketStatus::Finalized => [0x00, 0x02],
			PacketStatus::Reverted => [0x00, 0x03],
		}
	}

	pub fn is_terminal(&self) -> bool {
		!matches!(self, PacketStatus::Pending)
	}

	pub fn all() -> [PacketStatus; 3] {
		[
			PacketStatus::Pending,
			PacketStatus::Finalized,
			PacketStatus::Reverted,
		]
	}
}

impl std::fmt::Display for PacketStatus {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		let s = match self {
			PacketStatus::Pending => "PENDING",
			PacketStatus::Finalized => "FINALIZED",
			PacketStatus::Reverted => "REVERTED",
		};
		f.write_str(s)
	}
}

/// One directional leg of a rollapp transfer, held until finalization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollappPacket {
	pub rollapp_id: String,
	pub packet: TransferPacket,
	pub packet_type: PacketType,
	pub status: PacketStatus,
	/// Rollapp height the packet's proof corresponds to. In practice the
	/// light client's latest height is used as a proxy; see the middleware.
	pub proof_height: u64,
	pub relayer: String,
	/// Stored acknowledgement bytes, OnAck only.
	#[serde(default)]
	pub acknowledgement: Option<Vec<u8>>,
	/// Last processing error, recorded during finalization.
	#[serde(default)]
	pub error: Option<String>,
	/// The transfer target as the rollapp sent it, saved when a fulfillment
	/// rewrites the packet so the ack can be restored to match the proof.
	#[serde(default)]
	pub original_transfer_target: Option<String>,
}

impl RollappPacket {
	/// Store key: `status_prefix ++ "/" ++ rollapp_id ++ "/" ++
	/// %020d(proof_height) ++ "/" ++ source_channel ++ "-" ++ sequence`.
	pub fn key(&self) -> Vec<u8> {
		packet_key(
			self.status,
			&self.rollapp_id,
			self.proof_height,
			&self.packet.source_channel,
			self.packet.sequence,
		)
	}

	pub fn transfer_data(&self) -> Result<TransferPacketData, PacketError> {
		serde_json::from_slice(&self.packet.data).map_err(|e| PacketError::Data(e.to_string()))
	}

	pub fn validate_basic(&self) -> Result<(), PacketError> {
		if self.rollapp_id.is_empty() {
			return Err(PacketError::EmptyRollappId);
		}
		if self.relayer.is_empty() {
			return Err(PacketError::EmptyRelayer);
		}
		if self.proof_height == 0 {
			return Err(PacketError::ZeroProofHeight);
		}
		self.transfer_data()?.validate_basic()
	}

	/// Undoes the fulfillment rewrite on the packet payload so that the
	/// acknowledgement written back to the rollapp matches what it sent.
	/// A no-op when the order was never fulfilled.
	pub fn restore_original_transfer_target(&self) -> Result<RollappPacket, PacketError> {
		let mut restored = self.clone();
		if let Some(target) = &self.original_transfer_target {
			let mut data = self.transfer_data()?;
			match self.packet_type {
				PacketType::OnRecv => data.receiver = target.clone(),
				PacketType::OnAck | PacketType::OnTimeout => data.sender = target.clone(),
			}
			restored.packet.data = data.to_bytes();
		}
		Ok(restored)
	}

	pub fn log_string(&self) -> String {
		format!(
			"RollappPacket{{{}, {}, {}, {}, {}, {}}}",
			self.rollapp_id,
			self.packet_type,
			self.status,
			self.packet.source_channel,
			self.packet.sequence,
			self.proof_height,
		)
	}
}

/// Builds a packet store key for the given coordinates.
pub fn packet_key(
	status: PacketStatus,
	rollapp_id: &str,
	proof_height: u64,
	source_channel: &str,
	sequence: u64,
) -> Vec<u8> {
	let mut key = Vec::with_capacity(2 + 1 + rollapp_id.len() + 1 + 20 + 1 + 24);
	key.extend_from_slice(&status.key_prefix());
	key.push(b'/');
	key.extend_from_slice(rollapp_id.as_bytes());
	key.push(b'/');
	key.extend_from_slice(format!("{proof_height:020}").as_bytes());
	key.push(b'/');
	key.extend_from_slice(source_channel.as_bytes());
	key.push(b'-');
	key.extend_from_slice(sequence.to_string().as_bytes());
	key
}
