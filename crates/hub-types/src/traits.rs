//! Capability traits consumed by the settlement layer.
//!
//! These are the seams to the external collaborators: the wrapped transfer
//! module whose callbacks are replayed at finalization, the rollapp registry
//! and the ledger. Implementations are injected at wiring time.

use async_trait::async_trait;
use thiserror::Error;

use crate::coin::Coin;
use crate::packet::TransferPacket;

/// Error surfaced by an external capability.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct ModuleError(pub String);

impl ModuleError {
	pub fn new(msg: impl Into<String>) -> Self {
		Self(msg.into())
	}
}

/// Opaque acknowledgement produced by the transfer module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Acknowledgement(pub Vec<u8>);

/// The wrapped transfer-protocol application.
///
/// The delayed-ack layer intercepts packets before these callbacks run and
/// replays them once the rollapp's state finalizes.
#[async_trait]
pub trait TransferModule: Send + Sync {
	/// Executes the receive leg. A returned acknowledgement is synchronous
	/// and must be written back to the origin chain by the caller.
	async fn on_recv_packet(
		&self,
		packet: &TransferPacket,
		relayer: &str,
	) -> Option<Acknowledgement>;

	async fn on_acknowledgement_packet(
		&self,
		packet: &TransferPacket,
		acknowledgement: &[u8],
		relayer: &str,
	) -> Result<(), ModuleError>;

	/// Refunds the sender for a packet that never completed.
	async fn on_timeout_packet(&self, packet: &TransferPacket, relayer: &str)
		-> Result<(), ModuleError>;

	async fn write_acknowledgement(
		&self,
		packet: &TransferPacket,
		acknowledgement: &Acknowledgement,
	) -> Result<(), ModuleError>;
}

/// Rollapp registry lookups.
pub trait RollappRegistry: Send + Sync {
	/// Resolves the rollapp owning the given channel, if any.
	fn rollapp_id_by_channel(
		&self,
		port: &str,
		channel: &str,
	) -> Result<Option<String>, ModuleError>;

	/// End height of the latest finalized state for the rollapp.
	fn latest_finalized_height(&self, rollapp_id: &str) -> Result<u64, ModuleError>;

	/// Latest (not necessarily finalized) state height for the rollapp.
	fn latest_height(&self, rollapp_id: &str) -> Result<u64, ModuleError>;
}

/// Ledger primitives: account transfers and the blocked-address policy.
#[async_trait]
pub trait Ledger: Send + Sync {
	async fn send_coins(&self, from: &str, to: &str, coins: &[Coin]) -> Result<(), ModuleError>;

	/// Whether the address is barred from receiving funds.
	fn is_blocked(&self, address: &str) -> bool;
}
