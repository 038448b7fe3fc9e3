//! Delayed-acknowledgement packet handling.
//!
//! Transfers between a rollapp and the hub are not executed when the relayer
//! delivers them. They are parked as pending [`RollappPacket`]s and replayed
//! against the wrapped transfer module only once the rollapp state containing
//! them is finalized, or refunded wholesale when the rollapp is rolled back.
//!
//! [`RollappPacket`]: hub_types::RollappPacket

use thiserror::Error;

use hub_storage::StorageError;
use hub_types::packet::{PacketError, PacketStatus};
use hub_types::traits::ModuleError;

pub mod completion;
pub mod filters;
pub mod hooks;
pub mod keeper;

pub use completion::CompletionHook;
pub use filters::{PacketListFilter, PrefixRange};
pub use hooks::{DelayedAckHooks, OrderLookup};
pub use keeper::DelayedAckKeeper;

#[derive(Debug, Error)]
pub enum DelayedAckError {
	#[error("Rollapp packet does not exist")]
	PacketNotFound,

	#[error("Can only update pending packets")]
	CanOnlyUpdatePendingPacket,

	#[error("Invalid status transition: {from} -> {to}")]
	InvalidTransition { from: PacketStatus, to: PacketStatus },

	#[error("Proof height {proof_height} not finalized, latest finalized {finalized_height}")]
	HeightNotFinalized {
		proof_height: u64,
		finalized_height: u64,
	},

	#[error("Completion hook not registered: {0}")]
	HookNotRegistered(String),

	#[error("Packet: {0}")]
	Packet(#[from] PacketError),

	#[error("Storage: {0}")]
	Storage(#[from] StorageError),

	#[error("Module: {0}")]
	Module(#[from] ModuleError),

	#[error("Internal: {0}")]
	Internal(String),
}
