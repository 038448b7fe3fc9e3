use thiserror::Error;

use hub_delayedack::DelayedAckError;
use hub_eibc::EibcError;
use hub_storage::StorageError;
use hub_types::packet::PacketError;
use hub_types::traits::ModuleError;

#[derive(Debug, Error)]
pub enum CoreError {
	#[error("Delayed ack: {0}")]
	DelayedAck(#[from] DelayedAckError),

	#[error("Eibc: {0}")]
	Eibc(#[from] EibcError),

	#[error("Packet: {0}")]
	Packet(#[from] PacketError),

	#[error("Storage: {0}")]
	Storage(#[from] StorageError),

	#[error("Module: {0}")]
	Module(#[from] ModuleError),
}
