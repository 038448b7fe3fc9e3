//! Bridges the delayed-ack packet lifecycle into the order store.

use std::sync::Arc;

use hub_delayedack::{DelayedAckHooks, OrderLookup};
use hub_types::order::DemandOrder;
use hub_types::packet::RollappPacket;
use hub_types::traits::ModuleError;

use crate::keeper::EibcKeeper;

/// Subscribes the order marketplace to packet lifecycle events and answers
/// order lookups during finalization.
pub struct EibcPacketHooks {
	keeper: Arc<EibcKeeper>,
}

impl EibcPacketHooks {
	pub fn new(keeper: Arc<EibcKeeper>) -> Self {
		Self { keeper }
	}
}

impl DelayedAckHooks for EibcPacketHooks {
	fn after_packet_status_updated(
		&self,
		packet: &RollappPacket,
		old_packet_key: &[u8],
		new_packet_key: &[u8],
	) -> Result<(), ModuleError> {
		self.keeper
			.on_packet_status_updated(packet, old_packet_key, new_packet_key)
			.map_err(|e| ModuleError::new(e.to_string()))
	}

	fn after_packet_deleted(&self, packet: &RollappPacket) -> Result<(), ModuleError> {
		self.keeper
			.on_packet_deleted(packet)
			.map_err(|e| ModuleError::new(e.to_string()))
	}
}

impl OrderLookup for EibcPacketHooks {
	fn pending_order_by_packet(
		&self,
		packet: &RollappPacket,
	) -> Result<Option<DemandOrder>, ModuleError> {
		self.keeper
			.pending_order_by_packet(packet)
			.map_err(|e| ModuleError::new(e.to_string()))
	}
}
