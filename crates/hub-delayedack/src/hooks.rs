//! Subscriber hooks fired on packet lifecycle changes.

use hub_types::order::DemandOrder;
use hub_types::packet::RollappPacket;
use hub_types::traits::ModuleError;

/// Subscribers notified when a packet changes status or is deleted. The order
/// marketplace uses this to keep demand orders keyed in sync with their
/// tracking packets.
pub trait DelayedAckHooks: Send + Sync {
	/// Fired exactly once per status transition, after the packet has been
	/// re-keyed under its new status.
	fn after_packet_status_updated(
		&self,
		packet: &RollappPacket,
		old_packet_key: &[u8],
		new_packet_key: &[u8],
	) -> Result<(), ModuleError>;

	/// Fired when a terminal packet is garbage-collected.
	fn after_packet_deleted(&self, packet: &RollappPacket) -> Result<(), ModuleError>;
}

/// Lookup of the demand order tracking a packet, implemented by the order
/// marketplace. Finalization consults it to decide whether a completion hook
/// still has to run.
pub trait OrderLookup: Send + Sync {
	/// The order tracking the given still-pending packet, if one exists.
	fn pending_order_by_packet(
		&self,
		packet: &RollappPacket,
	) -> Result<Option<DemandOrder>, ModuleError>;
}
