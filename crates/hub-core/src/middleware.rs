//! Transfer middleware intercepting rollapp packets.
//!
//! Sits between the channel layer and the wrapped transfer module. Packets on
//! non-rollapp channels pass straight through; rollapp packets are parked as
//! pending and their callbacks replayed at finalization.
//!
//! Proof heights are taken from the caller. The canonical light client's
//! latest height is the usual proxy: it can overshoot the height the packet
//! was actually proven at, which only ever delays finalization, never front
//! runs it.

use std::sync::Arc;

use tracing::{debug, error};

use hub_delayedack::DelayedAckKeeper;
use hub_eibc::EibcKeeper;
use hub_types::events::{HubEvent, OrderEvent, PacketEvent};
use hub_types::packet::{PacketStatus, PacketType, RollappPacket, TransferPacket};
use hub_types::traits::{Acknowledgement, RollappRegistry, TransferModule};

use crate::event_bus::EventBus;
use crate::CoreError;

pub struct DelayedAckMiddleware {
	transfer: Arc<dyn TransferModule>,
	registry: Arc<dyn RollappRegistry>,
	dack: Arc<DelayedAckKeeper>,
	eibc: Arc<EibcKeeper>,
	events: EventBus,
}

impl DelayedAckMiddleware {
	pub fn new(
		transfer: Arc<dyn TransferModule>,
		registry: Arc<dyn RollappRegistry>,
		dack: Arc<DelayedAckKeeper>,
		eibc: Arc<EibcKeeper>,
		events: EventBus,
	) -> Self {
		Self {
			transfer,
			registry,
			dack,
			eibc,
			events,
		}
	}

	/// Intercepts an inbound transfer. Non-rollapp packets and packets whose
	/// proof height is already finalized run immediately; everything else is
	/// parked and acknowledged only at finalization (returns `None`).
	pub async fn on_recv_packet(
		&self,
		packet: &TransferPacket,
		relayer: &str,
		proof_height: u64,
		hub_height: u64,
	) -> Result<Option<Acknowledgement>, CoreError> {
		// inbound: the hub side of the channel is the destination
		let rollapp_id = self
			.registry
			.rollapp_id_by_channel(&packet.destination_port, &packet.destination_channel)?;
		let Some(rollapp_id) = rollapp_id else {
			return Ok(self.transfer.on_recv_packet(packet, relayer).await);
		};
		if self.height_finalized(&rollapp_id, proof_height)? {
			debug!(rollapp_id, proof_height, "proof height already finalized, skipping delay");
			return Ok(self.transfer.on_recv_packet(packet, relayer).await);
		}

		let rollapp_packet = build_packet(
			rollapp_id,
			packet.clone(),
			PacketType::OnRecv,
			proof_height,
			relayer,
			None,
		);
		// An error ack discards the receive leg's writes, packet included.
		let snapshot = self.dack.db().snapshot()?;
		self.dack.set_rollapp_packet(&rollapp_packet)?;

		match self.eibc.create_order_from_packet(&rollapp_packet, hub_height) {
			Ok(order) => {
				self.publish_packet_stored(&rollapp_packet);
				if let Some(order) = order {
					self.publish_order_created(&order, proof_height);
				}
				Ok(None)
			}
			Err(err) => {
				// A bad eibc directive must not strand the transfer: reject
				// it with an error ack so the rollapp refunds the sender.
				self.dack.db().restore(snapshot)?;
				error!(
					packet = %rollapp_packet.log_string(),
					error = %err,
					"demand order creation failed, returning error ack",
				);
				Ok(Some(error_acknowledgement(&CoreError::from(err))))
			}
		}
	}

	/// Intercepts the acknowledgement of an outbound transfer. Error acks
	/// spawn a refund demand order; the callback itself is replayed at
	/// finalization.
	pub async fn on_acknowledgement_packet(
		&self,
		packet: &TransferPacket,
		acknowledgement: &[u8],
		relayer: &str,
		proof_height: u64,
		hub_height: u64,
	) -> Result<(), CoreError> {
		// outbound: the hub side of the channel is the source
		let rollapp_id = self
			.registry
			.rollapp_id_by_channel(&packet.source_port, &packet.source_channel)?;
		let Some(rollapp_id) = rollapp_id else {
			return Ok(self
				.transfer
				.on_acknowledgement_packet(packet, acknowledgement, relayer)
				.await?);
		};
		if self.height_finalized(&rollapp_id, proof_height)? {
			return Ok(self
				.transfer
				.on_acknowledgement_packet(packet, acknowledgement, relayer)
				.await?);
		}

		let rollapp_packet = self.store_packet(
			rollapp_id,
			packet.clone(),
			PacketType::OnAck,
			proof_height,
			relayer,
			Some(acknowledgement.to_vec()),
		)?;

		// Successful acks need no marketplace: nothing is owed to anyone.
		if acknowledgement_is_error(acknowledgement) {
			if let Some(order) =
				self.eibc.create_order_from_packet(&rollapp_packet, hub_height)?
			{
				self.publish_order_created(&order, proof_height);
			}
		}
		Ok(())
	}

	/// Intercepts the timeout of an outbound transfer and spawns a refund
	/// demand order.
	pub async fn on_timeout_packet(
		&self,
		packet: &TransferPacket,
		relayer: &str,
		proof_height: u64,
		hub_height: u64,
	) -> Result<(), CoreError> {
		let rollapp_id = self
			.registry
			.rollapp_id_by_channel(&packet.source_port, &packet.source_channel)?;
		let Some(rollapp_id) = rollapp_id else {
			return Ok(self.transfer.on_timeout_packet(packet, relayer).await?);
		};
		if self.height_finalized(&rollapp_id, proof_height)? {
			return Ok(self.transfer.on_timeout_packet(packet, relayer).await?);
		}

		let rollapp_packet = self.store_packet(
			rollapp_id,
			packet.clone(),
			PacketType::OnTimeout,
			proof_height,
			relayer,
			None,
		)?;

		if let Some(order) = self.eibc.create_order_from_packet(&rollapp_packet, hub_height)? {
			self.publish_order_created(&order, proof_height);
		}
		Ok(())
	}

	/// Replays and finalizes all pending packets covered by a newly finalized
	/// state update. Returns the number of packets finalized.
	pub async fn after_state_finalized(
		&self,
		rollapp_id: &str,
		state_end_height: u64,
	) -> Result<usize, CoreError> {
		Ok(self
			.dack
			.finalize_rollapp_packets(self.transfer.as_ref(), rollapp_id, state_end_height)
			.await?)
	}

	/// Reverts all pending packets of a rolled-back rollapp, refunding
	/// outbound transfers.
	pub async fn on_rollapp_rollback(&self, rollapp_id: &str) -> Result<usize, CoreError> {
		Ok(self
			.dack
			.handle_rollapp_rollback(self.transfer.as_ref(), rollapp_id)
			.await?)
	}

	fn height_finalized(&self, rollapp_id: &str, proof_height: u64) -> Result<bool, CoreError> {
		Ok(proof_height <= self.registry.latest_finalized_height(rollapp_id)?)
	}

	fn store_packet(
		&self,
		rollapp_id: String,
		packet: TransferPacket,
		packet_type: PacketType,
		proof_height: u64,
		relayer: &str,
		acknowledgement: Option<Vec<u8>>,
	) -> Result<RollappPacket, CoreError> {
		let rollapp_packet = build_packet(
			rollapp_id,
			packet,
			packet_type,
			proof_height,
			relayer,
			acknowledgement,
		);
		self.dack.set_rollapp_packet(&rollapp_packet)?;
		self.publish_packet_stored(&rollapp_packet);
		Ok(rollapp_packet)
	}

	fn publish_packet_stored(&self, packet: &RollappPacket) {
		self.events.publish(HubEvent::Packet(PacketEvent::Stored {
			rollapp_id: packet.rollapp_id.clone(),
			packet_type: packet.packet_type,
			proof_height: packet.proof_height,
			sequence: packet.packet.sequence,
		}));
	}

	fn publish_order_created(&self, order: &hub_types::order::DemandOrder, proof_height: u64) {
		self.events.publish(HubEvent::Order(OrderEvent::Created {
			order_id: order.id.clone(),
			rollapp_id: order.rollapp_id.clone(),
			price: order.price.clone(),
			fee: order.fee.clone(),
			recipient: order.recipient.clone(),
			packet_type: order.order_type,
			proof_height,
		}));
	}
}

fn build_packet(
	rollapp_id: String,
	packet: TransferPacket,
	packet_type: PacketType,
	proof_height: u64,
	relayer: &str,
	acknowledgement: Option<Vec<u8>>,
) -> RollappPacket {
	RollappPacket {
		rollapp_id,
		packet,
		packet_type,
		status: PacketStatus::Pending,
		proof_height,
		relayer: relayer.to_string(),
		acknowledgement,
		error: None,
		original_transfer_target: None,
	}
}

/// Whether an acknowledgement is an error ack. Acks are opaque, but the
/// transfer protocol's JSON envelope marks failures with an `error` key.
pub fn acknowledgement_is_error(acknowledgement: &[u8]) -> bool {
	serde_json::from_slice::<serde_json::Value>(acknowledgement)
		.ok()
		.and_then(|value| value.as_object().map(|object| object.contains_key("error")))
		.unwrap_or(false)
}

fn error_acknowledgement(err: &CoreError) -> Acknowledgement {
	let ack = serde_json::json!({ "error": err.to_string() });
	Acknowledgement(ack.to_string().into_bytes())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn error_acks_are_detected() {
		assert!(acknowledgement_is_error(br#"{"error": "boom"}"#));
		assert!(!acknowledgement_is_error(br#"{"result": "AQ=="}"#));
		assert!(!acknowledgement_is_error(b"not json"));
	}
}
