//! Top-level wiring of the settlement layer.
//!
//! `HubService` owns the keepers, subscribes the order marketplace to the
//! packet lifecycle and exposes the command and query surface callers use.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::info;

use hub_config::{HubConfig, Params};
use hub_delayedack::{CompletionHook, DelayedAckHooks, DelayedAckKeeper, OrderLookup, PacketListFilter};
use hub_eibc::{
	EibcKeeper, EibcPacketHooks, FulfillAuthorizedRequest, FulfillOrderAuthorization,
	OrderListFilter,
};
use hub_storage::{KvBackend, StateDb};
use hub_types::coin::Coin;
use hub_types::events::{HubEvent, OrderEvent, PacketEvent};
use hub_types::order::{order_id_from_packet_key, DemandOrder};
use hub_types::packet::{packet_key, PacketStatus, RollappPacket, TransferPacket};
use hub_types::traits::{Acknowledgement, Ledger, ModuleError, RollappRegistry, TransferModule};

use crate::event_bus::EventBus;
use crate::middleware::DelayedAckMiddleware;
use crate::CoreError;

/// The assembled settlement layer.
///
/// Construction wires the circular keeper dependencies that cannot be
/// expressed at `new` time: the marketplace subscribes to packet lifecycle
/// hooks and answers order lookups during finalization.
pub struct HubService {
	params: Params,
	db: StateDb,
	dack: Arc<DelayedAckKeeper>,
	eibc: Arc<EibcKeeper>,
	transfer: Arc<dyn TransferModule>,
	registry: Arc<dyn RollappRegistry>,
	middleware: DelayedAckMiddleware,
	events: EventBus,
}

impl HubService {
	pub fn new(
		config: &HubConfig,
		backend: Arc<dyn KvBackend>,
		transfer: Arc<dyn TransferModule>,
		registry: Arc<dyn RollappRegistry>,
		ledger: Arc<dyn Ledger>,
	) -> Result<Self, CoreError> {
		let db = StateDb::new(backend);
		let events = EventBus::new(1024);

		let dack = Arc::new(DelayedAckKeeper::new(db.clone(), config.params.clone()));
		let eibc = Arc::new(EibcKeeper::new(
			db.clone(),
			dack.clone(),
			ledger,
			registry.clone(),
		));

		// Event hooks run first so they observe the order store before the
		// marketplace re-keys or deletes the mirrored order.
		let event_hooks = Arc::new(EventPublishingHooks {
			events: events.clone(),
			eibc: eibc.clone(),
		});
		let eibc_hooks = Arc::new(EibcPacketHooks::new(eibc.clone()));
		dack.set_hooks(vec![
			event_hooks as Arc<dyn DelayedAckHooks>,
			eibc_hooks.clone() as Arc<dyn DelayedAckHooks>,
		])?;
		dack.set_order_lookup(eibc_hooks as Arc<dyn OrderLookup>)?;

		let middleware = DelayedAckMiddleware::new(
			transfer.clone(),
			registry.clone(),
			dack.clone(),
			eibc.clone(),
			events.clone(),
		);

		info!(
			bridging_fee_rate = %config.params.bridging_fee_rate,
			"settlement layer wired",
		);
		Ok(Self {
			params: config.params.clone(),
			db,
			dack,
			eibc,
			transfer,
			registry,
			middleware,
			events,
		})
	}

	pub fn params(&self) -> &Params {
		&self.params
	}

	pub fn db(&self) -> &StateDb {
		&self.db
	}

	/// Registers the named completion hooks orders may reference in their
	/// memo. Unknown names are rejected at order creation.
	pub fn register_completion_hooks(
		&self,
		hooks: HashMap<String, Arc<dyn CompletionHook>>,
	) -> Result<(), CoreError> {
		Ok(self.dack.register_completion_hooks(hooks)?)
	}

	/// Subscribes to packet and order lifecycle events.
	pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<HubEvent> {
		self.events.subscribe()
	}

	// --- packet entry points -------------------------------------------------

	pub async fn on_recv_packet(
		&self,
		packet: &TransferPacket,
		relayer: &str,
		proof_height: u64,
		hub_height: u64,
	) -> Result<Option<Acknowledgement>, CoreError> {
		self.middleware
			.on_recv_packet(packet, relayer, proof_height, hub_height)
			.await
	}

	pub async fn on_acknowledgement_packet(
		&self,
		packet: &TransferPacket,
		acknowledgement: &[u8],
		relayer: &str,
		proof_height: u64,
		hub_height: u64,
	) -> Result<(), CoreError> {
		self.middleware
			.on_acknowledgement_packet(packet, acknowledgement, relayer, proof_height, hub_height)
			.await
	}

	pub async fn on_timeout_packet(
		&self,
		packet: &TransferPacket,
		relayer: &str,
		proof_height: u64,
		hub_height: u64,
	) -> Result<(), CoreError> {
		self.middleware
			.on_timeout_packet(packet, relayer, proof_height, hub_height)
			.await
	}

	// --- finalization --------------------------------------------------------

	/// Replays all pending packets of the rollapp proven at or below the end
	/// height of a newly finalized state update.
	pub async fn after_state_finalized(
		&self,
		rollapp_id: &str,
		state_end_height: u64,
	) -> Result<usize, CoreError> {
		self.middleware
			.after_state_finalized(rollapp_id, state_end_height)
			.await
	}

	/// Finalizes a single pending packet by key, gated on the rollapp's
	/// latest finalized height.
	pub async fn finalize_packet_by_key(&self, packet_key: &[u8]) -> Result<RollappPacket, CoreError> {
		let packet = self.dack.get_rollapp_packet(packet_key)?;
		let finalized_height = self.registry.latest_finalized_height(&packet.rollapp_id)?;
		Ok(self
			.dack
			.finalize_packet_by_key(self.transfer.as_ref(), packet_key, finalized_height)
			.await?)
	}

	/// Reverts all pending packets of a rolled-back rollapp.
	pub async fn on_rollapp_rollback(&self, rollapp_id: &str) -> Result<usize, CoreError> {
		self.middleware.on_rollapp_rollback(rollapp_id).await
	}

	/// Garbage-collects finalized and reverted packets, with their mirrored
	/// orders following through the deletion hooks.
	pub fn delete_terminal_packets(&self) -> Result<usize, CoreError> {
		Ok(self.dack.delete_terminal_packets()?)
	}

	// --- marketplace commands ------------------------------------------------

	pub async fn fulfill_order(
		&self,
		fulfiller: &str,
		order_id: &str,
		expected_fee: u128,
	) -> Result<DemandOrder, CoreError> {
		let order = self.eibc.fulfill_order(fulfiller, order_id, expected_fee).await?;
		self.events.publish(HubEvent::Order(OrderEvent::Fulfilled {
			order_id: order.id.clone(),
			price: order.price.clone(),
			fee: order.fee.clone(),
			fulfiller: fulfiller.to_string(),
		}));
		Ok(order)
	}

	pub async fn fulfill_order_authorized(
		&self,
		request: &FulfillAuthorizedRequest,
	) -> Result<DemandOrder, CoreError> {
		let (order, operator_fee) = self.eibc.fulfill_order_authorized(request).await?;
		self.events
			.publish(HubEvent::Order(OrderEvent::FulfilledAuthorized {
				order_id: order.id.clone(),
				price: order.price.clone(),
				fee: order.fee.clone(),
				lp_address: request.lp_address.clone(),
				operator_address: request.operator_address.clone(),
				operator_fee: Coin::new(order.denom(), operator_fee),
			}));
		Ok(order)
	}

	/// Lowers (or raises) the fee of an outstanding order. Recipient only.
	pub fn update_demand_order(
		&self,
		signer: &str,
		order_id: &str,
		new_fee: u128,
	) -> Result<DemandOrder, CoreError> {
		let order = self.eibc.update_demand_order(signer, order_id, new_fee)?;
		self.events.publish(HubEvent::Order(OrderEvent::FeeUpdated {
			order_id: order.id.clone(),
			new_fee: order.fee.clone(),
			new_price: order.price.clone(),
		}));
		Ok(order)
	}

	pub fn set_grant(
		&self,
		granter: &str,
		grantee: &str,
		authorization: &FulfillOrderAuthorization,
	) -> Result<(), CoreError> {
		Ok(self.eibc.set_grant(granter, grantee, authorization)?)
	}

	pub fn get_grant(
		&self,
		granter: &str,
		grantee: &str,
	) -> Result<Option<FulfillOrderAuthorization>, CoreError> {
		Ok(self.eibc.get_grant(granter, grantee)?)
	}

	pub fn revoke_grant(&self, granter: &str, grantee: &str) -> Result<(), CoreError> {
		Ok(self.eibc.revoke_grant(granter, grantee)?)
	}

	// --- queries -------------------------------------------------------------

	pub fn get_rollapp_packet(&self, packet_key: &[u8]) -> Result<RollappPacket, CoreError> {
		Ok(self.dack.get_rollapp_packet(packet_key)?)
	}

	pub fn list_rollapp_packets(
		&self,
		filter: &PacketListFilter,
	) -> Result<Vec<RollappPacket>, CoreError> {
		Ok(self.dack.list_rollapp_packets(filter)?)
	}

	pub fn pending_packets_by_receiver(
		&self,
		receiver: &str,
	) -> Result<Vec<RollappPacket>, CoreError> {
		Ok(self.dack.pending_packets_by_receiver(receiver)?)
	}

	pub fn get_demand_order_by_id(&self, order_id: &str) -> Result<DemandOrder, CoreError> {
		Ok(self.eibc.get_demand_order_by_id(order_id)?)
	}

	pub fn list_demand_orders(
		&self,
		status: PacketStatus,
		filter: &OrderListFilter,
	) -> Result<Vec<DemandOrder>, CoreError> {
		Ok(self.eibc.list_demand_orders(status, filter)?)
	}
}

/// Publishes packet lifecycle changes onto the event bus.
///
/// Registered ahead of the marketplace hooks so the mirrored order can still
/// be observed under its pre-transition key.
struct EventPublishingHooks {
	events: EventBus,
	eibc: Arc<EibcKeeper>,
}

impl EventPublishingHooks {
	fn tracked_order(&self, order_id: &str) -> Result<Option<DemandOrder>, ModuleError> {
		match self.eibc.get_demand_order_by_id(order_id) {
			Ok(order) => Ok(Some(order)),
			Err(hub_eibc::EibcError::OrderNotFound) => Ok(None),
			Err(e) => Err(ModuleError::new(e.to_string())),
		}
	}
}

impl DelayedAckHooks for EventPublishingHooks {
	fn after_packet_status_updated(
		&self,
		packet: &RollappPacket,
		old_packet_key: &[u8],
		_new_packet_key: &[u8],
	) -> Result<(), ModuleError> {
		self.events.publish(HubEvent::Packet(PacketEvent::StatusUpdated {
			rollapp_id: packet.rollapp_id.clone(),
			old_status: PacketStatus::Pending,
			new_status: packet.status,
			sequence: packet.packet.sequence,
			error: packet.error.clone(),
		}));
		// The transition always starts from pending, so the old key is the
		// one the order id was derived from.
		let order_id = order_id_from_packet_key(old_packet_key);
		if let Some(order) = self.tracked_order(&order_id)? {
			self.events
				.publish(HubEvent::Order(OrderEvent::PacketStatusUpdated {
					order_id,
					new_packet_status: packet.status,
					is_fulfilled: order.is_fulfilled(),
				}));
		}
		Ok(())
	}

	fn after_packet_deleted(&self, packet: &RollappPacket) -> Result<(), ModuleError> {
		self.events.publish(HubEvent::Packet(PacketEvent::Deleted {
			rollapp_id: packet.rollapp_id.clone(),
			sequence: packet.packet.sequence,
		}));
		let pending_key = packet_key(
			PacketStatus::Pending,
			&packet.rollapp_id,
			packet.proof_height,
			&packet.packet.source_channel,
			packet.packet.sequence,
		);
		let order_id = order_id_from_packet_key(&pending_key);
		if self.tracked_order(&order_id)?.is_some() {
			self.events
				.publish(HubEvent::Order(OrderEvent::Deleted { order_id }));
		}
		Ok(())
	}
}
