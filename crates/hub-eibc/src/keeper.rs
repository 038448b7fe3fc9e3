//! The eIBC keeper: demand order store, order creation and fulfillment.

use std::sync::Arc;

use rust_decimal::Decimal;
use tracing::{debug, info};

use hub_delayedack::DelayedAckKeeper;
use hub_storage::{Namespace, StateDb};
use hub_types::coin::{mul_rate, parse_amount, price_with_bridging_fee, Coin};
use hub_types::memo::{parse_packet_metadata, EibcMetadata, MemoError};
use hub_types::order::{order_id_from_packet_key, order_key, DemandOrder};
use hub_types::packet::{packet_key, PacketStatus, PacketType, RollappPacket, TransferPacketData};
use hub_types::traits::{Ledger, RollappRegistry};

use crate::authorization::{
	operator_fee_amount, AuthorizedFulfillment, FulfillOrderAuthorization,
};
use crate::denom;
use crate::EibcError;

/// Filters applied when listing orders of one status.
#[derive(Debug, Clone, Default)]
pub struct OrderListFilter {
	pub rollapp_id: Option<String>,
	pub order_type: Option<PacketType>,
	pub fulfilled: Option<bool>,
	/// Zero means unlimited.
	pub limit: usize,
}

impl OrderListFilter {
	fn matches(&self, order: &DemandOrder) -> bool {
		if let Some(rollapp_id) = &self.rollapp_id {
			if order.rollapp_id != *rollapp_id {
				return false;
			}
		}
		if let Some(order_type) = self.order_type {
			if order.order_type != order_type {
				return false;
			}
		}
		if let Some(fulfilled) = self.fulfilled {
			if order.is_fulfilled() != fulfilled {
				return false;
			}
		}
		true
	}
}

/// A delegated fulfillment request, executed by an operator against an LP's
/// standing grant.
#[derive(Debug, Clone)]
pub struct FulfillAuthorizedRequest {
	pub order_id: String,
	pub lp_address: String,
	pub operator_address: String,
	pub rollapp_id: String,
	pub price: Coin,
	pub expected_fee: u128,
	pub operator_fee_share: Decimal,
	pub settlement_validated: bool,
}

pub struct EibcKeeper {
	db: StateDb,
	dack: Arc<DelayedAckKeeper>,
	ledger: Arc<dyn Ledger>,
	registry: Arc<dyn RollappRegistry>,
}

impl EibcKeeper {
	pub fn new(
		db: StateDb,
		dack: Arc<DelayedAckKeeper>,
		ledger: Arc<dyn Ledger>,
		registry: Arc<dyn RollappRegistry>,
	) -> Self {
		Self {
			db,
			dack,
			ledger,
			registry,
		}
	}

	// --- order store ---

	pub fn set_demand_order(&self, order: &DemandOrder) -> Result<(), EibcError> {
		order.validate_basic()?;
		self.db.set_typed(Namespace::Orders, &order.key(), order)?;
		debug!(order_id = %order.id, status = %order.tracking_packet_status, "saved demand order");
		Ok(())
	}

	pub fn get_demand_order(
		&self,
		status: PacketStatus,
		order_id: &str,
	) -> Result<Option<DemandOrder>, EibcError> {
		Ok(self.db.get_typed(Namespace::Orders, &order_key(status, order_id))?)
	}

	pub fn get_demand_order_by_id(&self, order_id: &str) -> Result<DemandOrder, EibcError> {
		for status in PacketStatus::all() {
			if let Some(order) = self.get_demand_order(status, order_id)? {
				return Ok(order);
			}
		}
		Err(EibcError::OrderNotFound)
	}

	/// An order that still exists, is unfulfilled and tracks a pending packet.
	pub fn get_outstanding_order(&self, order_id: &str) -> Result<DemandOrder, EibcError> {
		let order = self
			.get_demand_order(PacketStatus::Pending, order_id)?
			.ok_or(EibcError::OrderNotFound)?;
		order.validate_outstanding()?;
		Ok(order)
	}

	pub fn list_demand_orders(
		&self,
		status: PacketStatus,
		filter: &OrderListFilter,
	) -> Result<Vec<DemandOrder>, EibcError> {
		let mut prefix = status.key_prefix().to_vec();
		prefix.push(b'/');
		let with_limit = filter.limit > 0;
		let mut list = Vec::new();
		for (_, value) in self.db.scan(Namespace::Orders, &prefix)? {
			let order: DemandOrder = hub_storage::from_bytes(&value)?;
			if !filter.matches(&order) {
				continue;
			}
			list.push(order);
			if with_limit && list.len() == filter.limit {
				break;
			}
		}
		Ok(list)
	}

	/// The pending order tracking the given packet, if any.
	pub fn pending_order_by_packet(
		&self,
		packet: &RollappPacket,
	) -> Result<Option<DemandOrder>, EibcError> {
		self.get_demand_order(PacketStatus::Pending, &order_id_for_packet(packet))
	}

	/// Re-keys the order of a transitioned packet so its status always mirrors
	/// the tracking packet's.
	pub fn on_packet_status_updated(
		&self,
		packet: &RollappPacket,
		old_packet_key: &[u8],
		new_packet_key: &[u8],
	) -> Result<(), EibcError> {
		let order_id = order_id_from_packet_key(old_packet_key);
		// packets only ever transition out of Pending
		let Some(mut order) = self.get_demand_order(PacketStatus::Pending, &order_id)? else {
			return Ok(());
		};
		self.db.delete(Namespace::Orders, &order.key())?;
		order.tracking_packet_key = new_packet_key.to_vec();
		order.tracking_packet_status = packet.status;
		self.db.set_typed(Namespace::Orders, &order.key(), &order)?;
		debug!(order_id = %order.id, status = %packet.status, "demand order followed packet status");
		Ok(())
	}

	/// Drops the order of a garbage-collected packet.
	pub fn on_packet_deleted(&self, packet: &RollappPacket) -> Result<(), EibcError> {
		let order_id = order_id_for_packet(packet);
		if let Some(order) = self.get_demand_order(packet.status, &order_id)? {
			self.db.delete(Namespace::Orders, &order.key())?;
			debug!(order_id = %order.id, "deleted demand order of deleted packet");
		}
		Ok(())
	}

	// --- order creation ---

	/// Creates the demand order for a just-stored rollapp packet, if the
	/// packet calls for one. Inbound transfers are priced by their memo
	/// directive, defaulting to a zero fee without one; failed or timed-out
	/// outbound transfers get an order priced by params.
	/// Creation is deterministic in the packet, so re-processing a packet
	/// rewrites the same order rather than duplicating it.
	pub fn create_order_from_packet(
		&self,
		packet: &RollappPacket,
		creation_height: u64,
	) -> Result<Option<DemandOrder>, EibcError> {
		let data = packet.transfer_data()?;
		data.validate_basic()?;
		// eIBC must not become a way to pay blocked addresses early.
		if self.ledger.is_blocked(&data.receiver) {
			return Err(EibcError::BlockedAddress(data.receiver));
		}

		let order = match packet.packet_type {
			PacketType::OnRecv => self.create_order_on_recv(packet, &data, creation_height)?,
			PacketType::OnAck | PacketType::OnTimeout => {
				self.create_order_on_err_ack_or_timeout(packet, &data, creation_height)?
			}
		};
		let Some(order) = order else { return Ok(None) };
		order.validate_basic()?;
		self.set_demand_order(&order)?;
		Ok(Some(order))
	}

	/// Price of an inbound order: amount - fee - bridging fee.
	fn create_order_on_recv(
		&self,
		packet: &RollappPacket,
		data: &TransferPacketData,
		creation_height: u64,
	) -> Result<Option<DemandOrder>, EibcError> {
		let metadata = match parse_packet_metadata(&data.memo) {
			Ok(metadata) => metadata.eibc,
			// A plain transfer still gets an order, it just offers no fee.
			// The recipient can raise the fee later to attract a fulfiller.
			Err(MemoError::Unmarshal) | Err(MemoError::EibcEmpty) => {
				debug!("no eibc memo provided, defaulting to zero fee");
				EibcMetadata::zero_fee()
			}
			Err(err) => return Err(err.into()),
		};
		if let Some(hook) = &metadata.completion_hook {
			self.dack.validate_completion_hook(hook)?;
		}

		let amount = parse_amount(&data.amount)?;
		let fee = metadata.fee_amount()?;
		let price =
			price_with_bridging_fee(amount, fee, self.dack.params().bridging_fee_rate)?;

		let order_denom = denom::transfer_denom_on_recv(&packet.packet, data);
		let mut order = DemandOrder::new(
			packet,
			price,
			fee,
			order_denom,
			&data.receiver,
			creation_height,
		);
		order.completion_hook = metadata.completion_hook;
		Ok(Some(order))
	}

	/// Price of a refund order: amount - multiplier * amount. Skipped when the
	/// multiplier yields no fee, since nobody would fulfill for free.
	fn create_order_on_err_ack_or_timeout(
		&self,
		packet: &RollappPacket,
		data: &TransferPacketData,
		creation_height: u64,
	) -> Result<Option<DemandOrder>, EibcError> {
		let amount = parse_amount(&data.amount)?;
		let multiplier = match packet.packet_type {
			PacketType::OnTimeout => self.dack.params().timeout_fee_multiplier,
			PacketType::OnAck => self.dack.params().errack_fee_multiplier,
			PacketType::OnRecv => return Ok(None),
		};
		let fee = mul_rate(amount, multiplier);
		if fee == 0 {
			debug!(packet = %packet.log_string(), "fee is not positive, skipping demand order creation");
			return Ok(None);
		}
		let price = amount - fee;

		let order_denom = denom::ibc_denom(&data.denom);
		// refund goes to whoever tried to send
		Ok(Some(DemandOrder::new(
			packet,
			price,
			fee,
			order_denom,
			&data.sender,
			creation_height,
		)))
	}

	// --- fulfillment ---

	/// Fulfills an outstanding order: the fulfiller pays the price to the
	/// recipient now and becomes the packet's transfer target, collecting
	/// price + fee at finalization. All-or-nothing.
	pub async fn fulfill_order(
		&self,
		fulfiller: &str,
		order_id: &str,
		expected_fee: u128,
	) -> Result<DemandOrder, EibcError> {
		let snapshot = self.db.snapshot()?;
		match self.fulfill_order_inner(fulfiller, order_id, expected_fee).await {
			Ok(order) => Ok(order),
			Err(err) => {
				self.db.restore(snapshot)?;
				Err(err)
			}
		}
	}

	async fn fulfill_order_inner(
		&self,
		fulfiller: &str,
		order_id: &str,
		expected_fee: u128,
	) -> Result<DemandOrder, EibcError> {
		let order = self.get_outstanding_order(order_id)?;
		// guards against order updates racing the fulfillment
		if order.fee.amount != expected_fee {
			return Err(EibcError::ExpectedFeeNotMet);
		}
		if self.ledger.is_blocked(fulfiller) {
			return Err(EibcError::BlockedAddress(fulfiller.to_string()));
		}
		self.ledger
			.send_coins(fulfiller, &order.recipient, &[order.price.clone()])
			.await?;
		self.finish_fulfillment(order, fulfiller).await
	}

	/// Fulfills an order with an LP's funds under a standing authorization.
	/// Returns the fulfilled order and the operator's fee cut.
	pub async fn fulfill_order_authorized(
		&self,
		request: &FulfillAuthorizedRequest,
	) -> Result<(DemandOrder, u128), EibcError> {
		let snapshot = self.db.snapshot()?;
		match self.fulfill_order_authorized_inner(request).await {
			Ok(result) => Ok(result),
			Err(err) => {
				self.db.restore(snapshot)?;
				Err(err)
			}
		}
	}

	async fn fulfill_order_authorized_inner(
		&self,
		request: &FulfillAuthorizedRequest,
	) -> Result<(DemandOrder, u128), EibcError> {
		let order = self.get_outstanding_order(&request.order_id)?;

		// The request restates the order terms; any drift since the operator
		// quoted them voids the fulfillment.
		if order.rollapp_id != request.rollapp_id {
			return Err(EibcError::RollappIdMismatch);
		}
		if order.price != request.price {
			return Err(EibcError::PriceMismatch);
		}
		if order.fee.amount != request.expected_fee {
			return Err(EibcError::ExpectedFeeNotMet);
		}
		if request.settlement_validated && !self.settlement_validated(&order)? {
			return Err(EibcError::OrderNotSettlementValidated);
		}

		let grant = self
			.get_grant(&request.lp_address, &request.operator_address)?
			.ok_or(EibcError::GrantNotFound)?;
		let response = grant.accept(&AuthorizedFulfillment {
			rollapp_id: request.rollapp_id.clone(),
			price: request.price.clone(),
			expected_fee: request.expected_fee,
			operator_fee_share: request.operator_fee_share,
			settlement_validated: request.settlement_validated,
		})?;
		if response.delete {
			self.delete_grant(&request.lp_address, &request.operator_address)?;
		} else if let Some(updated) = response.updated {
			self.store_grant(&request.lp_address, &request.operator_address, &updated)?;
		}

		self.ledger
			.send_coins(&request.lp_address, &order.recipient, &[order.price.clone()])
			.await?;
		let operator_fee = operator_fee_amount(order.fee.amount, request.operator_fee_share);
		if operator_fee > 0 {
			let fee_coin = Coin::new(order.denom(), operator_fee);
			self.ledger
				.send_coins(&request.lp_address, &request.operator_address, &[fee_coin])
				.await?;
		}

		let order = self.finish_fulfillment(order, &request.lp_address).await?;
		Ok((order, operator_fee))
	}

	/// Marks the order fulfilled and redirects the packet's transfer target to
	/// the fulfiller so finalization pays them back.
	async fn finish_fulfillment(
		&self,
		mut order: DemandOrder,
		fulfiller: &str,
	) -> Result<DemandOrder, EibcError> {
		self.dack
			.update_rollapp_packet_transfer_address(&order.tracking_packet_key, fulfiller)?;
		order.fulfiller_address = Some(fulfiller.to_string());
		self.set_demand_order(&order)?;

		// With immediate funds available the hook runs now; finalization will
		// see the order fulfilled and skip it.
		if order.completion_hook.is_some() {
			self.dack
				.run_order_completion_hook(&order, order.price.amount)
				.await?;
		}

		info!(order_id = %order.id, fulfiller, "demand order fulfilled");
		Ok(order)
	}

	/// Whether the order's packet height is covered by a posted state update.
	/// The update need not be finalized yet.
	fn settlement_validated(&self, order: &DemandOrder) -> Result<bool, EibcError> {
		let packet = self.dack.get_rollapp_packet(&order.tracking_packet_key)?;
		let latest_height = self.registry.latest_height(&order.rollapp_id)?;
		Ok(packet.proof_height <= latest_height)
	}

	// --- order updates ---

	/// Lets the recipient sweeten or reduce the fee of their outstanding
	/// order. The price is recomputed from the transfer amount; refund orders
	/// carry no bridging fee.
	pub fn update_demand_order(
		&self,
		signer: &str,
		order_id: &str,
		new_fee: u128,
	) -> Result<DemandOrder, EibcError> {
		let mut order = self.get_outstanding_order(order_id)?;
		if order.recipient != signer {
			return Err(EibcError::NotOrderRecipient);
		}

		let packet = self.dack.get_rollapp_packet(&order.tracking_packet_key)?;
		let data = packet.transfer_data()?;
		let amount = parse_amount(&data.amount)?;
		let bridging_fee_rate = if packet.packet_type == PacketType::OnRecv {
			self.dack.params().bridging_fee_rate
		} else {
			Decimal::ZERO
		};
		let new_price = price_with_bridging_fee(amount, new_fee, bridging_fee_rate)?;

		let order_denom = order.denom().to_string();
		order.fee = Coin::new(order_denom.clone(), new_fee);
		order.price = Coin::new(order_denom, new_price);
		self.set_demand_order(&order)?;
		Ok(order)
	}

	// --- fulfillment grants ---

	pub fn set_grant(
		&self,
		granter: &str,
		grantee: &str,
		authorization: &FulfillOrderAuthorization,
	) -> Result<(), EibcError> {
		authorization.validate_basic()?;
		self.store_grant(granter, grantee, authorization)
	}

	fn store_grant(
		&self,
		granter: &str,
		grantee: &str,
		authorization: &FulfillOrderAuthorization,
	) -> Result<(), EibcError> {
		self.db
			.set_typed(Namespace::Grants, &grant_key(granter, grantee), authorization)?;
		Ok(())
	}

	pub fn get_grant(
		&self,
		granter: &str,
		grantee: &str,
	) -> Result<Option<FulfillOrderAuthorization>, EibcError> {
		Ok(self.db.get_typed(Namespace::Grants, &grant_key(granter, grantee))?)
	}

	pub fn revoke_grant(&self, granter: &str, grantee: &str) -> Result<(), EibcError> {
		self.get_grant(granter, grantee)?.ok_or(EibcError::GrantNotFound)?;
		self.delete_grant(granter, grantee)
	}

	fn delete_grant(&self, granter: &str, grantee: &str) -> Result<(), EibcError> {
		self.db.delete(Namespace::Grants, &grant_key(granter, grantee))?;
		Ok(())
	}
}

/// The id of the order tracking this packet. Ids are derived from the
/// pending-status key, which stays reconstructible after the packet
/// transitions.
fn order_id_for_packet(packet: &RollappPacket) -> String {
	let pending_key = packet_key(
		PacketStatus::Pending,
		&packet.rollapp_id,
		packet.proof_height,
		&packet.packet.source_channel,
		packet.packet.sequence,
	);
	order_id_from_packet_key(&pending_key)
}

fn grant_key(granter: &str, grantee: &str) -> Vec<u8> {
	let mut key = Vec::with_capacity(granter.len() + 1 + grantee.len());
	key.extend_from_slice(granter.as_bytes());
	key.push(b'/');
	key.extend_from_slice(grantee.as_bytes());
	key
}
