//! The delayed-ack keeper: packet store, status transitions, finalization and
//! rollback handling.

use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard};

use tracing::{debug, error, warn};

use hub_config::Params;
use hub_storage::{Namespace, StateDb};
use hub_types::coin::mul_rate;
use hub_types::packet::{PacketStatus, PacketType, RollappPacket};
use hub_types::traits::TransferModule;

use crate::completion::CompletionHook;
use crate::filters::PacketListFilter;
use crate::hooks::{DelayedAckHooks, OrderLookup};
use crate::DelayedAckError;

/// Holds rollapp packets until their proof height is finalized and replays
/// the intercepted transfer callbacks at that point.
///
/// Hook subscribers, the order lookup and completion hooks are injected after
/// construction, once the collaborating keepers exist.
pub struct DelayedAckKeeper {
	db: StateDb,
	params: Params,
	hooks: RwLock<Vec<Arc<dyn DelayedAckHooks>>>,
	order_lookup: RwLock<Option<Arc<dyn OrderLookup>>>,
	completion_hooks: RwLock<HashMap<String, Arc<dyn CompletionHook>>>,
}

impl DelayedAckKeeper {
	pub fn new(db: StateDb, params: Params) -> Self {
		Self {
			db,
			params,
			hooks: RwLock::new(Vec::new()),
			order_lookup: RwLock::new(None),
			completion_hooks: RwLock::new(HashMap::new()),
		}
	}

	pub fn params(&self) -> &Params {
		&self.params
	}

	pub fn db(&self) -> &StateDb {
		&self.db
	}

	pub fn set_hooks(&self, hooks: Vec<Arc<dyn DelayedAckHooks>>) -> Result<(), DelayedAckError> {
		*self.hooks.write().map_err(lock_err)? = hooks;
		Ok(())
	}

	pub fn set_order_lookup(&self, lookup: Arc<dyn OrderLookup>) -> Result<(), DelayedAckError> {
		*self.order_lookup.write().map_err(lock_err)? = Some(lookup);
		Ok(())
	}

	pub fn register_completion_hooks(
		&self,
		hooks: HashMap<String, Arc<dyn CompletionHook>>,
	) -> Result<(), DelayedAckError> {
		self.completion_hooks.write().map_err(lock_err)?.extend(hooks);
		Ok(())
	}

	pub(crate) fn completion_hooks(
		&self,
	) -> Result<RwLockReadGuard<'_, HashMap<String, Arc<dyn CompletionHook>>>, DelayedAckError> {
		self.completion_hooks.read().map_err(lock_err)
	}

	fn subscribers(&self) -> Result<Vec<Arc<dyn DelayedAckHooks>>, DelayedAckError> {
		Ok(self.hooks.read().map_err(lock_err)?.clone())
	}

	fn lookup(&self) -> Result<Option<Arc<dyn OrderLookup>>, DelayedAckError> {
		Ok(self.order_lookup.read().map_err(lock_err)?.clone())
	}

	// --- packet store ---

	/// Stores a rollapp packet under its status-scoped key and, while pending,
	/// indexes it by transfer receiver.
	pub fn set_rollapp_packet(&self, packet: &RollappPacket) -> Result<(), DelayedAckError> {
		packet.validate_basic()?;
		self.db.set_typed(Namespace::Packets, &packet.key(), packet)?;
		if packet.status == PacketStatus::Pending {
			let receiver = packet.transfer_data()?.receiver;
			self.set_pending_by_receiver(&receiver, &packet.key())?;
		}
		debug!(packet = %packet.log_string(), "saved rollapp packet");
		Ok(())
	}

	pub fn get_rollapp_packet(&self, packet_key: &[u8]) -> Result<RollappPacket, DelayedAckError> {
		self.db
			.get_typed(Namespace::Packets, packet_key)?
			.ok_or(DelayedAckError::PacketNotFound)
	}

	pub fn get_all_rollapp_packets(&self) -> Result<Vec<RollappPacket>, DelayedAckError> {
		Ok(self.db.scan_typed(Namespace::Packets, &[])?)
	}

	/// Lists packets matching the filter, in ascending key order per prefix.
	pub fn list_rollapp_packets(
		&self,
		filter: &PacketListFilter,
	) -> Result<Vec<RollappPacket>, DelayedAckError> {
		let with_limit = filter.limit > 0;
		let mut list = Vec::new();
		'outer: for range in &filter.prefixes {
			for (key, value) in self.db.scan(Namespace::Packets, &range.start)? {
				if let Some(end) = &range.end {
					if key >= *end {
						break;
					}
				}
				let packet: RollappPacket = hub_storage::from_bytes(&value)?;
				if !filter.matches(&packet) {
					continue;
				}
				list.push(packet);
				if with_limit && list.len() == filter.limit {
					break 'outer;
				}
			}
		}
		Ok(list)
	}

	/// Pending packets addressed to the given transfer receiver.
	pub fn pending_packets_by_receiver(
		&self,
		receiver: &str,
	) -> Result<Vec<RollappPacket>, DelayedAckError> {
		let mut packets = Vec::new();
		for (_, packet_key) in self.db.scan(Namespace::PendingByReceiver, &receiver_prefix(receiver))? {
			packets.push(self.get_rollapp_packet(&packet_key)?);
		}
		Ok(packets)
	}

	/// Rewrites the transfer target of a pending packet, remembering the
	/// original so the acknowledgement can later be restored to match the
	/// proof. For inbound packets the receiver is replaced, for outbound ones
	/// the sender.
	pub fn update_rollapp_packet_transfer_address(
		&self,
		packet_key: &[u8],
		address: &str,
	) -> Result<(), DelayedAckError> {
		let mut packet = self.get_rollapp_packet(packet_key)?;
		if packet.status != PacketStatus::Pending {
			return Err(DelayedAckError::CanOnlyUpdatePendingPacket);
		}
		let mut data = packet.transfer_data()?;
		let old_receiver = data.receiver.clone();
		let original_target = match packet.packet_type {
			PacketType::OnRecv => {
				let original = data.receiver.clone();
				data.receiver = address.to_string();
				original
			}
			PacketType::OnAck | PacketType::OnTimeout => {
				let original = data.sender.clone();
				data.sender = address.to_string();
				original
			}
		};
		self.delete_pending_by_receiver(&old_receiver, packet_key)?;
		packet.packet.data = data.to_bytes();
		packet.original_transfer_target = Some(original_target);
		// re-indexed under the (possibly new) receiver
		self.set_rollapp_packet(&packet)
	}

	/// Re-keys a packet under a new status and notifies subscribers.
	///
	/// The only legal transitions are Pending -> Finalized and
	/// Pending -> Reverted; this is the single place packet status changes,
	/// since the status is part of the key.
	pub fn update_rollapp_packet_with_status(
		&self,
		mut packet: RollappPacket,
		new_status: PacketStatus,
	) -> Result<RollappPacket, DelayedAckError> {
		if packet.status != PacketStatus::Pending || !new_status.is_terminal() {
			return Err(DelayedAckError::InvalidTransition {
				from: packet.status,
				to: new_status,
			});
		}
		let old_key = packet.key();
		// deleting a missing key is a silent no-op, so check first
		self.get_rollapp_packet(&old_key)?;
		let receiver = packet.transfer_data()?.receiver;
		self.delete_pending_by_receiver(&receiver, &old_key)?;
		self.db.delete(Namespace::Packets, &old_key)?;

		packet.status = new_status;
		self.set_rollapp_packet(&packet)?;
		let new_key = packet.key();

		for subscriber in self.subscribers()? {
			subscriber.after_packet_status_updated(&packet, &old_key, &new_key)?;
		}
		Ok(packet)
	}

	fn delete_rollapp_packet(&self, packet: &RollappPacket) -> Result<(), DelayedAckError> {
		self.db.delete(Namespace::Packets, &packet.key())?;
		if packet.status == PacketStatus::Pending {
			let receiver = packet.transfer_data()?.receiver;
			self.delete_pending_by_receiver(&receiver, &packet.key())?;
		}
		for subscriber in self.subscribers()? {
			subscriber.after_packet_deleted(packet)?;
		}
		Ok(())
	}

	/// Garbage-collects finalized and reverted packets. Returns the number of
	/// packets deleted.
	pub fn delete_terminal_packets(&self) -> Result<usize, DelayedAckError> {
		let filter =
			PacketListFilter::by_status(&[PacketStatus::Finalized, PacketStatus::Reverted]);
		let packets = self.list_rollapp_packets(&filter)?;
		for packet in &packets {
			self.delete_rollapp_packet(packet)?;
		}
		Ok(packets.len())
	}

	// --- receiver index ---

	fn set_pending_by_receiver(
		&self,
		receiver: &str,
		packet_key: &[u8],
	) -> Result<(), DelayedAckError> {
		let mut key = receiver_prefix(receiver);
		key.extend_from_slice(packet_key);
		self.db
			.set_raw(Namespace::PendingByReceiver, &key, packet_key.to_vec())?;
		Ok(())
	}

	fn delete_pending_by_receiver(
		&self,
		receiver: &str,
		packet_key: &[u8],
	) -> Result<(), DelayedAckError> {
		let mut key = receiver_prefix(receiver);
		key.extend_from_slice(packet_key);
		self.db.delete(Namespace::PendingByReceiver, &key)?;
		Ok(())
	}

	// --- finalization ---

	/// Replays and finalizes all pending packets of the rollapp with proof
	/// height up to `state_end_height`, in ascending height order. Returns the
	/// number of packets finalized.
	pub async fn finalize_rollapp_packets(
		&self,
		transfer: &dyn TransferModule,
		rollapp_id: &str,
		state_end_height: u64,
	) -> Result<usize, DelayedAckError> {
		let filter =
			PacketListFilter::pending_by_rollapp_by_max_height(rollapp_id, state_end_height);
		let pending = self.list_rollapp_packets(&filter)?;
		if pending.is_empty() {
			return Ok(0);
		}
		debug!(
			rollapp_id,
			state_end_height,
			num_packets = pending.len(),
			"finalizing rollapp packets",
		);
		let count = pending.len();
		for packet in pending {
			self.finalize_rollapp_packet(transfer, packet).await?;
		}
		Ok(count)
	}

	/// Finalizes one pending packet by key, provided its proof height is
	/// covered by the rollapp's latest finalized state.
	pub async fn finalize_packet_by_key(
		&self,
		transfer: &dyn TransferModule,
		packet_key: &[u8],
		finalized_height: u64,
	) -> Result<RollappPacket, DelayedAckError> {
		let packet = self.get_rollapp_packet(packet_key)?;
		if packet.status != PacketStatus::Pending {
			return Err(DelayedAckError::CanOnlyUpdatePendingPacket);
		}
		if packet.proof_height > finalized_height {
			return Err(DelayedAckError::HeightNotFinalized {
				proof_height: packet.proof_height,
				finalized_height,
			});
		}
		self.finalize_rollapp_packet(transfer, packet).await
	}

	/// Replays the intercepted callback and moves the packet to Finalized.
	///
	/// A failing callback does not block finalization: its side effects are
	/// rolled back, the error is recorded on the packet and the status is
	/// committed regardless. Failing to commit the status is the only abort.
	async fn finalize_rollapp_packet(
		&self,
		transfer: &dyn TransferModule,
		mut packet: RollappPacket,
	) -> Result<RollappPacket, DelayedAckError> {
		debug!(packet = %packet.log_string(), "finalizing rollapp packet");
		let result = match packet.packet_type {
			PacketType::OnRecv => self.replay_on_recv(transfer, &packet).await,
			PacketType::OnAck => self.replay_on_ack(transfer, &packet).await,
			PacketType::OnTimeout => self.replay_on_timeout(transfer, &packet).await,
		};
		if let Err(err) = result {
			warn!(
				packet = %packet.log_string(),
				error = %err,
				"packet callback failed, rolled back",
			);
			packet.error = Some(err.to_string());
		}
		self.update_rollapp_packet_with_status(packet, PacketStatus::Finalized)
	}

	async fn replay_on_recv(
		&self,
		transfer: &dyn TransferModule,
		packet: &RollappPacket,
	) -> Result<(), DelayedAckError> {
		let ack = transfer.on_recv_packet(&packet.packet, &packet.relayer).await;
		// Async acknowledgement: nothing to write yet.
		let Some(ack) = ack else { return Ok(()) };

		// The ack must match the packet as the rollapp sent it, so undo any
		// fulfillment rewrite before writing it.
		let snapshot = self.db.snapshot()?;
		let restored = match packet.restore_original_transfer_target() {
			Ok(restored) => restored,
			Err(err) => {
				self.db.restore(snapshot)?;
				return Err(err.into());
			}
		};
		if let Err(err) = transfer.write_acknowledgement(&restored.packet, &ack).await {
			self.db.restore(snapshot)?;
			return Err(err.into());
		}

		// Orders nobody fulfilled still owe their completion hook, now that
		// the original recipient has the funds. Hook failures are logged, not
		// fatal, and leave no partial writes behind.
		if let Err(err) = self.run_post_recv_completion(packet).await {
			error!(
				packet = %packet.log_string(),
				error = %err,
				"completion hook failed after finalization",
			);
		}
		Ok(())
	}

	async fn replay_on_ack(
		&self,
		transfer: &dyn TransferModule,
		packet: &RollappPacket,
	) -> Result<(), DelayedAckError> {
		let ack = packet.acknowledgement.clone().unwrap_or_default();
		let snapshot = self.db.snapshot()?;
		if let Err(err) = transfer
			.on_acknowledgement_packet(&packet.packet, &ack, &packet.relayer)
			.await
		{
			self.db.restore(snapshot)?;
			return Err(err.into());
		}
		Ok(())
	}

	async fn replay_on_timeout(
		&self,
		transfer: &dyn TransferModule,
		packet: &RollappPacket,
	) -> Result<(), DelayedAckError> {
		let snapshot = self.db.snapshot()?;
		if let Err(err) = transfer.on_timeout_packet(&packet.packet, &packet.relayer).await {
			self.db.restore(snapshot)?;
			return Err(err.into());
		}
		Ok(())
	}

	async fn run_post_recv_completion(
		&self,
		packet: &RollappPacket,
	) -> Result<(), DelayedAckError> {
		let Some(lookup) = self.lookup()? else { return Ok(()) };
		let Some(order) = lookup.pending_order_by_packet(packet)? else {
			// Only transfers that opted into the marketplace have one.
			return Ok(());
		};
		// Hooks run at most once per order; a fulfilled order already ran its
		// hook at fulfillment time.
		if order.is_fulfilled() || order.completion_hook.is_none() {
			return Ok(());
		}
		let data = packet.transfer_data()?;
		let amount = hub_types::coin::parse_amount(&data.amount)
			.map_err(|e| DelayedAckError::Internal(e.to_string()))?;
		// The bridging fee was already skimmed before the receiver got paid.
		let budget = amount.saturating_sub(mul_rate(amount, self.params.bridging_fee_rate));

		let snapshot = self.db.snapshot()?;
		if let Err(err) = self.run_order_completion_hook(&order, budget).await {
			self.db.restore(snapshot)?;
			return Err(err);
		}
		Ok(())
	}

	// --- rollback handling ---

	/// Reverts every pending packet of a rolled-back rollapp.
	///
	/// Outbound packets (ack and timeout legs) are refunded through the
	/// timeout callback first, since the rollapp will never process them. A
	/// failed refund is rolled back and logged but does not stop the sweep.
	pub async fn handle_rollapp_rollback(
		&self,
		transfer: &dyn TransferModule,
		rollapp_id: &str,
	) -> Result<usize, DelayedAckError> {
		let filter =
			PacketListFilter::by_rollapp_by_status(rollapp_id, &[PacketStatus::Pending]);
		let pending = self.list_rollapp_packets(&filter)?;
		debug!(rollapp_id, num_packets = pending.len(), "reverting rollapp packets");
		let count = pending.len();
		for packet in pending {
			if matches!(packet.packet_type, PacketType::OnAck | PacketType::OnTimeout) {
				if let Err(err) = self.replay_on_timeout(transfer, &packet).await {
					error!(
						packet = %packet.log_string(),
						error = %err,
						"refund failed during rollback, rolled back",
					);
				}
			}
			self.update_rollapp_packet_with_status(packet, PacketStatus::Reverted)?;
		}
		Ok(count)
	}
}

fn receiver_prefix(receiver: &str) -> Vec<u8> {
	let mut prefix = Vec::with_capacity(receiver.len() + 1);
	prefix.extend_from_slice(receiver.as_bytes());
	prefix.push(b'/');
	prefix
}

fn lock_err<T>(_: std::sync::PoisonError<T>) -> DelayedAckError {
	DelayedAckError::Internal("lock poisoned".to_string())
}

#[cfg(test)]
mod tests {
	use super::*;
	use async_trait::async_trait;
	use std::sync::atomic::{AtomicBool, Ordering};
	use std::sync::Mutex;

	use hub_storage::MemoryKv;
	use hub_types::coin::Coin;
	use hub_types::hooks::CompletionHookCall;
	use hub_types::order::DemandOrder;
	use hub_types::packet::{TransferPacket, TransferPacketData};
	use hub_types::traits::{Acknowledgement, ModuleError, TransferModule};

	fn db() -> StateDb {
		StateDb::new(Arc::new(MemoryKv::new()))
	}

	fn keeper(db: &StateDb) -> DelayedAckKeeper {
		DelayedAckKeeper::new(db.clone(), Params::default())
	}

	fn packet(packet_type: PacketType, proof_height: u64, sequence: u64) -> RollappPacket {
		let data = TransferPacketData {
			denom: "adym".to_string(),
			amount: "1000".to_string(),
			sender: "alice".to_string(),
			receiver: "bob".to_string(),
			memo: String::new(),
		};
		RollappPacket {
			rollapp_id: "rollapp_1234-1".to_string(),
			packet: TransferPacket {
				source_port: "transfer".to_string(),
				source_channel: "channel-0".to_string(),
				destination_port: "transfer".to_string(),
				destination_channel: "channel-7".to_string(),
				sequence,
				data: data.to_bytes(),
				timeout_height: 0,
				timeout_timestamp: 0,
			},
			packet_type,
			status: PacketStatus::Pending,
			proof_height,
			relayer: "relayer".to_string(),
			acknowledgement: None,
			error: None,
			original_transfer_target: None,
		}
	}

	/// Transfer module that records callback order and can be told to fail.
	/// It writes a marker into the shared store on each callback so rollback
	/// coverage can assert the marker is gone again.
	struct MockTransfer {
		db: StateDb,
		calls: Mutex<Vec<String>>,
		fail: AtomicBool,
	}

	impl MockTransfer {
		fn new(db: StateDb) -> Self {
			Self {
				db,
				calls: Mutex::new(Vec::new()),
				fail: AtomicBool::new(false),
			}
		}

		fn record(&self, call: &str, packet: &TransferPacket) {
			self.calls
				.lock()
				.unwrap()
				.push(format!("{}:{}", call, packet.sequence));
			let key = format!("{}:{}", call, packet.sequence);
			self.db
				.set_raw(Namespace::Balances, key.as_bytes(), vec![1])
				.unwrap();
		}

		fn calls(&self) -> Vec<String> {
			self.calls.lock().unwrap().clone()
		}
	}

	#[async_trait]
	impl TransferModule for MockTransfer {
		async fn on_recv_packet(
			&self,
			packet: &TransferPacket,
			_relayer: &str,
		) -> Option<Acknowledgement> {
			self.record("recv", packet);
			Some(Acknowledgement(b"ok".to_vec()))
		}

		async fn on_acknowledgement_packet(
			&self,
			packet: &TransferPacket,
			_acknowledgement: &[u8],
			_relayer: &str,
		) -> Result<(), ModuleError> {
			self.record("ack", packet);
			if self.fail.load(Ordering::SeqCst) {
				return Err(ModuleError::new("ack failed"));
			}
			Ok(())
		}

		async fn on_timeout_packet(
			&self,
			packet: &TransferPacket,
			_relayer: &str,
		) -> Result<(), ModuleError> {
			self.record("timeout", packet);
			if self.fail.load(Ordering::SeqCst) {
				return Err(ModuleError::new("timeout failed"));
			}
			Ok(())
		}

		async fn write_acknowledgement(
			&self,
			packet: &TransferPacket,
			_acknowledgement: &Acknowledgement,
		) -> Result<(), ModuleError> {
			self.record("write_ack", packet);
			if self.fail.load(Ordering::SeqCst) {
				return Err(ModuleError::new("write ack failed"));
			}
			Ok(())
		}
	}

	struct RecordingHooks {
		updates: Mutex<Vec<(PacketStatus, Vec<u8>, Vec<u8>)>>,
	}

	impl RecordingHooks {
		fn new() -> Self {
			Self {
				updates: Mutex::new(Vec::new()),
			}
		}
	}

	impl DelayedAckHooks for RecordingHooks {
		fn after_packet_status_updated(
			&self,
			packet: &RollappPacket,
			old_key: &[u8],
			new_key: &[u8],
		) -> Result<(), ModuleError> {
			self.updates
				.lock()
				.unwrap()
				.push((packet.status, old_key.to_vec(), new_key.to_vec()));
			Ok(())
		}

		fn after_packet_deleted(&self, _packet: &RollappPacket) -> Result<(), ModuleError> {
			Ok(())
		}
	}

	/// Order lookup serving one canned order, as the marketplace would.
	struct StaticOrderLookup {
		order: DemandOrder,
	}

	impl OrderLookup for StaticOrderLookup {
		fn pending_order_by_packet(
			&self,
			_packet: &RollappPacket,
		) -> Result<Option<DemandOrder>, ModuleError> {
			Ok(Some(self.order.clone()))
		}
	}

	/// Completion hook that writes a marker into the shared store on each run,
	/// so rollback coverage can assert the marker is gone again.
	struct RecordingHook {
		db: StateDb,
		runs: Mutex<Vec<(String, Coin)>>,
		fail: AtomicBool,
	}

	impl RecordingHook {
		fn new(db: StateDb) -> Self {
			Self {
				db,
				runs: Mutex::new(Vec::new()),
				fail: AtomicBool::new(false),
			}
		}
	}

	fn register_hook(k: &DelayedAckKeeper, name: &str, hook: &Arc<RecordingHook>) {
		k.register_completion_hooks(HashMap::from([(
			name.to_string(),
			hook.clone() as Arc<dyn CompletionHook>,
		)]))
		.unwrap();
	}

	#[async_trait]
	impl CompletionHook for RecordingHook {
		fn validate_arg(&self, _hook_data: &[u8]) -> Result<(), ModuleError> {
			Ok(())
		}

		async fn run(
			&self,
			funds_src: &str,
			budget: &Coin,
			_hook_data: &[u8],
		) -> Result<(), ModuleError> {
			self.db
				.set_raw(Namespace::Balances, b"hook_marker", vec![1])
				.unwrap();
			self.runs
				.lock()
				.unwrap()
				.push((funds_src.to_string(), budget.clone()));
			if self.fail.load(Ordering::SeqCst) {
				return Err(ModuleError::new("hook failed"));
			}
			Ok(())
		}
	}

	fn hooked_order(p: &RollappPacket, fulfiller: Option<&str>) -> DemandOrder {
		let mut order = DemandOrder::new(p, 900, 99, "adym", "bob", 1);
		order.completion_hook = Some(CompletionHookCall::new("forward", vec![]));
		order.fulfiller_address = fulfiller.map(str::to_string);
		order
	}

	#[test]
	fn stores_and_retrieves_packet() {
		let db = db();
		let k = keeper(&db);
		let p = packet(PacketType::OnRecv, 5, 1);
		k.set_rollapp_packet(&p).unwrap();
		assert_eq!(k.get_rollapp_packet(&p.key()).unwrap(), p);
		assert!(matches!(
			k.get_rollapp_packet(b"missing").unwrap_err(),
			DelayedAckError::PacketNotFound,
		));
	}

	#[test]
	fn indexes_pending_packets_by_receiver() {
		let db = db();
		let k = keeper(&db);
		let p = packet(PacketType::OnRecv, 5, 1);
		k.set_rollapp_packet(&p).unwrap();
		let hits = k.pending_packets_by_receiver("bob").unwrap();
		assert_eq!(hits, vec![p]);
		assert!(k.pending_packets_by_receiver("carol").unwrap().is_empty());
	}

	#[test]
	fn transfer_address_update_saves_original_target() {
		let db = db();
		let k = keeper(&db);
		let p = packet(PacketType::OnRecv, 5, 1);
		k.set_rollapp_packet(&p).unwrap();

		k.update_rollapp_packet_transfer_address(&p.key(), "fulfiller").unwrap();

		let updated = k.get_rollapp_packet(&p.key()).unwrap();
		assert_eq!(updated.transfer_data().unwrap().receiver, "fulfiller");
		assert_eq!(updated.original_transfer_target.as_deref(), Some("bob"));
		// index follows the new receiver
		assert!(k.pending_packets_by_receiver("bob").unwrap().is_empty());
		assert_eq!(k.pending_packets_by_receiver("fulfiller").unwrap().len(), 1);
	}

	#[test]
	fn status_update_rekeys_and_fires_hooks_once() {
		let db = db();
		let k = keeper(&db);
		let hooks = Arc::new(RecordingHooks::new());
		k.set_hooks(vec![hooks.clone() as Arc<dyn DelayedAckHooks>]).unwrap();

		let p = packet(PacketType::OnRecv, 5, 1);
		k.set_rollapp_packet(&p).unwrap();
		let old_key = p.key();

		let updated = k
			.update_rollapp_packet_with_status(p, PacketStatus::Finalized)
			.unwrap();
		assert_eq!(updated.status, PacketStatus::Finalized);
		assert!(matches!(
			k.get_rollapp_packet(&old_key).unwrap_err(),
			DelayedAckError::PacketNotFound,
		));
		assert_eq!(k.get_rollapp_packet(&updated.key()).unwrap(), updated);

		let updates = hooks.updates.lock().unwrap();
		assert_eq!(updates.len(), 1);
		assert_eq!(updates[0].0, PacketStatus::Finalized);
		assert_eq!(updates[0].1, old_key);
		assert_eq!(updates[0].2, updated.key());
	}

	#[test]
	fn terminal_packets_cannot_transition() {
		let db = db();
		let k = keeper(&db);
		let p = packet(PacketType::OnRecv, 5, 1);
		k.set_rollapp_packet(&p).unwrap();
		let finalized = k
			.update_rollapp_packet_with_status(p, PacketStatus::Finalized)
			.unwrap();
		let err = k
			.update_rollapp_packet_with_status(finalized, PacketStatus::Reverted)
			.unwrap_err();
		assert!(matches!(err, DelayedAckError::InvalidTransition { .. }));
	}

	#[tokio::test]
	async fn finalize_respects_height_gate_and_order() {
		let db = db();
		let k = keeper(&db);
		let transfer = MockTransfer::new(db.clone());

		for (height, sequence) in [(12, 3), (5, 1), (8, 2)] {
			k.set_rollapp_packet(&packet(PacketType::OnRecv, height, sequence)).unwrap();
		}

		let count = k
			.finalize_rollapp_packets(&transfer, "rollapp_1234-1", 10)
			.await
			.unwrap();
		assert_eq!(count, 2);
		// ascending proof height
		assert_eq!(
			transfer.calls(),
			vec!["recv:1", "write_ack:1", "recv:2", "write_ack:2"],
		);

		// the height-12 packet is still pending
		let pending = k
			.list_rollapp_packets(&PacketListFilter::by_rollapp_by_status(
				"rollapp_1234-1",
				&[PacketStatus::Pending],
			))
			.unwrap();
		assert_eq!(pending.len(), 1);
		assert_eq!(pending[0].proof_height, 12);
	}

	#[tokio::test]
	async fn failed_callback_is_rolled_back_but_still_finalizes() {
		let db = db();
		let k = keeper(&db);
		let transfer = MockTransfer::new(db.clone());

		let mut p = packet(PacketType::OnAck, 5, 1);
		p.acknowledgement = Some(b"ack".to_vec());
		k.set_rollapp_packet(&p).unwrap();
		transfer.fail.store(true, Ordering::SeqCst);

		k.finalize_rollapp_packets(&transfer, "rollapp_1234-1", 10).await.unwrap();

		let finalized = k
			.list_rollapp_packets(&PacketListFilter::by_rollapp_by_status(
				"rollapp_1234-1",
				&[PacketStatus::Finalized],
			))
			.unwrap();
		assert_eq!(finalized.len(), 1);
		assert!(finalized[0].error.as_deref().unwrap().contains("ack failed"));
		// the callback's write was rolled back
		assert_eq!(db.get_raw(Namespace::Balances, b"ack:1").unwrap(), None);
	}

	#[tokio::test]
	async fn unfulfilled_order_hook_runs_after_finalization() {
		let db = db();
		let k = keeper(&db);
		let transfer = MockTransfer::new(db.clone());
		let hook = Arc::new(RecordingHook::new(db.clone()));
		register_hook(&k, "forward", &hook);

		let p = packet(PacketType::OnRecv, 5, 1);
		k.set_rollapp_packet(&p).unwrap();
		k.set_order_lookup(Arc::new(StaticOrderLookup {
			order: hooked_order(&p, None),
		}))
		.unwrap();

		k.finalize_rollapp_packets(&transfer, "rollapp_1234-1", 10).await.unwrap();

		// the transfer amount minus the 0.1% bridging fee, from the recipient
		let runs = hook.runs.lock().unwrap();
		assert_eq!(runs.as_slice(), [("bob".to_string(), Coin::new("adym", 999))]);
	}

	#[tokio::test]
	async fn fulfilled_order_hook_is_skipped_at_finalization() {
		let db = db();
		let k = keeper(&db);
		let transfer = MockTransfer::new(db.clone());
		let hook = Arc::new(RecordingHook::new(db.clone()));
		register_hook(&k, "forward", &hook);

		let p = packet(PacketType::OnRecv, 5, 1);
		k.set_rollapp_packet(&p).unwrap();
		// fulfillment already ran the hook; finalization must not repeat it
		k.set_order_lookup(Arc::new(StaticOrderLookup {
			order: hooked_order(&p, Some("marketmaker")),
		}))
		.unwrap();

		k.finalize_rollapp_packets(&transfer, "rollapp_1234-1", 10).await.unwrap();

		assert!(hook.runs.lock().unwrap().is_empty());
		let finalized = k
			.list_rollapp_packets(&PacketListFilter::by_rollapp_by_status(
				"rollapp_1234-1",
				&[PacketStatus::Finalized],
			))
			.unwrap();
		assert_eq!(finalized.len(), 1);
	}

	#[tokio::test]
	async fn failed_hook_rolls_back_its_writes_but_finalization_commits() {
		let db = db();
		let k = keeper(&db);
		let transfer = MockTransfer::new(db.clone());
		let hook = Arc::new(RecordingHook::new(db.clone()));
		register_hook(&k, "forward", &hook);
		hook.fail.store(true, Ordering::SeqCst);

		let p = packet(PacketType::OnRecv, 5, 1);
		k.set_rollapp_packet(&p).unwrap();
		k.set_order_lookup(Arc::new(StaticOrderLookup {
			order: hooked_order(&p, None),
		}))
		.unwrap();

		k.finalize_rollapp_packets(&transfer, "rollapp_1234-1", 10).await.unwrap();

		// the hook ran once and its write was undone
		assert_eq!(hook.runs.lock().unwrap().len(), 1);
		assert_eq!(db.get_raw(Namespace::Balances, b"hook_marker").unwrap(), None);

		// the replayed callback and its ack survived the hook failure
		assert_eq!(transfer.calls(), vec!["recv:1", "write_ack:1"]);
		let finalized = k
			.list_rollapp_packets(&PacketListFilter::by_rollapp_by_status(
				"rollapp_1234-1",
				&[PacketStatus::Finalized],
			))
			.unwrap();
		assert_eq!(finalized.len(), 1);
		assert!(finalized[0].error.is_none());
	}

	#[tokio::test]
	async fn finalize_by_key_rejects_unfinalized_height() {
		let db = db();
		let k = keeper(&db);
		let transfer = MockTransfer::new(db.clone());
		let p = packet(PacketType::OnRecv, 20, 1);
		k.set_rollapp_packet(&p).unwrap();

		let err = k
			.finalize_packet_by_key(&transfer, &p.key(), 10)
			.await
			.unwrap_err();
		assert!(matches!(err, DelayedAckError::HeightNotFinalized { .. }));

		let finalized = k.finalize_packet_by_key(&transfer, &p.key(), 20).await.unwrap();
		assert_eq!(finalized.status, PacketStatus::Finalized);
	}

	#[tokio::test]
	async fn rollback_reverts_all_pending_and_refunds_outbound() {
		let db = db();
		let k = keeper(&db);
		let transfer = MockTransfer::new(db.clone());

		k.set_rollapp_packet(&packet(PacketType::OnRecv, 5, 1)).unwrap();
		let mut ack = packet(PacketType::OnAck, 6, 2);
		ack.acknowledgement = Some(b"ack".to_vec());
		k.set_rollapp_packet(&ack).unwrap();
		k.set_rollapp_packet(&packet(PacketType::OnTimeout, 7, 3)).unwrap();

		let count = k
			.handle_rollapp_rollback(&transfer, "rollapp_1234-1")
			.await
			.unwrap();
		assert_eq!(count, 3);
		// outbound legs refunded through the timeout callback, recv untouched
		assert_eq!(transfer.calls(), vec!["timeout:2", "timeout:3"]);

		let reverted = k
			.list_rollapp_packets(&PacketListFilter::by_rollapp_by_status(
				"rollapp_1234-1",
				&[PacketStatus::Reverted],
			))
			.unwrap();
		assert_eq!(reverted.len(), 3);
		assert!(k
			.list_rollapp_packets(&PacketListFilter::by_rollapp_by_status(
				"rollapp_1234-1",
				&[PacketStatus::Pending],
			))
			.unwrap()
			.is_empty());
	}

	#[tokio::test]
	async fn gc_deletes_only_terminal_packets() {
		let db = db();
		let k = keeper(&db);
		let transfer = MockTransfer::new(db.clone());

		k.set_rollapp_packet(&packet(PacketType::OnRecv, 5, 1)).unwrap();
		k.set_rollapp_packet(&packet(PacketType::OnRecv, 20, 2)).unwrap();
		k.finalize_rollapp_packets(&transfer, "rollapp_1234-1", 10).await.unwrap();

		assert_eq!(k.delete_terminal_packets().unwrap(), 1);
		let remaining = k.get_all_rollapp_packets().unwrap();
		assert_eq!(remaining.len(), 1);
		assert_eq!(remaining[0].status, PacketStatus::Pending);
	}

	#[test]
	fn type_filter_and_limit_apply() {
		let db = db();
		let k = keeper(&db);
		k.set_rollapp_packet(&packet(PacketType::OnRecv, 5, 1)).unwrap();
		k.set_rollapp_packet(&packet(PacketType::OnAck, 6, 2)).unwrap();
		k.set_rollapp_packet(&packet(PacketType::OnRecv, 7, 3)).unwrap();

		let filter = PacketListFilter::by_rollapp("rollapp_1234-1").with_type(PacketType::OnRecv);
		assert_eq!(k.list_rollapp_packets(&filter).unwrap().len(), 2);

		let filter = filter.with_limit(1);
		assert_eq!(k.list_rollapp_packets(&filter).unwrap().len(), 1);
	}
}
