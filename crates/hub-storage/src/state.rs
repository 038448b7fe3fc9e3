//! Namespaced, typed view over a [`KvBackend`].

use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;

use crate::{from_bytes, to_bytes, KvBackend, Snapshot, StorageError};

/// One-byte table prefixes partitioning the shared store.
///
/// Every key a module writes is prepended with its namespace byte, so the
/// modules share a single backend and a single snapshot without colliding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Namespace {
	/// Rollapp packets, keyed by status/rollapp/height/channel-sequence.
	Packets,
	/// Demand orders, keyed by tracking-packet status and order id.
	Orders,
	/// Secondary index: pending packet keys by transfer receiver.
	PendingByReceiver,
	/// Fulfillment authorization grants, keyed by granter/grantee.
	Grants,
	/// Account balances, used by the in-process ledger.
	Balances,
}

impl Namespace {
	pub fn prefix(self) -> u8 {
		match self {
			Namespace::Packets => 0x01,
			Namespace::Orders => 0x02,
			Namespace::PendingByReceiver => 0x03,
			Namespace::Grants => 0x04,
			Namespace::Balances => 0x05,
		}
	}
}

/// Shared handle to the settlement store.
///
/// All keepers hold clones of one `StateDb`, so a snapshot taken here covers
/// every module's writes. That is what makes callback rollback all-or-nothing
/// across packets, orders and balances at once.
#[derive(Clone)]
pub struct StateDb {
	backend: Arc<dyn KvBackend>,
}

impl StateDb {
	pub fn new(backend: Arc<dyn KvBackend>) -> Self {
		Self { backend }
	}

	fn namespaced(namespace: Namespace, key: &[u8]) -> Vec<u8> {
		let mut full = Vec::with_capacity(1 + key.len());
		full.push(namespace.prefix());
		full.extend_from_slice(key);
		full
	}

	pub fn get_raw(&self, namespace: Namespace, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
		self.backend.get(&Self::namespaced(namespace, key))
	}

	pub fn set_raw(&self, namespace: Namespace, key: &[u8], value: Vec<u8>) -> Result<(), StorageError> {
		self.backend.set(&Self::namespaced(namespace, key), value)
	}

	pub fn get_typed<T: DeserializeOwned>(
		&self,
		namespace: Namespace,
		key: &[u8],
	) -> Result<Option<T>, StorageError> {
		match self.get_raw(namespace, key)? {
			Some(bytes) => Ok(Some(from_bytes(&bytes)?)),
			None => Ok(None),
		}
	}

	pub fn set_typed<T: Serialize>(
		&self,
		namespace: Namespace,
		key: &[u8],
		value: &T,
	) -> Result<(), StorageError> {
		self.set_raw(namespace, key, to_bytes(value)?)
	}

	pub fn delete(&self, namespace: Namespace, key: &[u8]) -> Result<(), StorageError> {
		self.backend.delete(&Self::namespaced(namespace, key))
	}

	/// Scans a namespace under the given key prefix, in ascending key order.
	/// Returned keys have the namespace byte stripped.
	pub fn scan(
		&self,
		namespace: Namespace,
		prefix: &[u8],
	) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StorageError> {
		let hits = self.backend.scan_prefix(&Self::namespaced(namespace, prefix))?;
		Ok(hits
			.into_iter()
			.map(|(k, v)| (k[1..].to_vec(), v))
			.collect())
	}

	/// Typed variant of [`scan`](Self::scan); values are deserialized, keys
	/// dropped.
	pub fn scan_typed<T: DeserializeOwned>(
		&self,
		namespace: Namespace,
		prefix: &[u8],
	) -> Result<Vec<T>, StorageError> {
		self.scan(namespace, prefix)?
			.into_iter()
			.map(|(_, v)| from_bytes(&v))
			.collect()
	}

	pub fn snapshot(&self) -> Result<Snapshot, StorageError> {
		self.backend.snapshot()
	}

	pub fn restore(&self, snapshot: Snapshot) -> Result<(), StorageError> {
		self.backend.restore(snapshot)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::MemoryKv;

	fn db() -> StateDb {
		StateDb::new(Arc::new(MemoryKv::new()))
	}

	#[test]
	fn namespaces_do_not_collide() {
		let db = db();
		db.set_raw(Namespace::Packets, b"k", vec![1]).unwrap();
		db.set_raw(Namespace::Orders, b"k", vec![2]).unwrap();
		assert_eq!(db.get_raw(Namespace::Packets, b"k").unwrap(), Some(vec![1]));
		assert_eq!(db.get_raw(Namespace::Orders, b"k").unwrap(), Some(vec![2]));
	}

	#[test]
	fn scan_is_namespace_scoped_and_strips_prefix() {
		let db = db();
		db.set_raw(Namespace::Packets, b"a/1", vec![1]).unwrap();
		db.set_raw(Namespace::Orders, b"a/2", vec![2]).unwrap();
		let hits = db.scan(Namespace::Packets, b"a/").unwrap();
		assert_eq!(hits, vec![(b"a/1".to_vec(), vec![1])]);
	}

	#[test]
	fn typed_roundtrip() {
		let db = db();
		db.set_typed(Namespace::Grants, b"g", &"hello".to_string()).unwrap();
		let got: Option<String> = db.get_typed(Namespace::Grants, b"g").unwrap();
		assert_eq!(got.as_deref(), Some("hello"));
	}

	#[test]
	fn snapshot_covers_all_namespaces() {
		let db = db();
		db.set_raw(Namespace::Packets, b"p", vec![1]).unwrap();
		let snapshot = db.snapshot().unwrap();
		db.set_raw(Namespace::Orders, b"o", vec![2]).unwrap();
		db.delete(Namespace::Packets, b"p").unwrap();
		db.restore(snapshot).unwrap();
		assert_eq!(db.get_raw(Namespace::Packets, b"p").unwrap(), Some(vec![1]));
		assert_eq!(db.get_raw(Namespace::Orders, b"o").unwrap(), None);
	}
}
