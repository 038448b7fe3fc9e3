//! In-memory ordered key-value backend.

use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::RwLock;

use crate::{prefix_end_bytes, KvBackend, Snapshot, StorageError};

/// A `BTreeMap`-backed store. The map's ordering gives the lexicographic
/// iteration the settlement keys rely on, and snapshots are plain clones.
#[derive(Default)]
pub struct MemoryKv {
	entries: RwLock<BTreeMap<Vec<u8>, Vec<u8>>>,
}

impl MemoryKv {
	pub fn new() -> Self {
		Self::default()
	}

	fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, BTreeMap<Vec<u8>, Vec<u8>>>, StorageError> {
		self.entries
			.read()
			.map_err(|_| StorageError::Backend("lock poisoned".to_string()))
	}

	fn write(
		&self,
	) -> Result<std::sync::RwLockWriteGuard<'_, BTreeMap<Vec<u8>, Vec<u8>>>, StorageError> {
		self.entries
			.write()
			.map_err(|_| StorageError::Backend("lock poisoned".to_string()))
	}
}

impl KvBackend for MemoryKv {
	fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
		Ok(self.read()?.get(key).cloned())
	}

	fn set(&self, key: &[u8], value: Vec<u8>) -> Result<(), StorageError> {
		self.write()?.insert(key.to_vec(), value);
		Ok(())
	}

	fn delete(&self, key: &[u8]) -> Result<(), StorageError> {
		self.write()?.remove(key);
		Ok(())
	}

	fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StorageError> {
		let entries = self.read()?;
		let upper = match prefix_end_bytes(prefix) {
			Some(end) => Bound::Excluded(end),
			None => Bound::Unbounded,
		};
		Ok(entries
			.range::<Vec<u8>, _>((Bound::Included(prefix.to_vec()), upper))
			.map(|(k, v)| (k.clone(), v.clone()))
			.collect())
	}

	fn snapshot(&self) -> Result<Snapshot, StorageError> {
		Ok(Snapshot(self.read()?.clone()))
	}

	fn restore(&self, snapshot: Snapshot) -> Result<(), StorageError> {
		*self.write()? = snapshot.0;
		Ok(())
	}
}
