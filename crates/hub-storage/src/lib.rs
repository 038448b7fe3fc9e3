//! Storage for the settlement layer.
//!
//! Everything the layer persists — packets, demand orders, indexes, grants —
//! lives in one ordered key-value store behind [`KvBackend`]. Ordered iteration
//! matters: packet keys embed the proof height, so a prefix scan walks packets
//! in finalization order for free.
//!
//! The backend also supports whole-store snapshots. Callbacks replayed at
//! finalization must be all-or-nothing, so the caller snapshots before the
//! callback and restores on failure.

use serde::{de::DeserializeOwned, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

pub mod implementations {
	pub mod memory;
}

mod state;

pub use implementations::memory::MemoryKv;
pub use state::{Namespace, StateDb};

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
	/// A requested item is not present.
	#[error("Not found")]
	NotFound,
	/// Serialization or deserialization failed.
	#[error("Serialization error: {0}")]
	Serialization(String),
	/// The storage backend failed.
	#[error("Backend error: {0}")]
	Backend(String),
}

/// A full-store snapshot taken with [`KvBackend::snapshot`].
///
/// Opaque to callers; only good for handing back to `restore` on the backend
/// that produced it.
pub struct Snapshot(pub(crate) BTreeMap<Vec<u8>, Vec<u8>>);

/// Low-level ordered key-value backend.
///
/// Keys are raw bytes and iteration is lexicographic, which the settlement
/// keys are designed around.
pub trait KvBackend: Send + Sync {
	/// Retrieves the value stored under the key, if any.
	fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError>;

	/// Stores a value, replacing any previous one.
	fn set(&self, key: &[u8], value: Vec<u8>) -> Result<(), StorageError>;

	/// Deletes the value under the key. Deleting a missing key is a no-op.
	fn delete(&self, key: &[u8]) -> Result<(), StorageError>;

	/// Returns all entries whose key starts with `prefix`, in ascending key
	/// order.
	fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StorageError>;

	/// Captures the entire store state.
	fn snapshot(&self) -> Result<Snapshot, StorageError>;

	/// Rewinds the store to a previously captured snapshot.
	fn restore(&self, snapshot: Snapshot) -> Result<(), StorageError>;
}

/// Serializes a value for storage.
pub fn to_bytes<T: Serialize>(value: &T) -> Result<Vec<u8>, StorageError> {
	serde_json::to_vec(value).map_err(|e| StorageError::Serialization(e.to_string()))
}

/// Deserializes a stored value.
pub fn from_bytes<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, StorageError> {
	serde_json::from_slice(bytes).map_err(|e| StorageError::Serialization(e.to_string()))
}

/// Smallest byte string strictly greater than every key starting with
/// `prefix`, or `None` when the prefix is all `0xff` and no such bound exists.
pub fn prefix_end_bytes(prefix: &[u8]) -> Option<Vec<u8>> {
	let mut end = prefix.to_vec();
	while let Some(last) = end.last_mut() {
		if *last < 0xff {
			*last += 1;
			return Some(end);
		}
		end.pop();
	}
	None
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn prefix_end_increments_last_byte() {
		assert_eq!(prefix_end_bytes(b"ab"), Some(b"ac".to_vec()));
		assert_eq!(prefix_end_bytes(&[0x00, 0x01]), Some(vec![0x00, 0x02]));
	}

	#[test]
	fn prefix_end_carries_over_0xff() {
		assert_eq!(prefix_end_bytes(&[0x01, 0xff]), Some(vec![0x02]));
		assert_eq!(prefix_end_bytes(&[0xff, 0xff]), None);
	}
}
