//! Completion hook call payloads.

use serde::{Deserialize, Serialize};

/// A named, data-parameterized post-completion action attached to an order.
/// The name selects a registered handler; the data is opaque to this layer
/// and validated by the handler's `validate_arg`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionHookCall {
	pub name: String,
	#[serde(default)]
	pub data: Vec<u8>,
}

impl CompletionHookCall {
	pub fn new(name: impl Into<String>, data: Vec<u8>) -> Self {
		Self {
			name: name.into(),
			data,
		}
	}
}
