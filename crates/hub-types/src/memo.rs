//! Transfer memo metadata.
//!
//! An inbound transfer opts into the eIBC marketplace through a memo of the
//! shape `{"eibc": {"fee": "100"}}`. The fee is what the sender offers a
//! market maker for fronting the funds before finalization.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::coin::parse_amount;
use crate::hooks::CompletionHookCall;

const MEMO_OBJECT_KEY: &str = "eibc";
const FORWARD_MEMO_OBJECT_KEY: &str = "forward";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MemoError {
	#[error("Memo is not valid JSON")]
	Unmarshal,
	#[error("Memo has no eibc object")]
	EibcEmpty,
	#[error("eIBC memo combined with a forward memo is not supported")]
	ForwardNotSupported,
	#[error("Invalid fee: {0}")]
	InvalidFee(String),
}

/// The eIBC directive carried in a transfer memo.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EibcMetadata {
	/// Decimal-string fee offered to the fulfiller.
	pub fee: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub completion_hook: Option<CompletionHookCall>,
}

impl EibcMetadata {
	pub fn zero_fee() -> Self {
		Self {
			fee: "0".to_string(),
			completion_hook: None,
		}
	}

	pub fn fee_amount(&self) -> Result<u128, MemoError> {
		parse_amount(&self.fee).map_err(|e| MemoError::InvalidFee(e.to_string()))
	}

	pub fn validate_basic(&self) -> Result<(), MemoError> {
		self.fee_amount()?;
		Ok(())
	}
}

#[derive(Debug, Clone, Deserialize)]
pub struct PacketMetadata {
	pub eibc: EibcMetadata,
}

/// Parses the eIBC directive out of a transfer memo.
///
/// A memo that is not JSON, or carries no `eibc` object, is not an error at
/// the call sites — it just means no directive. Combining the directive with
/// a packet-forward memo is rejected outright.
pub fn parse_packet_metadata(memo: &str) -> Result<PacketMetadata, MemoError> {
	let value: serde_json::Value = serde_json::from_str(memo).map_err(|_| MemoError::Unmarshal)?;
	let object = value.as_object().ok_or(MemoError::Unmarshal)?;
	if !object.contains_key(MEMO_OBJECT_KEY) {
		return Err(MemoError::EibcEmpty);
	}
	if object.contains_key(FORWARD_MEMO_OBJECT_KEY) {
		return Err(MemoError::ForwardNotSupported);
	}
	let metadata: PacketMetadata =
		serde_json::from_value(value).map_err(|_| MemoError::Unmarshal)?;
	metadata.eibc.validate_basic()?;
	Ok(metadata)
}
