//! The eIBC demand-order marketplace.
//!
//! While a transfer sits in the delayed-ack queue its recipient can sell the
//! claim on it: a demand order offers the transfer amount minus a fee to
//! whoever pays the price up front. The fulfiller is paid back from the
//! original transfer once the rollapp state finalizes.

use thiserror::Error;

use hub_delayedack::DelayedAckError;
use hub_storage::StorageError;
use hub_types::coin::CoinError;
use hub_types::memo::MemoError;
use hub_types::order::OrderError;
use hub_types::packet::PacketError;
use hub_types::traits::ModuleError;

pub mod authorization;
pub mod denom;
pub mod hooks;
pub mod keeper;

pub use authorization::{AcceptResponse, AuthorizedFulfillment, FulfillOrderAuthorization, RollappCriteria};
pub use hooks::EibcPacketHooks;
pub use keeper::{EibcKeeper, FulfillAuthorizedRequest, OrderListFilter};

#[derive(Debug, Error)]
pub enum EibcError {
	#[error("Demand order does not exist")]
	OrderNotFound,

	#[error("Expected fee is not equal to the order fee")]
	ExpectedFeeNotMet,

	#[error("Address is not allowed to receive funds: {0}")]
	BlockedAddress(String),

	#[error("Rollapp id mismatch")]
	RollappIdMismatch,

	#[error("Price mismatch")]
	PriceMismatch,

	#[error("Only the recipient can update the order")]
	NotOrderRecipient,

	#[error("Order is not settlement validated")]
	OrderNotSettlementValidated,

	#[error("Authorization does not exist")]
	GrantNotFound,

	#[error("Unauthorized: {0}")]
	Unauthorized(String),

	#[error("Spend limit exhausted")]
	SpendLimitExhausted,

	#[error("Invalid authorization: {0}")]
	InvalidAuthorization(String),

	#[error("Order: {0}")]
	Order(#[from] OrderError),

	#[error("Coin: {0}")]
	Coin(#[from] CoinError),

	#[error("Memo: {0}")]
	Memo(#[from] MemoError),

	#[error("Packet: {0}")]
	Packet(#[from] PacketError),

	#[error("Storage: {0}")]
	Storage(#[from] StorageError),

	#[error("Delayed ack: {0}")]
	DelayedAck(#[from] DelayedAckError),

	#[error("Module: {0}")]
	Module(#[from] ModuleError),
}
