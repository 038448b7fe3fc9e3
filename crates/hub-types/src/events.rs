//! Typed events emitted by the settlement layer.

use serde::{Deserialize, Serialize};

use crate::coin::Coin;
use crate::packet::{PacketStatus, PacketType};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum HubEvent {
	Packet(PacketEvent),
	Order(OrderEvent),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PacketEvent {
	Stored {
		rollapp_id: String,
		packet_type: PacketType,
		proof_height: u64,
		sequence: u64,
	},
	StatusUpdated {
		rollapp_id: String,
		old_status: PacketStatus,
		new_status: PacketStatus,
		sequence: u64,
		error: Option<String>,
	},
	Deleted {
		rollapp_id: String,
		sequence: u64,
	},
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum OrderEvent {
	Created {
		order_id: String,
		rollapp_id: String,
		price: Coin,
		fee: Coin,
		recipient: String,
		packet_type: PacketType,
		proof_height: u64,
	},
	Fulfilled {
		order_id: String,
		price: Coin,
		fee: Coin,
		fulfiller: String,
	},
	FulfilledAuthorized {
		order_id: String,
		price: Coin,
		fee: Coin,
		lp_address: String,
		operator_address: String,
		operator_fee: Coin,
	},
	FeeUpdated {
		order_id: String,
		new_fee: Coin,
		new_price: Coin,
	},
	PacketStatusUpdated {
		order_id: String,
		new_packet_status: PacketStatus,
		is_fulfilled: bool,
	},
	Deleted {
		order_id: String,
	},
}
