//! Denomination tracing for transferred tokens.
//!
//! A token arriving over a channel is represented by a voucher denom derived
//! from its trace path. These helpers mirror the transfer protocol's rules:
//! the credited denom depends on whether the token is returning to its source
//! chain or travelling further away from it.

use sha3::{Digest, Sha3_256};

use hub_types::packet::{TransferPacket, TransferPacketData};

/// Whether the receiving chain is the source of the token, i.e. the denom
/// carries the prefix the sender chain added when the token first left here.
pub fn receiver_chain_is_source(source_port: &str, source_channel: &str, denom: &str) -> bool {
	denom.starts_with(&denom_prefix(source_port, source_channel))
}

pub fn denom_prefix(port: &str, channel: &str) -> String {
	format!("{}/{}/", port, channel)
}

/// The store denom for a trace string: the base denom when there is no trace
/// path, otherwise a hash-based voucher denom.
pub fn ibc_denom(trace: &str) -> String {
	if !trace.contains('/') {
		return trace.to_string();
	}
	let hash = Sha3_256::digest(trace.as_bytes());
	format!("ibc/{}", hex::encode_upper(hash))
}

/// The denom credited to the receiver of an inbound transfer, which is what a
/// demand order for it must be denominated in.
pub fn transfer_denom_on_recv(packet: &TransferPacket, data: &TransferPacketData) -> String {
	if receiver_chain_is_source(&packet.source_port, &packet.source_channel, &data.denom) {
		// Token returning home: strip the prefix the counterparty added.
		let prefix = denom_prefix(&packet.source_port, &packet.source_channel);
		let unprefixed = &data.denom[prefix.len()..];
		ibc_denom(unprefixed)
	} else {
		// Token moving further from its source: extend the trace with the
		// hop it just made.
		let extended = format!(
			"{}{}",
			denom_prefix(&packet.destination_port, &packet.destination_channel),
			data.denom,
		);
		ibc_denom(&extended)
	}
}
