//! Prefix filters for listing rollapp packets.
//!
//! Because the packet key starts with status, rollapp and zero-padded proof
//! height, every supported query is a union of contiguous key ranges. A filter
//! is a list of ranges plus an optional in-memory type filter and limit.

use hub_types::packet::{PacketStatus, PacketType, RollappPacket};

/// A contiguous key range. `end` is exclusive; `None` means "everything with
/// the `start` prefix".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrefixRange {
	pub start: Vec<u8>,
	pub end: Option<Vec<u8>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PacketListFilter {
	pub prefixes: Vec<PrefixRange>,
	/// Applied per packet after decoding; not expressible as a key range.
	pub packet_type: Option<PacketType>,
	/// Zero means unlimited.
	pub limit: usize,
}

impl PacketListFilter {
	fn from_prefixes(prefixes: Vec<PrefixRange>) -> Self {
		Self {
			prefixes,
			packet_type: None,
			limit: 0,
		}
	}

	/// All packets of a rollapp, across every status.
	pub fn by_rollapp(rollapp_id: &str) -> Self {
		Self::by_rollapp_by_status(rollapp_id, &PacketStatus::all())
	}

	/// Packets of a rollapp restricted to the given statuses.
	pub fn by_rollapp_by_status(rollapp_id: &str, statuses: &[PacketStatus]) -> Self {
		Self::from_prefixes(
			statuses
				.iter()
				.map(|status| PrefixRange {
					start: rollapp_prefix(*status, rollapp_id),
					end: None,
				})
				.collect(),
		)
	}

	/// All packets in the given statuses, across every rollapp.
	pub fn by_status(statuses: &[PacketStatus]) -> Self {
		Self::from_prefixes(
			statuses
				.iter()
				.map(|status| {
					let mut start = status.key_prefix().to_vec();
					start.push(b'/');
					PrefixRange { start, end: None }
				})
				.collect(),
		)
	}

	/// Pending packets of a rollapp with proof height up to and including
	/// `max_proof_height`. The zero-padded decimal height keeps this a single
	/// key range.
	pub fn pending_by_rollapp_by_max_height(rollapp_id: &str, max_proof_height: u64) -> Self {
		let start = rollapp_prefix(PacketStatus::Pending, rollapp_id);
		let mut end = start.clone();
		let bound = max_proof_height.saturating_add(1);
		end.extend_from_slice(format!("{bound:020}").as_bytes());
		Self::from_prefixes(vec![PrefixRange {
			start,
			end: Some(end),
		}])
	}

	pub fn with_type(mut self, packet_type: PacketType) -> Self {
		self.packet_type = Some(packet_type);
		self
	}

	pub fn with_limit(mut self, limit: usize) -> Self {
		self.limit = limit;
		self
	}

	/// The in-memory part of the filter.
	pub fn matches(&self, packet: &RollappPacket) -> bool {
		self.packet_type
			.map_or(true, |packet_type| packet.packet_type == packet_type)
	}
}

fn rollapp_prefix(status: PacketStatus, rollapp_id: &str) -> Vec<u8> {
	let mut prefix = status.key_prefix().to_vec();
	prefix.push(b'/');
	prefix.extend_from_slice(rollapp_id.as_bytes());
	prefix.push(b'/');
	prefix
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn by_rollapp_covers_all_statuses() {
		let filter = PacketListFilter::by_rollapp("testRollappID1");
		assert_eq!(
			filter.prefixes,
			vec![
				PrefixRange {
					start: b"\x00\x01/testRollappID1/".to_vec(),
					end: None,
				},
				PrefixRange {
					start: b"\x00\x02/testRollappID1/".to_vec(),
					end: None,
				},
				PrefixRange {
					start: b"\x00\x03/testRollappID1/".to_vec(),
					end: None,
				},
			],
		);
	}

	#[test]
	fn by_rollapp_by_status_keeps_only_requested_statuses() {
		let filter = PacketListFilter::by_rollapp_by_status(
			"testRollappID1",
			&[PacketStatus::Pending, PacketStatus::Finalized],
		);
		assert_eq!(filter.prefixes.len(), 2);
		assert_eq!(filter.prefixes[0].start, b"\x00\x01/testRollappID1/".to_vec());
		assert_eq!(filter.prefixes[1].start, b"\x00\x02/testRollappID1/".to_vec());
	}

	#[test]
	fn by_status_has_no_rollapp_segment() {
		let filter = PacketListFilter::by_status(&[PacketStatus::Reverted]);
		assert_eq!(
			filter.prefixes,
			vec![PrefixRange {
				start: b"\x00\x03/".to_vec(),
				end: None,
			}],
		);
	}

	#[test]
	fn pending_by_max_height_bounds_the_range() {
		let filter = PacketListFilter::pending_by_rollapp_by_max_height("testRollappID1", 100);
		assert_eq!(
			filter.prefixes,
			vec![PrefixRange {
				start: b"\x00\x01/testRollappID1/".to_vec(),
				end: Some(b"\x00\x01/testRollappID1/00000000000000000101".to_vec()),
			}],
		);
	}

	#[test]
	fn max_height_bound_is_inclusive() {
		use hub_types::packet::packet_key;
		let filter = PacketListFilter::pending_by_rollapp_by_max_height("ra", 100);
		let range = &filter.prefixes[0];
		let at_bound = packet_key(PacketStatus::Pending, "ra", 100, "channel-0", 1);
		let above_bound = packet_key(PacketStatus::Pending, "ra", 101, "channel-0", 1);
		let end = range.end.as_ref().unwrap();
		assert!(at_bound.starts_with(&range.start) && at_bound < *end);
		assert!(above_bound >= *end);
	}
}
