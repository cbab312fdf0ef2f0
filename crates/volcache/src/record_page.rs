//! A simplified stand-in for the record encoder, an external collaborator
//! whose real on-disk record layout and radix sort are out of scope here.
//! Record pages are searched directly over the raw buffer, never through a
//! parsed view.

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::delta_index::Name;

pub type Metadata = [u8; 16];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkRecord {
	pub name: Name,
	pub metadata: Metadata,
}

#[derive(Debug, Immutable, KnownLayout, FromBytes, IntoBytes, Clone, Copy)]
#[repr(C, packed)]
struct RecordRepr {
	name: Name,
	metadata: Metadata,
}

const RECORD_SIZE: usize = std::mem::size_of::<RecordRepr>();
/// A leading record count, so a search never has to guess where the packed
/// prefix ends by inspecting record contents (an all-zero name is a
/// legitimate fingerprint, not reliably distinguishable from padding).
const COUNT_PREFIX_SIZE: usize = std::mem::size_of::<u32>();

/// Sorts `records` by name and packs them contiguously into `buf`, behind a
/// 4-byte record count. Returns the number of records actually packed,
/// which the caller (`VolumeCore`) must not exceed `geometry.records_per_page`.
pub(crate) fn encode_record_page(records: &mut [ChunkRecord], buf: &mut [u8]) -> usize {
	records.sort_unstable_by_key(|r| r.name);

	let capacity = (buf.len() - COUNT_PREFIX_SIZE) / RECORD_SIZE;
	let count = records.len().min(capacity);
	buf[..COUNT_PREFIX_SIZE].copy_from_slice(&(count as u32).to_le_bytes());
	for (i, record) in records[..count].iter().enumerate() {
		let repr = RecordRepr {
			name: record.name,
			metadata: record.metadata,
		};
		let offset = COUNT_PREFIX_SIZE + i * RECORD_SIZE;
		buf[offset..offset + RECORD_SIZE].copy_from_slice(repr.as_bytes());
	}
	for byte in &mut buf[COUNT_PREFIX_SIZE + count * RECORD_SIZE..] {
		*byte = 0;
	}
	count
}

/// Binary-searches a raw record page for `name`, returning its metadata if
/// present.
pub(crate) fn search_record_page(buf: &[u8], name: &Name) -> Option<Metadata> {
	if buf.len() < COUNT_PREFIX_SIZE {
		return None;
	}
	let num_records = u32::from_le_bytes(buf[..COUNT_PREFIX_SIZE].try_into().ok()?) as usize;
	let mut low = 0usize;
	let mut high = num_records;
	while low < high {
		let mid = low + (high - low) / 2;
		let offset = COUNT_PREFIX_SIZE + mid * RECORD_SIZE;
		let repr = RecordRepr::ref_from_bytes(buf.get(offset..offset + RECORD_SIZE)?).ok()?;
		match repr.name.cmp(name) {
			std::cmp::Ordering::Equal => return Some(repr.metadata),
			std::cmp::Ordering::Less => low = mid + 1,
			std::cmp::Ordering::Greater => high = mid,
		}
	}
	None
}

#[cfg(test)]
mod tests {
	use super::*;

	fn record(byte: u8) -> ChunkRecord {
		ChunkRecord {
			name: [byte; 16],
			metadata: [byte.wrapping_add(1); 16],
		}
	}

	#[test]
	fn encode_then_search_round_trips_any_permutation() {
		let mut records = vec![record(5), record(1), record(9), record(3)];
		let mut buf = vec![0u8; 4096];
		let packed = encode_record_page(&mut records, &mut buf);
		assert_eq!(packed, 4);

		for byte in [1, 3, 5, 9] {
			assert_eq!(search_record_page(&buf, &[byte; 16]), Some([byte.wrapping_add(1); 16]));
		}
		assert_eq!(search_record_page(&buf, &[200; 16]), None);
	}

	#[test]
	fn empty_page_finds_nothing() {
		let buf = vec![0u8; 4096];
		assert_eq!(search_record_page(&buf, &[1; 16]), None);
	}
}
