//! A simplified stand-in for the delta-index codec, an external
//! collaborator whose real bit-level delta-compressed layout is out of
//! scope here. This module implements the same *interface*
//! (`initialize_chapter_index_page`, `search_chapter_index_page`,
//! `validate_chapter_index_page`, `pack_open_chapter_index_page`) over a
//! plain sorted array, so the rest of the crate can be exercised honestly.
//!
//! Grounded on the packed zerocopy header pattern in the teacher's
//! `files/generic.rs` (`GenericHeaderRepr`) and `page_store/cache.rs`
//! (`BufferedPageHeader`).

use crc::Crc;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::{
	error::{Error, Result},
	geometry::{Geometry, VirtualChapter},
};

pub(crate) const CRC32: Crc<u32> = Crc::<u32>::new(&crc::CRC_32_ISO_HDLC);

/// A chunk fingerprint. Hashing itself is an external collaborator; this is
/// just the fixed-width byte shape it is stored as.
pub type Name = [u8; 16];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct DeltaListEntry {
	pub list_number: u32,
	pub name: Name,
	pub record_page: u32,
}

#[derive(Debug, Immutable, KnownLayout, FromBytes, IntoBytes, Clone, Copy)]
#[repr(C, packed)]
struct IndexPageHeader {
	virtual_chapter: u64,
	nonce: u64,
	lowest_list: u32,
	highest_list: u32,
	entry_count: u32,
	checksum: u32,
}

#[derive(Debug, Immutable, KnownLayout, FromBytes, IntoBytes, Clone, Copy)]
#[repr(C, packed)]
struct EntryRepr {
	list_number: u32,
	name: Name,
	record_page: u32,
}

const HEADER_SIZE: usize = std::mem::size_of::<IndexPageHeader>();
const ENTRY_SIZE: usize = std::mem::size_of::<EntryRepr>();

/// The parsed view of an index page, valid only for index pages.
#[derive(Debug, Clone)]
pub(crate) struct ParsedIndexPage {
	pub virtual_chapter: VirtualChapter,
	pub lowest_list: u32,
	pub highest_list: u32,
	entries: Vec<DeltaListEntry>,
}

impl ParsedIndexPage {
	pub fn lowest_list(&self) -> u32 {
		self.lowest_list
	}

	pub fn highest_list(&self) -> u32 {
		self.highest_list
	}
}

fn list_capacity(geometry: &Geometry) -> usize {
	(geometry.bytes_per_page - HEADER_SIZE) / ENTRY_SIZE
}

/// Deterministically assigns a chunk name to a delta-list number. The real
/// system derives this from the chunk-name hash; a simple byte fold is
/// sufficient here since the codec's job is only to honor the interface.
pub(crate) fn list_number_for_name(name: &Name, total_lists: u32) -> u32 {
	if total_lists == 0 {
		return 0;
	}
	let folded = name.iter().fold(0u64, |acc, b| acc.wrapping_mul(31).wrapping_add(u64::from(*b)));
	(folded % u64::from(total_lists)) as u32
}

/// Parses and checksum-validates an index page freshly read from the
/// backing store. `nonce` is a volume-wide value mixed into the checksum so
/// that a page from a different volume instance is reliably rejected.
pub(crate) fn initialize_chapter_index_page(
	buf: &[u8],
	geometry: &Geometry,
	nonce: u64,
) -> Result<ParsedIndexPage> {
	if buf.len() < HEADER_SIZE {
		return Err(Error::CorruptData("index page shorter than header".into()));
	}
	let header = IndexPageHeader::ref_from_bytes(&buf[..HEADER_SIZE])
		.map_err(|_| Error::CorruptData("index page header misaligned".into()))?;
	let entry_count = header.entry_count as usize;
	let capacity = list_capacity(geometry);
	if entry_count > capacity {
		return Err(Error::CorruptData(format!(
			"index page claims {entry_count} entries but page only holds {capacity}"
		)));
	}

	let entries_end = HEADER_SIZE + entry_count * ENTRY_SIZE;
	if buf.len() < entries_end {
		return Err(Error::CorruptData("index page truncated".into()));
	}

	let expected_checksum = checksum(nonce, &buf[HEADER_SIZE..entries_end]);
	if header.checksum != expected_checksum {
		return Err(Error::CorruptData("index page checksum mismatch".into()));
	}

	let mut entries = Vec::with_capacity(entry_count);
	for chunk in buf[HEADER_SIZE..entries_end].chunks_exact(ENTRY_SIZE) {
		let repr = EntryRepr::ref_from_bytes(chunk)
			.map_err(|_| Error::CorruptData("index entry misaligned".into()))?;
		entries.push(DeltaListEntry {
			list_number: repr.list_number,
			name: repr.name,
			record_page: repr.record_page,
		});
	}

	Ok(ParsedIndexPage {
		virtual_chapter: header.virtual_chapter,
		lowest_list: header.lowest_list,
		highest_list: header.highest_list,
		entries,
	})
}

fn checksum(nonce: u64, entry_bytes: &[u8]) -> u32 {
	let mut digest = CRC32.digest();
	digest.update(&nonce.to_le_bytes());
	digest.update(entry_bytes);
	digest.finalize()
}

/// Cross-checks the page's own declared bounds against what the
/// `IndexPageMap` expects. Independent of parsing, so the boundary probe
/// can also call it on a page whose header parsed fine but whose content
/// might still be semantically wrong.
pub(crate) fn validate_chapter_index_page(
	parsed: &ParsedIndexPage,
	expected_lowest: u32,
	expected_highest: u32,
) -> Result<()> {
	if parsed.lowest_list != expected_lowest || parsed.highest_list != expected_highest {
		return Err(Error::CorruptData(format!(
			"index page list bounds [{}, {}] disagree with index page map [{expected_lowest}, {expected_highest}]",
			parsed.lowest_list, parsed.highest_list
		)));
	}
	if parsed.lowest_list > parsed.highest_list {
		return Err(Error::CorruptData("index page has inverted list bounds".into()));
	}
	for entry in &parsed.entries {
		if entry.list_number < parsed.lowest_list || entry.list_number > parsed.highest_list {
			return Err(Error::CorruptData("index entry outside page's list range".into()));
		}
	}
	Ok(())
}

/// Searches the page for `name`'s delta list, returning the record page it
/// points to, or `None` if the page has no entry for it.
pub(crate) fn search_chapter_index_page(parsed: &ParsedIndexPage, name: &Name) -> Option<u32> {
	parsed
		.entries
		.iter()
		.find(|entry| &entry.name == name)
		.map(|entry| entry.record_page)
}

/// Packs as many entries as fit (in list-number order, starting from
/// `start_list`) into `buf`. Returns the number of distinct delta lists
/// packed. If `last_page` is true, every remaining entry must fit;
/// `lists_packed == 0` on a *non*-last page is left to the caller to log as
/// a warning rather than treated as an error here.
pub(crate) fn pack_open_chapter_index_page(
	open: &[DeltaListEntry],
	buf: &mut [u8],
	start_list: u32,
	last_page: bool,
	geometry: &Geometry,
	virtual_chapter: VirtualChapter,
	nonce: u64,
) -> Result<(u32, u32)> {
	let capacity = list_capacity(geometry);
	let remaining: Vec<&DeltaListEntry> = open
		.iter()
		.filter(|entry| entry.list_number >= start_list)
		.collect();

	let to_pack: Vec<&DeltaListEntry> = if remaining.len() <= capacity {
		remaining.clone()
	} else if last_page {
		return Err(Error::InvalidArgument(
			"last index page cannot hold all remaining delta lists".into(),
		));
	} else {
		remaining[..capacity].to_vec()
	};

	let lowest_list = to_pack.first().map(|e| e.list_number).unwrap_or(start_list);
	let highest_list = to_pack.last().map(|e| e.list_number).unwrap_or(start_list);
	let distinct_lists = to_pack
		.iter()
		.map(|e| e.list_number)
		.collect::<std::collections::BTreeSet<_>>()
		.len() as u32;

	let entries_end = HEADER_SIZE + to_pack.len() * ENTRY_SIZE;
	if buf.len() < entries_end {
		return Err(Error::InvalidArgument("page buffer too small for packed entries".into()));
	}

	for (i, entry) in to_pack.iter().enumerate() {
		let repr = EntryRepr {
			list_number: entry.list_number,
			name: entry.name,
			record_page: entry.record_page,
		};
		let offset = HEADER_SIZE + i * ENTRY_SIZE;
		buf[offset..offset + ENTRY_SIZE].copy_from_slice(repr.as_bytes());
	}
	for byte in &mut buf[entries_end..] {
		*byte = 0;
	}

	let header = IndexPageHeader {
		virtual_chapter,
		nonce,
		lowest_list,
		highest_list,
		entry_count: to_pack.len() as u32,
		checksum: checksum(nonce, &buf[HEADER_SIZE..entries_end]),
	};
	buf[..HEADER_SIZE].copy_from_slice(header.as_bytes());

	Ok((distinct_lists, highest_list))
}

#[cfg(test)]
mod tests {
	use super::*;

	fn geo() -> Geometry {
		Geometry::new(4096, 8, 4, 4, 16).unwrap()
	}

	fn name(byte: u8) -> Name {
		[byte; 16]
	}

	#[test]
	fn pack_then_search_round_trips() {
		let geo = geo();
		let entries = vec![
			DeltaListEntry { list_number: 0, name: name(1), record_page: 7 },
			DeltaListEntry { list_number: 0, name: name(2), record_page: 9 },
			DeltaListEntry { list_number: 1, name: name(3), record_page: 11 },
		];
		let mut buf = vec![0u8; geo.bytes_per_page];
		let (lists_packed, highest) =
			pack_open_chapter_index_page(&entries, &mut buf, 0, true, &geo, 5, 42).unwrap();
		assert_eq!(lists_packed, 2);
		assert_eq!(highest, 1);

		let parsed = initialize_chapter_index_page(&buf, &geo, 42).unwrap();
		assert_eq!(parsed.virtual_chapter, 5);
		assert_eq!(search_chapter_index_page(&parsed, &name(1)), Some(7));
		assert_eq!(search_chapter_index_page(&parsed, &name(3)), Some(11));
		assert_eq!(search_chapter_index_page(&parsed, &name(99)), None);
	}

	#[test]
	fn checksum_mismatch_is_detected() {
		let geo = geo();
		let entries = vec![DeltaListEntry { list_number: 0, name: name(1), record_page: 7 }];
		let mut buf = vec![0u8; geo.bytes_per_page];
		pack_open_chapter_index_page(&entries, &mut buf, 0, true, &geo, 5, 42).unwrap();

		// Corrupt a byte in the entry region.
		buf[HEADER_SIZE] ^= 0xFF;

		let err = initialize_chapter_index_page(&buf, &geo, 42).unwrap_err();
		assert!(matches!(err, Error::CorruptData(_)));
	}

	#[test]
	fn validate_rejects_bounds_mismatch() {
		let geo = geo();
		let entries = vec![DeltaListEntry { list_number: 0, name: name(1), record_page: 7 }];
		let mut buf = vec![0u8; geo.bytes_per_page];
		pack_open_chapter_index_page(&entries, &mut buf, 0, true, &geo, 5, 42).unwrap();
		let parsed = initialize_chapter_index_page(&buf, &geo, 42).unwrap();

		assert!(validate_chapter_index_page(&parsed, 0, 0).is_ok());
		assert!(validate_chapter_index_page(&parsed, 1, 1).is_err());
	}
}
