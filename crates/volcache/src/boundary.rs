//! Recovers the live span of virtual chapters on open, tolerating a single
//! contiguous run of corrupt or unflushed chapters bounded by
//! `max_bad_chapters`.
//!
//! Grounded on the teacher's checksum/header-validation style in
//! `acorn/src/disk/segment.rs`'s `SegmentFile::load` (treat a structurally
//! wrong page as a typed error, not a panic) generalized to a binary-search
//! recovery algorithm with no direct analogue in the teacher (its recovery
//! is WAL replay, not a circular-chapter probe).

use crate::{
	delta_index,
	error::{Error, Result},
	geometry::{Geometry, PhysicalChapter, VirtualChapter},
	volume::VolumeCore,
};

/// A VCN sentinel that sits above every real virtual chapter number, so a
/// failed probe counts as "still increasing" during the binary search.
const BAD_PROBE: VirtualChapter = VirtualChapter::MAX;

/// Reads every index page of `chapter`, checks that they all report the
/// same virtual chapter number and that their list ranges are contiguous,
/// and checks that `chapter == vcn mod chapters_per_volume`.
pub(crate) fn probe(core: &VolumeCore, geometry: &Geometry, chapter: PhysicalChapter) -> Result<VirtualChapter> {
	let mut vcn = None;
	let mut next_expected_lowest = None;

	for index_page in 0..geometry.index_pages_per_chapter {
		let phys = geometry.map_to_physical(chapter, index_page);
		let buf = core.get_page(phys)?;
		let parsed = delta_index::initialize_chapter_index_page(buf.bytes(), geometry, core.nonce())?;

		match vcn {
			None => vcn = Some(parsed.virtual_chapter),
			Some(expected) if expected != parsed.virtual_chapter => {
				return Err(Error::CorruptComponent(format!(
					"chapter {chapter} has inconsistent virtual chapter numbers across its index pages"
				)));
			}
			_ => {}
		}

		if let Some(expected_lowest) = next_expected_lowest {
			if parsed.lowest_list() != expected_lowest {
				return Err(Error::CorruptComponent(format!(
					"chapter {chapter} index page {index_page} list range is not contiguous with the previous page"
				)));
			}
		}
		next_expected_lowest = Some(parsed.highest_list() + 1);
	}

	let vcn = vcn.ok_or_else(|| Error::CorruptComponent(format!("chapter {chapter} has no index pages")))?;
	if geometry.map_to_physical_chapter(vcn) != chapter {
		return Err(Error::CorruptComponent(format!(
			"chapter {chapter} holds a virtual chapter number that doesn't map back to it"
		)));
	}
	Ok(vcn)
}

/// An exponential-then-bisecting scan from the tail downward for the last
/// chapter that probes cleanly, tolerating an unknown-size run of
/// corruption at the tail of the ring.
pub(crate) fn find_real_end_of_volume(core: &VolumeCore, geometry: &Geometry) -> Result<PhysicalChapter> {
	let total = geometry.chapters_per_volume;
	let tail = total - 1;
	if probe(core, geometry, tail).is_ok() {
		return Ok(tail);
	}

	let mut step = 1u32;
	let mut last_bad = tail;

	loop {
		let candidate = last_bad.saturating_sub(step);
		if probe(core, geometry, candidate).is_ok() {
			break;
		}
		if candidate == 0 {
			return Err(Error::CorruptComponent("no chapter in the volume probes cleanly".into()));
		}
		last_bad = candidate;
		step = step.saturating_mul(2).min(total - 1).max(1);
	}

	let mut low = last_bad.saturating_sub(step);
	let mut high = last_bad;
	while low < high {
		let mid = low + (high - low) / 2;
		if probe(core, geometry, mid).is_ok() {
			high = mid;
		} else {
			low = mid + 1;
		}
	}
	Ok(low)
}

/// Assumes at most one contiguous run of bad chapters on the ring. Returns
/// `(lowest, highest, empty)` physical chapters bounding the live span;
/// `empty` is set when the volume has never been written (chapter 0 probes
/// as all-zero), in which case `lowest` and `highest` are both 0. Returns
/// `CorruptComponent` if the bad run exceeds `max_bad_chapters`.
pub(crate) fn find_volume_chapter_boundaries(
	core: &VolumeCore,
	geometry: &Geometry,
	max_bad_chapters: u32,
) -> Result<(PhysicalChapter, PhysicalChapter, bool)> {
	let first_vcn = match probe(core, geometry, 0) {
		Ok(vcn) => vcn,
		Err(_) => return Ok((0, 0, true)),
	};

	let chapter_limit = find_real_end_of_volume(core, geometry)? + 1;

	let probe_or_bad = |chapter: PhysicalChapter| -> VirtualChapter { probe(core, geometry, chapter).unwrap_or(BAD_PROBE) };

	let mut low = 0u32;
	let mut high = chapter_limit;
	while low < high {
		let mid = low + (high - low) / 2;
		let vcn = probe_or_bad(mid);
		if vcn >= first_vcn {
			low = mid + 1;
		} else {
			high = mid;
		}
	}
	let lowest_index = low % chapter_limit;

	let mut highest_index = lowest_index;
	let mut bad_run = 0u32;
	loop {
		let candidate = (highest_index + chapter_limit - 1) % chapter_limit;
		match probe(core, geometry, candidate) {
			Ok(_) => {
				highest_index = candidate;
				break;
			}
			Err(_) => {
				bad_run += 1;
				if bad_run > max_bad_chapters {
					return Err(Error::CorruptComponent(format!(
						"more than {max_bad_chapters} contiguous corrupt chapters found while scanning backward from chapter {lowest_index}"
					)));
				}
				highest_index = candidate;
				if highest_index == lowest_index {
					return Err(Error::CorruptComponent(
						"no chapter probes cleanly while scanning backward for the highest virtual chapter".into(),
					));
				}
			}
		}
	}

	Ok((lowest_index, highest_index, false))
}
