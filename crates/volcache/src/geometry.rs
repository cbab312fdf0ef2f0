//! Pure chapter/page layout arithmetic. No I/O, no locking; every operation
//! here is infallible constant-time arithmetic.

use crate::error::{Error, Result};

/// A physical page number: page 0 is the volume header, pages `>= 1` are
/// grouped into `chapters_per_volume` chapters of `pages_per_chapter` pages
/// each.
pub type PhysicalPage = u32;

/// A physical chapter index, in `0..chapters_per_volume`.
pub type PhysicalChapter = u32;

/// A page number within a chapter, in `0..pages_per_chapter`.
pub type ChapterPage = u32;

/// A monotonically increasing logical chapter identifier.
pub type VirtualChapter = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
	pub bytes_per_page: usize,
	pub chapters_per_volume: u32,
	pub index_pages_per_chapter: u32,
	pub record_pages_per_chapter: u32,
	pub records_per_page: u32,
}

impl Geometry {
	pub fn new(
		bytes_per_page: usize,
		chapters_per_volume: u32,
		index_pages_per_chapter: u32,
		record_pages_per_chapter: u32,
		records_per_page: u32,
	) -> Result<Self> {
		if chapters_per_volume == 0 {
			return Err(Error::InvalidArgument(
				"chapters_per_volume must be nonzero".into(),
			));
		}
		if index_pages_per_chapter == 0 || record_pages_per_chapter == 0 {
			return Err(Error::InvalidArgument(
				"a chapter needs at least one index page and one record page".into(),
			));
		}
		Ok(Self {
			bytes_per_page,
			chapters_per_volume,
			index_pages_per_chapter,
			record_pages_per_chapter,
			records_per_page,
		})
	}

	#[inline]
	pub fn pages_per_chapter(&self) -> u32 {
		self.index_pages_per_chapter + self.record_pages_per_chapter
	}

	#[inline]
	pub fn total_pages(&self) -> u64 {
		1 + u64::from(self.chapters_per_volume) * u64::from(self.pages_per_chapter())
	}

	/// `physical = 1 + chapter*pages_per_chapter + page`.
	#[inline]
	pub fn map_to_physical(&self, chapter: PhysicalChapter, page: ChapterPage) -> PhysicalPage {
		1 + chapter * self.pages_per_chapter() + page
	}

	/// Inverse of [`Self::map_to_physical`]; panics on the header page (0),
	/// matching the precondition that callers never ask for chapter/page
	/// arithmetic on page 0 (it belongs to the header module).
	#[inline]
	pub fn map_to_chapter(&self, phys: PhysicalPage) -> PhysicalChapter {
		debug_assert!(phys >= 1, "page 0 is the volume header, not a chapter page");
		(phys - 1) / self.pages_per_chapter()
	}

	#[inline]
	pub fn map_to_page(&self, phys: PhysicalPage) -> ChapterPage {
		debug_assert!(phys >= 1, "page 0 is the volume header, not a chapter page");
		(phys - 1) % self.pages_per_chapter()
	}

	#[inline]
	pub fn is_record_page(&self, phys: PhysicalPage) -> bool {
		self.map_to_page(phys) >= self.index_pages_per_chapter
	}

	/// `chapter = vcn mod chapters_per_volume`.
	#[inline]
	pub fn map_to_physical_chapter(&self, vcn: VirtualChapter) -> PhysicalChapter {
		(vcn % u64::from(self.chapters_per_volume)) as u32
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn geo() -> Geometry {
		Geometry::new(4096, 8, 4, 4, 16).unwrap()
	}

	#[test]
	fn maps_chapter_zero_index_pages() {
		let g = geo();
		assert_eq!(g.map_to_physical(0, 0), 1);
		assert_eq!(g.map_to_physical(0, 3), 4);
		assert!(!g.is_record_page(g.map_to_physical(0, 0)));
		assert!(!g.is_record_page(g.map_to_physical(0, 3)));
	}

	#[test]
	fn maps_chapter_zero_record_pages() {
		let g = geo();
		let phys = g.map_to_physical(0, 4);
		assert!(g.is_record_page(phys));
		assert_eq!(g.map_to_chapter(phys), 0);
		assert_eq!(g.map_to_page(phys), 4);
	}

	#[test]
	fn maps_later_chapters() {
		let g = geo();
		let phys = g.map_to_physical(3, 5);
		assert_eq!(g.map_to_chapter(phys), 3);
		assert_eq!(g.map_to_page(phys), 5);
	}

	#[test]
	fn physical_chapter_wraps_virtual_chapter() {
		let g = geo();
		assert_eq!(g.map_to_physical_chapter(0), 0);
		assert_eq!(g.map_to_physical_chapter(8), 0);
		assert_eq!(g.map_to_physical_chapter(9), 1);
	}

	#[test]
	fn round_trips_every_page_in_a_chapter() {
		let g = geo();
		for chapter in 0..g.chapters_per_volume {
			for page in 0..g.pages_per_chapter() {
				let phys = g.map_to_physical(chapter, page);
				assert_eq!(g.map_to_chapter(phys), chapter);
				assert_eq!(g.map_to_page(phys), page);
			}
		}
	}
}
