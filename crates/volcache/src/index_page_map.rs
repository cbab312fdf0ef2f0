//! The index page map: tracks, for each open chapter, which index page
//! holds which range of delta lists, so a search can jump straight to the
//! right page instead of scanning every index page in the chapter.
//!
//! Grounded on the teacher's `page_store::cache`'s use of a `RwLock`-guarded
//! `HashMap` for read-mostly metadata that's rewritten wholesale on a
//! chapter flip — the same access pattern this map has (many concurrent
//! readers during search, one writer per chapter close).

use std::collections::HashMap;

use parking_lot::RwLock;

use crate::geometry::{ChapterPage, PhysicalChapter};

/// The inclusive range of delta lists an index page holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ListBounds {
	pub lowest_list: u32,
	pub highest_list: u32,
}

impl ListBounds {
	pub fn contains(&self, list_number: u32) -> bool {
		(self.lowest_list..=self.highest_list).contains(&list_number)
	}
}

/// Maps `(physical_chapter, index_page)` to the list range that page holds.
/// Entries for a chapter are replaced wholesale when that chapter is
/// rewritten.
pub(crate) struct IndexPageMap {
	bounds: RwLock<HashMap<(PhysicalChapter, ChapterPage), ListBounds>>,
}

impl IndexPageMap {
	pub fn new() -> Self {
		Self {
			bounds: RwLock::new(HashMap::new()),
		}
	}

	/// Replaces every entry for `chapter` with `pages`, in index-page order,
	/// after a chapter write.
	pub fn set_chapter(&self, chapter: PhysicalChapter, pages: &[ListBounds]) {
		let mut bounds = self.bounds.write();
		bounds.retain(|&(c, _), _| c != chapter);
		for (page, &b) in pages.iter().enumerate() {
			bounds.insert((chapter, page as ChapterPage), b);
		}
	}

	pub fn bounds_of(&self, chapter: PhysicalChapter, page: ChapterPage) -> Option<ListBounds> {
		self.bounds.read().get(&(chapter, page)).copied()
	}

	/// Finds which index page in `chapter` holds `list_number`, scanning
	/// the chapter's known page bounds. Returns `None` if the chapter has
	/// no index pages recorded yet (not loaded/rebuilt).
	pub fn find_page_for_list(&self, chapter: PhysicalChapter, list_number: u32) -> Option<ChapterPage> {
		let bounds = self.bounds.read();
		bounds
			.iter()
			.filter(|(&(c, _), _)| c == chapter)
			.find(|(_, b)| b.contains(list_number))
			.map(|(&(_, page), _)| page)
	}

	pub fn forget_chapter(&self, chapter: PhysicalChapter) {
		self.bounds.write().retain(|&(c, _), _| c != chapter);
	}
}

impl Default for IndexPageMap {
	fn default() -> Self {
		Self::new()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn finds_page_holding_a_list() {
		let map = IndexPageMap::new();
		map.set_chapter(
			2,
			&[
				ListBounds { lowest_list: 0, highest_list: 9 },
				ListBounds { lowest_list: 10, highest_list: 19 },
			],
		);
		assert_eq!(map.find_page_for_list(2, 5), Some(0));
		assert_eq!(map.find_page_for_list(2, 15), Some(1));
		assert_eq!(map.find_page_for_list(2, 99), None);
	}

	#[test]
	fn set_chapter_replaces_prior_entries() {
		let map = IndexPageMap::new();
		map.set_chapter(1, &[ListBounds { lowest_list: 0, highest_list: 4 }]);
		map.set_chapter(1, &[ListBounds { lowest_list: 5, highest_list: 9 }]);
		assert_eq!(map.find_page_for_list(1, 2), None);
		assert_eq!(map.find_page_for_list(1, 7), Some(0));
	}

	#[test]
	fn forget_chapter_clears_its_entries() {
		let map = IndexPageMap::new();
		map.set_chapter(3, &[ListBounds { lowest_list: 0, highest_list: 9 }]);
		map.forget_chapter(3);
		assert_eq!(map.find_page_for_list(3, 5), None);
	}
}
