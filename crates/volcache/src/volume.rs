//! `VolumeCore`: the public façade tying `Geometry`,
//! `VolumeStore`, `IndexPageMap`, `PageCache`, and `ReaderPool` together
//! into `search`, `write_chapter`, and `forget_chapter`.
//!
//! Grounded on the teacher's top-level `PageCache`/`Storage` composition in
//! `crates/beedb_hive/src/page_store/mod.rs`: one struct that owns the
//! lower-level pieces and exposes a small synchronous API, backed by a
//! `parking_lot::Mutex` reader lock for the slow paths (`get_page`,
//! `write_chapter`, `forget_chapter`) while `search`'s fast path stays
//! lock-free.

use std::sync::Arc;

use log::warn;
use parking_lot::Mutex;

use crate::{
	cache::{replacer::ProbeType, PageCache},
	config::{LookupMode, VolumeConfig},
	delta_index::{self, DeltaListEntry, Name},
	error::{Error, Result},
	geometry::{Geometry, PhysicalPage, VirtualChapter},
	index_page_map::{IndexPageMap, ListBounds},
	reader_pool::ReaderPool,
	record_page,
	store::VolumeStoreApi,
};

/// Found/not-found outcome of [`VolumeCore::search`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchResult {
	Found(record_page::Metadata),
	NotFound,
}

/// The reader mutex: serializes the slow path (queueing a
/// read, donating a written page, invalidating a chapter) without blocking
/// `search`'s lock-free cache hits.
struct ReaderState {
	nonce: u64,
}

pub(crate) struct VolumeCore {
	geometry: Geometry,
	store: Arc<dyn VolumeStoreApi>,
	index_page_map: Arc<IndexPageMap>,
	cache: Arc<PageCache>,
	reader_pool: ReaderPool,
	reader_mutex: Mutex<ReaderState>,
	lookup_mode: LookupMode,
}

impl VolumeCore {
	pub fn new(
		config: VolumeConfig,
		geometry: Geometry,
		store: Arc<dyn VolumeStoreApi>,
		nonce: u64,
	) -> Result<Self> {
		config.validate()?;
		let cache_slots = config.page_cache.cache_chapters * geometry.pages_per_chapter() as usize;
		let cache = Arc::new(PageCache::new(
			cache_slots,
			geometry.bytes_per_page,
			config.zone_count,
			config.reader_pool.read_queue_max_size,
		));
		let index_page_map = Arc::new(IndexPageMap::new());
		let reader_pool = ReaderPool::start(
			config.reader_pool.read_threads,
			Arc::clone(&cache),
			Arc::clone(&store),
			geometry,
			Arc::clone(&index_page_map),
			nonce,
		);

		Ok(Self {
			geometry,
			store,
			index_page_map,
			cache,
			reader_pool,
			reader_mutex: Mutex::new(ReaderState { nonce }),
			lookup_mode: config.lookup_mode,
		})
	}

	pub fn busy_readers(&self) -> usize {
		self.reader_pool.busy_readers()
	}

	/// Maps `name` to a physical chapter, consults the
	/// index page map to pick the right index page, searches it for the
	/// record page, then searches that record page for `name`.
	pub fn search(&self, name: &Name, virtual_chapter: VirtualChapter, total_lists: u32, zone: usize) -> Result<SearchResult> {
		let chapter = self.geometry.map_to_physical_chapter(virtual_chapter);
		let list_number = delta_index::list_number_for_name(name, total_lists);

		let Some(index_page) = self.index_page_map.find_page_for_list(chapter, list_number) else {
			return Ok(SearchResult::NotFound);
		};
		let phys_index = self.geometry.map_to_physical(chapter, index_page);

		let record_page_number = {
			let buf = self.get_page_protected(phys_index, zone)?;
			let parsed = match delta_index::initialize_chapter_index_page(buf.bytes(), &self.geometry, self.nonce()) {
				Ok(parsed) => parsed,
				Err(err) => return self.corrupt_or_rethrow(err),
			};
			delta_index::search_chapter_index_page(&parsed, name)
		};

		let Some(record_page_number) = record_page_number else {
			return Ok(SearchResult::NotFound);
		};
		let phys_record = self.geometry.map_to_physical(chapter, self.geometry.index_pages_per_chapter + record_page_number);

		let buf = self.get_page_protected(phys_record, zone)?;
		match record_page::search_record_page(buf.bytes(), name) {
			Some(metadata) => Ok(SearchResult::Found(metadata)),
			None => Ok(SearchResult::NotFound),
		}
	}

	fn corrupt_or_rethrow(&self, err: Error) -> Result<SearchResult> {
		match self.lookup_mode {
			LookupMode::Normal => Err(err),
			LookupMode::Rebuild => Ok(SearchResult::NotFound),
		}
	}

	/// The checksum nonce parsed pages are validated against. Exposed to
	/// `boundary::probe`, which parses index pages outside of `search`'s
	/// own parsing path but needs the same seed.
	pub(crate) fn nonce(&self) -> u64 {
		self.reader_mutex.lock().nonce
	}

	/// The lock-free fast path, falling back to the reader mutex and an
	/// enqueued read on a miss.
	fn get_page_protected(&self, phys: PhysicalPage, zone: usize) -> Result<OwnedPage> {
		if let Some((_guard, bytes)) = self.cache.get_page_from_cache(phys, zone) {
			if zone == 0 {
				self.cache.make_page_most_recent(phys);
			}
			return Ok(OwnedPage(bytes.to_vec()));
		}

		loop {
			let state = self.reader_mutex.lock();
			if let Some((_guard, bytes)) = self.cache.get_page_from_cache(phys, zone) {
				return Ok(OwnedPage(bytes.to_vec()));
			}

			if let Some(existing) = self.cache.read_queue().find_in_flight(phys) {
				drop(state);
				self.cache.read_queue().wait_for_fill(existing);
				continue;
			}

			match self.cache.read_queue().reserve(phys) {
				Some(index) => {
					drop(state);
					self.cache.read_queue().wait_for_fill(index);
					continue;
				}
				None => return Err(Error::QueuesFull),
			}
		}
	}

	/// The synchronous path used by the boundary probe. Holds the reader
	/// mutex for the whole operation, so no pending-search bookkeeping is
	/// needed.
	pub fn get_page(&self, phys: PhysicalPage) -> Result<OwnedPage> {
		let _state = self.reader_mutex.lock();
		if let Some((_guard, bytes)) = self.cache.get_page_from_cache(phys, 0) {
			return Ok(OwnedPage(bytes.to_vec()));
		}

		let mut buf = vec![0u8; self.geometry.bytes_per_page];
		self.store.read_page(phys, &mut buf)?;

		let Some(slot) = self.cache.select_victim(|p| self.geometry.is_record_page(p), ProbeType::IndexFirst) else {
			return Err(Error::QueuesFull);
		};
		self.cache.put_page(slot, phys, &buf);
		Ok(OwnedPage(buf))
	}

	/// Packs and writes every index page, then every record page of
	/// `chapter`, updating the index page map and donating freshly-written
	/// index pages directly into the cache.
	pub fn write_chapter(&self, virtual_chapter: VirtualChapter, open_lists: &[DeltaListEntry], mut records: Vec<record_page::ChunkRecord>) -> Result<()> {
		let chapter = self.geometry.map_to_physical_chapter(virtual_chapter);
		let state = self.reader_mutex.lock();
		let nonce = state.nonce;

		self.cache.invalidate_pages(self.chapter_physical_pages(chapter));
		self.cache
			.read_queue()
			.invalidate_matching(|p| self.geometry.map_to_chapter(p) == chapter);

		let mut start_list = open_lists.iter().map(|e| e.list_number).min().unwrap_or(0);
		let mut bounds = Vec::with_capacity(self.geometry.index_pages_per_chapter as usize);
		for index_page in 0..self.geometry.index_pages_per_chapter {
			let last_page = index_page + 1 == self.geometry.index_pages_per_chapter;
			let mut buf = vec![0u8; self.geometry.bytes_per_page];
			let (_lists_packed, highest) = delta_index::pack_open_chapter_index_page(
				open_lists,
				&mut buf,
				start_list,
				last_page,
				&self.geometry,
				virtual_chapter,
				nonce,
			)?;
			let phys = self.geometry.map_to_physical(chapter, index_page);
			self.store.write_page(phys, &buf)?;

			bounds.push(ListBounds {
				lowest_list: start_list,
				highest_list: highest,
			});

			if let Some(slot) = self.cache.select_victim(|p| self.geometry.is_record_page(p), ProbeType::RecordFirst) {
				self.cache.donate_page(slot, phys, &buf);
			}

			start_list = highest + 1;
		}
		self.index_page_map.set_chapter(chapter, &bounds);

		records.sort_unstable_by_key(|r| r.name);
		let records_per_page = self.geometry.records_per_page as usize;
		for (page_index, chunk_start) in (0..records.len()).step_by(records_per_page.max(1)).enumerate() {
			if page_index as u32 >= self.geometry.record_pages_per_chapter {
				warn!("chapter {virtual_chapter} has more records than record_pages_per_chapter can hold; truncating");
				break;
			}
			let chunk_end = (chunk_start + records_per_page).min(records.len());
			let mut buf = vec![0u8; self.geometry.bytes_per_page];
			record_page::encode_record_page(&mut records[chunk_start..chunk_end], &mut buf);
			let phys = self.geometry.map_to_physical(chapter, self.geometry.index_pages_per_chapter + page_index as u32);
			self.store.write_page(phys, &buf)?;
		}

		self.store.sync()
	}

	pub fn forget_chapter(&self, chapter: u32) {
		let _state = self.reader_mutex.lock();
		self.cache.invalidate_pages(self.chapter_physical_pages(chapter));
		self.cache
			.read_queue()
			.invalidate_matching(|p| self.geometry.map_to_chapter(p) == chapter);
		self.index_page_map.forget_chapter(chapter);
	}

	fn chapter_physical_pages(&self, chapter: u32) -> impl Iterator<Item = PhysicalPage> + '_ {
		(0..self.geometry.pages_per_chapter()).map(move |page| self.geometry.map_to_physical(chapter, page))
	}
}

/// An owned copy of a page's bytes, decoupled from the cache slot's
/// lifetime so callers aren't forced to hold a pending-search guard for the
/// whole duration of index-page parsing. Cheap relative to the disk read
/// that would otherwise be repeated on a cache miss.
pub(crate) struct OwnedPage(Vec<u8>);

impl OwnedPage {
	fn bytes(&self) -> &[u8] {
		&self.0
	}
}
