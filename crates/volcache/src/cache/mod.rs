//! The page cache: the central coordination point between concurrent zone
//! searches, the reader pool, and the backing store.
//!
//! Grounded on `crates/beedb_hive/src/page_store/cache.rs`'s `PageCache`,
//! which plays the same role (slot table + recency + in-flight reads) in
//! the teacher, generalized to replace its per-slot `RawRwLock` with the
//! lock-free pending-search protocol in `cache::pending` and its CAR
//! replacement policy with the plain LRU described in `cache::replacer`.

pub(crate) mod buffer;
pub(crate) mod pending;
pub(crate) mod queue;
pub(crate) mod replacer;

use std::collections::HashMap;

use parking_lot::Mutex;
use static_assertions::assert_impl_all;

use crate::geometry::PhysicalPage;
use buffer::PageBuffer;
use pending::{InvalidateCounter, PendingSearchGuard};
use queue::{QueueState, ReadQueue};
use replacer::{LruReplacer, ProbeType};

/// What a slot currently holds, distinct from the raw bytes in
/// `PageBuffer` so that `select_victim` can reason about occupancy without
/// touching the slot contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct SlotMeta {
	physical_page: Option<PhysicalPage>,
}

/// The cache's bookkeeping: slot occupancy, the physical-page -> slot index
/// map, and the recency order. Held behind a single mutex — only metadata
/// is protected here; slot *contents* are protected by the pending-search
/// protocol.
struct Bookkeeping {
	slots: Vec<SlotMeta>,
	by_page: HashMap<PhysicalPage, usize>,
	lru: LruReplacer,
}

pub(crate) struct PageCache {
	buffer: PageBuffer,
	meta: Mutex<Bookkeeping>,
	pending: Vec<InvalidateCounter>,
	queue: ReadQueue,
}

assert_impl_all!(PageCache: Send, Sync);

impl PageCache {
	pub fn new(num_slots: usize, bytes_per_page: usize, zone_count: usize, read_queue_max_size: usize) -> Self {
		Self {
			buffer: PageBuffer::new(num_slots, bytes_per_page),
			meta: Mutex::new(Bookkeeping {
				slots: vec![SlotMeta { physical_page: None }; num_slots],
				by_page: HashMap::new(),
				lru: LruReplacer::new(num_slots),
			}),
			pending: (0..zone_count).map(|_| InvalidateCounter::new()).collect(),
			queue: ReadQueue::new(read_queue_max_size),
		}
	}

	pub fn num_slots(&self) -> usize {
		self.buffer.num_slots()
	}

	pub fn read_queue(&self) -> &ReadQueue {
		&self.queue
	}

	/// The lock-free fast path: marks `zone`'s counter pending on
	/// `physical_page` before looking up its slot, so a concurrent
	/// `select_victim` on another zone can see the in-progress dereference
	/// as soon as it becomes possible to observe this page's slot at all.
	/// The guard must outlive any use of the returned slice.
	pub fn get_page_from_cache(
		&self,
		physical_page: PhysicalPage,
		zone: usize,
	) -> Option<(PendingSearchGuard<'_>, &[u8])> {
		let guard = PendingSearchGuard::begin(&self.pending[zone], physical_page);
		let slot = {
			let meta = self.meta.lock();
			*meta.by_page.get(&physical_page)?
		};
		// Safety: the slot is occupied by `physical_page` (checked above
		// under the metadata lock) and `select_victim` below refuses to
		// recycle any slot a pending-search guard references.
		let bytes = unsafe { self.buffer.slot(slot) };
		Some((guard, bytes))
	}

	/// Updates the recency order for `physical_page`. Only zone 0 may call
	/// this.
	pub fn make_page_most_recent(&self, physical_page: PhysicalPage) {
		let mut meta = self.meta.lock();
		if let Some(&slot) = meta.by_page.get(&physical_page) {
			meta.lru.touch(slot);
		}
	}

	/// Chooses a slot to recycle for a new page, skipping any slot whose
	/// physical page is currently pending search by any zone. `probe_type`
	/// biases the search toward the kind of page least likely to be wanted
	/// again immediately. A slot that has never held a page is always
	/// preferred over evicting one that has, since it isn't tracked in the
	/// recency order at all until first populated.
	///
	/// Unmaps the chosen victim's previous occupant from `by_page` and the
	/// recency order before returning, so the slot is no longer reachable
	/// through `get_page_from_cache` by the time the caller starts
	/// overwriting it. The pending counters live outside this lock, so a
	/// search can still begin on the old occupant in the gap between the
	/// candidate scan and the unmap; re-checked immediately after, and if
	/// one landed the unmap is rolled back and `None` is returned, forcing
	/// the caller to retry against a (by then) different candidate set.
	pub fn select_victim(&self, is_record_page: impl Fn(PhysicalPage) -> bool, probe_type: ProbeType) -> Option<usize> {
		let mut meta = self.meta.lock();
		if let Some(slot) = (0..meta.slots.len()).find(|&slot| meta.slots[slot].physical_page.is_none()) {
			return Some(slot);
		}

		let prefer_record = probe_type == ProbeType::IndexFirst;
		let candidates = meta.lru.candidates(|slot| {
			meta.slots[slot]
				.physical_page
				.is_some_and(|p| is_record_page(p) == prefer_record)
		});
		let slot = candidates.into_iter().find(|&slot| {
			let occupant = meta.slots[slot].physical_page;
			match occupant {
				None => true,
				Some(page) => !self.pending.iter().any(|c| c.pending_page() == Some(page)),
			}
		})?;

		let Some(victim_page) = meta.slots[slot].physical_page.take() else {
			return Some(slot);
		};
		meta.by_page.remove(&victim_page);
		meta.lru.remove(slot);
		if self.pending.iter().any(|c| c.pending_page() == Some(victim_page)) {
			meta.slots[slot].physical_page = Some(victim_page);
			meta.by_page.insert(victim_page, slot);
			meta.lru.touch(slot);
			return None;
		}
		Some(slot)
	}

	/// Writes `bytes` into `slot` and publishes it under `physical_page`.
	/// Only the reader pool, after reserving `slot` via `select_victim`,
	/// may call this.
	pub fn put_page(&self, slot: usize, physical_page: PhysicalPage, bytes: &[u8]) {
		// Safety: the caller reserved `slot` through `select_victim`, which
		// unmaps the slot's previous occupant from `by_page` before
		// returning it, so no concurrent `get_page_from_cache` can obtain a
		// reference into this slot by the time the write begins.
		unsafe { self.buffer.slot_mut(slot) }.copy_from_slice(bytes);

		let mut meta = self.meta.lock();
		if let Some(old_page) = meta.slots[slot].physical_page {
			meta.by_page.remove(&old_page);
		}
		meta.slots[slot].physical_page = Some(physical_page);
		meta.by_page.insert(physical_page, slot);
		meta.lru.touch(slot);
	}

	/// Donates a page the caller just wrote to disk directly into the
	/// cache, without a read round-trip. Identical to `put_page` except
	/// for its call site (`VolumeCore::write_chapter` rather than the
	/// reader pool).
	pub fn donate_page(&self, slot: usize, physical_page: PhysicalPage, bytes: &[u8]) {
		self.put_page(slot, physical_page, bytes);
	}

	/// Removes every cached page belonging to `chapter`, used when a
	/// chapter is about to be overwritten or forgotten.
	pub fn invalidate_pages(&self, physical_pages: impl Iterator<Item = PhysicalPage>) {
		let mut meta = self.meta.lock();
		for page in physical_pages {
			if let Some(slot) = meta.by_page.remove(&page) {
				meta.slots[slot].physical_page = None;
				meta.lru.remove(slot);
			}
		}
	}

	pub fn queue_state(&self, index: usize) -> QueueState {
		self.queue.state(index)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn cache() -> PageCache {
		PageCache::new(4, 16, 2, 4)
	}

	#[test]
	fn miss_then_put_then_hit() {
		let cache = cache();
		assert!(cache.get_page_from_cache(1, 0).is_none());

		let slot = cache.select_victim(|_| false, ProbeType::IndexFirst).unwrap();
		cache.put_page(slot, 1, &[7u8; 16]);

		let (_, bytes) = cache.get_page_from_cache(1, 0).unwrap();
		assert_eq!(bytes, &[7u8; 16]);
	}

	#[test]
	fn select_victim_skips_slot_under_pending_search() {
		let cache = cache();
		let slot = cache.select_victim(|_| false, ProbeType::IndexFirst).unwrap();
		cache.put_page(slot, 1, &[1u8; 16]);

		let (_guard, _bytes) = cache.get_page_from_cache(1, 0).unwrap();

		// All 4 slots are free except slot `slot`, which is pending search
		// under zone 0 — victim selection should still find a free slot.
		let victim = cache.select_victim(|_| false, ProbeType::IndexFirst).unwrap();
		assert_ne!(victim, slot);
	}

	#[test]
	fn select_victim_refuses_sole_pending_slot() {
		let cache = PageCache::new(1, 16, 1, 4);
		let slot = cache.select_victim(|_| false, ProbeType::IndexFirst).unwrap();
		cache.put_page(slot, 1, &[1u8; 16]);

		let (_guard, _bytes) = cache.get_page_from_cache(1, 0).unwrap();
		assert!(cache.select_victim(|_| false, ProbeType::IndexFirst).is_none());
	}

	#[test]
	fn invalidate_pages_removes_from_cache_and_lru() {
		let cache = cache();
		let slot = cache.select_victim(|_| false, ProbeType::IndexFirst).unwrap();
		cache.put_page(slot, 5, &[9u8; 16]);
		assert!(cache.get_page_from_cache(5, 0).is_some());

		cache.invalidate_pages(std::iter::once(5));
		assert!(cache.get_page_from_cache(5, 0).is_none());
	}

	#[test]
	fn probe_type_prefers_matching_occupant_kind() {
		let cache = cache();
		let record_slot = cache.select_victim(|_| false, ProbeType::IndexFirst).unwrap();
		cache.put_page(record_slot, 100, &[0u8; 16]);

		let index_slot = cache.select_victim(|_| false, ProbeType::IndexFirst).unwrap();
		cache.put_page(index_slot, 200, &[0u8; 16]);

		// is_record_page(100) == true, is_record_page(200) == false.
		let victim = cache
			.select_victim(|p| p == 100, ProbeType::IndexFirst)
			.unwrap();
		// IndexFirst prefers to evict record pages, so the record-page slot
		// should win over a free slot if both are candidates; here two free
		// slots remain so either the record slot or a free slot works, but
		// the record slot must not be skipped in favor of the index slot.
		assert_ne!(victim, index_slot);
	}

	#[test]
	fn select_victim_unmaps_the_evicted_page_before_returning() {
		let cache = PageCache::new(2, 16, 1, 4);
		let a = cache.select_victim(|_| false, ProbeType::IndexFirst).unwrap();
		cache.put_page(a, 1, &[1u8; 16]);
		let b = cache.select_victim(|_| false, ProbeType::IndexFirst).unwrap();
		cache.put_page(b, 2, &[2u8; 16]);

		let victim = cache.select_victim(|_| false, ProbeType::IndexFirst).unwrap();
		let evicted_page = if victim == a { 1 } else { 2 };

		// The evicted page must already be gone from the map, not merely
		// overwritten once `put_page` runs.
		assert!(cache.get_page_from_cache(evicted_page, 0).is_none());
	}
}
