//! The reader pool: a fixed number of OS threads that service the read
//! queue, each claiming an entry, reading its page, validating it, and
//! publishing it into the cache.
//!
//! Grounded on the teacher's `tasks.rs` background-worker shape for the
//! overall spawn/join lifecycle, but using plain `std::thread::spawn`
//! workers parked on the read queue's own condvar rather than the teacher's
//! `futures::executor::ThreadPool`, since these workers block on real disk
//! I/O and on each other across iterations.
//!
//! Waiters in this crate are real blocked threads, not continuations handed
//! to an outer scheduler: `mark_filled` wakes every thread blocked in
//! `ReadQueue::wait_for_fill`, and each wakes and re-checks the cache itself
//! instead of the worker performing the record search on their behalf.

use std::{
	sync::{
		atomic::{AtomicUsize, Ordering},
		Arc,
	},
	thread::{self, JoinHandle},
};

use log::{debug, warn};

use crate::{
	cache::{replacer::ProbeType, PageCache},
	delta_index,
	geometry::Geometry,
	index_page_map::IndexPageMap,
	store::VolumeStoreApi,
};

struct Shared {
	cache: Arc<PageCache>,
	store: Arc<dyn VolumeStoreApi>,
	geometry: Geometry,
	index_page_map: Arc<IndexPageMap>,
	nonce: u64,
	busy_readers: AtomicUsize,
}

/// A fixed pool of worker threads servicing `PageCache`'s read queue.
/// Dropping a `ReaderPool` signals exit and joins every worker.
pub(crate) struct ReaderPool {
	shared: Arc<Shared>,
	workers: Vec<JoinHandle<()>>,
}

impl ReaderPool {
	pub fn start(
		num_threads: usize,
		cache: Arc<PageCache>,
		store: Arc<dyn VolumeStoreApi>,
		geometry: Geometry,
		index_page_map: Arc<IndexPageMap>,
		nonce: u64,
	) -> Self {
		let shared = Arc::new(Shared {
			cache,
			store,
			geometry,
			index_page_map,
			nonce,
			busy_readers: AtomicUsize::new(0),
		});

		let workers = (0..num_threads)
			.map(|id| {
				let shared = Arc::clone(&shared);
				thread::Builder::new()
					.name(format!("volcache-reader-{id}"))
					.spawn(move || worker_loop(shared))
					.expect("failed to spawn reader-pool worker thread")
			})
			.collect();

		Self { shared, workers }
	}

	pub fn busy_readers(&self) -> usize {
		self.shared.busy_readers.load(Ordering::Relaxed)
	}
}

impl Drop for ReaderPool {
	fn drop(&mut self) {
		self.shared.cache.read_queue().signal_exit();
		for worker in self.workers.drain(..) {
			let _ = worker.join();
		}
	}
}

/// One iteration per read-queue entry serviced: wait for a reservable
/// entry, service it unless it was invalidated first, then wake waiters and
/// release the slot back to `Free`.
fn worker_loop(shared: Arc<Shared>) {
	loop {
		let Some((qpos, phys)) = shared.cache.read_queue().claim_next() else {
			break;
		};

		shared.busy_readers.fetch_add(1, Ordering::Relaxed);
		let is_record = shared.geometry.is_record_page(phys);

		if !shared.cache.read_queue().is_invalid(qpos) {
			service_entry(&shared, qpos, phys, is_record);
		}

		shared.cache.read_queue().mark_filled(qpos);
		shared.cache.read_queue().release(qpos);
		shared.busy_readers.fetch_sub(1, Ordering::Relaxed);
	}
}

/// Selects a victim, reads the page, validates it, and publishes it.
fn service_entry(shared: &Shared, qpos: usize, phys: u32, is_record: bool) {
	let probe_type = if is_record { ProbeType::RecordFirst } else { ProbeType::IndexFirst };
	let Some(slot) = acquire_victim(shared, probe_type) else {
		warn!("reader pool could not find an evictable slot for page {phys}");
		return;
	};

	let mut buf = vec![0u8; shared.geometry.bytes_per_page];
	if let Err(err) = shared.store.read_page(phys, &mut buf) {
		warn!("reader pool failed to read page {phys}: {err}");
		return;
	}

	// The entry may have been invalidated while I/O was in flight.
	if shared.cache.read_queue().is_invalid(qpos) {
		debug!("page {phys} invalidated during fill; discarding");
		return;
	}

	// Index pages are parsed and validated; record pages are published as
	// raw bytes.
	if !is_record {
		let chapter = shared.geometry.map_to_chapter(phys);
		let page = shared.geometry.map_to_page(phys);
		let parsed = match delta_index::initialize_chapter_index_page(&buf, &shared.geometry, shared.nonce) {
			Ok(parsed) => parsed,
			Err(err) => {
				warn!("index page {phys} failed to parse: {err}");
				return;
			}
		};
		if let Some(bounds) = shared.index_page_map.bounds_of(chapter, page) {
			if let Err(err) = delta_index::validate_chapter_index_page(&parsed, bounds.lowest_list, bounds.highest_list) {
				warn!("index page {phys} failed validation: {err}");
				return;
			}
		}
	}

	shared.cache.put_page(slot, phys, &buf);
}

fn acquire_victim(shared: &Shared, probe_type: ProbeType) -> Option<usize> {
	const MAX_ATTEMPTS: usize = 1000;
	for _ in 0..MAX_ATTEMPTS {
		if let Some(slot) = shared.cache.select_victim(|p| shared.geometry.is_record_page(p), probe_type) {
			return Some(slot);
		}
		thread::yield_now();
	}
	None
}

#[cfg(test)]
mod tests {
	use std::time::Duration;

	use super::*;
	use crate::store::MockVolumeStoreApi;

	fn geometry() -> Geometry {
		Geometry::new(64, 4, 2, 2, 4).unwrap()
	}

	#[test]
	fn services_a_record_page_read() {
		let geo = geometry();
		let cache = Arc::new(PageCache::new(4, geo.bytes_per_page, 1, 4));
		let index_page_map = Arc::new(IndexPageMap::new());

		let mut store = MockVolumeStoreApi::new();
		store.expect_read_page().returning(|_, buf| {
			buf.fill(7);
			Ok(())
		});

		let phys = geo.map_to_physical(0, geo.index_pages_per_chapter);
		cache.read_queue().reserve(phys).unwrap();

		let pool = ReaderPool::start(1, Arc::clone(&cache), Arc::new(store), geo, index_page_map, 0);

		for _ in 0..200 {
			if cache.get_page_from_cache(phys, 0).is_some() {
				break;
			}
			thread::sleep(Duration::from_millis(5));
		}
		let (_, bytes) = cache.get_page_from_cache(phys, 0).expect("page was filled");
		assert_eq!(bytes, &[7u8; 64]);

		drop(pool);
	}

	#[test]
	fn drop_joins_every_worker() {
		let geo = geometry();
		let cache = Arc::new(PageCache::new(2, geo.bytes_per_page, 1, 2));
		let index_page_map = Arc::new(IndexPageMap::new());
		let store = MockVolumeStoreApi::new();

		let pool = ReaderPool::start(2, cache, Arc::new(store), geo, index_page_map, 0);
		drop(pool);
	}
}
