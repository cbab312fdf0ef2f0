//! The bounded read queue: a fixed-size table of entries that serializes
//! concurrent misses on the same physical page into a single disk read,
//! with waiters woken once the reader pool finishes.
//!
//! Grounded on the teacher's `page_store::cache::PendingPage`/queue handling
//! in `crates/beedb_hive/src/page_store/cache.rs`, which uses a
//! `parking_lot::Condvar` to let callers block on an in-flight read rather
//! than issuing a redundant one; generalized here to an explicit
//! `Free -> ReservedForFill -> Filled` state machine, so that cancellation
//! has a state to return an entry to.

use parking_lot::{Condvar, Mutex};

use crate::geometry::PhysicalPage;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum QueueState {
	Free,
	ReservedForFill,
	Filled,
}

struct Entry {
	state: QueueState,
	physical_page: Option<PhysicalPage>,
	/// Set if a concurrent invalidation arrived while this entry was
	/// reserved; the reader pool must discard rather than publish its fill.
	invalid: bool,
	/// Set once a reader-pool worker has picked up this entry, so a second
	/// worker scanning for work doesn't service it twice.
	claimed: bool,
}

impl Entry {
	fn free() -> Self {
		Self {
			state: QueueState::Free,
			physical_page: None,
			invalid: false,
			claimed: false,
		}
	}
}

/// A fixed-size table of read-queue entries, one per slot the reader pool
/// may have in flight at once. All state changes happen under a single
/// mutex with a waiter condvar, matching the teacher's
/// reader-mutex-plus-condvar shape.
pub(crate) struct ReadQueue {
	entries: Mutex<Vec<Entry>>,
	/// Woken when a waiter should re-check `state`/`is_invalid`.
	waiters: Condvar,
	/// Woken when a new entry becomes reservable, or on shutdown.
	workers: Condvar,
	exiting: Mutex<bool>,
}

impl ReadQueue {
	pub fn new(capacity: usize) -> Self {
		Self {
			entries: Mutex::new((0..capacity).map(|_| Entry::free()).collect()),
			waiters: Condvar::new(),
			workers: Condvar::new(),
			exiting: Mutex::new(false),
		}
	}

	/// Sets the shutdown flag and wakes every worker so they can observe it
	/// and terminate.
	pub fn signal_exit(&self) {
		*self.exiting.lock() = true;
		self.workers.notify_all();
	}

	fn is_exiting(&self) -> bool {
		*self.exiting.lock()
	}

	/// A worker's dequeue: blocks until either the pool is exiting or an
	/// unclaimed `ReservedForFill` entry exists, then claims and returns it.
	/// Returns `None` only on exit.
	pub fn claim_next(&self) -> Option<(usize, PhysicalPage)> {
		let mut entries = self.entries.lock();
		loop {
			if let Some(index) = entries
				.iter()
				.position(|e| e.state == QueueState::ReservedForFill && !e.claimed)
			{
				entries[index].claimed = true;
				return Some((index, entries[index].physical_page.expect("reserved entry has a page")));
			}
			if self.is_exiting() {
				return None;
			}
			self.workers.wait(&mut entries);
		}
	}

	pub fn capacity(&self) -> usize {
		self.entries.lock().len()
	}

	/// If `physical_page` already has a reserved-or-filled entry, returns its
	/// index so the caller can wait on it instead of starting a new read.
	pub fn find_in_flight(&self, physical_page: PhysicalPage) -> Option<usize> {
		let entries = self.entries.lock();
		entries
			.iter()
			.position(|e| e.state != QueueState::Free && e.physical_page == Some(physical_page))
	}

	/// Reserves a free entry for `physical_page`, or returns `None` if the
	/// queue is full (the caller surfaces `Error::QueuesFull`).
	pub fn reserve(&self, physical_page: PhysicalPage) -> Option<usize> {
		let mut entries = self.entries.lock();
		let index = entries.iter().position(|e| e.state == QueueState::Free)?;
		entries[index] = Entry {
			state: QueueState::ReservedForFill,
			physical_page: Some(physical_page),
			invalid: false,
			claimed: false,
		};
		drop(entries);
		self.workers.notify_all();
		Some(index)
	}

	/// Marks a reserved entry invalid without waking waiters; the reader
	/// pool checks this after the disk read completes and, if set, frees the
	/// entry without publishing into the cache.
	pub fn invalidate(&self, index: usize) {
		let mut entries = self.entries.lock();
		entries[index].invalid = true;
	}

	/// Marks every non-free entry whose page satisfies `in_chapter` invalid,
	/// so the reader pool won't publish a fill for a page that's being
	/// overwritten or forgotten while its read is in flight.
	pub fn invalidate_matching(&self, mut in_chapter: impl FnMut(PhysicalPage) -> bool) {
		let mut entries = self.entries.lock();
		for entry in entries.iter_mut() {
			if entry.state != QueueState::Free {
				if let Some(page) = entry.physical_page {
					if in_chapter(page) {
						entry.invalid = true;
					}
				}
			}
		}
	}

	pub fn is_invalid(&self, index: usize) -> bool {
		self.entries.lock()[index].invalid
	}

	/// Marks `index` filled and wakes every thread waiting on the queue.
	/// Called by the reader pool after a successful fill.
	pub fn mark_filled(&self, index: usize) {
		let mut entries = self.entries.lock();
		entries[index].state = QueueState::Filled;
		self.waiters.notify_all();
	}

	/// Returns a reserved-or-filled entry to `Free` and wakes waiters, for
	/// both the success path (after the waiting searcher consumes the page)
	/// and the cancellation path.
	pub fn release(&self, index: usize) {
		let mut entries = self.entries.lock();
		entries[index] = Entry::free();
		self.waiters.notify_all();
	}

	/// Blocks the calling thread until `index` leaves `ReservedForFill`.
	pub fn wait_for_fill(&self, index: usize) {
		let mut entries = self.entries.lock();
		while entries[index].state == QueueState::ReservedForFill {
			self.waiters.wait(&mut entries);
		}
	}

	pub fn state(&self, index: usize) -> QueueState {
		self.entries.lock()[index].state
	}
}

#[cfg(test)]
mod tests {
	use std::{sync::Arc, thread};

	use super::*;

	#[test]
	fn reserve_then_release_frees_the_slot() {
		let queue = ReadQueue::new(2);
		let index = queue.reserve(10).unwrap();
		assert_eq!(queue.state(index), QueueState::ReservedForFill);
		queue.release(index);
		assert_eq!(queue.state(index), QueueState::Free);
	}

	#[test]
	fn reserve_fails_when_full() {
		let queue = ReadQueue::new(1);
		queue.reserve(1).unwrap();
		assert!(queue.reserve(2).is_none());
	}

	#[test]
	fn find_in_flight_locates_reserved_entry() {
		let queue = ReadQueue::new(2);
		let index = queue.reserve(7).unwrap();
		assert_eq!(queue.find_in_flight(7), Some(index));
		assert_eq!(queue.find_in_flight(8), None);
	}

	#[test]
	fn waiter_wakes_when_fill_completes() {
		let queue = Arc::new(ReadQueue::new(1));
		let index = queue.reserve(3).unwrap();

		let waiter_queue = Arc::clone(&queue);
		let handle = thread::spawn(move || {
			waiter_queue.wait_for_fill(index);
			waiter_queue.state(index)
		});

		thread::sleep(std::time::Duration::from_millis(20));
		queue.mark_filled(index);

		assert_eq!(handle.join().unwrap(), QueueState::Filled);
	}

	#[test]
	fn invalidated_entry_is_observed_by_reader() {
		let queue = ReadQueue::new(1);
		let index = queue.reserve(4).unwrap();
		queue.invalidate(index);
		assert!(queue.is_invalid(index));
		queue.release(index);
		assert!(!queue.is_invalid(index));
	}

	#[test]
	fn invalidate_matching_only_marks_pages_the_predicate_accepts() {
		let queue = ReadQueue::new(2);
		let in_chapter = queue.reserve(10).unwrap();
		let other_chapter = queue.reserve(20).unwrap();

		queue.invalidate_matching(|page| page == 10);

		assert!(queue.is_invalid(in_chapter));
		assert!(!queue.is_invalid(other_chapter));
	}

	#[test]
	fn invalidate_matching_skips_free_entries() {
		let queue = ReadQueue::new(1);
		queue.invalidate_matching(|_| true);
		assert_eq!(queue.state(0), QueueState::Free);
	}

	#[test]
	fn claim_next_wakes_on_reserve() {
		let queue = Arc::new(ReadQueue::new(1));

		let worker_queue = Arc::clone(&queue);
		let handle = thread::spawn(move || worker_queue.claim_next());

		thread::sleep(std::time::Duration::from_millis(20));
		let index = queue.reserve(6).unwrap();

		assert_eq!(handle.join().unwrap(), Some((index, 6)));
	}

	#[test]
	fn claim_next_does_not_service_an_already_claimed_entry_twice() {
		let queue = ReadQueue::new(1);
		let index = queue.reserve(1).unwrap();
		assert_eq!(queue.claim_next(), Some((index, 1)));

		queue.signal_exit();
		assert_eq!(queue.claim_next(), None);
	}

	#[test]
	fn claim_next_returns_none_after_signal_exit() {
		let queue = Arc::new(ReadQueue::new(1));

		let worker_queue = Arc::clone(&queue);
		let handle = thread::spawn(move || worker_queue.claim_next());

		thread::sleep(std::time::Duration::from_millis(20));
		queue.signal_exit();

		assert_eq!(handle.join().unwrap(), None);
	}
}
