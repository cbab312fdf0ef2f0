//! The per-zone pending-search protocol: a single atomic word per zone
//! encodes "is this zone currently dereferencing a cache slot, and if so,
//! which physical page". Victim selection refuses to evict a slot whose
//! physical page matches an odd (pending) encoding for any zone.
//!
//! Grounded on the general atomic-bookkeeping style of the teacher's
//! `page_store::cache` (`AtomicUsize`/`AtomicBool` fields in `PageBuffer`
//! and `PageCache`), adapted into a bit-packed single-word scheme, since the
//! teacher itself protects slots with a per-slot `RawRwLock` rather than
//! this counter protocol.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::geometry::PhysicalPage;

/// One counter per zone. Even ⇒ no pending search. Odd ⇒ pending search on
/// the physical page encoded in the upper bits.
pub(crate) struct InvalidateCounter(AtomicU64);

impl InvalidateCounter {
	pub fn new() -> Self {
		Self(AtomicU64::new(0))
	}

	/// Marks this zone as dereferencing `phys`. Release ordering ensures the
	/// encoded value is visible to a reader thread before that thread reads
	/// any cache-slot contents this zone is about to access.
	pub fn begin(&self, phys: PhysicalPage) {
		let encoded = (u64::from(phys) << 1) | 1;
		self.0.store(encoded, Ordering::Release);
	}

	/// Clears the pending flag. Release ordering ensures the reader thread
	/// that later observes this as even also observes every prior
	/// dereference this zone performed.
	pub fn end(&self) {
		let encoded = self.0.load(Ordering::Relaxed) & !1;
		self.0.store(encoded, Ordering::Release);
	}

	/// Returns `Some(phys)` if this zone currently holds a pending search on
	/// `phys`, else `None`. Acquire ordering pairs with `begin`'s release, so
	/// a reader thread that observes the pending encoding happens-after the
	/// zone's intent to dereference the slot.
	pub fn pending_page(&self) -> Option<PhysicalPage> {
		let encoded = self.0.load(Ordering::Acquire);
		if encoded & 1 == 0 {
			return None;
		}
		Some((encoded >> 1) as PhysicalPage)
	}
}

impl Default for InvalidateCounter {
	fn default() -> Self {
		Self::new()
	}
}

/// An RAII guard that calls `end()` on drop, so a search can't forget to
/// end its pending-search interval even on an early return or panic.
pub(crate) struct PendingSearchGuard<'a> {
	counter: &'a InvalidateCounter,
}

impl<'a> PendingSearchGuard<'a> {
	pub fn begin(counter: &'a InvalidateCounter, phys: PhysicalPage) -> Self {
		counter.begin(phys);
		Self { counter }
	}
}

impl Drop for PendingSearchGuard<'_> {
	fn drop(&mut self) {
		self.counter.end();
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn starts_even() {
		let counter = InvalidateCounter::new();
		assert_eq!(counter.pending_page(), None);
	}

	#[test]
	fn begin_encodes_page_as_pending() {
		let counter = InvalidateCounter::new();
		counter.begin(42);
		assert_eq!(counter.pending_page(), Some(42));
	}

	#[test]
	fn end_clears_pending() {
		let counter = InvalidateCounter::new();
		counter.begin(42);
		counter.end();
		assert_eq!(counter.pending_page(), None);
	}

	#[test]
	fn guard_ends_on_drop() {
		let counter = InvalidateCounter::new();
		{
			let _guard = PendingSearchGuard::begin(&counter, 7);
			assert_eq!(counter.pending_page(), Some(7));
		}
		assert_eq!(counter.pending_page(), None);
	}
}
