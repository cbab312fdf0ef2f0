//! Periodic background maintenance, carried as ambient stack per the
//! teacher's convention for scheduled work.
//!
//! Grounded on the teacher's `tasks::Timer`/`TaskRunner`
//! (`crates/acorn/src/tasks.rs`): a `last_run`/`period` timer driving a
//! `futures::executor::ThreadPool`-spawned loop. The teacher's
//! `IntoTask`/`FallibleTask` generics rely on the nightly `trait_alias`
//! feature (`pub(crate) trait Task = ...`), which this crate stays off of;
//! the flush task here is a single concrete closure, so that machinery has
//! no counterpart to generalize.

use std::{
	sync::{
		atomic::{AtomicBool, Ordering},
		Arc,
	},
	thread,
	time::Duration,
};

use futures::executor::ThreadPool;
use log::warn;

use crate::store::VolumeStoreApi;

/// A handle that stops the scheduled flush when dropped, mirroring the
/// teacher's `ScheduledTaskHandle`.
pub(crate) struct FlushTaskHandle {
	running: Arc<AtomicBool>,
}

impl Drop for FlushTaskHandle {
	fn drop(&mut self) {
		self.running.store(false, Ordering::Relaxed);
	}
}

/// Spawns a periodic `VolumeStoreApi::sync` onto `pool`, running until the
/// returned handle is dropped.
pub(crate) fn schedule_flush(pool: &ThreadPool, store: Arc<dyn VolumeStoreApi>, period: Duration) -> FlushTaskHandle {
	let running = Arc::new(AtomicBool::new(true));
	let task_running = Arc::clone(&running);

	pool.spawn_ok(async move {
		while task_running.load(Ordering::Relaxed) {
			thread::sleep(period);
			if !task_running.load(Ordering::Relaxed) {
				break;
			}
			if let Err(err) = store.sync() {
				warn!("periodic flush failed: {err}");
			}
		}
	});

	FlushTaskHandle { running }
}

#[cfg(test)]
mod tests {
	use std::sync::atomic::AtomicUsize;

	use super::*;
	use crate::store::MockVolumeStoreApi;

	#[test]
	fn flush_task_stops_after_handle_is_dropped() {
		let pool = ThreadPool::new().unwrap();
		let sync_count = Arc::new(AtomicUsize::new(0));

		let mut store = MockVolumeStoreApi::new();
		let counter = Arc::clone(&sync_count);
		store.expect_sync().returning(move || {
			counter.fetch_add(1, Ordering::Relaxed);
			Ok(())
		});

		let handle = schedule_flush(&pool, Arc::new(store), Duration::from_millis(5));
		thread::sleep(Duration::from_millis(30));
		drop(handle);

		let count_after_stop = sync_count.load(Ordering::Relaxed);
		assert!(count_after_stop > 0);
		thread::sleep(Duration::from_millis(30));
		assert_eq!(sync_count.load(Ordering::Relaxed), count_after_stop);
	}
}
