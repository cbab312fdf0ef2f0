//! A bounded, concurrent page cache and reader pool over a flat file of
//! fixed-size pages, organized into circularly-overwritten chapters, plus
//! the chapter-boundary recovery probe that recovers a volume's live span
//! on open.

mod cache;
mod config;
mod consts;
mod delta_index;
mod error;
mod geometry;
mod index_page_map;
mod reader_pool;
mod record_page;
mod store;
mod tasks;
mod utils;
mod volume;

pub mod boundary;

pub use config::{LookupMode, PageCacheConfig, ReaderPoolConfig, StoreConfig, VolumeConfig};
pub use error::{Error, Result};
pub use geometry::{ChapterPage, Geometry, PhysicalChapter, PhysicalPage, VirtualChapter};
pub use volume::{SearchResult, VolumeCore};

use std::{path::Path, sync::Arc};

use store::VolumeStore;

/// Opens (or creates) a volume at `path` with the given `geometry` and
/// `config`, starting its reader pool immediately.
pub fn open(path: &Path, geometry: Geometry, config: VolumeConfig, nonce: u64) -> Result<VolumeCore> {
	let store = Arc::new(VolumeStore::open(path, geometry.bytes_per_page)?);
	VolumeCore::new(config, geometry, store, nonce)
}
