use std::io;

use thiserror::Error;

/// Transient I/O, cache-capacity, local/structural corruption, shutdown,
/// and bad arguments.
#[derive(Debug, Error)]
pub enum Error {
	#[error("Backing store I/O failed: {0}")]
	Io(#[from] io::Error),

	#[error("No free read-queue entry is available")]
	QueuesFull,

	#[error("The volume is shutting down")]
	Shutdown,

	#[error("Index page is corrupt or disagrees with the index page map: {0}")]
	CorruptData(String),

	#[error("Chapter boundary probe found a structural inconsistency: {0}")]
	CorruptComponent(String),

	#[error("Invalid argument: {0}")]
	InvalidArgument(String),
}

pub type Result<T> = std::result::Result<T, Error>;
