//! External collaborator interfaces (§6): the traits the outer process
//! implements and hands to this crate. None of these have an in-crate
//! implementation beyond what tests need — the core only consumes them.
#![allow(dead_code)]

use async_trait::async_trait;
use std::path::Path;

use crate::error::SyncError;
use crate::types::FileInfo;

/// Backend the async block requester calls to actually fetch a block's
/// bytes, typically over the wire protocol this crate does not implement.
#[async_trait]
pub trait RequestBackend: Send + Sync {
	async fn request(
		&self,
		name: &str,
		offset: u64,
		hash: &[u8; 32],
		buf: &mut [u8],
	) -> Result<(), SyncError>;
}

/// Lookup of the last-known FileInfo for a path, consulted by the scanner
/// (to detect deletions) and the applier (to detect concurrent external
/// modification before a write).
pub trait CurrentFiler: Send + Sync {
	fn current_file(&self, name: &str) -> Option<FileInfo>;
}

/// Archives a file that is about to be replaced or deleted. After a
/// successful call the file must no longer exist at `path`; the
/// versioner is the canonical implementation but the applier only
/// depends on this trait.
pub trait Archiver: Send + Sync {
	fn archive(&self, path: &Path) -> Result<(), SyncError>;
}

/// Progress sink invoked by the scanner and the applier. Every
/// non-synthetic queued entry produces exactly one `started` and one
/// `completed` call, with zero or more `progress` calls in between.
/// Implementations must be safe to call from multiple threads
/// concurrently.
pub trait Progresser: Send + Sync {
	fn started(&self, _file: &FileInfo) {}
	fn progress(&self, _file: &FileInfo, _copied: i64, _requested: i64, _downloaded: i64) {}
	fn completed(&self, _file: &FileInfo, _err: Option<&SyncError>) {}
}

/// No-op progress sink, the default when a caller doesn't care.
pub struct NoProgresser;

impl Progresser for NoProgresser {}

/// No-op current-filer, useful in tests and for a first scan of an empty
/// database.
pub struct NoCurrentFiler;

impl CurrentFiler for NoCurrentFiler {
	fn current_file(&self, _name: &str) -> Option<FileInfo> {
		None
	}
}


// vim: ts=4
