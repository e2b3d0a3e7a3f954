#![allow(dead_code)]

//! Constructor-supplied configuration for the sync core.
//!
//! There is no file or environment loading here — the outer process owns
//! configuration discovery (CLI flags, config files, env vars) and hands
//! the core a single `Options` value. This mirrors the "single
//! consolidated struct" shape the rest of this codebase uses for
//! configuration, minus the loading machinery that belongs one layer up.

use std::time::Duration;

/// Byte-order-independent min/max block size bounds (§4.2).
pub const MIN_BLOCK_SIZE: u32 = 128 * 1024;
pub const MAX_BLOCK_SIZE: u32 = 16 * 1024 * 1024;
/// Soft ceiling on block count used to pick a larger block size for big files.
pub const MAX_BLOCKS_PER_FILE: u64 = 2000;

/// Unicode normalization policy for filenames on platforms where the
/// filesystem and the wire format can disagree (§9 Open Question).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Normalization {
	/// Never touch on-disk names; skip non-normalized entries with a warning.
	Off,
	/// Normalize to NFC, renaming non-conforming entries on disk.
	Nfc,
	/// Normalize to NFD (matches the one Apple filesystem that stores NFD).
	Nfd,
}

impl Default for Normalization {
	fn default() -> Self {
		#[cfg(target_os = "macos")]
		{
			Normalization::Nfd
		}
		#[cfg(not(target_os = "macos"))]
		{
			Normalization::Nfc
		}
	}
}

/// Every tunable named across the component design sections, gathered
/// into one constructor-supplied struct.
#[derive(Debug, Clone)]
pub struct Options {
	/// Worker threads in the scanner's hashing pool.
	pub hasher_workers: usize,
	/// Parallelism `P` of the async block requester: queue depth and
	/// worker-task count.
	pub requester_parallelism: usize,
	/// How often progress events are emitted during scanning/applying.
	pub progress_tick: Duration,
	/// Whether to compute the Adler-32 weak hash alongside SHA-256.
	pub weak_hash: bool,
	/// Case-fold ignore patterns by default (independent of per-pattern
	/// `(?i)` flags).
	pub default_case_fold: bool,
	/// How long a temporary file may sit on disk before the scanner
	/// removes it as abandoned.
	pub temp_lifetime: Duration,
	/// Idle duration after which an ignore-matcher cache entry is evicted.
	pub ignore_cache_ttl: Duration,
	/// Maximum number of `.sync-conflict-*` copies retained per path.
	/// `-1` means unlimited, `0` disables conflict-copy creation.
	pub max_conflicts: i32,
	/// Whether permission bits participate in unchanged-detection and
	/// apply.
	pub ignore_perms: bool,
	/// Filename normalization policy.
	pub normalization: Normalization,
	/// Name of the folder marker file, never scanned or walked into.
	pub marker_name: String,
	/// Default ignore-file name, relative to the folder root.
	pub ignore_file_name: String,
	/// Default versions directory name.
	pub versions_dir_name: String,
	/// Basenames longer than this are replaced by their MD5 digest when
	/// building the temporary-file name (§6).
	pub max_temp_basename: usize,
}

impl Default for Options {
	fn default() -> Self {
		Options {
			hasher_workers: std::thread::available_parallelism().map(|n| n.get()).unwrap_or(4),
			requester_parallelism: 16,
			progress_tick: Duration::from_millis(500),
			weak_hash: true,
			default_case_fold: cfg!(any(target_os = "macos", target_os = "windows")),
			temp_lifetime: Duration::from_secs(6 * 3600),
			ignore_cache_ttl: Duration::from_secs(3600),
			max_conflicts: 10,
			ignore_perms: false,
			normalization: Normalization::default(),
			marker_name: ".stfolder".to_string(),
			ignore_file_name: ".stignore".to_string(),
			versions_dir_name: ".stversions".to_string(),
			max_temp_basename: 240,
		}
	}
}

impl Options {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn with_hasher_workers(mut self, n: usize) -> Self {
		self.hasher_workers = n.max(1);
		self
	}

	pub fn with_requester_parallelism(mut self, n: usize) -> Self {
		self.requester_parallelism = n.max(1);
		self
	}

	pub fn with_weak_hash(mut self, enabled: bool) -> Self {
		self.weak_hash = enabled;
		self
	}

	pub fn with_max_conflicts(mut self, max: i32) -> Self {
		self.max_conflicts = max;
		self
	}

	pub fn with_normalization(mut self, normalization: Normalization) -> Self {
		self.normalization = normalization;
		self
	}

	pub fn temp_prefix(&self, basename: &str) -> String {
		if basename.len() > self.max_temp_basename {
			format!(".syncthing.{}.tmp", crate::util::md5_hex(basename.as_bytes()))
		} else {
			format!(".syncthing.{}.tmp", basename)
		}
	}
}


// vim: ts=4
