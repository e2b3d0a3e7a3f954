//! Core data model: file metadata, blocks, and vector-clock versions.
#![allow(dead_code)]

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Kind of filesystem entry a FileInfo describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FileKind {
	#[serde(rename = "F")]
	File,
	#[serde(rename = "D")]
	Dir,
	#[serde(rename = "S")]
	Symlink,
}

impl fmt::Display for FileKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			FileKind::File => write!(f, "file"),
			FileKind::Dir => write!(f, "dir"),
			FileKind::Symlink => write!(f, "symlink"),
		}
	}
}

/// One strong-hashed (and optionally weak-hashed) slice of a file's content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockInfo {
	pub offset: u64,
	pub size: u32,
	/// SHA-256 digest of the block's bytes.
	pub hash: [u8; 32],
	/// Adler-32 rolling hash, 0 when not computed.
	pub weak_hash: u32,
}

impl BlockInfo {
	pub fn end(&self) -> u64 {
		self.offset + self.size as u64
	}
}

/// A single (modifier, counter) entry in a version vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VersionCounter {
	pub modifier: u64,
	pub counter: u64,
}

/// Vector clock tracking which modifier last touched a file and how many
/// times. Entries are kept sorted by modifier id so two vectors built from
/// the same updates compare equal regardless of insertion order.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Version {
	counters: Vec<VersionCounter>,
}

impl Version {
	pub fn new() -> Self {
		Version { counters: Vec::new() }
	}

	pub fn counters(&self) -> &[VersionCounter] {
		&self.counters
	}

	/// Bump `modifier`'s counter to one more than the current maximum
	/// counter across the whole vector.
	pub fn update(&self, modifier: u64) -> Version {
		let max = self.counters.iter().map(|c| c.counter).max().unwrap_or(0);
		let mut counters: Vec<VersionCounter> =
			self.counters.iter().filter(|c| c.modifier != modifier).copied().collect();
		counters.push(VersionCounter { modifier, counter: max + 1 });
		counters.sort_by_key(|c| c.modifier);
		Version { counters }
	}

	fn counter_for(&self, modifier: u64) -> u64 {
		self.counters.iter().find(|c| c.modifier == modifier).map(|c| c.counter).unwrap_or(0)
	}

	fn all_modifiers(a: &Version, b: &Version) -> Vec<u64> {
		let mut ids: Vec<u64> =
			a.counters.iter().chain(b.counters.iter()).map(|c| c.modifier).collect();
		ids.sort_unstable();
		ids.dedup();
		ids
	}

	/// Partial order: Less/Greater if one vector dominates the other on
	/// every shared modifier, None if neither dominates (concurrent).
	pub fn partial_cmp_causal(&self, other: &Version) -> Option<Ordering> {
		let mut less = false;
		let mut greater = false;
		for id in Version::all_modifiers(self, other) {
			match self.counter_for(id).cmp(&other.counter_for(id)) {
				Ordering::Less => less = true,
				Ordering::Greater => greater = true,
				Ordering::Equal => {}
			}
		}
		match (less, greater) {
			(false, false) => Some(Ordering::Equal),
			(true, false) => Some(Ordering::Less),
			(false, true) => Some(Ordering::Greater),
			(true, true) => None,
		}
	}

	pub fn concurrent_with(&self, other: &Version) -> bool {
		self.partial_cmp_causal(other).is_none()
	}

	pub fn dominates(&self, other: &Version) -> bool {
		matches!(self.partial_cmp_causal(other), Some(Ordering::Greater) | Some(Ordering::Equal))
	}
}

/// Whole-second-plus-nanosecond modification timestamp, as observed from
/// the filesystem clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModTime {
	pub sec: i64,
	pub nsec: u32,
}

/// The canonical description of one path's desired state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileInfo {
	pub name: String,
	pub kind: FileKind,
	pub deleted: bool,
	pub invalid: bool,
	pub ignored: bool,
	pub permissions: u32,
	pub ignore_perms: bool,
	pub modified: ModTime,
	pub size: u64,
	pub block_size: u32,
	pub blocks: Vec<BlockInfo>,
	pub symlink_target: Option<String>,
	pub version: Version,
	/// Content-identity digest used for dedup / rename detection: the
	/// strong hash of the concatenation of block hashes.
	pub hash: [u8; 32],
}

impl FileInfo {
	pub fn is_dir(&self) -> bool {
		self.kind == FileKind::Dir
	}

	pub fn is_symlink(&self) -> bool {
		self.kind == FileKind::Symlink
	}

	pub fn is_regular(&self) -> bool {
		self.kind == FileKind::File
	}

	/// Parent path, or `""` for a root-level entry.
	pub fn parent_name(&self) -> &str {
		match self.name.rfind('/') {
			Some(idx) => &self.name[..idx],
			None => "",
		}
	}
}


// vim: ts=4
