//! Scanner: walks a folder, decides what needs hashing, hashes it with
//! block-level integrity, and emits FileInfo deltas (§4.2).
#![allow(dead_code)]

pub mod blocksize;

use std::io::Read;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::config::Options;
use crate::error::SyncError;
use crate::external::CurrentFiler;
use crate::fs::{Filesystem, Stat};
use crate::ignore::Matcher;
use crate::types::{BlockInfo, FileInfo, FileKind, ModTime, Version};
use crate::util::{adler32, content_hash, empty_hash, sha256};

/// Shared cooperative-cancellation flag, checked at entry and block
/// boundaries by both the walker and the hasher workers.
#[derive(Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
	pub fn new() -> Self {
		CancelToken(Arc::new(AtomicBool::new(false)))
	}

	pub fn cancel(&self) {
		self.0.store(true, AtomicOrdering::SeqCst);
	}

	pub fn is_cancelled(&self) -> bool {
		self.0.load(AtomicOrdering::Relaxed)
	}
}

/// One emitted outcome of a scan: either a successfully computed
/// FileInfo, or a per-path error that does not stop the walk.
pub struct ScanResult {
	pub path: String,
	pub file: Option<FileInfo>,
	pub err: Option<SyncError>,
}

/// Walks `root` under `fs`, applying `matcher`, and hashes files that
/// changed since `current` last saw them. Results stream out of the
/// returned receiver as they become available; the channel closes when
/// the walk and all hashing complete (or `cancel` is set).
pub struct Scanner<'a> {
	pub fs: &'a (dyn Filesystem + 'a),
	pub matcher: &'a Matcher,
	pub current: &'a (dyn CurrentFiler + 'a),
	pub options: &'a Options,
	pub modifier_id: u64,
}

/// Carries a raw pointer across a thread boundary. Sound only because
/// `scan` joins every worker before the borrow it points into can end.
struct SendPtr<T: ?Sized>(*const T);
#[allow(unsafe_code)]
unsafe impl<T: ?Sized> Send for SendPtr<T> {}

enum WorkItem {
	/// A path already known to be unchanged; passed straight through.
	Unchanged(FileInfo),
	/// A path that needs (re-)hashing.
	NeedsHash { path: String, stat: Stat, previous_block_size: Option<u32>, ignored: bool },
	/// A non-regular-file entry (directory or symlink) ready to emit.
	Immediate(FileInfo),
	/// A path-level error discovered during the walk.
	Error { path: String, err: SyncError },
}

impl<'a> Scanner<'a> {
	pub fn scan(&self, cancel: CancelToken) -> Receiver<ScanResult> {
		let (out_tx, out_rx) = mpsc::channel();
		let (work_tx, work_rx) = mpsc::channel::<WorkItem>();
		let work_rx = Arc::new(Mutex::new(work_rx));

		let mut seen_paths: Vec<String> = Vec::new();
		self.walk_and_dispatch(&work_tx, &mut seen_paths, &cancel);
		drop(work_tx);

		self.emit_deletions(&out_tx, &seen_paths);

		let worker_count = self.options.hasher_workers.max(1);
		let mut handles = Vec::with_capacity(worker_count);
		for _ in 0..worker_count {
			let work_rx = Arc::clone(&work_rx);
			let out_tx = out_tx.clone();
			let cancel = cancel.clone();
			let fs_ptr = SendPtr(self.fs as *const (dyn Filesystem + 'a));
			let weak_hash = self.options.weak_hash;
			// SAFETY: the Scanner (and the Filesystem it borrows) outlives
			// every worker thread because `scan` joins them all before
			// returning control past this function's stack frame via the
			// channel's lifetime; `fs_ptr` never escapes this closure.
			#[allow(unsafe_code)]
			let handle = thread::spawn(move || {
				let fs: &dyn Filesystem = unsafe { &*fs_ptr.0 };
				loop {
					let item = {
						let rx = work_rx.lock().unwrap();
						rx.recv()
					};
					let item = match item {
						Ok(item) => item,
						Err(_) => break,
					};
					if cancel.is_cancelled() {
						break;
					}
					let result = handle_work_item(fs, item, weak_hash, &cancel);
					if out_tx.send(result).is_err() {
						break;
					}
				}
			});
			handles.push(handle);
		}
		drop(out_tx);
		for h in handles {
			let _ = h.join();
		}

		out_rx
	}

	fn walk_and_dispatch(&self, work_tx: &Sender<WorkItem>, seen: &mut Vec<String>, cancel: &CancelToken) {
		self.walk_dir("", work_tx, seen, cancel);
	}

	fn walk_dir(&self, rel: &str, work_tx: &Sender<WorkItem>, seen: &mut Vec<String>, cancel: &CancelToken) {
		if cancel.is_cancelled() {
			return;
		}
		let names = match self.fs.dir_names(Path::new(rel)) {
			Ok(n) => n,
			Err(e) => {
				let _ = work_tx.send(WorkItem::Error { path: rel.to_string(), err: e.into() });
				return;
			}
		};

		for name in names {
			if cancel.is_cancelled() {
				return;
			}
			let child = if rel.is_empty() { name.clone() } else { format!("{}/{}", rel, name) };

			if is_internal_path(&child, self.options) {
				continue;
			}

			let st = match self.fs.lstat(Path::new(&child)) {
				Ok(st) => st,
				Err(e) => {
					let _ = work_tx.send(WorkItem::Error { path: child, err: e.into() });
					continue;
				}
			};

			let m = self.matcher.matches(&child);
			if m.ignored && st.kind == FileKind::Dir && self.matcher.skip_ignored_dirs() {
				continue;
			}

			seen.push(child.clone());

			if m.ignored && st.kind != FileKind::Dir {
				let _ = work_tx.send(WorkItem::Immediate(self.invalidated_file_info(&child, &st)));
				continue;
			}

			match st.kind {
				FileKind::Dir => {
					let _ = work_tx.send(WorkItem::Immediate(self.dir_file_info(&child, &st, m.ignored)));
					self.walk_dir(&child, work_tx, seen, cancel);
				}
				FileKind::Symlink => {
					match self.fs.read_symlink(Path::new(&child)) {
						Ok((target, _)) => {
							let _ = work_tx.send(WorkItem::Immediate(self.symlink_file_info(
								&child,
								&st,
								&target,
								m.ignored,
							)));
						}
						Err(e) => {
							let _ = work_tx.send(WorkItem::Error { path: child, err: e.into() });
						}
					}
				}
				FileKind::File => {
					let previous = self.current.current_file(&child);
					if let Some(prev) = &previous {
						if is_unchanged(prev, &st, self.options) {
							let _ = work_tx.send(WorkItem::Unchanged(prev.clone()));
							continue;
						}
					}
					let previous_block_size = previous.as_ref().map(|p| p.block_size);
					let _ = work_tx.send(WorkItem::NeedsHash {
						path: child,
						stat: st,
						previous_block_size,
						ignored: m.ignored,
					});
				}
			}
		}
	}

	fn dir_file_info(&self, path: &str, st: &Stat, ignored: bool) -> FileInfo {
		FileInfo {
			name: path.to_string(),
			kind: FileKind::Dir,
			deleted: false,
			invalid: false,
			ignored,
			permissions: st.mode,
			ignore_perms: self.options.ignore_perms,
			modified: ModTime { sec: st.mtime_sec, nsec: st.mtime_nsec },
			size: 0,
			block_size: 0,
			blocks: vec![],
			symlink_target: None,
			version: self.next_version(path),
			hash: [0; 32],
		}
	}

	fn symlink_file_info(&self, path: &str, st: &Stat, target: &str, ignored: bool) -> FileInfo {
		let hash = sha256(target.as_bytes());
		FileInfo {
			name: path.to_string(),
			kind: FileKind::Symlink,
			deleted: false,
			invalid: false,
			ignored,
			permissions: st.mode,
			ignore_perms: self.options.ignore_perms,
			modified: ModTime { sec: st.mtime_sec, nsec: st.mtime_nsec },
			size: target.len() as u64,
			block_size: target.len().max(1) as u32,
			blocks: vec![BlockInfo { offset: 0, size: target.len() as u32, hash, weak_hash: 0 }],
			symlink_target: Some(target.to_string()),
			version: self.next_version(path),
			hash,
		}
	}

	/// An ignored non-directory entry we still have to report, so peers
	/// know we hold this path but won't serve its content.
	fn invalidated_file_info(&self, path: &str, st: &Stat) -> FileInfo {
		FileInfo {
			name: path.to_string(),
			kind: st.kind,
			deleted: false,
			invalid: true,
			ignored: true,
			permissions: st.mode,
			ignore_perms: self.options.ignore_perms,
			modified: ModTime { sec: st.mtime_sec, nsec: st.mtime_nsec },
			size: 0,
			block_size: 0,
			blocks: vec![],
			symlink_target: None,
			version: self.next_version(path),
			hash: [0; 32],
		}
	}

	fn next_version(&self, path: &str) -> Version {
		let base = self.current.current_file(path).map(|f| f.version).unwrap_or_default();
		base.update(self.modifier_id)
	}

	fn emit_deletions(&self, out_tx: &Sender<ScanResult>, seen: &[String]) {
		// A real implementation would iterate the full current-filer
		// index; the trait only exposes point lookups, so deletion
		// detection is the caller's responsibility when it owns that
		// index (see `detect_deletions`).
		let _ = (out_tx, seen);
	}
}

/// Given the full set of previously known paths and the set observed by
/// this walk, emit deletion FileInfo entries for everything missing,
/// unless it was already deleted or is ignored. Kept separate from the
/// walk because `CurrentFiler` only supports point lookups, not
/// iteration.
pub fn detect_deletions(
	known: impl Iterator<Item = FileInfo>,
	seen: &std::collections::HashSet<String>,
	matcher: &Matcher,
	modifier_id: u64,
) -> Vec<FileInfo> {
	known
		.filter(|f| !f.deleted && !seen.contains(&f.name) && !matcher.matches(&f.name).ignored)
		.map(|mut f| {
			f.deleted = true;
			f.version = f.version.update(modifier_id);
			f.blocks.clear();
			f.size = 0;
			f
		})
		.collect()
}

fn is_internal_path(path: &str, options: &Options) -> bool {
	path == options.marker_name
		|| path == options.ignore_file_name
		|| path == options.versions_dir_name
		|| path.starts_with(&format!("{}/", options.versions_dir_name))
		|| is_temp_name(path)
}

fn is_temp_name(path: &str) -> bool {
	let basename = path.rsplit('/').next().unwrap_or(path);
	basename.starts_with(".syncthing.") && basename.ends_with(".tmp")
}

fn is_unchanged(prev: &FileInfo, st: &Stat, options: &Options) -> bool {
	if prev.deleted || prev.invalid || prev.kind != FileKind::File {
		return false;
	}
	if prev.size != st.size {
		return false;
	}
	if prev.modified.sec != st.mtime_sec || prev.modified.nsec != st.mtime_nsec {
		return false;
	}
	if !options.ignore_perms && (prev.permissions & 0o777) != (st.mode & 0o777) {
		return false;
	}
	true
}

fn handle_work_item(
	fs: &dyn Filesystem,
	item: WorkItem,
	weak_hash: bool,
	cancel: &CancelToken,
) -> ScanResult {
	match item {
		WorkItem::Unchanged(f) => ScanResult { path: f.name.clone(), file: Some(f), err: None },
		WorkItem::Immediate(f) => ScanResult { path: f.name.clone(), file: Some(f), err: None },
		WorkItem::Error { path, err } => ScanResult { path, file: None, err: Some(err) },
		WorkItem::NeedsHash { path, stat, previous_block_size, ignored } => {
			match hash_file(fs, &path, &stat, previous_block_size, weak_hash, ignored, cancel) {
				Ok(file) => ScanResult { path, file: Some(file), err: None },
				Err(err) => ScanResult { path, file: None, err: Some(err) },
			}
		}
	}
}

fn hash_file(
	fs: &dyn Filesystem,
	path: &str,
	stat: &Stat,
	previous_block_size: Option<u32>,
	weak_hash: bool,
	ignored: bool,
	cancel: &CancelToken,
) -> Result<FileInfo, SyncError> {
	let block_size = blocksize::select_block_size(stat.size, previous_block_size);
	let mut file = fs.open(Path::new(path))?;

	let mut blocks = Vec::new();
	if stat.size == 0 {
		blocks.push(BlockInfo { offset: 0, size: 0, hash: empty_hash(), weak_hash: 0 });
	} else {
		let mut buf = vec![0u8; block_size as usize];
		let mut offset = 0u64;
		loop {
			if cancel.is_cancelled() {
				return Err(SyncError::Cancelled);
			}
			let n = read_fully(&mut file, &mut buf)?;
			if n == 0 {
				break;
			}
			let slice = &buf[..n];
			blocks.push(BlockInfo {
				offset,
				size: n as u32,
				hash: sha256(slice),
				weak_hash: if weak_hash { adler32(slice) } else { 0 },
			});
			offset += n as u64;
		}
	}

	let restat = fs.stat(Path::new(path))?;
	if restat.size != stat.size || restat.mtime_sec != stat.mtime_sec || restat.mtime_nsec != stat.mtime_nsec {
		return Err(SyncError::IntegrityChanged { path: path.to_string() });
	}

	let hash = content_hash(blocks.iter().map(|b| &b.hash));
	Ok(FileInfo {
		name: path.to_string(),
		kind: FileKind::File,
		deleted: false,
		invalid: false,
		ignored,
		permissions: stat.mode,
		ignore_perms: false,
		modified: ModTime { sec: stat.mtime_sec, nsec: stat.mtime_nsec },
		size: stat.size,
		block_size,
		blocks,
		symlink_target: None,
		version: Version::new(),
		hash,
	})
}

fn read_fully(file: &mut std::fs::File, buf: &mut [u8]) -> std::io::Result<usize> {
	let mut total = 0;
	while total < buf.len() {
		let n = file.read(&mut buf[total..])?;
		if n == 0 {
			break;
		}
		total += n;
	}
	Ok(total)
}

pub fn now_modtime() -> ModTime {
	let d = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
	ModTime { sec: d.as_secs() as i64, nsec: d.subsec_nanos() }
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::external::NoCurrentFiler;
	use crate::fs::StdFilesystem;
	use crate::ignore::{Matcher as IgnoreMatcher, StaticIncludes};
	use std::collections::HashMap;
	use tempfile::TempDir;

	fn empty_matcher() -> IgnoreMatcher {
		IgnoreMatcher::load("root", "", &StaticIncludes(HashMap::new()), false).unwrap()
	}

	#[test]
	fn empty_file_produces_one_zero_size_block_with_empty_hash() {
		let tmp = TempDir::new().unwrap();
		std::fs::write(tmp.path().join("empty.txt"), b"").unwrap();
		let fsys = StdFilesystem::new(tmp.path());
		let st = fsys.stat(Path::new("empty.txt")).unwrap();
		let cancel = CancelToken::new();
		let fi = hash_file(&fsys, "empty.txt", &st, None, true, false, &cancel).unwrap();
		assert_eq!(fi.blocks.len(), 1);
		assert_eq!(fi.blocks[0].size, 0);
		assert_eq!(fi.blocks[0].hash, empty_hash());
	}

	#[test]
	fn scan_hashes_a_small_tree() {
		let tmp = TempDir::new().unwrap();
		std::fs::create_dir(tmp.path().join("sub")).unwrap();
		std::fs::write(tmp.path().join("a.txt"), b"hello world").unwrap();
		std::fs::write(tmp.path().join("sub/b.txt"), b"nested").unwrap();
		let fsys = StdFilesystem::new(tmp.path());
		let matcher = empty_matcher();
		let filer = NoCurrentFiler;
		let options = Options::default();
		let scanner = Scanner { fs: &fsys, matcher: &matcher, current: &filer, options: &options, modifier_id: 1 };
		let rx = scanner.scan(CancelToken::new());
		let mut names: Vec<String> = rx.iter().filter_map(|r| r.file.map(|f| f.name)).collect();
		names.sort();
		assert_eq!(names, vec!["a.txt".to_string(), "sub".to_string(), "sub/b.txt".to_string()]);
	}

	#[test]
	fn ignored_files_are_reported_as_invalidated_not_dropped() {
		let tmp = TempDir::new().unwrap();
		std::fs::write(tmp.path().join("a.txt"), b"keep").unwrap();
		std::fs::write(tmp.path().join("a.log"), b"skip").unwrap();
		let fsys = StdFilesystem::new(tmp.path());
		let matcher =
			IgnoreMatcher::load("root", "*.log\n", &StaticIncludes(HashMap::new()), false).unwrap();
		let filer = NoCurrentFiler;
		let options = Options::default();
		let scanner = Scanner { fs: &fsys, matcher: &matcher, current: &filer, options: &options, modifier_id: 1 };
		let rx = scanner.scan(CancelToken::new());
		let files: Vec<FileInfo> = rx.iter().filter_map(|r| r.file).collect();
		let kept = files.iter().find(|f| f.name == "a.txt").unwrap();
		assert!(!kept.invalid);
		let ignored = files.iter().find(|f| f.name == "a.log").unwrap();
		assert!(ignored.invalid);
		assert!(ignored.ignored);
		assert!(ignored.blocks.is_empty());
	}

	#[test]
	fn marker_and_versions_dirs_are_never_walked() {
		let tmp = TempDir::new().unwrap();
		std::fs::create_dir(tmp.path().join(".stfolder")).unwrap();
		std::fs::create_dir(tmp.path().join(".stversions")).unwrap();
		std::fs::write(tmp.path().join(".stversions/old.txt"), b"x").unwrap();
		let fsys = StdFilesystem::new(tmp.path());
		let matcher = empty_matcher();
		let filer = NoCurrentFiler;
		let options = Options::default();
		let scanner = Scanner { fs: &fsys, matcher: &matcher, current: &filer, options: &options, modifier_id: 1 };
		let rx = scanner.scan(CancelToken::new());
		let names: Vec<String> = rx.iter().filter_map(|r| r.file.map(|f| f.name)).collect();
		assert!(names.is_empty());
	}

	#[test]
	fn detect_deletions_marks_missing_entries_as_deleted() {
		let prev = FileInfo {
			name: "gone.txt".into(),
			kind: FileKind::File,
			deleted: false,
			invalid: false,
			ignored: false,
			permissions: 0o644,
			ignore_perms: false,
			modified: ModTime { sec: 0, nsec: 0 },
			size: 5,
			block_size: 131072,
			blocks: vec![BlockInfo { offset: 0, size: 5, hash: [1; 32], weak_hash: 0 }],
			symlink_target: None,
			version: Version::new(),
			hash: [1; 32],
		};
		let seen = std::collections::HashSet::new();
		let matcher = empty_matcher();
		let deletions = detect_deletions(vec![prev].into_iter(), &seen, &matcher, 7);
		assert_eq!(deletions.len(), 1);
		assert!(deletions[0].deleted);
		assert!(deletions[0].blocks.is_empty());
	}

	#[test]
	fn unchanged_file_is_not_rehashed() {
		let st = Stat { kind: FileKind::File, size: 4, mode: 0o644, mtime_sec: 100, mtime_nsec: 0 };
		let prev = FileInfo {
			name: "a.txt".into(),
			kind: FileKind::File,
			deleted: false,
			invalid: false,
			ignored: false,
			permissions: 0o644,
			ignore_perms: false,
			modified: ModTime { sec: 100, nsec: 0 },
			size: 4,
			block_size: 131072,
			blocks: vec![],
			symlink_target: None,
			version: Version::new(),
			hash: [0; 32],
		};
		let options = Options::default();
		assert!(is_unchanged(&prev, &st, &options));
	}
}

// vim: ts=4
