//! Change-set applier (§4.4): turns a queue of desired FileInfo entries
//! into matching on-disk state, in dependency order, with conflict
//! handling, versioning, and progress reporting.
#![allow(dead_code)]

mod depsort;

use std::collections::{HashMap, VecDeque};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::Mutex;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::config::Options;
use crate::error::{ApplyError, OpError, SyncError};
use crate::external::{Archiver, CurrentFiler, Progresser};
use crate::fs::Filesystem;
use crate::logging::debug;
use crate::requester::Requester;
use crate::types::FileInfo;

/// A pending FileInfo plus the "does this not count toward progress
/// events" flag the applier sets on entries it injects itself.
#[derive(Debug, Clone)]
pub struct ChangeSetEntry {
	pub file: FileInfo,
	pub synthetic: bool,
}

/// The pending-entries queue, plus reshaping operations that may run
/// concurrently with `apply` (guarded by one mutex, per §5).
pub struct Queue {
	entries: Mutex<VecDeque<ChangeSetEntry>>,
}

impl Queue {
	pub fn new() -> Self {
		Queue { entries: Mutex::new(VecDeque::new()) }
	}

	pub fn len(&self) -> usize {
		self.entries.lock().unwrap().len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	pub fn queue_names(&self) -> Vec<String> {
		self.entries.lock().unwrap().iter().map(|e| e.file.name.clone()).collect()
	}

	fn push_raw(&self, entry: ChangeSetEntry) {
		self.entries.lock().unwrap().push_back(entry);
	}

	pub fn shuffle(&self, seed: u64) {
		let mut rng = StdRng::seed_from_u64(seed);
		let mut guard = self.entries.lock().unwrap();
		let mut v: Vec<ChangeSetEntry> = guard.drain(..).collect();
		v.shuffle(&mut rng);
		*guard = v.into();
	}

	pub fn sort_by_size(&self, ascending: bool) {
		let mut guard = self.entries.lock().unwrap();
		let mut v: Vec<ChangeSetEntry> = guard.drain(..).collect();
		v.sort_by_key(|e| e.file.size);
		if !ascending {
			v.reverse();
		}
		*guard = v.into();
	}

	pub fn sort_by_modified(&self, ascending: bool) {
		let mut guard = self.entries.lock().unwrap();
		let mut v: Vec<ChangeSetEntry> = guard.drain(..).collect();
		v.sort_by_key(|e| (e.file.modified.sec, e.file.modified.nsec));
		if !ascending {
			v.reverse();
		}
		*guard = v.into();
	}

	/// Rotate `name` to the front with a single rotation, safe to call
	/// concurrently with `apply`. Returns false if `name` isn't queued.
	pub fn bring_to_front(&self, name: &str) -> bool {
		let mut guard = self.entries.lock().unwrap();
		if let Some(pos) = guard.iter().position(|e| e.file.name == name) {
			guard.rotate_left(pos);
			true
		} else {
			false
		}
	}

	fn snapshot(&self) -> Vec<ChangeSetEntry> {
		self.entries.lock().unwrap().iter().cloned().collect()
	}

	fn drain(&self) -> Vec<ChangeSetEntry> {
		self.entries.lock().unwrap().drain(..).collect()
	}
}

impl Default for Queue {
	fn default() -> Self {
		Queue::new()
	}
}

/// Transforms a queue of desired FileInfo entries into on-disk state.
pub struct Applier<'a> {
	pub fs: &'a dyn Filesystem,
	pub current: &'a dyn CurrentFiler,
	pub archiver: Option<&'a dyn Archiver>,
	pub progress: &'a dyn Progresser,
	pub options: &'a Options,
	pub queue: Queue,
	deleted_hashes: Mutex<HashMap<String, FileInfo>>,
	conflict_counts: Mutex<HashMap<String, usize>>,
}

impl<'a> Applier<'a> {
	pub fn new(
		fs: &'a dyn Filesystem,
		current: &'a dyn CurrentFiler,
		archiver: Option<&'a dyn Archiver>,
		progress: &'a dyn Progresser,
		options: &'a Options,
	) -> Self {
		Applier {
			fs,
			current,
			archiver,
			progress,
			options,
			queue: Queue::new(),
			deleted_hashes: Mutex::new(HashMap::new()),
			conflict_counts: Mutex::new(HashMap::new()),
		}
	}

	/// Queue `file`. If it replaces an existing item of a different kind, a
	/// synthetic deletion of that item is queued first.
	pub fn queue(&self, file: FileInfo) {
		if let Some(mut existing) = self.current.current_file(&file.name) {
			if !existing.deleted && existing.kind != file.kind {
				existing.deleted = true;
				self.queue.push_raw(ChangeSetEntry { file: existing, synthetic: true });
			}
		}
		if file.deleted && file.is_regular() {
			self.deleted_hashes.lock().unwrap().insert(hex::encode(file.hash), file.clone());
		}
		self.queue.push_raw(ChangeSetEntry { file, synthetic: false });
	}

	/// Apply every queued entry in dependency order, requesting missing
	/// blocks through `requester` when neither the in-progress write nor
	/// the old file on disk can supply them.
	pub async fn apply(&self, requester: &Requester) -> Result<(), ApplyError> {
		let entries = self.queue.drain();
		let order = depsort::dependency_sort(&entries);
		let sorted: Vec<ChangeSetEntry> = order.into_iter().map(|i| entries[i].clone()).collect();

		let mut errors = ApplyError::default();
		for entry in &sorted {
			if !entry.synthetic {
				self.progress.started(&entry.file);
			}
			let result = self.apply_one(entry, requester).await;
			if !entry.synthetic {
				self.progress.completed(&entry.file, result.as_ref().err());
			}
			if let Err(err) = result {
				let must_rescan = matches!(err, SyncError::IntegrityChanged { .. } | SyncError::Conflict { .. });
				errors.push(OpError { path: entry.file.name.clone(), source: err, must_rescan });
			}
		}

		if errors.is_empty() {
			Ok(())
		} else {
			Err(errors)
		}
	}

	async fn apply_one(&self, entry: &ChangeSetEntry, requester: &Requester) -> Result<(), SyncError> {
		let f = &entry.file;
		match (f.kind, f.deleted) {
			(crate::types::FileKind::Symlink, true) => self.delete_symlink(f),
			(crate::types::FileKind::Symlink, false) => self.create_symlink(f, requester).await,
			(crate::types::FileKind::Dir, true) => self.delete_dir(f),
			(crate::types::FileKind::Dir, false) => self.create_or_update_dir(f),
			(crate::types::FileKind::File, true) => self.delete_regular(f),
			(crate::types::FileKind::File, false) => self.create_or_update_regular(f, requester).await,
		}
	}

	fn delete_symlink(&self, f: &FileInfo) -> Result<(), SyncError> {
		if self.fs.lstat(Path::new(&f.name)).is_err() {
			return Ok(());
		}
		self.with_writable_parent(f.parent_name(), |fs| fs.remove(Path::new(&f.name)))
	}

	async fn create_symlink(&self, f: &FileInfo, requester: &Requester) -> Result<(), SyncError> {
		if f.blocks.len() != 1 {
			return Err(SyncError::Other { message: format!("symlink {} must have exactly one block", f.name) });
		}
		let target = match &f.symlink_target {
			Some(t) => t.clone(),
			None => {
				let resp = requester.request(f.name.as_str(), 0, f.blocks[0].hash, f.blocks[0].size as usize).await;
				let buf = resp.bytes().await?;
				resp.close().await;
				String::from_utf8_lossy(&buf[..f.blocks[0].size as usize]).into_owned()
			}
		};
		if self.fs.lstat(Path::new(&f.name)).is_ok() {
			self.fs.remove(Path::new(&f.name))?;
		}
		self.fs.create_symlink(Path::new(&f.name), &target, f.kind)?;
		Ok(())
	}

	fn delete_dir(&self, f: &FileInfo) -> Result<(), SyncError> {
		if self.fs.stat(Path::new(&f.name)).is_err() {
			return Ok(());
		}
		self.with_writable_parent(f.parent_name(), |fs| fs.remove(Path::new(&f.name)))
	}

	fn create_or_update_dir(&self, f: &FileInfo) -> Result<(), SyncError> {
		match self.fs.stat(Path::new(&f.name)) {
			Ok(st) => {
				if self.options.ignore_perms {
					return Ok(());
				}
				let preserved = st.mode & 0o7000;
				self.fs.chmod(Path::new(&f.name), (f.permissions & 0o777) | preserved)?;
				Ok(())
			}
			Err(_) => {
				self.fs.mkdir_all(Path::new(&f.name), f.permissions & 0o777)?;
				Ok(())
			}
		}
	}

	fn delete_regular(&self, f: &FileInfo) -> Result<(), SyncError> {
		if self.fs.stat(Path::new(&f.name)).is_err() {
			return Ok(());
		}
		if let Some(archiver) = self.archiver {
			archiver.archive(Path::new(&f.name))
		} else {
			self.with_writable_parent(f.parent_name(), |fs| fs.remove(Path::new(&f.name)))
		}
	}

	async fn create_or_update_regular(&self, f: &FileInfo, requester: &Requester) -> Result<(), SyncError> {
		let source = {
			let mut hashes = self.deleted_hashes.lock().unwrap();
			hashes.remove(&hex::encode(f.hash))
		};
		if let Some(old) = source {
			if old.name != f.name && self.fs.stat(Path::new(&old.name)).is_ok() {
				self.with_writable_parent(f.parent_name(), |fs| fs.rename(Path::new(&old.name), Path::new(&f.name)))?;
				self.fs.chtimes(Path::new(&f.name), f.modified.sec, f.modified.nsec)?;
				if !self.options.ignore_perms {
					self.fs.chmod(Path::new(&f.name), f.permissions & 0o777)?;
				}
				return Ok(());
			}
		}
		self.write_regular_file(f, requester).await
	}

	async fn write_regular_file(&self, f: &FileInfo, requester: &Requester) -> Result<(), SyncError> {
		let basename = f.name.rsplit('/').next().unwrap_or(&f.name);
		let tmp_name = self.options.temp_prefix(basename);
		let tmp_path = match f.parent_name() {
			"" => tmp_name,
			parent => format!("{}/{}", parent, tmp_name),
		};

		let old = self.current.current_file(&f.name);

		if let Some(current) = &old {
			if !current.deleted && current.is_regular() {
				self.verify_matches_recorded(current)?;
			}
		}

		{
			let mut t = self.open_or_truncate_tmp(&tmp_path, f.size)?;
			for block in &f.blocks {
				if Self::block_already_correct(&mut t, block)? {
					self.progress.progress(f, block.size as i64, 0, 0);
					continue;
				}
				if let Some(bytes) = old.as_ref().and_then(|o| self.find_block_in_file(o, &block.hash).ok().flatten()) {
					Self::write_block(&mut t, block.offset, &bytes)?;
					self.progress.progress(f, block.size as i64, 0, 0);
					continue;
				}
				self.progress.progress(f, 0, block.size as i64, 0);
				let resp = requester.request(f.name.as_str(), block.offset, block.hash, block.size as usize).await;
				match resp.bytes().await {
					Ok(buf) => {
						Self::write_block(&mut t, block.offset, &buf[..block.size as usize])?;
						self.progress.progress(f, 0, -(block.size as i64), block.size as i64);
					}
					Err(e) => {
						self.progress.progress(f, 0, -(block.size as i64), 0);
						debug!(
							path = f.name.as_str(),
							block = %crate::util::hash_b64(&block.hash),
							offset = block.offset,
							"block request failed"
						);
						resp.close().await;
						return Err(e);
					}
				}
				resp.close().await;
			}
		}

		self.fs.chtimes(Path::new(&tmp_path), f.modified.sec, f.modified.nsec)?;
		if !self.options.ignore_perms {
			self.fs.chmod(Path::new(&tmp_path), f.permissions & 0o777)?;
		}

		if let Some(current) = &old {
			if !current.deleted && current.version.concurrent_with(&f.version) && !is_conflict_name(&f.name) {
				self.make_conflict_copy(&f.name)?;
			}
		}

		let existed = self.fs.stat(Path::new(&f.name)).is_ok();
		if existed {
			if let Some(archiver) = self.archiver {
				archiver.archive(Path::new(&f.name))?;
			}
		}

		self.with_writable_parent(f.parent_name(), |fs| fs.rename(Path::new(&tmp_path), Path::new(&f.name)))
	}

	fn open_or_truncate_tmp(&self, tmp_path: &str, size: u64) -> Result<std::fs::File, SyncError> {
		let needs_fresh = match self.fs.stat(Path::new(tmp_path)) {
			Ok(st) => st.size != size,
			Err(_) => true,
		};
		let mut file = if needs_fresh {
			let f = self.fs.create(Path::new(tmp_path))?;
			f.set_len(size)?;
			f
		} else {
			self.fs.open(Path::new(tmp_path))?
		};
		file.seek(SeekFrom::Start(0))?;
		Ok(file)
	}

	fn block_already_correct(file: &mut std::fs::File, block: &crate::types::BlockInfo) -> Result<bool, SyncError> {
		if block.size == 0 {
			return Ok(block.hash == crate::util::empty_hash());
		}
		let mut buf = vec![0u8; block.size as usize];
		if file.seek(SeekFrom::Start(block.offset)).is_err() {
			return Ok(false);
		}
		match file.read_exact(&mut buf) {
			Ok(()) => Ok(crate::util::sha256(&buf) == block.hash),
			Err(_) => Ok(false),
		}
	}

	/// Checks the on-disk state at `recorded.name` still matches the
	/// FileInfo this write expects to replace. A mismatch here means
	/// something touched the file outside of this apply (or an earlier
	/// scan went stale) and the caller needs to rescan before retrying.
	fn verify_matches_recorded(&self, recorded: &FileInfo) -> Result<(), SyncError> {
		let mismatch = || SyncError::IntegrityChanged { path: recorded.name.clone() };
		let st = self.fs.stat(Path::new(&recorded.name)).map_err(|_| mismatch())?;
		if st.size != recorded.size {
			return Err(mismatch());
		}
		if self.disk_content_hash(&recorded.name, recorded.block_size.max(1))? != recorded.hash {
			return Err(mismatch());
		}
		Ok(())
	}

	/// Recomputes a file's content-identity hash straight off disk, chunked
	/// at `block_size` to match how the recorded FileInfo was hashed.
	fn disk_content_hash(&self, name: &str, block_size: u32) -> Result<[u8; 32], SyncError> {
		let mut file = self.fs.open(Path::new(name))?;
		let mut buf = vec![0u8; block_size as usize];
		let mut hashes = Vec::new();
		loop {
			let n = Self::read_fully(&mut file, &mut buf)?;
			if n == 0 {
				break;
			}
			hashes.push(crate::util::sha256(&buf[..n]));
		}
		if hashes.is_empty() {
			hashes.push(crate::util::empty_hash());
		}
		Ok(crate::util::content_hash(hashes.iter()))
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

	fn find_block_in_file(&self, old: &FileInfo, hash: &[u8; 32]) -> Result<Option<Vec<u8>>, SyncError> {
		let Some(block) = old.blocks.iter().find(|b| &b.hash == hash) else {
			return Ok(None);
		};
		let mut file = self.fs.open(Path::new(&old.name))?;
		file.seek(SeekFrom::Start(block.offset))?;
		let mut buf = vec![0u8; block.size as usize];
		file.read_exact(&mut buf)?;
		Ok(Some(buf))
	}

	fn write_block(file: &mut std::fs::File, offset: u64, bytes: &[u8]) -> Result<(), SyncError> {
		file.seek(SeekFrom::Start(offset))?;
		file.write_all(bytes)?;
		Ok(())
	}

	fn make_conflict_copy(&self, name: &str) -> Result<(), SyncError> {
		if self.options.max_conflicts == 0 {
			return Ok(());
		}
		let mut counts = self.conflict_counts.lock().unwrap();
		let count = counts.entry(name.to_string()).or_insert(0);
		if self.options.max_conflicts > 0 && *count >= self.options.max_conflicts as usize {
			return Ok(());
		}
		*count += 1;
		drop(counts);

		let conflict_name = conflict_name_for(name);
		debug!(path = name, conflict = %conflict_name, "queuing conflict copy");
		self.with_writable_parent(parent_of(name), |fs| fs.rename(Path::new(name), Path::new(&conflict_name)))
	}

	fn with_writable_parent<T>(
		&self,
		parent: &str,
		f: impl FnOnce(&dyn Filesystem) -> std::io::Result<T>,
	) -> Result<T, SyncError> {
		let parent_path = if parent.is_empty() { ".".to_string() } else { parent.to_string() };
		let original_mode = self.fs.stat(Path::new(&parent_path)).ok().map(|st| st.mode);
		let relaxed = original_mode.map(|m| m | 0o200);
		if let (Some(orig), Some(relaxed)) = (original_mode, relaxed) {
			if orig != relaxed {
				let _ = self.fs.chmod(Path::new(&parent_path), relaxed);
			}
		}
		let result = f(self.fs);
		if let (Some(orig), Some(relaxed)) = (original_mode, relaxed) {
			if orig != relaxed {
				let _ = self.fs.chmod(Path::new(&parent_path), orig);
			}
		}
		result.map_err(SyncError::from)
	}
}

fn parent_of(name: &str) -> &str {
	match name.rfind('/') {
		Some(idx) => &name[..idx],
		None => "",
	}
}

/// `true` iff `name`'s basename already matches the conflict-copy pattern,
/// so suppressing a nested conflict suffix.
pub fn is_conflict_name(name: &str) -> bool {
	let basename = name.rsplit('/').next().unwrap_or(name);
	if let Some(idx) = basename.find(".sync-conflict-") {
		let rest = &basename[idx + ".sync-conflict-".len()..];
		let digits_dashes: String = rest.chars().take(15).collect();
		return is_conflict_timestamp(&digits_dashes);
	}
	false
}

fn is_conflict_timestamp(s: &str) -> bool {
	if s.len() != 15 {
		return false;
	}
	let bytes = s.as_bytes();
	bytes[..8].iter().all(u8::is_ascii_digit) && bytes[8] == b'-' && bytes[9..].iter().all(u8::is_ascii_digit)
}

fn conflict_name_for(name: &str) -> String {
	let (dir, basename) = match name.rfind('/') {
		Some(idx) => (&name[..idx], &name[idx + 1..]),
		None => ("", name),
	};
	let (stem, ext) = match basename.rfind('.') {
		Some(idx) if idx > 0 => (&basename[..idx], Some(&basename[idx + 1..])),
		_ => (basename, None),
	};
	let stamp = crate::util::format_timestamp(crate::util::now_unix_secs());
	let tagged = match ext {
		Some(ext) => format!("{}.sync-conflict-{}.{}", stem, stamp, ext),
		None => format!("{}.sync-conflict-{}", stem, stamp),
	};
	if dir.is_empty() {
		tagged
	} else {
		format!("{}/{}", dir, tagged)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::external::NoCurrentFiler;
	use crate::types::{BlockInfo, FileKind, ModTime, Version};
	use crate::util::empty_hash;
	use async_trait::async_trait;
	use tempfile::TempDir;

	struct NullBackend;

	#[async_trait]
	impl crate::external::RequestBackend for NullBackend {
		async fn request(&self, _n: &str, _o: u64, _h: &[u8; 32], _b: &mut [u8]) -> Result<(), SyncError> {
			Err(SyncError::BlockUnavailable { path: "unused".into(), offset: 0 })
		}
	}

	fn file(name: &str, kind: FileKind, deleted: bool, size: u64) -> FileInfo {
		FileInfo {
			name: name.to_string(),
			kind,
			deleted,
			invalid: false,
			ignored: false,
			permissions: 0o644,
			ignore_perms: false,
			modified: ModTime { sec: 1_700_000_000, nsec: 0 },
			size,
			block_size: 131072,
			blocks: if size == 0 { vec![] } else { vec![BlockInfo { offset: 0, size: size as u32, hash: [0; 32], weak_hash: 0 }] },
			symlink_target: None,
			version: Version::new(),
			hash: [0; 32],
		}
	}

	#[test]
	fn conflict_name_keeps_extension_and_inserts_timestamp() {
		let name = conflict_name_for("dir/report.txt");
		assert!(name.starts_with("dir/report.sync-conflict-"));
		assert!(name.ends_with(".txt"));
	}

	#[test]
	fn conflict_name_without_extension_has_no_trailing_dot() {
		let name = conflict_name_for("README");
		assert!(name.starts_with("README.sync-conflict-"));
		assert!(!name.ends_with('.'));
	}

	#[test]
	fn already_conflicted_name_is_detected() {
		assert!(is_conflict_name("report.sync-conflict-20240102-030405.txt"));
		assert!(!is_conflict_name("report.txt"));
	}

	#[test]
	fn bring_to_front_rotates_named_entry_to_front() {
		let queue = Queue::new();
		queue.push_raw(ChangeSetEntry { file: file("a", FileKind::File, false, 0), synthetic: false });
		queue.push_raw(ChangeSetEntry { file: file("b", FileKind::File, false, 0), synthetic: false });
		queue.push_raw(ChangeSetEntry { file: file("c", FileKind::File, false, 0), synthetic: false });
		assert!(queue.bring_to_front("c"));
		assert_eq!(queue.queue_names(), vec!["c".to_string(), "a".to_string(), "b".to_string()]);
	}

	#[test]
	fn queue_injects_synthetic_delete_on_kind_mismatch() {
		struct OneShotFiler(FileInfo);
		impl CurrentFiler for OneShotFiler {
			fn current_file(&self, _n: &str) -> Option<FileInfo> {
				Some(self.0.clone())
			}
		}
		let existing = file("a", FileKind::Dir, false, 0);
		let filer = OneShotFiler(existing.clone());
		let fsys = crate::fs::StdFilesystem::new(std::env::temp_dir());
		let progress = crate::external::NoProgresser;
		let options = Options::default();
		let applier = Applier::new(&fsys, &filer, None, &progress, &options);
		applier.queue(file("a", FileKind::File, false, 10));
		assert_eq!(applier.queue.len(), 2);
		assert_eq!(applier.queue.queue_names(), vec!["a".to_string(), "a".to_string()]);
		let snapshot = applier.queue.snapshot();
		assert!(snapshot[0].synthetic);
		assert!(snapshot[0].file.deleted, "synthetic kind-mismatch entry must be marked deleted");
		assert!(!snapshot[1].synthetic);
	}

	#[tokio::test]
	async fn deleting_an_already_absent_symlink_is_a_no_op() {
		let tmp = TempDir::new().unwrap();
		let fsys = crate::fs::StdFilesystem::new(tmp.path());
		let filer = NoCurrentFiler;
		let progress = crate::external::NoProgresser;
		let options = Options::default();
		let applier = Applier::new(&fsys, &filer, None, &progress, &options);
		let (requester, handle) = Requester::spawn(std::sync::Arc::new(NullBackend), 1, 65536);
		let target = file("missing-link", FileKind::Symlink, true, 0);
		let result = applier.apply_one(&ChangeSetEntry { file: target, synthetic: false }, &requester).await;
		assert!(result.is_ok());
		requester.shut_down();
		handle.join().await;
	}

	#[tokio::test]
	async fn creating_a_directory_applies_permissions() {
		let tmp = TempDir::new().unwrap();
		let fsys = crate::fs::StdFilesystem::new(tmp.path());
		let filer = NoCurrentFiler;
		let progress = crate::external::NoProgresser;
		let options = Options::default();
		let applier = Applier::new(&fsys, &filer, None, &progress, &options);
		let (requester, handle) = Requester::spawn(std::sync::Arc::new(NullBackend), 1, 65536);
		let target = file("newdir", FileKind::Dir, false, 0);
		applier.apply_one(&ChangeSetEntry { file: target, synthetic: false }, &requester).await.unwrap();
		assert!(fsys.stat(Path::new("newdir")).unwrap().kind == FileKind::Dir);
		requester.shut_down();
		handle.join().await;
	}

	#[tokio::test]
	async fn writing_an_empty_file_needs_no_block_requests() {
		let tmp = TempDir::new().unwrap();
		let fsys = crate::fs::StdFilesystem::new(tmp.path());
		let filer = NoCurrentFiler;
		let progress = crate::external::NoProgresser;
		let options = Options::default();
		let applier = Applier::new(&fsys, &filer, None, &progress, &options);
		let (requester, handle) = Requester::spawn(std::sync::Arc::new(NullBackend), 1, 65536);
		let mut target = file("empty.txt", FileKind::File, false, 0);
		target.blocks = vec![BlockInfo { offset: 0, size: 0, hash: empty_hash(), weak_hash: 0 }];
		applier.write_regular_file(&target, &requester).await.unwrap();
		assert_eq!(fsys.stat(Path::new("empty.txt")).unwrap().size, 0);
		requester.shut_down();
		handle.join().await;
	}

	#[tokio::test]
	async fn matching_hash_delete_then_create_is_resolved_as_a_rename() {
		let tmp = TempDir::new().unwrap();
		let fsys = crate::fs::StdFilesystem::new(tmp.path());
		std::fs::write(tmp.path().join("old.txt"), b"same content").unwrap();

		let block_hash = crate::util::sha256(b"same content");
		let content_hash = crate::util::content_hash(std::iter::once(&block_hash));
		let block = BlockInfo { offset: 0, size: 12, hash: block_hash, weak_hash: 0 };

		let filer = NoCurrentFiler;
		let progress = crate::external::NoProgresser;
		let options = Options::default();
		let applier = Applier::new(&fsys, &filer, None, &progress, &options);

		let mut old = file("old.txt", FileKind::File, true, 12);
		old.blocks = vec![block.clone()];
		old.hash = content_hash;
		applier.queue(old);

		let mut new = file("new.txt", FileKind::File, false, 12);
		new.blocks = vec![block];
		new.hash = content_hash;
		applier.queue(new);

		// NullBackend errors on every request, so this only succeeds if the
		// create/delete pair is resolved as a rename and no block is fetched.
		let (requester, handle) = Requester::spawn(std::sync::Arc::new(NullBackend), 1, 65536);
		applier.apply(&requester).await.unwrap();
		assert!(fsys.stat(Path::new("new.txt")).is_ok());
		assert!(fsys.stat(Path::new("old.txt")).is_err());
		requester.shut_down();
		handle.join().await;
	}

	#[tokio::test]
	async fn stale_on_disk_content_fails_the_write_with_must_rescan() {
		struct StaleFiler(FileInfo);
		impl CurrentFiler for StaleFiler {
			fn current_file(&self, _n: &str) -> Option<FileInfo> {
				Some(self.0.clone())
			}
		}

		let tmp = TempDir::new().unwrap();
		let fsys = crate::fs::StdFilesystem::new(tmp.path());
		std::fs::write(tmp.path().join("a.txt"), b"disk content diverged").unwrap();

		let recorded_hash = crate::util::sha256(b"what we recorded");
		let mut recorded = file("a.txt", FileKind::File, false, 17);
		recorded.hash = crate::util::content_hash(std::iter::once(&recorded_hash));
		let filer = StaleFiler(recorded);

		let progress = crate::external::NoProgresser;
		let options = Options::default();
		let applier = Applier::new(&fsys, &filer, None, &progress, &options);
		let (requester, handle) = Requester::spawn(std::sync::Arc::new(NullBackend), 1, 65536);

		let mut target = file("a.txt", FileKind::File, false, 21);
		target.blocks = vec![BlockInfo { offset: 0, size: 21, hash: [9; 32], weak_hash: 0 }];
		let err = applier.write_regular_file(&target, &requester).await.unwrap_err();
		assert!(matches!(err, SyncError::IntegrityChanged { .. }));
		requester.shut_down();
		handle.join().await;
	}
}

// vim: ts=4
