//! Versioner policies (§4.5): archive an about-to-be-replaced-or-deleted
//! file so it can be restored later. Each policy implements [`Archiver`]
//! for the change-set applier; `restore` and `list_versions` are plain
//! inherent methods since the applier never calls them.
#![allow(dead_code)]

use std::path::Path;
use std::process::Command;
use std::time::Duration;

use crate::error::SyncError;
use crate::external::Archiver;
use crate::fs::Filesystem;
use crate::util::{format_timestamp, now_unix_secs};

fn joined(versions_dir: &str, relative: &str) -> String {
	format!("{}/{}", versions_dir, relative)
}

fn split_ext(basename: &str) -> (&str, Option<&str>) {
	match basename.rfind('.') {
		Some(idx) if idx > 0 => (&basename[..idx], Some(&basename[idx + 1..])),
		_ => (basename, None),
	}
}

fn split_dir(path: &str) -> (&str, &str) {
	match path.rfind('/') {
		Some(idx) => (&path[..idx], &path[idx + 1..]),
		None => ("", path),
	}
}

fn ensure_parent(fs: &dyn Filesystem, path: &str) -> Result<(), SyncError> {
	let (dir, _) = split_dir(path);
	if !dir.is_empty() {
		fs.mkdir_all(Path::new(dir), 0o755)?;
	}
	Ok(())
}

/// Recursively lists regular-file paths (relative to `fs`'s root) under
/// `dir`, skipping entries that fail to stat.
fn walk_files(fs: &dyn Filesystem, dir: &str) -> Vec<String> {
	let mut out = Vec::new();
	let Ok(names) = fs.dir_names(Path::new(dir)) else {
		return out;
	};
	for name in names {
		let child = if dir.is_empty() { name } else { format!("{}/{}", dir, name) };
		match fs.lstat(Path::new(&child)) {
			Ok(st) if st.kind == crate::types::FileKind::Dir => out.extend(walk_files(fs, &child)),
			Ok(_) => out.push(child),
			Err(_) => {}
		}
	}
	out
}

/// Moves to `<versions-dir>/<relative-path>`, overwriting any prior copy.
pub struct TrashcanVersioner<'a> {
	pub fs: &'a dyn Filesystem,
	pub versions_dir: String,
	/// Files older than this are eligible for `clean`; `None` disables
	/// age-based cleanup.
	pub max_age: Option<Duration>,
}

impl<'a> TrashcanVersioner<'a> {
	pub fn new(fs: &'a dyn Filesystem, versions_dir: impl Into<String>) -> Self {
		TrashcanVersioner { fs, versions_dir: versions_dir.into(), max_age: None }
	}

	pub fn with_max_age(mut self, max_age: Duration) -> Self {
		self.max_age = Some(max_age);
		self
	}

	/// Removes versioned files older than `max_age` and any intermediate
	/// directory left empty by doing so. A no-op if `max_age` is unset.
	pub fn clean(&self) -> Result<(), SyncError> {
		let Some(max_age) = self.max_age else {
			return Ok(());
		};
		let cutoff = now_unix_secs() - max_age.as_secs() as i64;
		for path in walk_files(self.fs, &self.versions_dir) {
			if let Ok(st) = self.fs.stat(Path::new(&path)) {
				if st.mtime_sec < cutoff {
					let _ = self.fs.remove(Path::new(&path));
				}
			}
		}
		remove_empty_dirs(self.fs, &self.versions_dir);
		Ok(())
	}

	pub fn restore(&self, relative: &str) -> Result<(), SyncError> {
		restore_single_copy(self.fs, &self.versions_dir, relative)
	}
}

impl<'a> Archiver for TrashcanVersioner<'a> {
	fn archive(&self, path: &Path) -> Result<(), SyncError> {
		let relative = path.to_string_lossy().into_owned();
		let dest = joined(&self.versions_dir, &relative);
		ensure_parent(self.fs, &dest)?;
		if self.fs.stat(Path::new(&dest)).is_ok() {
			self.fs.remove(Path::new(&dest))?;
		}
		self.fs.rename(path, Path::new(&dest))?;
		Ok(())
	}
}

/// Moves to `<versions-dir>/<relative-path>~<YYYYMMDD-HHMMSS><ext>`,
/// retaining the `keep` most recent copies per original path.
pub struct SimpleVersioner<'a> {
	pub fs: &'a dyn Filesystem,
	pub versions_dir: String,
	pub keep: usize,
}

impl<'a> SimpleVersioner<'a> {
	pub fn new(fs: &'a dyn Filesystem, versions_dir: impl Into<String>, keep: usize) -> Self {
		SimpleVersioner { fs, versions_dir: versions_dir.into(), keep: keep.max(1) }
	}

	/// Existing versioned copies of `relative`, oldest first, recognising
	/// both the current `stem~tag.ext` layout and the older `stem.ext~tag`
	/// layout left behind by a previous version of this policy.
	pub fn list_versions(&self, relative: &str) -> Vec<(String, i64)> {
		let (dir, basename) = split_dir(relative);
		let (stem, ext) = split_ext(basename);
		let search_dir = if dir.is_empty() { self.versions_dir.clone() } else { joined(&self.versions_dir, dir) };
		let mut found = Vec::new();
		let Ok(names) = self.fs.dir_names(Path::new(&search_dir)) else {
			return found;
		};
		for name in names {
			if let Some(ts) = parse_new_tag(&name, stem, ext) {
				found.push((format!("{}/{}", search_dir, name), ts));
			} else if let Some(ts) = parse_old_tag(&name, stem, ext) {
				found.push((format!("{}/{}", search_dir, name), ts));
			}
		}
		found.sort_by_key(|&(_, ts)| ts);
		found
	}

	fn enforce_retention(&self, relative: &str) {
		let versions = self.list_versions(relative);
		if versions.len() <= self.keep {
			return;
		}
		for (path, _) in &versions[..versions.len() - self.keep] {
			let _ = self.fs.remove(Path::new(path));
		}
	}

	pub fn restore(&self, version_path: &str, relative: &str) -> Result<(), SyncError> {
		restore_from(self.fs, version_path, relative)
	}
}

impl<'a> Archiver for SimpleVersioner<'a> {
	fn archive(&self, path: &Path) -> Result<(), SyncError> {
		let relative = path.to_string_lossy().into_owned();
		let (dir, basename) = split_dir(&relative);
		let (stem, ext) = split_ext(basename);
		let tag = format_timestamp(now_unix_secs());
		let tagged = match ext {
			Some(ext) => format!("{}~{}.{}", stem, tag, ext),
			None => format!("{}~{}", stem, tag),
		};
		let dest = if dir.is_empty() { joined(&self.versions_dir, &tagged) } else { joined(&self.versions_dir, &format!("{}/{}", dir, tagged)) };
		ensure_parent(self.fs, &dest)?;
		self.fs.rename(path, Path::new(&dest))?;
		self.enforce_retention(&relative);
		Ok(())
	}
}

fn parse_new_tag(name: &str, stem: &str, ext: Option<&str>) -> Option<i64> {
	let without_ext = match ext {
		Some(ext) => name.strip_suffix(&format!(".{}", ext))?,
		None => name,
	};
	let tag = without_ext.strip_prefix(stem)?.strip_prefix('~')?;
	parse_tag(tag)
}

fn parse_old_tag(name: &str, stem: &str, ext: Option<&str>) -> Option<i64> {
	let prefix = match ext {
		Some(ext) => format!("{}.{}~", stem, ext),
		None => format!("{}~", stem),
	};
	let tag = name.strip_prefix(&prefix)?;
	parse_tag(tag)
}

fn parse_tag(tag: &str) -> Option<i64> {
	if tag.len() != 15 {
		return None;
	}
	let bytes = tag.as_bytes();
	if bytes[8] != b'-' {
		return None;
	}
	let year: i64 = tag[0..4].parse().ok()?;
	let month: i64 = tag[4..6].parse().ok()?;
	let day: i64 = tag[6..8].parse().ok()?;
	let hour: i64 = tag[9..11].parse().ok()?;
	let minute: i64 = tag[11..13].parse().ok()?;
	let second: i64 = tag[13..15].parse().ok()?;
	// Ordering-only approximation of the timestamp; exact enough to sort
	// and bucket without re-deriving a full calendar-to-epoch conversion.
	let days = year * 400 + month * 31 + day;
	let hours = days * 24 + hour;
	let minutes = hours * 60 + minute;
	Some(minutes * 60 + second)
}

/// Like [`SimpleVersioner`], but thins retained copies using fixed
/// intervals instead of a flat keep-count: one per 30s for the last hour,
/// hourly for the last day, daily for the last month, weekly for the last
/// year, nothing older than a year.
pub struct StaggeredVersioner<'a> {
	inner: SimpleVersioner<'a>,
}

impl<'a> StaggeredVersioner<'a> {
	pub fn new(fs: &'a dyn Filesystem, versions_dir: impl Into<String>) -> Self {
		StaggeredVersioner { inner: SimpleVersioner::new(fs, versions_dir, usize::MAX) }
	}

	pub fn restore(&self, version_path: &str, relative: &str) -> Result<(), SyncError> {
		self.inner.restore(version_path, relative)
	}

	pub fn list_versions(&self, relative: &str) -> Vec<(String, i64)> {
		self.inner.list_versions(relative)
	}

	fn thin(&self, relative: &str) {
		let now = now_unix_secs();
		let versions = self.inner.list_versions(relative);
		let buckets: [(i64, i64); 4] = [
			(3600, 30),              // last hour: one per 30s
			(86_400, 3600),          // last day: hourly
			(30 * 86_400, 86_400),   // last month: daily
			(365 * 86_400, 7 * 86_400), // last year: weekly
		];
		let mut kept_bucket_keys = std::collections::HashSet::new();
		for (path, ts) in versions.into_iter().rev() {
			let age = now - ts;
			if age > 365 * 86_400 {
				let _ = self.inner.fs.remove(Path::new(&path));
				continue;
			}
			let Some(&(_, interval)) = buckets.iter().find(|&&(window, _)| age <= window) else {
				continue;
			};
			let bucket_key = ts / interval;
			if !kept_bucket_keys.insert(bucket_key) {
				let _ = self.inner.fs.remove(Path::new(&path));
			}
		}
	}
}

impl<'a> Archiver for StaggeredVersioner<'a> {
	fn archive(&self, path: &Path) -> Result<(), SyncError> {
		let relative = path.to_string_lossy().into_owned();
		let (dir, basename) = split_dir(&relative);
		let (stem, ext) = split_ext(basename);
		let tag = format_timestamp(now_unix_secs());
		let tagged = match ext {
			Some(ext) => format!("{}~{}.{}", stem, tag, ext),
			None => format!("{}~{}", stem, tag),
		};
		let dest = if dir.is_empty() {
			joined(&self.inner.versions_dir, &tagged)
		} else {
			joined(&self.inner.versions_dir, &format!("{}/{}", dir, tagged))
		};
		ensure_parent(self.inner.fs, &dest)?;
		self.inner.fs.rename(path, Path::new(&dest))?;
		self.thin(&relative);
		Ok(())
	}
}

/// Runs a configured external command against the about-to-be-archived
/// file. Archiving succeeds iff the file no longer exists afterward; the
/// command is responsible for any storage of its own.
pub struct ExternalVersioner<'a> {
	pub fs: &'a dyn Filesystem,
	pub command: String,
}

impl<'a> ExternalVersioner<'a> {
	pub fn new(fs: &'a dyn Filesystem, command: impl Into<String>) -> Self {
		ExternalVersioner { fs, command: command.into() }
	}
}

impl<'a> Archiver for ExternalVersioner<'a> {
	fn archive(&self, path: &Path) -> Result<(), SyncError> {
		let full = format!("{}/{}", self.fs.uri(), path.to_string_lossy());
		let mut parts = self.command.split_whitespace();
		let program = parts.next().ok_or_else(|| SyncError::Other { message: "empty external versioner command".into() })?;
		let status = Command::new(program)
			.args(parts)
			.arg(&full)
			.status()
			.map_err(SyncError::from)?;
		if !status.success() {
			return Err(SyncError::Other { message: format!("external versioner command exited with {}", status) });
		}
		if self.fs.stat(path).is_ok() {
			return Err(SyncError::Other { message: format!("{} still exists after external versioner ran", path.display()) });
		}
		Ok(())
	}
}

fn restore_single_copy(fs: &dyn Filesystem, versions_dir: &str, relative: &str) -> Result<(), SyncError> {
	let version_path = joined(versions_dir, relative);
	restore_from(fs, &version_path, relative)
}

/// Moves any existing file at `target` out of the way (tagged with the
/// current timestamp) before bringing `version_path` back to `target`.
fn restore_from(fs: &dyn Filesystem, version_path: &str, target: &str) -> Result<(), SyncError> {
	if fs.stat(Path::new(target)).is_ok() {
		let (dir, basename) = split_dir(target);
		let (stem, ext) = split_ext(basename);
		let tag = format_timestamp(now_unix_secs());
		let displaced_name = match ext {
			Some(ext) => format!("{}~{}.{}", stem, tag, ext),
			None => format!("{}~{}", stem, tag),
		};
		let displaced = if dir.is_empty() { displaced_name } else { format!("{}/{}", dir, displaced_name) };
		fs.rename(Path::new(target), Path::new(&displaced))?;
	}
	ensure_parent(fs, target)?;
	fs.rename(Path::new(version_path), Path::new(target))?;
	Ok(())
}

fn remove_empty_dirs(fs: &dyn Filesystem, dir: &str) -> bool {
	let Ok(names) = fs.dir_names(Path::new(dir)) else {
		return false;
	};
	let mut empty = true;
	for name in names {
		let child = format!("{}/{}", dir, name);
		match fs.lstat(Path::new(&child)) {
			Ok(st) if st.kind == crate::types::FileKind::Dir => {
				if remove_empty_dirs(fs, &child) {
					let _ = fs.remove(Path::new(&child));
				} else {
					empty = false;
				}
			}
			_ => empty = false,
		}
	}
	empty
}


// vim: ts=4
