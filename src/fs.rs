//! Filesystem abstraction (§6) and the default `std::fs`-backed
//! implementation the scanner and applier use outside of tests.
#![allow(dead_code)]

use std::fs;
use std::io;
use std::os::unix::fs::{MetadataExt, PermissionsExt};
use std::path::{Component, Path, PathBuf};
use std::time::SystemTime;

use crate::types::FileKind;

/// Minimal stat result the core needs; deliberately narrower than
/// `std::fs::Metadata` so alternate backends (virtual filesystems, test
/// doubles) don't have to fake fields nobody reads.
#[derive(Debug, Clone, Copy)]
pub struct Stat {
	pub kind: FileKind,
	pub size: u64,
	pub mode: u32,
	pub mtime_sec: i64,
	pub mtime_nsec: u32,
}

/// The capability set the scanner and the change-set applier require of
/// a filesystem. A virtual or sandboxed backend implements this trait in
/// place of `StdFilesystem`.
pub trait Filesystem: Send + Sync {
	fn lstat(&self, path: &Path) -> io::Result<Stat>;
	fn stat(&self, path: &Path) -> io::Result<Stat>;
	fn open(&self, path: &Path) -> io::Result<fs::File>;
	fn create(&self, path: &Path) -> io::Result<fs::File>;
	fn mkdir(&self, path: &Path, mode: u32) -> io::Result<()>;
	fn mkdir_all(&self, path: &Path, mode: u32) -> io::Result<()>;
	fn remove(&self, path: &Path) -> io::Result<()>;
	fn rename(&self, old: &Path, new: &Path) -> io::Result<()>;
	fn chmod(&self, path: &Path, mode: u32) -> io::Result<()>;
	fn chtimes(&self, path: &Path, mtime_sec: i64, mtime_nsec: u32) -> io::Result<()>;
	fn read_symlink(&self, path: &Path) -> io::Result<(String, FileKind)>;
	fn create_symlink(&self, path: &Path, target: &str, kind: FileKind) -> io::Result<()>;
	fn dir_names(&self, path: &Path) -> io::Result<Vec<String>>;
	/// Platform-appropriate way to mark a path hidden (dotfile on Unix,
	/// the hidden attribute on Windows backends).
	fn hide(&self, path: &Path) -> io::Result<()>;
	fn uri(&self) -> &str;
}

/// Default implementation backed directly by `std::fs`, rooted at a
/// single directory. All paths passed to its methods are relative to
/// that root and are rejected if they try to escape it.
pub struct StdFilesystem {
	root: PathBuf,
}

impl StdFilesystem {
	pub fn new(root: impl Into<PathBuf>) -> Self {
		StdFilesystem { root: root.into() }
	}

	fn resolve(&self, path: &Path) -> io::Result<PathBuf> {
		if !is_path_safe(path) {
			return Err(io::Error::new(
				io::ErrorKind::InvalidInput,
				format!("path escapes root: {}", path.display()),
			));
		}
		Ok(self.root.join(path))
	}

	fn to_stat(meta: &fs::Metadata) -> Stat {
		let kind = if meta.file_type().is_dir() {
			FileKind::Dir
		} else if meta.file_type().is_symlink() {
			FileKind::Symlink
		} else {
			FileKind::File
		};
		Stat {
			kind,
			size: meta.len(),
			mode: meta.mode() & 0o777,
			mtime_sec: meta.mtime(),
			mtime_nsec: meta.mtime_nsec() as u32,
		}
	}
}

/// A path is safe for use under a sync root iff it never walks up via
/// `..`. Absolute paths are resolved against the root by simple joining,
/// so they are safe too as long as no component is `ParentDir`.
pub fn is_path_safe(path: &Path) -> bool {
	!path.components().any(|c| matches!(c, Component::ParentDir))
}

impl Filesystem for StdFilesystem {
	fn lstat(&self, path: &Path) -> io::Result<Stat> {
		let full = self.resolve(path)?;
		Ok(Self::to_stat(&fs::symlink_metadata(full)?))
	}

	fn stat(&self, path: &Path) -> io::Result<Stat> {
		let full = self.resolve(path)?;
		Ok(Self::to_stat(&fs::metadata(full)?))
	}

	fn open(&self, path: &Path) -> io::Result<fs::File> {
		fs::File::open(self.resolve(path)?)
	}

	fn create(&self, path: &Path) -> io::Result<fs::File> {
		fs::File::create(self.resolve(path)?)
	}

	fn mkdir(&self, path: &Path, mode: u32) -> io::Result<()> {
		let full = self.resolve(path)?;
		fs::create_dir(&full)?;
		fs::set_permissions(&full, fs::Permissions::from_mode(mode))
	}

	fn mkdir_all(&self, path: &Path, mode: u32) -> io::Result<()> {
		let full = self.resolve(path)?;
		fs::create_dir_all(&full)?;
		fs::set_permissions(&full, fs::Permissions::from_mode(mode))
	}

	fn remove(&self, path: &Path) -> io::Result<()> {
		let full = self.resolve(path)?;
		let meta = fs::symlink_metadata(&full)?;
		if meta.is_dir() {
			fs::remove_dir(full)
		} else {
			fs::remove_file(full)
		}
	}

	fn rename(&self, old: &Path, new: &Path) -> io::Result<()> {
		fs::rename(self.resolve(old)?, self.resolve(new)?)
	}

	fn chmod(&self, path: &Path, mode: u32) -> io::Result<()> {
		fs::set_permissions(self.resolve(path)?, fs::Permissions::from_mode(mode))
	}

	fn chtimes(&self, path: &Path, mtime_sec: i64, mtime_nsec: u32) -> io::Result<()> {
		let full = self.resolve(path)?;
		let mtime = SystemTime::UNIX_EPOCH
			+ std::time::Duration::from_secs(mtime_sec.max(0) as u64)
			+ std::time::Duration::from_nanos(mtime_nsec as u64);
		let now = SystemTime::now();
		let file = fs::File::open(&full)?;
		file.set_modified(mtime)?;
		let _ = now;
		Ok(())
	}

	fn read_symlink(&self, path: &Path) -> io::Result<(String, FileKind)> {
		let full = self.resolve(path)?;
		let target = fs::read_link(&full)?;
		let kind = match fs::metadata(&full) {
			Ok(m) if m.is_dir() => FileKind::Dir,
			_ => FileKind::File,
		};
		Ok((target.to_string_lossy().into_owned(), kind))
	}

	fn create_symlink(&self, path: &Path, target: &str, _kind: FileKind) -> io::Result<()> {
		std::os::unix::fs::symlink(target, self.resolve(path)?)
	}

	fn dir_names(&self, path: &Path) -> io::Result<Vec<String>> {
		let full = self.resolve(path)?;
		let mut names = Vec::new();
		for entry in fs::read_dir(full)? {
			let entry = entry?;
			names.push(entry.file_name().to_string_lossy().into_owned());
		}
		Ok(names)
	}

	fn hide(&self, _path: &Path) -> io::Result<()> {
		// Dotfiles are hidden by naming convention on this platform; the
		// caller is expected to have already chosen a dotted name.
		Ok(())
	}

	fn uri(&self) -> &str {
		self.root.to_str().unwrap_or("")
	}
}


// vim: ts=4
