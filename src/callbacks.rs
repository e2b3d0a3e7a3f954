//! Closure-based convenience adapters over the [`Progresser`] and
//! [`Archiver`] external interfaces (§6), in the same callback-builder
//! shape this codebase uses elsewhere for embedding surfaces.
#![allow(dead_code)]

use std::path::Path;
use std::sync::Mutex;

use crate::error::SyncError;
use crate::external::{Archiver, Progresser};
use crate::types::FileInfo;

type StartedFn = dyn Fn(&FileInfo) + Send + Sync;
type ProgressFn = dyn Fn(&FileInfo, i64, i64, i64) + Send + Sync;
type CompletedFn = dyn Fn(&FileInfo, Option<&SyncError>) + Send + Sync;

/// Builds a [`Progresser`] from independent closures; any hook left unset
/// is a no-op.
pub struct ProgressCallbackBuilder {
	started: Option<Box<StartedFn>>,
	progress: Option<Box<ProgressFn>>,
	completed: Option<Box<CompletedFn>>,
}

impl ProgressCallbackBuilder {
	pub fn new() -> Self {
		ProgressCallbackBuilder { started: None, progress: None, completed: None }
	}

	pub fn on_started<F>(mut self, f: F) -> Self
	where
		F: Fn(&FileInfo) + Send + Sync + 'static,
	{
		self.started = Some(Box::new(f));
		self
	}

	pub fn on_progress<F>(mut self, f: F) -> Self
	where
		F: Fn(&FileInfo, i64, i64, i64) + Send + Sync + 'static,
	{
		self.progress = Some(Box::new(f));
		self
	}

	pub fn on_completed<F>(mut self, f: F) -> Self
	where
		F: Fn(&FileInfo, Option<&SyncError>) + Send + Sync + 'static,
	{
		self.completed = Some(Box::new(f));
		self
	}

	pub fn build(self) -> impl Progresser {
		ClosureProgresser { started: self.started, progress: self.progress, completed: self.completed }
	}
}

impl Default for ProgressCallbackBuilder {
	fn default() -> Self {
		Self::new()
	}
}

struct ClosureProgresser {
	started: Option<Box<StartedFn>>,
	progress: Option<Box<ProgressFn>>,
	completed: Option<Box<CompletedFn>>,
}

impl Progresser for ClosureProgresser {
	fn started(&self, file: &FileInfo) {
		if let Some(f) = &self.started {
			f(file);
		}
	}

	fn progress(&self, file: &FileInfo, copied: i64, requested: i64, downloaded: i64) {
		if let Some(f) = &self.progress {
			f(file, copied, requested, downloaded);
		}
	}

	fn completed(&self, file: &FileInfo, err: Option<&SyncError>) {
		if let Some(f) = &self.completed {
			f(file, err);
		}
	}
}

/// Counting progress sink for simple embedders that just want totals,
/// with no closures to wire up.
#[derive(Default)]
pub struct CountingProgresser {
	pub files_started: Mutex<u64>,
	pub files_completed: Mutex<u64>,
	pub files_failed: Mutex<u64>,
	pub bytes_copied: Mutex<i64>,
	pub bytes_downloaded: Mutex<i64>,
}

impl CountingProgresser {
	pub fn new() -> Self {
		Self::default()
	}
}

impl Progresser for CountingProgresser {
	fn started(&self, _file: &FileInfo) {
		*self.files_started.lock().unwrap() += 1;
	}

	fn progress(&self, _file: &FileInfo, copied: i64, _requested: i64, downloaded: i64) {
		*self.bytes_copied.lock().unwrap() += copied;
		*self.bytes_downloaded.lock().unwrap() += downloaded;
	}

	fn completed(&self, _file: &FileInfo, err: Option<&SyncError>) {
		if err.is_some() {
			*self.files_failed.lock().unwrap() += 1;
		} else {
			*self.files_completed.lock().unwrap() += 1;
		}
	}
}

/// Adapts a plain closure into an [`Archiver`], for one-off policies that
/// don't warrant implementing the trait directly (tests, small scripts).
pub struct ClosureArchiver<F>(F);

impl<F> ClosureArchiver<F>
where
	F: Fn(&Path) -> Result<(), SyncError> + Send + Sync,
{
	pub fn new(f: F) -> Self {
		ClosureArchiver(f)
	}
}

impl<F> Archiver for ClosureArchiver<F>
where
	F: Fn(&Path) -> Result<(), SyncError> + Send + Sync,
{
	fn archive(&self, path: &Path) -> Result<(), SyncError> {
		(self.0)(path)
	}
}


// vim: ts=4
