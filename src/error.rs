//! Error types for the sync core.

use std::error::Error;
use std::fmt;
use std::io;

/// Helper to cut down on `Box::new(...) as Box<dyn Error + Send + Sync>`
/// boilerplate when wrapping a nested error type into a variant field.
#[inline]
pub fn boxed_error<E: Error + Send + Sync + 'static>(e: E) -> Box<dyn Error + Send + Sync> {
	Box::new(e)
}

/// Unified error type for the scanner, ignore matcher, block requester,
/// change-set applier, and versioner.
///
/// Per-file failures during a scan or an apply are collected rather than
/// raised; this type is what gets collected, and what a caller sees when
/// an operation that has no larger context to keep running in fails
/// outright.
#[derive(Debug)]
pub enum SyncError {
	/// Expected path does not exist. Usually swallowed by the caller.
	NotFound { path: String },

	/// Permission denied; the caller may retry after relaxing the parent
	/// directory's write bit.
	Permission { path: String, source: io::Error },

	/// A file's size or modification time changed while it was being
	/// hashed; the partial result was discarded.
	IntegrityChanged { path: String },

	/// Neither the local requester nor the network requester could supply
	/// a block; the file is abandoned with this error attached.
	BlockUnavailable { path: String, offset: u64 },

	/// The target of a write has a version vector concurrent with the
	/// incoming one and could not be reconciled automatically.
	Conflict { path: String },

	/// Ignore-file grammar error.
	Parse(ParseError),

	/// Operation was cancelled via a cancellation token.
	Cancelled,

	/// Generic I/O error with no more specific classification.
	Io(io::Error),

	/// Change-set application error (nested; see `ApplyError`).
	Apply(Box<dyn Error + Send + Sync>),

	/// Versioner error (nested).
	Versioner(Box<dyn Error + Send + Sync>),

	/// Catch-all for conditions with no dedicated variant.
	Other { message: String },
}

impl fmt::Display for SyncError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			SyncError::NotFound { path } => write!(f, "not found: {}", path),
			SyncError::Permission { path, source } => {
				write!(f, "permission denied on {}: {}", path, source)
			}
			SyncError::IntegrityChanged { path } => {
				write!(f, "{} changed while being hashed", path)
			}
			SyncError::BlockUnavailable { path, offset } => {
				write!(f, "no source had the block at {}:{}", path, offset)
			}
			SyncError::Conflict { path } => write!(f, "concurrent modification of {}", path),
			SyncError::Parse(e) => write!(f, "ignore pattern parse error: {}", e),
			SyncError::Cancelled => write!(f, "operation cancelled"),
			SyncError::Io(e) => write!(f, "I/O error: {}", e),
			SyncError::Apply(e) => write!(f, "apply error: {}", e),
			SyncError::Versioner(e) => write!(f, "versioner error: {}", e),
			SyncError::Other { message } => write!(f, "{}", message),
		}
	}
}

impl Error for SyncError {
	fn source(&self) -> Option<&(dyn Error + 'static)> {
		match self {
			SyncError::Permission { source, .. } => Some(source),
			SyncError::Io(e) => Some(e),
			SyncError::Parse(e) => Some(e),
			_ => None,
		}
	}
}

impl From<io::Error> for SyncError {
	fn from(e: io::Error) -> Self {
		SyncError::Io(e)
	}
}

impl From<ParseError> for SyncError {
	fn from(e: ParseError) -> Self {
		SyncError::Parse(e)
	}
}

impl From<ApplyError> for SyncError {
	fn from(e: ApplyError) -> Self {
		SyncError::Apply(boxed_error(e))
	}
}

impl From<String> for SyncError {
	fn from(e: String) -> Self {
		SyncError::Other { message: e }
	}
}

/// Ignore-file grammar error, produced while parsing pattern lines.
#[derive(Debug)]
pub enum ParseError {
	InvalidGlob { pattern: String, message: String },
	UnresolvedInclude { path: String },
	CyclicInclude { path: String },
	EmptyInclude,
	DuplicatePrefix { pattern: String, prefix: &'static str },
	EmptyPattern,
	InvalidShardRange { range: String },
}

impl fmt::Display for ParseError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			ParseError::InvalidGlob { pattern, message } => {
				write!(f, "invalid glob '{}': {}", pattern, message)
			}
			ParseError::UnresolvedInclude { path } => {
				write!(f, "could not resolve #include {}", path)
			}
			ParseError::CyclicInclude { path } => write!(f, "cyclic #include of {}", path),
			ParseError::EmptyInclude => write!(f, "#include with no argument"),
			ParseError::DuplicatePrefix { pattern, prefix } => {
				write!(f, "prefix '{}' repeated in pattern '{}'", prefix, pattern)
			}
			ParseError::EmptyPattern => write!(f, "pattern is empty after prefix stripping"),
			ParseError::InvalidShardRange { range } => {
				write!(f, "invalid shard-exclude range '{}'", range)
			}
		}
	}
}

impl Error for ParseError {}

/// A single failed item during `apply()`. Collected rather than raised so
/// the applier can keep processing the rest of the queue.
#[derive(Debug)]
pub struct OpError {
	pub path: String,
	pub source: SyncError,
	pub must_rescan: bool,
}

impl fmt::Display for OpError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}: {}", self.path, self.source)
	}
}

/// Aggregated result of an `apply()` call: every per-item failure, plus a
/// sticky flag asking the caller to rescan before retrying.
#[derive(Debug, Default)]
pub struct ApplyError {
	pub errors: Vec<OpError>,
	pub must_rescan: bool,
}

impl ApplyError {
	pub fn push(&mut self, err: OpError) {
		self.must_rescan |= err.must_rescan;
		self.errors.push(err);
	}

	pub fn is_empty(&self) -> bool {
		self.errors.is_empty()
	}
}

impl fmt::Display for ApplyError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{} item(s) failed to apply", self.errors.len())?;
		if self.must_rescan {
			write!(f, " (rescan required)")?;
		}
		Ok(())
	}
}

impl Error for ApplyError {}


// vim: ts=4
