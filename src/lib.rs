//! # syncore - deduplicating filesystem synchronization core
//!
//! `syncore` is the content-addressed core of a file synchronizer: a
//! scanner that turns a directory tree into block-hashed `FileInfo`
//! records, an ignore matcher with its own pattern grammar, an async
//! block requester, a change-set applier, and a set of versioner
//! policies. It does not speak any wire protocol, does not discover
//! peers, and does not own a database or a CLI — those are the outer
//! process's job, and this crate only ever sees them through the
//! trait interfaces in [`external`].
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use syncore::config::Options;
//! use syncore::external::{NoCurrentFiler, NoProgresser};
//! use syncore::fs::StdFilesystem;
//! use syncore::ignore::{Matcher, StaticIncludes};
//! use syncore::scanner::{CancelToken, Scanner};
//! use std::collections::HashMap;
//!
//! let fsys = StdFilesystem::new("/path/to/folder");
//! let matcher = Matcher::load("root", "", &StaticIncludes(HashMap::new()), false)?;
//! let filer = NoCurrentFiler;
//! let options = Options::default();
//! let scanner = Scanner { fs: &fsys, matcher: &matcher, current: &filer, options: &options, modifier_id: 1 };
//! for result in scanner.scan(CancelToken::new()) {
//!     if let Some(file) = result.file {
//!         println!("{}: {} bytes", file.name, file.size);
//!     }
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Using the Builder Pattern
//!
//! ```rust,ignore
//! use syncore::config::Options;
//!
//! let options = Options::new()
//!     .with_hasher_workers(8)
//!     .with_requester_parallelism(32)
//!     .with_max_conflicts(5);
//! ```

#![deny(unsafe_code)]
#![warn(dead_code)]

pub mod apply;
pub mod callbacks;
pub mod config;
pub mod error;
pub mod external;
pub mod fs;
pub mod ignore;
pub mod logging;
pub mod requester;
pub mod scanner;
pub mod types;
pub mod util;
pub mod versioner;

pub use config::{Normalization, Options};
pub use error::{ApplyError, OpError, ParseError, SyncError};
pub use external::{Archiver, CurrentFiler, Progresser, RequestBackend};
pub use fs::{Filesystem, StdFilesystem};
pub use ignore::Matcher;
pub use scanner::{CancelToken, ScanResult, Scanner};
pub use types::{BlockInfo, FileInfo, FileKind, ModTime, Version};

// vim: ts=4
