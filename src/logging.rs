//! Logging prelude: re-exports the tracing macros used throughout the
//! crate and a helper to install a reasonable default subscriber.
//!
//! ```ignore
//! use crate::logging::*;
//! info!("scan complete");
//! ```

pub use tracing::{debug, error, info, trace, warn};

/// Install an env-filter-driven subscriber writing to stderr.
///
/// Controlled with `RUST_LOG`:
///
/// ```bash
/// RUST_LOG=debug cargo test
/// RUST_LOG=syncore::scanner=trace cargo test
/// ```
///
/// The outer process embedding this crate is free to install its own
/// subscriber instead; this is a convenience for standalone use and tests.
pub fn init_tracing() {
	let _ = tracing_subscriber::fmt()
		.with_env_filter(
			tracing_subscriber::EnvFilter::try_from_default_env()
				.unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
		)
		.with_writer(std::io::stderr)
		.try_init();
}

// vim: ts=4
