//! Ignore-pattern line grammar: parsing raw lines into compiled entries.
#![allow(dead_code)]

use globset::{Glob, GlobMatcher};
use std::collections::HashSet;

use crate::error::ParseError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchResult {
	pub ignored: bool,
	pub deletable: bool,
}

pub(crate) enum Entry {
	Glob(GlobEntry),
	Shard(ShardEntry),
}

pub(crate) struct GlobEntry {
	pub matchers: Vec<GlobMatcher>,
	pub negate: bool,
	pub deletable: bool,
	pub raw: String,
}

pub(crate) struct ShardEntry {
	pub start: [u8; 32],
	pub end: [u8; 32],
	pub purge: bool,
}

impl GlobEntry {
	pub fn is_match(&self, path: &str, case_fold: bool) -> bool {
		let folded;
		let candidate: &str = if case_fold {
			folded = path.to_lowercase();
			&folded
		} else {
			path
		};
		self.matchers.iter().any(|m| m.is_match(candidate))
	}

	pub fn result(&self) -> MatchResult {
		MatchResult { ignored: !self.negate, deletable: self.deletable }
	}
}

impl ShardEntry {
	pub fn is_match(&self, path_hash: &[u8; 32]) -> bool {
		path_hash.as_slice() >= self.start.as_slice() && path_hash.as_slice() <= self.end.as_slice()
	}

	pub fn result(&self) -> MatchResult {
		MatchResult { ignored: true, deletable: self.purge }
	}
}

/// Parse one non-comment, non-blank, non-include, non-shard pattern line
/// into a glob entry: strip known prefixes, expand glob shorthand, and
/// compile each resulting variant.
pub(crate) fn parse_pattern_line(line: &str, default_case_fold: bool) -> Result<GlobEntry, ParseError> {
	let mut rest = line;
	let mut negate = false;
	let mut case_fold = default_case_fold;
	let mut deletable = false;
	let mut seen_negate = false;
	let mut seen_case = false;
	let mut seen_deletable = false;

	loop {
		if let Some(stripped) = rest.strip_prefix('!') {
			if seen_negate {
				return Err(ParseError::DuplicatePrefix { pattern: line.to_string(), prefix: "!" });
			}
			seen_negate = true;
			negate = true;
			rest = stripped;
		} else if let Some(stripped) = rest.strip_prefix("(?i)") {
			if seen_case {
				return Err(ParseError::DuplicatePrefix { pattern: line.to_string(), prefix: "(?i)" });
			}
			seen_case = true;
			case_fold = true;
			rest = stripped;
		} else if let Some(stripped) = rest.strip_prefix("(?d)") {
			if seen_deletable {
				return Err(ParseError::DuplicatePrefix { pattern: line.to_string(), prefix: "(?d)" });
			}
			seen_deletable = true;
			deletable = true;
			rest = stripped;
		} else {
			break;
		}
	}

	if rest.is_empty() {
		return Err(ParseError::EmptyPattern);
	}

	let variants = expand_glob(rest);
	let mut matchers = Vec::with_capacity(variants.len());
	for variant in &variants {
		let glob = globset::GlobBuilder::new(variant)
			.case_insensitive(case_fold)
			.literal_separator(true)
			.build()
			.map_err(|e| ParseError::InvalidGlob { pattern: line.to_string(), message: e.to_string() })?;
		matchers.push(glob.compile_matcher());
	}

	Ok(GlobEntry { matchers, negate, deletable, raw: line.to_string() })
}

/// Expand a stripped pattern into the literal glob strings it should
/// compile to, per the trailing-`/`, bare, `**/`-prefixed, and
/// leading-`/` rules.
fn expand_glob(pattern: &str) -> Vec<String> {
	if let Some(base) = pattern.strip_suffix('/') {
		vec![format!("{}/**", base)]
	} else if let Some(rest) = pattern.strip_prefix("**/") {
		vec![pattern.to_string(), rest.to_string()]
	} else if let Some(rest) = pattern.strip_prefix('/') {
		vec![rest.to_string()]
	} else {
		vec![pattern.to_string(), format!("{}/**", pattern)]
	}
}

/// Parse a `#shard-exclude[-purge]:<ranges>` directive body into a list of
/// shard entries (one per comma-separated range).
pub(crate) fn parse_shard_ranges(ranges: &str, purge: bool) -> Result<Vec<ShardEntry>, ParseError> {
	ranges
		.split(',')
		.map(str::trim)
		.filter(|s| !s.is_empty())
		.map(|range| parse_shard_range(range, purge))
		.collect()
}

fn parse_shard_range(range: &str, purge: bool) -> Result<ShardEntry, ParseError> {
	let (lo, hi) = range
		.split_once('-')
		.ok_or_else(|| ParseError::InvalidShardRange { range: range.to_string() })?;
	let start = pad_hex(lo, '0')
		.ok_or_else(|| ParseError::InvalidShardRange { range: range.to_string() })?;
	let end = pad_hex(hi, 'f')
		.ok_or_else(|| ParseError::InvalidShardRange { range: range.to_string() })?;
	Ok(ShardEntry { start, end, purge })
}

fn pad_hex(s: &str, pad: char) -> Option<[u8; 32]> {
	if !s.chars().all(|c| c.is_ascii_hexdigit()) || s.len() > 64 {
		return None;
	}
	let mut padded = s.to_string();
	while padded.len() < 64 {
		padded.push(pad);
	}
	let bytes = hex::decode(padded).ok()?;
	let mut out = [0u8; 32];
	out.copy_from_slice(&bytes);
	Some(out)
}

/// Dedup lines as `#include` does: a set of lines already emitted by any
/// included file, so re-including the same pattern is a no-op rather than
/// a duplicate rule.
pub(crate) fn dedup_lines(seen: &mut HashSet<String>, line: &str) -> bool {
	seen.insert(line.to_string())
}


// vim: ts=4
