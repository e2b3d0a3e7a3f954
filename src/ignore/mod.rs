//! Ignore matcher: parses the ignore-pattern grammar, matches paths
//! against it in first-match-wins order, and caches lookups.
#![allow(dead_code)]

mod grammar;

pub use grammar::MatchResult;
use grammar::{dedup_lines, parse_pattern_line, parse_shard_ranges, Entry};

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::error::ParseError;
use crate::util::sha256;

struct CacheEntry {
	result: MatchResult,
	last_access: Instant,
}

/// A loaded, compiled set of ignore patterns plus a lookup cache.
pub struct Matcher {
	entries: Vec<Entry>,
	default_case_fold: bool,
	pattern_hash: [u8; 32],
	skip_ignored_dirs: bool,
	cache: Mutex<HashMap<String, CacheEntry>>,
}

/// Resolves the textual contents of an `#include`d file by name. Kept as
/// a trait so tests can supply an in-memory file set instead of touching
/// disk, and so the real filesystem implementation can route through the
/// `Filesystem` abstraction.
pub trait IncludeResolver {
	fn resolve(&self, path: &str) -> Result<String, ParseError>;
}

/// An in-memory resolver, used by tests and by callers that have already
/// read every relevant file.
pub struct StaticIncludes(pub HashMap<String, String>);

impl IncludeResolver for StaticIncludes {
	fn resolve(&self, path: &str) -> Result<String, ParseError> {
		self.0
			.get(path)
			.cloned()
			.ok_or_else(|| ParseError::UnresolvedInclude { path: path.to_string() })
	}
}

impl Matcher {
	/// Parse `root_name`'s contents (plus any `#include`s it pulls in via
	/// `resolver`) into a fresh matcher.
	pub fn load(
		root_name: &str,
		root_contents: &str,
		resolver: &dyn IncludeResolver,
		default_case_fold: bool,
	) -> Result<Matcher, ParseError> {
		let mut entries = Vec::new();
		let mut seen_lines = HashSet::new();
		let mut include_stack = HashSet::new();
		include_stack.insert(root_name.to_string());

		parse_into(
			root_contents,
			resolver,
			default_case_fold,
			&mut entries,
			&mut seen_lines,
			&mut include_stack,
		)?;

		let pattern_hash = hash_entries(&entries);
		let skip_ignored_dirs = entries.iter().all(|e| match e {
			Entry::Glob(g) => !g.negate,
			Entry::Shard(_) => true,
		});

		Ok(Matcher {
			entries,
			default_case_fold,
			pattern_hash,
			skip_ignored_dirs,
			cache: Mutex::new(HashMap::new()),
		})
	}

	pub fn empty(default_case_fold: bool) -> Matcher {
		Matcher {
			entries: Vec::new(),
			default_case_fold,
			pattern_hash: hash_entries(&[]),
			skip_ignored_dirs: false,
			cache: Mutex::new(HashMap::new()),
		}
	}

	pub fn pattern_hash(&self) -> [u8; 32] {
		self.pattern_hash
	}

	pub fn skip_ignored_dirs(&self) -> bool {
		self.skip_ignored_dirs
	}

	/// First-match-wins lookup, with caching.
	pub fn matches(&self, path: &str) -> MatchResult {
		if let Ok(mut cache) = self.cache.lock() {
			if let Some(entry) = cache.get_mut(path) {
				entry.last_access = Instant::now();
				return entry.result.clone();
			}
		}

		let result = self.matches_uncached(path);

		if let Ok(mut cache) = self.cache.lock() {
			cache.insert(path.to_string(), CacheEntry { result: result.clone(), last_access: Instant::now() });
		}

		result
	}

	fn matches_uncached(&self, path: &str) -> MatchResult {
		let mut path_hash = None;
		for entry in &self.entries {
			match entry {
				Entry::Glob(g) => {
					// Case-folding was baked into each compiled matcher at
					// load time (default_case_fold combined with any
					// explicit `(?i)`), so the raw path is compared as-is.
					if g.is_match(path, false) {
						return g.result();
					}
				}
				Entry::Shard(s) => {
					let h = path_hash.get_or_insert_with(|| sha256(path.as_bytes()));
					if s.is_match(h) {
						return s.result();
					}
				}
			}
		}
		MatchResult { ignored: false, deletable: false }
	}

	/// Reuse the existing cache iff `new` compiled to the same pattern
	/// set, otherwise start fresh. Returns the (possibly cache-preserving)
	/// replacement matcher.
	pub fn reload(self, new: Matcher) -> Matcher {
		if self.pattern_hash == new.pattern_hash {
			Matcher { cache: self.cache, ..new }
		} else {
			new
		}
	}

	/// Drop cache entries whose last access predates `now - ttl`.
	pub fn evict_stale(&self, ttl: Duration) {
		let cutoff = Instant::now().checked_sub(ttl);
		if let (Ok(mut cache), Some(cutoff)) = (self.cache.lock(), cutoff) {
			cache.retain(|_, entry| entry.last_access >= cutoff);
		}
	}

	pub fn cache_len(&self) -> usize {
		self.cache.lock().map(|c| c.len()).unwrap_or(0)
	}
}

fn hash_entries(entries: &[Entry]) -> [u8; 32] {
	let mut buf = Vec::new();
	for e in entries {
		match e {
			Entry::Glob(g) => buf.extend_from_slice(g.raw.as_bytes()),
			Entry::Shard(s) => {
				buf.extend_from_slice(&s.start);
				buf.extend_from_slice(&s.end);
				buf.push(s.purge as u8);
			}
		}
		buf.push(0);
	}
	sha256(&buf)
}

fn parse_into(
	contents: &str,
	resolver: &dyn IncludeResolver,
	default_case_fold: bool,
	entries: &mut Vec<Entry>,
	seen_lines: &mut HashSet<String>,
	include_stack: &mut HashSet<String>,
) -> Result<(), ParseError> {
	for raw_line in contents.lines() {
		let line = raw_line.trim_end_matches('\r');
		let trimmed = line.trim();
		if trimmed.is_empty() || trimmed.starts_with("//") {
			continue;
		}

		if let Some(arg) = trimmed.strip_prefix("#include") {
			let arg = arg.trim();
			if arg.is_empty() {
				return Err(ParseError::EmptyInclude);
			}
			if !include_stack.insert(arg.to_string()) {
				return Err(ParseError::CyclicInclude { path: arg.to_string() });
			}
			let included = resolver.resolve(arg)?;
			parse_into(&included, resolver, default_case_fold, entries, seen_lines, include_stack)?;
			include_stack.remove(arg);
			continue;
		}

		if let Some(ranges) = trimmed.strip_prefix("#shard-exclude-purge:") {
			if !dedup_lines(seen_lines, trimmed) {
				continue;
			}
			for shard in parse_shard_ranges(ranges.trim(), true)? {
				entries.push(Entry::Shard(shard));
			}
			continue;
		}

		if let Some(ranges) = trimmed.strip_prefix("#shard-exclude:") {
			if !dedup_lines(seen_lines, trimmed) {
				continue;
			}
			for shard in parse_shard_ranges(ranges.trim(), false)? {
				entries.push(Entry::Shard(shard));
			}
			continue;
		}

		if !dedup_lines(seen_lines, trimmed) {
			continue;
		}
		entries.push(Entry::Glob(parse_pattern_line(trimmed, default_case_fold)?));
	}
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;

	fn resolver(pairs: &[(&str, &str)]) -> StaticIncludes {
		StaticIncludes(pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect())
	}

	#[test]
	fn first_match_wins() {
		let m = Matcher::load("root", "*.log\n!important.log\n", &resolver(&[]), false).unwrap();
		assert!(m.matches("debug.log").ignored);
		assert!(!m.matches("important.log").ignored);
	}

	#[test]
	fn no_match_means_not_ignored() {
		let m = Matcher::load("root", "*.log\n", &resolver(&[]), false).unwrap();
		assert!(!m.matches("src/main.rs").ignored);
	}

	#[test]
	fn deletable_flag_carried_through() {
		let m = Matcher::load("root", "(?d)build/\n", &resolver(&[]), false).unwrap();
		let r = m.matches("build/output.o");
		assert!(r.ignored);
		assert!(r.deletable);
	}

	#[test]
	fn include_pulls_in_patterns() {
		let r = resolver(&[("common.ignore", "*.tmp\n")]);
		let m = Matcher::load("root", "#include common.ignore\n*.bak\n", &r, false).unwrap();
		assert!(m.matches("a.tmp").ignored);
		assert!(m.matches("a.bak").ignored);
	}

	#[test]
	fn cyclic_include_is_rejected() {
		let r = resolver(&[("a.ignore", "#include root\n")]);
		let result = Matcher::load("root", "#include a.ignore\n", &r, false);
		assert!(result.is_err());
	}

	#[test]
	fn unresolved_include_is_an_error() {
		let m = Matcher::load("root", "#include missing.ignore\n", &resolver(&[]), false);
		assert!(m.is_err());
	}

	#[test]
	fn duplicate_lines_across_includes_are_deduped() {
		let r = resolver(&[("common.ignore", "*.tmp\n")]);
		let m = Matcher::load("root", "#include common.ignore\n*.tmp\n", &r, false).unwrap();
		// only one compiled entry should exist for the duplicated line
		assert_eq!(m.entries.len(), 1);
	}

	#[test]
	fn reload_preserves_cache_when_pattern_set_is_unchanged() {
		let m1 = Matcher::load("root", "*.log\n", &resolver(&[]), false).unwrap();
		m1.matches("a.log");
		assert_eq!(m1.cache_len(), 1);

		let m2 = Matcher::load("root", "*.log\n", &resolver(&[]), false).unwrap();
		let reloaded = m1.reload(m2);
		assert_eq!(reloaded.cache_len(), 1);
	}

	#[test]
	fn reload_clears_cache_when_pattern_set_changes() {
		let m1 = Matcher::load("root", "*.log\n", &resolver(&[]), false).unwrap();
		m1.matches("a.log");
		assert_eq!(m1.cache_len(), 1);

		let m2 = Matcher::load("root", "*.bak\n", &resolver(&[]), false).unwrap();
		let reloaded = m1.reload(m2);
		assert_eq!(reloaded.cache_len(), 0);
	}

	#[test]
	fn skip_ignored_dirs_is_false_when_a_negated_rule_exists() {
		let m = Matcher::load("root", "*.log\n!keep.log\n", &resolver(&[]), false).unwrap();
		assert!(!m.skip_ignored_dirs());
		let m2 = Matcher::load("root", "*.log\n", &resolver(&[]), false).unwrap();
		assert!(m2.skip_ignored_dirs());
	}

	#[test]
	fn shard_exclude_purge_sets_deletable() {
		let m = Matcher::load("root", "#shard-exclude-purge:00-ff\n", &resolver(&[]), false).unwrap();
		let r = m.matches("anything");
		assert!(r.ignored);
		assert!(r.deletable);
	}

	#[test]
	fn evict_stale_removes_old_entries_after_ttl() {
		let m = Matcher::load("root", "*.log\n", &resolver(&[]), false).unwrap();
		m.matches("a.log");
		assert_eq!(m.cache_len(), 1);
		m.evict_stale(Duration::from_secs(0));
		assert_eq!(m.cache_len(), 0);
	}
}

// vim: ts=4
