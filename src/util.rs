//! Hashing helpers shared by the scanner and the change-set applier.
#![allow(dead_code)]

use sha2::{Digest, Sha256};

/// SHA-256 of `buf`, used for both block strong hashes and whole-file
/// content-identity hashes.
pub fn sha256(buf: &[u8]) -> [u8; 32] {
	let mut hasher = Sha256::new();
	hasher.update(buf);
	hasher.finalize().into()
}

/// SHA-256 of the empty string. A size-0 file always produces exactly one
/// block carrying this hash.
pub fn empty_hash() -> [u8; 32] {
	sha256(&[])
}

/// Adler-32 rolling weak hash of `buf`, used to speed up local block
/// search. Returns 0 when weak hashing is disabled by the caller.
pub fn adler32(buf: &[u8]) -> u32 {
	adler32::RollingAdler32::from_buffer(buf).hash()
}

/// Content-identity hash for a file: the strong hash of the concatenation
/// of its block hashes, in block order. Two files with identical block
/// sequences (hence identical content) hash identically regardless of the
/// block size chosen, which is what makes rename-by-content-hash work
/// across files whose size triggered different block-size selections.
pub fn content_hash<'a>(block_hashes: impl Iterator<Item = &'a [u8; 32]>) -> [u8; 32] {
	let mut hasher = Sha256::new();
	for h in block_hashes {
		hasher.update(h);
	}
	hasher.finalize().into()
}

/// URL-safe base64 encoding of a block/content hash, for contexts that
/// need a compact text form (log lines, on-disk index keys) rather than
/// the full hex digest.
pub fn hash_b64(hash: &[u8; 32]) -> String {
	use base64::engine::{general_purpose, Engine};
	general_purpose::URL_SAFE_NO_PAD.encode(hash)
}

/// Inverse of [`hash_b64`]. Fails if `s` doesn't decode to exactly 32 bytes.
pub fn hash_from_b64(s: &str) -> Result<[u8; 32], String> {
	use base64::engine::{general_purpose, Engine};
	let bytes = general_purpose::URL_SAFE_NO_PAD.decode(s).map_err(|e| e.to_string())?;
	bytes.try_into().map_err(|v: Vec<u8>| format!("expected 32 bytes, got {}", v.len()))
}

/// MD5 hex digest, used only for the long-basename fallback in temporary
/// file naming (§6). Not used anywhere that needs collision resistance.
pub fn md5_hex(buf: &[u8]) -> String {
	use md5::{Digest as Md5Digest, Md5};
	let mut hasher = Md5::new();
	hasher.update(buf);
	hex::encode(hasher.finalize())
}

/// Effective UID of the current process; used to decide default
/// permission-comparison strictness. Wraps the one unsafe libc call the
/// crate needs.
#[allow(unsafe_code)]
pub fn effective_uid() -> u32 {
	#[cfg(unix)]
	{
		// SAFETY: geteuid() reads process credentials, no side effects.
		unsafe { libc::geteuid() }
	}
	#[cfg(not(unix))]
	{
		1000
	}
}

/// `YYYYMMDD-HHMMSS`, computed directly from a Unix timestamp with no
/// timezone database (treated as UTC; the one simplification made here
/// relative to a true "local time" stamp).
pub fn format_timestamp(unix_secs: i64) -> String {
	let days = unix_secs.div_euclid(86_400);
	let secs_of_day = unix_secs.rem_euclid(86_400);
	let (year, month, day) = civil_from_days(days);
	let hour = secs_of_day / 3600;
	let minute = (secs_of_day % 3600) / 60;
	let second = secs_of_day % 60;
	format!("{:04}{:02}{:02}-{:02}{:02}{:02}", year, month, day, hour, minute, second)
}

pub fn now_unix_secs() -> i64 {
	std::time::SystemTime::now()
		.duration_since(std::time::UNIX_EPOCH)
		.map(|d| d.as_secs() as i64)
		.unwrap_or(0)
}

/// Howard Hinnant's civil-from-days algorithm.
fn civil_from_days(z: i64) -> (i64, u32, u32) {
	let z = z + 719_468;
	let era = if z >= 0 { z } else { z - 146_096 } / 146_097;
	let doe = (z - era * 146_097) as u64;
	let yoe = (doe - doe / 1460 + doe / 36524 - doe / 146096) / 365;
	let y = yoe as i64 + era * 400;
	let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
	let mp = (5 * doy + 2) / 153;
	let d = (doy - (153 * mp + 2) / 5 + 1) as u32;
	let m = if mp < 10 { mp + 3 } else { mp - 9 } as u32;
	(if m <= 2 { y + 1 } else { y }, m, d)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn civil_from_days_matches_known_epoch_date() {
		// 2024-01-02 is 19724 days after the epoch.
		assert_eq!(civil_from_days(19724), (2024, 1, 2));
	}

	#[test]
	fn hash_b64_round_trips() {
		let hash = sha256(b"round trip me");
		let encoded = hash_b64(&hash);
		assert_eq!(hash_from_b64(&encoded).unwrap(), hash);
	}

	#[test]
	fn hash_from_b64_rejects_wrong_length() {
		assert!(hash_from_b64("dG9vc2hvcnQ").is_err());
	}

	#[test]
	fn format_timestamp_has_expected_shape() {
		let s = format_timestamp(1_700_000_000);
		assert_eq!(s.len(), 15);
		assert_eq!(s.as_bytes()[8], b'-');
	}

	#[test]
	fn empty_hash_matches_known_sha256() {
		let expected =
			hex::decode("e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855")
				.unwrap();
		assert_eq!(empty_hash().to_vec(), expected);
	}

	#[test]
	fn sha256_is_deterministic() {
		let a = sha256(b"the quick brown fox");
		let b = sha256(b"the quick brown fox");
		assert_eq!(a, b);
	}

	#[test]
	fn different_inputs_hash_differently() {
		assert_ne!(sha256(b"a"), sha256(b"b"));
	}

	#[test]
	fn content_hash_depends_on_order() {
		let a = sha256(b"block-a");
		let b = sha256(b"block-b");
		let forward = content_hash(vec![&a, &b].into_iter());
		let backward = content_hash(vec![&b, &a].into_iter());
		assert_ne!(forward, backward);
	}

	#[test]
	fn md5_hex_has_32_chars() {
		assert_eq!(md5_hex(b"some/long/basename").len(), 32);
	}
}

// vim: ts=4
