//! Small pure helpers shared by the seed crawler and manifest (§4.7).

use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

const FORBIDDEN_CHARS: &[char] = &['\\', '/', ':', '*', '?', '"', '<', '>', '|'];
const MAX_FILENAME_BYTES: usize = 200;

/// Strips forbidden/control characters and caps length at 200 UTF-8 bytes;
/// falls back to the content hash when the result would be empty (§4.7).
pub fn safe_filename(raw: &str, content_sha256: &str) -> String {
    let cleaned: String = raw
        .chars()
        .filter(|c| !FORBIDDEN_CHARS.contains(c) && !c.is_control())
        .collect();

    let truncated = truncate_utf8(&cleaned, MAX_FILENAME_BYTES);
    if truncated.trim().is_empty() {
        content_sha256.to_string()
    } else {
        truncated
    }
}

fn truncate_utf8(s: &str, max_bytes: usize) -> String {
    if s.len() <= max_bytes {
        return s.to_string();
    }
    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    s[..end].to_string()
}

/// The URL's last path segment, used as a starting point for a download's
/// final filename before sanitization (§4.7).
pub fn last_segment(url: &url::Url) -> String {
    url.path_segments()
        .and_then(|mut segs| segs.next_back())
        .filter(|s| !s.is_empty())
        .unwrap_or("index")
        .to_string()
}

/// Picks a collision-free path under `dir` for `base_name`, appending
/// `_1`, `_2`, ... when a different-content file already occupies the name
/// (§4.7). Returns the chosen path unconditionally when `dir` doesn't exist
/// yet or the name is free.
pub fn resolve_collision(dir: &Path, base_name: &str, content_sha256: &str) -> PathBuf {
    let candidate = dir.join(base_name);
    if !candidate.exists() || existing_matches(&candidate, content_sha256) {
        return candidate;
    }
    let (stem, ext) = split_ext(base_name);
    for n in 1.. {
        let name = match &ext {
            Some(ext) => format!("{stem}_{n}.{ext}"),
            None => format!("{stem}_{n}"),
        };
        let candidate = dir.join(&name);
        if !candidate.exists() || existing_matches(&candidate, content_sha256) {
            return candidate;
        }
    }
    unreachable!("collision loop is unbounded")
}

fn existing_matches(path: &Path, content_sha256: &str) -> bool {
    match std::fs::read(path) {
        Ok(bytes) => sha256_hex(&bytes) == content_sha256,
        Err(_) => false,
    }
}

fn split_ext(name: &str) -> (String, Option<String>) {
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => (stem.to_string(), Some(ext.to_string())),
        _ => (name.to_string(), None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_forbidden_characters() {
        assert_eq!(safe_filename("a/b:c*d?.pdf", "deadbeef"), "abcd.pdf");
    }

    #[test]
    fn falls_back_to_hash_when_empty() {
        assert_eq!(safe_filename("***///", "deadbeef"), "deadbeef");
    }

    #[test]
    fn sha256_hex_is_deterministic() {
        assert_eq!(sha256_hex(b"hello"), sha256_hex(b"hello"));
        assert_ne!(sha256_hex(b"hello"), sha256_hex(b"world"));
    }
}
