//! Query-string encoding helpers.

use sha2::{Digest, Sha256};

/// Percent-encode everything outside the RFC 3986 unreserved set.
pub fn percent_encode(s: &str) -> String {
    urlencoding::encode(s).into_owned()
}

/// Decode `%XX` escapes. Malformed escapes are kept verbatim.
pub fn percent_decode(s: &str) -> String {
    String::from_utf8_lossy(&urlencoding::decode_binary(s.as_bytes())).into_owned()
}

/// Hex-encoded SHA-256 digest.
pub fn sha256_hex(s: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(s.as_bytes());
    hex::encode(hasher.finalize())
}

/// Cut `s` to at most `max_len` bytes, then drop an incomplete `%XX`
/// escape left in the last 5 characters.
pub fn truncate_query(s: &str, max_len: usize) -> String {
    let mut end = max_len.min(s.len());
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    let mut truncated = s[..end].to_string();

    let mut tail_start = truncated.len().saturating_sub(5);
    while !truncated.is_char_boundary(tail_start) {
        tail_start -= 1;
    }
    if let Some(rel) = truncated[tail_start..].rfind('%') {
        let pos = tail_start + rel;
        if truncated.len() - pos < 3 {
            truncated.truncate(pos);
        }
    }
    truncated
}
