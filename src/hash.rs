// Cache files are named `I$` followed by 32 hex characters: the
// low-nibble-first rendering of a 16-byte URL hash. Non-standard nibble
// order, kept on purpose so existing on-disk filenames keep matching.

use std::io::Cursor;
use std::path::{Path, PathBuf};

pub const PREFIX: &[u8; 2] = b"I$";
pub const HASH_BYTES: usize = 16;
pub const FILENAME_LEN: usize = PREFIX.len() + HASH_BYTES * 2;

const HEX_CHARS: &[u8; 16] = b"0123456789ABCDEF";

// Opaque 128-bit hash of a URL, used as a stable on-disk identifier.
pub fn hash_from_url(url: &str) -> [u8; HASH_BYTES] {
    let mut cursor = Cursor::new(url.as_bytes());
    let hash = murmur3::murmur3_x64_128(&mut cursor, 0)
        .expect("hashing an in-memory byte slice never fails");
    hash.to_le_bytes()
}

// Render 16 raw bytes as 32 hex characters, low nibble first per byte.
fn encode_hex_low_nibble_first(bytes: &[u8; HASH_BYTES]) -> [u8; HASH_BYTES * 2] {
    let mut out = [0u8; HASH_BYTES * 2];
    for (i, byte) in bytes.iter().enumerate() {
        out[i * 2] = HEX_CHARS[(byte & 0x0f) as usize];
        out[i * 2 + 1] = HEX_CHARS[(byte >> 4) as usize];
    }
    out
}

// Inverse of encode_hex_low_nibble_first. None on any non-hex character,
// callers treat that as "not a cache file".
pub fn bytes_from_hex(hex32: &str) -> Option<[u8; HASH_BYTES]> {
    let hex = hex32.as_bytes();
    if hex.len() != HASH_BYTES * 2 {
        return None;
    }

    fn nibble(c: u8) -> Option<u8> {
        match c {
            b'0'..=b'9' => Some(c - b'0'),
            b'a'..=b'f' => Some(c - b'a' + 10),
            b'A'..=b'F' => Some(c - b'A' + 10),
            _ => None,
        }
    }

    let mut out = [0u8; HASH_BYTES];
    for i in 0..HASH_BYTES {
        let lo = nibble(hex[i * 2])?;
        let hi = nibble(hex[i * 2 + 1])?;
        out[i] = (hi << 4) | lo;
    }
    Some(out)
}

// "I$" + 32 hex chars naming the on-disk file for `url`.
pub fn filename_of(url: &str) -> String {
    let hash = hash_from_url(url);
    let hex = encode_hex_low_nibble_first(&hash);
    let mut name = String::with_capacity(FILENAME_LEN);
    name.push_str(std::str::from_utf8(PREFIX).unwrap());
    name.push_str(std::str::from_utf8(&hex).unwrap());
    name
}

// Join cache_dir and a filename (from filename_of, or a directory entry
// already known to be a cache file).
pub fn full_path(cache_dir: &Path, name: &str) -> PathBuf {
    cache_dir.join(name)
}

// True iff name has the exact cache-file shape: length 34, starting with
// the "I$" prefix. Doesn't validate the hex body.
pub fn is_cache_filename(name: &str) -> bool {
    name.len() == FILENAME_LEN && name.as_bytes().starts_with(PREFIX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filename_is_deterministic_and_fixed_length() {
        let a = filename_of("http://host/a.png");
        let b = filename_of("http://host/a.png");
        assert_eq!(a, b);
        assert_eq!(a.len(), FILENAME_LEN);
        assert!(a.starts_with("I$"));
    }

    #[test]
    fn different_urls_hash_differently() {
        let a = filename_of("http://host/a.png");
        let b = filename_of("http://host/b.png");
        assert_ne!(a, b);
    }

    #[test]
    fn hex_roundtrip_for_every_byte_value() {
        let bytes: [u8; HASH_BYTES] = [
            0x00, 0x01, 0x0f, 0x10, 0xff, 0xab, 0xcd, 0xef, 0x55, 0xaa, 0x7e, 0x99, 0x33, 0x21,
            0x80, 0x7f,
        ];
        let hex = encode_hex_low_nibble_first(&bytes);
        let hex_str = std::str::from_utf8(&hex).unwrap();
        let decoded = bytes_from_hex(hex_str).unwrap();
        assert_eq!(decoded, bytes);
    }

    #[test]
    fn is_cache_filename_checks_length_and_prefix() {
        let name = filename_of("http://host/a.png");
        assert!(is_cache_filename(&name));
        assert!(!is_cache_filename(".etags"));
        assert!(!is_cache_filename("I$tooshort"));
        assert!(!is_cache_filename("X$0123456789abcdef0123456789abcdef"));
    }

    #[test]
    fn bytes_from_hex_rejects_bad_input() {
        assert!(bytes_from_hex("not-hex-not-hex-not-hex-not-hex").is_none());
        assert!(bytes_from_hex("short").is_none());
    }

    #[test]
    fn full_path_joins_cache_dir_and_name() {
        let dir = Path::new("/tmp/cache");
        let name = "I$0123456789abcdef0123456789abcdef";
        assert_eq!(full_path(dir, name), dir.join(name));
    }
}
