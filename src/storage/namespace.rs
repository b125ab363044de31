//! Namespace Keys
//!
//! Every physical table key is the byte concatenation of a caller-supplied
//! prefix and key. There is no delimiter: `("ab", "c")` and `("a", "bc")`
//! address the same entry, so callers must pick prefixes that cannot be
//! confused with each other's suffixes.
//!
//! Single-key operations, enumeration and prefix drops all go through this
//! module so they address exactly the same key set.

use bytes::{BufMut, Bytes, BytesMut};

/// Composes a namespace key from a prefix and a key.
pub fn namespace_key(prefix: &[u8], key: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(prefix.len() + key.len());
    buf.put_slice(prefix);
    buf.put_slice(key);
    buf.freeze()
}

/// Returns true if `key` starts with `prefix` and is byte-wise `>= seek`.
#[inline]
pub fn matches(key: &[u8], prefix: &[u8], seek: &[u8]) -> bool {
    key.starts_with(prefix) && key >= seek
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_namespace_key_concatenates() {
        assert_eq!(namespace_key(b"user:", b"1"), Bytes::from("user:1"));
        assert_eq!(namespace_key(b"", b"1"), Bytes::from("1"));
        assert_eq!(namespace_key(b"user:", b""), Bytes::from("user:"));
    }

    #[test]
    fn test_no_delimiter() {
        assert_eq!(namespace_key(b"ab", b"c"), namespace_key(b"a", b"bc"));
    }

    #[test]
    fn test_matches_prefix_and_seek() {
        assert!(matches(b"user:b", b"user:", b""));
        assert!(matches(b"user:b", b"user:", b"user:b"));
        assert!(matches(b"user:c", b"user:", b"user:b"));
        assert!(!matches(b"user:a", b"user:", b"user:b"));
        assert!(!matches(b"group:a", b"user:", b""));
    }

    #[test]
    fn test_seek_is_bytewise() {
        // 0xff sorts after every ASCII byte
        assert!(matches(&[b'p', 0xff], b"p", b"pz"));
        assert!(!matches(b"p\x00", b"p", b"pa"));
    }
}
