/// Hex digest of `bytes`, truncated to `len` characters
pub fn short_hash(bytes: &[u8], len: usize) -> String {
    let hex = blake3::hash(bytes).to_hex();
    hex.as_str()[..len.min(hex.len())].to_string()
}

/// Digest used in content-hash file names
pub fn content_hash(bytes: &[u8]) -> String {
    short_hash(bytes, 16)
}

/// Digest over several parts, each length-prefixed so boundaries cannot collide
pub fn hash_parts(parts: &[&[u8]], len: usize) -> String {
    let mut hasher = blake3::Hasher::new();
    for part in parts {
        hasher.update(&(part.len() as u64).to_le_bytes());
        hasher.update(part);
    }
    let hex = hasher.finalize().to_hex();
    hex.as_str()[..len.min(hex.len())].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_hash_is_stable_hex() {
        let a = content_hash(b"hello");
        assert_eq!(a, content_hash(b"hello"));
        assert_eq!(a.len(), 16);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, content_hash(b"hello!"));
    }

    #[test]
    fn test_hash_parts_respects_boundaries() {
        assert_ne!(hash_parts(&[b"ab", b"c"], 16), hash_parts(&[b"a", b"bc"], 16));
    }
}
