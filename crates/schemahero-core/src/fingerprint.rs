use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::error::SchemaHeroError;

/// Number of hex characters kept from a SHA-256 digest.
pub const SHA_PREFIX_LEN: usize = 7;

pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// `sha256(json(spec))[:7]`, the stable identity of a spec.
pub fn spec_sha<T: Serialize>(spec: &T) -> Result<String, SchemaHeroError> {
    let json = serde_json::to_vec(spec)?;
    Ok(sha256_hex(&json)[..SHA_PREFIX_LEN].to_string())
}

/// `sha256(join(":", sorted(shas)))[:7]`, the identity of a coalesced batch.
pub fn batch_sha(shas: &[String]) -> String {
    let mut sorted: Vec<&str> = shas.iter().map(String::as_str).collect();
    sorted.sort_unstable();
    sha256_hex(sorted.join(":").as_bytes())[..SHA_PREFIX_LEN].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_digest() {
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_spec_sha_is_stable_prefix() {
        let spec = serde_json::json!({"database": "app", "name": "users"});
        let a = spec_sha(&spec).unwrap();
        let b = spec_sha(&spec).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), SHA_PREFIX_LEN);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_batch_sha_ignores_order() {
        let a = batch_sha(&["bbbbbbb".into(), "aaaaaaa".into()]);
        let b = batch_sha(&["aaaaaaa".into(), "bbbbbbb".into()]);
        assert_eq!(a, b);
        assert_eq!(a, sha256_hex(b"aaaaaaa:bbbbbbb")[..7].to_string());
    }
}
