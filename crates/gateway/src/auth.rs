//! Observer token check.
//!
//! Reads `SA_API_TOKEN` **once at startup** and caches its SHA-256 digest in
//! [`AppState`]. If the env var is unset or empty, the server logs a
//! warning once and allows unauthenticated observer connections (dev mode).

use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// Compute the digest to cache in `AppState`, or `None` for dev mode.
pub fn token_hash_from_env() -> Option<Vec<u8>> {
    let token = std::env::var("SA_API_TOKEN").unwrap_or_default();
    if token.is_empty() {
        tracing::warn!("SA_API_TOKEN not set; observer connections are unauthenticated (dev mode)");
        return None;
    }
    Some(Sha256::digest(token.as_bytes()).to_vec())
}

/// Check a token presented by a connecting observer against the cached
/// digest. Always `true` in dev mode (`expected` is `None`).
pub fn check(expected: Option<&Vec<u8>>, provided: Option<&str>) -> bool {
    let Some(expected) = expected else {
        return true;
    };
    let provided_hash = Sha256::digest(provided.unwrap_or("").as_bytes());
    bool::from(provided_hash.ct_eq(expected.as_slice()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dev_mode_accepts_anything_when_no_token_configured() {
        assert!(check(None, None));
        assert!(check(None, Some("whatever")));
    }

    #[test]
    fn matching_token_is_accepted() {
        let expected = Sha256::digest(b"secret").to_vec();
        assert!(check(Some(&expected), Some("secret")));
    }

    #[test]
    fn wrong_token_is_rejected() {
        let expected = Sha256::digest(b"secret").to_vec();
        assert!(!check(Some(&expected), Some("wrong")));
    }

    #[test]
    fn missing_token_is_rejected_when_one_is_configured() {
        let expected = Sha256::digest(b"secret").to_vec();
        assert!(!check(Some(&expected), None));
    }
}
