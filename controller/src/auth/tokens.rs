use sha2::{Digest, Sha256};

use crate::config::AppConfig;

/// Constant-time check of the `X-Agent-Token` header against the
/// configured agent token (§6, auth). Delegates to `AppConfig` so an
/// empty configured token always rejects rather than matching an empty
/// header.
pub fn check_agent_token(config: &AppConfig, provided: &str) -> bool {
    config.validate_agent_token(provided)
}

/// Constant-time check of a bearer admin token, used for the bootstrap
/// path and as an always-available alternative to a session cookie.
pub fn check_admin_token(config: &AppConfig, provided: &str) -> bool {
    config.validate_admin_token(provided)
}

/// Salted SHA-256 password hash, stored as `hex(salt) ':' hex(digest)`.
/// The teacher's stack carries no password-hashing crate (its own
/// first-party credential is OIDC-federated); this reuses the same
/// `sha2` dependency already pulled in for token hashing rather than
/// adding a new one for a single admin-login path.
pub fn hash_password(password: &str) -> String {
    let mut salt = [0u8; 16];
    rand::RngCore::fill_bytes(&mut rand::rng(), &mut salt);
    let digest = salted_digest(&salt, password);
    format!("{}:{}", hex::encode(salt), hex::encode(digest))
}

pub fn verify_password(stored: &str, candidate: &str) -> bool {
    let Some((salt_hex, digest_hex)) = stored.split_once(':') else {
        return false;
    };
    let Ok(salt) = hex::decode(salt_hex) else { return false };
    let Ok(expected) = hex::decode(digest_hex) else { return false };
    let actual = salted_digest(&salt, candidate);

    use subtle::ConstantTimeEq;
    actual.ct_eq(&expected).into()
}

fn salted_digest(salt: &[u8], password: &str) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(salt);
    hasher.update(password.as_bytes());
    hasher.finalize().to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_then_verify_round_trips() {
        let hash = hash_password("hunter2");
        assert!(verify_password(&hash, "hunter2"));
    }

    #[test]
    fn verify_rejects_wrong_password() {
        let hash = hash_password("hunter2");
        assert!(!verify_password(&hash, "wrong"));
    }

    #[test]
    fn verify_rejects_malformed_stored_hash() {
        assert!(!verify_password("not-a-valid-hash", "anything"));
    }

    #[test]
    fn successive_hashes_of_same_password_differ() {
        assert_ne!(hash_password("hunter2"), hash_password("hunter2"));
    }
}
