//! Invite token generation and hashing.

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::Rng;
use sha2::{Digest, Sha256};

/// Generate a fresh 256-bit invite token, URL-safe base64 without padding.
pub fn generate_invite_token() -> String {
    let mut rng = rand::thread_rng();
    let token_bytes: [u8; 32] = rng.gen();
    URL_SAFE_NO_PAD.encode(token_bytes)
}

/// Hash a raw invite token for storage and lookup.
///
/// Only the hash is ever persisted; a leaked table row cannot be turned
/// back into a usable token.
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}
