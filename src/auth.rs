use sha2::{Digest, Sha256};

/// Session tokens are stored as SHA-256 hex; clients send the raw token.
pub fn hash_access_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    let out = hasher.finalize();
    hex::encode(out)
}
