//! State fingerprints and task identities.
//!
//! All hashes are SHA-256, truncated to 16 hex chars. Synthetic node
//! identity is derived from the canonicalized URL, never from link text,
//! so two links to the same page always resolve to the same placeholder.

use sha2::{Digest, Sha256};

const HASH_LEN: usize = 16;

fn short_sha256(input: &str) -> String {
    let digest = Sha256::digest(input.as_bytes());
    let mut hex = hex::encode(digest);
    hex.truncate(HASH_LEN);
    hex
}

/// Content fingerprint for a captured page state.
///
/// Combines the URL path+query with the semantic element signature so
/// that distinct pages sharing a template still hash differently.
pub fn state_fingerprint(url_path: &str, semantic_signature: &str) -> String {
    short_sha256(&format!("{}::{}", url_path, semantic_signature))
}

/// Identity for a frontier task or a synthetic fallback node.
pub fn url_hash(canonical_url: &str) -> String {
    short_sha256(canonical_url)
}
