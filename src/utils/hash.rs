//! Content and parameter-set hashing.
//!
//! The module cache verifies entries by SHA-256 of the source text; the load
//! cache is keyed by a hash of the supplied parameter values with key order
//! normalized first, so `{a=1, b=2}` and `{b=2, a=1}` hash identically.

use std::collections::BTreeMap;

use sha2::{Digest, Sha256};

/// SHA-256 of a document's source text, hex encoded.
#[must_use]
pub fn hash_text(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hex::encode(hasher.finalize())
}

/// Stable hash of a parameter-value set.
///
/// `BTreeMap` iteration already normalizes key order; the JSON rendering
/// gives an unambiguous byte representation to hash.
#[must_use]
pub fn hash_params(params: &BTreeMap<String, String>) -> String {
    let rendered = serde_json::to_string(params).unwrap_or_default();
    let mut hasher = Sha256::new();
    hasher.update(rendered.as_bytes());
    hex::encode(hasher.finalize())
}
