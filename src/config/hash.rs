//! Configuration hashing for change detection.
//!
//! This module provides deterministic hashing of resolved resources and
//! rendered attributes to detect changes between applies and enable
//! idempotent operations.

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::model::{ResourceSpec, Stack};

/// Hasher for computing configuration hashes.
#[derive(Debug, Default)]
pub struct ConfigHasher;

impl ConfigHasher {
    /// Creates a new configuration hasher.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Computes a hash of the entire stack.
    ///
    /// This hash changes when any resource or project setting changes.
    #[must_use]
    pub fn hash_stack(&self, stack: &Stack) -> String {
        let mut hasher = Sha256::new();

        hasher.update(stack.project.name.as_bytes());
        hasher.update(stack.project.environment.as_bytes());
        hasher.update(stack.project.region.as_bytes());

        // Sorted by address so declaration order does not matter
        let mut resources: Vec<_> = stack.resources.iter().collect();
        resources.sort_by_key(|r| r.address());
        for resource in resources {
            hasher.update(self.hash_resource(resource).as_bytes());
        }

        hex::encode(hasher.finalize())
    }

    /// Computes a hash for a single resolved resource.
    ///
    /// Maps are ordered, so the canonical JSON is stable.
    #[must_use]
    pub fn hash_resource(&self, resource: &ResourceSpec) -> String {
        Self::hash_value(resource)
    }

    /// Computes the hash of any serializable value via its JSON form.
    #[must_use]
    pub fn hash_value<T: Serialize + ?Sized>(value: &T) -> String {
        let bytes = serde_json::to_vec(value).unwrap_or_default();
        hex::encode(Sha256::digest(&bytes))
    }

    /// Computes a short hash (first 8 characters) for display purposes.
    #[must_use]
    pub fn short_hash(&self, hash: &str) -> String {
        hash.chars().take(8).collect()
    }

    /// Compares two hashes to determine if they are equal.
    #[must_use]
    pub fn hashes_match(hash1: &str, hash2: &str) -> bool {
        if hash1.len() != hash2.len() {
            return false;
        }

        hash1
            .bytes()
            .zip(hash2.bytes())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
    }
}
