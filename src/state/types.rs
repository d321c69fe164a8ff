//! State types for tracking applied resources.
//!
//! State records the identity the control plane assigned to every applied
//! resource, the hashes of what was declared and rendered, and a bounded
//! history of applies. It is what makes a second apply of the same
//! declarations a no-op.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::model::{IdentityResolver, ResourceAddress, ResourceKind};

/// Current version of the state format.
pub const STATE_VERSION: &str = "1.0";

/// Number of history entries retained.
const MAX_HISTORY: usize = 100;

/// The complete stack state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StackState {
    /// State format version.
    pub version: String,
    /// Project name.
    pub project: String,
    /// Environment name.
    pub environment: String,
    /// Hash of the last applied stack.
    pub config_hash: String,
    /// Applied resources by address.
    #[serde(default)]
    pub resources: BTreeMap<ResourceAddress, ResourceState>,
    /// When the state was last updated.
    pub last_updated: DateTime<Utc>,
    /// Apply history (recent entries).
    #[serde(default)]
    pub history: Vec<HistoryEntry>,
}

/// State of a single applied resource.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResourceState {
    /// Resource address.
    pub address: ResourceAddress,
    /// Identity assigned by the control plane (an ARN).
    pub identity: String,
    /// Hash of the resolved declaration when applied.
    pub config_hash: String,
    /// Hash of the rendered attributes sent to the control plane.
    pub rendered_hash: String,
    /// Rendered attributes as sent.
    pub attributes: serde_json::Value,
    /// Addresses this resource referenced when applied.
    #[serde(default)]
    pub dependencies: Vec<ResourceAddress>,
    /// When the resource was created.
    pub created_at: DateTime<Utc>,
    /// When the resource was last updated.
    pub updated_at: DateTime<Utc>,
}

/// A single entry in the apply history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// When the operation occurred.
    pub timestamp: DateTime<Utc>,
    /// Type of operation.
    pub operation: StackOperation,
    /// Stack hash at the time of the operation.
    pub config_hash: String,
    /// Resources affected.
    pub resources: Vec<String>,
    /// Whether the operation succeeded.
    pub success: bool,
    /// Optional error message.
    #[serde(default)]
    pub error: Option<String>,
}

/// Types of stack operations.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StackOperation {
    /// Plan applied.
    Apply,
    /// Resources destroyed.
    Destroy,
}

impl StackState {
    /// Creates a new empty stack state.
    #[must_use]
    pub fn new(project: &str, environment: &str) -> Self {
        Self {
            version: STATE_VERSION.to_string(),
            project: project.to_string(),
            environment: environment.to_string(),
            config_hash: String::new(),
            resources: BTreeMap::new(),
            last_updated: Utc::now(),
            history: Vec::new(),
        }
    }

    /// Gets a resource by address.
    #[must_use]
    pub fn get(&self, address: &ResourceAddress) -> Option<&ResourceState> {
        self.resources.get(address)
    }

    /// Adds or updates a resource, keeping its original creation time.
    pub fn set_resource(&mut self, mut resource: ResourceState) {
        if let Some(existing) = self.resources.get(&resource.address) {
            resource.created_at = existing.created_at;
        }
        self.resources.insert(resource.address.clone(), resource);
        self.last_updated = Utc::now();
    }

    /// Removes a resource by address.
    pub fn remove_resource(&mut self, address: &ResourceAddress) -> Option<ResourceState> {
        let result = self.resources.remove(address);
        if result.is_some() {
            self.last_updated = Utc::now();
        }
        result
    }

    /// Adds a history entry.
    pub fn add_history(&mut self, entry: HistoryEntry) {
        if self.history.len() >= MAX_HISTORY {
            self.history.remove(0);
        }
        self.history.push(entry);
    }

    /// Returns the resources of one kind.
    pub fn resources_of(&self, kind: ResourceKind) -> impl Iterator<Item = &ResourceState> {
        self.resources.values().filter(move |r| r.address.kind == kind)
    }

    /// Returns the addresses that still reference `target`.
    #[must_use]
    pub fn referrers_of(&self, target: &ResourceAddress) -> Vec<ResourceAddress> {
        self.resources
            .values()
            .filter(|r| r.dependencies.contains(target))
            .map(|r| r.address.clone())
            .collect()
    }

    /// Returns true if nothing has been applied.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}

impl IdentityResolver for StackState {
    fn identity(&self, address: &ResourceAddress) -> Option<String> {
        self.resources.get(address).map(|r| r.identity.clone())
    }
}

impl ResourceState {
    /// Creates a new resource state.
    #[must_use]
    pub fn new(
        address: ResourceAddress,
        identity: &str,
        config_hash: &str,
        rendered_hash: &str,
        attributes: serde_json::Value,
    ) -> Self {
        let now = Utc::now();
        Self {
            address,
            identity: identity.to_string(),
            config_hash: config_hash.to_string(),
            rendered_hash: rendered_hash.to_string(),
            attributes,
            dependencies: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Records the addresses this resource references.
    #[must_use]
    pub fn with_dependencies(mut self, dependencies: Vec<ResourceAddress>) -> Self {
        self.dependencies = dependencies;
        self
    }
}

impl HistoryEntry {
    /// Creates a new history entry.
    #[must_use]
    pub fn new(operation: StackOperation, config_hash: &str, resources: Vec<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            operation,
            config_hash: config_hash.to_string(),
            resources,
            success: true,
            error: None,
        }
    }

    /// Creates a failed history entry.
    #[must_use]
    pub fn failed(operation: StackOperation, config_hash: &str, resources: Vec<String>, error: &str) -> Self {
        Self {
            timestamp: Utc::now(),
            operation,
            config_hash: config_hash.to_string(),
            resources,
            success: false,
            error: Some(error.to_string()),
        }
    }
}

impl std::fmt::Display for StackOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let op = match self {
            Self::Apply => "apply",
            Self::Destroy => "destroy",
        };
        write!(f, "{op}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn topic_state() -> ResourceState {
        ResourceState::new(
            ResourceAddress::topic("alerts"),
            "arn:aws:sns:us-east-1:123456789012:alerts",
            "c1",
            "r1",
            serde_json::Value::Null,
        )
    }

    #[test]
    fn test_set_resource_keeps_created_at() {
        let mut state = StackState::new("sgw-alerts", "dev");
        let first = topic_state();
        let created = first.created_at;
        state.set_resource(first);

        let mut second = topic_state();
        second.config_hash = String::from("c2");
        state.set_resource(second);

        let stored = state.get(&ResourceAddress::topic("alerts")).unwrap();
        assert_eq!(stored.config_hash, "c2");
        assert_eq!(stored.created_at, created);
    }

    #[test]
    fn test_referrers_of() {
        let mut state = StackState::new("sgw-alerts", "dev");
        state.set_resource(topic_state());
        state.set_resource(
            ResourceState::new(ResourceAddress::alarm("health"), "arn:alarm", "c", "r", serde_json::Value::Null)
                .with_dependencies(vec![ResourceAddress::topic("alerts")]),
        );

        assert_eq!(
            state.referrers_of(&ResourceAddress::topic("alerts")),
            vec![ResourceAddress::alarm("health")]
        );
    }

    #[test]
    fn test_history_is_bounded() {
        let mut state = StackState::new("sgw-alerts", "dev");
        for i in 0..150 {
            state.add_history(HistoryEntry::new(StackOperation::Apply, &i.to_string(), vec![]));
        }
        assert_eq!(state.history.len(), MAX_HISTORY);
        assert_eq!(state.history[0].config_hash, "50");
    }

    #[test]
    fn test_state_roundtrip_uses_address_keys() {
        let mut state = StackState::new("sgw-alerts", "dev");
        state.set_resource(topic_state());

        let json = serde_json::to_string(&state).unwrap();
        assert!(json.contains("\"topic.alerts\""));

        let back: StackState = serde_json::from_str(&json).unwrap();
        assert_eq!(
            back.identity(&ResourceAddress::topic("alerts")).as_deref(),
            Some("arn:aws:sns:us-east-1:123456789012:alerts")
        );
    }
}
