//! Diff engine for comparing declared, recorded, and observed resources.
//!
//! The declared stack is compared against state by configuration hash, and
//! against what the control plane reports by rendered hash.

use std::collections::BTreeMap;
use tracing::debug;

use crate::config::ConfigHasher;
use crate::model::{ResourceAddress, ResourceSpec, Stack};
use crate::provider::ObservedResource;
use crate::state::{ResourceState, StackState};

/// Engine for computing diffs between declared and applied resources.
#[derive(Debug, Default)]
pub struct DiffEngine {
    /// Configuration hasher.
    hasher: ConfigHasher,
}

/// Difference for a single resource.
#[derive(Debug, Clone)]
pub struct ResourceDiff {
    /// Resource address.
    pub address: ResourceAddress,
    /// Type of difference.
    pub diff_type: DiffType,
    /// Details about the difference.
    pub details: Vec<DiffDetail>,
    /// Recorded hash (if applicable).
    pub old_hash: Option<String>,
    /// Declared hash (if applicable).
    pub new_hash: Option<String>,
}

/// Type of difference detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffType {
    /// Resource needs to be created.
    Create,
    /// Resource needs to be updated in place.
    Update,
    /// Resource needs to be deleted and created again.
    Replace,
    /// Resource needs to be deleted.
    Delete,
    /// Resource is unchanged.
    NoChange,
    /// Resource exists but was changed outside the tool.
    Drift,
}

/// Detail about a specific difference.
#[derive(Debug, Clone)]
pub struct DiffDetail {
    /// Field that differs.
    pub field: String,
    /// Old value.
    pub old_value: Option<String>,
    /// New value.
    pub new_value: Option<String>,
}

/// Complete diff result.
#[derive(Debug, Default)]
pub struct DiffResult {
    /// All resource diffs, declared resources first.
    pub diffs: Vec<ResourceDiff>,
    /// Number of resources to create.
    pub creates: usize,
    /// Number of resources to update, replace, or repair.
    pub updates: usize,
    /// Number of resources to delete.
    pub deletes: usize,
    /// Number of unchanged resources.
    pub unchanged: usize,
}

impl DiffEngine {
    /// Creates a new diff engine.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            hasher: ConfigHasher::new(),
        }
    }

    /// Computes the diff between the declared stack and applied resources.
    ///
    /// `observed` may be empty, in which case recorded state is trusted.
    #[must_use]
    pub fn compute_diff(
        &self,
        stack: &Stack,
        state: Option<&StackState>,
        observed: &BTreeMap<ResourceAddress, ObservedResource>,
    ) -> DiffResult {
        let mut diffs = Vec::new();

        for resource in &stack.resources {
            let address = resource.address();
            let new_hash = self.hasher.hash_resource(resource);
            let recorded = state.and_then(|s| s.get(&address));

            diffs.push(Self::compute_resource_diff(
                resource,
                recorded,
                observed.get(&address),
                new_hash,
            ));
        }

        if let Some(state) = state {
            for recorded in state.resources.values() {
                if !stack.contains(&recorded.address) {
                    debug!("Resource no longer declared: {}", recorded.address);
                    diffs.push(ResourceDiff {
                        address: recorded.address.clone(),
                        diff_type: DiffType::Delete,
                        details: vec![DiffDetail {
                            field: String::from("identity"),
                            old_value: Some(recorded.identity.clone()),
                            new_value: None,
                        }],
                        old_hash: Some(recorded.config_hash.clone()),
                        new_hash: None,
                    });
                }
            }
        }

        DiffResult::from_diffs(diffs)
    }

    fn compute_resource_diff(
        resource: &ResourceSpec,
        recorded: Option<&ResourceState>,
        observed: Option<&ObservedResource>,
        new_hash: String,
    ) -> ResourceDiff {
        let address = resource.address();

        let Some(recorded) = recorded else {
            return ResourceDiff {
                address,
                diff_type: DiffType::Create,
                details: vec![],
                old_hash: None,
                new_hash: Some(new_hash),
            };
        };

        let old_hash = Some(recorded.config_hash.clone());

        if observed.is_some_and(|o| !o.exists) {
            debug!("{address} is recorded but missing, recreating");
            return ResourceDiff {
                address,
                diff_type: DiffType::Create,
                details: vec![DiffDetail {
                    field: String::from("exists"),
                    old_value: Some(String::from("false")),
                    new_value: Some(String::from("true")),
                }],
                old_hash,
                new_hash: Some(new_hash),
            };
        }

        if !ConfigHasher::hashes_match(&recorded.config_hash, &new_hash) {
            let mut details = vec![DiffDetail {
                field: String::from("config_hash"),
                old_value: Some(recorded.config_hash.clone()),
                new_value: Some(new_hash.clone()),
            }];

            // A policy moved to another topic cannot be updated in place
            let diff_type = match resource {
                ResourceSpec::Policy(policy) if !recorded.dependencies.contains(&policy.target) => {
                    details.push(DiffDetail {
                        field: String::from("target"),
                        old_value: recorded.dependencies.first().map(ToString::to_string),
                        new_value: Some(policy.target.to_string()),
                    });
                    DiffType::Replace
                }
                _ => DiffType::Update,
            };

            return ResourceDiff {
                address,
                diff_type,
                details,
                old_hash,
                new_hash: Some(new_hash),
            };
        }

        if let Some(observed) = observed
            && observed.has_drifted(recorded)
        {
            debug!("{address} has drifted from the applied attributes");
            return ResourceDiff {
                address,
                diff_type: DiffType::Drift,
                details: vec![DiffDetail {
                    field: String::from("rendered_hash"),
                    old_value: Some(recorded.rendered_hash.clone()),
                    new_value: observed.rendered_hash.clone(),
                }],
                old_hash,
                new_hash: Some(new_hash),
            };
        }

        ResourceDiff {
            address,
            diff_type: DiffType::NoChange,
            details: vec![],
            old_hash,
            new_hash: Some(new_hash),
        }
    }
}

impl DiffResult {
    /// Builds a result and its summary counts.
    #[must_use]
    pub fn from_diffs(diffs: Vec<ResourceDiff>) -> Self {
        let count = |pred: fn(DiffType) -> bool| diffs.iter().filter(|d| pred(d.diff_type)).count();

        let creates = count(|t| t == DiffType::Create);
        let updates = count(|t| matches!(t, DiffType::Update | DiffType::Replace | DiffType::Drift));
        let deletes = count(|t| t == DiffType::Delete);
        let unchanged = count(|t| t == DiffType::NoChange);

        Self {
            diffs,
            creates,
            updates,
            deletes,
            unchanged,
        }
    }

    /// Returns true if there are any changes.
    #[must_use]
    pub const fn has_changes(&self) -> bool {
        self.creates > 0 || self.updates > 0 || self.deletes > 0
    }

    /// Returns diffs that require action.
    #[must_use]
    pub fn actionable_diffs(&self) -> Vec<&ResourceDiff> {
        self.diffs
            .iter()
            .filter(|d| d.diff_type != DiffType::NoChange)
            .collect()
    }

    /// Returns the diffs of drifted resources.
    #[must_use]
    pub fn drifted(&self) -> Vec<&ResourceDiff> {
        self.diffs
            .iter()
            .filter(|d| d.diff_type == DiffType::Drift)
            .collect()
    }

    /// Looks up the diff for an address.
    #[must_use]
    pub fn get(&self, address: &ResourceAddress) -> Option<&ResourceDiff> {
        self.diffs.iter().find(|d| d.address == *address)
    }
}

impl std::fmt::Display for DiffType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Replace => "replace",
            Self::Delete => "delete",
            Self::NoChange => "no change",
            Self::Drift => "drift",
        };
        write!(f, "{s}")
    }
}

impl std::fmt::Display for ResourceDiff {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.address, self.diff_type)?;
        for detail in &self.details {
            write!(
                f,
                "\n  {}: {} -> {}",
                detail.field,
                detail.old_value.as_deref().unwrap_or("(none)"),
                detail.new_value.as_deref().unwrap_or("(none)")
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ProjectConfig, Statistic};
    use crate::model::{AlarmSpec, PolicySpec, PolicyTemplate, TopicSpec};

    fn project() -> ProjectConfig {
        ProjectConfig {
            name: String::from("sgw"),
            environment: String::from("test"),
            region: String::from("us-east-1"),
            account_id: None,
        }
    }

    fn topic(name: &str) -> ResourceSpec {
        ResourceSpec::Topic(TopicSpec {
            name: name.to_string(),
            display_name: None,
            tags: BTreeMap::new(),
        })
    }

    fn policy(target: &str) -> ResourceSpec {
        ResourceSpec::Policy(PolicySpec {
            name: String::from("publish"),
            target: ResourceAddress::topic(target),
            document: PolicyTemplate {
                version: String::from("2012-10-17"),
                statements: vec![],
            },
        })
    }

    fn alarm(threshold: f64) -> ResourceSpec {
        ResourceSpec::Alarm(AlarmSpec {
            name: String::from("health"),
            description: None,
            comparison_operator: crate::config::ComparisonOperator::GreaterThanOrEqualToThreshold,
            evaluation_periods: 1,
            datapoints_to_alarm: None,
            metric_name: String::from("HealthNotifications"),
            namespace: String::from("AWS/StorageGateway"),
            period_secs: 300,
            statistic: Statistic::Sum,
            threshold,
            dimensions: BTreeMap::new(),
            alarm_actions: vec![ResourceAddress::topic("alerts")],
            ok_actions: vec![ResourceAddress::topic("alerts")],
            insufficient_data_actions: vec![],
            treat_missing_data: crate::config::TreatMissingData::default(),
            actions_enabled: true,
            gateway: None,
        })
    }

    fn stack(resources: Vec<ResourceSpec>) -> Stack {
        Stack {
            project: project(),
            resources,
        }
    }

    fn recorded(state: &mut StackState, resource: &ResourceSpec) {
        let hash = ConfigHasher::new().hash_resource(resource);
        state.set_resource(
            ResourceState::new(resource.address(), "arn", &hash, "rendered", serde_json::Value::Null)
                .with_dependencies(resource.references()),
        );
    }

    #[test]
    fn test_empty_state_creates_everything() {
        let stack = stack(vec![topic("alerts"), policy("alerts"), alarm(1.0)]);
        let diff = DiffEngine::new().compute_diff(&stack, None, &BTreeMap::new());

        assert_eq!(diff.creates, 3);
        assert!(diff.has_changes());
    }

    #[test]
    fn test_recorded_stack_is_unchanged() {
        let resources = vec![topic("alerts"), policy("alerts"), alarm(1.0)];
        let mut state = StackState::new("sgw", "test");
        for r in &resources {
            recorded(&mut state, r);
        }

        let diff = DiffEngine::new().compute_diff(&stack(resources), Some(&state), &BTreeMap::new());
        assert!(!diff.has_changes());
        assert_eq!(diff.unchanged, 3);
    }

    #[test]
    fn test_changed_threshold_is_update() {
        let mut state = StackState::new("sgw", "test");
        recorded(&mut state, &alarm(1.0));

        let diff = DiffEngine::new().compute_diff(&stack(vec![alarm(2.0)]), Some(&state), &BTreeMap::new());
        let health = diff.get(&ResourceAddress::alarm("health")).unwrap();
        assert_eq!(health.diff_type, DiffType::Update);
    }

    #[test]
    fn test_retargeted_policy_is_replace() {
        let mut state = StackState::new("sgw", "test");
        recorded(&mut state, &policy("alerts"));

        let diff = DiffEngine::new().compute_diff(&stack(vec![policy("other")]), Some(&state), &BTreeMap::new());
        let publish = diff.get(&ResourceAddress::policy("publish")).unwrap();
        assert_eq!(publish.diff_type, DiffType::Replace);
    }

    #[test]
    fn test_undeclared_resource_is_deleted() {
        let mut state = StackState::new("sgw", "test");
        recorded(&mut state, &topic("old"));

        let diff = DiffEngine::new().compute_diff(&stack(vec![]), Some(&state), &BTreeMap::new());
        assert_eq!(diff.deletes, 1);
        assert_eq!(diff.diffs[0].address, ResourceAddress::topic("old"));
    }

    #[test]
    fn test_missing_and_drifted_resources() {
        let resources = vec![topic("alerts"), alarm(1.0)];
        let mut state = StackState::new("sgw", "test");
        for r in &resources {
            recorded(&mut state, r);
        }

        let mut observed = BTreeMap::new();
        observed.insert(
            ResourceAddress::topic("alerts"),
            ObservedResource {
                address: ResourceAddress::topic("alerts"),
                identity: String::from("arn"),
                exists: false,
                rendered: None,
                rendered_hash: None,
                alarm_state: None,
            },
        );
        observed.insert(
            ResourceAddress::alarm("health"),
            ObservedResource {
                address: ResourceAddress::alarm("health"),
                identity: String::from("arn"),
                exists: true,
                rendered: None,
                rendered_hash: Some(String::from("changed")),
                alarm_state: None,
            },
        );

        let diff = DiffEngine::new().compute_diff(&stack(resources), Some(&state), &observed);
        assert_eq!(diff.get(&ResourceAddress::topic("alerts")).unwrap().diff_type, DiffType::Create);
        assert_eq!(diff.get(&ResourceAddress::alarm("health")).unwrap().diff_type, DiffType::Drift);
        assert_eq!(diff.drifted().len(), 1);
    }
}
