//! Deployment plan types and construction.
//!
//! This module defines the structure of deployment plans and converts diffs
//! into ordered actions. Deletes of leaf resources run first, then creates
//! and updates in dependency order, then deletes of topics whose referrers
//! were just updated away from them.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

use crate::error::{PlanError, Result};
use crate::graph::DependencyGraph;
use crate::model::{ResourceAddress, ResourceSpec, Stack};
use crate::state::StackState;

use super::diff::{DiffResult, DiffType};

/// A complete deployment plan.
#[derive(Debug, Clone)]
pub struct DeploymentPlan {
    /// When the plan was created.
    pub created_at: DateTime<Utc>,
    /// Stack hash this plan is based on.
    pub config_hash: String,
    /// Planned actions in execution order.
    pub actions: Vec<PlannedAction>,
}

/// A single planned action.
#[derive(Debug, Clone)]
pub struct PlannedAction {
    /// Action type.
    pub action_type: ActionType,
    /// Resource address.
    pub address: ResourceAddress,
    /// Declared resource (for creates and updates).
    pub resource: Option<ResourceSpec>,
    /// Reason for this action.
    pub reason: String,
    /// New configuration hash (if applicable).
    pub new_hash: Option<String>,
    /// Dependencies (action indices that must complete first).
    pub dependencies: Vec<usize>,
}

/// Types of actions in a plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionType {
    /// Create a resource.
    Create,
    /// Update a resource in place.
    Update,
    /// Delete a resource.
    Delete,
}

/// Builds the graph of what was applied, from recorded dependencies.
fn recorded_graph(state: &StackState) -> DependencyGraph {
    let mut graph = DependencyGraph::new();
    for resource in state.resources.values() {
        graph.add_node(
            resource.address.clone(),
            resource
                .dependencies
                .iter()
                .filter(|d| state.resources.contains_key(*d))
                .cloned(),
        );
    }
    graph
}

impl DeploymentPlan {
    /// Creates a new plan from a diff result.
    ///
    /// # Errors
    ///
    /// Returns [`PlanError::ReferencedDelete`] if a deleted resource is still
    /// referenced by a declared one, or an error if the declared references
    /// form a cycle.
    pub fn from_diff(
        diff: &DiffResult,
        stack: &Stack,
        state: Option<&StackState>,
        config_hash: &str,
    ) -> Result<Self> {
        let empty = StackState::new(&stack.project.name, &stack.project.environment);
        let state = state.unwrap_or(&empty);

        let deleted: BTreeSet<&ResourceAddress> = diff
            .diffs
            .iter()
            .filter(|d| d.diff_type == DiffType::Delete)
            .map(|d| &d.address)
            .collect();

        for target in &deleted {
            let referrers: Vec<String> = stack
                .resources
                .iter()
                .filter(|r| r.references().contains(target))
                .map(|r| r.address().to_string())
                .collect();
            if !referrers.is_empty() {
                return Err(PlanError::ReferencedDelete {
                    target: target.to_string(),
                    referrers,
                }
                .into());
            }
        }

        // Deletes whose recorded referrers survive wait for those referrers
        // to be updated.
        let deferred: BTreeSet<&ResourceAddress> = deleted
            .iter()
            .copied()
            .filter(|target| {
                state
                    .referrers_of(target)
                    .iter()
                    .any(|r| !deleted.contains(r))
            })
            .collect();

        let replaced: BTreeSet<&ResourceAddress> = diff
            .diffs
            .iter()
            .filter(|d| d.diff_type == DiffType::Replace)
            .map(|d| &d.address)
            .collect();

        let destruction_order = recorded_graph(state).destruction_order()?;
        let creation_order = DependencyGraph::from_stack(stack).creation_order()?;

        let mut actions = Vec::new();
        let mut index_of: BTreeMap<ResourceAddress, usize> = BTreeMap::new();

        // Leaf deletes, and the delete half of replaces
        for address in &destruction_order {
            if (deleted.contains(address) && !deferred.contains(address)) || replaced.contains(address) {
                let reason = if replaced.contains(address) {
                    String::from("Replacing resource")
                } else {
                    String::from("Resource removed from configuration")
                };
                index_of.insert(address.clone(), actions.len());
                actions.push(PlannedAction::delete(address.clone(), reason, vec![]));
            }
        }

        // Creates and updates in dependency order
        for address in &creation_order {
            let Some(resource_diff) = diff.get(address) else {
                continue;
            };
            let (action_type, reason) = match resource_diff.diff_type {
                DiffType::Create if resource_diff.old_hash.is_some() => {
                    (ActionType::Create, String::from("Resource is missing"))
                }
                DiffType::Create => (ActionType::Create, String::from("Resource defined in configuration")),
                DiffType::Replace => (ActionType::Create, String::from("Replacing resource")),
                DiffType::Update => (ActionType::Update, String::from("Configuration changed")),
                DiffType::Drift => (ActionType::Update, String::from("Overwriting drift")),
                DiffType::Delete | DiffType::NoChange => continue,
            };
            let Some(resource) = stack.get(address) else {
                continue;
            };

            let mut dependencies: Vec<usize> = resource
                .references()
                .iter()
                .filter_map(|r| index_of.get(r).copied())
                .collect();
            if let Some(&delete_idx) = index_of.get(address) {
                dependencies.push(delete_idx);
            }

            index_of.insert(address.clone(), actions.len());
            actions.push(PlannedAction {
                action_type,
                address: address.clone(),
                resource: Some(resource.clone()),
                reason,
                new_hash: resource_diff.new_hash.clone(),
                dependencies,
            });
        }

        // Deletes that had to wait for their referrers
        for address in &destruction_order {
            if deferred.contains(address) {
                let dependencies = state
                    .referrers_of(address)
                    .iter()
                    .filter_map(|r| index_of.get(r).copied())
                    .collect();
                index_of.insert(address.clone(), actions.len());
                actions.push(PlannedAction::delete(
                    address.clone(),
                    String::from("Resource removed from configuration"),
                    dependencies,
                ));
            }
        }

        debug!("Planned {} actions", actions.len());

        Ok(Self {
            created_at: Utc::now(),
            config_hash: config_hash.to_string(),
            actions,
        })
    }

    /// Creates a plan that deletes recorded resources.
    ///
    /// With no targets every recorded resource is deleted. A target that is
    /// still referenced is only deleted together with its referrers when
    /// `cascade` is set.
    ///
    /// # Errors
    ///
    /// Returns an error if a target is not recorded, or if it is referenced
    /// and `cascade` is not set.
    pub fn destroy(state: &StackState, targets: &[ResourceAddress], cascade: bool) -> Result<Self> {
        let graph = recorded_graph(state);

        let selected: BTreeSet<ResourceAddress> = if targets.is_empty() {
            state.resources.keys().cloned().collect()
        } else {
            let mut selected = BTreeSet::new();
            for target in targets {
                if !graph.contains(target) {
                    return Err(PlanError::DependencyResolutionFailed {
                        message: format!("{target} is not recorded in state"),
                    }
                    .into());
                }

                let closure = graph.dependent_closure(target);
                let referrers: Vec<String> = closure
                    .iter()
                    .filter(|a| *a != target && !targets.contains(a))
                    .map(ToString::to_string)
                    .collect();
                if !referrers.is_empty() && !cascade {
                    return Err(PlanError::ReferencedDelete {
                        target: target.to_string(),
                        referrers,
                    }
                    .into());
                }
                selected.extend(closure);
            }
            selected
        };

        let mut actions = Vec::new();
        let mut index_of: BTreeMap<ResourceAddress, usize> = BTreeMap::new();

        for address in graph.destruction_order()? {
            if !selected.contains(&address) {
                continue;
            }
            let dependencies = graph
                .dependents_of(&address)
                .iter()
                .filter_map(|d| index_of.get(d).copied())
                .collect();
            index_of.insert(address.clone(), actions.len());
            actions.push(PlannedAction::delete(address, String::from("Destroy requested"), dependencies));
        }

        Ok(Self {
            created_at: Utc::now(),
            config_hash: state.config_hash.clone(),
            actions,
        })
    }

    /// Creates an empty plan (no changes needed).
    #[must_use]
    pub fn empty(config_hash: &str) -> Self {
        Self {
            created_at: Utc::now(),
            config_hash: config_hash.to_string(),
            actions: vec![],
        }
    }

    /// Returns true if the plan is empty (no changes).
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Returns the number of actions.
    #[must_use]
    pub const fn action_count(&self) -> usize {
        self.actions.len()
    }

    /// Returns the number of actions of one type.
    #[must_use]
    pub fn count(&self, action_type: ActionType) -> usize {
        self.actions
            .iter()
            .filter(|a| a.action_type == action_type)
            .count()
    }

    /// Gets actions that depend on a specific action index.
    #[must_use]
    pub fn dependent_actions(&self, action_idx: usize) -> Vec<(usize, &PlannedAction)> {
        self.actions
            .iter()
            .enumerate()
            .filter(|(_, a)| a.dependencies.contains(&action_idx))
            .collect()
    }
}

impl PlannedAction {
    fn delete(address: ResourceAddress, reason: String, dependencies: Vec<usize>) -> Self {
        Self {
            action_type: ActionType::Delete,
            address,
            resource: None,
            reason,
            new_hash: None,
            dependencies,
        }
    }

    /// Returns a human-readable description of the action.
    #[must_use]
    pub fn description(&self) -> String {
        match self.action_type {
            ActionType::Create => format!("Create {} '{}'", self.address.kind, self.address.name),
            ActionType::Update => format!("Update {} '{}'", self.address.kind, self.address.name),
            ActionType::Delete => format!("Delete {} '{}'", self.address.kind, self.address.name),
        }
    }
}

impl std::fmt::Display for ActionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        };
        write!(f, "{s}")
    }
}

impl std::fmt::Display for PlannedAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.action_type, self.address)?;
        if !self.reason.is_empty() {
            write!(f, " ({})", self.reason)?;
        }
        Ok(())
    }
}

impl std::fmt::Display for DeploymentPlan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.actions.is_empty() {
            return write!(f, "No changes required");
        }

        writeln!(f, "Deployment Plan ({} actions):", self.actions.len())?;
        for (i, action) in self.actions.iter().enumerate() {
            writeln!(f, "  {i}. {action}")?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{
        ComparisonOperator, ConfigHasher, Effect, Principal, ProjectConfig, Statistic, TreatMissingData,
    };
    use crate::error::SgwError;
    use crate::model::{AlarmSpec, PolicySpec, PolicyTemplate, StatementTemplate, TopicSpec};
    use crate::planner::DiffEngine;
    use crate::state::ResourceState;

    fn topic(name: &str) -> ResourceSpec {
        ResourceSpec::Topic(TopicSpec {
            name: name.to_string(),
            display_name: None,
            tags: std::collections::BTreeMap::new(),
        })
    }

    fn policy(target: &str) -> ResourceSpec {
        ResourceSpec::Policy(PolicySpec {
            name: String::from("publish"),
            target: ResourceAddress::topic(target),
            document: PolicyTemplate {
                version: String::from("2012-10-17"),
                statements: vec![StatementTemplate {
                    sid: String::from("AllowPublish"),
                    effect: Effect::Allow,
                    principal: Principal::Service(vec![String::from("cloudwatch.amazonaws.com")]),
                    action: String::from("SNS:Publish"),
                    resource: None,
                }],
            },
        })
    }

    fn alarm(actions: &[&str]) -> ResourceSpec {
        let actions: Vec<ResourceAddress> = actions.iter().map(|t| ResourceAddress::topic(*t)).collect();
        ResourceSpec::Alarm(AlarmSpec {
            name: String::from("health"),
            description: None,
            comparison_operator: ComparisonOperator::GreaterThanOrEqualToThreshold,
            evaluation_periods: 1,
            datapoints_to_alarm: None,
            metric_name: String::from("HealthNotifications"),
            namespace: String::from("AWS/StorageGateway"),
            period_secs: 300,
            statistic: Statistic::Sum,
            threshold: 1.0,
            dimensions: std::collections::BTreeMap::new(),
            alarm_actions: actions.clone(),
            ok_actions: actions,
            insufficient_data_actions: vec![],
            treat_missing_data: TreatMissingData::default(),
            actions_enabled: true,
            gateway: None,
        })
    }

    fn stack(resources: Vec<ResourceSpec>) -> Stack {
        Stack {
            project: ProjectConfig {
                name: String::from("sgw"),
                environment: String::from("test"),
                region: String::from("us-east-1"),
                account_id: None,
            },
            resources,
        }
    }

    fn applied(resources: &[ResourceSpec]) -> StackState {
        let mut state = StackState::new("sgw", "test");
        for resource in resources {
            let hash = ConfigHasher::new().hash_resource(resource);
            state.set_resource(
                ResourceState::new(resource.address(), "arn", &hash, "r", serde_json::Value::Null)
                    .with_dependencies(resource.references()),
            );
        }
        state
    }

    fn plan_for(stack: &Stack, state: Option<&StackState>) -> Result<DeploymentPlan> {
        let diff = DiffEngine::new().compute_diff(stack, state, &BTreeMap::new());
        DeploymentPlan::from_diff(&diff, stack, state, "hash")
    }

    #[test]
    fn test_topic_created_before_dependents() {
        let stack = stack(vec![alarm(&["alerts"]), policy("alerts"), topic("alerts")]);
        let plan = plan_for(&stack, None).unwrap();

        assert_eq!(plan.count(ActionType::Create), 3);
        assert_eq!(plan.actions[0].address, ResourceAddress::topic("alerts"));
        assert!(plan.actions[1].dependencies.contains(&0));
        assert!(plan.actions[2].dependencies.contains(&0));
    }

    #[test]
    fn test_converged_stack_has_empty_plan() {
        let resources = vec![topic("alerts"), policy("alerts"), alarm(&["alerts"])];
        let state = applied(&resources);
        let plan = plan_for(&stack(resources), Some(&state)).unwrap();
        assert!(plan.is_empty());
    }

    #[test]
    fn test_deleting_referenced_topic_is_blocked() {
        let state = applied(&[topic("alerts"), topic("old"), alarm(&["alerts", "old"])]);
        // The alarm still declares "old" but the topic is gone
        let stack = stack(vec![topic("alerts"), alarm(&["alerts", "old"])]);

        let err = plan_for(&stack, Some(&state)).unwrap_err();
        assert!(matches!(err, SgwError::Plan(PlanError::ReferencedDelete { .. })));
    }

    #[test]
    fn test_topic_delete_waits_for_referrer_update() {
        let state = applied(&[topic("alerts"), topic("old"), alarm(&["alerts", "old"])]);
        let stack = stack(vec![topic("alerts"), alarm(&["alerts"])]);

        let plan = plan_for(&stack, Some(&state)).unwrap();
        assert_eq!(plan.action_count(), 2);
        assert_eq!(plan.actions[0].action_type, ActionType::Update);
        assert_eq!(plan.actions[1].action_type, ActionType::Delete);
        assert_eq!(plan.actions[1].address, ResourceAddress::topic("old"));
        assert_eq!(plan.actions[1].dependencies, vec![0]);
    }

    #[test]
    fn test_replaced_policy_is_deleted_then_created() {
        let state = applied(&[topic("alerts"), policy("alerts")]);
        let stack = stack(vec![topic("alerts"), topic("other"), policy("other")]);

        let plan = plan_for(&stack, Some(&state)).unwrap();
        let kinds: Vec<(ActionType, String)> = plan
            .actions
            .iter()
            .map(|a| (a.action_type, a.address.to_string()))
            .collect();
        assert_eq!(
            kinds,
            vec![
                (ActionType::Delete, String::from("policy.publish")),
                (ActionType::Create, String::from("topic.other")),
                (ActionType::Create, String::from("policy.publish")),
            ]
        );
        assert_eq!(plan.actions[2].dependencies, vec![1, 0]);
    }

    #[test]
    fn test_destroy_all_in_reverse_order() {
        let state = applied(&[topic("alerts"), policy("alerts"), alarm(&["alerts"])]);
        let plan = DeploymentPlan::destroy(&state, &[], false).unwrap();

        assert_eq!(plan.count(ActionType::Delete), 3);
        assert_eq!(plan.actions[2].address, ResourceAddress::topic("alerts"));
        assert_eq!(plan.actions[2].dependencies.len(), 2);
    }

    #[test]
    fn test_destroy_referenced_target_requires_cascade() {
        let state = applied(&[topic("alerts"), alarm(&["alerts"])]);
        let target = [ResourceAddress::topic("alerts")];

        let err = DeploymentPlan::destroy(&state, &target, false).unwrap_err();
        assert!(matches!(err, SgwError::Plan(PlanError::ReferencedDelete { .. })));

        let plan = DeploymentPlan::destroy(&state, &target, true).unwrap();
        assert_eq!(plan.action_count(), 2);
        assert_eq!(plan.actions[0].address, ResourceAddress::alarm("health"));
    }

    #[test]
    fn test_destroy_unknown_target_fails() {
        let state = applied(&[topic("alerts")]);
        let result = DeploymentPlan::destroy(&state, &[ResourceAddress::topic("nope")], false);
        assert!(result.is_err());
    }
}
