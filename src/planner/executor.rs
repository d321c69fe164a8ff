//! Plan executor for applying deployment plans.
//!
//! This module drives the control plane through a plan's actions in order,
//! recording every success in state as it happens. Nothing is retried.

use std::collections::HashSet;
use tracing::{debug, error, info, warn};

use crate::config::ConfigHasher;
use crate::error::{ProviderError, Result, SgwError};
use crate::model::{render, RenderedResource, ResourceKind};
use crate::provider::ControlPlane;
use crate::state::{HistoryEntry, ResourceState, StackOperation, StackState};

use super::plan::{ActionType, DeploymentPlan, PlannedAction};

const SKIPPED: &str = "Skipped due to dependency failure";

/// Executor for deployment plans.
#[derive(Debug)]
pub struct PlanExecutor<'a, P: ControlPlane + ?Sized> {
    /// Control plane.
    provider: &'a P,
    /// Whether to continue on errors.
    continue_on_error: bool,
    /// Operation recorded in history.
    operation: StackOperation,
}

/// Result of executing a single action.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ActionResult {
    /// Action index.
    pub index: usize,
    /// Kind of action.
    pub action_type: ActionType,
    /// Description of the action that was executed.
    pub action: String,
    /// Resource address.
    pub address: String,
    /// Whether the action succeeded.
    pub success: bool,
    /// Identity assigned or removed.
    pub identity: Option<String>,
    /// Error message (if failed).
    pub error: Option<String>,
}

/// Result of executing the entire plan.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ExecutionResult {
    /// Individual action results.
    pub results: Vec<ActionResult>,
    /// Total actions executed.
    pub total_executed: usize,
    /// Number of successful actions.
    pub successful: usize,
    /// Number of failed actions.
    pub failed: usize,
    /// Number of skipped actions (due to dependency failures).
    pub skipped: usize,
    /// Number of actions not attempted after a halt.
    pub not_attempted: usize,
    /// Whether the entire plan succeeded.
    pub success: bool,
}

impl<'a, P: ControlPlane + ?Sized> PlanExecutor<'a, P> {
    /// Creates a new plan executor.
    #[must_use]
    pub const fn new(provider: &'a P) -> Self {
        Self {
            provider,
            continue_on_error: false,
            operation: StackOperation::Apply,
        }
    }

    /// Sets whether to continue on errors.
    #[must_use]
    pub const fn with_continue_on_error(mut self, continue_on_error: bool) -> Self {
        self.continue_on_error = continue_on_error;
        self
    }

    /// Sets the operation recorded in history.
    #[must_use]
    pub const fn with_operation(mut self, operation: StackOperation) -> Self {
        self.operation = operation;
        self
    }

    /// Executes a deployment plan, updating `state` after every successful
    /// action.
    ///
    /// Failed actions are reported in the result rather than as an error.
    pub async fn execute(&self, plan: &DeploymentPlan, state: &mut StackState) -> ExecutionResult {
        info!(
            "Executing plan with {} actions via {}",
            plan.actions.len(),
            self.provider.provider_name()
        );

        if plan.actions.is_empty() {
            return ExecutionResult::from_results(vec![], 0);
        }

        let mut results = Vec::new();
        let mut failed_indices: HashSet<usize> = HashSet::new();

        for (idx, action) in plan.actions.iter().enumerate() {
            let deps_failed = action
                .dependencies
                .iter()
                .any(|dep| failed_indices.contains(dep));

            if deps_failed {
                warn!("Skipping {} due to failed dependencies", action.address);
                results.push(ActionResult::failed(idx, action, SKIPPED));
                failed_indices.insert(idx);
                continue;
            }

            let result = self.execute_action(idx, action, state).await;

            if !result.success {
                failed_indices.insert(idx);
                if !self.continue_on_error {
                    results.push(result);
                    break;
                }
            }

            results.push(result);
        }

        let not_attempted = plan.actions.len() - results.len();
        let execution_result = ExecutionResult::from_results(results, not_attempted);

        let resources = plan.actions.iter().map(|a| a.address.to_string()).collect();
        let history_entry = if execution_result.success {
            state.config_hash.clone_from(&plan.config_hash);
            HistoryEntry::new(self.operation, &plan.config_hash, resources)
        } else {
            HistoryEntry::failed(
                self.operation,
                &plan.config_hash,
                resources,
                &format!("{} actions failed", execution_result.failed),
            )
        };
        state.add_history(history_entry);

        execution_result
    }

    async fn execute_action(&self, index: usize, action: &PlannedAction, state: &mut StackState) -> ActionResult {
        info!("Executing action {}: {}", index, action.description());

        let outcome = match action.action_type {
            ActionType::Create | ActionType::Update => self.execute_upsert(action, state).await,
            ActionType::Delete => self.execute_delete(action, state).await,
        };

        match outcome {
            Ok(identity) => ActionResult {
                index,
                action_type: action.action_type,
                action: action.description(),
                address: action.address.to_string(),
                success: true,
                identity,
                error: None,
            },
            Err(e) => {
                error!("Failed to {} {}: {}", action.action_type, action.address, e);
                ActionResult::failed(index, action, &e.to_string())
            }
        }
    }

    /// Renders the declared resource against known identities and sends it.
    async fn execute_upsert(&self, action: &PlannedAction, state: &mut StackState) -> Result<Option<String>> {
        let Some(resource) = &action.resource else {
            return Err(SgwError::internal(format!("No declaration for {}", action.address)));
        };

        let rendered = render(resource, &*state)?;
        let identity = self.send(&rendered).await?;

        let record = ResourceState::new(
            action.address.clone(),
            &identity,
            action.new_hash.as_deref().unwrap_or_default(),
            &ConfigHasher::hash_value(&rendered),
            rendered.to_value(),
        )
        .with_dependencies(resource.references());
        state.set_resource(record);

        info!("Applied {} ({identity})", action.address);
        Ok(Some(identity))
    }

    async fn send(&self, rendered: &RenderedResource) -> Result<String> {
        match rendered {
            RenderedResource::Topic(attributes) => self.provider.create_topic(attributes).await,
            RenderedResource::Policy { topic_arn, document } => {
                self.provider.set_topic_policy(topic_arn, document).await?;
                Ok(topic_arn.clone())
            }
            RenderedResource::Alarm(definition) => self.provider.put_metric_alarm(definition).await,
        }
    }

    async fn execute_delete(&self, action: &PlannedAction, state: &mut StackState) -> Result<Option<String>> {
        let Some(recorded) = state.get(&action.address) else {
            debug!("{} is not recorded, considering delete successful", action.address);
            return Ok(None);
        };
        let identity = recorded.identity.clone();

        let outcome = match action.address.kind {
            ResourceKind::Topic => self.provider.delete_topic(&identity).await,
            ResourceKind::Policy => self.provider.remove_topic_policy(&identity).await,
            ResourceKind::Alarm => self.provider.delete_metric_alarm(&action.address.name).await,
        };

        match outcome {
            Ok(()) => info!("Deleted {} ({identity})", action.address),
            Err(SgwError::Provider(ProviderError::NotFound { .. })) => {
                info!("{} was already deleted", action.address);
            }
            Err(e) => return Err(e),
        }

        state.remove_resource(&action.address);
        Ok(Some(identity))
    }
}

impl ActionResult {
    fn failed(index: usize, action: &PlannedAction, error: &str) -> Self {
        Self {
            index,
            action_type: action.action_type,
            action: action.description(),
            address: action.address.to_string(),
            success: false,
            identity: None,
            error: Some(error.to_string()),
        }
    }

    /// Returns true if the action was skipped because a dependency failed.
    #[must_use]
    pub fn is_skipped(&self) -> bool {
        self.error.as_deref() == Some(SKIPPED)
    }
}

impl ExecutionResult {
    fn from_results(results: Vec<ActionResult>, not_attempted: usize) -> Self {
        let successful = results.iter().filter(|r| r.success).count();
        let skipped = results.iter().filter(|r| r.is_skipped()).count();
        let failed = results.len() - successful - skipped;

        Self {
            total_executed: results.len(),
            successful,
            failed,
            skipped,
            not_attempted,
            success: failed == 0 && skipped == 0 && not_attempted == 0,
            results,
        }
    }

    /// Returns the first failed action, which is the one to report.
    #[must_use]
    pub fn first_failure(&self) -> Option<&ActionResult> {
        self.results.iter().find(|r| !r.success && !r.is_skipped())
    }
}

impl std::fmt::Display for ExecutionResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Executed {} actions: {} successful, {} failed, {} skipped",
            self.total_executed, self.successful, self.failed, self.skipped
        )?;
        if self.not_attempted > 0 {
            write!(f, ", {} not attempted", self.not_attempted)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ComparisonOperator, Effect, Principal, ProjectConfig, Statistic, TreatMissingData};
    use crate::error::PlanError;
    use crate::model::{
        AlarmSpec, PolicySpec, PolicyTemplate, ResourceAddress, ResourceSpec, Stack, StatementTemplate, TopicSpec,
    };
    use crate::planner::DiffEngine;
    use crate::provider::{LocalControlPlane, MockControlPlane};
    use std::collections::BTreeMap;

    fn stack() -> Stack {
        let topic = ResourceAddress::topic("alerts");
        Stack {
            project: ProjectConfig {
                name: String::from("sgw"),
                environment: String::from("test"),
                region: String::from("us-east-1"),
                account_id: Some(String::from("123456789012")),
            },
            resources: vec![
                ResourceSpec::Topic(TopicSpec {
                    name: String::from("alerts"),
                    display_name: None,
                    tags: BTreeMap::new(),
                }),
                ResourceSpec::Policy(PolicySpec {
                    name: String::from("publish"),
                    target: topic.clone(),
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
                }),
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
                    dimensions: BTreeMap::new(),
                    alarm_actions: vec![topic.clone()],
                    ok_actions: vec![topic],
                    insufficient_data_actions: vec![],
                    treat_missing_data: TreatMissingData::default(),
                    actions_enabled: true,
                    gateway: None,
                }),
            ],
        }
    }

    fn plan(stack: &Stack, state: &StackState) -> DeploymentPlan {
        let diff = DiffEngine::new().compute_diff(stack, Some(state), &BTreeMap::new());
        DeploymentPlan::from_diff(&diff, stack, Some(state), "hash").unwrap()
    }

    #[tokio::test]
    async fn test_apply_records_identities() {
        let provider = LocalControlPlane::in_memory("us-east-1", Some("123456789012"));
        let stack = stack();
        let mut state = StackState::new("sgw", "test");

        let plan = plan(&stack, &state);
        let result = PlanExecutor::new(&provider).execute(&plan, &mut state).await;

        assert!(result.success);
        assert_eq!(result.successful, 3);
        assert_eq!(state.resources.len(), 3);
        assert_eq!(state.config_hash, "hash");

        let topic_arn = "arn:aws:sns:us-east-1:123456789012:alerts";
        assert_eq!(state.get(&ResourceAddress::topic("alerts")).unwrap().identity, topic_arn);
        assert_eq!(state.get(&ResourceAddress::policy("publish")).unwrap().identity, topic_arn);

        let alarm = provider.get_metric_alarm("health").await.unwrap().unwrap();
        assert_eq!(alarm.definition.alarm_actions, vec![topic_arn.to_string()]);
        assert_eq!(alarm.definition.ok_actions, vec![topic_arn.to_string()]);
    }

    #[tokio::test]
    async fn test_failed_topic_skips_dependents() {
        let mut provider = MockControlPlane::new();
        provider.expect_provider_name().return_const("mock");
        provider.expect_create_topic().returning(|_| {
            Err(SgwError::Provider(ProviderError::invalid("name", "rejected")))
        });
        provider.expect_set_topic_policy().never();
        provider.expect_put_metric_alarm().never();

        let stack = stack();
        let mut state = StackState::new("sgw", "test");
        let plan = plan(&stack, &state);

        let result = PlanExecutor::new(&provider)
            .with_continue_on_error(true)
            .execute(&plan, &mut state)
            .await;

        assert!(!result.success);
        assert_eq!(result.failed, 1);
        assert_eq!(result.skipped, 2);
        assert!(state.is_empty());
        assert!(!state.history[0].success);
        assert!(result.first_failure().unwrap().address.starts_with("topic."));
    }

    #[tokio::test]
    async fn test_halts_on_first_failure() {
        let mut provider = MockControlPlane::new();
        provider.expect_provider_name().return_const("mock");
        provider
            .expect_create_topic()
            .returning(|_| Ok(String::from("arn:aws:sns:us-east-1:123456789012:alerts")));
        provider.expect_set_topic_policy().returning(|arn, _| {
            Err(SgwError::Provider(ProviderError::AuthorizationMismatch {
                topic_arn: arn.to_string(),
                resource: String::from("other"),
            }))
        });
        provider.expect_put_metric_alarm().never();

        let stack = stack();
        let mut state = StackState::new("sgw", "test");
        let plan = plan(&stack, &state);

        let result = PlanExecutor::new(&provider).execute(&plan, &mut state).await;

        assert!(!result.success);
        assert_eq!(result.successful, 1);
        assert_eq!(result.not_attempted, 1);
        assert_eq!(state.resources.len(), 1);
        assert!(state.config_hash.is_empty());
    }

    #[tokio::test]
    async fn test_unresolved_reference_fails_action() {
        let provider = LocalControlPlane::in_memory("us-east-1", None);
        let mut stack = stack();
        stack.resources.remove(0);

        let mut state = StackState::new("sgw", "test");
        let plan = DeploymentPlan::from_diff(
            &DiffEngine::new().compute_diff(&stack, Some(&state), &BTreeMap::new()),
            &stack,
            Some(&state),
            "hash",
        )
        .unwrap();

        let result = PlanExecutor::new(&provider).execute(&plan, &mut state).await;
        let failure = result.first_failure().unwrap();
        assert!(
            failure
                .error
                .as_deref()
                .unwrap()
                .contains(&PlanError::UnresolvedReference {
                    from: String::from("policy.publish"),
                    reference: String::from("topic.alerts"),
                }
                .to_string())
        );
    }

    #[tokio::test]
    async fn test_delete_of_missing_resource_succeeds() {
        let mut provider = MockControlPlane::new();
        provider.expect_provider_name().return_const("mock");
        provider
            .expect_delete_metric_alarm()
            .returning(|name| Err(SgwError::Provider(ProviderError::not_found("alarm", name))));

        let mut state = StackState::new("sgw", "test");
        state.set_resource(ResourceState::new(
            ResourceAddress::alarm("health"),
            "arn",
            "c",
            "r",
            serde_json::Value::Null,
        ));

        let plan = DeploymentPlan::destroy(&state, &[], false).unwrap();
        let result = PlanExecutor::new(&provider)
            .with_operation(StackOperation::Destroy)
            .execute(&plan, &mut state)
            .await;

        assert!(result.success);
        assert!(state.is_empty());
        assert_eq!(state.history[0].operation, StackOperation::Destroy);
    }
}
