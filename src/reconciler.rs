//! Reconciler for converging the control plane on the declared stack.
//!
//! This module ties the pieces together: it loads state under the state
//! lock, observes what the control plane holds, plans, executes, and saves
//! state. A failed apply is not retried; the next run starts from the state
//! the failure left behind.

use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, error, info, warn};

use crate::config::ConfigHasher;
use crate::error::Result;
use crate::model::{AlarmState, ResourceAddress, Stack};
use crate::planner::{
    ActionResult, ActionType, DeploymentPlan, DiffEngine, DiffResult, DiffType, ExecutionResult, PlanExecutor,
};
use crate::provider::{ControlPlane, ObservedResource, StackObserver};
use crate::state::{StackOperation, StackState, StateStore};

/// Reconciler for the declared stack.
pub struct Reconciler<'a, P: ControlPlane + ?Sized> {
    /// Declared stack.
    stack: &'a Stack,
    /// State store.
    state_store: &'a dyn StateStore,
    /// Control plane.
    provider: &'a P,
    /// Configuration hasher.
    hasher: ConfigHasher,
    /// Diff engine.
    diff_engine: DiffEngine,
    /// Lock holder identifier.
    holder: String,
    /// Whether to keep going after a failed action.
    continue_on_error: bool,
}

/// A diff and the plan derived from it.
#[derive(Debug)]
pub struct PlannedChanges {
    /// Per-resource differences.
    pub diff: DiffResult,
    /// Ordered actions.
    pub plan: DeploymentPlan,
}

/// Result of an apply or destroy run.
#[derive(Debug, Serialize)]
pub struct ReconciliationResult {
    /// Whether every planned action succeeded.
    pub success: bool,
    /// Number of resources created.
    pub created: usize,
    /// Number of resources updated or repaired.
    pub updated: usize,
    /// Number of resources deleted.
    pub deleted: usize,
    /// Number of resources unchanged.
    pub unchanged: usize,
    /// Per-action outcomes.
    pub actions: Vec<ActionResult>,
    /// Errors encountered.
    pub errors: Vec<String>,
}

/// Report of drift detection.
#[derive(Debug, Serialize)]
pub struct DriftReport {
    /// Whether anything differs from the declared stack.
    pub has_drift: bool,
    /// Resources changed outside the tool.
    pub drifted_resources: Vec<String>,
    /// Recorded resources the control plane no longer has.
    pub missing_resources: Vec<String>,
    /// Declared changes not yet applied.
    pub pending_changes: Vec<String>,
    /// Total number of declared resources.
    pub total_resources: usize,
    /// Number of recorded resources observed.
    pub observed_count: usize,
    /// Current alarm states by alarm name.
    pub alarm_states: BTreeMap<String, AlarmState>,
}

impl<'a, P: ControlPlane + ?Sized> Reconciler<'a, P> {
    /// Creates a new reconciler.
    #[must_use]
    pub fn new(stack: &'a Stack, state_store: &'a dyn StateStore, provider: &'a P, holder: &str) -> Self {
        Self {
            stack,
            state_store,
            provider,
            hasher: ConfigHasher::new(),
            diff_engine: DiffEngine::new(),
            holder: holder.to_string(),
            continue_on_error: false,
        }
    }

    /// Sets whether to continue after a failed action.
    #[must_use]
    pub const fn with_continue_on_error(mut self, continue_on_error: bool) -> Self {
        self.continue_on_error = continue_on_error;
        self
    }

    /// Computes the plan without applying it.
    ///
    /// # Errors
    ///
    /// Returns an error if state cannot be loaded, observation fails, or the
    /// plan cannot be built.
    pub async fn plan(&self) -> Result<PlannedChanges> {
        let state = self.state_store.load().await?;
        self.plan_against(state.as_ref()).await
    }

    async fn plan_against(&self, state: Option<&StackState>) -> Result<PlannedChanges> {
        let observed = self.observe(state).await?;
        let diff = self.diff_engine.compute_diff(self.stack, state, &observed);

        info!(
            "Diff: {} creates, {} updates, {} deletes, {} unchanged",
            diff.creates, diff.updates, diff.deletes, diff.unchanged
        );

        let config_hash = self.hasher.hash_stack(self.stack);
        let plan = if diff.has_changes() {
            DeploymentPlan::from_diff(&diff, self.stack, state, &config_hash)?
        } else {
            DeploymentPlan::empty(&config_hash)
        };

        Ok(PlannedChanges { diff, plan })
    }

    async fn observe(&self, state: Option<&StackState>) -> Result<BTreeMap<ResourceAddress, ObservedResource>> {
        match state {
            Some(state) => StackObserver::new(self.provider).observe_all(state).await,
            None => Ok(BTreeMap::new()),
        }
    }

    /// Applies the declared stack.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock cannot be acquired, planning fails, or
    /// state cannot be saved. Failed actions are reported in the result.
    pub async fn apply(&self) -> Result<ReconciliationResult> {
        info!(
            "Applying {}/{}",
            self.stack.project.name, self.stack.project.environment
        );

        let lock = self.state_store.acquire_lock(&self.holder, "apply").await?;
        let outcome = self.apply_locked().await;
        self.release(&lock.lock_id).await;
        outcome
    }

    async fn apply_locked(&self) -> Result<ReconciliationResult> {
        let mut state = self
            .state_store
            .load()
            .await?
            .unwrap_or_else(|| StackState::new(&self.stack.project.name, &self.stack.project.environment));

        let PlannedChanges { diff, plan } = self.plan_against(Some(&state)).await?;

        if plan.is_empty() {
            info!("No changes required - stack is converged");
            return Ok(ReconciliationResult::converged(diff.unchanged));
        }

        let execution = PlanExecutor::new(self.provider)
            .with_continue_on_error(self.continue_on_error)
            .execute(&plan, &mut state)
            .await;

        self.state_store.save(&state).await?;

        Ok(ReconciliationResult::from_execution(&diff, execution))
    }

    /// Destroys recorded resources, all of them when `targets` is empty.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock cannot be acquired, a target is still
    /// referenced without `cascade`, or state cannot be saved.
    pub async fn destroy(&self, targets: &[ResourceAddress], cascade: bool) -> Result<ReconciliationResult> {
        info!(
            "Destroying {}/{}",
            self.stack.project.name, self.stack.project.environment
        );

        let lock = self.state_store.acquire_lock(&self.holder, "destroy").await?;
        let outcome = self.destroy_locked(targets, cascade).await;
        self.release(&lock.lock_id).await;
        outcome
    }

    async fn destroy_locked(&self, targets: &[ResourceAddress], cascade: bool) -> Result<ReconciliationResult> {
        let Some(mut state) = self.state_store.load().await? else {
            info!("No state found, nothing to destroy");
            return Ok(ReconciliationResult::converged(0));
        };

        let plan = DeploymentPlan::destroy(&state, targets, cascade)?;
        if plan.is_empty() {
            return Ok(ReconciliationResult::converged(state.resources.len()));
        }

        let execution = PlanExecutor::new(self.provider)
            .with_continue_on_error(self.continue_on_error)
            .with_operation(StackOperation::Destroy)
            .execute(&plan, &mut state)
            .await;

        self.state_store.save(&state).await?;

        let mut result = ReconciliationResult::from_execution(&DiffResult::default(), execution);
        result.unchanged = state.resources.len();
        Ok(result)
    }

    async fn release(&self, lock_id: &str) {
        if let Err(e) = self.state_store.release_lock(lock_id).await {
            warn!("Failed to release state lock: {e}");
        }
    }

    /// Checks for drift without applying changes.
    ///
    /// # Errors
    ///
    /// Returns an error if state cannot be loaded or observation fails.
    pub async fn check_drift(&self) -> Result<DriftReport> {
        info!(
            "Checking for drift in {}/{}",
            self.stack.project.name, self.stack.project.environment
        );

        let state = self.state_store.load().await?;
        let observed = self.observe(state.as_ref()).await?;
        let diff = self.diff_engine.compute_diff(self.stack, state.as_ref(), &observed);

        let mut report = DriftReport {
            has_drift: diff.has_changes(),
            drifted_resources: vec![],
            missing_resources: vec![],
            pending_changes: vec![],
            total_resources: self.stack.resources.len(),
            observed_count: observed.values().filter(|o| o.exists).count(),
            alarm_states: observed
                .values()
                .filter_map(|o| o.alarm_state.map(|s| (o.address.name.clone(), s)))
                .collect(),
        };

        for resource_diff in &diff.diffs {
            let address = resource_diff.address.to_string();
            match resource_diff.diff_type {
                DiffType::Drift => report.drifted_resources.push(address),
                DiffType::Create if resource_diff.old_hash.is_some() => report.missing_resources.push(address),
                DiffType::NoChange => {}
                other => report.pending_changes.push(format!("{other} {address}")),
            }
        }

        debug!(
            "{} drifted, {} missing, {} pending",
            report.drifted_resources.len(),
            report.missing_resources.len(),
            report.pending_changes.len()
        );

        Ok(report)
    }
}

impl ReconciliationResult {
    fn converged(unchanged: usize) -> Self {
        Self {
            success: true,
            created: 0,
            updated: 0,
            deleted: 0,
            unchanged,
            actions: vec![],
            errors: vec![],
        }
    }

    fn from_execution(diff: &DiffResult, execution: ExecutionResult) -> Self {
        let done = |action_type: ActionType| {
            execution
                .results
                .iter()
                .filter(|r| r.success && r.action_type == action_type)
                .count()
        };
        let created = done(ActionType::Create);
        let updated = done(ActionType::Update);
        let deleted = done(ActionType::Delete);

        let mut errors: Vec<String> = execution
            .results
            .iter()
            .filter(|r| !r.success)
            .filter_map(|r| r.error.as_ref().map(|e| format!("{}: {e}", r.address)))
            .collect();

        if !execution.success {
            error!("{execution}");
            errors.insert(0, execution.to_string());
        }

        Self {
            success: execution.success,
            created,
            updated,
            deleted,
            unchanged: diff.unchanged,
            actions: execution.results,
            errors,
        }
    }

    /// Returns the first failed action.
    #[must_use]
    pub fn first_failure(&self) -> Option<&ActionResult> {
        self.actions.iter().find(|r| !r.success && !r.is_skipped())
    }
}

impl DriftReport {
    /// Returns true if the stack is converged (no drift).
    #[must_use]
    pub const fn is_converged(&self) -> bool {
        !self.has_drift
    }
}

impl std::fmt::Display for DriftReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if !self.has_drift {
            return write!(f, "No drift detected - stack is converged");
        }

        writeln!(f, "Drift detected:")?;
        for resource in &self.drifted_resources {
            writeln!(f, "  ~ {resource} (changed outside sgw)")?;
        }
        for resource in &self.missing_resources {
            writeln!(f, "  ! {resource} (missing)")?;
        }
        for change in &self.pending_changes {
            writeln!(f, "  + {change} (pending)")?;
        }
        Ok(())
    }
}

impl std::fmt::Display for ReconciliationResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let status = if self.success { "successful" } else { "failed" };
        writeln!(f, "Reconciliation {status}:")?;
        writeln!(f, "  Created: {}", self.created)?;
        writeln!(f, "  Updated: {}", self.updated)?;
        writeln!(f, "  Deleted: {}", self.deleted)?;
        writeln!(f, "  Unchanged: {}", self.unchanged)?;

        if !self.errors.is_empty() {
            writeln!(f, "  Errors:")?;
            for error in &self.errors {
                writeln!(f, "    - {error}")?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConfigParser, ConfigValidator, expand_stack};
    use crate::provider::LocalControlPlane;
    use crate::state::LocalStateStore;
    use tempfile::TempDir;

    const STACK: &str = r#"
project:
  name: sgw
  environment: test
  account_id: "123456789012"
topics:
  - name: storage-gateway-health-alerts
policies:
  - name: publish
    topic: storage-gateway-health-alerts
    statements:
      - principal:
          service: [cloudwatch.amazonaws.com]
alarms:
  - name: gateway-health
    metric_name: HealthNotifications
    namespace: AWS/StorageGateway
    comparison_operator: GreaterThanOrEqualToThreshold
    statistic: Sum
    threshold: 1
    dimensions:
      GatewayId: sgw-12345678
    alarm_actions: [storage-gateway-health-alerts]
    ok_actions: [storage-gateway-health-alerts]
"#;

    fn load(yaml: &str) -> Stack {
        let config = ConfigParser::new().parse_yaml(yaml, None).unwrap();
        let stack = expand_stack(&config).unwrap();
        assert!(ConfigValidator::new().validate(&config, &stack).unwrap().is_valid());
        stack
    }

    #[tokio::test]
    async fn test_second_apply_is_a_no_op() {
        let dir = TempDir::new().unwrap();
        let store = LocalStateStore::with_base_dir(dir.path());
        let provider = LocalControlPlane::in_memory("us-east-1", Some("123456789012"));
        let stack = load(STACK);

        let reconciler = Reconciler::new(&stack, &store, &provider, "test");
        let first = reconciler.apply().await.unwrap();
        assert!(first.success);
        assert_eq!(first.created, 3);

        let changes = reconciler.plan().await.unwrap();
        assert!(changes.plan.is_empty());

        let second = reconciler.apply().await.unwrap();
        assert_eq!(second.created, 0);
        assert_eq!(second.unchanged, 3);
        assert!(!store.is_locked().await.unwrap());
    }

    #[tokio::test]
    async fn test_drift_is_detected_and_repaired() {
        let dir = TempDir::new().unwrap();
        let store = LocalStateStore::with_base_dir(dir.path());
        let provider = LocalControlPlane::in_memory("us-east-1", Some("123456789012"));
        let stack = load(STACK);

        let reconciler = Reconciler::new(&stack, &store, &provider, "test");
        reconciler.apply().await.unwrap();

        let arn = provider.topic_arn("storage-gateway-health-alerts");
        provider.remove_topic_policy(&arn).await.unwrap();
        provider.delete_metric_alarm("gateway-health").await.unwrap();

        let report = reconciler.check_drift().await.unwrap();
        assert!(report.has_drift);
        assert_eq!(report.missing_resources.len(), 2);

        let repaired = reconciler.apply().await.unwrap();
        assert!(repaired.success);
        assert_eq!(repaired.created, 2);
        assert!(reconciler.check_drift().await.unwrap().is_converged());
    }

    #[tokio::test]
    async fn test_destroy_removes_everything() {
        let dir = TempDir::new().unwrap();
        let store = LocalStateStore::with_base_dir(dir.path());
        let provider = LocalControlPlane::in_memory("us-east-1", Some("123456789012"));
        let stack = load(STACK);

        let reconciler = Reconciler::new(&stack, &store, &provider, "test");
        reconciler.apply().await.unwrap();

        let result = reconciler.destroy(&[], false).await.unwrap();
        assert!(result.success);
        assert_eq!(result.deleted, 3);
        assert_eq!(provider.counts().await, (0, 0));

        let state = store.load().await.unwrap().unwrap();
        assert!(state.is_empty());
    }

    #[tokio::test]
    async fn test_apply_refuses_foreign_lock() {
        let dir = TempDir::new().unwrap();
        let store = LocalStateStore::with_base_dir(dir.path());
        let provider = LocalControlPlane::in_memory("us-east-1", None);
        let stack = load(STACK);

        store.acquire_lock("someone-else", "apply").await.unwrap();
        let reconciler = Reconciler::new(&stack, &store, &provider, "test");
        assert!(reconciler.apply().await.is_err());
    }
}
