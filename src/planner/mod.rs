//! Planning module for stack operations.
//!
//! This module compares declared resources with recorded and observed
//! state, orders the resulting changes into a plan, and executes plans
//! against the control plane.

mod diff;
mod executor;
mod plan;

pub use diff::{DiffDetail, DiffEngine, DiffResult, DiffType, ResourceDiff};
pub use executor::{ActionResult, ExecutionResult, PlanExecutor};
pub use plan::{ActionType, DeploymentPlan, PlannedAction};
