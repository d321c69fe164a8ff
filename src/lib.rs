// ============================================================================
// Strict linting - Dangerous or non-idiomatic practices are forbidden
// ============================================================================

#![forbid(unsafe_code)]               // Unsafe code is forbidden
#![deny(missing_docs)]                // All public items must be documented
#![deny(dead_code)]                   // Unused code is forbidden
#![deny(non_camel_case_types)]        // Types must follow CamelCase convention

// Additional strictness - Leave nothing unchecked
#![deny(unused_imports)]              // Unused imports are forbidden
#![deny(unused_variables)]            // Unused variables are forbidden
#![deny(unused_must_use)]             // Must handle Result and Option explicitly
#![deny(non_snake_case)]              // Variables and functions must be snake_case
#![deny(non_upper_case_globals)]      // Constants must be UPPER_CASE
#![deny(nonstandard_style)]           // Non-standard code style is forbidden
#![forbid(unsafe_op_in_unsafe_fn)]    // Unsafe ops in unsafe fns are forbidden

// Clippy lints (warnings only)
#![warn(clippy::all)]                 // All standard Clippy lints
#![warn(clippy::pedantic)]            // Very strict Clippy lints
#![warn(clippy::nursery)]             // Experimental lints
#![warn(clippy::unwrap_used)]         // unwrap() warning
#![warn(clippy::expect_used)]         // expect() warning
#![warn(clippy::panic)]               // panic!() warning
#![warn(clippy::print_stdout)]        // println!() warning
#![warn(clippy::todo)]                // TODO warning
#![warn(clippy::unimplemented)]       // unimplemented!() warning
#![warn(clippy::missing_const_for_fn)] // Force const when possible
#![warn(clippy::unwrap_in_result)]    // unwrap() in Result warning
#![warn(clippy::module_inception)]    // Module with same name as crate warning
#![warn(clippy::redundant_clone)]     // Useless clones warning
#![warn(clippy::shadow_unrelated)]    // Shadowing unrelated variables warning
#![warn(clippy::too_many_arguments)]  // Limit function arguments
#![warn(clippy::cognitive_complexity)] // Limit cognitive complexity

// Safety and robustness lints
#![deny(overflowing_literals)]        // Overflowing literals are forbidden
#![deny(arithmetic_overflow)]         // Arithmetic overflow is forbidden

// ============================================================================
// Crate Documentation
// ============================================================================

//! # sgw alerts
//!
//! A declarative, idempotent alerting stack for AWS Storage Gateway health
//! notifications: a notification topic, a publish policy on it, and metric
//! alarms that notify the topic.
//!
//! ## Overview
//!
//! sgw lets you:
//!
//! - Declare topics, publish policies, and alarms in a YAML stack file
//! - Instantiate one alarm per monitored gateway from named inputs
//! - Plan and apply changes in dependency order
//! - Detect and repair drift against the control plane
//! - Inventory gateways and file share access
//!
//! ## Architecture
//!
//! The system is built around **desired state reconciliation**:
//!
//! 1. **Desired State**: Declared in `sgw.stack.yaml` and expanded into a [`model::Stack`]
//! 2. **Recorded State**: Identities and hashes of what was applied, kept by a [`state::StateStore`]
//! 3. **Observed State**: Read back from the [`provider::ControlPlane`]
//! 4. **Reconciler**: Diffs the three and executes an ordered plan
//!
//! ## Modules
//!
//! - [`config`]: Stack file parsing, expansion, and validation
//! - [`model`]: Resolved resources, policy documents, and rendering
//! - [`graph`]: Dependency graph and topological ordering
//! - [`state`]: State storage backends (local, S3) and locking
//! - [`provider`]: Control plane interface and local emulator
//! - [`planner`]: Diff computation, planning, and execution
//! - [`reconciler`]: Apply, destroy, and drift detection
//! - [`inventory`]: Gateway status and file share reports
//! - [`cli`]: Command-line interface
//!
//! ## Example
//!
//! ```yaml
//! project:
//!   name: storage-gateway-alerts
//!   environment: prod
//!
//! topics:
//!   - name: storage-gateway-health-alerts
//!
//! policies:
//!   - name: cloudwatch-publish
//!     topic: storage-gateway-health-alerts
//!     statements:
//!       - principal:
//!           service: [cloudwatch.amazonaws.com]
//!
//! alarms:
//!   - name: sgw-health
//!     namespace: AWS/StorageGateway
//!     metric_name: HealthNotifications
//!     statistic: Sum
//!     comparison_operator: GreaterThanOrEqualToThreshold
//!     threshold: 1
//!     dimensions:
//!       GatewayId: sgw-12345678
//!     alarm_actions: [storage-gateway-health-alerts]
//!     ok_actions: [storage-gateway-health-alerts]
//! ```

// ============================================================================
// Modules
// ============================================================================

pub mod cli;
pub mod config;
pub mod error;
pub mod graph;
pub mod inventory;
pub mod model;
pub mod planner;
pub mod provider;
pub mod reconciler;
pub mod state;

// ============================================================================
// Re-exports
// ============================================================================

pub use cli::{Cli, Commands, OutputFormatter};
pub use config::{ConfigHasher, ConfigParser, ConfigValidator, StackConfig, expand_stack};
pub use error::{Result, SgwError};
pub use graph::DependencyGraph;
pub use model::{ResourceAddress, ResourceSpec, Stack};
pub use planner::{DeploymentPlan, DiffEngine, PlanExecutor};
pub use provider::{ControlPlane, LocalControlPlane};
pub use reconciler::{DriftReport, ReconciliationResult, Reconciler};
pub use state::{LocalStateStore, S3StateStore, StackState, StateStore};
