//! Output formatting for CLI commands.
//!
//! This module provides formatting utilities for displaying
//! information to the user in various formats.

use colored::Colorize;
use std::collections::BTreeMap;
use std::fmt::Write;
use tabled::{Table, Tabled};

use crate::config::ValidationResult;
use crate::graph::DependencyGraph;
use crate::inventory::GatewayStatus;
use crate::model::{RenderedResource, ResourceAddress, Stack};
use crate::planner::{ActionType, DeploymentPlan, DiffResult, DiffType};
use crate::reconciler::{DriftReport, ReconciliationResult};
use crate::state::StackState;

use super::commands::OutputFormat;

/// Output formatter for CLI.
#[derive(Debug)]
pub struct OutputFormatter {
    /// Output format.
    format: OutputFormat,
}

/// Plan action row for table display.
#[derive(Tabled)]
struct PlanActionRow {
    #[tabled(rename = "#")]
    index: usize,
    #[tabled(rename = "Action")]
    action: String,
    #[tabled(rename = "Resource")]
    resource: String,
    #[tabled(rename = "Reason")]
    reason: String,
}

/// Recorded resource row for table display.
#[derive(Tabled)]
struct ResourceRow {
    #[tabled(rename = "Resource")]
    address: String,
    #[tabled(rename = "Identity")]
    identity: String,
    #[tabled(rename = "Hash")]
    hash: String,
    #[tabled(rename = "Updated")]
    updated: String,
}

/// Gateway row for table display.
#[derive(Tabled)]
struct GatewayRow {
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Type")]
    gateway_type: String,
}

impl OutputFormatter {
    /// Creates a new output formatter.
    #[must_use]
    pub const fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Returns true when formatting JSON.
    #[must_use]
    pub const fn is_json(&self) -> bool {
        matches!(self.format, OutputFormat::Json)
    }

    /// Formats a deployment plan for display.
    #[must_use]
    pub fn format_plan(&self, plan: &DeploymentPlan) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(&PlanJson::from(plan)).unwrap_or_default(),
            OutputFormat::Text => Self::format_plan_text(plan),
        }
    }

    /// Formats a plan as text.
    fn format_plan_text(plan: &DeploymentPlan) -> String {
        if plan.is_empty() {
            return format!("{} No changes required - stack is up to date.\n", "✓".green());
        }

        let mut output = String::new();

        let _ = write!(output, "\nPlan\n");
        let _ = write!(output, "   Config hash: {}\n\n", Self::short(&plan.config_hash));

        let rows: Vec<PlanActionRow> = plan
            .actions
            .iter()
            .enumerate()
            .map(|(i, a)| PlanActionRow {
                index: i + 1,
                action: Self::format_action_type(a.action_type),
                resource: a.address.to_string(),
                reason: Self::truncate(&a.reason, 48),
            })
            .collect();

        output.push_str(&Table::new(rows).to_string());
        output.push('\n');

        let _ = write!(
            output,
            "\nPlan: {} to create, {} to update, {} to destroy\n",
            plan.count(ActionType::Create).to_string().green(),
            plan.count(ActionType::Update).to_string().yellow(),
            plan.count(ActionType::Delete).to_string().red()
        );

        output
    }

    /// Formats per-resource diff details.
    #[must_use]
    pub fn format_diff(&self, diff: &DiffResult) -> String {
        match self.format {
            OutputFormat::Json => {
                let entries: Vec<DiffJson> = diff.actionable_diffs().into_iter().map(DiffJson::from).collect();
                serde_json::to_string_pretty(&entries).unwrap_or_default()
            }
            OutputFormat::Text => {
                let mut output = String::from("\nDetailed changes:\n");
                for entry in diff.actionable_diffs() {
                    let marker = match entry.diff_type {
                        DiffType::Create => "+".green(),
                        DiffType::Delete => "-".red(),
                        DiffType::Replace => "±".red(),
                        DiffType::Drift => "!".yellow(),
                        DiffType::Update | DiffType::NoChange => "~".yellow(),
                    };
                    let _ = writeln!(output, "  {marker} {entry}");
                }
                output
            }
        }
    }

    /// Formats a drift report.
    #[must_use]
    pub fn format_drift(&self, report: &DriftReport) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(report).unwrap_or_default(),
            OutputFormat::Text => {
                let mut output = if report.is_converged() {
                    format!("{} No drift detected - stack is converged.\n", "✓".green())
                } else {
                    let mut output = format!("{} Drift detected:\n\n", "⚠".yellow());
                    for resource in &report.drifted_resources {
                        let _ = writeln!(output, "   ~ {resource} (changed outside sgw)");
                    }
                    for resource in &report.missing_resources {
                        let _ = writeln!(output, "   ! {resource} (missing)");
                    }
                    for change in &report.pending_changes {
                        let _ = writeln!(output, "   + {change} (pending)");
                    }
                    let _ = write!(
                        output,
                        "\n{}/{} resources have drifted.\n",
                        report.drifted_resources.len() + report.missing_resources.len(),
                        report.total_resources
                    );
                    output
                };

                if !report.alarm_states.is_empty() {
                    output.push_str("\nAlarm states:\n");
                    for (name, state) in &report.alarm_states {
                        let state = match state {
                            crate::model::AlarmState::Ok => state.to_string().green(),
                            crate::model::AlarmState::Alarm => state.to_string().red(),
                            crate::model::AlarmState::InsufficientData => state.to_string().dimmed(),
                        };
                        let _ = writeln!(output, "   {name}: {state}");
                    }
                }

                output
            }
        }
    }

    /// Formats a reconciliation result.
    #[must_use]
    pub fn format_reconciliation(&self, result: &ReconciliationResult) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(result).unwrap_or_default(),
            OutputFormat::Text => {
                let status = if result.success {
                    format!("{} Apply complete", "✓".green())
                } else {
                    format!("{} Apply failed", "✗".red())
                };

                let mut output = format!("{status}\n\n");
                let _ = writeln!(output, "   Created: {}", result.created);
                let _ = writeln!(output, "   Updated: {}", result.updated);
                let _ = writeln!(output, "   Deleted: {}", result.deleted);
                let _ = writeln!(output, "   Unchanged: {}", result.unchanged);

                if !result.errors.is_empty() {
                    let _ = write!(output, "\n{} Errors:\n", "⚠".yellow());
                    for error in &result.errors {
                        let _ = writeln!(output, "   - {error}");
                    }
                }

                output
            }
        }
    }

    /// Formats stack state.
    #[must_use]
    pub fn format_state(&self, state: &StackState) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(state).unwrap_or_default(),
            OutputFormat::Text => {
                let mut output = String::new();

                let _ = write!(output, "\nState: {}/{}\n\n", state.project, state.environment);
                let _ = writeln!(output, "   Version: {}", state.version);
                let _ = writeln!(output, "   Config hash: {}", Self::short(&state.config_hash));
                let _ = writeln!(output, "   Last updated: {}", state.last_updated);
                let _ = writeln!(output, "   Resources: {}", state.resources.len());

                if !state.resources.is_empty() {
                    let rows: Vec<ResourceRow> = state
                        .resources
                        .values()
                        .map(|r| ResourceRow {
                            address: r.address.to_string(),
                            identity: Self::truncate(&r.identity, 60),
                            hash: Self::short(&r.config_hash).to_string(),
                            updated: r.updated_at.format("%Y-%m-%d %H:%M").to_string(),
                        })
                        .collect();
                    output.push('\n');
                    output.push_str(&Table::new(rows).to_string());
                    output.push('\n');
                }

                if !state.history.is_empty() {
                    let _ = writeln!(output, "\n   Recent history ({}):", state.history.len());
                    for entry in state.history.iter().rev().take(5) {
                        let status = if entry.success { "✓" } else { "✗" };
                        let _ = writeln!(
                            output,
                            "     {status} {} - {} ({})",
                            entry.timestamp.format("%Y-%m-%d %H:%M"),
                            entry.operation,
                            entry.resources.join(", ")
                        );
                    }
                }

                output
            }
        }
    }

    /// Formats a validation result with a summary of the expanded stack.
    #[must_use]
    pub fn format_validation(&self, result: &ValidationResult, stack: &Stack, show_warnings: bool) -> String {
        match self.format {
            OutputFormat::Json => {
                let json = serde_json::json!({
                    "valid": result.is_valid(),
                    "errors": result.errors.iter().map(ToString::to_string).collect::<Vec<_>>(),
                    "warnings": result.warnings,
                    "topics": stack.topics().count(),
                    "policies": stack.policies().count(),
                    "alarms": stack.alarms().count(),
                });
                serde_json::to_string_pretty(&json).unwrap_or_default()
            }
            OutputFormat::Text => {
                let mut output = if result.is_valid() {
                    format!("{} Configuration is valid!\n", "✓".green())
                } else {
                    let mut output = format!("{} {} validation error(s):\n", "✗".red(), result.error_count());
                    for error in &result.errors {
                        let _ = writeln!(output, "   - {error}");
                    }
                    output
                };

                if show_warnings && !result.warnings.is_empty() {
                    let _ = write!(output, "\n{} Warnings:\n", "⚠".yellow());
                    for warning in &result.warnings {
                        let _ = writeln!(output, "   - {warning}");
                    }
                } else if result.warning_count() > 0 {
                    let _ = writeln!(output, "   ({} warning(s), use --warnings to show)", result.warning_count());
                }

                let _ = writeln!(output, "\nStack summary:");
                let _ = writeln!(output, "   Project: {}/{}", stack.project.name, stack.project.environment);
                let _ = writeln!(output, "   Region: {}", stack.project.region);
                let _ = writeln!(output, "   Topics: {}", stack.topics().count());
                let _ = writeln!(output, "   Policies: {}", stack.policies().count());
                let _ = writeln!(output, "   Alarms: {}", stack.alarms().count());

                output
            }
        }
    }

    /// Formats the dependency graph and its creation order.
    #[must_use]
    pub fn format_graph(&self, graph: &DependencyGraph, order: &[ResourceAddress]) -> String {
        match self.format {
            OutputFormat::Json => {
                let edges: BTreeMap<String, Vec<String>> = graph
                    .iter()
                    .map(|(node, deps)| (node.to_string(), deps.iter().map(ToString::to_string).collect()))
                    .collect();
                let json = serde_json::json!({
                    "dependencies": edges,
                    "creation_order": order.iter().map(ToString::to_string).collect::<Vec<_>>(),
                });
                serde_json::to_string_pretty(&json).unwrap_or_default()
            }
            OutputFormat::Text => {
                let mut output = String::from("\nDependencies:\n");
                for (node, deps) in graph.iter() {
                    if deps.is_empty() {
                        let _ = writeln!(output, "   {node}");
                    } else {
                        let deps: Vec<String> = deps.iter().map(ToString::to_string).collect();
                        let _ = writeln!(output, "   {node} -> {}", deps.join(", "));
                    }
                }

                output.push_str("\nCreation order:\n");
                for (i, node) in order.iter().enumerate() {
                    let _ = writeln!(output, "   {}. {node}", i + 1);
                }
                output
            }
        }
    }

    /// Formats rendered resources.
    ///
    /// Rendered documents are always JSON; text output adds a header per
    /// resource.
    #[must_use]
    pub fn format_rendered(&self, rendered: &BTreeMap<ResourceAddress, RenderedResource>) -> String {
        match self.format {
            OutputFormat::Json => {
                let json: BTreeMap<String, serde_json::Value> =
                    rendered.iter().map(|(a, r)| (a.to_string(), r.to_value())).collect();
                serde_json::to_string_pretty(&json).unwrap_or_default()
            }
            OutputFormat::Text => {
                let mut output = String::new();
                for (address, resource) in rendered {
                    let body = match resource {
                        RenderedResource::Policy { document, .. } => serde_json::to_string_pretty(document).unwrap_or_default(),
                        _ => serde_json::to_string_pretty(&resource.to_value()).unwrap_or_default(),
                    };
                    let _ = write!(output, "# {}\n{body}\n\n", address.to_string().bold());
                }
                output
            }
        }
    }

    /// Formats gateway status.
    #[must_use]
    pub fn format_gateway_status(&self, gateways: &[GatewayStatus]) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(gateways).unwrap_or_default(),
            OutputFormat::Text => {
                if gateways.is_empty() {
                    return "   No gateways found.\n".to_string();
                }

                let rows: Vec<GatewayRow> = gateways
                    .iter()
                    .map(|g| GatewayRow {
                        name: g.name.clone(),
                        id: g.id.clone(),
                        status: Self::format_gateway_state(&g.status),
                        gateway_type: g.gateway_type.clone(),
                    })
                    .collect();

                let mut output = format!("\nGateways ({}):\n\n", gateways.len());
                output.push_str(&Table::new(rows).to_string());
                output.push('\n');
                output
            }
        }
    }

    /// Formats an action type with color.
    fn format_action_type(action_type: ActionType) -> String {
        match action_type {
            ActionType::Create => "+create".green().to_string(),
            ActionType::Update => "~update".yellow().to_string(),
            ActionType::Delete => "-delete".red().to_string(),
        }
    }

    /// Formats a gateway state with color.
    fn format_gateway_state(state: &str) -> String {
        match state {
            "RUNNING" => state.green().to_string(),
            "SHUTDOWN" => state.red().to_string(),
            _ => state.dimmed().to_string(),
        }
    }

    fn short(hash: &str) -> &str {
        &hash[..8.min(hash.len())]
    }

    /// Truncates a string to a maximum number of characters.
    fn truncate(s: &str, max_len: usize) -> String {
        if s.chars().count() <= max_len {
            s.to_string()
        } else {
            let head: String = s.chars().take(max_len.saturating_sub(3)).collect();
            format!("{head}...")
        }
    }
}

// JSON serialization helpers

#[derive(serde::Serialize)]
struct PlanJson {
    config_hash: String,
    action_count: usize,
    creates: usize,
    updates: usize,
    deletes: usize,
    actions: Vec<ActionJson>,
}

#[derive(serde::Serialize)]
struct ActionJson {
    action_type: ActionType,
    resource: String,
    reason: String,
    depends_on: Vec<usize>,
}

impl From<&DeploymentPlan> for PlanJson {
    fn from(plan: &DeploymentPlan) -> Self {
        Self {
            config_hash: plan.config_hash.clone(),
            action_count: plan.action_count(),
            creates: plan.count(ActionType::Create),
            updates: plan.count(ActionType::Update),
            deletes: plan.count(ActionType::Delete),
            actions: plan
                .actions
                .iter()
                .map(|a| ActionJson {
                    action_type: a.action_type,
                    resource: a.address.to_string(),
                    reason: a.reason.clone(),
                    depends_on: a.dependencies.clone(),
                })
                .collect(),
        }
    }
}

#[derive(serde::Serialize)]
struct DiffJson {
    resource: String,
    change: String,
    fields: Vec<String>,
}

impl From<&crate::planner::ResourceDiff> for DiffJson {
    fn from(diff: &crate::planner::ResourceDiff) -> Self {
        Self {
            resource: diff.address.to_string(),
            change: diff.diff_type.to_string(),
            fields: diff.details.iter().map(|d| d.field.clone()).collect(),
        }
    }
}
