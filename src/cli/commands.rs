//! CLI command definitions.
//!
//! This module defines all CLI commands and their arguments using clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// sgw - Declarative Storage Gateway health alerting.
#[derive(Parser, Debug)]
#[command(name = "sgw")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to the stack file.
    #[arg(short, long, global = true, env = "SGW_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format (text, json).
    #[arg(long, global = true, default_value = "text")]
    pub output: OutputFormat,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Initialize a new stack.
    Init {
        /// Directory to initialize (defaults to current directory).
        #[arg(default_value = ".")]
        path: PathBuf,

        /// Force overwrite existing files.
        #[arg(short, long)]
        force: bool,
    },

    /// Validate the stack file.
    Validate {
        /// Show all warnings, not just errors.
        #[arg(short, long)]
        warnings: bool,
    },

    /// Show the rendered policy documents and alarm definitions.
    Render {
        /// Only render this resource (for example `policy.publish`).
        resource: Option<String>,
    },

    /// Show the dependency graph and creation order.
    Graph,

    /// Generate and display the plan.
    Plan {
        /// Show detailed diff information.
        #[arg(short, long)]
        detailed: bool,
    },

    /// Apply the plan.
    Apply {
        /// Skip confirmation prompt.
        #[arg(short, long)]
        yes: bool,

        /// Continue with independent actions after a failure.
        #[arg(long)]
        continue_on_error: bool,
    },

    /// Check for drift between the stack and the control plane.
    Drift,

    /// Destroy applied resources.
    Destroy {
        /// Skip confirmation prompt.
        #[arg(short, long)]
        yes: bool,

        /// Only destroy these resources (for example `topic.alerts`).
        #[arg(long)]
        target: Vec<String>,

        /// Also destroy resources that reference a target.
        #[arg(long)]
        cascade: bool,
    },

    /// Manage the state backend.
    State {
        /// State subcommand.
        #[command(subcommand)]
        command: StateCommands,
    },

    /// Report Storage Gateway status and file share access.
    Inventory {
        /// Catalog snapshot (JSON describe output).
        #[arg(long)]
        snapshot: PathBuf,

        /// Write the file share report to this file.
        #[arg(long)]
        out: Option<PathBuf>,

        /// Print the `gateways` input for the stack file.
        #[arg(long)]
        emit_gateways: bool,
    },
}

/// State management subcommands.
#[derive(Subcommand, Debug)]
pub enum StateCommands {
    /// Show current state.
    Show,

    /// Lock the state.
    Lock {
        /// Lock holder identifier.
        #[arg(long)]
        holder: Option<String>,
    },

    /// Unlock the state.
    Unlock {
        /// Lock ID to unlock.
        #[arg(long)]
        lock_id: Option<String>,

        /// Force unlock (dangerous).
        #[arg(long)]
        force: bool,
    },
}

/// Output format options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output.
    #[default]
    Text,
    /// JSON output for scripting.
    Json,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_destroy_targets() {
        let cli = Cli::try_parse_from([
            "sgw", "destroy", "--target", "topic.alerts", "--target", "alarm.health", "--cascade", "-y",
        ])
        .unwrap();

        let Commands::Destroy { yes, target, cascade } = cli.command else {
            panic!("expected destroy");
        };
        assert!(yes && cascade);
        assert_eq!(target, vec!["topic.alerts", "alarm.health"]);
    }

    #[test]
    fn test_global_options() {
        let cli = Cli::try_parse_from(["sgw", "plan", "--output", "json", "-v", "--config", "x.yaml"]).unwrap();
        assert_eq!(cli.output, OutputFormat::Json);
        assert!(cli.verbose);
        assert_eq!(cli.config, Some(PathBuf::from("x.yaml")));
    }
}
