//! CLI module for the sgw alerting tool.
//!
//! This module provides the command-line interface for managing
//! the Storage Gateway health alerting stack.

mod commands;
mod output;

pub use commands::{Cli, Commands, OutputFormat, StateCommands};
pub use output::OutputFormatter;
