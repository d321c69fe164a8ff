//! Configuration module for the alerting stack.
//!
//! This module handles all configuration-related functionality:
//! - Parsing and deserializing `sgw.stack.yaml`
//! - Template expansion of inputs and per-gateway alarms
//! - Validation of configuration values and references
//! - Computing configuration hashes for change detection

mod hash;
mod parser;
mod spec;
mod template;
mod validator;

/// Default policy language version.
pub const POLICY_VERSION: &str = "2012-10-17";

pub use hash::ConfigHasher;
pub use parser::{find_config_file, ConfigParser, DEFAULT_CONFIG_FILES};
pub use spec::{
    AlarmConfig, ComparisonOperator, Effect, ForEach, GatewayInput, PolicyConfig, Principal,
    ProjectConfig, StackConfig, StateBackend, StateConfig, StatementConfig, Statistic,
    TopicConfig, TreatMissingData,
};
pub use template::{expand_stack, interpolate, TemplateScope};
pub use validator::{ConfigValidator, ValidationError, ValidationResult};
