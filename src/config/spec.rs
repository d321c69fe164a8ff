//! Declaration types for the alerting stack.
//!
//! This module defines the structs that map to the `sgw.stack.yaml` file.
//! Declarations only describe intent; references between them are symbolic
//! topic names that are resolved after template expansion.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The root configuration structure for a stack.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StackConfig {
    /// Project-level configuration.
    pub project: ProjectConfig,
    /// State backend configuration.
    #[serde(default)]
    pub state: StateConfig,
    /// Named configuration inputs, referenced as `${input.<name>}`.
    #[serde(default)]
    pub inputs: BTreeMap<String, String>,
    /// Monitored gateways, used by `for_each: gateways` alarms.
    #[serde(default)]
    pub gateways: Vec<GatewayInput>,
    /// Notification topics.
    #[serde(default)]
    pub topics: Vec<TopicConfig>,
    /// Publish policies attached to topics.
    #[serde(default)]
    pub policies: Vec<PolicyConfig>,
    /// Metric alarms.
    #[serde(default)]
    pub alarms: Vec<AlarmConfig>,
}

/// Project-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProjectConfig {
    /// Unique name for the project.
    pub name: String,
    /// Environment (e.g., "dev", "staging", "prod").
    #[serde(default = "default_environment")]
    pub environment: String,
    /// Target region.
    #[serde(default = "default_region")]
    pub region: String,
    /// Target account, used to predict identities before the first apply.
    #[serde(default)]
    pub account_id: Option<String>,
}

/// State backend configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct StateConfig {
    /// Backend type (local or s3).
    #[serde(default)]
    pub backend: StateBackend,
    /// S3 bucket name (required for s3 backend).
    #[serde(default)]
    pub bucket: Option<String>,
    /// S3 key prefix (optional).
    #[serde(default)]
    pub prefix: Option<String>,
    /// S3 region (optional, uses AWS default if not specified).
    #[serde(default)]
    pub region: Option<String>,
    /// Local state directory (for local backend).
    #[serde(default)]
    pub path: Option<String>,
}

/// State backend types.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StateBackend {
    /// Local file-based state storage.
    #[default]
    Local,
    /// AWS S3-based state storage.
    S3,
}

/// A monitored Storage Gateway.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GatewayInput {
    /// Short key used in generated names.
    pub key: String,
    /// Gateway identifier (the `GatewayId` metric dimension).
    pub gateway_id: String,
    /// Gateway name (the `GatewayName` metric dimension).
    pub gateway_name: String,
}

/// A notification topic declaration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TopicConfig {
    /// Topic name, unique within the account and region.
    pub name: String,
    /// Optional display name.
    #[serde(default)]
    pub display_name: Option<String>,
    /// Tags applied to the topic.
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

/// A publish policy declaration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PolicyConfig {
    /// Policy name, unique within the stack.
    pub name: String,
    /// Name of the topic the policy is attached to.
    pub topic: String,
    /// Policy language version.
    #[serde(default = "default_policy_version")]
    pub version: String,
    /// Policy statements.
    pub statements: Vec<StatementConfig>,
}

/// A single policy statement declaration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StatementConfig {
    /// Statement identifier (defaults to `Stmt<n>`).
    #[serde(default)]
    pub sid: Option<String>,
    /// Allow or deny.
    #[serde(default)]
    pub effect: Effect,
    /// Principal granted by the statement.
    pub principal: Principal,
    /// Action name.
    #[serde(default = "default_action")]
    pub action: String,
    /// Explicit resource; `${topic}` expands to the target topic identity.
    #[serde(default)]
    pub resource: Option<String>,
}

/// Statement effect.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
pub enum Effect {
    /// Grant the action.
    #[default]
    Allow,
    /// Deny the action.
    Deny,
}

/// Statement principal.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Principal {
    /// Service principals such as `cloudwatch.amazonaws.com`.
    Service(Vec<String>),
    /// Account or role ARNs.
    Aws(Vec<String>),
    /// Everyone.
    Any,
}

/// A metric alarm declaration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AlarmConfig {
    /// Alarm name; may contain placeholders.
    pub name: String,
    /// Optional description; may contain placeholders.
    #[serde(default)]
    pub description: Option<String>,
    /// Instantiate this alarm once per monitored resource.
    #[serde(default)]
    pub for_each: Option<ForEach>,
    /// Comparison between the statistic and the threshold.
    pub comparison_operator: ComparisonOperator,
    /// Number of consecutive periods evaluated.
    #[serde(default = "default_evaluation_periods")]
    pub evaluation_periods: u32,
    /// Breaching datapoints required within the evaluation window.
    #[serde(default)]
    pub datapoints_to_alarm: Option<u32>,
    /// Metric name.
    pub metric_name: String,
    /// Metric namespace.
    pub namespace: String,
    /// Aggregation window in seconds.
    #[serde(default = "default_period_secs")]
    pub period_secs: u32,
    /// Aggregation statistic.
    pub statistic: Statistic,
    /// Threshold compared against the statistic.
    pub threshold: f64,
    /// Metric dimensions; values may contain placeholders.
    #[serde(default)]
    pub dimensions: BTreeMap<String, String>,
    /// Topics notified on entering ALARM.
    #[serde(default)]
    pub alarm_actions: Vec<String>,
    /// Topics notified on returning to OK.
    #[serde(default)]
    pub ok_actions: Vec<String>,
    /// Topics notified on entering `INSUFFICIENT_DATA`.
    #[serde(default)]
    pub insufficient_data_actions: Vec<String>,
    /// How missing datapoints are treated.
    #[serde(default)]
    pub treat_missing_data: TreatMissingData,
    /// Whether actions fire on state transitions.
    #[serde(default = "default_actions_enabled")]
    pub actions_enabled: bool,
}

/// Composition source for an alarm.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ForEach {
    /// One instance per entry in `gateways`.
    Gateways,
}

/// Alarm comparison operators.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ComparisonOperator {
    /// Statistic > threshold.
    GreaterThanThreshold,
    /// Statistic >= threshold.
    GreaterThanOrEqualToThreshold,
    /// Statistic < threshold.
    LessThanThreshold,
    /// Statistic <= threshold.
    LessThanOrEqualToThreshold,
}

/// Aggregation statistics.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Statistic {
    /// Sum of datapoints.
    Sum,
    /// Mean of datapoints.
    Average,
    /// Smallest datapoint.
    #[serde(alias = "Min")]
    Minimum,
    /// Largest datapoint.
    #[serde(alias = "Max")]
    Maximum,
    /// Number of datapoints.
    SampleCount,
}

/// Treatment of missing datapoints.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "camelCase")]
pub enum TreatMissingData {
    /// Missing datapoints are not evaluated.
    #[default]
    Missing,
    /// The current state is kept.
    Ignore,
    /// Missing datapoints count as breaching.
    Breaching,
    /// Missing datapoints count as healthy.
    NotBreaching,
}

// Default value functions

const fn default_evaluation_periods() -> u32 {
    1
}

const fn default_period_secs() -> u32 {
    300
}

const fn default_actions_enabled() -> bool {
    true
}

fn default_environment() -> String {
    String::from("dev")
}

fn default_region() -> String {
    String::from("us-east-1")
}

fn default_policy_version() -> String {
    String::from(super::POLICY_VERSION)
}

fn default_action() -> String {
    String::from("SNS:Publish")
}

impl StackConfig {
    /// Returns the fully qualified project name including environment.
    #[must_use]
    pub fn qualified_name(&self) -> String {
        format!("{}-{}", self.project.name, self.project.environment)
    }

    /// Returns topic names in declaration order.
    #[must_use]
    pub fn topic_names(&self) -> Vec<&str> {
        self.topics.iter().map(|t| t.name.as_str()).collect()
    }
}

impl ComparisonOperator {
    /// Returns the operator symbol.
    #[must_use]
    pub const fn symbol(self) -> &'static str {
        match self {
            Self::GreaterThanThreshold => ">",
            Self::GreaterThanOrEqualToThreshold => ">=",
            Self::LessThanThreshold => "<",
            Self::LessThanOrEqualToThreshold => "<=",
        }
    }
}

impl std::fmt::Display for ComparisonOperator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.symbol())
    }
}

impl std::fmt::Display for Statistic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Sum => "Sum",
            Self::Average => "Average",
            Self::Minimum => "Minimum",
            Self::Maximum => "Maximum",
            Self::SampleCount => "SampleCount",
        };
        write!(f, "{s}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_principal_yaml_forms() {
        let service: Principal = serde_yaml::from_str("service: [cloudwatch.amazonaws.com]").unwrap();
        assert_eq!(
            service,
            Principal::Service(vec![String::from("cloudwatch.amazonaws.com")])
        );

        let any: Principal = serde_yaml::from_str("any").unwrap();
        assert_eq!(any, Principal::Any);
    }

    #[test]
    fn test_statistic_aliases() {
        let min: Statistic = serde_yaml::from_str("Min").unwrap();
        assert_eq!(min, Statistic::Minimum);
        let max: Statistic = serde_yaml::from_str("Maximum").unwrap();
        assert_eq!(max, Statistic::Maximum);
    }

    #[test]
    fn test_comparison_symbol() {
        assert_eq!(ComparisonOperator::GreaterThanOrEqualToThreshold.to_string(), ">=");
        assert_eq!(ComparisonOperator::LessThanThreshold.symbol(), "<");
    }
}
