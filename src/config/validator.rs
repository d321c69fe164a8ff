//! Configuration validation for stack declarations.
//!
//! Validation runs on the expanded [`Stack`] so that names and dimension
//! values produced by templates are checked exactly as they will be sent.
//! Everything here is rejected before any remote call is made.

use crate::error::{ConfigError, Result, SgwError};
use crate::model::{AlarmSpec, PolicySpec, ResourceAddress, ResourceSpec, Stack, TopicSpec, TOPIC_PLACEHOLDER};
use std::collections::{BTreeSet, HashMap, HashSet};
use tracing::debug;

use super::spec::{ForEach, Principal, StackConfig, StateBackend, Statistic};

/// Maximum topic name length.
const MAX_TOPIC_NAME_LEN: usize = 256;

/// Maximum alarm name length.
const MAX_ALARM_NAME_LEN: usize = 255;

/// Longest evaluation window accepted by the monitoring service (7 days).
const MAX_EVALUATION_WINDOW_SECS: u64 = 604_800;

/// Accepted policy language versions.
const POLICY_VERSIONS: &[&str] = &["2012-10-17", "2008-10-17"];

/// Validator for stack configurations.
#[derive(Debug, Default)]
pub struct ConfigValidator;

/// Validation result containing all errors found.
#[derive(Debug, Default)]
pub struct ValidationResult {
    /// List of validation errors.
    pub errors: Vec<ValidationError>,
    /// List of warnings (non-fatal issues).
    pub warnings: Vec<String>,
}

/// A single validation error.
#[derive(Debug)]
pub struct ValidationError {
    /// The field path that failed validation.
    pub field: String,
    /// The error message.
    pub message: String,
}

impl ConfigValidator {
    /// Creates a new validator.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Validates a configuration and its expanded stack.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::DanglingReference`] if a policy or alarm
    /// names an undeclared topic, [`ConfigError::DuplicateName`] for
    /// repeated names, and [`ConfigError::SharedPolicyTarget`] when two
    /// policies target one topic. Every other failed check is collected
    /// into the returned [`ValidationResult`].
    pub fn validate(&self, config: &StackConfig, stack: &Stack) -> Result<ValidationResult> {
        let mut result = ValidationResult::default();

        Self::check_references(stack)?;
        Self::check_duplicates(stack)?;

        Self::validate_project(config, &mut result);
        Self::validate_state(config, &mut result);
        Self::validate_composition(config, &mut result);

        for resource in &stack.resources {
            match resource {
                ResourceSpec::Topic(topic) => Self::validate_topic(topic, &mut result),
                ResourceSpec::Policy(policy) => Self::validate_policy(policy, &mut result),
                ResourceSpec::Alarm(alarm) => Self::validate_alarm(alarm, &mut result),
            }
        }

        if stack.resources.is_empty() {
            result.warnings.push(String::from("No resources defined in configuration"));
        }

        debug!(
            "Configuration validation finished: {} errors, {} warnings",
            result.error_count(),
            result.warning_count()
        );
        Ok(result)
    }

    /// Every reference must name a topic declared in the same stack.
    fn check_references(stack: &Stack) -> Result<()> {
        let topics: HashSet<ResourceAddress> = stack
            .topics()
            .map(|t| ResourceAddress::topic(&t.name))
            .collect();

        for resource in &stack.resources {
            for reference in resource.references() {
                if !topics.contains(&reference) {
                    return Err(SgwError::Config(ConfigError::DanglingReference {
                        from: resource.address().to_string(),
                        topic: reference.name,
                    }));
                }
            }
        }

        Ok(())
    }

    fn check_duplicates(stack: &Stack) -> Result<()> {
        let mut seen = HashSet::new();

        for address in stack.addresses() {
            if !seen.insert(address.clone()) {
                return Err(SgwError::Config(ConfigError::DuplicateName {
                    resource_type: address.kind.to_string(),
                    name: address.name,
                }));
            }
        }

        // A topic holds a single policy document.
        let mut targets: HashMap<&str, &str> = HashMap::new();
        for policy in stack.policies() {
            if let Some(first) = targets.insert(&policy.target.name, &policy.name) {
                return Err(SgwError::Config(ConfigError::SharedPolicyTarget {
                    topic: policy.target.name.clone(),
                    first: first.to_string(),
                    second: policy.name.clone(),
                }));
            }
        }

        Ok(())
    }

    fn validate_project(config: &StackConfig, result: &mut ValidationResult) {
        if config.project.name.is_empty() {
            result.errors.push(ValidationError {
                field: String::from("project.name"),
                message: String::from("Project name cannot be empty"),
            });
        }

        if config.project.environment.is_empty() {
            result.errors.push(ValidationError {
                field: String::from("project.environment"),
                message: String::from("Environment cannot be empty"),
            });
        }

        if let Some(account) = &config.project.account_id
            && (account.len() != 12 || !account.chars().all(|c| c.is_ascii_digit()))
        {
            result.errors.push(ValidationError {
                field: String::from("project.account_id"),
                message: format!("Account id '{account}' must be 12 digits"),
            });
        }
    }

    fn validate_state(config: &StackConfig, result: &mut ValidationResult) {
        let state = &config.state;
        if state.backend == StateBackend::S3 && state.bucket.as_ref().is_none_or(String::is_empty) {
            result.errors.push(ValidationError {
                field: String::from("state.bucket"),
                message: String::from("S3 bucket name is required when using S3 backend"),
            });
        }
    }

    fn validate_composition(config: &StackConfig, result: &mut ValidationResult) {
        let mut keys = HashSet::new();
        for (i, gateway) in config.gateways.iter().enumerate() {
            if !keys.insert(&gateway.key) {
                result.errors.push(ValidationError {
                    field: format!("gateways[{i}].key"),
                    message: format!("Duplicate gateway key: {}", gateway.key),
                });
            }
            if gateway.gateway_id.is_empty() {
                result.errors.push(ValidationError {
                    field: format!("gateways[{i}].gateway_id"),
                    message: String::from("Gateway id cannot be empty"),
                });
            }
        }

        for (i, alarm) in config.alarms.iter().enumerate() {
            if alarm.for_each == Some(ForEach::Gateways) {
                if config.gateways.is_empty() {
                    result.warnings.push(format!(
                        "alarms[{i}]: for_each gateways with no gateways declared expands to nothing"
                    ));
                } else if !alarm.name.contains("${gateway.") {
                    result.errors.push(ValidationError {
                        field: format!("alarms[{i}].name"),
                        message: format!(
                            "Alarm '{}' is instantiated per gateway but its name does not use a gateway placeholder",
                            alarm.name
                        ),
                    });
                }
            }
        }
    }

    fn validate_topic(topic: &TopicSpec, result: &mut ValidationResult) {
        let field = format!("topic.{}", topic.name);

        if topic.name.is_empty() {
            result.errors.push(ValidationError {
                field,
                message: String::from("Topic name cannot be empty"),
            });
        } else if topic.name.len() > MAX_TOPIC_NAME_LEN {
            result.errors.push(ValidationError {
                field,
                message: format!("Topic name exceeds {MAX_TOPIC_NAME_LEN} characters"),
            });
        } else if !is_valid_topic_name(&topic.name) {
            result.errors.push(ValidationError {
                field,
                message: format!(
                    "Topic name '{}' is invalid. Must contain only letters, digits, hyphens, and underscores.",
                    topic.name
                ),
            });
        }
    }

    fn validate_policy(policy: &PolicySpec, result: &mut ValidationResult) {
        let prefix = format!("policy.{}", policy.name);
        let document = &policy.document;

        if policy.name.is_empty() {
            result.errors.push(ValidationError {
                field: prefix.clone(),
                message: String::from("Policy name cannot be empty"),
            });
        }

        if !POLICY_VERSIONS.contains(&document.version.as_str()) {
            result.errors.push(ValidationError {
                field: format!("{prefix}.version"),
                message: format!(
                    "Unsupported policy version '{}'. Expected one of: {}",
                    document.version,
                    POLICY_VERSIONS.join(", ")
                ),
            });
        }

        if document.statements.is_empty() {
            result.errors.push(ValidationError {
                field: format!("{prefix}.statements"),
                message: String::from("Policy must contain at least one statement"),
            });
        }

        let mut sids = HashSet::new();
        for (i, statement) in document.statements.iter().enumerate() {
            let field = format!("{prefix}.statements[{i}]");

            if !sids.insert(&statement.sid) {
                result.errors.push(ValidationError {
                    field: format!("{field}.sid"),
                    message: format!("Duplicate statement id: {}", statement.sid),
                });
            }

            if statement.action.is_empty() {
                result.errors.push(ValidationError {
                    field: format!("{field}.action"),
                    message: String::from("Statement action cannot be empty"),
                });
            }

            let empty_principal = match &statement.principal {
                Principal::Service(v) | Principal::Aws(v) => {
                    v.is_empty() || v.iter().any(String::is_empty)
                }
                Principal::Any => false,
            };
            if empty_principal {
                result.errors.push(ValidationError {
                    field: format!("{field}.principal"),
                    message: String::from("Statement principal cannot be empty"),
                });
            }

            if let Some(resource) = &statement.resource
                && !resource.contains(TOPIC_PLACEHOLDER)
            {
                result.warnings.push(format!(
                    "{field}.resource: literal resource '{resource}' must equal the identity of {} or the apply will be rejected",
                    policy.target
                ));
            }
        }
    }

    fn validate_alarm(alarm: &AlarmSpec, result: &mut ValidationResult) {
        let prefix = format!("alarm.{}", alarm.name);

        if alarm.name.is_empty() || alarm.name.len() > MAX_ALARM_NAME_LEN {
            result.errors.push(ValidationError {
                field: prefix.clone(),
                message: format!("Alarm name must be between 1 and {MAX_ALARM_NAME_LEN} characters"),
            });
        }

        if alarm.metric_name.is_empty() || alarm.namespace.is_empty() {
            result.errors.push(ValidationError {
                field: format!("{prefix}.metric_name"),
                message: String::from("Metric name and namespace are required"),
            });
        }

        if alarm.evaluation_periods == 0 {
            result.errors.push(ValidationError {
                field: format!("{prefix}.evaluation_periods"),
                message: String::from("Evaluation periods must be at least 1"),
            });
        }

        if !is_valid_period(alarm.period_secs) {
            result.errors.push(ValidationError {
                field: format!("{prefix}.period_secs"),
                message: format!(
                    "Period {}s is invalid. Must be 10, 30, or a positive multiple of 60.",
                    alarm.period_secs
                ),
            });
        } else if u64::from(alarm.period_secs) * u64::from(alarm.evaluation_periods) > MAX_EVALUATION_WINDOW_SECS {
            result.errors.push(ValidationError {
                field: format!("{prefix}.evaluation_periods"),
                message: format!(
                    "Evaluation window of {} x {}s exceeds {MAX_EVALUATION_WINDOW_SECS}s",
                    alarm.evaluation_periods, alarm.period_secs
                ),
            });
        }

        if let Some(datapoints) = alarm.datapoints_to_alarm
            && (datapoints == 0 || datapoints > alarm.evaluation_periods)
        {
            result.errors.push(ValidationError {
                field: format!("{prefix}.datapoints_to_alarm"),
                message: format!(
                    "Datapoints to alarm ({datapoints}) must be between 1 and evaluation periods ({})",
                    alarm.evaluation_periods
                ),
            });
        }

        if !alarm.threshold.is_finite() {
            result.errors.push(ValidationError {
                field: format!("{prefix}.threshold"),
                message: String::from("Threshold must be a finite number"),
            });
        } else if alarm.statistic == Statistic::SampleCount && alarm.threshold < 0.0 {
            result.errors.push(ValidationError {
                field: format!("{prefix}.threshold"),
                message: String::from("Threshold cannot be negative for the SampleCount statistic"),
            });
        }

        for (list, actions) in [
            ("alarm_actions", &alarm.alarm_actions),
            ("ok_actions", &alarm.ok_actions),
            ("insufficient_data_actions", &alarm.insufficient_data_actions),
        ] {
            let mut seen = BTreeSet::new();
            for action in actions {
                if !seen.insert(action) {
                    result.errors.push(ValidationError {
                        field: format!("{prefix}.{list}"),
                        message: format!("Duplicate action target: {action}"),
                    });
                }
            }
        }

        if alarm.actions_enabled && alarm.alarm_actions.is_empty() && alarm.ok_actions.is_empty() {
            result
                .warnings
                .push(format!("{prefix}: alarm has no actions and will notify no one"));
        }

        for (key, value) in &alarm.dimensions {
            if value.is_empty() {
                result.errors.push(ValidationError {
                    field: format!("{prefix}.dimensions.{key}"),
                    message: String::from("Dimension value cannot be empty"),
                });
            }
        }
    }
}

/// Topic names use letters, digits, hyphens, and underscores.
fn is_valid_topic_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// Periods of 10 and 30 seconds are high resolution; anything else must be
/// a whole number of minutes.
const fn is_valid_period(period_secs: u32) -> bool {
    matches!(period_secs, 10 | 30) || (period_secs > 0 && period_secs % 60 == 0)
}

impl ValidationResult {
    /// Returns true if validation passed (no errors).
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Returns the number of errors.
    #[must_use]
    pub const fn error_count(&self) -> usize {
        self.errors.len()
    }

    /// Returns the number of warnings.
    #[must_use]
    pub const fn warning_count(&self) -> usize {
        self.warnings.len()
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{expand_stack, ConfigParser};

    const BASE: &str = r"
project:
  name: sgw-alerts
topics:
  - name: storage-gateway-health-alerts
policies:
  - name: storage-gateway-health-alerts-publish
    topic: storage-gateway-health-alerts
    statements:
      - sid: AllowCloudWatchPublish
        principal:
          service: [cloudwatch.amazonaws.com]
";

    fn validate(yaml: &str) -> Result<ValidationResult> {
        let config = ConfigParser::new().parse_yaml(yaml, None)?;
        let stack = expand_stack(&config)?;
        ConfigValidator::new().validate(&config, &stack)
    }

    fn with_alarm(fields: &str) -> String {
        format!(
            "{BASE}alarms:
  - name: storage-gateway-health
    comparison_operator: GreaterThanOrEqualToThreshold
    metric_name: HealthNotifications
    namespace: AWS/StorageGateway
    alarm_actions: [storage-gateway-health-alerts]
    ok_actions: [storage-gateway-health-alerts]
{fields}"
        )
    }

    fn field_error(result: Result<ValidationResult>) -> Option<String> {
        result.ok()?.errors.into_iter().next().map(|e| e.field)
    }

    #[test]
    fn test_valid_stack() {
        let yaml = with_alarm("    statistic: Sum\n    threshold: 1\n");
        let result = validate(&yaml).unwrap();
        assert!(result.is_valid());
    }

    #[test]
    fn test_dangling_alarm_reference() {
        let yaml = format!(
            "{BASE}alarms:
  - name: a
    comparison_operator: GreaterThanThreshold
    metric_name: HealthNotifications
    namespace: AWS/StorageGateway
    statistic: Sum
    threshold: 1
    alarm_actions: [nonexistent]
"
        );
        let err = validate(&yaml).unwrap_err();
        assert!(matches!(
            err,
            SgwError::Config(ConfigError::DanglingReference { ref topic, .. }) if topic == "nonexistent"
        ));
    }

    #[test]
    fn test_dangling_policy_target() {
        let yaml = r"
project:
  name: sgw-alerts
policies:
  - name: p
    topic: nowhere
    statements:
      - principal:
          service: [cloudwatch.amazonaws.com]
";
        assert!(matches!(
            validate(yaml),
            Err(SgwError::Config(ConfigError::DanglingReference { .. }))
        ));
    }

    #[test]
    fn test_duplicate_topic_name() {
        let yaml = r"
project:
  name: sgw-alerts
topics:
  - name: alerts
  - name: alerts
";
        assert!(matches!(
            validate(yaml),
            Err(SgwError::Config(ConfigError::DuplicateName { .. }))
        ));
    }

    #[test]
    fn test_two_policies_on_one_topic() {
        let yaml = r"
project:
  name: sgw-alerts
topics:
  - name: alerts
policies:
  - name: cw
    topic: alerts
    statements:
      - principal:
          service: [cloudwatch.amazonaws.com]
  - name: events
    topic: alerts
    statements:
      - principal:
          service: [events.amazonaws.com]
";
        let err = validate(yaml).unwrap_err();
        assert!(matches!(
            err,
            SgwError::Config(ConfigError::SharedPolicyTarget { ref topic, ref first, ref second })
                if topic == "alerts" && first == "cw" && second == "events"
        ));
    }

    #[test]
    fn test_policies_on_separate_topics() {
        let yaml = r"
project:
  name: sgw-alerts
topics:
  - name: alerts
  - name: audit
policies:
  - name: cw
    topic: alerts
    statements:
      - principal:
          service: [cloudwatch.amazonaws.com]
  - name: events
    topic: audit
    statements:
      - principal:
          service: [events.amazonaws.com]
";
        assert!(validate(yaml).unwrap().is_valid());
    }

    #[test]
    fn test_all_errors_are_collected() {
        let yaml = with_alarm(
            "    statistic: SampleCount\n    threshold: -1\n    evaluation_periods: 0\n    period_secs: 45\n",
        );
        let result = validate(&yaml).unwrap();
        assert!(!result.is_valid());
        assert_eq!(result.error_count(), 3);
        let fields: Vec<&str> = result.errors.iter().map(|e| e.field.as_str()).collect();
        assert!(fields.contains(&"alarm.storage-gateway-health.threshold"));
    }

    #[test]
    fn test_invalid_topic_name() {
        let yaml = "project:\n  name: x\ntopics:\n  - name: 'bad name'\n";
        assert_eq!(field_error(validate(yaml)).as_deref(), Some("topic.bad name"));
    }

    #[test]
    fn test_zero_evaluation_periods_rejected() {
        let yaml = with_alarm("    statistic: Sum\n    threshold: 1\n    evaluation_periods: 0\n");
        assert_eq!(
            field_error(validate(&yaml)).as_deref(),
            Some("alarm.storage-gateway-health.evaluation_periods")
        );
    }

    #[test]
    fn test_period_rules() {
        assert!(is_valid_period(10));
        assert!(is_valid_period(30));
        assert!(is_valid_period(60));
        assert!(is_valid_period(300));
        assert!(!is_valid_period(0));
        assert!(!is_valid_period(45));
        assert!(!is_valid_period(90));

        let zero = with_alarm("    statistic: Sum\n    threshold: 1\n    period_secs: 0\n");
        assert_eq!(
            field_error(validate(&zero)).as_deref(),
            Some("alarm.storage-gateway-health.period_secs")
        );

        let odd = with_alarm("    statistic: Sum\n    threshold: 1\n    period_secs: 45\n");
        assert!(!validate(&odd).unwrap().is_valid());
    }

    #[test]
    fn test_negative_threshold_with_sample_count() {
        let yaml = with_alarm("    statistic: SampleCount\n    threshold: -1\n");
        assert_eq!(
            field_error(validate(&yaml)).as_deref(),
            Some("alarm.storage-gateway-health.threshold")
        );

        let average = with_alarm("    statistic: Average\n    threshold: -1\n");
        assert!(validate(&average).unwrap().is_valid());
    }

    #[test]
    fn test_datapoints_exceed_periods() {
        let yaml = with_alarm("    statistic: Sum\n    threshold: 1\n    datapoints_to_alarm: 3\n");
        assert_eq!(
            field_error(validate(&yaml)).as_deref(),
            Some("alarm.storage-gateway-health.datapoints_to_alarm")
        );
    }

    #[test]
    fn test_evaluation_window_limit() {
        let yaml = with_alarm(
            "    statistic: Sum\n    threshold: 1\n    period_secs: 86400\n    evaluation_periods: 8\n",
        );
        assert!(!validate(&yaml).unwrap().is_valid());
    }

    #[test]
    fn test_literal_resource_warns() {
        let yaml = r"
project:
  name: sgw-alerts
topics:
  - name: alerts
policies:
  - name: p
    topic: alerts
    statements:
      - principal:
          service: [cloudwatch.amazonaws.com]
        resource: arn:aws:sns:us-east-1:123456789012:alerts
";
        let result = validate(yaml).unwrap();
        assert_eq!(result.warning_count(), 1);
    }

    #[test]
    fn test_s3_backend_requires_bucket() {
        let yaml = "project:\n  name: x\nstate:\n  backend: s3\ntopics:\n  - name: t\n";
        assert_eq!(field_error(validate(yaml)).as_deref(), Some("state.bucket"));
    }

    #[test]
    fn test_for_each_requires_gateway_name() {
        let yaml = r"
project:
  name: sgw-alerts
gateways:
  - key: east
    gateway_id: sgw-1
    gateway_name: east
topics:
  - name: alerts
alarms:
  - name: same-for-all
    for_each: gateways
    comparison_operator: GreaterThanOrEqualToThreshold
    metric_name: HealthNotifications
    namespace: AWS/StorageGateway
    statistic: Sum
    threshold: 1
    alarm_actions: [alerts]
";
        assert_eq!(field_error(validate(yaml)).as_deref(), Some("alarms[0].name"));
    }
}
