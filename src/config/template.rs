//! Template expansion for stack declarations.
//!
//! Declarations may use `${input.<name>}` for named inputs and, inside
//! `for_each: gateways` alarms, `${gateway.key}`, `${gateway.gateway_id}`,
//! and `${gateway.gateway_name}`. Expansion turns a [`StackConfig`] into a
//! [`Stack`] of concrete resources, one alarm instance per gateway.

use std::collections::BTreeMap;
use tracing::debug;

use crate::error::{ConfigError, Result};
use crate::model::{
    AlarmSpec, PolicySpec, PolicyTemplate, ResourceAddress, ResourceSpec, Stack,
    StatementTemplate, TopicSpec, TOPIC_PLACEHOLDER,
};

use super::spec::{AlarmConfig, ForEach, GatewayInput, PolicyConfig, StackConfig, TopicConfig};

/// Values visible to placeholders.
#[derive(Debug, Clone, Copy)]
pub struct TemplateScope<'a> {
    inputs: &'a BTreeMap<String, String>,
    gateway: Option<&'a GatewayInput>,
    keep_topic: bool,
}

impl<'a> TemplateScope<'a> {
    /// Creates a scope over named inputs.
    #[must_use]
    pub const fn new(inputs: &'a BTreeMap<String, String>) -> Self {
        Self {
            inputs,
            gateway: None,
            keep_topic: false,
        }
    }

    /// Adds a gateway to the scope.
    #[must_use]
    pub const fn with_gateway(mut self, gateway: &'a GatewayInput) -> Self {
        self.gateway = Some(gateway);
        self
    }

    /// Leaves `${topic}` in place for policy resources.
    #[must_use]
    const fn keeping_topic(mut self) -> Self {
        self.keep_topic = true;
        self
    }

    fn lookup(&self, placeholder: &str, field: &str) -> std::result::Result<String, ConfigError> {
        let fail = |reason: &str| ConfigError::TemplateError {
            placeholder: placeholder.to_string(),
            field: field.to_string(),
            reason: reason.to_string(),
        };

        if let Some(name) = placeholder.strip_prefix("input.") {
            return self
                .inputs
                .get(name)
                .cloned()
                .ok_or_else(|| fail("no such input"));
        }

        if let Some(attr) = placeholder.strip_prefix("gateway.") {
            let Some(gateway) = self.gateway else {
                return Err(fail("gateway values are only available in for_each alarms"));
            };
            return match attr {
                "key" => Ok(gateway.key.clone()),
                "gateway_id" => Ok(gateway.gateway_id.clone()),
                "gateway_name" => Ok(gateway.gateway_name.clone()),
                _ => Err(fail("unknown gateway attribute")),
            };
        }

        Err(fail("unknown placeholder"))
    }
}

/// Expands every placeholder in `text`.
///
/// # Errors
///
/// Returns a [`ConfigError::TemplateError`] for unknown or unterminated
/// placeholders.
pub fn interpolate(text: &str, field: &str, scope: &TemplateScope<'_>) -> Result<String> {
    let mut output = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(start) = rest.find("${") {
        output.push_str(&rest[..start]);
        let after = &rest[start + 2..];

        let Some(end) = after.find('}') else {
            return Err(ConfigError::TemplateError {
                placeholder: after.to_string(),
                field: field.to_string(),
                reason: String::from("unterminated placeholder"),
            }
            .into());
        };

        let placeholder = after[..end].trim();
        if scope.keep_topic && placeholder == "topic" {
            output.push_str(TOPIC_PLACEHOLDER);
        } else {
            output.push_str(&scope.lookup(placeholder, field)?);
        }

        rest = &after[end + 1..];
    }

    output.push_str(rest);
    Ok(output)
}

/// Expands a configuration into a resolved stack.
///
/// # Errors
///
/// Returns an error if any placeholder cannot be expanded.
pub fn expand_stack(config: &StackConfig) -> Result<Stack> {
    let scope = TemplateScope::new(&config.inputs);
    let mut resources = Vec::new();

    for (i, topic) in config.topics.iter().enumerate() {
        let spec = expand_topic(topic, &format!("topics[{i}]"), &scope)?;
        resources.push(ResourceSpec::Topic(spec));
    }

    for (i, policy) in config.policies.iter().enumerate() {
        let spec = expand_policy(policy, &format!("policies[{i}]"), &scope)?;
        resources.push(ResourceSpec::Policy(spec));
    }

    for (i, alarm) in config.alarms.iter().enumerate() {
        let prefix = format!("alarms[{i}]");
        match alarm.for_each {
            Some(ForEach::Gateways) => {
                for gateway in &config.gateways {
                    let gateway_scope = scope.with_gateway(gateway);
                    let spec = expand_alarm(alarm, &prefix, &gateway_scope)?;
                    debug!("Expanded {prefix} for gateway {} as {}", gateway.key, spec.name);
                    resources.push(ResourceSpec::Alarm(spec));
                }
            }
            None => {
                resources.push(ResourceSpec::Alarm(expand_alarm(alarm, &prefix, &scope)?));
            }
        }
    }

    debug!("Expanded stack into {} resources", resources.len());

    Ok(Stack {
        project: config.project.clone(),
        resources,
    })
}

fn expand_topic(topic: &TopicConfig, prefix: &str, scope: &TemplateScope<'_>) -> Result<TopicSpec> {
    let display_name = topic
        .display_name
        .as_deref()
        .map(|d| interpolate(d, &format!("{prefix}.display_name"), scope))
        .transpose()?;

    let mut tags = BTreeMap::new();
    for (key, value) in &topic.tags {
        tags.insert(key.clone(), interpolate(value, &format!("{prefix}.tags.{key}"), scope)?);
    }

    Ok(TopicSpec {
        name: interpolate(&topic.name, &format!("{prefix}.name"), scope)?,
        display_name,
        tags,
    })
}

fn expand_policy(policy: &PolicyConfig, prefix: &str, scope: &TemplateScope<'_>) -> Result<PolicySpec> {
    let resource_scope = scope.keeping_topic();
    let mut statements = Vec::with_capacity(policy.statements.len());

    for (i, statement) in policy.statements.iter().enumerate() {
        let resource = statement
            .resource
            .as_deref()
            .map(|r| interpolate(r, &format!("{prefix}.statements[{i}].resource"), &resource_scope))
            .transpose()?;

        statements.push(StatementTemplate {
            sid: statement
                .sid
                .clone()
                .unwrap_or_else(|| format!("Stmt{}", i + 1)),
            effect: statement.effect,
            principal: statement.principal.clone(),
            action: statement.action.clone(),
            resource,
        });
    }

    Ok(PolicySpec {
        name: interpolate(&policy.name, &format!("{prefix}.name"), scope)?,
        target: ResourceAddress::topic(interpolate(&policy.topic, &format!("{prefix}.topic"), scope)?),
        document: PolicyTemplate {
            version: policy.version.clone(),
            statements,
        },
    })
}

fn expand_alarm(alarm: &AlarmConfig, prefix: &str, scope: &TemplateScope<'_>) -> Result<AlarmSpec> {
    let topics = |refs: &[String], list: &str| -> Result<Vec<ResourceAddress>> {
        refs.iter()
            .enumerate()
            .map(|(i, r)| {
                interpolate(r, &format!("{prefix}.{list}[{i}]"), scope).map(ResourceAddress::topic)
            })
            .collect()
    };

    let mut dimensions = BTreeMap::new();
    for (key, value) in &alarm.dimensions {
        dimensions.insert(
            key.clone(),
            interpolate(value, &format!("{prefix}.dimensions.{key}"), scope)?,
        );
    }

    let description = alarm
        .description
        .as_deref()
        .map(|d| interpolate(d, &format!("{prefix}.description"), scope))
        .transpose()?;

    Ok(AlarmSpec {
        name: interpolate(&alarm.name, &format!("{prefix}.name"), scope)?,
        description,
        comparison_operator: alarm.comparison_operator,
        evaluation_periods: alarm.evaluation_periods,
        datapoints_to_alarm: alarm.datapoints_to_alarm,
        metric_name: alarm.metric_name.clone(),
        namespace: alarm.namespace.clone(),
        period_secs: alarm.period_secs,
        statistic: alarm.statistic,
        threshold: alarm.threshold,
        dimensions,
        alarm_actions: topics(&alarm.alarm_actions, "alarm_actions")?,
        ok_actions: topics(&alarm.ok_actions, "ok_actions")?,
        insufficient_data_actions: topics(&alarm.insufficient_data_actions, "insufficient_data_actions")?,
        treat_missing_data: alarm.treat_missing_data,
        actions_enabled: alarm.actions_enabled,
        gateway: scope.gateway.map(|g| g.key.clone()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigParser;
    use crate::error::SgwError;

    fn inputs() -> BTreeMap<String, String> {
        let mut inputs = BTreeMap::new();
        inputs.insert(String::from("team"), String::from("storage"));
        inputs
    }

    #[test]
    fn test_interpolate_inputs() {
        let inputs = inputs();
        let scope = TemplateScope::new(&inputs);
        let out = interpolate("alerts-${input.team}", "name", &scope).unwrap();
        assert_eq!(out, "alerts-storage");
    }

    #[test]
    fn test_interpolate_unknown_input() {
        let inputs = inputs();
        let scope = TemplateScope::new(&inputs);
        let err = interpolate("${input.missing}", "name", &scope).unwrap_err();
        assert!(matches!(err, SgwError::Config(ConfigError::TemplateError { .. })));
    }

    #[test]
    fn test_interpolate_unterminated() {
        let inputs = inputs();
        let scope = TemplateScope::new(&inputs);
        assert!(interpolate("alerts-${input.team", "name", &scope).is_err());
    }

    #[test]
    fn test_gateway_placeholder_outside_for_each() {
        let inputs = inputs();
        let scope = TemplateScope::new(&inputs);
        assert!(interpolate("${gateway.gateway_id}", "dimensions.GatewayId", &scope).is_err());
    }

    #[test]
    fn test_for_each_expands_per_gateway() {
        let yaml = r"
project:
  name: sgw-alerts
gateways:
  - key: east
    gateway_id: sgw-11111111
    gateway_name: east-gw
  - key: west
    gateway_id: sgw-22222222
    gateway_name: west-gw
topics:
  - name: alerts
alarms:
  - name: sgw-health-${gateway.key}
    for_each: gateways
    comparison_operator: GreaterThanOrEqualToThreshold
    metric_name: HealthNotifications
    namespace: AWS/StorageGateway
    statistic: Sum
    threshold: 1
    dimensions:
      GatewayId: ${gateway.gateway_id}
      GatewayName: ${gateway.gateway_name}
    alarm_actions: [alerts]
";
        let config = ConfigParser::new().parse_yaml(yaml, None).unwrap();
        let stack = expand_stack(&config).unwrap();
        let alarms: Vec<_> = stack.alarms().collect();

        assert_eq!(alarms.len(), 2);
        assert_eq!(alarms[0].name, "sgw-health-east");
        assert_eq!(alarms[0].dimensions["GatewayId"], "sgw-11111111");
        assert_eq!(alarms[1].name, "sgw-health-west");
        assert_eq!(alarms[1].dimensions["GatewayName"], "west-gw");
        assert_eq!(alarms[1].gateway.as_deref(), Some("west"));
    }

    #[test]
    fn test_policy_resource_keeps_topic_placeholder() {
        let yaml = r"
project:
  name: sgw-alerts
topics:
  - name: alerts
policies:
  - name: alerts-publish
    topic: alerts
    statements:
      - principal:
          service: [cloudwatch.amazonaws.com]
        resource: ${topic}
";
        let config = ConfigParser::new().parse_yaml(yaml, None).unwrap();
        let stack = expand_stack(&config).unwrap();
        let policy = stack.policies().next().unwrap();

        assert_eq!(policy.target, ResourceAddress::topic("alerts"));
        assert_eq!(policy.document.statements[0].sid, "Stmt1");
        assert_eq!(policy.document.statements[0].resource.as_deref(), Some("${topic}"));
    }
}
