//! Rendering resolved resources into control plane requests.
//!
//! Rendering replaces every topic reference with the identity recorded for
//! it. A reference without a known identity is a resolution failure; nothing
//! that depends on it is rendered.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::config::{ComparisonOperator, Statistic, TreatMissingData};
use crate::error::PlanError;

use super::policy::PolicyDocument;
use super::resource::{AlarmSpec, ResourceAddress, ResourceSpec, TopicSpec};

/// Looks up provider-assigned identities by address.
pub trait IdentityResolver {
    /// Returns the identity of the addressed resource, if known.
    fn identity(&self, address: &ResourceAddress) -> Option<String>;
}

impl IdentityResolver for BTreeMap<ResourceAddress, String> {
    fn identity(&self, address: &ResourceAddress) -> Option<String> {
        self.get(address).cloned()
    }
}

/// Topic attributes sent to the control plane.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TopicAttributes {
    /// Topic name.
    pub name: String,
    /// Optional display name.
    pub display_name: Option<String>,
    /// Tags.
    pub tags: BTreeMap<String, String>,
}

/// A fully rendered alarm definition.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AlarmDefinition {
    /// Alarm name.
    pub name: String,
    /// Optional description.
    pub description: Option<String>,
    /// Comparison operator.
    pub comparison_operator: ComparisonOperator,
    /// Consecutive periods evaluated.
    pub evaluation_periods: u32,
    /// Breaching datapoints required to alarm.
    pub datapoints_to_alarm: Option<u32>,
    /// Metric name.
    pub metric_name: String,
    /// Metric namespace.
    pub namespace: String,
    /// Aggregation window in seconds.
    pub period_secs: u32,
    /// Aggregation statistic.
    pub statistic: Statistic,
    /// Threshold.
    pub threshold: f64,
    /// Metric dimensions.
    pub dimensions: BTreeMap<String, String>,
    /// Topic identities notified on entering ALARM.
    pub alarm_actions: Vec<String>,
    /// Topic identities notified on returning to OK.
    pub ok_actions: Vec<String>,
    /// Topic identities notified on entering `INSUFFICIENT_DATA`.
    pub insufficient_data_actions: Vec<String>,
    /// Missing data treatment.
    pub treat_missing_data: TreatMissingData,
    /// Whether actions are enabled.
    pub actions_enabled: bool,
}

/// Alarm evaluation state, as reported by the monitoring service.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlarmState {
    /// Not enough data to evaluate.
    #[default]
    InsufficientData,
    /// Within threshold.
    Ok,
    /// Threshold breached.
    Alarm,
}

/// A resource rendered with all references resolved.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum RenderedResource {
    /// Topic attributes.
    Topic(TopicAttributes),
    /// Policy document with the topic it attaches to.
    Policy {
        /// Identity of the target topic.
        topic_arn: String,
        /// Rendered document.
        document: PolicyDocument,
    },
    /// Alarm definition.
    Alarm(AlarmDefinition),
}

impl From<&TopicSpec> for TopicAttributes {
    fn from(spec: &TopicSpec) -> Self {
        Self {
            name: spec.name.clone(),
            display_name: spec.display_name.clone(),
            tags: spec.tags.clone(),
        }
    }
}

/// Renders a resource, resolving its references.
///
/// # Errors
///
/// Returns [`PlanError::UnresolvedReference`] if any referenced topic has no
/// known identity.
pub fn render(spec: &ResourceSpec, resolver: &dyn IdentityResolver) -> Result<RenderedResource, PlanError> {
    match spec {
        ResourceSpec::Topic(topic) => Ok(RenderedResource::Topic(TopicAttributes::from(topic))),
        ResourceSpec::Policy(policy) => {
            let topic_arn = resolve(&spec.address(), &policy.target, resolver)?;
            Ok(RenderedResource::Policy {
                document: policy.document.render(&topic_arn),
                topic_arn,
            })
        }
        ResourceSpec::Alarm(alarm) => render_alarm(alarm, resolver).map(RenderedResource::Alarm),
    }
}

/// Renders an alarm, preserving the order of every action list.
///
/// # Errors
///
/// Returns an error if an action topic has no known identity.
pub fn render_alarm(alarm: &AlarmSpec, resolver: &dyn IdentityResolver) -> Result<AlarmDefinition, PlanError> {
    let from = ResourceAddress::alarm(&alarm.name);
    let resolve_all = |targets: &[ResourceAddress]| -> Result<Vec<String>, PlanError> {
        targets.iter().map(|t| resolve(&from, t, resolver)).collect()
    };

    Ok(AlarmDefinition {
        name: alarm.name.clone(),
        description: alarm.description.clone(),
        comparison_operator: alarm.comparison_operator,
        evaluation_periods: alarm.evaluation_periods,
        datapoints_to_alarm: alarm.datapoints_to_alarm,
        metric_name: alarm.metric_name.clone(),
        namespace: alarm.namespace.clone(),
        period_secs: alarm.period_secs,
        statistic: alarm.statistic,
        threshold: alarm.threshold,
        dimensions: alarm.dimensions.clone(),
        alarm_actions: resolve_all(&alarm.alarm_actions)?,
        ok_actions: resolve_all(&alarm.ok_actions)?,
        insufficient_data_actions: resolve_all(&alarm.insufficient_data_actions)?,
        treat_missing_data: alarm.treat_missing_data,
        actions_enabled: alarm.actions_enabled,
    })
}

fn resolve(
    from: &ResourceAddress,
    target: &ResourceAddress,
    resolver: &dyn IdentityResolver,
) -> Result<String, PlanError> {
    resolver
        .identity(target)
        .ok_or_else(|| PlanError::UnresolvedReference {
            from: from.to_string(),
            reference: target.to_string(),
        })
}

impl RenderedResource {
    /// Returns the canonical JSON value stored in state and hashed for drift.
    #[must_use]
    pub fn to_value(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

impl std::fmt::Display for AlarmState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::InsufficientData => "INSUFFICIENT_DATA",
            Self::Ok => "OK",
            Self::Alarm => "ALARM",
        };
        write!(f, "{s}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alarm_with_actions(alarm_actions: Vec<ResourceAddress>) -> AlarmSpec {
        AlarmSpec {
            name: String::from("gateway-health"),
            description: None,
            comparison_operator: ComparisonOperator::GreaterThanOrEqualToThreshold,
            evaluation_periods: 1,
            datapoints_to_alarm: None,
            metric_name: String::from("HealthNotifications"),
            namespace: String::from("AWS/StorageGateway"),
            period_secs: 300,
            statistic: Statistic::Sum,
            threshold: 1.0,
            dimensions: BTreeMap::new(),
            alarm_actions,
            ok_actions: vec![],
            insufficient_data_actions: vec![],
            treat_missing_data: TreatMissingData::Missing,
            actions_enabled: true,
            gateway: None,
        }
    }

    fn identities() -> BTreeMap<ResourceAddress, String> {
        let mut ids = BTreeMap::new();
        ids.insert(ResourceAddress::topic("a"), String::from("arn:aws:sns:us-east-1:1:a"));
        ids.insert(ResourceAddress::topic("b"), String::from("arn:aws:sns:us-east-1:1:b"));
        ids
    }

    #[test]
    fn test_single_action_wiring() {
        let alarm = alarm_with_actions(vec![ResourceAddress::topic("a")]);
        let def = render_alarm(&alarm, &identities()).unwrap();
        assert_eq!(def.alarm_actions, vec![String::from("arn:aws:sns:us-east-1:1:a")]);
    }

    #[test]
    fn test_action_order_preserved() {
        let alarm = alarm_with_actions(vec![ResourceAddress::topic("b"), ResourceAddress::topic("a")]);
        let def = render_alarm(&alarm, &identities()).unwrap();
        assert_eq!(
            def.alarm_actions,
            vec![
                String::from("arn:aws:sns:us-east-1:1:b"),
                String::from("arn:aws:sns:us-east-1:1:a"),
            ]
        );
    }

    #[test]
    fn test_unresolved_action_fails() {
        let alarm = alarm_with_actions(vec![ResourceAddress::topic("missing")]);
        let err = render_alarm(&alarm, &identities()).unwrap_err();
        assert!(matches!(err, PlanError::UnresolvedReference { ref reference, .. } if reference == "topic.missing"));
    }
}
