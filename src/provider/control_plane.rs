//! The control plane interface consumed by the executor.
//!
//! Implementations talk to the notification and monitoring services. Every
//! call either succeeds or leaves the entity unchanged; no call is retried
//! by the caller.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::model::{AlarmDefinition, AlarmState, PolicyDocument, TopicAttributes};

/// A topic as reported by the control plane.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ObservedTopic {
    /// Topic identity.
    pub arn: String,
    /// Current attributes.
    pub attributes: TopicAttributes,
    /// Current access policy, if one is set.
    pub policy: Option<PolicyDocument>,
}

/// An alarm as reported by the control plane.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ObservedAlarm {
    /// Alarm identity.
    pub arn: String,
    /// Current definition.
    pub definition: AlarmDefinition,
    /// Current evaluation state.
    pub state: AlarmState,
}

/// Operations on topics, topic policies, and metric alarms.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ControlPlane: Send + Sync {
    /// Creates a topic, or updates the attributes of an existing topic with
    /// the same name. Returns the topic identity.
    async fn create_topic(&self, attributes: &TopicAttributes) -> Result<String>;

    /// Describes a topic by identity.
    async fn get_topic(&self, arn: &str) -> Result<Option<ObservedTopic>>;

    /// Deletes a topic and its policy.
    async fn delete_topic(&self, arn: &str) -> Result<()>;

    /// Replaces the access policy of a topic.
    async fn set_topic_policy(&self, arn: &str, policy: &PolicyDocument) -> Result<()>;

    /// Removes the access policy of a topic.
    async fn remove_topic_policy(&self, arn: &str) -> Result<()>;

    /// Creates or replaces a metric alarm. Returns the alarm identity.
    async fn put_metric_alarm(&self, alarm: &AlarmDefinition) -> Result<String>;

    /// Describes a metric alarm by name.
    async fn get_metric_alarm(&self, name: &str) -> Result<Option<ObservedAlarm>>;

    /// Deletes a metric alarm by name.
    async fn delete_metric_alarm(&self, name: &str) -> Result<()>;

    /// Returns a short name for logs and output.
    fn provider_name(&self) -> &'static str;
}
