//! Observation of applied resources through the control plane.
//!
//! The observer reads back every resource recorded in state and renders
//! what it finds in the same form the executor sends, so the two can be
//! compared by hash.

use std::collections::BTreeMap;
use tracing::{debug, info};

use crate::config::ConfigHasher;
use crate::error::Result;
use crate::model::{AlarmState, RenderedResource, ResourceAddress, ResourceKind};
use crate::state::{ResourceState, StackState};

use super::control_plane::ControlPlane;

/// A recorded resource as currently seen by the control plane.
#[derive(Debug, Clone)]
pub struct ObservedResource {
    /// Resource address.
    pub address: ResourceAddress,
    /// Identity recorded in state.
    pub identity: String,
    /// Whether the resource still exists.
    pub exists: bool,
    /// What the control plane currently holds.
    pub rendered: Option<RenderedResource>,
    /// Hash of `rendered`, comparable with the recorded hash.
    pub rendered_hash: Option<String>,
    /// Alarm evaluation state, for alarms.
    pub alarm_state: Option<AlarmState>,
}

/// Observer for applied resources.
#[derive(Debug)]
pub struct StackObserver<'a, P: ControlPlane + ?Sized> {
    /// Control plane to query.
    provider: &'a P,
}

impl<'a, P: ControlPlane + ?Sized> StackObserver<'a, P> {
    /// Creates a new observer.
    #[must_use]
    pub const fn new(provider: &'a P) -> Self {
        Self { provider }
    }

    /// Observes every resource recorded in state.
    ///
    /// # Errors
    ///
    /// Returns an error if a control plane call fails.
    pub async fn observe_all(&self, state: &StackState) -> Result<BTreeMap<ResourceAddress, ObservedResource>> {
        info!(
            "Observing {} recorded resources via {}",
            state.resources.len(),
            self.provider.provider_name()
        );

        let mut observed = BTreeMap::new();
        for resource in state.resources.values() {
            let seen = self.observe(resource).await?;
            observed.insert(seen.address.clone(), seen);
        }

        let missing = observed.values().filter(|o| !o.exists).count();
        debug!("Observed {} resources, {missing} missing", observed.len());

        Ok(observed)
    }

    /// Observes one recorded resource.
    ///
    /// # Errors
    ///
    /// Returns an error if a control plane call fails.
    pub async fn observe(&self, resource: &ResourceState) -> Result<ObservedResource> {
        let address = resource.address.clone();
        let mut alarm_state = None;

        let rendered = match address.kind {
            ResourceKind::Topic => self
                .provider
                .get_topic(&resource.identity)
                .await?
                .map(|topic| RenderedResource::Topic(topic.attributes)),
            ResourceKind::Policy => self
                .provider
                .get_topic(&resource.identity)
                .await?
                .and_then(|topic| {
                    topic.policy.map(|document| RenderedResource::Policy {
                        topic_arn: topic.arn,
                        document,
                    })
                }),
            ResourceKind::Alarm => self
                .provider
                .get_metric_alarm(&address.name)
                .await?
                .map(|alarm| {
                    alarm_state = Some(alarm.state);
                    RenderedResource::Alarm(alarm.definition)
                }),
        };

        let rendered_hash = rendered.as_ref().map(ConfigHasher::hash_value);

        Ok(ObservedResource {
            identity: resource.identity.clone(),
            exists: rendered.is_some(),
            rendered,
            rendered_hash,
            alarm_state,
            address,
        })
    }
}

impl ObservedResource {
    /// Returns true if the observed attributes differ from what was applied.
    #[must_use]
    pub fn has_drifted(&self, recorded: &ResourceState) -> bool {
        match &self.rendered_hash {
            Some(hash) => !ConfigHasher::hashes_match(hash, &recorded.rendered_hash),
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TopicAttributes;
    use crate::provider::control_plane::{MockControlPlane, ObservedTopic};

    fn topic_state(rendered_hash: &str) -> ResourceState {
        ResourceState::new(
            ResourceAddress::topic("alerts"),
            "arn:aws:sns:us-east-1:123456789012:alerts",
            "c",
            rendered_hash,
            serde_json::Value::Null,
        )
    }

    fn attributes() -> TopicAttributes {
        TopicAttributes {
            name: String::from("alerts"),
            display_name: None,
            tags: BTreeMap::new(),
        }
    }

    #[tokio::test]
    async fn test_missing_topic_is_reported() {
        let mut mock = MockControlPlane::new();
        mock.expect_get_topic().returning(|_| Ok(None));

        let observer = StackObserver::new(&mock);
        let recorded = topic_state("r");
        let observed = observer.observe(&recorded).await.unwrap();

        assert!(!observed.exists);
        assert!(observed.has_drifted(&recorded));
    }

    #[tokio::test]
    async fn test_matching_topic_has_no_drift() {
        let rendered = RenderedResource::Topic(attributes());
        let recorded = topic_state(&ConfigHasher::hash_value(&rendered));

        let mut mock = MockControlPlane::new();
        mock.expect_get_topic().returning(|arn| {
            Ok(Some(ObservedTopic {
                arn: arn.to_string(),
                attributes: attributes(),
                policy: None,
            }))
        });

        let observer = StackObserver::new(&mock);
        let observed = observer.observe(&recorded).await.unwrap();

        assert!(observed.exists);
        assert!(!observed.has_drifted(&recorded));
    }

    #[tokio::test]
    async fn test_policy_missing_when_topic_has_none() {
        let mut mock = MockControlPlane::new();
        mock.expect_get_topic().returning(|arn| {
            Ok(Some(ObservedTopic {
                arn: arn.to_string(),
                attributes: attributes(),
                policy: None,
            }))
        });

        let mut recorded = topic_state("r");
        recorded.address = ResourceAddress::policy("publish");

        let observed = StackObserver::new(&mock).observe(&recorded).await.unwrap();
        assert!(!observed.exists);
    }
}
