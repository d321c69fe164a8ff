//! File-backed emulator of the notification and monitoring services.
//!
//! The emulator enforces the constraints the real services enforce on this
//! stack: policy resources must name the topic they are attached to, alarm
//! periods must be supported, and a topic cannot be deleted while alarms
//! still notify it. When opened with a path, every mutation is persisted as
//! JSON so separate CLI runs see the same world.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::{ProviderError, Result};
use crate::model::{AlarmDefinition, AlarmState, PolicyDocument, TopicAttributes};

use super::control_plane::{ControlPlane, ObservedAlarm, ObservedTopic};

/// Account used when none is configured.
pub const DEFAULT_ACCOUNT_ID: &str = "000000000000";

/// Default emulator snapshot file name.
pub const WORLD_FILE: &str = "control-plane.json";

/// Maximum topic name length.
const MAX_TOPIC_NAME_LEN: usize = 256;

/// Policy versions the service understands.
const POLICY_VERSIONS: &[&str] = &["2012-10-17", "2008-10-17"];

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
struct World {
    /// Topics by identity.
    #[serde(default)]
    topics: BTreeMap<String, StoredTopic>,
    /// Alarms by name.
    #[serde(default)]
    alarms: BTreeMap<String, StoredAlarm>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredTopic {
    attributes: TopicAttributes,
    policy: Option<PolicyDocument>,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredAlarm {
    arn: String,
    definition: AlarmDefinition,
    state: AlarmState,
    updated_at: DateTime<Utc>,
}

/// Local control plane emulator.
#[derive(Debug)]
pub struct LocalControlPlane {
    /// Region used in identities.
    region: String,
    /// Account used in identities.
    account_id: String,
    /// Snapshot file, if persisted.
    path: Option<PathBuf>,
    /// Current world.
    world: Mutex<World>,
}

impl LocalControlPlane {
    /// Creates an emulator that keeps everything in memory.
    #[must_use]
    pub fn in_memory(region: &str, account_id: Option<&str>) -> Self {
        Self {
            region: region.to_string(),
            account_id: account_id.unwrap_or(DEFAULT_ACCOUNT_ID).to_string(),
            path: None,
            world: Mutex::new(World::default()),
        }
    }

    /// Opens an emulator persisted at `path`, loading any existing snapshot.
    ///
    /// # Errors
    ///
    /// Returns an error if an existing snapshot cannot be read or parsed.
    pub async fn open(path: impl AsRef<Path>, region: &str, account_id: Option<&str>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let world = if path.exists() {
            let content = fs::read_to_string(&path)
                .await
                .map_err(|e| storage_error(&format!("Failed to read {}: {e}", path.display())))?;
            serde_json::from_str(&content)
                .map_err(|e| storage_error(&format!("Failed to parse {}: {e}", path.display())))?
        } else {
            World::default()
        };

        info!("Opened local control plane at {}", path.display());

        Ok(Self {
            region: region.to_string(),
            account_id: account_id.unwrap_or(DEFAULT_ACCOUNT_ID).to_string(),
            path: Some(path),
            world: Mutex::new(world),
        })
    }

    /// Returns the identity a topic with this name receives.
    #[must_use]
    pub fn topic_arn(&self, name: &str) -> String {
        topic_arn(&self.region, &self.account_id, name)
    }

    /// Returns the identity an alarm with this name receives.
    #[must_use]
    pub fn alarm_arn(&self, name: &str) -> String {
        format!("arn:aws:cloudwatch:{}:{}:alarm:{name}", self.region, self.account_id)
    }

    /// Sets the evaluation state of an alarm, as the monitoring service would.
    #[cfg(test)]
    pub(crate) async fn set_alarm_state(&self, name: &str, state: AlarmState) -> Result<()> {
        let mut world = self.world.lock().await;
        let alarm = world
            .alarms
            .get_mut(name)
            .ok_or_else(|| ProviderError::not_found("alarm", name))?;
        alarm.state = state;
        alarm.updated_at = Utc::now();
        self.persist(&world).await
    }

    /// Returns the number of topics and alarms.
    pub async fn counts(&self) -> (usize, usize) {
        let world = self.world.lock().await;
        (world.topics.len(), world.alarms.len())
    }

    async fn persist(&self, world: &World) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| storage_error(&format!("Failed to create {}: {e}", parent.display())))?;
        }

        let content = serde_json::to_string_pretty(world)
            .map_err(|e| storage_error(&format!("Failed to serialize world: {e}")))?;
        fs::write(path, content)
            .await
            .map_err(|e| storage_error(&format!("Failed to write {}: {e}", path.display())))?;

        Ok(())
    }
}

/// Identity of a topic in a region and account.
#[must_use]
pub fn topic_arn(region: &str, account_id: &str, name: &str) -> String {
    format!("arn:aws:sns:{region}:{account_id}:{name}")
}

fn storage_error(message: &str) -> ProviderError {
    ProviderError::Storage {
        message: message.to_string(),
    }
}

fn check_topic_name(name: &str) -> std::result::Result<(), ProviderError> {
    let valid = !name.is_empty()
        && name.len() <= MAX_TOPIC_NAME_LEN
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(ProviderError::invalid("Name", format!("invalid topic name '{name}'")))
    }
}

fn check_alarm(alarm: &AlarmDefinition, world: &World) -> std::result::Result<(), ProviderError> {
    if alarm.evaluation_periods == 0 {
        return Err(ProviderError::invalid("EvaluationPeriods", "must be at least 1"));
    }

    let period = alarm.period_secs;
    if !(matches!(period, 10 | 30) || (period > 0 && period % 60 == 0)) {
        return Err(ProviderError::invalid(
            "Period",
            format!("{period} is not 10, 30, or a multiple of 60"),
        ));
    }

    for arn in alarm
        .alarm_actions
        .iter()
        .chain(&alarm.ok_actions)
        .chain(&alarm.insufficient_data_actions)
    {
        if !world.topics.contains_key(arn) {
            return Err(ProviderError::invalid("AlarmActions", format!("topic {arn} does not exist")));
        }
    }

    Ok(())
}

#[async_trait]
impl ControlPlane for LocalControlPlane {
    async fn create_topic(&self, attributes: &TopicAttributes) -> Result<String> {
        check_topic_name(&attributes.name)?;

        let arn = self.topic_arn(&attributes.name);
        let mut world = self.world.lock().await;

        match world.topics.get_mut(&arn) {
            Some(existing) => {
                if existing.attributes != *attributes {
                    debug!("Updating topic attributes: {arn}");
                    existing.attributes = attributes.clone();
                }
            }
            None => {
                debug!("Creating topic: {arn}");
                world.topics.insert(
                    arn.clone(),
                    StoredTopic {
                        attributes: attributes.clone(),
                        policy: None,
                        created_at: Utc::now(),
                    },
                );
            }
        }

        self.persist(&world).await?;
        Ok(arn)
    }

    async fn get_topic(&self, arn: &str) -> Result<Option<ObservedTopic>> {
        let world = self.world.lock().await;
        Ok(world.topics.get(arn).map(|t| ObservedTopic {
            arn: arn.to_string(),
            attributes: t.attributes.clone(),
            policy: t.policy.clone(),
        }))
    }

    async fn delete_topic(&self, arn: &str) -> Result<()> {
        let mut world = self.world.lock().await;

        if !world.topics.contains_key(arn) {
            return Err(ProviderError::not_found("topic", arn).into());
        }

        let referrers: Vec<String> = world
            .alarms
            .values()
            .filter(|a| {
                a.definition
                    .alarm_actions
                    .iter()
                    .chain(&a.definition.ok_actions)
                    .chain(&a.definition.insufficient_data_actions)
                    .any(|action| action == arn)
            })
            .map(|a| a.arn.clone())
            .collect();

        if !referrers.is_empty() {
            return Err(ProviderError::InUse {
                identity: arn.to_string(),
                referrers,
            }
            .into());
        }

        debug!("Deleting topic: {arn}");
        world.topics.remove(arn);
        self.persist(&world).await
    }

    async fn set_topic_policy(&self, arn: &str, policy: &PolicyDocument) -> Result<()> {
        if !POLICY_VERSIONS.contains(&policy.version.as_str()) {
            return Err(ProviderError::invalid("Policy", format!("unsupported version {}", policy.version)).into());
        }

        if let Some(resource) = policy.mismatched_resources(arn).first() {
            return Err(ProviderError::AuthorizationMismatch {
                topic_arn: arn.to_string(),
                resource: (*resource).to_string(),
            }
            .into());
        }

        let mut world = self.world.lock().await;
        let topic = world
            .topics
            .get_mut(arn)
            .ok_or_else(|| ProviderError::not_found("topic", arn))?;

        debug!("Setting policy on topic: {arn}");
        topic.policy = Some(policy.clone());
        self.persist(&world).await
    }

    async fn remove_topic_policy(&self, arn: &str) -> Result<()> {
        let mut world = self.world.lock().await;
        let topic = world
            .topics
            .get_mut(arn)
            .ok_or_else(|| ProviderError::not_found("topic", arn))?;

        debug!("Removing policy from topic: {arn}");
        topic.policy = None;
        self.persist(&world).await
    }

    async fn put_metric_alarm(&self, alarm: &AlarmDefinition) -> Result<String> {
        let mut world = self.world.lock().await;
        check_alarm(alarm, &world)?;

        let arn = self.alarm_arn(&alarm.name);
        let state = world
            .alarms
            .get(&alarm.name)
            .map_or(AlarmState::InsufficientData, |existing| existing.state);

        debug!("Putting alarm: {arn}");
        world.alarms.insert(
            alarm.name.clone(),
            StoredAlarm {
                arn: arn.clone(),
                definition: alarm.clone(),
                state,
                updated_at: Utc::now(),
            },
        );

        self.persist(&world).await?;
        Ok(arn)
    }

    async fn get_metric_alarm(&self, name: &str) -> Result<Option<ObservedAlarm>> {
        let world = self.world.lock().await;
        Ok(world.alarms.get(name).map(|a| ObservedAlarm {
            arn: a.arn.clone(),
            definition: a.definition.clone(),
            state: a.state,
        }))
    }

    async fn delete_metric_alarm(&self, name: &str) -> Result<()> {
        let mut world = self.world.lock().await;
        if world.alarms.remove(name).is_none() {
            return Err(ProviderError::not_found("alarm", name).into());
        }

        debug!("Deleted alarm: {name}");
        self.persist(&world).await
    }

    fn provider_name(&self) -> &'static str {
        "local"
    }
}
