//! Resolved resource declarations.
//!
//! A [`Stack`] is what remains after template expansion: concrete topics,
//! policies, and alarms whose cross-references are typed addresses.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::config::{
    ComparisonOperator, ProjectConfig, Statistic, TreatMissingData,
};

use super::policy::PolicyTemplate;

/// Kind of a declared resource.
///
/// Variant order is the default creation order used to break ties.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    /// A notification topic.
    Topic,
    /// A publish policy attached to a topic.
    Policy,
    /// A metric alarm.
    Alarm,
}

/// Address of a resource within a stack, rendered as `<kind>.<name>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ResourceAddress {
    /// Resource kind.
    pub kind: ResourceKind,
    /// Resource name.
    pub name: String,
}

/// A resolved topic.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TopicSpec {
    /// Topic name.
    pub name: String,
    /// Optional display name.
    pub display_name: Option<String>,
    /// Tags.
    pub tags: BTreeMap<String, String>,
}

/// A resolved publish policy.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PolicySpec {
    /// Policy name.
    pub name: String,
    /// Topic the document is attached to.
    pub target: ResourceAddress,
    /// Document awaiting the target identity.
    pub document: PolicyTemplate,
}

/// A resolved metric alarm.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AlarmSpec {
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
    /// Topics notified on entering ALARM, in order.
    pub alarm_actions: Vec<ResourceAddress>,
    /// Topics notified on returning to OK, in order.
    pub ok_actions: Vec<ResourceAddress>,
    /// Topics notified on entering `INSUFFICIENT_DATA`, in order.
    pub insufficient_data_actions: Vec<ResourceAddress>,
    /// Missing data treatment.
    pub treat_missing_data: TreatMissingData,
    /// Whether actions are enabled.
    pub actions_enabled: bool,
    /// Gateway key this instance was expanded for.
    pub gateway: Option<String>,
}

/// Any resolved resource.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ResourceSpec {
    /// A topic.
    Topic(TopicSpec),
    /// A publish policy.
    Policy(PolicySpec),
    /// A metric alarm.
    Alarm(AlarmSpec),
}

/// The resolved stack.
#[derive(Debug, Clone)]
pub struct Stack {
    /// Project the stack belongs to.
    pub project: ProjectConfig,
    /// Resources in declaration order.
    pub resources: Vec<ResourceSpec>,
}

impl ResourceAddress {
    /// Creates a new address.
    #[must_use]
    pub fn new(kind: ResourceKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
        }
    }

    /// Address of a topic.
    #[must_use]
    pub fn topic(name: impl Into<String>) -> Self {
        Self::new(ResourceKind::Topic, name)
    }

    /// Address of a policy.
    #[must_use]
    pub fn policy(name: impl Into<String>) -> Self {
        Self::new(ResourceKind::Policy, name)
    }

    /// Address of an alarm.
    #[must_use]
    pub fn alarm(name: impl Into<String>) -> Self {
        Self::new(ResourceKind::Alarm, name)
    }

    /// Parses an address like `topic.alerts`.
    ///
    /// # Errors
    ///
    /// Returns an error if the kind is unknown or the name is empty.
    pub fn parse(s: &str) -> Result<Self, String> {
        let Some((kind, name)) = s.split_once('.') else {
            return Err(format!("Invalid address: {s}. Expected format: KIND.NAME"));
        };

        let kind = match kind {
            "topic" => ResourceKind::Topic,
            "policy" => ResourceKind::Policy,
            "alarm" => ResourceKind::Alarm,
            other => return Err(format!("Invalid resource kind: {other}. Expected: topic, policy, or alarm")),
        };

        if name.is_empty() {
            return Err(format!("Invalid address: {s}. Name cannot be empty"));
        }

        Ok(Self::new(kind, name))
    }
}

impl TryFrom<String> for ResourceAddress {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<ResourceAddress> for String {
    fn from(address: ResourceAddress) -> Self {
        address.to_string()
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Topic => "topic",
            Self::Policy => "policy",
            Self::Alarm => "alarm",
        };
        write!(f, "{s}")
    }
}

impl std::fmt::Display for ResourceAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.kind, self.name)
    }
}

impl ResourceSpec {
    /// Returns the address of this resource.
    #[must_use]
    pub fn address(&self) -> ResourceAddress {
        match self {
            Self::Topic(t) => ResourceAddress::topic(&t.name),
            Self::Policy(p) => ResourceAddress::policy(&p.name),
            Self::Alarm(a) => ResourceAddress::alarm(&a.name),
        }
    }

    /// Returns the kind of this resource.
    #[must_use]
    pub const fn kind(&self) -> ResourceKind {
        match self {
            Self::Topic(_) => ResourceKind::Topic,
            Self::Policy(_) => ResourceKind::Policy,
            Self::Alarm(_) => ResourceKind::Alarm,
        }
    }

    /// Returns the distinct addresses this resource refers to.
    #[must_use]
    pub fn references(&self) -> Vec<ResourceAddress> {
        let mut refs: Vec<ResourceAddress> = Vec::new();
        let mut push = |addr: &ResourceAddress| {
            if !refs.contains(addr) {
                refs.push(addr.clone());
            }
        };

        match self {
            Self::Topic(_) => {}
            Self::Policy(p) => push(&p.target),
            Self::Alarm(a) => {
                a.alarm_actions
                    .iter()
                    .chain(&a.ok_actions)
                    .chain(&a.insufficient_data_actions)
                    .for_each(&mut push);
            }
        }

        refs
    }
}

impl Stack {
    /// Looks up a resource by address.
    #[must_use]
    pub fn get(&self, address: &ResourceAddress) -> Option<&ResourceSpec> {
        self.resources.iter().find(|r| r.address() == *address)
    }

    /// Returns true if the stack declares the address.
    #[must_use]
    pub fn contains(&self, address: &ResourceAddress) -> bool {
        self.get(address).is_some()
    }

    /// Returns all addresses in declaration order.
    #[must_use]
    pub fn addresses(&self) -> Vec<ResourceAddress> {
        self.resources.iter().map(ResourceSpec::address).collect()
    }

    /// Returns the topics.
    pub fn topics(&self) -> impl Iterator<Item = &TopicSpec> {
        self.resources.iter().filter_map(|r| match r {
            ResourceSpec::Topic(t) => Some(t),
            _ => None,
        })
    }

    /// Returns the policies.
    pub fn policies(&self) -> impl Iterator<Item = &PolicySpec> {
        self.resources.iter().filter_map(|r| match r {
            ResourceSpec::Policy(p) => Some(p),
            _ => None,
        })
    }

    /// Returns the alarms.
    pub fn alarms(&self) -> impl Iterator<Item = &AlarmSpec> {
        self.resources.iter().filter_map(|r| match r {
            ResourceSpec::Alarm(a) => Some(a),
            _ => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_parse() {
        let addr = ResourceAddress::parse("topic.storage-gateway-health-alerts").unwrap();
        assert_eq!(addr.kind, ResourceKind::Topic);
        assert_eq!(addr.name, "storage-gateway-health-alerts");
        assert_eq!(addr.to_string(), "topic.storage-gateway-health-alerts");
    }

    #[test]
    fn test_address_parse_invalid() {
        assert!(ResourceAddress::parse("bucket.foo").is_err());
        assert!(ResourceAddress::parse("topic.").is_err());
        assert!(ResourceAddress::parse("topic").is_err());
    }

    #[test]
    fn test_address_ordering_follows_kind() {
        let mut addrs = vec![
            ResourceAddress::alarm("a"),
            ResourceAddress::policy("p"),
            ResourceAddress::topic("z"),
        ];
        addrs.sort();
        assert_eq!(addrs[0].kind, ResourceKind::Topic);
        assert_eq!(addrs[2].kind, ResourceKind::Alarm);
    }

    #[test]
    fn test_address_as_json_map_key() {
        let mut map = BTreeMap::new();
        map.insert(ResourceAddress::topic("alerts"), 1_u32);
        let json = serde_json::to_string(&map).unwrap();
        assert_eq!(json, r#"{"topic.alerts":1}"#);

        let back: BTreeMap<ResourceAddress, u32> = serde_json::from_str(&json).unwrap();
        assert_eq!(back.get(&ResourceAddress::topic("alerts")), Some(&1));
    }
}
