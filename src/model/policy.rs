//! Publish policy documents.
//!
//! A [`PolicyTemplate`] is a declared document whose `Resource` fields still
//! refer to the target topic symbolically. Rendering substitutes the topic
//! identity and yields the JSON [`PolicyDocument`] sent to the control plane.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::config::{Effect, Principal};

/// Placeholder that expands to the target topic identity.
pub const TOPIC_PLACEHOLDER: &str = "${topic}";

/// A declared policy document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PolicyTemplate {
    /// Policy language version.
    pub version: String,
    /// Statements in declaration order.
    pub statements: Vec<StatementTemplate>,
}

/// A declared statement.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StatementTemplate {
    /// Statement identifier.
    pub sid: String,
    /// Effect.
    pub effect: Effect,
    /// Principal.
    pub principal: Principal,
    /// Action name.
    pub action: String,
    /// Explicit resource, if declared.
    pub resource: Option<String>,
}

/// A rendered access policy document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PolicyDocument {
    /// Policy language version.
    #[serde(rename = "Version")]
    pub version: String,
    /// Statements.
    #[serde(rename = "Statement")]
    pub statements: Vec<Statement>,
}

/// A rendered statement.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Statement {
    /// Statement identifier.
    #[serde(rename = "Sid")]
    pub sid: String,
    /// Effect.
    #[serde(rename = "Effect")]
    pub effect: Effect,
    /// Principal block in wire form.
    #[serde(rename = "Principal")]
    pub principal: Value,
    /// Action name.
    #[serde(rename = "Action")]
    pub action: String,
    /// Resource identity.
    #[serde(rename = "Resource")]
    pub resource: String,
}

impl PolicyTemplate {
    /// Renders the document against the identity of its target topic.
    #[must_use]
    pub fn render(&self, topic_arn: &str) -> PolicyDocument {
        PolicyDocument {
            version: self.version.clone(),
            statements: self
                .statements
                .iter()
                .map(|s| Statement {
                    sid: s.sid.clone(),
                    effect: s.effect,
                    principal: principal_json(&s.principal),
                    action: s.action.clone(),
                    resource: s
                        .resource
                        .as_deref()
                        .map_or_else(|| topic_arn.to_string(), |r| r.replace(TOPIC_PLACEHOLDER, topic_arn)),
                })
                .collect(),
        }
    }

    /// Returns the service principals granted by `Allow` statements.
    #[must_use]
    pub fn allowed_services(&self) -> Vec<&str> {
        self.statements
            .iter()
            .filter(|s| s.effect == Effect::Allow)
            .filter_map(|s| match &s.principal {
                Principal::Service(services) => Some(services.iter().map(String::as_str)),
                _ => None,
            })
            .flatten()
            .collect()
    }
}

impl PolicyDocument {
    /// Returns the resources that do not match the given topic identity.
    #[must_use]
    pub fn mismatched_resources(&self, topic_arn: &str) -> Vec<&str> {
        self.statements
            .iter()
            .map(|s| s.resource.as_str())
            .filter(|r| *r != topic_arn)
            .collect()
    }

    /// Serializes the document to the JSON text sent on the wire.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Converts a principal into its wire form.
fn principal_json(principal: &Principal) -> Value {
    fn one_or_many(values: &[String]) -> Value {
        match values {
            [single] => Value::String(single.clone()),
            many => json!(many),
        }
    }

    match principal {
        Principal::Service(services) => json!({ "Service": one_or_many(services) }),
        Principal::Aws(arns) => json!({ "AWS": one_or_many(arns) }),
        Principal::Any => Value::String(String::from("*")),
    }
}
