//! Resolved resource model.
//!
//! This module holds the typed resources produced from a configuration:
//! - Addresses and resolved specs for topics, policies, and alarms
//! - Publish policy templates and rendered documents
//! - Rendering with reference resolution

mod policy;
mod render;
mod resource;

pub use policy::{PolicyDocument, PolicyTemplate, Statement, StatementTemplate, TOPIC_PLACEHOLDER};
pub use render::{
    render, render_alarm, AlarmDefinition, AlarmState, IdentityResolver, RenderedResource,
    TopicAttributes,
};
pub use resource::{
    AlarmSpec, PolicySpec, ResourceAddress, ResourceKind, ResourceSpec, Stack, TopicSpec,
};
