//! Error types for the alerting stack.
//!
//! This module provides the error hierarchy for every stage of the stack
//! lifecycle: configuration, state management, the control plane, planning,
//! and reconciliation.

use std::path::PathBuf;
use thiserror::Error;

/// The main error type for the alerting stack.
#[derive(Debug, Error)]
pub enum SgwError {
    /// Configuration-related errors.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// State management errors.
    #[error("State error: {0}")]
    State(#[from] StateError),

    /// Control plane errors.
    #[error("Control plane error: {0}")]
    Provider(#[from] ProviderError),

    /// Planning errors.
    #[error("Planning error: {0}")]
    Plan(#[from] PlanError),

    /// Reconciliation errors.
    #[error("Reconciliation error: {0}")]
    Reconcile(#[from] ReconcileError),

    /// Gateway inventory errors.
    #[error("Inventory error: {0}")]
    Inventory(#[from] InventoryError),

    /// IO errors.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Configuration-related errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file was not found.
    #[error("Configuration file not found: {path}")]
    FileNotFound {
        /// Path to the missing file.
        path: PathBuf,
    },

    /// The configuration file could not be parsed.
    #[error("Failed to parse configuration: {message}")]
    ParseError {
        /// Description of the parse error.
        message: String,
        /// Optional source location.
        location: Option<String>,
    },

    /// Validation failed.
    #[error("Configuration validation failed: {message}")]
    ValidationError {
        /// Description of the validation error.
        message: String,
        /// Field that failed validation.
        field: Option<String>,
    },

    /// Duplicate resource definition.
    #[error("Duplicate {resource_type} name: {name}")]
    DuplicateName {
        /// Type of resource (topic, policy, alarm).
        resource_type: String,
        /// The duplicated name.
        name: String,
    },

    /// Two policies target the same topic.
    #[error("Policies '{first}' and '{second}' both target topic '{topic}'")]
    SharedPolicyTarget {
        /// The topic both policies target.
        topic: String,
        /// The policy declared first.
        first: String,
        /// The policy declared second.
        second: String,
    },

    /// A declaration references a topic that is not declared.
    #[error("{from} references undeclared topic '{topic}'")]
    DanglingReference {
        /// Address of the referring declaration.
        from: String,
        /// The unresolved topic name.
        topic: String,
    },

    /// A template placeholder could not be expanded.
    #[error("Cannot expand '{placeholder}' in {field}: {reason}")]
    TemplateError {
        /// The placeholder text, without the `${}` wrapper.
        placeholder: String,
        /// Field containing the placeholder.
        field: String,
        /// Why the expansion failed.
        reason: String,
    },

    /// Circular dependency detected.
    #[error("Circular dependency detected: {cycle}")]
    CircularDependency {
        /// Description of the cycle.
        cycle: String,
    },
}

/// State management errors.
#[derive(Debug, Error)]
pub enum StateError {
    /// State is corrupted.
    #[error("State is corrupted: {message}")]
    Corrupted {
        /// Description of the corruption.
        message: String,
    },

    /// State lock acquisition failed.
    #[error("Failed to acquire state lock: {message}")]
    LockFailed {
        /// Description of the lock failure.
        message: String,
    },

    /// State lock is held by another process.
    #[error("State is locked by {holder} for {operation} since {since} (expires in {remaining_secs}s)")]
    LockedByOther {
        /// Identifier of the lock holder.
        holder: String,
        /// Operation the holder is running.
        operation: String,
        /// When the lock was acquired.
        since: String,
        /// Seconds until the lock expires.
        remaining_secs: i64,
    },

    /// Local filesystem backend error.
    #[error("Local state backend error: {message}")]
    Storage {
        /// Description of the filesystem error.
        message: String,
    },

    /// S3 backend error.
    #[error("S3 state backend error: {message}")]
    S3Error {
        /// Description of the S3 error.
        message: String,
    },

    /// Serialization error.
    #[error("State serialization error: {message}")]
    SerializationError {
        /// Description of the serialization error.
        message: String,
    },

    /// State version mismatch.
    #[error("State version mismatch: expected {expected}, found {found}")]
    VersionMismatch {
        /// Expected state version.
        expected: String,
        /// Found state version.
        found: String,
    },
}

/// Errors surfaced by the control plane while applying a change.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// A policy document does not name the topic it is attached to.
    #[error("Policy resource '{resource}' does not match topic '{topic_arn}'")]
    AuthorizationMismatch {
        /// ARN of the topic the policy was attached to.
        topic_arn: String,
        /// Resource named by the offending statement.
        resource: String,
    },

    /// The referenced entity does not exist.
    #[error("{kind} not found: {identity}")]
    NotFound {
        /// Kind of entity (topic, alarm).
        kind: String,
        /// ARN or name that was looked up.
        identity: String,
    },

    /// A parameter violates a provider-side constraint.
    #[error("Invalid parameter {field}: {message}")]
    InvalidParameter {
        /// Parameter name.
        field: String,
        /// Description of the constraint.
        message: String,
    },

    /// The entity cannot be changed because other entities depend on it.
    #[error("{identity} is still referenced by {referrers:?}")]
    InUse {
        /// ARN of the entity that was to be deleted.
        identity: String,
        /// Entities that still reference it.
        referrers: Vec<String>,
    },

    /// The local emulator snapshot could not be read or written.
    #[error("Control plane storage error: {message}")]
    Storage {
        /// Description of the failure.
        message: String,
    },
}

/// Planning errors.
#[derive(Debug, Error)]
pub enum PlanError {
    /// A reference could not be resolved to a known identity.
    #[error("Cannot resolve {reference} required by {from}")]
    UnresolvedReference {
        /// Address of the referring resource.
        from: String,
        /// Address of the reference target.
        reference: String,
    },

    /// A delete would orphan resources that still reference the target.
    #[error("Refusing to delete {target}: still referenced by {referrers:?}")]
    ReferencedDelete {
        /// Address of the resource to delete.
        target: String,
        /// Addresses of the surviving referrers.
        referrers: Vec<String>,
    },

    /// Dependency resolution failed.
    #[error("Failed to resolve dependencies: {message}")]
    DependencyResolutionFailed {
        /// Description of the dependency issue.
        message: String,
    },
}

/// Reconciliation errors.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// An action failed while applying the plan.
    #[error("Failed to apply {resource_type} '{name}': {reason}")]
    ResourceApplyFailed {
        /// Type of resource.
        resource_type: String,
        /// Name of the resource.
        name: String,
        /// Reason for failure.
        reason: String,
    },

    /// Drift detected but apply was not requested.
    #[error("Drift detected for {resource}: {drift_description}")]
    DriftDetected {
        /// Resource with drift.
        resource: String,
        /// Description of the drift.
        drift_description: String,
    },

    /// Reconciliation was aborted.
    #[error("Reconciliation aborted: {reason}")]
    Aborted {
        /// Reason for abort.
        reason: String,
    },
}

/// Gateway inventory errors.
#[derive(Debug, Error)]
pub enum InventoryError {
    /// The catalog snapshot could not be read or parsed.
    #[error("Failed to load snapshot {path}: {message}")]
    Snapshot {
        /// Snapshot path.
        path: PathBuf,
        /// Description of the failure.
        message: String,
    },

    /// A catalog request failed.
    #[error("{operation} failed: {message}")]
    Request {
        /// Operation name.
        operation: String,
        /// Description of the failure.
        message: String,
    },

    /// A describe call named more ARNs than one request allows.
    #[error("Cannot describe {size} file shares in one request (max {max})")]
    BatchTooLarge {
        /// Number of ARNs requested.
        size: usize,
        /// Maximum per request.
        max: usize,
    },
}

/// Result type alias for stack operations.
pub type Result<T> = std::result::Result<T, SgwError>;

impl SgwError {
    /// Creates a new internal error with the given message.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Returns true if this error was raised before any remote call.
    #[must_use]
    pub const fn is_local(&self) -> bool {
        matches!(self, Self::Config(_) | Self::Plan(_))
    }
}

impl InventoryError {
    /// Creates a request error.
    #[must_use]
    pub fn request(operation: &str, message: impl Into<String>) -> Self {
        Self::Request {
            operation: operation.to_string(),
            message: message.into(),
        }
    }
}

impl ConfigError {
    /// Creates a validation error for a specific field.
    #[must_use]
    pub fn validation(message: impl Into<String>, field: impl Into<String>) -> Self {
        Self::ValidationError {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// Creates a validation error without a specific field.
    #[must_use]
    pub fn validation_general(message: impl Into<String>) -> Self {
        Self::ValidationError {
            message: message.into(),
            field: None,
        }
    }
}

impl StateError {
    /// Creates an S3 error with the given message.
    #[must_use]
    pub fn s3(message: impl Into<String>) -> Self {
        Self::S3Error {
            message: message.into(),
        }
    }

    /// Creates a local storage error with the given message.
    #[must_use]
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    /// Creates a serialization error with the given message.
    #[must_use]
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::SerializationError {
            message: message.into(),
        }
    }
}

impl ProviderError {
    /// Creates a not-found error.
    #[must_use]
    pub fn not_found(kind: &str, identity: impl Into<String>) -> Self {
        Self::NotFound {
            kind: kind.to_string(),
            identity: identity.into(),
        }
    }

    /// Creates an invalid parameter error.
    #[must_use]
    pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidParameter {
            field: field.into(),
            message: message.into(),
        }
    }
}
