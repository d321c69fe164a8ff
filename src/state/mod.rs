//! State management module for the alerting stack.
//!
//! This module provides persistent state storage for tracking applied
//! resources, their control plane identities, and apply history.

mod local;
mod lock;
mod s3;
mod store;
mod types;

pub use local::{LocalStateStore, STATE_DIR};
pub use lock::{generate_holder_id, LockInfo, LOCK_EXPIRY_SECS};
pub use s3::S3StateStore;
pub use store::{open_store, StateStore};
pub use types::{HistoryEntry, ResourceState, StackOperation, StackState, STATE_VERSION};
