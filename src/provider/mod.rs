//! Control plane access.
//!
//! This module defines the [`ControlPlane`] interface the executor drives,
//! a file-backed local emulator of it, and the observer used for drift
//! detection.

mod control_plane;
mod local;
mod observer;

#[cfg(test)]
pub use control_plane::MockControlPlane;
pub use control_plane::{ControlPlane, ObservedAlarm, ObservedTopic};
pub use local::{topic_arn, LocalControlPlane, DEFAULT_ACCOUNT_ID, WORLD_FILE};
pub use observer::{ObservedResource, StackObserver};
