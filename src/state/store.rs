//! State store trait definition.
//!
//! This module defines the common interface for state storage backends and
//! the decoding shared by all of them.

use async_trait::async_trait;
use std::path::Path;

use crate::config::{StateBackend, StateConfig};
use crate::error::{Result, SgwError, StateError};

use super::local::LocalStateStore;
use super::lock::LockInfo;
use super::s3::S3StateStore;
use super::types::{StackState, STATE_VERSION};

/// Trait for state storage backends.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Loads the stack state.
    ///
    /// Returns `None` if no state exists yet.
    async fn load(&self) -> Result<Option<StackState>>;

    /// Saves the stack state.
    async fn save(&self, state: &StackState) -> Result<()>;

    /// Deletes the stack state.
    async fn delete(&self) -> Result<()>;

    /// Checks if state exists.
    async fn exists(&self) -> Result<bool>;

    /// Acquires a lock on the state for an operation.
    ///
    /// Returns lock information if successful.
    async fn acquire_lock(&self, holder: &str, operation: &str) -> Result<LockInfo>;

    /// Releases a lock on the state.
    async fn release_lock(&self, lock_id: &str) -> Result<()>;

    /// Removes the lock regardless of who holds it.
    async fn force_unlock(&self) -> Result<Option<LockInfo>>;

    /// Gets current lock information if locked.
    async fn get_lock_info(&self) -> Result<Option<LockInfo>>;

    /// Checks if the state is locked.
    async fn is_locked(&self) -> Result<bool> {
        Ok(self.get_lock_info().await?.is_some_and(|lock| !lock.is_expired()))
    }

    /// Gets the backend type name.
    fn backend_type(&self) -> &'static str;
}

#[async_trait]
impl StateStore for Box<dyn StateStore> {
    async fn load(&self) -> Result<Option<StackState>> {
        (**self).load().await
    }

    async fn save(&self, state: &StackState) -> Result<()> {
        (**self).save(state).await
    }

    async fn delete(&self) -> Result<()> {
        (**self).delete().await
    }

    async fn exists(&self) -> Result<bool> {
        (**self).exists().await
    }

    async fn acquire_lock(&self, holder: &str, operation: &str) -> Result<LockInfo> {
        (**self).acquire_lock(holder, operation).await
    }

    async fn release_lock(&self, lock_id: &str) -> Result<()> {
        (**self).release_lock(lock_id).await
    }

    async fn force_unlock(&self) -> Result<Option<LockInfo>> {
        (**self).force_unlock().await
    }

    async fn get_lock_info(&self) -> Result<Option<LockInfo>> {
        (**self).get_lock_info().await
    }

    async fn is_locked(&self) -> Result<bool> {
        (**self).is_locked().await
    }

    fn backend_type(&self) -> &'static str {
        (**self).backend_type()
    }
}

/// Opens the backend selected by the configuration.
///
/// Relative local paths are resolved against `base_dir`.
///
/// # Errors
///
/// Returns an error if the S3 backend has no bucket.
pub async fn open_store(config: &StateConfig, base_dir: &Path) -> Result<Box<dyn StateStore>> {
    match config.backend {
        StateBackend::Local => {
            let store = config.path.as_deref().map_or_else(
                || LocalStateStore::with_base_dir(base_dir.join(super::local::STATE_DIR)),
                |path| LocalStateStore::with_base_dir(base_dir.join(path)),
            );
            Ok(Box::new(store))
        }
        StateBackend::S3 => {
            let bucket = config
                .bucket
                .as_deref()
                .ok_or_else(|| StateError::s3("S3 bucket name is required when using S3 backend"))?;
            let store = S3StateStore::new(bucket, config.prefix.as_deref(), config.region.as_deref()).await?;
            Ok(Box::new(store))
        }
    }
}

/// Decodes a state document and checks its format version.
pub(super) fn decode_state(content: &str) -> Result<StackState> {
    let state: StackState = serde_json::from_str(content).map_err(|e| {
        SgwError::State(StateError::Corrupted {
            message: format!("Failed to parse state: {e}"),
        })
    })?;

    if state.version != STATE_VERSION {
        return Err(SgwError::State(StateError::VersionMismatch {
            expected: STATE_VERSION.to_string(),
            found: state.version,
        }));
    }

    Ok(state)
}

/// Decodes a lock document.
pub(super) fn decode_lock(content: &str) -> Result<LockInfo> {
    serde_json::from_str(content).map_err(|e| {
        SgwError::State(StateError::Corrupted {
            message: format!("Failed to parse lock: {e}"),
        })
    })
}

/// Fails if an unexpired lock is held by another holder.
pub(super) fn ensure_unlocked(existing: Option<&LockInfo>, holder: &str) -> Result<()> {
    match existing {
        Some(lock) if lock.blocks(holder) => Err(SgwError::State(StateError::LockedByOther {
            holder: lock.holder.clone(),
            operation: lock.operation.clone(),
            since: lock.acquired_at.to_rfc3339(),
            remaining_secs: lock.remaining_secs(),
        })),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_rejects_other_versions() {
        let mut state = StackState::new("sgw-alerts", "dev");
        state.version = String::from("0.9");
        let json = serde_json::to_string(&state).unwrap();

        let err = decode_state(&json).unwrap_err();
        assert!(matches!(err, SgwError::State(StateError::VersionMismatch { .. })));
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(matches!(
            decode_state("not json"),
            Err(SgwError::State(StateError::Corrupted { .. }))
        ));
    }

    #[tokio::test]
    async fn test_open_local_store() {
        let temp = tempfile::TempDir::new().unwrap();
        let store = open_store(&StateConfig::default(), temp.path()).await.unwrap();
        assert_eq!(store.backend_type(), "local");
        assert!(!store.exists().await.unwrap());
    }
}
