//! Gateway catalog interface and the snapshot-backed implementation.
//!
//! Field names follow the Storage Gateway describe output so a snapshot can
//! be captured straight from the service.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

use crate::error::{InventoryError, Result};

/// Maximum number of file share ARNs per describe request.
pub const MAX_DESCRIBE_BATCH: usize = 10;

/// Gateway as returned by describe.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct GatewayInfo {
    /// Gateway ARN.
    #[serde(rename = "GatewayARN")]
    pub gateway_arn: String,
    /// Gateway identifier.
    #[serde(default)]
    pub gateway_id: Option<String>,
    /// Gateway name.
    #[serde(default)]
    pub gateway_name: Option<String>,
    /// Gateway state, such as `RUNNING`.
    #[serde(default)]
    pub gateway_state: Option<String>,
    /// Gateway type, such as `FILE_S3`.
    #[serde(default)]
    pub gateway_type: Option<String>,
}

/// File share protocol.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum FileShareType {
    /// NFS share.
    Nfs,
    /// SMB share.
    Smb,
}

/// File share as returned by list.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct FileShareSummary {
    /// Share ARN.
    #[serde(rename = "FileShareARN")]
    pub file_share_arn: String,
    /// Share protocol.
    pub file_share_type: FileShareType,
    /// Owning gateway ARN.
    #[serde(rename = "GatewayARN")]
    pub gateway_arn: String,
}

/// NFS share details.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct NfsFileShareInfo {
    /// Share ARN.
    #[serde(rename = "FileShareARN")]
    pub file_share_arn: String,
    /// Share identifier.
    #[serde(default)]
    pub file_share_id: Option<String>,
    /// Export path.
    #[serde(default)]
    pub path: Option<String>,
    /// Backing bucket or file system.
    #[serde(rename = "LocationARN", default)]
    pub location_arn: Option<String>,
    /// Allowed client CIDR blocks.
    #[serde(default)]
    pub client_list: Vec<String>,
    /// Share status.
    #[serde(default)]
    pub file_share_status: Option<String>,
}

/// SMB share details.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct SmbFileShareInfo {
    /// Share ARN.
    #[serde(rename = "FileShareARN")]
    pub file_share_arn: String,
    /// Share identifier.
    #[serde(default)]
    pub file_share_id: Option<String>,
    /// Share path.
    #[serde(default)]
    pub path: Option<String>,
    /// Backing bucket or file system.
    #[serde(rename = "LocationARN", default)]
    pub location_arn: Option<String>,
    /// Users and `@`-prefixed groups allowed to connect.
    #[serde(default)]
    pub valid_user_list: Vec<String>,
    /// Users with administrator rights.
    #[serde(default)]
    pub admin_user_list: Vec<String>,
    /// Share status.
    #[serde(default)]
    pub file_share_status: Option<String>,
    /// Whether SMB ACLs are enabled.
    #[serde(rename = "SMBACLEnabled", default)]
    pub smb_acl_enabled: bool,
}

/// Read access to Storage Gateway inventory.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait GatewayCatalog: Send + Sync {
    /// Lists the ARNs of every gateway in the account.
    async fn list_gateways(&self) -> Result<Vec<String>>;

    /// Describes one gateway.
    async fn describe_gateway(&self, gateway_arn: &str) -> Result<GatewayInfo>;

    /// Lists the file shares of one gateway.
    async fn list_file_shares(&self, gateway_arn: &str) -> Result<Vec<FileShareSummary>>;

    /// Describes up to [`MAX_DESCRIBE_BATCH`] NFS shares.
    async fn describe_nfs_file_shares(&self, arns: &[String]) -> Result<Vec<NfsFileShareInfo>>;

    /// Describes up to [`MAX_DESCRIBE_BATCH`] SMB shares.
    async fn describe_smb_file_shares(&self, arns: &[String]) -> Result<Vec<SmbFileShareInfo>>;
}

/// Captured catalog contents.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CatalogSnapshot {
    /// Described gateways.
    #[serde(default)]
    pub gateways: Vec<GatewayInfo>,
    /// File shares of every gateway.
    #[serde(default)]
    pub file_shares: Vec<FileShareSummary>,
    /// NFS share details.
    #[serde(rename = "NFSFileShares", default)]
    pub nfs_file_shares: Vec<NfsFileShareInfo>,
    /// SMB share details.
    #[serde(rename = "SMBFileShares", default)]
    pub smb_file_shares: Vec<SmbFileShareInfo>,
}

/// Catalog answering from a JSON snapshot.
#[derive(Debug, Clone)]
pub struct SnapshotCatalog {
    snapshot: CatalogSnapshot,
}

impl SnapshotCatalog {
    /// Creates a catalog from snapshot contents.
    #[must_use]
    pub const fn new(snapshot: CatalogSnapshot) -> Self {
        Self { snapshot }
    }

    /// Loads a snapshot file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let snapshot_error = |message: String| InventoryError::Snapshot {
            path: path.to_path_buf(),
            message,
        };

        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| snapshot_error(e.to_string()))?;
        let snapshot: CatalogSnapshot =
            serde_json::from_str(&content).map_err(|e| snapshot_error(e.to_string()))?;

        debug!(
            "Loaded snapshot with {} gateways and {} file shares",
            snapshot.gateways.len(),
            snapshot.file_shares.len()
        );

        Ok(Self::new(snapshot))
    }

    fn check_batch(arns: &[String]) -> Result<()> {
        if arns.len() > MAX_DESCRIBE_BATCH {
            return Err(InventoryError::BatchTooLarge {
                size: arns.len(),
                max: MAX_DESCRIBE_BATCH,
            }
            .into());
        }
        Ok(())
    }
}

#[async_trait]
impl GatewayCatalog for SnapshotCatalog {
    async fn list_gateways(&self) -> Result<Vec<String>> {
        Ok(self
            .snapshot
            .gateways
            .iter()
            .map(|g| g.gateway_arn.clone())
            .collect())
    }

    async fn describe_gateway(&self, gateway_arn: &str) -> Result<GatewayInfo> {
        self.snapshot
            .gateways
            .iter()
            .find(|g| g.gateway_arn == gateway_arn)
            .cloned()
            .ok_or_else(|| InventoryError::request("DescribeGatewayInformation", format!("unknown gateway {gateway_arn}")).into())
    }

    async fn list_file_shares(&self, gateway_arn: &str) -> Result<Vec<FileShareSummary>> {
        Ok(self
            .snapshot
            .file_shares
            .iter()
            .filter(|s| s.gateway_arn == gateway_arn)
            .cloned()
            .collect())
    }

    async fn describe_nfs_file_shares(&self, arns: &[String]) -> Result<Vec<NfsFileShareInfo>> {
        Self::check_batch(arns)?;
        Ok(self
            .snapshot
            .nfs_file_shares
            .iter()
            .filter(|s| arns.contains(&s.file_share_arn))
            .cloned()
            .collect())
    }

    async fn describe_smb_file_shares(&self, arns: &[String]) -> Result<Vec<SmbFileShareInfo>> {
        Self::check_batch(arns)?;
        Ok(self
            .snapshot
            .smb_file_shares
            .iter()
            .filter(|s| arns.contains(&s.file_share_arn))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const SNAPSHOT: &str = r#"{
        "Gateways": [
            {"GatewayARN": "arn:gw/sgw-1", "GatewayId": "sgw-1", "GatewayName": "files", "GatewayState": "RUNNING", "GatewayType": "FILE_S3"}
        ],
        "FileShares": [
            {"FileShareARN": "arn:share/1", "FileShareType": "NFS", "GatewayARN": "arn:gw/sgw-1"}
        ],
        "NFSFileShares": [
            {"FileShareARN": "arn:share/1", "FileShareId": "share-1", "Path": "/data", "ClientList": ["10.0.0.0/16"]}
        ]
    }"#;

    #[tokio::test]
    async fn test_load_snapshot() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(SNAPSHOT.as_bytes()).unwrap();

        let catalog = SnapshotCatalog::load(file.path()).await.unwrap();
        assert_eq!(catalog.list_gateways().await.unwrap(), vec![String::from("arn:gw/sgw-1")]);

        let info = catalog.describe_gateway("arn:gw/sgw-1").await.unwrap();
        assert_eq!(info.gateway_type.as_deref(), Some("FILE_S3"));

        let shares = catalog.list_file_shares("arn:gw/sgw-1").await.unwrap();
        assert_eq!(shares[0].file_share_type, FileShareType::Nfs);

        let nfs = catalog
            .describe_nfs_file_shares(&[String::from("arn:share/1")])
            .await
            .unwrap();
        assert_eq!(nfs[0].client_list, vec![String::from("10.0.0.0/16")]);
    }

    #[tokio::test]
    async fn test_describe_rejects_oversized_batch() {
        let catalog = SnapshotCatalog::new(CatalogSnapshot::default());
        let arns: Vec<String> = (0..=MAX_DESCRIBE_BATCH).map(|i| format!("arn:share/{i}")).collect();
        assert!(catalog.describe_smb_file_shares(&arns).await.is_err());
    }

    #[tokio::test]
    async fn test_missing_snapshot_fails() {
        assert!(SnapshotCatalog::load("/nonexistent/snapshot.json").await.is_err());
    }
}
