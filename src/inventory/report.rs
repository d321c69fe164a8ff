//! Gateway status and file share reports.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use tracing::{error, info, warn};

use crate::config::GatewayInput;
use crate::error::{Result, SgwError};

use super::catalog::{FileShareType, GatewayCatalog, MAX_DESCRIBE_BATCH};

/// Gateway types that serve file shares.
pub const FILE_GATEWAY_TYPES: &[&str] = &["FILE_S3", "FILE_FSX_SMB"];

const NOT_AVAILABLE: &str = "N/A";

/// High-level status of one gateway.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GatewayStatus {
    /// Gateway name.
    #[serde(rename = "Name")]
    pub name: String,
    /// Gateway identifier.
    #[serde(rename = "ID")]
    pub id: String,
    /// Gateway state.
    #[serde(rename = "Status")]
    pub status: String,
    /// Gateway type.
    #[serde(rename = "Type")]
    pub gateway_type: String,
    /// Gateway ARN.
    #[serde(rename = "ARN")]
    pub arn: String,
}

/// Access details of one file share.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "Type")]
pub enum ShareDetail {
    /// NFS share, with allowed client ranges.
    #[serde(rename = "NFS")]
    Nfs {
        /// Share identifier.
        #[serde(rename = "ShareID")]
        share_id: Option<String>,
        /// Export path.
        #[serde(rename = "Path")]
        path: Option<String>,
        /// Backing location.
        #[serde(rename = "Bucket")]
        bucket: Option<String>,
        /// Allowed client CIDR blocks.
        #[serde(rename = "AllowedClients")]
        allowed_clients: Vec<String>,
        /// Share status.
        #[serde(rename = "Status")]
        status: Option<String>,
    },
    /// SMB share, with directory users and groups.
    #[serde(rename = "SMB")]
    Smb {
        /// Share identifier.
        #[serde(rename = "ShareID")]
        share_id: Option<String>,
        /// Share path.
        #[serde(rename = "Path")]
        path: Option<String>,
        /// Backing location.
        #[serde(rename = "Bucket")]
        bucket: Option<String>,
        /// Allowed users and groups.
        #[serde(rename = "AD_AllowedUsers")]
        allowed_users: Vec<String>,
        /// Allowed groups (entries starting with `@`).
        #[serde(rename = "AD_AllowedGroups")]
        allowed_groups: Vec<String>,
        /// Administrator users.
        #[serde(rename = "AD_AdminUsers")]
        admin_users: Vec<String>,
        /// Share status.
        #[serde(rename = "Status")]
        status: Option<String>,
        /// Whether SMB ACLs are enabled.
        #[serde(rename = "SMB_ACL_Enabled")]
        acl_enabled: bool,
    },
}

/// File shares of one gateway.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GatewayShares {
    /// Gateway identifier.
    #[serde(rename = "GatewayID")]
    pub gateway_id: String,
    /// Share details, NFS first.
    #[serde(rename = "Shares")]
    pub shares: Vec<ShareDetail>,
}

/// File shares by gateway name.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct ShareReport {
    /// Gateways in name order.
    pub gateways: BTreeMap<String, GatewayShares>,
}

/// Builds inventory reports from a catalog.
#[derive(Debug)]
pub struct InventoryBuilder<'a, C: GatewayCatalog + ?Sized> {
    catalog: &'a C,
}

impl<'a, C: GatewayCatalog + ?Sized> InventoryBuilder<'a, C> {
    /// Creates a new builder.
    #[must_use]
    pub const fn new(catalog: &'a C) -> Self {
        Self { catalog }
    }

    /// Describes every gateway. Gateways that cannot be described are
    /// logged and skipped.
    ///
    /// # Errors
    ///
    /// Returns an error if the gateways cannot be listed.
    pub async fn gateway_status(&self) -> Result<Vec<GatewayStatus>> {
        let arns = self.catalog.list_gateways().await?;
        let mut statuses = Vec::with_capacity(arns.len());

        for arn in arns {
            match self.catalog.describe_gateway(&arn).await {
                Ok(info) => statuses.push(GatewayStatus {
                    name: info.gateway_name.unwrap_or_else(|| NOT_AVAILABLE.to_string()),
                    id: info.gateway_id.unwrap_or_else(|| NOT_AVAILABLE.to_string()),
                    status: info.gateway_state.unwrap_or_else(|| String::from("UNKNOWN")),
                    gateway_type: info.gateway_type.unwrap_or_else(|| NOT_AVAILABLE.to_string()),
                    arn,
                }),
                Err(e) => warn!("Could not describe gateway {arn}: {e}"),
            }
        }

        Ok(statuses)
    }

    /// Builds the file share report for file gateways.
    ///
    /// # Errors
    ///
    /// Returns an error if the gateways cannot be listed. Failures for a
    /// single gateway or batch are logged and skipped.
    pub async fn share_report(&self) -> Result<ShareReport> {
        let mut report = ShareReport::default();

        for gateway in self.gateway_status().await? {
            if !FILE_GATEWAY_TYPES.contains(&gateway.gateway_type.as_str()) {
                continue;
            }

            info!("Processing shares for {}...", gateway.name);
            match self.gateway_shares(&gateway.arn).await {
                Ok(shares) => {
                    report.gateways.insert(
                        gateway.name,
                        GatewayShares {
                            gateway_id: gateway.id,
                            shares,
                        },
                    );
                }
                Err(e) => error!("Error gathering share data for {}: {e}", gateway.name),
            }
        }

        Ok(report)
    }

    async fn gateway_shares(&self, gateway_arn: &str) -> Result<Vec<ShareDetail>> {
        let listed = self.catalog.list_file_shares(gateway_arn).await?;
        let arns_of = |share_type: FileShareType| -> Vec<String> {
            listed
                .iter()
                .filter(|s| s.file_share_type == share_type)
                .map(|s| s.file_share_arn.clone())
                .collect()
        };

        let mut shares = Vec::new();

        for batch in arns_of(FileShareType::Nfs).chunks(MAX_DESCRIBE_BATCH) {
            match self.catalog.describe_nfs_file_shares(batch).await {
                Ok(described) => shares.extend(described.into_iter().map(|share| ShareDetail::Nfs {
                    share_id: share.file_share_id,
                    path: share.path,
                    bucket: share.location_arn,
                    allowed_clients: share.client_list,
                    status: share.file_share_status,
                })),
                Err(e) => error!("Failed to describe NFS shares: {e}"),
            }
        }

        for batch in arns_of(FileShareType::Smb).chunks(MAX_DESCRIBE_BATCH) {
            match self.catalog.describe_smb_file_shares(batch).await {
                Ok(described) => shares.extend(described.into_iter().map(|share| ShareDetail::Smb {
                    share_id: share.file_share_id,
                    path: share.path,
                    bucket: share.location_arn,
                    allowed_groups: share
                        .valid_user_list
                        .iter()
                        .filter(|u| u.starts_with('@'))
                        .cloned()
                        .collect(),
                    allowed_users: share.valid_user_list,
                    admin_users: share.admin_user_list,
                    status: share.file_share_status,
                    acl_enabled: share.smb_acl_enabled,
                })),
                Err(e) => error!("Failed to describe SMB shares: {e}"),
            }
        }

        Ok(shares)
    }
}

impl ShareReport {
    /// Writes the report as pretty JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub async fn export(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| SgwError::internal(format!("Failed to serialize share report: {e}")))?;
        tokio::fs::write(path, json).await?;
        info!("Detailed share report saved to {}", path.display());
        Ok(())
    }

    /// Returns the total number of shares.
    #[must_use]
    pub fn share_count(&self) -> usize {
        self.gateways.values().map(|g| g.shares.len()).sum()
    }
}

/// Converts gateway statuses into the `gateways` composition input.
///
/// Keys are derived from gateway names: lowercased, with runs of other
/// characters collapsed to `-`. A name that yields no key falls back to the
/// gateway id, and a key already taken gets the id appended.
#[must_use]
pub fn gateways_input(statuses: &[GatewayStatus]) -> Vec<GatewayInput> {
    let mut taken = HashSet::new();
    statuses
        .iter()
        .filter(|g| g.id != NOT_AVAILABLE)
        .map(|g| GatewayInput {
            key: unique_key(&g.name, &g.id, &mut taken),
            gateway_id: g.id.clone(),
            gateway_name: g.name.clone(),
        })
        .collect()
}

fn unique_key(name: &str, id: &str, taken: &mut HashSet<String>) -> String {
    let id_slug = slug(id);
    let mut key = if name == NOT_AVAILABLE { String::new() } else { slug(name) };
    if key.is_empty() {
        key.clone_from(&id_slug);
    } else if taken.contains(&key) {
        key = format!("{key}-{id_slug}");
    }

    // Ids are unique per account, but two statuses may still share one.
    let base = key.clone();
    let mut n = 2;
    while key.is_empty() || taken.contains(&key) {
        key = format!("{base}-{n}");
        n += 1;
    }

    taken.insert(key.clone());
    key
}

fn slug(source: &str) -> String {
    let mut key = String::with_capacity(source.len());
    for c in source.chars() {
        if c.is_ascii_alphanumeric() {
            key.push(c.to_ascii_lowercase());
        } else if !key.ends_with('-') {
            key.push('-');
        }
    }
    key.trim_matches('-').to_string()
}
