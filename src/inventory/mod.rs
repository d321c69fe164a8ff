//! Storage Gateway inventory.
//!
//! Reads gateways and file shares from a [`GatewayCatalog`] and produces:
//! - a status list of every gateway
//! - a file share access report for file gateways
//! - the `gateways` composition input for per-gateway alarms

mod catalog;
mod report;

#[cfg(test)]
pub use catalog::MockGatewayCatalog;
pub use catalog::{
    CatalogSnapshot, FileShareSummary, FileShareType, GatewayCatalog, GatewayInfo, NfsFileShareInfo,
    SmbFileShareInfo, SnapshotCatalog, MAX_DESCRIBE_BATCH,
};
pub use report::{
    gateways_input, GatewayShares, GatewayStatus, InventoryBuilder, ShareDetail, ShareReport, FILE_GATEWAY_TYPES,
};
