//! Redeemable item catalog and its periodic re-sync.
//!
//! Items live in an external knowledge base; the only field this service owns
//! there is `redeemed`, which must track the number of transactions recorded
//! locally for each item.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::domain::item::{CatalogItem, ItemId};
use crate::scheduler::PeriodicJob;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum CatalogError {
    #[error("catalog transport failure: {0}")]
    Transport(String),
    #[error("catalog rejected request: {0}")]
    Api(String),
    #[error("catalog returned malformed item `{item_id}`: {reason}")]
    Decode { item_id: String, reason: String },
    #[error("redemption count unavailable: {0}")]
    Counter(String),
}

#[async_trait]
pub trait ItemCatalog: Send + Sync {
    /// Items that are not marked expired.
    async fn list_active_items(&self) -> Result<Vec<CatalogItem>, CatalogError>;

    async fn set_redeemed(&self, item_id: &ItemId, redeemed: u32) -> Result<(), CatalogError>;
}

#[async_trait]
pub trait RedemptionCounter: Send + Sync {
    async fn count_for_item(&self, item_id: &ItemId) -> Result<u32, CatalogError>;
}

/// Catalog used when no external knowledge base is configured.
#[derive(Default)]
pub struct NoopItemCatalog;

#[async_trait]
impl ItemCatalog for NoopItemCatalog {
    async fn list_active_items(&self) -> Result<Vec<CatalogItem>, CatalogError> {
        Ok(Vec::new())
    }

    async fn set_redeemed(&self, _item_id: &ItemId, _redeemed: u32) -> Result<(), CatalogError> {
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CatalogSyncReport {
    pub listed: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub failed: usize,
}

pub struct CatalogSyncJob {
    catalog: Arc<dyn ItemCatalog>,
    counter: Arc<dyn RedemptionCounter>,
}

impl CatalogSyncJob {
    pub fn new(catalog: Arc<dyn ItemCatalog>, counter: Arc<dyn RedemptionCounter>) -> Self {
        Self { catalog, counter }
    }

    pub async fn sync_once(&self) -> Result<CatalogSyncReport, CatalogError> {
        let sync_id = Uuid::new_v4().to_string();
        let items = self.catalog.list_active_items().await?;
        let mut report = CatalogSyncReport { listed: items.len(), ..CatalogSyncReport::default() };

        for item in items {
            let count = match self.counter.count_for_item(&item.id).await {
                Ok(count) => count,
                Err(error) => {
                    warn!(
                        event_name = "catalog.sync.count_failed",
                        correlation_id = %sync_id,
                        item_id = %item.id,
                        error = %error,
                        "cannot count redemptions for item"
                    );
                    report.failed += 1;
                    continue;
                }
            };

            // Zero means "never redeemed here"; the catalog value is left alone.
            if count == 0 || count == item.redeemed {
                report.unchanged += 1;
                continue;
            }

            match self.catalog.set_redeemed(&item.id, count).await {
                Ok(()) => {
                    debug!(
                        event_name = "catalog.sync.item_updated",
                        correlation_id = %sync_id,
                        item_id = %item.id,
                        previous = item.redeemed,
                        redeemed = count,
                        "catalog item redeemed count updated"
                    );
                    report.updated += 1;
                }
                Err(error) => {
                    warn!(
                        event_name = "catalog.sync.update_failed",
                        correlation_id = %sync_id,
                        item_id = %item.id,
                        error = %error,
                        "cannot update catalog item"
                    );
                    report.failed += 1;
                }
            }
        }

        info!(
            event_name = "catalog.sync.finished",
            correlation_id = %sync_id,
            listed = report.listed,
            updated = report.updated,
            failed = report.failed,
            "catalog re-sync finished"
        );
        Ok(report)
    }
}

#[async_trait]
impl PeriodicJob for CatalogSyncJob {
    async fn run(&self) {
        if let Err(error) = self.sync_once().await {
            warn!(event_name = "catalog.sync.aborted", error = %error, "cannot list catalog items");
        }
    }
}
