//! Campaign catalogue boundary.
//!
//! Campaigns and their message details are owned by the campaign tooling; the
//! reporting side only reads them. The paging query is delegated to storage
//! (`list_campaigns_page`) so the row window and the totals come back together.

pub mod in_memory;
pub mod postgres;

pub use in_memory::InMemoryCampaignStore;
pub use postgres::PostgresCampaignStore;

use smsreport_core::{Campaign, CampaignId, MessageDetail, PageRequest, ReportDate};

use crate::db::StoreError;

/// One row of the storage-side paging function.
///
/// `campaign` is `None` for the totals-only row emitted when the requested
/// page lies past the end of a non-empty result set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CampaignPageRow {
    pub campaign: Option<Campaign>,
    pub total_count: u64,
    pub total_pages: u64,
}

/// Read access to campaigns and message details.
#[async_trait::async_trait]
pub trait CampaignStore: Send + Sync {
    /// All campaigns scheduled on `date`, ordered by id.
    async fn campaigns_on(&self, date: ReportDate) -> Result<Vec<Campaign>, StoreError>;

    async fn get(&self, id: CampaignId) -> Result<Option<Campaign>, StoreError>;

    /// Message details of one campaign, ordered by id.
    async fn details_for(&self, id: CampaignId) -> Result<Vec<MessageDetail>, StoreError>;

    /// One page of campaigns on `date`, each row carrying the totals of the
    /// whole result set. Zero rows means no campaign matches.
    async fn page_by_date(
        &self,
        date: ReportDate,
        request: PageRequest,
    ) -> Result<Vec<CampaignPageRow>, StoreError>;

    /// Every date that has at least one campaign, newest first.
    async fn distinct_dates(&self) -> Result<Vec<ReportDate>, StoreError>;
}
