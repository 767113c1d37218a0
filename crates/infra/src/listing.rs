//! Pagination gateway for the campaign table.
//!
//! Offset, limit and counting all happen in storage; the gateway only turns
//! the rows into a `Page` and trusts the totals they carry.

use std::sync::Arc;

use tracing::instrument;

use smsreport_core::{Campaign, Page, PageRequest, ReportDate};

use crate::catalog::CampaignStore;
use crate::error::ReportError;

#[derive(Clone)]
pub struct PaginationGateway {
    catalog: Arc<dyn CampaignStore>,
}

impl PaginationGateway {
    pub fn new(catalog: Arc<dyn CampaignStore>) -> Self {
        Self { catalog }
    }

    /// One page of the campaigns on `date`, ordered by id.
    #[instrument(
        skip(self),
        fields(date = %date, page = request.page(), page_size = request.page_size()),
        err
    )]
    pub async fn list_by_date(
        &self,
        date: ReportDate,
        request: PageRequest,
    ) -> Result<Page<Campaign>, ReportError> {
        let rows = self.catalog.page_by_date(date, request).await?;

        let Some(first) = rows.first() else {
            return Ok(Page::empty(request));
        };
        let (total, total_pages) = (first.total_count, first.total_pages);

        let items: Vec<Campaign> = rows.into_iter().filter_map(|r| r.campaign).collect();
        Ok(Page {
            items,
            total,
            page: request.page(),
            page_size: request.page_size(),
            total_pages,
        })
    }

    /// Every date with campaigns, newest first, in the `YYYY/MM/DD` form the
    /// listing and submit calls accept.
    #[instrument(skip(self), err)]
    pub async fn list_distinct_dates(&self) -> Result<Vec<String>, ReportError> {
        let dates = self.catalog.distinct_dates().await?;
        Ok(dates.iter().map(ToString::to_string).collect())
    }
}
