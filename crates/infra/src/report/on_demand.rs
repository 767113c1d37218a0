//! Synchronous (request-scoped) reports that bypass the job store.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{info, instrument};

use smsreport_core::{CampaignId, DeliveryCounts, ReportDate};

use super::artifacts::ArtifactWriter;
use super::codec::{ReportKind, SummaryRow};
use crate::catalog::CampaignStore;
use crate::error::ReportError;

/// Builds per-date summaries and per-campaign detail files on request.
#[derive(Clone)]
pub struct OnDemandReports {
    catalog: Arc<dyn CampaignStore>,
    artifacts: ArtifactWriter,
}

impl OnDemandReports {
    pub fn new(catalog: Arc<dyn CampaignStore>, artifacts: ArtifactWriter) -> Self {
        Self { catalog, artifacts }
    }

    /// Summary of every campaign on `date`.
    #[instrument(skip(self), fields(date = %date), err)]
    pub async fn generate_date_summary(&self, date: ReportDate) -> Result<PathBuf, ReportError> {
        let campaigns = self.catalog.campaigns_on(date).await?;
        if campaigns.is_empty() {
            return Err(ReportError::NotFound(format!("no campaigns on {date}")));
        }

        let mut rows = Vec::with_capacity(campaigns.len());
        for campaign in &campaigns {
            let details = self.catalog.details_for(campaign.id).await?;
            rows.push(SummaryRow::new(campaign, DeliveryCounts::from_details(&details)));
        }

        let artifacts = self.artifacts.clone();
        let subject = date.compact();
        let path = tokio::task::spawn_blocking(move || {
            artifacts.write_summary(ReportKind::Date, &subject, &rows)
        })
        .await??;

        info!(path = %path.display(), campaigns = campaigns.len(), "date summary generated");
        Ok(path)
    }

    /// Per-message detail file for one campaign.
    #[instrument(skip(self), fields(campaign_id = %campaign_id), err)]
    pub async fn generate_campaign_detail(
        &self,
        campaign_id: CampaignId,
    ) -> Result<PathBuf, ReportError> {
        let campaign = self
            .catalog
            .get(campaign_id)
            .await?
            .ok_or_else(|| ReportError::NotFound(format!("campaign {campaign_id}")))?;
        let details = self.catalog.details_for(campaign_id).await?;
        let messages = details.len();

        let artifacts = self.artifacts.clone();
        let path =
            tokio::task::spawn_blocking(move || artifacts.write_detail(&campaign, &details))
                .await??;

        info!(path = %path.display(), messages, "campaign detail generated");
        Ok(path)
    }
}
