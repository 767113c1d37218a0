//! Job status query.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::instrument;

use smsreport_core::{CampaignId, JobState, ReportDate, ReportJob};

use super::store::JobStore;
use crate::error::ReportError;

/// Caller-facing view of a campaign's latest job.
///
/// `artifact_path` is only populated for COMPLETED jobs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobStatusView {
    pub campaign_id: CampaignId,
    pub state: JobState,
    pub date: ReportDate,
    pub artifact_path: Option<String>,
    pub retry_count: u32,
    pub updated_at: DateTime<Utc>,
}

impl From<&ReportJob> for JobStatusView {
    fn from(job: &ReportJob) -> Self {
        Self {
            campaign_id: job.campaign_id,
            state: job.state,
            date: job.date,
            artifact_path: job.visible_artifact().map(str::to_owned),
            retry_count: job.retry_count,
            updated_at: job.updated_at,
        }
    }
}

#[derive(Clone)]
pub struct JobStatusQuery {
    jobs: Arc<dyn JobStore>,
}

impl JobStatusQuery {
    pub fn new(jobs: Arc<dyn JobStore>) -> Self {
        Self { jobs }
    }

    /// Status of the most recently updated job of `campaign_id`, any date.
    #[instrument(skip(self), fields(campaign_id = %campaign_id), err)]
    pub async fn get_status(&self, campaign_id: CampaignId) -> Result<JobStatusView, ReportError> {
        let job = self
            .jobs
            .latest_for_campaign(campaign_id)
            .await?
            .ok_or_else(|| ReportError::NotFound(format!("no report job for campaign {campaign_id}")))?;
        Ok(JobStatusView::from(&job))
    }
}
