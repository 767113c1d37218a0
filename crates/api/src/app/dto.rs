use serde::{Deserialize, Serialize};

use smsreport_infra::jobs::{BatchEntry, BatchSummary};

// -------------------------
// Request DTOs
// -------------------------

/// Body of `POST /reports` and `POST /reports/summary`.
#[derive(Debug, Deserialize)]
pub struct DateRequest {
    pub date: String,
}

#[derive(Debug, Deserialize)]
pub struct ListCampaignsQuery {
    pub date: Option<String>,
    pub page: Option<u32>,
    pub page_size: Option<u32>,
}

// -------------------------
// Response DTOs
// -------------------------

#[derive(Debug, Serialize)]
pub struct BatchAcceptedResponse {
    pub message: String,
    pub campaigns: Vec<BatchEntry>,
    pub total: usize,
    pub scheduled: usize,
}

impl From<BatchSummary> for BatchAcceptedResponse {
    fn from(summary: BatchSummary) -> Self {
        Self {
            message: format!("report generation started for {} campaign(s)", summary.total),
            campaigns: summary.campaigns,
            total: summary.total,
            scheduled: summary.scheduled,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ArtifactResponse {
    pub artifact_path: String,
}

impl From<std::path::PathBuf> for ArtifactResponse {
    fn from(path: std::path::PathBuf) -> Self {
        Self {
            artifact_path: path.to_string_lossy().into_owned(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct DatesResponse {
    pub total: usize,
    pub dates: Vec<String>,
}
