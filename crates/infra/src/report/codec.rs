//! Fixed-column CSV layouts and artifact naming.
//!
//! Both layouts are UTF-8, comma separated, with one header row. Quoting is
//! left to the `csv` writer, which quotes any field containing a comma, a
//! quote or a line break.

use std::io::Write;

use chrono::{DateTime, Utc};

use smsreport_core::{Campaign, CampaignId, DeliveryCounts, MessageDetail};

use super::ArtifactError;

pub const SUMMARY_HEADER: [&str; 7] = [
    "Campaign ID",
    "Campaign Name",
    "Campaign State",
    "Total Messages",
    "Sent",
    "Pending",
    "Failed",
];

pub const DETAIL_HEADER: [&str; 5] = [
    "Campaign ID",
    "Campaign Name",
    "Campaign Date",
    "Message Text",
    "Message State",
];

/// Artifact families; the prefix of every generated file name.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ReportKind {
    /// Job artifact, subject = campaign id
    Summary,
    /// Per-date summary, subject = `YYYYMMDD`
    Date,
    /// Per-message detail, subject = campaign id
    Campaign,
}

impl ReportKind {
    pub fn prefix(&self) -> &'static str {
        match self {
            ReportKind::Summary => "summary",
            ReportKind::Date => "date",
            ReportKind::Campaign => "campaign",
        }
    }
}

/// `{kind}_{subject}_{YYYYMMDD_HHMMSS_ffffff}.csv`, timestamp in UTC.
pub fn artifact_name(kind: ReportKind, subject: &str, at: DateTime<Utc>) -> String {
    format!(
        "{}_{}_{}.csv",
        kind.prefix(),
        subject,
        at.format("%Y%m%d_%H%M%S_%6f")
    )
}

/// One line of a summary report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummaryRow {
    pub campaign_id: CampaignId,
    pub name: String,
    pub state: String,
    pub counts: DeliveryCounts,
}

impl SummaryRow {
    pub fn new(campaign: &Campaign, counts: DeliveryCounts) -> Self {
        Self {
            campaign_id: campaign.id,
            name: campaign.name.clone(),
            state: campaign.state.clone(),
            counts,
        }
    }
}

/// Write the summary layout: header plus one row per campaign.
pub fn write_summary<W: Write>(out: W, rows: &[SummaryRow]) -> Result<(), ArtifactError> {
    let mut writer = csv::Writer::from_writer(out);
    writer.write_record(SUMMARY_HEADER)?;
    for row in rows {
        writer.write_record([
            row.campaign_id.to_string(),
            row.name.clone(),
            row.state.clone(),
            row.counts.total().to_string(),
            row.counts.sent().to_string(),
            row.counts.pending().to_string(),
            row.counts.failed().to_string(),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

/// Write the per-message detail layout for one campaign.
pub fn write_detail<W: Write>(
    out: W,
    campaign: &Campaign,
    details: &[MessageDetail],
) -> Result<(), ArtifactError> {
    let mut writer = csv::Writer::from_writer(out);
    writer.write_record(DETAIL_HEADER)?;
    let id = campaign.id.to_string();
    let date = campaign.date.iso();
    for detail in details {
        writer.write_record([
            id.as_str(),
            campaign.name.as_str(),
            date.as_str(),
            detail.text.as_str(),
            detail.delivery_state.as_str(),
        ])?;
    }
    writer.flush()?;
    Ok(())
}
