//! Campaigns and their outbound messages.
//!
//! Both are read-only from the reporting side: campaign state is managed by
//! the campaign tooling, message delivery state by the SMS gateway.

use core::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::date::ReportDate;
use crate::error::DomainError;
use crate::id::{CampaignId, MessageId};

/// An SMS broadcast definition tied to a date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Campaign {
    pub id: CampaignId,
    pub date: ReportDate,
    pub name: String,
    /// Free-form label (ACTIVE, PAUSED, COMPLETED, ...).
    pub state: String,
    pub description: Option<String>,
}

/// Delivery state of one outbound message.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeliveryState {
    Sent,
    Pending,
    Failed,
}

impl DeliveryState {
    pub const ALL: [DeliveryState; 3] = [Self::Sent, Self::Pending, Self::Failed];

    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryState::Sent => "SENT",
            DeliveryState::Pending => "PENDING",
            DeliveryState::Failed => "FAILED",
        }
    }
}

impl core::fmt::Display for DeliveryState {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeliveryState {
    type Err = DomainError;

    /// Accepts the canonical labels and the legacy ones older tooling wrote
    /// (`ENVIADO`, `PENDIENTE`, `FALLIDO`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "SENT" | "ENVIADO" => Ok(Self::Sent),
            "PENDING" | "PENDIENTE" => Ok(Self::Pending),
            "FAILED" | "FALLIDO" => Ok(Self::Failed),
            other => Err(DomainError::validation(format!(
                "unknown delivery state '{other}'"
            ))),
        }
    }
}

/// One outbound message belonging to a campaign.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageDetail {
    pub id: MessageId,
    pub campaign_id: CampaignId,
    pub text: String,
    pub delivery_state: DeliveryState,
}
