//! Detail aggregation: message counts per delivery state.

use serde::{Deserialize, Serialize};

use crate::campaign::{DeliveryState, MessageDetail};

/// Per-campaign message counts by delivery state.
///
/// `total` is always `sent + pending + failed`; there is no way to build a
/// value that breaks this.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryCounts {
    sent: u64,
    pending: u64,
    failed: u64,
}

impl DeliveryCounts {
    pub fn new(sent: u64, pending: u64, failed: u64) -> Self {
        Self {
            sent,
            pending,
            failed,
        }
    }

    /// Count a sequence of delivery states.
    pub fn tally<I>(states: I) -> Self
    where
        I: IntoIterator<Item = DeliveryState>,
    {
        states.into_iter().fold(Self::default(), |mut acc, s| {
            acc.record(s);
            acc
        })
    }

    /// Count the delivery states of a campaign's details.
    pub fn from_details<'a, I>(details: I) -> Self
    where
        I: IntoIterator<Item = &'a MessageDetail>,
    {
        Self::tally(details.into_iter().map(|d| d.delivery_state))
    }

    pub fn record(&mut self, state: DeliveryState) {
        match state {
            DeliveryState::Sent => self.sent += 1,
            DeliveryState::Pending => self.pending += 1,
            DeliveryState::Failed => self.failed += 1,
        }
    }

    pub fn total(&self) -> u64 {
        self.sent + self.pending + self.failed
    }

    pub fn sent(&self) -> u64 {
        self.sent
    }

    pub fn pending(&self) -> u64 {
        self.pending
    }

    pub fn failed(&self) -> u64 {
        self.failed
    }
}
