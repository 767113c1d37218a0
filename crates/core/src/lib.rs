//! `smsreport-core` - domain building blocks for campaign activity reports.
//!
//! This crate contains **pure domain** types (no infrastructure concerns):
//! campaigns and their message details, the report job state machine, the
//! delivery-state aggregation, dates and paging arithmetic.

pub mod campaign;
pub mod counts;
pub mod date;
pub mod error;
pub mod id;
pub mod job;
pub mod paging;
pub mod retry;

pub use campaign::{Campaign, DeliveryState, MessageDetail};
pub use counts::DeliveryCounts;
pub use date::ReportDate;
pub use error::{DomainError, DomainResult};
pub use id::{CampaignId, JobId, MessageId};
pub use job::{JobState, ReportJob};
pub use paging::{Page, PageRequest, MAX_PAGE_SIZE};
pub use retry::{BackoffStrategy, RetryPolicy};
