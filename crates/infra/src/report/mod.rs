//! Report rendering: CSV codec, artifact files, on-demand reports.

pub mod artifacts;
pub mod codec;
pub mod on_demand;

pub use artifacts::ArtifactWriter;
pub use codec::{ReportKind, SummaryRow};
pub use on_demand::OnDemandReports;

/// Failure to produce a report artifact.
#[derive(Debug, thiserror::Error)]
pub enum ArtifactError {
    #[error("artifact io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("csv encoding error: {0}")]
    Csv(#[from] csv::Error),
}
