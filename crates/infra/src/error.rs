//! Service-boundary error for the report operations.

use smsreport_core::DomainError;

use crate::db::StoreError;
use crate::report::ArtifactError;

/// Error returned by dispatcher, status, listing and on-demand operations.
#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("validation error: {0}")]
    Validation(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("storage error: {0}")]
    Storage(String),
    #[error(transparent)]
    Artifact(#[from] ArtifactError),
}

impl From<StoreError> for ReportError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(msg) => ReportError::NotFound(msg),
            other => ReportError::Storage(other.to_string()),
        }
    }
}

impl From<DomainError> for ReportError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::Validation(msg) | DomainError::InvalidId(msg) => {
                ReportError::Validation(msg)
            }
            DomainError::NotFound(msg) => ReportError::NotFound(msg),
            other => ReportError::Storage(other.to_string()),
        }
    }
}

impl From<tokio::task::JoinError> for ReportError {
    fn from(err: tokio::task::JoinError) -> Self {
        ReportError::Artifact(ArtifactError::Io(std::io::Error::other(err)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_not_found_stays_not_found() {
        let err: ReportError = StoreError::NotFound("job".into()).into();
        assert!(matches!(err, ReportError::NotFound(_)));
    }

    #[test]
    fn store_conflict_is_a_storage_error() {
        let err: ReportError = StoreError::Conflict("dup".into()).into();
        assert!(matches!(err, ReportError::Storage(msg) if msg.contains("dup")));
    }

    #[test]
    fn invalid_ids_are_validation_errors() {
        let err: ReportError = DomainError::invalid_id("abc").into();
        assert!(matches!(err, ReportError::Validation(_)));
    }
}
