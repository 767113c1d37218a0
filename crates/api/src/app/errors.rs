use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;
use tracing::error;

use smsreport_core::{CampaignId, ReportDate};
use smsreport_infra::ReportError;

pub fn report_error_to_response(err: ReportError) -> axum::response::Response {
    match err {
        ReportError::Validation(msg) => json_error(StatusCode::BAD_REQUEST, "validation_error", msg),
        ReportError::NotFound(msg) => json_error(StatusCode::NOT_FOUND, "not_found", msg),
        ReportError::Storage(msg) => {
            error!(error = %msg, "storage failure");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "storage_error", msg)
        }
        ReportError::Artifact(e) => {
            error!(error = %e, "artifact failure");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "artifact_error", e.to_string())
        }
    }
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

/// Request bodies, queries and paths that fail to deserialize.
pub fn bad_request(message: impl Into<String>) -> axum::response::Response {
    json_error(StatusCode::BAD_REQUEST, "validation_error", message)
}

pub fn parse_date(s: &str) -> Result<ReportDate, axum::response::Response> {
    ReportDate::parse(s).map_err(|e| report_error_to_response(e.into()))
}

pub fn parse_campaign_id(s: &str) -> Result<CampaignId, axum::response::Response> {
    s.parse::<CampaignId>()
        .map_err(|e| report_error_to_response(e.into()))
}
