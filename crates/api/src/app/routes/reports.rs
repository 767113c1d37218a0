use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;

use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new()
        .route("/reports", post(submit_reports))
        .route("/reports/status/:campaign_id", get(report_status))
        .route("/reports/summary", post(date_summary))
        .route("/reports/campaigns/:campaign_id/detail", post(campaign_detail))
        .route("/reports/sweep", post(sweep))
}

/// Fan a date out into one report job per campaign; workers run after the
/// response is sent.
pub async fn submit_reports(
    Extension(services): Extension<Arc<AppServices>>,
    body: Result<Json<dto::DateRequest>, JsonRejection>,
) -> axum::response::Response {
    let Json(body) = match body {
        Ok(b) => b,
        Err(rejection) => return errors::bad_request(rejection.body_text()),
    };
    let date = match errors::parse_date(&body.date) {
        Ok(d) => d,
        Err(resp) => return resp,
    };

    match services.dispatcher.submit_batch(date).await {
        Ok(summary) => (
            StatusCode::ACCEPTED,
            Json(dto::BatchAcceptedResponse::from(summary)),
        )
            .into_response(),
        Err(e) => errors::report_error_to_response(e),
    }
}

pub async fn report_status(
    Extension(services): Extension<Arc<AppServices>>,
    Path(campaign_id): Path<String>,
) -> axum::response::Response {
    let campaign_id = match errors::parse_campaign_id(&campaign_id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match services.status.get_status(campaign_id).await {
        Ok(view) => (StatusCode::OK, Json(view)).into_response(),
        Err(e) => errors::report_error_to_response(e),
    }
}

pub async fn date_summary(
    Extension(services): Extension<Arc<AppServices>>,
    body: Result<Json<dto::DateRequest>, JsonRejection>,
) -> axum::response::Response {
    let Json(body) = match body {
        Ok(b) => b,
        Err(rejection) => return errors::bad_request(rejection.body_text()),
    };
    let date = match errors::parse_date(&body.date) {
        Ok(d) => d,
        Err(resp) => return resp,
    };

    match services.on_demand.generate_date_summary(date).await {
        Ok(path) => (StatusCode::OK, Json(dto::ArtifactResponse::from(path))).into_response(),
        Err(e) => errors::report_error_to_response(e),
    }
}

pub async fn campaign_detail(
    Extension(services): Extension<Arc<AppServices>>,
    Path(campaign_id): Path<String>,
) -> axum::response::Response {
    let campaign_id = match errors::parse_campaign_id(&campaign_id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match services.on_demand.generate_campaign_detail(campaign_id).await {
        Ok(path) => (StatusCode::OK, Json(dto::ArtifactResponse::from(path))).into_response(),
        Err(e) => errors::report_error_to_response(e),
    }
}

/// Manual trigger for the recovery sweep that also runs on an interval.
pub async fn sweep(Extension(services): Extension<Arc<AppServices>>) -> axum::response::Response {
    match services.sweeper.sweep(Utc::now()).await {
        Ok(report) => (StatusCode::OK, Json(report)).into_response(),
        Err(e) => errors::report_error_to_response(e),
    }
}
