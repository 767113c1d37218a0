use std::sync::Arc;

use axum::{
    extract::{rejection::QueryRejection, Extension, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};

use smsreport_core::PageRequest;

use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new()
        .route("/campaigns", get(list_campaigns))
        .route("/campaigns/dates", get(list_dates))
}

pub async fn list_campaigns(
    Extension(services): Extension<Arc<AppServices>>,
    query: Result<Query<dto::ListCampaignsQuery>, QueryRejection>,
) -> axum::response::Response {
    let Query(query) = match query {
        Ok(q) => q,
        Err(rejection) => return errors::bad_request(rejection.body_text()),
    };
    let Some(raw_date) = query.date.as_deref() else {
        return errors::bad_request("date is required (YYYY/MM/DD)");
    };
    let date = match errors::parse_date(raw_date) {
        Ok(d) => d,
        Err(resp) => return resp,
    };
    let request = match PageRequest::from_optional(query.page, query.page_size) {
        Ok(r) => r,
        Err(e) => return errors::report_error_to_response(e.into()),
    };

    match services.listing.list_by_date(date, request).await {
        Ok(page) => (StatusCode::OK, Json(page)).into_response(),
        Err(e) => errors::report_error_to_response(e),
    }
}

pub async fn list_dates(Extension(services): Extension<Arc<AppServices>>) -> axum::response::Response {
    match services.listing.list_distinct_dates().await {
        Ok(dates) => (
            StatusCode::OK,
            Json(dto::DatesResponse {
                total: dates.len(),
                dates,
            }),
        )
            .into_response(),
        Err(e) => errors::report_error_to_response(e),
    }
}
