use axum::Router;

pub mod campaigns;
pub mod reports;
pub mod system;

/// Router for every endpoint except `/health`.
pub fn router() -> Router {
    Router::new()
        .merge(reports::router())
        .merge(campaigns::router())
}
