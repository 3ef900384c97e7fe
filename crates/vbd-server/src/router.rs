use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::handler::{self, AppState};

/// Build the axum router with all directory endpoints.
pub fn build_router(state: AppState, max_body_bytes: usize) -> Router {
    Router::new()
        .route("/v1/health", get(handler::health_handler))
        .route(
            "/v1/clients",
            get(handler::list_clients_handler).post(handler::register_client_handler),
        )
        .route(
            "/v1/clients/:client_id/contracts",
            post(handler::create_contract_handler),
        )
        .route("/v1/clients/:client_id/query", post(handler::query_handler))
        .route(
            "/v1/clients/:client_id/versions/:blob_id",
            post(handler::upload_version_handler),
        )
        .route(
            "/v1/clients/:client_id/versions/:blob_id/content",
            get(handler::content_handler),
        )
        .route("/v1/sign", post(handler::sign_handler))
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
