pub mod protocol;
pub mod rest;
pub mod state;
pub mod ws_handler;

use std::sync::Arc;

use axum::{
    http::{header::CONTENT_TYPE, Method},
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};

// Re-export the main WebSocket handler to make it easily accessible
// to the binary that will build the web server router.
pub use ws_handler::ws_handler;

use rest::{
    ads_handler, calendar_handler, delete_record_handler, get_identity_handler, get_record_handler,
    get_summary_handler, list_records_handler, reset_identity_handler, save_record_handler,
};
use state::AppState;

/// Builds the API router: REST endpoints plus the `/chat` WebSocket.
pub fn router(app_state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE]);

    Router::new()
        .route("/identity", get(get_identity_handler))
        .route("/identity/reset", post(reset_identity_handler))
        .route("/records", get(list_records_handler))
        .route(
            "/records/{date}",
            get(get_record_handler).put(save_record_handler).delete(delete_record_handler),
        )
        .route("/summaries/{date}", get(get_summary_handler))
        .route("/calendar/{year}/{month}", get(calendar_handler))
        .route("/ads", get(ads_handler))
        .route("/chat", get(ws_handler))
        .layer(cors)
        .with_state(app_state)
}
