//! Router configuration for the relay API.

use axum::{
    body::Body,
    extract::DefaultBodyLimit,
    http::Request,
    middleware::{self, Next},
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use super::dto::{PingResponse, UploadResponse};
use super::handlers::{download, ping, upload, AppState};
use super::middleware::{create_cors_layer, relay_rate_limit};
use crate::config::WebConfig;

/// Room left for multipart boundaries and part headers on top of the file cap.
const MULTIPART_OVERHEAD: u64 = 64 * 1024;

/// OpenAPI documentation.
#[derive(OpenApi)]
#[openapi(
    paths(
        super::handlers::relay::ping,
        super::handlers::relay::upload,
        super::handlers::relay::download
    ),
    components(schemas(UploadResponse, PingResponse)),
    tags((name = "relay", description = "Upload and download by access code"))
)]
pub struct ApiDoc;

/// Create the relay router.
///
/// Every route here is admitted through the per-client token bucket.
pub fn create_router(app_state: Arc<AppState>, web_config: &WebConfig) -> Router {
    let body_limit =
        usize::try_from(app_state.max_upload_size.saturating_add(MULTIPART_OVERHEAD))
            .unwrap_or(usize::MAX);

    let limiters = Arc::clone(&app_state.limiters);
    let trust_forwarded = web_config.trust_forwarded_headers;

    Router::new()
        .route("/ping", get(ping))
        .route(
            "/upload",
            post(upload).layer(DefaultBodyLimit::max(body_limit)),
        )
        .route("/download", get(download))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(create_cors_layer(&web_config.cors_origins))
                .layer(middleware::from_fn(
                    move |req: Request<Body>, next: Next| {
                        relay_rate_limit(Arc::clone(&limiters), trust_forwarded, req, next)
                    },
                )),
        )
        .with_state(app_state)
}

/// Create a health check router.
pub fn create_health_router() -> Router {
    Router::new().route("/health", get(health_check))
}

/// Create the Swagger UI router serving the OpenAPI document.
pub fn create_swagger_router() -> Router {
    SwaggerUi::new("/swagger-ui")
        .url("/api-docs/openapi.json", ApiDoc::openapi())
        .into()
}

/// Health check handler.
async fn health_check() -> &'static str {
    "OK"
}
