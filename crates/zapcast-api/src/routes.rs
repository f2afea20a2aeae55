//! API routes

use axum::{
    extract::DefaultBodyLimit,
    http::{HeaderValue, Method},
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    limit::RequestBodyLimitLayer,
    trace::TraceLayer,
};
use tracing::warn;
use zapcast_common::config::ApiConfig;

use crate::auth::{auth_middleware, AppState};
use crate::handlers::{campaigns, contacts, health, instances, messages};

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    let api_config = state.config.api.clone();
    let state = Arc::new(state);

    // Health check routes (no auth required)
    let health_routes = Router::new()
        .route("/", get(health::health))
        .route("/live", get(health::liveness))
        .route("/ready", get(health::readiness))
        .with_state(state.clone());

    let message_routes = Router::new().route("/send", post(messages::send_message));

    let contact_routes = Router::new().route("/parse", post(contacts::parse_contacts));

    let instance_routes = Router::new()
        .route("/", get(instances::list_instances))
        .route("/", post(instances::create_instance));

    let campaign_routes = Router::new()
        .route("/", get(campaigns::list_campaigns))
        .route("/", post(campaigns::create_campaign))
        .route("/:campaign_id", get(campaigns::get_campaign))
        .route("/:campaign_id/stats", get(campaigns::get_campaign_stats))
        .route("/:campaign_id/contacts", get(campaigns::list_campaign_contacts))
        .route(
            "/:campaign_id/contacts/import",
            post(campaigns::import_campaign_contacts),
        )
        .route("/:campaign_id/dispatch", post(campaigns::dispatch_campaign))
        .route("/:campaign_id/cancel", post(campaigns::cancel_campaign))
        .route("/:campaign_id/restart", post(campaigns::restart_campaign));

    // API v1 routes with authentication
    let api_v1 = Router::new()
        .nest("/messages", message_routes)
        .nest("/contacts", contact_routes)
        .nest("/instances", instance_routes)
        .nest("/campaigns", campaign_routes)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ))
        .with_state(state);

    Router::new()
        .nest("/health", health_routes)
        .nest("/api/v1", api_v1)
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(api_config.body_limit_bytes))
        .layer(cors_layer(&api_config))
        .layer(TraceLayer::new_for_http())
}

fn cors_layer(config: &ApiConfig) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);

    if config.cors_origins.iter().any(|o| o == "*") {
        return layer.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = config
        .cors_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin: {}", origin);
                None
            }
        })
        .collect();

    layer.allow_origin(AllowOrigin::list(origins))
}
