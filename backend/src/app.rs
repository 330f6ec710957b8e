use axum::{
    http::{HeaderValue, Method},
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    services::ServeDir,
    trace::TraceLayer,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::{config::Config, docs::ApiDoc, handlers, middleware, state::AppState};

/// Assembles the full HTTP surface around `state`.
pub fn build_app(state: AppState) -> Router {
    let cors = cors_layer(&state.config);
    let static_dir = state.config.static_dir.clone();

    let mut router = Router::new()
        .route("/api/visitor-info", post(handlers::record_visit))
        .route("/api/chat-message", post(handlers::record_chat_message))
        .route("/api/health", get(handlers::health))
        .merge(SwaggerUi::new("/api/docs").url("/api-doc/openapi.json", ApiDoc::openapi()));

    if let Some(dir) = static_dir {
        router = router.fallback_service(ServeDir::new(dir));
    }

    router
        .layer(axum_middleware::from_fn(middleware::log_error_responses))
        .layer(axum_middleware::from_fn(middleware::request_id))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state)
}

fn cors_layer(config: &Config) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any)
        .max_age(std::time::Duration::from_secs(24 * 60 * 60));

    if config.allows_any_origin() {
        return layer.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = config
        .cors_allow_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "ignoring unparsable CORS origin");
                None
            }
        })
        .collect();
    layer.allow_origin(AllowOrigin::list(origins))
}
