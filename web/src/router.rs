use crate::controller::{health_check_controller, version_controller};
use crate::error::{Error, RequestErrorKind};
use crate::middleware::{request_log::log_request, security_headers::set_security_headers};
use crate::sse::handler::sse_handler;
use crate::AppState;
use axum::{
    http::{HeaderValue, Method, Uri},
    middleware::{from_fn, from_fn_with_state},
    routing::get,
    Router,
};
use log::*;
use tower_http::cors::{AllowOrigin, CorsLayer};

pub fn define_routes(app_state: AppState) -> Router {
    let cors = cors_layer(&app_state.config.allowed_origins);

    Router::new()
        .merge(health_routes())
        .merge(version_routes(app_state.clone()))
        .merge(event_routes(app_state.clone()))
        .fallback(not_found)
        .layer(cors)
        .layer(from_fn_with_state(app_state, set_security_headers))
        .layer(from_fn(log_request))
}

fn health_routes() -> Router {
    Router::new().route("/health", get(health_check_controller::health_check))
}

fn version_routes(app_state: AppState) -> Router {
    Router::new()
        .route("/version", get(version_controller::version))
        .with_state(app_state)
}

fn event_routes(app_state: AppState) -> Router {
    Router::new()
        .route("/events", get(sse_handler))
        .with_state(app_state)
}

async fn not_found(uri: Uri) -> Error {
    Error::request(RequestErrorKind::NotFound, format!("no route for {}", uri.path()))
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(e) => {
                warn!("Ignoring invalid CORS origin {origin:?}: {e}");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_methods([Method::GET, Method::HEAD, Method::OPTIONS])
        .allow_origin(AllowOrigin::list(origins))
}
