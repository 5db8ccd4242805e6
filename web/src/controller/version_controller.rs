use crate::controller::ApiResponse;
use crate::AppState;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;

#[derive(Debug, Serialize)]
struct VersionInfo {
    name: &'static str,
    version: &'static str,
    runtime_env: String,
}

/// GET the running server's package name, version and runtime environment
pub async fn version(State(app_state): State<AppState>) -> impl IntoResponse {
    Json(ApiResponse::new(
        StatusCode::OK.into(),
        VersionInfo {
            name: env!("CARGO_PKG_NAME"),
            version: env!("CARGO_PKG_VERSION"),
            runtime_env: app_state.config.runtime_env().to_string(),
        },
    ))
}
