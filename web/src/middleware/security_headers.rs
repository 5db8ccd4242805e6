use crate::AppState;
use axum::{
    extract::{Request, State},
    http::{header, HeaderValue},
    middleware::Next,
    response::Response,
};
use log::*;

/// Adds the standard security headers to every response.
///
/// The Content-Security-Policy comes from the request's best matching route in
/// the CSP multiplexer, or its default policy. An empty policy sends no
/// header. Headers a handler already set are left alone.
pub async fn set_security_headers(
    State(app_state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let policy = app_state.csp.policy_for(&request);
    let mut response = next.run(request).await;
    let headers = response.headers_mut();

    headers
        .entry(header::X_CONTENT_TYPE_OPTIONS)
        .or_insert(HeaderValue::from_static("nosniff"));
    headers
        .entry(header::REFERRER_POLICY)
        .or_insert(HeaderValue::from_static("same-origin"));

    if !policy.is_empty() && !headers.contains_key(header::CONTENT_SECURITY_POLICY) {
        match HeaderValue::from_str(policy.header()) {
            Ok(value) => {
                headers.insert(header::CONTENT_SECURITY_POLICY, value);
            }
            Err(e) => warn!("Skipping unencodable Content-Security-Policy {policy:?}: {e}"),
        }
    }

    response
}
