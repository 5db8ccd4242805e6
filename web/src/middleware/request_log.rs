use axum::{
    extract::{ConnectInfo, Request},
    http::{header, HeaderMap},
    middleware::Next,
    response::Response,
};
use log::*;
use std::net::SocketAddr;
use std::time::Instant;

/// Logs one line per request once the handler has produced its response.
///
/// For streaming responses the duration covers the time until the stream was
/// opened, not its whole lifetime.
pub async fn log_request(request: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().clone();
    let uri = request.uri().clone();
    let ip = client_ip(
        request.headers(),
        request
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr),
    );
    let user_agent = request
        .headers()
        .get(header::USER_AGENT)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("-")
        .to_owned();

    let response = next.run(request).await;

    info!(
        "handled request: {method} {uri} status={} ip={ip} user_agent={user_agent:?} duration={:?}",
        response.status().as_u16(),
        start.elapsed()
    );
    response
}

/// The first `X-Forwarded-For` hop if a proxy set one, else the peer address.
fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty());

    match (forwarded, peer) {
        (Some(ip), _) => ip.to_owned(),
        (None, Some(addr)) => addr.ip().to_string(),
        (None, None) => "-".to_owned(),
    }
}
