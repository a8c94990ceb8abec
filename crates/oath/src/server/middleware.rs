//! Request instrumentation chain.
//!
//! Outermost first:
//!
//! 1. [`correlation`]: assigns a [`RequestContext`], opens the `request` span
//!    every later log line is emitted in, logs `-->` and `<--`.
//! 2. [`server_header`]: `Server: mobingi:oath:<version>` on every response,
//!    including CORS preflights and fallbacks.
//! 3. [`cors`]: cross-origin policy; answers preflights itself.
//! 4. [`diagnostics`]: logs the caller's remote address.
//! 5. Request timeout.

use std::net::SocketAddr;
use std::time::Duration;

use axum::{
    extract::{ConnectInfo, Request},
    http::{header, HeaderName, HeaderValue, Method},
    middleware::{self as axum_middleware, Next},
    response::Response,
    Router,
};
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowHeaders, AllowOrigin, Any, CorsLayer},
    set_header::SetResponseHeaderLayer,
    timeout::TimeoutLayer,
};
use tracing::{info, info_span, Instrument};

use super::context::RequestContext;

/// Default per-request timeout applied to all routes.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Response header echoing the correlation identifier.
pub const CORRELATION_HEADER: HeaderName = HeaderName::from_static("x-correlation-id");

const SERVER_PRODUCT: &str = "mobingi";
const SERVER_SERVICE: &str = "oath";

/// Value of the `Server` header for `version`.
pub fn server_name(version: &str) -> String {
    format!("{SERVER_PRODUCT}:{SERVER_SERVICE}:{version}")
}

/// Wrap `router` (routes and fallback) in the full instrumentation chain.
pub fn instrument(router: Router, version: &str, cors_origins: &[String]) -> Router {
    router.layer(
        ServiceBuilder::new()
            .layer(axum_middleware::from_fn(correlation))
            .layer(server_header(version))
            .layer(cors(cors_origins))
            .layer(axum_middleware::from_fn(diagnostics))
            .layer(TimeoutLayer::new(REQUEST_TIMEOUT)),
    )
}

/// Assign a correlation identifier and time the request.
///
/// Everything downstream runs inside a `request` span carrying
/// `correlation_id`, so every log line of the request can be grouped.
pub async fn correlation(mut req: Request, next: Next) -> Response {
    let ctx = RequestContext::new();
    let span = info_span!("request", correlation_id = %ctx.correlation_id());
    req.extensions_mut().insert(ctx.clone());

    async move {
        info!(method = %req.method(), path = %req.uri().path(), "-->");

        let mut response = next.run(req).await;

        info!(
            status = response.status().as_u16(),
            delta = ?ctx.elapsed(),
            "<--"
        );
        if let Ok(value) = HeaderValue::from_str(ctx.correlation_id()) {
            response.headers_mut().insert(CORRELATION_HEADER, value);
        }
        response
    }
    .instrument(span)
    .await
}

/// Log the caller's remote address.
pub async fn diagnostics(req: Request, next: Next) -> Response {
    let remote_addr = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.to_string())
        .unwrap_or_else(|| "unknown".to_owned());
    info!(remote_addr = %remote_addr, "remoteaddr");

    next.run(req).await
}

/// Tag every response with the fixed server identity.
pub fn server_header(version: &str) -> SetResponseHeaderLayer<HeaderValue> {
    let value = HeaderValue::from_str(&server_name(version))
        .unwrap_or_else(|_| HeaderValue::from_static("mobingi:oath"));
    SetResponseHeaderLayer::overriding(header::SERVER, value)
}

/// CORS policy.
///
/// With no configured origins any origin is allowed; otherwise only the
/// listed ones. Invalid origin strings are skipped.
pub fn cors(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::HEAD,
            Method::PUT,
            Method::PATCH,
            Method::POST,
            Method::DELETE,
        ])
        .allow_headers(AllowHeaders::mirror_request());

    if origins.is_empty() {
        return layer.allow_origin(Any);
    }

    let values: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| HeaderValue::from_str(o).ok())
        .collect();
    layer.allow_origin(AllowOrigin::list(values))
}
