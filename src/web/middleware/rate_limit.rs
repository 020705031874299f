//! Per-client admission middleware.
//!
//! The client identity is the peer IP address. Forwarding headers are only
//! honoured when `web.trust_forwarded_headers` is set, since any client can
//! forge them.

use axum::{
    body::Body,
    extract::ConnectInfo,
    http::Request,
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::{net::SocketAddr, sync::Arc};

use crate::rate_limit::{LimiterRegistry, RateLimitResult};
use crate::web::error::ApiError;

/// Identity used when the peer address is unavailable.
pub const UNKNOWN_CLIENT: &str = "unknown";

/// Extract client IP from request.
pub fn client_identity(req: &Request<Body>, trust_forwarded: bool) -> String {
    if trust_forwarded {
        if let Some(forwarded) = req
            .headers()
            .get("X-Forwarded-For")
            .and_then(|v| v.to_str().ok())
        {
            if let Some(ip) = forwarded.split(',').next().map(str::trim) {
                if !ip.is_empty() {
                    return ip.to_string();
                }
            }
        }

        if let Some(real_ip) = req
            .headers()
            .get("X-Real-IP")
            .and_then(|v| v.to_str().ok())
        {
            return real_ip.trim().to_string();
        }
    }

    if let Some(ConnectInfo(addr)) = req.extensions().get::<ConnectInfo<SocketAddr>>() {
        return addr.ip().to_string();
    }

    UNKNOWN_CLIENT.to_string()
}

/// Rate limiting middleware for relay endpoints.
pub async fn relay_rate_limit(
    limiters: Arc<LimiterRegistry>,
    trust_forwarded: bool,
    req: Request<Body>,
    next: Next,
) -> Response {
    let ip = client_identity(&req, trust_forwarded);

    if let RateLimitResult::Denied { retry_after } = limiters.check(&ip) {
        tracing::warn!(ip = %ip, "Rate limit exceeded");
        return ApiError::too_many_requests(retry_after).into_response();
    }

    next.run(req).await
}
