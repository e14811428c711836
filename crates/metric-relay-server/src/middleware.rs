//! Request middleware: logging, trusted-subnet enforcement, and the
//! content-type/gzip layer.
//!
//! Response compression is handled by `tower_http::CompressionLayer`
//! in the router; this module owns the request side.

use crate::AppState;
use axum::body::{Body, Bytes};
use axum::extract::{Request, State};
use axum::http::header::{CONTENT_ENCODING, CONTENT_LENGTH, CONTENT_TYPE};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use flate2::read::GzDecoder;
use ipnet::IpNet;
use metric_relay_core::REAL_IP_HEADER;
use std::io::Read;
use std::net::IpAddr;
use std::time::Instant;
use tracing::{info, warn};

/// Largest request body the decompression layer will buffer.
const MAX_BODY_SIZE: usize = 10 * 1024 * 1024;

// ============================================================================
// Request Logging
// ============================================================================

/// Log method, URI, status, duration, and response bytes per request.
pub async fn request_logging(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let start = Instant::now();

    let response = next.run(request).await;

    let bytes_written = response
        .headers()
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse::<u64>().ok())
        .unwrap_or(0);

    info!(
        method = %method,
        uri = %uri,
        status = response.status().as_u16(),
        duration_ms = start.elapsed().as_millis() as u64,
        bytes_written,
        "request handled"
    );

    response
}

// ============================================================================
// Trusted Subnet
// ============================================================================

/// When a trusted subnet is configured, require `X-Real-IP` to parse
/// and fall inside it: 400 when the CIDR or IP is unusable, 403 when
/// the address is outside.
pub async fn trusted_subnet(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let Some(cidr) = &state.trusted_subnet else {
        return next.run(request).await;
    };

    let Ok(subnet) = cidr.parse::<IpNet>() else {
        warn!(cidr, "configured trusted subnet does not parse");
        return StatusCode::BAD_REQUEST.into_response();
    };

    let client_ip = request
        .headers()
        .get(REAL_IP_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|raw| raw.parse::<IpAddr>().ok());
    let Some(client_ip) = client_ip else {
        return StatusCode::BAD_REQUEST.into_response();
    };

    if !subnet.contains(&client_ip) {
        warn!(%client_ip, cidr, "request from outside the trusted subnet");
        return StatusCode::FORBIDDEN.into_response();
    }

    next.run(request).await
}

// ============================================================================
// Content Type + Request Gzip
// ============================================================================

/// Restrict content types and transparently decompress gzip bodies.
///
/// Requests carrying a `Content-Type` other than `application/json` or
/// `text/html` receive 400. When `Content-Encoding: gzip` is present
/// the body is decompressed before the handler sees it and the
/// encoding headers are dropped.
pub async fn decompress_request(request: Request, next: Next) -> Response {
    for value in request.headers().get_all(CONTENT_TYPE) {
        let acceptable = value
            .to_str()
            .is_ok_and(|ct| ct.contains("application/json") || ct.contains("text/html"));
        if !acceptable {
            return StatusCode::BAD_REQUEST.into_response();
        }
    }

    let is_gzip = request
        .headers()
        .get_all(CONTENT_ENCODING)
        .iter()
        .any(|v| v.to_str().is_ok_and(|enc| enc.contains("gzip")));
    if !is_gzip {
        return next.run(request).await;
    }

    let (mut parts, body) = request.into_parts();
    let compressed = match axum::body::to_bytes(body, MAX_BODY_SIZE).await {
        Ok(bytes) => bytes,
        Err(err) => {
            warn!(error = %err, "cannot buffer gzip request body");
            return StatusCode::BAD_REQUEST.into_response();
        }
    };

    let decoded = match gzip_decode(&compressed) {
        Ok(decoded) => decoded,
        Err(err) => {
            warn!(error = %err, "request body is not valid gzip");
            return StatusCode::BAD_REQUEST.into_response();
        }
    };

    parts.headers.remove(CONTENT_ENCODING);
    parts.headers.remove(CONTENT_LENGTH);
    let request = Request::from_parts(parts, Body::from(decoded));

    next.run(request).await
}

fn gzip_decode(compressed: &Bytes) -> std::io::Result<Vec<u8>> {
    let mut decoder = GzDecoder::new(compressed.as_ref());
    let mut decoded = Vec::new();
    decoder.read_to_end(&mut decoded)?;
    Ok(decoded)
}

#[cfg(test)]
#[path = "middleware_tests.rs"]
mod tests;
