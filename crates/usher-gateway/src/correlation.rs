// SPDX-FileCopyrightText: 2026 Usher Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Correlation-id middleware.
//!
//! Every response carries `x-correlation-id`: the caller's, when they
//! sent one, or a fresh UUID. Support requests quote this id, so it must
//! be present on errors above all.

use axum::{
    extract::Request,
    http::{HeaderName, HeaderValue},
    middleware::Next,
    response::Response,
};
use uuid::Uuid;

pub const CORRELATION_HEADER: HeaderName = HeaderName::from_static("x-correlation-id");
/// Set on webhook error responses so gateway-side dashboards can group
/// rejections without parsing bodies.
pub const ERROR_TYPE_HEADER: HeaderName = HeaderName::from_static("x-error-type");

pub async fn correlation_middleware(request: Request, next: Next) -> Response {
    let id = request
        .headers()
        .get(&CORRELATION_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty() && v.len() <= 128)
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let mut response = next.run(request).await;
    if let Ok(value) = HeaderValue::from_str(&id) {
        response.headers_mut().insert(CORRELATION_HEADER, value);
    }
    response
}
