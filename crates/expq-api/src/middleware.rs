//! Trace id propagation.
//!
//! A caller-supplied `x-trace-id` is kept, otherwise a fresh uuid is minted.
//! Handlers read it from request extensions; it is echoed on the response.
use axum::http::{HeaderName, HeaderValue, Request};
use axum::middleware::Next;
use axum::{body::Body, response::Response};

pub const TRACE_HEADER: HeaderName = HeaderName::from_static("x-trace-id");

#[derive(Debug, Clone)]
pub struct TraceId(pub String);

pub async fn trace_id(mut req: Request<Body>, next: Next) -> Response {
    let id = req
        .headers()
        .get(&TRACE_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty() && v.len() <= 128)
        .map(str::to_string)
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    req.extensions_mut().insert(TraceId(id.clone()));
    let mut response = next.run(req).await;
    if let Ok(value) = HeaderValue::from_str(&id) {
        response.headers_mut().insert(TRACE_HEADER, value);
    }
    response
}
