use axum::{
    body::{to_bytes, Body, Bytes},
    http::{header::CONTENT_LENGTH, Request, StatusCode},
    middleware::Next,
    response::Response,
};
use std::time::Instant;

use crate::middleware::request_id::RequestId;

const MAX_BUFFERED_BODY_BYTES: usize = 64 * 1024;
const MAX_LOGGED_BODY_BYTES: usize = 2048;

/// Logs every 4xx/5xx response with its body preview.
///
/// The body is buffered so it can still be forwarded to the caller; ingest
/// error bodies are small JSON documents. Client errors log at `warn`,
/// server errors at `error`.
pub async fn log_error_responses(req: Request<Body>, next: Next) -> Response {
    let mut event = ErrorEvent {
        method: req.method().to_string(),
        uri: req.uri().to_string(),
        request_id: req.extensions().get::<RequestId>().map(|id| id.0.clone()),
        status: StatusCode::OK,
        latency_ms: 0,
    };
    let start = Instant::now();

    let response = next.run(req).await;
    event.status = response.status();
    if !(event.status.is_client_error() || event.status.is_server_error()) {
        return response;
    }
    event.latency_ms = start.elapsed().as_millis() as u64;

    let (mut parts, body) = response.into_parts();
    match to_bytes(body, MAX_BUFFERED_BODY_BYTES).await {
        Ok(bytes) => {
            event.emit(&preview(&bytes));
            Response::from_parts(parts, Body::from(bytes))
        }
        Err(err) => {
            parts.headers.remove(CONTENT_LENGTH);
            event.emit(&format!("<unreadable body: {}>", err));
            Response::from_parts(parts, Body::empty())
        }
    }
}

struct ErrorEvent {
    method: String,
    uri: String,
    request_id: Option<String>,
    status: StatusCode,
    latency_ms: u64,
}

impl ErrorEvent {
    fn emit(&self, body: &str) {
        let status = self.status.as_u16();
        let request_id = self.request_id.as_deref().unwrap_or("-");
        if self.status.is_server_error() {
            tracing::error!(
                status,
                method = %self.method,
                uri = %self.uri,
                request_id,
                latency_ms = self.latency_ms,
                body,
                "Request completed with error status"
            );
        } else {
            tracing::warn!(
                status,
                method = %self.method,
                uri = %self.uri,
                request_id,
                latency_ms = self.latency_ms,
                body,
                "Request completed with error status"
            );
        }
    }
}

fn preview(bytes: &Bytes) -> String {
    if bytes.len() > MAX_LOGGED_BODY_BYTES {
        format!(
            "{}... (truncated, {} bytes total)",
            String::from_utf8_lossy(&bytes[..MAX_LOGGED_BODY_BYTES]),
            bytes.len()
        )
    } else {
        String::from_utf8_lossy(bytes).to_string()
    }
}
