use axum::{
    extract::Request,
    http::{header::HeaderName, HeaderMap, HeaderValue},
    middleware::Next,
    response::Response,
};
use tracing::Instrument;
use uuid::Uuid;

const REQUEST_ID_HEADER: &str = "x-request-id";
const CORRELATION_ID_HEADER: &str = "x-correlation-id";
const MAX_REQUEST_ID_LENGTH: usize = 128;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestId(pub String);

impl RequestId {
    /// Reuses a caller-supplied id when it is short printable ASCII, otherwise
    /// mints a fresh UUID.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let supplied = [REQUEST_ID_HEADER, CORRELATION_ID_HEADER]
            .into_iter()
            .filter_map(|name| headers.get(name))
            .filter_map(|v| v.to_str().ok())
            .map(str::trim)
            .find(|v| {
                !v.is_empty()
                    && v.len() <= MAX_REQUEST_ID_LENGTH
                    && v.chars().all(|c| c.is_ascii_graphic())
            });

        match supplied {
            Some(id) => RequestId(id.to_string()),
            None => RequestId(Uuid::new_v4().to_string()),
        }
    }
}

/// Tags the request with an id, runs the rest of the stack inside a span
/// carrying it, and echoes it back in `x-request-id`.
pub async fn request_id(mut req: Request, next: Next) -> Response {
    let request_id = RequestId::from_headers(req.headers());
    req.extensions_mut().insert(request_id.clone());

    let span = tracing::info_span!(
        "request",
        request_id = %request_id.0,
        method = %req.method(),
        path = %req.uri().path()
    );
    let mut response = next.run(req).instrument(span).await;

    if let Ok(value) = HeaderValue::from_str(&request_id.0) {
        response
            .headers_mut()
            .insert(HeaderName::from_static(REQUEST_ID_HEADER), value);
    }

    response
}
