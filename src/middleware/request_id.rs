use axum::{
    body::Body,
    extract::Request,
    http::{HeaderValue, Request as HttpRequest},
    middleware::Next,
    response::Response,
};
use uuid::Uuid;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Longest caller-supplied id we propagate
const MAX_REQUEST_ID_LEN: usize = 128;

/// Correlation id of the current request, stored in request extensions
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestId(pub String);

impl RequestId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Accepts an upstream id if it is short, printable ASCII
    pub fn from_header(value: &HeaderValue) -> Option<Self> {
        let value = value.to_str().ok()?.trim();
        let valid = !value.is_empty()
            && value.len() <= MAX_REQUEST_ID_LEN
            && value.bytes().all(|b| b.is_ascii_graphic());
        valid.then(|| Self(value.to_string()))
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Propagates the caller's `x-request-id` (or mints one) and echoes it back
pub async fn request_id_middleware(mut request: Request, next: Next) -> Response {
    let request_id = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(RequestId::from_header)
        .unwrap_or_else(RequestId::generate);

    request.extensions_mut().insert(request_id.clone());

    let mut response = next.run(request).await;

    if let Ok(value) = HeaderValue::from_str(&request_id.0) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}

/// Span for `TraceLayer`; the path excludes the query string
pub fn make_span_with_request_id(request: &HttpRequest<Body>) -> tracing::Span {
    let request_id = request
        .extensions()
        .get::<RequestId>()
        .map(|id| id.0.as_str())
        .unwrap_or("unknown");

    tracing::info_span!(
        "http_request",
        method = %request.method(),
        path = %request.uri().path(),
        request_id = %request_id,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_upstream_id() {
        let value = HeaderValue::from_static("edge-7f3a2c");
        assert_eq!(
            RequestId::from_header(&value),
            Some(RequestId("edge-7f3a2c".to_string()))
        );
    }

    #[test]
    fn test_rejects_unusable_ids() {
        assert!(RequestId::from_header(&HeaderValue::from_static("")).is_none());
        assert!(RequestId::from_header(&HeaderValue::from_static("has space")).is_none());
        let long = "a".repeat(MAX_REQUEST_ID_LEN + 1);
        assert!(RequestId::from_header(&HeaderValue::from_str(&long).unwrap()).is_none());
    }
}
