//! Axum middleware used by the portal API.
//!
//! Stateless layers for request ids, timing and security headers, plus the
//! bearer-token gate in front of the router endpoints.
use std::{sync::Arc, time::Instant};

use axum::{
    extract::{MatchedPath, Request, State},
    http::{HeaderValue, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::Instrument;

use crate::{
    adapters::{api_error::ApiError, auth::TokenAuthority},
    metrics::{self, RequestTimer},
    tracing_setup::create_request_span,
};

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Reuse the caller's `X-Request-ID` or mint a uuid, run the request inside a
/// span carrying it, and echo it on the response.
pub async fn request_id_middleware(req: Request, next: Next) -> Response {
    let request_id = req
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty() && v.len() <= 128)
        .map(str::to_string)
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    let span = create_request_span(req.method().as_str(), req.uri().path(), &request_id);
    let mut response = next.run(req).instrument(span).await;

    if let Ok(header_value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, header_value);
    }

    response
}

/// Log completion of a request and record its metrics.
pub async fn request_timing_middleware(req: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = req.method().clone();
    let path = req
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| req.uri().path().to_string());
    let _timer = RequestTimer::new(&path, method.as_str());

    let response = next.run(req).await;
    let status = response.status();
    let duration = start.elapsed();

    let span = tracing::Span::current();
    span.record("http.status_code", status.as_u16());
    span.record("duration_ms", duration.as_millis() as u64);
    tracing::info!(
        method = %method,
        path = %path,
        status = status.as_u16(),
        elapsed = ?duration,
        "request completed"
    );
    metrics::increment_request_total(&path, method.as_str(), status.as_u16());

    response
}

/// Add common security hardening headers.
pub async fn security_headers_middleware(req: Request, next: Next) -> Response {
    let mut response = next.run(req).await;
    let headers = response.headers_mut();

    headers.insert(
        header::X_CONTENT_TYPE_OPTIONS,
        HeaderValue::from_static("nosniff"),
    );
    headers.insert(header::X_FRAME_OPTIONS, HeaderValue::from_static("DENY"));
    headers.insert(
        header::REFERRER_POLICY,
        HeaderValue::from_static("strict-origin-when-cross-origin"),
    );
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));

    response
}

/// Reject requests without a valid bearer token. The verified claims are
/// attached to the request extensions.
pub async fn require_bearer(
    State(authority): State<Arc<TokenAuthority>>,
    mut req: Request,
    next: Next,
) -> Response {
    let header = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());
    match authority.verify_header(header) {
        Ok(claims) => {
            tracing::debug!(user = %claims.username, role = %claims.role, "bearer token accepted");
            req.extensions_mut().insert(claims);
            next.run(req).await
        }
        Err(e) => {
            tracing::debug!(error = %e, "bearer token rejected");
            ApiError::from(e).into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::{
        Extension, Router,
        body::Body,
        http::{Request as HttpRequest, StatusCode},
        middleware,
        routing::get,
    };
    use tower::ServiceExt; // for oneshot

    use super::*;
    use crate::adapters::auth::{ADMIN_ROLE, Claims};

    fn app() -> Router {
        Router::new().route("/", get(|| async { "ok" }))
    }

    #[tokio::test]
    async fn test_security_headers_middleware() {
        let app = app().layer(middleware::from_fn(security_headers_middleware));

        let response = app
            .oneshot(HttpRequest::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let headers = response.headers();

        assert_eq!(headers.get("x-content-type-options").unwrap(), "nosniff");
        assert_eq!(headers.get("x-frame-options").unwrap(), "DENY");
        assert!(headers.contains_key("referrer-policy"));
    }

    #[tokio::test]
    async fn test_request_id_middleware() {
        let app = app().layer(middleware::from_fn(request_id_middleware));

        let response = app
            .clone()
            .oneshot(HttpRequest::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let request_id = response
            .headers()
            .get("X-Request-ID")
            .unwrap()
            .to_str()
            .unwrap();
        assert!(uuid::Uuid::parse_str(request_id).is_ok());

        let response = app
            .oneshot(
                HttpRequest::builder()
                    .uri("/")
                    .header("X-Request-ID", "bridge-42")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.headers().get("X-Request-ID").unwrap(), "bridge-42");
    }

    #[tokio::test]
    async fn test_timing_middleware_passes_through() {
        let app = app().layer(middleware::from_fn(request_timing_middleware));
        let response = app
            .oneshot(HttpRequest::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_require_bearer() {
        let authority = Arc::new(TokenAuthority::new("test-secret"));
        let app = Router::new()
            .route(
                "/",
                get(|Extension(claims): Extension<Claims>| async move { claims.username }),
            )
            .layer(middleware::from_fn_with_state(
                authority.clone(),
                require_bearer,
            ));

        let response = app
            .clone()
            .oneshot(HttpRequest::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let token = authority
            .issue("captain", ADMIN_ROLE, Duration::from_secs(60))
            .unwrap();
        let response = app
            .oneshot(
                HttpRequest::builder()
                    .uri("/")
                    .header("Authorization", format!("Bearer {token}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
