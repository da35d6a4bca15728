// Copyright 2026 The Chatgate Project
// SPDX-License-Identifier: Apache-2.0

// HTTP surface
//
// Responsibilities:
// - Provider detection from request path
// - Request validation (non-empty JSON body)
// - Request forwarding via injected UpstreamClient trait
// - Normalized JSON error bodies
// - Optional CORS for a configured origin
// - Heartbeat endpoint
// - 404 for unknown paths

use axum::body::Body;
use axum::extract::State;
use axum::http::{header, HeaderMap, HeaderValue, Method, Request, Response, StatusCode, Uri};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use bytes::Bytes;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

/// Largest request body accepted from clients.
const MAX_REQUEST_BODY_BYTES: usize = 10 * 1024 * 1024;

// ---------------------------------------------------------------------------
// Domain types
// ---------------------------------------------------------------------------

/// Upstream family selected by the request path.
///
/// Both speak the OpenAI chat completions wire format; they differ only in
/// where requests are sent and which credential is attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    OpenAi,
    Ollama,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::OpenAi => "openai",
            Provider::Ollama => "ollama",
        }
    }

    /// Path prefix the gateway mounts this provider under.
    fn route_prefix(&self) -> &'static str {
        match self {
            Provider::OpenAi => "",
            Provider::Ollama => "/ollama",
        }
    }
}

/// Inbound request data forwarded to the upstream client.
#[derive(Debug, Clone)]
pub struct ProxyRequest {
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// Response to hand back to the client.
#[derive(Debug)]
pub struct ProxyResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Body,
}

impl ProxyResponse {
    pub fn from_bytes(status: StatusCode, headers: HeaderMap, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers,
            body: Body::from(body.into()),
        }
    }
}

/// Errors surfaced by the gateway itself (never by the upstream).
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("upstream request failed: {0}")]
    UpstreamFailure(String),

    #[error("upstream request timed out: {0}")]
    UpstreamTimeout(String),

    #[error("request body is not valid JSON: {0}")]
    MalformedJson(String),

    #[error("request body is empty")]
    EmptyBody,

    #[error("failed to read request body: {0}")]
    BodyRead(String),

    #[error("no route for {0}")]
    NotFound(String),

    #[error("method {0} not allowed")]
    MethodNotAllowed(Method),

    #[error("internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::UpstreamFailure(_) => StatusCode::BAD_GATEWAY,
            GatewayError::UpstreamTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            GatewayError::MalformedJson(_)
            | GatewayError::EmptyBody
            | GatewayError::BodyRead(_) => StatusCode::BAD_REQUEST,
            GatewayError::NotFound(_) => StatusCode::NOT_FOUND,
            GatewayError::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            GatewayError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to show clients. Upstream details stay in the logs.
    fn public_message(&self) -> String {
        match self {
            GatewayError::UpstreamFailure(_) => "upstream request failed".to_string(),
            GatewayError::UpstreamTimeout(_) => "upstream request timed out".to_string(),
            GatewayError::MalformedJson(_) => "request body is not valid JSON".to_string(),
            GatewayError::Internal(_) => "internal server error".to_string(),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::warn!(status = status.as_u16(), error = %self, "request failed");
        } else {
            tracing::debug!(status = status.as_u16(), error = %self, "request rejected");
        }
        error_response(status, &self.public_message())
    }
}

/// Build the normalized `{"error":{"message","status"}}` body.
pub fn error_response(status: StatusCode, message: &str) -> axum::response::Response {
    let body = serde_json::json!({
        "error": {
            "message": message,
            "status": status.as_u16(),
        }
    });
    (status, Json(body)).into_response()
}

// ---------------------------------------------------------------------------
// Trait: UpstreamClient (dependency injection point)
// ---------------------------------------------------------------------------

/// Abstraction over the client that forwards requests to LLM providers.
///
/// Implementations must be Send + Sync so they can be shared across request
/// handlers via `Arc`.
#[async_trait::async_trait]
pub trait UpstreamClient: Send + Sync {
    async fn forward(
        &self,
        provider: Provider,
        request: ProxyRequest,
    ) -> Result<ProxyResponse, GatewayError>;
}

// ---------------------------------------------------------------------------
// Provider detection
// ---------------------------------------------------------------------------

/// Detect the provider from the request path.
///
/// Returns `None` for paths that do not map to a known provider.
pub fn detect_provider(path: &str) -> Option<Provider> {
    match path {
        "/v1/chat/completions" => Some(Provider::OpenAi),
        "/ollama/v1/chat/completions" => Some(Provider::Ollama),
        _ => None,
    }
}

/// Path to request upstream, with the provider's mount prefix removed.
pub fn upstream_path<'a>(provider: Provider, path: &'a str) -> &'a str {
    path.strip_prefix(provider.route_prefix()).unwrap_or(path)
}

// ---------------------------------------------------------------------------
// Shared application state
// ---------------------------------------------------------------------------

/// Shared state injected into axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub upstream: Arc<dyn UpstreamClient>,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// Heartbeat endpoint: GET /v1/heartbeat -> 200 OK
pub async fn heartbeat() -> StatusCode {
    StatusCode::OK
}

/// Proxy handler for provider paths.
///
/// Validates the request, detects the provider, forwards via the injected
/// upstream client, and returns the response.
pub async fn proxy_handler(
    State(state): State<AppState>,
    request: Request<Body>,
) -> Result<Response<Body>, GatewayError> {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let headers = request.headers().clone();

    let provider =
        detect_provider(uri.path()).ok_or_else(|| GatewayError::NotFound(uri.path().to_string()))?;

    if method != Method::POST {
        return Err(GatewayError::MethodNotAllowed(method));
    }

    let body = axum::body::to_bytes(request.into_body(), MAX_REQUEST_BODY_BYTES)
        .await
        .map_err(|e| GatewayError::BodyRead(e.to_string()))?;

    if body.is_empty() {
        return Err(GatewayError::EmptyBody);
    }
    if let Err(e) = serde_json::from_slice::<serde_json::Value>(&body) {
        return Err(GatewayError::MalformedJson(e.to_string()));
    }

    let proxy_req = ProxyRequest {
        method,
        uri,
        headers,
        body,
    };

    let resp = state.upstream.forward(provider, proxy_req).await?;

    let mut response = Response::builder().status(resp.status);
    if let Some(h) = response.headers_mut() {
        *h = resp.headers;
    }
    response
        .body(resp.body)
        .map_err(|e| GatewayError::Internal(e.to_string()))
}

/// Any request no route claims.
async fn not_found(uri: Uri) -> GatewayError {
    GatewayError::NotFound(uri.path().to_string())
}

// ---------------------------------------------------------------------------
// Router construction
// ---------------------------------------------------------------------------

/// Build the axum router with all proxy routes and the heartbeat endpoint.
///
/// The upstream client is injected; no side effects, no hard-coded clients.
/// A CORS layer is added only when an origin is given (`*` allows any).
pub fn build_router(upstream: Arc<dyn UpstreamClient>, cors_origin: Option<&str>) -> Router {
    let state = AppState { upstream };

    let router = Router::new()
        .route("/v1/heartbeat", get(heartbeat))
        .route("/v1/chat/completions", axum::routing::any(proxy_handler))
        .route(
            "/ollama/v1/chat/completions",
            axum::routing::any(proxy_handler),
        )
        .fallback(not_found)
        .with_state(state);

    match cors_origin.and_then(cors_layer) {
        Some(layer) => router.layer(layer),
        None => router,
    }
}

fn cors_layer(origin: &str) -> Option<CorsLayer> {
    let allow_origin = if origin == "*" {
        AllowOrigin::any()
    } else {
        match HeaderValue::from_str(origin) {
            Ok(value) => AllowOrigin::exact(value),
            Err(e) => {
                tracing::warn!(origin = origin, error = %e, "invalid CORS origin; CORS disabled");
                return None;
            }
        }
    };

    Some(
        CorsLayer::new()
            .allow_origin(allow_origin)
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers(Any)
            .expose_headers([header::CONTENT_TYPE]),
    )
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
