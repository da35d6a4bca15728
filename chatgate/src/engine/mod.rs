// Engine integration
//
// Wires the gateway together for non-streaming and streaming requests:
// - Resolve the provider's upstream endpoint and credential from config
// - Forward to upstream
// - Streaming: tool call accumulation + release policy via StreamProcessor,
//   cancelled when the client response body is dropped
// - Non-streaming: decompress, then run the ResponseInterceptor

use flate2::read::{DeflateDecoder, GzDecoder};
use std::io::Read as _;

use crate::config::{Config, ProviderEndpoint};
use crate::policy::policy_from_config;
use crate::proxy::{upstream_path, GatewayError, Provider, ProxyRequest, ProxyResponse, UpstreamClient};
use crate::response::{PassthroughResponse, ResponseInterceptor};
use crate::stream::{StreamProcessor, ToolCallPolicy};
use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, HeaderMap, HeaderValue, Method, StatusCode};
use bytes::Bytes;
use futures_util::stream::{Stream, StreamExt};
use futures_util::TryStreamExt;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Request context for structured logging
// ---------------------------------------------------------------------------

struct RequestContext {
    request_id: String,
    provider_str: &'static str,
    model: String,
}

// ---------------------------------------------------------------------------
// Interfaces
// ---------------------------------------------------------------------------

/// Resolves the upstream endpoint for a provider.
pub trait UpstreamResolver: Send + Sync {
    fn endpoint(&self, provider: Provider) -> ProviderEndpoint;
}

/// Sends HTTP requests to upstream providers.
#[async_trait]
pub trait HttpSender: Send + Sync {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, HttpError>;
}

// ---------------------------------------------------------------------------
// Transport types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub timeout_ms: Option<u64>,
    pub stream: bool,
}

pub enum HttpBody {
    Full(Bytes),
    Stream(Pin<Box<dyn Stream<Item = Result<Bytes, HttpError>> + Send>>),
}

pub struct HttpResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: HttpBody,
}

#[derive(Debug, thiserror::Error)]
pub enum HttpError {
    #[error("upstream request failed: {0}")]
    Transport(String),
    #[error("upstream request timed out: {0}")]
    Timeout(String),
}

impl From<HttpError> for GatewayError {
    fn from(e: HttpError) -> Self {
        match e {
            HttpError::Timeout(msg) => GatewayError::UpstreamTimeout(msg),
            HttpError::Transport(msg) => GatewayError::UpstreamFailure(msg),
        }
    }
}

// ---------------------------------------------------------------------------
// Engine dependencies
// ---------------------------------------------------------------------------

pub struct EngineDeps {
    pub config: Arc<Config>,
    pub http: Arc<dyn HttpSender>,
    pub resolver: Arc<dyn UpstreamResolver>,
    pub policy: Arc<dyn ToolCallPolicy>,
    pub response_interceptor: Arc<dyn ResponseInterceptor>,
}

// ---------------------------------------------------------------------------
// EngineUpstreamClient
// ---------------------------------------------------------------------------

/// Upstream client that normalizes provider responses.
pub struct EngineUpstreamClient {
    deps: EngineDeps,
    processor: StreamProcessor,
}

impl EngineUpstreamClient {
    pub fn new_with(deps: EngineDeps) -> Self {
        let processor = StreamProcessor::new(
            deps.policy.clone(),
            deps.config.engine.stream_idle_timeout(),
        );
        Self { deps, processor }
    }
}

#[async_trait]
impl UpstreamClient for EngineUpstreamClient {
    async fn forward(
        &self,
        provider: Provider,
        request: ProxyRequest,
    ) -> Result<ProxyResponse, GatewayError> {
        let ctx = RequestContext {
            request_id: Uuid::new_v4().to_string(),
            provider_str: provider.as_str(),
            model: extract_model(&request.body),
        };

        let span = tracing::info_span!(
            "request",
            request_id = %ctx.request_id,
            provider = ctx.provider_str,
            model = %ctx.model,
        );

        self.forward_inner(provider, request, &ctx)
            .instrument(span)
            .await
    }
}

impl EngineUpstreamClient {
    async fn forward_inner(
        &self,
        provider: Provider,
        request: ProxyRequest,
        ctx: &RequestContext,
    ) -> Result<ProxyResponse, GatewayError> {
        let endpoint = self.deps.resolver.endpoint(provider);
        let stream = is_streaming_request(&request.body);
        let url = build_upstream_url(&endpoint, provider, &request);

        tracing::debug!(url = %url, stream, "forwarding request");

        let headers = forward_headers(&request.headers, &endpoint, stream)?;
        let http_req = HttpRequest {
            method: request.method.clone(),
            url,
            headers,
            body: request.body.clone(),
            timeout_ms: self.deps.config.engine.timeout_ms,
            stream,
        };

        let started = Instant::now();
        let upstream = self.deps.http.send(http_req).await.map_err(|e| {
            tracing::warn!(error = %e, "upstream request failed");
            GatewayError::from(e)
        })?;

        tracing::info!(
            status = upstream.status.as_u16(),
            stream,
            latency_ms = started.elapsed().as_secs_f64() * 1000.0,
            "upstream responded"
        );

        if stream && upstream.status.is_success() {
            // Content-Encoding on SSE is rare (providers send chunked transfer,
            // not gzip'd SSE). Log a warning if we see it, but pass through.
            if is_gzip(&upstream.headers) || is_deflate(&upstream.headers) {
                tracing::warn!(
                    request_id = %ctx.request_id,
                    "streaming response has Content-Encoding; passing through without decompression"
                );
            }
            return Ok(self.handle_streaming_response(upstream));
        }

        let status = upstream.status;
        let mut resp_headers = upstream.headers;
        let body_bytes = collect_body(upstream.body).await?;

        if !status.is_success() {
            tracing::info!(status = status.as_u16(), "passing upstream error through");
            return Ok(ProxyResponse::from_bytes(status, resp_headers, body_bytes));
        }

        // Decompress so the response interceptor can parse the JSON.
        // Strips Content-Encoding/Content-Length from forwarded headers.
        let body_bytes = maybe_decompress(&mut resp_headers, body_bytes)?;
        let body = self.handle_non_streaming_response(&mut resp_headers, body_bytes);

        Ok(ProxyResponse::from_bytes(status, resp_headers, body))
    }

    fn handle_streaming_response(&self, upstream: HttpResponse) -> ProxyResponse {
        let input: Pin<Box<dyn Stream<Item = Bytes> + Send>> = match upstream.body {
            HttpBody::Full(bytes) => Box::pin(futures_util::stream::once(async move { bytes })),
            HttpBody::Stream(s) => stream_body(s),
        };

        let cancel = CancellationToken::new();
        let processed = self.processor.process(input, cancel.clone());

        // Dropping the response body (client disconnect) cancels the task.
        let guard = cancel.drop_guard();
        let body_stream = processed.map(move |b| {
            let _ = &guard;
            Ok::<Bytes, std::io::Error>(b)
        });

        let mut headers = upstream.headers;
        strip_length_headers(&mut headers);

        ProxyResponse {
            status: upstream.status,
            headers,
            body: Body::from_stream(body_stream),
        }
    }

    fn handle_non_streaming_response(&self, headers: &mut HeaderMap, body: Bytes) -> Bytes {
        let json: serde_json::Value = match serde_json::from_slice(&body) {
            Ok(v) => v,
            Err(_) => {
                tracing::debug!("non-streaming body is not JSON; forwarding unchanged");
                return body;
            }
        };

        let intercepted = self.deps.response_interceptor.intercept_response(json);
        match serde_json::to_vec(&intercepted) {
            Ok(serialized) => {
                headers.remove(header::CONTENT_LENGTH);
                Bytes::from(serialized)
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to serialize intercepted response");
                body
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Config-based upstream resolver
// ---------------------------------------------------------------------------

pub struct ConfigUpstreamResolver {
    config: Arc<Config>,
}

impl ConfigUpstreamResolver {
    pub fn new(config: Arc<Config>) -> Self {
        Self { config }
    }
}

impl UpstreamResolver for ConfigUpstreamResolver {
    fn endpoint(&self, provider: Provider) -> ProviderEndpoint {
        match provider {
            Provider::OpenAi => self.config.providers.openai.clone(),
            Provider::Ollama => self.config.providers.ollama.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Reqwest HTTP sender
// ---------------------------------------------------------------------------

pub struct ReqwestHttpSender {
    client: reqwest::Client,
}

impl ReqwestHttpSender {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl HttpSender for ReqwestHttpSender {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, HttpError> {
        let mut req = self
            .client
            .request(request.method, &request.url)
            .headers(request.headers)
            .body(request.body);

        if let Some(timeout_ms) = request.timeout_ms {
            req = req.timeout(std::time::Duration::from_millis(timeout_ms));
        }

        let resp = req.send().await.map_err(classify_reqwest_error)?;

        let status = resp.status();
        let headers = resp.headers().clone();

        if request.stream {
            let stream = resp.bytes_stream().map_err(classify_reqwest_error);
            Ok(HttpResponse {
                status,
                headers,
                body: HttpBody::Stream(Box::pin(stream)),
            })
        } else {
            let body = resp.bytes().await.map_err(classify_reqwest_error)?;
            Ok(HttpResponse {
                status,
                headers,
                body: HttpBody::Full(body),
            })
        }
    }
}

fn classify_reqwest_error(e: reqwest::Error) -> HttpError {
    if e.is_timeout() {
        HttpError::Timeout(e.to_string())
    } else {
        HttpError::Transport(e.to_string())
    }
}

// ---------------------------------------------------------------------------
// Public factory for default engine client
// ---------------------------------------------------------------------------

pub fn build_engine_client(config: Arc<Config>) -> EngineUpstreamClient {
    let deps = EngineDeps {
        http: Arc::new(ReqwestHttpSender::new(reqwest::Client::new())),
        resolver: Arc::new(ConfigUpstreamResolver::new(config.clone())),
        policy: policy_from_config(&config.tools),
        response_interceptor: Arc::new(PassthroughResponse),
        config,
    };

    EngineUpstreamClient::new_with(deps)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Check if the response has gzip Content-Encoding.
fn is_gzip(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_ENCODING)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.eq_ignore_ascii_case("gzip"))
        .unwrap_or(false)
}

/// Check if the response has deflate Content-Encoding.
fn is_deflate(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_ENCODING)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.eq_ignore_ascii_case("deflate"))
        .unwrap_or(false)
}

/// Decompress a gzip-encoded body.
fn decompress_gzip(body: &Bytes) -> Result<Bytes, GatewayError> {
    let mut decoder = GzDecoder::new(&body[..]);
    let mut decompressed = Vec::new();
    decoder
        .read_to_end(&mut decompressed)
        .map_err(|e| GatewayError::UpstreamFailure(format!("gzip decompression failed: {e}")))?;
    Ok(Bytes::from(decompressed))
}

/// Decompress a deflate-encoded body.
fn decompress_deflate(body: &Bytes) -> Result<Bytes, GatewayError> {
    let mut decoder = DeflateDecoder::new(&body[..]);
    let mut decompressed = Vec::new();
    decoder
        .read_to_end(&mut decompressed)
        .map_err(|e| GatewayError::UpstreamFailure(format!("deflate decompression failed: {e}")))?;
    Ok(Bytes::from(decompressed))
}

/// Decompress body if Content-Encoding is set. Strips Content-Encoding and
/// Content-Length from headers (body size changed after decompression).
fn maybe_decompress(headers: &mut HeaderMap, body: Bytes) -> Result<Bytes, GatewayError> {
    let result = if is_gzip(headers) {
        decompress_gzip(&body)?
    } else if is_deflate(headers) {
        decompress_deflate(&body)?
    } else {
        return Ok(body);
    };
    headers.remove(header::CONTENT_ENCODING);
    headers.remove(header::CONTENT_LENGTH);
    Ok(result)
}

/// The body is re-framed, so upstream framing headers no longer apply.
fn strip_length_headers(headers: &mut HeaderMap) {
    headers.remove(header::CONTENT_LENGTH);
    headers.remove(header::TRANSFER_ENCODING);
    headers.remove(header::CONNECTION);
}

async fn collect_body(body: HttpBody) -> Result<Bytes, GatewayError> {
    match body {
        HttpBody::Full(b) => Ok(b),
        HttpBody::Stream(mut s) => {
            let mut collected = Vec::new();
            while let Some(chunk) = s.next().await {
                collected.extend_from_slice(&chunk?);
            }
            Ok(Bytes::from(collected))
        }
    }
}

/// Client headers minus hop-by-hop ones, with the provider credential
/// replacing any client-supplied Authorization.
///
/// Streaming requests ask for an uncompressed body; the stream processor
/// reads SSE lines straight off the wire.
fn forward_headers(
    client_headers: &HeaderMap,
    endpoint: &ProviderEndpoint,
    stream: bool,
) -> Result<HeaderMap, GatewayError> {
    // Host points at the gateway; reqwest sets the upstream one from the URL.
    let mut headers = client_headers.clone();
    headers.remove(header::HOST);
    headers.remove(header::CONTENT_LENGTH);
    headers.remove(header::CONNECTION);
    headers.remove(header::TRANSFER_ENCODING);
    headers.remove(header::ORIGIN);
    if stream {
        headers.insert(header::ACCEPT_ENCODING, HeaderValue::from_static("identity"));
    }

    if let Some(key) = &endpoint.api_key {
        let mut value = HeaderValue::from_str(&format!("Bearer {key}"))
            .map_err(|e| GatewayError::Internal(format!("invalid provider credential: {e}")))?;
        value.set_sensitive(true);
        headers.insert(header::AUTHORIZATION, value);
    }

    Ok(headers)
}

fn build_upstream_url(endpoint: &ProviderEndpoint, provider: Provider, req: &ProxyRequest) -> String {
    let base = endpoint.base_url.trim_end_matches('/');
    let path = upstream_path(provider, req.uri.path());
    match req.uri.query() {
        Some(query) => format!("{base}{path}?{query}"),
        None => format!("{base}{path}"),
    }
}

fn extract_model(body: &Bytes) -> String {
    serde_json::from_slice::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("model")?.as_str().map(String::from))
        .unwrap_or_default()
}

fn is_streaming_request(body: &Bytes) -> bool {
    let Ok(json) = serde_json::from_slice::<serde_json::Value>(body) else {
        return false;
    };
    json.get("stream")
        .and_then(|v| v.as_bool())
        .unwrap_or(false)
}

/// A mid-stream transport error ends the stream.
fn stream_body(
    stream: impl Stream<Item = Result<Bytes, HttpError>> + Send + 'static,
) -> Pin<Box<dyn Stream<Item = Bytes> + Send>> {
    Box::pin(
        stream
            .take_while(|item| {
                let ok = match item {
                    Ok(_) => true,
                    Err(e) => {
                        tracing::warn!(error = %e, "upstream stream failed; ending response");
                        false
                    }
                };
                futures_util::future::ready(ok)
            })
            .filter_map(|item| futures_util::future::ready(item.ok())),
    )
}
