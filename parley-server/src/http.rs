// Credential mediator HTTP surface.
//
// Browser and terminal clients call `<mount>/<path>`; the request is
// forwarded to `<upstream>/<path>` with the provider API key attached.
// The key never leaves this process.

use crate::config::MediatorConfig;
use crate::error::MediatorError;
use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap, HeaderValue, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::{any, get},
    Json, Router,
};
use percent_encoding::percent_decode_str;
use serde_json::json;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tracing::{debug, info, warn};

struct Upstream {
    mount: String,
    base_url: String,
    api_key: String,
    api_key_header: String,
    max_response_bytes: usize,
}

#[derive(Clone)]
pub struct MediatorState {
    client: reqwest::Client,
    upstream: Arc<Upstream>,
}

impl MediatorState {
    pub fn new(config: &MediatorConfig) -> Result<Self, MediatorError> {
        config.validate()?;
        let client = reqwest::Client::builder()
            .timeout(config.upstream.timeout())
            .build()
            .map_err(|e| MediatorError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            upstream: Arc::new(Upstream {
                mount: config.mount.clone(),
                base_url: config.upstream.base_url.trim_end_matches('/').to_string(),
                api_key: config.upstream.api_key.clone(),
                api_key_header: config.upstream.api_key_header.clone(),
                max_response_bytes: config.upstream.max_response_bytes,
            }),
        })
    }
}

/// Create the mediator router
pub fn create_router(config: &MediatorConfig) -> Result<Router, MediatorError> {
    let state = MediatorState::new(config)?;
    let forward_route = format!("{}/*path", config.mount);

    Ok(Router::new()
        .route("/health", get(health_handler))
        .route(&forward_route, any(forward_handler))
        .layer(cors_layer(config)?)
        .with_state(state))
}

fn cors_layer(config: &MediatorConfig) -> Result<CorsLayer, MediatorError> {
    let origins = if config.cors.allowed_origins.is_empty() {
        AllowOrigin::from(Any)
    } else {
        let parsed = config
            .cors
            .allowed_origins
            .iter()
            .map(|o| {
                HeaderValue::from_str(o)
                    .map_err(|_| MediatorError::Config(format!("invalid CORS origin: {}", o)))
            })
            .collect::<Result<Vec<_>, _>>()?;
        AllowOrigin::list(parsed)
    };

    Ok(CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT]))
}

async fn health_handler() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

/// Map `<mount>/<path>?<query>` onto the upstream, keeping the path
/// exactly as the client encoded it. The resolved URL must stay under the
/// upstream base path once dot segments are normalized.
fn upstream_url(base: &str, mount: &str, uri: &Uri) -> Result<String, MediatorError> {
    let traversal = || MediatorError::BadRequest("path traversal rejected".to_string());

    let path = uri.path().strip_prefix(mount).unwrap_or_default();
    if path
        .split('/')
        .any(|segment| percent_decode_str(segment).decode_utf8_lossy() == "..")
    {
        return Err(traversal());
    }
    let mut url = format!("{}/{}", base, path.trim_start_matches('/'));
    if let Some(query) = uri.query() {
        url.push('?');
        url.push_str(query);
    }

    let base_path = url::Url::parse(base)
        .map_err(|e| MediatorError::Config(format!("upstream.base_url: {}", e)))?
        .path()
        .trim_end_matches('/')
        .to_string();
    let resolved = url::Url::parse(&url)
        .map_err(|e| MediatorError::BadRequest(format!("invalid path: {}", e)))?;
    let inside = resolved.path() == base_path
        || resolved.path().starts_with(&format!("{}/", base_path));
    if !inside {
        return Err(traversal());
    }
    Ok(resolved.into())
}

async fn forward_handler(
    State(state): State<MediatorState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, MediatorError> {
    let url = upstream_url(&state.upstream.base_url, &state.upstream.mount, &uri)?;
    let path = uri.path();
    let upstream_method = reqwest::Method::from_bytes(method.as_str().as_bytes())
        .map_err(|_| MediatorError::BadRequest(format!("unsupported method: {}", method)))?;

    debug!(method = %method, path = %path, "forwarding to provider");

    // only the key and content negotiation go upstream; client headers
    // cannot override the credential
    let mut request = state
        .client
        .request(upstream_method, &url)
        .header(state.upstream.api_key_header.as_str(), state.upstream.api_key.as_str())
        .header("Content-Type", "application/json");
    if let Some(accept) = headers.get(header::ACCEPT).and_then(|v| v.to_str().ok()) {
        request = request.header("Accept", accept);
    }
    if !body.is_empty() {
        request = request.body(body.to_vec());
    }

    let mut response = request.send().await.map_err(|e| {
        warn!(path = %path, error = %e, "provider unreachable");
        MediatorError::Upstream(e.to_string())
    })?;

    let status = StatusCode::from_u16(response.status().as_u16())
        .map_err(|e| MediatorError::Upstream(format!("invalid upstream status: {}", e)))?;
    let content_type = response
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| HeaderValue::from_str(v).ok());

    let limit = state.upstream.max_response_bytes;
    let too_large = || MediatorError::Upstream("upstream response too large".to_string());
    if response.content_length().is_some_and(|length| length as usize > limit) {
        return Err(too_large());
    }
    // chunked bodies carry no length, so count what is actually read
    let mut bytes = Vec::new();
    while let Some(chunk) = response
        .chunk()
        .await
        .map_err(|e| MediatorError::Upstream(format!("failed to read upstream body: {}", e)))?
    {
        if bytes.len() + chunk.len() > limit {
            warn!(path = %path, limit, "upstream body over limit");
            return Err(too_large());
        }
        bytes.extend_from_slice(&chunk);
    }

    info!(method = %method, path = %path, status = status.as_u16(), "forwarded");

    let mut reply = (status, bytes).into_response();
    if let Some(content_type) = content_type {
        reply.headers_mut().insert(header::CONTENT_TYPE, content_type);
    }
    Ok(reply)
}
