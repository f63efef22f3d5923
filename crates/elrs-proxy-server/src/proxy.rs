//! CORS forwarding proxy
//!
//! A request for `/<host[:port]>/<path>?<query>` is forwarded to
//! `<scheme>://<host[:port]>/<path>?<query>` and the answer relayed back, so a
//! browser page on another origin can talk to devices that do not speak CORS.
//!
//! Dispatch is on the inbound method:
//! - `OPTIONS`: answered locally as a CORS preflight, nothing is forwarded
//! - `GET`: forwarded with only `Content-Type`
//! - `POST`: `multipart/form-data` bodies are decoded and re-encoded; any
//!   other body is forwarded byte for byte with its `Content-Type`
//!
//! Which hosts may be contacted is governed by [`ForwardPolicy`]. With
//! `ForwardPolicy::Any` this is an open proxy to anything the client names.
//!
//! [`ForwardPolicy`]: elrs_proxy_core::ForwardPolicy

use axum::{
    extract::{FromRequest, Multipart, Request, State},
    http::{header, HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
};
use elrs_proxy_core::Config;
use reqwest::Url;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::GatewayError;
use crate::state::AppState;
use crate::upstream::{
    FilePart, FormData, UpstreamBody, UpstreamRequest, UpstreamResponse, UPLOAD_FIELD,
};

/// Methods advertised in preflight responses
pub const ALLOW_METHODS: &str = "GET, POST, OPTIONS";

/// Request headers a cross-origin page may send
pub const ALLOW_HEADERS: &str =
    "Content-Type, Access-Control-Allow-Headers, Authorization, X-Requested-With, X-FileSize";

/// How long browsers may cache a preflight answer, in seconds
pub const PREFLIGHT_MAX_AGE: &str = "86400";

/// Inbound methods the proxy understands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxyMethod {
    Preflight,
    Get,
    Post,
}

impl ProxyMethod {
    pub fn from_method(method: &Method) -> Option<Self> {
        match *method {
            Method::OPTIONS => Some(ProxyMethod::Preflight),
            Method::GET => Some(ProxyMethod::Get),
            Method::POST => Some(ProxyMethod::Post),
            _ => None,
        }
    }
}

/// Fallback handler for every path other than `/mdns`
pub async fn proxy_handler(State(state): State<Arc<AppState>>, request: Request) -> Response {
    match ProxyMethod::from_method(request.method()) {
        Some(ProxyMethod::Preflight) => preflight(&state.config),
        Some(ProxyMethod::Get) => forward_get(&state, request).await.into_response(),
        Some(ProxyMethod::Post) => forward_post(&state, request).await.into_response(),
        None => GatewayError::MethodNotAllowed(request.method().clone()).into_response(),
    }
}

/// Answer a CORS preflight without contacting any host
pub fn preflight(config: &Config) -> Response {
    let status = StatusCode::from_u16(config.preflight_status).unwrap_or(StatusCode::OK);
    let mut response = status.into_response();
    insert_cors_headers(response.headers_mut());
    response.headers_mut().insert(
        header::ACCESS_CONTROL_MAX_AGE,
        HeaderValue::from_static(PREFLIGHT_MAX_AGE),
    );
    response
}

/// Forward a GET, passing along only `Content-Type`
pub async fn forward_get(state: &AppState, request: Request) -> Result<Response, GatewayError> {
    let url = authorized_target(state, request.headers(), request.uri())?;

    let outbound = UpstreamRequest {
        method: Method::GET,
        url: url.to_string(),
        headers: content_type_only(request.headers()),
        body: UpstreamBody::Empty,
    };

    let response = send(state, outbound).await?;
    Ok(relay(response))
}

/// Forward a POST in raw-body or multipart mode
pub async fn forward_post(state: &AppState, request: Request) -> Result<Response, GatewayError> {
    let url = authorized_target(state, request.headers(), request.uri())?;

    let (headers, body) = if is_multipart(request.headers()) {
        let headers = form_headers(request.headers());
        let form = read_form(request).await?;
        (headers, UpstreamBody::Form(form))
    } else {
        let headers = content_type_only(request.headers());
        let bytes = axum::body::to_bytes(request.into_body(), usize::MAX)
            .await
            .map_err(|e| GatewayError::malformed(format!("failed to read request body: {}", e)))?;
        (headers, UpstreamBody::Raw(bytes))
    };

    let outbound = UpstreamRequest {
        method: Method::POST,
        url: url.to_string(),
        headers,
        body,
    };

    let response = send(state, outbound).await?;
    let mut response = relay(response);
    insert_cors_headers(response.headers_mut());
    Ok(response)
}

async fn send(state: &AppState, request: UpstreamRequest) -> Result<UpstreamResponse, GatewayError> {
    debug!("Forwarding {} to {}", request.method, request.url);
    let url = request.url.clone();
    state.upstream.send(request).await.map_err(|e| {
        warn!("Forwarding to {} failed: {}", url, e);
        e
    })
}

/// Copy status, content type, redirect target and body of the upstream answer
fn relay(upstream: UpstreamResponse) -> Response {
    let mut response = (upstream.status, upstream.body).into_response();
    match upstream.content_type {
        Some(content_type) => {
            response.headers_mut().insert(header::CONTENT_TYPE, content_type);
        }
        None => {
            response.headers_mut().remove(header::CONTENT_TYPE);
        }
    }
    if let Some(location) = upstream.location {
        response.headers_mut().insert(header::LOCATION, location);
    }
    response
}

fn insert_cors_headers(headers: &mut HeaderMap) {
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static(ALLOW_METHODS),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static(ALLOW_HEADERS),
    );
}

/// Resolve the outbound URL and check it against the forwarding policy
fn authorized_target(state: &AppState, headers: &HeaderMap, uri: &Uri) -> Result<Url, GatewayError> {
    let url = target_url(inbound_scheme(headers, uri), uri.path(), uri.query())?;
    let host = url.host_str().unwrap_or_default();

    if !state.may_forward_to(host) {
        warn!("Refusing to forward to {}", host);
        return Err(GatewayError::ForbiddenTarget(host.to_string()));
    }
    Ok(url)
}

/// Build the outbound URL from the inbound path and query
///
/// The first path segment is the target authority.
pub fn target_url(scheme: &str, path: &str, query: Option<&str>) -> Result<Url, GatewayError> {
    let target = path.trim_start_matches('/');
    if target.is_empty() {
        return Err(GatewayError::malformed("missing forwarding target in path"));
    }

    let mut raw = format!("{}://{}", scheme, target);
    if let Some(query) = query.filter(|q| !q.is_empty()) {
        raw.push('?');
        raw.push_str(query);
    }

    let url = Url::parse(&raw)
        .map_err(|e| GatewayError::malformed(format!("invalid forwarding target '{}': {}", target, e)))?;
    if url.host_str().map_or(true, str::is_empty) {
        return Err(GatewayError::malformed(format!("no host in '{}'", target)));
    }
    Ok(url)
}

/// Scheme the client used to reach us
///
/// TLS is terminated in front of the proxy, if anywhere, so
/// `X-Forwarded-Proto` takes precedence.
pub fn inbound_scheme(headers: &HeaderMap, uri: &Uri) -> &'static str {
    let forwarded = headers
        .get("x-forwarded-proto")
        .and_then(|v| v.to_str().ok())
        .map(str::trim);

    match forwarded.or_else(|| uri.scheme_str()) {
        Some(proto) if proto.eq_ignore_ascii_case("https") => "https",
        _ => "http",
    }
}

fn is_multipart(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .map_or(false, |mime| mime.trim().eq_ignore_ascii_case("multipart/form-data"))
}

fn content_type_only(headers: &HeaderMap) -> HeaderMap {
    let mut forwarded = HeaderMap::new();
    if let Some(content_type) = headers.get(header::CONTENT_TYPE) {
        forwarded.insert(header::CONTENT_TYPE, content_type.clone());
    }
    forwarded
}

/// Inbound headers for a re-encoded multipart request
///
/// `Content-Type` is dropped so the client writes its own boundary.
fn form_headers(headers: &HeaderMap) -> HeaderMap {
    let mut forwarded = headers.clone();
    for name in [
        header::CONTENT_TYPE,
        header::CONTENT_LENGTH,
        header::HOST,
        header::CONNECTION,
        header::TRANSFER_ENCODING,
        header::TE,
        header::UPGRADE,
        header::ACCEPT_ENCODING,
        HeaderName::from_static("keep-alive"),
        HeaderName::from_static("proxy-connection"),
    ] {
        forwarded.remove(name);
    }
    forwarded
}

/// Decode text fields and at most one `upload` file
async fn read_form(request: Request) -> Result<FormData, GatewayError> {
    let mut multipart = Multipart::from_request(request, &())
        .await
        .map_err(|e| GatewayError::malformed(e.to_string()))?;

    let mut form = FormData::default();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| GatewayError::malformed(e.to_string()))?
    {
        let name = field.name().unwrap_or_default().to_string();

        if field.file_name().is_none() {
            let value = field
                .text()
                .await
                .map_err(|e| GatewayError::malformed(e.to_string()))?;
            form.fields.push((name, value));
            continue;
        }

        if name != UPLOAD_FIELD {
            return Err(GatewayError::malformed(format!(
                "unsupported file field '{}', expected '{}'",
                name, UPLOAD_FIELD
            )));
        }
        if form.upload.is_some() {
            return Err(GatewayError::malformed("more than one upload file"));
        }

        let file_name = field.file_name().map(str::to_string);
        let content_type = field.content_type().map(str::to_string);
        let data = field
            .bytes()
            .await
            .map_err(|e| GatewayError::malformed(e.to_string()))?;
        form.upload = Some(FilePart {
            file_name,
            content_type,
            data,
        });
    }

    Ok(form)
}
