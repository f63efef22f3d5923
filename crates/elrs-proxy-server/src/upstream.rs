//! Outbound HTTP client used by the forwarding path

use crate::error::GatewayError;
use axum::http::{header, HeaderMap, HeaderValue, Method, StatusCode};
use bytes::Bytes;
use futures::future::BoxFuture;
use std::time::Duration;

/// Body of a forwarded request
#[derive(Debug, Clone, PartialEq)]
pub enum UpstreamBody {
    Empty,
    /// Inbound body bytes passed through unchanged
    Raw(Bytes),
    /// Decoded form, re-encoded as multipart by the client
    Form(FormData),
}

/// Decoded `multipart/form-data` request
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FormData {
    /// Text fields in arrival order
    pub fields: Vec<(String, String)>,
    /// The optional `upload` file field
    pub upload: Option<FilePart>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FilePart {
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub data: Bytes,
}

/// Name of the only file field accepted in multipart mode
pub const UPLOAD_FIELD: &str = "upload";

/// A single outbound request
#[derive(Debug, Clone)]
pub struct UpstreamRequest {
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
    pub body: UpstreamBody,
}

/// What the proxied host answered
#[derive(Debug, Clone)]
pub struct UpstreamResponse {
    pub status: StatusCode,
    pub content_type: Option<HeaderValue>,
    /// Redirect target, relayed so the browser can follow it
    pub location: Option<HeaderValue>,
    pub body: Bytes,
}

/// Performs exactly one outbound request per call
pub trait Upstream: Send + Sync {
    fn send(&self, request: UpstreamRequest) -> BoxFuture<'_, Result<UpstreamResponse, GatewayError>>;
}

/// [`Upstream`] backed by a shared `reqwest` client
#[derive(Debug, Clone)]
pub struct ReqwestUpstream {
    client: reqwest::Client,
}

impl ReqwestUpstream {
    /// Create a client whose requests fail after `timeout`
    ///
    /// Redirects are never followed: a 3xx goes back to the client as is.
    pub fn new(timeout: Duration) -> elrs_proxy_core::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| elrs_proxy_core::Error::config(format!("HTTP client: {}", e)))?;
        Ok(Self { client })
    }

    async fn execute(&self, request: UpstreamRequest) -> Result<UpstreamResponse, GatewayError> {
        let builder = self
            .client
            .request(request.method, &request.url)
            .headers(request.headers);

        let builder = match request.body {
            UpstreamBody::Empty => builder,
            UpstreamBody::Raw(bytes) => builder.body(bytes),
            UpstreamBody::Form(form) => builder.multipart(build_form(form)?),
        };

        let response = builder.send().await?;
        let status = response.status();
        let content_type = response.headers().get(header::CONTENT_TYPE).cloned();
        let location = response.headers().get(header::LOCATION).cloned();
        let body = response.bytes().await?;

        Ok(UpstreamResponse {
            status,
            content_type,
            location,
            body,
        })
    }
}

impl Upstream for ReqwestUpstream {
    fn send(&self, request: UpstreamRequest) -> BoxFuture<'_, Result<UpstreamResponse, GatewayError>> {
        Box::pin(self.execute(request))
    }
}

fn build_form(form: FormData) -> Result<reqwest::multipart::Form, GatewayError> {
    let mut multipart = reqwest::multipart::Form::new();
    for (name, value) in form.fields {
        multipart = multipart.text(name, value);
    }

    if let Some(file) = form.upload {
        let mut part = reqwest::multipart::Part::bytes(file.data.to_vec());
        if let Some(file_name) = file.file_name {
            part = part.file_name(file_name);
        }
        if let Some(content_type) = file.content_type {
            part = part
                .mime_str(&content_type)
                .map_err(|_| GatewayError::malformed(format!("invalid upload content type '{}'", content_type)))?;
        }
        multipart = multipart.part(UPLOAD_FIELD, part);
    }

    Ok(multipart)
}
