use std::{
    sync::{Arc, PoisonError, RwLock},
    time::Duration,
};

use anyhow::Context;
use async_trait::async_trait;
use reqwest::{header, multipart, Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use shared::error::extract_server_message_from_bytes;
use tracing::{debug, error, warn};
use url::Url;

use crate::error::TransportError;

pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const UPLOAD_FIELD_NAME: &str = "file";

/// Shared, mutable backend base address. Read on every request so a change
/// takes effect without rebuilding the client.
#[derive(Debug, Clone)]
pub struct EndpointHandle(Arc<RwLock<String>>);

impl EndpointHandle {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self(Arc::new(RwLock::new(base_url.into())))
    }

    pub fn get(&self) -> String {
        self.0
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn set(&self, base_url: impl Into<String>) {
        *self.0.write().unwrap_or_else(PoisonError::into_inner) = base_url.into();
    }
}

#[derive(Debug, Clone)]
pub struct FilePart {
    pub file_name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone)]
pub enum RequestBody {
    Empty,
    Json(Value),
    File(FilePart),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseKind {
    Json,
    Binary,
}

#[derive(Debug, Clone)]
pub struct TransportRequest {
    pub method: Method,
    pub path: String,
    pub body: RequestBody,
    pub response_kind: ResponseKind,
}

impl TransportRequest {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::GET,
            path: path.into(),
            body: RequestBody::Empty,
            response_kind: ResponseKind::Json,
        }
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self {
            method: Method::POST,
            ..Self::get(path)
        }
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self {
            method: Method::DELETE,
            ..Self::get(path)
        }
    }

    pub fn json(mut self, body: Value) -> Self {
        self.body = RequestBody::Json(body);
        self
    }

    pub fn file(mut self, part: FilePart) -> Self {
        self.body = RequestBody::File(part);
        self
    }

    pub fn binary(mut self) -> Self {
        self.response_kind = ResponseKind::Binary;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ResponseBody {
    Json(Value),
    Binary(Vec<u8>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct TransportResponse {
    pub status: u16,
    pub body: ResponseBody,
}

impl TransportResponse {
    pub fn json(status: u16, body: Value) -> Self {
        Self {
            status,
            body: ResponseBody::Json(body),
        }
    }

    /// Decodes the JSON body. An empty body decodes as an empty object.
    pub fn decode<T: DeserializeOwned>(self) -> Result<T, TransportError> {
        match self.body {
            ResponseBody::Json(Value::Null) => {
                serde_json::from_value(Value::Object(Default::default()))
                    .map_err(|e| TransportError::Malformed(e.to_string()))
            }
            ResponseBody::Json(value) => serde_json::from_value(value)
                .map_err(|e| TransportError::Malformed(e.to_string())),
            ResponseBody::Binary(bytes) => serde_json::from_slice(&bytes)
                .map_err(|e| TransportError::Malformed(e.to_string())),
        }
    }

    pub fn into_bytes(self) -> Vec<u8> {
        match self.body {
            ResponseBody::Binary(bytes) => bytes,
            ResponseBody::Json(value) => value.to_string().into_bytes(),
        }
    }
}

/// A single round trip to the backend. No retries: retry policy belongs to
/// the caller.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse, TransportError>;

    /// Absolute URL for `path` under the current base address.
    async fn url_for(&self, path: &str) -> Result<String, TransportError>;
}

pub struct HttpTransport {
    http: Client,
    endpoint: EndpointHandle,
    timeout: Duration,
}

impl HttpTransport {
    pub fn new(endpoint: EndpointHandle) -> anyhow::Result<Self> {
        Self::with_timeout(endpoint, REQUEST_TIMEOUT)
    }

    pub(crate) fn with_timeout(
        endpoint: EndpointHandle,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .default_headers({
                let mut headers = header::HeaderMap::new();
                headers.insert(
                    header::ACCEPT,
                    header::HeaderValue::from_static("application/json"),
                );
                headers
            })
            .build()
            .context("failed to build http client")?;
        Ok(Self {
            http,
            endpoint,
            timeout,
        })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse, TransportError> {
        let TransportRequest {
            method,
            path,
            body,
            response_kind,
        } = request;
        let url = resolve_url(&self.endpoint.get(), &path)?;
        debug!(method = %method, url = %url, "backend request");

        let mut builder = self.http.request(method.clone(), url);
        builder = match body {
            RequestBody::Empty => builder,
            RequestBody::Json(value) => builder.json(&value),
            RequestBody::File(part) => {
                let file = multipart::Part::bytes(part.bytes)
                    .file_name(part.file_name)
                    .mime_str(&part.mime_type)
                    .map_err(|e| TransportError::Malformed(format!("invalid mime type: {e}")))?;
                builder.multipart(multipart::Form::new().part(UPLOAD_FIELD_NAME, file))
            }
        };

        let response = builder
            .send()
            .await
            .map_err(|err| classify_send_error(&path, self.timeout, err))?;
        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|err| classify_send_error(&path, self.timeout, err))?;

        if status.is_client_error() || status.is_server_error() {
            let server_message = extract_server_message_from_bytes(&bytes);
            log_rejection(&method, &path, status, server_message.as_deref());
            return Err(TransportError::Rejected {
                status: status.as_u16(),
                server_message,
            });
        }

        let body = match response_kind {
            ResponseKind::Binary => ResponseBody::Binary(bytes.to_vec()),
            ResponseKind::Json if bytes.is_empty() => ResponseBody::Json(Value::Null),
            ResponseKind::Json => {
                let value = serde_json::from_slice(&bytes).map_err(|e| {
                    warn!(path = %path, error = %e, "backend returned a non-json body");
                    TransportError::Malformed(e.to_string())
                })?;
                ResponseBody::Json(value)
            }
        };

        Ok(TransportResponse {
            status: status.as_u16(),
            body,
        })
    }

    async fn url_for(&self, path: &str) -> Result<String, TransportError> {
        resolve_url(&self.endpoint.get(), path).map(String::from)
    }
}

/// Joins `path` onto `base_url`, percent-encoding each path segment.
pub fn resolve_url(base_url: &str, path: &str) -> Result<Url, TransportError> {
    let mut url = Url::parse(base_url).map_err(|e| TransportError::Unreachable {
        reason: format!("invalid base url '{base_url}': {e}"),
    })?;
    url.path_segments_mut()
        .map_err(|_| TransportError::Unreachable {
            reason: format!("base url '{base_url}' cannot carry a path"),
        })?
        .pop_if_empty()
        .extend(path.split('/').filter(|segment| !segment.is_empty()));
    Ok(url)
}

fn classify_send_error(path: &str, timeout: Duration, err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        error!(
            path,
            timeout_ms = timeout.as_millis() as u64,
            "backend request timed out"
        );
        return TransportError::Unreachable {
            reason: format!("timeout of {}ms exceeded", timeout.as_millis()),
        };
    }
    if err.is_connect() {
        error!(path, "server connection refused; is the backend running?");
        return TransportError::Unreachable {
            reason: "connection refused".to_string(),
        };
    }
    warn!(path, error = %err, "backend request failed without a response");
    TransportError::Unreachable {
        reason: err.to_string(),
    }
}

fn log_rejection(method: &Method, path: &str, status: StatusCode, server_message: Option<&str>) {
    match status {
        StatusCode::INTERNAL_SERVER_ERROR => {
            error!(method = %method, path, server_message, "internal server error")
        }
        StatusCode::NOT_FOUND => {
            warn!(method = %method, path, server_message, "api endpoint not found")
        }
        _ => warn!(
            method = %method,
            path,
            status = status.as_u16(),
            server_message,
            "backend rejected request"
        ),
    }
}

#[cfg(test)]
#[path = "tests/transport_tests.rs"]
mod tests;
