//! Typed wrappers around each backend call. No state, no business logic:
//! every method is one request through the transport and a decode.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;
use shared::{
    domain::ProcessedItem,
    protocol::{
        AuthStatusResponse, HealthResponse, LoginRequest, PostRequest, PostedListResponse,
        ProcessRequest, ProcessedListResponse, SuccessResponse, UploadResponse,
    },
};
use tracing::warn;

use crate::{
    error::TransportError,
    transport::{FilePart, Transport, TransportRequest},
};

type Result<T> = std::result::Result<T, TransportError>;

fn encode<T: serde::Serialize>(body: &T) -> Result<Value> {
    serde_json::to_value(body).map_err(|e| TransportError::Malformed(e.to_string()))
}

#[derive(Deserialize)]
struct ProcessedListWire {
    #[serde(default)]
    processed_images: Option<Vec<Value>>,
}

#[derive(Clone)]
pub struct RemoteCatalog {
    transport: Arc<dyn Transport>,
}

impl RemoteCatalog {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    pub async fn health(&self) -> Result<HealthResponse> {
        self.transport
            .send(TransportRequest::get("/health"))
            .await?
            .decode()
    }

    pub async fn login(&self, handle: &str, secret: &str) -> Result<SuccessResponse> {
        let body = encode(&LoginRequest {
            username: handle,
            password: secret,
        })?;
        self.transport
            .send(TransportRequest::post("/instagram/login").json(body))
            .await?
            .decode()
    }

    pub async fn auth_status(&self) -> Result<AuthStatusResponse> {
        self.transport
            .send(TransportRequest::get("/instagram/status"))
            .await?
            .decode()
    }

    pub async fn upload(
        &self,
        file_bytes: Vec<u8>,
        file_name: &str,
        mime_type: &str,
    ) -> Result<UploadResponse> {
        let part = FilePart {
            file_name: file_name.to_string(),
            mime_type: mime_type.to_string(),
            bytes: file_bytes,
        };
        self.transport
            .send(TransportRequest::post("/upload").file(part))
            .await?
            .decode()
    }

    pub async fn process(&self, request: &ProcessRequest) -> Result<SuccessResponse> {
        let body = encode(request)?;
        self.transport
            .send(TransportRequest::post("/process").json(body))
            .await?
            .decode()
    }

    /// Entries that do not decode are skipped so one bad item cannot hide
    /// the rest of the list.
    pub async fn list_processed(&self) -> Result<ProcessedListResponse> {
        let wire: ProcessedListWire = self
            .transport
            .send(TransportRequest::get("/images/processed"))
            .await?
            .decode()?;

        let processed_images = wire.processed_images.map(|entries| {
            entries
                .into_iter()
                .filter_map(|entry| match serde_json::from_value::<ProcessedItem>(entry) {
                    Ok(item) => Some(item),
                    Err(err) => {
                        warn!(error = %err, "skipping unreadable processed image entry");
                        None
                    }
                })
                .collect()
        });
        Ok(ProcessedListResponse { processed_images })
    }

    pub async fn list_posted(&self) -> Result<PostedListResponse> {
        self.transport
            .send(TransportRequest::get("/images/posted"))
            .await?
            .decode()
    }

    pub async fn post(&self, file_id: &str, caption: Option<&str>) -> Result<SuccessResponse> {
        let body = encode(&PostRequest {
            filename: file_id.to_string(),
            custom_caption: caption.map(str::to_string),
        })?;
        self.transport
            .send(TransportRequest::post("/instagram/post").json(body))
            .await?
            .decode()
    }

    pub async fn post_next(&self) -> Result<SuccessResponse> {
        self.transport
            .send(TransportRequest::post("/instagram/post/next"))
            .await?
            .decode()
    }

    pub async fn delete_processed(&self, file_id: &str) -> Result<SuccessResponse> {
        self.transport
            .send(TransportRequest::delete(format!("/images/{file_id}")))
            .await?
            .decode()
    }

    pub async fn download(&self, file_id: &str) -> Result<Vec<u8>> {
        Ok(self
            .transport
            .send(TransportRequest::get(format!("/download/{file_id}")).binary())
            .await?
            .into_bytes())
    }

    /// Raw passthrough to the backend's MCP endpoint.
    pub async fn mcp(&self, request: Value) -> Result<Value> {
        self.transport
            .send(TransportRequest::post("/mcp").json(request))
            .await?
            .decode()
    }

    /// Preview URL for an artifact under the current base address.
    pub async fn download_url(&self, file_id: &str) -> Result<String> {
        self.transport
            .url_for(&format!("/download/{file_id}"))
            .await
    }
}

#[cfg(test)]
#[path = "tests/catalog_tests.rs"]
mod tests;
