use serde::{Deserialize, Serialize};

use crate::domain::ProcessedItem;

pub const HEALTHY_STATUS: &str = "healthy";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
}

impl HealthResponse {
    pub fn is_healthy(&self) -> bool {
        self.status.as_deref() == Some(HEALTHY_STATUS)
    }
}

#[derive(Serialize)]
pub struct LoginRequest<'a> {
    pub username: &'a str,
    pub password: &'a str,
}

/// Shared shape of every `{success, error?, message?}` acknowledgement.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SuccessResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl SuccessResponse {
    pub fn ok() -> Self {
        Self {
            success: Some(true),
            ..Self::default()
        }
    }

    /// The server explicitly confirmed the operation.
    pub fn confirmed(&self) -> bool {
        self.success == Some(true)
    }

    /// The server explicitly reported failure.
    pub fn refused(&self) -> bool {
        self.success == Some(false)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccountSummary {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub follower_count: Option<u64>,
    #[serde(default)]
    pub following_count: Option<u64>,
    #[serde(default)]
    pub media_count: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthStatusResponse {
    #[serde(default)]
    pub logged_in: bool,
    #[serde(default)]
    pub account: Option<AccountSummary>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UploadResponse {
    #[serde(default)]
    pub filename: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessRequest {
    pub filename: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_caption: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub watermark_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub watermark_opacity: Option<u8>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProcessedListResponse {
    #[serde(default)]
    pub processed_images: Option<Vec<ProcessedItem>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PostedListResponse {
    #[serde(default)]
    pub posted_images: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostRequest {
    pub filename: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_caption: Option<String>,
}
