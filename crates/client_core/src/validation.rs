//! Input types validated at the point of entry.
//!
//! Store actions only accept these types, so malformed input is rejected
//! before any action starts and never reaches the network.

use std::fmt;

use thiserror::Error;
use url::Url;
use zeroize::Zeroize;

pub const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;
pub const ALLOWED_IMAGE_TYPES: &[&str] = &[
    "image/jpeg",
    "image/jpg",
    "image/png",
    "image/gif",
    "image/webp",
];

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("username is required")]
    MissingHandle,
    #[error("password is required")]
    MissingSecret,
    #[error("file is empty")]
    EmptyFile,
    #[error("File size must be less than 10MB")]
    FileTooLarge { size_bytes: usize },
    #[error("Please select a valid image file (JPEG, PNG, GIF, or WebP)")]
    UnsupportedType { mime_type: String },
    #[error("file name is required")]
    MissingFileName,
    #[error("invalid server URL '{url}': {reason}")]
    InvalidEndpoint { url: String, reason: String },
}

/// Login credentials. The secret is wiped from memory when dropped.
pub struct Credentials {
    handle: String,
    secret: String,
}

impl Credentials {
    pub fn new(
        handle: impl Into<String>,
        secret: impl Into<String>,
    ) -> Result<Self, ValidationError> {
        let handle = handle.into().trim().to_string();
        let mut secret = secret.into();
        if handle.is_empty() {
            secret.zeroize();
            return Err(ValidationError::MissingHandle);
        }
        if secret.trim().is_empty() {
            secret.zeroize();
            return Err(ValidationError::MissingSecret);
        }
        Ok(Self { handle, secret })
    }

    pub fn handle(&self) -> &str {
        &self.handle
    }

    pub(crate) fn secret(&self) -> &str {
        &self.secret
    }
}

impl Drop for Credentials {
    fn drop(&mut self) {
        self.secret.zeroize();
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("handle", &self.handle)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// An image file accepted for upload.
#[derive(Clone)]
pub struct ImageUpload {
    bytes: Vec<u8>,
    file_name: String,
    mime_type: String,
}

impl ImageUpload {
    /// Validates size and type. Without an explicit MIME type the type is
    /// guessed from the file extension.
    pub fn new(
        bytes: Vec<u8>,
        file_name: impl Into<String>,
        mime_type: Option<&str>,
    ) -> Result<Self, ValidationError> {
        let file_name = file_name.into();
        if file_name.trim().is_empty() {
            return Err(ValidationError::MissingFileName);
        }
        if bytes.is_empty() {
            return Err(ValidationError::EmptyFile);
        }
        if bytes.len() > MAX_UPLOAD_BYTES {
            return Err(ValidationError::FileTooLarge {
                size_bytes: bytes.len(),
            });
        }

        let mime_type = match mime_type {
            Some(explicit) => explicit.trim().to_ascii_lowercase(),
            None => mime_guess::from_path(&file_name)
                .first_raw()
                .unwrap_or("application/octet-stream")
                .to_string(),
        };
        if !ALLOWED_IMAGE_TYPES.contains(&mime_type.as_str()) {
            return Err(ValidationError::UnsupportedType { mime_type });
        }

        Ok(Self {
            bytes,
            file_name,
            mime_type,
        })
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn size_bytes(&self) -> usize {
        self.bytes.len()
    }

    pub(crate) fn into_parts(self) -> (Vec<u8>, String, String) {
        (self.bytes, self.file_name, self.mime_type)
    }
}

impl fmt::Debug for ImageUpload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageUpload")
            .field("file_name", &self.file_name)
            .field("mime_type", &self.mime_type)
            .field("size_bytes", &self.bytes.len())
            .finish()
    }
}

/// Absolute http(s) base address of the backend, without trailing slash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint(String);

impl Endpoint {
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        let trimmed = raw.trim().trim_end_matches('/');
        let invalid = |reason: String| ValidationError::InvalidEndpoint {
            url: raw.to_string(),
            reason,
        };

        let parsed = Url::parse(trimmed).map_err(|e| invalid(e.to_string()))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(invalid(format!("unsupported scheme '{}'", parsed.scheme())));
        }
        if parsed.host_str().is_none() {
            return Err(invalid("missing host".to_string()));
        }

        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credentials_require_both_fields() {
        assert_eq!(
            Credentials::new("  ", "secret").unwrap_err(),
            ValidationError::MissingHandle
        );
        assert_eq!(
            Credentials::new("bob", "").unwrap_err(),
            ValidationError::MissingSecret
        );
        assert_eq!(
            Credentials::new("bob", "   ").unwrap_err(),
            ValidationError::MissingSecret
        );
        let creds = Credentials::new(" bob ", "secret").expect("valid");
        assert_eq!(creds.handle(), "bob");
        assert_eq!(creds.secret(), "secret");
    }

    #[test]
    fn credentials_debug_redacts_secret() {
        let creds = Credentials::new("bob", "hunter2").expect("valid");
        let rendered = format!("{creds:?}");
        assert!(rendered.contains("bob"));
        assert!(!rendered.contains("hunter2"));
    }

    #[test]
    fn image_upload_enforces_size_limit() {
        let err = ImageUpload::new(vec![0; MAX_UPLOAD_BYTES + 1], "big.png", None).unwrap_err();
        assert!(matches!(err, ValidationError::FileTooLarge { .. }));
        assert!(ImageUpload::new(vec![0; MAX_UPLOAD_BYTES], "edge.png", None).is_ok());
        assert_eq!(
            ImageUpload::new(Vec::new(), "empty.png", None).unwrap_err(),
            ValidationError::EmptyFile
        );
    }

    #[test]
    fn image_upload_checks_type() {
        let guessed = ImageUpload::new(vec![1, 2, 3], "photo.JPG", None).expect("jpeg");
        assert_eq!(guessed.mime_type(), "image/jpeg");

        let explicit = ImageUpload::new(vec![1], "blob", Some("image/webp")).expect("webp");
        assert_eq!(explicit.mime_type(), "image/webp");

        let err = ImageUpload::new(vec![1], "notes.txt", None).unwrap_err();
        assert_eq!(
            err,
            ValidationError::UnsupportedType {
                mime_type: "text/plain".into()
            }
        );
    }

    #[test]
    fn endpoint_parse_normalizes_and_rejects() {
        let endpoint = Endpoint::parse(" http://10.0.0.5:8000/ ").expect("endpoint");
        assert_eq!(endpoint.as_str(), "http://10.0.0.5:8000");

        assert!(Endpoint::parse("ftp://host").is_err());
        assert!(Endpoint::parse("localhost:8000/api").is_err());
        assert!(Endpoint::parse("").is_err());
    }
}
