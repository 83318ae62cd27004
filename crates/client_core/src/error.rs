use shared::domain::ActionKind;
use thiserror::Error;

pub const CONNECTION_FAILED: &str = "Connection Failed";

/// Normalized failure of a single backend call.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// No response: connection refused, DNS failure, or the request timed out.
    #[error("server unreachable: {reason}")]
    Unreachable { reason: String },
    /// The server answered with a 4xx/5xx status.
    #[error("request failed with status code {status}")]
    Rejected {
        status: u16,
        server_message: Option<String>,
    },
    /// A success status whose body could not be decoded into the expected shape.
    #[error("malformed response body: {0}")]
    Malformed(String),
}

impl TransportError {
    /// User-facing text for this failure.
    ///
    /// Rejections use the server-supplied message, then the generic HTTP
    /// reason; unreachable servers always read "Connection Failed"; anything
    /// else falls back to the caller's per-action text.
    pub fn user_message(&self, fallback: &str) -> String {
        match self {
            TransportError::Unreachable { .. } => CONNECTION_FAILED.to_string(),
            TransportError::Rejected {
                server_message: Some(message),
                ..
            } => message.clone(),
            TransportError::Rejected { status, .. } => {
                format!("Request failed with status code {status}")
            }
            TransportError::Malformed(_) => fallback.to_string(),
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            TransportError::Rejected { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_unreachable(&self) -> bool {
        matches!(self, TransportError::Unreachable { .. })
    }
}

/// Outcome of a store action that did not complete.
///
/// By the time a caller sees this, the store has already folded the failure
/// into its state and surfaced one notification.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ActionError {
    #[error("another {0} action is already in progress")]
    Busy(ActionKind),
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// The server answered but reported failure in its payload.
    #[error("{0}")]
    Failed(String),
}
