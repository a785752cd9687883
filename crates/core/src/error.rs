use std::path::PathBuf;

use reqwest::StatusCode;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RelayError {
    #[error("Notification is missing required attribute `{0}`")]
    MissingAttribute(&'static str),

    #[error("Object {object} not found in bucket {bucket}")]
    ObjectNotFound { bucket: String, object: String },

    #[error("Storage request failed with {status}: {message}")]
    Storage { status: StatusCode, message: String },

    #[error("Image processor responded with {status}: {body}")]
    Processor { status: StatusCode, body: String },

    #[error("Pub/Sub request failed with {status}: {message}")]
    PubSub { status: StatusCode, message: String },

    #[error("Invalid service URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Failed to write {path}: {source}")]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Missing credentials: {reason}")]
    Credentials { reason: String },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Message data is not valid base64: {0}")]
    Base64Error(#[from] base64::DecodeError),

    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),
}

impl RelayError {
    /// Whether redelivering the same notification could succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            RelayError::Storage { status, .. }
            | RelayError::Processor { status, .. }
            | RelayError::PubSub { status, .. } => is_transient_status(*status),
            RelayError::HttpError(e) => match e.status() {
                Some(status) => is_transient_status(status),
                None => e.is_timeout() || e.is_connect() || e.is_request() || e.is_body(),
            },
            RelayError::Credentials { .. } => true,
            RelayError::MissingAttribute(_)
            | RelayError::ObjectNotFound { .. }
            | RelayError::InvalidUrl { .. }
            | RelayError::WriteFailed { .. }
            | RelayError::IoError(_)
            | RelayError::JsonError(_)
            | RelayError::Base64Error(_) => false,
        }
    }
}

fn is_transient_status(status: StatusCode) -> bool {
    status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
        || status.is_server_error()
}

pub type Result<T> = std::result::Result<T, RelayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_errors_are_retryable() {
        let err = RelayError::Processor {
            status: StatusCode::SERVICE_UNAVAILABLE,
            body: "busy".into(),
        };
        assert!(err.is_retryable());

        let err = RelayError::Storage {
            status: StatusCode::TOO_MANY_REQUESTS,
            message: "slow down".into(),
        };
        assert!(err.is_retryable());
    }

    #[test]
    fn client_errors_are_permanent() {
        let err = RelayError::Processor {
            status: StatusCode::BAD_REQUEST,
            body: "bad angle".into(),
        };
        assert!(!err.is_retryable());

        let err = RelayError::ObjectNotFound {
            bucket: "b1".into(),
            object: "dir/pic.png".into(),
        };
        assert!(!err.is_retryable());
        assert!(!RelayError::MissingAttribute("eventType").is_retryable());
    }
}
