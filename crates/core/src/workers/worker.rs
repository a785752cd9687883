use async_trait::async_trait;

use crate::{error::RelayError, events::StorageEvent};

/// What happened to a notification, and therefore whether the broker should redeliver it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Processed,
    Ignored,
    RetryableFailure(String),
    PermanentFailure(String),
}

impl Outcome {
    pub fn from_error(err: &RelayError) -> Self {
        if err.is_retryable() {
            Outcome::RetryableFailure(err.to_string())
        } else {
            Outcome::PermanentFailure(err.to_string())
        }
    }

    /// Everything except a retryable failure is acknowledged.
    pub fn should_ack(&self) -> bool {
        !matches!(self, Outcome::RetryableFailure(_))
    }
}

#[async_trait]
pub trait Worker: Send + Sync + 'static {
    const WORKER_ID: &'static str;

    async fn handle(&self, event: &StorageEvent) -> Outcome;
}
