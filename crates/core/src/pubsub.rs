//! Pull-based access to a Pub/Sub subscription through the REST API.

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::STANDARD};
use reqwest::Url;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};

use crate::{
    auth::{Credentials, emulator_base_url},
    error::{RelayError, Result},
};

pub const PUBSUB_EMULATOR_ENV: &str = "PUBSUB_EMULATOR_HOST";
pub const DEFAULT_PUBSUB_URL: &str = "https://pubsub.googleapis.com";

/// A single message handed out by the broker, pending acknowledgment.
#[derive(Debug, Clone, Default)]
pub struct Delivery {
    pub ack_id: String,
    pub message_id: String,
    pub attributes: HashMap<String, String>,
    pub data: Vec<u8>,
    pub delivery_attempt: Option<u32>,
}

#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait Subscription: Send + Sync {
    /// Pull up to `max_messages`, waiting server-side when none are available.
    async fn pull(&self, max_messages: usize) -> Result<Vec<Delivery>>;

    async fn acknowledge(&self, ack_ids: &[String]) -> Result<()>;

    /// Extend (or, with 0 seconds, give up) the lease on outstanding messages.
    /// A zero deadline makes the broker redeliver immediately.
    async fn modify_ack_deadline(&self, ack_ids: &[String], seconds: u32) -> Result<()>;

    fn path(&self) -> String;
}

pub fn subscription_path(project: &str, subscription: &str) -> String {
    format!("projects/{}/subscriptions/{}", project, subscription)
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PullResponse {
    #[serde(default)]
    received_messages: Vec<ReceivedMessage>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReceivedMessage {
    ack_id: String,
    message: PubsubMessage,
    #[serde(default)]
    delivery_attempt: Option<u32>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PubsubMessage {
    #[serde(default)]
    data: Option<String>,
    #[serde(default)]
    attributes: HashMap<String, String>,
    #[serde(default)]
    message_id: String,
}

impl TryFrom<ReceivedMessage> for Delivery {
    type Error = RelayError;

    fn try_from(received: ReceivedMessage) -> Result<Self> {
        let data = match received.message.data {
            Some(encoded) => STANDARD.decode(encoded)?,
            None => Vec::new(),
        };

        Ok(Delivery {
            ack_id: received.ack_id,
            message_id: received.message.message_id,
            attributes: received.message.attributes,
            data,
            delivery_attempt: received.delivery_attempt,
        })
    }
}

pub struct PubSubSubscription {
    http: reqwest::Client,
    base_url: Url,
    path: String,
    credentials: Arc<Credentials>,
}

impl PubSubSubscription {
    pub fn new(
        http: reqwest::Client,
        base_url: &str,
        project: &str,
        subscription: &str,
        credentials: Arc<Credentials>,
    ) -> Result<Self> {
        let base_url = Url::parse(base_url).map_err(|e| RelayError::InvalidUrl {
            url: base_url.to_string(),
            reason: e.to_string(),
        })?;

        Ok(Self {
            http,
            base_url,
            path: subscription_path(project, subscription),
            credentials,
        })
    }

    /// Honors `PUBSUB_EMULATOR_HOST`, skipping authentication when it is set.
    pub fn from_env(
        http: reqwest::Client,
        project: &str,
        subscription: &str,
        credentials: Arc<Credentials>,
    ) -> Result<Self> {
        match std::env::var(PUBSUB_EMULATOR_ENV) {
            Ok(host) if !host.is_empty() => {
                let base = emulator_base_url(&host);
                info!(emulator = %base, "Using Pub/Sub emulator");
                Self::new(http, &base, project, subscription, Arc::new(Credentials::Anonymous))
            }
            _ => Self::new(http, DEFAULT_PUBSUB_URL, project, subscription, credentials),
        }
    }

    pub fn method_url(&self, method: &str) -> Url {
        let mut url = self.base_url.clone();
        url.set_path(&format!("/v1/{}:{}", self.path, method));
        url
    }

    async fn call(&self, method: &str, body: serde_json::Value) -> Result<reqwest::Response> {
        let request = self.http.post(self.method_url(method)).json(&body);
        let response = self.credentials.authorize(request).await?.send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(RelayError::PubSub {
                status,
                message: response.text().await.unwrap_or_default(),
            });
        }
        Ok(response)
    }
}

#[async_trait]
impl Subscription for PubSubSubscription {
    async fn pull(&self, max_messages: usize) -> Result<Vec<Delivery>> {
        let response: PullResponse = self
            .call("pull", json!({ "maxMessages": max_messages }))
            .await?
            .json()
            .await?;

        debug!(
            subscription = %self.path,
            count = response.received_messages.len(),
            "Pulled messages"
        );

        response
            .received_messages
            .into_iter()
            .map(Delivery::try_from)
            .collect()
    }

    async fn acknowledge(&self, ack_ids: &[String]) -> Result<()> {
        if ack_ids.is_empty() {
            return Ok(());
        }
        self.call("acknowledge", json!({ "ackIds": ack_ids })).await?;
        Ok(())
    }

    async fn modify_ack_deadline(&self, ack_ids: &[String], seconds: u32) -> Result<()> {
        if ack_ids.is_empty() {
            return Ok(());
        }
        self.call(
            "modifyAckDeadline",
            json!({ "ackIds": ack_ids, "ackDeadlineSeconds": seconds }),
        )
        .await?;
        Ok(())
    }

    fn path(&self) -> String {
        self.path.clone()
    }
}
