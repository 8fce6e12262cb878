//! Typed reqwest client for the Pub/Sub REST API.

use std::collections::BTreeMap;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

use crate::message::LogMessage;
use crate::BusError;

const DEFAULT_API_BASE: &str = "https://pubsub.googleapis.com";

#[derive(Debug, Clone)]
pub struct BusConfig {
    pub api_base: String,
    pub project_id: String,
    pub access_token: String,
    pub request_timeout_ms: u64,
}

impl BusConfig {
    pub fn new(project_id: &str, access_token: &str) -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            project_id: project_id.to_string(),
            access_token: access_token.to_string(),
            request_timeout_ms: 30_000,
        }
    }
}

/// One message handed back by a pull, pending explicit acknowledgment.
///
/// The payload stays in its wire encoding here so one undecodable message
/// fails only its own delivery attempt, never the rest of the batch.
#[derive(Debug, Clone)]
pub struct DeliveredMessage {
    pub ack_id: String,
    pub message_id: String,
    pub data: String,
    pub attributes: BTreeMap<String, String>,
}

impl DeliveredMessage {
    /// Decodes the wire payload into a usable log message.
    pub fn body(&self) -> Result<LogMessage, crate::DecodeError> {
        let payload = BASE64.decode(self.data.as_bytes())?;
        Ok(LogMessage {
            payload,
            attributes: self.attributes.clone(),
        })
    }
}

#[derive(Clone)]
pub struct BusClient {
    http: reqwest::Client,
    api_base: String,
    project_id: String,
    access_token: String,
}

impl BusClient {
    pub fn new(config: BusConfig) -> Result<Self, BusError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms.max(1)))
            .build()?;
        Ok(Self {
            http,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            project_id: config.project_id,
            access_token: config.access_token,
        })
    }

    /// Publishes one message and blocks until the broker returns the
    /// server-assigned message id for it.
    pub async fn publish(&self, topic_id: &str, message: &LogMessage) -> Result<String, BusError> {
        self.publish_inner(topic_id, message)
            .await
            .map_err(|source| BusError::Publish {
                topic: topic_id.to_string(),
                source: Box::new(source),
            })
    }

    async fn publish_inner(
        &self,
        topic_id: &str,
        message: &LogMessage,
    ) -> Result<String, BusError> {
        let url = format!(
            "{}/v1/projects/{}/topics/{}:publish",
            self.api_base, self.project_id, topic_id
        );
        let body = PublishRequest {
            messages: vec![WireMessage {
                data: BASE64.encode(&message.payload),
                attributes: message.attributes.clone(),
            }],
        };
        let response: PublishResponse = self.post_json(&url, &body).await?;
        response
            .message_ids
            .into_iter()
            .next()
            .filter(|id| !id.is_empty())
            .ok_or_else(|| {
                BusError::InvalidResponse("publish response carried no message id".to_string())
            })
    }

    /// Pulls up to `max_messages` undelivered messages from a subscription.
    pub async fn pull(
        &self,
        subscription_id: &str,
        max_messages: usize,
    ) -> Result<Vec<DeliveredMessage>, BusError> {
        let url = format!(
            "{}/v1/projects/{}/subscriptions/{}:pull",
            self.api_base, self.project_id, subscription_id
        );
        let response: PullResponse = self
            .post_json(&url, &PullRequest { max_messages })
            .await?;

        Ok(response
            .received_messages
            .into_iter()
            .map(|received| DeliveredMessage {
                ack_id: received.ack_id,
                message_id: received.message.message_id,
                data: received.message.data,
                attributes: received.message.attributes,
            })
            .collect())
    }

    /// Acknowledges delivered messages so the broker stops redelivering them.
    pub async fn acknowledge(
        &self,
        subscription_id: &str,
        ack_ids: &[String],
    ) -> Result<(), BusError> {
        if ack_ids.is_empty() {
            return Ok(());
        }
        let url = format!(
            "{}/v1/projects/{}/subscriptions/{}:acknowledge",
            self.api_base, self.project_id, subscription_id
        );
        let _: AckResponse = self
            .post_json(
                &url,
                &AckRequest {
                    ack_ids: ack_ids.to_vec(),
                },
            )
            .await?;
        Ok(())
    }

    async fn post_json<B, T>(&self, url: &str, body: &B) -> Result<T, BusError>
    where
        B: Serialize,
        T: serde::de::DeserializeOwned,
    {
        let response = self
            .http
            .post(url)
            .bearer_auth(&self.access_token)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BusError::HttpStatus {
                status: status.as_u16(),
                body,
            });
        }

        response.json::<T>().await.map_err(BusError::Http)
    }
}

#[derive(Debug, Serialize)]
struct PublishRequest {
    messages: Vec<WireMessage>,
}

#[derive(Debug, Serialize)]
struct WireMessage {
    data: String,
    attributes: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PublishResponse {
    #[serde(default)]
    message_ids: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PullRequest {
    max_messages: usize,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PullResponse {
    #[serde(default)]
    received_messages: Vec<ReceivedMessage>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReceivedMessage {
    ack_id: String,
    message: ReceivedWireMessage,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReceivedWireMessage {
    #[serde(default)]
    data: String,
    #[serde(default)]
    attributes: BTreeMap<String, String>,
    #[serde(default)]
    message_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AckRequest {
    ack_ids: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
struct AckResponse {}
