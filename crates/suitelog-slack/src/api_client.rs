//! Slack Web API client used by the thread notifier.

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::SlackError;

const DEFAULT_API_BASE: &str = "https://slack.com/api";

fn truncate_for_error(body: &str, max_chars: usize) -> String {
    if body.chars().count() <= max_chars {
        return body.to_string();
    }
    let mut truncated: String = body.chars().take(max_chars).collect();
    truncated.push_str("...");
    truncated
}

#[derive(Debug, Clone)]
pub struct SlackConfig {
    pub api_base: String,
    pub bot_token: String,
    pub request_timeout_ms: u64,
}

impl SlackConfig {
    pub fn new(bot_token: &str) -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            bot_token: bot_token.to_string(),
            request_timeout_ms: 30_000,
        }
    }
}

/// The subset of a channel message the notifier needs for anchor matching.
#[derive(Debug, Clone, Deserialize)]
pub struct HistoryMessage {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub ts: String,
}

#[derive(Debug, Clone, Deserialize)]
struct SlackHistoryResponse {
    ok: bool,
    #[serde(default)]
    messages: Vec<HistoryMessage>,
    error: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct SlackChatMessageResponse {
    ok: bool,
    ts: Option<String>,
    error: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct SlackGetUploadUrlExternalResponse {
    ok: bool,
    upload_url: Option<String>,
    file_id: Option<String>,
    error: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct SlackCompleteUploadExternalResponse {
    ok: bool,
    error: Option<String>,
}

#[derive(Clone)]
pub struct SlackClient {
    http: reqwest::Client,
    api_base: String,
    bot_token: String,
}

impl SlackClient {
    pub fn new(config: SlackConfig) -> Result<Self, SlackError> {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::ACCEPT,
            reqwest::header::HeaderValue::from_static("application/json"),
        );
        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_millis(config.request_timeout_ms.max(1)))
            .build()?;

        Ok(Self {
            http,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            bot_token: config.bot_token.trim().to_string(),
        })
    }

    /// Fetches the most recent page of channel messages.
    pub async fn channel_history(
        &self,
        channel: &str,
        limit: usize,
    ) -> Result<Vec<HistoryMessage>, SlackError> {
        let limit = limit.to_string();
        let response: SlackHistoryResponse = self
            .request_json("conversations.history", || {
                self.http
                    .get(format!("{}/conversations.history", self.api_base))
                    .bearer_auth(&self.bot_token)
                    .query(&[("channel", channel), ("limit", limit.as_str())])
            })
            .await?;
        if !response.ok {
            return Err(api_error("conversations.history", response.error));
        }
        Ok(response.messages)
    }

    /// Posts a plain text message and returns its timestamp identifier.
    pub async fn post_message(&self, channel: &str, text: &str) -> Result<String, SlackError> {
        let payload = json!({
            "channel": channel,
            "text": text,
            "mrkdwn": false,
            "unfurl_links": false,
            "unfurl_media": false,
        });
        let response: SlackChatMessageResponse = self
            .request_json("chat.postMessage", || {
                self.http
                    .post(format!("{}/chat.postMessage", self.api_base))
                    .bearer_auth(&self.bot_token)
                    .json(&payload)
            })
            .await?;
        if !response.ok {
            return Err(api_error("chat.postMessage", response.error));
        }
        response.ts.filter(|ts| !ts.is_empty()).ok_or_else(|| {
            SlackError::InvalidResponse("chat.postMessage response missing ts".to_string())
        })
    }

    /// Uploads a file into a thread via the external-upload flow: reserve an
    /// upload URL, push the raw bytes, then complete against the thread.
    pub async fn upload_file(
        &self,
        channel: &str,
        thread_ts: &str,
        filename: &str,
        title: &str,
        bytes: &[u8],
        initial_comment: &str,
    ) -> Result<String, SlackError> {
        let get_upload: SlackGetUploadUrlExternalResponse = self
            .request_json("files.getUploadURLExternal", || {
                self.http
                    .post(format!("{}/files.getUploadURLExternal", self.api_base))
                    .bearer_auth(&self.bot_token)
                    .json(&json!({
                        "filename": filename,
                        "length": bytes.len(),
                    }))
            })
            .await?;
        if !get_upload.ok {
            return Err(api_error("files.getUploadURLExternal", get_upload.error));
        }
        let upload_url = get_upload
            .upload_url
            .filter(|value| !value.trim().is_empty())
            .ok_or_else(|| {
                SlackError::InvalidResponse(
                    "files.getUploadURLExternal missing upload_url".to_string(),
                )
            })?;
        let file_id = get_upload
            .file_id
            .filter(|value| !value.trim().is_empty())
            .ok_or_else(|| {
                SlackError::InvalidResponse(
                    "files.getUploadURLExternal missing file_id".to_string(),
                )
            })?;

        let upload_response = self
            .http
            .post(upload_url)
            .header(
                reqwest::header::CONTENT_TYPE,
                "application/octet-stream",
            )
            .body(bytes.to_vec())
            .send()
            .await?;
        if !upload_response.status().is_success() {
            let status = upload_response.status();
            let body = upload_response.text().await.unwrap_or_default();
            return Err(SlackError::HttpStatus {
                method: "external upload",
                status: status.as_u16(),
                body: truncate_for_error(&body, 320),
            });
        }

        let complete_payload = json!({
            "files": [{ "id": file_id.clone(), "title": title }],
            "channel_id": channel,
            "thread_ts": thread_ts,
            "initial_comment": initial_comment,
        });
        let complete: SlackCompleteUploadExternalResponse = self
            .request_json("files.completeUploadExternal", || {
                self.http
                    .post(format!("{}/files.completeUploadExternal", self.api_base))
                    .bearer_auth(&self.bot_token)
                    .json(&complete_payload)
            })
            .await?;
        if !complete.ok {
            return Err(api_error("files.completeUploadExternal", complete.error));
        }

        Ok(file_id)
    }

    async fn request_json<T, F>(&self, method: &'static str, builder: F) -> Result<T, SlackError>
    where
        T: DeserializeOwned,
        F: Fn() -> reqwest::RequestBuilder,
    {
        let response = builder().send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SlackError::HttpStatus {
                method,
                status: status.as_u16(),
                body: truncate_for_error(&body, 800),
            });
        }
        let value: Value = response.json().await?;
        serde_json::from_value(value).map_err(|error| {
            SlackError::InvalidResponse(format!("failed to decode slack {method}: {error}"))
        })
    }
}

fn api_error(method: &'static str, error: Option<String>) -> SlackError {
    SlackError::Api {
        method,
        error: error.unwrap_or_else(|| "unknown error".to_string()),
    }
}
