//! Slack boundary: Web API client helpers and the idempotent per-run thread
//! notifier that files harvested logs as threaded uploads.

use thiserror::Error;

mod api_client;
mod notifier;

pub use api_client::{HistoryMessage, SlackClient, SlackConfig};
pub use notifier::{anchor_text, NotifierConfig, ThreadNotifier};

#[derive(Debug, Error)]
pub enum SlackError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("slack api {method} failed with status {status}: {body}")]
    HttpStatus {
        method: &'static str,
        status: u16,
        body: String,
    },
    #[error("slack api {method} failed: {error}")]
    Api { method: &'static str, error: String },
    #[error("invalid slack response: {0}")]
    InvalidResponse(String),
}

/// One failure per notifier stage so delivery problems stay distinguishable.
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("failed to look up channel history: {source}")]
    HistoryLookup {
        #[source]
        source: SlackError,
    },
    #[error("failed to post parent thread message: {source}")]
    ParentPost {
        #[source]
        source: SlackError,
    },
    #[error("failed to upload log file to thread {thread_ts}: {source}")]
    Upload {
        thread_ts: String,
        #[source]
        source: SlackError,
    },
}
