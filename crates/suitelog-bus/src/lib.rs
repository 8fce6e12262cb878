//! Pub/Sub message-bus boundary: publish, pull, acknowledge, and the
//! payload/attribute codec shared by both sides of the pipeline.

use thiserror::Error;

mod client;
mod message;

pub use client::{BusClient, BusConfig, DeliveredMessage};
pub use message::{LogMessage, MessageAttributes};

#[derive(Debug, Error)]
pub enum BusError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("bus returned non-success status {status}: {body}")]
    HttpStatus { status: u16, body: String },
    #[error("failed to publish to topic {topic}: {source}")]
    Publish {
        topic: String,
        #[source]
        source: Box<BusError>,
    },
    #[error("invalid bus response: {0}")]
    InvalidResponse(String),
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("message data is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("message is missing the `{0}` attribute")]
    MissingAttribute(&'static str),
}
