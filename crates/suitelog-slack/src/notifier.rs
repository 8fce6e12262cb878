//! Find-or-create thread placement for harvested logs.

use std::time::Duration;

use suitelog_bus::MessageAttributes;

use crate::api_client::SlackClient;
use crate::NotifyError;

const LOG_FILENAME: &str = "logs.txt";
const LOG_TITLE: &str = "Test logs";

/// Deterministic parent-message text for a run; doubles as the lookup key
/// when scanning channel history.
pub fn anchor_text(attributes: &MessageAttributes) -> String {
    format!(
        "Suite run {}, completion time {}, platform {}",
        attributes.run_name, attributes.completion_time, attributes.platform
    )
}

#[derive(Debug, Clone)]
pub struct NotifierConfig {
    pub channel_id: String,
    pub history_limit: usize,
    /// Grace period before attaching the upload, giving the chat backend time
    /// to index a freshly posted parent. Operational workaround, zero in tests.
    pub settle_delay: Duration,
}

pub struct ThreadNotifier {
    client: SlackClient,
    config: NotifierConfig,
}

impl ThreadNotifier {
    pub fn new(client: SlackClient, config: NotifierConfig) -> Self {
        Self { client, config }
    }

    /// Delivers one decoded log message into the channel: reuse the run's
    /// parent message if its anchor text already appears in recent history,
    /// otherwise post it, then upload the log threaded under that parent.
    ///
    /// The history-scan-then-post window is not atomic; two deliveries for
    /// the same run can both post a parent. That duplication is accepted
    /// rather than locked away, and redelivery re-runs this whole procedure.
    /// Returns the thread timestamp the upload was attached to.
    pub async fn notify(
        &self,
        payload: &[u8],
        attributes: &MessageAttributes,
    ) -> Result<String, NotifyError> {
        let anchor = anchor_text(attributes);

        let history = self
            .client
            .channel_history(&self.config.channel_id, self.config.history_limit)
            .await
            .map_err(|source| NotifyError::HistoryLookup { source })?;

        let thread_ts = match history.iter().find(|message| message.text == anchor) {
            Some(existing) => existing.ts.clone(),
            None => self
                .client
                .post_message(&self.config.channel_id, &anchor)
                .await
                .map_err(|source| NotifyError::ParentPost { source })?,
        };

        if !self.config.settle_delay.is_zero() {
            tokio::time::sleep(self.config.settle_delay).await;
        }

        let initial_comment = format!("Test {}, status: {}", attributes.name, attributes.status);
        self.client
            .upload_file(
                &self.config.channel_id,
                &thread_ts,
                LOG_FILENAME,
                LOG_TITLE,
                payload,
                &initial_comment,
            )
            .await
            .map_err(|source| NotifyError::Upload {
                thread_ts: thread_ts.clone(),
                source,
            })?;

        Ok(thread_ts)
    }
}
