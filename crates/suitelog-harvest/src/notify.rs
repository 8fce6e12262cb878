//! Consumer-side loop: pull delivered log messages, thread them into Slack,
//! and acknowledge only what was actually delivered.

use std::time::Duration;

use anyhow::{Context, Result};
use suitelog_bus::BusClient;
use suitelog_slack::ThreadNotifier;
use tokio::sync::watch;

#[derive(Debug, Clone)]
pub struct NotifyLoopConfig {
    pub subscription_id: String,
    pub max_messages: usize,
    pub poll_interval: Duration,
}

#[derive(Debug, Default)]
pub struct NotifyReport {
    pub delivered: usize,
    pub notified: usize,
    pub failed: usize,
}

/// Pulls one batch and notifies each message. Messages that fail to decode
/// or deliver are left unacknowledged so the bus redelivers them.
pub async fn run_notify_once(
    bus: &BusClient,
    subscription_id: &str,
    notifier: &ThreadNotifier,
    max_messages: usize,
) -> Result<NotifyReport> {
    let delivered = bus
        .pull(subscription_id, max_messages)
        .await
        .with_context(|| format!("while pulling from subscription {subscription_id}"))?;

    let mut report = NotifyReport {
        delivered: delivered.len(),
        ..NotifyReport::default()
    };
    let mut ack_ids = Vec::with_capacity(delivered.len());

    for message in &delivered {
        let body = match message.body() {
            Ok(body) => body,
            Err(error) => {
                tracing::warn!(
                    message_id = %message.message_id,
                    error = %error,
                    "skipping message with undecodable payload"
                );
                report.failed += 1;
                continue;
            }
        };
        let attributes = match body.typed_attributes() {
            Ok(attributes) => attributes,
            Err(error) => {
                tracing::warn!(
                    message_id = %message.message_id,
                    error = %error,
                    "skipping message with unusable attributes"
                );
                report.failed += 1;
                continue;
            }
        };

        match notifier.notify(&body.payload, &attributes).await {
            Ok(thread_ts) => {
                tracing::info!(
                    message_id = %message.message_id,
                    run = %attributes.run_name,
                    test = %attributes.name,
                    thread_ts = %thread_ts,
                    "filed log into run thread"
                );
                ack_ids.push(message.ack_id.clone());
                report.notified += 1;
            }
            Err(error) => {
                tracing::warn!(
                    message_id = %message.message_id,
                    run = %attributes.run_name,
                    error = %error,
                    "failed to notify, leaving message for redelivery"
                );
                report.failed += 1;
            }
        }
    }

    bus.acknowledge(subscription_id, &ack_ids)
        .await
        .with_context(|| format!("while acknowledging on subscription {subscription_id}"))?;

    Ok(report)
}

/// Repeats [`run_notify_once`] until the shutdown signal flips. A failed
/// cycle is logged and the loop keeps polling.
pub async fn run_notify_loop(
    bus: &BusClient,
    notifier: &ThreadNotifier,
    config: &NotifyLoopConfig,
    mut shutdown: watch::Receiver<bool>,
) -> Result<()> {
    loop {
        if *shutdown.borrow() {
            return Ok(());
        }

        match run_notify_once(bus, &config.subscription_id, notifier, config.max_messages).await {
            Ok(report) if report.delivered > 0 => {
                tracing::info!(
                    delivered = report.delivered,
                    notified = report.notified,
                    failed = report.failed,
                    "processed notify batch"
                );
            }
            Ok(_) => {}
            Err(error) => {
                tracing::warn!(error = %format!("{error:#}"), "notify cycle failed");
            }
        }

        tokio::select! {
            _ = tokio::time::sleep(config.poll_interval) => {}
            _ = shutdown.changed() => {}
        }
    }
}
