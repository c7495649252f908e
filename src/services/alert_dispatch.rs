//! Delivery side of operational alerts.
//!
//! [`AlertLayer`] hooks into the `tracing` subscriber and offers every event
//! at or above its minimum level to the [`AlertDeduplicator`]. Accepted alerts
//! travel over a channel to [`spawn_alert_dispatcher`], which owns the sink
//! and the flush / prune timers.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer};

use crate::services::alert_dedup::{AlertDecision, AlertDeduplicator, AlertEntry};
use crate::services::clock::SharedClock;

/// Events from this module are never turned into alerts
const DISPATCH_TARGET: &str = module_path!();

#[derive(Debug, Error)]
pub enum AlertSinkError {
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Webhook rejected alerts with status {0}")]
    Rejected(u16),
}

#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn send(&self, alerts: &[AlertEntry]) -> Result<(), AlertSinkError>;
}

/// Posts alerts as JSON to a webhook
pub struct WebhookAlertSink {
    client: Client,
    url: String,
}

impl WebhookAlertSink {
    pub fn new(url: String) -> Result<Self, AlertSinkError> {
        let client = Client::builder().timeout(Duration::from_secs(10)).build()?;
        Ok(Self { client, url })
    }
}

#[async_trait]
impl AlertSink for WebhookAlertSink {
    async fn send(&self, alerts: &[AlertEntry]) -> Result<(), AlertSinkError> {
        let response = self
            .client
            .post(&self.url)
            .json(&json!({ "alerts": alerts }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(AlertSinkError::Rejected(response.status().as_u16()));
        }
        Ok(())
    }
}

/// Fallback sink when no webhook is configured
pub struct LogAlertSink;

#[async_trait]
impl AlertSink for LogAlertSink {
    async fn send(&self, alerts: &[AlertEntry]) -> Result<(), AlertSinkError> {
        for alert in alerts {
            tracing::info!(
                level = %alert.level,
                source = %alert.source,
                fields = %alert.fields,
                "ALERT: {}",
                alert.message
            );
        }
        Ok(())
    }
}

#[derive(Default)]
struct MessageVisitor {
    message: Option<String>,
    fields: Vec<String>,
}

impl Visit for MessageVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = Some(value.to_string());
        } else {
            self.fields.push(format!("{}={}", field.name(), value));
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            self.message = Some(format!("{:?}", value));
        } else {
            self.fields.push(format!("{}={:?}", field.name(), value));
        }
    }
}

pub struct AlertLayer {
    dedup: Arc<AlertDeduplicator>,
    clock: SharedClock,
    min_level: Level,
    tx: mpsc::UnboundedSender<Vec<AlertEntry>>,
}

impl AlertLayer {
    pub fn new(
        dedup: Arc<AlertDeduplicator>,
        clock: SharedClock,
        min_level: Level,
    ) -> (Self, mpsc::UnboundedReceiver<Vec<AlertEntry>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                dedup,
                clock,
                min_level,
                tx,
            },
            rx,
        )
    }

    fn entry_from(&self, event: &Event<'_>) -> AlertEntry {
        let metadata = event.metadata();
        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);

        let source = match (metadata.file(), metadata.line()) {
            (Some(file), Some(line)) => format!("{}:{}", file, line),
            _ => metadata.target().to_string(),
        };

        AlertEntry {
            level: metadata.level().to_string(),
            message: visitor.message.unwrap_or_default(),
            fields: visitor.fields.join(" "),
            source,
            at: self.clock.now(),
        }
    }
}

impl<S: Subscriber> Layer<S> for AlertLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();
        // Lower levels are more severe: ERROR < WARN < INFO
        if *metadata.level() > self.min_level || metadata.target() == DISPATCH_TARGET {
            return;
        }

        let entry = self.entry_from(event);
        if self.dedup.offer(&entry) == AlertDecision::SendNow {
            // Receiver gone means the dispatcher shut down; nothing left to do
            let _ = self.tx.send(vec![entry]);
        }
    }
}

/// Start the delivery loop plus the batch-flush and fingerprint-prune timers
pub fn spawn_alert_dispatcher(
    dedup: Arc<AlertDeduplicator>,
    sink: Arc<dyn AlertSink>,
    mut rx: mpsc::UnboundedReceiver<Vec<AlertEntry>>,
) {
    let deliver_sink = sink.clone();
    tokio::spawn(async move {
        while let Some(alerts) = rx.recv().await {
            if let Err(e) = deliver_sink.send(&alerts).await {
                tracing::debug!(error = %e, count = alerts.len(), "Alert delivery failed");
            }
        }
    });

    if let Some(window) = dedup.config().batch_window.and_then(|w| w.to_std().ok()) {
        let dedup = dedup.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(window);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let batch = dedup.take_batch();
                if batch.is_empty() {
                    continue;
                }
                if let Err(e) = sink.send(&batch).await {
                    tracing::debug!(error = %e, count = batch.len(), "Alert batch delivery failed");
                }
            }
        });
    }

    let prune_every = dedup
        .config()
        .cooldown
        .to_std()
        .unwrap_or(Duration::from_secs(300))
        .max(Duration::from_secs(1));
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(prune_every);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let pruned = dedup.prune();
            if pruned > 0 {
                tracing::debug!(pruned, "Pruned alert fingerprints");
            }
        }
    });
}
