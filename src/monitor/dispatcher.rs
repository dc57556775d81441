use std::sync::Arc;

use async_trait::async_trait;

use crate::monitor::classifier::ChangeSet;
use crate::monitor::record::ContainerRecord;
use crate::render::split_message;

#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Sink rejected message with status {status}: {body}")]
    Rejected { status: u16, body: String },
}

/// Destination for rendered notifications.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn deliver(&self, message: &str) -> Result<(), DeliveryError>;

    /// Longest message the sink accepts, if it has a limit.
    fn max_message_len(&self) -> Option<usize> {
        None
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub delivered: usize,
    pub failed: usize,
}

/// Renders one message per non-empty category of a [`ChangeSet`].
pub fn render_changes(changes: &ChangeSet) -> Vec<String> {
    let mut messages = Vec::new();

    if !changes.created.is_empty() {
        messages.push(render_section(
            "🆕 **Containers created:**",
            changes.created.iter().map(describe),
        ));
    }
    if !changes.removed.is_empty() {
        messages.push(render_section(
            "🗑️ **Containers removed:**",
            changes.removed.iter().map(describe),
        ));
    }
    if !changes.restarted.is_empty() {
        messages.push(render_section(
            "🔄 **Containers restarted:**",
            changes.restarted.iter().map(|r| match r.started_at {
                Some(started) => format!(
                    "{} (started {})",
                    describe(r),
                    started.format("%Y-%m-%d %H:%M:%S UTC")
                ),
                None => describe(r),
            }),
        ));
    }
    if !changes.status_changed.is_empty() {
        messages.push(render_section(
            "⚠️ **Container status changed:**",
            changes
                .status_changed
                .iter()
                .map(|c| format!("`{}`: {} → {}", c.record.display_name, c.old, c.new)),
        ));
    }

    messages
}

fn describe(record: &ContainerRecord) -> String {
    format!("`{}` - {}", record.display_name, record.image_reference)
}

fn render_section(header: &str, lines: impl Iterator<Item = String>) -> String {
    let mut out = header.to_string();
    for line in lines {
        out.push_str("\n  • ");
        out.push_str(&line);
    }
    out
}

/// Sends lifecycle notifications.
///
/// Without a sink every dispatch is a no-op. Each message is attempted once;
/// a failure is logged and the remaining messages are still sent.
#[derive(Clone, Default)]
pub struct Dispatcher {
    sink: Option<Arc<dyn NotificationSink>>,
}

impl Dispatcher {
    pub fn new(sink: Option<Arc<dyn NotificationSink>>) -> Self {
        if sink.is_none() {
            log::info!("No notification sink configured, lifecycle changes will only be logged");
        }
        Self { sink }
    }

    pub fn is_configured(&self) -> bool {
        self.sink.is_some()
    }

    pub async fn dispatch(&self, changes: &ChangeSet) -> DispatchReport {
        let mut report = DispatchReport::default();
        let Some(sink) = &self.sink else {
            return report;
        };

        for message in render_changes(changes) {
            for chunk in chunks_for(sink.as_ref(), message) {
                match sink.deliver(&chunk).await {
                    Ok(()) => report.delivered += 1,
                    Err(e) => {
                        log::warn!("Failed to deliver notification: {e}");
                        report.failed += 1;
                    }
                }
            }
        }

        report
    }

    /// Sends a single free-form message such as the startup notice.
    pub async fn announce(&self, message: &str) {
        let Some(sink) = &self.sink else {
            return;
        };
        for chunk in chunks_for(sink.as_ref(), message.to_string()) {
            if let Err(e) = sink.deliver(&chunk).await {
                log::warn!("Failed to deliver announcement: {e}");
            }
        }
    }
}

fn chunks_for(sink: &dyn NotificationSink, message: String) -> Vec<String> {
    match sink.max_message_len() {
        Some(limit) => split_message(&message, limit),
        None => vec![message],
    }
}
