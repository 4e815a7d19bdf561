//! Outbound transport seams
//!
//! The core never talks to a chat platform directly; it goes through the
//! traits here. Production wires the webhook implementation, tests wire
//! [`RecordingTransport`]. Delivery is best-effort everywhere: callers log
//! failures and keep the state change that triggered the send.

pub mod webhook;

pub use webhook::{WebhookConfig, WebhookTransport};

use async_trait::async_trait;
use std::sync::Mutex;

use crate::error::Result;
use crate::models::{
    ActorId, AdminRecipient, ChannelTarget, EventInstance, EventSeries, MessageHandle,
    Participant, ParticipationAction,
};

// ============================================================================
// Traits
// ============================================================================

/// Publishes and edits live announcement messages in group channels
#[async_trait]
pub trait AnnouncementPublisher: Send + Sync {
    /// Post a new announcement; returns the handle needed for later edits
    async fn publish(
        &self,
        channel: ChannelTarget,
        text: &str,
        instance_id: &str,
    ) -> Result<MessageHandle>;

    /// Replace the text of a previously published announcement
    async fn edit(&self, handle: MessageHandle, text: &str) -> Result<()>;
}

/// Resolves and reaches tenant administrators
#[async_trait]
pub trait AdminDirectory: Send + Sync {
    async fn list_admins(&self, tenant_id: &str) -> Result<Vec<AdminRecipient>>;

    /// Direct notice to one admin
    async fn notify(&self, recipient: ActorId, text: &str) -> Result<()>;
}

/// Renders the announcement body for an instance
pub trait AttendanceFormatter: Send + Sync {
    fn render(
        &self,
        series: &EventSeries,
        instance: &EventInstance,
        participants: &[Participant],
    ) -> String;
}

// ============================================================================
// Default Formatter
// ============================================================================

/// Plain-text announcement body: title, start time, numbered attendee list
/// with plus-one markers, and the headcount line.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultFormatter;

impl AttendanceFormatter for DefaultFormatter {
    fn render(
        &self,
        series: &EventSeries,
        instance: &EventInstance,
        participants: &[Participant],
    ) -> String {
        let mut out = format!(
            "{}\n{}\n",
            series.title,
            instance.start_time.format("%a %d %b %Y, %H:%M UTC"),
        );

        if participants.is_empty() {
            out.push_str("\nNo one has joined yet.\n");
        } else {
            out.push('\n');
            for (n, p) in participants.iter().enumerate() {
                let guest = match p.action {
                    ParticipationAction::PlusOne => " (+1)",
                    _ => "",
                };
                out.push_str(&format!("{}. {}{}\n", n + 1, p.actor, guest));
            }
        }

        let headcount: u32 = participants.iter().map(Participant::units).sum();
        match series.capacity_limit() {
            Some(limit) => out.push_str(&format!("\nGoing: {headcount}/{limit}\n")),
            None => out.push_str(&format!("\nGoing: {headcount}\n")),
        }
        out
    }
}

// ============================================================================
// Disabled Transport
// ============================================================================

/// Transport used when no gateway is configured.
///
/// Publishing fails as a delivery error so instances stay unannounced for a
/// later manual announce; admin lookups resolve to nobody.
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledTransport;

#[async_trait]
impl AnnouncementPublisher for DisabledTransport {
    async fn publish(
        &self,
        _channel: ChannelTarget,
        _text: &str,
        instance_id: &str,
    ) -> Result<MessageHandle> {
        tracing::debug!(instance_id, "no transport configured, announcement skipped");
        Err(crate::error::Error::delivery("no transport configured"))
    }

    async fn edit(&self, _handle: MessageHandle, _text: &str) -> Result<()> {
        Err(crate::error::Error::delivery("no transport configured"))
    }
}

#[async_trait]
impl AdminDirectory for DisabledTransport {
    async fn list_admins(&self, _tenant_id: &str) -> Result<Vec<AdminRecipient>> {
        Ok(Vec::new())
    }

    async fn notify(&self, _recipient: ActorId, _text: &str) -> Result<()> {
        Ok(())
    }
}

// ============================================================================
// Recording Transport (for testing)
// ============================================================================

/// A published message captured by [`RecordingTransport`]
#[derive(Debug, Clone)]
pub struct PublishedMessage {
    pub channel: ChannelTarget,
    pub instance_id: String,
    pub text: String,
    pub handle: MessageHandle,
}

/// In-memory transport double that records every outbound call
#[derive(Default)]
pub struct RecordingTransport {
    published: Mutex<Vec<PublishedMessage>>,
    edits: Mutex<Vec<(MessageHandle, String)>>,
    notices: Mutex<Vec<(ActorId, String)>>,
    admins: Mutex<Vec<AdminRecipient>>,
    fail_publish: Mutex<bool>,
    fail_edit: Mutex<bool>,
    next_message_id: Mutex<i64>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register admins returned for every tenant
    pub fn with_admins(self, actors: &[i64]) -> Self {
        *self.admins.lock().unwrap() = actors
            .iter()
            .map(|&id| AdminRecipient {
                recipient: ActorId(id),
            })
            .collect();
        self
    }

    /// Make subsequent publish calls fail
    pub fn fail_publishes(&self) {
        *self.fail_publish.lock().unwrap() = true;
    }

    /// Make subsequent edit calls fail
    pub fn fail_edits(&self) {
        *self.fail_edit.lock().unwrap() = true;
    }

    pub fn published(&self) -> Vec<PublishedMessage> {
        self.published.lock().unwrap().clone()
    }

    pub fn edits(&self) -> Vec<(MessageHandle, String)> {
        self.edits.lock().unwrap().clone()
    }

    pub fn notices(&self) -> Vec<(ActorId, String)> {
        self.notices.lock().unwrap().clone()
    }
}

#[async_trait]
impl AnnouncementPublisher for RecordingTransport {
    async fn publish(
        &self,
        channel: ChannelTarget,
        text: &str,
        instance_id: &str,
    ) -> Result<MessageHandle> {
        if *self.fail_publish.lock().unwrap() {
            return Err(crate::error::Error::delivery("publish refused by test"));
        }
        let mut next = self.next_message_id.lock().unwrap();
        *next += 1;
        let handle = MessageHandle {
            chat_id: channel.chat_id,
            message_id: *next,
        };
        self.published.lock().unwrap().push(PublishedMessage {
            channel,
            instance_id: instance_id.to_string(),
            text: text.to_string(),
            handle,
        });
        Ok(handle)
    }

    async fn edit(&self, handle: MessageHandle, text: &str) -> Result<()> {
        if *self.fail_edit.lock().unwrap() {
            return Err(crate::error::Error::delivery("edit refused by test"));
        }
        self.edits.lock().unwrap().push((handle, text.to_string()));
        Ok(())
    }
}

#[async_trait]
impl AdminDirectory for RecordingTransport {
    async fn list_admins(&self, _tenant_id: &str) -> Result<Vec<AdminRecipient>> {
        Ok(self.admins.lock().unwrap().clone())
    }

    async fn notify(&self, recipient: ActorId, text: &str) -> Result<()> {
        self.notices
            .lock()
            .unwrap()
            .push((recipient, text.to_string()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recurrence::{Frequency, Recurrence};
    use chrono::{TimeZone, Utc};

    fn fixture() -> (EventSeries, EventInstance) {
        let anchor = Utc.with_ymd_and_hms(2024, 1, 1, 18, 0, 0).unwrap();
        let series = EventSeries::new(
            "t-1",
            "Weekly run",
            Recurrence::new(anchor, Frequency::Weekly),
        )
        .with_max_participants(10);
        let start = Utc.with_ymd_and_hms(2024, 3, 4, 18, 0, 0).unwrap();
        let instance = EventInstance::new(&series, start);
        (series, instance)
    }

    #[test]
    fn test_formatter_empty_list() {
        let (series, instance) = fixture();
        let text = DefaultFormatter.render(&series, &instance, &[]);
        assert!(text.starts_with("Weekly run\n"));
        assert!(text.contains("No one has joined yet."));
        assert!(text.contains("Going: 0/10"));
    }

    #[test]
    fn test_formatter_counts_plus_one_units() {
        let (series, instance) = fixture();
        let participants = vec![
            Participant {
                actor: ActorId(1),
                action: ParticipationAction::Join,
            },
            Participant {
                actor: ActorId(2),
                action: ParticipationAction::PlusOne,
            },
        ];
        let text = DefaultFormatter.render(&series, &instance, &participants);
        assert!(text.contains("1. 1\n"));
        assert!(text.contains("2. 2 (+1)\n"));
        assert!(text.contains("Going: 3/10"));
    }

    #[test]
    fn test_formatter_unlimited_series() {
        let (mut series, instance) = fixture();
        series.max_participants = None;
        let text = DefaultFormatter.render(&series, &instance, &[]);
        assert!(text.contains("Going: 0\n"));
    }

    #[tokio::test]
    async fn test_recording_transport_assigns_handles() {
        let transport = RecordingTransport::new();
        let channel = ChannelTarget {
            chat_id: -100,
            topic_id: None,
        };

        let first = transport.publish(channel, "hello", "i-1").await.unwrap();
        let second = transport.publish(channel, "again", "i-2").await.unwrap();
        assert_ne!(first.message_id, second.message_id);
        assert_eq!(transport.published().len(), 2);

        transport.edit(first, "edited").await.unwrap();
        assert_eq!(transport.edits(), vec![(first, "edited".to_string())]);
    }

    #[tokio::test]
    async fn test_recording_transport_failure_switch() {
        let transport = RecordingTransport::new();
        transport.fail_publishes();
        let channel = ChannelTarget {
            chat_id: -100,
            topic_id: None,
        };
        let err = transport.publish(channel, "hello", "i-1").await.unwrap_err();
        assert!(err.is_recoverable());
        assert!(transport.published().is_empty());
    }
}
