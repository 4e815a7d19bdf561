// Core data structures for rollcall

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::recurrence::Recurrence;

/// Default event duration when a series does not override it
pub const DEFAULT_DURATION_MINUTES: u32 = 120;

/// Canonical chat-transport identity of an acting user.
///
/// Every capacity check, ledger reduction and admin operation compares actors
/// through this type; raw transport ids never leak into comparisons.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct ActorId(pub i64);

impl std::fmt::Display for ActorId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A participation action appended to the ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ParticipationAction {
    Join,
    PlusOne,
    Leave,
}

impl ParticipationAction {
    /// Convert to string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Join => "JOIN",
            Self::PlusOne => "PLUS_ONE",
            Self::Leave => "LEAVE",
        }
    }

    /// Capacity units this action occupies (a plus-one brings a guest)
    pub fn units(&self) -> u32 {
        match self {
            Self::Join => 1,
            Self::PlusOne => 2,
            Self::Leave => 0,
        }
    }

    /// Whether this action adds to the headcount
    pub fn is_additive(&self) -> bool {
        matches!(self, Self::Join | Self::PlusOne)
    }
}

impl std::str::FromStr for ParticipationAction {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "JOIN" => Ok(Self::Join),
            "PLUS_ONE" => Ok(Self::PlusOne),
            "LEAVE" => Ok(Self::Leave),
            other => Err(crate::error::Error::validation(format!(
                "unknown participation action '{other}'"
            ))),
        }
    }
}

/// An administrative intervention kind recorded in the audit trail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AuditAction {
    ParticipantAdded,
    ParticipantRemoved,
    RegistrationClosed,
    RegistrationExtended,
}

impl AuditAction {
    /// Convert to string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ParticipantAdded => "PARTICIPANT_ADDED",
            Self::ParticipantRemoved => "PARTICIPANT_REMOVED",
            Self::RegistrationClosed => "REGISTRATION_CLOSED",
            Self::RegistrationExtended => "REGISTRATION_EXTENDED",
        }
    }
}

impl std::str::FromStr for AuditAction {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PARTICIPANT_ADDED" => Ok(Self::ParticipantAdded),
            "PARTICIPANT_REMOVED" => Ok(Self::ParticipantRemoved),
            "REGISTRATION_CLOSED" => Ok(Self::RegistrationClosed),
            "REGISTRATION_EXTENDED" => Ok(Self::RegistrationExtended),
            other => Err(crate::error::Error::validation(format!(
                "unknown audit action '{other}'"
            ))),
        }
    }
}

/// Target group channel (and optional sub-topic) for announcements
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelTarget {
    /// Group chat id
    pub chat_id: i64,
    /// Optional sub-topic/thread inside the chat
    pub topic_id: Option<i64>,
}

/// Handle to a live announcement message, returned by the transport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageHandle {
    pub chat_id: i64,
    pub message_id: i64,
}

/// A recurring event definition owned by a tenant
///
/// Mutated only to toggle `is_active` (soft delete); instances and ledger
/// entries must stay attributable, so a series is never hard-deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventSeries {
    pub id: String,
    pub tenant_id: String,
    pub title: String,
    /// Canonical structured recurrence, validated once at the boundary
    pub recurrence: Recurrence,
    /// Timezone label the series was configured in (informational)
    pub timezone: String,
    /// Announcement target; None means manual announcement only
    pub channel: Option<ChannelTarget>,
    /// Capacity limit; None or 0 means unlimited
    pub max_participants: Option<u32>,
    /// Event duration override in minutes
    pub duration_minutes: Option<u32>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl EventSeries {
    /// Create a new active series with a fresh id
    pub fn new(
        tenant_id: impl Into<String>,
        title: impl Into<String>,
        recurrence: Recurrence,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            tenant_id: tenant_id.into(),
            title: title.into(),
            recurrence,
            timezone: "Europe/Helsinki".to_string(),
            channel: None,
            max_participants: None,
            duration_minutes: None,
            is_active: true,
            created_at: Utc::now(),
        }
    }

    /// Set the announcement channel
    pub fn with_channel(mut self, chat_id: i64, topic_id: Option<i64>) -> Self {
        self.channel = Some(ChannelTarget { chat_id, topic_id });
        self
    }

    /// Set the capacity limit
    pub fn with_max_participants(mut self, limit: u32) -> Self {
        self.max_participants = Some(limit);
        self
    }

    /// Set the timezone label
    pub fn with_timezone(mut self, tz: impl Into<String>) -> Self {
        self.timezone = tz.into();
        self
    }

    /// Effective capacity limit; `None` when unlimited (absent or zero)
    pub fn capacity_limit(&self) -> Option<u32> {
        self.max_participants.filter(|limit| *limit > 0)
    }

    /// Effective event duration in minutes
    pub fn duration(&self) -> u32 {
        self.duration_minutes.unwrap_or(DEFAULT_DURATION_MINUTES)
    }
}

/// A materialized occurrence of a series
///
/// At most one instance exists per `(series_id, start_time)` pair; that pair
/// is the idempotency key for materialization. The announcement handle is the
/// only field mutated after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventInstance {
    pub id: String,
    pub series_id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    /// Present only after a successful announcement
    pub announcement: Option<MessageHandle>,
}

impl EventInstance {
    /// Create an unannounced instance with a fresh id
    pub fn new(series: &EventSeries, start_time: DateTime<Utc>) -> Self {
        let end_time = start_time + chrono::Duration::minutes(series.duration() as i64);
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            series_id: series.id.clone(),
            start_time,
            end_time,
            announcement: None,
        }
    }

    /// Whether the instance has been announced to a channel
    pub fn is_announced(&self) -> bool {
        self.announcement.is_some()
    }
}

/// An immutable ledger entry; never updated or deleted
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParticipationRecord {
    /// Monotonic insertion id; the tie-breaker for latest-wins reduction
    pub id: i64,
    pub instance_id: String,
    pub actor: ActorId,
    pub action: ParticipationAction,
    pub recorded_at: DateTime<Utc>,
    /// Optional free-form payload (display name, note)
    pub payload: Option<serde_json::Value>,
}

/// Derived view row: an actor currently attending an instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub actor: ActorId,
    /// Latest additive action (Join or PlusOne)
    pub action: ParticipationAction,
}

impl Participant {
    /// Capacity units this participant occupies
    pub fn units(&self) -> u32 {
        self.action.units()
    }
}

/// An administrative intervention, recorded independently of the ledger
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    /// Monotonic insertion id
    pub id: i64,
    pub tenant_id: String,
    pub action: AuditAction,
    /// Structured detail payload; always embeds the instance id
    pub details: serde_json::Value,
    pub occurred_at: DateTime<Utc>,
}

impl AuditRecord {
    /// Instance id embedded in the detail payload, if present
    pub fn instance_id(&self) -> Option<&str> {
        self.details.get("instanceId").and_then(|v| v.as_str())
    }
}

/// A tenant administrator reachable for best-effort notices
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminRecipient {
    pub recipient: ActorId,
}
