//! Repository traits and their SQLite / in-memory implementations
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Business Logic                          │
//! │        (materializer, ledger, audit, attendance)            │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   Repository Traits                         │
//! │   SeriesRepository, InstanceRepository, LedgerRepository,   │
//! │                     AuditRepository                         │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                  ┌───────────┴───────────┐
//!                  ▼                       ▼
//!         ┌─────────────────┐     ┌─────────────────┐
//!         │   SqliteStore   │     │   MemoryStore   │
//!         └─────────────────┘     └─────────────────┘
//! ```

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, RwLock};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use crate::error::{Error, Result};
use crate::models::{
    AuditAction, AuditRecord, ChannelTarget, EventInstance, EventSeries, MessageHandle,
    ActorId, ParticipationAction, ParticipationRecord,
};
use crate::recurrence::Recurrence;

// ============================================================================
// Repository Traits
// ============================================================================

/// Repository for event series
pub trait SeriesRepository: Send + Sync {
    /// Persist a new series
    fn create_series(&self, series: &EventSeries) -> Result<()>;

    /// Get a series by id
    fn get_series(&self, id: &str) -> Result<Option<EventSeries>>;

    /// All active series across tenants (the materializer's work list)
    fn list_active_series(&self) -> Result<Vec<EventSeries>>;

    /// Active series owned by one tenant
    fn list_active_series_for_tenant(&self, tenant_id: &str) -> Result<Vec<EventSeries>>;

    /// Toggle the active flag (soft delete); returns false when the series
    /// does not exist. Series are never hard-deleted.
    fn set_series_active(&self, id: &str, active: bool) -> Result<bool>;
}

/// Repository for materialized instances
pub trait InstanceRepository: Send + Sync {
    /// Insert the instance unless one already exists for the same
    /// `(series_id, start_time)` pair; returns true when a row was created.
    ///
    /// This is the correctness backstop for materialization idempotency.
    fn create_instance_if_absent(&self, instance: &EventInstance) -> Result<bool>;

    /// Get an instance by id
    fn get_instance(&self, id: &str) -> Result<Option<EventInstance>>;

    /// Find an instance by its idempotency key
    fn find_instance_at(
        &self,
        series_id: &str,
        start_time: DateTime<Utc>,
    ) -> Result<Option<EventInstance>>;

    /// Instances of a series starting at or after `from`, soonest first
    fn upcoming_instances(
        &self,
        series_id: &str,
        from: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<EventInstance>>;

    /// Store the announcement handle (set once after a successful publish)
    fn set_announcement(&self, instance_id: &str, handle: MessageHandle) -> Result<()>;
}

/// Repository for the append-only participation log
pub trait LedgerRepository: Send + Sync {
    /// Append a record; the store assigns the monotonic insertion id
    fn append_participation(
        &self,
        instance_id: &str,
        actor: ActorId,
        action: ParticipationAction,
        payload: Option<serde_json::Value>,
    ) -> Result<ParticipationRecord>;

    /// All records for an instance in insertion order (oldest first)
    fn participation_for_instance(&self, instance_id: &str)
        -> Result<Vec<ParticipationRecord>>;
}

/// One page of audit records for an instance
#[derive(Debug, Clone)]
pub struct AuditPage {
    /// Matching records, newest first
    pub records: Vec<AuditRecord>,
    /// Total matching records regardless of the limit
    pub total: usize,
    /// Whether more records exist beyond this page
    pub has_more: bool,
}

/// Repository for the append-only audit log
pub trait AuditRepository: Send + Sync {
    /// Append an audit record; the store assigns the insertion id
    fn append_audit(
        &self,
        tenant_id: &str,
        action: AuditAction,
        details: serde_json::Value,
    ) -> Result<AuditRecord>;

    /// Records whose detail payload references `instance_id`, newest first.
    /// `limit == 0` means all.
    fn audit_for_instance(&self, instance_id: &str, limit: usize) -> Result<AuditPage>;
}

/// Combined storage interface
pub trait Store:
    SeriesRepository + InstanceRepository + LedgerRepository + AuditRepository
{
}

impl<T> Store for T where
    T: SeriesRepository + InstanceRepository + LedgerRepository + AuditRepository
{
}

/// Thread-safe shared store handle
pub type SharedStore = Arc<dyn Store>;

// ============================================================================
// SQLite Implementation
// ============================================================================

/// SQLite-backed store
///
/// Uses `Mutex` to ensure thread-safety for the SQLite connection.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) a store at the given path
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;

        // WAL for better concurrency between the driver and vote handlers
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;

        let store = Self {
            conn: Mutex::new(conn),
        };
        store.create_schema()?;

        tracing::info!(path = %path.display(), "SQLite store initialized");
        Ok(store)
    }

    /// Create in-memory store (for testing)
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.create_schema()?;
        Ok(store)
    }

    fn create_schema(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS event_series (
                id TEXT PRIMARY KEY,
                tenant_id TEXT NOT NULL,
                title TEXT NOT NULL,
                recurrence TEXT NOT NULL,
                timezone TEXT NOT NULL,
                chat_id INTEGER,
                topic_id INTEGER,
                max_participants INTEGER,
                duration_minutes INTEGER,
                is_active INTEGER NOT NULL DEFAULT 1,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_event_series_tenant
                ON event_series(tenant_id, is_active);

            CREATE TABLE IF NOT EXISTS event_instances (
                id TEXT PRIMARY KEY,
                series_id TEXT NOT NULL REFERENCES event_series(id),
                start_time TEXT NOT NULL,
                end_time TEXT NOT NULL,
                announcement_chat_id INTEGER,
                announcement_message_id INTEGER,
                UNIQUE(series_id, start_time)
            );

            CREATE INDEX IF NOT EXISTS idx_event_instances_series
                ON event_instances(series_id, start_time);

            CREATE TABLE IF NOT EXISTS participation_log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                instance_id TEXT NOT NULL,
                actor_id INTEGER NOT NULL,
                action TEXT NOT NULL,
                recorded_at TEXT NOT NULL,
                payload TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_participation_log_instance
                ON participation_log(instance_id, id);

            CREATE TABLE IF NOT EXISTS audit_log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                tenant_id TEXT NOT NULL,
                action TEXT NOT NULL,
                details TEXT NOT NULL,
                occurred_at TEXT NOT NULL
            );
            "#,
        )?;

        Ok(())
    }

    fn row_to_series(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawSeriesRow> {
        Ok(RawSeriesRow {
            id: row.get(0)?,
            tenant_id: row.get(1)?,
            title: row.get(2)?,
            recurrence: row.get(3)?,
            timezone: row.get(4)?,
            chat_id: row.get(5)?,
            topic_id: row.get(6)?,
            max_participants: row.get(7)?,
            duration_minutes: row.get(8)?,
            is_active: row.get(9)?,
            created_at: row.get(10)?,
        })
    }

    fn row_to_instance(row: &rusqlite::Row<'_>) -> rusqlite::Result<EventInstance> {
        let chat_id: Option<i64> = row.get(4)?;
        let message_id: Option<i64> = row.get(5)?;
        Ok(EventInstance {
            id: row.get(0)?,
            series_id: row.get(1)?,
            start_time: parse_ts_column(row, 2)?,
            end_time: parse_ts_column(row, 3)?,
            announcement: match (chat_id, message_id) {
                (Some(chat_id), Some(message_id)) => Some(MessageHandle {
                    chat_id,
                    message_id,
                }),
                _ => None,
            },
        })
    }
}

const SERIES_COLUMNS: &str = "id, tenant_id, title, recurrence, timezone, chat_id, topic_id, \
     max_participants, duration_minutes, is_active, created_at";

const INSTANCE_COLUMNS: &str =
    "id, series_id, start_time, end_time, announcement_chat_id, announcement_message_id";

/// Raw series row before recurrence parsing
struct RawSeriesRow {
    id: String,
    tenant_id: String,
    title: String,
    recurrence: String,
    timezone: String,
    chat_id: Option<i64>,
    topic_id: Option<i64>,
    max_participants: Option<u32>,
    duration_minutes: Option<u32>,
    is_active: bool,
    created_at: String,
}

impl RawSeriesRow {
    fn into_series(self) -> Result<EventSeries> {
        let created_at = parse_ts(&self.created_at)?;
        // Stored rules are canonical and carry DTSTART; created_at is the
        // fallback anchor for rows written before that convention
        let recurrence = Recurrence::parse(&self.recurrence, created_at)?;
        Ok(EventSeries {
            id: self.id,
            tenant_id: self.tenant_id,
            title: self.title,
            recurrence,
            timezone: self.timezone,
            channel: self.chat_id.map(|chat_id| ChannelTarget {
                chat_id,
                topic_id: self.topic_id,
            }),
            max_participants: self.max_participants,
            duration_minutes: self.duration_minutes,
            is_active: self.is_active,
            created_at,
        })
    }
}

/// Parse a stored RFC 3339 timestamp. A row that fails here is corrupt and
/// the read must fail loudly rather than invent a time.
fn parse_ts(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::validation(format!("malformed stored timestamp {value:?}: {e}")))
}

/// Same parse inside a rusqlite row-mapping closure
fn parse_ts_column(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let text: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&text)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(
                idx,
                rusqlite::types::Type::Text,
                Box::new(e),
            )
        })
}

impl SeriesRepository for SqliteStore {
    fn create_series(&self, series: &EventSeries) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"
            INSERT INTO event_series
                (id, tenant_id, title, recurrence, timezone, chat_id, topic_id,
                 max_participants, duration_minutes, is_active, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#,
            params![
                series.id,
                series.tenant_id,
                series.title,
                series.recurrence.to_rule_string(),
                series.timezone,
                series.channel.map(|c| c.chat_id),
                series.channel.and_then(|c| c.topic_id),
                series.max_participants,
                series.duration_minutes,
                series.is_active,
                series.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    fn get_series(&self, id: &str) -> Result<Option<EventSeries>> {
        let conn = self.conn.lock().unwrap();
        let raw = conn
            .query_row(
                &format!("SELECT {SERIES_COLUMNS} FROM event_series WHERE id = ?1"),
                params![id],
                Self::row_to_series,
            )
            .optional()?;
        raw.map(RawSeriesRow::into_series).transpose()
    }

    fn list_active_series(&self) -> Result<Vec<EventSeries>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {SERIES_COLUMNS} FROM event_series WHERE is_active = 1 ORDER BY created_at"
        ))?;
        let rows: Vec<RawSeriesRow> = stmt
            .query_map([], Self::row_to_series)?
            .collect::<rusqlite::Result<_>>()?;
        rows.into_iter().map(RawSeriesRow::into_series).collect()
    }

    fn list_active_series_for_tenant(&self, tenant_id: &str) -> Result<Vec<EventSeries>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {SERIES_COLUMNS} FROM event_series \
             WHERE tenant_id = ?1 AND is_active = 1 ORDER BY created_at"
        ))?;
        let rows: Vec<RawSeriesRow> = stmt
            .query_map(params![tenant_id], Self::row_to_series)?
            .collect::<rusqlite::Result<_>>()?;
        rows.into_iter().map(RawSeriesRow::into_series).collect()
    }

    fn set_series_active(&self, id: &str, active: bool) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute(
            "UPDATE event_series SET is_active = ?2 WHERE id = ?1",
            params![id, active],
        )?;
        Ok(changed > 0)
    }
}

impl InstanceRepository for SqliteStore {
    fn create_instance_if_absent(&self, instance: &EventInstance) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        // INSERT OR IGNORE rides on UNIQUE(series_id, start_time); a second
        // writer racing on the same occurrence changes zero rows
        let changed = conn.execute(
            r#"
            INSERT OR IGNORE INTO event_instances
                (id, series_id, start_time, end_time)
            VALUES (?1, ?2, ?3, ?4)
            "#,
            params![
                instance.id,
                instance.series_id,
                instance.start_time.to_rfc3339(),
                instance.end_time.to_rfc3339(),
            ],
        )?;
        Ok(changed > 0)
    }

    fn get_instance(&self, id: &str) -> Result<Option<EventInstance>> {
        let conn = self.conn.lock().unwrap();
        let instance = conn
            .query_row(
                &format!("SELECT {INSTANCE_COLUMNS} FROM event_instances WHERE id = ?1"),
                params![id],
                Self::row_to_instance,
            )
            .optional()?;
        Ok(instance)
    }

    fn find_instance_at(
        &self,
        series_id: &str,
        start_time: DateTime<Utc>,
    ) -> Result<Option<EventInstance>> {
        let conn = self.conn.lock().unwrap();
        let instance = conn
            .query_row(
                &format!(
                    "SELECT {INSTANCE_COLUMNS} FROM event_instances \
                     WHERE series_id = ?1 AND start_time = ?2"
                ),
                params![series_id, start_time.to_rfc3339()],
                Self::row_to_instance,
            )
            .optional()?;
        Ok(instance)
    }

    fn upcoming_instances(
        &self,
        series_id: &str,
        from: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<EventInstance>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {INSTANCE_COLUMNS} FROM event_instances \
             WHERE series_id = ?1 AND start_time >= ?2 \
             ORDER BY start_time ASC LIMIT ?3"
        ))?;
        let rows = stmt
            .query_map(
                params![series_id, from.to_rfc3339(), limit as i64],
                Self::row_to_instance,
            )?
            .collect::<rusqlite::Result<_>>()?;
        Ok(rows)
    }

    fn set_announcement(&self, instance_id: &str, handle: MessageHandle) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute(
            "UPDATE event_instances \
             SET announcement_chat_id = ?2, announcement_message_id = ?3 \
             WHERE id = ?1",
            params![instance_id, handle.chat_id, handle.message_id],
        )?;
        if changed == 0 {
            return Err(Error::instance_not_found(instance_id));
        }
        Ok(())
    }
}

impl LedgerRepository for SqliteStore {
    fn append_participation(
        &self,
        instance_id: &str,
        actor: ActorId,
        action: ParticipationAction,
        payload: Option<serde_json::Value>,
    ) -> Result<ParticipationRecord> {
        let conn = self.conn.lock().unwrap();
        let recorded_at = Utc::now();
        let payload_text = payload
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        conn.execute(
            r#"
            INSERT INTO participation_log (instance_id, actor_id, action, recorded_at, payload)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
            params![
                instance_id,
                actor.0,
                action.as_str(),
                recorded_at.to_rfc3339(),
                payload_text,
            ],
        )?;
        Ok(ParticipationRecord {
            id: conn.last_insert_rowid(),
            instance_id: instance_id.to_string(),
            actor,
            action,
            recorded_at,
            payload,
        })
    }

    fn participation_for_instance(
        &self,
        instance_id: &str,
    ) -> Result<Vec<ParticipationRecord>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, instance_id, actor_id, action, recorded_at, payload \
             FROM participation_log WHERE instance_id = ?1 ORDER BY id ASC",
        )?;
        let rows: Vec<(i64, String, i64, String, String, Option<String>)> = stmt
            .query_map(params![instance_id], |row| {
                Ok((
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    row.get(4)?,
                    row.get(5)?,
                ))
            })?
            .collect::<rusqlite::Result<_>>()?;

        rows.into_iter()
            .map(|(id, instance_id, actor_id, action, recorded_at, payload)| {
                Ok(ParticipationRecord {
                    id,
                    instance_id,
                    actor: ActorId(actor_id),
                    action: action.parse()?,
                    recorded_at: parse_ts(&recorded_at)?,
                    payload: payload
                        .map(|text| serde_json::from_str(&text))
                        .transpose()?,
                })
            })
            .collect()
    }
}

impl AuditRepository for SqliteStore {
    fn append_audit(
        &self,
        tenant_id: &str,
        action: AuditAction,
        details: serde_json::Value,
    ) -> Result<AuditRecord> {
        let conn = self.conn.lock().unwrap();
        let occurred_at = Utc::now();
        conn.execute(
            r#"
            INSERT INTO audit_log (tenant_id, action, details, occurred_at)
            VALUES (?1, ?2, ?3, ?4)
            "#,
            params![
                tenant_id,
                action.as_str(),
                serde_json::to_string(&details)?,
                occurred_at.to_rfc3339(),
            ],
        )?;
        Ok(AuditRecord {
            id: conn.last_insert_rowid(),
            tenant_id: tenant_id.to_string(),
            action,
            details,
            occurred_at,
        })
    }

    fn audit_for_instance(&self, instance_id: &str, limit: usize) -> Result<AuditPage> {
        let conn = self.conn.lock().unwrap();
        let total: i64 = conn.query_row(
            "SELECT COUNT(*) FROM audit_log \
             WHERE json_extract(details, '$.instanceId') = ?1",
            params![instance_id],
            |row| row.get(0),
        )?;

        let sql = format!(
            "SELECT id, tenant_id, action, details, occurred_at FROM audit_log \
             WHERE json_extract(details, '$.instanceId') = ?1 \
             ORDER BY id DESC{}",
            if limit > 0 {
                format!(" LIMIT {limit}")
            } else {
                String::new()
            }
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows: Vec<(i64, String, String, String, String)> = stmt
            .query_map(params![instance_id], |row| {
                Ok((
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    row.get(4)?,
                ))
            })?
            .collect::<rusqlite::Result<_>>()?;

        let records: Vec<AuditRecord> = rows
            .into_iter()
            .map(|(id, tenant_id, action, details, occurred_at)| {
                Ok(AuditRecord {
                    id,
                    tenant_id,
                    action: action.parse()?,
                    details: serde_json::from_str(&details)?,
                    occurred_at: parse_ts(&occurred_at)?,
                })
            })
            .collect::<Result<_>>()?;

        Ok(AuditPage {
            has_more: limit > 0 && total as usize > limit,
            total: total as usize,
            records,
        })
    }
}

// ============================================================================
// In-Memory Implementation (for testing)
// ============================================================================

/// In-memory store mirroring the SQLite semantics
///
/// Useful for testing without database dependencies.
#[derive(Default)]
pub struct MemoryStore {
    series: RwLock<HashMap<String, EventSeries>>,
    instances: RwLock<Vec<EventInstance>>,
    participation: Mutex<Vec<ParticipationRecord>>,
    audit: Mutex<Vec<AuditRecord>>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }
}

impl SeriesRepository for MemoryStore {
    fn create_series(&self, series: &EventSeries) -> Result<()> {
        self.series
            .write()
            .unwrap()
            .insert(series.id.clone(), series.clone());
        Ok(())
    }

    fn get_series(&self, id: &str) -> Result<Option<EventSeries>> {
        Ok(self.series.read().unwrap().get(id).cloned())
    }

    fn list_active_series(&self) -> Result<Vec<EventSeries>> {
        let mut out: Vec<EventSeries> = self
            .series
            .read()
            .unwrap()
            .values()
            .filter(|s| s.is_active)
            .cloned()
            .collect();
        out.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(out)
    }

    fn list_active_series_for_tenant(&self, tenant_id: &str) -> Result<Vec<EventSeries>> {
        Ok(self
            .list_active_series()?
            .into_iter()
            .filter(|s| s.tenant_id == tenant_id)
            .collect())
    }

    fn set_series_active(&self, id: &str, active: bool) -> Result<bool> {
        let mut series = self.series.write().unwrap();
        match series.get_mut(id) {
            Some(s) => {
                s.is_active = active;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

impl InstanceRepository for MemoryStore {
    fn create_instance_if_absent(&self, instance: &EventInstance) -> Result<bool> {
        let mut instances = self.instances.write().unwrap();
        let exists = instances
            .iter()
            .any(|i| i.series_id == instance.series_id && i.start_time == instance.start_time);
        if exists {
            return Ok(false);
        }
        instances.push(instance.clone());
        Ok(true)
    }

    fn get_instance(&self, id: &str) -> Result<Option<EventInstance>> {
        Ok(self
            .instances
            .read()
            .unwrap()
            .iter()
            .find(|i| i.id == id)
            .cloned())
    }

    fn find_instance_at(
        &self,
        series_id: &str,
        start_time: DateTime<Utc>,
    ) -> Result<Option<EventInstance>> {
        Ok(self
            .instances
            .read()
            .unwrap()
            .iter()
            .find(|i| i.series_id == series_id && i.start_time == start_time)
            .cloned())
    }

    fn upcoming_instances(
        &self,
        series_id: &str,
        from: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<EventInstance>> {
        let mut out: Vec<EventInstance> = self
            .instances
            .read()
            .unwrap()
            .iter()
            .filter(|i| i.series_id == series_id && i.start_time >= from)
            .cloned()
            .collect();
        out.sort_by(|a, b| a.start_time.cmp(&b.start_time));
        out.truncate(limit);
        Ok(out)
    }

    fn set_announcement(&self, instance_id: &str, handle: MessageHandle) -> Result<()> {
        let mut instances = self.instances.write().unwrap();
        let instance = instances
            .iter_mut()
            .find(|i| i.id == instance_id)
            .ok_or_else(|| Error::instance_not_found(instance_id))?;
        instance.announcement = Some(handle);
        Ok(())
    }
}

impl LedgerRepository for MemoryStore {
    fn append_participation(
        &self,
        instance_id: &str,
        actor: ActorId,
        action: ParticipationAction,
        payload: Option<serde_json::Value>,
    ) -> Result<ParticipationRecord> {
        let mut log = self.participation.lock().unwrap();
        let record = ParticipationRecord {
            id: log.len() as i64 + 1,
            instance_id: instance_id.to_string(),
            actor,
            action,
            recorded_at: Utc::now(),
            payload,
        };
        log.push(record.clone());
        Ok(record)
    }

    fn participation_for_instance(
        &self,
        instance_id: &str,
    ) -> Result<Vec<ParticipationRecord>> {
        Ok(self
            .participation
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.instance_id == instance_id)
            .cloned()
            .collect())
    }
}

impl AuditRepository for MemoryStore {
    fn append_audit(
        &self,
        tenant_id: &str,
        action: AuditAction,
        details: serde_json::Value,
    ) -> Result<AuditRecord> {
        let mut log = self.audit.lock().unwrap();
        let record = AuditRecord {
            id: log.len() as i64 + 1,
            tenant_id: tenant_id.to_string(),
            action,
            details,
            occurred_at: Utc::now(),
        };
        log.push(record.clone());
        Ok(record)
    }

    fn audit_for_instance(&self, instance_id: &str, limit: usize) -> Result<AuditPage> {
        let log = self.audit.lock().unwrap();
        let mut records: Vec<AuditRecord> = log
            .iter()
            .filter(|r| r.instance_id() == Some(instance_id))
            .cloned()
            .collect();
        records.sort_by(|a, b| b.id.cmp(&a.id));

        let total = records.len();
        if limit > 0 {
            records.truncate(limit);
        }
        Ok(AuditPage {
            has_more: limit > 0 && total > limit,
            total,
            records,
        })
    }
}

// ============================================================================
// Tests
// ============================================================================
