//! Persistence layer
//!
//! This module owns the only storage-level invariants the core depends on:
//!
//! - at most one instance per `(series_id, start_time)` pair (the
//!   materialization idempotency key, enforced by a UNIQUE constraint)
//! - the participation and audit logs are append-only: the repositories
//!   expose no update or delete path for them
//!
//! Everything else about the schema is an implementation detail. Business
//! logic talks to the repository traits in [`repository`]; production uses
//! the SQLite implementation, tests may use either it or the in-memory mock.

pub mod repository;

pub use repository::{
    AuditPage, AuditRepository, InstanceRepository, LedgerRepository, MemoryStore,
    SeriesRepository, SharedStore, SqliteStore, Store,
};
