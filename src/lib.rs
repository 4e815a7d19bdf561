//! rollcall - Recurring event attendance for group chats
//!
//! Materializes recurring event definitions into concrete instances on a
//! rolling horizon, announces them to group channels, and tracks attendance
//! through an append-only ledger.
//!
//! # Architecture
//!
//! The library is organized into several modules:
//!
//! - [`config`] - Configuration management and settings
//! - [`recurrence`] - Recurrence rules and occurrence expansion
//! - [`models`] - Core data structures and types
//! - [`storage`] - Repository traits over SQLite / in-memory stores
//! - [`ledger`] - Append-only participation log and capacity checks
//! - [`card`] - Pure event card state computation
//! - [`materializer`] - Instance creation, announcements, admin notices
//! - [`attendance`] - Vote flow against the live announcement
//! - [`audit`] - Admin interventions and their audit trail
//! - [`wizard`] - Series creation step machine
//! - [`driver`] - Periodic scheduler loop
//! - [`transport`] - Outbound delivery seams (webhook, test doubles)
//!
//! # Example
//!
//! ```no_run
//! use rollcall::config::Config;
//! use rollcall::storage::SqliteStore;
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = Config::from_env()?;
//!     config.validate()?;
//!     let store = SqliteStore::new(&config.database.sqlite_path)?;
//!     let _ = store;
//!     Ok(())
//! }
//! ```

pub mod attendance;
pub mod audit;
pub mod card;
pub mod config;
pub mod driver;
pub mod error;
pub mod ledger;
pub mod materializer;
pub mod models;
pub mod recurrence;
pub mod storage;
pub mod transport;
pub mod wizard;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::attendance::AttendanceService;
    pub use crate::audit::AuditTrail;
    pub use crate::card::{CardPolicy, CardState};
    pub use crate::config::Config;
    pub use crate::error::{Error, ErrorCategory, Result};
    pub use crate::ledger::ParticipationLedger;
    pub use crate::materializer::{MaterializeReport, Materializer};
    pub use crate::models::{
        ActorId, EventInstance, EventSeries, Participant, ParticipationAction,
    };
    pub use crate::recurrence::{Frequency, Recurrence};
    pub use crate::storage::{SharedStore, SqliteStore, Store};
}

// Direct re-exports for convenience
pub use models::{ActorId, EventInstance, EventSeries, ParticipationAction};
