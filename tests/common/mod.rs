//! Shared fixtures for integration tests

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use rollcall::models::EventSeries;
use rollcall::recurrence::{Frequency, Recurrence};
use rollcall::storage::{MemoryStore, SeriesRepository, SharedStore, SqliteStore};

/// Monday 18:00 UTC anchor used across the fixtures
pub fn anchor() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 18, 0, 0).unwrap()
}

/// A Thursday well before the first fixture occurrence
pub fn run_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap()
}

/// Both storage backends; every test runs against each
pub fn stores() -> Vec<SharedStore> {
    vec![
        Arc::new(SqliteStore::in_memory().expect("sqlite store")),
        Arc::new(MemoryStore::new()),
    ]
}

/// A weekly Monday-evening series announced to chat -100
pub fn weekly_series(store: &SharedStore, limit: Option<u32>) -> EventSeries {
    let mut series = EventSeries::new(
        "t-1",
        "Weekly run",
        Recurrence::new(anchor(), Frequency::Weekly),
    )
    .with_channel(-100, None);
    series.max_participants = limit;
    store.create_series(&series).expect("create series");
    series
}
