//! Append-only participation ledger
//!
//! Every vote is an immutable append; nothing is ever updated in place. The
//! current attendee list is a pure reduction over the log: each actor's
//! latest record wins (monotonic insertion id breaks same-timestamp ties),
//! and actors whose latest action is LEAVE drop out of the view.
//!
//! Capacity is enforced here, at the single write path. The check excludes
//! the acting user's own prior units, so a joined user upgrading to a
//! plus-one is charged only for the delta.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::error::{Error, Result};
use crate::models::{ActorId, Participant, ParticipationAction, ParticipationRecord};
use crate::storage::{InstanceRepository, LedgerRepository, SeriesRepository, SharedStore};

/// Ledger facade over the participation log
///
/// Votes for the same instance are serialized through a per-instance async
/// lock so the capacity check and the append are atomic with respect to
/// concurrent voters. Votes for different instances never contend.
pub struct ParticipationLedger {
    store: SharedStore,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl ParticipationLedger {
    pub fn new(store: SharedStore) -> Self {
        Self {
            store,
            locks: Mutex::new(HashMap::new()),
        }
    }

    async fn lock_for(&self, instance_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        // Entries only the map still references have no vote in flight;
        // dropping them here keeps the map bounded by concurrent instances
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        locks
            .entry(instance_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    #[cfg(test)]
    async fn lock_count(&self) -> usize {
        self.locks.lock().await.len()
    }

    /// Record a vote, enforcing the series capacity limit.
    ///
    /// Errors with [`Error::NotFound`] when the instance is unknown and
    /// [`Error::CapacityExceeded`] when an additive vote does not fit; a
    /// refused vote appends nothing.
    pub async fn record_vote(
        &self,
        instance_id: &str,
        actor: ActorId,
        action: ParticipationAction,
        payload: Option<serde_json::Value>,
    ) -> Result<ParticipationRecord> {
        let lock = self.lock_for(instance_id).await;
        let _guard = lock.lock().await;

        let instance = self
            .store
            .get_instance(instance_id)?
            .ok_or_else(|| Error::instance_not_found(instance_id))?;

        if action.is_additive() {
            let series = self
                .store
                .get_series(&instance.series_id)?
                .ok_or_else(|| Error::series_not_found(&instance.series_id))?;

            if let Some(limit) = series.capacity_limit() {
                // Units held by everyone else; the voter's own prior units are
                // released by this vote, so only the delta is charged
                let others = self.headcount(instance_id, Some(actor))?;
                if others + action.units() > limit {
                    return Err(Error::CapacityExceeded {
                        remaining: limit.saturating_sub(others),
                    });
                }
            }
        }

        let record = self
            .store
            .append_participation(instance_id, actor, action, payload)?;

        tracing::debug!(
            instance_id,
            actor = %actor,
            action = action.as_str(),
            record_id = record.id,
            "vote recorded"
        );
        Ok(record)
    }

    /// Current attendees of an instance: latest-wins reduction over the log,
    /// ordered by each actor's winning record id
    pub fn current_participants(&self, instance_id: &str) -> Result<Vec<Participant>> {
        let records = self.store.participation_for_instance(instance_id)?;
        Ok(reduce_latest_wins(&records))
    }

    /// Capacity units currently held, optionally excluding one actor
    pub fn headcount(&self, instance_id: &str, exclude: Option<ActorId>) -> Result<u32> {
        Ok(self
            .current_participants(instance_id)?
            .iter()
            .filter(|p| Some(p.actor) != exclude)
            .map(Participant::units)
            .sum())
    }

    /// Whether the instance is at or over its series capacity limit
    pub fn is_full(&self, instance_id: &str, limit: Option<u32>) -> Result<bool> {
        match limit {
            Some(limit) => Ok(self.headcount(instance_id, None)? >= limit),
            None => Ok(false),
        }
    }
}

/// Pure latest-wins reduction: one entry per actor whose newest record is
/// additive. Records must be in insertion order.
pub fn reduce_latest_wins(records: &[ParticipationRecord]) -> Vec<Participant> {
    let mut latest: HashMap<ActorId, &ParticipationRecord> = HashMap::new();
    for record in records {
        // Insertion id is strictly increasing, so a plain overwrite keeps
        // the newest record even when timestamps collide
        latest.insert(record.actor, record);
    }

    let mut winners: Vec<&ParticipationRecord> = latest
        .into_values()
        .filter(|r| r.action.is_additive())
        .collect();
    winners.sort_by_key(|r| r.id);

    winners
        .into_iter()
        .map(|r| Participant {
            actor: r.actor,
            action: r.action,
        })
        .collect()
}
