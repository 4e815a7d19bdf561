//! Vote flow against the live announcement
//!
//! A vote is two steps with different guarantees: the ledger append is the
//! source of truth and either fully happens or returns a refusal; the live
//! message edit afterwards is best-effort cosmetics and its failure is
//! logged, never surfaced to the voter.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::audit::AuditTrail;
use crate::card::{permitted_actions, display_annotation, CardPolicy, CardState};
use crate::error::{Error, Result};
use crate::ledger::ParticipationLedger;
use crate::models::{ActorId, Participant, ParticipationAction, ParticipationRecord};
use crate::storage::{InstanceRepository, SeriesRepository, SharedStore};
use crate::transport::{AnnouncementPublisher, AttendanceFormatter};

/// Everything a renderer needs to draw one card for one viewer
#[derive(Debug, Clone)]
pub struct CardView {
    pub state: CardState,
    pub actions: Vec<ParticipationAction>,
    pub annotation: &'static str,
    pub body: String,
}

/// Coordinates votes, card rendering and live message updates
pub struct AttendanceService {
    store: SharedStore,
    ledger: ParticipationLedger,
    trail: AuditTrail,
    publisher: Arc<dyn AnnouncementPublisher>,
    formatter: Arc<dyn AttendanceFormatter>,
    policy: CardPolicy,
}

impl AttendanceService {
    pub fn new(
        store: SharedStore,
        publisher: Arc<dyn AnnouncementPublisher>,
        formatter: Arc<dyn AttendanceFormatter>,
        policy: CardPolicy,
    ) -> Self {
        Self {
            ledger: ParticipationLedger::new(store.clone()),
            trail: AuditTrail::new(store.clone()),
            store,
            publisher,
            formatter,
            policy,
        }
    }

    pub fn ledger(&self) -> &ParticipationLedger {
        &self.ledger
    }

    pub fn trail(&self) -> &AuditTrail {
        &self.trail
    }

    /// Record a vote and refresh the live announcement.
    ///
    /// Refusals (capacity, unknown instance) propagate untouched; once the
    /// append succeeded the vote stands whatever the edit does.
    pub async fn cast_vote(
        &self,
        instance_id: &str,
        actor: ActorId,
        action: ParticipationAction,
    ) -> Result<ParticipationRecord> {
        let record = self
            .ledger
            .record_vote(instance_id, actor, action, None)
            .await?;
        self.refresh_announcement(instance_id).await;
        Ok(record)
    }

    /// Re-render the announcement body and push it to the live message.
    /// No-op for unannounced instances; edit failures are logged only.
    pub async fn refresh_announcement(&self, instance_id: &str) {
        let result: Result<()> = async {
            let instance = self
                .store
                .get_instance(instance_id)?
                .ok_or_else(|| Error::instance_not_found(instance_id))?;
            let Some(handle) = instance.announcement else {
                return Ok(());
            };
            let series = self
                .store
                .get_series(&instance.series_id)?
                .ok_or_else(|| Error::series_not_found(&instance.series_id))?;
            let participants = self.ledger.current_participants(instance_id)?;
            let text = self.formatter.render(&series, &instance, &participants);
            self.publisher.edit(handle, &text).await
        }
        .await;

        if let Err(e) = result {
            tracing::warn!(instance_id, error = %e, "live announcement refresh failed");
        }
    }

    /// Current participants of an instance
    pub fn participants(&self, instance_id: &str) -> Result<Vec<Participant>> {
        self.ledger.current_participants(instance_id)
    }

    /// Compute the full card view for one viewer at one point in time
    pub fn card_view(
        &self,
        instance_id: &str,
        viewer: Option<ActorId>,
        now: DateTime<Utc>,
    ) -> Result<CardView> {
        let instance = self
            .store
            .get_instance(instance_id)?
            .ok_or_else(|| Error::instance_not_found(instance_id))?;
        let series = self
            .store
            .get_series(&instance.series_id)?
            .ok_or_else(|| Error::series_not_found(&instance.series_id))?;

        let participants = self.ledger.current_participants(instance_id)?;
        let registration_override = self.trail.registration_override(instance_id)?;
        let state = self.policy.compute_state(
            &series,
            &instance,
            &participants,
            viewer,
            registration_override,
            now,
        );

        Ok(CardView {
            state,
            actions: permitted_actions(state),
            annotation: display_annotation(state),
            body: self.formatter.render(&series, &instance, &participants),
        })
    }
}
