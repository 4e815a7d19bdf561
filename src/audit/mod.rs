//! Admin interventions and their audit trail
//!
//! Self-service votes live in the participation ledger and are never audited;
//! the trail here records only what an admin did on someone's behalf. Every
//! entry embeds the instance id in its detail payload so the per-instance
//! history query works without a schema change per action kind.

use crate::card::RegistrationOverride;
use crate::error::{Error, Result};
use crate::ledger::reduce_latest_wins;
use crate::models::{
    ActorId, AuditAction, AuditRecord, EventInstance, ParticipationAction,
};
use crate::storage::{
    AuditPage, AuditRepository, InstanceRepository, LedgerRepository, SeriesRepository,
    SharedStore,
};

/// Facade over the audit log plus the admin-side participant operations
pub struct AuditTrail {
    store: SharedStore,
}

impl AuditTrail {
    pub fn new(store: SharedStore) -> Self {
        Self { store }
    }

    fn instance(&self, instance_id: &str) -> Result<EventInstance> {
        self.store
            .get_instance(instance_id)?
            .ok_or_else(|| Error::instance_not_found(instance_id))
    }

    fn tenant_of(&self, instance: &EventInstance) -> Result<String> {
        let series = self
            .store
            .get_series(&instance.series_id)?
            .ok_or_else(|| Error::series_not_found(&instance.series_id))?;
        Ok(series.tenant_id)
    }

    /// Add a participant on their behalf.
    ///
    /// Bypasses the capacity check (the admin is overriding), but refuses
    /// with [`Error::AlreadyJoined`] when the actor's latest action is
    /// already JOIN so repeated commands do not pile up ledger noise.
    pub fn add_participant(
        &self,
        instance_id: &str,
        actor: ActorId,
        admin: &str,
    ) -> Result<AuditRecord> {
        let instance = self.instance(instance_id)?;
        let tenant_id = self.tenant_of(&instance)?;

        let records = self.store.participation_for_instance(instance_id)?;
        let already_joined = reduce_latest_wins(&records)
            .iter()
            .any(|p| p.actor == actor && p.action == ParticipationAction::Join);
        if already_joined {
            return Err(Error::AlreadyJoined {
                actor: actor.to_string(),
                instance: instance_id.to_string(),
            });
        }

        self.store.append_participation(
            instance_id,
            actor,
            ParticipationAction::Join,
            Some(serde_json::json!({ "addedBy": admin })),
        )?;

        let record = self.store.append_audit(
            &tenant_id,
            AuditAction::ParticipantAdded,
            serde_json::json!({
                "instanceId": instance_id,
                "userId": actor.to_string(),
                "adminName": admin,
            }),
        )?;
        tracing::info!(instance_id, actor = %actor, admin, "participant added by admin");
        Ok(record)
    }

    /// Remove a participant on their behalf.
    ///
    /// Appends a LEAVE even when the actor never joined; the reduction makes
    /// that a harmless no-op and the trail still shows the admin acted.
    pub fn remove_participant(
        &self,
        instance_id: &str,
        actor: ActorId,
        admin: &str,
    ) -> Result<AuditRecord> {
        let instance = self.instance(instance_id)?;
        let tenant_id = self.tenant_of(&instance)?;

        self.store.append_participation(
            instance_id,
            actor,
            ParticipationAction::Leave,
            Some(serde_json::json!({ "removedBy": admin })),
        )?;

        let record = self.store.append_audit(
            &tenant_id,
            AuditAction::ParticipantRemoved,
            serde_json::json!({
                "instanceId": instance_id,
                "userId": actor.to_string(),
                "adminName": admin,
            }),
        )?;
        tracing::info!(instance_id, actor = %actor, admin, "participant removed by admin");
        Ok(record)
    }

    /// Close registration ahead of the time cutoff
    pub fn close_registration(&self, instance_id: &str, admin: &str) -> Result<AuditRecord> {
        self.record_registration_change(instance_id, admin, AuditAction::RegistrationClosed)
    }

    /// Hold registration open past the time cutoff
    pub fn extend_registration(&self, instance_id: &str, admin: &str) -> Result<AuditRecord> {
        self.record_registration_change(instance_id, admin, AuditAction::RegistrationExtended)
    }

    fn record_registration_change(
        &self,
        instance_id: &str,
        admin: &str,
        action: AuditAction,
    ) -> Result<AuditRecord> {
        let instance = self.instance(instance_id)?;
        let tenant_id = self.tenant_of(&instance)?;
        let record = self.store.append_audit(
            &tenant_id,
            action,
            serde_json::json!({
                "instanceId": instance_id,
                "adminName": admin,
            }),
        )?;
        tracing::info!(instance_id, admin, action = action.as_str(), "registration changed");
        Ok(record)
    }

    /// Current admin override of the registration cutoff, if any.
    ///
    /// The newest close/extend entry wins; participant entries are ignored.
    pub fn registration_override(
        &self,
        instance_id: &str,
    ) -> Result<Option<RegistrationOverride>> {
        let page = self.store.audit_for_instance(instance_id, 0)?;
        // Records come newest first
        for record in &page.records {
            match record.action {
                AuditAction::RegistrationClosed => {
                    return Ok(Some(RegistrationOverride::Closed))
                }
                AuditAction::RegistrationExtended => {
                    return Ok(Some(RegistrationOverride::Extended))
                }
                _ => {}
            }
        }
        Ok(None)
    }

    /// Audit history of an instance, newest first; `limit == 0` means all
    pub fn history(&self, instance_id: &str, limit: usize) -> Result<AuditPage> {
        self.store.audit_for_instance(instance_id, limit)
    }

    /// One-line human rendering of an audit entry
    pub fn format_entry(record: &AuditRecord) -> String {
        let admin = record
            .details
            .get("adminName")
            .and_then(|v| v.as_str())
            .unwrap_or("unknown admin");
        let when = record.occurred_at.format("%Y-%m-%d %H:%M UTC");
        match record.action {
            AuditAction::ParticipantAdded | AuditAction::ParticipantRemoved => {
                let user = record
                    .details
                    .get("userId")
                    .and_then(|v| v.as_str())
                    .unwrap_or("?");
                let verb = if record.action == AuditAction::ParticipantAdded {
                    "added"
                } else {
                    "removed"
                };
                format!("{when}: {admin} {verb} participant {user}")
            }
            AuditAction::RegistrationClosed => {
                format!("{when}: {admin} closed registration")
            }
            AuditAction::RegistrationExtended => {
                format!("{when}: {admin} extended registration")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EventSeries;
    use crate::recurrence::{Frequency, Recurrence};
    use crate::storage::{
        InstanceRepository, LedgerRepository, MemoryStore, SeriesRepository,
    };
    use chrono::{TimeZone, Utc};
    use std::sync::Arc;

    fn setup() -> (AuditTrail, SharedStore, String) {
        let store: SharedStore = Arc::new(MemoryStore::new());
        let anchor = Utc.with_ymd_and_hms(2024, 1, 1, 18, 0, 0).unwrap();
        let series = EventSeries::new(
            "t-1",
            "Weekly run",
            Recurrence::new(anchor, Frequency::Weekly),
        );
        store.create_series(&series).unwrap();
        let start = Utc.with_ymd_and_hms(2024, 1, 8, 18, 0, 0).unwrap();
        let instance = crate::models::EventInstance::new(&series, start);
        store.create_instance_if_absent(&instance).unwrap();
        (AuditTrail::new(store.clone()), store, instance.id)
    }

    #[test]
    fn test_add_participant_appends_join_and_audit() {
        let (trail, store, instance) = setup();

        let record = trail.add_participant(&instance, ActorId(5), "alice").unwrap();
        assert_eq!(record.action, AuditAction::ParticipantAdded);
        assert_eq!(record.tenant_id, "t-1");
        assert_eq!(record.instance_id(), Some(instance.as_str()));

        let votes = store.participation_for_instance(&instance).unwrap();
        assert_eq!(votes.len(), 1);
        assert_eq!(votes[0].action, ParticipationAction::Join);
        assert_eq!(
            votes[0].payload.as_ref().unwrap()["addedBy"],
            serde_json::json!("alice")
        );
    }

    #[test]
    fn test_add_refuses_when_already_joined() {
        let (trail, _, instance) = setup();

        trail.add_participant(&instance, ActorId(5), "alice").unwrap();
        let err = trail
            .add_participant(&instance, ActorId(5), "alice")
            .unwrap_err();
        assert!(matches!(err, Error::AlreadyJoined { .. }));

        // A plus-one holder can still be bumped to a plain join
        let (trail, store, instance) = setup();
        store
            .append_participation(&instance, ActorId(5), ParticipationAction::PlusOne, None)
            .unwrap();
        trail.add_participant(&instance, ActorId(5), "alice").unwrap();
    }

    #[test]
    fn test_remove_without_prior_join_is_allowed() {
        let (trail, store, instance) = setup();

        trail
            .remove_participant(&instance, ActorId(9), "alice")
            .unwrap();
        let votes = store.participation_for_instance(&instance).unwrap();
        assert_eq!(votes[0].action, ParticipationAction::Leave);

        let page = trail.history(&instance, 0).unwrap();
        assert_eq!(page.records[0].action, AuditAction::ParticipantRemoved);
    }

    #[test]
    fn test_registration_override_latest_wins() {
        let (trail, _, instance) = setup();
        assert_eq!(trail.registration_override(&instance).unwrap(), None);

        trail.close_registration(&instance, "alice").unwrap();
        assert_eq!(
            trail.registration_override(&instance).unwrap(),
            Some(RegistrationOverride::Closed)
        );

        trail.extend_registration(&instance, "bob").unwrap();
        assert_eq!(
            trail.registration_override(&instance).unwrap(),
            Some(RegistrationOverride::Extended)
        );

        // Participant entries in between do not disturb the override
        trail.add_participant(&instance, ActorId(1), "alice").unwrap();
        assert_eq!(
            trail.registration_override(&instance).unwrap(),
            Some(RegistrationOverride::Extended)
        );
    }

    #[test]
    fn test_history_pagination_and_formatting() {
        let (trail, _, instance) = setup();
        for n in 0..3 {
            trail
                .add_participant(&instance, ActorId(n), "alice")
                .unwrap();
        }

        let page = trail.history(&instance, 2).unwrap();
        assert_eq!(page.total, 3);
        assert_eq!(page.records.len(), 2);
        assert!(page.has_more);

        let line = AuditTrail::format_entry(&page.records[0]);
        assert!(line.contains("UTC: alice added participant 2"));
    }

    #[test]
    fn test_unknown_instance_rejected() {
        let (trail, _, _) = setup();
        let err = trail
            .add_participant("missing", ActorId(1), "alice")
            .unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
    }
}
