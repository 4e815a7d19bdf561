//! Event card state engine
//!
//! Pure functions from (series, instance, participants, viewer, clock) to the
//! card state a renderer needs. No storage access and no side effects, so
//! every branch is trivially testable with a pinned clock.

use chrono::{DateTime, Duration, Utc};

use crate::models::{ActorId, EventInstance, EventSeries, Participant, ParticipationAction};

/// Hours before start after which self-service registration closes
pub const DEFAULT_REGISTRATION_LEAD_HOURS: u32 = 25;

/// Admin override of the time-based registration cutoff
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationOverride {
    /// Registration closed early by an admin
    Closed,
    /// Registration held open past the cutoff by an admin
    Extended,
}

/// Derived state of one event card for one viewer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CardState {
    pub event_ended: bool,
    pub registration_closed: bool,
    pub is_full: bool,
    pub viewer_joined: bool,
}

/// Card policy knobs
#[derive(Debug, Clone, Copy)]
pub struct CardPolicy {
    pub registration_lead_hours: u32,
}

impl Default for CardPolicy {
    fn default() -> Self {
        Self {
            registration_lead_hours: DEFAULT_REGISTRATION_LEAD_HOURS,
        }
    }
}

impl CardPolicy {
    /// Compute the card state for one viewer at one point in time
    pub fn compute_state(
        &self,
        series: &EventSeries,
        instance: &EventInstance,
        participants: &[Participant],
        viewer: Option<ActorId>,
        registration_override: Option<RegistrationOverride>,
        now: DateTime<Utc>,
    ) -> CardState {
        let cutoff =
            instance.start_time - Duration::hours(self.registration_lead_hours as i64);
        let registration_closed = match registration_override {
            Some(RegistrationOverride::Closed) => true,
            Some(RegistrationOverride::Extended) => false,
            None => now >= cutoff,
        };

        // Fullness is relative to the viewer: their own units are excluded,
        // the same way the ledger charges a re-vote only for the delta
        let headcount: u32 = participants
            .iter()
            .filter(|p| Some(p.actor) != viewer)
            .map(Participant::units)
            .sum();
        let is_full = series
            .capacity_limit()
            .is_some_and(|limit| headcount >= limit);

        let viewer_joined = viewer
            .map(|v| participants.iter().any(|p| p.actor == v))
            .unwrap_or(false);

        CardState {
            // Strictly after the end; the card stays actionable through the
            // event itself
            event_ended: now > instance.end_time,
            registration_closed,
            is_full,
            viewer_joined,
        }
    }
}

/// Actions the viewer may take, in button order.
///
/// Priority chain: an ended or closed card offers nothing; a joined viewer
/// keeps plus-one and leave even when the card is full (their leave frees a
/// slot, their plus-one is checked against capacity at vote time); a full
/// card offers nothing to outsiders.
pub fn permitted_actions(state: CardState) -> Vec<ParticipationAction> {
    if state.event_ended || state.registration_closed {
        return Vec::new();
    }
    if state.viewer_joined {
        return vec![ParticipationAction::PlusOne, ParticipationAction::Leave];
    }
    if state.is_full {
        return Vec::new();
    }
    vec![ParticipationAction::Join, ParticipationAction::PlusOne]
}

/// Status line appended to the card. Only an ended or closed card carries
/// one; a full card just offers no actions.
pub fn display_annotation(state: CardState) -> &'static str {
    if state.event_ended {
        "event ended"
    } else if state.registration_closed {
        "registration closed"
    } else {
        ""
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recurrence::{Frequency, Recurrence};
    use chrono::TimeZone;

    fn fixture(limit: Option<u32>) -> (EventSeries, EventInstance) {
        let anchor = Utc.with_ymd_and_hms(2024, 1, 1, 18, 0, 0).unwrap();
        let mut series = EventSeries::new(
            "t-1",
            "Weekly run",
            Recurrence::new(anchor, Frequency::Weekly),
        );
        series.max_participants = limit;
        let start = Utc.with_ymd_and_hms(2024, 3, 4, 18, 0, 0).unwrap();
        let instance = EventInstance::new(&series, start);
        (series, instance)
    }

    fn joined(actors: &[i64]) -> Vec<Participant> {
        actors
            .iter()
            .map(|&id| Participant {
                actor: ActorId(id),
                action: ParticipationAction::Join,
            })
            .collect()
    }

    #[test]
    fn test_registration_cutoff_boundary() {
        let (series, instance) = fixture(None);
        let policy = CardPolicy::default();
        let cutoff = instance.start_time - Duration::hours(25);

        let state =
            policy.compute_state(&series, &instance, &[], None, None, cutoff - Duration::seconds(1));
        assert!(!state.registration_closed);

        // Exactly at the cutoff the card closes
        let state = policy.compute_state(&series, &instance, &[], None, None, cutoff);
        assert!(state.registration_closed);
        assert!(permitted_actions(state).is_empty());
        assert_eq!(display_annotation(state), "registration closed");
    }

    #[test]
    fn test_event_end_boundary() {
        let (series, instance) = fixture(None);
        let policy = CardPolicy::default();

        // Default duration is 120 minutes; exactly at the end is not ended
        assert_eq!(instance.end_time - instance.start_time, Duration::minutes(120));
        let state =
            policy.compute_state(&series, &instance, &[], None, None, instance.end_time);
        assert!(!state.event_ended);

        let state = policy.compute_state(
            &series,
            &instance,
            &[],
            None,
            None,
            instance.end_time + Duration::seconds(1),
        );
        assert!(state.event_ended);
        assert!(permitted_actions(state).is_empty());
        assert_eq!(display_annotation(state), "event ended");
    }

    #[test]
    fn test_open_card_offers_join_and_plus_one() {
        let (series, instance) = fixture(Some(5));
        let now = instance.start_time - Duration::hours(48);
        let state = CardPolicy::default().compute_state(
            &series,
            &instance,
            &joined(&[1]),
            Some(ActorId(2)),
            None,
            now,
        );
        assert_eq!(
            permitted_actions(state),
            vec![ParticipationAction::Join, ParticipationAction::PlusOne]
        );
        assert_eq!(display_annotation(state), "");
    }

    #[test]
    fn test_fullness_excludes_the_viewers_own_units() {
        let (series, instance) = fixture(Some(2));
        let now = instance.start_time - Duration::hours(48);
        let participants = joined(&[1, 2]);

        // At capacity, but the viewer's own unit does not count against them
        let state = CardPolicy::default().compute_state(
            &series,
            &instance,
            &participants,
            Some(ActorId(1)),
            None,
            now,
        );
        assert!(!state.is_full);
        assert!(state.viewer_joined);
        assert_eq!(
            permitted_actions(state),
            vec![ParticipationAction::PlusOne, ParticipationAction::Leave]
        );

        // An outsider sees the card full and gets nothing, with no banner
        let state = CardPolicy::default().compute_state(
            &series,
            &instance,
            &participants,
            Some(ActorId(3)),
            None,
            now,
        );
        assert!(state.is_full);
        assert!(permitted_actions(state).is_empty());
        assert_eq!(display_annotation(state), "");
    }

    #[test]
    fn test_plus_one_units_count_toward_full() {
        let (series, instance) = fixture(Some(2));
        let now = instance.start_time - Duration::hours(48);
        let participants = vec![Participant {
            actor: ActorId(1),
            action: ParticipationAction::PlusOne,
        }];
        let state = CardPolicy::default()
            .compute_state(&series, &instance, &participants, None, None, now);
        assert!(state.is_full);
    }

    #[test]
    fn test_admin_override_beats_the_clock() {
        let (series, instance) = fixture(None);
        let policy = CardPolicy::default();
        let before_cutoff = instance.start_time - Duration::hours(48);
        let after_cutoff = instance.start_time - Duration::hours(1);

        let state = policy.compute_state(
            &series,
            &instance,
            &[],
            None,
            Some(RegistrationOverride::Closed),
            before_cutoff,
        );
        assert!(state.registration_closed);

        let state = policy.compute_state(
            &series,
            &instance,
            &[],
            None,
            Some(RegistrationOverride::Extended),
            after_cutoff,
        );
        assert!(!state.registration_closed);
        assert_eq!(
            permitted_actions(state),
            vec![ParticipationAction::Join, ParticipationAction::PlusOne]
        );
    }

    #[test]
    fn test_ended_wins_over_everything() {
        let (series, instance) = fixture(Some(1));
        let state = CardPolicy::default().compute_state(
            &series,
            &instance,
            &joined(&[1]),
            Some(ActorId(1)),
            Some(RegistrationOverride::Extended),
            instance.end_time + Duration::hours(1),
        );
        assert!(state.event_ended);
        assert!(permitted_actions(state).is_empty());
        assert_eq!(display_annotation(state), "event ended");
    }
}
