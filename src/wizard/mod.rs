//! Series creation wizard
//!
//! A small step machine collecting the answers needed to build a series,
//! one session per actor. Sessions live in an explicit store owned by the
//! caller, expire after five minutes of inactivity (checked on every
//! access), and starting a new wizard replaces any stale one.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, Utc, Weekday};

use crate::error::{Error, Result};
use crate::models::ActorId;
use crate::recurrence::{Frequency, Recurrence};

/// Inactivity window after which a session is dropped
pub const SESSION_TIMEOUT_MINUTES: i64 = 5;

/// Wizard steps in order; `Day` only appears for weekly series and
/// `StartDate` is skipped for them (the date follows from the chosen day)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WizardStep {
    Title,
    Frequency,
    Day,
    StartDate,
    StartTime,
    Channel,
    Limit,
    Confirm,
}

impl WizardStep {
    /// Prompt text shown to the user at this step
    pub fn prompt(&self) -> &'static str {
        match self {
            Self::Title => "What is the event called?",
            Self::Frequency => "How often does it repeat? (daily / weekly / monthly)",
            Self::Day => "Which weekday? (mon..sun)",
            Self::StartDate => "First date? (YYYY-MM-DD)",
            Self::StartTime => "Start time? (HH:MM, 24h UTC)",
            Self::Channel => "Announcement chat id? (or 'skip')",
            Self::Limit => "Participant limit? (number or 'none')",
            Self::Confirm => "Create the series? (yes / no)",
        }
    }
}

/// Answers collected so far
#[derive(Debug, Clone, Default)]
struct Draft {
    title: String,
    frequency: Option<Frequency>,
    by_day: Option<Weekday>,
    start_date: Option<NaiveDate>,
    start_time: Option<NaiveTime>,
    chat_id: Option<i64>,
    limit: Option<u32>,
}

/// A completed wizard, ready to be turned into a series
#[derive(Debug, Clone)]
pub struct CompletedWizard {
    pub title: String,
    pub recurrence: Recurrence,
    pub chat_id: Option<i64>,
    pub max_participants: Option<u32>,
}

/// Result of feeding one answer to the wizard
#[derive(Debug, Clone)]
pub enum WizardOutcome {
    /// More input needed; show this step's prompt
    Next(WizardStep),
    /// All answers collected and confirmed
    Complete(CompletedWizard),
    /// The user declined at the confirm step; the session is gone
    Cancelled,
}

struct Session {
    step: WizardStep,
    draft: Draft,
    last_activity: DateTime<Utc>,
}

/// One wizard session per actor
#[derive(Default)]
pub struct SessionStore {
    sessions: RwLock<HashMap<ActorId, Session>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start (or restart) a wizard for this actor
    pub fn begin(&self, actor: ActorId, now: DateTime<Utc>) -> WizardStep {
        let mut sessions = self.sessions.write().unwrap();
        sessions.insert(
            actor,
            Session {
                step: WizardStep::Title,
                draft: Draft::default(),
                last_activity: now,
            },
        );
        WizardStep::Title
    }

    /// Drop the actor's session, if any
    pub fn cancel(&self, actor: ActorId) -> bool {
        self.sessions.write().unwrap().remove(&actor).is_some()
    }

    /// The step the actor's session is waiting on, expiring stale sessions
    pub fn current_step(&self, actor: ActorId, now: DateTime<Utc>) -> Option<WizardStep> {
        let mut sessions = self.sessions.write().unwrap();
        match sessions.get(&actor) {
            Some(s) if expired(s, now) => {
                sessions.remove(&actor);
                None
            }
            Some(s) => Some(s.step),
            None => None,
        }
    }

    /// Feed one answer to the actor's session
    pub fn answer(
        &self,
        actor: ActorId,
        input: &str,
        now: DateTime<Utc>,
    ) -> Result<WizardOutcome> {
        let mut sessions = self.sessions.write().unwrap();
        let session = match sessions.get_mut(&actor) {
            Some(s) if expired(s, now) => {
                sessions.remove(&actor);
                return Err(Error::validation("wizard session expired, start again"));
            }
            Some(s) => s,
            None => return Err(Error::validation("no active wizard session")),
        };
        session.last_activity = now;

        let input = input.trim();
        let outcome = advance(session, input, now)?;
        if !matches!(outcome, WizardOutcome::Next(_)) {
            sessions.remove(&actor);
        }
        Ok(outcome)
    }
}

fn expired(session: &Session, now: DateTime<Utc>) -> bool {
    now - session.last_activity > Duration::minutes(SESSION_TIMEOUT_MINUTES)
}

fn advance(session: &mut Session, input: &str, now: DateTime<Utc>) -> Result<WizardOutcome> {
    let next = match session.step {
        WizardStep::Title => {
            if input.is_empty() {
                return Err(Error::validation("title cannot be empty"));
            }
            session.draft.title = input.to_string();
            WizardStep::Frequency
        }
        WizardStep::Frequency => {
            let frequency = match input.to_ascii_lowercase().as_str() {
                "daily" => Frequency::Daily,
                "weekly" => Frequency::Weekly,
                "monthly" => Frequency::Monthly,
                other => {
                    return Err(Error::validation(format!(
                        "unknown frequency '{other}', expected daily/weekly/monthly"
                    )))
                }
            };
            session.draft.frequency = Some(frequency);
            if frequency == Frequency::Weekly {
                WizardStep::Day
            } else {
                WizardStep::StartDate
            }
        }
        WizardStep::Day => {
            session.draft.by_day = Some(parse_weekday(input)?);
            WizardStep::StartTime
        }
        WizardStep::StartDate => {
            let date = NaiveDate::parse_from_str(input, "%Y-%m-%d")
                .map_err(|_| Error::validation(format!("invalid date '{input}'")))?;
            session.draft.start_date = Some(date);
            WizardStep::StartTime
        }
        WizardStep::StartTime => {
            let time = NaiveTime::parse_from_str(input, "%H:%M")
                .map_err(|_| Error::validation(format!("invalid time '{input}'")))?;
            session.draft.start_time = Some(time);
            WizardStep::Channel
        }
        WizardStep::Channel => {
            if !input.eq_ignore_ascii_case("skip") {
                let chat_id: i64 = input
                    .parse()
                    .map_err(|_| Error::validation(format!("invalid chat id '{input}'")))?;
                session.draft.chat_id = Some(chat_id);
            }
            WizardStep::Limit
        }
        WizardStep::Limit => {
            if !input.eq_ignore_ascii_case("none") {
                let limit: u32 = input
                    .parse()
                    .map_err(|_| Error::validation(format!("invalid limit '{input}'")))?;
                session.draft.limit = Some(limit);
            }
            WizardStep::Confirm
        }
        WizardStep::Confirm => {
            return if input.eq_ignore_ascii_case("yes") || input.eq_ignore_ascii_case("y") {
                Ok(WizardOutcome::Complete(build(&session.draft, now)?))
            } else {
                Ok(WizardOutcome::Cancelled)
            };
        }
    };
    session.step = next;
    Ok(WizardOutcome::Next(next))
}

fn parse_weekday(input: &str) -> Result<Weekday> {
    match input.to_ascii_lowercase().as_str() {
        "mon" | "monday" => Ok(Weekday::Mon),
        "tue" | "tuesday" => Ok(Weekday::Tue),
        "wed" | "wednesday" => Ok(Weekday::Wed),
        "thu" | "thursday" => Ok(Weekday::Thu),
        "fri" | "friday" => Ok(Weekday::Fri),
        "sat" | "saturday" => Ok(Weekday::Sat),
        "sun" | "sunday" => Ok(Weekday::Sun),
        other => Err(Error::validation(format!("unknown weekday '{other}'"))),
    }
}

/// First date on or after `today` falling on `day`
fn next_date_for(day: Weekday, today: NaiveDate) -> NaiveDate {
    let ahead = (day.num_days_from_monday() + 7
        - today.weekday().num_days_from_monday())
        % 7;
    today + Duration::days(ahead as i64)
}

fn build(draft: &Draft, now: DateTime<Utc>) -> Result<CompletedWizard> {
    let frequency = draft
        .frequency
        .ok_or_else(|| Error::validation("frequency not collected"))?;
    let time = draft
        .start_time
        .ok_or_else(|| Error::validation("start time not collected"))?;

    let date = match (frequency, draft.by_day, draft.start_date) {
        // Weekly: the anchor is the next occurrence of the chosen weekday;
        // if that is today but the time already passed, skip a week
        (Frequency::Weekly, Some(day), _) => {
            let mut date = next_date_for(day, now.date_naive());
            if date == now.date_naive() && time <= now.time() {
                date += Duration::days(7);
            }
            date
        }
        (_, _, Some(date)) => date,
        _ => return Err(Error::validation("start date not collected")),
    };

    let anchor = date
        .and_time(time)
        .and_utc();

    let mut recurrence = Recurrence::new(anchor, frequency);
    if let Some(day) = draft.by_day {
        recurrence = recurrence.with_by_day([day]);
    }

    Ok(CompletedWizard {
        title: draft.title.clone(),
        recurrence,
        chat_id: draft.chat_id,
        max_participants: draft.limit,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        // A Friday
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    fn walk(store: &SessionStore, actor: ActorId, answers: &[&str]) -> WizardOutcome {
        let mut outcome = None;
        for answer in answers {
            outcome = Some(store.answer(actor, answer, now()).unwrap());
        }
        outcome.expect("at least one answer")
    }

    #[test]
    fn test_weekly_flow_end_to_end() {
        let store = SessionStore::new();
        let actor = ActorId(1);
        assert_eq!(store.begin(actor, now()), WizardStep::Title);

        let outcome = walk(
            &store,
            actor,
            &["Weekly run", "weekly", "mon", "18:00", "-100123", "12", "yes"],
        );
        let WizardOutcome::Complete(done) = outcome else {
            panic!("expected completion");
        };
        assert_eq!(done.title, "Weekly run");
        assert_eq!(done.chat_id, Some(-100123));
        assert_eq!(done.max_participants, Some(12));
        // Next Monday after Friday 2024-03-01 is 2024-03-04
        assert_eq!(
            done.recurrence.anchor(),
            Utc.with_ymd_and_hms(2024, 3, 4, 18, 0, 0).unwrap()
        );
        assert_eq!(done.recurrence.frequency(), Frequency::Weekly);

        // The session is gone after completion
        assert!(store.current_step(actor, now()).is_none());
    }

    #[test]
    fn test_weekly_same_day_past_time_skips_a_week() {
        let store = SessionStore::new();
        let actor = ActorId(1);
        store.begin(actor, now());
        // Friday at 08:00 when it is already Friday 12:00
        let outcome = walk(&store, actor, &["Run", "weekly", "fri", "08:00", "skip", "none", "yes"]);
        let WizardOutcome::Complete(done) = outcome else {
            panic!("expected completion");
        };
        assert_eq!(
            done.recurrence.anchor(),
            Utc.with_ymd_and_hms(2024, 3, 8, 8, 0, 0).unwrap()
        );
        assert_eq!(done.chat_id, None);
        assert_eq!(done.max_participants, None);
    }

    #[test]
    fn test_monthly_flow_asks_for_date() {
        let store = SessionStore::new();
        let actor = ActorId(1);
        store.begin(actor, now());
        let outcome = walk(
            &store,
            actor,
            &["Board game night", "monthly", "2024-03-15", "19:30", "skip", "8", "yes"],
        );
        let WizardOutcome::Complete(done) = outcome else {
            panic!("expected completion");
        };
        assert_eq!(
            done.recurrence.anchor(),
            Utc.with_ymd_and_hms(2024, 3, 15, 19, 30, 0).unwrap()
        );
        assert_eq!(done.recurrence.frequency(), Frequency::Monthly);
    }

    #[test]
    fn test_invalid_answer_keeps_the_step() {
        let store = SessionStore::new();
        let actor = ActorId(1);
        store.begin(actor, now());
        store.answer(actor, "Run", now()).unwrap();

        assert!(store.answer(actor, "fortnightly", now()).is_err());
        assert_eq!(store.current_step(actor, now()), Some(WizardStep::Frequency));
        store.answer(actor, "daily", now()).unwrap();
        assert_eq!(store.current_step(actor, now()), Some(WizardStep::StartDate));
    }

    #[test]
    fn test_session_expiry_on_access() {
        let store = SessionStore::new();
        let actor = ActorId(1);
        store.begin(actor, now());

        let later = now() + Duration::minutes(SESSION_TIMEOUT_MINUTES + 1);
        let err = store.answer(actor, "Run", later).unwrap_err();
        assert!(err.to_string().contains("expired"));
        assert!(store.current_step(actor, later).is_none());

        // Within the window the session survives and activity renews it
        store.begin(actor, now());
        let mid = now() + Duration::minutes(4);
        store.answer(actor, "Run", mid).unwrap();
        let after = mid + Duration::minutes(4);
        assert_eq!(store.current_step(actor, after), Some(WizardStep::Frequency));
    }

    #[test]
    fn test_decline_at_confirm_cancels() {
        let store = SessionStore::new();
        let actor = ActorId(1);
        store.begin(actor, now());
        let outcome = walk(&store, actor, &["Run", "daily", "2024-03-02", "07:00", "skip", "none", "no"]);
        assert!(matches!(outcome, WizardOutcome::Cancelled));
        assert!(store.current_step(actor, now()).is_none());
    }

    #[test]
    fn test_one_session_per_actor() {
        let store = SessionStore::new();
        let actor = ActorId(1);
        store.begin(actor, now());
        store.answer(actor, "First", now()).unwrap();

        // Restart replaces the half-finished session
        store.begin(actor, now());
        assert_eq!(store.current_step(actor, now()), Some(WizardStep::Title));

        // Other actors are independent
        assert!(store.current_step(ActorId(2), now()).is_none());
        assert!(store.answer(ActorId(2), "x", now()).is_err());
    }
}
