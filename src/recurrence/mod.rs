//! Recurrence rules and occurrence expansion
//!
//! This module provides the canonical [`Recurrence`] type and its pure
//! expansion into concrete occurrence timestamps. A rule arrives either as a
//! string (`FREQ=WEEKLY;BYDAY=MO;INTERVAL=2;COUNT=10`, optionally with a
//! `DTSTART`) or is built programmatically; both paths converge on the same
//! validated structure, so no dual-path logic survives past the boundary.
//!
//! # Supported grammar
//!
//! `FREQ` (DAILY | WEEKLY | MONTHLY), `BYDAY` (weekly only), `INTERVAL`,
//! `COUNT`, `DTSTART` (basic format `YYYYMMDDTHHMMSSZ`). Anything else is a
//! validation error. All expansion happens in UTC; the series carries its
//! timezone as a label only.
//!
//! # Window convention
//!
//! [`Recurrence::occurrences_between`] takes a half-open window `[from, to)`.
//! Callers that need an inclusive upper bound (the materializer does, for its
//! horizon instant) pass `to + 1s`.

use chrono::{DateTime, Datelike, Duration, Months, NaiveDate, Utc, Weekday};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{Error, Result};

/// Iteration guard: no sane horizon expands through more steps than this
const MAX_EXPANSION_STEPS: usize = 100_000;

// ============================================================================
// Frequency
// ============================================================================

/// Base repetition frequency of a rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Frequency {
    Daily,
    Weekly,
    Monthly,
}

impl Frequency {
    /// Convert to the rule-string token
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Daily => "DAILY",
            Self::Weekly => "WEEKLY",
            Self::Monthly => "MONTHLY",
        }
    }
}

impl std::str::FromStr for Frequency {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "DAILY" => Ok(Self::Daily),
            "WEEKLY" => Ok(Self::Weekly),
            "MONTHLY" => Ok(Self::Monthly),
            other => Err(Error::validation(format!("unsupported FREQ '{other}'"))),
        }
    }
}

// ============================================================================
// Recurrence
// ============================================================================

/// Canonical structured recurrence definition
///
/// The anchor fixes both the first candidate occurrence and the time-of-day
/// every later occurrence inherits. For weekly rules an optional by-day set
/// widens the pattern to several weekdays; an empty set means "the anchor's
/// weekday".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recurrence {
    anchor: DateTime<Utc>,
    frequency: Frequency,
    by_day: Vec<Weekday>,
    interval: u32,
    count: Option<u32>,
}

impl Recurrence {
    /// Create a rule with interval 1 and no stop-count
    pub fn new(anchor: DateTime<Utc>, frequency: Frequency) -> Self {
        Self {
            anchor,
            frequency,
            by_day: Vec::new(),
            interval: 1,
            count: None,
        }
    }

    /// A one-off rule: a single occurrence at the anchor
    pub fn once(anchor: DateTime<Utc>) -> Self {
        Self::new(anchor, Frequency::Daily).with_count(1)
    }

    /// Set the weekly by-day set (deduplicated, kept in Mon..Sun order)
    pub fn with_by_day(mut self, days: impl IntoIterator<Item = Weekday>) -> Self {
        let mut set: Vec<Weekday> = days.into_iter().collect();
        set.sort_by_key(|d| d.num_days_from_monday());
        set.dedup();
        self.by_day = set;
        self
    }

    /// Set the repetition interval (values below 1 are clamped to 1)
    pub fn with_interval(mut self, interval: u32) -> Self {
        self.interval = interval.max(1);
        self
    }

    /// Set the stop-count
    pub fn with_count(mut self, count: u32) -> Self {
        self.count = Some(count);
        self
    }

    /// Anchor timestamp
    pub fn anchor(&self) -> DateTime<Utc> {
        self.anchor
    }

    /// Base frequency
    pub fn frequency(&self) -> Frequency {
        self.frequency
    }

    /// Parse a rule string, using `fallback_anchor` when `DTSTART` is absent
    ///
    /// The original input sources sometimes carried the anchor inside the rule
    /// and sometimes alongside it; this is the single place both shapes are
    /// accepted.
    pub fn parse(rule: &str, fallback_anchor: DateTime<Utc>) -> Result<Self> {
        let mut frequency: Option<Frequency> = None;
        let mut anchor: Option<DateTime<Utc>> = None;
        let mut by_day: Vec<Weekday> = Vec::new();
        let mut interval: u32 = 1;
        let mut count: Option<u32> = None;

        for part in rule.split(';').filter(|p| !p.trim().is_empty()) {
            let (key, value) = part
                .split_once('=')
                .ok_or_else(|| Error::validation(format!("malformed rule part '{part}'")))?;

            match key.trim() {
                "FREQ" => frequency = Some(value.trim().parse()?),
                "DTSTART" => anchor = Some(parse_dtstart(value.trim())?),
                "BYDAY" => {
                    for token in value.split(',') {
                        by_day.push(parse_weekday(token.trim())?);
                    }
                }
                "INTERVAL" => {
                    interval = value.trim().parse::<u32>().map_err(|_| {
                        Error::validation(format!("invalid INTERVAL '{value}'"))
                    })?;
                    if interval == 0 {
                        return Err(Error::validation("INTERVAL must be at least 1"));
                    }
                }
                "COUNT" => {
                    let n = value.trim().parse::<u32>().map_err(|_| {
                        Error::validation(format!("invalid COUNT '{value}'"))
                    })?;
                    if n == 0 {
                        return Err(Error::validation("COUNT must be at least 1"));
                    }
                    count = Some(n);
                }
                other => {
                    return Err(Error::validation(format!(
                        "unsupported rule component '{other}'"
                    )))
                }
            }
        }

        let frequency =
            frequency.ok_or_else(|| Error::validation("rule is missing FREQ"))?;

        if !by_day.is_empty() && frequency != Frequency::Weekly {
            return Err(Error::validation("BYDAY is only valid with FREQ=WEEKLY"));
        }

        let mut recurrence = Self::new(anchor.unwrap_or(fallback_anchor), frequency)
            .with_interval(interval)
            .with_by_day(by_day);
        recurrence.count = count;
        Ok(recurrence)
    }

    /// Canonical rule string, always carrying the anchor as `DTSTART`
    pub fn to_rule_string(&self) -> String {
        let mut out = format!(
            "DTSTART={};FREQ={}",
            self.anchor.format("%Y%m%dT%H%M%SZ"),
            self.frequency.as_str()
        );
        if !self.by_day.is_empty() {
            let days: Vec<&str> = self.by_day.iter().map(|d| weekday_token(*d)).collect();
            out.push_str(&format!(";BYDAY={}", days.join(",")));
        }
        if self.interval > 1 {
            out.push_str(&format!(";INTERVAL={}", self.interval));
        }
        if let Some(count) = self.count {
            out.push_str(&format!(";COUNT={count}"));
        }
        out
    }

    /// Expand the rule into the ordered, deduplicated occurrences that fall
    /// inside the half-open window `[from, to)`
    ///
    /// Pure: no I/O, no clock access. An empty window, or an anchor at or
    /// after `to`, yields an empty vec, not an error.
    pub fn occurrences_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Vec<DateTime<Utc>> {
        let mut out = Vec::new();
        if from >= to || self.anchor >= to {
            return out;
        }

        // Emit pattern matches from the anchor forward, in order; COUNT caps
        // the matches from the anchor, not the matches inside the window
        let mut emitted: u32 = 0;
        let mut emit = |occurrence: DateTime<Utc>| -> bool {
            if self.count.is_some_and(|count| emitted >= count) {
                return false;
            }
            emitted += 1;
            if occurrence >= to {
                return false;
            }
            if occurrence >= from {
                out.push(occurrence);
            }
            true
        };

        match self.frequency {
            Frequency::Daily => {
                for k in 0..MAX_EXPANSION_STEPS {
                    let Some(occ) = self
                        .anchor
                        .checked_add_signed(Duration::days(k as i64 * self.interval as i64))
                    else {
                        break;
                    };
                    if !emit(occ) {
                        break;
                    }
                }
            }
            Frequency::Monthly => {
                for k in 0..MAX_EXPANSION_STEPS {
                    // chrono clamps the day-of-month when the target month is
                    // shorter (Jan 31 + 1 month = Feb 28/29)
                    let Some(occ) = self
                        .anchor
                        .checked_add_months(Months::new(k as u32 * self.interval))
                    else {
                        break;
                    };
                    if !emit(occ) {
                        break;
                    }
                }
            }
            Frequency::Weekly if self.by_day.is_empty() => {
                for k in 0..MAX_EXPANSION_STEPS {
                    let Some(occ) = self
                        .anchor
                        .checked_add_signed(Duration::weeks(k as i64 * self.interval as i64))
                    else {
                        break;
                    };
                    if !emit(occ) {
                        break;
                    }
                }
            }
            Frequency::Weekly => {
                // Walk forward one day at a time from the anchor; keep days
                // whose weekday matches and whose week lands on the interval
                // grid relative to the anchor's week
                let anchor_week = week_start(self.anchor.date_naive());
                let mut date = self.anchor.date_naive();
                for _ in 0..MAX_EXPANSION_STEPS {
                    let week_index = (week_start(date) - anchor_week).num_days() / 7;
                    if week_index % self.interval as i64 == 0
                        && self.by_day.contains(&date.weekday())
                        && !emit(date.and_time(self.anchor.time()).and_utc())
                    {
                        break;
                    }
                    match date.succ_opt() {
                        Some(next) => date = next,
                        None => break,
                    }
                }
            }
        }
        out
    }
}

// Recurrence serializes as its canonical rule string
impl Serialize for Recurrence {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_rule_string())
    }
}

impl<'de> Deserialize<'de> for Recurrence {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let rule = String::deserialize(deserializer)?;
        // Canonical strings always carry DTSTART; the fallback is never used
        Recurrence::parse(&rule, DateTime::<Utc>::MIN_UTC)
            .map_err(serde::de::Error::custom)
    }
}

impl std::fmt::Display for Recurrence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_rule_string())
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn parse_dtstart(value: &str) -> Result<DateTime<Utc>> {
    chrono::NaiveDateTime::parse_from_str(value, "%Y%m%dT%H%M%SZ")
        .map(|dt| dt.and_utc())
        .map_err(|_| {
            Error::validation(format!(
                "invalid DTSTART '{value}', expected YYYYMMDDTHHMMSSZ"
            ))
        })
}

fn parse_weekday(token: &str) -> Result<Weekday> {
    match token {
        "MO" => Ok(Weekday::Mon),
        "TU" => Ok(Weekday::Tue),
        "WE" => Ok(Weekday::Wed),
        "TH" => Ok(Weekday::Thu),
        "FR" => Ok(Weekday::Fri),
        "SA" => Ok(Weekday::Sat),
        "SU" => Ok(Weekday::Sun),
        other => Err(Error::validation(format!("invalid BYDAY token '{other}'"))),
    }
}

fn weekday_token(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "MO",
        Weekday::Tue => "TU",
        Weekday::Wed => "WE",
        Weekday::Thu => "TH",
        Weekday::Fri => "FR",
        Weekday::Sat => "SA",
        Weekday::Sun => "SU",
    }
}

// Monday of the week containing `date`
fn week_start(date: NaiveDate) -> NaiveDate {
    date - Duration::days(date.weekday().num_days_from_monday() as i64)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn dt(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    // 2024-01-01 is a Monday
    fn monday_anchor() -> DateTime<Utc> {
        dt(2024, 1, 1, 18, 0)
    }

    #[test]
    fn test_parse_minimal_rule() {
        let r = Recurrence::parse("FREQ=WEEKLY", monday_anchor()).unwrap();
        assert_eq!(r.frequency(), Frequency::Weekly);
        assert_eq!(r.anchor(), monday_anchor());
        assert_eq!(r.interval, 1);
        assert!(r.count.is_none());
    }

    #[test]
    fn test_parse_full_rule_with_dtstart() {
        let r = Recurrence::parse(
            "DTSTART=20240101T180000Z;FREQ=WEEKLY;BYDAY=MO,WE;INTERVAL=2;COUNT=10",
            dt(2030, 1, 1, 0, 0),
        )
        .unwrap();
        assert_eq!(r.anchor(), monday_anchor());
        assert_eq!(r.by_day, vec![Weekday::Mon, Weekday::Wed]);
        assert_eq!(r.interval, 2);
        assert_eq!(r.count, Some(10));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        let anchor = monday_anchor();
        assert!(Recurrence::parse("FREQ=YEARLY", anchor).is_err());
        assert!(Recurrence::parse("BYDAY=MO", anchor).is_err());
        assert!(Recurrence::parse("FREQ=DAILY;BYDAY=MO", anchor).is_err());
        assert!(Recurrence::parse("FREQ=WEEKLY;INTERVAL=0", anchor).is_err());
        assert!(Recurrence::parse("FREQ=WEEKLY;COUNT=0", anchor).is_err());
        assert!(Recurrence::parse("FREQ=WEEKLY;UNTIL=20250101T000000Z", anchor).is_err());
        assert!(Recurrence::parse("nonsense", anchor).is_err());
    }

    #[test]
    fn test_rule_string_roundtrip() {
        let r = Recurrence::new(monday_anchor(), Frequency::Weekly)
            .with_by_day([Weekday::Wed, Weekday::Mon])
            .with_interval(2)
            .with_count(5);
        let rule = r.to_rule_string();
        assert_eq!(
            rule,
            "DTSTART=20240101T180000Z;FREQ=WEEKLY;BYDAY=MO,WE;INTERVAL=2;COUNT=5"
        );
        let parsed = Recurrence::parse(&rule, dt(2030, 1, 1, 0, 0)).unwrap();
        assert_eq!(parsed, r);
    }

    #[test]
    fn test_daily_expansion() {
        let r = Recurrence::new(monday_anchor(), Frequency::Daily);
        let occ = r.occurrences_between(dt(2024, 1, 1, 0, 0), dt(2024, 1, 4, 0, 0));
        assert_eq!(
            occ,
            vec![dt(2024, 1, 1, 18, 0), dt(2024, 1, 2, 18, 0), dt(2024, 1, 3, 18, 0)]
        );
    }

    #[test]
    fn test_weekly_expansion_keeps_time_of_day() {
        let r = Recurrence::new(monday_anchor(), Frequency::Weekly);
        let occ = r.occurrences_between(dt(2024, 1, 1, 0, 0), dt(2024, 1, 22, 0, 0));
        assert_eq!(
            occ,
            vec![dt(2024, 1, 1, 18, 0), dt(2024, 1, 8, 18, 0), dt(2024, 1, 15, 18, 0)]
        );
    }

    #[test]
    fn test_weekly_by_day_expansion() {
        let r = Recurrence::new(monday_anchor(), Frequency::Weekly)
            .with_by_day([Weekday::Mon, Weekday::Wed]);
        let occ = r.occurrences_between(dt(2024, 1, 1, 0, 0), dt(2024, 1, 11, 0, 0));
        assert_eq!(
            occ,
            vec![
                dt(2024, 1, 1, 18, 0),
                dt(2024, 1, 3, 18, 0),
                dt(2024, 1, 8, 18, 0),
                dt(2024, 1, 10, 18, 0),
            ]
        );
    }

    #[test]
    fn test_weekly_interval_two() {
        let r = Recurrence::new(monday_anchor(), Frequency::Weekly).with_interval(2);
        let occ = r.occurrences_between(dt(2024, 1, 1, 0, 0), dt(2024, 2, 1, 0, 0));
        assert_eq!(
            occ,
            vec![dt(2024, 1, 1, 18, 0), dt(2024, 1, 15, 18, 0), dt(2024, 1, 29, 18, 0)]
        );
    }

    #[test]
    fn test_weekly_by_day_interval_two_skips_off_weeks() {
        let r = Recurrence::new(monday_anchor(), Frequency::Weekly)
            .with_by_day([Weekday::Mon, Weekday::Fri])
            .with_interval(2);
        let occ = r.occurrences_between(dt(2024, 1, 1, 0, 0), dt(2024, 1, 20, 0, 0));
        // Week of Jan 1 (on-grid): Mon 1, Fri 5. Week of Jan 8 skipped.
        // Week of Jan 15 (on-grid): Mon 15, Fri 19.
        assert_eq!(
            occ,
            vec![
                dt(2024, 1, 1, 18, 0),
                dt(2024, 1, 5, 18, 0),
                dt(2024, 1, 15, 18, 0),
                dt(2024, 1, 19, 18, 0),
            ]
        );
    }

    #[test]
    fn test_monthly_expansion_clamps_short_months() {
        let r = Recurrence::new(dt(2024, 1, 31, 10, 0), Frequency::Monthly);
        let occ = r.occurrences_between(dt(2024, 1, 1, 0, 0), dt(2024, 4, 1, 0, 0));
        assert_eq!(
            occ,
            vec![dt(2024, 1, 31, 10, 0), dt(2024, 2, 29, 10, 0), dt(2024, 3, 31, 10, 0)]
        );
    }

    #[test]
    fn test_count_caps_occurrences() {
        let r = Recurrence::new(monday_anchor(), Frequency::Daily).with_count(2);
        let occ = r.occurrences_between(dt(2024, 1, 1, 0, 0), dt(2024, 2, 1, 0, 0));
        assert_eq!(occ.len(), 2);
    }

    #[test]
    fn test_count_applies_from_anchor_not_window() {
        // The two counted occurrences happen before the window opens
        let r = Recurrence::new(monday_anchor(), Frequency::Daily).with_count(2);
        let occ = r.occurrences_between(dt(2024, 1, 5, 0, 0), dt(2024, 2, 1, 0, 0));
        assert!(occ.is_empty());
    }

    #[test]
    fn test_once_rule() {
        let r = Recurrence::once(monday_anchor());
        let occ = r.occurrences_between(dt(2024, 1, 1, 0, 0), dt(2025, 1, 1, 0, 0));
        assert_eq!(occ, vec![monday_anchor()]);
    }

    #[test]
    fn test_window_boundaries_inclusive_from_exclusive_to() {
        let r = Recurrence::new(monday_anchor(), Frequency::Weekly);
        // from == occurrence: included
        let occ = r.occurrences_between(dt(2024, 1, 8, 18, 0), dt(2024, 1, 9, 0, 0));
        assert_eq!(occ, vec![dt(2024, 1, 8, 18, 0)]);
        // to == occurrence: excluded
        let occ = r.occurrences_between(dt(2024, 1, 8, 0, 0), dt(2024, 1, 8, 18, 0));
        assert!(occ.is_empty());
    }

    #[test]
    fn test_empty_windows() {
        let r = Recurrence::new(monday_anchor(), Frequency::Weekly);
        assert!(r
            .occurrences_between(dt(2024, 1, 1, 0, 0), dt(2024, 1, 1, 0, 0))
            .is_empty());
        assert!(r
            .occurrences_between(dt(2024, 1, 2, 0, 0), dt(2024, 1, 1, 0, 0))
            .is_empty());
        // Anchor after the window
        assert!(r
            .occurrences_between(dt(2023, 1, 1, 0, 0), dt(2023, 6, 1, 0, 0))
            .is_empty());
    }

    #[test]
    fn test_window_with_no_matches_is_empty_not_error() {
        let r = Recurrence::new(monday_anchor(), Frequency::Weekly);
        let occ = r.occurrences_between(dt(2024, 1, 2, 0, 0), dt(2024, 1, 7, 0, 0));
        assert!(occ.is_empty());
    }

    #[test]
    fn test_scenario_just_in_time_window() {
        // Weekly Monday 18:00; now = Monday 17:55, horizon 10 minutes
        let r = Recurrence::new(monday_anchor(), Frequency::Weekly);
        let now = dt(2024, 1, 8, 17, 55);
        let occ = r.occurrences_between(now, now + Duration::minutes(10));
        assert_eq!(occ, vec![dt(2024, 1, 8, 18, 0)]);
    }

    #[test]
    fn test_serde_as_rule_string() {
        let r = Recurrence::new(monday_anchor(), Frequency::Weekly).with_by_day([Weekday::Mon]);
        let json = serde_json::to_string(&r).unwrap();
        assert_eq!(json, "\"DTSTART=20240101T180000Z;FREQ=WEEKLY;BYDAY=MO\"");
        let back: Recurrence = serde_json::from_str(&json).unwrap();
        assert_eq!(back, r);
    }
}
