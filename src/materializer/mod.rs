//! Materialization pass
//!
//! Turns recurrence rules into concrete instances over a rolling horizon.
//! The pass is idempotent: re-running over the same window finds the
//! existing instances and triggers no side effects. Announcements and admin
//! notices fire only on genuine creation.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use crate::error::{Error, Result};
use crate::ledger::reduce_latest_wins;
use crate::models::{EventInstance, EventSeries, MessageHandle};
use crate::storage::{InstanceRepository, LedgerRepository, SeriesRepository, SharedStore};
use crate::transport::{AdminDirectory, AnnouncementPublisher, AttendanceFormatter};

/// Outcome of one materialization run
#[derive(Debug, Default, Clone)]
pub struct MaterializeReport {
    pub series_processed: usize,
    pub instances_created: usize,
    pub announced: usize,
    /// Series that failed, with the error message; the run continued past them
    pub failures: Vec<(String, String)>,
}

impl MaterializeReport {
    pub fn merge(&mut self, other: MaterializeReport) {
        self.series_processed += other.series_processed;
        self.instances_created += other.instances_created;
        self.announced += other.announced;
        self.failures.extend(other.failures);
    }
}

impl std::fmt::Display for MaterializeReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} series, {} created, {} announced, {} failed",
            self.series_processed,
            self.instances_created,
            self.announced,
            self.failures.len()
        )
    }
}

/// Expands active series into instances and fans out the side effects
pub struct Materializer {
    store: SharedStore,
    publisher: Arc<dyn AnnouncementPublisher>,
    admins: Arc<dyn AdminDirectory>,
    formatter: Arc<dyn AttendanceFormatter>,
    horizon: Duration,
}

impl Materializer {
    pub fn new(
        store: SharedStore,
        publisher: Arc<dyn AnnouncementPublisher>,
        admins: Arc<dyn AdminDirectory>,
        formatter: Arc<dyn AttendanceFormatter>,
        horizon: Duration,
    ) -> Self {
        Self {
            store,
            publisher,
            admins,
            formatter,
            horizon,
        }
    }

    /// One full pass over all active series at the current time
    pub async fn run(&self) -> Result<MaterializeReport> {
        self.run_at(Utc::now()).await
    }

    /// One full pass with a pinned clock
    pub async fn run_at(&self, now: DateTime<Utc>) -> Result<MaterializeReport> {
        let series_list = self.store.list_active_series()?;
        let mut report = MaterializeReport::default();

        for series in &series_list {
            report.series_processed += 1;
            // One broken series must not starve the rest of the run
            match self.materialize_series(series, now).await {
                Ok(partial) => report.merge(partial),
                Err(e) => {
                    tracing::error!(
                        series_id = %series.id,
                        error = %e,
                        "series materialization failed"
                    );
                    report.failures.push((series.id.clone(), e.to_string()));
                }
            }
        }

        tracing::info!(%report, "materialization run complete");
        Ok(report)
    }

    async fn materialize_series(
        &self,
        series: &EventSeries,
        now: DateTime<Utc>,
    ) -> Result<MaterializeReport> {
        // occurrences_between is half-open; nudge the bound so an occurrence
        // landing exactly on now + horizon is included
        let to = now + self.horizon + Duration::seconds(1);
        let occurrences = series.recurrence.occurrences_between(now, to);
        let mut report = MaterializeReport::default();

        for start in occurrences {
            let instance = EventInstance::new(series, start);
            if !self.store.create_instance_if_absent(&instance)? {
                continue;
            }
            report.instances_created += 1;
            tracing::info!(
                series_id = %series.id,
                instance_id = %instance.id,
                start = %start,
                "instance materialized"
            );

            let announced = self.try_announce(series, &instance).await.is_some();
            if announced {
                report.announced += 1;
            }
            self.notify_admins(series, &instance, announced).await;
        }

        Ok(report)
    }

    /// Best-effort announcement; a failure leaves the instance standing
    /// unannounced for the manual announce path to pick up later
    async fn try_announce(
        &self,
        series: &EventSeries,
        instance: &EventInstance,
    ) -> Option<MessageHandle> {
        let channel = series.channel?;
        let text = self.formatter.render(series, instance, &[]);
        match self.publisher.publish(channel, &text, &instance.id).await {
            Ok(handle) => match self.store.set_announcement(&instance.id, handle) {
                Ok(()) => Some(handle),
                Err(e) => {
                    tracing::error!(
                        instance_id = %instance.id,
                        error = %e,
                        "failed to persist announcement handle"
                    );
                    None
                }
            },
            Err(e) => {
                tracing::warn!(
                    instance_id = %instance.id,
                    error = %e,
                    "announcement publish failed"
                );
                None
            }
        }
    }

    /// Best-effort fan-out; one unreachable admin never blocks the others
    async fn notify_admins(
        &self,
        series: &EventSeries,
        instance: &EventInstance,
        announced: bool,
    ) {
        let admins = match self.admins.list_admins(&series.tenant_id).await {
            Ok(admins) => admins,
            Err(e) => {
                tracing::warn!(
                    tenant_id = %series.tenant_id,
                    error = %e,
                    "could not resolve tenant admins"
                );
                return;
            }
        };

        let when = instance.start_time.format("%a %d %b %Y, %H:%M UTC");
        let text = if announced {
            format!("New event published: {} on {}", series.title, when)
        } else {
            format!(
                "New event created but NOT announced: {} on {}. Use the announce command to publish it.",
                series.title, when
            )
        };

        for admin in admins {
            if let Err(e) = self.admins.notify(admin.recipient, &text).await {
                tracing::warn!(
                    recipient = %admin.recipient,
                    error = %e,
                    "admin notice failed"
                );
            }
        }
    }

    /// Manually announce an existing instance.
    ///
    /// Refuses with [`Error::AlreadyAnnounced`] when a message handle already
    /// exists; the live message is the single source the edit path targets
    /// and a second one would fork it.
    pub async fn announce_instance(&self, instance_id: &str) -> Result<MessageHandle> {
        let instance = self
            .store
            .get_instance(instance_id)?
            .ok_or_else(|| Error::instance_not_found(instance_id))?;
        if instance.is_announced() {
            return Err(Error::AlreadyAnnounced(instance_id.to_string()));
        }

        let series = self
            .store
            .get_series(&instance.series_id)?
            .ok_or_else(|| Error::series_not_found(&instance.series_id))?;
        let channel = series
            .channel
            .ok_or_else(|| Error::validation("series has no announcement channel"))?;

        let records = self.store.participation_for_instance(instance_id)?;
        let participants = reduce_latest_wins(&records);
        let text = self.formatter.render(&series, &instance, &participants);

        let handle = self.publisher.publish(channel, &text, instance_id).await?;
        self.store.set_announcement(instance_id, handle)?;
        tracing::info!(instance_id, message_id = handle.message_id, "instance announced manually");
        Ok(handle)
    }
}
