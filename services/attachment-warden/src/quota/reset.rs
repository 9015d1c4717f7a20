use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Datelike, FixedOffset, NaiveTime, Offset, TimeZone, Utc, Weekday};
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use super::error::QuotaError;
use super::locks::KeyLocks;
use super::model::{ResetFrequency, UsageKey, UsageRecord};
use super::store::{run_blocking, run_write, PolicySource, UsageStore};

/// A fixed weekly wall-clock instant, e.g. Sunday 00:00 at UTC+02:00.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WeeklyAnchor {
    pub weekday: Weekday,
    pub hour: u32,
    pub offset: FixedOffset,
}

impl Default for WeeklyAnchor {
    fn default() -> Self {
        Self {
            weekday: Weekday::Sun,
            hour: 0,
            offset: Utc.fix(),
        }
    }
}

impl WeeklyAnchor {
    pub fn new(weekday: Weekday, hour: u32, offset: FixedOffset) -> Self {
        Self {
            weekday,
            hour: hour.min(23),
            offset,
        }
    }

    /// The latest anchor instant that is not after `now`.
    pub fn most_recent(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let local = now.with_timezone(&self.offset);
        let days_back = (local.weekday().num_days_from_monday() + 7
            - self.weekday.num_days_from_monday())
            % 7;
        let date = local.date_naive() - chrono::Duration::days(i64::from(days_back));
        let time = NaiveTime::from_hms_opt(self.hour, 0, 0).unwrap_or(NaiveTime::MIN);
        let local_anchor = date.and_time(time)
            - chrono::Duration::seconds(i64::from(self.offset.local_minus_utc()));
        let anchor = Utc.from_utc_datetime(&local_anchor);

        if anchor > now {
            anchor - chrono::Duration::days(7)
        } else {
            anchor
        }
    }
}

/// When a usage counter becomes eligible for zeroing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetPolicy {
    /// Relative to the counter's own last reset.
    Rolling { window: chrono::Duration },
    /// Shared wall-clock boundary for every counter.
    Anchored(WeeklyAnchor),
}

impl ResetPolicy {
    pub fn is_due(&self, last_reset: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        match self {
            ResetPolicy::Rolling { window } => now - last_reset > *window,
            ResetPolicy::Anchored(anchor) => last_reset < anchor.most_recent(now),
        }
    }
}

/// Maps each [`ResetFrequency`] onto its concrete [`ResetPolicy`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResetSchedule {
    pub daily_window: chrono::Duration,
    pub weekly_anchor: WeeklyAnchor,
}

impl Default for ResetSchedule {
    fn default() -> Self {
        Self {
            daily_window: chrono::Duration::hours(24),
            weekly_anchor: WeeklyAnchor::default(),
        }
    }
}

impl ResetSchedule {
    pub fn policy_for(&self, frequency: ResetFrequency) -> ResetPolicy {
        match frequency {
            ResetFrequency::Daily => ResetPolicy::Rolling {
                window: self.daily_window,
            },
            ResetFrequency::Weekly => ResetPolicy::Anchored(self.weekly_anchor),
        }
    }
}

/// The cadence of the rule that charged `record`, as configured now. Records
/// charged under the global default, or whose rule is gone, keep their own.
fn current_cadence(record: &UsageRecord, cadences: &HashMap<i64, ResetFrequency>) -> ResetFrequency {
    record
        .rule_id
        .and_then(|rule_id| cadences.get(&rule_id).copied())
        .unwrap_or(record.reset_frequency)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub examined: usize,
    pub reset: usize,
    pub failed: usize,
}

/// Periodically zeroes counters whose reset window has elapsed.
///
/// Every record is reset under its own key lock, so an admission for one
/// (user, channel) waits for at most one record update, never the sweep.
#[derive(Clone)]
pub struct ResetScheduler {
    store: Arc<dyn UsageStore>,
    policy: Arc<dyn PolicySource>,
    locks: KeyLocks,
    schedule: ResetSchedule,
    tick: Duration,
    store_timeout: Duration,
}

impl ResetScheduler {
    pub fn new(
        store: Arc<dyn UsageStore>,
        policy: Arc<dyn PolicySource>,
        locks: KeyLocks,
        schedule: ResetSchedule,
        tick: Duration,
        store_timeout: Duration,
    ) -> Self {
        Self {
            store,
            policy,
            locks,
            schedule,
            tick,
            store_timeout,
        }
    }

    pub async fn sweep(&self) -> Result<SweepReport, QuotaError> {
        self.sweep_at(Utc::now()).await
    }

    pub async fn sweep_at(&self, now: DateTime<Utc>) -> Result<SweepReport, QuotaError> {
        let store = Arc::clone(&self.store);
        let records = run_blocking(self.store_timeout, "list_usage", move || store.list_usage()).await?;
        let policy = Arc::clone(&self.policy);
        let cadences =
            run_blocking(self.store_timeout, "rule_cadences", move || policy.rule_cadences()).await?;

        let mut report = SweepReport {
            examined: records.len(),
            ..SweepReport::default()
        };

        for record in records {
            let cadence = current_cadence(&record, &cadences);
            if !self.schedule.policy_for(cadence).is_due(record.last_reset, now) {
                continue;
            }

            let key = record.key();
            match self.reset_record(key, &cadences, now).await {
                Ok(true) => report.reset += 1,
                Ok(false) => {}
                Err(err) => {
                    report.failed += 1;
                    warn!(
                        user_id = key.user_id,
                        channel_id = key.channel_id,
                        error = %err,
                        "failed to reset usage record; continuing sweep"
                    );
                }
            }
        }

        self.locks.prune();
        Ok(report)
    }

    /// Re-reads the record under its key lock, since an admission may have
    /// touched it after the listing.
    async fn reset_record(
        &self,
        key: UsageKey,
        cadences: &HashMap<i64, ResetFrequency>,
        now: DateTime<Utc>,
    ) -> Result<bool, QuotaError> {
        let _guard = self.locks.lock(key).await;

        let store = Arc::clone(&self.store);
        let current = run_blocking(self.store_timeout, "get_usage", move || {
            store.get_usage(key.user_id, key.channel_id)
        })
        .await?;

        let Some(mut record) = current else {
            return Ok(false);
        };
        let cadence = current_cadence(&record, cadences);
        if !self.schedule.policy_for(cadence).is_due(record.last_reset, now) {
            return Ok(false);
        }

        let previous = record.usage_count;
        record.usage_count = 0;
        record.last_reset = now;
        record.reset_frequency = cadence;

        let store = Arc::clone(&self.store);
        run_write(self.store_timeout, "commit_usage", move || store.commit_usage(&record)).await?;

        debug!(
            user_id = key.user_id,
            channel_id = key.channel_id,
            previous,
            "usage counter reset"
        );
        Ok(true)
    }

    /// Spawns the periodic loop. The first tick fires one interval from now;
    /// callers run [`ResetScheduler::sweep`] eagerly at startup.
    pub fn start(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + self.tick, self.tick);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                ticker.tick().await;
                match self.sweep().await {
                    Ok(report) if report.reset > 0 || report.failed > 0 => {
                        info!(
                            examined = report.examined,
                            reset = report.reset,
                            failed = report.failed,
                            "usage reset sweep finished"
                        );
                    }
                    Ok(report) => {
                        debug!(examined = report.examined, "no usage counters due for reset");
                    }
                    Err(err) => {
                        error!(error = %err, "usage reset sweep failed");
                    }
                }
            }
        })
    }
}
