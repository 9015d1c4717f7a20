use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, error, info};

use super::classify::AttachmentClassifier;
use super::error::QuotaError;
use super::event::{Attachment, MessageEvent};
use super::locks::KeyLocks;
use super::model::{ResetFrequency, UsageKey, UsageRecord};
use super::policy::{Policy, PolicyResolver};
use super::reset::ResetSchedule;
use super::store::{run_blocking, run_write, UsageStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionReason {
    NoTrackedAttachments,
    Unlimited,
    WithinQuota,
    PartiallyOverQuota,
    QuotaExhausted,
    ChannelBlocked,
    RoleRequired,
    StoreUnavailable,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AdmissionAction {
    AllowUnchanged,
    /// Repost carrying the admitted tracked attachments, every untracked
    /// attachment and the original text, in original order.
    ReplaceWithPartial {
        attachments: Vec<Attachment>,
        text: String,
    },
    RejectAll,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct UsageSnapshot {
    pub used: u32,
    pub limit: u32,
    pub reset_frequency: ResetFrequency,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Decision {
    pub admitted_count: usize,
    pub rejected_count: usize,
    pub action: AdmissionAction,
    pub reason: DecisionReason,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<UsageSnapshot>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub required_roles: Vec<String>,
}

impl Decision {
    fn allow(admitted_count: usize, reason: DecisionReason, usage: Option<UsageSnapshot>) -> Self {
        Self {
            admitted_count,
            rejected_count: 0,
            action: AdmissionAction::AllowUnchanged,
            reason,
            usage,
            required_roles: Vec::new(),
        }
    }

    fn reject(rejected_count: usize, reason: DecisionReason, usage: Option<UsageSnapshot>) -> Self {
        Self {
            admitted_count: 0,
            rejected_count,
            action: AdmissionAction::RejectAll,
            reason,
            usage,
            required_roles: Vec::new(),
        }
    }

    /// The explanation owed to the sender, if the message was altered.
    pub fn notice(&self) -> Option<String> {
        let cadence = self
            .usage
            .map(|usage| usage.reset_frequency.as_str())
            .unwrap_or("daily");

        match self.reason {
            DecisionReason::NoTrackedAttachments
            | DecisionReason::Unlimited
            | DecisionReason::WithinQuota => None,
            DecisionReason::PartiallyOverQuota => {
                let limit = self.usage.map(|usage| usage.limit).unwrap_or_default();
                Some(format!(
                    "Only {} of your {} files were kept: you reached your {cadence} upload limit of {limit} in that channel.",
                    self.admitted_count,
                    self.admitted_count + self.rejected_count,
                ))
            }
            DecisionReason::QuotaExhausted => Some(format!(
                "You've reached your {cadence} upload limit in that channel, so your message was removed."
            )),
            DecisionReason::ChannelBlocked => Some(
                "Uploading these files is not allowed in that channel, so your message was removed."
                    .to_string(),
            ),
            DecisionReason::RoleRequired => Some(format!(
                "You don't have the required role ({}) to upload files in that channel.",
                self.required_roles.join(", ")
            )),
            DecisionReason::StoreUnavailable => Some(
                "Your upload could not be checked right now, so your message was removed. Please try again later."
                    .to_string(),
            ),
        }
    }
}

/// Outcome of charging `presented` attachments against a counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Admission {
    pub admitted: usize,
    pub new_usage: u32,
}

/// `admitted = min(presented, limit - usage)`, never negative, and the new
/// usage never passes `limit`.
pub fn compute_admission(usage_count: u32, limit: u32, presented: usize) -> Admission {
    let remaining = limit.saturating_sub(usage_count) as usize;
    let admitted = presented.min(remaining);
    Admission {
        admitted,
        new_usage: usage_count + admitted as u32,
    }
}

#[derive(Clone)]
pub struct AdmissionEngine {
    store: Arc<dyn UsageStore>,
    resolver: PolicyResolver,
    classifier: Arc<AttachmentClassifier>,
    locks: KeyLocks,
    schedule: ResetSchedule,
    store_timeout: Duration,
}

impl AdmissionEngine {
    pub fn new(
        store: Arc<dyn UsageStore>,
        resolver: PolicyResolver,
        classifier: AttachmentClassifier,
        locks: KeyLocks,
        schedule: ResetSchedule,
        store_timeout: Duration,
    ) -> Self {
        Self {
            store,
            resolver,
            classifier: Arc::new(classifier),
            locks,
            schedule,
            store_timeout,
        }
    }

    pub fn classifier(&self) -> &AttachmentClassifier {
        &self.classifier
    }

    pub async fn admit(&self, event: &MessageEvent) -> Decision {
        self.admit_at(event, Utc::now()).await
    }

    /// Decides one event and commits its usage. Store faults fail closed.
    pub async fn admit_at(&self, event: &MessageEvent, now: DateTime<Utc>) -> Decision {
        let tracked = self.classifier.tracked_positions(&event.attachments);
        if tracked.is_empty() {
            return Decision::allow(0, DecisionReason::NoTrackedAttachments, None);
        }

        match self.evaluate(event, &tracked, now).await {
            Ok(decision) => decision,
            Err(err) => {
                error!(
                    message_id = event.message_id,
                    channel_id = event.channel_id,
                    user_id = event.author_id,
                    tracked = tracked.len(),
                    error = %err,
                    "admission failed closed"
                );
                Decision::reject(tracked.len(), DecisionReason::StoreUnavailable, None)
            }
        }
    }

    async fn evaluate(
        &self,
        event: &MessageEvent,
        tracked: &[usize],
        now: DateTime<Utc>,
    ) -> Result<Decision, QuotaError> {
        let channel_id = event.channel_id;

        let resolver = self.resolver.clone();
        let blocked = run_blocking(self.store_timeout, "is_channel_blocked", move || {
            resolver.is_blocked(channel_id)
        })
        .await?;
        if blocked {
            info!(
                message_id = event.message_id,
                channel_id,
                user_id = event.author_id,
                "tracked upload in blocked channel"
            );
            return Ok(Decision::reject(
                tracked.len(),
                DecisionReason::ChannelBlocked,
                None,
            ));
        }

        let resolver = self.resolver.clone();
        let roles = event.author_roles.clone();
        let policy = run_blocking(self.store_timeout, "resolve_policy", move || {
            resolver.resolve(channel_id, &roles)
        })
        .await?;

        match policy {
            Policy::Unlimited => Ok(Decision::allow(
                tracked.len(),
                DecisionReason::Unlimited,
                None,
            )),
            Policy::RoleRequired { roles } => {
                let mut decision =
                    Decision::reject(tracked.len(), DecisionReason::RoleRequired, None);
                decision.required_roles = roles;
                Ok(decision)
            }
            Policy::Limited {
                limit,
                reset_frequency,
                source,
            } => {
                debug!(channel_id, limit, ?source, "resolved upload limit");
                self.charge(event, tracked, limit, reset_frequency, source.rule_id(), now)
                    .await
            }
        }
    }

    async fn charge(
        &self,
        event: &MessageEvent,
        tracked: &[usize],
        limit: u32,
        reset_frequency: ResetFrequency,
        rule_id: Option<i64>,
        now: DateTime<Utc>,
    ) -> Result<Decision, QuotaError> {
        let key = UsageKey::new(event.author_id, event.channel_id);
        let _guard = self.locks.lock(key).await;

        let store = Arc::clone(&self.store);
        let existing = run_blocking(self.store_timeout, "get_usage", move || {
            store.get_usage(key.user_id, key.channel_id)
        })
        .await?;

        let policy = self.schedule.policy_for(reset_frequency);
        let stored_count = existing.as_ref().map(|record| record.usage_count);
        let (usage_count, last_reset) = match existing {
            Some(record) if policy.is_due(record.last_reset, now) => {
                debug!(%key, stale = record.usage_count, "window elapsed; charging a fresh counter");
                (0, now)
            }
            Some(record) => (record.usage_count, record.last_reset),
            None => (0, now),
        };

        let record_at = |usage_count: u32| UsageRecord {
            user_id: event.author_id,
            channel_id: event.channel_id,
            username: event.author_name.clone(),
            usage_count,
            reset_frequency,
            last_reset,
            rule_id,
        };

        let admission = compute_admission(usage_count, limit, tracked.len());
        let rejected = tracked.len() - admission.admitted;

        if admission.admitted == 0 {
            // A lowered limit or a lost role can leave the counter above the
            // tier that now applies; settle it at the limit.
            let settled = usage_count.min(limit);
            if stored_count.is_some_and(|stored| stored != settled) {
                self.commit(record_at(settled)).await?;
                info!(%key, previous = usage_count, settled, "usage counter settled at current limit");
            }

            info!(%key, usage_count = settled, limit, rejected, "upload quota exhausted");
            return Ok(Decision::reject(
                rejected,
                DecisionReason::QuotaExhausted,
                Some(UsageSnapshot {
                    used: settled,
                    limit,
                    reset_frequency,
                }),
            ));
        }

        self.commit(record_at(admission.new_usage)).await?;

        let usage = Some(UsageSnapshot {
            used: admission.new_usage,
            limit,
            reset_frequency,
        });

        if rejected == 0 {
            debug!(%key, used = admission.new_usage, limit, "uploads admitted");
            return Ok(Decision::allow(
                admission.admitted,
                DecisionReason::WithinQuota,
                usage,
            ));
        }

        info!(
            %key,
            admitted = admission.admitted,
            rejected,
            limit,
            "uploads partially admitted"
        );
        Ok(Decision {
            admitted_count: admission.admitted,
            rejected_count: rejected,
            action: AdmissionAction::ReplaceWithPartial {
                attachments: kept_attachments(&event.attachments, tracked, admission.admitted),
                text: event.text.clone(),
            },
            reason: DecisionReason::PartiallyOverQuota,
            usage,
            required_roles: Vec::new(),
        })
    }

    /// Must be called with the record's key lock held; the write settles
    /// before the lock is released.
    async fn commit(&self, record: UsageRecord) -> Result<(), QuotaError> {
        let store = Arc::clone(&self.store);
        run_write(self.store_timeout, "commit_usage", move || store.commit_usage(&record)).await
    }
}

/// Keeps every untracked attachment plus the first `admitted` tracked ones.
fn kept_attachments(attachments: &[Attachment], tracked: &[usize], admitted: usize) -> Vec<Attachment> {
    let dropped = &tracked[admitted..];
    attachments
        .iter()
        .enumerate()
        .filter(|(idx, _)| !dropped.contains(idx))
        .map(|(_, attachment)| attachment.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quota::{PolicySource, ResetFrequency, RuleSpec};
    use crate::storage::{StorageError, WardenDatabase};
    use chrono::TimeZone;
    use std::collections::BTreeSet;

    const CHANNEL: u64 = 900;
    const USER: u64 = 42;

    fn attachment(name: &str) -> Attachment {
        Attachment {
            filename: name.to_string(),
            content: format!("https://cdn.example/{name}"),
        }
    }

    fn event(message_id: u64, files: &[&str]) -> MessageEvent {
        MessageEvent {
            message_id,
            channel_id: CHANNEL,
            author_id: USER,
            author_name: "ada".into(),
            author_roles: ["member".to_string()].into_iter().collect::<BTreeSet<_>>(),
            attachments: files.iter().map(|name| attachment(name)).collect(),
            text: "fresh tracks".into(),
        }
    }

    fn engine(db: Arc<WardenDatabase>) -> AdmissionEngine {
        AdmissionEngine::new(
            db.clone(),
            PolicyResolver::new(db, false),
            AttachmentClassifier::default(),
            KeyLocks::new(),
            ResetSchedule::default(),
            Duration::from_secs(2),
        )
    }

    fn with_limit(limit: u32) -> Arc<WardenDatabase> {
        with_rule(limit, ResetFrequency::Daily)
    }

    fn with_rule(limit: u32, reset_frequency: ResetFrequency) -> Arc<WardenDatabase> {
        let db = Arc::new(WardenDatabase::in_memory().unwrap());
        db.create_rule(&RuleSpec {
            channel_id: CHANNEL,
            role_name: "member".into(),
            max_uploads: limit,
            order_index: 0,
            reset_frequency,
        })
        .unwrap();
        db
    }

    fn stored_usage(db: &WardenDatabase) -> Option<u32> {
        db.get_usage(USER, CHANNEL)
            .unwrap()
            .map(|record| record.usage_count)
    }

    #[test]
    fn admission_arithmetic_clamps() {
        assert_eq!(compute_admission(0, 3, 2), Admission { admitted: 2, new_usage: 2 });
        assert_eq!(compute_admission(2, 3, 3), Admission { admitted: 1, new_usage: 3 });
        assert_eq!(compute_admission(3, 3, 1), Admission { admitted: 0, new_usage: 3 });
        assert_eq!(compute_admission(5, 3, 1), Admission { admitted: 0, new_usage: 5 });
        assert_eq!(compute_admission(0, 0, 4), Admission { admitted: 0, new_usage: 0 });
    }

    #[tokio::test]
    async fn quota_scenario_allow_partial_reject() {
        let db = with_limit(3);
        let engine = engine(Arc::clone(&db));

        let first = engine.admit(&event(1, &["a.mp3", "b.mp3"])).await;
        assert_eq!(first.action, AdmissionAction::AllowUnchanged);
        assert_eq!(first.admitted_count, 2);
        assert_eq!(db.get_usage(USER, CHANNEL).unwrap().unwrap().usage_count, 2);

        let second = engine
            .admit(&event(2, &["c.mp3", "cover.png", "d.mp3", "e.mp3"]))
            .await;
        assert_eq!(second.reason, DecisionReason::PartiallyOverQuota);
        assert_eq!((second.admitted_count, second.rejected_count), (1, 2));
        match &second.action {
            AdmissionAction::ReplaceWithPartial { attachments, text } => {
                let names: Vec<_> = attachments.iter().map(|a| a.filename.as_str()).collect();
                assert_eq!(names, vec!["c.mp3", "cover.png"]);
                assert_eq!(text, "fresh tracks");
            }
            other => panic!("expected partial replacement, got {other:?}"),
        }
        assert_eq!(db.get_usage(USER, CHANNEL).unwrap().unwrap().usage_count, 3);

        let third = engine.admit(&event(3, &["f.mp3"])).await;
        assert_eq!(third.action, AdmissionAction::RejectAll);
        assert_eq!(third.reason, DecisionReason::QuotaExhausted);
        assert_eq!(db.get_usage(USER, CHANNEL).unwrap().unwrap().usage_count, 3);
    }

    #[tokio::test]
    async fn untracked_attachments_never_count() {
        let db = with_limit(1);
        let engine = engine(Arc::clone(&db));

        let decision = engine.admit(&event(1, &["photo.jpg", "readme.txt"])).await;
        assert_eq!(decision.reason, DecisionReason::NoTrackedAttachments);
        assert!(db.get_usage(USER, CHANNEL).unwrap().is_none());
        assert!(decision.notice().is_none());
    }

    #[tokio::test]
    async fn blocked_channel_wins_over_remaining_quota() {
        let db = with_limit(10);
        db.block_channel(CHANNEL).unwrap();
        let engine = engine(Arc::clone(&db));

        let decision = engine.admit(&event(1, &["a.mp3"])).await;
        assert_eq!(decision.action, AdmissionAction::RejectAll);
        assert_eq!(decision.reason, DecisionReason::ChannelBlocked);
        assert!(db.get_usage(USER, CHANNEL).unwrap().is_none());
    }

    #[tokio::test]
    async fn unconfigured_channel_is_untracked() {
        let db = Arc::new(WardenDatabase::in_memory().unwrap());
        let engine = engine(Arc::clone(&db));

        for id in 0..3 {
            let decision = engine
                .admit(&event(id, &["a.mp3", "b.mp3", "c.mp3", "d.mp3"]))
                .await;
            assert_eq!(decision.action, AdmissionAction::AllowUnchanged);
            assert_eq!(decision.reason, DecisionReason::Unlimited);
        }
        assert!(db.list_usage().unwrap().is_empty());
    }

    #[tokio::test]
    async fn restricted_channel_rejects_missing_role() {
        let db = with_limit(5);
        let engine = AdmissionEngine::new(
            db.clone(),
            PolicyResolver::new(db.clone(), true),
            AttachmentClassifier::default(),
            KeyLocks::new(),
            ResetSchedule::default(),
            Duration::from_secs(2),
        );
        let mut outsider = event(1, &["a.mp3"]);
        outsider.author_roles.clear();

        let decision = engine.admit(&outsider).await;
        assert_eq!(decision.reason, DecisionReason::RoleRequired);
        assert_eq!(decision.required_roles, vec!["member".to_string()]);
        assert_eq!(
            decision.notice().as_deref(),
            Some("You don't have the required role (member) to upload files in that channel.")
        );
    }

    #[tokio::test]
    async fn stale_counter_is_reset_on_read() {
        let db = with_limit(2);
        db.commit_usage(&UsageRecord {
            user_id: USER,
            channel_id: CHANNEL,
            username: "ada".into(),
            usage_count: 2,
            reset_frequency: ResetFrequency::Daily,
            last_reset: Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap(),
            rule_id: None,
        })
        .unwrap();
        let engine = engine(Arc::clone(&db));
        let now = Utc.with_ymd_and_hms(2024, 6, 3, 0, 0, 0).unwrap();

        let decision = engine.admit_at(&event(1, &["a.mp3"]), now).await;
        assert_eq!(decision.reason, DecisionReason::WithinQuota);
        let stored = db.get_usage(USER, CHANNEL).unwrap().unwrap();
        assert_eq!(stored.usage_count, 1);
        assert_eq!(stored.last_reset, now);
    }

    #[tokio::test]
    async fn weekly_counter_is_reset_on_read_only_after_anchor() {
        let db = with_rule(2, ResetFrequency::Weekly);
        // Monday 2024-06-10; the default anchor is Sunday 00:00 UTC.
        db.commit_usage(&UsageRecord {
            user_id: USER,
            channel_id: CHANNEL,
            username: "ada".into(),
            usage_count: 2,
            reset_frequency: ResetFrequency::Weekly,
            last_reset: Utc.with_ymd_and_hms(2024, 6, 10, 10, 0, 0).unwrap(),
            rule_id: None,
        })
        .unwrap();
        let engine = engine(Arc::clone(&db));

        let tuesday = Utc.with_ymd_and_hms(2024, 6, 11, 11, 0, 0).unwrap();
        let decision = engine.admit_at(&event(1, &["a.mp3"]), tuesday).await;
        assert_eq!(decision.reason, DecisionReason::QuotaExhausted);
        assert_eq!(stored_usage(&db), Some(2));

        let sunday = Utc.with_ymd_and_hms(2024, 6, 16, 0, 5, 0).unwrap();
        let decision = engine.admit_at(&event(2, &["b.mp3"]), sunday).await;
        assert_eq!(decision.reason, DecisionReason::WithinQuota);
        let stored = db.get_usage(USER, CHANNEL).unwrap().unwrap();
        assert_eq!(stored.usage_count, 1);
        assert_eq!(stored.last_reset, sunday);
    }

    #[tokio::test]
    async fn losing_a_tier_settles_usage_at_the_new_limit() {
        let db = Arc::new(WardenDatabase::in_memory().unwrap());
        let vip = db
            .create_rule(&RuleSpec {
                channel_id: CHANNEL,
                role_name: "vip".into(),
                max_uploads: 5,
                order_index: 0,
                reset_frequency: ResetFrequency::Daily,
            })
            .unwrap();
        db.set_global_default(2).unwrap();
        let engine = engine(Arc::clone(&db));

        let mut as_vip = event(1, &["a.mp3", "b.mp3", "c.mp3", "d.mp3", "e.mp3"]);
        as_vip.author_roles = ["vip".to_string()].into_iter().collect();
        let decision = engine.admit(&as_vip).await;
        assert_eq!(decision.reason, DecisionReason::WithinQuota);
        assert_eq!(db.get_usage(USER, CHANNEL).unwrap().unwrap().rule_id, Some(vip.id));

        let mut demoted = event(2, &["f.mp3"]);
        demoted.author_roles.clear();
        let decision = engine.admit(&demoted).await;
        assert_eq!(decision.reason, DecisionReason::QuotaExhausted);
        let usage = decision.usage.unwrap();
        assert_eq!((usage.used, usage.limit), (2, 2));

        let stored = db.get_usage(USER, CHANNEL).unwrap().unwrap();
        assert_eq!(stored.usage_count, 2);
        assert_eq!(stored.rule_id, None);
    }

    #[tokio::test]
    async fn lowered_rule_limit_settles_usage() {
        let db = with_limit(4);
        let engine = engine(Arc::clone(&db));
        engine
            .admit(&event(1, &["a.mp3", "b.mp3", "c.mp3", "d.mp3"]))
            .await;
        assert_eq!(stored_usage(&db), Some(4));

        let rule = db.list_rules(Some(CHANNEL)).unwrap().remove(0);
        db.update_rule(
            rule.id,
            &RuleSpec {
                channel_id: CHANNEL,
                role_name: "member".into(),
                max_uploads: 1,
                order_index: 0,
                reset_frequency: ResetFrequency::Daily,
            },
        )
        .unwrap();

        let decision = engine.admit(&event(2, &["e.mp3"])).await;
        assert_eq!(decision.reason, DecisionReason::QuotaExhausted);
        assert_eq!(stored_usage(&db), Some(1));
    }

    /// Delegates to the database after stalling every write.
    struct SlowCommitStore {
        inner: Arc<WardenDatabase>,
        delay: Duration,
    }

    impl UsageStore for SlowCommitStore {
        fn get_usage(&self, user_id: u64, channel_id: u64) -> Result<Option<UsageRecord>, StorageError> {
            self.inner.get_usage(user_id, channel_id)
        }

        fn commit_usage(&self, record: &UsageRecord) -> Result<(), StorageError> {
            std::thread::sleep(self.delay);
            self.inner.commit_usage(record)
        }

        fn list_usage(&self) -> Result<Vec<UsageRecord>, StorageError> {
            self.inner.list_usage()
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn slow_commit_reports_what_was_persisted() {
        let db = with_limit(5);
        let engine = AdmissionEngine::new(
            Arc::new(SlowCommitStore {
                inner: Arc::clone(&db),
                delay: Duration::from_millis(300),
            }),
            PolicyResolver::new(db.clone(), false),
            AttachmentClassifier::default(),
            KeyLocks::new(),
            ResetSchedule::default(),
            Duration::from_millis(100),
        );

        let first_event = event(1, &["a.mp3", "b.mp3", "c.mp3"]);
        let second_event = event(2, &["d.mp3", "e.mp3", "f.mp3"]);
        let first = engine.admit(&first_event);
        let second = engine.admit(&second_event);
        let (first, second) = tokio::join!(first, second);

        // The overrunning write landed, so the first upload stands and the
        // second one is charged on top of it rather than overwriting it.
        let decisions = [&first, &second];
        assert!(decisions
            .iter()
            .all(|d| d.reason != DecisionReason::StoreUnavailable));
        assert_eq!(first.admitted_count + second.admitted_count, 5);
        assert_eq!(stored_usage(&db), Some(5));
    }

    struct BrokenStore;

    impl UsageStore for BrokenStore {
        fn get_usage(&self, _: u64, _: u64) -> Result<Option<UsageRecord>, StorageError> {
            Err(StorageError::Poisoned)
        }

        fn commit_usage(&self, _: &UsageRecord) -> Result<(), StorageError> {
            Err(StorageError::Poisoned)
        }

        fn list_usage(&self) -> Result<Vec<UsageRecord>, StorageError> {
            Err(StorageError::Poisoned)
        }
    }

    #[tokio::test]
    async fn store_failure_fails_closed() {
        let db = with_limit(3);
        let engine = AdmissionEngine::new(
            Arc::new(BrokenStore),
            PolicyResolver::new(db.clone() as Arc<dyn PolicySource>, false),
            AttachmentClassifier::default(),
            KeyLocks::new(),
            ResetSchedule::default(),
            Duration::from_secs(2),
        );

        let decision = engine.admit(&event(1, &["a.mp3", "b.mp3"])).await;
        assert_eq!(decision.action, AdmissionAction::RejectAll);
        assert_eq!(decision.reason, DecisionReason::StoreUnavailable);
        assert_eq!(decision.rejected_count, 2);
        assert!(decision.notice().is_some());
    }
}
