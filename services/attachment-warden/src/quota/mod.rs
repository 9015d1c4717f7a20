pub mod admission;
pub mod classify;
pub mod error;
pub mod event;
pub mod locks;
pub mod model;
pub mod policy;
pub mod reset;
pub mod store;

pub use admission::{
    compute_admission, Admission, AdmissionAction, AdmissionEngine, Decision, DecisionReason,
    UsageSnapshot,
};
pub use classify::{AttachmentClassifier, DEFAULT_TRACKED_EXTENSIONS};
pub use error::QuotaError;
pub use event::{Attachment, MessageEvent};
pub use locks::KeyLocks;
pub use model::{
    ChannelId, ChannelRule, GlobalDefault, ResetFrequency, RuleSpec, UsageKey, UsageRecord, UserId,
};
pub use policy::{resolve_policy, LimitSource, Policy, PolicyResolver};
pub use reset::{ResetPolicy, ResetSchedule, ResetScheduler, SweepReport, WeeklyAnchor};
pub use store::{PolicySource, UsageStore};
