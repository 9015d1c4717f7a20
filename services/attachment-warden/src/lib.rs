pub mod api;
pub mod config;
pub mod moderator;
pub mod platform;
pub mod quota;
pub mod storage;

pub use api::{create_router, ApiState};
pub use config::WardenConfig;
pub use moderator::{plan_directives, ModerationOutcome, Moderator};
pub use platform::{ChatPlatform, Directive, GatewayClient, Notifier, NotifyOutcome, PlatformError};
pub use quota::{
    AdmissionAction, AdmissionEngine, Decision, DecisionReason, MessageEvent, PolicyResolver,
    ResetScheduler,
};
pub use storage::{StorageError, WardenDatabase};
