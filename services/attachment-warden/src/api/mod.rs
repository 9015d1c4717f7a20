use std::sync::Arc;
use std::time::Duration;

pub mod handlers;
pub mod router;
pub mod types;

pub use router::create_router;
pub use types::*;

use anyhow::Result;

use crate::config::WardenConfig;
use crate::moderator::Moderator;
use crate::platform::ChatPlatform;
use crate::quota::{AdmissionEngine, KeyLocks, PolicyResolver, ResetScheduler};
use crate::storage::WardenDatabase;

pub struct ApiState {
    pub moderator: Moderator,
    pub database: Arc<WardenDatabase>,
    pub scheduler: ResetScheduler,
    pub locks: KeyLocks,
    pub store_timeout: Duration,
}

impl ApiState {
    pub fn new(
        moderator: Moderator,
        database: Arc<WardenDatabase>,
        scheduler: ResetScheduler,
        locks: KeyLocks,
        store_timeout: Duration,
    ) -> Self {
        Self {
            moderator,
            database,
            scheduler,
            locks,
            store_timeout,
        }
    }
}

impl ApiState {
    /// Wires the engine, scheduler and moderator around one database. The
    /// engine and scheduler share a single key lock registry.
    pub fn from_config(
        config: &WardenConfig,
        database: Arc<WardenDatabase>,
        platform: Option<Arc<dyn ChatPlatform>>,
    ) -> Result<Self> {
        let locks = KeyLocks::new();
        let schedule = config.reset_schedule()?;

        let engine = AdmissionEngine::new(
            database.clone(),
            PolicyResolver::new(database.clone(), config.restrict_unmatched_roles),
            config.classifier(),
            locks.clone(),
            schedule,
            config.store_timeout(),
        );
        let scheduler = ResetScheduler::new(
            database.clone(),
            database.clone(),
            locks.clone(),
            schedule,
            config.reset_interval(),
            config.store_timeout(),
        );
        let moderator = Moderator::new(
            engine,
            platform,
            config.notice_ttl(),
            config.platform_timeout(),
        );

        Ok(Self::new(
            moderator,
            database,
            scheduler,
            locks,
            config.store_timeout(),
        ))
    }
}
