use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, warn};

use crate::quota::{ChannelId, UserId};

use super::{ChatPlatform, Directive, PlatformError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "delivery", rename_all = "snake_case")]
pub enum NotifyOutcome {
    Direct,
    Fallback,
    Failed { reason: String },
}

/// Best-effort delivery of decision notices.
///
/// Direct messages come first. A permission denial (closed DMs) falls back to
/// a short-lived channel message mentioning the user. Nothing is retried.
#[derive(Clone)]
pub struct Notifier {
    platform: Arc<dyn ChatPlatform>,
    fallback_ttl: Duration,
    call_timeout: Duration,
}

impl Notifier {
    pub fn new(platform: Arc<dyn ChatPlatform>, fallback_ttl: Duration, call_timeout: Duration) -> Self {
        Self {
            platform,
            fallback_ttl,
            call_timeout,
        }
    }

    pub async fn notify(&self, user_id: UserId, channel_id: ChannelId, message: &str) -> NotifyOutcome {
        let direct = Directive::SendDirect {
            user_id,
            text: message.to_string(),
        };

        match self.send(&direct).await {
            Ok(()) => {
                debug!(user_id, "notice delivered by direct message");
                return NotifyOutcome::Direct;
            }
            Err(PlatformError::PermissionDenied(detail)) => {
                debug!(user_id, %detail, "direct message refused; falling back to channel");
            }
            Err(err) => {
                warn!(user_id, channel_id, error = %err, "failed to deliver notice");
                return NotifyOutcome::Failed {
                    reason: err.to_string(),
                };
            }
        }

        let fallback = Directive::ephemeral(
            channel_id,
            user_id,
            message.to_string(),
            self.fallback_ttl,
        );
        match self.send(&fallback).await {
            Ok(()) => NotifyOutcome::Fallback,
            Err(err) => {
                warn!(user_id, channel_id, error = %err, "failed to deliver fallback notice");
                NotifyOutcome::Failed {
                    reason: err.to_string(),
                }
            }
        }
    }

    async fn send(&self, directive: &Directive) -> Result<(), PlatformError> {
        match tokio::time::timeout(self.call_timeout, self.platform.dispatch(directive)).await {
            Ok(result) => result,
            Err(_) => Err(PlatformError::Timeout(self.call_timeout)),
        }
    }
}
