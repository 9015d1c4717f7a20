use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{error, info};

use crate::platform::{ChatPlatform, Directive, Notifier, NotifyOutcome, PlatformError};
use crate::quota::{AdmissionAction, AdmissionEngine, Decision, MessageEvent};

#[derive(Debug, Clone, Serialize)]
pub struct ModerationOutcome {
    pub decision: Decision,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notice: Option<String>,
    pub directives: Vec<Directive>,
    /// Whether the directives were sent through the platform gateway.
    pub applied: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notification: Option<NotifyOutcome>,
}

/// The message-altering side effects of a decision, in execution order.
pub fn plan_directives(event: &MessageEvent, decision: &Decision) -> Vec<Directive> {
    match &decision.action {
        AdmissionAction::AllowUnchanged => Vec::new(),
        AdmissionAction::ReplaceWithPartial { attachments, text } => vec![
            Directive::Delete {
                channel_id: event.channel_id,
                message_id: event.message_id,
            },
            Directive::Post {
                channel_id: event.channel_id,
                text: text.clone(),
                attachments: attachments.clone(),
            },
        ],
        AdmissionAction::RejectAll => vec![Directive::Delete {
            channel_id: event.channel_id,
            message_id: event.message_id,
        }],
    }
}

/// Runs one event end to end: decide and commit, then alter the message, then
/// notify. Side-effect failures are logged and never undo the commit.
#[derive(Clone)]
pub struct Moderator {
    engine: AdmissionEngine,
    platform: Option<Arc<dyn ChatPlatform>>,
    notifier: Option<Notifier>,
    call_timeout: Duration,
}

impl Moderator {
    pub fn new(
        engine: AdmissionEngine,
        platform: Option<Arc<dyn ChatPlatform>>,
        notice_ttl: Duration,
        call_timeout: Duration,
    ) -> Self {
        let notifier = platform
            .as_ref()
            .map(|platform| Notifier::new(Arc::clone(platform), notice_ttl, call_timeout));
        Self {
            engine,
            platform,
            notifier,
            call_timeout,
        }
    }

    pub fn engine(&self) -> &AdmissionEngine {
        &self.engine
    }

    pub async fn handle(&self, event: &MessageEvent) -> ModerationOutcome {
        let decision = self.engine.admit(event).await;
        let notice = decision.notice();
        let directives = plan_directives(event, &decision);

        let Some(platform) = &self.platform else {
            return ModerationOutcome {
                decision,
                notice,
                directives,
                applied: false,
                notification: None,
            };
        };

        for directive in &directives {
            if let Err(err) = self.dispatch(platform.as_ref(), directive).await {
                error!(
                    message_id = event.message_id,
                    channel_id = event.channel_id,
                    kind = directive.kind(),
                    error = %err,
                    "failed to apply moderation directive; not retrying"
                );
                break;
            }
        }

        let notification = match (&self.notifier, &notice) {
            (Some(notifier), Some(text)) => {
                let outcome = notifier.notify(event.author_id, event.channel_id, text).await;
                info!(
                    user_id = event.author_id,
                    channel_id = event.channel_id,
                    outcome = ?outcome,
                    "decision notice sent"
                );
                Some(outcome)
            }
            _ => None,
        };

        ModerationOutcome {
            decision,
            notice,
            directives,
            applied: true,
            notification,
        }
    }

    async fn dispatch(&self, platform: &dyn ChatPlatform, directive: &Directive) -> Result<(), PlatformError> {
        match tokio::time::timeout(self.call_timeout, platform.dispatch(directive)).await {
            Ok(result) => result,
            Err(_) => Err(PlatformError::Timeout(self.call_timeout)),
        }
    }
}
