pub mod directive;
pub mod error;
pub mod gateway;
pub mod notifier;

use async_trait::async_trait;

pub use directive::{mention, Directive};
pub use error::PlatformError;
pub use gateway::GatewayClient;
pub use notifier::{Notifier, NotifyOutcome};

/// Outbound side of the chat platform.
#[async_trait]
pub trait ChatPlatform: Send + Sync + 'static {
    async fn dispatch(&self, directive: &Directive) -> Result<(), PlatformError>;
}
