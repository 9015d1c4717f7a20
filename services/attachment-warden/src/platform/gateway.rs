use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use tracing::debug;

use super::{ChatPlatform, Directive, PlatformError};

/// Delivers directives to the chat-platform collaborator over HTTP.
pub struct GatewayClient {
    http_client: Client,
    base_url: String,
    token: Option<String>,
    timeout: Duration,
}

impl GatewayClient {
    pub fn new(base_url: String, token: Option<String>, timeout: Duration) -> Result<Self, PlatformError> {
        let http_client = Client::builder()
            .user_agent("attachment-warden/0.1.0")
            .timeout(timeout)
            .build()?;

        Ok(Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
            timeout,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl ChatPlatform for GatewayClient {
    async fn dispatch(&self, directive: &Directive) -> Result<(), PlatformError> {
        let url = format!("{}/directives", self.base_url);
        let mut request = self.http_client.post(&url).json(directive);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|err| {
            if err.is_timeout() {
                PlatformError::Timeout(self.timeout)
            } else {
                PlatformError::Request(err)
            }
        })?;

        let status = response.status();
        if status.is_success() {
            debug!(kind = directive.kind(), %status, "directive delivered");
            return Ok(());
        }

        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "unable to read error body".to_string());

        if status == StatusCode::FORBIDDEN {
            return Err(PlatformError::PermissionDenied(body));
        }

        Err(PlatformError::Rejected {
            status: status.as_u16(),
            body,
        })
    }
}
