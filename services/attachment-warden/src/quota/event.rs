use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::model::{ChannelId, UserId};

/// One attachment as handed over by the chat platform. `content` is opaque to
/// the warden (a CDN URL or an encoded payload) and is only echoed back in
/// replacement posts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub filename: String,
    #[serde(default)]
    pub content: String,
}

/// An inbound chat message carrying zero or more attachments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageEvent {
    pub message_id: u64,
    pub channel_id: ChannelId,
    pub author_id: UserId,
    #[serde(default)]
    pub author_name: String,
    #[serde(default)]
    pub author_roles: BTreeSet<String>,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    #[serde(default)]
    pub text: String,
}
