use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::quota::{Attachment, ChannelId, UserId};

/// An instruction for the chat platform. Serialized as
/// `{"type": "delete", ...}` on the gateway wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Directive {
    Delete {
        channel_id: ChannelId,
        message_id: u64,
    },
    Post {
        channel_id: ChannelId,
        text: String,
        attachments: Vec<Attachment>,
    },
    SendDirect {
        user_id: UserId,
        text: String,
    },
    SendChannelEphemeral {
        channel_id: ChannelId,
        text: String,
        user_mention: String,
        ttl_secs: u64,
    },
}

impl Directive {
    pub fn kind(&self) -> &'static str {
        match self {
            Directive::Delete { .. } => "delete",
            Directive::Post { .. } => "post",
            Directive::SendDirect { .. } => "send_direct",
            Directive::SendChannelEphemeral { .. } => "send_channel_ephemeral",
        }
    }

    pub fn ephemeral(channel_id: ChannelId, user_id: UserId, text: String, ttl: Duration) -> Self {
        Directive::SendChannelEphemeral {
            channel_id,
            text,
            user_mention: mention(user_id),
            ttl_secs: ttl.as_secs(),
        }
    }
}

pub fn mention(user_id: UserId) -> String {
    format!("<@{user_id}>")
}
