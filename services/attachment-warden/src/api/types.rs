use serde::{Deserialize, Serialize};

use crate::quota::{ChannelId, GlobalDefault};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChannelQuery {
    pub channel_id: Option<ChannelId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalDefaultResponse {
    pub global_default: Option<GlobalDefault>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockedChannelsResponse {
    pub channel_ids: Vec<ChannelId>,
}

/// `changed` is false when the request matched the stored state already.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToggleResponse {
    pub channel_id: ChannelId,
    pub blocked: bool,
    pub changed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuccessResponse {
    pub success: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
    pub details: Option<serde_json::Value>,
}
