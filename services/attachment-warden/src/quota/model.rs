use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type UserId = u64;
pub type ChannelId = u64;

/// How often a channel's usage counters are zeroed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResetFrequency {
    #[default]
    Daily,
    Weekly,
}

impl ResetFrequency {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResetFrequency::Daily => "daily",
            ResetFrequency::Weekly => "weekly",
        }
    }
}

impl fmt::Display for ResetFrequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResetFrequency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "daily" => Ok(ResetFrequency::Daily),
            "weekly" => Ok(ResetFrequency::Weekly),
            other => Err(format!("unknown reset frequency '{other}'")),
        }
    }
}

/// A per-role upload tier on one channel. Lower `order_index` wins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelRule {
    pub id: i64,
    pub channel_id: ChannelId,
    pub role_name: String,
    pub max_uploads: u32,
    pub order_index: i64,
    pub reset_frequency: ResetFrequency,
}

/// Administrator input for creating or replacing a [`ChannelRule`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleSpec {
    pub channel_id: ChannelId,
    pub role_name: String,
    pub max_uploads: u32,
    pub order_index: i64,
    #[serde(default)]
    pub reset_frequency: ResetFrequency,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalDefault {
    pub max_uploads: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageRecord {
    pub user_id: UserId,
    pub channel_id: ChannelId,
    pub username: String,
    pub usage_count: u32,
    pub reset_frequency: ResetFrequency,
    pub last_reset: DateTime<Utc>,
    /// Rule that last charged this counter; `None` under the global default.
    #[serde(default)]
    pub rule_id: Option<i64>,
}

impl UsageRecord {
    pub fn key(&self) -> UsageKey {
        UsageKey::new(self.user_id, self.channel_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UsageKey {
    pub user_id: UserId,
    pub channel_id: ChannelId,
}

impl UsageKey {
    pub fn new(user_id: UserId, channel_id: ChannelId) -> Self {
        Self {
            user_id,
            channel_id,
        }
    }
}

impl fmt::Display for UsageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.user_id, self.channel_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reset_frequency_parses_case_insensitively() {
        assert_eq!("Daily".parse::<ResetFrequency>(), Ok(ResetFrequency::Daily));
        assert_eq!(" WEEKLY ".parse::<ResetFrequency>(), Ok(ResetFrequency::Weekly));
        assert!("monthly".parse::<ResetFrequency>().is_err());
    }

    #[test]
    fn rule_spec_defaults_to_daily() {
        let spec: RuleSpec = serde_json::from_str(
            r#"{"channel_id": 7, "role_name": "member", "max_uploads": 3, "order_index": 0}"#,
        )
        .unwrap();
        assert_eq!(spec.reset_frequency, ResetFrequency::Daily);
    }
}
