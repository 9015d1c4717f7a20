use std::collections::BTreeSet;
use std::sync::Arc;

use serde::Serialize;
use tracing::warn;

use crate::storage::StorageError;

use super::model::{ChannelId, ChannelRule, GlobalDefault, ResetFrequency};
use super::store::PolicySource;

/// Where a resolved limit came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LimitSource {
    Rule { rule_id: i64, role_name: String },
    GlobalDefault,
}

impl LimitSource {
    pub fn rule_id(&self) -> Option<i64> {
        match self {
            LimitSource::Rule { rule_id, .. } => Some(*rule_id),
            LimitSource::GlobalDefault => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Policy {
    /// No configuration applies; uploads are not counted.
    Unlimited,
    Limited {
        limit: u32,
        reset_frequency: ResetFrequency,
        source: LimitSource,
    },
    /// The channel is restricted to the listed roles and the sender holds none.
    RoleRequired { roles: Vec<String> },
}

/// Picks the applicable tier for a sender.
///
/// Rules are ranked by `order_index`, then by row id, and the first rule whose
/// role the sender holds wins. Without a match the global default applies, and
/// without a global default the sender is unlimited. With
/// `restrict_unmatched_roles` set, a channel that has rules but none matching
/// the sender resolves to [`Policy::RoleRequired`] instead of falling back.
pub fn resolve_policy(
    rules: &[ChannelRule],
    global: Option<GlobalDefault>,
    roles: &BTreeSet<String>,
    restrict_unmatched_roles: bool,
) -> Policy {
    let mut ranked: Vec<&ChannelRule> = rules.iter().collect();
    ranked.sort_by_key(|rule| (rule.order_index, rule.id));

    if let Some(rule) = ranked
        .iter()
        .copied()
        .find(|rule| roles.contains(&rule.role_name))
    {
        let tied = ranked
            .iter()
            .filter(|other| other.order_index == rule.order_index && other.id != rule.id)
            .count();
        if tied > 0 {
            warn!(
                channel_id = rule.channel_id,
                order_index = rule.order_index,
                chosen_rule = rule.id,
                tied,
                "duplicate rule priority; lowest rule id wins"
            );
        }

        return Policy::Limited {
            limit: rule.max_uploads,
            reset_frequency: rule.reset_frequency,
            source: LimitSource::Rule {
                rule_id: rule.id,
                role_name: rule.role_name.clone(),
            },
        };
    }

    if restrict_unmatched_roles && !ranked.is_empty() {
        let mut required: Vec<String> = Vec::new();
        for rule in &ranked {
            if !required.contains(&rule.role_name) {
                required.push(rule.role_name.clone());
            }
        }
        return Policy::RoleRequired { roles: required };
    }

    match global {
        Some(default) => Policy::Limited {
            limit: default.max_uploads,
            reset_frequency: ResetFrequency::Daily,
            source: LimitSource::GlobalDefault,
        },
        None => Policy::Unlimited,
    }
}

#[derive(Clone)]
pub struct PolicyResolver {
    source: Arc<dyn PolicySource>,
    restrict_unmatched_roles: bool,
}

impl PolicyResolver {
    pub fn new(source: Arc<dyn PolicySource>, restrict_unmatched_roles: bool) -> Self {
        Self {
            source,
            restrict_unmatched_roles,
        }
    }

    pub fn resolve(
        &self,
        channel_id: ChannelId,
        roles: &BTreeSet<String>,
    ) -> Result<Policy, StorageError> {
        let rules = self.source.channel_rules(channel_id)?;
        let global = if rules.is_empty() || !self.restrict_unmatched_roles {
            self.source.global_default()?
        } else {
            None
        };
        Ok(resolve_policy(
            &rules,
            global,
            roles,
            self.restrict_unmatched_roles,
        ))
    }

    pub fn is_blocked(&self, channel_id: ChannelId) -> Result<bool, StorageError> {
        self.source.is_channel_blocked(channel_id)
    }
}
