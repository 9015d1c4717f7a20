use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::quota::{
    ChannelId, ChannelRule, GlobalDefault, PolicySource, ResetFrequency, RuleSpec, UsageRecord,
    UsageStore, UserId,
};

use super::error::StorageError;
use super::schema::init_database;
use super::WARDEN_DB_FILENAME;

const USAGE_COLUMNS: &str =
    "user_id, channel_id, username, usage_count, reset_frequency, last_reset, rule_id";
const RULE_COLUMNS: &str = "id, channel_id, role_name, max_uploads, order_index, reset_frequency";

pub struct WardenDatabase {
    data_dir: Option<PathBuf>,
    conn: Mutex<Connection>,
}

impl WardenDatabase {
    pub fn new(data_dir: PathBuf) -> Result<Self, StorageError> {
        std::fs::create_dir_all(&data_dir)?;
        let db_path = data_dir.join(WARDEN_DB_FILENAME);
        let conn = Connection::open(&db_path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        init_database(&conn)?;

        Ok(Self {
            data_dir: Some(data_dir),
            conn: Mutex::new(conn),
        })
    }

    /// Volatile database, used by tests and dry runs.
    pub fn in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        init_database(&conn)?;
        Ok(Self {
            data_dir: None,
            conn: Mutex::new(conn),
        })
    }

    pub fn data_dir(&self) -> Option<&Path> {
        self.data_dir.as_deref()
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StorageError> {
        self.conn.lock().map_err(|_| StorageError::Poisoned)
    }

    pub fn list_channel_usage(
        &self,
        channel_id: ChannelId,
    ) -> Result<Vec<UsageRecord>, StorageError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {USAGE_COLUMNS} FROM usage_records WHERE channel_id = ?1 ORDER BY user_id"
        ))?;
        let rows = stmt.query_map(params![channel_id as i64], usage_from_row)?;

        let mut usage = Vec::new();
        for row in rows {
            usage.push(row?);
        }
        Ok(usage)
    }

    pub fn delete_usage(&self, user_id: UserId, channel_id: ChannelId) -> Result<bool, StorageError> {
        let conn = self.conn()?;
        let removed = conn.execute(
            "DELETE FROM usage_records WHERE user_id = ?1 AND channel_id = ?2",
            params![user_id as i64, channel_id as i64],
        )?;
        Ok(removed > 0)
    }

    pub fn list_rules(&self, channel_id: Option<ChannelId>) -> Result<Vec<ChannelRule>, StorageError> {
        let conn = self.conn()?;
        let mut rules = Vec::new();

        match channel_id {
            Some(channel_id) => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {RULE_COLUMNS} FROM channel_rules WHERE channel_id = ?1 ORDER BY order_index, id"
                ))?;
                for row in stmt.query_map(params![channel_id as i64], rule_from_row)? {
                    rules.push(row?);
                }
            }
            None => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {RULE_COLUMNS} FROM channel_rules ORDER BY channel_id, order_index, id"
                ))?;
                for row in stmt.query_map([], rule_from_row)? {
                    rules.push(row?);
                }
            }
        }

        Ok(rules)
    }

    pub fn get_rule(&self, rule_id: i64) -> Result<Option<ChannelRule>, StorageError> {
        let conn = self.conn()?;
        let rule = conn
            .query_row(
                &format!("SELECT {RULE_COLUMNS} FROM channel_rules WHERE id = ?1"),
                params![rule_id],
                rule_from_row,
            )
            .optional()?;
        Ok(rule)
    }

    pub fn create_rule(&self, spec: &RuleSpec) -> Result<ChannelRule, StorageError> {
        let conn = self.conn()?;
        let now = Utc::now().to_rfc3339();

        conn.execute(
            r#"
            INSERT INTO channel_rules
                (channel_id, role_name, max_uploads, order_index, reset_frequency, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
            "#,
            params![
                spec.channel_id as i64,
                spec.role_name,
                spec.max_uploads,
                spec.order_index,
                spec.reset_frequency.as_str(),
                now
            ],
        )
        .map_err(|err| StorageError::from_write(err, duplicate_rule_message(spec)))?;

        Ok(ChannelRule {
            id: conn.last_insert_rowid(),
            channel_id: spec.channel_id,
            role_name: spec.role_name.clone(),
            max_uploads: spec.max_uploads,
            order_index: spec.order_index,
            reset_frequency: spec.reset_frequency,
        })
    }

    pub fn update_rule(&self, rule_id: i64, spec: &RuleSpec) -> Result<ChannelRule, StorageError> {
        let conn = self.conn()?;
        let now = Utc::now().to_rfc3339();

        let updated = conn
            .execute(
                r#"
                UPDATE channel_rules SET
                    channel_id = ?1,
                    role_name = ?2,
                    max_uploads = ?3,
                    order_index = ?4,
                    reset_frequency = ?5,
                    updated_at = ?6
                WHERE id = ?7
                "#,
                params![
                    spec.channel_id as i64,
                    spec.role_name,
                    spec.max_uploads,
                    spec.order_index,
                    spec.reset_frequency.as_str(),
                    now,
                    rule_id
                ],
            )
            .map_err(|err| StorageError::from_write(err, duplicate_rule_message(spec)))?;

        if updated == 0 {
            return Err(StorageError::NotFound(format!("rule {rule_id}")));
        }

        Ok(ChannelRule {
            id: rule_id,
            channel_id: spec.channel_id,
            role_name: spec.role_name.clone(),
            max_uploads: spec.max_uploads,
            order_index: spec.order_index,
            reset_frequency: spec.reset_frequency,
        })
    }

    pub fn delete_rule(&self, rule_id: i64) -> Result<(), StorageError> {
        let conn = self.conn()?;
        let removed = conn.execute("DELETE FROM channel_rules WHERE id = ?1", params![rule_id])?;
        if removed == 0 {
            return Err(StorageError::NotFound(format!("rule {rule_id}")));
        }
        Ok(())
    }

    pub fn set_global_default(&self, max_uploads: u32) -> Result<GlobalDefault, StorageError> {
        let conn = self.conn()?;
        let now = Utc::now().to_rfc3339();

        conn.execute(
            r#"
            INSERT INTO global_default (id, max_uploads, updated_at)
            VALUES (1, ?1, ?2)
            ON CONFLICT(id) DO UPDATE SET
                max_uploads = excluded.max_uploads,
                updated_at = excluded.updated_at
            "#,
            params![max_uploads, now],
        )?;

        Ok(GlobalDefault { max_uploads })
    }

    pub fn clear_global_default(&self) -> Result<bool, StorageError> {
        let conn = self.conn()?;
        let removed = conn.execute("DELETE FROM global_default WHERE id = 1", [])?;
        Ok(removed > 0)
    }

    /// Returns `true` when the channel was not blocked before.
    pub fn block_channel(&self, channel_id: ChannelId) -> Result<bool, StorageError> {
        let conn = self.conn()?;
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO blocked_channels (channel_id, blocked_at) VALUES (?1, ?2)",
            params![channel_id as i64, Utc::now().to_rfc3339()],
        )?;
        Ok(inserted > 0)
    }

    pub fn unblock_channel(&self, channel_id: ChannelId) -> Result<bool, StorageError> {
        let conn = self.conn()?;
        let removed = conn.execute(
            "DELETE FROM blocked_channels WHERE channel_id = ?1",
            params![channel_id as i64],
        )?;
        Ok(removed > 0)
    }

    pub fn list_blocked_channels(&self) -> Result<Vec<ChannelId>, StorageError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT channel_id FROM blocked_channels ORDER BY channel_id")?;
        let rows = stmt.query_map([], |row| row.get::<_, i64>(0))?;

        let mut channels = Vec::new();
        for row in rows {
            channels.push(row? as u64);
        }
        Ok(channels)
    }
}

impl UsageStore for WardenDatabase {
    fn get_usage(
        &self,
        user_id: UserId,
        channel_id: ChannelId,
    ) -> Result<Option<UsageRecord>, StorageError> {
        let conn = self.conn()?;
        let record = conn
            .query_row(
                &format!(
                    "SELECT {USAGE_COLUMNS} FROM usage_records WHERE user_id = ?1 AND channel_id = ?2"
                ),
                params![user_id as i64, channel_id as i64],
                usage_from_row,
            )
            .optional()?;
        Ok(record)
    }

    fn commit_usage(&self, record: &UsageRecord) -> Result<(), StorageError> {
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO usage_records
                (user_id, channel_id, username, usage_count, reset_frequency, last_reset, rule_id)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT(user_id, channel_id) DO UPDATE SET
                username = excluded.username,
                usage_count = excluded.usage_count,
                reset_frequency = excluded.reset_frequency,
                last_reset = excluded.last_reset,
                rule_id = excluded.rule_id
            "#,
            params![
                record.user_id as i64,
                record.channel_id as i64,
                record.username,
                record.usage_count,
                record.reset_frequency.as_str(),
                record.last_reset.to_rfc3339(),
                record.rule_id
            ],
        )?;
        Ok(())
    }

    fn list_usage(&self) -> Result<Vec<UsageRecord>, StorageError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {USAGE_COLUMNS} FROM usage_records ORDER BY channel_id, user_id"
        ))?;
        let rows = stmt.query_map([], usage_from_row)?;

        let mut usage = Vec::new();
        for row in rows {
            usage.push(row?);
        }
        Ok(usage)
    }
}

impl PolicySource for WardenDatabase {
    fn channel_rules(&self, channel_id: ChannelId) -> Result<Vec<ChannelRule>, StorageError> {
        self.list_rules(Some(channel_id))
    }

    fn global_default(&self) -> Result<Option<GlobalDefault>, StorageError> {
        let conn = self.conn()?;
        let max_uploads = conn
            .query_row(
                "SELECT max_uploads FROM global_default WHERE id = 1",
                [],
                |row| row.get::<_, u32>(0),
            )
            .optional()?;
        Ok(max_uploads.map(|max_uploads| GlobalDefault { max_uploads }))
    }

    fn rule_cadences(&self) -> Result<HashMap<i64, ResetFrequency>, StorageError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT id, reset_frequency FROM channel_rules")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, i64>(0)?, parse_frequency(1, row.get(1)?)?))
        })?;

        let mut cadences = HashMap::new();
        for row in rows {
            let (id, frequency) = row?;
            cadences.insert(id, frequency);
        }
        Ok(cadences)
    }

    fn is_channel_blocked(&self, channel_id: ChannelId) -> Result<bool, StorageError> {
        let conn = self.conn()?;
        let found = conn
            .query_row(
                "SELECT 1 FROM blocked_channels WHERE channel_id = ?1",
                params![channel_id as i64],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }
}

fn duplicate_rule_message(spec: &RuleSpec) -> String {
    format!(
        "channel {} already has a rule for role '{}' at order {}",
        spec.channel_id, spec.role_name, spec.order_index
    )
}

fn usage_from_row(row: &Row<'_>) -> rusqlite::Result<UsageRecord> {
    Ok(UsageRecord {
        user_id: row.get::<_, i64>(0)? as u64,
        channel_id: row.get::<_, i64>(1)? as u64,
        username: row.get(2)?,
        usage_count: row.get(3)?,
        reset_frequency: parse_frequency(4, row.get(4)?)?,
        last_reset: parse_timestamp(5, row.get(5)?)?,
        rule_id: row.get(6)?,
    })
}

fn rule_from_row(row: &Row<'_>) -> rusqlite::Result<ChannelRule> {
    Ok(ChannelRule {
        id: row.get(0)?,
        channel_id: row.get::<_, i64>(1)? as u64,
        role_name: row.get(2)?,
        max_uploads: row.get(3)?,
        order_index: row.get(4)?,
        reset_frequency: parse_frequency(5, row.get(5)?)?,
    })
}

fn parse_frequency(idx: usize, raw: String) -> rusqlite::Result<ResetFrequency> {
    raw.parse()
        .map_err(|err: String| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, err.into()))
}

fn parse_timestamp(idx: usize, raw: String) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|err| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn rule(channel_id: ChannelId, role: &str, max_uploads: u32, order_index: i64) -> RuleSpec {
        RuleSpec {
            channel_id,
            role_name: role.to_string(),
            max_uploads,
            order_index,
            reset_frequency: ResetFrequency::Daily,
        }
    }

    #[test]
    fn usage_upsert_overwrites_existing_row() {
        let db = WardenDatabase::in_memory().unwrap();
        let mut record = UsageRecord {
            user_id: 11,
            channel_id: 22,
            username: "ada".into(),
            usage_count: 2,
            reset_frequency: ResetFrequency::Weekly,
            last_reset: Utc.with_ymd_and_hms(2024, 3, 4, 5, 6, 7).unwrap(),
            rule_id: Some(17),
        };
        db.commit_usage(&record).unwrap();

        record.usage_count = 3;
        record.username = "ada l.".into();
        db.commit_usage(&record).unwrap();

        let stored = db.get_usage(11, 22).unwrap().expect("record exists");
        assert_eq!(stored, record);
        assert_eq!(db.list_usage().unwrap().len(), 1);
        assert!(db.get_usage(11, 23).unwrap().is_none());
    }

    #[test]
    fn rules_are_returned_in_priority_order() {
        let db = WardenDatabase::in_memory().unwrap();
        db.create_rule(&rule(1, "vip", 10, 5)).unwrap();
        db.create_rule(&rule(1, "member", 3, 1)).unwrap();
        db.create_rule(&rule(2, "member", 1, 0)).unwrap();

        let rules = db.channel_rules(1).unwrap();
        let roles: Vec<_> = rules.iter().map(|r| r.role_name.as_str()).collect();
        assert_eq!(roles, vec!["member", "vip"]);
        assert_eq!(db.list_rules(None).unwrap().len(), 3);
    }

    #[test]
    fn duplicate_rule_is_a_conflict() {
        let db = WardenDatabase::in_memory().unwrap();
        db.create_rule(&rule(1, "member", 3, 0)).unwrap();
        let err = db.create_rule(&rule(1, "member", 5, 0)).unwrap_err();
        assert!(matches!(err, StorageError::Conflict(_)));
    }

    #[test]
    fn update_and_delete_missing_rule_report_not_found() {
        let db = WardenDatabase::in_memory().unwrap();
        assert!(matches!(
            db.update_rule(99, &rule(1, "member", 3, 0)),
            Err(StorageError::NotFound(_))
        ));
        assert!(matches!(db.delete_rule(99), Err(StorageError::NotFound(_))));

        let created = db.create_rule(&rule(1, "member", 3, 0)).unwrap();
        let updated = db.update_rule(created.id, &rule(1, "member", 8, 2)).unwrap();
        assert_eq!(db.get_rule(created.id).unwrap(), Some(updated));
        db.delete_rule(created.id).unwrap();
        assert!(db.get_rule(created.id).unwrap().is_none());
    }

    #[test]
    fn global_default_is_a_singleton() {
        let db = WardenDatabase::in_memory().unwrap();
        assert!(db.global_default().unwrap().is_none());

        db.set_global_default(4).unwrap();
        db.set_global_default(6).unwrap();
        assert_eq!(
            db.global_default().unwrap(),
            Some(GlobalDefault { max_uploads: 6 })
        );

        assert!(db.clear_global_default().unwrap());
        assert!(!db.clear_global_default().unwrap());
        assert!(db.global_default().unwrap().is_none());
    }

    #[test]
    fn rule_cadences_follow_updates() {
        let db = WardenDatabase::in_memory().unwrap();
        let daily = db.create_rule(&rule(1, "member", 2, 0)).unwrap();
        let weekly = db
            .create_rule(&RuleSpec {
                reset_frequency: ResetFrequency::Weekly,
                ..rule(1, "vip", 5, 1)
            })
            .unwrap();

        let cadences = db.rule_cadences().unwrap();
        assert_eq!(cadences.get(&daily.id), Some(&ResetFrequency::Daily));
        assert_eq!(cadences.get(&weekly.id), Some(&ResetFrequency::Weekly));

        db.update_rule(
            daily.id,
            &RuleSpec {
                reset_frequency: ResetFrequency::Weekly,
                ..rule(1, "member", 2, 0)
            },
        )
        .unwrap();
        db.delete_rule(weekly.id).unwrap();

        let cadences = db.rule_cadences().unwrap();
        assert_eq!(cadences.len(), 1);
        assert_eq!(cadences.get(&daily.id), Some(&ResetFrequency::Weekly));
    }

    #[test]
    fn block_list_toggles_membership() {
        let db = WardenDatabase::in_memory().unwrap();
        assert!(db.block_channel(5).unwrap());
        assert!(!db.block_channel(5).unwrap());
        assert!(db.is_channel_blocked(5).unwrap());
        assert_eq!(db.list_blocked_channels().unwrap(), vec![5]);

        assert!(db.unblock_channel(5).unwrap());
        assert!(!db.is_channel_blocked(5).unwrap());
    }

    #[test]
    fn usage_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let record = UsageRecord {
            user_id: 1,
            channel_id: 2,
            username: "grace".into(),
            usage_count: 1,
            reset_frequency: ResetFrequency::Daily,
            last_reset: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            rule_id: None,
        };

        {
            let db = WardenDatabase::new(dir.path().to_path_buf()).unwrap();
            db.commit_usage(&record).unwrap();
        }

        let db = WardenDatabase::new(dir.path().to_path_buf()).unwrap();
        assert_eq!(db.get_usage(1, 2).unwrap(), Some(record));
        assert_eq!(db.list_channel_usage(2).unwrap().len(), 1);
        assert!(db.delete_usage(1, 2).unwrap());
    }
}
