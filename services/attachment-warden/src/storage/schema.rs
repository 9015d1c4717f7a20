use rusqlite::Connection;

use super::error::StorageError;

pub const USAGE_RECORDS_TABLE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS usage_records (
    user_id INTEGER NOT NULL,
    channel_id INTEGER NOT NULL,
    username TEXT NOT NULL DEFAULT '',
    usage_count INTEGER NOT NULL CHECK (usage_count >= 0),
    reset_frequency TEXT NOT NULL DEFAULT 'daily',
    last_reset TEXT NOT NULL,
    rule_id INTEGER,
    PRIMARY KEY (user_id, channel_id)
);
"#;

pub const USAGE_RECORDS_INDEXES: &str = r#"
CREATE INDEX IF NOT EXISTS idx_usage_channel ON usage_records(channel_id);
"#;

pub const CHANNEL_RULES_TABLE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS channel_rules (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    channel_id INTEGER NOT NULL,
    role_name TEXT NOT NULL,
    max_uploads INTEGER NOT NULL CHECK (max_uploads >= 0),
    order_index INTEGER NOT NULL,
    reset_frequency TEXT NOT NULL DEFAULT 'daily',
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    UNIQUE(channel_id, role_name, order_index)
);
"#;

pub const CHANNEL_RULES_INDEXES: &str = r#"
CREATE INDEX IF NOT EXISTS idx_rules_channel_order ON channel_rules(channel_id, order_index, id);
"#;

pub const GLOBAL_DEFAULT_TABLE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS global_default (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    max_uploads INTEGER NOT NULL CHECK (max_uploads >= 0),
    updated_at TEXT NOT NULL
);
"#;

pub const BLOCKED_CHANNELS_TABLE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS blocked_channels (
    channel_id INTEGER PRIMARY KEY,
    blocked_at TEXT NOT NULL
);
"#;

pub fn init_database(conn: &Connection) -> Result<(), StorageError> {
    conn.execute_batch(USAGE_RECORDS_TABLE_SCHEMA)?;
    conn.execute_batch(USAGE_RECORDS_INDEXES)?;
    conn.execute_batch(CHANNEL_RULES_TABLE_SCHEMA)?;
    conn.execute_batch(CHANNEL_RULES_INDEXES)?;
    conn.execute_batch(GLOBAL_DEFAULT_TABLE_SCHEMA)?;
    conn.execute_batch(BLOCKED_CHANNELS_TABLE_SCHEMA)?;
    Ok(())
}
