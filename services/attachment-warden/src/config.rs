use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{FixedOffset, Weekday};

use crate::quota::{AttachmentClassifier, ResetSchedule, WeeklyAnchor, DEFAULT_TRACKED_EXTENSIONS};

/// Upper bound on the reset tick, so a boundary is never missed by more.
pub const MAX_RESET_INTERVAL_SECS: u64 = 300;

#[derive(Debug, Clone)]
pub struct WardenConfig {
    pub server_host: String,
    pub server_port: u16,
    pub data_dir: PathBuf,
    pub reset_interval_secs: u64,
    pub daily_window_hours: u32,
    pub weekly_reset_day: Weekday,
    pub weekly_reset_hour: u32,
    pub reset_utc_offset_minutes: i32,
    pub tracked_extensions: Vec<String>,
    pub restrict_unmatched_roles: bool,
    pub store_timeout_ms: u64,
    pub platform_gateway_url: Option<String>,
    pub platform_gateway_token: Option<String>,
    pub platform_timeout_secs: u64,
    pub notice_ttl_secs: u64,
    pub log_level: String,
}

impl Default for WardenConfig {
    fn default() -> Self {
        Self {
            server_host: "127.0.0.1".to_string(),
            server_port: 8190,
            data_dir: PathBuf::from("data/warden"),
            reset_interval_secs: MAX_RESET_INTERVAL_SECS,
            daily_window_hours: 24,
            weekly_reset_day: Weekday::Sun,
            weekly_reset_hour: 0,
            reset_utc_offset_minutes: 0,
            tracked_extensions: DEFAULT_TRACKED_EXTENSIONS
                .iter()
                .map(|ext| ext.to_string())
                .collect(),
            restrict_unmatched_roles: false,
            store_timeout_ms: 2_000,
            platform_gateway_url: None,
            platform_gateway_token: None,
            platform_timeout_secs: 5,
            notice_ttl_secs: 15,
            log_level: "info".to_string(),
        }
    }
}

impl WardenConfig {
    pub fn from_env() -> Result<Self> {
        let mut cfg = Self::default();

        if let Ok(host) = env::var("WARDEN_HOST") {
            cfg.server_host = host;
        }
        if let Ok(port) = env::var("WARDEN_PORT") {
            cfg.server_port = port.parse().context("WARDEN_PORT must be a valid u16")?;
        }
        if let Ok(dir) = env::var("WARDEN_DATA_DIR") {
            cfg.data_dir = PathBuf::from(dir);
        }
        if let Ok(interval) = env::var("RESET_INTERVAL_SECS") {
            cfg.reset_interval_secs = interval
                .parse()
                .context("RESET_INTERVAL_SECS must be a positive integer")?;
        }
        if let Ok(hours) = env::var("DAILY_WINDOW_HOURS") {
            cfg.daily_window_hours = hours
                .parse()
                .context("DAILY_WINDOW_HOURS must be a positive integer")?;
        }
        if let Ok(day) = env::var("WEEKLY_RESET_DAY") {
            cfg.weekly_reset_day = day
                .parse()
                .map_err(|_| anyhow::anyhow!("WEEKLY_RESET_DAY is not a weekday: {day}"))?;
        }
        if let Ok(hour) = env::var("WEEKLY_RESET_HOUR") {
            cfg.weekly_reset_hour = hour
                .parse()
                .context("WEEKLY_RESET_HOUR must be an hour between 0 and 23")?;
        }
        if let Ok(offset) = env::var("RESET_UTC_OFFSET_MINUTES") {
            cfg.reset_utc_offset_minutes = offset
                .parse()
                .context("RESET_UTC_OFFSET_MINUTES must be an integer")?;
        }
        if let Ok(list) = env::var("TRACKED_EXTENSIONS") {
            cfg.tracked_extensions = parse_list(&list);
        }
        if let Ok(flag) = env::var("RESTRICT_UNMATCHED_ROLES") {
            cfg.restrict_unmatched_roles = parse_bool(&flag)
                .with_context(|| format!("RESTRICT_UNMATCHED_ROLES is invalid: {flag}"))?;
        }
        if let Ok(timeout) = env::var("STORE_TIMEOUT_MS") {
            cfg.store_timeout_ms = timeout
                .parse()
                .context("STORE_TIMEOUT_MS must be a positive integer")?;
        }
        if let Ok(url) = env::var("PLATFORM_GATEWAY_URL") {
            cfg.platform_gateway_url = non_empty(url);
        }
        if let Ok(token) = env::var("PLATFORM_GATEWAY_TOKEN") {
            cfg.platform_gateway_token = non_empty(token);
        }
        if let Ok(timeout) = env::var("PLATFORM_TIMEOUT_SECS") {
            cfg.platform_timeout_secs = timeout
                .parse()
                .context("PLATFORM_TIMEOUT_SECS must be a positive integer")?;
        }
        if let Ok(ttl) = env::var("NOTICE_TTL_SECS") {
            cfg.notice_ttl_secs = ttl
                .parse()
                .context("NOTICE_TTL_SECS must be a positive integer")?;
        }
        if let Ok(level) = env::var("LOG_LEVEL") {
            cfg.log_level = level;
        }

        cfg.validate()?;
        ensure_directory(&cfg.data_dir)?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.reset_interval_secs == 0 || self.reset_interval_secs > MAX_RESET_INTERVAL_SECS {
            anyhow::bail!(
                "RESET_INTERVAL_SECS must be between 1 and {MAX_RESET_INTERVAL_SECS}"
            );
        }
        if self.daily_window_hours == 0 {
            anyhow::bail!("DAILY_WINDOW_HOURS must be greater than zero");
        }
        if self.weekly_reset_hour > 23 {
            anyhow::bail!("WEEKLY_RESET_HOUR must be between 0 and 23");
        }
        if self.reset_utc_offset_minutes.abs() >= 24 * 60 {
            anyhow::bail!("RESET_UTC_OFFSET_MINUTES must be within one day");
        }
        if self.tracked_extensions.is_empty() {
            anyhow::bail!("TRACKED_EXTENSIONS must name at least one extension");
        }
        if self.store_timeout_ms == 0 {
            anyhow::bail!("STORE_TIMEOUT_MS must be greater than zero");
        }
        if self.platform_timeout_secs == 0 {
            anyhow::bail!("PLATFORM_TIMEOUT_SECS must be greater than zero");
        }
        if self.platform_gateway_token.is_some() && self.platform_gateway_url.is_none() {
            anyhow::bail!("PLATFORM_GATEWAY_TOKEN requires PLATFORM_GATEWAY_URL");
        }
        Ok(())
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }

    pub fn reset_interval(&self) -> Duration {
        Duration::from_secs(self.reset_interval_secs)
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }

    pub fn platform_timeout(&self) -> Duration {
        Duration::from_secs(self.platform_timeout_secs)
    }

    pub fn notice_ttl(&self) -> Duration {
        Duration::from_secs(self.notice_ttl_secs)
    }

    pub fn classifier(&self) -> AttachmentClassifier {
        AttachmentClassifier::new(&self.tracked_extensions)
    }

    pub fn reset_schedule(&self) -> Result<ResetSchedule> {
        let offset = FixedOffset::east_opt(self.reset_utc_offset_minutes * 60)
            .context("RESET_UTC_OFFSET_MINUTES is out of range")?;
        Ok(ResetSchedule {
            daily_window: chrono::Duration::hours(i64::from(self.daily_window_hours)),
            weekly_anchor: WeeklyAnchor::new(self.weekly_reset_day, self.weekly_reset_hour, offset),
        })
    }
}

fn ensure_directory(path: &Path) -> Result<()> {
    if path.exists() {
        if !path.is_dir() {
            anyhow::bail!("{} exists but is not a directory", path.display());
        }
    } else {
        fs::create_dir_all(path)
            .with_context(|| format!("unable to create data directory {}", path.display()))?;
    }
    Ok(())
}

fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|item| item.trim().trim_start_matches('.').to_ascii_lowercase())
        .filter(|item| !item.is_empty())
        .collect()
}

fn parse_bool(value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "y" => Ok(true),
        "false" | "0" | "no" | "n" => Ok(false),
        _ => anyhow::bail!("invalid boolean value {value}"),
    }
}

fn non_empty(value: String) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_config_validation() {
        let mut config = WardenConfig::default();
        assert!(config.validate().is_ok());

        // Tick coarser than five minutes.
        config.reset_interval_secs = 301;
        assert!(config.validate().is_err());
        config.reset_interval_secs = 0;
        assert!(config.validate().is_err());
        config.reset_interval_secs = 60;

        config.weekly_reset_hour = 24;
        assert!(config.validate().is_err());
        config.weekly_reset_hour = 23;

        config.tracked_extensions.clear();
        assert!(config.validate().is_err());
        config.tracked_extensions = vec!["mp3".into()];

        // Token without gateway.
        config.platform_gateway_token = Some("secret".into());
        assert!(config.validate().is_err());
        config.platform_gateway_url = Some("http://gateway.local".into());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_helpers() {
        assert_eq!(parse_list(" MP3, .wav ,,ogg"), vec!["mp3", "wav", "ogg"]);
        assert!(parse_bool("YES").unwrap());
        assert!(!parse_bool("0").unwrap());
        assert!(parse_bool("maybe").is_err());
        assert_eq!(non_empty("  ".into()), None);
    }

    #[test]
    fn test_reset_schedule_uses_offset() {
        let config = WardenConfig {
            weekly_reset_day: Weekday::Mon,
            weekly_reset_hour: 6,
            reset_utc_offset_minutes: -300,
            ..WardenConfig::default()
        };
        let schedule = config.reset_schedule().unwrap();
        // Monday 06:00 at UTC-05:00 is Monday 11:00 UTC.
        let now = Utc.with_ymd_and_hms(2024, 6, 10, 12, 0, 0).unwrap();
        assert_eq!(
            schedule.weekly_anchor.most_recent(now),
            Utc.with_ymd_and_hms(2024, 6, 10, 11, 0, 0).unwrap()
        );
        assert_eq!(schedule.daily_window, chrono::Duration::hours(24));
    }
}
