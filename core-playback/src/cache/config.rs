//! Cache configuration and retention policy

use chrono::{DateTime, Datelike, Local, Utc};
use core_runtime::config::{CacheSettings, RetentionSetting, DEFAULT_CACHE_BUDGET_BYTES};
use std::path::PathBuf;
use std::time::Duration;

/// Configuration for the offline cache.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Root directory holding one sub-directory per group
    pub root: PathBuf,

    /// No new download starts once the cache holds this many bytes (default: 5GB)
    pub budget_bytes: u64,

    /// Startup sweep clears everything when the cache holds more than this
    pub hard_ceiling_bytes: Option<u64>,

    /// Index of the URL path segment naming the group directory (default: 1)
    pub group_segment: usize,

    /// Retention rule applied by the startup sweep
    pub retention: RetentionPolicy,

    /// Upper bound for a single download (default: 600s)
    pub download_timeout: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("../cache"),
            budget_bytes: DEFAULT_CACHE_BUDGET_BYTES,
            hard_ceiling_bytes: None,
            group_segment: 1,
            retention: RetentionPolicy::CalendarMonth,
            download_timeout: Duration::from_secs(600),
        }
    }
}

impl CacheConfig {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Self::default()
        }
    }

    /// Set the download budget.
    pub fn with_budget(mut self, bytes: u64) -> Self {
        self.budget_bytes = bytes;
        self
    }

    /// Set the sweep's hard ceiling.
    pub fn with_hard_ceiling(mut self, bytes: Option<u64>) -> Self {
        self.hard_ceiling_bytes = bytes;
        self
    }

    /// Set the retention policy.
    pub fn with_retention(mut self, retention: RetentionPolicy) -> Self {
        self.retention = retention;
        self
    }

    /// Set the group segment index.
    pub fn with_group_segment(mut self, index: usize) -> Self {
        self.group_segment = index;
        self
    }

    /// Set download timeout.
    pub fn with_download_timeout(mut self, timeout: Duration) -> Self {
        self.download_timeout = timeout;
        self
    }
}

impl From<&CacheSettings> for CacheConfig {
    fn from(settings: &CacheSettings) -> Self {
        Self {
            root: settings.root.clone(),
            budget_bytes: settings.budget_bytes,
            hard_ceiling_bytes: settings.hard_ceiling_bytes,
            group_segment: settings.group_segment,
            retention: settings.retention.into(),
            download_timeout: settings.download_timeout,
        }
    }
}

/// When the startup sweep considers a cached file expired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetentionPolicy {
    /// Expire files born in an earlier calendar month (device local time).
    CalendarMonth,
    /// Expire files older than this.
    MaxAge(Duration),
}

impl RetentionPolicy {
    pub fn is_expired(&self, born: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        match self {
            RetentionPolicy::CalendarMonth => {
                month_index(now.with_timezone(&Local)) > month_index(born.with_timezone(&Local))
            }
            RetentionPolicy::MaxAge(max_age) => (now - born)
                .to_std()
                .map(|age| age > *max_age)
                .unwrap_or(false),
        }
    }

    /// Returns a human-readable description of the policy.
    pub fn description(&self) -> String {
        match self {
            RetentionPolicy::CalendarMonth => "files from earlier calendar months".to_string(),
            RetentionPolicy::MaxAge(age) => {
                format!("files older than {} days", age.as_secs() / 86_400)
            }
        }
    }
}

impl From<RetentionSetting> for RetentionPolicy {
    fn from(setting: RetentionSetting) -> Self {
        match setting {
            RetentionSetting::CalendarMonth => RetentionPolicy::CalendarMonth,
            RetentionSetting::MaxAgeDays(days) => {
                RetentionPolicy::MaxAge(Duration::from_secs(u64::from(days) * 86_400))
            }
        }
    }
}

// Months since year 0, so December -> January counts as a change.
fn month_index<Tz: chrono::TimeZone>(at: DateTime<Tz>) -> i64 {
    i64::from(at.year()) * 12 + i64::from(at.month0())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn utc(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_calendar_month_rule() {
        let policy = RetentionPolicy::CalendarMonth;
        assert!(!policy.is_expired(utc(2024, 3, 2), utc(2024, 3, 28)));
        assert!(policy.is_expired(utc(2024, 2, 27), utc(2024, 3, 2)));
    }

    #[test]
    fn test_calendar_month_rule_across_year_boundary() {
        let policy = RetentionPolicy::CalendarMonth;
        assert!(policy.is_expired(utc(2023, 12, 15), utc(2024, 1, 15)));
        assert!(policy.is_expired(utc(2023, 1, 15), utc(2024, 1, 15)));
    }

    #[test]
    fn test_max_age_rule() {
        let policy = RetentionPolicy::from(RetentionSetting::MaxAgeDays(30));
        assert!(!policy.is_expired(utc(2024, 3, 1), utc(2024, 3, 20)));
        assert!(policy.is_expired(utc(2024, 1, 1), utc(2024, 3, 20)));
        // Clock skew: a file from the future never expires.
        assert!(!policy.is_expired(utc(2024, 4, 1), utc(2024, 3, 20)));
    }

    #[test]
    fn test_config_from_settings() {
        let settings = CacheSettings {
            budget_bytes: 1_000,
            hard_ceiling_bytes: Some(2_000),
            ..CacheSettings::default()
        };
        let config = CacheConfig::from(&settings);
        assert_eq!(config.budget_bytes, 1_000);
        assert_eq!(config.hard_ceiling_bytes, Some(2_000));
        assert_eq!(config.group_segment, 1);
        assert_eq!(config.retention, RetentionPolicy::CalendarMonth);
    }
}
