use crate::proposals::{ProposalWindows, DISCUSSION_WINDOW, VOTING_WINDOW};
use crate::sync::QueryPolicy;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("decode config: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("invalid value for {var}: {value}")]
    Env { var: &'static str, value: String },
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GovConfig {
    #[serde(default = "default_max_parameter_change_size")]
    pub max_parameter_change_size: usize,
    #[serde(default = "default_discussion_window_ms")]
    pub discussion_window_ms: u64,
    #[serde(default = "default_voting_window_ms")]
    pub voting_window_ms: u64,
    #[serde(default)]
    pub sync: SyncConfig,
    /// Caller address; balance polling stays off without it.
    #[serde(default)]
    pub account: Option<String>,
}

impl Default for GovConfig {
    fn default() -> Self {
        Self {
            max_parameter_change_size: default_max_parameter_change_size(),
            discussion_window_ms: default_discussion_window_ms(),
            voting_window_ms: default_voting_window_ms(),
            sync: SyncConfig::default(),
            account: None,
        }
    }
}

fn default_max_parameter_change_size() -> usize {
    16 * 1024
}

fn default_discussion_window_ms() -> u64 {
    DISCUSSION_WINDOW.as_secs() * 1000
}

fn default_voting_window_ms() -> u64 {
    VOTING_WINDOW.as_secs() * 1000
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default = "default_proposals_interval_ms")]
    pub proposals_interval_ms: u64,
    #[serde(default = "default_votes_interval_ms")]
    pub votes_interval_ms: u64,
    #[serde(default = "default_total_votes_interval_ms")]
    pub total_votes_interval_ms: u64,
    #[serde(default = "default_balance_interval_ms")]
    pub balance_interval_ms: u64,
    #[serde(default = "default_supply_interval_ms")]
    pub supply_interval_ms: u64,
    #[serde(default = "default_stale_time_ms")]
    pub stale_time_ms: u64,
    #[serde(default = "default_retry_count")]
    pub retry_count: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            proposals_interval_ms: default_proposals_interval_ms(),
            votes_interval_ms: default_votes_interval_ms(),
            total_votes_interval_ms: default_total_votes_interval_ms(),
            balance_interval_ms: default_balance_interval_ms(),
            supply_interval_ms: default_supply_interval_ms(),
            stale_time_ms: default_stale_time_ms(),
            retry_count: default_retry_count(),
            retry_delay_ms: default_retry_delay_ms(),
        }
    }
}

fn default_proposals_interval_ms() -> u64 {
    30_000
}

fn default_votes_interval_ms() -> u64 {
    10_000
}

fn default_total_votes_interval_ms() -> u64 {
    5_000
}

fn default_balance_interval_ms() -> u64 {
    15_000
}

fn default_supply_interval_ms() -> u64 {
    60_000
}

fn default_stale_time_ms() -> u64 {
    15_000
}

fn default_retry_count() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    1_000
}

impl SyncConfig {
    fn policy(&self, interval_ms: u64) -> QueryPolicy {
        QueryPolicy {
            interval: Duration::from_millis(interval_ms),
            stale_time: Duration::from_millis(self.stale_time_ms),
            retries: self.retry_count,
            retry_delay: Duration::from_millis(self.retry_delay_ms),
        }
    }

    pub fn proposals_policy(&self) -> QueryPolicy {
        self.policy(self.proposals_interval_ms)
    }

    pub fn votes_policy(&self) -> QueryPolicy {
        self.policy(self.votes_interval_ms)
    }

    pub fn total_votes_policy(&self) -> QueryPolicy {
        self.policy(self.total_votes_interval_ms)
    }

    pub fn balance_policy(&self) -> QueryPolicy {
        self.policy(self.balance_interval_ms)
    }

    pub fn supply_policy(&self) -> QueryPolicy {
        self.policy(self.supply_interval_ms)
    }
}

fn env_override<T: std::str::FromStr>(var: &'static str) -> Result<Option<T>, ConfigError> {
    match env::var(var) {
        Ok(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Env { var, value }),
        Err(_) => Ok(None),
    }
}

impl GovConfig {
    /// Load from a JSON file; absent fields take their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let bytes = fs::read(path)?;
        let cfg: GovConfig = serde_json::from_slice(&bytes)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Apply `GOV_*` environment variables on top of the loaded values.
    pub fn with_env_overrides(mut self) -> Result<Self, ConfigError> {
        if let Some(v) = env_override("GOV_MAX_PARAMETER_CHANGE_SIZE")? {
            self.max_parameter_change_size = v;
        }
        if let Some(v) = env_override::<String>("GOV_ACCOUNT")? {
            self.account = (!v.is_empty()).then_some(v);
        }
        if let Some(v) = env_override("GOV_RETRY_COUNT")? {
            self.sync.retry_count = v;
        }
        if let Some(v) = env_override("GOV_RETRY_DELAY_MS")? {
            self.sync.retry_delay_ms = v;
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_parameter_change_size == 0 {
            return Err(ConfigError::Invalid(
                "max_parameter_change_size must be positive".into(),
            ));
        }
        let intervals = [
            ("proposals_interval_ms", self.sync.proposals_interval_ms),
            ("votes_interval_ms", self.sync.votes_interval_ms),
            ("total_votes_interval_ms", self.sync.total_votes_interval_ms),
            ("balance_interval_ms", self.sync.balance_interval_ms),
            ("supply_interval_ms", self.sync.supply_interval_ms),
        ];
        for (name, value) in intervals {
            if value == 0 {
                return Err(ConfigError::Invalid(format!("{name} must be positive")));
            }
        }
        Ok(())
    }

    pub fn windows(&self) -> ProposalWindows {
        ProposalWindows {
            discussion: Duration::from_millis(self.discussion_window_ms),
            voting: Duration::from_millis(self.voting_window_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let cfg = GovConfig::default();
        assert_eq!(cfg.discussion_window_ms, 21 * 24 * 60 * 60 * 1000);
        assert_eq!(cfg.voting_window_ms, 28 * 24 * 60 * 60 * 1000);
        assert_eq!(cfg.sync.retry_count, 3);
        assert_eq!(cfg.sync.retry_delay_ms, 1_000);
        assert_eq!(cfg.sync.votes_interval_ms, 10_000);
        assert_eq!(cfg.sync.total_votes_interval_ms, 5_000);
        assert_eq!(cfg.sync.stale_time_ms, 15_000);
        assert_eq!(cfg.windows(), ProposalWindows::default());
    }

    #[test]
    fn partial_json_fills_defaults() {
        let cfg: GovConfig =
            serde_json::from_str(r#"{"max_parameter_change_size": 1000, "sync": {"retry_count": 5}}"#)
                .unwrap();
        assert_eq!(cfg.max_parameter_change_size, 1000);
        assert_eq!(cfg.sync.retry_count, 5);
        assert_eq!(cfg.sync.retry_delay_ms, 1_000);
        assert!(cfg.account.is_none());
    }

    #[test]
    fn zero_limits_are_rejected() {
        let mut cfg = GovConfig::default();
        cfg.max_parameter_change_size = 0;
        assert!(matches!(cfg.validate(), Err(ConfigError::Invalid(_))));
        let mut cfg = GovConfig::default();
        cfg.sync.votes_interval_ms = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn policy_carries_retry_settings() {
        let sync = SyncConfig::default();
        let policy = sync.votes_policy();
        assert_eq!(policy.interval, Duration::from_secs(10));
        assert_eq!(policy.stale_time, Duration::from_secs(15));
        assert_eq!(policy.retries, 3);
        assert_eq!(policy.retry_delay, Duration::from_secs(1));
    }
}
