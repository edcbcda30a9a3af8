use std::time::Duration;

pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:21960";
pub const DEFAULT_DB_PATH: &str = "goal_insight.db";

/// Pacing and limits for one batch run
#[derive(Debug, Clone)]
pub struct BatchConfig {
    /// Corpora shorter than this (in characters) are skipped
    pub min_text_length: usize,
    /// Wait after each subject that reached the model
    pub inter_call_delay: Duration,
    /// Wait before the retry pass starts
    pub retry_cooldown: Duration,
    /// Wall-clock ceiling for the whole run, kept below the caller's timeout
    pub time_budget: Duration,
    pub target_role: String,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            min_text_length: 50,
            inter_call_delay: Duration::from_millis(2_000),
            retry_cooldown: Duration::from_millis(10_000),
            time_budget: Duration::from_secs(270),
            target_role: "trainee".to_string(),
        }
    }
}

impl BatchConfig {
    /// Create config from environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let number = |key: &str| lookup(key).and_then(|v| v.trim().parse::<u64>().ok());

        Self {
            min_text_length: number("ANALYSIS_MIN_TEXT_LENGTH")
                .map(|n| n as usize)
                .unwrap_or(defaults.min_text_length),
            inter_call_delay: number("ANALYSIS_DELAY_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.inter_call_delay),
            retry_cooldown: number("ANALYSIS_RETRY_COOLDOWN_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.retry_cooldown),
            time_budget: number("ANALYSIS_TIME_BUDGET_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.time_budget),
            target_role: lookup("ANALYSIS_TARGET_ROLE").unwrap_or(defaults.target_role),
        }
    }

    /// No pacing at all, for tests and one-off local runs
    pub fn immediate() -> Self {
        Self {
            inter_call_delay: Duration::ZERO,
            retry_cooldown: Duration::ZERO,
            ..Self::default()
        }
    }
}

/// Server settings
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub db_path: String,
    pub bind_addr: String,
    /// Shared secret for the trigger; `None` rejects every trigger call
    pub cron_secret: Option<String>,
}

impl ServiceConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            db_path: lookup("DB_PATH").unwrap_or_else(|| DEFAULT_DB_PATH.to_string()),
            bind_addr: lookup("BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string()),
            cron_secret: lookup("CRON_SECRET").filter(|s| !s.is_empty()),
        }
    }
}
