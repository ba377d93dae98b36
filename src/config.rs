use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::error::{DualError, Result};

/// Threshold at which a navigation counts as finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LoadStrategy {
    /// Wait for `document.readyState == "complete"`.
    #[default]
    Normal,
    /// Accept `interactive` as well as `complete`.
    Eager,
    /// Do not wait at all.
    None,
}

impl LoadStrategy {
    /// Whether the given readyState satisfies this strategy.
    pub fn satisfied_by(&self, ready_state: &str) -> bool {
        match self {
            LoadStrategy::Normal => ready_state == "complete",
            LoadStrategy::Eager => ready_state == "interactive" || ready_state == "complete",
            LoadStrategy::None => true,
        }
    }
}

/// Timeout settings, in seconds. Fractions are allowed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Timeouts {
    /// Default for element queries and waiters.
    #[serde(default = "default_base_timeout")]
    pub base: f64,
    /// Navigation / readiness waits.
    #[serde(default = "default_page_load_timeout")]
    pub page_load: f64,
    /// JavaScript evaluation.
    #[serde(default = "default_script_timeout")]
    pub script: f64,
}

fn default_base_timeout() -> f64 {
    10.0
}
fn default_page_load_timeout() -> f64 {
    30.0
}
fn default_script_timeout() -> f64 {
    30.0
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            base: default_base_timeout(),
            page_load: default_page_load_timeout(),
            script: default_script_timeout(),
        }
    }
}

impl Timeouts {
    pub fn base_duration(&self) -> Duration {
        Duration::from_secs_f64(self.base.max(0.0))
    }

    pub fn page_load_duration(&self) -> Duration {
        Duration::from_secs_f64(self.page_load.max(0.0))
    }

    pub fn script_duration(&self) -> Duration {
        Duration::from_secs_f64(self.script.max(0.0))
    }
}

/// Retry policy for navigation and HTTP requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Additional attempts after the first failure.
    #[serde(default)]
    pub times: u32,
    /// Sleep between attempts, in seconds.
    #[serde(default = "default_retry_interval")]
    pub interval: f64,
}

fn default_retry_interval() -> f64 {
    2.0
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            times: 0,
            interval: default_retry_interval(),
        }
    }
}

/// Library configuration shared by both backends.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub timeouts: Timeouts,

    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default)]
    pub load_strategy: LoadStrategy,

    /// User agent applied to the HTTP session (the browser keeps its own
    /// unless explicitly overridden).
    pub user_agent: Option<String>,

    /// Extra headers sent with every HTTP request.
    #[serde(default)]
    pub headers: HashMap<String, String>,

    /// Proxy URL for the HTTP session.
    pub proxy: Option<String>,
}

impl Config {
    /// Merge defaults with `dualpage.toml` (working directory, then the
    /// user config directory) and `DUALPAGE_*` environment variables.
    pub fn load() -> Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(Config::default()));

        if let Some(path) = Self::user_config_path() {
            if path.exists() {
                figment = figment.merge(Toml::file(path));
            }
        }
        let local = PathBuf::from("dualpage.toml");
        if local.exists() {
            figment = figment.merge(Toml::file(local));
        }

        figment
            .merge(Env::prefixed("DUALPAGE_").split("__"))
            .extract()
            .map_err(|e| DualError::ConfigError(e.to_string()))
    }

    fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("dualpage").join("dualpage.toml"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sensible() {
        let config = Config::default();
        assert_eq!(config.timeouts.base, 10.0);
        assert_eq!(config.timeouts.page_load, 30.0);
        assert_eq!(config.retry.times, 0);
        assert_eq!(config.load_strategy, LoadStrategy::Normal);
        assert!(config.headers.is_empty());
    }

    #[test]
    fn load_strategy_thresholds() {
        assert!(LoadStrategy::Normal.satisfied_by("complete"));
        assert!(!LoadStrategy::Normal.satisfied_by("interactive"));
        assert!(LoadStrategy::Eager.satisfied_by("interactive"));
        assert!(LoadStrategy::Eager.satisfied_by("complete"));
        assert!(!LoadStrategy::Eager.satisfied_by("loading"));
        assert!(LoadStrategy::None.satisfied_by("loading"));
    }

    #[test]
    fn config_parses_from_toml() {
        let toml = r#"
            load_strategy = "eager"
            user_agent = "test-agent"

            [timeouts]
            base = 5.0

            [retry]
            times = 3
            interval = 0.5
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.load_strategy, LoadStrategy::Eager);
        assert_eq!(config.timeouts.base, 5.0);
        assert_eq!(config.timeouts.page_load, 30.0);
        assert_eq!(config.retry.times, 3);
        assert_eq!(config.retry.interval, 0.5);
        assert_eq!(config.user_agent.as_deref(), Some("test-agent"));
    }

    #[test]
    fn timeout_durations_clamp_negative() {
        let timeouts = Timeouts {
            base: -1.0,
            ..Timeouts::default()
        };
        assert_eq!(timeouts.base_duration(), Duration::ZERO);
    }
}
