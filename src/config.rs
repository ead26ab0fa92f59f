//! Layered pipeline configuration: built-in defaults, optional TOML file, then
//! environment variables, in increasing precedence (§4.12).

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize};

use crate::errors::SmithError;

/// Process-wide knobs passed by reference into every stage. Never global
/// mutable state — constructed once at startup and handed down explicitly.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct PipelineConfig {
    pub workers: usize,
    pub issue_workers: usize,
    pub max_bugs: usize,
    #[serde(deserialize_with = "seconds_or_suffixed")]
    pub per_test_timeout_secs: u64,
    #[serde(deserialize_with = "seconds_or_suffixed")]
    pub container_start_timeout_secs: u64,
    #[serde(deserialize_with = "seconds_or_suffixed")]
    pub git_transport_timeout_secs: u64,
    #[serde(deserialize_with = "seconds_or_suffixed")]
    pub llm_timeout_secs: u64,
    pub backoff: BackoffConfig,
    pub cache_dir: PathBuf,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            workers: num_cpus::get().max(1),
            issue_workers: 4,
            max_bugs: 100,
            per_test_timeout_secs: 300,
            container_start_timeout_secs: 30,
            git_transport_timeout_secs: 60,
            llm_timeout_secs: 120,
            backoff: BackoffConfig::default(),
            cache_dir: PathBuf::from(".swesmith_cache"),
        }
    }
}

impl PipelineConfig {
    /// Loads defaults, overlays an optional TOML file, then overlays
    /// environment variables. A malformed source is a hard `Configuration`
    /// error — never silently defaulted (§4.12).
    pub fn load(toml_path: Option<&std::path::Path>) -> Result<Self, SmithError> {
        let mut cfg = PipelineConfig::default();
        if let Some(path) = toml_path {
            let text = std::fs::read_to_string(path)?;
            let from_file: PipelineConfig = toml::from_str(&text)?;
            cfg = from_file;
        }
        cfg.apply_env_overrides()?;
        Ok(cfg)
    }

    fn apply_env_overrides(&mut self) -> Result<(), SmithError> {
        if let Ok(v) = std::env::var("SWESMITH_WORKERS") {
            self.workers = parse_env("SWESMITH_WORKERS", &v)?;
        }
        if let Ok(v) = std::env::var("SWESMITH_ISSUE_WORKERS") {
            self.issue_workers = parse_env("SWESMITH_ISSUE_WORKERS", &v)?;
        }
        if let Ok(v) = std::env::var("SWESMITH_MAX_BUGS") {
            self.max_bugs = parse_env("SWESMITH_MAX_BUGS", &v)?;
        }
        Ok(())
    }

    pub fn per_test_timeout(&self) -> Duration {
        Duration::from_secs(self.per_test_timeout_secs)
    }

    pub fn container_start_timeout(&self) -> Duration {
        Duration::from_secs(self.container_start_timeout_secs)
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, SmithError> {
    value
        .parse()
        .map_err(|_| SmithError::Configuration(format!("{key}={value} is not a valid value")))
}

/// Bounded exponential backoff parameters shared by git, container, and LLM
/// transport retries (§5).
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct BackoffConfig {
    pub base_delay_ms: u64,
    pub max_retries: u32,
    pub jitter_ms: u64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: 250,
            max_retries: 5,
            jitter_ms: 100,
        }
    }
}

/// Environment-sourced settings that are secrets or deployment topology, kept
/// separate from `PipelineConfig` since they are never written to a TOML file
/// (§6 Environment inputs).
#[derive(Debug, Clone)]
pub struct EnvConfig {
    pub github_token: String,
    pub gh_org: String,
    pub dh_org: String,
    pub gh_owner_type: OwnerType,
    pub llm_api_keys: Vec<String>,
    pub https_proxy: Option<String>,
    pub no_proxy: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OwnerType {
    User,
    Org,
}

impl std::str::FromStr for OwnerType {
    type Err = SmithError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(OwnerType::User),
            "org" => Ok(OwnerType::Org),
            other => Err(SmithError::Configuration(format!(
                "SWESMITH_GH_OWNER_TYPE must be `user` or `org`, got `{other}`"
            ))),
        }
    }
}

impl EnvConfig {
    /// Reads required environment inputs; fails fast (Configuration error) on
    /// the first missing variable rather than partially initializing.
    pub fn from_env() -> Result<Self, SmithError> {
        let github_token = require_env("GITHUB_TOKEN")?;
        let gh_org = require_env("SWESMITH_ORG_GH")?;
        let dh_org = require_env("SWESMITH_ORG_DH")?;
        let gh_owner_type = std::env::var("SWESMITH_GH_OWNER_TYPE")
            .unwrap_or_else(|_| "user".to_string())
            .parse()?;
        let llm_api_keys = std::env::var("SWESMITH_LLM_API_KEYS")
            .map(|v| v.split(',').map(str::to_string).collect())
            .unwrap_or_default();
        Ok(Self {
            github_token,
            gh_org,
            dh_org,
            gh_owner_type,
            llm_api_keys,
            https_proxy: std::env::var("HTTPS_PROXY").ok(),
            no_proxy: std::env::var("NO_PROXY").ok(),
        })
    }
}

fn require_env(key: &str) -> Result<String, SmithError> {
    std::env::var(key).map_err(|_| SmithError::Configuration(format!("{key} is not set")))
}

/// Accepts either a bare integer of seconds or a human-friendly `"30s"`/`"5m"`
/// suffixed string.
fn seconds_or_suffixed<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum SecondsOrSuffixed {
        Seconds(u64),
        Suffixed(String),
    }

    Ok(match SecondsOrSuffixed::deserialize(deserializer)? {
        SecondsOrSuffixed::Seconds(v) => v,
        SecondsOrSuffixed::Suffixed(v) => parse_suffixed_duration(&v).map_err(serde::de::Error::custom)?,
    })
}

fn parse_suffixed_duration(value: &str) -> Result<u64, String> {
    let trimmed = value.trim();
    let (num, mult) = match trimmed.chars().last() {
        Some('s') => (&trimmed[..trimmed.len() - 1], 1),
        Some('m') => (&trimmed[..trimmed.len() - 1], 60),
        Some('h') => (&trimmed[..trimmed.len() - 1], 3600),
        _ => (trimmed, 1),
    };
    num.trim()
        .parse::<u64>()
        .map(|n| n * mult)
        .map_err(|_| format!("`{value}` is not a valid duration"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_workers_is_at_least_one() {
        assert!(PipelineConfig::default().workers >= 1);
    }

    #[test]
    fn suffixed_duration_parses_minutes() {
        assert_eq!(parse_suffixed_duration("5m").unwrap(), 300);
    }

    #[test]
    fn suffixed_duration_parses_bare_seconds() {
        assert_eq!(parse_suffixed_duration("45").unwrap(), 45);
    }

    #[test]
    fn env_override_takes_precedence_over_file_default() {
        let mut cfg = PipelineConfig::default();
        // SAFETY: test-only process-local env mutation, no concurrent access in this test.
        unsafe { std::env::set_var("SWESMITH_WORKERS", "7") };
        cfg.apply_env_overrides().unwrap();
        unsafe { std::env::remove_var("SWESMITH_WORKERS") };
        assert_eq!(cfg.workers, 7);
    }

    #[test]
    fn owner_type_rejects_unknown_value() {
        let result: Result<OwnerType, _> = "nobody".parse();
        assert!(result.is_err());
    }
}
