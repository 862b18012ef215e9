//! services/journal/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development. Missing service credentials or ad unit
//! identifiers are fatal: the app cannot run without them.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use for_me_core::{AdUnits, ConversationConfig, FailedTurnPolicy, RetryPolicy};
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Where daily records are stored.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RecordBackend {
    Firestore {
        project_id: String,
        bearer_token: String,
        base_url: Option<String>,
    },
    /// Process-local store; records are lost on exit.
    Memory,
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub log_level: Level,
    pub settings_path: PathBuf,
    pub openai_api_key: String,
    pub openai_api_base: Option<String>,
    pub chat_model: String,
    pub record_backend: RecordBackend,
    pub ad_units: AdUnits,
    pub ad_retry: RetryPolicy,
    pub conversation: ConversationConfig,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the configuration from any variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let required = |name: &str| lookup(name).ok_or_else(|| ConfigError::MissingVar(name.to_string()));

        // --- Server Settings ---
        let bind_address = parse_or(&lookup, "BIND_ADDRESS", SocketAddr::from(([127, 0, 0, 1], 3000)))?;
        let log_level_str = lookup("RUST_LOG").unwrap_or_else(|| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;
        let settings_path = lookup("SETTINGS_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("./for_me_settings.json"));

        // --- Chat Completion ---
        let openai_api_key = required("OPENAI_API_KEY")?;
        let openai_api_base = lookup("OPENAI_API_BASE");
        let chat_model = lookup("CHAT_MODEL").unwrap_or_else(|| "gpt-4o-mini".to_string());

        // --- Record Store ---
        let record_backend = match lookup("RECORD_BACKEND").as_deref().unwrap_or("firestore") {
            "firestore" => RecordBackend::Firestore {
                project_id: required("FIRESTORE_PROJECT_ID")?,
                bearer_token: required("FIRESTORE_BEARER_TOKEN")?,
                base_url: lookup("FIRESTORE_BASE_URL"),
            },
            "memory" => RecordBackend::Memory,
            other => {
                return Err(ConfigError::InvalidValue(
                    "RECORD_BACKEND".to_string(),
                    format!("'{}' is not one of: firestore, memory", other),
                ))
            }
        };

        // --- Ads ---
        let ad_units = AdUnits {
            banner: required("AD_BANNER_UNIT_ID")?,
            interstitial: required("AD_INTERSTITIAL_UNIT_ID")?,
            rewarded: required("AD_REWARDED_UNIT_ID")?,
        };
        let defaults = RetryPolicy::default();
        let ad_retry = RetryPolicy {
            banner: Duration::from_secs(parse_or(&lookup, "AD_BANNER_RETRY_SECS", defaults.banner.as_secs())?),
            full_screen: Duration::from_secs(parse_or(
                &lookup,
                "AD_FULLSCREEN_RETRY_SECS",
                defaults.full_screen.as_secs(),
            )?),
        };

        // --- Conversation Policy ---
        let base = ConversationConfig::default();
        let conversation = ConversationConfig {
            base_turn_limit: parse_or(&lookup, "CHAT_BASE_TURNS", base.base_turn_limit)?,
            max_reward_views: parse_or(&lookup, "CHAT_MAX_REWARD_VIEWS", base.max_reward_views)?,
            failed_turn_policy: parse_or(&lookup, "CHAT_FAILED_TURN_POLICY", FailedTurnPolicy::default())?,
            ..base
        };

        Ok(Self {
            bind_address,
            log_level,
            settings_path,
            openai_api_key,
            openai_api_base,
            chat_model,
            record_backend,
            ad_units,
            ad_retry,
            conversation,
        })
    }
}

/// Parses `name` when present, otherwise falls back to `default`.
fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, name: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(name) {
        Some(raw) => raw
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidValue(name.to_string(), e.to_string())),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> =
            pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |name: &str| map.get(name).cloned()
    }

    const MINIMAL: &[(&str, &str)] = &[
        ("OPENAI_API_KEY", "sk-test"),
        ("RECORD_BACKEND", "memory"),
        ("AD_BANNER_UNIT_ID", "banner"),
        ("AD_INTERSTITIAL_UNIT_ID", "interstitial"),
        ("AD_REWARDED_UNIT_ID", "rewarded"),
    ];

    #[test]
    fn minimal_environment_uses_defaults() {
        let config = Config::from_lookup(vars(MINIMAL)).unwrap();
        assert_eq!(config.bind_address, "127.0.0.1:3000".parse().unwrap());
        assert_eq!(config.chat_model, "gpt-4o-mini");
        assert_eq!(config.record_backend, RecordBackend::Memory);
        assert_eq!(config.conversation.base_turn_limit, 3);
        assert_eq!(config.conversation.failed_turn_policy, FailedTurnPolicy::Charge);
        assert_eq!(config.ad_retry, RetryPolicy::default());
    }

    #[test]
    fn missing_api_key_is_fatal() {
        let without_key: Vec<_> = MINIMAL.iter().copied().filter(|(k, _)| *k != "OPENAI_API_KEY").collect();
        let err = Config::from_lookup(vars(&without_key)).unwrap_err();
        assert!(matches!(err, ConfigError::MissingVar(name) if name == "OPENAI_API_KEY"));
    }

    #[test]
    fn firestore_backend_requires_project() {
        let mut pairs: Vec<_> = MINIMAL.iter().copied().filter(|(k, _)| *k != "RECORD_BACKEND").collect();
        let err = Config::from_lookup(vars(&pairs)).unwrap_err();
        assert!(matches!(err, ConfigError::MissingVar(name) if name == "FIRESTORE_PROJECT_ID"));

        pairs.push(("FIRESTORE_PROJECT_ID", "for-me"));
        pairs.push(("FIRESTORE_BEARER_TOKEN", "token"));
        let config = Config::from_lookup(vars(&pairs)).unwrap();
        assert!(matches!(config.record_backend, RecordBackend::Firestore { ref project_id, .. } if project_id == "for-me"));
    }

    #[test]
    fn policy_overrides_are_parsed() {
        let mut pairs = MINIMAL.to_vec();
        pairs.push(("CHAT_FAILED_TURN_POLICY", "refund"));
        pairs.push(("CHAT_BASE_TURNS", "5"));
        pairs.push(("AD_BANNER_RETRY_SECS", "60"));
        let config = Config::from_lookup(vars(&pairs)).unwrap();
        assert_eq!(config.conversation.failed_turn_policy, FailedTurnPolicy::Refund);
        assert_eq!(config.conversation.base_turn_limit, 5);
        assert_eq!(config.ad_retry.banner, Duration::from_secs(60));

        pairs.push(("CHAT_MAX_REWARD_VIEWS", "lots"));
        assert!(matches!(
            Config::from_lookup(vars(&pairs)).unwrap_err(),
            ConfigError::InvalidValue(name, _) if name == "CHAT_MAX_REWARD_VIEWS"
        ));
    }
}
