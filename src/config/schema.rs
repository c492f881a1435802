//! Configuration schema for flakepin
//!
//! Configuration is stored at `~/.config/flakepin/config.toml`

use crate::error::{FlakepinError, FlakepinResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,

    /// Resolution behaviour
    pub resolver: ResolverConfig,

    /// Cache settings
    pub cache: CacheConfig,

    /// Upstream package sources
    pub sources: SourcesConfig,
}

impl Config {
    /// Reject settings that would make every resolution fail
    pub fn validate(&self, path: &Path) -> FlakepinResult<()> {
        let invalid = |reason: &str| FlakepinError::ConfigInvalid {
            path: path.to_path_buf(),
            reason: reason.to_string(),
        };

        if self.resolver.channels.iter().all(|c| c.trim().is_empty()) {
            return Err(invalid("resolver.channels must list at least one channel"));
        }
        if self.resolver.call_timeout_ms == 0 || self.resolver.total_budget_ms == 0 {
            return Err(invalid("resolver timeouts must be greater than zero"));
        }
        if self.cache.memory_max_entries == 0 {
            return Err(invalid("cache.memory_max_entries must be greater than zero"));
        }
        if !matches!(self.general.log_format.as_str(), "text" | "json") {
            return Err(invalid("general.log_format must be \"text\" or \"json\""));
        }
        Ok(())
    }
}

/// General application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log format: "text" or "json"
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_format: "text".to_string(),
        }
    }
}

/// Which upstream strategies a resolve call may use
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
    /// Hub lookup only
    PrimaryOnly,
    /// Search backend only
    FallbackOnly,
    /// Hub lookup, then search backend
    #[default]
    Hybrid,
}

impl Strategy {
    pub fn uses_primary(&self) -> bool {
        !matches!(self, Self::FallbackOnly)
    }

    pub fn uses_fallback(&self) -> bool {
        !matches!(self, Self::PrimaryOnly)
    }
}

/// Resolver configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Channels to search, most preferred first
    pub channels: Vec<String>,

    /// Default platform when a request does not name one
    pub system: String,

    /// Strategy selector
    pub strategy: Strategy,

    /// Timeout for a single upstream request
    pub call_timeout_ms: u64,

    /// Wall-clock budget for a whole resolve call
    pub total_budget_ms: u64,

    /// Trigger the background verification hook on misses
    pub async_verification: bool,
}

impl ResolverConfig {
    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }

    pub fn total_budget(&self) -> Duration {
        Duration::from_millis(self.total_budget_ms)
    }
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            channels: vec!["nixos-unstable".to_string(), "nixos-24.11".to_string()],
            system: "x86_64-linux".to_string(),
            strategy: Strategy::Hybrid,
            call_timeout_ms: 5_000,
            total_budget_ms: 20_000,
            async_verification: false,
        }
    }
}

/// Cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// In-process cache capacity
    pub memory_max_entries: usize,

    /// In-process entry lifetime
    pub memory_ttl_ms: u64,

    /// Use the durable store (default: true)
    pub durable_enabled: bool,

    /// Durable record lifetime
    pub durable_ttl_ms: u64,

    /// SQLite database path (defaults to the state directory)
    pub durable_path: Option<PathBuf>,
}

impl CacheConfig {
    /// In-process lifetime, clamped so entries never outlive durable records
    pub fn effective_memory_ttl(&self) -> Duration {
        Duration::from_millis(self.memory_ttl_ms.min(self.durable_ttl_ms))
    }

    pub fn durable_ttl(&self) -> Duration {
        Duration::from_millis(self.durable_ttl_ms)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            memory_max_entries: 512,
            memory_ttl_ms: 60 * 60 * 1000,
            durable_enabled: true,
            durable_ttl_ms: 7 * 24 * 60 * 60 * 1000,
            durable_path: None,
        }
    }
}

/// Upstream source configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourcesConfig {
    /// Hub API base URL
    pub nixhub_url: String,

    /// Search backend base URL
    pub search_url: String,

    /// Search index schema version
    pub search_schema_version: u32,

    /// Read-only search credentials
    pub search_username: String,
    pub search_password: String,

    /// Linear backoff step between hub retries
    pub retry_backoff_ms: u64,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            nixhub_url: "https://www.nixhub.io".to_string(),
            search_url: "https://search.nixos.org/backend".to_string(),
            search_schema_version: 44,
            search_username: "aWVSALXpZv".to_string(),
            search_password: "X8gPHnzL52wFEekuxsfQ9cSh".to_string(),
            retry_backoff_ms: 250,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = Config::default();
        let toml = toml::to_string_pretty(&config).unwrap();
        assert!(toml.contains("[resolver]"));
        assert!(toml.contains("strategy = \"hybrid\""));
    }

    #[test]
    fn config_deserializes_empty() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.resolver.system, "x86_64-linux");
        assert_eq!(config.resolver.strategy, Strategy::Hybrid);
    }

    #[test]
    fn config_deserializes_partial() {
        let toml = r#"
            [resolver]
            channels = ["nixos-24.05"]
            strategy = "fallback-only"
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.resolver.channels, vec!["nixos-24.05"]);
        assert_eq!(config.resolver.strategy, Strategy::FallbackOnly);
        assert_eq!(config.cache.memory_max_entries, 512); // default preserved
    }

    #[test]
    fn memory_ttl_clamped_to_durable() {
        let cache = CacheConfig {
            memory_ttl_ms: 10_000,
            durable_ttl_ms: 2_000,
            ..CacheConfig::default()
        };
        assert_eq!(cache.effective_memory_ttl(), Duration::from_millis(2_000));
    }

    #[test]
    fn validate_rejects_empty_channels() {
        let mut config = Config::default();
        config.resolver.channels = vec![" ".to_string()];
        let err = config.validate(Path::new("config.toml")).unwrap_err();
        assert!(err.to_string().contains("channels"));
    }

    #[test]
    fn validate_rejects_zero_budget() {
        let mut config = Config::default();
        config.resolver.total_budget_ms = 0;
        assert!(config.validate(Path::new("config.toml")).is_err());
    }

    #[test]
    fn validate_accepts_defaults() {
        assert!(Config::default().validate(Path::new("config.toml")).is_ok());
    }

    #[test]
    fn strategy_flags() {
        assert!(Strategy::Hybrid.uses_primary() && Strategy::Hybrid.uses_fallback());
        assert!(!Strategy::PrimaryOnly.uses_fallback());
        assert!(!Strategy::FallbackOnly.uses_primary());
    }
}
