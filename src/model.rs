//! Request, result and cache record types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

/// Where a resolution came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResolutionSource {
    /// Hub release metadata
    Primary,
    /// Search backend, exact attribute query
    SearchAttribute,
    /// Search backend, fuzzy name query
    SearchName,
    /// Durable record whose stored provenance is unknown
    DurableCache,
    /// Reserved for background verification
    AsyncVerification,
}

impl ResolutionSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::SearchAttribute => "search-attribute",
            Self::SearchName => "search-name",
            Self::DurableCache => "durable-cache",
            Self::AsyncVerification => "async-verification",
        }
    }

    /// Parse a stored tag; unknown tags map to `DurableCache`
    pub fn from_stored(tag: &str) -> Self {
        match tag {
            "primary" => Self::Primary,
            "search-attribute" => Self::SearchAttribute,
            "search-name" => Self::SearchName,
            "async-verification" => Self::AsyncVerification,
            _ => Self::DurableCache,
        }
    }
}

impl std::fmt::Display for ResolutionSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single resolve call
#[derive(Debug, Clone, Default)]
pub struct ResolveRequest {
    pub name: String,
    pub version: String,

    /// Platform, e.g. `x86_64-linux`; defaults from config
    pub system: Option<String>,

    /// Channels, most preferred first; defaults from config
    pub channels: Option<Vec<String>>,

    /// Caller cancellation
    pub cancel: Option<CancellationToken>,
}

impl ResolveRequest {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            ..Self::default()
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_channels(mut self, channels: Vec<String>) -> Self {
        self.channels = Some(channels);
        self
    }

    pub fn with_cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }
}

/// Coordinates for installing a package from a pinned nixpkgs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolutionResult {
    pub attribute_path: String,
    pub commit_hash: String,
    pub channel: String,
    pub source: ResolutionSource,
    pub from_cache: bool,
}

impl ResolutionResult {
    pub(crate) fn from_entry(entry: CacheEntry, from_cache: bool) -> Self {
        Self {
            attribute_path: entry.attribute_path,
            commit_hash: entry.commit_hash,
            channel: entry.channel,
            source: entry.source,
            from_cache,
        }
    }

    /// Flake reference pinning this package, e.g.
    /// `github:NixOS/nixpkgs/<commit>#htop`
    pub fn flake_ref(&self) -> String {
        format!(
            "github:NixOS/nixpkgs/{}#{}",
            self.commit_hash, self.attribute_path
        )
    }
}

/// Value stored in both cache layers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub attribute_path: String,
    pub commit_hash: String,
    pub channel: String,
    pub source: ResolutionSource,
}

impl CacheEntry {
    /// Build an entry only when both coordinates are present
    pub fn usable(
        attribute_path: Option<&str>,
        commit_hash: Option<&str>,
        channel: &str,
        source: ResolutionSource,
    ) -> Option<Self> {
        let attribute_path = attribute_path.map(str::trim).filter(|s| !s.is_empty())?;
        let commit_hash = commit_hash.map(str::trim).filter(|s| !s.is_empty())?;
        Some(Self {
            attribute_path: attribute_path.to_string(),
            commit_hash: commit_hash.to_string(),
            channel: channel.to_string(),
            source,
        })
    }
}

/// Durable record keyed by (name, version, system, channel)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DurableResolutionRecord {
    pub name: String,
    pub version: String,
    pub system: String,
    pub channel: String,
    pub attribute_path: String,
    pub commit_hash: String,
    pub source: ResolutionSource,
    pub resolved_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl DurableResolutionRecord {
    pub fn entry(&self) -> CacheEntry {
        CacheEntry {
            attribute_path: self.attribute_path.clone(),
            commit_hash: self.commit_hash.clone(),
            channel: self.channel.clone(),
            source: self.source,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// One package hit from the search backend
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub attribute_path: String,
    pub version: Option<String>,
    pub platforms: Vec<String>,
    pub system: Option<String>,
    pub commit_hash: Option<String>,
    pub score: f64,
}
