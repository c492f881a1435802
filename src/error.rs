//! Error types for flakepin
//!
//! All modules use `FlakepinResult<T>` as their return type. Errors that can
//! escape `Resolver::resolve` map onto the closed [`ErrorKind`] taxonomy.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for flakepin operations
pub type FlakepinResult<T> = Result<T, FlakepinError>;

/// Closed failure taxonomy reported to resolution callers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Confirmed absent from every attempted source, or invalid input
    NotFound,
    /// A cancellation fired: per-call timeout, caller cancel or budget
    Timeout,
    /// A source answered 5xx or unparseable data after retries
    Upstream,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::Timeout => "timeout",
            Self::Upstream => "upstream",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// All errors that can occur in flakepin
#[derive(Error, Debug)]
pub enum FlakepinError {
    // Resolution errors
    #[error("Invalid resolve request: {0}")]
    InvalidRequest(String),

    #[error("Package not found: {name}@{version} ({attempts} lookups failed)")]
    NotFound {
        name: String,
        version: String,
        attempts: usize,
    },

    #[error("{source_name} has no entry for {what}")]
    PackageAbsent {
        source_name: &'static str,
        what: String,
    },

    // Upstream errors
    #[error("{source_name} returned HTTP {status}")]
    UpstreamStatus {
        source_name: &'static str,
        status: u16,
    },

    #[error("{source_name} request failed: {reason}")]
    UpstreamTransport {
        source_name: &'static str,
        reason: String,
    },

    #[error("{source_name} returned malformed data: {reason}")]
    BadUpstreamData {
        source_name: &'static str,
        reason: String,
    },

    // Cancellation errors
    #[error("{source_name} request timed out after {timeout_ms}ms")]
    Timeout {
        source_name: &'static str,
        timeout_ms: u64,
    },

    #[error("Resolution budget of {budget_ms}ms exhausted after {elapsed_ms}ms")]
    BudgetExhausted { elapsed_ms: u64, budget_ms: u64 },

    #[error("Resolution cancelled by caller")]
    Cancelled,

    // Durable store errors
    #[error("Resolution store error: {0}")]
    Store(String),

    #[error("Failed to create resolution store indexes: {0}")]
    StoreIndex(String),

    // Configuration errors
    #[error("Invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    #[error("Failed to create config directory {path}: {source}")]
    ConfigDirCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    // General errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl FlakepinError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create a malformed upstream data error
    pub fn bad_data(source_name: &'static str, reason: impl Into<String>) -> Self {
        Self::BadUpstreamData {
            source_name,
            reason: reason.into(),
        }
    }

    /// Map onto the closed failure taxonomy.
    ///
    /// Returns `None` for configuration, IO and store errors, which never
    /// escape a resolve call.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            Self::InvalidRequest(_) | Self::NotFound { .. } | Self::PackageAbsent { .. } => {
                Some(ErrorKind::NotFound)
            }
            Self::Timeout { .. } | Self::BudgetExhausted { .. } | Self::Cancelled => {
                Some(ErrorKind::Timeout)
            }
            Self::UpstreamStatus { .. }
            | Self::UpstreamTransport { .. }
            | Self::BadUpstreamData { .. } => Some(ErrorKind::Upstream),
            _ => None,
        }
    }

    /// True when the caller supplied bad input rather than a source missing it
    pub fn is_caller_error(&self) -> bool {
        matches!(self, Self::InvalidRequest(_))
    }

    /// True for a source's confirmed-absent answer
    pub fn is_absent(&self) -> bool {
        matches!(self, Self::PackageAbsent { .. })
    }

    /// Check if error is retryable within a single client.
    ///
    /// Only 5xx answers and per-attempt timeouts; a transport failure
    /// aborts immediately.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::UpstreamStatus { status, .. } => *status >= 500,
            Self::Timeout { .. } => true,
            _ => false,
        }
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::NotFound { .. } => {
                Some("Check the version exists in nixpkgs, or try another channel with --channel")
            }
            Self::BudgetExhausted { .. } | Self::Timeout { .. } => {
                Some("Raise resolver.total_budget_ms or resolver.call_timeout_ms")
            }
            Self::UpstreamStatus { .. } | Self::UpstreamTransport { .. } => {
                Some("The package index may be degraded; retry later")
            }
            Self::StoreIndex(_) => {
                Some("Remove the resolution database or set cache.durable_enabled = false")
            }
            _ => None,
        }
    }
}
