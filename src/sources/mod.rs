//! Upstream package sources
//!
//! Two independent sources can pin a package:
//! - the hub API, which lists releases with per-platform attribute paths
//!   and commits
//! - the search backend, which indexes each channel snapshot and encodes
//!   the snapshot's commit in its index name

pub mod nixhub;
pub mod search;

pub use nixhub::{NixhubClient, PrimaryPackage, PrimaryPlatform, PrimaryRelease};
pub use search::{normalize_channel, SearchClient, SearchOptions};

use crate::cancel::CallOptions;
use crate::error::FlakepinResult;
use crate::model::SearchHit;
use async_trait::async_trait;

/// Release metadata lookup by package name
#[async_trait]
pub trait PackageHub: Send + Sync {
    /// Fetch every known release of `name`.
    ///
    /// Returns `PackageAbsent` on a confirmed miss, `BadUpstreamData` when
    /// the body fails validation.
    async fn fetch_package(&self, name: &str, opts: &CallOptions)
        -> FlakepinResult<PrimaryPackage>;

    /// Human-readable source name for logs
    fn source_name(&self) -> &'static str;
}

/// Structured search over channel snapshots
#[async_trait]
pub trait PackageSearch: Send + Sync {
    /// Packages whose attribute name is exactly `attribute_path`
    async fn find_by_attribute(
        &self,
        channel: &str,
        attribute_path: &str,
        version: Option<&str>,
        opts: &CallOptions,
    ) -> FlakepinResult<Vec<SearchHit>>;

    /// Fuzzy match on package and attribute names
    async fn search_by_name(
        &self,
        channel: &str,
        name: &str,
        options: SearchOptions<'_>,
        opts: &CallOptions,
    ) -> FlakepinResult<Vec<SearchHit>>;

    /// Human-readable source name for logs
    fn source_name(&self) -> &'static str;
}

/// Shared HTTP status classification
pub(crate) fn check_status(
    source_name: &'static str,
    status: reqwest::StatusCode,
    what: &str,
) -> FlakepinResult<()> {
    use crate::error::FlakepinError;

    if status.is_success() {
        return Ok(());
    }
    if status == reqwest::StatusCode::NOT_FOUND {
        return Err(FlakepinError::PackageAbsent {
            source_name,
            what: what.to_string(),
        });
    }
    Err(FlakepinError::UpstreamStatus {
        source_name,
        status: status.as_u16(),
    })
}

/// Build the shared reqwest client
pub(crate) fn http_client() -> FlakepinResult<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(concat!("flakepin/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| {
            crate::error::FlakepinError::Internal(format!("Failed to create HTTP client: {e}"))
        })
}
