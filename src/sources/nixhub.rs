//! Hub API client
//!
//! Fetches release metadata from a nixhub-style API:
//! `GET {base}/packages/{name}?_data=routes%2F_nixhub.packages.%24pkg._index`

use super::{check_status, http_client, PackageHub};
use crate::cancel::{CallOptions, Interrupt};
use crate::config::schema::SourcesConfig;
use crate::error::{FlakepinError, FlakepinResult};
use async_trait::async_trait;
use reqwest::Url;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

const SOURCE: &str = "nixhub";

/// Route marker the hub expects to return JSON instead of HTML
const ROUTE_MARKER: &str = "routes/_nixhub.packages.$pkg._index";

const DEFAULT_ATTEMPTS: u32 = 3;

/// Validated hub package
#[derive(Debug, Clone, PartialEq)]
pub struct PrimaryPackage {
    pub name: String,
    pub releases: Vec<PrimaryRelease>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PrimaryRelease {
    pub version: String,
    pub commit_hash: Option<String>,
    pub platforms: Vec<PrimaryPlatform>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PrimaryPlatform {
    pub system: Option<String>,
    pub attribute_path: Option<String>,
    pub commit_hash: Option<String>,
}

impl PrimaryPackage {
    /// Attribute path and commit for an exact version.
    ///
    /// Prefers the platform built for `system`, then any platform. The
    /// platform's commit wins over the release-level commit. Returns `None`
    /// when the release is missing or lacks either coordinate.
    pub fn find_release(&self, version: &str, system: &str) -> Option<(String, String)> {
        let release = self.releases.iter().find(|r| r.version == version)?;

        let usable = |p: &PrimaryPlatform| {
            let attr = non_empty(p.attribute_path.as_deref())?;
            let commit = non_empty(p.commit_hash.as_deref())
                .or_else(|| non_empty(release.commit_hash.as_deref()))?;
            Some((attr.to_string(), commit.to_string()))
        };

        release
            .platforms
            .iter()
            .filter(|p| p.system.as_deref() == Some(system))
            .find_map(usable)
            .or_else(|| release.platforms.iter().find_map(usable))
    }
}

fn non_empty(s: Option<&str>) -> Option<&str> {
    s.map(str::trim).filter(|s| !s.is_empty())
}

#[derive(Deserialize)]
struct RawPackage {
    name: Option<String>,
    releases: Option<Vec<RawRelease>>,
}

#[derive(Deserialize)]
struct RawRelease {
    version: Option<String>,
    commit_hash: Option<String>,
    platforms: Option<Vec<RawPlatform>>,
}

#[derive(Deserialize)]
struct RawPlatform {
    system: Option<String>,
    attribute_path: Option<String>,
    commit_hash: Option<String>,
}

/// Validate a hub response body into a typed package
pub fn parse_package(body: &[u8]) -> FlakepinResult<PrimaryPackage> {
    let raw: RawPackage = serde_json::from_slice(body)
        .map_err(|e| FlakepinError::bad_data(SOURCE, e.to_string()))?;

    let name = non_empty(raw.name.as_deref())
        .ok_or_else(|| FlakepinError::bad_data(SOURCE, "package has no name"))?
        .to_string();

    let mut releases = Vec::new();
    for (idx, release) in raw.releases.unwrap_or_default().into_iter().enumerate() {
        let version = non_empty(release.version.as_deref())
            .ok_or_else(|| {
                let reason = format!("release {} of {} has no version", idx, name);
                FlakepinError::bad_data(SOURCE, reason)
            })?
            .to_string();

        let platforms = release
            .platforms
            .unwrap_or_default()
            .into_iter()
            .map(|p| PrimaryPlatform {
                system: p.system,
                attribute_path: p.attribute_path,
                commit_hash: p.commit_hash,
            })
            .collect();

        releases.push(PrimaryRelease {
            version,
            commit_hash: release.commit_hash,
            platforms,
        });
    }

    Ok(PrimaryPackage { name, releases })
}

/// HTTP client for the hub API
pub struct NixhubClient {
    client: reqwest::Client,
    base_url: String,
    max_attempts: u32,
    backoff: Duration,
}

impl NixhubClient {
    /// Create a client for `base_url` with default retry settings
    pub fn new(base_url: &str) -> FlakepinResult<Self> {
        Ok(Self {
            client: http_client()?,
            base_url: base_url.trim_end_matches('/').to_string(),
            max_attempts: DEFAULT_ATTEMPTS,
            backoff: Duration::from_millis(250),
        })
    }

    /// Create a client from the sources configuration
    pub fn from_config(config: &SourcesConfig) -> FlakepinResult<Self> {
        Ok(Self::new(&config.nixhub_url)?
            .with_retry(DEFAULT_ATTEMPTS, Duration::from_millis(config.retry_backoff_ms)))
    }

    /// Override attempt count and linear backoff step
    pub fn with_retry(mut self, max_attempts: u32, backoff: Duration) -> Self {
        self.max_attempts = max_attempts.max(1);
        self.backoff = backoff;
        self
    }

    fn package_url(&self, name: &str) -> FlakepinResult<Url> {
        let base = &self.base_url;
        let mut url = Url::parse(base)
            .map_err(|e| FlakepinError::Internal(format!("invalid hub URL {base}: {e}")))?;
        url.path_segments_mut()
            .map_err(|_| FlakepinError::Internal(format!("hub URL cannot be a base: {base}")))?
            .pop_if_empty()
            .push("packages")
            .push(name);
        url.query_pairs_mut().append_pair("_data", ROUTE_MARKER);
        Ok(url)
    }

    async fn fetch_once(&self, url: Url, name: &str) -> FlakepinResult<PrimaryPackage> {
        let response = self
            .client
            .get(url)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| FlakepinError::UpstreamTransport {
                source_name: SOURCE,
                reason: e.to_string(),
            })?;

        check_status(SOURCE, response.status(), name)?;

        let body = response
            .bytes()
            .await
            .map_err(|e| FlakepinError::UpstreamTransport {
                source_name: SOURCE,
                reason: format!("reading body: {e}"),
            })?;

        parse_package(&body)
    }
}

#[async_trait]
impl PackageHub for NixhubClient {
    async fn fetch_package(
        &self,
        name: &str,
        opts: &CallOptions,
    ) -> FlakepinResult<PrimaryPackage> {
        let url = self.package_url(name)?;
        let mut last_err = None;

        for attempt in 1..=self.max_attempts {
            let attempt_opts = opts.attempt();
            if attempt > 1 && attempt_opts.timeout().is_zero() {
                debug!("Deadline reached, not retrying {}", name);
                break;
            }
            debug!(
                "Fetching {} from hub (attempt {}/{})",
                name, attempt, self.max_attempts
            );

            let err = match attempt_opts.run(self.fetch_once(url.clone(), name)).await {
                Ok(Ok(package)) => return Ok(package),
                Ok(Err(e)) if e.is_retryable() => e,
                Ok(Err(e)) => return Err(e),
                Err(interrupt @ Interrupt::Cancelled) => {
                    return Err(interrupt.into_error(SOURCE, attempt_opts.timeout()))
                }
                Err(interrupt @ Interrupt::TimedOut) => {
                    interrupt.into_error(SOURCE, attempt_opts.timeout())
                }
            };

            warn!("Hub request for {} failed: {}", name, err);
            last_err = Some(err);

            if attempt < self.max_attempts {
                opts.pause(self.backoff * attempt)
                    .await
                    .map_err(|i| i.into_error(SOURCE, opts.timeout()))?;
            }
        }

        Err(last_err
            .unwrap_or_else(|| FlakepinError::Internal("no hub attempts made".to_string())))
    }

    fn source_name(&self) -> &'static str {
        SOURCE
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;

    fn client(server: &MockServer) -> NixhubClient {
        NixhubClient::new(&server.base_url())
            .unwrap()
            .with_retry(3, Duration::from_millis(1))
    }

    fn opts() -> CallOptions {
        CallOptions::new(None, Duration::from_secs(5))
    }

    fn htop_body() -> serde_json::Value {
        json!({
            "name": "htop",
            "releases": [{
                "version": "3.2.1",
                "platforms": [{
                    "system": "x86_64-linux",
                    "attribute_path": "pkgs.htop",
                    "commit_hash": "a".repeat(40)
                }]
            }]
        })
    }

    #[test]
    fn parse_validates_name() {
        let err = parse_package(br#"{"releases": []}"#).unwrap_err();
        assert!(matches!(err, FlakepinError::BadUpstreamData { .. }));
    }

    #[test]
    fn parse_rejects_non_json() {
        let err = parse_package(b"<html>").unwrap_err();
        assert!(matches!(err, FlakepinError::BadUpstreamData { .. }));
    }

    #[test]
    fn parse_rejects_release_without_version() {
        let err = parse_package(br#"{"name": "htop", "releases": [{"commit_hash": "abc"}]}"#)
            .unwrap_err();
        assert!(err.to_string().contains("no version"));
    }

    #[test]
    fn parse_tolerates_missing_releases() {
        let pkg = parse_package(br#"{"name": "htop"}"#).unwrap();
        assert!(pkg.releases.is_empty());
    }

    #[test]
    fn find_release_prefers_matching_system() {
        let pkg = parse_package(
            json!({
                "name": "jq",
                "releases": [{
                    "version": "1.7.1",
                    "commit_hash": "r".repeat(40),
                    "platforms": [
                        {"system": "aarch64-darwin", "attribute_path": "jq-darwin"},
                        {"system": "x86_64-linux", "attribute_path": "jq"}
                    ]
                }]
            })
            .to_string()
            .as_bytes(),
        )
        .unwrap();

        let (attr, commit) = pkg.find_release("1.7.1", "x86_64-linux").unwrap();
        assert_eq!(attr, "jq");
        assert_eq!(commit, "r".repeat(40));

        let (attr, _) = pkg.find_release("1.7.1", "riscv64-linux").unwrap();
        assert_eq!(attr, "jq-darwin");
    }

    #[test]
    fn find_release_requires_commit() {
        let pkg = parse_package(
            br#"{"name": "htop", "releases": [{"version": "3.2.1", "platforms": [{"attribute_path": "htop"}]}]}"#,
        )
        .unwrap();
        assert!(pkg.find_release("3.2.1", "x86_64-linux").is_none());
        assert!(pkg.find_release("9.9.9", "x86_64-linux").is_none());
    }

    #[tokio::test]
    async fn fetches_and_validates() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/packages/htop")
                    .query_param_exists("_data");
                then.status(200).json_body(htop_body());
            })
            .await;

        let pkg = client(&server).fetch_package("htop", &opts()).await.unwrap();
        assert_eq!(pkg.name, "htop");
        let (attr, commit) = pkg.find_release("3.2.1", "x86_64-linux").unwrap();
        assert_eq!(attr, "pkgs.htop");
        assert_eq!(commit, "a".repeat(40));
        mock.assert_hits_async(1).await;
    }

    #[tokio::test]
    async fn not_found_is_absent_without_retry() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET).path("/packages/missing");
                then.status(404);
            })
            .await;

        let err = client(&server)
            .fetch_package("missing", &opts())
            .await
            .unwrap_err();
        assert!(err.is_absent());
        mock.assert_hits_async(1).await;
    }

    #[tokio::test]
    async fn retries_server_errors_then_gives_up() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET).path("/packages/htop");
                then.status(503);
            })
            .await;

        let err = client(&server).fetch_package("htop", &opts()).await.unwrap_err();
        assert!(matches!(err, FlakepinError::UpstreamStatus { status: 503, .. }));
        mock.assert_hits_async(3).await;
    }

    #[tokio::test]
    async fn client_errors_not_retried() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET).path("/packages/htop");
                then.status(400);
            })
            .await;

        let err = client(&server).fetch_package("htop", &opts()).await.unwrap_err();
        assert!(matches!(err, FlakepinError::UpstreamStatus { status: 400, .. }));
        mock.assert_hits_async(1).await;
    }

    #[tokio::test]
    async fn malformed_body_is_bad_data() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/packages/htop");
                then.status(200).body("{\"releases\": 12}");
            })
            .await;

        let err = client(&server).fetch_package("htop", &opts()).await.unwrap_err();
        assert!(matches!(err, FlakepinError::BadUpstreamData { .. }));
    }

    #[tokio::test]
    async fn per_attempt_timeout_retries_then_times_out() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/packages/htop");
                then.status(200)
                    .json_body(htop_body())
                    .delay(Duration::from_millis(500));
            })
            .await;

        let opts = CallOptions::new(None, Duration::from_millis(50));
        let err = client(&server).fetch_package("htop", &opts).await.unwrap_err();
        assert!(matches!(err, FlakepinError::Timeout { source_name: "nixhub", .. }));
    }

    #[tokio::test]
    async fn deadline_stops_retries() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/packages/htop");
                then.status(200)
                    .json_body(htop_body())
                    .delay(Duration::from_millis(500));
            })
            .await;

        let opts = CallOptions::new(None, Duration::from_secs(5))
            .with_deadline(std::time::Instant::now() + Duration::from_millis(100));
        let started = std::time::Instant::now();
        let err = client(&server).fetch_package("htop", &opts).await.unwrap_err();

        assert!(matches!(err, FlakepinError::Timeout { .. }));
        assert!(started.elapsed() < Duration::from_millis(400));
    }

    #[tokio::test]
    async fn transport_errors_not_retried() {
        // Nothing listens on the discard port
        let client = NixhubClient::new("http://127.0.0.1:9")
            .unwrap()
            .with_retry(3, Duration::from_secs(2));

        let started = std::time::Instant::now();
        let err = client.fetch_package("htop", &opts()).await.unwrap_err();

        assert!(matches!(err, FlakepinError::UpstreamTransport { .. }));
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn caller_cancel_stops_retries() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/packages/htop");
                then.status(503);
            })
            .await;

        let caller = tokio_util::sync::CancellationToken::new();
        caller.cancel();
        let opts = CallOptions::new(Some(&caller), Duration::from_secs(5));

        let err = client(&server).fetch_package("htop", &opts).await.unwrap_err();
        assert!(matches!(err, FlakepinError::Cancelled));
    }

    #[test]
    fn url_encodes_name_and_marker() {
        let client = NixhubClient::new("https://www.nixhub.io/").unwrap();
        let url = client.package_url("python3 full").unwrap();
        assert_eq!(
            url.as_str(),
            "https://www.nixhub.io/packages/python3%20full?_data=routes%2F_nixhub.packages.%24pkg._index"
        );
    }
}
