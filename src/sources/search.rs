//! Search backend client
//!
//! Queries the Elasticsearch backend behind search.nixos.org. Each channel
//! snapshot lives in an index named `nixos-{schema}-{channel}-{commit}`,
//! reachable through the alias `latest-{schema}-{channel}`, so the commit
//! of every hit can be read off its `_index`.

use super::{check_status, http_client, PackageSearch};
use crate::cancel::CallOptions;
use crate::config::schema::SourcesConfig;
use crate::error::{FlakepinError, FlakepinResult};
use crate::model::SearchHit;
use async_trait::async_trait;
use reqwest::Url;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

const SOURCE: &str = "search";

const ATTRIBUTE_QUERY_SIZE: usize = 50;
const NAME_QUERY_SIZE: usize = 20;

/// Options for a fuzzy name search
#[derive(Debug, Clone, Copy, Default)]
pub struct SearchOptions<'a> {
    /// Restrict to an exact package version
    pub version: Option<&'a str>,
    /// Maximum hits returned
    pub size: Option<usize>,
}

/// Rewrite a channel label into the backend's alias naming.
///
/// `unstable` and `nixpkgs-unstable` become `nixos-unstable`; point releases
/// written as `24.05`, `nixpkgs-24.05` or `release-24.05` become
/// `nixos-24.05`. Unrecognised labels pass through unchanged.
pub fn normalize_channel(channel: &str) -> String {
    let channel = channel.trim();
    let lower = channel.to_ascii_lowercase();

    if matches!(lower.as_str(), "unstable" | "nixpkgs-unstable" | "nixos-unstable") {
        return "nixos-unstable".to_string();
    }

    let release = ["nixos-", "nixpkgs-", "release-"]
        .iter()
        .find_map(|prefix| lower.strip_prefix(prefix))
        .unwrap_or(&lower);

    if is_point_release(release) {
        return format!("nixos-{}", release);
    }

    channel.to_string()
}

/// `YY.MM`, e.g. `24.05`
fn is_point_release(s: &str) -> bool {
    match s.split_once('.') {
        Some((year, month)) => {
            year.len() == 2
                && month.len() == 2
                && year.chars().all(|c| c.is_ascii_digit())
                && month.chars().all(|c| c.is_ascii_digit())
        }
        None => false,
    }
}

/// Extract the 40-hex commit suffix from an index name
pub fn extract_commit(index: &str) -> Option<String> {
    let (_, suffix) = index.rsplit_once('-')?;
    if suffix.len() == 40 && suffix.chars().all(|c| c.is_ascii_hexdigit()) {
        Some(suffix.to_ascii_lowercase())
    } else {
        None
    }
}

#[derive(Deserialize)]
struct RawResponse {
    hits: RawHits,
}

#[derive(Deserialize)]
struct RawHits {
    #[serde(default)]
    hits: Vec<RawHit>,
}

#[derive(Deserialize)]
struct RawHit {
    #[serde(rename = "_index")]
    index: String,
    #[serde(rename = "_score", default)]
    score: Option<f64>,
    #[serde(rename = "_source")]
    source: RawSource,
}

#[derive(Deserialize)]
struct RawSource {
    package_attr_name: Option<String>,
    package_pversion: Option<String>,
    #[serde(default)]
    package_platforms: Vec<String>,
    package_system: Option<String>,
}

/// Validate a search response body into hits
pub fn parse_hits(body: &[u8]) -> FlakepinResult<Vec<SearchHit>> {
    let raw: RawResponse = serde_json::from_slice(body)
        .map_err(|e| FlakepinError::bad_data(SOURCE, e.to_string()))?;

    let hits = raw
        .hits
        .hits
        .into_iter()
        .filter_map(|hit| {
            let Some(attribute_path) = hit.source.package_attr_name.filter(|a| !a.is_empty())
            else {
                debug!("Skipping hit without attribute name in {}", hit.index);
                return None;
            };
            Some(SearchHit {
                attribute_path,
                version: hit.source.package_pversion.filter(|v| !v.is_empty()),
                platforms: hit.source.package_platforms,
                system: hit.source.package_system,
                commit_hash: extract_commit(&hit.index),
                score: hit.score.unwrap_or(0.0),
            })
        })
        .collect();

    Ok(hits)
}

fn package_filter(attribute_path: Option<&str>, version: Option<&str>) -> Vec<Value> {
    let mut filter = vec![json!({ "term": { "type": { "value": "package" } } })];
    if let Some(attr) = attribute_path {
        filter.push(json!({ "term": { "package_attr_name": { "value": attr } } }));
    }
    if let Some(version) = version {
        filter.push(json!({ "term": { "package_pversion": { "value": version } } }));
    }
    filter
}

/// Exact attribute query, optionally pinned to a version
pub fn attribute_query(attribute_path: &str, version: Option<&str>) -> Value {
    json!({
        "from": 0,
        "size": ATTRIBUTE_QUERY_SIZE,
        "query": {
            "bool": {
                "filter": package_filter(Some(attribute_path), version)
            }
        }
    })
}

/// Fuzzy multi-field name query
pub fn name_query(name: &str, options: &SearchOptions<'_>) -> Value {
    json!({
        "from": 0,
        "size": options.size.unwrap_or(NAME_QUERY_SIZE),
        "sort": [{ "_score": "desc" }],
        "query": {
            "bool": {
                "filter": package_filter(None, options.version),
                "must": [{
                    "multi_match": {
                        "query": name,
                        "type": "best_fields",
                        "fuzziness": "AUTO",
                        "fields": [
                            "package_attr_name^9",
                            "package_pname^6",
                            "package_attr_name.edge^2",
                            "package_pname.edge"
                        ]
                    }
                }]
            }
        }
    })
}

/// HTTP client for the search backend
pub struct SearchClient {
    client: reqwest::Client,
    base_url: String,
    schema_version: u32,
    username: String,
    password: String,
}

impl SearchClient {
    pub fn new(
        base_url: &str,
        schema_version: u32,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> FlakepinResult<Self> {
        Ok(Self {
            client: http_client()?,
            base_url: base_url.trim_end_matches('/').to_string(),
            schema_version,
            username: username.into(),
            password: password.into(),
        })
    }

    /// Create a client from the sources configuration
    pub fn from_config(config: &SourcesConfig) -> FlakepinResult<Self> {
        Self::new(
            &config.search_url,
            config.search_schema_version,
            config.search_username.clone(),
            config.search_password.clone(),
        )
    }

    /// `latest-{schema}-{normalized channel}`
    pub fn channel_alias(&self, channel: &str) -> String {
        format!("latest-{}-{}", self.schema_version, normalize_channel(channel))
    }

    fn search_url(&self, channel: &str) -> FlakepinResult<Url> {
        let mut url = Url::parse(&self.base_url).map_err(|e| {
            FlakepinError::Internal(format!("invalid search URL {}: {e}", self.base_url))
        })?;
        url.path_segments_mut()
            .map_err(|_| {
                FlakepinError::Internal(format!("search URL cannot be a base: {}", self.base_url))
            })?
            .pop_if_empty()
            .push(&self.channel_alias(channel))
            .push("_search");
        Ok(url)
    }

    async fn post(&self, url: Url, body: &Value, what: &str) -> FlakepinResult<Vec<SearchHit>> {
        let response = self
            .client
            .post(url)
            .basic_auth(&self.username, Some(&self.password))
            .json(body)
            .send()
            .await
            .map_err(|e| FlakepinError::UpstreamTransport {
                source_name: SOURCE,
                reason: e.to_string(),
            })?;

        check_status(SOURCE, response.status(), what)?;

        let body = response
            .bytes()
            .await
            .map_err(|e| FlakepinError::UpstreamTransport {
                source_name: SOURCE,
                reason: format!("reading body: {e}"),
            })?;

        parse_hits(&body)
    }

    async fn query(
        &self,
        channel: &str,
        body: Value,
        what: &str,
        opts: &CallOptions,
    ) -> FlakepinResult<Vec<SearchHit>> {
        let url = self.search_url(channel)?;
        debug!("Searching {} for {}", url, what);

        opts.run(self.post(url, &body, what))
            .await
            .map_err(|i| i.into_error(SOURCE, opts.timeout()))?
    }
}

#[async_trait]
impl PackageSearch for SearchClient {
    async fn find_by_attribute(
        &self,
        channel: &str,
        attribute_path: &str,
        version: Option<&str>,
        opts: &CallOptions,
    ) -> FlakepinResult<Vec<SearchHit>> {
        let what = format!("attribute {} in {}", attribute_path, channel);
        self.query(channel, attribute_query(attribute_path, version), &what, opts)
            .await
    }

    async fn search_by_name(
        &self,
        channel: &str,
        name: &str,
        options: SearchOptions<'_>,
        opts: &CallOptions,
    ) -> FlakepinResult<Vec<SearchHit>> {
        let what = format!("name {} in {}", name, channel);
        self.query(channel, name_query(name, &options), &what, opts)
            .await
    }

    fn source_name(&self) -> &'static str {
        SOURCE
    }
}
