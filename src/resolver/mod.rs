//! Package resolution orchestrator
//!
//! Resolution order for a single call:
//! 1. In-process cache
//! 2. Durable store
//! 3. Hub lookup (unless fallback-only)
//! 4. Search backend, per channel: each attribute candidate, then a fuzzy
//!    name query (unless primary-only)
//!
//! A confirmed miss from one source moves on to the next. Any other
//! upstream failure aborts the call, since the source's state is unknown.

pub mod score;

pub use score::select_best;

use crate::attrs::FamilyRegistry;
use crate::cache::{cache_key, MemoryCache, RecordKey, ResolutionStore, SqliteStore};
use crate::cancel::{Budget, CallOptions};
use crate::config::schema::{Config, ResolverConfig};
use crate::config::ConfigManager;
use crate::error::{FlakepinError, FlakepinResult};
use crate::model::{CacheEntry, ResolutionResult, ResolutionSource, ResolveRequest, SearchHit};
use crate::sources::{NixhubClient, PackageHub, PackageSearch, SearchClient, SearchOptions};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// A validated request with defaults applied
#[derive(Debug)]
struct Query {
    name: String,
    version: String,
    system: String,
    channels: Vec<String>,
    cancel: Option<CancellationToken>,
}

impl Query {
    fn record_key(&self) -> RecordKey {
        RecordKey {
            name: self.name.clone(),
            version: self.version.clone(),
            system: self.system.clone(),
        }
    }
}

/// Resolves (name, version) pairs to pinned nixpkgs coordinates
pub struct Resolver {
    config: ResolverConfig,
    durable_ttl: Duration,
    hub: Arc<dyn PackageHub>,
    search: Arc<dyn PackageSearch>,
    store: Option<Arc<dyn ResolutionStore>>,
    memory: MemoryCache,
    families: FamilyRegistry,
}

impl Resolver {
    /// Wire a resolver from explicit parts.
    ///
    /// Waits for the durable store's indexes once; failing to create them
    /// is fatal. Passing `None` for `store` runs with memory caching only.
    pub async fn new(
        config: &Config,
        hub: Arc<dyn PackageHub>,
        search: Arc<dyn PackageSearch>,
        store: Option<Arc<dyn ResolutionStore>>,
    ) -> FlakepinResult<Self> {
        if let Some(ref store) = store {
            store.ensure_indexes().await?;
        }

        Ok(Self {
            config: config.resolver.clone(),
            durable_ttl: config.cache.durable_ttl(),
            hub,
            search,
            store,
            memory: MemoryCache::new(
                config.cache.memory_max_entries,
                config.cache.effective_memory_ttl(),
            ),
            families: FamilyRegistry::with_builtin(),
        })
    }

    /// Build the HTTP clients and SQLite store described by `config`.
    ///
    /// A store that cannot be opened degrades to memory-only caching.
    pub async fn from_config(config: &Config) -> FlakepinResult<Self> {
        let hub = Arc::new(NixhubClient::from_config(&config.sources)?);
        let search = Arc::new(SearchClient::from_config(&config.sources)?);

        let store: Option<Arc<dyn ResolutionStore>> = if config.cache.durable_enabled {
            let path = config
                .cache
                .durable_path
                .clone()
                .unwrap_or_else(ConfigManager::resolution_db_path);
            match SqliteStore::open(&path) {
                Ok(store) => Some(Arc::new(store)),
                Err(e) => {
                    warn!("Durable cache unavailable, caching in memory only: {}", e);
                    None
                }
            }
        } else {
            debug!("Durable cache disabled");
            None
        };

        Self::new(config, hub, search, store).await
    }

    /// Replace the attribute family registry
    pub fn with_families(mut self, families: FamilyRegistry) -> Self {
        self.families = families;
        self
    }

    /// Whether resolutions are persisted across processes
    pub fn has_durable_store(&self) -> bool {
        self.store.is_some()
    }

    /// Resolve a package to an attribute path and nixpkgs commit
    pub async fn resolve(&self, request: ResolveRequest) -> FlakepinResult<ResolutionResult> {
        let query = self.normalize(request)?;
        let key = cache_key(&query.name, &query.version, &query.system, &query.channels);

        if let Some(entry) = self.memory.get(&key) {
            debug!("Memory cache hit for {}@{}", query.name, query.version);
            return Ok(ResolutionResult::from_entry(entry, true));
        }

        if let Some(entry) = self.durable_lookup(&query).await {
            debug!("Durable cache hit for {}@{}", query.name, query.version);
            self.memory.set(key, entry.clone());
            return Ok(ResolutionResult::from_entry(entry, true));
        }

        let budget = Budget::start(self.config.total_budget());
        let mut misses = Vec::new();

        match self.run_strategies(&query, &budget, &mut misses).await? {
            Some(entry) => {
                info!(
                    "Resolved {}@{} to {} at {} ({}, {}ms)",
                    query.name,
                    query.version,
                    entry.attribute_path,
                    entry.commit_hash,
                    entry.source,
                    budget.elapsed().as_millis()
                );
                self.persist(&query, key, &entry).await;
                Ok(ResolutionResult::from_entry(entry, false))
            }
            None => {
                warn!(
                    "Could not resolve {}@{} after {} lookups: {}",
                    query.name,
                    query.version,
                    misses.len(),
                    misses.join("; ")
                );
                self.schedule_verification(&query);
                Err(FlakepinError::NotFound {
                    name: query.name,
                    version: query.version,
                    attempts: misses.len(),
                })
            }
        }
    }

    fn normalize(&self, request: ResolveRequest) -> FlakepinResult<Query> {
        let name = request.name.trim().to_string();
        let version = request.version.trim().to_string();
        if name.is_empty() {
            return Err(FlakepinError::InvalidRequest("package name is empty".to_string()));
        }
        if version.is_empty() {
            return Err(FlakepinError::InvalidRequest(format!(
                "version for {} is empty",
                name
            )));
        }

        let system = request
            .system
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| self.config.system.clone());

        let clean = |list: &[String]| -> Vec<String> {
            list.iter()
                .map(|c| c.trim().to_string())
                .filter(|c| !c.is_empty())
                .collect()
        };
        let mut channels = request.channels.as_deref().map(clean).unwrap_or_default();
        if channels.is_empty() {
            channels = clean(&self.config.channels);
        }
        if channels.is_empty() {
            return Err(FlakepinError::InvalidRequest("no channels to search".to_string()));
        }

        Ok(Query {
            name,
            version,
            system,
            channels,
            cancel: request.cancel,
        })
    }

    async fn durable_lookup(&self, query: &Query) -> Option<CacheEntry> {
        let store = self.store.as_ref()?;
        match store
            .find_active(&query.record_key(), &query.channels, Utc::now())
            .await
        {
            Ok(record) => record.map(|r| r.entry()),
            Err(e) => {
                warn!("Durable cache lookup failed for {}: {}", query.name, e);
                None
            }
        }
    }

    async fn persist(&self, query: &Query, key: String, entry: &CacheEntry) {
        if let Some(ref store) = self.store {
            if let Err(e) = store
                .upsert(&query.record_key(), entry, self.durable_ttl, Utc::now())
                .await
            {
                warn!("Failed to persist resolution for {}: {}", query.name, e);
            }
        }
        self.memory.set(key, entry.clone());
    }

    async fn run_strategies(
        &self,
        query: &Query,
        budget: &Budget,
        misses: &mut Vec<String>,
    ) -> FlakepinResult<Option<CacheEntry>> {
        let strategy = self.config.strategy;

        if strategy.uses_primary() {
            if let Some(entry) = self.try_primary(query, budget, misses).await? {
                return Ok(Some(entry));
            }
        }

        if strategy.uses_fallback() {
            if let Some(entry) = self.try_fallback(query, budget, misses).await? {
                return Ok(Some(entry));
            }
        }

        Ok(None)
    }

    async fn try_primary(
        &self,
        query: &Query,
        budget: &Budget,
        misses: &mut Vec<String>,
    ) -> FlakepinResult<Option<CacheEntry>> {
        let opts = self.call_options(query, budget)?;
        let result = self.hub.fetch_package(&query.name, &opts).await;
        let what = format!("{} {}", self.hub.source_name(), query.name);
        let Some(package) = absorb(result, budget, what, misses)? else {
            return Ok(None);
        };

        match package.find_release(&query.version, &query.system) {
            Some((attr, commit)) => Ok(CacheEntry::usable(
                Some(&attr),
                Some(&commit),
                &query.channels[0],
                ResolutionSource::Primary,
            )),
            None => {
                misses.push(format!(
                    "{}: no release {} with attribute path and commit",
                    self.hub.source_name(),
                    query.version
                ));
                Ok(None)
            }
        }
    }

    async fn try_fallback(
        &self,
        query: &Query,
        budget: &Budget,
        misses: &mut Vec<String>,
    ) -> FlakepinResult<Option<CacheEntry>> {
        let candidates = self.families.candidates(&query.name, &query.version);
        let source_name = self.search.source_name();

        for channel in &query.channels {
            for attr in &candidates {
                let opts = self.call_options(query, budget)?;
                let result = self
                    .search
                    .find_by_attribute(channel, attr, Some(&query.version), &opts)
                    .await;
                let what = format!("{} attribute {} in {}", source_name, attr, channel);
                let hits = absorb(result, budget, what.clone(), misses)?;
                let answered = hits.is_some();

                let source = ResolutionSource::SearchAttribute;
                if let Some(entry) = self.pick(hits, query, &candidates, channel, source) {
                    return Ok(Some(entry));
                }
                if answered {
                    misses.push(format!("{}: no usable hit", what));
                }
            }

            let opts = self.call_options(query, budget)?;
            let options = SearchOptions {
                version: Some(&query.version),
                size: None,
            };
            let result = self
                .search
                .search_by_name(channel, &query.name, options, &opts)
                .await;
            let what = format!("{} name {} in {}", source_name, query.name, channel);
            let hits = absorb(result, budget, what.clone(), misses)?;
            let answered = hits.is_some();

            let source = ResolutionSource::SearchName;
            if let Some(entry) = self.pick(hits, query, &candidates, channel, source) {
                return Ok(Some(entry));
            }
            if answered {
                misses.push(format!("{}: no usable hit", what));
            }
        }

        Ok(None)
    }

    fn pick(
        &self,
        hits: Option<Vec<SearchHit>>,
        query: &Query,
        candidates: &[String],
        channel: &str,
        source: ResolutionSource,
    ) -> Option<CacheEntry> {
        let hits = hits?;
        let best = select_best(&hits, Some(&query.version), candidates, &query.system)?;
        CacheEntry::usable(
            Some(&best.attribute_path),
            best.commit_hash.as_deref(),
            channel,
            source,
        )
    }

    /// Budget-gated options for the next remote call
    fn call_options(&self, query: &Query, budget: &Budget) -> FlakepinResult<CallOptions> {
        budget.call_options(query.cancel.as_ref(), self.config.call_timeout())
    }

    fn schedule_verification(&self, query: &Query) {
        if !self.config.async_verification {
            return;
        }
        // Reserved hook: nothing verifies misses in the background yet
        debug!(
            "{} requested for {}@{} on {}",
            ResolutionSource::AsyncVerification,
            query.name,
            query.version,
            query.system
        );
    }
}

/// Swallow a source's confirmed miss; every other failure aborts the call.
///
/// A per-call timeout that fired because the total budget ran out is
/// reported as budget exhaustion.
fn absorb<T>(
    result: FlakepinResult<T>,
    budget: &Budget,
    what: String,
    misses: &mut Vec<String>,
) -> FlakepinResult<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(e) if e.is_absent() => {
            debug!("{}: absent", what);
            misses.push(format!("{}: {}", what, e));
            Ok(None)
        }
        Err(e @ FlakepinError::Timeout { .. }) => {
            budget.check()?;
            Err(e)
        }
        Err(e) => Err(e),
    }
}
