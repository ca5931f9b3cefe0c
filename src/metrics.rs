use std::sync::Arc;

use prometheus_client::metrics::counter::Counter;
use prometheus_client::registry::Registry;

// ---------------------------------------------------------------------------
// Metrics struct
// ---------------------------------------------------------------------------

/// Central container for every Prometheus metric exposed by the service.
pub struct Metrics {
    // -- proxy load --
    pub local_serves: Counter,
    pub cache_hits: Counter,
    pub cache_misses: Counter,

    // -- outbound --
    pub remote_fetches: Counter,
    pub fetch_errors: Counter,
    pub upstream_errors: Counter,

    // -- file management --
    pub configs_saved: Counter,
    pub assets_downloaded: Counter,
    pub rules_created: Counter,

    // -- cache lifecycle --
    pub epoch_purges: Counter,
}

impl Metrics {
    /// Create a new [`Metrics`] instance and register every metric with the
    /// supplied `registry`.
    pub fn new(registry: &mut Registry) -> Self {
        let local_serves = Counter::default();
        registry.register(
            "boxcache_local_serves_total",
            "Proxy loads answered from the local box directory",
            local_serves.clone(),
        );

        let cache_hits = Counter::default();
        registry.register(
            "boxcache_cache_hits_total",
            "Proxy loads answered from a fresh cache entry",
            cache_hits.clone(),
        );

        let cache_misses = Counter::default();
        registry.register(
            "boxcache_cache_misses_total",
            "Proxy loads that found no fresh cache entry",
            cache_misses.clone(),
        );

        let remote_fetches = Counter::default();
        registry.register(
            "boxcache_remote_fetches_total",
            "Live fetches issued to remote hosts",
            remote_fetches.clone(),
        );

        let fetch_errors = Counter::default();
        registry.register(
            "boxcache_fetch_errors_total",
            "Transport-level fetch failures",
            fetch_errors.clone(),
        );

        let upstream_errors = Counter::default();
        registry.register(
            "boxcache_upstream_errors_total",
            "Fetches that completed with a non-2xx/3xx status",
            upstream_errors.clone(),
        );

        let configs_saved = Counter::default();
        registry.register(
            "boxcache_configs_saved_total",
            "Config files written through save_config",
            configs_saved.clone(),
        );

        let assets_downloaded = Counter::default();
        registry.register(
            "boxcache_assets_downloaded_total",
            "Assets fetched and stored through download_asset",
            assets_downloaded.clone(),
        );

        let rules_created = Counter::default();
        registry.register(
            "boxcache_rules_created_total",
            "Rule files created through create_rule",
            rules_created.clone(),
        );

        let epoch_purges = Counter::default();
        registry.register(
            "boxcache_epoch_purges_total",
            "Whole-directory cache purges triggered by epoch expiry",
            epoch_purges.clone(),
        );

        Self {
            local_serves,
            cache_hits,
            cache_misses,
            remote_fetches,
            fetch_errors,
            upstream_errors,
            configs_saved,
            assets_downloaded,
            rules_created,
            epoch_purges,
        }
    }
}

// ---------------------------------------------------------------------------
// Shared handle
// ---------------------------------------------------------------------------

/// Thread-safe wrapper for the metrics registry, used in [`AppState`].
#[derive(Clone)]
pub struct MetricsRegistry {
    pub registry: Arc<Registry>,
    pub metrics: Arc<Metrics>,
}

impl MetricsRegistry {
    /// Build a fresh registry and pre-register all service metrics.
    pub fn new() -> Self {
        let mut registry = Registry::default();
        let metrics = Metrics::new(&mut registry);
        Self {
            registry: Arc::new(registry),
            metrics: Arc::new(metrics),
        }
    }
}
