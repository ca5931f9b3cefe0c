use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub paths: PathsConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub fetch: FetchConfig,
}

// ---------------------------------------------------------------------------
// Server
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Socket address for the HTTP listener (e.g. `0.0.0.0:8089`).
    pub listen: String,
    /// Path segment that marks a URL as addressing our own box directory.
    ///
    /// A `target_url` whose host matches the incoming request and whose path
    /// contains this segment is served from local disk instead of being
    /// fetched or read from cache.
    #[serde(default = "default_local_assets_segment")]
    pub local_assets_segment: String,
}

fn default_local_assets_segment() -> String {
    "/box/".to_string()
}

// ---------------------------------------------------------------------------
// Filesystem layout
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct PathsConfig {
    /// Web root: the broadest directory local-asset URLs may resolve into.
    pub web_root: PathBuf,
    /// Box root: all user-editable rule files and assets live under here.
    pub box_root: PathBuf,
    /// Directory holding default rule templates (`{template_root}/{api}.json`).
    #[serde(default = "default_template_root")]
    pub template_root: PathBuf,
}

fn default_template_root() -> PathBuf {
    PathBuf::from("./Json")
}

// ---------------------------------------------------------------------------
// Cache
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    /// Directory holding cached remote bodies, one `.cache` file per URL.
    #[serde(default = "default_cache_root")]
    pub root: PathBuf,
    /// Seconds before a cache entry (and the cache epoch) goes stale.
    #[serde(default = "default_cache_ttl")]
    pub ttl_secs: u64,
    /// Seconds between background epoch-maintenance sweeps.
    #[serde(default = "default_epoch_check_interval")]
    pub epoch_check_interval_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            root: default_cache_root(),
            ttl_secs: default_cache_ttl(),
            epoch_check_interval_secs: default_epoch_check_interval(),
        }
    }
}

fn default_cache_root() -> PathBuf {
    PathBuf::from("./cache")
}

fn default_cache_ttl() -> u64 {
    3600
}

fn default_epoch_check_interval() -> u64 {
    60
}

// ---------------------------------------------------------------------------
// Outbound fetch
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct FetchConfig {
    /// Default per-request timeout in seconds.
    #[serde(default = "default_fetch_timeout")]
    pub timeout_secs: u64,
    /// Maximum redirect hops to follow.
    #[serde(default = "default_max_redirects")]
    pub max_redirects: usize,
    /// Desktop User-Agent injected when the caller supplies none.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Skip TLS certificate verification on outbound fetches.
    ///
    /// Rule-set hosts are frequently self-signed; the original tool shipped
    /// with verification off and so do we. Flip to `false` to enforce
    /// verification.
    #[serde(default = "bool_true")]
    pub danger_accept_invalid_certs: bool,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_fetch_timeout(),
            max_redirects: default_max_redirects(),
            user_agent: default_user_agent(),
            danger_accept_invalid_certs: true,
        }
    }
}

fn default_fetch_timeout() -> u64 {
    15
}

fn default_max_redirects() -> usize {
    10
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/118.0.0.0 Safari/537.36"
        .to_string()
}

fn bool_true() -> bool {
    true
}

// ---------------------------------------------------------------------------
// Loader
// ---------------------------------------------------------------------------

/// Load and validate a [`Config`] from a YAML file at `path`.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file: {}", path.display()))?;
    let config: Config = serde_yaml::from_str(&contents)
        .with_context(|| format!("failed to parse config file: {}", path.display()))?;
    validate_config(&config)?;
    Ok(config)
}

/// Basic sanity checks that cannot be expressed purely with serde.
fn validate_config(config: &Config) -> Result<()> {
    anyhow::ensure!(
        !config.server.local_assets_segment.is_empty(),
        "local_assets_segment must not be empty"
    );
    anyhow::ensure!(config.cache.ttl_secs > 0, "cache ttl_secs must be positive");
    anyhow::ensure!(
        config.fetch.timeout_secs > 0,
        "fetch timeout_secs must be positive"
    );
    Ok(())
}
