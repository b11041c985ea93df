use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::route_finder::IntermediateStrategy;

#[derive(Debug, Deserialize, Clone)]
pub struct Gateway {
    #[serde(default)]
    pub rpc_url: String,
    /// Curve AddressProvider (same address on every chain)
    #[serde(default = "default_address_provider")]
    pub address_provider: String,
    #[serde(default = "default_registry_id")]
    pub registry_id: u64,
    #[serde(default = "default_rate_provider_id")]
    pub rate_provider_id: u64,
    #[serde(default = "default_qps_limit")]
    pub qps_limit: u32,
    /// Parallel registry reads during a pool graph rebuild
    #[serde(default = "default_enumeration_concurrency")]
    pub enumeration_concurrency: usize,
    /// Bound on each pool lookup during a rebuild
    #[serde(default = "default_call_timeout_ms")]
    pub call_timeout_ms: u64,
    /// Bound on listing every pool of the registry
    #[serde(default = "default_enumeration_timeout_seconds")]
    pub enumeration_timeout_seconds: u64,
}

fn default_address_provider() -> String {
    "0x5ffe7FB82894076ECB99A30D6A32e969e6e35E98".to_string()
}
fn default_registry_id() -> u64 {
    0
}
fn default_rate_provider_id() -> u64 {
    7
}
fn default_qps_limit() -> u32 {
    25
}
fn default_enumeration_concurrency() -> usize {
    8
}
fn default_call_timeout_ms() -> u64 {
    2000
}
fn default_enumeration_timeout_seconds() -> u64 {
    600 // a full registry scan is thousands of rate-limited reads
}

impl Default for Gateway {
    fn default() -> Self {
        Self {
            rpc_url: String::new(),
            address_provider: default_address_provider(),
            registry_id: default_registry_id(),
            rate_provider_id: default_rate_provider_id(),
            qps_limit: default_qps_limit(),
            enumeration_concurrency: default_enumeration_concurrency(),
            call_timeout_ms: default_call_timeout_ms(),
            enumeration_timeout_seconds: default_enumeration_timeout_seconds(),
        }
    }
}

impl Gateway {
    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }

    pub fn enumeration_timeout(&self) -> Duration {
        Duration::from_secs(self.enumeration_timeout_seconds)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct CacheSettings {
    #[serde(default = "default_cache_dir")]
    pub dir: PathBuf,
    #[serde(default = "default_pool_graph_file")]
    pub pool_graph_file: String,
    #[serde(default = "default_route_file")]
    pub route_file: String,
    #[serde(default = "default_ttl_seconds")]
    pub pool_graph_ttl_seconds: u64,
    #[serde(default = "default_ttl_seconds")]
    pub route_ttl_seconds: u64,
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from(".")
}
fn default_pool_graph_file() -> String {
    "pool_graph_cache.json".to_string()
}
fn default_route_file() -> String {
    "route_cache.json".to_string()
}
fn default_ttl_seconds() -> u64 {
    3600 // 1 hour
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            dir: default_cache_dir(),
            pool_graph_file: default_pool_graph_file(),
            route_file: default_route_file(),
            pool_graph_ttl_seconds: default_ttl_seconds(),
            route_ttl_seconds: default_ttl_seconds(),
        }
    }
}

impl CacheSettings {
    pub fn pool_graph_ttl(&self) -> Duration {
        Duration::from_secs(self.pool_graph_ttl_seconds)
    }

    pub fn route_ttl(&self) -> Duration {
        Duration::from_secs(self.route_ttl_seconds)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct Routing {
    #[serde(default = "default_max_hops")]
    pub max_hops: usize,
    #[serde(default)]
    pub intermediate_strategy: IntermediateStrategy,
    /// 3-hop search is skipped above this many intermediate candidates
    #[serde(default = "default_max_three_hop_candidates")]
    pub max_three_hop_candidates: usize,
    /// Routes simulated concurrently; 0 means "same as quoting.max_workers"
    #[serde(default)]
    pub route_concurrency: usize,
}

fn default_max_hops() -> usize {
    3
}
fn default_max_three_hop_candidates() -> usize {
    64
}

impl Default for Routing {
    fn default() -> Self {
        Self {
            max_hops: default_max_hops(),
            intermediate_strategy: IntermediateStrategy::default(),
            max_three_hop_candidates: default_max_three_hop_candidates(),
            route_concurrency: 0,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct Quoting {
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
}

fn default_max_workers() -> usize {
    20
}
fn default_timeout_ms() -> u64 {
    2000
}
fn default_max_retries() -> u32 {
    3
}
fn default_backoff_base_ms() -> u64 {
    500
}

impl Default for Quoting {
    fn default() -> Self {
        Self {
            max_workers: default_max_workers(),
            timeout_ms: default_timeout_ms(),
            max_retries: default_max_retries(),
            backoff_base_ms: default_backoff_base_ms(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LogSettings {
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Settings {
    #[serde(default)]
    pub gateway: Gateway,
    #[serde(default)]
    pub cache: CacheSettings,
    #[serde(default)]
    pub routing: Routing,
    #[serde(default)]
    pub quoting: Quoting,
    #[serde(default)]
    pub log: LogSettings,
}

impl Settings {
    /// Loads `Config.toml` from the working directory.
    pub fn new() -> Result<Self, ConfigError> {
        Self::from_file("Config.toml")
    }

    /// Loads settings from `path` (optional file), then applies
    /// `ROUTER__SECTION__KEY` environment overrides and the short-hand
    /// `ROUTER_RPC_URL` / `ROUTER_CACHE_DIR` variables.
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let s = Config::builder()
            .add_source(File::with_name(path).required(false))
            .add_source(Environment::with_prefix("ROUTER").prefix_separator("__").separator("__"))
            .build()?;

        let mut settings: Self = s.try_deserialize()?;

        if let Ok(url) = env::var("ROUTER_RPC_URL") {
            let trimmed = url.trim();
            if !trimmed.is_empty() {
                settings.gateway.rpc_url = trimmed.to_string();
            }
        }
        if let Ok(dir) = env::var("ROUTER_CACHE_DIR") {
            let trimmed = dir.trim();
            if !trimmed.is_empty() {
                settings.cache.dir = PathBuf::from(trimmed);
            }
        }

        Ok(settings)
    }

    pub fn quote_timeout(&self) -> Duration {
        Duration::from_millis(self.quoting.timeout_ms)
    }

    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.quoting.backoff_base_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_documented_values() {
        let settings = Settings::default();
        assert_eq!(settings.cache.pool_graph_ttl(), Duration::from_secs(3600));
        assert_eq!(settings.cache.route_ttl(), Duration::from_secs(3600));
        assert_eq!(settings.routing.max_hops, 3);
        assert_eq!(settings.routing.intermediate_strategy, IntermediateStrategy::Union);
        assert_eq!(settings.quoting.max_workers, 20);
        assert_eq!(settings.quote_timeout(), Duration::from_secs(2));
        assert_eq!(settings.quoting.max_retries, 3);
        assert_eq!(settings.backoff_base(), Duration::from_millis(500));
        assert_eq!(settings.gateway.rate_provider_id, 7);
        assert_eq!(settings.gateway.call_timeout(), Duration::from_secs(2));
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("router.toml");
        std::fs::write(
            &path,
            "[routing]\nmax_hops = 2\nintermediate_strategy = \"input_reachable\"\n\n[quoting]\nmax_workers = 4\n",
        )
        .unwrap();

        let settings = Settings::from_file(path.to_str().unwrap()).unwrap();
        assert_eq!(settings.routing.max_hops, 2);
        assert_eq!(settings.routing.intermediate_strategy, IntermediateStrategy::InputReachable);
        assert_eq!(settings.quoting.max_workers, 4);
        assert_eq!(settings.quoting.timeout_ms, 2000);
        assert_eq!(settings.cache.pool_graph_file, "pool_graph_cache.json");
    }
}
