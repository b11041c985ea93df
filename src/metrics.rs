// src/metrics.rs

#[cfg(feature = "observability")]
pub use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram, Unit};

// NOTE: When observability feature is disabled, provide stub implementations
#[cfg(not(feature = "observability"))]
pub enum Unit {
    Count,
    Seconds,
}

#[cfg(not(feature = "observability"))]
#[macro_export]
macro_rules! counter {
    ($name:expr, $value:expr $(, $label:expr => $label_value:expr)* $(,)?) => {{
        let _ = &$value;
        $(let _ = &$label_value;)*
    }};
}

#[cfg(not(feature = "observability"))]
#[macro_export]
macro_rules! gauge {
    ($name:expr, $value:expr $(, $label:expr => $label_value:expr)* $(,)?) => {{
        let _ = &$value;
        $(let _ = &$label_value;)*
    }};
}

#[cfg(not(feature = "observability"))]
#[macro_export]
macro_rules! histogram {
    ($name:expr, $value:expr $(, $label:expr => $label_value:expr)* $(,)?) => {{
        let _ = &$value;
        $(let _ = &$label_value;)*
    }};
}

#[cfg(not(feature = "observability"))]
#[macro_export]
macro_rules! describe_counter {
    ($name:expr, $unit:expr, $desc:expr) => {{
        let _ = $unit;
    }};
}

#[cfg(not(feature = "observability"))]
#[macro_export]
macro_rules! describe_gauge {
    ($name:expr, $desc:expr) => {};
}

#[cfg(not(feature = "observability"))]
#[macro_export]
macro_rules! describe_histogram {
    ($name:expr, $unit:expr, $desc:expr) => {{
        let _ = $unit;
    }};
}

#[cfg(not(feature = "observability"))]
use crate::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};

use std::time::Duration;

/// Initializes the descriptions for all the metrics in the crate.
/// This should be called once at startup.
pub fn describe_metrics() {
    describe_counter!("router_cache_hits_total", Unit::Count, "Cache reads served from a fresh entry, by cache.");
    describe_counter!("router_cache_miss_total", Unit::Count, "Cache reads that had to rebuild, by cache.");
    describe_gauge!("router_cache_size_gauge", "Entries in each cache (pools for the graph, pairs for routes).");
    describe_histogram!(
        "router_pool_graph_rebuild_seconds",
        Unit::Seconds,
        "Wall time of a full pool graph rebuild."
    );
    describe_counter!(
        "router_pool_graph_failed_pools_total",
        Unit::Count,
        "Pools skipped during a rebuild because the gateway failed for them."
    );
    describe_counter!(
        "router_quote_outcomes_total",
        Unit::Count,
        "Hop quote outcomes: quoted, no_liquidity, exhausted, timeout, failed."
    );
    describe_counter!(
        "router_quote_attempt_failures_total",
        Unit::Count,
        "Failed gateway quote attempts, by failure kind."
    );
    describe_histogram!("router_route_search_seconds", Unit::Seconds, "Latency of find_best_route.");
    describe_counter!("router_routes_evaluated_total", Unit::Count, "Routes simulated, by result (ok, failed).");
}

pub fn increment_cache_hit(cache_name: &'static str) {
    counter!("router_cache_hits_total", 1, "cache" => cache_name);
}

pub fn increment_cache_miss(cache_name: &'static str) {
    counter!("router_cache_miss_total", 1, "cache" => cache_name);
}

pub fn set_cache_size(cache_name: &'static str, size: usize) {
    gauge!("router_cache_size_gauge", size as f64, "cache" => cache_name);
}

pub fn record_pool_graph_rebuild(duration: Duration, failed_pools: usize) {
    histogram!("router_pool_graph_rebuild_seconds", duration.as_secs_f64());
    counter!("router_pool_graph_failed_pools_total", failed_pools as u64);
}

pub fn increment_quote_outcome(outcome: &'static str) {
    counter!("router_quote_outcomes_total", 1, "outcome" => outcome);
}

pub fn increment_quote_attempt_failure(kind: &'static str) {
    counter!("router_quote_attempt_failures_total", 1, "kind" => kind);
}

pub fn record_route_search(duration: Duration, evaluated_ok: usize, evaluated_failed: usize) {
    histogram!("router_route_search_seconds", duration.as_secs_f64());
    counter!("router_routes_evaluated_total", evaluated_ok as u64, "result" => "ok");
    counter!("router_routes_evaluated_total", evaluated_failed as u64, "result" => "failed");
}
