//! # Find Route
//!
//! Command-line front end: connects to the Curve registry, finds the best
//! route for one swap and prints it.
//!
//! ## Usage
//!
//! ```bash
//! ROUTER_RPC_URL=https://... cargo run --bin find_route -- \
//!     --token-in 0xaf88d065e77c8cC2239327C5EDb3A432268e5831 \
//!     --token-out 0xFd086bC7CD5C481DCC9C85ebE478A1C0b69FCbb9 \
//!     --amount 1000000
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use ethers::types::U256;
use liquidity_router::adapters::CurveGateway;
use liquidity_router::settings::Settings;
use liquidity_router::{BestRoute, Router};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "find_route")]
#[command(about = "Find the best multi-hop route for a swap", long_about = None)]
struct Args {
    /// Input token address
    #[arg(long)]
    token_in: String,

    /// Output token address
    #[arg(long)]
    token_out: String,

    /// Input amount in raw token units (no decimals)
    #[arg(long)]
    amount: String,

    /// Override routing.max_hops
    #[arg(long)]
    max_hops: Option<usize>,

    /// Rebuild the pool graph before routing
    #[arg(long)]
    refresh: bool,

    /// Configuration file
    #[arg(long, default_value = "Config.toml")]
    config: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let args = Args::parse();

    let mut settings = Settings::from_file(&args.config).context("failed to load settings")?;
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(settings.log.level.as_str())).init();

    #[cfg(feature = "observability")]
    {
        // spans from find_best_route; log records keep going to env_logger
        let _ = tracing_subscriber::fmt().json().with_target(false).try_init();
        if let Err(e) = metrics_exporter_prometheus::PrometheusBuilder::new().install() {
            log::warn!("⚠️ Prometheus exporter not installed: {}", e);
        }
        liquidity_router::metrics::describe_metrics();
    }

    if let Some(max_hops) = args.max_hops {
        settings.routing.max_hops = max_hops;
    }
    let amount = U256::from_dec_str(args.amount.trim()).context("--amount must be a decimal integer")?;

    let gateway = Arc::new(CurveGateway::connect(&settings.gateway).await?);
    let router = Router::from_settings(gateway, &settings);

    if args.refresh {
        let stats = router.refresh().await?;
        println!(
            "Pool graph rebuilt: {} pools indexed, {} failed",
            stats.indexed, stats.failed
        );
    }

    match router.find_best_route_str(&args.token_in, &args.token_out, amount).await? {
        Some(best) => print_route(&best),
        None => println!("{}", "No route found".yellow().bold()),
    }
    Ok(())
}

fn print_route(best: &BestRoute) {
    println!("{}", "=".repeat(80));
    println!(
        "{} {} -> {}",
        "Best route:".green().bold(),
        best.best.amount_in,
        best.best.amount_out.to_string().green()
    );
    for (i, hop) in best.best.hops.iter().enumerate() {
        println!(
            "  {}. {:?} -> {:?} via {:?} ({}{}) {} -> {}",
            i + 1,
            hop.token_in,
            hop.token_out,
            hop.pool,
            hop.pool_kind,
            if hop.is_underlying { ", underlying" } else { "" },
            hop.amount_in,
            hop.amount_out
        );
    }
    println!("{}", "=".repeat(80));
    println!("Evaluated {} priced routes", best.all.len());
    for (i, route) in best.all.iter().enumerate() {
        println!("  #{} {} hops -> {}", i + 1, route.hops.len(), route.amount_out);
    }
}
