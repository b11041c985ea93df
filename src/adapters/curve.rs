use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use ethers::prelude::*;
use futures::stream::{self, StreamExt};
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use log::{debug, info, warn};
use std::num::NonZeroU32;
use std::sync::Arc;

use crate::contracts::{ICurveAddressProvider, ICurveRateProvider, ICurveRegistry};
use crate::error::GatewayError;
use crate::gateway::{PoolTokens, PricingGateway};
use crate::settings;
use crate::types::conversions::{string_to_address, NULL_ADDRESS};
use crate::types::{Amount, PoolId, PoolKind, QuoteCandidate, Token};

type DefaultDirectRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Local cap on registry slots read per scan. The registry itself reports
/// its full pool_count.
const MAX_POOLS: u64 = 10_000;

/// Gateway over Curve's on-chain registry and rate provider.
///
/// Both contracts are resolved through the AddressProvider once, at
/// construction; every later call is a plain `eth_call` behind a shared
/// rate limiter.
pub struct CurveGateway<M> {
    registry: ICurveRegistry<M>,
    rate_provider: ICurveRateProvider<M>,
    limiter: Arc<DefaultDirectRateLimiter>,
    enumeration_concurrency: usize,
}

impl CurveGateway<Provider<Http>> {
    /// Connects over HTTP using the gateway settings.
    ///
    /// # Errors
    ///
    /// Fails when the RPC URL is missing or invalid, or when the registry or
    /// rate provider cannot be resolved. Both are startup failures.
    pub async fn connect(config: &settings::Gateway) -> Result<Self> {
        if config.rpc_url.trim().is_empty() {
            return Err(anyhow!("gateway.rpc_url is not set (or ROUTER_RPC_URL)"));
        }
        let provider = Provider::<Http>::try_from(config.rpc_url.as_str())
            .with_context(|| format!("invalid RPC url {}", config.rpc_url))?;
        let address_provider = string_to_address(&config.address_provider)?;
        Self::new(
            Arc::new(provider),
            address_provider,
            config.registry_id,
            config.rate_provider_id,
            config.qps_limit,
            config.enumeration_concurrency,
        )
        .await
    }
}

impl<M: Middleware + 'static> CurveGateway<M> {
    pub async fn new(
        client: Arc<M>,
        address_provider: Address,
        registry_id: u64,
        rate_provider_id: u64,
        qps_limit: u32,
        enumeration_concurrency: usize,
    ) -> Result<Self> {
        let provider_contract = ICurveAddressProvider::new(address_provider, Arc::clone(&client));

        info!(
            "📡 Querying AddressProvider at {:?} for registry (ID={}) and rate provider (ID={})",
            address_provider, registry_id, rate_provider_id
        );
        let registry_address = resolve(&provider_contract, registry_id, "registry").await?;
        let rate_provider_address = resolve(&provider_contract, rate_provider_id, "rate provider").await?;
        info!(
            "✅ Registry at {:?}, rate provider at {:?}",
            registry_address, rate_provider_address
        );

        let qps = NonZeroU32::new(qps_limit).unwrap_or(NonZeroU32::MIN);
        Ok(Self {
            registry: ICurveRegistry::new(registry_address, Arc::clone(&client)),
            rate_provider: ICurveRateProvider::new(rate_provider_address, client),
            limiter: Arc::new(RateLimiter::direct(Quota::per_second(qps))),
            enumeration_concurrency: enumeration_concurrency.max(1),
        })
    }

    async fn pool_at(&self, index: u64) -> Result<Address, GatewayError> {
        self.limiter.until_ready().await;
        self.registry
            .pool_list(U256::from(index))
            .call()
            .await
            .map_err(|e| GatewayError::from_message(e.to_string()))
    }
}

async fn resolve<M: Middleware + 'static>(
    address_provider: &ICurveAddressProvider<M>,
    id: u64,
    label: &str,
) -> Result<Address> {
    let address = address_provider
        .get_address(U256::from(id))
        .call()
        .await
        .with_context(|| format!("failed to resolve Curve {label} (ID={id})"))?;
    if address == NULL_ADDRESS {
        return Err(anyhow!("Curve {} not found in AddressProvider (ID={})", label, id));
    }
    Ok(address)
}

fn non_null(coins: [Address; 8]) -> Vec<Token> {
    coins.into_iter().filter(|c| *c != NULL_ADDRESS).collect()
}

#[async_trait]
impl<M: Middleware + 'static> PricingGateway for CurveGateway<M> {
    fn name(&self) -> &'static str {
        "Curve"
    }

    async fn enumerate_pools(&self) -> Result<Vec<PoolId>, GatewayError> {
        self.limiter.until_ready().await;
        let pool_count = self
            .registry
            .pool_count()
            .call()
            .await
            .map_err(|e| GatewayError::from_message(e.to_string()))?;
        let pool_count = capped_pool_count(pool_count);
        info!("📊 Scanning {} Curve registry slots", pool_count);

        let mut results = stream::iter(0..pool_count)
            .map(|i| async move { (i, self.pool_at(i).await) })
            .buffered(self.enumeration_concurrency);

        let mut pools = Vec::with_capacity(pool_count as usize);
        let mut failures = 0usize;
        while let Some((i, result)) = results.next().await {
            match result {
                Ok(pool) if pool != NULL_ADDRESS => pools.push(pool),
                Ok(_) => debug!("Registry slot {} is empty", i),
                Err(e) => {
                    failures += 1;
                    warn!("⚠️ Failed to read registry slot {}: {}", i, e);
                }
            }
        }
        if failures > 0 {
            warn!("⚠️ {} of {} registry slots could not be read", failures, pool_count);
        }
        Ok(pools)
    }

    async fn pool_tokens(&self, pool: PoolId) -> Result<PoolTokens, GatewayError> {
        self.limiter.until_ready().await;
        let coins = self
            .registry
            .get_coins(pool)
            .call()
            .await
            .map_err(|e| GatewayError::from_message(e.to_string()))?;

        self.limiter.until_ready().await;
        // plain pools revert or return zeros here; either way there is nothing to add
        let underlying = match self.registry.get_underlying_coins(pool).call().await {
            Ok(underlying) => non_null(underlying),
            Err(e) => {
                debug!("No underlying coins for pool {:?}: {}", pool, e);
                Vec::new()
            }
        };
        Ok(PoolTokens::with_underlying(non_null(coins), underlying))
    }

    async fn quote(
        &self,
        token_in: Token,
        token_out: Token,
        amount_in: Amount,
    ) -> Result<Vec<QuoteCandidate>, GatewayError> {
        self.limiter.until_ready().await;
        let quotes = self
            .rate_provider
            .get_quotes(token_in, token_out, amount_in)
            .call()
            .await
            .map_err(|e| GatewayError::from_message(e.to_string()))?;

        quotes
            .into_iter()
            .map(
                |(source_index, dest_index, is_underlying, amount_out, pool, source_balance, dest_balance, pool_type)| {
                    if pool_type > U256::from(u64::MAX) {
                        return Err(GatewayError::Decode(format!("pool_type {pool_type} out of range")));
                    }
                    Ok(QuoteCandidate {
                        pool,
                        amount_out,
                        source_balance,
                        dest_balance,
                        pool_kind: PoolKind(pool_type.as_u64()),
                        is_underlying,
                        source_index: source_index.low_u64(),
                        dest_index: dest_index.low_u64(),
                    })
                },
            )
            .collect()
    }
}

/// Slots to scan for a reported `pool_count`, at most `MAX_POOLS`.
fn capped_pool_count(pool_count: U256) -> u64 {
    if pool_count > U256::from(MAX_POOLS) {
        warn!(
            "⚠️ Curve registry reports {} pools, scanning only the first {}",
            pool_count, MAX_POOLS
        );
        return MAX_POOLS;
    }
    pool_count.as_u64()
}
