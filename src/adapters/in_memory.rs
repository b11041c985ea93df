//! Deterministic gateway backed by fixed pool membership and scripted
//! quotes. Used for offline runs against a snapshot and throughout the tests.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::error::GatewayError;
use crate::gateway::{PoolTokens, PricingGateway};
use crate::types::{Amount, PoolId, QuoteCandidate, Token};

type QuoteFn = dyn Fn(Amount) -> Vec<QuoteCandidate> + Send + Sync;

#[derive(Clone)]
struct QuoteScript {
    respond: Arc<QuoteFn>,
    /// Attempts that fail before the script starts answering
    failures: usize,
    latency: Option<Duration>,
}

#[derive(Default)]
pub struct InMemoryGateway {
    pools: Vec<(PoolId, PoolTokens)>,
    broken_pools: HashSet<PoolId>,
    pool_latency: HashMap<PoolId, Duration>,
    failing_enumeration: bool,
    quotes: HashMap<(Token, Token), QuoteScript>,
    latency: Option<Duration>,
    enumerate_calls: AtomicUsize,
    pool_token_calls: AtomicUsize,
    quote_attempts: Mutex<HashMap<(Token, Token), usize>>,
    quote_log: Mutex<Vec<(Token, Token, Amount)>>,
}

impl InMemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pool(mut self, pool: PoolId, tokens: PoolTokens) -> Self {
        self.pools.push((pool, tokens));
        self
    }

    /// Pool that is enumerated but whose token lookup always fails.
    pub fn with_broken_pool(mut self, pool: PoolId) -> Self {
        self.pools.push((pool, PoolTokens::default()));
        self.broken_pools.insert(pool);
        self
    }

    /// Extra delay for the token lookup of one pool.
    pub fn with_pool_latency(mut self, pool: PoolId, latency: Duration) -> Self {
        self.pool_latency.insert(pool, latency);
        self
    }

    pub fn with_failing_enumeration(mut self) -> Self {
        self.failing_enumeration = true;
        self
    }

    /// Delay applied to every call.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Fixed candidates for `token_in -> token_out`, whatever the amount.
    pub fn with_quote(self, token_in: Token, token_out: Token, candidates: Vec<QuoteCandidate>) -> Self {
        self.with_quote_fn(token_in, token_out, move |_| candidates.clone())
    }

    /// Amount-dependent candidates for `token_in -> token_out`.
    pub fn with_quote_fn<F>(mut self, token_in: Token, token_out: Token, respond: F) -> Self
    where
        F: Fn(Amount) -> Vec<QuoteCandidate> + Send + Sync + 'static,
    {
        self.quotes.insert(
            (token_in, token_out),
            QuoteScript {
                respond: Arc::new(respond),
                failures: 0,
                latency: None,
            },
        );
        self
    }

    /// First `failures` quote attempts for the pair error out. Pairs without
    /// a script answer with no candidates once the failures are used up.
    pub fn with_quote_failures(mut self, token_in: Token, token_out: Token, failures: usize) -> Self {
        self.script_mut(token_in, token_out).failures = failures;
        self
    }

    /// Extra delay for quotes of one pair, on top of the global latency.
    pub fn with_quote_latency(mut self, token_in: Token, token_out: Token, latency: Duration) -> Self {
        self.script_mut(token_in, token_out).latency = Some(latency);
        self
    }

    pub fn enumerate_calls(&self) -> usize {
        self.enumerate_calls.load(Ordering::SeqCst)
    }

    pub fn pool_token_calls(&self) -> usize {
        self.pool_token_calls.load(Ordering::SeqCst)
    }

    /// Quote attempts made for one pair, failed ones included.
    pub fn quote_attempts(&self, token_in: Token, token_out: Token) -> usize {
        self.quote_attempts
            .lock()
            .map(|attempts| attempts.get(&(token_in, token_out)).copied().unwrap_or(0))
            .unwrap_or(0)
    }

    /// Every quote request in arrival order.
    pub fn quote_log(&self) -> Vec<(Token, Token, Amount)> {
        self.quote_log.lock().map(|log| log.clone()).unwrap_or_default()
    }

    fn script_mut(&mut self, token_in: Token, token_out: Token) -> &mut QuoteScript {
        self.quotes.entry((token_in, token_out)).or_insert_with(|| QuoteScript {
            respond: Arc::new(|_: Amount| Vec::new()),
            failures: 0,
            latency: None,
        })
    }

    async fn delay(&self, extra: Option<Duration>) {
        let total = self.latency.unwrap_or_default() + extra.unwrap_or_default();
        if !total.is_zero() {
            tokio::time::sleep(total).await;
        }
    }
}

#[async_trait]
impl PricingGateway for InMemoryGateway {
    fn name(&self) -> &'static str {
        "in-memory"
    }

    async fn enumerate_pools(&self) -> Result<Vec<PoolId>, GatewayError> {
        self.enumerate_calls.fetch_add(1, Ordering::SeqCst);
        self.delay(None).await;
        if self.failing_enumeration {
            return Err(GatewayError::Transport("registry unreachable".to_string()));
        }
        Ok(self.pools.iter().map(|(pool, _)| *pool).collect())
    }

    async fn pool_tokens(&self, pool: PoolId) -> Result<PoolTokens, GatewayError> {
        self.pool_token_calls.fetch_add(1, Ordering::SeqCst);
        self.delay(self.pool_latency.get(&pool).copied()).await;
        if self.broken_pools.contains(&pool) {
            return Err(GatewayError::Reverted(format!("get_coins({pool:?})")));
        }
        self.pools
            .iter()
            .find(|(p, _)| *p == pool)
            .map(|(_, tokens)| tokens.clone())
            .ok_or_else(|| GatewayError::Reverted(format!("unknown pool {pool:?}")))
    }

    async fn quote(
        &self,
        token_in: Token,
        token_out: Token,
        amount_in: Amount,
    ) -> Result<Vec<QuoteCandidate>, GatewayError> {
        let attempt = {
            let mut attempts = self
                .quote_attempts
                .lock()
                .map_err(|e| GatewayError::Transport(e.to_string()))?;
            let counter = attempts.entry((token_in, token_out)).or_insert(0);
            *counter += 1;
            *counter
        };
        if let Ok(mut log) = self.quote_log.lock() {
            log.push((token_in, token_out, amount_in));
        }

        let script = self.quotes.get(&(token_in, token_out)).cloned();
        self.delay(script.as_ref().and_then(|s| s.latency)).await;

        match script {
            Some(script) if attempt <= script.failures => Err(GatewayError::RateLimited(format!(
                "scripted failure {attempt}/{}",
                script.failures
            ))),
            Some(script) => Ok((script.respond)(amount_in)),
            None => Ok(Vec::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers::types::{Address, U256};

    fn addr(n: u64) -> Address {
        Address::from_low_u64_be(n)
    }

    #[tokio::test]
    async fn test_scripted_failures_then_answer() {
        let gateway = InMemoryGateway::new()
            .with_quote(addr(1), addr(2), vec![QuoteCandidate::new(addr(100), U256::from(7))])
            .with_quote_failures(addr(1), addr(2), 2);

        assert!(gateway.quote(addr(1), addr(2), U256::one()).await.is_err());
        assert!(gateway.quote(addr(1), addr(2), U256::one()).await.is_err());
        let quotes = gateway.quote(addr(1), addr(2), U256::one()).await.unwrap();
        assert_eq!(quotes[0].amount_out, U256::from(7));
        assert_eq!(gateway.quote_attempts(addr(1), addr(2)), 3);
    }

    #[tokio::test]
    async fn test_unscripted_pair_has_no_candidates() {
        let gateway = InMemoryGateway::new();
        assert!(gateway.quote(addr(1), addr(2), U256::one()).await.unwrap().is_empty());
        assert_eq!(gateway.quote_log(), vec![(addr(1), addr(2), U256::one())]);
    }
}
