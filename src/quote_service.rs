//! # Quote Service
//!
//! Wraps a [`PricingGateway`] with the retry, timeout and fan-out policy used
//! for every hop quote.
//!
//! - [`QuoteService::quote_hop`] retries transient failures with linear
//!   backoff and degrades to an empty list once attempts run out.
//! - [`QuoteService::quote_hops_parallel`] runs one attempt per request with
//!   at most `max_workers` in flight; a slot that fails or times out is
//!   empty and never aborts the batch.
//! - [`best_quote`] picks the candidate with the largest output, keeping the
//!   first one on ties.

use futures::stream::{self, StreamExt};
use log::{debug, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio_retry::Retry;

use crate::error::GatewayError;
use crate::gateway::PricingGateway;
use crate::metrics;
use crate::settings;
use crate::types::{Amount, QuoteCandidate, Token};

#[derive(Debug, Clone)]
pub struct QuoteConfig {
    /// Requests in flight during a parallel batch
    pub max_workers: usize,
    /// Applied to every single gateway call
    pub timeout: Duration,
    /// Total attempts per hop, first one included
    pub max_retries: u32,
    /// Delay before retry `n` is `backoff_base * n`
    pub backoff_base: Duration,
}

impl Default for QuoteConfig {
    fn default() -> Self {
        Self {
            max_workers: 20,
            timeout: Duration::from_secs(2),
            max_retries: 3,
            backoff_base: Duration::from_millis(500),
        }
    }
}

impl From<&settings::Quoting> for QuoteConfig {
    fn from(quoting: &settings::Quoting) -> Self {
        Self {
            max_workers: quoting.max_workers.max(1),
            timeout: Duration::from_millis(quoting.timeout_ms),
            max_retries: quoting.max_retries,
            backoff_base: Duration::from_millis(quoting.backoff_base_ms),
        }
    }
}

/// How a hop quote ended.
///
/// `NoLiquidity` and `Exhausted` both mean "no viable hop right now" to the
/// router; they are kept apart for logs and metrics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HopQuote {
    Quoted(Vec<QuoteCandidate>),
    /// The gateway answered successfully with zero candidates
    NoLiquidity,
    /// Every attempt failed
    Exhausted { attempts: u32 },
}

impl HopQuote {
    pub fn into_candidates(self) -> Vec<QuoteCandidate> {
        match self {
            HopQuote::Quoted(candidates) => candidates,
            HopQuote::NoLiquidity | HopQuote::Exhausted { .. } => Vec::new(),
        }
    }

    fn label(&self) -> &'static str {
        match self {
            HopQuote::Quoted(_) => "quoted",
            HopQuote::NoLiquidity => "no_liquidity",
            HopQuote::Exhausted { .. } => "exhausted",
        }
    }
}

pub struct QuoteService {
    gateway: Arc<dyn PricingGateway>,
    config: QuoteConfig,
}

impl QuoteService {
    pub fn new(gateway: Arc<dyn PricingGateway>, config: QuoteConfig) -> Self {
        Self { gateway, config }
    }

    pub fn config(&self) -> &QuoteConfig {
        &self.config
    }

    /// Candidates for one hop; empty when the pair has no liquidity or every
    /// attempt failed.
    pub async fn quote_hop(&self, token_in: Token, token_out: Token, amount_in: Amount) -> Vec<QuoteCandidate> {
        self.quote_hop_outcome(token_in, token_out, amount_in)
            .await
            .into_candidates()
    }

    /// Like [`quote_hop`](Self::quote_hop) but reports why a hop came back
    /// empty.
    pub async fn quote_hop_outcome(&self, token_in: Token, token_out: Token, amount_in: Amount) -> HopQuote {
        let attempts_allowed = self.config.max_retries.max(1);
        let base = self.config.backoff_base;
        let delays = (1..attempts_allowed).map(move |n| base * n);

        let mut attempts = 0u32;
        let result = Retry::spawn(delays, || {
            attempts += 1;
            let attempt = attempts;
            async move {
                self.attempt(token_in, token_out, amount_in).await.map_err(|e| {
                    debug!(
                        "Quote {:?}->{:?} attempt {}/{} failed: {}",
                        token_in, token_out, attempt, attempts_allowed, e
                    );
                    metrics::increment_quote_attempt_failure(e.kind());
                    e
                })
            }
        })
        .await;

        let outcome = match result {
            Ok(candidates) if candidates.is_empty() => {
                debug!("No liquidity for {:?}->{:?}", token_in, token_out);
                HopQuote::NoLiquidity
            }
            Ok(candidates) => HopQuote::Quoted(candidates),
            Err(e) => {
                warn!(
                    "⚠️ Quote {:?}->{:?} gave up after {} attempts: {}",
                    token_in, token_out, attempts, e
                );
                HopQuote::Exhausted { attempts }
            }
        };
        metrics::increment_quote_outcome(outcome.label());
        outcome
    }

    /// One attempt per request, at most `max_workers` in flight. Result `i`
    /// answers request `i`; failed or timed-out slots are empty.
    pub async fn quote_hops_parallel(&self, requests: &[(Token, Token, Amount)]) -> Vec<Vec<QuoteCandidate>> {
        stream::iter(requests.iter().copied())
            .map(|(token_in, token_out, amount_in)| async move {
                match self.attempt(token_in, token_out, amount_in).await {
                    Ok(candidates) => {
                        let label = if candidates.is_empty() { "no_liquidity" } else { "quoted" };
                        metrics::increment_quote_outcome(label);
                        candidates
                    }
                    Err(e) => {
                        let label = if matches!(e, GatewayError::Timeout(_)) { "timeout" } else { "failed" };
                        metrics::increment_quote_outcome(label);
                        warn!("⚠️ Batch quote {:?}->{:?} dropped: {}", token_in, token_out, e);
                        Vec::new()
                    }
                }
            })
            .buffered(self.config.max_workers.max(1))
            .collect()
            .await
    }

    async fn attempt(
        &self,
        token_in: Token,
        token_out: Token,
        amount_in: Amount,
    ) -> Result<Vec<QuoteCandidate>, GatewayError> {
        match tokio::time::timeout(self.config.timeout, self.gateway.quote(token_in, token_out, amount_in)).await {
            Ok(result) => result,
            Err(_) => Err(GatewayError::Timeout(self.config.timeout)),
        }
    }
}

/// Candidate with the strictly greatest `amount_out`; the earliest wins ties.
pub fn best_quote(candidates: &[QuoteCandidate]) -> Option<&QuoteCandidate> {
    candidates.iter().fold(None, |best, candidate| match best {
        Some(current) if current.amount_out >= candidate.amount_out => Some(current),
        _ => Some(candidate),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::in_memory::InMemoryGateway;
    use ethers::types::{Address, U256};
    use tokio::time::Instant;

    fn addr(n: u64) -> Address {
        Address::from_low_u64_be(n)
    }

    fn candidate(pool: u64, out: u64) -> QuoteCandidate {
        QuoteCandidate::new(addr(pool), U256::from(out))
    }

    #[test]
    fn test_best_quote_picks_max_and_keeps_first_on_tie() {
        assert!(best_quote(&[]).is_none());

        let candidates = vec![candidate(100, 5), candidate(101, 9), candidate(102, 9), candidate(103, 1)];
        assert_eq!(best_quote(&candidates).unwrap().pool, addr(101));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_exhaustion_follows_backoff_schedule() {
        let gateway = Arc::new(InMemoryGateway::new().with_quote_failures(addr(1), addr(2), usize::MAX));
        let service = QuoteService::new(gateway.clone(), QuoteConfig::default());

        let started = Instant::now();
        let outcome = service.quote_hop_outcome(addr(1), addr(2), U256::from(100)).await;

        assert_eq!(outcome, HopQuote::Exhausted { attempts: 3 });
        assert_eq!(gateway.quote_attempts(addr(1), addr(2)), 3);
        // 0.5s before the second attempt, 1.0s before the third
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(1500), "elapsed {elapsed:?}");
        assert!(elapsed < Duration::from_millis(1600), "elapsed {elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failure_recovers() {
        let gateway = Arc::new(
            InMemoryGateway::new()
                .with_quote(addr(1), addr(2), vec![candidate(100, 42)])
                .with_quote_failures(addr(1), addr(2), 1),
        );
        let service = QuoteService::new(gateway.clone(), QuoteConfig::default());

        let quotes = service.quote_hop(addr(1), addr(2), U256::from(100)).await;
        assert_eq!(quotes, vec![candidate(100, 42)]);
        assert_eq!(gateway.quote_attempts(addr(1), addr(2)), 2);
    }

    #[tokio::test]
    async fn test_empty_answer_is_no_liquidity() {
        let service = QuoteService::new(Arc::new(InMemoryGateway::new()), QuoteConfig::default());
        let outcome = service.quote_hop_outcome(addr(1), addr(2), U256::from(1)).await;
        assert_eq!(outcome, HopQuote::NoLiquidity);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_attempts_time_out_and_are_retried() {
        let gateway = Arc::new(
            InMemoryGateway::new()
                .with_quote(addr(1), addr(2), vec![candidate(100, 1)])
                .with_quote_latency(addr(1), addr(2), Duration::from_secs(5)),
        );
        let service = QuoteService::new(gateway.clone(), QuoteConfig::default());

        let started = Instant::now();
        let outcome = service.quote_hop_outcome(addr(1), addr(2), U256::from(1)).await;
        assert_eq!(outcome, HopQuote::Exhausted { attempts: 3 });
        // three 2s timeouts plus 1.5s of backoff
        assert!(started.elapsed() < Duration::from_secs(8));
    }

    #[tokio::test(start_paused = true)]
    async fn test_parallel_batch_preserves_order_and_isolates_failures() {
        let gateway = Arc::new(
            InMemoryGateway::new()
                .with_quote(addr(1), addr(2), vec![candidate(100, 10)])
                .with_quote_latency(addr(1), addr(2), Duration::from_millis(300))
                .with_quote(addr(2), addr(3), vec![candidate(101, 20)])
                .with_quote(addr(3), addr(4), vec![candidate(102, 30)])
                .with_quote_latency(addr(3), addr(4), Duration::from_secs(10))
                .with_quote(addr(4), addr(5), vec![candidate(103, 40)])
                .with_quote_failures(addr(4), addr(5), 1),
        );
        let service = QuoteService::new(gateway, QuoteConfig::default());

        let one = U256::one();
        let results = service
            .quote_hops_parallel(&[
                (addr(1), addr(2), one),
                (addr(2), addr(3), one),
                (addr(3), addr(4), one),
                (addr(4), addr(5), one),
                (addr(5), addr(6), one),
            ])
            .await;

        assert_eq!(results.len(), 5);
        assert_eq!(results[0], vec![candidate(100, 10)]);
        assert_eq!(results[1], vec![candidate(101, 20)]);
        assert!(results[2].is_empty(), "timed out slot must be empty");
        assert!(results[3].is_empty(), "batch makes a single attempt");
        assert!(results[4].is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_parallel_batch_is_bounded() {
        let mut gateway = InMemoryGateway::new();
        let mut requests = Vec::new();
        for n in 0..4u64 {
            gateway = gateway
                .with_quote(addr(n), addr(n + 10), vec![candidate(100 + n, n)])
                .with_quote_latency(addr(n), addr(n + 10), Duration::from_secs(1));
            requests.push((addr(n), addr(n + 10), U256::one()));
        }
        let config = QuoteConfig {
            max_workers: 2,
            ..QuoteConfig::default()
        };
        let service = QuoteService::new(Arc::new(gateway), config);

        let started = Instant::now();
        let results = service.quote_hops_parallel(&requests).await;
        assert!(results.iter().all(|r| r.len() == 1));
        // four 1s calls, two at a time
        assert!(started.elapsed() >= Duration::from_secs(2));
    }
}
