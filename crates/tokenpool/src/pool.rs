//! Pool façade: the public acquire/clear surface and its configuration.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::harvester::{HarvestParams, Harvester};
use crate::logger::{Logger, TracingLogger};
use crate::orchestrator::{self, RoundError};
use crate::queue::BoundedQueue;
use crate::token::Token;

/// Default bound on banked tokens.
const DEFAULT_MAX_CAPACITY: usize = 25;

/// Pause between queue re-checks while a round is in flight. Arrival
/// notifications normally wake the waiter first; the timer only covers the
/// window between a dequeue miss and waiter registration.
const RETRY_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    /// The caller's cancellation token fired before a valid token arrived.
    #[error("request cancelled")]
    Cancelled,
}

/// Option-based configuration for [`TokenPool`].
///
/// Scalar options are last-write-wins; harvester registration is additive,
/// in call order.
pub struct PoolConfig {
    max_capacity: Option<usize>,
    max_concurrency: usize,
    harvesters: Vec<Arc<dyn Harvester>>,
    logger: Arc<dyn Logger>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_capacity: Some(DEFAULT_MAX_CAPACITY),
            max_concurrency: 1,
            harvesters: Vec::new(),
            logger: Arc::new(TracingLogger),
        }
    }
}

impl PoolConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bound the token bank. `None` (or zero) removes the bound.
    pub fn with_max_capacity(mut self, max_capacity: Option<usize>) -> Self {
        self.max_capacity = max_capacity;
        self
    }

    /// Ceiling on concurrently running harvesters per round. Normalized to
    /// at least 1.
    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency.max(1);
        self
    }

    /// Register a producer. Harvesters are dispatched in registration order.
    pub fn with_harvester(mut self, harvester: Arc<dyn Harvester>) -> Self {
        self.harvesters.push(harvester);
        self
    }

    pub fn with_logger(mut self, logger: Arc<dyn Logger>) -> Self {
        self.logger = logger;
        self
    }
}

/// Shared pool of pre-harvested tokens.
///
/// Callers receive the first valid token available; surplus results from a
/// round are banked for later calls. The queue is the only mutable state, so
/// a pool is cheap to share behind an `Arc`.
pub struct TokenPool {
    queue: Arc<BoundedQueue<Token>>,
    harvesters: Arc<[Arc<dyn Harvester>]>,
    max_concurrency: usize,
    logger: Arc<dyn Logger>,
}

impl TokenPool {
    pub fn new(config: PoolConfig) -> Self {
        Self {
            queue: Arc::new(BoundedQueue::new(config.max_capacity)),
            harvesters: config.harvesters.into(),
            max_concurrency: config.max_concurrency,
            logger: config.logger,
        }
    }

    /// First valid token available.
    ///
    /// Banked tokens win. On a queue miss, exactly one orchestration round is
    /// started and the call waits on the shared queue (never on the round
    /// itself), so concurrent callers converge on one in-flight round's
    /// output rather than each awaiting a private round.
    pub async fn get_token(
        &self,
        cancel: &CancellationToken,
        params: HarvestParams,
    ) -> Result<Token, PoolError> {
        if let Some(token) = self.valid_token_from_queue() {
            return Ok(token);
        }

        self.spawn_round(cancel.clone(), params);

        loop {
            if cancel.is_cancelled() {
                return Err(PoolError::Cancelled);
            }
            if let Some(token) = self.valid_token_from_queue() {
                return Ok(token);
            }
            tokio::select! {
                _ = cancel.cancelled() => return Err(PoolError::Cancelled),
                _ = self.queue.enqueued() => {}
                _ = tokio::time::sleep(RETRY_INTERVAL) => {}
            }
        }
    }

    /// Drop every banked token. Rounds already in flight are unaffected;
    /// their output is banked afterward as normal.
    pub fn clear_tokens(&self) {
        self.logger.debug("clearing banked tokens");
        self.queue.clear();
    }

    /// Number of currently banked tokens, expired ones included until a
    /// dequeue discards them.
    pub fn banked(&self) -> usize {
        self.queue.len()
    }

    /// Dequeue until a non-expired token turns up or the queue runs dry.
    fn valid_token_from_queue(&self) -> Option<Token> {
        loop {
            match self.queue.dequeue() {
                Ok(token) if token.is_expired() => {
                    self.logger
                        .debug(&format!("discarding expired token {}", token.id()));
                }
                Ok(token) => return Some(token),
                // Dequeue only ever reports Empty.
                Err(_) => return None,
            }
        }
    }

    /// Start one orchestration round without awaiting it. Outcomes are
    /// logged; callers observe them only through the shared queue.
    fn spawn_round(&self, cancel: CancellationToken, params: HarvestParams) {
        let harvesters = Arc::clone(&self.harvesters);
        let max_concurrency = self.max_concurrency;
        let queue = Arc::clone(&self.queue);
        let logger = Arc::clone(&self.logger);

        tokio::spawn(async move {
            let outcome = orchestrator::run_round(
                harvesters,
                max_concurrency,
                params,
                queue,
                Arc::clone(&logger),
                cancel,
            )
            .await;
            match outcome {
                Ok(banked) => logger.debug(&format!("round banked {banked} tokens")),
                Err(RoundError::NoTokens) => logger.debug("round finished with no tokens"),
                Err(err) => logger.warn(&format!("round aborted: {err}")),
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;

    /// Scripted harvester for driving the façade: optional delay, optional
    /// scripted failure, invocation counter.
    struct FakeHarvester {
        label: &'static str,
        delay: Duration,
        fail: bool,
        calls: AtomicUsize,
    }

    impl FakeHarvester {
        fn succeeding(label: &'static str, delay: Duration) -> Self {
            Self {
                label,
                delay,
                fail: false,
                calls: AtomicUsize::new(0),
            }
        }

        fn failing(label: &'static str) -> Self {
            Self {
                fail: true,
                ..Self::succeeding(label, Duration::ZERO)
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Harvester for FakeHarvester {
        async fn acquire(
            &self,
            cancel: &CancellationToken,
            _params: &HarvestParams,
        ) -> anyhow::Result<serde_json::Value> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::select! {
                _ = cancel.cancelled() => anyhow::bail!("harvest interrupted"),
                _ = tokio::time::sleep(self.delay) => {}
            }
            if self.fail {
                anyhow::bail!("scripted failure from {}", self.label);
            }
            Ok(serde_json::json!({ "source": self.label }))
        }
    }

    fn pool_with(harvesters: Vec<Arc<dyn Harvester>>) -> TokenPool {
        let mut config = PoolConfig::new().with_max_concurrency(4);
        for harvester in harvesters {
            config = config.with_harvester(harvester);
        }
        TokenPool::new(config)
    }

    #[tokio::test(start_paused = true)]
    async fn banked_token_is_served_without_a_round() {
        let harvester = Arc::new(FakeHarvester::succeeding("h", Duration::ZERO));
        let pool = pool_with(vec![Arc::clone(&harvester) as _]);

        pool.queue
            .enqueue(Token::new(serde_json::json!("banked")))
            .unwrap();

        let token = pool
            .get_token(&CancellationToken::new(), HarvestParams::default())
            .await
            .unwrap();

        assert_eq!(token.payload(), &serde_json::json!("banked"));
        assert_eq!(harvester.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn race_winner_returns_first_and_loser_is_banked() {
        let fast = Arc::new(FakeHarvester::succeeding("fast", Duration::from_millis(5)));
        let slow = Arc::new(FakeHarvester::succeeding("slow", Duration::from_millis(80)));
        let pool = pool_with(vec![Arc::clone(&fast) as _, Arc::clone(&slow) as _]);
        let cancel = CancellationToken::new();

        let first = pool
            .get_token(&cancel, HarvestParams::default())
            .await
            .unwrap();
        assert_eq!(first.payload()["source"], "fast");

        // Let the slow harvester finish banking its surplus token.
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(pool.banked(), 1);

        let second = pool
            .get_token(&cancel, HarvestParams::default())
            .await
            .unwrap();
        assert_eq!(second.payload()["source"], "slow");

        // The second call was served from the bank: no new invocations.
        assert_eq!(fast.calls(), 1);
        assert_eq!(slow.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn partial_failure_is_invisible_to_the_caller() {
        let pool = pool_with(vec![
            Arc::new(FakeHarvester::failing("bad-1")) as _,
            Arc::new(FakeHarvester::succeeding("good", Duration::from_millis(10))) as _,
            Arc::new(FakeHarvester::failing("bad-2")) as _,
        ]);

        let token = pool
            .get_token(&CancellationToken::new(), HarvestParams::default())
            .await
            .unwrap();

        assert_eq!(token.payload()["source"], "good");
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_caller_returns_immediately() {
        let pool = pool_with(vec![]);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = pool.get_token(&cancel, HarvestParams::default()).await;

        assert!(matches!(result, Err(PoolError::Cancelled)));
    }

    #[tokio::test(start_paused = true)]
    async fn expired_tokens_are_skipped_silently() {
        let pool = pool_with(vec![]);

        let stale = Token::new(serde_json::json!("stale"));
        pool.queue.enqueue(stale).unwrap();

        tokio::time::advance(crate::token::TOKEN_VALIDITY).await;

        let fresh = Token::new(serde_json::json!("fresh"));
        pool.queue.enqueue(fresh).unwrap();

        let token = pool
            .get_token(&CancellationToken::new(), HarvestParams::default())
            .await
            .unwrap();

        assert_eq!(token.payload(), &serde_json::json!("fresh"));
        assert_eq!(pool.banked(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_callers_share_one_round() {
        let harvester = Arc::new(FakeHarvester::succeeding("h", Duration::from_millis(5)));
        let pool = Arc::new(pool_with(vec![Arc::clone(&harvester) as _]));
        let cancel = CancellationToken::new();

        let token = pool
            .get_token(&cancel, HarvestParams::default())
            .await
            .unwrap();
        assert_eq!(token.payload()["source"], "h");
        assert_eq!(harvester.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn clear_tokens_empties_the_bank() {
        let pool = pool_with(vec![]);
        pool.queue.enqueue(Token::new(serde_json::json!(1))).unwrap();
        pool.queue.enqueue(Token::new(serde_json::json!(2))).unwrap();

        pool.clear_tokens();
        assert_eq!(pool.banked(), 0);

        // Idempotent.
        pool.clear_tokens();
        assert_eq!(pool.banked(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn params_reach_every_harvester() {
        struct ParamEcho;

        #[async_trait]
        impl Harvester for ParamEcho {
            async fn acquire(
                &self,
                _cancel: &CancellationToken,
                params: &HarvestParams,
            ) -> anyhow::Result<serde_json::Value> {
                params
                    .get("site_key")
                    .cloned()
                    .ok_or_else(|| anyhow::anyhow!("missing site_key"))
            }
        }

        let pool = pool_with(vec![Arc::new(ParamEcho) as _]);
        let params = HarvestParams::new().with("site_key", serde_json::json!("6Le-abc"));

        let token = pool
            .get_token(&CancellationToken::new(), params)
            .await
            .unwrap();

        assert_eq!(token.payload(), &serde_json::json!("6Le-abc"));
    }

    #[test]
    fn scalar_options_are_last_write_wins() {
        let config = PoolConfig::new()
            .with_max_capacity(Some(10))
            .with_max_capacity(None)
            .with_max_concurrency(2)
            .with_max_concurrency(8);

        assert_eq!(config.max_capacity, None);
        assert_eq!(config.max_concurrency, 8);
    }

    #[test]
    fn harvester_registration_is_additive_in_order() {
        let first = Arc::new(FakeHarvester::succeeding("first", Duration::ZERO));
        let second = Arc::new(FakeHarvester::succeeding("second", Duration::ZERO));

        let config = PoolConfig::new()
            .with_harvester(Arc::clone(&first) as _)
            .with_harvester(Arc::clone(&second) as _);

        assert_eq!(config.harvesters.len(), 2);
        assert!(Arc::ptr_eq(
            &config.harvesters[0],
            &(Arc::clone(&first) as Arc<dyn Harvester>)
        ));
        assert!(Arc::ptr_eq(
            &config.harvesters[1],
            &(Arc::clone(&second) as Arc<dyn Harvester>)
        ));
    }

    #[test]
    fn defaults_match_the_documented_surface() {
        let config = PoolConfig::new();
        assert_eq!(config.max_capacity, Some(DEFAULT_MAX_CAPACITY));
        assert_eq!(config.max_concurrency, 1);
        assert!(config.harvesters.is_empty());
    }

    #[test]
    fn zero_concurrency_is_normalized() {
        let config = PoolConfig::new().with_max_concurrency(0);
        assert_eq!(config.max_concurrency, 1);
    }
}
