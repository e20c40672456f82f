//! External harvester capability and per-invocation results.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::token::Token;

/// An external token producer: potentially slow, potentially unreliable,
/// invoked under the pool's concurrency ceiling.
///
/// Implementations should observe `cancel` promptly when feasible. Ones that
/// cannot are abandoned by the orchestrator rather than killed; their late
/// results are discarded.
#[async_trait]
pub trait Harvester: Send + Sync {
    /// Produce one opaque answer. The pool never inspects the payload.
    async fn acquire(
        &self,
        cancel: &CancellationToken,
        params: &HarvestParams,
    ) -> anyhow::Result<serde_json::Value>;
}

/// Opaque parameters forwarded verbatim to every harvester invocation in a
/// round.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct HarvestParams {
    entries: serde_json::Map<String, serde_json::Value>,
}

impl HarvestParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.entries.insert(key.into(), value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.entries.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Error from a single harvester invocation. Absorbed by the fan-in loop;
/// one producer failing never aborts a round.
#[derive(Debug, thiserror::Error)]
#[error("harvester failed: {0}")]
pub struct HarvestError(#[from] anyhow::Error);

/// Result of one harvester invocation, produced once and consumed exactly
/// once by the fan-in step of an orchestration round.
pub type HarvestResult = Result<Token, HarvestError>;
