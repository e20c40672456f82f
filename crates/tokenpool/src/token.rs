//! Perishable token model with lazy expiry.

use std::time::Duration;

use tokio::time::Instant;
use uuid::Uuid;

/// How long a harvested token stays usable. The consuming service stops
/// trusting a credential this long after acquisition.
pub const TOKEN_VALIDITY: Duration = Duration::from_secs(2 * 60);

/// A time-limited opaque credential produced by a harvester.
///
/// Immutable once constructed. Expiry is evaluated lazily when a token is
/// dequeued; nothing sweeps the pool in the background, so a stale token may
/// sit in the queue until a caller pulls and discards it.
#[derive(Debug, Clone)]
pub struct Token {
    id: Uuid,
    payload: serde_json::Value,
    acquired_at: Instant,
}

impl Token {
    /// Stamp a harvested payload with the current time.
    pub(crate) fn new(payload: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            payload,
            acquired_at: Instant::now(),
        }
    }

    /// Identifier minted at acquisition, used for log correlation only.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// The harvester's answer, never inspected by the pool.
    pub fn payload(&self) -> &serde_json::Value {
        &self.payload
    }

    pub fn into_payload(self) -> serde_json::Value {
        self.payload
    }

    pub fn acquired_at(&self) -> Instant {
        self.acquired_at
    }

    /// Whether the validity window has elapsed. The boundary instant counts
    /// as expired.
    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.acquired_at + TOKEN_VALIDITY
    }
}
