//! tokenpool: in-memory pool of perishable tokens fed by concurrent harvesters.
//!
//! A [`TokenPool`] serves callers the first valid token available and banks
//! surplus tokens for reuse. On a queue miss it starts one orchestration
//! round: a bounded fan-out over the registered [`Harvester`]s whose results
//! fan into a shared FIFO queue. Tokens expire [`TOKEN_VALIDITY`] after
//! acquisition and are discarded lazily at dequeue time.
//!
//! ```no_run
//! use std::sync::Arc;
//! use tokenpool::{CancellationToken, HarvestParams, PoolConfig, TokenPool};
//!
//! # async fn example(harvester: Arc<dyn tokenpool::Harvester>) -> anyhow::Result<()> {
//! let pool = TokenPool::new(
//!     PoolConfig::new()
//!         .with_max_capacity(Some(25))
//!         .with_max_concurrency(4)
//!         .with_harvester(harvester),
//! );
//!
//! let token = pool
//!     .get_token(&CancellationToken::new(), HarvestParams::default())
//!     .await?;
//! println!("{}", token.payload());
//! # Ok(())
//! # }
//! ```

mod harvester;
mod logger;
mod orchestrator;
mod pool;
mod queue;
mod token;

pub use harvester::{HarvestError, HarvestParams, HarvestResult, Harvester};
pub use logger::{Logger, NopLogger, TracingLogger};
pub use orchestrator::RoundError;
pub use pool::{PoolConfig, PoolError, TokenPool};
pub use queue::{BoundedQueue, QueueError};
pub use token::{TOKEN_VALIDITY, Token};

pub use tokio_util::sync::CancellationToken;
