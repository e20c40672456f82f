//! Orchestration round: bounded fan-out over harvesters, fan-in into the queue.
//!
//! Flow:
//! 1. Open a results channel sized to the harvester count
//! 2. Dispatch one task per harvester, gated by a counting semaphore
//! 3. Fan results into the shared queue as they arrive
//! 4. Channel closure (every sender dropped) ends the round
//!
//! Rounds run inside their own spawned task, so the dispatch loop may block
//! on a semaphore permit without ever blocking a pool caller. Several rounds
//! may run at once; the queue is the only serialization point for their
//! combined output.

use std::sync::Arc;

use tokio::sync::{Semaphore, mpsc};
use tokio_util::sync::CancellationToken;

use crate::harvester::{HarvestError, HarvestParams, HarvestResult, Harvester};
use crate::logger::Logger;
use crate::queue::BoundedQueue;
use crate::token::Token;

/// Terminal outcome of one orchestration round.
///
/// Individual harvester failures are absorbed before this level; only
/// backpressure and cancellation abort a round early.
#[derive(Debug, thiserror::Error)]
pub enum RoundError {
    /// The round's cancellation token fired while results were pending.
    #[error("round cancelled")]
    Cancelled,
    /// The queue rejected a harvested token. Propagated rather than dropping
    /// the token silently.
    #[error("token bank is full")]
    QueueFull,
    /// Every dispatched harvester finished without banking a single token.
    #[error("no tokens harvested")]
    NoTokens,
}

/// Run one fan-out/fan-in cycle over `harvesters`, banking every arriving
/// token in `queue`. Returns how many tokens the round banked.
pub(crate) async fn run_round(
    harvesters: Arc<[Arc<dyn Harvester>]>,
    max_concurrency: usize,
    params: HarvestParams,
    queue: Arc<BoundedQueue<Token>>,
    logger: Arc<dyn Logger>,
    cancel: CancellationToken,
) -> Result<usize, RoundError> {
    // Sized to the harvester count so producers never block on delivery,
    // even when nothing is consuming anymore.
    let (results_tx, mut results_rx) = mpsc::channel::<HarvestResult>(harvesters.len().max(1));

    let semaphore = Arc::new(Semaphore::new(max_concurrency.max(1)));

    logger.info(&format!("dispatching {} harvesters", harvesters.len()));
    for harvester in harvesters.iter() {
        // Dispatch stalls here once max_concurrency harvesters are in
        // flight. Cancellation stops dispatching further work; tasks already
        // running keep their permits until they exit on their own.
        let permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            permit = Arc::clone(&semaphore).acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => break,
            },
        };

        let harvester = Arc::clone(harvester);
        let params = params.clone();
        let cancel = cancel.clone();
        let logger = Arc::clone(&logger);
        let tx = results_tx.clone();
        tokio::spawn(async move {
            // Permit and sender are both dropped when this task exits,
            // cancelled or not, so a slot is never leaked.
            let _permit = permit;
            let result = match harvester.acquire(&cancel, &params).await {
                Ok(payload) => Ok(Token::new(payload)),
                Err(err) => Err(HarvestError::from(err)),
            };
            match &result {
                Ok(token) => logger.debug(&format!("harvested token {}", token.id())),
                Err(err) => logger.warn(&err.to_string()),
            }
            let _ = tx.send(result).await;
        });
    }
    // The channel closes once every per-harvester sender is gone; that
    // closure is the only "no more results" signal the fan-in loop trusts.
    drop(results_tx);

    fan_in(&mut results_rx, &queue, logger.as_ref(), &cancel).await
}

/// Consume harvest results until the channel closes or the round is
/// cancelled. First arrival wins the race for the waiting caller; extras are
/// banked for later calls.
async fn fan_in(
    results: &mut mpsc::Receiver<HarvestResult>,
    queue: &BoundedQueue<Token>,
    logger: &dyn Logger,
    cancel: &CancellationToken,
) -> Result<usize, RoundError> {
    let mut banked = 0usize;
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                // Harvesters still running are abandoned, not killed. Their
                // late results land on an unreferenced channel and are
                // dropped.
                logger.warn("round cancelled, abandoning outstanding harvesters");
                return Err(RoundError::Cancelled);
            }
            result = results.recv() => match result {
                None if banked == 0 => return Err(RoundError::NoTokens),
                None => return Ok(banked),
                Some(Err(err)) => {
                    logger.debug(&format!("skipping failed harvest: {err}"));
                }
                Some(Ok(token)) => {
                    let id = token.id();
                    if let Err(err) = queue.enqueue(token) {
                        logger.warn(&format!("cannot bank token {id}: {err}"));
                        return Err(RoundError::QueueFull);
                    }
                    banked += 1;
                    logger.debug(&format!("banked token {id}"));
                }
            }
        }
    }
}
