use std::sync::Arc;

use futures::future::join_all;
use tokio::select;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{trace, warn};

use super::RawLog;
use crate::counters::Counters;
use crate::decoder::EventDecoder;

/// Decodes batches of logs and counts the ones owned by tracked addresses
///
/// Each log gets its own task, but at most `concurrency` of them decode and update counters at
/// the same time
#[derive(Clone)]
pub struct LogProcessor {
    decoder: Arc<dyn EventDecoder>,
    counters: Counters,
    concurrency: usize,

    /// Cancellation token for graceful shutdown
    cancellation_token: CancellationToken,
}

impl LogProcessor {
    /// `concurrency` is capped at the largest permit count a semaphore can hold
    pub fn new(
        decoder: Arc<dyn EventDecoder>,
        counters: Counters,
        concurrency: usize,
        cancellation_token: CancellationToken,
    ) -> Self {
        Self {
            decoder,
            counters,
            concurrency: concurrency.min(Semaphore::MAX_PERMITS),
            cancellation_token,
        }
    }

    /// Processes the whole batch, returning whether any tracked address was incremented.
    ///
    /// Logs that fail to decode are skipped. Logs still waiting for a slot when the token is
    /// cancelled are skipped too. Returns only once every spawned worker has finished
    pub async fn process(&self, logs: Vec<RawLog>) -> bool {
        let semaphore = Arc::new(Semaphore::new(self.concurrency));

        let workers = logs
            .into_iter()
            .map(|log| {
                let semaphore = semaphore.clone();
                let decoder = self.decoder.clone();
                let counters = self.counters.clone();
                let token = self.cancellation_token.clone();

                tokio::spawn(async move {
                    let _permit = select! {
                        biased;
                        _ = token.cancelled() => return false,
                        permit = semaphore.acquire_owned() => match permit {
                            Ok(permit) => permit,
                            Err(_) => return false,
                        },
                    };

                    let event = match decoder.decode(&log) {
                        Ok(event) => event,
                        Err(e) => {
                            trace!(error = %e, "skipping log");
                            return false;
                        }
                    };

                    counters.increment(&event.owner).await
                })
            })
            .collect::<Vec<_>>();

        join_all(workers)
            .await
            .into_iter()
            .fold(false, |updated, result| match result {
                Ok(hit) => updated || hit,
                Err(e) => {
                    warn!(error = %e, "log worker failed");
                    updated
                }
            })
    }
}
