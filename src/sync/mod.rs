mod processor;
mod provider;
mod range;
mod rpc;

use std::sync::Arc;
use std::time::Duration;

use alloy_primitives::Address;
use tokio::select;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::config::{Config, ConfigError};
use crate::counters::{Counters, TrackedAddresses};
use crate::decoder::EventDecoder;
use crate::report::Reporter;

pub use processor::LogProcessor;
pub use provider::{ChainTransport, RawLog};
pub use range::BlockRange;
pub use rpc::HttpTransport;

/// Main sync job
/// Walks the chain forward in fixed-size block ranges, from a pre-configured starting block,
/// counting tracked owners of the configured event.
/// Once it reaches the tip, keeps polling for new blocks until cancelled
pub struct NonceCounter {
    transport: Arc<dyn ChainTransport>,
    processor: LogProcessor,
    reporter: Arc<dyn Reporter>,
    counters: Counters,

    contract_address: Address,
    block_batch_size: u64,

    /// Next block to scan from
    cursor: u64,

    retry_backoff: Duration,
    poll_interval: Duration,

    /// Cancellation token for graceful shutdown
    cancellation_token: CancellationToken,
}

impl NonceCounter {
    /// Validates `config` and sets up the counters. Refuses to build on any configuration error
    pub fn new(
        config: &Config,
        transport: Arc<dyn ChainTransport>,
        decoder: Arc<dyn EventDecoder>,
        reporter: Arc<dyn Reporter>,
        cancellation_token: CancellationToken,
    ) -> Result<Self, ConfigError> {
        let counter = &config.counter;
        counter.validate()?;

        let contract_address = counter.contract_address()?;
        let counters = Counters::new(TrackedAddresses::new(counter.tracked_addresses()?));
        let processor = LogProcessor::new(
            decoder,
            counters.clone(),
            counter.concurrency(),
            cancellation_token.clone(),
        );

        Ok(Self {
            transport,
            processor,
            reporter,
            counters,
            contract_address,
            block_batch_size: counter.block_batch_size(),
            cursor: counter.start_block(),
            retry_backoff: config.sync.retry_backoff(),
            poll_interval: config.sync.poll_interval(),
            cancellation_token,
        })
    }

    pub fn counters(&self) -> &Counters {
        &self.counters
    }

    /// Runs until cancelled. Returns the block the next scan would have started from
    #[instrument(name = "counter", skip(self), fields(contract = %self.contract_address))]
    pub async fn run(mut self) -> u64 {
        loop {
            if self.cancellation_token.is_cancelled() {
                break;
            }

            let tip = match self.transport.current_tip().await {
                Ok(tip) => tip,
                Err(e) => {
                    warn!(error = %e, "failed to fetch block header");
                    self.wait(self.retry_backoff).await;
                    continue;
                }
            };

            let range = BlockRange::next(self.cursor, tip, self.block_batch_size);
            debug!(from = range.from, to = range.to, "block range");

            let logs = match self
                .transport
                .fetch_logs(range, self.contract_address)
                .await
            {
                Ok(logs) => logs,
                Err(e) => {
                    warn!(error = %e, block = self.cursor, "failed to fetch logs");
                    self.wait(self.retry_backoff).await;
                    continue;
                }
            };

            if self.processor.process(logs).await {
                self.reporter.report(&self.counters.snapshot().await);
            }

            self.cursor = range.to.saturating_add(1);

            // caught up. give the chain time to produce new blocks
            if range.to == tip {
                self.wait(self.poll_interval).await;
            }
        }

        info!(cursor = self.cursor, "closing");
        self.cursor
    }

    /// Sleeps for `duration`, returning early on cancellation
    async fn wait(&self, duration: Duration) {
        select! {
            _ = self.cancellation_token.cancelled() => {}
            _ = sleep(duration) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use alloy_primitives::Address;
    use rstest::*;

    use super::*;
    use crate::config::{CounterConfig, RpcConfig, SyncConfig};
    use crate::decoder::AbiDecoder;
    use crate::test_utils::{
        decoder, tracked, untracked, validator_added_at, MockTransport, RecordingReporter,
    };

    fn config(tracked: &[Address], start_block: i64, batch: i64) -> Config {
        let mut counter = CounterConfig::for_test(tracked.to_vec());
        counter.start_block = start_block;
        counter.block_batch_size = batch;
        counter.concurrency = 3;

        Config {
            rpc: RpcConfig {
                url: "http://localhost:8545".to_owned(),
            },
            counter,
            sync: SyncConfig {
                retry_backoff_ms: 1,
                poll_interval_ms: 1,
            },
        }
    }

    fn counter(
        config: &Config,
        transport: Arc<MockTransport>,
        decoder: AbiDecoder,
        reporter: Arc<RecordingReporter>,
        token: CancellationToken,
    ) -> NonceCounter {
        NonceCounter::new(config, transport, Arc::new(decoder), reporter, token).unwrap()
    }

    async fn run(counter: NonceCounter) -> u64 {
        tokio::time::timeout(Duration::from_secs(5), counter.run())
            .await
            .expect("counter did not stop")
    }

    #[rstest]
    #[tokio::test]
    async fn test_walks_ranges_and_counts(
        decoder: AbiDecoder,
        tracked: Vec<Address>,
        untracked: Address,
    ) {
        let token = CancellationToken::new();
        let logs = vec![
            validator_added_at(tracked[0], 5),
            validator_added_at(tracked[0], 15),
            validator_added_at(untracked, 16),
            validator_added_at(tracked[1], 25),
            validator_added_at(tracked[0], 26),
        ];
        let transport = Arc::new(MockTransport::new(25, logs).cancel_after(2, token.clone()));
        let reporter = Arc::new(RecordingReporter::default());
        let config = config(&tracked, 5, 10);

        let counter = counter(&config, transport.clone(), decoder, reporter.clone(), token);
        let counters = counter.counters().clone();

        assert_eq!(run(counter).await, 26);
        assert_eq!(
            transport.ranges(),
            vec![BlockRange { from: 5, to: 15 }, BlockRange { from: 16, to: 25 }]
        );

        let snapshot = counters.snapshot().await;
        assert_eq!(snapshot.get(&tracked[0]), Some(2));
        assert_eq!(snapshot.get(&tracked[1]), Some(1));
        assert_eq!(snapshot.get(&untracked), None);

        let reports = reporter.snapshots();
        assert_eq!(reports.len(), 2);
        assert_eq!(reports[0].get(&tracked[0]), Some(2));
        assert_eq!(reports[1], snapshot);
    }

    #[rstest]
    #[tokio::test]
    async fn test_reports_only_updates(
        decoder: AbiDecoder,
        tracked: Vec<Address>,
        untracked: Address,
    ) {
        let token = CancellationToken::new();
        let logs = vec![
            validator_added_at(untracked, 3),
            validator_added_at(tracked[2], 12),
        ];
        let transport = Arc::new(MockTransport::new(100, logs).cancel_after(3, token.clone()));
        let reporter = Arc::new(RecordingReporter::default());
        let config = config(&tracked, 0, 9);

        let counter = counter(&config, transport.clone(), decoder, reporter.clone(), token);

        assert_eq!(run(counter).await, 30);
        assert_eq!(reporter.snapshots().len(), 1);
        assert_eq!(reporter.snapshots()[0].get(&tracked[2]), Some(1));
    }

    #[rstest]
    #[tokio::test]
    async fn test_rescans_tip_when_caught_up(decoder: AbiDecoder, tracked: Vec<Address>) {
        let token = CancellationToken::new();
        let transport = Arc::new(MockTransport::new(18, vec![]).cancel_after(3, token.clone()));
        let reporter = Arc::new(RecordingReporter::default());
        let config = config(&tracked, 15, 10);

        let counter = counter(&config, transport.clone(), decoder, reporter, token);

        assert_eq!(run(counter).await, 19);
        assert_eq!(
            transport.ranges(),
            vec![
                BlockRange { from: 15, to: 18 },
                BlockRange { from: 18, to: 18 },
                BlockRange { from: 18, to: 18 },
            ]
        );
    }

    #[rstest]
    #[tokio::test]
    async fn test_retries_tip_without_advancing(decoder: AbiDecoder, tracked: Vec<Address>) {
        let token = CancellationToken::new();
        let transport = Arc::new(
            MockTransport::new(50, vec![])
                .fail_tip(3)
                .cancel_after(1, token.clone()),
        );
        let reporter = Arc::new(RecordingReporter::default());
        let config = config(&tracked, 10, 5);

        let counter = counter(&config, transport.clone(), decoder, reporter, token);

        assert_eq!(run(counter).await, 16);
        assert_eq!(*transport.tip_calls.lock().unwrap(), 5);
        assert_eq!(transport.ranges(), vec![BlockRange { from: 10, to: 15 }]);
    }

    #[rstest]
    #[tokio::test]
    async fn test_retries_logs_without_advancing(decoder: AbiDecoder, tracked: Vec<Address>) {
        let token = CancellationToken::new();
        let logs = vec![validator_added_at(tracked[3], 12)];
        let transport = Arc::new(
            MockTransport::new(50, logs)
                .fail_logs(2)
                .cancel_after(1, token.clone()),
        );
        let reporter = Arc::new(RecordingReporter::default());
        let config = config(&tracked, 10, 5);

        let counter = counter(&config, transport.clone(), decoder, reporter, token);
        let counters = counter.counters().clone();

        assert_eq!(run(counter).await, 16);
        assert_eq!(*transport.tip_calls.lock().unwrap(), 4);
        assert_eq!(transport.ranges(), vec![BlockRange { from: 10, to: 15 }]);
        assert_eq!(counters.get(&tracked[3]).await, Some(1));
    }

    #[rstest]
    #[tokio::test]
    async fn test_cancel_during_backoff(decoder: AbiDecoder, tracked: Vec<Address>) {
        let token = CancellationToken::new();
        let transport = Arc::new(MockTransport::new(50, vec![]).fail_tip(usize::MAX));
        let reporter = Arc::new(RecordingReporter::default());
        let mut config = config(&tracked, 10, 5);
        config.sync.retry_backoff_ms = 60_000;

        let counter = counter(&config, transport.clone(), decoder, reporter, token.clone());
        let handle = tokio::spawn(counter.run());

        sleep(Duration::from_millis(20)).await;
        token.cancel();

        let cursor = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("counter did not stop")
            .unwrap();
        assert_eq!(cursor, 10);
        assert!(transport.ranges().is_empty());
    }

    #[rstest]
    #[tokio::test]
    async fn test_already_cancelled(decoder: AbiDecoder, tracked: Vec<Address>) {
        let token = CancellationToken::new();
        token.cancel();
        let transport = Arc::new(MockTransport::new(50, vec![]));
        let reporter = Arc::new(RecordingReporter::default());
        let config = config(&tracked, 7, 5);

        let counter = counter(&config, transport.clone(), decoder, reporter, token);

        assert_eq!(run(counter).await, 7);
        assert_eq!(*transport.tip_calls.lock().unwrap(), 0);
    }

    #[rstest]
    #[tokio::test]
    async fn test_stops_advancing_at_max_block(decoder: AbiDecoder, tracked: Vec<Address>) {
        let token = CancellationToken::new();
        let transport =
            Arc::new(MockTransport::new(u64::MAX, vec![]).cancel_after(3, token.clone()));
        let reporter = Arc::new(RecordingReporter::default());
        let config = config(&tracked, i64::MAX, i64::MAX);

        let counter = counter(&config, transport.clone(), decoder, reporter, token);

        assert_eq!(run(counter).await, u64::MAX);
        assert_eq!(
            transport.ranges(),
            vec![
                BlockRange {
                    from: i64::MAX as u64,
                    to: u64::MAX - 1
                },
                BlockRange {
                    from: u64::MAX,
                    to: u64::MAX
                },
                BlockRange {
                    from: u64::MAX,
                    to: u64::MAX
                },
            ]
        );
    }

    #[rstest]
    #[tokio::test]
    async fn test_huge_concurrency(decoder: AbiDecoder, tracked: Vec<Address>) {
        let token = CancellationToken::new();
        let logs = vec![validator_added_at(tracked[0], 3)];
        let transport = Arc::new(MockTransport::new(9, logs).cancel_after(1, token.clone()));
        let reporter = Arc::new(RecordingReporter::default());
        let mut config = config(&tracked, 0, 10);
        config.counter.concurrency = (1 << 61) + 1;
        assert_eq!(config.counter.validate(), Ok(()));

        let counter = counter(&config, transport, decoder, reporter.clone(), token);
        let counters = counter.counters().clone();

        assert_eq!(run(counter).await, 10);
        assert_eq!(counters.get(&tracked[0]).await, Some(1));
        assert_eq!(reporter.snapshots().len(), 1);
    }

    #[rstest]
    fn test_rejects_invalid_config(decoder: AbiDecoder, tracked: Vec<Address>) {
        let transport = Arc::new(MockTransport::new(0, vec![]));
        let reporter = Arc::new(RecordingReporter::default());

        let mut invalid = config(&tracked, 0, 5);
        invalid.counter.concurrency = 0;
        let result = NonceCounter::new(
            &invalid,
            transport.clone(),
            Arc::new(decoder.clone()),
            reporter.clone(),
            CancellationToken::new(),
        );
        assert_eq!(result.err(), Some(ConfigError::Concurrency));

        let mut malformed = config(&tracked, 0, 5);
        malformed.counter.addresses.push("0xnope".to_owned());
        let result = NonceCounter::new(
            &malformed,
            transport,
            Arc::new(decoder),
            reporter,
            CancellationToken::new(),
        );
        assert_eq!(
            result.err(),
            Some(ConfigError::InvalidAddress("0xnope".to_owned()))
        );
    }
}
