#![cfg(test)]

use std::sync::Mutex;

use alloy_primitives::{Address, B256, U64};
use async_trait::async_trait;
use color_eyre::eyre::{eyre, Result};
use ethers_core::abi::{self, Token};
use tokio_util::sync::CancellationToken;

use crate::counters::Snapshot;
use crate::decoder::AbiDecoder;
use crate::report::Reporter;
use crate::sync::{BlockRange, ChainTransport, RawLog};

pub const ABI: &str = r#"[
  {
    "type": "event",
    "name": "ValidatorAdded",
    "anonymous": false,
    "inputs": [
      { "name": "owner", "type": "address", "indexed": true },
      { "name": "operatorIds", "type": "uint64[]", "indexed": false },
      { "name": "publicKey", "type": "bytes", "indexed": false },
      { "name": "shares", "type": "bytes", "indexed": false }
    ]
  }
]"#;

#[rstest::fixture]
pub fn decoder() -> AbiDecoder {
    AbiDecoder::new(ABI, "ValidatorAdded", "owner").unwrap()
}

#[rstest::fixture]
pub fn tracked() -> Vec<Address> {
    [
        "0xfc4b7d410Aa23bab793Ea7694D182f5c93f32aB2",
        "0x9a8e8762CE71B669250e964d5262C390416aB3BA",
        "0x350e4F967A62714492Ce180f4035036Dd193B733",
        "0x83110aa1EC834f93f779Fb89e93550140f5397A7",
    ]
    .iter()
    .map(|a| a.to_ascii_lowercase().parse().unwrap())
    .collect()
}

#[rstest::fixture]
pub fn untracked() -> Address {
    "0xacc3139dd26197669012930c9daacecbe260c856".parse().unwrap()
}

pub fn raw_log(topics: Vec<B256>, data: Vec<u8>) -> RawLog {
    RawLog {
        topics,
        data: data.into(),
        ..Default::default()
    }
}

/// An ABI-encoded `ValidatorAdded` log owned by `owner`
pub fn validator_added(owner: Address) -> RawLog {
    let topic0 = AbiDecoder::new(ABI, "ValidatorAdded", "owner")
        .unwrap()
        .topic0();
    let data = abi::encode(&[
        Token::Array(vec![Token::Uint(1u64.into()), Token::Uint(2u64.into())]),
        Token::Bytes(vec![0xaa; 48]),
        Token::Bytes(vec![0xbb; 64]),
    ]);

    raw_log(vec![topic0.0.into(), owner.into_word()], data)
}

/// Same as [`validator_added`], tagged with a block number
pub fn validator_added_at(owner: Address, block: u64) -> RawLog {
    RawLog {
        block_number: Some(U64::from(block)),
        ..validator_added(owner)
    }
}

/// In-memory chain.
///
/// Tip and log fetches fail the scripted number of times first. Once `cancel_after` log fetches
/// were served, the next tip fetch cancels the token and fails, so the loop stops between
/// batches
pub struct MockTransport {
    pub tip: Mutex<u64>,
    pub logs: Vec<RawLog>,
    pub tip_failures: Mutex<usize>,
    pub logs_failures: Mutex<usize>,
    pub ranges: Mutex<Vec<BlockRange>>,
    pub tip_calls: Mutex<usize>,
    pub cancel_after: Option<(usize, CancellationToken)>,
}

impl MockTransport {
    pub fn new(tip: u64, logs: Vec<RawLog>) -> Self {
        Self {
            tip: Mutex::new(tip),
            logs,
            tip_failures: Default::default(),
            logs_failures: Default::default(),
            ranges: Default::default(),
            tip_calls: Default::default(),
            cancel_after: None,
        }
    }

    pub fn cancel_after(mut self, fetches: usize, token: CancellationToken) -> Self {
        self.cancel_after = Some((fetches, token));
        self
    }

    pub fn fail_tip(self, times: usize) -> Self {
        *self.tip_failures.lock().unwrap() = times;
        self
    }

    pub fn fail_logs(self, times: usize) -> Self {
        *self.logs_failures.lock().unwrap() = times;
        self
    }

    pub fn ranges(&self) -> Vec<BlockRange> {
        self.ranges.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChainTransport for MockTransport {
    async fn current_tip(&self) -> Result<u64> {
        *self.tip_calls.lock().unwrap() += 1;

        if let Some((after, token)) = &self.cancel_after {
            if self.ranges.lock().unwrap().len() >= *after {
                token.cancel();
                return Err(eyre!("shutting down"));
            }
        }

        if take_failure(&self.tip_failures) {
            return Err(eyre!("connection refused"));
        }

        Ok(*self.tip.lock().unwrap())
    }

    async fn fetch_logs(&self, range: BlockRange, _contract: Address) -> Result<Vec<RawLog>> {
        if take_failure(&self.logs_failures) {
            return Err(eyre!("query returned more than 10000 results"));
        }

        self.ranges.lock().unwrap().push(range);

        Ok(self
            .logs
            .iter()
            .filter(|log| {
                let block = log.block_number.map(|b| b.to::<u64>()).unwrap_or_default();
                (range.from..=range.to).contains(&block)
            })
            .cloned()
            .collect())
    }
}

fn take_failure(failures: &Mutex<usize>) -> bool {
    let mut failures = failures.lock().unwrap();
    if *failures == 0 {
        return false;
    }
    *failures -= 1;
    true
}

/// Keeps every snapshot it receives
#[derive(Default)]
pub struct RecordingReporter {
    pub snapshots: Mutex<Vec<Snapshot>>,
}

impl RecordingReporter {
    pub fn snapshots(&self) -> Vec<Snapshot> {
        self.snapshots.lock().unwrap().clone()
    }
}

impl Reporter for RecordingReporter {
    fn report(&self, snapshot: &Snapshot) {
        self.snapshots.lock().unwrap().push(snapshot.clone());
    }
}
