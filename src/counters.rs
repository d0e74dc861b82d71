use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use alloy_primitives::Address;
use rand::{rngs::StdRng, SeedableRng};
use scalable_cuckoo_filter::{DefaultHasher, ScalableCuckooFilter, ScalableCuckooFilterBuilder};
use tokio::sync::RwLock;

/// Fixed set of addresses whose events are counted
#[derive(Debug)]
pub struct TrackedAddresses {
    addresses: BTreeSet<Address>,

    /// Cuckoo filter for fast address inclusion check
    cuckoo: ScalableCuckooFilter<Address, DefaultHasher, StdRng>,
}

impl TrackedAddresses {
    pub fn new(addresses: impl IntoIterator<Item = Address>) -> Self {
        let addresses: BTreeSet<_> = addresses.into_iter().collect();
        let mut cuckoo = ScalableCuckooFilterBuilder::new()
            .initial_capacity(addresses.len().max(1))
            .rng(StdRng::from_entropy())
            .finish();

        addresses.iter().for_each(|addr| {
            cuckoo.insert(addr);
        });

        Self { addresses, cuckoo }
    }

    pub fn contains(&self, address: &Address) -> bool {
        self.cuckoo.contains(address) && self.addresses.contains(address)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Address> {
        self.addresses.iter()
    }

    pub fn len(&self) -> usize {
        self.addresses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.addresses.is_empty()
    }
}

/// Shared event counts, one per tracked address.
///
/// Keys are fixed at construction. Increments and snapshots are serialized
/// through a single reader/writer lock.
#[derive(Debug, Clone)]
pub struct Counters {
    tracked: Arc<TrackedAddresses>,
    counts: Arc<RwLock<BTreeMap<Address, u64>>>,
}

impl Counters {
    pub fn new(tracked: TrackedAddresses) -> Self {
        let counts = tracked.iter().map(|a| (*a, 0)).collect();

        Self {
            tracked: Arc::new(tracked),
            counts: Arc::new(RwLock::new(counts)),
        }
    }

    /// Adds one to `address`'s count. Returns false, without touching the map, if the address is
    /// not tracked
    pub async fn increment(&self, address: &Address) -> bool {
        if !self.tracked.contains(address) {
            return false;
        }

        let mut counts = self.counts.write().await;
        match counts.get_mut(address) {
            Some(count) => {
                *count += 1;
                true
            }
            None => false,
        }
    }

    pub async fn get(&self, address: &Address) -> Option<u64> {
        self.counts.read().await.get(address).copied()
    }

    pub async fn snapshot(&self) -> Snapshot {
        Snapshot(self.counts.read().await.clone())
    }

    pub fn tracked(&self) -> &TrackedAddresses {
        &self.tracked
    }
}

/// Point-in-time copy of all counts, ordered by address
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot(BTreeMap<Address, u64>);

impl Snapshot {
    pub fn get(&self, address: &Address) -> Option<u64> {
        self.0.get(address).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Address, &u64)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn total(&self) -> u64 {
        self.0.values().sum()
    }
}
