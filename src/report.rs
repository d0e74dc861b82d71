use tracing::info;

use crate::counters::Snapshot;

/// Receives the counts every time a batch changed at least one of them
pub trait Reporter: Send + Sync {
    fn report(&self, snapshot: &Snapshot);
}

/// Emits one log event per tracked address
#[derive(Debug, Default, Clone, Copy)]
pub struct LogReporter;

impl Reporter for LogReporter {
    fn report(&self, snapshot: &Snapshot) {
        info!(total = snapshot.total(), "nonces updated");

        for (address, count) in snapshot.iter() {
            info!(%address, count, "nonce");
        }
    }
}
