/// Inclusive block interval requested from the chain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockRange {
    pub from: u64,
    pub to: u64,
}

impl BlockRange {
    /// Next range to scan, starting at `cursor` and spanning up to `batch_size` blocks past it.
    /// Never goes past `tip`. A cursor already past the tip is pulled back onto it.
    pub fn next(cursor: u64, tip: u64, batch_size: u64) -> Self {
        let mut from = cursor;
        let mut to = cursor.saturating_add(batch_size);

        if to >= tip {
            to = tip;
        }

        if from > to {
            from = to;
        }

        Self { from, to }
    }
}
