pub mod config;
pub mod counters;
pub mod decoder;
pub mod report;
pub mod sync;
mod test_utils;
