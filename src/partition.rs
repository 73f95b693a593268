//! Splitting the log into fixed-size batches
//!
//! Only whole batches are scheduled. With a tree size of 2500 and a batch size
//! of 1024, batches 0 and 1 are fetched and the last 452 entries are not.

use crate::types::BatchIndex;

/// Number of full batches in a log of `log_size` entries
pub fn batch_count(log_size: u64, batch_size: u64) -> u64 {
    log_size.checked_div(batch_size).unwrap_or(0)
}

/// Trailing entries past the last full batch, which are never fetched
pub fn dropped_tail(log_size: u64, batch_size: u64) -> u64 {
    log_size.checked_rem(batch_size).unwrap_or(log_size)
}

/// Batch indices `0..floor(log_size / batch_size)`, ascending
///
/// A zero `batch_size` yields nothing; configuration validation rejects it
/// before a run gets here.
pub fn partition(log_size: u64, batch_size: u64) -> impl Iterator<Item = BatchIndex> {
    (0..batch_count(log_size, batch_size)).map(BatchIndex)
}
