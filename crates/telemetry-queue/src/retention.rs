//! Retention ceilings and the oldest-first eviction planner.
//!
//! The planner is a pure function so it can be checked independently of
//! storage. The store calls it inside the insert transaction.

/// Default ceiling on queued events.
pub const DEFAULT_MAX_EVENTS: u64 = 10_000;

/// Default ceiling on queued payload bytes (10 MiB).
pub const DEFAULT_MAX_BYTES: u64 = 10 * 1024 * 1024;

/// Count and byte ceilings for the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionLimits {
    /// Maximum number of queued events.
    pub max_events: u64,
    /// Maximum total payload bytes.
    pub max_bytes: u64,
}

impl Default for RetentionLimits {
    fn default() -> Self {
        Self {
            max_events: DEFAULT_MAX_EVENTS,
            max_bytes: DEFAULT_MAX_BYTES,
        }
    }
}

impl RetentionLimits {
    /// Create limits with explicit ceilings.
    pub fn new(max_events: u64, max_bytes: u64) -> Self {
        Self {
            max_events,
            max_bytes,
        }
    }

    /// True when `count` and `bytes` are both within the ceilings.
    pub fn admits(&self, count: u64, bytes: u64) -> bool {
        count <= self.max_events && bytes <= self.max_bytes
    }
}

/// Number of oldest records to remove so both ceilings hold.
///
/// `lengths` yields payload sizes from oldest to newest. The walk removes
/// records strictly in order while either ceiling is violated and stops as
/// soon as both hold, so the result is the minimal purge and no further
/// lengths are pulled. If the input runs out first, every yielded record is
/// purged.
pub fn plan_purge<I>(count: u64, total_bytes: u64, lengths: I, limits: &RetentionLimits) -> usize
where
    I: IntoIterator<Item = u64>,
{
    let mut count = count;
    let mut bytes = total_bytes;
    let mut purge = 0;

    for len in lengths {
        if limits.admits(count, bytes) {
            break;
        }
        count = count.saturating_sub(1);
        bytes = bytes.saturating_sub(len);
        purge += 1;
    }

    purge
}

/// `plan_purge` over a plain list of lengths, oldest first.
pub fn plan_purge_lengths(lengths: &[u64], limits: &RetentionLimits) -> usize {
    let total = lengths.iter().fold(0u64, |acc, &len| acc.saturating_add(len));
    plan_purge(lengths.len() as u64, total, lengths.iter().copied(), limits)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn remaining(lengths: &[u64], purge: usize) -> (u64, u64) {
        let rest = &lengths[purge..];
        (rest.len() as u64, rest.iter().sum())
    }

    #[test]
    fn purges_oldest_when_count_exceeded() {
        let lengths = vec![20u64; 10_020];
        let limits = RetentionLimits::default();

        let purge = plan_purge_lengths(&lengths, &limits);
        assert_eq!(purge, 20);

        let (count, bytes) = remaining(&lengths, purge);
        assert_eq!(count, 10_000);
        assert!(bytes <= DEFAULT_MAX_BYTES);
    }

    #[test]
    fn purges_enough_when_bytes_exceeded() {
        // 250 x 50 KB = 12.5 MB
        let lengths = vec![50_000u64; 250];
        let limits = RetentionLimits::default();

        let purge = plan_purge_lengths(&lengths, &limits);
        let (count, bytes) = remaining(&lengths, purge);
        assert!(count <= DEFAULT_MAX_EVENTS);
        assert!(bytes <= DEFAULT_MAX_BYTES);

        // One fewer would still be over the byte ceiling.
        let (_, bytes_if_fewer) = remaining(&lengths, purge - 1);
        assert!(bytes_if_fewer > DEFAULT_MAX_BYTES);
        assert_eq!(purge, 41);
    }

    #[test]
    fn nothing_to_purge_within_limits() {
        let limits = RetentionLimits::new(3, 100);
        assert_eq!(plan_purge_lengths(&[10, 10, 10], &limits), 0);
        assert_eq!(plan_purge_lengths(&[], &limits), 0);
    }

    #[test]
    fn oversized_newest_record_purges_everything() {
        let limits = RetentionLimits::new(10, 100);
        assert_eq!(plan_purge_lengths(&[10, 10, 500], &limits), 3);
    }

    #[test]
    fn large_old_record_satisfies_bytes_early() {
        let limits = RetentionLimits::new(10, 100);
        // Removing the 90-byte head alone brings bytes back under the ceiling.
        assert_eq!(plan_purge_lengths(&[90, 10, 10, 10], &limits), 1);
    }

    #[test]
    fn stale_totals_never_underflow() {
        let limits = RetentionLimits::new(0, 0);
        let lengths = [50, 50];
        assert_eq!(plan_purge(1, 10, lengths, &limits), 1);
        assert_eq!(plan_purge(u64::MAX, u64::MAX, lengths, &limits), 2);
    }

    #[test]
    fn stops_reading_once_ceilings_hold() {
        let limits = RetentionLimits::new(10_000, u64::MAX);
        let mut pulled = 0;
        let lengths = std::iter::repeat(20u64).take(10_001).inspect(|_| pulled += 1);

        assert_eq!(plan_purge(10_001, 200_020, lengths, &limits), 1);
        // One record to evict, one more to observe that the ceilings hold.
        assert!(pulled <= 2);
    }
}
