use super::chunk::Chunker;
use coarsetime::{Duration as CDuration, Instant as CInstant};
use std::time::Duration;

/// Summarize loss statistics over fixed wall-clock intervals.
///
/// Used as the chunker of a [`ChunkLogger`][super::ChunkLogger].
/// A loss evaluation logs one group per call so the interval check happens once per evaluation.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct ByTime {
    /// Length of each summary interval.
    pub interval: CDuration,
    // Coarse clock; only compared against intervals on the order of seconds.
    interval_start: CInstant,
}

impl ByTime {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval: CDuration::new(interval.as_secs(), interval.subsec_nanos()),
            interval_start: CInstant::now(),
        }
    }

    /// Whether the current interval has run out.
    fn expired(&self) -> bool {
        self.interval_start.elapsed() > self.interval
    }
}

impl Default for ByTime {
    fn default() -> Self {
        Self::new(Duration::from_secs(5))
    }
}

impl Chunker for ByTime {
    #[inline]
    fn flush_group_start(&mut self) -> bool {
        // Checked before the group so that one evaluation is never split across intervals.
        self.expired()
    }

    fn note_flush(&mut self) {
        self.interval_start = CInstant::now();
    }
}
