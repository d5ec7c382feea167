use super::{Id, LogError, Loggable, StatsLogger};
use crate::utils::stats::OnlineMeanVariance;
use std::collections::{btree_map::Entry, BTreeMap};
use std::ops::Drop;
use std::time::{Duration, Instant};

/// Control the aggregation of logs into summaries and summaries into chunks.
pub trait Chunker: Send {
    /// Start a new log group and decide whether to flush.
    #[inline]
    fn flush_group_start(&mut self) -> bool {
        false
    }
    /// End the current group and decide whether to flush.
    #[inline]
    fn flush_group_end(&mut self) -> bool {
        false
    }
    /// Indicate that the current chunk has been flushed
    fn note_flush(&mut self);
}

/// Write out summaries to a backend.
pub trait SummaryWriter: Send {
    fn write_summaries<'a, I>(&mut self, summaries: I, elapsed: Duration)
    where
        I: Iterator<Item = (&'a Id, &'a ChunkSummary)>;
}

/// Logs time series statistics by breaking the time series into chunks and summarizing each chunk.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkLogger<C: Chunker, W: SummaryWriter> {
    chunker: C,
    writer: W,

    // A binary tree is used so that keys are retrieved in sorted order
    summaries: BTreeMap<Id, Node>,

    // Start time of the current chunk.
    chunk_start: Instant,
}

impl<C: Chunker, W: SummaryWriter> ChunkLogger<C, W> {
    pub fn new(chunker: C, writer: W) -> Self {
        Self {
            chunker,
            writer,
            summaries: BTreeMap::new(),
            chunk_start: Instant::now(),
        }
    }
}

impl<C: Chunker + Default, W: SummaryWriter + Default> Default for ChunkLogger<C, W> {
    fn default() -> Self {
        Self::new(C::default(), W::default())
    }
}

impl<C: Chunker, W: SummaryWriter> StatsLogger for ChunkLogger<C, W> {
    fn group_start(&mut self) {
        if self.chunker.flush_group_start() {
            self.flush();
        }
    }

    fn group_log(&mut self, id: Id, value: Loggable) -> Result<(), LogError> {
        match self.summaries.entry(id) {
            Entry::Vacant(e) => {
                e.insert(Node::new(value.into()));
            }
            Entry::Occupied(e) => e.into_mut().push(value)?,
        };
        Ok(())
    }

    fn group_end(&mut self) {
        if self.chunker.flush_group_end() {
            self.flush()
        }
    }

    fn flush(&mut self) {
        self.writer.write_summaries(
            self.summaries
                .iter()
                .filter(|(_, node)| node.dirty)
                .map(|(id, node)| (id, &node.summary)),
            self.chunk_start.elapsed(),
        );

        for node in self.summaries.values_mut() {
            node.reset();
        }
        self.chunk_start = Instant::now();
        self.chunker.note_flush();
    }
}

/// Flush when dropped
impl<C: Chunker, W: SummaryWriter> Drop for ChunkLogger<C, W> {
    fn drop(&mut self) {
        self.flush();
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Node {
    /// Variable chunk summary
    summary: ChunkSummary,
    /// Whether the summary has been updated in this chunk
    dirty: bool,
}

impl Node {
    const fn new(summary: ChunkSummary) -> Self {
        Self {
            summary,
            dirty: true,
        }
    }

    fn push(&mut self, value: Loggable) -> Result<(), LogError> {
        self.summary.push(value)?;
        self.dirty = true;
        Ok(())
    }

    fn reset(&mut self) {
        self.dirty = false;
        self.summary.reset()
    }
}

/// Summary of the values logged under one id within a chunk.
#[derive(Debug, Clone, PartialEq)]
pub enum ChunkSummary {
    Nothing,
    Counter { increment: u64, initial_value: u64 },
    Scalar { stats: OnlineMeanVariance<f64> },
}

impl From<Loggable> for ChunkSummary {
    fn from(value: Loggable) -> Self {
        match value {
            Loggable::Nothing => Self::Nothing,
            Loggable::CounterIncrement(i) => Self::Counter {
                increment: i,
                initial_value: 0,
            },
            Loggable::Scalar(v) => {
                let mut stats = OnlineMeanVariance::default();
                stats.push(v);
                Self::Scalar { stats }
            }
        }
    }
}

impl ChunkSummary {
    /// Add a value to the summary
    ///
    /// Returns an error and does not insert the value if it is incompatible with the current
    /// summary, which happens if the summary was created from a different loggable variant.
    fn push(&mut self, value: Loggable) -> Result<(), LogError> {
        match (self, value) {
            (Self::Nothing, Loggable::Nothing) => {}
            (Self::Counter { increment, .. }, Loggable::CounterIncrement(i)) => {
                *increment += i;
            }
            (Self::Scalar { stats }, Loggable::Scalar(v)) => stats.push(v),
            (summary, value) => {
                return Err(LogError::IncompatibleValue {
                    prev: summary.loggable_variant_name(),
                    now: value.variant_name(),
                })
            }
        };
        Ok(())
    }

    /// Reset for the start of the next chunk.
    fn reset(&mut self) {
        match self {
            Self::Nothing => {}
            Self::Counter {
                increment,
                initial_value,
            } => {
                *initial_value += *increment;
                *increment = 0
            }
            Self::Scalar { stats } => *stats = OnlineMeanVariance::default(),
        }
    }

    /// The name of the associated loggable variant
    const fn loggable_variant_name(&self) -> &'static str {
        match self {
            Self::Nothing => "Nothing",
            Self::Counter { .. } => "CounterIncrement",
            Self::Scalar { .. } => "Scalar",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// Flushes at the end of every group.
    #[derive(Debug, Default)]
    struct EveryGroup;

    impl Chunker for EveryGroup {
        fn flush_group_end(&mut self) -> bool {
            true
        }
        fn note_flush(&mut self) {}
    }

    /// Never flushes on its own.
    #[derive(Debug, Default)]
    struct Never;

    impl Chunker for Never {
        fn note_flush(&mut self) {}
    }

    /// Records the ids and means of written scalar summaries.
    #[derive(Debug, Default, Clone)]
    struct Recorder(Arc<Mutex<Vec<Vec<(String, f64)>>>>);

    impl SummaryWriter for Recorder {
        fn write_summaries<'a, I>(&mut self, summaries: I, _elapsed: Duration)
        where
            I: Iterator<Item = (&'a Id, &'a ChunkSummary)>,
        {
            let chunk = summaries
                .filter_map(|(id, summary)| match summary {
                    ChunkSummary::Scalar { stats } => Some((id.to_string(), stats.mean()?)),
                    _ => None,
                })
                .collect();
            self.0.lock().unwrap().push(chunk);
        }
    }

    #[test]
    fn scalar_mean_within_chunk() {
        let recorder = Recorder::default();
        {
            let mut logger = ChunkLogger::new(Never, recorder.clone());
            logger.log_scalar("loss", 1.0).unwrap();
            logger.log_scalar("loss", 3.0).unwrap();
        }
        let chunks = recorder.0.lock().unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0], vec![("loss".to_string(), 2.0)]);
    }

    #[test]
    fn flush_only_dirty_summaries() {
        let recorder = Recorder::default();
        {
            let mut logger = ChunkLogger::new(EveryGroup, recorder.clone());
            logger.log_scalar("a", 1.0).unwrap();
            logger.log_scalar("b", 2.0).unwrap();
        }
        let chunks = recorder.0.lock().unwrap();
        assert_eq!(chunks[0], vec![("a".to_string(), 1.0)]);
        assert_eq!(chunks[1], vec![("b".to_string(), 2.0)]);
    }

    #[test]
    fn incompatible_value_is_error() {
        let mut logger = ChunkLogger::new(Never, Recorder::default());
        logger.log_scalar("x", 1.0).unwrap();
        assert_eq!(
            logger.log("x".into(), Loggable::CounterIncrement(1)),
            Err(LogError::IncompatibleValue {
                prev: "Scalar",
                now: "CounterIncrement"
            })
        );
    }
}
