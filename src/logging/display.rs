//! Command-line logger
use super::chunk::{ChunkLogger, ChunkSummary, Chunker, SummaryWriter};
use super::{ByTime, Id, LogError, Loggable, StatsLogger};
use crate::utils::fmt::{DisplayFn, PrettyPrint};
use std::fmt;
use std::time::Duration;
use yansi::Paint;

/// Logger that displays summaries of loss statistics to standard output.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct DisplayLogger<C: Chunker = ByTime>(ChunkLogger<C, DisplayBackend>);

impl<C: Chunker> DisplayLogger<C> {
    #[inline]
    pub fn new(chunker: C) -> Self {
        Self(ChunkLogger::new(chunker, DisplayBackend))
    }
}

impl<C: Chunker> StatsLogger for DisplayLogger<C> {
    #[inline]
    fn group_start(&mut self) {
        self.0.group_start()
    }
    #[inline]
    fn group_log(&mut self, id: Id, value: Loggable) -> Result<(), LogError> {
        self.0.group_log(id, value)
    }
    #[inline]
    fn group_end(&mut self) {
        self.0.group_end()
    }
    #[inline]
    fn flush(&mut self) {
        self.0.flush()
    }
}

/// Logging backend that displays summaries to standard output.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash)]
pub struct DisplayBackend;

impl SummaryWriter for DisplayBackend {
    fn write_summaries<'a, I>(&mut self, summaries: I, elapsed: Duration)
    where
        I: Iterator<Item = (&'a Id, &'a ChunkSummary)>,
    {
        let mut summaries = summaries.peekable();
        if summaries.peek().is_none() {
            return;
        }
        println!();
        println!("{}", Paint::fixed(8, DisplayFn(|f| write!(f, "[{:.1?}]", elapsed))));
        for (id, summary) in summaries {
            println!("{:<32} {}", Paint::fixed(35, id), DisplaySummary(summary));
        }
    }
}

#[derive(Debug)]
struct DisplaySummary<'a>(&'a ChunkSummary);

impl<'a> fmt::Display for DisplaySummary<'a> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.0 {
            ChunkSummary::Nothing => Ok(()),
            ChunkSummary::Counter {
                increment,
                initial_value,
            } => write!(
                f,
                "{}  (+{})",
                initial_value + increment,
                Paint::fixed(253, increment)
            ),
            ChunkSummary::Scalar { stats } => {
                if let Some(mean) = stats.mean() {
                    write!(f, "{:.4}", PrettyPrint(mean))?;
                }
                if stats.count() > 1 {
                    if let Some(stddev) = stats.stddev() {
                        write!(
                            f,
                            " {}",
                            Paint::fixed(
                                8,
                                DisplayFn(|f| write!(f, "(σ {:.3}, n {})", PrettyPrint(stddev), stats.count()))
                            )
                        )?;
                    }
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::stats::OnlineMeanVariance;

    #[test]
    fn scalar_summary_shows_mean() {
        Paint::disable();
        let summary = ChunkSummary::Scalar {
            stats: [0.5, 1.5].into_iter().collect::<OnlineMeanVariance<f64>>(),
        };
        assert_eq!(
            DisplaySummary(&summary).to_string(),
            "1.0000 (σ 0.500, n 2)"
        );
    }

    #[test]
    fn counter_summary_shows_total() {
        Paint::disable();
        let summary = ChunkSummary::Counter {
            increment: 2,
            initial_value: 3,
        };
        assert_eq!(DisplaySummary(&summary).to_string(), "5  (+2)");
    }
}
