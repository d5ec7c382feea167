//! Logging statistics from loss evaluations
mod chunk;
mod chunk_by_time;
mod display;
mod tensorboard;

pub use chunk::{ChunkLogger, ChunkSummary, Chunker, SummaryWriter};
pub use chunk_by_time::ByTime;
pub use display::{DisplayBackend, DisplayLogger};
pub use tensorboard::{TensorBoardBackend, TensorBoardLogger};

use smallvec::SmallVec;
use std::borrow::Cow;
use std::fmt;
use thiserror::Error;

/// A value that can be logged.
#[derive(Debug, Clone, PartialEq)]
pub enum Loggable {
    /// Nothing. No data to log.
    ///
    /// Logging `Nothing` may still produce a placeholder entry for the name.
    Nothing,
    /// Increment a counter.
    CounterIncrement(u64),
    /// A scalar value. Aggregated by taking means.
    Scalar(f64),
}

impl Loggable {
    /// The name of this variant
    pub const fn variant_name(&self) -> &'static str {
        match self {
            Self::Nothing => "Nothing",
            Self::CounterIncrement(_) => "CounterIncrement",
            Self::Scalar(_) => "Scalar",
        }
    }
}

impl From<f64> for Loggable {
    fn from(value: f64) -> Self {
        Self::Scalar(value)
    }
}

impl From<f32> for Loggable {
    fn from(value: f32) -> Self {
        Self::Scalar(value.into())
    }
}

/// Identifier of a logged value: a name within a (possibly empty) namespace.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Id {
    namespace: SmallVec<[&'static str; 4]>,
    name: Cow<'static, str>,
}

impl Id {
    pub fn new<T: Into<Cow<'static, str>>>(name: T) -> Self {
        Self {
            namespace: SmallVec::new(),
            name: name.into(),
        }
    }

    /// Add a scope to the front of the namespace.
    #[must_use]
    pub fn with_prefix(mut self, scope: &'static str) -> Self {
        self.namespace.insert(0, scope);
        self
    }
}

impl From<&'static str> for Id {
    fn from(name: &'static str) -> Self {
        Self::new(name)
    }
}

impl From<String> for Id {
    fn from(name: String) -> Self {
        Self::new(name)
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for scope in &self.namespace {
            write!(f, "{}/", scope)?;
        }
        write!(f, "{}", self.name)
    }
}

/// Error logging a value.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LogError {
    #[error("incompatible value type; previously {prev} now {now}")]
    IncompatibleValue {
        prev: &'static str,
        now: &'static str,
    },
}

/// Log statistics from loss evaluations.
///
/// Values are logged in groups; a chunking logger never splits one group across summaries.
pub trait StatsLogger {
    /// Start a new group of values.
    fn group_start(&mut self);

    /// Log a value within the current group.
    ///
    /// # Returns
    /// An error if the value is structurally incompatible with previous values logged under
    /// the same id.
    fn group_log(&mut self, id: Id, value: Loggable) -> Result<(), LogError>;

    /// End the current group.
    fn group_end(&mut self);

    /// Write out any pending summaries.
    fn flush(&mut self);

    /// Log a single value as its own group.
    fn log(&mut self, id: Id, value: Loggable) -> Result<(), LogError> {
        self.group_start();
        let result = self.group_log(id, value);
        self.group_end();
        result
    }

    /// Log a single scalar value as its own group.
    fn log_scalar(&mut self, name: &'static str, value: f64) -> Result<(), LogError> {
        self.log(name.into(), Loggable::Scalar(value))
    }

    /// Wrap this logger so that all ids are prefixed by `scope`.
    fn with_scope(&mut self, scope: &'static str) -> ScopedLogger<Self>
    where
        Self: Sized,
    {
        ScopedLogger::new(self, scope)
    }
}

/// The unit logger discards everything.
impl StatsLogger for () {
    fn group_start(&mut self) {}
    fn group_log(&mut self, _: Id, _: Loggable) -> Result<(), LogError> {
        Ok(())
    }
    fn group_end(&mut self) {}
    fn flush(&mut self) {}
}

impl<T: StatsLogger + ?Sized> StatsLogger for &'_ mut T {
    #[inline]
    fn group_start(&mut self) {
        T::group_start(self)
    }
    #[inline]
    fn group_log(&mut self, id: Id, value: Loggable) -> Result<(), LogError> {
        T::group_log(self, id, value)
    }
    #[inline]
    fn group_end(&mut self) {
        T::group_end(self)
    }
    #[inline]
    fn flush(&mut self) {
        T::flush(self)
    }
}

/// Logger that prefixes all ids with a scope.
#[derive(Debug)]
pub struct ScopedLogger<'a, L: ?Sized> {
    logger: &'a mut L,
    scope: &'static str,
}

impl<'a, L: ?Sized> ScopedLogger<'a, L> {
    pub fn new(logger: &'a mut L, scope: &'static str) -> Self {
        Self { logger, scope }
    }
}

impl<'a, L: StatsLogger + ?Sized> StatsLogger for ScopedLogger<'a, L> {
    fn group_start(&mut self) {
        self.logger.group_start()
    }
    fn group_log(&mut self, id: Id, value: Loggable) -> Result<(), LogError> {
        self.logger.group_log(id.with_prefix(self.scope), value)
    }
    fn group_end(&mut self) {
        self.logger.group_end()
    }
    fn flush(&mut self) {
        self.logger.flush()
    }
}

/// A group of scalar values logged together under one scope.
///
/// The group is started on creation and ended when dropped.
pub struct LogGroup<'a> {
    logger: &'a mut dyn StatsLogger,
    scope: &'static str,
}

impl<'a> LogGroup<'a> {
    pub fn new(logger: &'a mut dyn StatsLogger, scope: &'static str) -> Self {
        logger.group_start();
        Self { logger, scope }
    }

    /// Log a scalar within the group.
    pub fn log_scalar(&mut self, name: &'static str, value: f64) -> Result<(), LogError> {
        self.logger
            .group_log(Id::new(name).with_prefix(self.scope), Loggable::Scalar(value))
    }
}

impl Drop for LogGroup<'_> {
    fn drop(&mut self) {
        self.logger.group_end()
    }
}

impl fmt::Debug for LogGroup<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("LogGroup")
            .field("scope", &self.scope)
            .finish()
    }
}


#[cfg(test)]
mod tests {
    use super::testing::RecordingLogger;
    use super::*;

    #[test]
    fn id_display_with_scopes() {
        let id = Id::new("loss").with_prefix("inner").with_prefix("outer");
        assert_eq!(id.to_string(), "outer/inner/loss");
    }

    #[test]
    fn scoped_logger_prefixes_ids() {
        let mut logger = RecordingLogger::default();
        logger.with_scope("sac").log_scalar("alpha", 0.5).unwrap();
        assert_eq!(logger.scalar("sac/alpha"), Some(0.5));
        assert_eq!(logger.groups, 1);
    }

    #[test]
    fn log_group_ends_on_drop() {
        let mut logger = RecordingLogger::default();
        {
            let mut group = LogGroup::new(&mut logger, "pg");
            group.log_scalar("entropy", 1.0).unwrap();
            group.log_scalar("loss", 2.0).unwrap();
        }
        assert_eq!(logger.groups, 1);
        assert_eq!(logger.scalar("pg/entropy"), Some(1.0));
        assert_eq!(logger.scalar("pg/loss"), Some(2.0));
    }

    #[test]
    fn unit_logger_accepts_anything() {
        let mut logger = ();
        assert!(logger.log(Id::new("x"), Loggable::Nothing).is_ok());
    }
}
