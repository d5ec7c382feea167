//! General utilities
pub mod fmt;
pub mod stats;
