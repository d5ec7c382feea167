//! Torch components
pub mod batch;
pub mod distributions;
pub mod losses;
pub mod models;
pub mod modules;
