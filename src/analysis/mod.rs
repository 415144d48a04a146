//! Aggregation engine.
//!
//! Density, fraction and ranking computations over population records.

pub mod aggregator;

pub use aggregator::*;
