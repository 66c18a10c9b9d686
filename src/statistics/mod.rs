//! Numeric accumulators used for residual and sigma reporting.
//!
//! - [`Statistics`]: sums, moments, extrema and counts
//! - [`CumulativeProbabilityCalculator`]: streaming quantile estimation used
//!   for robust-estimation tuning and residual reporting

pub mod accumulator;
pub mod cum_prob;

pub use accumulator::Statistics;
pub use cum_prob::{CumulativeProbabilityCalculator, PERCENTILE_NODES};
