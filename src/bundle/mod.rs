//! Bundle adjustment bookkeeping.
//!
//! # Components
//!
//! - [`BundleSettings`]: solve options, convergence criterion and robust tiers
//! - [`BundleObservationVector`]: per-image solve parameters keyed by serial number
//! - [`BundleGraph`]: points and measures that take part in the adjustment,
//!   with their weights, residuals and outlier rejection
//! - [`MaximumLikelihoodWFunctions`]: robust weighting models
//! - [`BundleResults`]: summary statistics of a run, persisted as a Pvl
//!   report, XML, a binary stream or a columnar group
//! - [`CorrelationMatrix`]: where the parameter correlations were written

pub mod control_point;
pub mod correlation_matrix;
pub mod ml_wfunctions;
pub mod observation;
pub mod results;
pub mod results_io;
pub mod settings;

pub use control_point::{BundleControlPoint, BundleGraph, BundleMeasure};
pub use correlation_matrix::CorrelationMatrix;
pub use ml_wfunctions::{MaximumLikelihoodModel, MaximumLikelihoodWFunctions};
pub use observation::{
    BundleObservation, BundleObservationVector, ObservationSolveSettings, PointingOption,
    PositionOption,
};
pub use results::{BundleResults, SigmaRange};
pub use settings::{
    BundleSettings, ConvergenceCriteria, MaximumLikelihoodTier, MAX_MAXIMUM_LIKELIHOOD_TIERS,
};
