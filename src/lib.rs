//! Control network versioning and bundle adjustment results for planetary
//! photogrammetry.
//!
//! # Architecture
//!
//! - [`geometry`]: [`SurfacePoint`](geometry::SurfacePoint) with rectangular/spherical
//!   duality and Jacobian-based covariance propagation
//! - [`statistics`]: running accumulators and a dynamic cumulative probability estimator
//! - [`pvl`]: the nested object/group/keyword text model used by networks and reports
//! - [`control`]: in-memory control network (points, measures, provenance enums)
//! - [`versioner`]: format detection, schema migration, Pvl and binary persistence
//! - [`bundle`]: bundle observations, control point graph, robust weighting and
//!   [`BundleResults`](bundle::BundleResults) with its report/XML/binary/columnar forms
//! - [`io`]: XML tree, little-endian byte stream and columnar container plumbing

pub mod bundle;
pub mod config;
pub mod control;
pub mod error;
pub mod geometry;
pub mod io;
pub mod pvl;
pub mod statistics;
pub mod target;
pub mod versioner;

pub use error::{CoreError, Result};
