//! Geometry: angles and surface points with covariance propagation.

pub mod angle;
pub mod surface_point;

pub use angle::Angle;
pub use surface_point::{round_off, SurfacePoint};
