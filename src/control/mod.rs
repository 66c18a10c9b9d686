//! Control network model.
//!
//! A [`ControlNet`] owns ordered [`ControlPoint`]s; each point owns the
//! [`ControlMeasure`]s observing it. Provenance and type information is
//! carried by closed enums in [`types`].

pub mod measure;
pub mod network;
pub mod point;
pub mod types;

pub use measure::ControlMeasure;
pub use network::{ControlNet, NetworkHeader};
pub use point::ControlPoint;
pub use types::{
    MeasureLogData, MeasureLogKind, MeasureType, PointType, RadiusSource, SurfacePointSource,
};
