//! Control points: a ground location and its image measures.

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::geometry::SurfacePoint;

use super::measure::ControlMeasure;
use super::types::{PointType, RadiusSource, SurfacePointSource};

/// A ground point observed in one or more images.
///
/// At most one measure is the reference measure; [`ControlPoint::set_reference`]
/// is the only way to choose it.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ControlPoint {
    pub id: String,
    pub point_type: PointType,
    pub chooser_name: String,
    pub date_time: String,
    pub edit_lock: bool,
    pub ignore: bool,
    pub jigsaw_rejected: bool,

    pub apriori_surface_point_source: SurfacePointSource,
    pub apriori_surface_point_source_file: Option<String>,
    pub apriori_radius_source: RadiusSource,
    pub apriori_radius_source_file: Option<String>,

    pub apriori_surface_point: Option<SurfacePoint>,
    /// Solver output.
    pub adjusted_surface_point: Option<SurfacePoint>,

    pub latitude_constrained: bool,
    pub longitude_constrained: bool,
    pub radius_constrained: bool,

    measures: Vec<ControlMeasure>,
    reference_index: Option<usize>,
}

impl ControlPoint {
    pub fn new(id: impl Into<String>, point_type: PointType) -> Self {
        Self {
            id: id.into(),
            point_type,
            ..Default::default()
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Measures
    // ─────────────────────────────────────────────────────────────────────────

    /// Append a measure. A point observes each image at most once.
    pub fn add_measure(&mut self, measure: ControlMeasure) -> Result<()> {
        if self.has_serial_number(&measure.serial_number) {
            return Err(CoreError::InvalidState(format!(
                "Control point [{}] already has a measure for image [{}]",
                self.id, measure.serial_number
            )));
        }
        self.measures.push(measure);
        Ok(())
    }

    pub fn measures(&self) -> &[ControlMeasure] {
        &self.measures
    }

    pub fn measures_mut(&mut self) -> &mut [ControlMeasure] {
        &mut self.measures
    }

    pub fn measure(&self, serial_number: &str) -> Option<&ControlMeasure> {
        self.measures.iter().find(|m| m.serial_number == serial_number)
    }

    pub fn measure_mut(&mut self, serial_number: &str) -> Option<&mut ControlMeasure> {
        self.measures.iter_mut().find(|m| m.serial_number == serial_number)
    }

    pub fn has_serial_number(&self, serial_number: &str) -> bool {
        self.measure(serial_number).is_some()
    }

    pub fn num_measures(&self) -> usize {
        self.measures.len()
    }

    pub fn num_valid_measures(&self) -> usize {
        self.measures.iter().filter(|m| !m.ignore).count()
    }

    pub fn num_locked_measures(&self) -> usize {
        self.measures.iter().filter(|m| m.edit_lock).count()
    }

    /// Make the measure at `index` the reference, replacing any previous one.
    pub fn set_reference(&mut self, index: usize) -> Result<()> {
        if index >= self.measures.len() {
            return Err(CoreError::InvalidState(format!(
                "Reference index [{}] is out of range for control point [{}] with {} measures",
                index,
                self.id,
                self.measures.len()
            )));
        }
        self.reference_index = Some(index);
        Ok(())
    }

    pub fn clear_reference(&mut self) {
        self.reference_index = None;
    }

    pub fn reference_index(&self) -> Option<usize> {
        self.reference_index
    }

    pub fn reference_measure(&self) -> Option<&ControlMeasure> {
        self.reference_index.and_then(|i| self.measures.get(i))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Type queries
    // ─────────────────────────────────────────────────────────────────────────

    pub fn is_fixed(&self) -> bool {
        self.point_type == PointType::Fixed
    }

    pub fn is_constrained(&self) -> bool {
        self.point_type == PointType::Constrained
    }

    pub fn is_free(&self) -> bool {
        self.point_type == PointType::Free
    }

    /// Number of apriori coordinates flagged as constrained.
    pub fn num_constrained_coordinates(&self) -> usize {
        [self.latitude_constrained, self.longitude_constrained, self.radius_constrained]
            .iter()
            .filter(|c| **c)
            .count()
    }

    /// Upper triangle of the apriori rectangular covariance, if any.
    pub fn apriori_covariance(&self) -> Option<[f64; 6]> {
        self.apriori_surface_point.as_ref().and_then(|sp| sp.covariance_upper())
    }

    pub fn adjusted_covariance(&self) -> Option<[f64; 6]> {
        self.adjusted_surface_point.as_ref().and_then(|sp| sp.covariance_upper())
    }

    /// Adjusted position when solved, else the apriori one.
    pub fn best_surface_point(&self) -> Option<&SurfacePoint> {
        self.adjusted_surface_point
            .as_ref()
            .or(self.apriori_surface_point.as_ref())
    }
}
