//! A single image observation of a control point.

use serde::{Deserialize, Serialize};

use super::types::{MeasureLogData, MeasureLogKind, MeasureType};

/// One observation of a control point in one image.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ControlMeasure {
    /// Serial number of the observing image.
    pub serial_number: String,
    pub measure_type: MeasureType,
    pub chooser_name: String,
    pub date_time: String,
    pub edit_lock: bool,
    pub ignore: bool,
    /// Set by the adjustment when the measure is rejected as an outlier.
    pub jigsaw_rejected: bool,

    /// Measured pixel location.
    pub sample: f64,
    pub line: f64,
    pub apriori_sample: Option<f64>,
    pub apriori_line: Option<f64>,
    /// Measurement sigmas in pixels.
    pub sample_sigma: Option<f64>,
    pub line_sigma: Option<f64>,
    /// Post-adjustment residuals in pixels.
    pub sample_residual: Option<f64>,
    pub line_residual: Option<f64>,
    pub diameter: Option<f64>,

    pub log_data: Vec<MeasureLogData>,
}

impl ControlMeasure {
    pub fn new(serial_number: impl Into<String>, measure_type: MeasureType) -> Self {
        Self {
            serial_number: serial_number.into(),
            measure_type,
            ..Default::default()
        }
    }

    pub fn with_coordinate(mut self, sample: f64, line: f64) -> Self {
        self.sample = sample;
        self.line = line;
        self
    }

    /// Euclidean norm of the residual pair; missing residuals count as zero.
    pub fn residual_magnitude(&self) -> f64 {
        let s = self.sample_residual.unwrap_or(0.0);
        let l = self.line_residual.unwrap_or(0.0);
        (s * s + l * l).sqrt()
    }

    pub fn set_residuals(&mut self, sample_residual: f64, line_residual: f64) {
        self.sample_residual = Some(sample_residual);
        self.line_residual = Some(line_residual);
    }

    pub fn log_value(&self, kind: MeasureLogKind) -> Option<f64> {
        self.log_data.iter().find(|d| d.kind == kind).map(|d| d.value)
    }

    /// Insert or replace the value of `kind`.
    pub fn set_log_value(&mut self, kind: MeasureLogKind, value: f64) {
        match self.log_data.iter_mut().find(|d| d.kind == kind) {
            Some(existing) => existing.value = value,
            None => self.log_data.push(MeasureLogData::new(kind, value)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_residual_magnitude() {
        let mut m = ControlMeasure::new("IMG1", MeasureType::Manual);
        assert_eq!(m.residual_magnitude(), 0.0);
        m.set_residuals(3.0, -4.0);
        assert_relative_eq!(m.residual_magnitude(), 5.0);
    }

    #[test]
    fn test_log_value_replaces_existing_kind() {
        let mut m = ControlMeasure::new("IMG1", MeasureType::RegisteredSubPixel);
        m.set_log_value(MeasureLogKind::GoodnessOfFit, 0.8);
        m.set_log_value(MeasureLogKind::GoodnessOfFit, 0.9);
        assert_eq!(m.log_data.len(), 1);
        assert_eq!(m.log_value(MeasureLogKind::GoodnessOfFit), Some(0.9));
        assert_eq!(m.log_value(MeasureLogKind::PixelShift), None);
    }
}
