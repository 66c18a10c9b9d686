//! Per-image exterior orientation parameters solved by the adjustment.
//!
//! Every image taking part in the adjustment owns one [`BundleObservation`].
//! Its parameter list is derived from the [`ObservationSolveSettings`] that
//! match the image's instrument: position coefficients first (`X`, `Y`, `Z`
//! and their time derivatives), then pointing coefficients (`RA`, `DEC`,
//! optionally `TWIST`).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

// ─────────────────────────────────────────────────────────────────────────────
// Solve settings
// ─────────────────────────────────────────────────────────────────────────────

/// Which camera pointing coefficients are solved for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PointingOption {
    None,
    #[default]
    AnglesOnly,
    AnglesAndVelocity,
    AnglesVelocityAcceleration,
    /// Every coefficient of a polynomial of the given degree.
    AllPolynomialCoefficients(u32),
}

impl PointingOption {
    /// Coefficients solved per angle.
    pub fn number_coefficients(&self) -> usize {
        match self {
            Self::None => 0,
            Self::AnglesOnly => 1,
            Self::AnglesAndVelocity => 2,
            Self::AnglesVelocityAcceleration => 3,
            Self::AllPolynomialCoefficients(degree) => *degree as usize + 1,
        }
    }
}

/// Which spacecraft position coefficients are solved for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PositionOption {
    #[default]
    None,
    PositionOnly,
    PositionAndVelocity,
    PositionVelocityAcceleration,
    /// Every coefficient of a polynomial of the given degree.
    AllPolynomialCoefficients(u32),
}

impl PositionOption {
    /// Coefficients solved per coordinate.
    pub fn number_coefficients(&self) -> usize {
        match self {
            Self::None => 0,
            Self::PositionOnly => 1,
            Self::PositionAndVelocity => 2,
            Self::PositionVelocityAcceleration => 3,
            Self::AllPolynomialCoefficients(degree) => *degree as usize + 1,
        }
    }
}

/// Solve options for the images of one instrument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservationSolveSettings {
    /// Instrument the settings apply to; empty matches any instrument.
    pub instrument_id: String,
    pub pointing_option: PointingOption,
    /// Solve for the twist angle along with RA and DEC.
    pub solve_twist: bool,
    pub position_option: PositionOption,
    /// Apriori sigmas of the pointing coefficients in degrees, by
    /// coefficient order. Missing entries leave the coefficient free.
    pub angle_aprioris_sigma: Vec<f64>,
    /// Apriori sigmas of the position coefficients in meters, by coefficient order.
    pub position_aprioris_sigma: Vec<f64>,
}

impl Default for ObservationSolveSettings {
    fn default() -> Self {
        Self {
            instrument_id: String::new(),
            pointing_option: PointingOption::AnglesOnly,
            solve_twist: true,
            position_option: PositionOption::None,
            angle_aprioris_sigma: Vec::new(),
            position_aprioris_sigma: Vec::new(),
        }
    }
}

impl ObservationSolveSettings {
    pub fn matches(&self, instrument_id: &str) -> bool {
        self.instrument_id.is_empty() || self.instrument_id.eq_ignore_ascii_case(instrument_id)
    }

    /// Ordered parameter names with their apriori sigmas (0 when unconstrained).
    pub fn parameters(&self) -> Vec<(String, f64)> {
        let mut parameters = Vec::new();
        for coordinate in ["X", "Y", "Z"] {
            for k in 0..self.position_option.number_coefficients() {
                let sigma = self.position_aprioris_sigma.get(k).copied().unwrap_or(0.0);
                parameters.push((coefficient_name(coordinate, k), sigma));
            }
        }
        let mut angles = vec!["RA", "DEC"];
        if self.solve_twist {
            angles.push("TWIST");
        }
        for angle in angles {
            for k in 0..self.pointing_option.number_coefficients() {
                let sigma = self.angle_aprioris_sigma.get(k).copied().unwrap_or(0.0);
                parameters.push((coefficient_name(angle, k), sigma));
            }
        }
        parameters
    }
}

fn coefficient_name(base: &str, k: usize) -> String {
    match k {
        0 => base.to_string(),
        1 => format!("{base}_VELOCITY"),
        2 => format!("{base}_ACCELERATION"),
        n => format!("{base}_COEFFICIENT_{n}"),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Observation
// ─────────────────────────────────────────────────────────────────────────────

/// The exterior orientation parameters of one image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BundleObservation {
    pub index: usize,
    pub instrument_id: String,
    pub serial_numbers: Vec<String>,
    parameter_names: Vec<String>,
    apriori_sigmas: Vec<f64>,
    corrections: Vec<f64>,
    adjusted_sigmas: Vec<f64>,
}

impl BundleObservation {
    pub fn new(
        index: usize,
        serial_number: &str,
        instrument_id: &str,
        settings: &ObservationSolveSettings,
    ) -> Self {
        let (parameter_names, apriori_sigmas): (Vec<_>, Vec<_>) =
            settings.parameters().into_iter().unzip();
        let n = parameter_names.len();
        Self {
            index,
            instrument_id: instrument_id.to_string(),
            serial_numbers: vec![serial_number.to_string()],
            parameter_names,
            apriori_sigmas,
            corrections: vec![0.0; n],
            adjusted_sigmas: vec![0.0; n],
        }
    }

    pub fn number_parameters(&self) -> usize {
        self.parameter_names.len()
    }

    pub fn parameter_names(&self) -> &[String] {
        &self.parameter_names
    }

    pub fn apriori_sigmas(&self) -> &[f64] {
        &self.apriori_sigmas
    }

    /// Accumulated corrections since the start of the adjustment.
    pub fn corrections(&self) -> &[f64] {
        &self.corrections
    }

    pub fn adjusted_sigmas(&self) -> &[f64] {
        &self.adjusted_sigmas
    }

    /// Parameters with a positive apriori sigma.
    pub fn number_constrained_parameters(&self) -> usize {
        self.apriori_sigmas.iter().filter(|s| **s > 0.0).count()
    }

    /// Add one iteration's corrections to the accumulated totals.
    pub fn apply_parameter_corrections(&mut self, delta: &[f64]) -> Result<()> {
        if delta.len() != self.corrections.len() {
            return Err(CoreError::InvalidState(format!(
                "Observation {} expects {} parameter corrections, got {}",
                self.index,
                self.corrections.len(),
                delta.len()
            )));
        }
        for (c, d) in self.corrections.iter_mut().zip(delta) {
            *c += d;
        }
        Ok(())
    }

    pub fn set_adjusted_sigmas(&mut self, sigmas: &[f64]) -> Result<()> {
        if sigmas.len() != self.adjusted_sigmas.len() {
            return Err(CoreError::InvalidState(format!(
                "Observation {} expects {} adjusted sigmas, got {}",
                self.index,
                self.adjusted_sigmas.len(),
                sigmas.len()
            )));
        }
        self.adjusted_sigmas.copy_from_slice(sigmas);
        Ok(())
    }

    /// Adjusted sigma of the named parameter, if solved.
    pub fn adjusted_sigma(&self, name: &str) -> Option<f64> {
        self.parameter_names
            .iter()
            .position(|p| p == name)
            .map(|i| self.adjusted_sigmas[i])
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Observation vector
// ─────────────────────────────────────────────────────────────────────────────

/// All observations of an adjustment, indexed by image serial number.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BundleObservationVector {
    observations: Vec<BundleObservation>,
    by_serial: HashMap<String, usize>,
}

impl BundleObservationVector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add the observation of image `serial_number`, or return the existing one.
    ///
    /// The first settings entry matching `instrument_id` is used; with no
    /// match the default settings apply.
    pub fn add_new(
        &mut self,
        serial_number: &str,
        instrument_id: &str,
        settings: &[ObservationSolveSettings],
    ) -> &mut BundleObservation {
        let index = match self.by_serial.get(serial_number) {
            Some(&index) => index,
            None => {
                let index = self.observations.len();
                let solve = settings
                    .iter()
                    .find(|s| s.matches(instrument_id))
                    .cloned()
                    .unwrap_or_default();
                self.observations
                    .push(BundleObservation::new(index, serial_number, instrument_id, &solve));
                self.by_serial.insert(serial_number.to_string(), index);
                index
            }
        };
        &mut self.observations[index]
    }

    pub fn observation_by_serial(&self, serial_number: &str) -> Option<&BundleObservation> {
        self.by_serial.get(serial_number).map(|&i| &self.observations[i])
    }

    pub fn observation_by_serial_mut(
        &mut self,
        serial_number: &str,
    ) -> Option<&mut BundleObservation> {
        match self.by_serial.get(serial_number) {
            Some(&i) => self.observations.get_mut(i),
            None => None,
        }
    }

    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &BundleObservation> {
        self.observations.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut BundleObservation> {
        self.observations.iter_mut()
    }

    pub fn number_parameters(&self) -> usize {
        self.observations.iter().map(|o| o.number_parameters()).sum()
    }

    pub fn number_constrained_parameters(&self) -> usize {
        self.observations.iter().map(|o| o.number_constrained_parameters()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_parameter_names() {
        let settings = ObservationSolveSettings {
            position_option: PositionOption::PositionAndVelocity,
            pointing_option: PointingOption::AllPolynomialCoefficients(3),
            solve_twist: false,
            ..Default::default()
        };
        let names: Vec<String> = settings.parameters().into_iter().map(|(n, _)| n).collect();
        assert_eq!(names.len(), 6 + 8);
        assert_eq!(names[0], "X");
        assert_eq!(names[1], "X_VELOCITY");
        assert_eq!(names[6], "RA");
        assert_eq!(names[9], "RA_COEFFICIENT_3");
        assert!(!names.iter().any(|n| n.starts_with("TWIST")));
    }

    #[test]
    fn test_default_solves_angles_with_twist() {
        let obs = BundleObservation::new(0, "IMG1", "HRSC", &ObservationSolveSettings::default());
        assert_eq!(obs.parameter_names(), &["RA", "DEC", "TWIST"]);
        assert_eq!(obs.number_constrained_parameters(), 0);
    }

    #[test]
    fn test_corrections_accumulate() {
        let settings = ObservationSolveSettings {
            angle_aprioris_sigma: vec![2.0],
            ..Default::default()
        };
        let mut obs = BundleObservation::new(0, "IMG1", "", &settings);
        assert_eq!(obs.number_constrained_parameters(), 3);
        obs.apply_parameter_corrections(&[0.1, 0.2, 0.3]).unwrap();
        obs.apply_parameter_corrections(&[0.1, 0.0, -0.3]).unwrap();
        assert_relative_eq!(obs.corrections()[0], 0.2);
        assert_relative_eq!(obs.corrections()[2], 0.0);
        assert!(obs.apply_parameter_corrections(&[1.0]).is_err());

        obs.set_adjusted_sigmas(&[0.5, 0.6, 0.7]).unwrap();
        assert_eq!(obs.adjusted_sigma("DEC"), Some(0.6));
        assert_eq!(obs.adjusted_sigma("X"), None);
    }

    #[test]
    fn test_vector_matches_instrument_settings() {
        let settings = vec![
            ObservationSolveSettings {
                instrument_id: "CTX".into(),
                position_option: PositionOption::PositionOnly,
                ..Default::default()
            },
            ObservationSolveSettings::default(),
        ];
        let mut vector = BundleObservationVector::new();
        vector.add_new("A", "ctx", &settings);
        vector.add_new("B", "HiRISE", &settings);
        vector.add_new("A", "ctx", &settings);

        assert_eq!(vector.len(), 2);
        assert_eq!(vector.observation_by_serial("A").unwrap().number_parameters(), 6);
        assert_eq!(vector.observation_by_serial("B").unwrap().number_parameters(), 3);
        assert_eq!(vector.number_parameters(), 9);
        assert!(vector.observation_by_serial("C").is_none());
    }
}
