//! Adjustment-side view of the control network.
//!
//! [`BundleGraph::build`] turns a [`ControlNet`] into the points, measures
//! and image observations the solver works on:
//! - ignored points and ignored measures are left out
//! - every image with at least one used measure gets a [`BundleObservation`]
//! - each point gets per-coordinate weights from its type and apriori sigmas
//!
//! After the solve, [`BundleGraph::apply_to_network`] writes adjusted points,
//! residuals and rejection flags back to a network.
//!
//! [`BundleObservation`]: super::observation::BundleObservation

use std::collections::HashMap;

use tracing::{debug, info};

use super::observation::BundleObservationVector;
use super::settings::BundleSettings;
use crate::control::{ControlNet, ControlPoint, PointType};
use crate::error::{CoreError, Result};
use crate::geometry::SurfacePoint;

/// Scale from median absolute deviation to standard deviation for normally
/// distributed residuals.
pub const MAD_TO_SIGMA: f64 = 1.4826;

// ─────────────────────────────────────────────────────────────────────────────
// Measures and points
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct BundleMeasure {
    pub serial_number: String,
    /// Index of the image's observation in the graph's observation vector.
    pub observation_index: usize,
    pub sample: f64,
    pub line: f64,
    pub sample_sigma: Option<f64>,
    pub line_sigma: Option<f64>,
    pub sample_residual: f64,
    pub line_residual: f64,
    pub rejected: bool,
}

impl BundleMeasure {
    pub fn residual_magnitude(&self) -> f64 {
        self.sample_residual.hypot(self.line_residual)
    }
}

/// A control point as seen by the solver.
#[derive(Debug, Clone, PartialEq)]
pub struct BundleControlPoint {
    pub id: String,
    pub point_type: PointType,
    pub apriori: SurfacePoint,
    pub adjusted: SurfacePoint,
    /// Accumulated corrections in latitude (rad), longitude (rad) and radius (m).
    pub corrections: [f64; 3],
    /// Weights of latitude, longitude and radius in 1/m². Infinite for
    /// held coordinates, zero for free ones.
    pub weights: [f64; 3],
    pub measures: Vec<BundleMeasure>,
}

impl BundleControlPoint {
    /// Build from `point`; measures on images without an observation are dropped.
    pub fn new(
        point: &ControlPoint,
        observations: &BundleObservationVector,
        settings: &BundleSettings,
    ) -> Self {
        let apriori = point
            .apriori_surface_point
            .clone()
            .or_else(|| point.adjusted_surface_point.clone())
            .unwrap_or_default();
        let adjusted = point
            .adjusted_surface_point
            .clone()
            .unwrap_or_else(|| apriori.clone());

        let measures = point
            .measures()
            .iter()
            .filter(|m| !m.ignore)
            .filter_map(|m| {
                let observation = observations.observation_by_serial(&m.serial_number)?;
                Some(BundleMeasure {
                    serial_number: m.serial_number.clone(),
                    observation_index: observation.index,
                    sample: m.sample,
                    line: m.line,
                    sample_sigma: m.sample_sigma,
                    line_sigma: m.line_sigma,
                    sample_residual: m.sample_residual.unwrap_or(0.0),
                    line_residual: m.line_residual.unwrap_or(0.0),
                    rejected: m.jigsaw_rejected,
                })
            })
            .collect();

        let weights = point_weights(point, &apriori, settings);

        Self {
            id: point.id.clone(),
            point_type: point.point_type,
            apriori,
            adjusted,
            corrections: [0.0; 3],
            weights,
            measures,
        }
    }

    /// Coordinates carrying a finite, positive weight.
    pub fn number_constrained_coordinates(&self) -> usize {
        self.weights.iter().filter(|w| w.is_finite() && **w > 0.0).count()
    }

    pub fn number_rejected_measures(&self) -> usize {
        self.measures.iter().filter(|m| m.rejected).count()
    }

    pub fn is_fixed(&self) -> bool {
        self.point_type == PointType::Fixed
    }

    pub fn set_adjusted_surface_point(&mut self, surface_point: SurfacePoint) {
        self.adjusted = surface_point;
    }

    pub fn apply_corrections(&mut self, delta: [f64; 3]) {
        for (c, d) in self.corrections.iter_mut().zip(delta) {
            *c += d;
        }
    }

    /// Store one `(sample, line)` residual pair per measure, in measure order.
    pub fn apply_residuals(&mut self, residuals: &[(f64, f64)]) -> Result<()> {
        if residuals.len() != self.measures.len() {
            return Err(CoreError::InvalidState(format!(
                "Control point [{}] has {} measures but {} residual pairs were given",
                self.id,
                self.measures.len(),
                residuals.len()
            )));
        }
        for (m, (s, l)) in self.measures.iter_mut().zip(residuals) {
            m.sample_residual = *s;
            m.line_residual = *l;
        }
        Ok(())
    }

    /// Root mean square of the unrejected residual magnitudes.
    pub fn rms_residual(&self) -> f64 {
        let used: Vec<f64> = self
            .measures
            .iter()
            .filter(|m| !m.rejected)
            .map(|m| m.residual_magnitude())
            .collect();
        if used.is_empty() {
            return 0.0;
        }
        (used.iter().map(|r| r * r).sum::<f64>() / used.len() as f64).sqrt()
    }

    /// One report line: id, type, rays used of total, rms residual and the
    /// adjusted latitude, longitude (degrees) and radius (km).
    pub fn format_summary(&self) -> String {
        let total = self.measures.len();
        let used = total - self.number_rejected_measures();
        format!(
            "{:>16} {:>12} {:>3} of {:<3} {:>8.2} {:>16.8} {:>16.8} {:>16.8}",
            self.id,
            self.point_type.as_str(),
            used,
            total,
            self.rms_residual(),
            self.adjusted.latitude().degrees(),
            self.adjusted.longitude().positive_east_360().degrees(),
            self.adjusted.local_radius() / 1000.0,
        )
    }
}

fn inverse_square(sigma: Option<f64>) -> f64 {
    match sigma {
        Some(s) if s > 0.0 && s.is_finite() => 1.0 / (s * s),
        _ => 0.0,
    }
}

fn point_weights(
    point: &ControlPoint,
    apriori: &SurfacePoint,
    settings: &BundleSettings,
) -> [f64; 3] {
    let global = [
        settings.global_latitude_aprioris_sigma,
        settings.global_longitude_aprioris_sigma,
        settings.global_radius_aprioris_sigma,
    ];

    let mut weights = match point.point_type {
        PointType::Fixed => return [f64::INFINITY; 3],
        PointType::Free => global.map(inverse_square),
        PointType::Constrained => {
            let own = [
                apriori.lat_sigma_distance().ok(),
                apriori.lon_sigma_distance().ok(),
                apriori.local_radius_sigma_distance().ok(),
            ];
            let flags = [
                point.latitude_constrained,
                point.longitude_constrained,
                point.radius_constrained,
            ];
            // Without explicit flags every coordinate with a sigma is constrained.
            let any_flag = flags.iter().any(|f| *f);
            let mut w = [0.0; 3];
            for i in 0..3 {
                if any_flag && !flags[i] {
                    w[i] = inverse_square(global[i]);
                } else {
                    w[i] = inverse_square(own[i].or(global[i]));
                }
            }
            w
        }
    };

    if !settings.solve_radius {
        weights[2] = f64::INFINITY;
    }
    weights
}

// ─────────────────────────────────────────────────────────────────────────────
// Graph
// ─────────────────────────────────────────────────────────────────────────────

/// Observations, points and parameter counts of one adjustment.
#[derive(Debug, Clone, Default)]
pub struct BundleGraph {
    pub observations: BundleObservationVector,
    pub points: Vec<BundleControlPoint>,
    pub number_fixed_points: usize,
    pub number_ignored_points: usize,
    /// Two per used measure.
    pub number_observations: usize,
    pub number_constrained_point_parameters: usize,
    pub number_image_parameters: usize,
    pub number_unknown_parameters: usize,
}

/// Instrument part of a serial number: its first two `/` components.
pub fn instrument_id_from_serial(serial_number: &str) -> String {
    serial_number.splitn(3, '/').take(2).collect::<Vec<_>>().join("/")
}

impl BundleGraph {
    pub fn build(net: &ControlNet, settings: &BundleSettings) -> Result<Self> {
        settings.validate()?;
        let mut graph = BundleGraph::default();

        // Collect the images of every used measure
        for point in net.points().iter().filter(|p| !p.ignore) {
            for measure in point.measures().iter().filter(|m| !m.ignore) {
                let instrument = instrument_id_from_serial(&measure.serial_number);
                graph.observations.add_new(
                    &measure.serial_number,
                    &instrument,
                    &settings.observation_solve_settings,
                );
            }
        }

        // Collect points
        for point in net.points() {
            if point.ignore {
                graph.number_ignored_points += 1;
                continue;
            }
            let bundle_point = BundleControlPoint::new(point, &graph.observations, settings);
            if bundle_point.is_fixed() {
                graph.number_fixed_points += 1;
            } else {
                // Radius is held by an infinite weight unless solved for
                graph.number_unknown_parameters += if settings.solve_radius { 3 } else { 2 };
            }
            graph.number_observations += 2 * bundle_point.measures.len();
            graph.number_constrained_point_parameters +=
                bundle_point.number_constrained_coordinates();
            graph.points.push(bundle_point);
        }

        graph.number_image_parameters = graph.observations.number_parameters();
        graph.number_unknown_parameters += graph.number_image_parameters;

        info!(
            "Bundle graph: {} points ({} fixed, {} ignored), {} images, {} observations, {} unknowns",
            graph.points.len(),
            graph.number_fixed_points,
            graph.number_ignored_points,
            graph.observations.len(),
            graph.number_observations,
            graph.number_unknown_parameters
        );
        Ok(graph)
    }

    pub fn number_constrained_image_parameters(&self) -> usize {
        self.observations.number_constrained_parameters()
    }

    pub fn number_rejected_measures(&self) -> usize {
        self.points.iter().map(|p| p.number_rejected_measures()).sum()
    }

    /// Unrejected measure residual magnitudes across the graph.
    pub fn residual_magnitudes(&self) -> Vec<f64> {
        self.points
            .iter()
            .flat_map(|p| p.measures.iter())
            .filter(|m| !m.rejected)
            .map(|m| m.residual_magnitude())
            .collect()
    }

    /// `median + multiplier × 1.4826 × MAD` of the unrejected residual
    /// magnitudes, or `None` when there are none.
    pub fn compute_rejection_limit(&self, multiplier: f64) -> Option<f64> {
        let mut residuals = self.residual_magnitudes();
        let median = median_in_place(&mut residuals)?;
        let mut deviations: Vec<f64> = residuals.iter().map(|r| (r - median).abs()).collect();
        let mad = median_in_place(&mut deviations)?;
        let limit = median + multiplier * MAD_TO_SIGMA * mad;
        debug!("Rejection limit {:.6} (median {:.6}, mad {:.6})", limit, median, mad);
        Some(limit)
    }

    /// Reject at most one measure per point, the largest residual above
    /// `limit`, as long as two unrejected measures remain. Rejected measures
    /// whose residual is back under the limit are restored.
    ///
    /// Returns the total number of rejected measures.
    pub fn flag_outliers(&mut self, limit: f64) -> usize {
        for point in &mut self.points {
            let mut worst: Option<(usize, f64)> = None;
            for (i, m) in point.measures.iter_mut().enumerate() {
                let magnitude = m.residual_magnitude();
                if magnitude <= limit {
                    m.rejected = false;
                    continue;
                }
                if m.rejected {
                    continue;
                }
                if worst.map_or(true, |(_, r)| magnitude > r) {
                    worst = Some((i, magnitude));
                }
            }

            let unrejected = point.measures.len() - point.number_rejected_measures();
            if let Some((i, magnitude)) = worst {
                if unrejected > 2 {
                    debug!(
                        "Rejecting measure {} of point {} (residual {:.4})",
                        point.measures[i].serial_number, point.id, magnitude
                    );
                    point.measures[i].rejected = true;
                }
            }
        }
        self.number_rejected_measures()
    }

    /// Write adjusted points, residuals and rejection flags into `net`.
    pub fn apply_to_network(&self, net: &mut ControlNet) {
        let by_id: HashMap<&str, &BundleControlPoint> =
            self.points.iter().map(|p| (p.id.as_str(), p)).collect();
        for point in net.points_mut() {
            let Some(bundle_point) = by_id.get(point.id.as_str()) else {
                continue;
            };
            point.adjusted_surface_point = Some(bundle_point.adjusted.clone());
            point.jigsaw_rejected = !bundle_point.measures.is_empty()
                && bundle_point.number_rejected_measures() == bundle_point.measures.len();
            for bm in &bundle_point.measures {
                if let Some(m) = point.measure_mut(&bm.serial_number) {
                    m.set_residuals(bm.sample_residual, bm.line_residual);
                    m.jigsaw_rejected = bm.rejected;
                }
            }
        }
    }
}

/// Median of `values`, sorting them in place.
fn median_in_place(values: &mut [f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(|a, b| a.total_cmp(b));
    let mid = values.len() / 2;
    Some(if values.len() % 2 == 0 {
        0.5 * (values[mid - 1] + values[mid])
    } else {
        values[mid]
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::{ControlMeasure, MeasureType, NetworkHeader};
    use crate::geometry::Angle;
    use crate::target::Radii;
    use approx::assert_relative_eq;

    fn point(id: &str, point_type: PointType, serials: &[&str]) -> ControlPoint {
        let mut p = ControlPoint::new(id, point_type);
        for s in serials {
            let measure = ControlMeasure::new(*s, MeasureType::RegisteredSubPixel)
                .with_coordinate(10.0, 20.0);
            p.add_measure(measure).unwrap();
        }
        p
    }

    fn network() -> ControlNet {
        let mut net = ControlNet::new(NetworkHeader {
            network_id: "Test".into(),
            target_name: "Mars".into(),
            ..Default::default()
        });
        net.add_point(point("P1", PointType::Free, &["MRO/CTX/1", "MRO/CTX/2", "MRO/CTX/3"]))
            .unwrap();
        net.add_point(point("P2", PointType::Fixed, &["MRO/CTX/1", "MRO/CTX/2"]))
            .unwrap();
        let mut ignored = point("P3", PointType::Free, &["MRO/CTX/4"]);
        ignored.ignore = true;
        net.add_point(ignored).unwrap();
        let mut partly = point("P4", PointType::Free, &["MRO/CTX/1", "MRO/CTX/5"]);
        partly.measures_mut()[1].ignore = true;
        net.add_point(partly).unwrap();
        net
    }

    #[test]
    fn test_build_counts() {
        let graph = BundleGraph::build(&network(), &BundleSettings::default()).unwrap();
        assert_eq!(graph.points.len(), 3);
        assert_eq!(graph.number_ignored_points, 1);
        assert_eq!(graph.number_fixed_points, 1);
        // Images 4 and 5 only have ignored measures
        assert_eq!(graph.observations.len(), 3);
        assert_eq!(graph.number_observations, 2 * (3 + 2 + 1));
        assert_eq!(graph.number_image_parameters, 9);
        assert_eq!(graph.number_unknown_parameters, 2 * 2 + 9);
        assert_eq!(graph.number_constrained_point_parameters, 0);

        let settings = BundleSettings {
            solve_radius: true,
            ..Default::default()
        };
        let graph = BundleGraph::build(&network(), &settings).unwrap();
        assert_eq!(graph.number_unknown_parameters, 2 * 3 + 9);
    }

    #[test]
    fn test_instrument_id() {
        assert_eq!(instrument_id_from_serial("MRO/CTX/0874"), "MRO/CTX");
        assert_eq!(instrument_id_from_serial("IMG"), "IMG");
    }

    #[test]
    fn test_constrained_weights() {
        let radii = Radii::biaxial(3_396_190.0, 3_376_200.0).unwrap();
        let mut sp = SurfacePoint::from_spherical(
            Angle::from_degrees(10.0),
            Angle::from_degrees(20.0),
            3_390_000.0,
        )
        .with_radii(radii)
        .unwrap();
        sp.set_spherical_sigmas_distance(10.0, 20.0, 50.0).unwrap();

        let mut p = point("C1", PointType::Constrained, &["A/B/1"]);
        p.apriori_surface_point = Some(sp);
        let settings = BundleSettings {
            solve_radius: true,
            ..Default::default()
        };
        let mut observations = BundleObservationVector::new();
        observations.add_new("A/B/1", "A/B", &settings.observation_solve_settings);

        let bp = BundleControlPoint::new(&p, &observations, &settings);
        assert_relative_eq!(bp.weights[0], 1.0 / 100.0, max_relative = 1e-6);
        assert_relative_eq!(bp.weights[1], 1.0 / 400.0, max_relative = 1e-6);
        assert_relative_eq!(bp.weights[2], 1.0 / 2500.0, max_relative = 1e-6);
        assert_eq!(bp.number_constrained_coordinates(), 3);

        let held_radius = BundleControlPoint::new(&p, &observations, &BundleSettings::default());
        assert!(held_radius.weights[2].is_infinite());
        assert_eq!(held_radius.number_constrained_coordinates(), 2);
    }

    #[test]
    fn test_free_point_uses_global_sigmas() {
        let settings = BundleSettings {
            global_latitude_aprioris_sigma: Some(1000.0),
            ..Default::default()
        };
        let p = point("F1", PointType::Free, &[]);
        let bp = BundleControlPoint::new(&p, &BundleObservationVector::new(), &settings);
        assert_relative_eq!(bp.weights[0], 1e-6);
        assert_eq!(bp.weights[1], 0.0);
        assert_eq!(bp.number_constrained_coordinates(), 1);
    }

    #[test]
    fn test_rejection_limit() {
        let mut graph = BundleGraph::build(&network(), &BundleSettings::default()).unwrap();
        // Magnitudes 1..=6
        let mut r = 1.0;
        for p in &mut graph.points {
            let pairs: Vec<(f64, f64)> = p
                .measures
                .iter()
                .map(|_| {
                    let pair = (r, 0.0);
                    r += 1.0;
                    pair
                })
                .collect();
            p.apply_residuals(&pairs).unwrap();
        }
        // median 3.5, deviations 0.5 0.5 1.5 1.5 2.5 2.5 -> mad 1.5
        let limit = graph.compute_rejection_limit(3.0).unwrap();
        assert_relative_eq!(limit, 3.5 + 3.0 * MAD_TO_SIGMA * 1.5);
        assert!(BundleGraph::default().compute_rejection_limit(3.0).is_none());
    }

    #[test]
    fn test_flag_outliers_keeps_two_measures() {
        let mut graph = BundleGraph::build(&network(), &BundleSettings::default()).unwrap();
        graph.points[0].apply_residuals(&[(0.1, 0.0), (5.0, 0.0), (9.0, 0.0)]).unwrap();
        graph.points[1].apply_residuals(&[(7.0, 0.0), (0.2, 0.0)]).unwrap();

        assert_eq!(graph.flag_outliers(1.0), 1);
        assert!(graph.points[0].measures[2].rejected);
        assert!(!graph.points[0].measures[1].rejected);
        // Only two measures: nothing may be rejected
        assert!(!graph.points[1].measures[0].rejected);

        // Second pass cannot reject further from P1
        assert_eq!(graph.flag_outliers(1.0), 1);

        // Residual back under the limit restores the measure
        graph.points[0].apply_residuals(&[(0.1, 0.0), (0.2, 0.0), (0.3, 0.0)]).unwrap();
        assert_eq!(graph.flag_outliers(1.0), 0);
    }

    #[test]
    fn test_apply_residuals_length() {
        let mut graph = BundleGraph::build(&network(), &BundleSettings::default()).unwrap();
        assert!(graph.points[0].apply_residuals(&[(1.0, 1.0)]).is_err());
    }

    #[test]
    fn test_apply_to_network() {
        let mut net = network();
        let mut graph = BundleGraph::build(&net, &BundleSettings::default()).unwrap();
        graph.points[0].apply_residuals(&[(0.3, 0.4), (0.0, 0.0), (0.0, 0.0)]).unwrap();
        graph.points[0].measures[1].rejected = true;
        graph.points[0].set_adjusted_surface_point(SurfacePoint::from_rectangular(1.0, 2.0, 3.0));
        graph.apply_to_network(&mut net);

        let p1 = net.point("P1").unwrap();
        assert_eq!(p1.adjusted_surface_point.as_ref().unwrap().x(), 1.0);
        assert_relative_eq!(p1.measures()[0].residual_magnitude(), 0.5);
        assert!(p1.measures()[1].jigsaw_rejected);
        assert!(!p1.jigsaw_rejected);
        assert!(graph.points[0].format_summary().contains("2 of 3"));
    }
}
