//! Statistics and robust estimation state of one bundle adjustment run.
//!
//! A [`BundleResults`] is created empty when the adjustment starts, updated
//! by the solver every iteration and finalized once at termination. It is
//! then written as a Pvl report or persisted (XML, binary, columnar) by the
//! serializers in `results_io`.
//!
//! # Robust estimation tiers
//!
//! [`BundleResults::maximum_likelihood_set_up`] installs up to three
//! weighting models. During each iteration the solver feeds weighted
//! residuals into the probability distribution; at the end of it
//! [`BundleResults::print_maximum_likelihood_tier_information`] derives the
//! active model's tweaking constant from the distribution and starts a new
//! one. Once the tier index passes the last model, weighting is fixed and
//! no constant is updated anymore.

use tracing::info;
use uuid::Uuid;

use super::control_point::{BundleControlPoint, BundleGraph};
use super::correlation_matrix::CorrelationMatrix;
use super::ml_wfunctions::MaximumLikelihoodWFunctions;
use super::observation::BundleObservationVector;
use super::settings::{
    BundleSettings, ConvergenceCriteria, MaximumLikelihoodTier, MAX_MAXIMUM_LIKELIHOOD_TIERS,
};
use crate::control::ControlNet;
use crate::error::{CoreError, Result};
use crate::statistics::{CumulativeProbabilityCalculator, Statistics, PERCENTILE_NODES};

/// Initial minimum of a sigma range, larger than any real sigma (meters).
pub const SIGMA_RANGE_INITIAL_MIN: f64 = 1.0e12;

/// Smallest and largest sigma of one coordinate and the points they belong to.
#[derive(Debug, Clone, PartialEq)]
pub struct SigmaRange {
    pub min: f64,
    pub min_point_id: String,
    pub max: f64,
    pub max_point_id: String,
}

impl Default for SigmaRange {
    fn default() -> Self {
        Self {
            min: SIGMA_RANGE_INITIAL_MIN,
            min_point_id: String::new(),
            max: 0.0,
            max_point_id: String::new(),
        }
    }
}

impl SigmaRange {
    pub fn update(&mut self, point_id: &str, sigma: f64) {
        if sigma < self.min {
            self.min = sigma;
            self.min_point_id = point_id.to_string();
        }
        if sigma > self.max {
            self.max = sigma;
            self.max_point_id = point_id.to_string();
        }
    }
}

/// Results of a bundle adjustment.
///
/// Cloning performs a deep copy: the copy owns its own probability
/// distributions and correlation matrix.
#[derive(Debug, Clone, PartialEq)]
pub struct BundleResults {
    pub(super) id: Uuid,
    pub(super) correlation_matrix: Option<CorrelationMatrix>,

    pub(super) number_fixed_points: usize,
    pub(super) number_ignored_points: usize,
    pub(super) number_held_images: usize,

    pub(super) rms_x_residuals: f64,
    pub(super) rms_y_residuals: f64,
    pub(super) rms_xy_residuals: f64,
    pub(super) rejection_limit: f64,
    pub(super) radians_to_meters: f64,

    pub(super) number_rejected_observations: usize,
    pub(super) number_observations: usize,
    pub(super) number_image_parameters: usize,
    pub(super) number_constrained_point_parameters: usize,
    pub(super) number_constrained_image_parameters: usize,
    pub(super) number_constrained_target_parameters: usize,
    pub(super) number_unknown_parameters: usize,
    pub(super) degrees_of_freedom: i64,
    pub(super) sigma0: f64,
    pub(super) elapsed_time: f64,
    pub(super) elapsed_time_error_prop: f64,
    pub(super) converged: bool,
    pub(super) iterations: usize,

    pub(super) rms_image_sample_residuals: Vec<Statistics>,
    pub(super) rms_image_line_residuals: Vec<Statistics>,
    pub(super) rms_image_residuals: Vec<Statistics>,
    pub(super) rms_image_x_sigmas: Vec<Statistics>,
    pub(super) rms_image_y_sigmas: Vec<Statistics>,
    pub(super) rms_image_z_sigmas: Vec<Statistics>,
    pub(super) rms_image_ra_sigmas: Vec<Statistics>,
    pub(super) rms_image_dec_sigmas: Vec<Statistics>,
    pub(super) rms_image_twist_sigmas: Vec<Statistics>,

    pub(super) latitude_sigma_range: SigmaRange,
    pub(super) longitude_sigma_range: SigmaRange,
    pub(super) radius_sigma_range: SigmaRange,
    pub(super) rms_sigma_latitude_stats: f64,
    pub(super) rms_sigma_longitude_stats: f64,
    pub(super) rms_sigma_radius_stats: f64,

    /// Weighting function of each tier with its quantile.
    pub(super) maximum_likelihood_functions: Vec<(MaximumLikelihoodWFunctions, f64)>,
    pub(super) maximum_likelihood_index: usize,
    pub(super) maximum_likelihood_median_r2_residuals: f64,
    /// Distribution of |R²| residuals driving the tweaking constants.
    pub(super) cum_pro: CumulativeProbabilityCalculator,
    /// Distribution of residuals for reporting.
    pub(super) cum_pro_res: CumulativeProbabilityCalculator,

    pub(super) observations: BundleObservationVector,
    pub(super) bundle_control_points: Vec<BundleControlPoint>,
    pub(super) output_control_net: Option<ControlNet>,
}

impl Default for BundleResults {
    fn default() -> Self {
        Self::new()
    }
}

impl BundleResults {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            correlation_matrix: None,
            number_fixed_points: 0,
            number_ignored_points: 0,
            number_held_images: 0,
            rms_x_residuals: 0.0,
            rms_y_residuals: 0.0,
            rms_xy_residuals: 0.0,
            rejection_limit: 0.0,
            radians_to_meters: 0.0,
            number_rejected_observations: 0,
            number_observations: 0,
            number_image_parameters: 0,
            number_constrained_point_parameters: 0,
            number_constrained_image_parameters: 0,
            number_constrained_target_parameters: 0,
            number_unknown_parameters: 0,
            degrees_of_freedom: -1,
            sigma0: 0.0,
            elapsed_time: 0.0,
            elapsed_time_error_prop: 0.0,
            converged: false,
            iterations: 0,
            rms_image_sample_residuals: Vec::new(),
            rms_image_line_residuals: Vec::new(),
            rms_image_residuals: Vec::new(),
            rms_image_x_sigmas: Vec::new(),
            rms_image_y_sigmas: Vec::new(),
            rms_image_z_sigmas: Vec::new(),
            rms_image_ra_sigmas: Vec::new(),
            rms_image_dec_sigmas: Vec::new(),
            rms_image_twist_sigmas: Vec::new(),
            latitude_sigma_range: SigmaRange::default(),
            longitude_sigma_range: SigmaRange::default(),
            radius_sigma_range: SigmaRange::default(),
            rms_sigma_latitude_stats: 0.0,
            rms_sigma_longitude_stats: 0.0,
            rms_sigma_radius_stats: 0.0,
            maximum_likelihood_functions: Vec::new(),
            maximum_likelihood_index: 0,
            maximum_likelihood_median_r2_residuals: 0.0,
            cum_pro: CumulativeProbabilityCalculator::new(PERCENTILE_NODES),
            cum_pro_res: CumulativeProbabilityCalculator::new(PERCENTILE_NODES),
            observations: BundleObservationVector::new(),
            bundle_control_points: Vec::new(),
            output_control_net: None,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Robust estimation
    // ─────────────────────────────────────────────────────────────────────────

    /// Install the robust estimation tiers and reset both distributions.
    pub fn maximum_likelihood_set_up(&mut self, tiers: &[MaximumLikelihoodTier]) -> Result<()> {
        if tiers.len() > MAX_MAXIMUM_LIKELIHOOD_TIERS {
            return Err(CoreError::InvalidState(format!(
                "At most {} maximum likelihood models may be chained, got {}",
                MAX_MAXIMUM_LIKELIHOOD_TIERS,
                tiers.len()
            )));
        }
        self.maximum_likelihood_index = 0;
        self.maximum_likelihood_median_r2_residuals = 0.0;
        self.cum_pro_res = CumulativeProbabilityCalculator::new(PERCENTILE_NODES);
        if !tiers.is_empty() {
            self.cum_pro = CumulativeProbabilityCalculator::new(PERCENTILE_NODES);
        }
        self.maximum_likelihood_functions = tiers
            .iter()
            .map(|t| (MaximumLikelihoodWFunctions::new(t.model), t.quantile))
            .collect();
        Ok(())
    }

    /// Report the current tier and, while a tier is active, set its tweaking
    /// constant from the |R²| distribution and start a new distribution.
    pub fn print_maximum_likelihood_tier_information(&mut self) -> Result<()> {
        let index = self.maximum_likelihood_index;
        let tiers = self.maximum_likelihood_functions.len();
        let Some((function, quantile)) = self.maximum_likelihood_functions.get_mut(index) else {
            if tiers > 0 {
                info!("All {} maximum likelihood tiers used, weighting is fixed", tiers);
            }
            return Ok(());
        };
        info!("Maximum likelihood tier {} of {}: {}", index + 1, tiers, function.model());

        let tweaking_constant = self.cum_pro.value(*quantile)?;
        function.set_tweaking_constant(tweaking_constant)?;
        self.maximum_likelihood_median_r2_residuals = self.cum_pro.value(0.5)?;
        info!(
            "Median of R^2 residuals: {:.6}, {} tweaking constant: {:.6} (quantile {})",
            self.maximum_likelihood_median_r2_residuals,
            function.model(),
            tweaking_constant,
            quantile
        );
        self.cum_pro = CumulativeProbabilityCalculator::new(PERCENTILE_NODES);
        Ok(())
    }

    pub fn increment_maximum_likelihood_model_index(&mut self) {
        self.maximum_likelihood_index += 1;
    }

    pub fn number_maximum_likelihood_models(&self) -> usize {
        self.maximum_likelihood_functions.len()
    }

    pub fn maximum_likelihood_model_index(&self) -> usize {
        self.maximum_likelihood_index
    }

    pub fn maximum_likelihood_model_w_function(
        &self,
        index: usize,
    ) -> Option<&MaximumLikelihoodWFunctions> {
        self.maximum_likelihood_functions.get(index).map(|(f, _)| f)
    }

    pub fn maximum_likelihood_model_quantile(&self, index: usize) -> Option<f64> {
        self.maximum_likelihood_functions.get(index).map(|(_, q)| *q)
    }

    /// Weighting function of the current tier; `None` once all tiers are used.
    pub fn active_maximum_likelihood_function(&self) -> Option<&MaximumLikelihoodWFunctions> {
        self.maximum_likelihood_model_w_function(self.maximum_likelihood_index)
    }

    pub fn maximum_likelihood_median_r2_residuals(&self) -> f64 {
        self.maximum_likelihood_median_r2_residuals
    }

    pub fn add_probability_distribution_observation(&mut self, value: f64) {
        self.cum_pro.add_observation(value);
    }

    pub fn add_residuals_probability_distribution_observation(&mut self, value: f64) {
        self.cum_pro_res.add_observation(value);
    }

    pub fn initialize_probability_distribution(&mut self, nodes: usize) {
        self.cum_pro.set_quantiles(nodes);
    }

    pub fn initialize_residuals_probability_distribution(&mut self, nodes: usize) {
        self.cum_pro_res.set_quantiles(nodes);
    }

    pub fn cumulative_probability_distribution(&self) -> &CumulativeProbabilityCalculator {
        &self.cum_pro
    }

    pub fn residuals_cumulative_probability_distribution(
        &self,
    ) -> &CumulativeProbabilityCalculator {
        &self.cum_pro_res
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Degrees of freedom and sigma0
    // ─────────────────────────────────────────────────────────────────────────

    /// Observations plus constrained parameters minus unknowns. May be negative.
    pub fn compute_degrees_of_freedom(&mut self) -> i64 {
        self.degrees_of_freedom = (self.number_observations
            + self.number_constrained_point_parameters
            + self.number_constrained_image_parameters
            + self.number_constrained_target_parameters) as i64
            - self.number_unknown_parameters as i64;
        self.degrees_of_freedom
    }

    /// Standard deviation of unit weight from the weighted sum of squared residuals.
    ///
    /// With zero degrees of freedom only the parameter corrections criterion
    /// has a defined sigma0 (`sqrt(wssr)`); any other case fails with
    /// `InvalidDegreesOfFreedom`.
    pub fn compute_sigma0(
        &mut self,
        weighted_sum_squared_residuals: f64,
        criteria: ConvergenceCriteria,
    ) -> Result<f64> {
        let dof = self.degrees_of_freedom;
        self.sigma0 = if dof > 0 {
            (weighted_sum_squared_residuals / dof as f64).sqrt()
        } else if dof == 0 && criteria == ConvergenceCriteria::ParameterCorrections {
            weighted_sum_squared_residuals.sqrt()
        } else {
            return Err(CoreError::InvalidDegreesOfFreedom(dof));
        };
        Ok(self.sigma0)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Sigma ranges and statistics
    // ─────────────────────────────────────────────────────────────────────────

    pub fn reset_sigma_ranges(&mut self) {
        self.latitude_sigma_range = SigmaRange::default();
        self.longitude_sigma_range = SigmaRange::default();
        self.radius_sigma_range = SigmaRange::default();
    }

    /// Fold one point's latitude, longitude and radius sigmas (meters) into the ranges.
    pub fn update_sigma_ranges(&mut self, point_id: &str, sigmas: [f64; 3]) {
        self.latitude_sigma_range.update(point_id, sigmas[0]);
        self.longitude_sigma_range.update(point_id, sigmas[1]);
        self.radius_sigma_range.update(point_id, sigmas[2]);
    }

    /// Copy the parameter counts of `graph` into the results.
    pub fn set_graph_counts(&mut self, graph: &BundleGraph) {
        self.number_fixed_points = graph.number_fixed_points;
        self.number_ignored_points = graph.number_ignored_points;
        self.number_observations = graph.number_observations;
        self.number_image_parameters = graph.number_image_parameters;
        self.number_constrained_point_parameters = graph.number_constrained_point_parameters;
        self.number_constrained_image_parameters = graph.number_constrained_image_parameters();
        self.number_unknown_parameters = graph.number_unknown_parameters;
        self.number_rejected_observations = 2 * graph.number_rejected_measures();
    }

    /// Per-image residual statistics, rms residuals and, with error
    /// propagation, per-image parameter sigmas and point sigma ranges.
    pub fn compute_bundle_statistics(
        &mut self,
        graph: &BundleGraph,
        settings: &BundleSettings,
    ) -> Result<()> {
        let n_images = graph.observations.len();
        self.rms_image_sample_residuals = vec![Statistics::new(); n_images];
        self.rms_image_line_residuals = vec![Statistics::new(); n_images];
        self.rms_image_residuals = vec![Statistics::new(); n_images];

        let mut x_residuals = Statistics::new();
        let mut y_residuals = Statistics::new();
        for measure in graph.points.iter().flat_map(|p| p.measures.iter()) {
            if measure.rejected {
                continue;
            }
            let i = measure.observation_index;
            if i >= n_images {
                return Err(CoreError::InvalidState(format!(
                    "Measure {} refers to observation {} of {}",
                    measure.serial_number, i, n_images
                )));
            }
            self.rms_image_sample_residuals[i].add_data(measure.sample_residual);
            self.rms_image_line_residuals[i].add_data(measure.line_residual);
            self.rms_image_residuals[i].add_data(measure.sample_residual);
            self.rms_image_residuals[i].add_data(measure.line_residual);
            x_residuals.add_data(measure.sample_residual);
            y_residuals.add_data(measure.line_residual);
        }
        self.rms_x_residuals = x_residuals.rms().unwrap_or(0.0);
        self.rms_y_residuals = y_residuals.rms().unwrap_or(0.0);
        let mut xy_residuals = x_residuals;
        xy_residuals.add_data_slice(
            &graph
                .points
                .iter()
                .flat_map(|p| p.measures.iter())
                .filter(|m| !m.rejected)
                .map(|m| m.line_residual)
                .collect::<Vec<_>>(),
        );
        self.rms_xy_residuals = xy_residuals.rms().unwrap_or(0.0);

        if !settings.error_propagation {
            return Ok(());
        }

        self.compute_image_sigma_statistics(graph);
        self.compute_point_sigma_statistics(graph);
        Ok(())
    }

    fn compute_image_sigma_statistics(&mut self, graph: &BundleGraph) {
        let n_images = graph.observations.len();
        self.rms_image_x_sigmas = vec![Statistics::new(); n_images];
        self.rms_image_y_sigmas = vec![Statistics::new(); n_images];
        self.rms_image_z_sigmas = vec![Statistics::new(); n_images];
        self.rms_image_ra_sigmas = vec![Statistics::new(); n_images];
        self.rms_image_dec_sigmas = vec![Statistics::new(); n_images];
        self.rms_image_twist_sigmas = vec![Statistics::new(); n_images];

        for observation in graph.observations.iter() {
            let i = observation.index;
            // Only the constant coefficient of each parameter is summarized
            let names = observation.parameter_names().iter();
            for (name, sigma) in names.zip(observation.adjusted_sigmas()) {
                let target = match name.as_str() {
                    "X" => &mut self.rms_image_x_sigmas,
                    "Y" => &mut self.rms_image_y_sigmas,
                    "Z" => &mut self.rms_image_z_sigmas,
                    "RA" => &mut self.rms_image_ra_sigmas,
                    "DEC" => &mut self.rms_image_dec_sigmas,
                    "TWIST" => &mut self.rms_image_twist_sigmas,
                    _ => continue,
                };
                if let Some(stats) = target.get_mut(i) {
                    stats.add_data(*sigma);
                }
            }
        }
    }

    fn compute_point_sigma_statistics(&mut self, graph: &BundleGraph) {
        self.reset_sigma_ranges();
        let mut lat = Statistics::new();
        let mut lon = Statistics::new();
        let mut rad = Statistics::new();

        for point in graph.points.iter().filter(|p| !p.is_fixed()) {
            let sp = &point.adjusted;
            let (Ok(lat_sigma), Ok(lon_sigma), Ok(rad_sigma)) = (
                sp.lat_sigma_distance(),
                sp.lon_sigma_distance(),
                sp.local_radius_sigma_distance(),
            ) else {
                continue;
            };
            lat.add_data(lat_sigma);
            lon.add_data(lon_sigma);
            rad.add_data(rad_sigma);
            self.update_sigma_ranges(&point.id, [lat_sigma, lon_sigma, rad_sigma]);
        }

        self.rms_sigma_latitude_stats = lat.rms().unwrap_or(0.0);
        self.rms_sigma_longitude_stats = lon.rms().unwrap_or(0.0);
        self.rms_sigma_radius_stats = rad.rms().unwrap_or(0.0);
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Solver outputs
    // ─────────────────────────────────────────────────────────────────────────

    pub fn set_output_control_net(&mut self, net: ControlNet) {
        self.output_control_net = Some(net);
    }

    pub fn output_control_net(&self) -> Result<&ControlNet> {
        self.output_control_net
            .as_ref()
            .ok_or_else(|| {
                CoreError::InvalidState("Output Control Network has not been set.".to_string())
            })
    }

    pub fn set_observations(&mut self, observations: BundleObservationVector) {
        self.observations = observations;
    }

    pub fn observations(&self) -> &BundleObservationVector {
        &self.observations
    }

    pub fn set_bundle_control_points(&mut self, points: Vec<BundleControlPoint>) {
        self.bundle_control_points = points;
    }

    pub fn bundle_control_points(&self) -> &[BundleControlPoint] {
        &self.bundle_control_points
    }

    pub fn set_correlation_matrix(&mut self, matrix: CorrelationMatrix) {
        self.correlation_matrix = Some(matrix);
    }

    pub fn correlation_matrix(&self) -> Result<&CorrelationMatrix> {
        self.correlation_matrix.as_ref().ok_or_else(|| {
            CoreError::InvalidState("Correlation matrix for this bundle is not set.".to_string())
        })
    }

    pub fn has_correlation_matrix(&self) -> bool {
        self.correlation_matrix.is_some()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Counters
    // ─────────────────────────────────────────────────────────────────────────

    pub fn increment_fixed_points(&mut self) {
        self.number_fixed_points += 1;
    }

    pub fn increment_held_images(&mut self) {
        self.number_held_images += 1;
    }

    pub fn increment_ignored_points(&mut self) {
        self.number_ignored_points += 1;
    }

    pub fn increment_number_constrained_point_parameters(&mut self, n: usize) {
        self.number_constrained_point_parameters += n;
    }

    pub fn increment_number_constrained_image_parameters(&mut self, n: usize) {
        self.number_constrained_image_parameters += n;
    }

    pub fn increment_number_constrained_target_parameters(&mut self, n: usize) {
        self.number_constrained_target_parameters += n;
    }

    pub fn reset_number_constrained_point_parameters(&mut self) {
        self.number_constrained_point_parameters = 0;
    }

    pub fn reset_number_constrained_image_parameters(&mut self) {
        self.number_constrained_image_parameters = 0;
    }

    pub fn reset_number_constrained_target_parameters(&mut self) {
        self.number_constrained_target_parameters = 0;
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Setters
    // ─────────────────────────────────────────────────────────────────────────

    pub fn set_rms_xy_residuals(&mut self, rx: f64, ry: f64, rxy: f64) {
        self.rms_x_residuals = rx;
        self.rms_y_residuals = ry;
        self.rms_xy_residuals = rxy;
    }

    pub fn set_rejection_limit(&mut self, limit: f64) {
        self.rejection_limit = limit;
    }

    pub fn set_number_rejected_observations(&mut self, n: usize) {
        self.number_rejected_observations = n;
    }

    pub fn set_number_observations(&mut self, n: usize) {
        self.number_observations = n;
    }

    pub fn set_number_image_parameters(&mut self, n: usize) {
        self.number_image_parameters = n;
    }

    pub fn set_number_unknown_parameters(&mut self, n: usize) {
        self.number_unknown_parameters = n;
    }

    pub fn set_radians_to_meters(&mut self, radians_to_meters: f64) {
        self.radians_to_meters = radians_to_meters;
    }

    pub fn set_degrees_of_freedom(&mut self, dof: i64) {
        self.degrees_of_freedom = dof;
    }

    pub fn set_sigma0(&mut self, sigma0: f64) {
        self.sigma0 = sigma0;
    }

    pub fn set_elapsed_time(&mut self, seconds: f64) {
        self.elapsed_time = seconds;
    }

    pub fn set_elapsed_time_error_prop(&mut self, seconds: f64) {
        self.elapsed_time_error_prop = seconds;
    }

    pub fn set_converged(&mut self, converged: bool) {
        self.converged = converged;
    }

    pub fn set_iterations(&mut self, iterations: usize) {
        self.iterations = iterations;
    }

    pub fn set_rms_image_residual_lists(
        &mut self,
        sample: Vec<Statistics>,
        line: Vec<Statistics>,
        total: Vec<Statistics>,
    ) {
        self.rms_image_sample_residuals = sample;
        self.rms_image_line_residuals = line;
        self.rms_image_residuals = total;
    }

    pub fn set_sigma_rms(&mut self, lat: f64, lon: f64, rad: f64) {
        self.rms_sigma_latitude_stats = lat;
        self.rms_sigma_longitude_stats = lon;
        self.rms_sigma_radius_stats = rad;
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Accessors
    // ─────────────────────────────────────────────────────────────────────────

    pub fn number_fixed_points(&self) -> usize {
        self.number_fixed_points
    }

    pub fn number_ignored_points(&self) -> usize {
        self.number_ignored_points
    }

    pub fn number_held_images(&self) -> usize {
        self.number_held_images
    }

    pub fn rms_rx(&self) -> f64 {
        self.rms_x_residuals
    }

    pub fn rms_ry(&self) -> f64 {
        self.rms_y_residuals
    }

    pub fn rms_rxy(&self) -> f64 {
        self.rms_xy_residuals
    }

    pub fn rejection_limit(&self) -> f64 {
        self.rejection_limit
    }

    pub fn radians_to_meters(&self) -> f64 {
        self.radians_to_meters
    }

    pub fn number_rejected_observations(&self) -> usize {
        self.number_rejected_observations
    }

    pub fn number_observations(&self) -> usize {
        self.number_observations
    }

    pub fn number_image_parameters(&self) -> usize {
        self.number_image_parameters
    }

    pub fn number_constrained_point_parameters(&self) -> usize {
        self.number_constrained_point_parameters
    }

    pub fn number_constrained_image_parameters(&self) -> usize {
        self.number_constrained_image_parameters
    }

    pub fn number_constrained_target_parameters(&self) -> usize {
        self.number_constrained_target_parameters
    }

    pub fn number_unknown_parameters(&self) -> usize {
        self.number_unknown_parameters
    }

    pub fn degrees_of_freedom(&self) -> i64 {
        self.degrees_of_freedom
    }

    pub fn sigma0(&self) -> f64 {
        self.sigma0
    }

    pub fn elapsed_time(&self) -> f64 {
        self.elapsed_time
    }

    pub fn elapsed_time_error_prop(&self) -> f64 {
        self.elapsed_time_error_prop
    }

    pub fn converged(&self) -> bool {
        self.converged
    }

    pub fn iterations(&self) -> usize {
        self.iterations
    }

    pub fn rms_image_sample_residuals(&self) -> &[Statistics] {
        &self.rms_image_sample_residuals
    }

    pub fn rms_image_line_residuals(&self) -> &[Statistics] {
        &self.rms_image_line_residuals
    }

    pub fn rms_image_residuals(&self) -> &[Statistics] {
        &self.rms_image_residuals
    }

    pub fn rms_image_x_sigmas(&self) -> &[Statistics] {
        &self.rms_image_x_sigmas
    }

    pub fn rms_image_y_sigmas(&self) -> &[Statistics] {
        &self.rms_image_y_sigmas
    }

    pub fn rms_image_z_sigmas(&self) -> &[Statistics] {
        &self.rms_image_z_sigmas
    }

    pub fn rms_image_ra_sigmas(&self) -> &[Statistics] {
        &self.rms_image_ra_sigmas
    }

    pub fn rms_image_dec_sigmas(&self) -> &[Statistics] {
        &self.rms_image_dec_sigmas
    }

    pub fn rms_image_twist_sigmas(&self) -> &[Statistics] {
        &self.rms_image_twist_sigmas
    }

    pub fn latitude_sigma_range(&self) -> &SigmaRange {
        &self.latitude_sigma_range
    }

    pub fn longitude_sigma_range(&self) -> &SigmaRange {
        &self.longitude_sigma_range
    }

    pub fn radius_sigma_range(&self) -> &SigmaRange {
        &self.radius_sigma_range
    }

    pub fn sigma_latitude_statistics_rms(&self) -> f64 {
        self.rms_sigma_latitude_stats
    }

    pub fn sigma_longitude_statistics_rms(&self) -> f64 {
        self.rms_sigma_longitude_stats
    }

    pub fn sigma_radius_statistics_rms(&self) -> f64 {
        self.rms_sigma_radius_stats
    }
}
