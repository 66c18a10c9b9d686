//! Persistence of [`BundleResults`]: Pvl report, XML, flat binary stream,
//! columnar container and the per-measure residual CSV.
//!
//! Every persisted list carries its length. On read a declared length that
//! disagrees with the stored items is logged and the stored items are kept.

use std::path::Path;

use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::control_point::BundleGraph;
use super::correlation_matrix::CorrelationMatrix;
use super::ml_wfunctions::{MaximumLikelihoodModel, MaximumLikelihoodWFunctions};
use super::results::{BundleResults, SigmaRange};
use crate::error::{CoreError, Result, ResultExt};
use crate::io::binary::{ByteReader, ByteWriter};
use crate::io::columnar::{AttributeValue, ColumnarFile, Dataset, Group};
use crate::io::xml::{leaf, XmlElement};
use crate::pvl::{PvlContainer, PvlKeyword, PvlObject};
use crate::statistics::{CumulativeProbabilityCalculator, Statistics};

/// Version tag leading the flat binary stream.
pub const BUNDLE_RESULTS_BINARY_VERSION: u32 = 1;

/// Group created under the caller's location in a columnar container.
pub const COLUMNAR_GROUP_NAME: &str = "BundleResults";

const COLUMNAR_SAVE_ERROR: &str = "Unable to save bundle results information to an HDF5 group.";
const COLUMNAR_READ_ERROR: &str = "Unable to read bundle results information from an HDF5 group.";
const XML_READ_ERROR: &str = "Unable to read bundle results from XML";

/// Columnar dataset name of each per-image statistics list, in storage order.
const STATISTICS_DATASETS: [&str; 9] = [
    "RmsImageLineResidualsStatistics",
    "RmsImageSampleResidualsStatistics",
    "RmsImageResidualsStatistics",
    "RmsImageXSigmasStatistics",
    "RmsImageYSigmasStatistics",
    "RmsImageZSigmasStatistics",
    "RmsImageRASigmasStatistics",
    "RmsImageDECSigmasStatistics",
    "RmsImageTWISTSigmasStatistics",
];

impl BundleResults {
    fn statistics_lists(&self) -> [&Vec<Statistics>; 9] {
        [
            &self.rms_image_line_residuals,
            &self.rms_image_sample_residuals,
            &self.rms_image_residuals,
            &self.rms_image_x_sigmas,
            &self.rms_image_y_sigmas,
            &self.rms_image_z_sigmas,
            &self.rms_image_ra_sigmas,
            &self.rms_image_dec_sigmas,
            &self.rms_image_twist_sigmas,
        ]
    }

    fn statistics_lists_mut(&mut self) -> [&mut Vec<Statistics>; 9] {
        [
            &mut self.rms_image_line_residuals,
            &mut self.rms_image_sample_residuals,
            &mut self.rms_image_residuals,
            &mut self.rms_image_x_sigmas,
            &mut self.rms_image_y_sigmas,
            &mut self.rms_image_z_sigmas,
            &mut self.rms_image_ra_sigmas,
            &mut self.rms_image_dec_sigmas,
            &mut self.rms_image_twist_sigmas,
        ]
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Pvl report
    // ─────────────────────────────────────────────────────────────────────────

    /// Summary report as a Pvl object named `name`.
    pub fn pvl_object(&self, name: &str) -> PvlObject {
        let mut pvl = PvlObject::new(name);
        let mut add =
            |keyword: &str, value: String| pvl.add_keyword(PvlKeyword::with_value(keyword, value));

        add("NumberFixedPoints", self.number_fixed_points.to_string());
        add("NumberIgnoredPoints", self.number_ignored_points.to_string());
        add("NumberHeldImages", self.number_held_images.to_string());
        add("RMSResidualX", self.rms_x_residuals.to_string());
        add("RMSResidualY", self.rms_y_residuals.to_string());
        add("RMSResidualXY", self.rms_xy_residuals.to_string());
        add("RejectionLimit", self.rejection_limit.to_string());
        add("RadiansToMeters", self.radians_to_meters.to_string());
        add("NumberRejectedObservations", self.number_rejected_observations.to_string());
        add("NumberObservations", self.number_observations.to_string());
        add("NumberImageParameters", self.number_image_parameters.to_string());
        add(
            "NumberConstrainedPointParameters",
            self.number_constrained_point_parameters.to_string(),
        );
        add(
            "NumberConstrainedImageParameters",
            self.number_constrained_image_parameters.to_string(),
        );
        add(
            "NumberConstrainedTargetParameters",
            self.number_constrained_target_parameters.to_string(),
        );
        add("NumberUnknownParameters", self.number_unknown_parameters.to_string());
        add("DegreesOfFreedom", self.degrees_of_freedom.to_string());
        add("Sigma0", self.sigma0.to_string());
        add("ElapsedTime", self.elapsed_time.to_string());
        add("ElapsedTimeErrorProp", self.elapsed_time_error_prop.to_string());
        add("Iterations", self.iterations.to_string());
        add("Converged", self.converged.to_string());

        for (label, range) in [
            ("Latitude", &self.latitude_sigma_range),
            ("Longitude", &self.longitude_sigma_range),
            ("Radius", &self.radius_sigma_range),
        ] {
            add(&format!("MinSigma{}", label), range.min.to_string());
            add(&format!("MinSigma{}PointId", label), range.min_point_id.clone());
            add(&format!("MaxSigma{}", label), range.max.to_string());
            add(&format!("MaxSigma{}PointId", label), range.max_point_id.clone());
        }
        add("RmsSigmaLat", self.rms_sigma_latitude_stats.to_string());
        add("RmsSigmaLon", self.rms_sigma_longitude_stats.to_string());
        add("RmsSigmaRad", self.rms_sigma_radius_stats.to_string());
        add(
            "NumberMaximumLikelihoodModels",
            self.maximum_likelihood_functions.len().to_string(),
        );

        if !self.maximum_likelihood_functions.is_empty() {
            let mut models = PvlKeyword::new("MaximumLikelihoodModels");
            let mut quantiles = PvlKeyword::new("MaximumLikelihoodQuantiles");
            for (function, quantile) in &self.maximum_likelihood_functions {
                models.add_value(function.model().name());
                quantiles.add_value(quantile.to_string());
            }
            pvl.add_keyword(models);
            pvl.add_keyword(quantiles);
            pvl.add_keyword(PvlKeyword::with_value(
                "MaximumLikelihoodMedianR2Residuals",
                self.maximum_likelihood_median_r2_residuals.to_string(),
            ));
        }

        match &self.correlation_matrix {
            Some(matrix) => pvl.add_object(matrix.pvl_object()),
            None => pvl.add_keyword(PvlKeyword::with_value("CorrelationMatrix", "None")),
        }
        pvl
    }

    // ─────────────────────────────────────────────────────────────────────────
    // XML
    // ─────────────────────────────────────────────────────────────────────────

    pub fn to_xml(&self) -> XmlElement {
        let mut root = XmlElement::new("bundleResults").with_child(leaf("id", self.id));
        if let Some(matrix) = &self.correlation_matrix {
            root.push(matrix.to_xml());
        }

        root.push(
            XmlElement::new("generalStatisticsValues")
                .with_child(leaf("numberFixedPoints", self.number_fixed_points))
                .with_child(leaf("numberIgnoredPoints", self.number_ignored_points))
                .with_child(leaf("numberHeldImages", self.number_held_images))
                .with_child(leaf("rejectionLimit", self.rejection_limit))
                .with_child(leaf("numberRejectedObservations", self.number_rejected_observations))
                .with_child(leaf("numberObservations", self.number_observations))
                .with_child(leaf("numberImageParameters", self.number_image_parameters))
                .with_child(leaf(
                    "numberConstrainedPointParameters",
                    self.number_constrained_point_parameters,
                ))
                .with_child(leaf(
                    "numberConstrainedImageParameters",
                    self.number_constrained_image_parameters,
                ))
                .with_child(leaf(
                    "numberConstrainedTargetParameters",
                    self.number_constrained_target_parameters,
                ))
                .with_child(leaf("numberUnknownParameters", self.number_unknown_parameters))
                .with_child(leaf("degreesOfFreedom", self.degrees_of_freedom))
                .with_child(leaf("sigma0", self.sigma0))
                .with_child(leaf("converged", self.converged))
                .with_child(leaf("iterations", self.iterations))
                .with_child(leaf("radiansToMeters", self.radians_to_meters)),
        );

        let [line, sample, residuals, x, y, z, ra, dec, twist] = self.statistics_lists();
        root.push(
            XmlElement::new("rms")
                .with_child(
                    XmlElement::new("residuals")
                        .with_attr("x", self.rms_x_residuals)
                        .with_attr("y", self.rms_y_residuals)
                        .with_attr("xy", self.rms_xy_residuals),
                )
                .with_child(
                    XmlElement::new("sigmas")
                        .with_attr("lat", self.rms_sigma_latitude_stats)
                        .with_attr("lon", self.rms_sigma_longitude_stats)
                        .with_attr("rad", self.rms_sigma_radius_stats),
                )
                .with_child(
                    XmlElement::new("imageResidualsLists")
                        .with_child(statistics_list_xml("residualsList", residuals))
                        .with_child(statistics_list_xml("sampleList", sample))
                        .with_child(statistics_list_xml("lineList", line)),
                )
                .with_child(
                    XmlElement::new("imageSigmasLists")
                        .with_child(statistics_list_xml("xSigmas", x))
                        .with_child(statistics_list_xml("ySigmas", y))
                        .with_child(statistics_list_xml("zSigmas", z))
                        .with_child(statistics_list_xml("raSigmas", ra))
                        .with_child(statistics_list_xml("decSigmas", dec))
                        .with_child(statistics_list_xml("twistSigmas", twist)),
                ),
        );

        root.push(
            XmlElement::new("elapsedTime")
                .with_attr("time", self.elapsed_time)
                .with_attr("errorProp", self.elapsed_time_error_prop),
        );

        let mut min_max = XmlElement::new("minMaxSigmas");
        for (label, range) in [
            ("Lat", &self.latitude_sigma_range),
            ("Lon", &self.longitude_sigma_range),
            ("Rad", &self.radius_sigma_range),
        ] {
            min_max.push(range_bound_xml(&format!("min{}", label), range.min, &range.min_point_id));
            min_max.push(range_bound_xml(&format!("max{}", label), range.max, &range.max_point_id));
        }
        root.push(min_max);

        let mut mle = XmlElement::new("maximumLikelihoodEstimation")
            .with_attr("numberModels", self.maximum_likelihood_functions.len())
            .with_attr("maximumLikelihoodIndex", self.maximum_likelihood_index)
            .with_attr(
                "maximumLikelihoodMedianR2Residuals",
                self.maximum_likelihood_median_r2_residuals,
            )
            .with_child(self.cum_pro.to_xml("cumulativeProbabilityCalculator"))
            .with_child(self.cum_pro_res.to_xml("residualsCumulativeProbabilityCalculator"));
        for (i, (function, quantile)) in self.maximum_likelihood_functions.iter().enumerate() {
            mle.push(
                XmlElement::new("model")
                    .with_attr("modelNumber", i + 1)
                    .with_attr("modelSelection", function.model().name())
                    .with_attr("tweakingConstant", function.tweaking_constant())
                    .with_attr("quantile", quantile),
            );
        }
        root.push(mle);
        root
    }

    pub fn to_xml_string(&self) -> Result<String> {
        self.to_xml().to_xml_string()
    }

    /// Read from a `bundleResults` element.
    pub fn from_xml(element: &XmlElement) -> Result<Self> {
        Self::parse_xml(element).context_with(|| XML_READ_ERROR)
    }

    pub fn from_xml_str(text: &str) -> Result<Self> {
        XmlElement::parse(text)
            .and_then(|element| Self::parse_xml(&element))
            .context_with(|| XML_READ_ERROR)
    }

    fn parse_xml(element: &XmlElement) -> Result<Self> {
        if element.name != "bundleResults" {
            return Err(CoreError::Xml(format!(
                "Expected a <bundleResults> element, found <{}>",
                element.name
            )));
        }
        let mut results = BundleResults::new();
        results.id = Uuid::parse_str(element.child_text("id")?)
            .map_err(|e| CoreError::Xml(format!("Invalid bundle results id: {}", e)))?;
        if let Some(matrix) = element.child("correlationMatrix") {
            results.correlation_matrix = Some(CorrelationMatrix::from_xml(matrix)?);
        }

        let general = element.require_child("generalStatisticsValues")?;
        results.number_fixed_points = xml_count(general, "numberFixedPoints")?;
        results.number_ignored_points = xml_count(general, "numberIgnoredPoints")?;
        results.number_held_images = xml_count(general, "numberHeldImages")?;
        results.rejection_limit = general.child_f64("rejectionLimit")?;
        results.number_rejected_observations = xml_count(general, "numberRejectedObservations")?;
        results.number_observations = xml_count(general, "numberObservations")?;
        results.number_image_parameters = xml_count(general, "numberImageParameters")?;
        results.number_constrained_point_parameters =
            xml_count(general, "numberConstrainedPointParameters")?;
        results.number_constrained_image_parameters =
            xml_count(general, "numberConstrainedImageParameters")?;
        results.number_constrained_target_parameters =
            xml_count(general, "numberConstrainedTargetParameters")?;
        results.number_unknown_parameters = xml_count(general, "numberUnknownParameters")?;
        results.degrees_of_freedom = general.child_i64("degreesOfFreedom")?;
        results.sigma0 = general.child_f64("sigma0")?;
        results.converged = general.require_child("converged")?.text_bool()?;
        if general.child("iterations").is_some() {
            results.iterations = xml_count(general, "iterations")?;
        }
        if general.child("radiansToMeters").is_some() {
            results.radians_to_meters = general.child_f64("radiansToMeters")?;
        }

        let rms = element.require_child("rms")?;
        let residuals = rms.require_child("residuals")?;
        results.rms_x_residuals = residuals.attr_f64("x")?;
        results.rms_y_residuals = residuals.attr_f64("y")?;
        results.rms_xy_residuals = residuals.attr_f64("xy")?;
        let sigmas = rms.require_child("sigmas")?;
        results.rms_sigma_latitude_stats = sigmas.attr_f64("lat")?;
        results.rms_sigma_longitude_stats = sigmas.attr_f64("lon")?;
        results.rms_sigma_radius_stats = sigmas.attr_f64("rad")?;

        let residual_lists = rms.require_child("imageResidualsLists")?;
        let sigma_lists = rms.require_child("imageSigmasLists")?;
        let sources = [
            (residual_lists, "lineList"),
            (residual_lists, "sampleList"),
            (residual_lists, "residualsList"),
            (sigma_lists, "xSigmas"),
            (sigma_lists, "ySigmas"),
            (sigma_lists, "zSigmas"),
            (sigma_lists, "raSigmas"),
            (sigma_lists, "decSigmas"),
            (sigma_lists, "twistSigmas"),
        ];
        for (target, (parent, name)) in results.statistics_lists_mut().into_iter().zip(sources) {
            *target = statistics_list_from_xml(parent.require_child(name)?)?;
        }

        let elapsed = element.require_child("elapsedTime")?;
        results.elapsed_time = elapsed.attr_f64("time")?;
        results.elapsed_time_error_prop = elapsed.attr_f64("errorProp")?;

        let min_max = element.require_child("minMaxSigmas")?;
        results.latitude_sigma_range = sigma_range_from_xml(min_max, "minLat", "maxLat")?;
        results.longitude_sigma_range = sigma_range_from_xml(min_max, "minLon", "maxLon")?;
        results.radius_sigma_range = sigma_range_from_xml(min_max, "minRad", "maxRad")?;

        let mle = element.require_child("maximumLikelihoodEstimation")?;
        results.maximum_likelihood_index = mle.attr_i64("maximumLikelihoodIndex")?.max(0) as usize;
        results.maximum_likelihood_median_r2_residuals =
            mle.attr_f64("maximumLikelihoodMedianR2Residuals")?;
        if let Some(calc) = mle.child("cumulativeProbabilityCalculator") {
            results.cum_pro = CumulativeProbabilityCalculator::from_xml(calc)?;
        }
        if let Some(calc) = mle.child("residualsCumulativeProbabilityCalculator") {
            results.cum_pro_res = CumulativeProbabilityCalculator::from_xml(calc)?;
        }
        for model in mle.children_named("model") {
            let kind = MaximumLikelihoodModel::from_name(model.require_attr("modelSelection")?)?;
            let tweaking_constant = model.attr_f64("tweakingConstant")?;
            let function =
                MaximumLikelihoodWFunctions::with_tweaking_constant(kind, tweaking_constant)?;
            results
                .maximum_likelihood_functions
                .push((function, model.attr_f64("quantile")?));
        }
        check_declared_length(
            "maximumLikelihoodEstimation",
            mle.attr("numberModels"),
            results.maximum_likelihood_functions.len(),
        );
        Ok(results)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Flat binary stream
    // ─────────────────────────────────────────────────────────────────────────

    pub fn write_binary(&self, w: &mut ByteWriter) -> Result<()> {
        w.put_u32(BUNDLE_RESULTS_BINARY_VERSION)?;
        w.put_str(&self.id.to_string())?;

        w.put_bool(self.correlation_matrix.is_some())?;
        if let Some(matrix) = &self.correlation_matrix {
            w.put_str(&matrix.correlation_file_name)?;
            w.put_str(&matrix.covariance_file_name)?;
            w.put_u32(matrix.images_and_parameters.len() as u32)?;
            for (image, parameters) in &matrix.images_and_parameters {
                w.put_str(image)?;
                w.put_u32(parameters.len() as u32)?;
                for parameter in parameters {
                    w.put_str(parameter)?;
                }
            }
        }

        for count in [
            self.number_fixed_points,
            self.number_ignored_points,
            self.number_held_images,
            self.number_rejected_observations,
            self.number_observations,
            self.number_image_parameters,
            self.number_constrained_point_parameters,
            self.number_constrained_image_parameters,
            self.number_constrained_target_parameters,
            self.number_unknown_parameters,
            self.iterations,
        ] {
            w.put_u64(count as u64)?;
        }
        w.put_i64(self.degrees_of_freedom)?;
        for value in [
            self.rms_x_residuals,
            self.rms_y_residuals,
            self.rms_xy_residuals,
            self.rejection_limit,
            self.radians_to_meters,
            self.sigma0,
            self.elapsed_time,
            self.elapsed_time_error_prop,
            self.rms_sigma_latitude_stats,
            self.rms_sigma_longitude_stats,
            self.rms_sigma_radius_stats,
        ] {
            w.put_f64(value)?;
        }
        w.put_bool(self.converged)?;

        for list in self.statistics_lists() {
            w.put_u32(list.len() as u32)?;
            for stats in list {
                stats.write_binary(w)?;
            }
        }

        for range in [
            &self.latitude_sigma_range,
            &self.longitude_sigma_range,
            &self.radius_sigma_range,
        ] {
            w.put_f64(range.min)?;
            w.put_str(&range.min_point_id)?;
            w.put_f64(range.max)?;
            w.put_str(&range.max_point_id)?;
        }

        w.put_u32(self.maximum_likelihood_functions.len() as u32)?;
        for (function, quantile) in &self.maximum_likelihood_functions {
            w.put_i32(function.model().code())?;
            w.put_f64(function.tweaking_constant())?;
            w.put_f64(*quantile)?;
        }
        w.put_u64(self.maximum_likelihood_index as u64)?;
        w.put_f64(self.maximum_likelihood_median_r2_residuals)?;
        self.cum_pro.write_binary(w)?;
        self.cum_pro_res.write_binary(w)?;
        Ok(())
    }

    pub fn read_binary(r: &mut ByteReader<'_>) -> Result<Self> {
        let version = r.u32()?;
        if version != BUNDLE_RESULTS_BINARY_VERSION {
            return Err(CoreError::UnsupportedVersion {
                kind: "bundle results binary stream",
                version: version as i64,
            });
        }
        let mut results = BundleResults::new();
        let id = r.string()?;
        results.id = Uuid::parse_str(&id)
            .map_err(|e| r.invalid(format!("Invalid bundle results id: {}", e)))?;

        if r.bool()? {
            let mut matrix = CorrelationMatrix::new(r.string()?, r.string()?);
            let images = r.u32()?;
            for _ in 0..images {
                let image = r.string()?;
                let n = r.u32()?;
                let parameters = (0..n).map(|_| r.string()).collect::<Result<Vec<_>>>()?;
                matrix.set_image_parameters(image, parameters);
            }
            results.correlation_matrix = Some(matrix);
        }

        results.number_fixed_points = r.u64()? as usize;
        results.number_ignored_points = r.u64()? as usize;
        results.number_held_images = r.u64()? as usize;
        results.number_rejected_observations = r.u64()? as usize;
        results.number_observations = r.u64()? as usize;
        results.number_image_parameters = r.u64()? as usize;
        results.number_constrained_point_parameters = r.u64()? as usize;
        results.number_constrained_image_parameters = r.u64()? as usize;
        results.number_constrained_target_parameters = r.u64()? as usize;
        results.number_unknown_parameters = r.u64()? as usize;
        results.iterations = r.u64()? as usize;
        results.degrees_of_freedom = r.i64()?;

        results.rms_x_residuals = r.f64()?;
        results.rms_y_residuals = r.f64()?;
        results.rms_xy_residuals = r.f64()?;
        results.rejection_limit = r.f64()?;
        results.radians_to_meters = r.f64()?;
        results.sigma0 = r.f64()?;
        results.elapsed_time = r.f64()?;
        results.elapsed_time_error_prop = r.f64()?;
        results.rms_sigma_latitude_stats = r.f64()?;
        results.rms_sigma_longitude_stats = r.f64()?;
        results.rms_sigma_radius_stats = r.f64()?;
        results.converged = r.bool()?;

        for list in results.statistics_lists_mut() {
            let n = r.u32()?;
            *list = (0..n).map(|_| Statistics::read_binary(r)).collect::<Result<Vec<_>>>()?;
        }

        for range in [
            &mut results.latitude_sigma_range,
            &mut results.longitude_sigma_range,
            &mut results.radius_sigma_range,
        ] {
            range.min = r.f64()?;
            range.min_point_id = r.string()?;
            range.max = r.f64()?;
            range.max_point_id = r.string()?;
        }

        let models = r.u32()?;
        for _ in 0..models {
            let code = r.i32()?;
            let kind = MaximumLikelihoodModel::from_code(code)
                .ok_or_else(|| {
                    r.invalid(format!("Unknown maximum likelihood model code {}", code))
                })?;
            let function = MaximumLikelihoodWFunctions::with_tweaking_constant(kind, r.f64()?)?;
            results.maximum_likelihood_functions.push((function, r.f64()?));
        }
        results.maximum_likelihood_index = r.u64()? as usize;
        results.maximum_likelihood_median_r2_residuals = r.f64()?;
        results.cum_pro = CumulativeProbabilityCalculator::read_binary(r)?;
        results.cum_pro_res = CumulativeProbabilityCalculator::read_binary(r)?;
        Ok(results)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut w = ByteWriter::new();
        self.write_binary(&mut w)?;
        Ok(w.into_inner())
    }

    /// Decode a stream written by [`Self::to_bytes`]; `source` names it in errors.
    pub fn from_bytes(bytes: &[u8], source: &str) -> Result<Self> {
        let mut r = ByteReader::new(bytes, source);
        let results = Self::read_binary(&mut r)?;
        if r.remaining() > 0 {
            warn!("{} trailing bytes after bundle results in {}", r.remaining(), source);
        }
        Ok(results)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Columnar container
    // ─────────────────────────────────────────────────────────────────────────

    /// Store under `<group_path>/BundleResults` in the container at `path`,
    /// creating the file if needed.
    pub fn save_columnar<P: AsRef<Path>>(&self, path: P, group_path: &str) -> Result<()> {
        self.try_save_columnar(path.as_ref(), group_path)
            .context_with(|| COLUMNAR_SAVE_ERROR)
    }

    fn try_save_columnar(&self, path: &Path, group_path: &str) -> Result<()> {
        let mut file = ColumnarFile::open_or_create(path)?;
        let group = file.create_group(&format!("{}/{}", group_path, COLUMNAR_GROUP_NAME));
        *group = Group::default();

        group.set_attr("id", AttributeValue::Str(self.id.to_string()));
        if let Some(matrix) = &self.correlation_matrix {
            let correlation = AttributeValue::Str(matrix.correlation_file_name.clone());
            group.set_attr("correlationFileName", correlation);
            let covariance = AttributeValue::Str(matrix.covariance_file_name.clone());
            group.set_attr("covarianceFileName", covariance);
            let images = group.groups.entry("ImagesAndParameters".to_string()).or_default();
            for (image, parameters) in &matrix.images_and_parameters {
                images.set_attr(image, AttributeValue::Str(parameters.join(",")));
            }
        }

        for (name, value) in [
            ("numberFixedPoints", self.number_fixed_points),
            ("numberIgnoredPoints", self.number_ignored_points),
            ("numberHeldImages", self.number_held_images),
            ("numberObservations", self.number_observations),
            ("numberRejectedObservations", self.number_rejected_observations),
            ("numberImageParameters", self.number_image_parameters),
            ("numberConstrainedPointParameters", self.number_constrained_point_parameters),
            ("numberConstrainedImageParameters", self.number_constrained_image_parameters),
            ("numberConstrainedTargetParameters", self.number_constrained_target_parameters),
            ("numberUnknownParameters", self.number_unknown_parameters),
            ("iterations", self.iterations),
            ("maximumLikelihoodIndex", self.maximum_likelihood_index),
        ] {
            group.set_attr(name, AttributeValue::Int(value as i64));
        }
        group.set_attr("degreesOfFreedom", AttributeValue::Int(self.degrees_of_freedom));

        for (name, value) in [
            ("rejectionLimit", self.rejection_limit),
            ("radiansToMeters", self.radians_to_meters),
            ("sigma0", self.sigma0),
            ("elapsedTime", self.elapsed_time),
            ("elapsedTimeErrorProp", self.elapsed_time_error_prop),
            ("rmsXResiduals", self.rms_x_residuals),
            ("rmsYResiduals", self.rms_y_residuals),
            ("rmsXYResiduals", self.rms_xy_residuals),
            ("rmsSigmaLatitudeStats", self.rms_sigma_latitude_stats),
            ("rmsSigmaLongitudeStats", self.rms_sigma_longitude_stats),
            ("rmsSigmaRadiusStats", self.rms_sigma_radius_stats),
            ("maximumLikelihoodMedianR2Residuals", self.maximum_likelihood_median_r2_residuals),
        ] {
            group.set_attr(name, AttributeValue::Double(value));
        }
        group.set_attr("converged", AttributeValue::Bool(self.converged));

        for (label, range) in [
            ("Latitude", &self.latitude_sigma_range),
            ("Longitude", &self.longitude_sigma_range),
            ("Radius", &self.radius_sigma_range),
        ] {
            let min_id = AttributeValue::Str(range.min_point_id.clone());
            let max_id = AttributeValue::Str(range.max_point_id.clone());
            let (min, max) = (AttributeValue::Double(range.min), AttributeValue::Double(range.max));
            group.set_attr(&format!("minSigma{}Distance", label), min);
            group.set_attr(&format!("minSigma{}PointId", label), min_id);
            group.set_attr(&format!("maxSigma{}Distance", label), max);
            group.set_attr(&format!("maxSigma{}PointId", label), max_id);
        }

        group.set_attr(
            "numberMaximumLikelihoodModels",
            AttributeValue::Int(self.maximum_likelihood_functions.len() as i64),
        );
        for (i, (function, quantile)) in self.maximum_likelihood_functions.iter().enumerate() {
            let model = AttributeValue::Str(function.model().name().to_string());
            let constant = AttributeValue::Double(function.tweaking_constant());
            group.set_attr(&format!("maximumLikelihoodModel{}", i), model);
            group.set_attr(&format!("maximumLikelihoodTweakingConstant{}", i), constant);
            group.set_attr(
                &format!("maximumLikelihoodQuantile{}", i),
                AttributeValue::Double(*quantile),
            );
        }
        group.set_attr(
            "cumulativeProbabilityCalculator",
            AttributeValue::Str(serde_json::to_string(&self.cum_pro)?),
        );
        group.set_attr(
            "residualsCumulativeProbabilityCalculator",
            AttributeValue::Str(serde_json::to_string(&self.cum_pro_res)?),
        );

        for (name, list) in STATISTICS_DATASETS.iter().zip(self.statistics_lists()) {
            group.write_dataset(name, statistics_dataset(list)?);
        }

        file.flush()?;
        info!("Saved bundle results to {} under {}", path.display(), group_path);
        Ok(())
    }

    /// Load from `<group_path>/BundleResults` in the container at `path`.
    pub fn open_columnar<P: AsRef<Path>>(path: P, group_path: &str) -> Result<Self> {
        Self::try_open_columnar(path.as_ref(), group_path).context_with(|| COLUMNAR_READ_ERROR)
    }

    fn try_open_columnar(path: &Path, group_path: &str) -> Result<Self> {
        let file = ColumnarFile::open(path)?;
        let group = file.group(&format!("{}/{}", group_path, COLUMNAR_GROUP_NAME))?;
        let mut results = BundleResults::new();

        results.id = Uuid::parse_str(group.attr_str("id")?).map_err(|e| CoreError::Format {
            file: path.display().to_string(),
            message: format!("Invalid bundle results id: {}", e),
        })?;
        if let Ok(correlation) = group.attr_str("correlationFileName") {
            let covariance = group.attr_str("covarianceFileName")?;
            let mut matrix = CorrelationMatrix::new(correlation, covariance);
            if let Some(images) = group.groups.get("ImagesAndParameters") {
                for (image, value) in &images.attributes {
                    if let AttributeValue::Str(joined) = value {
                        let parameters = joined
                            .split(',')
                            .filter(|p| !p.is_empty())
                            .map(str::to_string)
                            .collect();
                        matrix.set_image_parameters(image.as_str(), parameters);
                    }
                }
            }
            results.correlation_matrix = Some(matrix);
        }

        let count = |name: &str| group.attr_i64(name).map(|v| v.max(0) as usize);
        results.number_fixed_points = count("numberFixedPoints")?;
        results.number_ignored_points = count("numberIgnoredPoints")?;
        results.number_held_images = count("numberHeldImages")?;
        results.number_observations = count("numberObservations")?;
        results.number_rejected_observations = count("numberRejectedObservations")?;
        results.number_image_parameters = count("numberImageParameters")?;
        results.number_constrained_point_parameters = count("numberConstrainedPointParameters")?;
        results.number_constrained_image_parameters = count("numberConstrainedImageParameters")?;
        results.number_constrained_target_parameters = count("numberConstrainedTargetParameters")?;
        results.number_unknown_parameters = count("numberUnknownParameters")?;
        results.iterations = count("iterations")?;
        results.maximum_likelihood_index = count("maximumLikelihoodIndex")?;
        results.degrees_of_freedom = group.attr_i64("degreesOfFreedom")?;

        results.rejection_limit = group.attr_f64("rejectionLimit")?;
        results.radians_to_meters = group.attr_f64("radiansToMeters")?;
        results.sigma0 = group.attr_f64("sigma0")?;
        results.elapsed_time = group.attr_f64("elapsedTime")?;
        results.elapsed_time_error_prop = group.attr_f64("elapsedTimeErrorProp")?;
        results.rms_x_residuals = group.attr_f64("rmsXResiduals")?;
        results.rms_y_residuals = group.attr_f64("rmsYResiduals")?;
        results.rms_xy_residuals = group.attr_f64("rmsXYResiduals")?;
        results.rms_sigma_latitude_stats = group.attr_f64("rmsSigmaLatitudeStats")?;
        results.rms_sigma_longitude_stats = group.attr_f64("rmsSigmaLongitudeStats")?;
        results.rms_sigma_radius_stats = group.attr_f64("rmsSigmaRadiusStats")?;
        results.maximum_likelihood_median_r2_residuals =
            group.attr_f64("maximumLikelihoodMedianR2Residuals")?;
        results.converged = group.attr_bool("converged")?;

        for (label, range) in [
            ("Latitude", &mut results.latitude_sigma_range),
            ("Longitude", &mut results.longitude_sigma_range),
            ("Radius", &mut results.radius_sigma_range),
        ] {
            range.min = group.attr_f64(&format!("minSigma{}Distance", label))?;
            range.min_point_id = group.attr_str(&format!("minSigma{}PointId", label))?.to_string();
            range.max = group.attr_f64(&format!("maxSigma{}Distance", label))?;
            range.max_point_id = group.attr_str(&format!("maxSigma{}PointId", label))?.to_string();
        }

        let models = count("numberMaximumLikelihoodModels")?;
        for i in 0..models {
            let name = group.attr_str(&format!("maximumLikelihoodModel{}", i))?;
            let kind = MaximumLikelihoodModel::from_name(name)?;
            let function = MaximumLikelihoodWFunctions::with_tweaking_constant(
                kind,
                group.attr_f64(&format!("maximumLikelihoodTweakingConstant{}", i))?,
            )?;
            let quantile = group.attr_f64(&format!("maximumLikelihoodQuantile{}", i))?;
            results.maximum_likelihood_functions.push((function, quantile));
        }
        results.cum_pro = serde_json::from_str(group.attr_str("cumulativeProbabilityCalculator")?)?;
        results.cum_pro_res =
            serde_json::from_str(group.attr_str("residualsCumulativeProbabilityCalculator")?)?;

        for (name, list) in STATISTICS_DATASETS.iter().zip(results.statistics_lists_mut()) {
            *list = statistics_from_dataset(name, group.dataset(name)?)?;
        }

        debug!("Opened bundle results {} from {}", results.id, path.display());
        Ok(results)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Residual report
    // ─────────────────────────────────────────────────────────────────────────

    /// Write one CSV row per measure of `graph` with its residuals.
    pub fn write_residuals_csv<P: AsRef<Path>>(&self, path: P, graph: &BundleGraph) -> Result<()> {
        let mut writer = csv::Writer::from_path(path.as_ref())?;
        let mut rows = 0usize;
        for point in &graph.points {
            for measure in &point.measures {
                writer.serialize(ResidualRow {
                    point_id: &point.id,
                    serial_number: &measure.serial_number,
                    sample: measure.sample,
                    line: measure.line,
                    sample_residual: measure.sample_residual,
                    line_residual: measure.line_residual,
                    residual_magnitude: measure.residual_magnitude(),
                    rejected: measure.rejected,
                })?;
                rows += 1;
            }
        }
        writer.flush()?;
        info!(
            "Wrote {} measure residuals of bundle {} to {}",
            rows,
            self.id,
            path.as_ref().display()
        );
        Ok(())
    }
}

#[derive(Serialize)]
struct ResidualRow<'a> {
    point_id: &'a str,
    serial_number: &'a str,
    sample: f64,
    line: f64,
    sample_residual: f64,
    line_residual: f64,
    residual_magnitude: f64,
    rejected: bool,
}

// ─────────────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────────────

fn statistics_list_xml(name: &str, list: &[Statistics]) -> XmlElement {
    let mut element = XmlElement::new(name).with_attr("listSize", list.len());
    for stats in list {
        element.push(stats.to_xml("statisticsItem"));
    }
    element
}

fn statistics_list_from_xml(element: &XmlElement) -> Result<Vec<Statistics>> {
    let list = element
        .children_named("statisticsItem")
        .map(Statistics::from_xml)
        .collect::<Result<Vec<_>>>()?;
    check_declared_length(&element.name, element.attr("listSize"), list.len());
    Ok(list)
}

/// Advisory check of a declared list length against the parsed one.
fn check_declared_length(list: &str, declared: Option<&str>, actual: usize) {
    match declared.map(|d| d.trim().parse::<usize>()) {
        Some(Ok(n)) if n == actual => {}
        Some(Ok(n)) => warn!("{} declares {} items but holds {}", list, n, actual),
        Some(Err(_)) => warn!("{} has an unreadable length attribute", list),
        None => warn!("{} has no length attribute", list),
    }
}

fn xml_count(element: &XmlElement, name: &str) -> Result<usize> {
    let value = element.child_i64(name)?;
    usize::try_from(value)
        .map_err(|_| CoreError::Xml(format!("[{}] must not be negative, got {}", name, value)))
}

fn range_bound_xml(name: &str, value: f64, point_id: &str) -> XmlElement {
    XmlElement::new(name)
        .with_attr("value", value)
        .with_attr("pointId", point_id)
}

fn sigma_range_from_xml(parent: &XmlElement, min: &str, max: &str) -> Result<SigmaRange> {
    let min = parent.require_child(min)?;
    let max = parent.require_child(max)?;
    Ok(SigmaRange {
        min: min.attr_f64("value")?,
        min_point_id: min.attr("pointId").unwrap_or_default().to_string(),
        max: max.attr_f64("value")?,
        max_point_id: max.attr("pointId").unwrap_or_default().to_string(),
    })
}

/// An empty list is stored as one default record so the dataset is never
/// empty; `numberOfRecords` holds the real length.
fn statistics_dataset(list: &[Statistics]) -> Result<Dataset> {
    let mut dataset = Dataset::new(Statistics::compound_fields());
    if list.is_empty() {
        dataset.push_record(Statistics::new().to_record())?;
    }
    for stats in list {
        dataset.push_record(stats.to_record())?;
    }
    dataset
        .attributes
        .insert("numberOfRecords".to_string(), AttributeValue::Int(list.len() as i64));
    Ok(dataset)
}

fn statistics_from_dataset(name: &str, dataset: &Dataset) -> Result<Vec<Statistics>> {
    let declared = match dataset.attributes.get("numberOfRecords") {
        Some(AttributeValue::Int(n)) => Some(*n),
        _ => None,
    };
    let stored = dataset.len();
    let n = match declared {
        Some(0) if stored == 1 => 0,
        Some(n) if n >= 0 && n as usize == stored => stored,
        Some(n) => {
            warn!("{} declares {} records but holds {}", name, n, stored);
            stored
        }
        None => {
            warn!("{} has no numberOfRecords attribute", name);
            stored
        }
    };
    (0..n).map(|i| Statistics::from_record(dataset, i)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundle::settings::{BundleSettings, MaximumLikelihoodTier};
    use crate::control::{
        ControlMeasure, ControlNet, ControlPoint, MeasureType, NetworkHeader, PointType,
    };
    use approx::assert_relative_eq;
    use tempfile::TempDir;

    fn populated() -> BundleResults {
        let mut results = BundleResults::new();
        let mut matrix = CorrelationMatrix::new("corr.dat", "cov.dat");
        matrix.set_image_parameters("IMG1", vec!["RA".into(), "DEC".into(), "TWIST".into()]);
        results.set_correlation_matrix(matrix);

        results.increment_fixed_points();
        results.increment_ignored_points();
        results.increment_held_images();
        results.set_number_observations(240);
        results.set_number_image_parameters(18);
        results.increment_number_constrained_point_parameters(12);
        results.increment_number_constrained_image_parameters(6);
        results.set_number_unknown_parameters(198);
        results.set_number_rejected_observations(4);
        results.compute_degrees_of_freedom();
        results.compute_sigma0(120.0, Default::default()).unwrap();
        results.set_rms_xy_residuals(0.25, 0.5, 0.395);
        results.set_rejection_limit(1.75);
        results.set_radians_to_meters(3_396_190.0);
        results.set_elapsed_time(12.5);
        results.set_elapsed_time_error_prop(3.25);
        results.set_converged(true);
        results.set_iterations(6);
        results.set_sigma_rms(1.5, 2.5, 3.5);
        results.update_sigma_ranges("P1", [1.0, 2.0, 3.0]);
        results.update_sigma_ranges("P2", [4.0, 1.0, 6.0]);

        let mut a = Statistics::new();
        a.add_data_slice(&[0.1, -0.2, 0.3]);
        let mut b = Statistics::new();
        b.add_data(0.75);
        results.set_rms_image_residual_lists(
            vec![a.clone(), b.clone()],
            vec![b.clone(), a.clone()],
            vec![a],
        );

        results
            .maximum_likelihood_set_up(&[
                MaximumLikelihoodTier::new(MaximumLikelihoodModel::Huber),
                MaximumLikelihoodTier::new(MaximumLikelihoodModel::Chen),
            ])
            .unwrap();
        for i in 0..150 {
            results.add_probability_distribution_observation(i as f64 * 0.1);
            results.add_residuals_probability_distribution_observation(i as f64 * 0.01);
        }
        results.print_maximum_likelihood_tier_information().unwrap();
        results.increment_maximum_likelihood_model_index();
        for i in 0..40 {
            results.add_probability_distribution_observation(i as f64);
        }
        results
    }

    #[test]
    fn test_pvl_report() {
        let results = populated();
        let pvl = results.pvl_object("BundleResults");
        assert_eq!(pvl.first_value("NumberObservations"), Some("240"));
        assert_eq!(pvl.first_value("DegreesOfFreedom"), Some("60"));
        assert_eq!(pvl.first_value("MaxSigmaLatitudePointId"), Some("P2"));
        assert_eq!(pvl.first_value("Converged"), Some("true"));
        let models = pvl.keyword("MaximumLikelihoodModels").unwrap();
        assert_eq!(models.value(1), Some("Chen"));
        assert!(pvl.has_object("CorrelationMatrixData"));

        let bare = BundleResults::new().pvl_object("BundleResults");
        assert_eq!(bare.first_value("CorrelationMatrix"), Some("None"));
        assert!(!bare.has_keyword("MaximumLikelihoodModels"));
    }

    #[test]
    fn test_xml_round_trip() {
        let results = populated();
        let text = results.to_xml_string().unwrap();
        let parsed = BundleResults::from_xml_str(&text).unwrap();
        assert_eq!(parsed, results);
        assert_relative_eq!(parsed.sigma0(), (2.0_f64).sqrt());
    }

    #[test]
    fn test_xml_list_size_mismatch_is_advisory() {
        let results = populated();
        let text = results
            .to_xml_string()
            .unwrap()
            .replace("<residualsList listSize=\"1\"", "<residualsList listSize=\"7\"");
        let parsed = BundleResults::from_xml_str(&text).unwrap();
        assert_eq!(parsed.rms_image_residuals().len(), 1);
    }

    #[test]
    fn test_xml_errors_are_wrapped() {
        let err =
            BundleResults::from_xml_str("<bundleResults><id>nope</id></bundleResults>").unwrap_err();
        assert!(err.to_string().starts_with("Unable to read bundle results from XML"));
        assert!(matches!(err.root(), CoreError::Xml(_)));
    }

    #[test]
    fn test_binary_round_trip() {
        let results = populated();
        let bytes = results.to_bytes().unwrap();
        let parsed = BundleResults::from_bytes(&bytes, "results.bin").unwrap();
        assert_eq!(parsed, results);

        let mut truncated = bytes.clone();
        truncated.truncate(bytes.len() / 2);
        assert!(BundleResults::from_bytes(&truncated, "results.bin").is_err());
    }

    #[test]
    fn test_binary_version_check() {
        let mut bytes = populated().to_bytes().unwrap();
        bytes[0] = 9;
        let err = BundleResults::from_bytes(&bytes, "results.bin").unwrap_err();
        assert!(matches!(err, CoreError::UnsupportedVersion { version: 9, .. }));
    }

    #[test]
    fn test_columnar_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("project.h5.json");
        let results = populated();
        results.save_columnar(&path, "/Runs/1").unwrap();

        let reopened = BundleResults::open_columnar(&path, "/Runs/1").unwrap();
        assert_eq!(reopened, results);

        let file = ColumnarFile::open(&path).unwrap();
        let group = file.group("/Runs/1/BundleResults").unwrap();
        let line = group.dataset("RmsImageLineResidualsStatistics").unwrap();
        assert_eq!(line.len(), 2);
        let empty = group.dataset("RmsImageXSigmasStatistics").unwrap();
        assert_eq!(empty.len(), 1);
        assert_eq!(empty.attributes.get("numberOfRecords"), Some(&AttributeValue::Int(0)));
    }

    #[test]
    fn test_columnar_errors_are_wrapped() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("missing.json");
        let err = BundleResults::open_columnar(&path, "/").unwrap_err();
        assert!(err
            .to_string()
            .starts_with("Unable to read bundle results information from an HDF5 group."));

        populated().save_columnar(&path, "/A").unwrap();
        let err = BundleResults::open_columnar(&path, "/B").unwrap_err();
        assert!(matches!(err, CoreError::Context { .. }));
    }

    #[test]
    fn test_residuals_csv() {
        let mut net = ControlNet::new(NetworkHeader::default());
        let mut point = ControlPoint::new("P1", PointType::Free);
        for (serial, sample, line) in [("A/B/1", 10.0, 20.0), ("A/B/2", 30.0, 40.0)] {
            let measure =
                ControlMeasure::new(serial, MeasureType::Manual).with_coordinate(sample, line);
            point.add_measure(measure).unwrap();
        }
        net.add_point(point).unwrap();
        let mut graph = BundleGraph::build(&net, &BundleSettings::default()).unwrap();
        graph.points[0].apply_residuals(&[(0.3, 0.4), (1.0, 0.0)]).unwrap();
        graph.points[0].measures[1].rejected = true;

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("residuals.csv");
        BundleResults::new().write_residuals_csv(&path, &graph).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let mut lines = text.lines();
        assert_eq!(
            lines.next(),
            Some(
                "point_id,serial_number,sample,line,\
                 sample_residual,line_residual,residual_magnitude,rejected"
            )
        );
        let mut reader = csv::ReaderBuilder::new().from_path(&path).unwrap();
        let rows: Vec<csv::StringRecord> =
            reader.records().collect::<std::result::Result<_, _>>().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(&rows[0][0], "P1");
        assert_relative_eq!(rows[0][6].parse::<f64>().unwrap(), 0.5, epsilon = 1e-12);
        assert_eq!(&rows[1][7], "true");
    }
}
