use approx::assert_relative_eq;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tempfile::TempDir;

use planetary_bundle::bundle::{
    BundleGraph, BundleResults, BundleSettings, CorrelationMatrix, MaximumLikelihoodModel,
    MaximumLikelihoodTier,
};
use planetary_bundle::control::{
    ControlMeasure, ControlNet, ControlPoint, MeasureType, NetworkHeader, PointType,
};
use planetary_bundle::pvl::PvlContainer;

fn survey_network() -> ControlNet {
    let mut net = ControlNet::new(NetworkHeader {
        network_id: "survey".into(),
        target_name: "Mars".into(),
        ..Default::default()
    });
    for p in 0..12 {
        let point_type = if p == 0 { PointType::Fixed } else { PointType::Free };
        let mut point = ControlPoint::new(format!("P{:02}", p), point_type);
        for image in 0..3 {
            let serial = format!("MRO/CTX/{}", image);
            let measure = ControlMeasure::new(serial, MeasureType::RegisteredSubPixel)
                .with_coordinate(100.0 + p as f64, 200.0 + image as f64);
            point.add_measure(measure).unwrap();
        }
        net.add_point(point).unwrap();
    }
    net
}

/// Results of a simulated run: residuals drawn from a seeded distribution,
/// one robust tier consumed.
fn simulated_run() -> (BundleResults, BundleGraph) {
    let settings = BundleSettings {
        outlier_rejection: true,
        maximum_likelihood: vec![
            MaximumLikelihoodTier::new(MaximumLikelihoodModel::Huber),
            MaximumLikelihoodTier::new(MaximumLikelihoodModel::Welsch),
        ],
        ..Default::default()
    };
    let net = survey_network();
    let mut graph = BundleGraph::build(&net, &settings).unwrap();

    let mut rng = StdRng::seed_from_u64(7);
    for point in &mut graph.points {
        let residuals: Vec<(f64, f64)> = (0..point.measures.len())
            .map(|_| (rng.gen_range(-0.5..0.5), rng.gen_range(-0.5..0.5)))
            .collect();
        point.apply_residuals(&residuals).unwrap();
    }
    // One gross blunder
    graph.points[3].measures[1].sample_residual = 25.0;

    let limit = graph.compute_rejection_limit(settings.outlier_rejection_multiplier).unwrap();
    assert_eq!(graph.flag_outliers(limit), 1);

    let mut results = BundleResults::new();
    results.maximum_likelihood_set_up(&settings.maximum_likelihood).unwrap();
    for residual in graph.residual_magnitudes() {
        results.add_probability_distribution_observation(residual);
        results.add_residuals_probability_distribution_observation(residual);
    }
    results.print_maximum_likelihood_tier_information().unwrap();
    results.increment_maximum_likelihood_model_index();

    results.set_graph_counts(&graph);
    results.set_rejection_limit(limit);
    results.compute_degrees_of_freedom();
    results.compute_sigma0(42.0, settings.convergence_criteria).unwrap();
    results.compute_bundle_statistics(&graph, &settings).unwrap();
    results.set_iterations(4);
    results.set_converged(true);
    results.set_elapsed_time(1.25);

    let mut matrix = CorrelationMatrix::new("survey_corr.dat", "survey_cov.dat");
    for observation in graph.observations.iter() {
        let serial = observation.serial_numbers[0].clone();
        matrix.set_image_parameters(serial, observation.parameter_names().to_vec());
    }
    results.set_correlation_matrix(matrix);
    (results, graph)
}

#[test]
fn simulated_run_counts() {
    let (results, graph) = simulated_run();
    assert_eq!(results.number_fixed_points(), 1);
    assert_eq!(results.number_observations(), 12 * 3 * 2);
    assert_eq!(results.number_rejected_observations(), 2);
    assert_eq!(results.number_unknown_parameters(), 11 * 2 + graph.number_image_parameters);
    assert_eq!(results.rms_image_residuals().len(), 3);
    assert!(results.rms_rxy() > 0.0 && results.rms_rxy() < 0.5);
    assert_eq!(results.maximum_likelihood_model_index(), 1);
    assert!(results.maximum_likelihood_model_w_function(0).unwrap().tweaking_constant() > 0.0);
}

#[test]
fn results_survive_every_format() {
    let (results, graph) = simulated_run();
    let dir = TempDir::new().unwrap();

    // Pvl report
    let report = results.pvl_object("BundleResults");
    assert_eq!(report.first_value("NumberFixedPoints"), Some("1"));
    assert_eq!(report.first_value("NumberMaximumLikelihoodModels"), Some("2"));
    assert!(report.has_object("CorrelationMatrixData"));

    // XML
    let xml = results.to_xml_string().unwrap();
    let from_xml = BundleResults::from_xml_str(&xml).unwrap();
    assert_eq!(from_xml, results);

    // Binary
    let bytes = results.to_bytes().unwrap();
    let from_binary = BundleResults::from_bytes(&bytes, "survey.bin").unwrap();
    assert_eq!(from_binary, results);

    // Columnar
    let project = dir.path().join("project.json");
    results.save_columnar(&project, "/Results").unwrap();
    let from_columnar = BundleResults::open_columnar(&project, "/Results").unwrap();
    assert_eq!(from_columnar, results);
    assert_relative_eq!(from_columnar.sigma0(), results.sigma0());

    // Residual report
    let csv_path = dir.path().join("residuals.csv");
    results.write_residuals_csv(&csv_path, &graph).unwrap();
    let mut reader = csv::Reader::from_path(&csv_path).unwrap();
    let rows: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
    assert_eq!(rows.len(), 36);
    assert_eq!(rows.iter().filter(|r| &r[7] == "true").count(), 1);
}
