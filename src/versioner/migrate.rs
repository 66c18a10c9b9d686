//! Pvl network schema migration.
//!
//! Each step takes a `ControlNetwork` object at version N and returns it at
//! version N+1. [`upgrade_to_latest`] composes the steps until the latest
//! version is reached.
//!
//! | step | changes |
//! |------|---------|
//! | 1→2 | spherical keywords become rectangular, sigmas become covariances, measure types renamed |
//! | 2→3 | points with a covariance become `Constrained` |
//! | 3→4 | `Ground` → `Fixed`, `Tie` → `Free` |

use tracing::{debug, info};

use crate::error::{CoreError, Result, ResultExt};
use crate::geometry::{Angle, SurfacePoint};
use crate::pvl::{parse_f64, PvlContainer, PvlGroup, PvlKeyword, PvlObject};
use crate::target::{canonical_target_name, Radii, RadiiProvider};

/// Version written by this crate.
pub const LATEST_PVL_VERSION: i64 = 4;

/// Sigma used for a missing or out-of-range legacy sigma (meters).
const DEFAULT_LEGACY_SIGMA: f64 = 10_000.0;

const COVARIANCE_KEYWORDS: [&str; 2] = ["AprioriCovarianceMatrix", "AdjustedCovarianceMatrix"];

/// Version of a `ControlNetwork` object; a missing `Version` keyword is 1.
pub fn network_version(network: &PvlObject) -> Result<i64> {
    match network.keyword("Version") {
        Some(k) => k.as_i64(),
        None => Ok(1),
    }
}

/// Upgrade `network` to [`LATEST_PVL_VERSION`].
///
/// Radii are only consulted by the 1→2 step.
pub fn upgrade_to_latest(mut network: PvlObject, radii: &dyn RadiiProvider) -> Result<PvlObject> {
    if !network.has_keyword("Version") {
        network.add_keyword(PvlKeyword::with_value("Version", "1"));
    }
    let mut version = network_version(&network)?;

    while version != LATEST_PVL_VERSION {
        let previous = version;
        network = match version {
            1 => convert_v1_to_v2(network, radii)?,
            2 => convert_v2_to_v3(network),
            3 => convert_v3_to_v4(network),
            _ => {
                return Err(CoreError::UnsupportedVersion {
                    kind: "Pvl file",
                    version,
                })
            }
        };
        version = network_version(&network)?;
        if version == previous {
            return Err(CoreError::InvalidState(format!(
                "Cannot update from version [{}] to any other version",
                version
            )));
        }
        info!("Upgraded control network from version {} to {}", previous, version);
    }
    Ok(network)
}

// ─────────────────────────────────────────────────────────────────────────────
// Version 1 → 2
// ─────────────────────────────────────────────────────────────────────────────

/// Convert a version 1 network to version 2. Requires the target radii.
pub fn convert_v1_to_v2(mut network: PvlObject, radii: &dyn RadiiProvider) -> Result<PvlObject> {
    network.set_value("Version", "2");

    let target = network.first_value("TargetName").unwrap_or("").to_string();
    if target.starts_with("MRO/") {
        network.set_value("TargetName", "Mars");
    }
    let radii = radii.radii(&canonical_target_name(&target)).ok_or_else(|| {
        CoreError::InvalidState(format!("No radii are known for target [{}]", target))
            .wrap("Unable to convert ControlNet Version 1 to Version 2.")
    })?;

    for point in network.objects.iter_mut() {
        convert_point_v1(point, radii)
            .context_with(|| "Unable to convert ControlNet Version 1 to Version 2.")?;
        for measure in point.groups.iter_mut() {
            convert_measure_v1(measure);
        }
    }
    debug!("Converted {} points to version 2", network.objects.len());
    Ok(network)
}

fn convert_point_v1(cp: &mut PvlObject, radii: Radii) -> Result<()> {
    if cp.first_value("Held") == Some("True") {
        cp.set_value("PointType", "Ground");
    }
    cp.delete_keyword("Held");

    cp.rename_keyword("AprioriLatLonSource", "AprioriXYZSource");
    cp.rename_keyword("AprioriLatLonSourceFile", "AprioriXYZSourceFile");

    let had_apriori_spherical = cp.has_keyword("AprioriLatitude");
    if had_apriori_spherical {
        let apriori =
            spherical_keywords(cp, "AprioriLatitude", "AprioriLongitude", "AprioriRadius")?;
        set_position(cp, "Apriori", &apriori);
    }

    if cp.has_keyword("Latitude") {
        let adjusted = spherical_keywords(cp, "Latitude", "Longitude", "Radius")?;
        set_position(cp, "Adjusted", &adjusted);
        if !had_apriori_spherical {
            set_position(cp, "Apriori", &adjusted);
        }
    }

    for axis in ["X", "Y", "Z"] {
        cp.rename_keyword(axis, &format!("Adjusted{}", axis));
    }

    let apriori_sigmas = legacy_sigmas(cp, "AprioriSigma");
    if apriori_sigmas.iter().any(Option::is_some) {
        for (sigma, flag) in apriori_sigmas
            .iter()
            .zip(["LatitudeConstrained", "LongitudeConstrained", "RadiusConstrained"])
        {
            if sigma.is_some() {
                cp.set_value(flag, "True");
            }
        }
        let matrix = sigma_covariance(cp, "Apriori", &apriori_sigmas, radii)?;
        cp.set_keyword(matrix);
    }

    let adjusted_sigmas = legacy_sigmas(cp, "AdjustedSigma");
    if adjusted_sigmas.iter().any(Option::is_some) {
        let matrix = sigma_covariance(cp, "Adjusted", &adjusted_sigmas, radii)?;
        cp.set_keyword(matrix);
    }

    cp.rename_keyword("ApostCovarianceMatrix", "AdjustedCovarianceMatrix");

    let constrained_default =
        if cp.has_keyword("AprioriCovarianceMatrix") { "True" } else { "False" };
    for flag in ["LatitudeConstrained", "LongitudeConstrained", "RadiusConstrained"] {
        if !cp.has_keyword(flag) {
            cp.add_keyword(PvlKeyword::with_value(flag, constrained_default));
        }
    }

    for legacy in [
        "AprioriLatitude",
        "AprioriLongitude",
        "AprioriRadius",
        "Latitude",
        "Longitude",
        "Radius",
        "AprioriSigmaLatitude",
        "AprioriSigmaLongitude",
        "AprioriSigmaRadius",
        "AdjustedSigmaLatitude",
        "AdjustedSigmaLongitude",
        "AdjustedSigmaRadius",
    ] {
        cp.delete_keyword(legacy);
    }

    cp.keywords.retain(|k| !k.first().is_empty());
    Ok(())
}

fn spherical_keywords(cp: &PvlObject, lat: &str, lon: &str, radius: &str) -> Result<SurfacePoint> {
    let lat = cp.require_keyword(lat)?.as_f64()?;
    let lon = cp.require_keyword(lon)?.as_f64()?;
    let radius = cp.require_keyword(radius)?.as_f64()?;
    Ok(SurfacePoint::from_spherical(
        Angle::from_degrees(lat),
        Angle::from_degrees(lon),
        radius,
    ))
}

fn set_position(cp: &mut PvlObject, prefix: &str, point: &SurfacePoint) {
    for (axis, value) in ["X", "Y", "Z"].iter().zip([point.x(), point.y(), point.z()]) {
        cp.set_keyword(PvlKeyword::with_unit(
            format!("{}{}", prefix, axis),
            value.to_string(),
            "meters",
        ));
    }
}

/// Legacy `<prefix>Latitude/Longitude/Radius` sigma values; `Some` when the
/// keyword exists. Only values in (0, 10000) replace the default.
fn legacy_sigmas(cp: &PvlObject, prefix: &str) -> [Option<f64>; 3] {
    ["Latitude", "Longitude", "Radius"].map(|axis| {
        cp.keyword(&format!("{}{}", prefix, axis)).map(|k| {
            parse_f64(k.first())
                .filter(|v| *v > 0.0 && *v < DEFAULT_LEGACY_SIGMA)
                .unwrap_or(DEFAULT_LEGACY_SIGMA)
        })
    })
}

fn sigma_covariance(
    cp: &PvlObject,
    prefix: &str,
    sigmas: &[Option<f64>; 3],
    radii: Radii,
) -> Result<PvlKeyword> {
    let coordinate = |axis: &str| -> Result<f64> {
        cp.require_keyword(&format!("{}{}", prefix, axis))?.as_f64()
    };
    let mut point =
        SurfacePoint::from_rectangular(coordinate("X")?, coordinate("Y")?, coordinate("Z")?);
    point.set_radii(radii)?;
    let [lat, lon, rad] = (*sigmas).map(|s| s.unwrap_or(DEFAULT_LEGACY_SIGMA));
    point.set_spherical_sigmas_distance(lat, lon, rad)?;

    let mut matrix = PvlKeyword::new(format!("{}CovarianceMatrix", prefix));
    if let Some(upper) = point.covariance_upper() {
        for value in upper {
            matrix.add_value(value.to_string());
        }
    }
    Ok(matrix)
}

fn convert_measure_v1(cm: &mut PvlGroup) {
    if let Some(kind) = cm.first_value("MeasureType").map(str::to_ascii_lowercase) {
        match kind.as_str() {
            "estimated" | "unmeasured" => {
                let has_sample_line = ["Sample", "Line"]
                    .iter()
                    .all(|name| cm.keyword(name).and_then(|k| parse_f64(k.first())).is_some());
                if !has_sample_line {
                    cm.set_value("Sample", "0.0");
                    cm.set_value("Line", "0.0");
                    cm.set_value("Ignore", "True");
                }
                cm.set_value("MeasureType", "Candidate");
            }
            "automatic" | "validatedmanual" | "automaticpixel" => {
                cm.set_value("MeasureType", "RegisteredPixel");
            }
            "validatedautomatic" | "automaticsubpixel" => {
                cm.set_value("MeasureType", "RegisteredSubPixel");
            }
            _ => {}
        }
    }

    cm.rename_keyword("ErrorSample", "SampleResidual");
    cm.rename_keyword("ErrorLine", "LineResidual");

    for name in ["SampleResidual", "LineResidual", "Diameter"] {
        let is_zero = cm.keyword(name).and_then(|k| parse_f64(k.first())) == Some(0.0);
        if is_zero {
            cm.delete_keyword(name);
        }
    }
    cm.delete_keyword("ErrorMagnitude");
    cm.delete_keyword("ZScore");

    cm.keywords.retain(|k| !k.first().is_empty());
}

// ─────────────────────────────────────────────────────────────────────────────
// Version 2 → 3 → 4
// ─────────────────────────────────────────────────────────────────────────────

/// Points carrying a covariance become `Constrained`. Held points keep their type.
pub fn convert_v2_to_v3(mut network: PvlObject) -> PvlObject {
    network.set_value("Version", "3");
    for cp in network.objects.iter_mut() {
        let held = matches!(cp.first_value("PointType"), Some("Ground") | Some("Fixed"));
        let has_covariance = COVARIANCE_KEYWORDS.iter().any(|k| cp.has_keyword(k));
        if has_covariance && !held {
            cp.set_value("PointType", "Constrained");
        }
    }
    network
}

/// Rename the legacy point types.
pub fn convert_v3_to_v4(mut network: PvlObject) -> PvlObject {
    network.set_value("Version", "4");
    for cp in network.objects.iter_mut() {
        match cp.first_value("PointType") {
            Some("Ground") => cp.set_value("PointType", "Fixed"),
            Some("Tie") => cp.set_value("PointType", "Free"),
            _ => {}
        }
    }
    network
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pvl::parse;
    use crate::target::TargetRadiiTable;
    use approx::assert_relative_eq;

    const V1_NETWORK: &str = r#"
Object = ControlNetwork
  NetworkId   = Legacy
  TargetName  = MRO/MARS
  UserName    = tester
  Created     = 2009-01-01T00:00:00
  LastModified = 2009-01-01T00:00:00
  Description = "legacy net"

  Object = ControlPoint
    PointType = Tie
    PointId   = held_point
    Held      = True
    AprioriLatitude  = 10.0
    AprioriLongitude = 20.0
    AprioriRadius    = 3396190.0
    AprioriSigmaLatitude = 50.0
    AprioriSigmaRadius   = 20000.0
    ChooserName = ""

    Group = ControlMeasure
      SerialNumber = IMG1
      MeasureType  = Estimated
      ErrorSample  = 0.0
      ErrorLine    = 0.25
      ZScore       = 1.5
      Reference    = True
    End_Group

    Group = ControlMeasure
      SerialNumber = IMG2
      MeasureType  = ValidatedAutomatic
      Sample       = 10.5
      Line         = 20.5
      Diameter     = 0.0
    End_Group
  End_Object

  Object = ControlPoint
    PointType = Tie
    PointId   = adjusted_only
    Latitude  = 0.0
    Longitude = 90.0
    Radius    = 1000.0
  End_Object
End_Object
End
"#;

    fn v1_network() -> PvlObject {
        parse(V1_NETWORK)
            .unwrap()
            .require_object("ControlNetwork")
            .unwrap()
            .clone()
    }

    #[test]
    fn test_held_point_becomes_fixed() {
        let net = upgrade_to_latest(v1_network(), &TargetRadiiTable::default()).unwrap();
        assert_eq!(network_version(&net).unwrap(), LATEST_PVL_VERSION);
        assert_eq!(net.first_value("TargetName"), Some("Mars"));

        let held = &net.objects[0];
        assert_eq!(held.first_value("PointType"), Some("Fixed"));
        assert!(!held.has_keyword("Held"));
        assert!(!held.has_keyword("AprioriLatitude"));
        assert!(!held.has_keyword("ChooserName"));
        assert_eq!(held.first_value("LatitudeConstrained"), Some("True"));
        assert_eq!(held.first_value("LongitudeConstrained"), Some("True"));
        assert_eq!(held.first_value("RadiusConstrained"), Some("True"));
        assert_eq!(held.require_keyword("AprioriCovarianceMatrix").unwrap().len(), 6);
    }

    #[test]
    fn test_apriori_sigmas_round_trip_through_covariance() {
        let v2 = convert_v1_to_v2(v1_network(), &TargetRadiiTable::default()).unwrap();
        let cp = &v2.objects[0];
        let value = |name: &str| cp.require_keyword(name).unwrap().as_f64().unwrap();
        let matrix = cp.require_keyword("AprioriCovarianceMatrix").unwrap();
        let mut upper = [0.0; 6];
        for (i, u) in upper.iter_mut().enumerate() {
            *u = matrix.f64_at(i).unwrap();
        }

        let radii = Radii::biaxial(3_396_190.0, 3_376_200.0).unwrap();
        let (x, y, z) = (value("AprioriX"), value("AprioriY"), value("AprioriZ"));
        let point = SurfacePoint::from_covariance_upper(x, y, z, &upper).with_radii(radii).unwrap();
        assert_relative_eq!(point.latitude().degrees(), 10.0, epsilon = 1e-9);
        assert_relative_eq!(point.longitude().degrees(), 20.0, epsilon = 1e-9);
        assert_relative_eq!(point.lat_sigma_distance().unwrap(), 50.0, max_relative = 1e-6);
        // Missing and out-of-range sigmas fall back to the default.
        assert_relative_eq!(point.lon_sigma_distance().unwrap(), 10_000.0, max_relative = 1e-6);
        let radius_sigma = point.local_radius_sigma_distance().unwrap();
        assert_relative_eq!(radius_sigma, 10_000.0, max_relative = 1e-6);
    }

    #[test]
    fn test_adjusted_position_copied_to_apriori() {
        let v2 = convert_v1_to_v2(v1_network(), &TargetRadiiTable::default()).unwrap();
        let cp = &v2.objects[1];
        let y = cp.require_keyword("AdjustedY").unwrap();
        assert_relative_eq!(y.as_f64().unwrap(), 1000.0, epsilon = 1e-9);
        assert_eq!(y.unit(0), Some("meters"));
        let apriori_y = cp.require_keyword("AprioriY").unwrap().as_f64().unwrap();
        assert_relative_eq!(apriori_y, 1000.0, epsilon = 1e-9);
        assert_eq!(cp.first_value("LatitudeConstrained"), Some("False"));
        assert!(!cp.has_keyword("Latitude"));
    }

    #[test]
    fn test_measure_conversion() {
        let v2 = convert_v1_to_v2(v1_network(), &TargetRadiiTable::default()).unwrap();
        let cp = &v2.objects[0];

        let estimated = &cp.groups[0];
        assert_eq!(estimated.first_value("MeasureType"), Some("Candidate"));
        assert_eq!(estimated.first_value("Sample"), Some("0.0"));
        assert_eq!(estimated.first_value("Line"), Some("0.0"));
        assert_eq!(estimated.first_value("Ignore"), Some("True"));
        assert!(!estimated.has_keyword("SampleResidual"));
        assert_eq!(estimated.first_value("LineResidual"), Some("0.25"));
        assert!(!estimated.has_keyword("ZScore"));

        let validated = &cp.groups[1];
        assert_eq!(validated.first_value("MeasureType"), Some("RegisteredSubPixel"));
        assert_eq!(validated.first_value("Sample"), Some("10.5"));
        assert!(!validated.has_keyword("Ignore"));
        assert!(!validated.has_keyword("Diameter"));
    }

    #[test]
    fn test_unknown_target_fails_v1_conversion() {
        let mut net = v1_network();
        net.set_value("TargetName", "Arrokoth");
        let err = convert_v1_to_v2(net, &TargetRadiiTable::default()).unwrap_err();
        assert!(err
            .to_string()
            .starts_with("Unable to convert ControlNet Version 1 to Version 2."));
    }

    #[test]
    fn test_v2_to_v3_constrains_covariance_points_only() {
        let mut net = PvlObject::new("ControlNetwork");
        net.add_keyword(PvlKeyword::with_value("Version", "2"));
        let points = [("a", "Tie", true), ("b", "Ground", true), ("c", "Tie", false)];
        for (id, kind, covariance) in points {
            let mut cp = PvlObject::new("ControlPoint");
            cp.add_keyword(PvlKeyword::with_value("PointId", id));
            cp.add_keyword(PvlKeyword::with_value("PointType", kind));
            if covariance {
                cp.add_keyword(PvlKeyword::with_value("AdjustedCovarianceMatrix", "1"));
            }
            net.add_object(cp);
        }
        let v3 = convert_v2_to_v3(net);
        let point_types = |net: &PvlObject| -> Vec<String> {
            net.objects
                .iter()
                .map(|o| o.first_value("PointType").unwrap().to_string())
                .collect()
        };
        assert_eq!(point_types(&v3), vec!["Constrained", "Ground", "Tie"]);

        let v4 = convert_v3_to_v4(v3);
        let types = point_types(&v4);
        assert_eq!(types, vec!["Constrained", "Fixed", "Free"]);
    }

    #[test]
    fn test_steps_are_idempotent_on_converted_networks() {
        let radii = TargetRadiiTable::default();
        let v2 = convert_v1_to_v2(v1_network(), &radii).unwrap();
        assert_eq!(convert_v1_to_v2(v2.clone(), &radii).unwrap(), v2);

        let v3 = convert_v2_to_v3(v2);
        assert_eq!(convert_v2_to_v3(v3.clone()), v3);

        let v4 = convert_v3_to_v4(v3);
        assert_eq!(convert_v3_to_v4(v4.clone()), v4);
    }

    #[test]
    fn test_unsupported_version() {
        let mut net = PvlObject::new("ControlNetwork");
        net.add_keyword(PvlKeyword::with_value("Version", "9"));
        let err = upgrade_to_latest(net, &TargetRadiiTable::default()).unwrap_err();
        assert!(matches!(err, CoreError::UnsupportedVersion { version: 9, .. }));
        assert_eq!(err.to_string(), "The Pvl file version [9] is not supported");
    }

    #[test]
    fn test_latest_network_is_untouched() {
        let mut net = PvlObject::new("ControlNetwork");
        net.add_keyword(PvlKeyword::with_value("Version", "4"));
        let upgraded = upgrade_to_latest(net.clone(), &TargetRadiiTable::empty()).unwrap();
        assert_eq!(upgraded, net);
    }
}
