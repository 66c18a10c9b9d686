//! Conversion between the latest Pvl network form and [`ControlNet`].

use std::collections::HashSet;

use tracing::warn;

use crate::control::{
    ControlMeasure, ControlNet, ControlPoint, MeasureLogData, MeasureLogKind, MeasureType,
    NetworkHeader, PointType, RadiusSource, SurfacePointSource,
};
use crate::error::{CoreError, Result};
use crate::geometry::SurfacePoint;
use crate::pvl::{PvlContainer, PvlGroup, PvlKeyword, PvlObject};
use crate::target::Radii;

use super::migrate::LATEST_PVL_VERSION;

const HEADER_KEYWORDS: [&str; 6] =
    ["NetworkId", "TargetName", "Created", "LastModified", "Description", "UserName"];

const MISSING_POINT_INFO: &str =
    "There is missing required information in the control points or measures";

// ─────────────────────────────────────────────────────────────────────────────
// Pvl → model
// ─────────────────────────────────────────────────────────────────────────────

/// Build a [`ControlNet`] from a `ControlNetwork` object at the latest version.
///
/// `file` names the source in error messages. When `radii` is given it is
/// attached to every surface point.
pub fn network_from_pvl(
    network: &PvlObject,
    file: &str,
    radii: Option<Radii>,
) -> Result<ControlNet> {
    let format_error = |message: String| CoreError::Format {
        file: file.to_string(),
        message,
    };

    if HEADER_KEYWORDS.iter().any(|k| !network.has_keyword(k)) {
        return Err(format_error(
            "There is missing required information in the network header".to_string(),
        ));
    }
    let header_value = |name: &str| network.first_value(name).unwrap_or("").to_string();
    let mut net = ControlNet::new(NetworkHeader {
        network_id: header_value("NetworkId"),
        target_name: header_value("TargetName"),
        user_name: header_value("UserName"),
        created: header_value("Created"),
        last_modified: header_value("LastModified"),
        description: header_value("Description"),
    });

    for object in &network.objects {
        let point = point_from_pvl(object, radii).map_err(|e| match e {
            CoreError::Format { message, .. } => format_error(message),
            other => other,
        })?;
        net.add_point(point)?;
    }
    Ok(net)
}

fn missing_info() -> CoreError {
    CoreError::Format {
        file: String::new(),
        message: MISSING_POINT_INFO.to_string(),
    }
}

fn bool_keyword<C: PvlContainer>(container: &C, name: &str) -> bool {
    container.keyword(name).map_or(false, |k| k.as_bool())
}

fn f64_keyword<C: PvlContainer>(container: &C, name: &str) -> Result<Option<f64>> {
    container.keyword(name).map(|k| k.as_f64()).transpose()
}

fn string_keyword<C: PvlContainer>(container: &C, name: &str) -> String {
    container.first_value(name).unwrap_or("").to_string()
}

fn position(cp: &PvlObject, prefix: &str) -> Result<Option<[f64; 3]>> {
    let x = f64_keyword(cp, &format!("{}X", prefix))?;
    let y = f64_keyword(cp, &format!("{}Y", prefix))?;
    let z = f64_keyword(cp, &format!("{}Z", prefix))?;
    Ok(match (x, y, z) {
        (Some(x), Some(y), Some(z)) => Some([x, y, z]),
        _ => None,
    })
}

fn covariance(cp: &PvlObject, name: &str) -> Result<Option<[f64; 6]>> {
    let Some(keyword) = cp.keyword(name) else {
        return Ok(None);
    };
    let mut upper = [0.0; 6];
    for (i, value) in upper.iter_mut().enumerate() {
        *value = keyword.f64_at(i)?;
    }
    Ok(Some(upper))
}

fn surface_point(
    cp: &PvlObject,
    prefix: &str,
    radii: Option<Radii>,
) -> Result<Option<SurfacePoint>> {
    let Some([x, y, z]) = position(cp, prefix)? else {
        return Ok(None);
    };
    let mut point = match covariance(cp, &format!("{}CovarianceMatrix", prefix))? {
        Some(upper) => SurfacePoint::from_covariance_upper(x, y, z, &upper),
        None => SurfacePoint::from_rectangular(x, y, z),
    };
    if let Some(radii) = radii {
        point.set_radii(radii)?;
    }
    Ok(Some(point))
}

fn point_from_pvl(cp: &PvlObject, radii: Option<Radii>) -> Result<ControlPoint> {
    let id = cp.first_value("PointId").ok_or_else(missing_info)?;
    let point_type = PointType::from_pvl(cp.first_value("PointType").unwrap_or(""));
    let mut point = ControlPoint::new(id, point_type);

    point.chooser_name = string_keyword(cp, "ChooserName");
    point.date_time = string_keyword(cp, "DateTime");
    point.apriori_surface_point_source_file =
        cp.first_value("AprioriXYZSourceFile").map(str::to_string);
    point.apriori_radius_source_file =
        cp.first_value("AprioriRadiusSourceFile").map(str::to_string);
    point.jigsaw_rejected = bool_keyword(cp, "JigsawRejected");
    point.edit_lock = bool_keyword(cp, "EditLock");
    point.ignore = bool_keyword(cp, "Ignore");
    point.latitude_constrained = bool_keyword(cp, "LatitudeConstrained");
    point.longitude_constrained = bool_keyword(cp, "LongitudeConstrained");
    point.radius_constrained = bool_keyword(cp, "RadiusConstrained");

    if let Some(source) = cp.first_value("AprioriXYZSource") {
        point.apriori_surface_point_source = SurfacePointSource::parse(source)?;
    }
    if let Some(source) = cp.first_value("AprioriRadiusSource") {
        point.apriori_radius_source = RadiusSource::parse(source)?;
    }

    point.apriori_surface_point = surface_point(cp, "Apriori", radii)?;
    point.adjusted_surface_point = surface_point(cp, "Adjusted", radii)?;

    let mut reference = None;
    for (index, group) in cp.groups.iter().enumerate() {
        let (measure, is_reference) = measure_from_pvl(group)?;
        if is_reference {
            if reference.is_some() {
                return Err(CoreError::Format {
                    file: String::new(),
                    message: format!("Control point [{}] has more than one reference measure", point.id),
                });
            }
            reference = Some(index);
        }
        point.add_measure(measure)?;
    }
    if let Some(index) = reference {
        point.set_reference(index)?;
    }
    Ok(point)
}

fn measure_from_pvl(group: &PvlGroup) -> Result<(ControlMeasure, bool)> {
    let serial = group.first_value("SerialNumber").ok_or_else(missing_info)?;
    let kind = group.first_value("MeasureType").ok_or_else(missing_info)?;
    let mut measure = ControlMeasure::new(serial, MeasureType::parse(kind)?);
    let mut is_reference = false;
    let mut seen: HashSet<String> = HashSet::new();

    for keyword in &group.keywords {
        let name = keyword.name().to_ascii_lowercase();
        if !seen.insert(name.clone()) {
            return Err(unhandled(keyword));
        }
        match name.as_str() {
            "serialnumber" | "measuretype" => {}
            "choosername" => measure.chooser_name = keyword.first().to_string(),
            "datetime" => measure.date_time = keyword.first().to_string(),
            "sample" => measure.sample = keyword.as_f64()?,
            "line" => measure.line = keyword.as_f64()?,
            "sampleresidual" => measure.sample_residual = Some(keyword.as_f64()?),
            "lineresidual" => measure.line_residual = Some(keyword.as_f64()?),
            "diameter" => measure.diameter = Some(keyword.as_f64()?),
            "editlock" => measure.edit_lock = keyword.as_bool(),
            "ignore" => measure.ignore = keyword.as_bool(),
            "jigsawrejected" => measure.jigsaw_rejected = keyword.as_bool(),
            "apriorisample" => measure.apriori_sample = Some(keyword.as_f64()?),
            "aprioriline" => measure.apriori_line = Some(keyword.as_f64()?),
            "samplesigma" => measure.sample_sigma = Some(keyword.as_f64()?),
            "linesigma" => measure.line_sigma = Some(keyword.as_f64()?),
            "reference" => is_reference = keyword.first().eq_ignore_ascii_case("true"),
            _ => match MeasureLogKind::from_name(keyword.name()) {
                Some(kind) => measure.log_data.push(MeasureLogData::new(kind, keyword.as_f64()?)),
                None => return Err(unhandled(keyword)),
            },
        }
    }
    Ok((measure, is_reference))
}

fn unhandled(keyword: &PvlKeyword) -> CoreError {
    CoreError::Pvl(format!(
        "Unhandled or duplicate keywords in control measure [{}]",
        keyword.name()
    ))
}

// ─────────────────────────────────────────────────────────────────────────────
// Model → Pvl
// ─────────────────────────────────────────────────────────────────────────────

/// Write `net` as a latest-version `ControlNetwork` object.
///
/// Coordinates carry latitude/longitude/radius comments. Covariance
/// keywords carry sigma comments only when `radii` is known.
pub fn network_to_pvl(net: &ControlNet, radii: Option<Radii>) -> PvlObject {
    let header = &net.header;
    let mut network = PvlObject::new("ControlNetwork");
    for (name, value) in [
        ("NetworkId", &header.network_id),
        ("TargetName", &header.target_name),
        ("UserName", &header.user_name),
        ("Created", &header.created),
        ("LastModified", &header.last_modified),
        ("Description", &header.description),
    ] {
        network.add_keyword(PvlKeyword::with_value(name, value.as_str()));
    }
    network.add_keyword(PvlKeyword::with_value("Version", LATEST_PVL_VERSION.to_string()));

    if radii.is_none() {
        warn!(
            "No radii known for target [{}]; sigma comments are omitted",
            header.target_name
        );
    }

    for point in net.points() {
        network.add_object(point_to_pvl(point, radii));
    }
    network
}

fn true_keyword(name: &str) -> PvlKeyword {
    PvlKeyword::with_value(name, "True")
}

fn point_to_pvl(point: &ControlPoint, radii: Option<Radii>) -> PvlObject {
    let mut cp = PvlObject::new("ControlPoint");
    cp.add_keyword(PvlKeyword::with_value("PointType", point.point_type.as_str()));
    cp.add_keyword(PvlKeyword::with_value("PointId", point.id.as_str()));
    cp.add_keyword(PvlKeyword::with_value("ChooserName", point.chooser_name.as_str()));
    cp.add_keyword(PvlKeyword::with_value("DateTime", point.date_time.as_str()));
    if point.edit_lock {
        cp.add_keyword(true_keyword("EditLock"));
    }
    if point.ignore {
        cp.add_keyword(true_keyword("Ignore"));
    }
    if point.jigsaw_rejected {
        cp.add_keyword(true_keyword("JigsawRejected"));
    }

    if point.apriori_surface_point_source != SurfacePointSource::None {
        cp.add_keyword(PvlKeyword::with_value(
            "AprioriXYZSource",
            point.apriori_surface_point_source.as_str(),
        ));
    }
    if let Some(file) = &point.apriori_surface_point_source_file {
        cp.add_keyword(PvlKeyword::with_value("AprioriXYZSourceFile", file.as_str()));
    }
    if point.apriori_radius_source != RadiusSource::None {
        cp.add_keyword(PvlKeyword::with_value(
            "AprioriRadiusSource",
            point.apriori_radius_source.as_str(),
        ));
    }
    if let Some(file) = &point.apriori_radius_source_file {
        cp.add_keyword(PvlKeyword::with_value("AprioriRadiusSourceFile", file.as_str()));
    }

    if let Some(apriori) = &point.apriori_surface_point {
        add_surface_point(&mut cp, "Apriori", apriori, radii);
    }

    if point.latitude_constrained {
        cp.add_keyword(true_keyword("LatitudeConstrained"));
    }
    if point.longitude_constrained {
        cp.add_keyword(true_keyword("LongitudeConstrained"));
    }
    if point.radius_constrained {
        cp.add_keyword(true_keyword("RadiusConstrained"));
    }

    if let Some(adjusted) = &point.adjusted_surface_point {
        add_surface_point(&mut cp, "Adjusted", adjusted, radii);
    }

    for (index, measure) in point.measures().iter().enumerate() {
        cp.add_group(measure_to_pvl(measure, point.reference_index() == Some(index)));
    }
    cp
}

fn add_surface_point(cp: &mut PvlObject, prefix: &str, point: &SurfacePoint, radii: Option<Radii>) {
    let comments = [
        format!("{}Latitude = {} <degrees>", prefix, point.latitude().degrees()),
        format!("{}Longitude = {} <degrees>", prefix, point.longitude().degrees()),
        format!("{}Radius = {} <meters>", prefix, point.local_radius()),
    ];
    for ((axis, value), comment) in ["X", "Y", "Z"]
        .iter()
        .zip([point.x(), point.y(), point.z()])
        .zip(comments)
    {
        let mut keyword =
            PvlKeyword::with_unit(format!("{}{}", prefix, axis), value.to_string(), "meters");
        keyword.add_comment(comment);
        cp.add_keyword(keyword);
    }

    let Some(upper) = point.covariance_upper() else {
        return;
    };
    let mut matrix = PvlKeyword::new(format!("{}CovarianceMatrix", prefix));
    for value in upper {
        matrix.add_value(value.to_string());
    }
    if let Some(radii) = radii {
        if let Some(comment) = sigma_comment(point, prefix, radii) {
            matrix.add_comment(comment);
        }
    }
    cp.add_keyword(matrix);
}

fn sigma_comment(point: &SurfacePoint, prefix: &str, radii: Radii) -> Option<String> {
    let point = point.clone().with_radii(radii).ok()?;
    let lat = point.lat_sigma_distance().ok()?;
    let lon = point.lon_sigma_distance().ok()?;
    let rad = point.local_radius_sigma_distance().ok()?;
    Some(format!(
        "{p}LatitudeSigma = {} <meters>  {p}LongitudeSigma = {} <meters>  {p}RadiusSigma = {} <meters>",
        lat,
        lon,
        rad,
        p = prefix
    ))
}

fn measure_to_pvl(measure: &ControlMeasure, is_reference: bool) -> PvlGroup {
    let mut cm = PvlGroup::new("ControlMeasure");
    cm.add_keyword(PvlKeyword::with_value("SerialNumber", measure.serial_number.as_str()));
    cm.add_keyword(PvlKeyword::with_value("MeasureType", measure.measure_type.as_str()));
    if !measure.chooser_name.is_empty() {
        cm.add_keyword(PvlKeyword::with_value("ChooserName", measure.chooser_name.as_str()));
    }
    if !measure.date_time.is_empty() {
        cm.add_keyword(PvlKeyword::with_value("DateTime", measure.date_time.as_str()));
    }
    if measure.edit_lock {
        cm.add_keyword(true_keyword("EditLock"));
    }
    if measure.ignore {
        cm.add_keyword(true_keyword("Ignore"));
    }
    cm.add_keyword(PvlKeyword::with_value("Sample", measure.sample.to_string()));
    cm.add_keyword(PvlKeyword::with_value("Line", measure.line.to_string()));

    let optional = [
        ("Diameter", measure.diameter, None),
        ("AprioriSample", measure.apriori_sample, None),
        ("AprioriLine", measure.apriori_line, None),
        ("SampleSigma", measure.sample_sigma, Some("pixels")),
        ("LineSigma", measure.line_sigma, Some("pixels")),
        ("SampleResidual", measure.sample_residual, Some("pixels")),
        ("LineResidual", measure.line_residual, Some("pixels")),
    ];
    for (name, value, unit) in optional {
        if let Some(value) = value {
            cm.add_keyword(match unit {
                Some(unit) => PvlKeyword::with_unit(name, value.to_string(), unit),
                None => PvlKeyword::with_value(name, value.to_string()),
            });
        }
    }

    if measure.jigsaw_rejected {
        cm.add_keyword(true_keyword("JigsawRejected"));
    }
    for log in &measure.log_data {
        cm.add_keyword(PvlKeyword::with_value(log.kind.name(), log.value.to_string()));
    }
    if is_reference {
        cm.add_keyword(true_keyword("Reference"));
    }
    cm
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pvl::parse;
    use crate::target::{RadiiProvider, TargetRadiiTable};

    const LATEST: &str = r#"
Object = ControlNetwork
  NetworkId    = Test
  TargetName   = Mars
  UserName     = tester
  Created      = 2012-01-01T00:00:00
  LastModified = 2012-01-02T00:00:00
  Description  = "unit test"
  Version      = 4

  Object = ControlPoint
    PointType = Constrained
    PointId   = P1
    ChooserName = tester
    DateTime  = 2012-01-01T00:00:00
    AprioriXYZSource = Basemap
    AprioriXYZSourceFile = base.cub
    AprioriRadiusSource = DEM
    AprioriX = 3396190.0 <meters>
    AprioriY = 0.0 <meters>
    AprioriZ = 0.0 <meters>
    AprioriCovarianceMatrix = (100.0, 0.0, 0.0, 2500.0, 0.0, 400.0)
    LatitudeConstrained = True

    Group = ControlMeasure
      SerialNumber = IMG1
      MeasureType  = Manual
      Sample       = 10.0
      Line         = 20.0
      SampleResidual = 0.5 <pixels>
      GoodnessOfFit = 0.92
      Reference    = True
    End_Group

    Group = ControlMeasure
      SerialNumber = IMG2
      MeasureType  = registeredsubpixel
      Sample       = 11.0
      Line         = 21.0
      Ignore       = yes
    End_Group
  End_Object
End_Object
End
"#;

    fn latest() -> PvlObject {
        parse(LATEST).unwrap().require_object("ControlNetwork").unwrap().clone()
    }

    fn mars() -> Option<Radii> {
        TargetRadiiTable::default().radii("Mars")
    }

    #[test]
    fn test_reads_points_and_measures() {
        let net = network_from_pvl(&latest(), "test.net", mars()).unwrap();
        assert_eq!(net.header.description, "unit test");
        let p = net.point("P1").unwrap();
        assert_eq!(p.point_type, PointType::Constrained);
        assert_eq!(p.apriori_surface_point_source, SurfacePointSource::Basemap);
        assert_eq!(p.apriori_radius_source, RadiusSource::DEM);
        assert!(p.latitude_constrained && !p.longitude_constrained);
        assert_eq!(p.apriori_covariance().unwrap()[3], 2500.0);
        assert!(p.adjusted_surface_point.is_none());

        assert_eq!(p.reference_measure().unwrap().serial_number, "IMG1");
        let m1 = p.measure("IMG1").unwrap();
        assert_eq!(m1.sample_residual, Some(0.5));
        assert_eq!(m1.log_value(MeasureLogKind::GoodnessOfFit), Some(0.92));
        let m2 = p.measure("IMG2").unwrap();
        assert_eq!(m2.measure_type, MeasureType::RegisteredSubPixel);
        assert!(m2.ignore);
    }

    #[test]
    fn test_model_round_trip_through_pvl() {
        let net = network_from_pvl(&latest(), "test.net", mars()).unwrap();
        let written = network_to_pvl(&net, mars());
        let reread = network_from_pvl(&written, "written.net", mars()).unwrap();
        assert_eq!(reread, net);
    }

    #[test]
    fn test_written_comments() {
        let net = network_from_pvl(&latest(), "test.net", mars()).unwrap();
        let written = network_to_pvl(&net, mars());
        let cp = &written.objects[0];
        let comment = |name: &str| cp.require_keyword(name).unwrap().comments()[0].clone();
        assert_eq!(comment("AprioriX"), "AprioriLatitude = 0 <degrees>");
        assert_eq!(comment("AprioriZ"), "AprioriRadius = 3396190 <meters>");
        let sigma = &cp.require_keyword("AprioriCovarianceMatrix").unwrap().comments()[0];
        assert!(sigma.starts_with("AprioriLatitudeSigma = "));

        let without_radii = network_to_pvl(&net, None);
        assert!(without_radii.objects[0]
            .require_keyword("AprioriCovarianceMatrix")
            .unwrap()
            .comments()
            .is_empty());
        assert_eq!(without_radii.first_value("Version"), Some("4"));
    }

    #[test]
    fn test_duplicate_reference_rejected() {
        let mut net = latest();
        net.objects[0].groups[1].add_keyword(PvlKeyword::with_value("Reference", "True"));
        let err = network_from_pvl(&net, "dup.net", None).unwrap_err();
        assert!(matches!(err, CoreError::Format { .. }));
        assert!(err.to_string().contains("more than one reference measure"));
        assert!(err.to_string().ends_with("in [dup.net]"));
    }

    #[test]
    fn test_unhandled_measure_keyword() {
        let mut net = latest();
        net.objects[0].groups[0].add_keyword(PvlKeyword::with_value("Bogus", "1"));
        let err = network_from_pvl(&net, "x", None).unwrap_err();
        assert_eq!(err.to_string(), "Unhandled or duplicate keywords in control measure [Bogus]");

        let mut net = latest();
        net.objects[0].groups[0].add_keyword(PvlKeyword::with_value("Sample", "3"));
        assert!(network_from_pvl(&net, "x", None).is_err());
    }

    #[test]
    fn test_missing_required_information() {
        let mut net = latest();
        net.delete_keyword("UserName");
        let err = network_from_pvl(&net, "x", None).unwrap_err();
        assert!(err
            .to_string()
            .starts_with("There is missing required information in the network header"));

        let mut net = latest();
        net.objects[0].delete_keyword("PointId");
        let err = network_from_pvl(&net, "x", None).unwrap_err();
        assert!(err.to_string().starts_with(MISSING_POINT_INFO));
    }

    #[test]
    fn test_invalid_sources_and_measure_types() {
        let mut net = latest();
        net.objects[0].set_value("AprioriXYZSource", "Ellipsoid");
        assert!(network_from_pvl(&net, "x", None).is_err());

        let mut net = latest();
        net.objects[0].groups[0].set_value("MeasureType", "Automatic");
        let err = network_from_pvl(&net, "x", None).unwrap_err();
        assert_eq!(err.to_string(), "Unknown measure type [Automatic]");
    }
}
