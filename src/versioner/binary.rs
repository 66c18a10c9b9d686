//! Binary network envelope.
//!
//! ```text
//! ┌──────────────────────────────────────────────┐ 0
//! │ Pvl text header (ProtoBuffer object), zero   │
//! │ padded                                        │
//! ├──────────────────────────────────────────────┤ HEADER_SIZE (= StartByte)
//! │ little-endian point records (Bytes long)     │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! The header's `ControlNetworkInfo` group carries the network header, the
//! record `Version`, `NumberOfPoints`, `StartByte` and `Bytes`.
//!
//! Version 2 records mirror [`ControlPoint`] directly. Version 1 records hold
//! the legacy spherical form; they are turned into a version 1 Pvl network
//! and upgraded through the Pvl migration chain.

use tracing::{debug, warn};

use crate::control::{
    ControlMeasure, ControlNet, ControlPoint, MeasureLogData, MeasureLogKind, MeasureType,
    NetworkHeader, PointType, RadiusSource, SurfacePointSource,
};
use crate::error::{CoreError, Result};
use crate::geometry::SurfacePoint;
use crate::io::{ByteReader, ByteWriter};
use crate::pvl::{PvlContainer, PvlGroup, PvlKeyword, PvlObject};
use crate::target::RadiiProvider;

use super::migrate::upgrade_to_latest;
use super::pvl_network::network_from_pvl;

/// Size reserved for the text header; the record payload starts here.
pub const HEADER_SIZE: usize = 65_536;

pub const LATEST_BINARY_VERSION: i64 = 2;

pub const ENVELOPE_OBJECT: &str = "ProtoBuffer";
const INFO_GROUP: &str = "ControlNetworkInfo";

// ─────────────────────────────────────────────────────────────────────────────
// Envelope
// ─────────────────────────────────────────────────────────────────────────────

fn envelope_header(
    header: &NetworkHeader,
    version: i64,
    points: usize,
    payload: usize,
) -> PvlObject {
    let mut info = PvlGroup::new(INFO_GROUP);
    for (name, value) in [
        ("NetworkId", &header.network_id),
        ("TargetName", &header.target_name),
        ("UserName", &header.user_name),
        ("Created", &header.created),
        ("LastModified", &header.last_modified),
        ("Description", &header.description),
    ] {
        info.add_keyword(PvlKeyword::with_value(name, value.as_str()));
    }
    info.add_keyword(PvlKeyword::with_value("Version", version.to_string()));
    info.add_keyword(PvlKeyword::with_value("NumberOfPoints", points.to_string()));
    info.add_keyword(PvlKeyword::with_value("StartByte", HEADER_SIZE.to_string()));
    info.add_keyword(PvlKeyword::with_value("Bytes", payload.to_string()));

    let mut envelope = PvlObject::new(ENVELOPE_OBJECT);
    envelope.add_group(info);
    let mut root = PvlObject::root();
    root.add_object(envelope);
    root
}

fn seal(header: &NetworkHeader, version: i64, points: usize, payload: Vec<u8>) -> Result<Vec<u8>> {
    let text = envelope_header(header, version, points, payload.len()).to_string();
    if text.len() > HEADER_SIZE {
        return Err(CoreError::InvalidState(format!(
            "Binary network header needs {} bytes but only {} are reserved",
            text.len(),
            HEADER_SIZE
        )));
    }
    let mut bytes = Vec::with_capacity(HEADER_SIZE + payload.len());
    bytes.extend_from_slice(text.as_bytes());
    bytes.resize(HEADER_SIZE, 0);
    bytes.extend_from_slice(&payload);
    Ok(bytes)
}

/// Encode `net` as a version 2 binary network.
pub fn encode_network(net: &ControlNet) -> Result<Vec<u8>> {
    let mut w = ByteWriter::new();
    w.put_u32(net.num_points() as u32)?;
    for point in net.points() {
        write_point(&mut w, point)?;
    }
    seal(&net.header, LATEST_BINARY_VERSION, net.num_points(), w.into_inner())
}

/// Decode a binary network whose parsed text header is `root`.
pub fn decode_network(
    bytes: &[u8],
    root: &PvlObject,
    file: &str,
    radii: &dyn RadiiProvider,
) -> Result<ControlNet> {
    let format_error = |message: String| CoreError::Format {
        file: file.to_string(),
        message,
    };

    let envelope = root
        .find_object(ENVELOPE_OBJECT)
        .ok_or_else(|| format_error("Missing ProtoBuffer header".to_string()))?;
    let info = envelope.require_group(INFO_GROUP)?;

    let version = match info.keyword("Version") {
        Some(k) => k.as_i64()?,
        None => 1,
    };
    if !(1..=LATEST_BINARY_VERSION).contains(&version) {
        return Err(CoreError::UnsupportedVersion {
            kind: "binary file",
            version,
        });
    }

    let start = info.require_keyword("StartByte")?.as_i64()?;
    let length = info.require_keyword("Bytes")?.as_i64()?;
    let end = start.checked_add(length).unwrap_or(i64::MAX);
    if start < 0 || length < 0 || end as u64 > bytes.len() as u64 {
        return Err(format_error(format!(
            "Binary payload [{}, {}) extends past the end of the file ({} bytes)",
            start,
            end,
            bytes.len()
        )));
    }
    let payload = &bytes[start as usize..end as usize];
    let expected_points = match info.keyword("NumberOfPoints") {
        Some(k) => Some(k.as_i64()?),
        None => None,
    };

    let header_value = |name: &str| info.first_value(name).unwrap_or("").to_string();
    let header = NetworkHeader {
        network_id: header_value("NetworkId"),
        target_name: header_value("TargetName"),
        user_name: header_value("UserName"),
        created: header_value("Created"),
        last_modified: header_value("LastModified"),
        description: header_value("Description"),
    };
    debug!("Decoding binary network version {} ({} payload bytes)", version, payload.len());

    let mut r = ByteReader::new(payload, file);
    let count = r.u32()? as usize;
    if let Some(expected) = expected_points {
        if expected != count as i64 {
            warn!(
                "Binary network header lists {} points but the payload holds {}",
                expected, count
            );
        }
    }

    if version == 1 {
        let mut network = legacy_network_header(&header);
        for _ in 0..count {
            network.add_object(LegacyPoint::read(&mut r)?.to_pvl());
        }
        let network = upgrade_to_latest(network, radii)?;
        let radii = radii.radii(&header.target_name);
        return network_from_pvl(&network, file, radii);
    }

    let target_radii = radii.radii(&header.target_name);
    let mut net = ControlNet::new(header);
    for _ in 0..count {
        let mut point = read_point(&mut r)?;
        if let Some(radii) = target_radii {
            for sp in [&mut point.apriori_surface_point, &mut point.adjusted_surface_point]
                .into_iter()
                .flatten()
            {
                sp.set_radii(radii)?;
            }
        }
        net.add_point(point).map_err(|e| format_error(e.to_string()))?;
    }
    Ok(net)
}

// ─────────────────────────────────────────────────────────────────────────────
// Version 2 records
// ─────────────────────────────────────────────────────────────────────────────

fn write_surface_point(w: &mut ByteWriter, point: Option<&SurfacePoint>) -> Result<()> {
    let Some(point) = point else {
        w.put_bool(false)?;
        return Ok(());
    };
    w.put_bool(true)?;
    w.put_f64(point.x())?;
    w.put_f64(point.y())?;
    w.put_f64(point.z())?;
    match point.covariance_upper() {
        Some(upper) => {
            w.put_bool(true)?;
            for v in upper {
                w.put_f64(v)?;
            }
        }
        None => w.put_bool(false)?,
    }
    Ok(())
}

fn read_surface_point(r: &mut ByteReader<'_>) -> Result<Option<SurfacePoint>> {
    if !r.bool()? {
        return Ok(None);
    }
    let (x, y, z) = (r.f64()?, r.f64()?, r.f64()?);
    if !r.bool()? {
        return Ok(Some(SurfacePoint::from_rectangular(x, y, z)));
    }
    let mut upper = [0.0; 6];
    for v in upper.iter_mut() {
        *v = r.f64()?;
    }
    Ok(Some(SurfacePoint::from_covariance_upper(x, y, z, &upper)))
}

fn write_point(w: &mut ByteWriter, point: &ControlPoint) -> Result<()> {
    w.put_str(&point.id)?;
    w.put_u8(point.point_type.code())?;
    w.put_str(&point.chooser_name)?;
    w.put_str(&point.date_time)?;
    w.put_bool(point.edit_lock)?;
    w.put_bool(point.ignore)?;
    w.put_bool(point.jigsaw_rejected)?;
    w.put_u8(point.apriori_surface_point_source.code())?;
    w.put_opt_str(point.apriori_surface_point_source_file.as_deref())?;
    w.put_u8(point.apriori_radius_source.code())?;
    w.put_opt_str(point.apriori_radius_source_file.as_deref())?;
    write_surface_point(w, point.apriori_surface_point.as_ref())?;
    write_surface_point(w, point.adjusted_surface_point.as_ref())?;
    w.put_bool(point.latitude_constrained)?;
    w.put_bool(point.longitude_constrained)?;
    w.put_bool(point.radius_constrained)?;
    w.put_i32(point.reference_index().map_or(-1, |i| i as i32))?;

    w.put_u32(point.num_measures() as u32)?;
    for m in point.measures() {
        write_measure(w, m)?;
    }
    Ok(())
}

fn read_point(r: &mut ByteReader<'_>) -> Result<ControlPoint> {
    let id = r.string()?;
    let type_code = r.u8()?;
    let point_type = PointType::from_code(type_code)
        .ok_or_else(|| r.invalid(format!("Invalid point type code {}", type_code)))?;
    let mut point = ControlPoint::new(id, point_type);
    point.chooser_name = r.string()?;
    point.date_time = r.string()?;
    point.edit_lock = r.bool()?;
    point.ignore = r.bool()?;
    point.jigsaw_rejected = r.bool()?;

    let code = r.u8()?;
    point.apriori_surface_point_source = SurfacePointSource::from_code(code)
        .ok_or_else(|| r.invalid(format!("Invalid apriori surface point source code {}", code)))?;
    point.apriori_surface_point_source_file = r.opt_string()?;
    let code = r.u8()?;
    point.apriori_radius_source = RadiusSource::from_code(code)
        .ok_or_else(|| r.invalid(format!("Invalid apriori radius source code {}", code)))?;
    point.apriori_radius_source_file = r.opt_string()?;

    point.apriori_surface_point = read_surface_point(r)?;
    point.adjusted_surface_point = read_surface_point(r)?;
    point.latitude_constrained = r.bool()?;
    point.longitude_constrained = r.bool()?;
    point.radius_constrained = r.bool()?;
    let reference = r.i32()?;

    let count = r.u32()?;
    for _ in 0..count {
        let measure = read_measure(r)?;
        point.add_measure(measure).map_err(|e| r.invalid(e.to_string()))?;
    }
    if reference >= 0 {
        point
            .set_reference(reference as usize)
            .map_err(|e| r.invalid(e.to_string()))?;
    }
    Ok(point)
}

fn write_measure(w: &mut ByteWriter, m: &ControlMeasure) -> Result<()> {
    w.put_str(&m.serial_number)?;
    w.put_u8(m.measure_type.code())?;
    w.put_str(&m.chooser_name)?;
    w.put_str(&m.date_time)?;
    w.put_bool(m.edit_lock)?;
    w.put_bool(m.ignore)?;
    w.put_bool(m.jigsaw_rejected)?;
    w.put_f64(m.sample)?;
    w.put_f64(m.line)?;
    for v in [
        m.apriori_sample,
        m.apriori_line,
        m.sample_sigma,
        m.line_sigma,
        m.sample_residual,
        m.line_residual,
        m.diameter,
    ] {
        w.put_opt_f64(v)?;
    }
    w.put_u32(m.log_data.len() as u32)?;
    for log in &m.log_data {
        w.put_u8(log.kind.code())?;
        w.put_f64(log.value)?;
    }
    Ok(())
}

fn read_measure(r: &mut ByteReader<'_>) -> Result<ControlMeasure> {
    let serial = r.string()?;
    let code = r.u8()?;
    let measure_type = MeasureType::from_code(code)
        .ok_or_else(|| r.invalid(format!("Invalid measure type code {}", code)))?;
    let mut m = ControlMeasure::new(serial, measure_type);
    m.chooser_name = r.string()?;
    m.date_time = r.string()?;
    m.edit_lock = r.bool()?;
    m.ignore = r.bool()?;
    m.jigsaw_rejected = r.bool()?;
    m.sample = r.f64()?;
    m.line = r.f64()?;
    m.apriori_sample = r.opt_f64()?;
    m.apriori_line = r.opt_f64()?;
    m.sample_sigma = r.opt_f64()?;
    m.line_sigma = r.opt_f64()?;
    m.sample_residual = r.opt_f64()?;
    m.line_residual = r.opt_f64()?;
    m.diameter = r.opt_f64()?;

    let logs = r.u32()?;
    for _ in 0..logs {
        let code = r.u8()?;
        let kind = MeasureLogKind::from_code(code)
            .ok_or_else(|| r.invalid(format!("Invalid measure log data code {}", code)))?;
        m.log_data.push(MeasureLogData::new(kind, r.f64()?));
    }
    Ok(m)
}

// ─────────────────────────────────────────────────────────────────────────────
// Version 1 records
// ─────────────────────────────────────────────────────────────────────────────

fn legacy_network_header(header: &NetworkHeader) -> PvlObject {
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
    network.add_keyword(PvlKeyword::with_value("Version", "1"));
    network
}

fn bool_text(v: bool) -> &'static str {
    if v {
        "True"
    } else {
        "False"
    }
}

/// Legacy spherical point record.
#[derive(Debug, Clone, Default, PartialEq)]
struct LegacyPoint {
    id: String,
    /// `Tie` or `Ground`.
    point_type: String,
    chooser_name: String,
    date_time: String,
    held: bool,
    ignore: bool,
    /// Latitude, longitude (degrees) and radius (meters).
    apriori: [Option<f64>; 3],
    apriori_sigmas: [Option<f64>; 3],
    adjusted: [Option<f64>; 3],
    measures: Vec<LegacyMeasure>,
}

#[derive(Debug, Clone, Default, PartialEq)]
struct LegacyMeasure {
    serial_number: String,
    measure_type: String,
    sample: Option<f64>,
    line: Option<f64>,
    error_sample: Option<f64>,
    error_line: Option<f64>,
    diameter: Option<f64>,
    ignore: bool,
    reference: bool,
}

impl LegacyPoint {
    fn read(r: &mut ByteReader<'_>) -> Result<Self> {
        let mut p = LegacyPoint {
            id: r.string()?,
            point_type: r.string()?,
            chooser_name: r.string()?,
            date_time: r.string()?,
            held: r.bool()?,
            ignore: r.bool()?,
            ..Default::default()
        };
        for slot in p
            .apriori
            .iter_mut()
            .chain(p.apriori_sigmas.iter_mut())
            .chain(p.adjusted.iter_mut())
        {
            *slot = r.opt_f64()?;
        }
        let count = r.u32()?;
        for _ in 0..count {
            p.measures.push(LegacyMeasure {
                serial_number: r.string()?,
                measure_type: r.string()?,
                sample: r.opt_f64()?,
                line: r.opt_f64()?,
                error_sample: r.opt_f64()?,
                error_line: r.opt_f64()?,
                diameter: r.opt_f64()?,
                ignore: r.bool()?,
                reference: r.bool()?,
            });
        }
        Ok(p)
    }

    #[cfg(test)]
    fn write(&self, w: &mut ByteWriter) -> Result<()> {
        w.put_str(&self.id)?;
        w.put_str(&self.point_type)?;
        w.put_str(&self.chooser_name)?;
        w.put_str(&self.date_time)?;
        w.put_bool(self.held)?;
        w.put_bool(self.ignore)?;
        for v in self.apriori.iter().chain(&self.apriori_sigmas).chain(&self.adjusted) {
            w.put_opt_f64(*v)?;
        }
        w.put_u32(self.measures.len() as u32)?;
        for m in &self.measures {
            w.put_str(&m.serial_number)?;
            w.put_str(&m.measure_type)?;
            for v in [m.sample, m.line, m.error_sample, m.error_line, m.diameter] {
                w.put_opt_f64(v)?;
            }
            w.put_bool(m.ignore)?;
            w.put_bool(m.reference)?;
        }
        Ok(())
    }

    /// Version 1 Pvl form of the record.
    fn to_pvl(&self) -> PvlObject {
        let mut cp = PvlObject::new("ControlPoint");
        cp.add_keyword(PvlKeyword::with_value("PointType", self.point_type.as_str()));
        cp.add_keyword(PvlKeyword::with_value("PointId", self.id.as_str()));
        cp.add_keyword(PvlKeyword::with_value("ChooserName", self.chooser_name.as_str()));
        cp.add_keyword(PvlKeyword::with_value("DateTime", self.date_time.as_str()));
        cp.add_keyword(PvlKeyword::with_value("Held", bool_text(self.held)));
        if self.ignore {
            cp.add_keyword(PvlKeyword::with_value("Ignore", "True"));
        }

        let spherical = [
            (["AprioriLatitude", "AprioriLongitude", "AprioriRadius"], &self.apriori),
            (
                ["AprioriSigmaLatitude", "AprioriSigmaLongitude", "AprioriSigmaRadius"],
                &self.apriori_sigmas,
            ),
            (["Latitude", "Longitude", "Radius"], &self.adjusted),
        ];
        for (names, values) in spherical {
            for (name, value) in names.iter().zip(values.iter()) {
                if let Some(v) = value {
                    cp.add_keyword(PvlKeyword::with_value(*name, v.to_string()));
                }
            }
        }

        for m in &self.measures {
            let mut cm = PvlGroup::new("ControlMeasure");
            cm.add_keyword(PvlKeyword::with_value("SerialNumber", m.serial_number.as_str()));
            cm.add_keyword(PvlKeyword::with_value("MeasureType", m.measure_type.as_str()));
            for (name, value) in [
                ("Sample", m.sample),
                ("Line", m.line),
                ("ErrorSample", m.error_sample),
                ("ErrorLine", m.error_line),
                ("Diameter", m.diameter),
            ] {
                if let Some(v) = value {
                    cm.add_keyword(PvlKeyword::with_value(name, v.to_string()));
                }
            }
            if m.ignore {
                cm.add_keyword(PvlKeyword::with_value("Ignore", "True"));
            }
            if m.reference {
                cm.add_keyword(PvlKeyword::with_value("Reference", "True"));
            }
            cp.add_group(cm);
        }
        cp
    }
}

/// Encode legacy records as a version 1 binary network.
#[cfg(test)]
fn encode_legacy_network(header: &NetworkHeader, points: &[LegacyPoint]) -> Result<Vec<u8>> {
    let mut w = ByteWriter::new();
    w.put_u32(points.len() as u32)?;
    for p in points {
        p.write(&mut w)?;
    }
    seal(header, 1, points.len(), w.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pvl::parse;
    use crate::target::TargetRadiiTable;
    use approx::assert_relative_eq;

    fn header() -> NetworkHeader {
        NetworkHeader {
            network_id: "BinaryTest".into(),
            target_name: "Mars".into(),
            user_name: "tester".into(),
            created: "2012-01-01T00:00:00".into(),
            last_modified: "2012-01-01T00:00:00".into(),
            description: "binary round trip".into(),
        }
    }

    fn sample_net() -> ControlNet {
        let mut net = ControlNet::new(header());
        let mut p = ControlPoint::new("P1", PointType::Constrained);
        p.apriori_surface_point_source = SurfacePointSource::Reference;
        p.apriori_radius_source = RadiusSource::Ellipsoid;
        p.apriori_radius_source_file = Some("mola.cub".into());
        p.apriori_surface_point = Some(SurfacePoint::from_covariance_upper(
            3_396_190.0,
            0.0,
            0.0,
            &[4.0, 0.0, 0.0, 9.0, 0.0, 16.0],
        ));
        p.adjusted_surface_point = Some(SurfacePoint::from_rectangular(3_396_191.0, 1.0, -1.0));
        p.latitude_constrained = true;
        let mut m =
            ControlMeasure::new("IMG1", MeasureType::RegisteredSubPixel).with_coordinate(1.5, 2.5);
        m.set_residuals(0.1, -0.2);
        m.sample_sigma = Some(0.5);
        m.set_log_value(MeasureLogKind::PixelShift, 0.75);
        p.add_measure(m).unwrap();
        p.add_measure(ControlMeasure::new("IMG2", MeasureType::Manual)).unwrap();
        p.set_reference(1).unwrap();
        net.add_point(p).unwrap();
        net.add_point(ControlPoint::new("P2", PointType::Fixed)).unwrap();
        net
    }

    fn decode(bytes: &[u8]) -> Result<ControlNet> {
        let root = parse(&String::from_utf8_lossy(bytes))?;
        decode_network(bytes, &root, "test.bin", &TargetRadiiTable::empty())
    }

    #[test]
    fn test_version_2_round_trip() {
        let net = sample_net();
        let bytes = encode_network(&net).unwrap();
        assert!(bytes.len() > HEADER_SIZE);
        assert_eq!(decode(&bytes).unwrap(), net);
    }

    #[test]
    fn test_header_declares_layout() {
        let bytes = encode_network(&sample_net()).unwrap();
        let root = parse(&String::from_utf8_lossy(&bytes)).unwrap();
        let envelope = root.require_object("ProtoBuffer").unwrap();
        let info = envelope.require_group("ControlNetworkInfo").unwrap();
        assert_eq!(info.first_value("Version"), Some("2"));
        assert_eq!(info.first_value("NumberOfPoints"), Some("2"));
        assert_eq!(info.first_value("StartByte"), Some("65536"));
        assert_eq!(
            info.require_keyword("Bytes").unwrap().as_i64().unwrap() as usize,
            bytes.len() - HEADER_SIZE
        );
    }

    #[test]
    fn test_truncated_payload() {
        let bytes = encode_network(&sample_net()).unwrap();
        let err = decode(&bytes[..bytes.len() - 10]).unwrap_err();
        assert!(matches!(err, CoreError::Format { .. }));
    }

    #[test]
    fn test_unsupported_binary_version() {
        let bytes = seal(&header(), 7, 0, vec![0, 0, 0, 0]).unwrap();
        let err = decode(&bytes).unwrap_err();
        assert_eq!(err.to_string(), "The binary file version [7] is not supported");
    }

    #[test]
    fn test_legacy_version_1_is_upgraded() {
        let legacy = LegacyPoint {
            id: "ground".into(),
            point_type: "Tie".into(),
            held: true,
            apriori: [Some(0.0), Some(90.0), Some(3_396_190.0)],
            apriori_sigmas: [Some(25.0), Some(25.0), Some(50.0)],
            measures: vec![
                LegacyMeasure {
                    serial_number: "IMG1".into(),
                    measure_type: "Unmeasured".into(),
                    ..Default::default()
                },
                LegacyMeasure {
                    serial_number: "IMG2".into(),
                    measure_type: "AutomaticPixel".into(),
                    sample: Some(5.0),
                    line: Some(6.0),
                    error_sample: Some(0.3),
                    reference: true,
                    ..Default::default()
                },
            ],
            ..Default::default()
        };
        let bytes = encode_legacy_network(&header(), &[legacy]).unwrap();
        let root = parse(&String::from_utf8_lossy(&bytes)).unwrap();
        let net =
            decode_network(&bytes, &root, "legacy.bin", &TargetRadiiTable::default()).unwrap();

        let p = net.point("ground").unwrap();
        assert_eq!(p.point_type, PointType::Fixed);
        let apriori = p.apriori_surface_point.as_ref().unwrap();
        assert_relative_eq!(apriori.y(), 3_396_190.0, epsilon = 1e-6);
        assert_relative_eq!(apriori.lat_sigma_distance().unwrap(), 25.0, max_relative = 1e-6);
        assert!(p.radius_constrained);

        let unmeasured = p.measure("IMG1").unwrap();
        assert_eq!(unmeasured.measure_type, MeasureType::Candidate);
        assert!(unmeasured.ignore);
        assert_eq!((unmeasured.sample, unmeasured.line), (0.0, 0.0));

        let pixel = p.measure("IMG2").unwrap();
        assert_eq!(pixel.measure_type, MeasureType::RegisteredPixel);
        assert_eq!(pixel.sample_residual, Some(0.3));
        assert_eq!(p.reference_index(), Some(1));
    }
}
