//! Closed enumerations of the control network model.
//!
//! Each enum has a Pvl keyword spelling (`as_str`/`parse`) and a compact
//! numeric code used by the binary record format.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

/// How a point's coordinates participate in the adjustment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PointType {
    /// Coordinates are solved without prior constraint.
    #[default]
    Free,
    /// Apriori covariance weights the coordinates.
    Constrained,
    /// Coordinates are held constant.
    Fixed,
}

impl PointType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PointType::Free => "Free",
            PointType::Constrained => "Constrained",
            PointType::Fixed => "Fixed",
        }
    }

    /// Latest-form spelling; anything unrecognized is `Free`.
    pub fn from_pvl(text: &str) -> Self {
        match text {
            "Fixed" => PointType::Fixed,
            "Constrained" => PointType::Constrained,
            _ => PointType::Free,
        }
    }

    pub fn code(&self) -> u8 {
        match self {
            PointType::Free => 0,
            PointType::Constrained => 1,
            PointType::Fixed => 2,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(PointType::Free),
            1 => Some(PointType::Constrained),
            2 => Some(PointType::Fixed),
            _ => None,
        }
    }
}

impl fmt::Display for PointType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a measure's pixel location was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum MeasureType {
    #[default]
    Candidate,
    Manual,
    RegisteredPixel,
    RegisteredSubPixel,
}

impl MeasureType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MeasureType::Candidate => "Candidate",
            MeasureType::Manual => "Manual",
            MeasureType::RegisteredPixel => "RegisteredPixel",
            MeasureType::RegisteredSubPixel => "RegisteredSubPixel",
        }
    }

    /// Case-insensitive parse of the latest-form spelling.
    pub fn parse(text: &str) -> Result<Self> {
        match text.to_ascii_lowercase().as_str() {
            "candidate" => Ok(MeasureType::Candidate),
            "manual" => Ok(MeasureType::Manual),
            "registeredpixel" => Ok(MeasureType::RegisteredPixel),
            "registeredsubpixel" => Ok(MeasureType::RegisteredSubPixel),
            _ => Err(CoreError::Pvl(format!("Unknown measure type [{}]", text))),
        }
    }

    pub fn code(&self) -> u8 {
        match self {
            MeasureType::Candidate => 0,
            MeasureType::Manual => 1,
            MeasureType::RegisteredPixel => 2,
            MeasureType::RegisteredSubPixel => 3,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(MeasureType::Candidate),
            1 => Some(MeasureType::Manual),
            2 => Some(MeasureType::RegisteredPixel),
            3 => Some(MeasureType::RegisteredSubPixel),
            _ => None,
        }
    }
}

impl fmt::Display for MeasureType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Provenance of an apriori surface point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SurfacePointSource {
    #[default]
    None,
    User,
    AverageOfMeasures,
    Reference,
    Basemap,
    BundleSolution,
}

impl SurfacePointSource {
    const ALL: [SurfacePointSource; 6] = [
        SurfacePointSource::None,
        SurfacePointSource::User,
        SurfacePointSource::AverageOfMeasures,
        SurfacePointSource::Reference,
        SurfacePointSource::Basemap,
        SurfacePointSource::BundleSolution,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SurfacePointSource::None => "None",
            SurfacePointSource::User => "User",
            SurfacePointSource::AverageOfMeasures => "AverageOfMeasures",
            SurfacePointSource::Reference => "Reference",
            SurfacePointSource::Basemap => "Basemap",
            SurfacePointSource::BundleSolution => "BundleSolution",
        }
    }

    pub fn parse(text: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|s| s.as_str() == text)
            .ok_or_else(|| CoreError::Pvl(format!("Invalid AprioriXYZSource [{}]", text)))
    }

    pub fn code(&self) -> u8 {
        Self::ALL.iter().position(|s| s == self).unwrap_or(0) as u8
    }

    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.get(code as usize).copied()
    }
}

/// Provenance of an apriori local radius.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum RadiusSource {
    #[default]
    None,
    User,
    AverageOfMeasures,
    Ellipsoid,
    DEM,
    BundleSolution,
}

impl RadiusSource {
    const ALL: [RadiusSource; 6] = [
        RadiusSource::None,
        RadiusSource::User,
        RadiusSource::AverageOfMeasures,
        RadiusSource::Ellipsoid,
        RadiusSource::DEM,
        RadiusSource::BundleSolution,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RadiusSource::None => "None",
            RadiusSource::User => "User",
            RadiusSource::AverageOfMeasures => "AverageOfMeasures",
            RadiusSource::Ellipsoid => "Ellipsoid",
            RadiusSource::DEM => "DEM",
            RadiusSource::BundleSolution => "BundleSolution",
        }
    }

    pub fn parse(text: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|s| s.as_str() == text)
            .ok_or_else(|| CoreError::Pvl(format!("Invalid AprioriRadiusSource [{}]", text)))
    }

    pub fn code(&self) -> u8 {
        Self::ALL.iter().position(|s| s == self).unwrap_or(0) as u8
    }

    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.get(code as usize).copied()
    }
}

/// Kinds of diagnostic values a registration step may attach to a measure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MeasureLogKind {
    ObsoleteEccentricity,
    GoodnessOfFit,
    MinimumPixelZScore,
    MaximumPixelZScore,
    PixelShift,
    WholePixelCorrelation,
    SubPixelCorrelation,
    ObsoleteAverageResidual,
}

impl MeasureLogKind {
    const ALL: [MeasureLogKind; 8] = [
        MeasureLogKind::ObsoleteEccentricity,
        MeasureLogKind::GoodnessOfFit,
        MeasureLogKind::MinimumPixelZScore,
        MeasureLogKind::MaximumPixelZScore,
        MeasureLogKind::PixelShift,
        MeasureLogKind::WholePixelCorrelation,
        MeasureLogKind::SubPixelCorrelation,
        MeasureLogKind::ObsoleteAverageResidual,
    ];

    /// Persisted numeric code, starting at 1.
    pub fn code(&self) -> u8 {
        match self {
            MeasureLogKind::ObsoleteEccentricity => 1,
            MeasureLogKind::GoodnessOfFit => 2,
            MeasureLogKind::MinimumPixelZScore => 3,
            MeasureLogKind::MaximumPixelZScore => 4,
            MeasureLogKind::PixelShift => 5,
            MeasureLogKind::WholePixelCorrelation => 6,
            MeasureLogKind::SubPixelCorrelation => 7,
            MeasureLogKind::ObsoleteAverageResidual => 8,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.code() == code)
    }

    /// Pvl keyword name.
    pub fn name(&self) -> &'static str {
        match self {
            MeasureLogKind::ObsoleteEccentricity => "Obsolete_Eccentricity",
            MeasureLogKind::GoodnessOfFit => "GoodnessOfFit",
            MeasureLogKind::MinimumPixelZScore => "MinimumPixelZScore",
            MeasureLogKind::MaximumPixelZScore => "MaximumPixelZScore",
            MeasureLogKind::PixelShift => "PixelShift",
            MeasureLogKind::WholePixelCorrelation => "WholePixelCorrelation",
            MeasureLogKind::SubPixelCorrelation => "SubPixelCorrelation",
            MeasureLogKind::ObsoleteAverageResidual => "Obsolete_AverageResidual",
        }
    }

    /// Case-insensitive lookup by keyword name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.name().eq_ignore_ascii_case(name))
    }
}

/// One diagnostic value attached to a measure.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MeasureLogData {
    pub kind: MeasureLogKind,
    pub value: f64,
}

impl MeasureLogData {
    pub fn new(kind: MeasureLogKind, value: f64) -> Self {
        Self { kind, value }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_point_type_from_pvl_defaults_to_free() {
        assert_eq!(PointType::from_pvl("Fixed"), PointType::Fixed);
        assert_eq!(PointType::from_pvl("Constrained"), PointType::Constrained);
        assert_eq!(PointType::from_pvl("Tie"), PointType::Free);
        assert_eq!(PointType::Constrained.to_string(), "Constrained");
    }

    #[test]
    fn test_measure_type_parse_is_case_insensitive() {
        assert_eq!(
            MeasureType::parse("registeredSUBpixel").unwrap(),
            MeasureType::RegisteredSubPixel
        );
        let err = MeasureType::parse("Estimated").unwrap_err();
        assert_eq!(err.to_string(), "Unknown measure type [Estimated]");
    }

    #[test]
    fn test_sources_reject_unknown_names() {
        assert_eq!(SurfacePointSource::parse("Basemap").unwrap(), SurfacePointSource::Basemap);
        assert!(SurfacePointSource::parse("DEM").is_err());
        assert_eq!(RadiusSource::parse("DEM").unwrap(), RadiusSource::DEM);
        let code = RadiusSource::Ellipsoid.code();
        assert_eq!(RadiusSource::from_code(code), Some(RadiusSource::Ellipsoid));
    }

    #[test]
    fn test_log_kind_codes_and_names() {
        assert_eq!(MeasureLogKind::GoodnessOfFit.code(), 2);
        assert_eq!(MeasureLogKind::from_code(8), Some(MeasureLogKind::ObsoleteAverageResidual));
        assert_eq!(MeasureLogKind::from_code(0), None);
        assert_eq!(MeasureLogKind::from_name("pixelshift"), Some(MeasureLogKind::PixelShift));
        assert_eq!(MeasureLogKind::from_name("ZScore"), None);
    }
}
