//! Target body radii.
//!
//! Spherical conversions that involve distance sigmas need the body's radii.
//! They are supplied through the [`RadiiProvider`] capability so callers can
//! back it with a static table, a YAML file, or an ephemeris system.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

/// Triaxial body radii in meters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Radii {
    pub equatorial_a: f64,
    pub equatorial_b: f64,
    pub polar: f64,
}

impl Radii {
    pub fn new(equatorial_a: f64, equatorial_b: f64, polar: f64) -> Result<Self> {
        let radii = Self {
            equatorial_a,
            equatorial_b,
            polar,
        };
        radii.validate()?;
        Ok(radii)
    }

    /// Biaxial body: both equatorial axes equal.
    pub fn biaxial(equatorial: f64, polar: f64) -> Result<Self> {
        Self::new(equatorial, equatorial, polar)
    }

    pub fn validate(&self) -> Result<()> {
        let ok = [self.equatorial_a, self.equatorial_b, self.polar]
            .iter()
            .all(|r| r.is_finite() && *r > 0.0);
        if !ok {
            return Err(CoreError::InvalidState(format!(
                "Radii must be positive, got [{}, {}, {}]",
                self.equatorial_a, self.equatorial_b, self.polar
            )));
        }
        Ok(())
    }
}

/// Looks up body radii by target name.
pub trait RadiiProvider: Send + Sync {
    /// Radii for `target`, or `None` when the body is unknown.
    fn radii(&self, target: &str) -> Option<Radii>;
}

/// One entry of a radii table, as read from configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetEntry {
    pub name: String,
    /// Meters.
    pub equatorial_radius: f64,
    /// Meters.
    pub polar_radius: f64,
}

/// Built-in IAU mean radii (meters) for the bodies most networks target.
const BUILTIN_TARGETS: &[(&str, f64, f64)] = &[
    ("Mercury", 2_439_400.0, 2_439_400.0),
    ("Venus", 6_051_800.0, 6_051_800.0),
    ("Earth", 6_378_137.0, 6_356_752.0),
    ("Moon", 1_737_400.0, 1_737_400.0),
    ("Mars", 3_396_190.0, 3_376_200.0),
    ("Vesta", 289_000.0, 229_000.0),
    ("Ceres", 487_300.0, 446_000.0),
    ("Enceladus", 252_100.0, 248_300.0),
];

/// Shared, runtime-extensible radii table.
///
/// Clones share the same underlying table, so a target registered through
/// one handle is visible through every other.
#[derive(Debug, Clone)]
pub struct TargetRadiiTable {
    entries: Arc<RwLock<HashMap<String, Radii>>>,
}

impl TargetRadiiTable {
    /// An empty table.
    pub fn empty() -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// A table preloaded with the built-in bodies.
    pub fn with_builtin_targets() -> Self {
        let table = Self::empty();
        {
            let mut entries = table.entries.write();
            for (name, equatorial, polar) in BUILTIN_TARGETS {
                entries.insert(
                    name.to_lowercase(),
                    Radii {
                        equatorial_a: *equatorial,
                        equatorial_b: *equatorial,
                        polar: *polar,
                    },
                );
            }
        }
        table
    }

    /// Add or replace a target.
    pub fn register(&self, name: &str, radii: Radii) -> Result<()> {
        radii.validate()?;
        self.entries.write().insert(name.to_lowercase(), radii);
        Ok(())
    }

    /// Register every configured entry, overriding built-ins with the same name.
    pub fn extend(&self, targets: &[TargetEntry]) -> Result<()> {
        for target in targets {
            let radii = Radii::biaxial(target.equatorial_radius, target.polar_radius)?;
            self.register(&target.name, radii)?;
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl Default for TargetRadiiTable {
    fn default() -> Self {
        Self::with_builtin_targets()
    }
}

/// Normalize a target name for lookup. Instrument-prefixed Mars names such as
/// `MRO/MARS` resolve to Mars.
pub fn canonical_target_name(target: &str) -> String {
    let trimmed = target.trim();
    if trimmed.starts_with("MRO/") {
        return "Mars".to_string();
    }
    trimmed.to_string()
}

impl RadiiProvider for TargetRadiiTable {
    fn radii(&self, target: &str) -> Option<Radii> {
        let key = canonical_target_name(target).to_lowercase();
        if key.is_empty() {
            return None;
        }
        self.entries.read().get(&key).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_lookup_is_case_insensitive() {
        let table = TargetRadiiTable::with_builtin_targets();
        let mars = table.radii("MARS").unwrap();
        assert_eq!(mars.equatorial_a, 3_396_190.0);
        assert_eq!(mars.polar, 3_376_200.0);
        assert!(table.radii("Pluto").is_none());
        assert!(table.radii("").is_none());
    }

    #[test]
    fn test_mro_prefix_resolves_to_mars() {
        let table = TargetRadiiTable::default();
        assert_eq!(table.radii("MRO/HIRISE"), table.radii("Mars"));
    }

    #[test]
    fn test_register_is_shared_between_clones() {
        let table = TargetRadiiTable::empty();
        let other = table.clone();
        table.register("Itokawa", Radii::biaxial(300.0, 150.0).unwrap()).unwrap();
        assert_eq!(other.len(), 1);
        assert!(other.radii("itokawa").is_some());
    }

    #[test]
    fn test_invalid_radii_rejected() {
        assert!(Radii::new(1.0, -1.0, 1.0).is_err());
        assert!(Radii::biaxial(f64::NAN, 1.0).is_err());
    }
}
