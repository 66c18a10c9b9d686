//! YAML configuration: extra target radii and bundle settings.
//!
//! ```yaml
//! targets:
//!   - name: Phobos
//!     equatorial_radius: 13000.0
//!     polar_radius: 9100.0
//! bundle:
//!   outlier_rejection: true
//!   maximum_likelihood:
//!     - model: Huber
//!       quantile: 0.5
//! ```

use std::fs::File;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::bundle::BundleSettings;
use crate::error::{CoreError, Result};
use crate::target::{TargetEntry, TargetRadiiTable};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    /// Merged over the built-in bodies; same-named entries replace them.
    pub targets: Vec<TargetEntry>,
    pub bundle: BundleSettings,
}

impl CoreConfig {
    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let config: CoreConfig =
            serde_yaml::from_reader(File::open(path)?).map_err(|e| CoreError::Format {
                file: path.display().to_string(),
                message: e.to_string(),
            })?;
        config.validate()?;
        info!(
            "Loaded configuration {} ({} extra targets)",
            path.display(),
            config.targets.len()
        );
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.bundle.validate()
    }

    /// Built-in radii with the configured targets registered on top.
    pub fn radii_table(&self) -> Result<TargetRadiiTable> {
        let table = TargetRadiiTable::with_builtin_targets();
        table.extend(&self.targets)?;
        Ok(table)
    }
}
