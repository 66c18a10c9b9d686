//! Control network persistence.
//!
//! [`ControlNetVersioner`] detects the on-disk form of a network (Pvl text or
//! binary envelope), upgrades old schema versions and builds a
//! [`ControlNet`]. Writing produces either the latest Pvl form or the latest
//! binary form.
//!
//! # Format detection
//!
//! Both forms start with Pvl text: a binary network's header is a
//! `ProtoBuffer` object, a text network is a `ControlNetwork` object.
//! Anything else is rejected.

pub mod binary;
pub mod migrate;
pub mod pvl_network;

use std::fs;
use std::path::Path;

use tracing::{debug, info};

use crate::control::ControlNet;
use crate::error::{CoreError, Result, ResultExt};
use crate::pvl::{self, PvlContainer, PvlObject};
use crate::target::{Radii, RadiiProvider};

pub use binary::{HEADER_SIZE, LATEST_BINARY_VERSION};
pub use migrate::{upgrade_to_latest, LATEST_PVL_VERSION};
pub use pvl_network::{network_from_pvl, network_to_pvl};

/// On-disk form of a control network.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkFormat {
    Pvl,
    Binary,
}

/// Classify a parsed file header.
pub fn detect_format(root: &PvlObject) -> Option<NetworkFormat> {
    if root.find_object(binary::ENVELOPE_OBJECT).is_some() {
        Some(NetworkFormat::Binary)
    } else if root.find_object("ControlNetwork").is_some() {
        Some(NetworkFormat::Pvl)
    } else {
        None
    }
}

/// Reads and writes control networks of every supported version.
pub struct ControlNetVersioner<'a> {
    radii: &'a dyn RadiiProvider,
}

impl<'a> ControlNetVersioner<'a> {
    /// `radii` resolves target radii for migration and comment annotations.
    pub fn new(radii: &'a dyn RadiiProvider) -> Self {
        Self { radii }
    }

    /// Read a network file of any supported form and version.
    pub fn read<P: AsRef<Path>>(&self, path: P) -> Result<ControlNet> {
        let name = path.as_ref().display().to_string();
        let result = fs::read(path.as_ref())
            .map_err(CoreError::from)
            .and_then(|bytes| self.read_bytes(&bytes, &name));
        let net = result.context_with(|| format!("Reading the control network [{}] failed", name))?;
        info!(
            "Read control network {} ({} points, {} measures)",
            name,
            net.num_points(),
            net.num_measures()
        );
        Ok(net)
    }

    /// Decode in-memory file contents; `name` is used in error messages.
    pub fn read_bytes(&self, bytes: &[u8], name: &str) -> Result<ControlNet> {
        let undetected = || CoreError::Format {
            file: name.to_string(),
            message: "Could not determine the control network file type".to_string(),
        };

        let text = String::from_utf8_lossy(bytes);
        let root = pvl::parse(&text).map_err(|e| {
            debug!("Header of {} is not Pvl: {}", name, e);
            undetected()
        })?;

        match detect_format(&root).ok_or_else(undetected)? {
            NetworkFormat::Binary => binary::decode_network(bytes, &root, name, self.radii),
            NetworkFormat::Pvl => {
                let network = root
                    .find_object("ControlNetwork")
                    .cloned()
                    .ok_or_else(undetected)?;
                let network = upgrade_to_latest(network, self.radii)?;
                let radii = self.target_radii(&network);
                network_from_pvl(&network, name, radii)
            }
        }
    }

    fn target_radii(&self, network: &PvlObject) -> Option<Radii> {
        network.first_value("TargetName").and_then(|t| self.radii.radii(t))
    }

    /// Latest-version Pvl form of `net`.
    pub fn to_pvl(&self, net: &ControlNet) -> PvlObject {
        network_to_pvl(net, self.radii.radii(&net.header.target_name))
    }

    /// Write `net` as Pvl text (`as_pvl`) or as a binary network.
    pub fn write<P: AsRef<Path>>(&self, net: &ControlNet, path: P, as_pvl: bool) -> Result<()> {
        let path = path.as_ref();
        if as_pvl {
            pvl::write_file(&self.to_pvl(net), path)?;
        } else {
            fs::write(path, binary::encode_network(net)?)?;
        }
        info!(
            "Wrote control network {} as {} ({} points)",
            path.display(),
            if as_pvl { "Pvl" } else { "binary" },
            net.num_points()
        );
        Ok(())
    }
}
