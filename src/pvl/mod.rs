//! Parameter Value Language (Pvl) document model.
//!
//! Pvl is the nested `Object`/`Group`/keyword text format used for control
//! networks and bundle reports:
//!
//! ```text
//! Object = ControlNetwork
//!   Version = 4
//!   Object = ControlPoint
//!     PointId = P001
//!     Group = ControlMeasure
//!       SerialNumber = IMG1
//!     End_Group
//!   End_Object
//! End_Object
//! End
//! ```

pub mod container;
pub mod keyword;
pub mod parser;

use std::fs;
use std::path::Path;

use tracing::debug;

use crate::error::Result;

pub use container::{PvlContainer, PvlGroup, PvlObject, ROOT_NAME};
pub use keyword::{parse_f64, PvlKeyword, PvlValue};
pub use parser::parse;

/// Read and parse a Pvl file.
pub fn read_file<P: AsRef<Path>>(path: P) -> Result<PvlObject> {
    let text = fs::read_to_string(path.as_ref())?;
    let root = parse(&text)?;
    debug!("Parsed Pvl file {}", path.as_ref().display());
    Ok(root)
}

/// Write a document to `path`. A non-root object is wrapped in a root first.
pub fn write_file<P: AsRef<Path>>(object: &PvlObject, path: P) -> Result<()> {
    let text = if object.is_root() {
        object.to_string()
    } else {
        let mut root = PvlObject::root();
        root.add_object(object.clone());
        root.to_string()
    };
    fs::write(path.as_ref(), text)?;
    debug!("Wrote Pvl file {}", path.as_ref().display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_file_round_trip_wraps_non_root() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("net.pvl");

        let mut net = PvlObject::new("ControlNetwork");
        net.add_keyword(PvlKeyword::with_value("NetworkId", "abc"));
        write_file(&net, &path).unwrap();

        let root = read_file(&path).unwrap();
        assert!(root.is_root());
        assert_eq!(root.require_object("ControlNetwork").unwrap(), &net);
    }
}
