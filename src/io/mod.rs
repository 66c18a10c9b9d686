//! Serialization plumbing shared by the network and results formats.

pub mod binary;
pub mod columnar;
pub mod xml;

pub use binary::{ByteReader, ByteWriter};
pub use columnar::{
    AttributeValue, ColumnarFile, CompoundField, Dataset, FieldKind, FieldValue, Group,
};
pub use xml::XmlElement;
