//! Hierarchical columnar container.
//!
//! Mirrors the group/attribute/dataset layout of HDF5 files: groups nest by
//! `/`-separated paths, carry typed scalar attributes, and hold compound
//! datasets whose records share a fixed field layout. The container is kept
//! in memory and persisted as JSON.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{CoreError, Result};

/// Scalar attribute value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AttributeValue {
    Str(String),
    Int(i64),
    Double(f64),
    Bool(bool),
}

/// Element type of one compound-record field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldKind {
    Int,
    Double,
    Bool,
}

/// Value stored in one compound-record field.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum FieldValue {
    Int(i64),
    Double(f64),
    Bool(bool),
}

impl FieldValue {
    fn kind(&self) -> FieldKind {
        match self {
            FieldValue::Int(_) => FieldKind::Int,
            FieldValue::Double(_) => FieldKind::Double,
            FieldValue::Bool(_) => FieldKind::Bool,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompoundField {
    pub name: String,
    pub kind: FieldKind,
}

impl CompoundField {
    pub fn new(name: &str, kind: FieldKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
        }
    }
}

/// One-dimensional dataset of compound records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    pub fields: Vec<CompoundField>,
    pub records: Vec<Vec<FieldValue>>,
    #[serde(default)]
    pub attributes: BTreeMap<String, AttributeValue>,
}

impl Dataset {
    pub fn new(fields: Vec<CompoundField>) -> Self {
        Self {
            fields,
            records: Vec::new(),
            attributes: BTreeMap::new(),
        }
    }

    /// Append a record; its arity and field kinds must match the layout.
    pub fn push_record(&mut self, record: Vec<FieldValue>) -> Result<()> {
        if record.len() != self.fields.len() {
            return Err(CoreError::InvalidState(format!(
                "Compound record has {} fields, layout has {}",
                record.len(),
                self.fields.len()
            )));
        }
        for (value, field) in record.iter().zip(&self.fields) {
            if value.kind() != field.kind {
                return Err(CoreError::InvalidState(format!(
                    "Field [{}] expects {:?}, got {:?}",
                    field.name,
                    field.kind,
                    value.kind()
                )));
            }
        }
        self.records.push(record);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn field_index(&self, name: &str) -> Result<usize> {
        self.fields
            .iter()
            .position(|f| f.name == name)
            .ok_or_else(|| CoreError::InvalidState(format!("Dataset has no field [{}]", name)))
    }

    pub fn value(&self, record: usize, field: &str) -> Result<FieldValue> {
        let index = self.field_index(field)?;
        self.records
            .get(record)
            .and_then(|r| r.get(index))
            .copied()
            .ok_or_else(|| CoreError::InvalidState(format!("Dataset has no record [{}]", record)))
    }

    pub fn f64(&self, record: usize, field: &str) -> Result<f64> {
        match self.value(record, field)? {
            FieldValue::Double(v) => Ok(v),
            other => Err(kind_mismatch(field, other)),
        }
    }

    pub fn i64(&self, record: usize, field: &str) -> Result<i64> {
        match self.value(record, field)? {
            FieldValue::Int(v) => Ok(v),
            other => Err(kind_mismatch(field, other)),
        }
    }

    pub fn bool(&self, record: usize, field: &str) -> Result<bool> {
        match self.value(record, field)? {
            FieldValue::Bool(v) => Ok(v),
            other => Err(kind_mismatch(field, other)),
        }
    }
}

fn kind_mismatch(field: &str, value: FieldValue) -> CoreError {
    CoreError::InvalidState(format!("Field [{}] holds {:?}", field, value.kind()))
}

/// A group: attributes, nested groups and datasets.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Group {
    #[serde(default)]
    pub attributes: BTreeMap<String, AttributeValue>,
    #[serde(default)]
    pub groups: BTreeMap<String, Group>,
    #[serde(default)]
    pub datasets: BTreeMap<String, Dataset>,
}

impl Group {
    pub fn set_attr(&mut self, name: &str, value: AttributeValue) {
        self.attributes.insert(name.to_string(), value);
    }

    pub fn attr(&self, name: &str) -> Result<&AttributeValue> {
        self.attributes
            .get(name)
            .ok_or_else(|| CoreError::InvalidState(format!("Group has no attribute [{}]", name)))
    }

    pub fn attr_str(&self, name: &str) -> Result<&str> {
        match self.attr(name)? {
            AttributeValue::Str(s) => Ok(s),
            other => Err(attr_mismatch(name, other)),
        }
    }

    pub fn attr_i64(&self, name: &str) -> Result<i64> {
        match self.attr(name)? {
            AttributeValue::Int(v) => Ok(*v),
            other => Err(attr_mismatch(name, other)),
        }
    }

    pub fn attr_f64(&self, name: &str) -> Result<f64> {
        match self.attr(name)? {
            AttributeValue::Double(v) => Ok(*v),
            other => Err(attr_mismatch(name, other)),
        }
    }

    pub fn attr_bool(&self, name: &str) -> Result<bool> {
        match self.attr(name)? {
            AttributeValue::Bool(v) => Ok(*v),
            other => Err(attr_mismatch(name, other)),
        }
    }

    pub fn write_dataset(&mut self, name: &str, dataset: Dataset) {
        self.datasets.insert(name.to_string(), dataset);
    }

    pub fn dataset(&self, name: &str) -> Result<&Dataset> {
        self.datasets
            .get(name)
            .ok_or_else(|| CoreError::InvalidState(format!("Group has no dataset [{}]", name)))
    }
}

fn attr_mismatch(name: &str, value: &AttributeValue) -> CoreError {
    CoreError::InvalidState(format!("Attribute [{}] has unexpected type: {:?}", name, value))
}

fn split_path(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty())
}

/// A columnar file: a root group bound to a path on disk.
#[derive(Debug, Clone)]
pub struct ColumnarFile {
    path: PathBuf,
    root: Group,
}

impl ColumnarFile {
    /// New empty container; nothing is written until [`Self::flush`].
    pub fn create<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            root: Group::default(),
        }
    }

    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let text = fs::read_to_string(&path)?;
        let root: Group = serde_json::from_str(&text).map_err(|e| CoreError::Format {
            file: path.display().to_string(),
            message: e.to_string(),
        })?;
        Ok(Self { path, root })
    }

    /// Open an existing container or start an empty one at `path`.
    pub fn open_or_create<P: AsRef<Path>>(path: P) -> Result<Self> {
        if path.as_ref().exists() {
            Self::open(path)
        } else {
            Ok(Self::create(path))
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn root(&self) -> &Group {
        &self.root
    }

    pub fn group(&self, path: &str) -> Result<&Group> {
        let mut group = &self.root;
        for part in split_path(path) {
            group = group
                .groups
                .get(part)
                .ok_or_else(|| {
                    CoreError::InvalidState(format!("No group [{}] in [{}]", part, path))
                })?;
        }
        Ok(group)
    }

    /// Get or create the group at `path`, creating intermediate groups.
    pub fn create_group(&mut self, path: &str) -> &mut Group {
        let mut group = &mut self.root;
        for part in split_path(path) {
            group = group.groups.entry(part.to_string()).or_default();
        }
        group
    }

    pub fn flush(&self) -> Result<()> {
        let text = serde_json::to_string_pretty(&self.root)?;
        fs::write(&self.path, text)?;
        debug!("Wrote columnar container {}", self.path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn layout() -> Vec<CompoundField> {
        vec![
            CompoundField::new("Count", FieldKind::Int),
            CompoundField::new("Mean", FieldKind::Double),
        ]
    }

    #[test]
    fn test_nested_groups_persist() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("results.h5.json");

        let mut file = ColumnarFile::create(&path);
        let group = file.create_group("/bundle/BundleResults");
        group.set_attr("numberObservations", AttributeValue::Int(42));
        group.set_attr("converged", AttributeValue::Bool(true));
        let mut ds = Dataset::new(layout());
        ds.push_record(vec![FieldValue::Int(3), FieldValue::Double(0.25)]).unwrap();
        group.write_dataset("Stats", ds);
        file.flush().unwrap();

        let reopened = ColumnarFile::open(&path).unwrap();
        let group = reopened.group("bundle/BundleResults").unwrap();
        assert_eq!(group.attr_i64("numberObservations").unwrap(), 42);
        assert!(group.attr_bool("converged").unwrap());
        let ds = group.dataset("Stats").unwrap();
        assert_eq!(ds.i64(0, "Count").unwrap(), 3);
        assert_eq!(ds.f64(0, "Mean").unwrap(), 0.25);
    }

    #[test]
    fn test_record_layout_is_enforced() {
        let mut ds = Dataset::new(layout());
        assert!(ds.push_record(vec![FieldValue::Int(1)]).is_err());
        assert!(ds.push_record(vec![FieldValue::Double(1.0), FieldValue::Double(1.0)]).is_err());
    }

    #[test]
    fn test_attribute_type_mismatch() {
        let mut g = Group::default();
        g.set_attr("name", AttributeValue::Str("x".into()));
        assert!(g.attr_f64("name").is_err());
        assert!(g.attr_str("missing").is_err());
    }

    #[test]
    fn test_missing_group() {
        let file = ColumnarFile::create("unused.json");
        assert!(file.group("/nope").is_err());
        assert!(file.group("/").is_ok());
    }
}
