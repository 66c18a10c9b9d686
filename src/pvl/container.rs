//! Pvl groups and objects.

use std::fmt;

use crate::error::{CoreError, Result};

use super::keyword::PvlKeyword;

/// Keyword access shared by groups and objects. Names match case-insensitively.
pub trait PvlContainer {
    fn container_name(&self) -> &str;
    fn keywords(&self) -> &[PvlKeyword];
    fn keywords_mut(&mut self) -> &mut Vec<PvlKeyword>;

    fn has_keyword(&self, name: &str) -> bool {
        self.keywords().iter().any(|k| k.is_named(name))
    }

    fn keyword(&self, name: &str) -> Option<&PvlKeyword> {
        self.keywords().iter().find(|k| k.is_named(name))
    }

    fn keyword_mut(&mut self, name: &str) -> Option<&mut PvlKeyword> {
        self.keywords_mut().iter_mut().find(|k| k.is_named(name))
    }

    fn require_keyword(&self, name: &str) -> Result<&PvlKeyword> {
        self.keyword(name).ok_or_else(|| {
            CoreError::Pvl(format!(
                "Unable to find keyword [{}] in [{}]",
                name,
                self.container_name()
            ))
        })
    }

    /// First value of `name`, if the keyword exists.
    fn first_value(&self, name: &str) -> Option<&str> {
        self.keyword(name).map(|k| k.first())
    }

    /// Append, allowing duplicates.
    fn add_keyword(&mut self, keyword: PvlKeyword) {
        self.keywords_mut().push(keyword);
    }

    /// Replace the first keyword with the same name, or append.
    fn set_keyword(&mut self, keyword: PvlKeyword) {
        match self.keyword_mut(keyword.name()) {
            Some(existing) => *existing = keyword,
            None => self.keywords_mut().push(keyword),
        }
    }

    /// Set a single-valued keyword, keeping comments of an existing one.
    fn set_value(&mut self, name: &str, value: &str) {
        match self.keyword_mut(name) {
            Some(existing) => existing.set_value(value),
            None => self.keywords_mut().push(PvlKeyword::with_value(name, value)),
        }
    }

    /// Remove the first keyword named `name`.
    fn delete_keyword(&mut self, name: &str) -> Option<PvlKeyword> {
        let index = self.keywords().iter().position(|k| k.is_named(name))?;
        Some(self.keywords_mut().remove(index))
    }

    fn rename_keyword(&mut self, from: &str, to: &str) -> bool {
        match self.keyword_mut(from) {
            Some(k) => {
                k.set_name(to);
                true
            }
            None => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PvlGroup {
    pub name: String,
    pub keywords: Vec<PvlKeyword>,
}

impl PvlGroup {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            keywords: Vec::new(),
        }
    }

    pub(crate) fn write_indented(&self, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
        let indent = "  ".repeat(depth);
        writeln!(f, "{}Group = {}", indent, self.name)?;
        for k in &self.keywords {
            k.write_indented(f, depth + 1)?;
        }
        writeln!(f, "{}End_Group", indent)
    }
}

impl PvlContainer for PvlGroup {
    fn container_name(&self) -> &str {
        &self.name
    }

    fn keywords(&self) -> &[PvlKeyword] {
        &self.keywords
    }

    fn keywords_mut(&mut self) -> &mut Vec<PvlKeyword> {
        &mut self.keywords
    }
}

impl fmt::Display for PvlGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write_indented(f, 0)
    }
}

/// An object: keywords, groups and nested objects, each in insertion order.
///
/// A document root is an object named [`ROOT_NAME`] whose contents are
/// written without an enclosing `Object` statement.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PvlObject {
    pub name: String,
    pub keywords: Vec<PvlKeyword>,
    pub groups: Vec<PvlGroup>,
    pub objects: Vec<PvlObject>,
}

pub const ROOT_NAME: &str = "Root";

impl PvlObject {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn root() -> Self {
        Self::new(ROOT_NAME)
    }

    pub fn is_root(&self) -> bool {
        self.name == ROOT_NAME
    }

    pub fn add_group(&mut self, group: PvlGroup) {
        self.groups.push(group);
    }

    pub fn add_object(&mut self, object: PvlObject) {
        self.objects.push(object);
    }

    pub fn has_object(&self, name: &str) -> bool {
        self.objects.iter().any(|o| o.name.eq_ignore_ascii_case(name))
    }

    pub fn object(&self, name: &str) -> Option<&PvlObject> {
        self.objects.iter().find(|o| o.name.eq_ignore_ascii_case(name))
    }

    pub fn object_mut(&mut self, name: &str) -> Option<&mut PvlObject> {
        self.objects.iter_mut().find(|o| o.name.eq_ignore_ascii_case(name))
    }

    pub fn require_object(&self, name: &str) -> Result<&PvlObject> {
        self.object(name).ok_or_else(|| {
            CoreError::Pvl(format!("Unable to find object [{}] in [{}]", name, self.name))
        })
    }

    pub fn has_group(&self, name: &str) -> bool {
        self.groups.iter().any(|g| g.name.eq_ignore_ascii_case(name))
    }

    pub fn group(&self, name: &str) -> Option<&PvlGroup> {
        self.groups.iter().find(|g| g.name.eq_ignore_ascii_case(name))
    }

    pub fn require_group(&self, name: &str) -> Result<&PvlGroup> {
        self.group(name).ok_or_else(|| {
            CoreError::Pvl(format!("Unable to find group [{}] in [{}]", name, self.name))
        })
    }

    /// Depth-first search for an object named `name`, including `self`.
    pub fn find_object(&self, name: &str) -> Option<&PvlObject> {
        if self.name.eq_ignore_ascii_case(name) {
            return Some(self);
        }
        self.objects.iter().find_map(|o| o.find_object(name))
    }

    pub(crate) fn write_indented(&self, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
        let indent = "  ".repeat(depth);
        let inner = if self.is_root() { depth } else { depth + 1 };
        if !self.is_root() {
            writeln!(f, "{}Object = {}", indent, self.name)?;
        }
        for k in &self.keywords {
            k.write_indented(f, inner)?;
        }
        for g in &self.groups {
            writeln!(f)?;
            g.write_indented(f, inner)?;
        }
        for o in &self.objects {
            writeln!(f)?;
            o.write_indented(f, inner)?;
        }
        if self.is_root() {
            writeln!(f, "End")
        } else {
            writeln!(f, "{}End_Object", indent)
        }
    }
}

impl PvlContainer for PvlObject {
    fn container_name(&self) -> &str {
        &self.name
    }

    fn keywords(&self) -> &[PvlKeyword] {
        &self.keywords
    }

    fn keywords_mut(&mut self) -> &mut Vec<PvlKeyword> {
        &mut self.keywords
    }
}

impl fmt::Display for PvlObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write_indented(f, 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_object() -> PvlObject {
        let mut point = PvlObject::new("ControlPoint");
        point.add_keyword(PvlKeyword::with_value("PointId", "P1"));
        let mut measure = PvlGroup::new("ControlMeasure");
        measure.add_keyword(PvlKeyword::with_value("SerialNumber", "S1"));
        point.add_group(measure);
        point
    }

    #[test]
    fn test_case_insensitive_lookup() {
        let p = sample_object();
        assert!(p.has_keyword("pointid"));
        assert_eq!(p.first_value("POINTID"), Some("P1"));
        assert!(p.has_group("controlmeasure"));
    }

    #[test]
    fn test_set_rename_delete() {
        let mut p = sample_object();
        p.set_value("PointType", "Tie");
        p.set_value("PointType", "Free");
        assert_eq!(p.keywords.len(), 2);
        assert!(p.rename_keyword("PointType", "Type"));
        assert_eq!(p.first_value("Type"), Some("Free"));
        assert!(p.delete_keyword("Type").is_some());
        assert!(p.delete_keyword("Type").is_none());
    }

    #[test]
    fn test_display_nesting() {
        let mut root = PvlObject::root();
        let mut net = PvlObject::new("ControlNetwork");
        net.add_object(sample_object());
        root.add_object(net);
        let text = root.to_string();
        assert!(text.contains("Object = ControlNetwork\n"));
        assert!(text.contains("    Group = ControlMeasure\n      SerialNumber = S1\n    End_Group\n"));
        assert!(text.trim_end().ends_with("End"));
    }

    #[test]
    fn test_find_object_recurses() {
        let mut root = PvlObject::root();
        let mut net = PvlObject::new("ControlNetwork");
        net.add_object(sample_object());
        root.add_object(net);
        assert!(root.find_object("ControlPoint").is_some());
        assert!(root.find_object("Missing").is_none());
    }
}
