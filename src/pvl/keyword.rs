//! Pvl keywords.

use std::fmt;

use crate::error::{CoreError, Result};

/// One value of a keyword, with an optional unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PvlValue {
    pub text: String,
    pub unit: Option<String>,
}

impl PvlValue {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            unit: None,
        }
    }

    pub fn with_unit(text: impl Into<String>, unit: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            unit: Some(unit.into()),
        }
    }
}

/// A named keyword holding zero or more values and leading comments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PvlKeyword {
    name: String,
    values: Vec<PvlValue>,
    comments: Vec<String>,
}

impl PvlKeyword {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            values: Vec::new(),
            comments: Vec::new(),
        }
    }

    pub fn with_value(name: impl Into<String>, value: impl Into<String>) -> Self {
        let mut k = Self::new(name);
        k.add_value(value);
        k
    }

    pub fn with_unit(
        name: impl Into<String>,
        value: impl Into<String>,
        unit: impl Into<String>,
    ) -> Self {
        let mut k = Self::new(name);
        k.values.push(PvlValue::with_unit(value, unit));
        k
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    /// Case-insensitive name comparison.
    pub fn is_named(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }

    pub fn add_value(&mut self, value: impl Into<String>) {
        self.values.push(PvlValue::new(value));
    }

    pub fn push(&mut self, value: PvlValue) {
        self.values.push(value);
    }

    /// Replace all values with a single one.
    pub fn set_value(&mut self, value: impl Into<String>) {
        self.values = vec![PvlValue::new(value)];
    }

    pub fn values(&self) -> &[PvlValue] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn value(&self, index: usize) -> Option<&str> {
        self.values.get(index).map(|v| v.text.as_str())
    }

    /// First value, or `""` for a keyword without values.
    pub fn first(&self) -> &str {
        self.value(0).unwrap_or("")
    }

    pub fn unit(&self, index: usize) -> Option<&str> {
        self.values.get(index).and_then(|v| v.unit.as_deref())
    }

    pub fn add_comment(&mut self, comment: impl Into<String>) {
        self.comments.push(comment.into());
    }

    pub fn comments(&self) -> &[String] {
        &self.comments
    }

    pub fn f64_at(&self, index: usize) -> Result<f64> {
        let text = self.value(index).ok_or_else(|| {
            CoreError::Pvl(format!("Keyword [{}] has no value at index {}", self.name, index))
        })?;
        parse_f64(text).ok_or_else(|| {
            CoreError::Pvl(format!(
                "Unable to convert [{}] in keyword [{}] to a double",
                text, self.name
            ))
        })
    }

    pub fn as_f64(&self) -> Result<f64> {
        self.f64_at(0)
    }

    pub fn as_i64(&self) -> Result<i64> {
        let text = self.first();
        text.trim().parse().map_err(|_| {
            CoreError::Pvl(format!(
                "Unable to convert [{}] in keyword [{}] to an integer",
                text, self.name
            ))
        })
    }

    /// `true`/`yes` (any case) are true; anything else is false.
    pub fn as_bool(&self) -> bool {
        matches!(self.first().to_ascii_lowercase().as_str(), "true" | "yes")
    }

    pub(crate) fn write_indented(&self, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
        let indent = "  ".repeat(depth);
        for comment in &self.comments {
            writeln!(f, "{}# {}", indent, comment)?;
        }
        write!(f, "{}{}", indent, self.name)?;
        match self.values.len() {
            0 => writeln!(f),
            1 => {
                write!(f, " = ")?;
                write_value(f, &self.values[0])?;
                writeln!(f)
            }
            _ => {
                write!(f, " = (")?;
                for (i, v) in self.values.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write_value(f, v)?;
                }
                writeln!(f, ")")
            }
        }
    }
}

/// Parse a Pvl number; accepts the usual float syntax.
pub fn parse_f64(text: &str) -> Option<f64> {
    text.trim().parse::<f64>().ok()
}

fn needs_quotes(text: &str) -> bool {
    text.is_empty()
        || text.chars().any(|c| {
            c.is_whitespace()
                || matches!(c, ',' | '(' | ')' | '{' | '}' | '<' | '>' | '"' | '#' | '=' | '\'')
        })
        || text.starts_with("/*")
}

fn write_value(f: &mut fmt::Formatter<'_>, value: &PvlValue) -> fmt::Result {
    if !needs_quotes(&value.text) {
        write!(f, "{}", value.text)?;
    } else if value.text.contains('"') && value.text.contains('\'') {
        write!(f, "\"{}\"", value.text.replace('"', "\"\""))?;
    } else if value.text.contains('"') {
        write!(f, "'{}'", value.text)?;
    } else {
        write!(f, "\"{}\"", value.text)?;
    }
    if let Some(unit) = &value.unit {
        write!(f, " <{}>", unit)?;
    }
    Ok(())
}

impl fmt::Display for PvlKeyword {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write_indented(f, 0)
    }
}
