//! Running numeric accumulator.

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::io::binary::{ByteReader, ByteWriter};
use crate::io::columnar::{CompoundField, Dataset, FieldKind, FieldValue};
use crate::io::xml::{leaf, XmlElement};

/// Running sums, extrema and counts over a stream of values.
///
/// Non-finite values are counted but never accumulated. Values outside the
/// valid range are counted as under/over range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Statistics {
    sum: f64,
    sum_sum: f64,
    minimum: f64,
    maximum: f64,
    valid_minimum: f64,
    valid_maximum: f64,
    total_count: i64,
    valid_count: i64,
    nan_count: i64,
    under_range_count: i64,
    over_range_count: i64,
    removed_data: bool,
}

impl Default for Statistics {
    fn default() -> Self {
        Self::new()
    }
}

impl Statistics {
    pub fn new() -> Self {
        Self {
            sum: 0.0,
            sum_sum: 0.0,
            minimum: f64::MAX,
            maximum: f64::MIN,
            valid_minimum: f64::MIN,
            valid_maximum: f64::MAX,
            total_count: 0,
            valid_count: 0,
            nan_count: 0,
            under_range_count: 0,
            over_range_count: 0,
            removed_data: false,
        }
    }

    /// Clear all accumulated data; the valid range is kept.
    pub fn reset(&mut self) {
        let (lo, hi) = (self.valid_minimum, self.valid_maximum);
        *self = Self::new();
        self.valid_minimum = lo;
        self.valid_maximum = hi;
    }

    /// Restrict accumulation to `[minimum, maximum]`. Must precede `add_data`.
    pub fn set_valid_range(&mut self, minimum: f64, maximum: f64) -> Result<()> {
        if maximum < minimum {
            return Err(CoreError::InvalidState(format!(
                "Invalid valid range [{}, {}]",
                minimum, maximum
            )));
        }
        if self.total_count > 0 {
            return Err(CoreError::InvalidState(
                "The valid range must be set before adding data".to_string(),
            ));
        }
        self.valid_minimum = minimum;
        self.valid_maximum = maximum;
        Ok(())
    }

    pub fn add_data(&mut self, value: f64) {
        self.total_count += 1;
        if !value.is_finite() {
            self.nan_count += 1;
        } else if value < self.valid_minimum {
            self.under_range_count += 1;
        } else if value > self.valid_maximum {
            self.over_range_count += 1;
        } else {
            self.sum += value;
            self.sum_sum += value * value;
            self.valid_count += 1;
            self.minimum = self.minimum.min(value);
            self.maximum = self.maximum.max(value);
        }
    }

    pub fn add_data_slice(&mut self, values: &[f64]) {
        for &v in values {
            self.add_data(v);
        }
    }

    /// Remove a previously added value. Extrema become unavailable afterwards.
    pub fn remove_data(&mut self, value: f64) {
        self.total_count -= 1;
        if !value.is_finite() {
            self.nan_count -= 1;
        } else if value < self.valid_minimum {
            self.under_range_count -= 1;
        } else if value > self.valid_maximum {
            self.over_range_count -= 1;
        } else {
            self.sum -= value;
            self.sum_sum -= value * value;
            self.valid_count -= 1;
        }
        self.removed_data = true;
    }

    pub fn sum(&self) -> f64 {
        self.sum
    }

    pub fn sum_square(&self) -> f64 {
        self.sum_sum
    }

    pub fn valid_count(&self) -> i64 {
        self.valid_count
    }

    pub fn total_count(&self) -> i64 {
        self.total_count
    }

    pub fn nan_count(&self) -> i64 {
        self.nan_count
    }

    pub fn under_range_count(&self) -> i64 {
        self.under_range_count
    }

    pub fn over_range_count(&self) -> i64 {
        self.over_range_count
    }

    pub fn removed_data(&self) -> bool {
        self.removed_data
    }

    pub fn valid_minimum(&self) -> f64 {
        self.valid_minimum
    }

    pub fn valid_maximum(&self) -> f64 {
        self.valid_maximum
    }

    pub fn average(&self) -> Option<f64> {
        (self.valid_count > 0).then(|| self.sum / self.valid_count as f64)
    }

    /// Sample variance.
    pub fn variance(&self) -> Option<f64> {
        if self.valid_count < 2 {
            return None;
        }
        let n = self.valid_count as f64;
        let var = (self.sum_sum - self.sum * self.sum / n) / (n - 1.0);
        Some(var.max(0.0))
    }

    pub fn standard_deviation(&self) -> Option<f64> {
        self.variance().map(f64::sqrt)
    }

    /// Root mean square.
    pub fn rms(&self) -> Option<f64> {
        (self.valid_count > 0).then(|| (self.sum_sum / self.valid_count as f64).sqrt())
    }

    pub fn minimum(&self) -> Result<f64> {
        self.check_extrema()?;
        Ok(self.minimum)
    }

    pub fn maximum(&self) -> Result<f64> {
        self.check_extrema()?;
        Ok(self.maximum)
    }

    /// Number of standard deviations `value` lies from the mean.
    pub fn z_score(&self, value: f64) -> Option<f64> {
        let mean = self.average()?;
        let std = self.standard_deviation()?;
        (std > 0.0).then(|| (value - mean) / std)
    }

    fn check_extrema(&self) -> Result<()> {
        if self.removed_data {
            return Err(CoreError::InvalidState(
                "The minimum and maximum are invalid since data has been removed".to_string(),
            ));
        }
        if self.valid_count == 0 {
            return Err(CoreError::InvalidState("No valid data has been accumulated".to_string()));
        }
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Serialization
    // ─────────────────────────────────────────────────────────────────────────

    pub fn to_xml(&self, name: &str) -> XmlElement {
        XmlElement::new(name)
            .with_child(leaf("sum", self.sum))
            .with_child(leaf("sumSquares", self.sum_sum))
            .with_child(
                XmlElement::new("range")
                    .with_child(leaf("minimum", self.minimum))
                    .with_child(leaf("maximum", self.maximum))
                    .with_child(leaf("validMinimum", self.valid_minimum))
                    .with_child(leaf("validMaximum", self.valid_maximum)),
            )
            .with_child(leaf("totalPixels", self.total_count))
            .with_child(leaf("validPixels", self.valid_count))
            .with_child(leaf("nullPixels", self.nan_count))
            .with_child(leaf("underRangePixels", self.under_range_count))
            .with_child(leaf("overRangePixels", self.over_range_count))
            .with_child(leaf("removedData", self.removed_data))
    }

    pub fn from_xml(element: &XmlElement) -> Result<Self> {
        let range = element.require_child("range")?;
        Ok(Self {
            sum: element.child_f64("sum")?,
            sum_sum: element.child_f64("sumSquares")?,
            minimum: range.child_f64("minimum")?,
            maximum: range.child_f64("maximum")?,
            valid_minimum: range.child_f64("validMinimum")?,
            valid_maximum: range.child_f64("validMaximum")?,
            total_count: element.child_i64("totalPixels")?,
            valid_count: element.child_i64("validPixels")?,
            nan_count: element.child_i64("nullPixels")?,
            under_range_count: element.child_i64("underRangePixels")?,
            over_range_count: element.child_i64("overRangePixels")?,
            removed_data: element.require_child("removedData")?.text_bool()?,
        })
    }

    pub fn write_binary(&self, w: &mut ByteWriter) -> Result<()> {
        w.put_f64(self.sum)?;
        w.put_f64(self.sum_sum)?;
        w.put_f64(self.minimum)?;
        w.put_f64(self.maximum)?;
        w.put_f64(self.valid_minimum)?;
        w.put_f64(self.valid_maximum)?;
        w.put_i64(self.total_count)?;
        w.put_i64(self.valid_count)?;
        w.put_i64(self.nan_count)?;
        w.put_i64(self.under_range_count)?;
        w.put_i64(self.over_range_count)?;
        w.put_bool(self.removed_data)?;
        Ok(())
    }

    pub fn read_binary(r: &mut ByteReader<'_>) -> Result<Self> {
        Ok(Self {
            sum: r.f64()?,
            sum_sum: r.f64()?,
            minimum: r.f64()?,
            maximum: r.f64()?,
            valid_minimum: r.f64()?,
            valid_maximum: r.f64()?,
            total_count: r.i64()?,
            valid_count: r.i64()?,
            nan_count: r.i64()?,
            under_range_count: r.i64()?,
            over_range_count: r.i64()?,
            removed_data: r.bool()?,
        })
    }

    /// Fixed record layout used for per-image statistics datasets.
    pub fn compound_fields() -> Vec<CompoundField> {
        vec![
            CompoundField::new("Sum", FieldKind::Double),
            CompoundField::new("SumSquared", FieldKind::Double),
            CompoundField::new("Minimum", FieldKind::Double),
            CompoundField::new("Maximum", FieldKind::Double),
            CompoundField::new("ValidMinimum", FieldKind::Double),
            CompoundField::new("ValidMaximum", FieldKind::Double),
            CompoundField::new("TotalPixels", FieldKind::Int),
            CompoundField::new("ValidPixels", FieldKind::Int),
            CompoundField::new("NullPixels", FieldKind::Int),
            CompoundField::new("UnderRangePixels", FieldKind::Int),
            CompoundField::new("OverRangePixels", FieldKind::Int),
            CompoundField::new("RemovedData", FieldKind::Bool),
        ]
    }

    pub fn to_record(&self) -> Vec<FieldValue> {
        vec![
            FieldValue::Double(self.sum),
            FieldValue::Double(self.sum_sum),
            FieldValue::Double(self.minimum),
            FieldValue::Double(self.maximum),
            FieldValue::Double(self.valid_minimum),
            FieldValue::Double(self.valid_maximum),
            FieldValue::Int(self.total_count),
            FieldValue::Int(self.valid_count),
            FieldValue::Int(self.nan_count),
            FieldValue::Int(self.under_range_count),
            FieldValue::Int(self.over_range_count),
            FieldValue::Bool(self.removed_data),
        ]
    }

    pub fn from_record(dataset: &Dataset, index: usize) -> Result<Self> {
        Ok(Self {
            sum: dataset.f64(index, "Sum")?,
            sum_sum: dataset.f64(index, "SumSquared")?,
            minimum: dataset.f64(index, "Minimum")?,
            maximum: dataset.f64(index, "Maximum")?,
            valid_minimum: dataset.f64(index, "ValidMinimum")?,
            valid_maximum: dataset.f64(index, "ValidMaximum")?,
            total_count: dataset.i64(index, "TotalPixels")?,
            valid_count: dataset.i64(index, "ValidPixels")?,
            nan_count: dataset.i64(index, "NullPixels")?,
            under_range_count: dataset.i64(index, "UnderRangePixels")?,
            over_range_count: dataset.i64(index, "OverRangePixels")?,
            removed_data: dataset.bool(index, "RemovedData")?,
        })
    }
}
