//! Dynamic cumulative probability distribution.
//!
//! Estimates quantiles of a stream without storing it, using the P² algorithm
//! (Jain & Chlamtac) generalized to `n` equally spaced markers. Marker `i`
//! tracks the `i / (n - 1)` quantile. Until `n` observations have arrived the
//! raw values are kept and interpolated directly.

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::io::binary::{ByteReader, ByteWriter};
use crate::io::xml::XmlElement;

/// Node count giving one marker per percentile.
pub const PERCENTILE_NODES: usize = 101;

const MIN_NODES: usize = 3;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CumulativeProbabilityCalculator {
    /// Target cumulative probability of each marker.
    quantiles: Vec<f64>,
    /// Marker heights; raw sorted-on-completion values during the initial fill.
    heights: Vec<f64>,
    /// Actual 1-based marker positions (observations at or below each marker).
    positions: Vec<f64>,
    number_observations: u64,
}

impl Default for CumulativeProbabilityCalculator {
    fn default() -> Self {
        Self::new(PERCENTILE_NODES)
    }
}

impl CumulativeProbabilityCalculator {
    /// `nodes` below three are raised to three.
    pub fn new(nodes: usize) -> Self {
        let mut calc = Self {
            quantiles: Vec::new(),
            heights: Vec::new(),
            positions: Vec::new(),
            number_observations: 0,
        };
        calc.set_quantiles(nodes);
        calc
    }

    /// Reset to `nodes` empty markers.
    pub fn set_quantiles(&mut self, nodes: usize) {
        let nodes = nodes.max(MIN_NODES);
        let step = 1.0 / (nodes - 1) as f64;
        self.quantiles = (0..nodes).map(|i| i as f64 * step).collect();
        // Exact end points regardless of rounding in the step.
        self.quantiles[nodes - 1] = 1.0;
        self.heights = Vec::with_capacity(nodes);
        self.positions = vec![0.0; nodes];
        self.number_observations = 0;
    }

    pub fn number_quantiles(&self) -> usize {
        self.quantiles.len()
    }

    pub fn number_observations(&self) -> u64 {
        self.number_observations
    }

    fn filling(&self) -> bool {
        (self.number_observations as usize) < self.quantiles.len()
    }

    pub fn add_observation(&mut self, x: f64) {
        if !x.is_finite() {
            return;
        }
        let n = self.quantiles.len();

        if self.filling() {
            self.heights.push(x);
            self.number_observations += 1;
            if !self.filling() {
                self.heights.sort_by(f64::total_cmp);
                for (i, p) in self.positions.iter_mut().enumerate() {
                    *p = (i + 1) as f64;
                }
            }
            return;
        }

        // Cell containing x; extremes move the end markers.
        let k = if x < self.heights[0] {
            self.heights[0] = x;
            0
        } else if x >= self.heights[n - 1] {
            self.heights[n - 1] = x;
            n - 2
        } else {
            let mut k = 0;
            while k + 1 < n - 1 && x >= self.heights[k + 1] {
                k += 1;
            }
            k
        };

        for p in self.positions.iter_mut().skip(k + 1) {
            *p += 1.0;
        }
        self.number_observations += 1;

        let total = self.number_observations as f64;
        for i in 1..n - 1 {
            let desired = 1.0 + self.quantiles[i] * (total - 1.0);
            let d = desired - self.positions[i];
            let room_up = self.positions[i + 1] - self.positions[i] > 1.0;
            let room_down = self.positions[i - 1] - self.positions[i] < -1.0;
            if (d >= 1.0 && room_up) || (d <= -1.0 && room_down) {
                let s = d.signum();
                let candidate = self.parabolic(i, s);
                let monotone =
                    self.heights[i - 1] < candidate && candidate < self.heights[i + 1];
                self.heights[i] = if monotone { candidate } else { self.linear(i, s) };
                self.positions[i] += s;
            }
        }
    }

    fn parabolic(&self, i: usize, s: f64) -> f64 {
        let (q, n) = (&self.heights, &self.positions);
        q[i] + s / (n[i + 1] - n[i - 1])
            * ((n[i] - n[i - 1] + s) * (q[i + 1] - q[i]) / (n[i + 1] - n[i])
                + (n[i + 1] - n[i] - s) * (q[i] - q[i - 1]) / (n[i] - n[i - 1]))
    }

    fn linear(&self, i: usize, s: f64) -> f64 {
        let j = if s > 0.0 { i + 1 } else { i - 1 };
        let slope = (self.heights[j] - self.heights[i]) / (self.positions[j] - self.positions[i]);
        self.heights[i] + s * slope
    }

    /// Value below which `cumulative_probability` of the observations fall.
    pub fn value(&self, cumulative_probability: f64) -> Result<f64> {
        if !(0.0..=1.0).contains(&cumulative_probability) {
            return Err(CoreError::InvalidState(format!(
                "Cumulative probability [{}] must be within [0, 1]",
                cumulative_probability
            )));
        }
        if self.number_observations == 0 {
            return Err(CoreError::InvalidState(
                "No observations have been added to the cumulative probability distribution".to_string(),
            ));
        }

        if self.filling() {
            let mut sorted = self.heights.clone();
            sorted.sort_by(f64::total_cmp);
            return Ok(interpolate_sorted(&sorted, cumulative_probability));
        }

        let n = self.quantiles.len();
        let i = ((cumulative_probability * (n - 1) as f64).floor() as usize).min(n - 2);
        let (p0, p1) = (self.quantiles[i], self.quantiles[i + 1]);
        let t = (cumulative_probability - p0) / (p1 - p0);
        Ok(self.heights[i] + t * (self.heights[i + 1] - self.heights[i]))
    }

    /// Fraction of observations at or below `value`.
    pub fn cumulative_probability(&self, value: f64) -> Result<f64> {
        if self.number_observations == 0 {
            return Err(CoreError::InvalidState(
                "No observations have been added to the cumulative probability distribution".to_string(),
            ));
        }
        let (heights, probs): (Vec<f64>, Vec<f64>) = if self.filling() {
            let mut sorted = self.heights.clone();
            sorted.sort_by(f64::total_cmp);
            let m = sorted.len();
            let probs = (0..m)
                .map(|i| if m == 1 { 1.0 } else { i as f64 / (m - 1) as f64 })
                .collect();
            (sorted, probs)
        } else {
            (self.heights.clone(), self.quantiles.clone())
        };

        if value < heights[0] {
            return Ok(0.0);
        }
        let last = heights.len() - 1;
        if value >= heights[last] {
            return Ok(1.0);
        }
        let mut i = 0;
        while i + 1 < last && value >= heights[i + 1] {
            i += 1;
        }
        let span = heights[i + 1] - heights[i];
        if span <= 0.0 {
            return Ok(probs[i + 1]);
        }
        Ok(probs[i] + (value - heights[i]) / span * (probs[i + 1] - probs[i]))
    }

    pub fn min(&self) -> Result<f64> {
        self.value(0.0)
    }

    pub fn max(&self) -> Result<f64> {
        self.value(1.0)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Serialization
    // ─────────────────────────────────────────────────────────────────────────

    pub fn to_xml(&self, name: &str) -> XmlElement {
        let mut data = XmlElement::new("distributionData");
        for (i, height) in self.heights.iter().enumerate() {
            data.push(
                XmlElement::new("quantileInfo")
                    .with_attr("quantile", self.quantiles[i])
                    .with_attr("dataValue", height)
                    .with_attr("actualNumObsBelowQuantile", self.positions[i]),
            );
        }
        XmlElement::new(name)
            .with_attr("numberQuantiles", self.quantiles.len())
            .with_attr("numberObservations", self.number_observations)
            .with_child(data)
    }

    pub fn from_xml(element: &XmlElement) -> Result<Self> {
        let nodes = element.attr_i64("numberQuantiles")?.max(0) as usize;
        let mut calc = Self::new(nodes);
        calc.number_observations = element.attr_i64("numberObservations")?.max(0) as u64;
        let data = element.require_child("distributionData")?;
        for (i, info) in data.children_named("quantileInfo").enumerate() {
            if i >= calc.quantiles.len() {
                return Err(CoreError::Xml(format!(
                    "More quantile entries than the declared {} quantiles",
                    calc.quantiles.len()
                )));
            }
            calc.heights.push(info.attr_f64("dataValue")?);
            calc.positions[i] = info.attr_f64("actualNumObsBelowQuantile")?;
        }
        calc.validate()?;
        Ok(calc)
    }

    pub fn write_binary(&self, w: &mut ByteWriter) -> Result<()> {
        w.put_u32(self.quantiles.len() as u32)?;
        w.put_u64(self.number_observations)?;
        w.put_u32(self.heights.len() as u32)?;
        for h in &self.heights {
            w.put_f64(*h)?;
        }
        for p in &self.positions {
            w.put_f64(*p)?;
        }
        Ok(())
    }

    pub fn read_binary(r: &mut ByteReader<'_>) -> Result<Self> {
        let nodes = r.u32()? as usize;
        let mut calc = Self::new(nodes);
        calc.number_observations = r.u64()?;
        let len = r.u32()? as usize;
        if len > calc.quantiles.len() {
            return Err(r.invalid(format!(
                "Distribution holds {} values for {} quantiles",
                len, nodes
            )));
        }
        for _ in 0..len {
            calc.heights.push(r.f64()?);
        }
        for i in 0..calc.quantiles.len() {
            calc.positions[i] = r.f64()?;
        }
        calc.validate()?;
        Ok(calc)
    }

    fn validate(&self) -> Result<()> {
        let expected = (self.number_observations as usize).min(self.quantiles.len());
        if self.heights.len() != expected {
            return Err(CoreError::InvalidState(format!(
                "Distribution declares {} observations but stores {} values",
                self.number_observations,
                self.heights.len()
            )));
        }
        Ok(())
    }
}

fn interpolate_sorted(sorted: &[f64], p: f64) -> f64 {
    if sorted.len() == 1 {
        return sorted[0];
    }
    let pos = p * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = (lo + 1).min(sorted.len() - 1);
    let t = pos - lo as f64;
    sorted[lo] + t * (sorted[hi] - sorted[lo])
}
