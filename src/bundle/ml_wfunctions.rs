//! Maximum likelihood weighting functions for robust estimation.
//!
//! Each model scales the weight of an observation by a function of its
//! residual `r` and a tweaking constant `c`:
//!
//! | model | weight scaler |
//! |-------|---------------|
//! | Huber | `1` if `|r| < c`, else `c/|r|` |
//! | HuberModified | `sin(r/c)/(r/c)` if `|r/c| < π/2`, else `c/(|r|·π/2)` |
//! | Welsch | `exp(-(r/c)²)` |
//! | Chen | `(1-(r/c)²)²` if `|r| <= c`, else `0` |
//!
//! The tweaking constant is re-derived each iteration from the residual
//! distribution at the model's quantile.

use std::f64::consts::FRAC_PI_2;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

/// Robust weighting model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MaximumLikelihoodModel {
    Huber,
    HuberModified,
    Welsch,
    Chen,
}

impl MaximumLikelihoodModel {
    /// Case-insensitive parse of a model name.
    pub fn from_name(name: &str) -> Result<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "huber" => Ok(Self::Huber),
            "huber_modified" | "hubermodified" => Ok(Self::HuberModified),
            "welsch" => Ok(Self::Welsch),
            "chen" => Ok(Self::Chen),
            _ => Err(CoreError::InvalidState(format!(
                "Unknown maximum likelihood model [{}]",
                name
            ))),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Huber => "Huber",
            Self::HuberModified => "HuberModified",
            Self::Welsch => "Welsch",
            Self::Chen => "Chen",
        }
    }

    /// Residual quantile used to set the tweaking constant when none is configured.
    pub fn default_quantile(&self) -> f64 {
        match self {
            Self::Huber | Self::HuberModified => 0.5,
            Self::Welsch => 0.7,
            Self::Chen => 0.9,
        }
    }

    pub fn code(&self) -> i32 {
        match self {
            Self::Huber => 0,
            Self::HuberModified => 1,
            Self::Welsch => 2,
            Self::Chen => 3,
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(Self::Huber),
            1 => Some(Self::HuberModified),
            2 => Some(Self::Welsch),
            3 => Some(Self::Chen),
            _ => None,
        }
    }
}

impl fmt::Display for MaximumLikelihoodModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A weighting model with its current tweaking constant.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MaximumLikelihoodWFunctions {
    model: MaximumLikelihoodModel,
    tweaking_constant: f64,
}

impl MaximumLikelihoodWFunctions {
    /// New function with a tweaking constant of 1.
    pub fn new(model: MaximumLikelihoodModel) -> Self {
        Self {
            model,
            tweaking_constant: 1.0,
        }
    }

    pub fn with_tweaking_constant(
        model: MaximumLikelihoodModel,
        tweaking_constant: f64,
    ) -> Result<Self> {
        let mut f = Self::new(model);
        f.set_tweaking_constant(tweaking_constant)?;
        Ok(f)
    }

    pub fn model(&self) -> MaximumLikelihoodModel {
        self.model
    }

    pub fn tweaking_constant(&self) -> f64 {
        self.tweaking_constant
    }

    /// The constant must be positive and finite.
    pub fn set_tweaking_constant(&mut self, c: f64) -> Result<()> {
        if !(c.is_finite() && c > 0.0) {
            return Err(CoreError::InvalidState(format!(
                "Maximum likelihood tweaking constant must be positive, got [{}]",
                c
            )));
        }
        self.tweaking_constant = c;
        Ok(())
    }

    pub fn tweaking_constant_quantile(&self) -> f64 {
        self.model.default_quantile()
    }

    /// Factor applied to the observation weight for residual `r`.
    pub fn weight_scaler(&self, r: f64) -> f64 {
        let c = self.tweaking_constant;
        match self.model {
            MaximumLikelihoodModel::Huber => {
                if r.abs() < c {
                    1.0
                } else {
                    c / r.abs()
                }
            }
            MaximumLikelihoodModel::HuberModified => {
                let rc = r / c;
                if rc == 0.0 {
                    1.0
                } else if rc.abs() < FRAC_PI_2 {
                    rc.sin() / rc
                } else {
                    c / (r.abs() * FRAC_PI_2)
                }
            }
            MaximumLikelihoodModel::Welsch => {
                let rc = r / c;
                (-(rc * rc)).exp()
            }
            MaximumLikelihoodModel::Chen => {
                if r.abs() <= c {
                    let rc = r / c;
                    let t = 1.0 - rc * rc;
                    t * t
                } else {
                    0.0
                }
            }
        }
    }

    /// Square root of [`Self::weight_scaler`], applied to design matrix rows.
    pub fn sqrt_weight_scaler(&self, r: f64) -> f64 {
        self.weight_scaler(r).max(0.0).sqrt()
    }

    /// Residual beyond which the observation carries no weight, if the model has one.
    pub fn weighted_residual_cutoff(&self) -> Option<f64> {
        match self.model {
            MaximumLikelihoodModel::Chen => Some(self.tweaking_constant),
            _ => None,
        }
    }
}

impl fmt::Display for MaximumLikelihoodWFunctions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (c = {})", self.model, self.tweaking_constant)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn with_c(model: MaximumLikelihoodModel, c: f64) -> MaximumLikelihoodWFunctions {
        MaximumLikelihoodWFunctions::with_tweaking_constant(model, c).unwrap()
    }

    #[test]
    fn test_huber() {
        let f = with_c(MaximumLikelihoodModel::Huber, 2.0);
        assert_eq!(f.weight_scaler(1.0), 1.0);
        assert_relative_eq!(f.weight_scaler(-4.0), 0.5);
        assert!(f.weighted_residual_cutoff().is_none());
    }

    #[test]
    fn test_huber_modified() {
        let f = with_c(MaximumLikelihoodModel::HuberModified, 1.0);
        assert_eq!(f.weight_scaler(0.0), 1.0);
        assert_relative_eq!(f.weight_scaler(1.0), 1.0_f64.sin());
        assert_relative_eq!(f.weight_scaler(4.0), 1.0 / (4.0 * FRAC_PI_2));
    }

    #[test]
    fn test_welsch_and_chen() {
        let welsch = with_c(MaximumLikelihoodModel::Welsch, 2.0);
        assert_relative_eq!(welsch.weight_scaler(2.0), (-1.0_f64).exp());

        let chen = with_c(MaximumLikelihoodModel::Chen, 2.0);
        assert_relative_eq!(chen.weight_scaler(1.0), 0.5625);
        assert_eq!(chen.weight_scaler(2.0), 0.0);
        assert_eq!(chen.weight_scaler(2.5), 0.0);
        assert_eq!(chen.weighted_residual_cutoff(), Some(2.0));
        assert_relative_eq!(chen.sqrt_weight_scaler(1.0), 0.75);
    }

    #[test]
    fn test_default_quantiles() {
        assert_eq!(MaximumLikelihoodModel::Huber.default_quantile(), 0.5);
        assert_eq!(MaximumLikelihoodModel::HuberModified.default_quantile(), 0.5);
        assert_eq!(MaximumLikelihoodModel::Welsch.default_quantile(), 0.7);
        assert_eq!(MaximumLikelihoodModel::Chen.default_quantile(), 0.9);
    }

    #[test]
    fn test_model_names() {
        assert_eq!(
            MaximumLikelihoodModel::from_name("WELSCH").unwrap(),
            MaximumLikelihoodModel::Welsch
        );
        assert_eq!(
            MaximumLikelihoodModel::from_name("huber_modified").unwrap(),
            MaximumLikelihoodModel::HuberModified
        );
        assert!(MaximumLikelihoodModel::from_name("Cauchy").is_err());
        assert_eq!(MaximumLikelihoodModel::Chen.to_string(), "Chen");
    }

    #[test]
    fn test_invalid_tweaking_constant() {
        let mut f = MaximumLikelihoodWFunctions::new(MaximumLikelihoodModel::Huber);
        assert!(f.set_tweaking_constant(0.0).is_err());
        assert!(f.set_tweaking_constant(f64::NAN).is_err());
        assert_eq!(f.tweaking_constant(), 1.0);
    }
}
