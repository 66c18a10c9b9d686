//! Bundle adjustment settings.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::ml_wfunctions::MaximumLikelihoodModel;
use super::observation::ObservationSolveSettings;
use crate::error::{CoreError, Result};

/// At most this many robust estimation tiers can be chained.
pub const MAX_MAXIMUM_LIKELIHOOD_TIERS: usize = 3;

/// Quantity tested for convergence at the end of each iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConvergenceCriteria {
    /// Change of sigma0 between iterations.
    #[default]
    Sigma0,
    /// Magnitude of the parameter corrections.
    ParameterCorrections,
}

impl ConvergenceCriteria {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sigma0 => "Sigma0",
            Self::ParameterCorrections => "ParameterCorrections",
        }
    }

    pub fn from_name(name: &str) -> Result<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "sigma0" => Ok(Self::Sigma0),
            "parametercorrections" => Ok(Self::ParameterCorrections),
            _ => Err(CoreError::InvalidState(format!("Unknown convergence criteria [{}]", name))),
        }
    }
}

impl fmt::Display for ConvergenceCriteria {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One robust estimation tier: a weighting model and the residual quantile
/// its tweaking constant is taken from.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MaximumLikelihoodTier {
    pub model: MaximumLikelihoodModel,
    pub quantile: f64,
}

impl MaximumLikelihoodTier {
    /// Tier using the model's default quantile.
    pub fn new(model: MaximumLikelihoodModel) -> Self {
        Self {
            model,
            quantile: model.default_quantile(),
        }
    }
}

/// Settings of one bundle adjustment run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BundleSettings {
    pub convergence_criteria: ConvergenceCriteria,
    pub convergence_threshold: f64,
    pub max_iterations: u32,

    /// Automatically flag measures whose residual exceeds the rejection limit.
    pub outlier_rejection: bool,
    /// Multiple of the scaled median absolute deviation above the median
    /// residual at which measures are rejected.
    pub outlier_rejection_multiplier: f64,

    /// Compute adjusted sigmas after convergence.
    pub error_propagation: bool,
    pub solve_radius: bool,

    /// Apriori point sigmas in meters applied to points without their own covariance.
    pub global_latitude_aprioris_sigma: Option<f64>,
    pub global_longitude_aprioris_sigma: Option<f64>,
    pub global_radius_aprioris_sigma: Option<f64>,

    /// Robust estimation tiers, applied in order.
    pub maximum_likelihood: Vec<MaximumLikelihoodTier>,

    /// Per-instrument solve options; the first match wins.
    pub observation_solve_settings: Vec<ObservationSolveSettings>,
}

impl Default for BundleSettings {
    fn default() -> Self {
        Self {
            convergence_criteria: ConvergenceCriteria::Sigma0,
            convergence_threshold: 1e-10,
            max_iterations: 50,
            outlier_rejection: false,
            outlier_rejection_multiplier: 3.0,
            error_propagation: false,
            solve_radius: false,
            global_latitude_aprioris_sigma: None,
            global_longitude_aprioris_sigma: None,
            global_radius_aprioris_sigma: None,
            maximum_likelihood: Vec::new(),
            observation_solve_settings: vec![ObservationSolveSettings::default()],
        }
    }
}

impl BundleSettings {
    /// Replace the robust estimation tiers.
    pub fn set_maximum_likelihood(&mut self, tiers: Vec<MaximumLikelihoodTier>) -> Result<()> {
        validate_tiers(&tiers)?;
        self.maximum_likelihood = tiers;
        Ok(())
    }

    /// Check values that cannot be expressed in the type, e.g. after
    /// deserializing from a config file.
    pub fn validate(&self) -> Result<()> {
        validate_tiers(&self.maximum_likelihood)?;
        if self.convergence_threshold <= 0.0 {
            return Err(CoreError::InvalidState(format!(
                "Convergence threshold must be positive, got [{}]",
                self.convergence_threshold
            )));
        }
        if self.outlier_rejection && self.outlier_rejection_multiplier <= 0.0 {
            return Err(CoreError::InvalidState(format!(
                "Outlier rejection multiplier must be positive, got [{}]",
                self.outlier_rejection_multiplier
            )));
        }
        Ok(())
    }
}

fn validate_tiers(tiers: &[MaximumLikelihoodTier]) -> Result<()> {
    if tiers.len() > MAX_MAXIMUM_LIKELIHOOD_TIERS {
        return Err(CoreError::InvalidState(format!(
            "At most {} maximum likelihood models may be chained, got {}",
            MAX_MAXIMUM_LIKELIHOOD_TIERS,
            tiers.len()
        )));
    }
    for tier in tiers {
        if !(tier.quantile > 0.0 && tier.quantile < 1.0) {
            return Err(CoreError::InvalidState(format!(
                "Maximum likelihood quantile must be in (0, 1), got [{}] for {}",
                tier.quantile, tier.model
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = BundleSettings::default();
        assert_eq!(settings.convergence_criteria, ConvergenceCriteria::Sigma0);
        assert_eq!(settings.max_iterations, 50);
        assert_eq!(settings.outlier_rejection_multiplier, 3.0);
        assert!(settings.maximum_likelihood.is_empty());
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_at_most_three_tiers() {
        let mut settings = BundleSettings::default();
        let tiers = vec![
            MaximumLikelihoodTier::new(MaximumLikelihoodModel::Huber),
            MaximumLikelihoodTier::new(MaximumLikelihoodModel::Welsch),
            MaximumLikelihoodTier::new(MaximumLikelihoodModel::Chen),
        ];
        settings.set_maximum_likelihood(tiers.clone()).unwrap();

        let mut four = tiers;
        four.push(MaximumLikelihoodTier::new(MaximumLikelihoodModel::Huber));
        assert!(matches!(
            settings.set_maximum_likelihood(four),
            Err(CoreError::InvalidState(_))
        ));
        assert_eq!(settings.maximum_likelihood.len(), 3);
    }

    #[test]
    fn test_quantile_range() {
        let mut settings = BundleSettings::default();
        let tier = MaximumLikelihoodTier {
            model: MaximumLikelihoodModel::Huber,
            quantile: 1.5,
        };
        assert!(settings.set_maximum_likelihood(vec![tier]).is_err());
    }

    #[test]
    fn test_yaml_partial_settings() {
        let yaml = "convergence_criteria: ParameterCorrections\n\
                    max_iterations: 10\n\
                    maximum_likelihood:\n  - model: Chen\n    quantile: 0.9\n";
        let settings: BundleSettings = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(settings.convergence_criteria, ConvergenceCriteria::ParameterCorrections);
        assert_eq!(settings.max_iterations, 10);
        assert_eq!(settings.maximum_likelihood[0].model, MaximumLikelihoodModel::Chen);
        assert_eq!(settings.convergence_threshold, 1e-10);
    }

    #[test]
    fn test_criteria_names() {
        assert_eq!(
            ConvergenceCriteria::from_name("parametercorrections").unwrap(),
            ConvergenceCriteria::ParameterCorrections
        );
        assert_eq!(ConvergenceCriteria::Sigma0.to_string(), "Sigma0");
        assert!(ConvergenceCriteria::from_name("Gradient").is_err());
    }
}
