//! Correlation matrix of the solved parameters.
//!
//! The matrix itself lives in files written after error propagation; this
//! type records where they are and which parameters belong to which image.

use std::collections::BTreeMap;

use nalgebra::DMatrix;

use crate::error::{CoreError, Result};
use crate::io::xml::{leaf, XmlElement};
use crate::pvl::{PvlContainer, PvlGroup, PvlKeyword, PvlObject};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CorrelationMatrix {
    pub correlation_file_name: String,
    pub covariance_file_name: String,
    /// Image serial number to its ordered parameter names.
    pub images_and_parameters: BTreeMap<String, Vec<String>>,
}

impl CorrelationMatrix {
    pub fn new(
        correlation_file_name: impl Into<String>,
        covariance_file_name: impl Into<String>,
    ) -> Self {
        Self {
            correlation_file_name: correlation_file_name.into(),
            covariance_file_name: covariance_file_name.into(),
            images_and_parameters: BTreeMap::new(),
        }
    }

    /// Both backing files are known.
    pub fn is_valid(&self) -> bool {
        !self.correlation_file_name.is_empty() && !self.covariance_file_name.is_empty()
    }

    pub fn set_image_parameters(&mut self, image: impl Into<String>, parameters: Vec<String>) {
        self.images_and_parameters.insert(image.into(), parameters);
    }

    pub fn number_parameters(&self) -> usize {
        self.images_and_parameters.values().map(Vec::len).sum()
    }

    /// Normalize a covariance matrix: `corr(i, j) = cov(i, j) / (σᵢ σⱼ)`.
    ///
    /// Parameters with zero variance get zero correlation with everything,
    /// including themselves.
    pub fn correlation_from_covariance(covariance: &DMatrix<f64>) -> Result<DMatrix<f64>> {
        if !covariance.is_square() {
            return Err(CoreError::InvalidState(format!(
                "Covariance matrix must be square, got {}x{}",
                covariance.nrows(),
                covariance.ncols()
            )));
        }
        let sigmas: Vec<f64> = covariance.diagonal().iter().map(|v| v.max(0.0).sqrt()).collect();
        Ok(DMatrix::from_fn(covariance.nrows(), covariance.ncols(), |i, j| {
            let denominator = sigmas[i] * sigmas[j];
            if denominator > 0.0 {
                covariance[(i, j)] / denominator
            } else {
                0.0
            }
        }))
    }

    pub fn pvl_object(&self) -> PvlObject {
        let mut object = PvlObject::new("CorrelationMatrixData");
        object.add_keyword(PvlKeyword::with_value(
            "CovarianceMatrixFileName",
            self.covariance_file_name.as_str(),
        ));
        object.add_keyword(PvlKeyword::with_value(
            "CorrelationMatrixFileName",
            self.correlation_file_name.as_str(),
        ));

        let mut group = PvlGroup::new("ImagesAndParameters");
        for (image, parameters) in &self.images_and_parameters {
            let mut keyword = PvlKeyword::new(image.as_str());
            for parameter in parameters {
                keyword.add_value(parameter.as_str());
            }
            group.add_keyword(keyword);
        }
        object.add_group(group);
        object
    }

    pub fn to_xml(&self) -> XmlElement {
        let mut images = XmlElement::new("imagesAndParameters");
        for (image, parameters) in &self.images_and_parameters {
            let mut element = XmlElement::new("image").with_attr("id", image);
            for parameter in parameters {
                element.push(leaf("parameter", parameter));
            }
            images.push(element);
        }
        XmlElement::new("correlationMatrix")
            .with_attr("correlationFileName", &self.correlation_file_name)
            .with_attr("covarianceFileName", &self.covariance_file_name)
            .with_child(images)
    }

    pub fn from_xml(element: &XmlElement) -> Result<Self> {
        let mut matrix = Self::new(
            element.attr("correlationFileName").unwrap_or_default(),
            element.attr("covarianceFileName").unwrap_or_default(),
        );
        if let Some(images) = element.child("imagesAndParameters") {
            for image in images.children_named("image") {
                let parameters = image
                    .children_named("parameter")
                    .map(|p| p.text.clone())
                    .collect();
                matrix.set_image_parameters(image.require_attr("id")?, parameters);
            }
        }
        Ok(matrix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn matrix() -> CorrelationMatrix {
        let mut m = CorrelationMatrix::new("corr.dat", "cov.dat");
        m.set_image_parameters("IMG2", vec!["RA".into(), "DEC".into()]);
        m.set_image_parameters("IMG1", vec!["X".into(), "Y".into(), "Z".into()]);
        m
    }

    #[test]
    fn test_validity() {
        assert!(!CorrelationMatrix::default().is_valid());
        assert!(!CorrelationMatrix::new("corr.dat", "").is_valid());
        assert!(matrix().is_valid());
        assert_eq!(matrix().number_parameters(), 5);
    }

    #[test]
    fn test_pvl_object() {
        let pvl = matrix().pvl_object();
        assert_eq!(pvl.name, "CorrelationMatrixData");
        assert_eq!(pvl.first_value("CovarianceMatrixFileName"), Some("cov.dat"));
        let group = pvl.group("ImagesAndParameters").unwrap();
        assert_eq!(group.keywords[0].name(), "IMG1");
        assert_eq!(group.keyword("IMG2").unwrap().len(), 2);
    }

    #[test]
    fn test_clone_is_independent() {
        let original = matrix();
        let mut copy = original.clone();
        copy.set_image_parameters("IMG3", vec![]);
        copy.correlation_file_name.clear();
        assert_eq!(original.images_and_parameters.len(), 2);
        assert!(original.is_valid());
    }

    #[test]
    fn test_xml_round_trip() {
        let m = matrix();
        let text = m.to_xml().to_xml_string().unwrap();
        let parsed = CorrelationMatrix::from_xml(&XmlElement::parse(&text).unwrap()).unwrap();
        assert_eq!(parsed, m);
    }

    #[test]
    fn test_correlation_from_covariance() {
        let cov = DMatrix::from_row_slice(3, 3, &[4.0, 2.0, 0.0, 2.0, 9.0, 0.0, 0.0, 0.0, 0.0]);
        let corr = CorrelationMatrix::correlation_from_covariance(&cov).unwrap();
        assert_relative_eq!(corr[(0, 0)], 1.0);
        assert_relative_eq!(corr[(0, 1)], 2.0 / 6.0);
        assert_eq!(corr[(2, 2)], 0.0);
        assert!(CorrelationMatrix::correlation_from_covariance(&DMatrix::zeros(2, 3)).is_err());
    }
}
