//! Fitted z-score scaler for the input features

use crate::{PriceError, Result, FEATURE_COUNT, FEATURE_NAMES};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Standardizes each feature as `(x - mean) / scale`.
///
/// Persisted as JSON with one `mean` and one `scale` entry per feature, in
/// `FEATURE_NAMES` order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureScaler {
    pub mean: Vec<f64>,
    pub scale: Vec<f64>,
}

impl FeatureScaler {
    pub fn new(mean: Vec<f64>, scale: Vec<f64>) -> Result<Self> {
        let scaler = FeatureScaler { mean, scale };
        scaler.validate()?;
        Ok(scaler)
    }

    /// Scaler that leaves features untouched
    pub fn identity() -> Self {
        FeatureScaler {
            mean: vec![0.0; FEATURE_COUNT],
            scale: vec![1.0; FEATURE_COUNT],
        }
    }

    fn validate(&self) -> Result<()> {
        if self.mean.len() != FEATURE_COUNT || self.scale.len() != FEATURE_COUNT {
            return Err(PriceError::Model(format!(
                "scaler expects {} features ({}), found {} means and {} scales",
                FEATURE_COUNT,
                FEATURE_NAMES.join(", "),
                self.mean.len(),
                self.scale.len()
            )));
        }
        if self.mean.iter().chain(&self.scale).any(|v| !v.is_finite()) {
            return Err(PriceError::Model("scaler contains non-finite values".to_string()));
        }
        Ok(())
    }

    /// Load and validate a scaler from JSON
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let scaler: FeatureScaler = serde_json::from_str(&content)?;
        scaler.validate()?;
        Ok(scaler)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Scale one row
    pub fn transform(&self, row: &[f64; FEATURE_COUNT]) -> [f64; FEATURE_COUNT] {
        let mut out = [0.0; FEATURE_COUNT];
        for (j, slot) in out.iter_mut().enumerate() {
            // Constant columns are fitted with zero spread; leave them centred only
            let scale = if self.scale[j] == 0.0 { 1.0 } else { self.scale[j] };
            *slot = (row[j] - self.mean[j]) / scale;
        }
        out
    }

    /// Scale a batch of rows, preserving order
    pub fn transform_batch(&self, rows: &[[f64; FEATURE_COUNT]]) -> Vec<[f64; FEATURE_COUNT]> {
        rows.iter().map(|row| self.transform(row)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transform() {
        let scaler = FeatureScaler::new(
            vec![3.0, 2.0, 2000.0, 5000.0, 1.5, 1980.0],
            vec![1.0, 0.5, 500.0, 1000.0, 0.5, 20.0],
        )
        .unwrap();
        let out = scaler.transform(&[4.0, 2.0, 1500.0, 7000.0, 1.0, 2000.0]);
        assert_eq!(out, [1.0, 0.0, -1.0, 2.0, -1.0, 1.0]);
    }

    #[test]
    fn test_zero_scale_is_treated_as_one() {
        let mut scale = vec![1.0; FEATURE_COUNT];
        scale[4] = 0.0;
        let scaler = FeatureScaler::new(vec![0.0, 0.0, 0.0, 0.0, 1.0, 0.0], scale).unwrap();
        let out = scaler.transform(&[0.0, 0.0, 0.0, 0.0, 3.0, 0.0]);
        assert_eq!(out[4], 2.0);
    }

    #[test]
    fn test_rejects_wrong_dimension() {
        let err = FeatureScaler::new(vec![0.0; 5], vec![1.0; 5]).unwrap_err();
        assert!(matches!(err, PriceError::Model(_)));
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scaler.json");
        let scaler = FeatureScaler::new(
            vec![1.5, 2.0, 2.5, 3.0, 3.5, 4.0],
            vec![0.5, 0.0, 0.5, 1.0, 1.5, 2.0],
        )
        .unwrap();
        scaler.save(&path).unwrap();
        assert_eq!(FeatureScaler::load(&path).unwrap(), scaler);
    }

    #[test]
    fn test_load_rejects_malformed_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scaler.json");
        std::fs::write(&path, "{\"mean\": [1, 2]").unwrap();
        assert!(matches!(FeatureScaler::load(&path), Err(PriceError::Json(_))));
    }
}
