//! Startup loading of the fitted scaler and model

use std::path::Path;
use std::sync::Mutex;

use burn::tensor::backend::Backend;
use serde::{Deserialize, Serialize};

use crate::model::price_net::{PriceNet, PriceNetConfig};
use crate::model::scaler::FeatureScaler;
use crate::{ArtifactConfig, PriceError, Result, FEATURE_COUNT};

/// CPU backend used to serve predictions
pub type InferenceBackend = burn::backend::NdArray<f64>;

/// Anything that maps scaled feature rows to prices
pub trait Regressor: Send + Sync {
    /// One prediction per row, in row order
    fn predict(&self, rows: &[[f64; FEATURE_COUNT]]) -> Result<Vec<f64>>;
}

/// A loaded burn network.
///
/// Burn modules are `Send` but not `Sync`, so the network sits behind a mutex that is
/// held only for the forward pass. Nothing ever mutates it after load.
pub struct NetworkRegressor<B: Backend> {
    model: Mutex<PriceNet<B>>,
    device: B::Device,
}

impl<B: Backend> NetworkRegressor<B> {
    pub fn new(model: PriceNet<B>, device: B::Device) -> Self {
        NetworkRegressor {
            model: Mutex::new(model),
            device,
        }
    }
}

impl<B: Backend> Regressor for NetworkRegressor<B> {
    fn predict(&self, rows: &[[f64; FEATURE_COUNT]]) -> Result<Vec<f64>> {
        let model = self
            .model
            .lock()
            .map_err(|_| PriceError::Model("model lock poisoned".to_string()))?;
        model.predict_rows(&self.device, rows)
    }
}

/// The fitted scaler and model, immutable for the life of the process
pub struct Artifacts {
    scaler: FeatureScaler,
    model: Box<dyn Regressor>,
}

impl Artifacts {
    pub fn new<R: Regressor + 'static>(scaler: FeatureScaler, model: R) -> Self {
        Artifacts {
            scaler,
            model: Box::new(model),
        }
    }

    /// Path burn writes the model record to
    pub fn model_file(config: &ArtifactConfig) -> String {
        format!("{}.mpk", config.model_path)
    }

    /// Load both artifacts.
    ///
    /// Returns `Ok(None)` when either file is missing so the service can still start with
    /// predictions disabled; any other failure is an error.
    pub fn load(config: &ArtifactConfig) -> Result<Option<Self>> {
        let model_file = Self::model_file(config);
        for path in [config.scaler_path.as_str(), model_file.as_str()] {
            if !Path::new(path).exists() {
                log::warn!(
                    "Model files not found ({} is missing); predictions are disabled until the model is trained",
                    path
                );
                return Ok(None);
            }
        }

        let scaler = FeatureScaler::load(&config.scaler_path)?;
        let device = Default::default();
        let net_config = PriceNetConfig::with_hidden_dims(config.hidden_dims.clone());
        let model = PriceNet::<InferenceBackend>::load(&device, &config.model_path, net_config)?;

        log::info!(
            "Model and scaler loaded successfully ({}, {})",
            model_file,
            config.scaler_path
        );
        Ok(Some(Self::new(scaler, NetworkRegressor::new(model, device))))
    }

    /// Scale the rows and run the model once over the whole batch
    pub fn predict(&self, rows: &[[f64; FEATURE_COUNT]]) -> Result<Vec<f64>> {
        let scaled = self.scaler.transform_batch(rows);
        let prices = self.model.predict(&scaled)?;
        if prices.len() != rows.len() {
            return Err(PriceError::Model(format!(
                "model returned {} predictions for {} rows",
                prices.len(),
                rows.len()
            )));
        }
        Ok(prices)
    }
}

/// A linear model fitted elsewhere, with the scaler it was fitted against
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinearExport {
    pub coefficients: Vec<f64>,
    pub intercept: f64,
    pub mean: Vec<f64>,
    pub scale: Vec<f64>,
}

impl LinearExport {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Write the burn model record and scaler JSON where `Artifacts::load` expects them
    pub fn write(&self, config: &ArtifactConfig) -> Result<()> {
        if self.coefficients.len() != FEATURE_COUNT {
            return Err(PriceError::Model(format!(
                "expected {} coefficients, found {}",
                FEATURE_COUNT,
                self.coefficients.len()
            )));
        }
        if !config.hidden_dims.is_empty() {
            return Err(PriceError::Config(
                "a linear model needs artifacts.hidden_dims = []".to_string(),
            ));
        }
        let scaler = FeatureScaler::new(self.mean.clone(), self.scale.clone())?;

        for path in [config.model_path.as_str(), config.scaler_path.as_str()] {
            if let Some(parent) = Path::new(path).parent() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let device = Default::default();
        PriceNet::<InferenceBackend>::linear(&device, &self.coefficients, self.intercept)
            .save(&config.model_path)?;
        scaler.save(&config.scaler_path)?;

        log::info!(
            "Wrote model to {} and scaler to {}",
            Artifacts::model_file(config),
            config.scaler_path
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn config_in(dir: &Path) -> ArtifactConfig {
        ArtifactConfig {
            model_path: dir.join("model").to_string_lossy().into_owned(),
            scaler_path: dir.join("scaler.json").to_string_lossy().into_owned(),
            hidden_dims: vec![],
        }
    }

    #[test]
    fn test_missing_files_disable_predictions() {
        let dir = tempdir().unwrap();
        let config = config_in(dir.path());
        assert!(Artifacts::load(&config).unwrap().is_none());

        // Scaler alone is not enough
        FeatureScaler::identity().save(&config.scaler_path).unwrap();
        assert!(Artifacts::load(&config).unwrap().is_none());
    }

    #[test]
    fn test_load_and_predict() {
        let dir = tempdir().unwrap();
        let config = config_in(dir.path());

        let device = Default::default();
        PriceNet::<InferenceBackend>::linear(&device, &[1.0, 0.0, 0.0, 0.0, 0.0, 0.0], 50.0)
            .save(&config.model_path)
            .unwrap();
        FeatureScaler::new(vec![2.0, 0.0, 0.0, 0.0, 0.0, 0.0], vec![0.5; FEATURE_COUNT])
            .unwrap()
            .save(&config.scaler_path)
            .unwrap();

        let artifacts = Artifacts::load(&config).unwrap().unwrap();
        let prices = artifacts
            .predict(&[[3.0, 0.0, 0.0, 0.0, 0.0, 0.0], [1.0, 0.0, 0.0, 0.0, 0.0, 0.0]])
            .unwrap();
        assert!((prices[0] - 52.0).abs() < 1e-9);
        assert!((prices[1] - 48.0).abs() < 1e-9);
    }

    #[test]
    fn test_linear_export_round_trip() {
        let dir = tempdir().unwrap();
        let config = ArtifactConfig {
            model_path: dir.path().join("nested/model").to_string_lossy().into_owned(),
            scaler_path: dir.path().join("nested/scaler.json").to_string_lossy().into_owned(),
            hidden_dims: vec![],
        };
        let export = LinearExport {
            coefficients: vec![0.0, 0.0, 150.0, 0.0, 0.0, 0.0],
            intercept: 10_000.0,
            mean: vec![0.0, 0.0, 1000.0, 0.0, 0.0, 0.0],
            scale: vec![1.0, 1.0, 10.0, 1.0, 1.0, 1.0],
        };
        export.write(&config).unwrap();

        let artifacts = Artifacts::load(&config).unwrap().unwrap();
        let price = artifacts.predict(&[[3.0, 2.0, 1800.0, 5000.0, 1.0, 1990.0]]).unwrap();
        // (1800 - 1000) / 10 * 150 + 10000
        assert!((price[0] - 22_000.0).abs() < 1e-6);
    }

    #[test]
    fn test_linear_export_rejects_wrong_width() {
        let dir = tempdir().unwrap();
        let export = LinearExport {
            coefficients: vec![1.0; 4],
            intercept: 0.0,
            mean: vec![0.0; FEATURE_COUNT],
            scale: vec![1.0; FEATURE_COUNT],
        };
        assert!(export.write(&config_in(dir.path())).is_err());
        assert!(!dir.path().join("scaler.json").exists());
    }

    #[test]
    fn test_architecture_mismatch_is_an_error() {
        let dir = tempdir().unwrap();
        let config = config_in(dir.path());

        let device = Default::default();
        PriceNet::<InferenceBackend>::new(&device, PriceNetConfig::with_hidden_dims(vec![4]))
            .save(&config.model_path)
            .unwrap();
        FeatureScaler::identity().save(&config.scaler_path).unwrap();

        // config_in declares a plain linear model
        assert!(matches!(Artifacts::load(&config), Err(PriceError::Model(_))));
    }

    #[test]
    fn test_corrupt_scaler_is_an_error() {
        let dir = tempdir().unwrap();
        let config = config_in(dir.path());
        std::fs::write(&config.scaler_path, "not json").unwrap();
        std::fs::write(Artifacts::model_file(&config), b"not a record").unwrap();
        assert!(Artifacts::load(&config).is_err());
    }
}
