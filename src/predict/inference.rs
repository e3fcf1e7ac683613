//! Model inference for price predictions

use serde_json::{Map, Value};

use crate::data::RecordStore;
use crate::model::Artifacts;
use crate::{round_price, Config, FeatureVector, PriceError, Result, FEATURE_COUNT};

/// Serves single and batch predictions from the loaded artifacts
pub struct Predictor {
    artifacts: Option<Artifacts>,
    store: RecordStore,
}

impl Predictor {
    /// Create a predictor; `None` artifacts means every prediction is refused
    pub fn new(artifacts: Option<Artifacts>, store: RecordStore) -> Self {
        Predictor { artifacts, store }
    }

    /// Prepare the record store and load artifacts as configured.
    ///
    /// A store that cannot be initialized only disables logging; missing artifacts only
    /// disable predictions. Corrupt artifacts are an error.
    pub fn load(config: &Config) -> Result<Self> {
        let store = RecordStore::new(&config.storage.database_path);
        if let Err(e) = store.init() {
            log::error!(
                "Failed to initialize record store at {}: {}",
                config.storage.database_path,
                e
            );
        }

        let artifacts = Artifacts::load(&config.artifacts)?;
        Ok(Self::new(artifacts, store))
    }

    /// Whether the scaler and model are loaded
    pub fn is_ready(&self) -> bool {
        self.artifacts.is_some()
    }

    pub fn store(&self) -> &RecordStore {
        &self.store
    }

    fn artifacts(&self) -> Result<&Artifacts> {
        self.artifacts.as_ref().ok_or(PriceError::ModelUnavailable)
    }

    /// Predict one house and log the result.
    ///
    /// Logging is best effort: a storage failure never changes the returned price.
    pub fn predict(&self, features: &FeatureVector) -> Result<f64> {
        let artifacts = self.artifacts()?;

        let raw = artifacts
            .predict(&[features.to_row()])?
            .first()
            .copied()
            .ok_or_else(|| PriceError::Model("model returned no prediction".to_string()))?;
        let price = round_price(raw);

        self.store.save(features, price);
        Ok(price)
    }

    /// Predict many rows in one pass, preserving input order.
    ///
    /// All or nothing: one bad row fails the whole batch. Batch results are not logged.
    pub fn predict_batch(&self, rows: &[Map<String, Value>]) -> Result<Vec<f64>> {
        let artifacts = self.artifacts()?;
        if rows.is_empty() {
            return Err(PriceError::EmptyBatch);
        }

        let matrix = rows
            .iter()
            .enumerate()
            .map(|(i, row)| {
                FeatureVector::from_json_row(row)
                    .map(|f| f.to_row())
                    .map_err(|e| PriceError::InvalidRow {
                        row: i + 1,
                        message: e.to_string(),
                    })
            })
            .collect::<Result<Vec<[f64; FEATURE_COUNT]>>>()?;

        let prices = artifacts.predict(&matrix)?;
        log::debug!("Predicted {} rows in one batch", prices.len());

        Ok(prices.into_iter().map(round_price).collect())
    }
}
