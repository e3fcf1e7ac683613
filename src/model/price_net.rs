//! Regression network for house prices
//!
//! Architecture: Input(6) → [Hidden(n) → ReLU]* → Output(1)
//! With no hidden layers this is ordinary linear regression.

use burn::module::{Module, Param};
use burn::nn::{Linear, LinearConfig};
use burn::record::{DoublePrecisionSettings, Recorder};
use burn::tensor::activation::relu;
use burn::tensor::backend::Backend;
use burn::tensor::{Tensor, TensorData};

use crate::{PriceError, Result, FEATURE_COUNT};

/// Configuration for the price network
#[derive(Debug, Clone)]
pub struct PriceNetConfig {
    /// Input dimension (always the feature count for fitted artifacts)
    pub input_dim: usize,
    /// Hidden layer widths, empty for a single linear layer
    pub hidden_dims: Vec<usize>,
}

impl Default for PriceNetConfig {
    fn default() -> Self {
        PriceNetConfig {
            input_dim: FEATURE_COUNT,
            hidden_dims: vec![],
        }
    }
}

impl PriceNetConfig {
    pub fn with_hidden_dims(hidden_dims: Vec<usize>) -> Self {
        PriceNetConfig {
            hidden_dims,
            ..Self::default()
        }
    }
}

/// Feed-forward regressor producing one price per input row
#[derive(Module, Debug)]
pub struct PriceNet<B: Backend> {
    hidden: Vec<Linear<B>>,
    output: Linear<B>,
}

impl<B: Backend> PriceNet<B> {
    /// Create a network with freshly initialized weights
    pub fn new(device: &B::Device, config: PriceNetConfig) -> Self {
        let mut hidden = Vec::with_capacity(config.hidden_dims.len());
        let mut in_dim = config.input_dim;
        for &out_dim in &config.hidden_dims {
            hidden.push(LinearConfig::new(in_dim, out_dim).init(device));
            in_dim = out_dim;
        }

        PriceNet {
            hidden,
            output: LinearConfig::new(in_dim, 1).init(device),
        }
    }

    /// Linear regression with known coefficients, e.g. exported from another fitter
    pub fn linear(device: &B::Device, coefficients: &[f64], intercept: f64) -> Self {
        let n = coefficients.len();
        let weight =
            Tensor::<B, 2>::from_data(TensorData::new(coefficients.to_vec(), [n, 1]), device);
        let bias = Tensor::<B, 1>::from_data(TensorData::new(vec![intercept], [1]), device);

        PriceNet {
            hidden: vec![],
            output: Linear {
                weight: Param::from_tensor(weight),
                bias: Some(Param::from_tensor(bias)),
            },
        }
    }

    /// Forward pass
    ///
    /// # Arguments
    /// * `features` - Scaled features [batch, input_dim]
    ///
    /// # Returns
    /// Predicted prices [batch, 1]
    pub fn forward(&self, features: Tensor<B, 2>) -> Tensor<B, 2> {
        let x = self
            .hidden
            .iter()
            .fold(features, |x, layer| relu(layer.forward(x)));
        self.output.forward(x)
    }

    /// Run the network on plain rows and return one value per row
    pub fn predict_rows(
        &self,
        device: &B::Device,
        rows: &[[f64; FEATURE_COUNT]],
    ) -> Result<Vec<f64>> {
        if rows.is_empty() {
            return Ok(vec![]);
        }
        let flat: Vec<f64> = rows.iter().flat_map(|r| r.iter().copied()).collect();
        let input = Tensor::<B, 1>::from_floats(flat.as_slice(), device)
            .reshape([rows.len(), FEATURE_COUNT]);

        self.forward(input)
            .into_data()
            .convert::<f64>()
            .to_vec::<f64>()
            .map_err(|e| PriceError::Model(format!("unreadable model output: {:?}", e)))
    }

    /// Save model to file
    pub fn save(&self, path: &str) -> Result<()>
    where
        B::FloatElem: serde::Serialize + serde::de::DeserializeOwned,
        B::IntElem: serde::Serialize + serde::de::DeserializeOwned,
    {
        let recorder = burn::record::NamedMpkFileRecorder::<DoublePrecisionSettings>::new();
        recorder
            .record(self.clone().into_record(), path.into())
            .map_err(|e| PriceError::Model(e.to_string()))
    }

    /// Load model from file
    pub fn load(device: &B::Device, path: &str, config: PriceNetConfig) -> Result<Self>
    where
        B::FloatElem: serde::Serialize + serde::de::DeserializeOwned,
        B::IntElem: serde::Serialize + serde::de::DeserializeOwned,
    {
        let recorder = burn::record::NamedMpkFileRecorder::<DoublePrecisionSettings>::new();
        let record: PriceNetRecord<B> = recorder
            .load(path.into(), device)
            .map_err(|e| PriceError::Model(e.to_string()))?;
        Self::check_record(&record, &config)?;

        let model = Self::new(device, config);
        Ok(model.load_record(record))
    }

    /// Stored layer shapes must match the configured architecture exactly
    fn check_record(record: &PriceNetRecord<B>, config: &PriceNetConfig) -> Result<()> {
        if record.hidden.len() != config.hidden_dims.len() {
            return Err(PriceError::Model(format!(
                "model file has {} hidden layers but artifacts.hidden_dims lists {}",
                record.hidden.len(),
                config.hidden_dims.len()
            )));
        }

        let weights = record
            .hidden
            .iter()
            .map(|layer| &layer.weight)
            .chain(std::iter::once(&record.output.weight));
        let widths = config.hidden_dims.iter().copied().chain(std::iter::once(1));

        let mut in_dim = config.input_dim;
        for (i, (weight, out_dim)) in weights.zip(widths).enumerate() {
            let dims = weight.val().dims();
            if dims != [in_dim, out_dim] {
                return Err(PriceError::Model(format!(
                    "layer {} in model file is {}x{}, config expects {}x{}",
                    i + 1,
                    dims[0],
                    dims[1],
                    in_dim,
                    out_dim
                )));
            }
            in_dim = out_dim;
        }
        Ok(())
    }
}
