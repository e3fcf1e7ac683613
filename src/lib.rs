//! House price prediction service
//!
//! Serves predictions from a pre-trained regression model over HTTP, accepts single rows,
//! batches and spreadsheet uploads, and keeps a log of every single-row prediction.

pub mod data;
pub mod model;
pub mod predict;
pub mod server;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Number of input features the scaler and model were fitted on
pub const FEATURE_COUNT: usize = 6;

/// Feature names in the column order the scaler and model were fitted on.
///
/// Every numeric row handed to the scaler follows this order. Reordering it silently
/// corrupts every prediction, so artifacts must be fitted against exactly this layout.
pub const FEATURE_NAMES: [&str; FEATURE_COUNT] = [
    "bedrooms",
    "bathrooms",
    "sqft_living",
    "sqft_lot",
    "floors",
    "yr_built",
];

/// One set of house features, the input to a single prediction
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    pub bedrooms: f64,
    pub bathrooms: f64,
    pub sqft_living: f64,
    pub sqft_lot: f64,
    pub floors: f64,
    pub yr_built: f64,
}

impl FeatureVector {
    /// Build from values laid out in `FEATURE_NAMES` order
    pub fn from_row(row: [f64; FEATURE_COUNT]) -> Self {
        let [bedrooms, bathrooms, sqft_living, sqft_lot, floors, yr_built] = row;
        FeatureVector {
            bedrooms,
            bathrooms,
            sqft_living,
            sqft_lot,
            floors,
            yr_built,
        }
    }

    /// Values in `FEATURE_NAMES` order
    pub fn to_row(&self) -> [f64; FEATURE_COUNT] {
        [
            self.bedrooms,
            self.bathrooms,
            self.sqft_living,
            self.sqft_lot,
            self.floors,
            self.yr_built,
        ]
    }

    /// Build from textual fields, e.g. a submitted form.
    ///
    /// Every field is required and must parse as a float (surrounding whitespace allowed).
    pub fn from_fields<'a, F>(mut lookup: F) -> Result<Self>
    where
        F: FnMut(&str) -> Option<&'a str>,
    {
        let mut row = [0.0; FEATURE_COUNT];
        for (slot, name) in row.iter_mut().zip(FEATURE_NAMES) {
            let raw = lookup(name).ok_or_else(|| PriceError::MissingField(name.to_string()))?;
            *slot = parse_feature(name, raw)?;
        }
        Ok(Self::from_row(row))
    }

    /// Build from a JSON row object, as produced by the upload endpoint.
    ///
    /// Numbers are taken as is and numeric strings are parsed. Extra keys are ignored.
    pub fn from_json_row(row: &Map<String, Value>) -> Result<Self> {
        let mut values = [0.0; FEATURE_COUNT];
        for (slot, name) in values.iter_mut().zip(FEATURE_NAMES) {
            let value = row
                .get(name)
                .ok_or_else(|| PriceError::MissingField(name.to_string()))?;
            *slot = match value {
                Value::Number(n) => n.as_f64().ok_or_else(|| PriceError::InvalidFeature {
                    field: name.to_string(),
                    value: n.to_string(),
                })?,
                Value::String(s) => parse_feature(name, s)?,
                other => {
                    return Err(PriceError::InvalidFeature {
                        field: name.to_string(),
                        value: other.to_string(),
                    })
                }
            };
        }
        Ok(Self::from_row(values))
    }
}

/// Parse one textual feature; `nan` and `inf` parse as floats but are not usable inputs
fn parse_feature(field: &str, raw: &str) -> Result<f64> {
    match raw.trim().parse::<f64>() {
        Ok(value) if value.is_finite() => Ok(value),
        _ => Err(PriceError::InvalidFeature {
            field: field.to_string(),
            value: raw.to_string(),
        }),
    }
}

/// Round a raw model output to cents
pub fn round_price(price: f64) -> f64 {
    (price * 100.0).round() / 100.0
}

/// A logged prediction, as read back from the record store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionRecord {
    pub id: i64,
    pub input_data: Value,
    pub predicted_price: f64,
    pub timestamp: NaiveDateTime,
}

/// Application-wide errors
#[derive(Debug, Error)]
pub enum PriceError {
    #[error("Model not loaded. Please train the model first.")]
    ModelUnavailable,

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value for {field}: {value:?} is not a number")]
    InvalidFeature { field: String, value: String },

    #[error("Row {row}: {message}")]
    InvalidRow { row: usize, message: String },

    #[error("No data provided")]
    EmptyBatch,

    #[error("No file provided")]
    NoFile,

    #[error("No file selected")]
    NoFileSelected,

    #[error("Invalid file type. Please upload CSV or Excel files.")]
    InvalidFileType,

    #[error("Missing required columns: {}", .0.join(", "))]
    MissingColumns(Vec<String>),

    #[error("Failed to read spreadsheet: {0}")]
    Spreadsheet(String),

    #[error("Failed to read CSV: {0}")]
    Csv(#[from] csv::Error),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Model error: {0}")]
    Model(String),

    #[error("Background task failed: {0}")]
    Task(String),
}

impl PriceError {
    /// Whether the caller sent something we cannot use (as opposed to a server-side fault)
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            PriceError::MissingField(_)
                | PriceError::InvalidFeature { .. }
                | PriceError::InvalidRow { .. }
                | PriceError::EmptyBatch
                | PriceError::NoFile
                | PriceError::NoFileSelected
                | PriceError::InvalidFileType
                | PriceError::MissingColumns(_)
                | PriceError::Spreadsheet(_)
                | PriceError::Csv(_)
                | PriceError::BadRequest(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, PriceError>;

/// Application configuration loaded from config.toml
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub artifacts: ArtifactConfig,
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Upper bound on request bodies, uploads included
    pub max_upload_bytes: usize,
}

impl ServerConfig {
    pub fn bind(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactConfig {
    /// Model record path without extension (burn appends `.mpk`)
    pub model_path: String,
    pub scaler_path: String,
    /// Hidden layer widths of the fitted network; empty for plain linear regression
    #[serde(default)]
    pub hidden_dims: Vec<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub database_path: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 5000,
                max_upload_bytes: 16 * 1024 * 1024,
            },
            artifacts: ArtifactConfig {
                model_path: "model/model".to_string(),
                scaler_path: "model/scaler.json".to_string(),
                hidden_dims: vec![],
            },
            storage: StorageConfig {
                database_path: "db/predictions.db".to_string(),
            },
        }
    }
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            PriceError::Config(format!("Failed to read config file {}: {}", path, e))
        })?;
        toml::from_str(&content)
            .map_err(|e| PriceError::Config(format!("Failed to parse config: {}", e)))
    }

    pub fn save(&self, path: &str) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| PriceError::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, content)?;
        Ok(())
    }
}
