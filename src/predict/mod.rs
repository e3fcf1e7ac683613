//! Prediction and inference
//!
//! Validate features, run the loaded artifacts and log single predictions.

pub mod inference;

pub use inference::Predictor;
