//! Fitted artifacts: feature scaler and regression network
//!
//! Both are produced elsewhere and only loaded here:
//! - Scaler: z-score parameters stored as JSON
//! - PriceNet: burn record of a linear or small feed-forward regressor

pub mod artifacts;
pub mod price_net;
pub mod scaler;

pub use artifacts::{Artifacts, InferenceBackend, LinearExport, NetworkRegressor, Regressor};
pub use price_net::{PriceNet, PriceNetConfig};
pub use scaler::FeatureScaler;
