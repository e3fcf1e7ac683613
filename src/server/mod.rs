//! HTTP front-end
//!
//! A thin axum router over the shared `Predictor`.

pub mod handlers;

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::{routing, Router};

use crate::predict::Predictor;
use crate::Result;

pub use handlers::SharedPredictor;

/// Build the application router.
///
/// `max_body_size` caps every request body, uploads included.
pub fn router(predictor: Arc<Predictor>, max_body_size: usize) -> Router {
    Router::new()
        .route("/", routing::get(handlers::index))
        .route("/health", routing::get(handlers::health))
        .route("/history", routing::get(handlers::history))
        .route("/predict", routing::post(handlers::predict))
        .route("/upload", routing::post(handlers::upload))
        .route("/predict_batch", routing::post(handlers::predict_batch))
        .layer(DefaultBodyLimit::max(max_body_size))
        .with_state(predictor)
}

/// Serve until Ctrl-C
pub async fn listen(app: Router, bind: String) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(&bind).await?;
    log::info!("Listening on http://{}", bind);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    log::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        log::error!("Failed to listen for shutdown signal: {}", e);
    }
}
