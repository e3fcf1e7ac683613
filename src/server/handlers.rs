//! Request handlers
//!
//! Prediction errors answer with `{"success": false, "error": ...}` (a missing model drops
//! the flag); upload errors with a bare `{"error": ...}`. Client mistakes map to 400 and
//! everything else to 500.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::multipart::{MultipartError, MultipartRejection};
use axum::extract::rejection::{FormRejection, JsonRejection};
use axum::extract::{Multipart, Query, State};
use axum::http::StatusCode;
use axum::response::Html;
use axum::{Form, Json};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::data::{check_filename, parse_file, IngestedTable};
use crate::predict::Predictor;
use crate::{FeatureVector, PredictionRecord, PriceError, Result};

pub type SharedPredictor = Arc<Predictor>;

const INDEX_HTML: &str = include_str!("../../templates/index.html");
const DEFAULT_HISTORY_LIMIT: usize = 20;
const MAX_HISTORY_LIMIT: usize = 500;

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub success: Option<bool>,
    pub error: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

#[derive(Debug, Serialize, Deserialize)]
pub struct PredictResponse {
    pub success: bool,
    pub predicted_price: f64,
}

/// The body of a batch prediction request: rows as returned by `/upload`.
#[derive(Debug, Deserialize)]
pub struct BatchRequest {
    pub data: Vec<Map<String, Value>>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BatchResponse {
    pub success: bool,
    pub predictions: Vec<f64>,
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub success: bool,
    #[serde(flatten)]
    pub table: IngestedTable,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub model_loaded: bool,
}

#[derive(Debug, Deserialize)]
pub struct HistoryParams {
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub success: bool,
    pub records: Vec<PredictionRecord>,
}

pub async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

pub async fn health(State(predictor): State<SharedPredictor>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        model_loaded: predictor.is_ready(),
    })
}

pub async fn predict(
    State(predictor): State<SharedPredictor>,
    form: std::result::Result<Form<HashMap<String, String>>, FormRejection>,
) -> std::result::Result<Json<PredictResponse>, ApiError> {
    if !predictor.is_ready() {
        return Err(prediction_error(PriceError::ModelUnavailable));
    }
    let Form(fields) =
        form.map_err(|rejection| prediction_error(PriceError::BadRequest(rejection.body_text())))?;
    log::debug!("received prediction form: {:?}", fields);

    let features = FeatureVector::from_fields(|name| fields.get(name).map(String::as_str))
        .map_err(prediction_error)?;
    let predicted_price = blocking(move || predictor.predict(&features))
        .await
        .map_err(prediction_error)?;

    Ok(Json(PredictResponse {
        success: true,
        predicted_price,
    }))
}

pub async fn predict_batch(
    State(predictor): State<SharedPredictor>,
    payload: std::result::Result<Json<BatchRequest>, JsonRejection>,
) -> std::result::Result<Json<BatchResponse>, ApiError> {
    if !predictor.is_ready() {
        return Err(prediction_error(PriceError::ModelUnavailable));
    }
    let Json(request) = payload
        .map_err(|rejection| prediction_error(PriceError::BadRequest(rejection.body_text())))?;
    log::debug!("received batch of {} rows", request.data.len());

    let predictions = blocking(move || predictor.predict_batch(&request.data))
        .await
        .map_err(prediction_error)?;

    Ok(Json(BatchResponse {
        success: true,
        predictions,
    }))
}

pub async fn upload(
    multipart: std::result::Result<Multipart, MultipartRejection>,
) -> std::result::Result<Json<UploadResponse>, ApiError> {
    let mut multipart = multipart.map_err(|rejection| {
        upload_error(PriceError::BadRequest(rejection.body_text()))
    })?;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some("file") {
            continue;
        }

        // Reject on the name alone before reading or parsing any content
        let filename = field.file_name().map(str::to_string);
        let kind = check_filename(filename.as_deref()).map_err(upload_error)?;
        let bytes = field.bytes().await.map_err(multipart_error)?;
        log::debug!("received upload {:?} ({} bytes)", filename, bytes.len());

        let table = blocking(move || parse_file(kind, &bytes))
            .await
            .map_err(upload_error)?;

        return Ok(Json(UploadResponse {
            success: true,
            table,
        }));
    }

    Err(upload_error(PriceError::NoFile))
}

pub async fn history(
    State(predictor): State<SharedPredictor>,
    Query(params): Query<HistoryParams>,
) -> std::result::Result<Json<HistoryResponse>, ApiError> {
    let limit = params
        .limit
        .unwrap_or(DEFAULT_HISTORY_LIMIT)
        .clamp(1, MAX_HISTORY_LIMIT);

    let records = blocking(move || predictor.store().recent(limit))
        .await
        .map_err(prediction_error)?;

    Ok(Json(HistoryResponse {
        success: true,
        records,
    }))
}

/// Run blocking work (inference, SQLite, spreadsheet parsing) off the async workers
async fn blocking<T, F>(work: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| PriceError::Task(e.to_string()))?
}

fn prediction_error(err: PriceError) -> ApiError {
    let (status, success) = match &err {
        PriceError::ModelUnavailable => (StatusCode::INTERNAL_SERVER_ERROR, None),
        e if e.is_client_error() => (StatusCode::BAD_REQUEST, Some(false)),
        _ => (StatusCode::INTERNAL_SERVER_ERROR, Some(false)),
    };
    log_error(status, &err);
    (
        status,
        Json(ErrorResponse {
            success,
            error: err.to_string(),
        }),
    )
}

fn upload_error(err: PriceError) -> ApiError {
    let status = if err.is_client_error() {
        StatusCode::BAD_REQUEST
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };
    log_error(status, &err);
    (
        status,
        Json(ErrorResponse {
            success: None,
            error: err.to_string(),
        }),
    )
}

fn multipart_error(err: MultipartError) -> ApiError {
    let status = err.status();
    log::warn!("rejected upload: {}", err);
    (
        status,
        Json(ErrorResponse {
            success: None,
            error: err.body_text(),
        }),
    )
}

fn log_error(status: StatusCode, err: &PriceError) {
    if status.is_client_error() {
        log::warn!("rejected request: {}", err);
    } else {
        log::error!("request failed: {}", err);
    }
}
