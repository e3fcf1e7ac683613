//! End-to-end: imported artifacts, spreadsheet upload, batch prediction, prediction log.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use house_price::model::LinearExport;
use house_price::predict::Predictor;
use house_price::{server, Config};

const BOUNDARY: &str = "house-price-test-boundary";

/// price = 10000 * bedrooms + 5000 * bathrooms + 100 * sqft_living + 50000
fn setup(dir: &std::path::Path) -> Router {
    let mut config = Config::default();
    config.artifacts.model_path = dir.join("model/model").to_string_lossy().into_owned();
    config.artifacts.scaler_path = dir.join("model/scaler.json").to_string_lossy().into_owned();
    config.storage.database_path = dir.join("db/predictions.db").to_string_lossy().into_owned();

    LinearExport {
        coefficients: vec![10_000.0, 5_000.0, 100.0, 0.0, 0.0, 0.0],
        intercept: 50_000.0,
        mean: vec![0.0; 6],
        scale: vec![1.0; 6],
    }
    .write(&config.artifacts)
    .unwrap();

    let predictor = Predictor::load(&config).unwrap();
    assert!(predictor.is_ready());
    server::router(Arc::new(predictor), config.server.max_upload_bytes)
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    (status, serde_json::from_slice(&body).unwrap())
}

fn upload(filename: &str, content: &str) -> Request<Body> {
    let body = format!(
        "--{b}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{f}\"\r\nContent-Type: text/csv\r\n\r\n{c}\r\n--{b}--\r\n",
        b = BOUNDARY,
        f = filename,
        c = content
    );
    Request::builder()
        .method("POST")
        .uri("/upload")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(body))
        .unwrap()
}

fn post_json(uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn upload_then_batch_predict() {
    let dir = tempfile::tempdir().unwrap();
    let app = setup(dir.path());

    let csv = "sqft_living,bedrooms,bathrooms,sqft_lot,floors,yr_built,extra_col\n\
               1800,3,2,5000,1,1990,foo\n\
               2200,4,2.5,6100,2,2001,bar\n";
    let (status, uploaded) = send(&app, upload("Listings.CSV", csv)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(uploaded["success"], true);
    assert_eq!(uploaded["row_count"], 2);
    assert_eq!(
        uploaded["columns"],
        json!(["bedrooms", "bathrooms", "sqft_living", "sqft_lot", "floors", "yr_built"])
    );
    assert!(uploaded["data"][0].get("extra_col").is_none());

    // The upload's rows go back unchanged as the batch payload
    let (status, batch) = send(
        &app,
        post_json("/predict_batch", &json!({"data": uploaded["data"]})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        batch,
        json!({"success": true, "predictions": [270000.0, 322500.0]})
    );

    // Batch predictions are not logged
    let (_, history) = send(
        &app,
        Request::builder().uri("/history").body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(history["records"], json!([]));
}

#[tokio::test]
async fn single_predictions_are_logged_newest_first() {
    let dir = tempfile::tempdir().unwrap();
    let app = setup(dir.path());

    for bedrooms in [1, 2] {
        let form = format!(
            "bedrooms={}&bathrooms=1&sqft_living=1000&sqft_lot=4000&floors=1&yr_built=1975",
            bedrooms
        );
        let request = Request::builder()
            .method("POST")
            .uri("/predict")
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(form))
            .unwrap();
        let (status, _) = send(&app, request).await;
        assert_eq!(status, StatusCode::OK);
    }

    let (_, history) = send(
        &app,
        Request::builder()
            .uri("/history?limit=10")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    let records = history["records"].as_array().unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0]["input_data"]["bedrooms"], 2.0);
    assert_eq!(records[0]["predicted_price"], 175000.0);
    assert_eq!(records[1]["predicted_price"], 165000.0);
}
