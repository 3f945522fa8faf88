/// Integration tests for the web front door
///
/// Covers both form variants through `FrontDoor::handle`, plus one live
/// round trip over HTTP against a locally bound server.
///
/// Run with: cargo test --test web_front_door

use floodcast::config::{FormVariant, WebConfig};
use floodcast::model::FloodError;
use floodcast::oracle::{Predictor, RegressionModel};
use floodcast::web::{self, FrontDoor};

use serde_json::json;
use std::path::Path;
use std::sync::Arc;

#[derive(Debug)]
struct FixedLevel(f64);

impl Predictor for FixedLevel {
    fn predict(&self, _features: &[f64]) -> Result<f64, FloodError> {
        Ok(self.0)
    }
}

#[derive(Debug)]
struct RejectingModel;

impl Predictor for RejectingModel {
    fn predict(&self, _features: &[f64]) -> Result<f64, FloodError> {
        Err(FloodError::Model("expected 3 features".into()))
    }
}

#[derive(Debug)]
struct NanModel;

impl Predictor for NanModel {
    fn predict(&self, _features: &[f64]) -> Result<f64, FloodError> {
        Ok(f64::NAN)
    }
}

fn post(door: &FrontDoor, body: &str) -> web::Reply {
    door.handle(&tiny_http::Method::Post, "/predict", body)
}

// ---------------------------------------------------------------------------
// Features form
// ---------------------------------------------------------------------------

#[test]
fn test_features_form_returns_prediction_json() {
    let door = FrontDoor::new(FormVariant::Features, Arc::new(FixedLevel(5.0)));

    let reply = post(&door, "feature1=1&feature2=2&feature3=3");

    assert_eq!(reply.status, 200);
    assert_eq!(reply.content_type, "application/json");
    assert_eq!(reply.json_body().unwrap(), json!({ "prediction": 5.0 }));
}

#[test]
fn test_features_form_model_error_is_json_error_with_200() {
    let door = FrontDoor::new(FormVariant::Features, Arc::new(RejectingModel));

    let reply = post(&door, "feature1=1&feature2=2&feature3=3");

    assert_eq!(reply.status, 200);
    let body = reply.json_body().unwrap();
    assert!(body.get("prediction").is_none());
    assert!(body["error"].as_str().unwrap().contains("expected 3 features"));
}

#[test]
fn test_features_form_bad_field_is_json_error() {
    let door = FrontDoor::new(FormVariant::Features, Arc::new(FixedLevel(5.0)));

    let reply = post(&door, "feature1=abc&feature2=2&feature3=3");
    assert_eq!(reply.status, 200);
    assert!(reply.json_body().unwrap()["error"].as_str().unwrap().contains("feature1"));

    let reply = post(&door, "feature1=1&feature2=2");
    assert!(reply.json_body().unwrap()["error"].as_str().unwrap().contains("feature3"));
}

#[test]
fn test_features_form_non_finite_level_is_json_error() {
    let door = FrontDoor::new(FormVariant::Features, Arc::new(NanModel));

    let reply = post(&door, "feature1=1&feature2=2&feature3=3");

    assert_eq!(reply.status, 200);
    let body = reply.json_body().unwrap();
    assert!(body.get("prediction").is_none());
    assert!(body["error"].as_str().unwrap().contains("non-finite"));
}

#[test]
fn test_features_form_with_linear_artifact() {
    let model = RegressionModel::load(Path::new("models/features_model.json")).unwrap();
    let door = FrontDoor::new(FormVariant::Features, Arc::new(model));

    let reply = post(&door, "feature1=1&feature2=1&feature3=1");

    // 0.42 + 0.31 + 0.18 + 0.75
    let prediction = reply.json_body().unwrap()["prediction"].as_f64().unwrap();
    assert!((prediction - 1.66).abs() < 1e-9);
}

#[test]
fn test_scaler_from_config() {
    let config = WebConfig {
        scaler_mean: Some(vec![1.0, 1.0, 1.0]),
        scaler_scale: Some(vec![2.0, 2.0, 2.0]),
        ..WebConfig::default()
    };
    let model = RegressionModel::from_json(
        r#"{"kind": "linear", "coefficients": [1.0, 1.0, 1.0], "intercept": 0.0}"#,
    )
    .unwrap();
    let door = FrontDoor::from_config(&config, Arc::new(model));

    let reply = post(&door, "feature1=3&feature2=5&feature3=1");

    // (3-1)/2 + (5-1)/2 + (1-1)/2
    assert_eq!(reply.json_body().unwrap(), json!({ "prediction": 3.0 }));
}

// ---------------------------------------------------------------------------
// Site form
// ---------------------------------------------------------------------------

#[test]
fn test_site_form_renders_result_page() {
    let door = FrontDoor::new(FormVariant::Site, Arc::new(FixedLevel(5.0)));

    let reply = post(&door, "date=15&month=3&year=2024&flow=10.5&rainfall=1.2");

    assert_eq!(reply.status, 200);
    assert!(reply.content_type.starts_with("text/html"));
    assert!(reply.body.contains(">5<"));
}

#[test]
fn test_site_form_malformed_field_is_400() {
    let door = FrontDoor::new(FormVariant::Site, Arc::new(FixedLevel(5.0)));

    let reply = post(&door, "date=15&month=3&year=2024&flow=lots&rainfall=1.2");

    assert_eq!(reply.status, 400);
    assert!(reply.body.starts_with("Bad Request"));
}

#[test]
fn test_site_form_model_error_is_500() {
    let door = FrontDoor::new(FormVariant::Site, Arc::new(RejectingModel));

    let reply = post(&door, "date=15&month=3&year=2024&flow=10.5&rainfall=1.2");

    assert_eq!(reply.status, 500);
}

#[test]
fn test_site_form_non_finite_level_is_500() {
    let door = FrontDoor::new(FormVariant::Site, Arc::new(NanModel));

    let reply = post(&door, "date=15&month=3&year=2024&flow=10.5&rainfall=1.2");

    assert_eq!(reply.status, 500);
    assert!(!reply.body.contains("NaN"));
}

#[test]
fn test_site_form_with_forest_artifact() {
    let model = RegressionModel::load(Path::new("models/rf_model.json")).unwrap();
    let door = FrontDoor::new(FormVariant::Site, Arc::new(model));

    let reply = post(&door, "date=15&month=3&year=2024&flow=10.5&rainfall=1.2");

    assert_eq!(reply.status, 200);
}

// ---------------------------------------------------------------------------
// Live server
// ---------------------------------------------------------------------------

#[test]
fn test_live_form_post() {
    let server = tiny_http::Server::http("127.0.0.1:0").unwrap();
    let port = server.server_addr().to_ip().unwrap().port();
    let door = Arc::new(FrontDoor::new(FormVariant::Features, Arc::new(FixedLevel(5.0))));
    std::thread::spawn(move || web::serve(server, door, 2));

    let client = reqwest::blocking::Client::new();
    let base = format!("http://127.0.0.1:{}", port);

    let response = client
        .post(format!("{}/predict", base))
        .form(&[("feature1", "1"), ("feature2", "2"), ("feature3", "3")])
        .send()
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);
    let body: serde_json::Value = response.json().unwrap();
    assert_eq!(body, json!({ "prediction": 5.0 }));

    let form = client.get(format!("{}/", base)).send().unwrap();
    assert_eq!(form.status().as_u16(), 200);
    assert!(form.text().unwrap().contains("name=\"feature2\""));

    let missing = client.get(format!("{}/elsewhere", base)).send().unwrap();
    assert_eq!(missing.status().as_u16(), 404);
}

#[test]
fn test_live_invalid_utf8_body_gets_json_error() {
    let server = tiny_http::Server::http("127.0.0.1:0").unwrap();
    let port = server.server_addr().to_ip().unwrap().port();
    let door = Arc::new(FrontDoor::new(FormVariant::Features, Arc::new(FixedLevel(5.0))));
    std::thread::spawn(move || web::serve(server, door, 1));

    let mut body = b"feature1=1&feature2=2&feature3=".to_vec();
    body.push(0xff);

    let response = reqwest::blocking::Client::new()
        .post(format!("http://127.0.0.1:{}/predict", port))
        .header("Content-Type", "application/x-www-form-urlencoded")
        .body(body)
        .send()
        .unwrap();

    assert_eq!(response.status().as_u16(), 200);
    let content_type = response
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    assert_eq!(content_type, "application/json");
    let reply: serde_json::Value = response.json().unwrap();
    assert!(reply.get("prediction").is_none());
    assert!(reply["error"].as_str().unwrap().contains("feature3"));
}
