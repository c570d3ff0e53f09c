//! End-to-end tests of the HTTP API against a small randomly initialized model

use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use serde_json::Value;
use tempfile::{tempdir, TempDir};
use tower::ServiceExt;

use plantvillage_serve::model::{ModelArtifact, PlantClassifierConfig, PreprocessingConfig};
use plantvillage_serve::server::{self, AppState, SharedState};
use plantvillage_serve::{ModelStore, ServeError, ServerConfig};

const BOUNDARY: &str = "plantvillage-test-boundary";

const LABELS: [&str; 4] = [
    "apple_black_rot",
    "apple_cedar_rust",
    "apple_healthy",
    "apple_scab",
];

fn write_model(dir: &Path) -> PathBuf {
    ModelArtifact::new(
        "apple-test",
        PlantClassifierConfig::new()
            .with_num_classes(LABELS.len())
            .with_input_size(16)
            .with_base_filters(4)
            .with_depth(2)
            .with_hidden_units(8),
        LABELS.iter().map(|l| l.to_string()).collect(),
        PreprocessingConfig::imagenet(20),
    )
    .create(dir)
    .unwrap()
}

struct TestServer {
    _dir: TempDir,
    state: SharedState,
    app: Router,
}

fn test_server(configure: impl FnOnce(&mut ServerConfig, &Path)) -> TestServer {
    let dir = tempdir().unwrap();
    let mut config = ServerConfig::default();
    config.model_path = write_model(&dir.path().join("model"));
    configure(&mut config, dir.path());

    let store = ModelStore::load(&config.model_path).unwrap();
    let state = Arc::new(AppState::new(config, store).unwrap());
    let app = server::build_router(Arc::clone(&state));

    TestServer {
        _dir: dir,
        state,
        app,
    }
}

fn png(width: u32, height: u32, seed: u8) -> Vec<u8> {
    let mut img = RgbImage::new(width, height);
    for (x, y, pixel) in img.enumerate_pixels_mut() {
        *pixel = Rgb([
            seed.wrapping_add((x * 13) as u8),
            seed.wrapping_mul(3).wrapping_add((y * 7) as u8),
            ((x + y) * 5) as u8,
        ]);
    }
    let mut buf = Vec::new();
    DynamicImage::ImageRgb8(img)
        .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
        .unwrap();
    buf
}

fn jpeg(width: u32, height: u32) -> Vec<u8> {
    let img = RgbImage::from_pixel(width, height, Rgb([90, 160, 40]));
    let mut buf = Vec::new();
    DynamicImage::ImageRgb8(img)
        .write_to(&mut Cursor::new(&mut buf), ImageFormat::Jpeg)
        .unwrap();
    buf
}

/// One multipart part: (field name, file name, content type, data)
type Part<'a> = (&'a str, Option<&'a str>, Option<&'a str>, &'a [u8]);

fn multipart_body(parts: &[Part<'_>]) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, file_name, content_type, data) in parts {
        body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        let disposition = match file_name {
            Some(file_name) => format!(
                "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
                name, file_name
            ),
            None => format!("Content-Disposition: form-data; name=\"{}\"\r\n", name),
        };
        body.extend_from_slice(disposition.as_bytes());
        if let Some(content_type) = content_type {
            body.extend_from_slice(format!("Content-Type: {}\r\n", content_type).as_bytes());
        }
        body.extend_from_slice(b"\r\n");
        body.extend_from_slice(data);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
    body
}

fn file_body(file_name: &str, content_type: Option<&str>, data: &[u8]) -> Vec<u8> {
    multipart_body(&[("file", Some(file_name), content_type, data)])
}

fn predict_request(body: Vec<u8>, with_length: bool) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/predict")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        );
    if with_length {
        builder = builder.header(header::CONTENT_LENGTH, body.len());
    }
    builder.body(Body::from(body)).unwrap()
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Vec<u8>) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, bytes.to_vec())
}

async fn send_json(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let (status, bytes) = send(app, request).await;
    (status, serde_json::from_slice(&bytes).unwrap())
}

fn error_message(body: &Value) -> &str {
    body["error"].as_str().expect("error body")
}

#[tokio::test]
async fn test_one_pixel_png_returns_predictions() {
    let server = test_server(|_, _| {});
    let body = file_body("leaf.png", Some("image/png"), &png(1, 1, 0));

    let (status, json) = send_json(&server.app, predict_request(body, true)).await;
    assert_eq!(status, StatusCode::OK);

    let predictions = json["predictions"].as_array().unwrap();
    assert_eq!(predictions.len(), LABELS.len());

    let scores: Vec<f64> = predictions
        .iter()
        .map(|p| p["score"].as_f64().unwrap())
        .collect();
    assert!(scores.iter().all(|s| s.is_finite() && (0.0..=1.0).contains(s)));
    assert!(scores.windows(2).all(|w| w[0] >= w[1]));
    for prediction in predictions {
        assert!(LABELS.contains(&prediction["label"].as_str().unwrap()));
        assert_eq!(prediction.as_object().unwrap().len(), 2);
    }
}

#[tokio::test]
async fn test_jpeg_with_generic_content_type_uses_extension() {
    let server = test_server(|_, _| {});
    let body = file_body("leaf.JPG", Some("application/octet-stream"), &jpeg(24, 18));

    let (status, _) = send_json(&server.app, predict_request(body, true)).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_top_k_limits_predictions() {
    let server = test_server(|config, _| config.top_k = 2);
    let body = file_body("leaf.png", Some("image/png"), &png(8, 8, 1));

    let (status, json) = send_json(&server.app, predict_request(body, true)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["predictions"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_oversized_declared_length_is_rejected_before_reading() {
    let server = test_server(|config, _| config.max_upload_bytes = 10 * 1024 * 1024);
    let payload = vec![0u8; 50 * 1024 * 1024];
    let body = file_body("huge.png", Some("image/png"), &payload);

    let (status, json) = send_json(&server.app, predict_request(body, true)).await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert!(error_message(&json).contains(&(10 * 1024 * 1024).to_string()));
    assert_eq!(server.state.engine.stats().submitted, 0);
}

#[tokio::test]
async fn test_oversized_stream_without_length_is_rejected() {
    let server = test_server(|config, _| config.max_upload_bytes = 1024);
    let payload: Vec<u8> = (0..8192u32).map(|i| (i * 7919 % 251) as u8).collect();
    let body = file_body("big.png", Some("image/png"), &payload);

    let (status, json) = send_json(&server.app, predict_request(body, false)).await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert!(error_message(&json).contains("1024"));
    assert_eq!(server.state.engine.stats().submitted, 0);
}

#[tokio::test]
async fn test_text_file_renamed_png_is_rejected() {
    let server = test_server(|_, _| {});
    let body = file_body(
        "notes.png",
        Some("image/png"),
        b"These are field notes, not an image.\n",
    );

    let (status, json) = send_json(&server.app, predict_request(body, true)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(!error_message(&json).is_empty());
    assert_eq!(server.state.engine.stats().submitted, 0);
}

#[tokio::test]
async fn test_unsupported_content_type_is_rejected() {
    let server = test_server(|_, _| {});
    let body = file_body("leaf.gif", Some("image/gif"), &png(2, 2, 0));

    let (status, json) = send_json(&server.app, predict_request(body, true)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(error_message(&json).contains("image/gif"));
}

#[tokio::test]
async fn test_missing_file_field_is_rejected() {
    let server = test_server(|_, _| {});
    let body = multipart_body(&[("comment", None, None, b"no image here")]);

    let (status, json) = send_json(&server.app, predict_request(body, true)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(error_message(&json).contains("'file'"));
}

#[tokio::test]
async fn test_empty_file_is_rejected() {
    let server = test_server(|_, _| {});
    let body = file_body("empty.png", Some("image/png"), b"");

    let (status, json) = send_json(&server.app, predict_request(body, true)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(error_message(&json).contains("empty"));
}

#[tokio::test]
async fn test_first_file_part_is_used_without_named_field() {
    let server = test_server(|_, _| {});
    let image = png(4, 4, 2);
    let body = multipart_body(&[
        ("comment", None, None, b"left orchard"),
        ("image", Some("leaf.png"), Some("image/png"), &image),
    ]);

    let (status, _) = send_json(&server.app, predict_request(body, true)).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_non_multipart_request_is_rejected() {
    let server = test_server(|_, _| {});
    let request = Request::builder()
        .method("POST")
        .uri("/predict")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(r#"{"image": "leaf.png"}"#))
        .unwrap();

    let (status, json) = send_json(&server.app, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(!error_message(&json).is_empty());
}

#[tokio::test]
async fn test_identical_uploads_give_identical_responses() {
    let server = test_server(|_, _| {});
    let image = png(30, 22, 5);

    let (first_status, first) = send(
        &server.app,
        predict_request(file_body("a.png", Some("image/png"), &image), true),
    )
    .await;
    let (second_status, second) = send(
        &server.app,
        predict_request(file_body("a.png", Some("image/png"), &image), true),
    )
    .await;

    assert_eq!(first_status, StatusCode::OK);
    assert_eq!(second_status, StatusCode::OK);
    assert_eq!(first, second);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_requests_get_their_own_results() {
    let server = test_server(|config, _| config.workers = 2);
    let images: Vec<Vec<u8>> = (0..8).map(|seed| png(12, 12, seed * 31)).collect();

    let mut expected = Vec::new();
    for image in &images {
        let (status, body) = send(
            &server.app,
            predict_request(file_body("leaf.png", Some("image/png"), image), true),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        expected.push(body);
    }

    let tasks: Vec<_> = images
        .iter()
        .map(|image| {
            let app = server.app.clone();
            let request = predict_request(file_body("leaf.png", Some("image/png"), image), true);
            tokio::spawn(async move { send(&app, request).await })
        })
        .collect();

    for (i, task) in tasks.into_iter().enumerate() {
        let (status, body) = task.await.unwrap();
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, expected[i], "request {}", i);
    }

    let stats = server.state.engine.stats();
    assert_eq!(stats.completed, 16);
    assert_eq!(stats.failed, 0);
}

#[tokio::test]
async fn test_accepted_upload_is_archived() {
    let server = test_server(|config, dir| config.upload_dir = Some(dir.join("uploads")));
    let upload_dir = server.state.config.upload_dir.clone().unwrap();
    let image = png(4, 4, 7);

    let (status, _) = send_json(
        &server.app,
        predict_request(file_body("leaf.png", Some("image/png"), &image), true),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let mut archived: Vec<PathBuf> = Vec::new();
    for _ in 0..50 {
        archived = std::fs::read_dir(&upload_dir)
            .map(|entries| entries.filter_map(|e| e.ok()).map(|e| e.path()).collect())
            .unwrap_or_default();
        if !archived.is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    assert_eq!(archived.len(), 1);
    assert!(archived[0].extension().is_some_and(|e| e == "png"));
    assert_eq!(std::fs::read(&archived[0]).unwrap(), image);
}

#[tokio::test]
async fn test_rejected_upload_is_not_archived() {
    let server = test_server(|config, dir| config.upload_dir = Some(dir.join("uploads")));
    let upload_dir = server.state.config.upload_dir.clone().unwrap();

    let body = file_body("notes.png", Some("image/png"), b"plain text");
    let (status, _) = send_json(&server.app, predict_request(body, true)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!upload_dir.exists());
}

#[tokio::test]
async fn test_archive_failure_does_not_affect_response() {
    let server = test_server(|config, dir| {
        let blocker = dir.join("occupied");
        std::fs::write(&blocker, b"").unwrap();
        config.upload_dir = Some(blocker);
    });

    let body = file_body("leaf.png", Some("image/png"), &png(4, 4, 3));
    let (status, json) = send_json(&server.app, predict_request(body, true)).await;
    assert_eq!(status, StatusCode::OK);
    assert!(!json["predictions"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_custom_predict_path() {
    let server = test_server(|config, _| config.predict_path = "/v1/classify".to_string());
    let body = file_body("leaf.png", Some("image/png"), &png(2, 2, 0));

    let request = Request::builder()
        .method("POST")
        .uri("/v1/classify")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(body))
        .unwrap();
    let (status, _) = send(&server.app, request).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_health_reports_engine_counters() {
    let server = test_server(|_, _| {});
    let body = file_body("leaf.png", Some("image/png"), &png(2, 2, 0));
    send(&server.app, predict_request(body, true)).await;

    let request = Request::builder()
        .uri("/health")
        .body(Body::empty())
        .unwrap();
    let (status, json) = send_json(&server.app, request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
    assert_eq!(json["model"], "apple-test");
    assert_eq!(json["engine"]["completed"], 1);
    assert_eq!(json["engine"]["workers"], 1);
}

#[tokio::test]
async fn test_model_endpoint_describes_artifact() {
    let server = test_server(|_, _| {});
    let request = Request::builder()
        .uri("/model")
        .body(Body::empty())
        .unwrap();
    let (status, json) = send_json(&server.app, request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["name"], "apple-test");
    assert_eq!(json["labels"].as_array().unwrap().len(), 4);
    assert_eq!(json["input_shape"], serde_json::json!([3, 16, 16]));
    assert_eq!(json["head"], "softmax");
}

#[tokio::test]
async fn test_timeout_returns_generic_504() {
    let server = test_server(|config, _| config.request_timeout_ms = 1);
    // Inflating 27 MB of pixels takes far longer than the 1 ms deadline
    let image = RgbImage::from_pixel(3000, 3000, Rgb([90, 160, 40]));
    let mut bytes = Vec::new();
    DynamicImage::ImageRgb8(image)
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .unwrap();

    let body = file_body("leaf.png", Some("image/png"), &bytes);
    let (status, json) = send_json(&server.app, predict_request(body, true)).await;
    assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
    assert_eq!(json, serde_json::json!({"error": "Request timed out"}));
}

#[tokio::test]
async fn test_stopped_engine_returns_generic_500() {
    let server = test_server(|_, _| {});
    server.state.engine.shutdown();

    let body = file_body("leaf.png", Some("image/png"), &png(4, 4, 1));
    let (status, json) = send_json(&server.app, predict_request(body, true)).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json, serde_json::json!({"error": "Internal server error"}));
}

#[test]
fn test_dimension_cap_below_resize_edge_is_rejected() {
    let dir = tempdir().unwrap();
    let mut config = ServerConfig::default();
    config.model_path = write_model(dir.path());
    config.max_image_dimension = 19;

    let store = ModelStore::load(&config.model_path).unwrap();
    match AppState::new(config, store) {
        Err(ServeError::Config(msg)) => assert!(msg.contains("resize edge 20")),
        other => panic!("expected config error, got {:?}", other.map(|_| ())),
    }
}

#[tokio::test]
async fn test_missing_model_fails_before_binding() {
    let dir = tempdir().unwrap();
    let mut config = ServerConfig::default();
    config.host = "127.0.0.1".to_string();
    config.port = 0;
    config.model_path = dir.path().join("missing/model.json");

    match server::run(config).await {
        Err(ServeError::Startup(msg)) => assert!(msg.contains("not found")),
        other => panic!("expected startup error, got {:?}", other),
    }
}
