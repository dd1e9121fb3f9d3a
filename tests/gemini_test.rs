//! GeminiVerifier against a local stand-in for the generateContent API

use attendify::config::VerificationConfig;
use attendify::verify::{FaceVerifier, GeminiVerifier};
use axum::body::Bytes;
use axum::http::{header, HeaderMap, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::Router;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use tokio_test::{assert_err, assert_ok};

const REFERENCE_BYTES: &[u8] = b"reference-png";

/// What the stand-in saw: path, api key header and JSON body of each POST
#[derive(Clone, Default)]
struct Seen {
    calls: Arc<Mutex<Vec<(String, Option<String>, Value)>>>,
}

/// Serves `/ref.png`, 404s other GETs and answers every POST with `status` and `verdict`
async fn spawn_api(status: StatusCode, verdict: &'static str) -> (String, Seen) {
    let seen = Seen::default();
    let recorder = seen.clone();
    let app = Router::new().fallback(move |method: Method, uri: Uri, headers: HeaderMap, body: Bytes| {
        let recorder = recorder.clone();
        async move {
            if method == Method::GET {
                if uri.path() == "/ref.png" {
                    return ([(header::CONTENT_TYPE, "image/png")], REFERENCE_BYTES).into_response();
                }
                return StatusCode::NOT_FOUND.into_response();
            }
            let key = headers
                .get("x-goog-api-key")
                .and_then(|v| v.to_str().ok())
                .map(String::from);
            let parsed: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);
            recorder.calls.lock().unwrap().push((uri.path().to_string(), key, parsed));

            let reply: Response = if status.is_success() {
                axum::Json(json!({
                    "candidates": [{ "content": { "parts": [{ "text": verdict }], "role": "model" } }]
                }))
                .into_response()
            } else {
                (status, "upstream exploded").into_response()
            };
            reply
        }
    });

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{}", addr), seen)
}

fn config(root: &str, demo_mode: bool) -> VerificationConfig {
    VerificationConfig {
        model: "gemini-test".to_string(),
        base_url: format!("{}/v1beta/", root),
        timeout_secs: 5,
        demo_mode,
    }
}

#[tokio::test]
async fn sends_both_images_and_parses_verdict() {
    let (root, seen) = spawn_api(
        StatusCode::OK,
        r#"{"match": true, "confidence": 0.87, "message": "Identity confirmed."}"#,
    )
    .await;
    let verifier = GeminiVerifier::new("test-key".to_string(), &config(&root, false));

    let result = assert_ok!(verifier.verify("data:image/jpeg;base64,Q0FQ", "UkVG").await);
    assert!(result.is_match);
    assert_eq!(result.confidence, 0.87);
    assert_eq!(result.message, "Identity confirmed.");

    let calls = seen.calls.lock().unwrap();
    assert_eq!(calls.len(), 1);
    let (path, key, body) = &calls[0];
    assert_eq!(path, "/v1beta/models/gemini-test:generateContent");
    assert_eq!(key.as_deref(), Some("test-key"));
    let parts = body["contents"][0]["parts"].as_array().unwrap();
    assert_eq!(parts[1]["inlineData"]["data"], "UkVG");
    assert_eq!(parts[2]["inlineData"]["data"], "Q0FQ");
}

#[tokio::test]
async fn remote_reference_is_fetched_and_inlined() {
    let (root, seen) = spawn_api(
        StatusCode::OK,
        r#"{"match": false, "confidence": 0.12, "message": "Different person."}"#,
    )
    .await;
    let verifier = GeminiVerifier::new("test-key".to_string(), &config(&root, false));

    let reference = format!("{}/ref.png", root);
    let result = assert_ok!(verifier.verify("Q0FQ", &reference).await);
    assert!(!result.is_match);

    let calls = seen.calls.lock().unwrap();
    let reference_part = &calls[0].2["contents"][0]["parts"][1]["inlineData"];
    assert_eq!(reference_part["mimeType"], "image/png");
    assert_eq!(reference_part["data"], BASE64.encode(REFERENCE_BYTES));
}

#[tokio::test]
async fn api_failure_is_an_error_outside_demo_mode() {
    let (root, _) = spawn_api(StatusCode::INTERNAL_SERVER_ERROR, "").await;
    let verifier = GeminiVerifier::new("test-key".to_string(), &config(&root, false));

    let err = assert_err!(verifier.verify("Q0FQ", "UkVG").await);
    assert!(format!("{:#}", err).contains("500"));
}

#[tokio::test]
async fn api_failure_uses_fail_safe_in_demo_mode() {
    let (root, seen) = spawn_api(StatusCode::SERVICE_UNAVAILABLE, "").await;
    let verifier = GeminiVerifier::new("test-key".to_string(), &config(&root, true));

    let result = assert_ok!(verifier.verify("Q0FQ", "UkVG").await);
    assert!(result.is_match);
    assert_eq!(result.confidence, 0.95);
    assert_eq!(seen.calls.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn unreachable_reference_is_an_error_outside_demo_mode() {
    let (root, seen) = spawn_api(StatusCode::OK, "{}").await;
    let verifier = GeminiVerifier::new("test-key".to_string(), &config(&root, false));

    let missing = format!("{}/missing.png", root);
    assert_err!(verifier.verify("Q0FQ", &missing).await);
    // the model is never asked
    assert!(seen.calls.lock().unwrap().is_empty());
}
