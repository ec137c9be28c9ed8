//! REST API tests.
//!
//! The router runs over the in-memory stack, so these need no database.

mod common;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::json;
use tower::ServiceExt;

use agri_seal::domain::{Challenge, SealId};
use agri_seal::server::{build_router, AppState};

use common::*;

fn app(ctx: &TestContext) -> Router {
    build_router()
        .expect("router")
        .with_state(AppState::new(ctx.service.clone(), None))
}

/// Send a request to the test router.
async fn send_request(
    app: &Router,
    method: Method,
    uri: &str,
    body: Option<serde_json::Value>,
) -> (StatusCode, Option<String>, serde_json::Value) {
    let mut builder = Request::builder().method(method).uri(uri);

    if body.is_some() {
        builder = builder.header("content-type", "application/json");
    }

    let body = body
        .map(|v| Body::from(serde_json::to_vec(&v).unwrap()))
        .unwrap_or_else(|| Body::from(Vec::new()));

    let response = app
        .clone()
        .oneshot(builder.body(body).unwrap())
        .await
        .unwrap();

    let status = response.status();
    let error_code = response
        .headers()
        .get("x-error-code")
        .map(|v| v.to_str().unwrap().to_string());
    let bytes = response
        .into_body()
        .collect()
        .await
        .unwrap()
        .to_bytes()
        .to_vec();

    let json = if bytes.is_empty() {
        json!({})
    } else {
        serde_json::from_slice(&bytes)
            .unwrap_or_else(|_| json!({ "raw": String::from_utf8_lossy(&bytes) }))
    };

    (status, error_code, json)
}

#[tokio::test]
async fn test_provision_attach_verify_over_http() {
    let ctx = TestContext::new();
    let app = app(&ctx);

    let (status, _, body) = send_request(
        &app,
        Method::POST,
        "/api/v1/seals",
        Some(json!({ "serialNumber": "seal-0001" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["seal"]["serialNumber"], "SEAL-0001");
    assert_eq!(body["seal"]["status"], "PROVISIONED");
    assert_eq!(body["publicKey"].as_str().unwrap().len(), 64);
    assert!(body["seal"].get("encryptedPrivateKey").is_none());
    let seal_id = body["seal"]["id"].as_str().unwrap().to_string();

    let (status, _, body) = send_request(
        &app,
        Method::POST,
        &format!("/api/v1/seals/{seal_id}/attach"),
        Some(json!({ "shipmentRef": SHIPMENT, "attachedBy": "field-agent" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ATTACHED");
    assert_eq!(body["shipmentRef"], SHIPMENT);

    let (status, _, body) = send_request(
        &app,
        Method::GET,
        "/api/v1/seals/serial/SEAL-0001/challenge",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let challenge = Challenge::from_hex(body["challenge"].as_str().unwrap()).unwrap();

    let seal = ctx
        .service
        .get_seal(SealId::from_uuid(seal_id.parse().unwrap()))
        .await
        .unwrap();
    let key = ctx.custody.unseal(&seal).unwrap();
    let signature = hex::encode(key.sign_challenge(challenge.as_bytes()));

    let (status, _, body) = send_request(
        &app,
        Method::POST,
        "/api/v1/seals/verify",
        Some(json!({
            "serialNumber": "SEAL-0001",
            "signature": format!("0x{signature}"),
            "readCounter": 1,
            "verifiedBy": "inspector-7",
            "location": { "name": "Port of Santos", "lat": -23.96, "lng": -46.33 },
            "deviceInfo": { "reader": "ACR122U" }
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["isValid"], true);
    assert_eq!(body["tamperIndicator"], "NONE");
    assert_eq!(body["integrityScore"], 100);
    assert_ne!(body["nextChallenge"], json!(challenge.to_hex()));
    assert_eq!(body["verification"]["location"], "Port of Santos");

    let (status, _, body) = send_request(
        &app,
        Method::GET,
        &format!("/api/v1/seals/{seal_id}/integrity"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["score"], 100);
    assert_eq!(body["totalAttempts"], 1);

    let (status, _, body) = send_request(
        &app,
        Method::GET,
        &format!("/api/v1/seals/{seal_id}/verifications"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);

    let (status, _, body) = send_request(
        &app,
        Method::GET,
        &format!("/api/v1/shipments/{SHIPMENT}/integrity"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["totalSeals"], 1);
    assert_eq!(body["intact"], true);
}

#[tokio::test]
async fn test_error_responses_carry_codes() {
    let ctx = TestContext::new();
    let app = app(&ctx);

    let provision = || {
        send_request(
            &app,
            Method::POST,
            "/api/v1/seals",
            Some(json!({ "serialNumber": "SEAL-0002" })),
        )
    };
    let (status, _, body) = provision().await;
    assert_eq!(status, StatusCode::CREATED);
    let seal_id = body["seal"]["id"].as_str().unwrap().to_string();

    let (status, code, body) = provision().await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(code.as_deref(), Some("CONFLICT"));
    assert_eq!(body["error"]["code"], "CONFLICT");

    let (status, code, _) = send_request(
        &app,
        Method::POST,
        "/api/v1/seals",
        Some(json!({ "serialNumber": "SEAL 2" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(code.as_deref(), Some("INVALID_FORMAT"));

    let (status, code, body) = send_request(
        &app,
        Method::POST,
        &format!("/api/v1/seals/{seal_id}/remove"),
        Some(json!({ "removedBy": "warehouse-3", "reason": "unused" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(code.as_deref(), Some("INVALID_STATE"));
    assert!(body["error"]["message"]
        .as_str()
        .unwrap()
        .contains("PROVISIONED"));

    let (status, code, _) = send_request(
        &app,
        Method::POST,
        &format!("/api/v1/seals/{seal_id}/attach"),
        Some(json!({ "shipmentRef": "SHP-404", "attachedBy": "field-agent" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(code.as_deref(), Some("NOT_FOUND"));

    let (status, code, _) = send_request(
        &app,
        Method::GET,
        &format!("/api/v1/seals/{}", uuid::Uuid::new_v4()),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(code.as_deref(), Some("NOT_FOUND"));

    let (status, code, _) =
        send_request(&app, Method::GET, "/api/v1/seals/not-a-uuid", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(code.as_deref(), Some("INVALID_REQUEST_BODY"));

    let (status, code, _) = send_request(
        &app,
        Method::GET,
        "/api/v1/seals/serial/SEAL-9999/challenge",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(code.as_deref(), Some("NOT_FOUND"));

    let (status, code, _) = send_request(
        &app,
        Method::POST,
        "/api/v1/seals/verify",
        Some(json!({
            "serialNumber": "SEAL-0002",
            "signature": "zz",
            "readCounter": 1,
            "verifiedBy": "inspector-7"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(code.as_deref(), Some("INVALID_FORMAT"));

    let (status, code, _) = send_request(
        &app,
        Method::POST,
        "/api/v1/seals/verify",
        Some(json!({ "serialNumber": "SEAL-0002" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(code.as_deref(), Some("INVALID_REQUEST_BODY"));
}

#[tokio::test]
async fn test_batch_and_inventory_endpoints() {
    let ctx = TestContext::new();
    let app = app(&ctx);

    let (status, _, body) = send_request(
        &app,
        Method::POST,
        "/api/v1/seals/batch",
        Some(json!({
            "seals": [
                { "serialNumber": "SEAL-0003" },
                { "serialNumber": "bad serial" },
                { "serialNumber": "SEAL-0004", "expiresAt": "2099-01-01T00:00:00Z" }
            ]
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["provisioned"], 2);
    assert_eq!(body["failed"], 1);
    assert_eq!(body["results"][1]["error"]["kind"], "INVALID_FORMAT");

    let (status, _, body) = send_request(
        &app,
        Method::GET,
        "/api/v1/seals/available?limit=1",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);

    let (status, _, body) = send_request(&app, Method::GET, "/api/v1/seals/stats", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 2);
    assert_eq!(body["byStatus"]["PROVISIONED"], 2);
    assert_eq!(body["byStatus"]["TAMPERED"], 0);

    let (status, _, body) = send_request(&app, Method::POST, "/api/v1/seals/expire", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["expired"], 0);

    let (status, _, body) =
        send_request(&app, Method::GET, "/api/v1/seals/serial/seal-0004", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["serialNumber"], "SEAL-0004");
    assert!(body["expiresAt"].is_string());
}

#[tokio::test]
async fn test_health_and_readiness() {
    let ctx = TestContext::new();
    let app = app(&ctx);

    let (status, _, body) = send_request(&app, Method::GET, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");

    let (status, _, body) = send_request(&app, Method::GET, "/ready", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ready");
}
