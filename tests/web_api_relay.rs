//! Web API Relay Tests
//!
//! Integration tests for upload, download and admission control.

mod common;

use std::sync::Arc;

use axum::http::header::{CONTENT_DISPOSITION, CONTENT_TYPE, RETRY_AFTER};
use axum::http::{HeaderName, StatusCode};
use chrono::{Duration, Utc};
use serde_json::Value;

use coderelay::config::WebConfig;
use coderelay::web::handlers::AppState;
use coderelay::web::router::create_router;
use coderelay::ExpirySweeper;
use common::{create_test_relay, create_test_relay_with, file_form, start, test_config};

const X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");

/// Upload `content` and return the JSON body.
async fn upload(server: &axum_test::TestServer, name: &str, content: &[u8]) -> Value {
    let response = server.post("/upload").multipart(file_form(name, content)).await;
    response.assert_status_ok();
    response.json::<Value>()
}

fn code_of(body: &Value) -> String {
    body["data"]["code"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_ping() {
    let relay = create_test_relay();

    let response = relay.server.get("/ping").await;

    response.assert_status_ok();
    assert_eq!(response.json::<Value>()["message"], "pong");
}

#[tokio::test]
async fn test_upload_returns_code() {
    let relay = create_test_relay();

    let body = upload(&relay.server, "notes.txt", b"0123456789").await;

    let code = code_of(&body);
    assert_eq!(code.len(), 4);
    assert!(code.chars().all(|c| c.is_ascii_digit()));
    assert_eq!(body["data"]["size_bytes"], 10);
    assert_eq!(body["data"]["remaining_downloads"], 3);
    assert!(body["data"]["expires_at"].is_string());

    assert!(relay.state.store.contains(&code));
    assert!(relay.state.storage.exists(&code));
}

#[tokio::test]
async fn test_download_quota() {
    let relay = create_test_relay();
    let code = code_of(&upload(&relay.server, "notes.txt", b"0123456789").await);

    for _ in 0..3 {
        let response = relay
            .server
            .get("/download")
            .add_query_param("code", &code)
            .await;

        response.assert_status_ok();
        assert_eq!(response.as_bytes().as_ref(), b"0123456789");
        assert_eq!(
            response.header(CONTENT_DISPOSITION),
            "attachment; filename=\"notes.txt\""
        );
        assert_eq!(response.header(CONTENT_TYPE), "text/plain");
    }

    let response = relay
        .server
        .get("/download")
        .add_query_param("code", &code)
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
    let body = response.json::<Value>();
    assert_eq!(body["error"]["code"], "INVALID_CODE");
    assert_eq!(body["error"]["message"], "Invalid code");
}

#[tokio::test]
async fn test_download_unknown_code() {
    let relay = create_test_relay();

    for code in ["0000", "abcd", ""] {
        let response = relay
            .server
            .get("/download")
            .add_query_param("code", code)
            .await;

        response.assert_status(StatusCode::BAD_REQUEST);
        assert_eq!(response.json::<Value>()["error"]["message"], "Invalid code");
    }

    let response = relay.server.get("/download").await;
    response.assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_download_trims_code() {
    let relay = create_test_relay();
    let code = code_of(&upload(&relay.server, "a.bin", b"abc").await);

    let response = relay
        .server
        .get("/download")
        .add_query_param("code", format!(" {code} "))
        .await;

    response.assert_status_ok();
    assert_eq!(response.as_bytes().as_ref(), b"abc");
}

#[tokio::test]
async fn test_upload_without_file() {
    let relay = create_test_relay();

    let form = axum_test::multipart::MultipartForm::new().add_text("comment", "no file here");
    let response = relay.server.post("/upload").multipart(form).await;

    response.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(response.json::<Value>()["error"]["code"], "BAD_REQUEST");
    assert!(relay.state.store.is_empty());
}

#[tokio::test]
async fn test_upload_too_large() {
    let temp_dir = tempfile::TempDir::new().unwrap();
    let config = test_config(&temp_dir);
    let defaults = AppState::from_config(&config).unwrap();
    let state = Arc::new(AppState::new(
        defaults.store,
        defaults.storage,
        defaults.limiters,
        16,
    ));
    let relay = start(state, &config, temp_dir);

    let response = relay
        .server
        .post("/upload")
        .multipart(file_form("big.bin", &[7u8; 17]))
        .await;

    response.assert_status(StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(
        response.json::<Value>()["error"]["code"],
        "PAYLOAD_TOO_LARGE"
    );
    assert!(relay.state.store.is_empty());

    // Far over the body limit as well
    let response = relay
        .server
        .post("/upload")
        .multipart(file_form("huge.bin", &vec![7u8; 256 * 1024]))
        .await;

    response.assert_status(StatusCode::PAYLOAD_TOO_LARGE);
    assert!(relay.state.store.is_empty());

    // Exactly at the cap is accepted
    let response = relay
        .server
        .post("/upload")
        .multipart(file_form("fits.bin", &[7u8; 16]))
        .await;

    response.assert_status_ok();
}

#[tokio::test]
async fn test_upload_sanitizes_filename() {
    let relay = create_test_relay();
    let code = code_of(&upload(&relay.server, "../../etc/passwd", b"x").await);

    let stored = relay.state.storage.locate(&code).unwrap();
    assert_eq!(stored.file_name, "passwd");
    assert!(stored.path.starts_with(relay.state.storage.base_path()));
}

#[tokio::test]
async fn test_download_non_ascii_filename() {
    let relay = create_test_relay();
    let code = code_of(&upload(&relay.server, "資料.txt", b"data").await);

    let response = relay
        .server
        .get("/download")
        .add_query_param("code", &code)
        .await;

    response.assert_status_ok();
    let disposition = response.header(CONTENT_DISPOSITION);
    let disposition = disposition.to_str().unwrap();
    assert!(disposition.contains("filename*=UTF-8''%E8%B3%87%E6%96%99.txt"));
}

#[tokio::test]
async fn test_expired_code_is_invalid_and_swept() {
    let relay = create_test_relay_with(|config| config.relay.ttl_secs = 60);
    let state = &relay.state;

    let uploaded_at = Utc::now() - Duration::seconds(61);
    let entry = state.store.create_at(4, uploaded_at).unwrap();
    state.storage.save(&entry.code, "old.txt", b"old!").unwrap();

    let response = relay
        .server
        .get("/download")
        .add_query_param("code", &entry.code)
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(response.json::<Value>()["error"]["message"], "Invalid code");

    let sweeper = ExpirySweeper::new(
        Arc::clone(&state.store),
        state.storage.clone(),
        std::time::Duration::from_secs(3600),
    );
    let report = sweeper.sweep();

    assert_eq!(report.evicted, vec![entry.code.clone()]);
    assert!(!state.store.contains(&entry.code));
    assert!(!state.storage.exists(&entry.code));
}

#[tokio::test]
async fn test_rate_limit_per_client() {
    let relay = create_test_relay_with(|config| {
        config.rate_limit.capacity = 3;
        config.rate_limit.refill_interval_ms = 60_000;
        config.web.trust_forwarded_headers = true;
    });

    for _ in 0..3 {
        relay
            .server
            .get("/ping")
            .add_header(X_FORWARDED_FOR, "10.0.0.1")
            .await
            .assert_status_ok();
    }

    let response = relay
        .server
        .get("/ping")
        .add_header(X_FORWARDED_FOR, "10.0.0.1")
        .await;
    response.assert_status(StatusCode::TOO_MANY_REQUESTS);
    let retry_after: u64 = response
        .header(RETRY_AFTER)
        .to_str()
        .unwrap()
        .parse()
        .unwrap();
    assert!(retry_after >= 1);
    assert_eq!(
        response.json::<Value>()["error"]["code"],
        "TOO_MANY_REQUESTS"
    );

    // A denied upload never reaches the store
    let response = relay
        .server
        .post("/upload")
        .add_header(X_FORWARDED_FOR, "10.0.0.1")
        .multipart(file_form("a.txt", b"a"))
        .await;
    response.assert_status(StatusCode::TOO_MANY_REQUESTS);
    assert!(relay.state.store.is_empty());

    // Another client has its own bucket
    relay
        .server
        .get("/ping")
        .add_header(X_FORWARDED_FOR, "10.0.0.2")
        .await
        .assert_status_ok();
}

#[tokio::test]
async fn test_forwarded_headers_ignored_by_default() {
    let relay = create_test_relay_with(|config| {
        config.rate_limit.capacity = 2;
        config.rate_limit.refill_interval_ms = 60_000;
    });

    relay
        .server
        .get("/ping")
        .add_header(X_FORWARDED_FOR, "10.0.0.1")
        .await
        .assert_status_ok();
    relay
        .server
        .get("/ping")
        .add_header(X_FORWARDED_FOR, "10.0.0.2")
        .await
        .assert_status_ok();

    // Spoofed addresses still share one bucket
    relay
        .server
        .get("/ping")
        .add_header(X_FORWARDED_FOR, "10.0.0.3")
        .await
        .assert_status(StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn test_code_space_exhausted() {
    let relay = create_test_relay_with(|config| {
        config.relay.code_length = 1;
        config.relay.max_code_attempts = 5;
    });

    let mut codes = Vec::new();
    for i in 0..10 {
        let body = upload(&relay.server, "f.txt", format!("{i}").as_bytes()).await;
        codes.push(code_of(&body));
    }
    codes.sort();
    codes.dedup();
    assert_eq!(codes.len(), 10);

    let response = relay
        .server
        .post("/upload")
        .multipart(file_form("f.txt", b"x"))
        .await;
    response.assert_status(StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_aborted_download_keeps_decrement() {
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    let relay = create_test_relay();
    let code = code_of(&upload(&relay.server, "big.bin", &vec![1u8; 512 * 1024]).await);

    let router = create_router(Arc::clone(&relay.state), &WebConfig::default());
    let request = Request::builder()
        .uri(format!("/download?code={code}"))
        .body(Body::empty())
        .unwrap();
    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // Client goes away before reading the body
    drop(response);

    assert_eq!(
        relay.state.store.get(&code).unwrap().remaining_downloads,
        2
    );
}

#[tokio::test]
async fn test_download_with_missing_file_spends_quota() {
    let relay = create_test_relay();
    let code = code_of(&upload(&relay.server, "notes.txt", b"0123456789").await);

    assert!(relay.state.storage.delete(&code).unwrap());

    let response = relay
        .server
        .get("/download")
        .add_query_param("code", &code)
        .await;

    response.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(response.json::<Value>()["error"]["code"], "INTERNAL_ERROR");
    assert_eq!(
        relay.state.store.get(&code).unwrap().remaining_downloads,
        2
    );
}
