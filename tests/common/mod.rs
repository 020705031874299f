//! Test helpers for relay integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use axum_test::multipart::{MultipartForm, Part};
use axum_test::TestServer;
use tempfile::TempDir;

use coderelay::config::Config;
use coderelay::web::handlers::AppState;
use coderelay::web::router::create_router;

/// A relay served by an in-process test server.
pub struct TestRelay {
    /// HTTP test client.
    pub server: TestServer,
    /// State shared with the handlers.
    pub state: Arc<AppState>,
    /// Keeps the storage directory alive.
    pub temp_dir: TempDir,
}

/// Default configuration with storage in `temp_dir` and a generous limiter.
pub fn test_config(temp_dir: &TempDir) -> Config {
    let mut config = Config::default();
    config.storage.path = temp_dir
        .path()
        .join("relay")
        .to_string_lossy()
        .into_owned();
    config.rate_limit.capacity = 1000;
    config
}

/// Start a relay with the default test configuration.
pub fn create_test_relay() -> TestRelay {
    create_test_relay_with(|_| {})
}

/// Start a relay after letting `customize` adjust the configuration.
pub fn create_test_relay_with(customize: impl FnOnce(&mut Config)) -> TestRelay {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let mut config = test_config(&temp_dir);
    customize(&mut config);

    let state = Arc::new(AppState::from_config(&config).expect("Failed to build app state"));
    start(state, &config, temp_dir)
}

/// Start a relay around an existing state.
pub fn start(state: Arc<AppState>, config: &Config, temp_dir: TempDir) -> TestRelay {
    let router = create_router(Arc::clone(&state), &config.web);
    let server = TestServer::new(router).expect("Failed to create test server");

    TestRelay {
        server,
        state,
        temp_dir,
    }
}

/// Multipart form carrying `content` as the `file` field.
pub fn file_form(file_name: &str, content: &[u8]) -> MultipartForm {
    MultipartForm::new().add_part(
        "file",
        Part::bytes(content.to_vec())
            .file_name(file_name.to_string())
            .mime_type("application/octet-stream"),
    )
}
