//! Shared harness for warden integration tests.
//!
//! Provides a mock settings endpoint, fake package-manager executables
//! backed by shell scripts, and condition-polling helpers.

#![allow(dead_code)]

use std::future::Future;
use std::net::SocketAddr;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::Value;
use tempfile::TempDir;

use warden::config::{Config, RetryConfig, WorkerConfig};

// =============================================================================
// Mock settings API
// =============================================================================

/// Canned behavior for the mock settings endpoint.
pub enum MockResponse {
    /// 200 with the given JSON body.
    Ok(Value),
    /// The given status with a short plain-text body.
    Status(StatusCode),
    /// 200 with a raw (possibly malformed) body.
    Raw(String),
}

#[derive(Clone)]
struct MockApi {
    fetches: Arc<AtomicUsize>,
    auth_headers: Arc<Mutex<Vec<String>>>,
    response: Arc<MockResponse>,
}

/// A running mock settings server.
pub struct MockServer {
    pub addr: SocketAddr,
    pub fetches: Arc<AtomicUsize>,
    pub auth_headers: Arc<Mutex<Vec<String>>>,
}

impl MockServer {
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn recorded_auth_headers(&self) -> Vec<String> {
        self.auth_headers.lock().unwrap().clone()
    }
}

/// Spawn a settings endpoint at `/v1/settings` with the given behavior.
pub async fn spawn_settings_server(response: MockResponse) -> MockServer {
    let fetches = Arc::new(AtomicUsize::new(0));
    let auth_headers = Arc::new(Mutex::new(Vec::new()));
    let api = MockApi {
        fetches: fetches.clone(),
        auth_headers: auth_headers.clone(),
        response: Arc::new(response),
    };

    let app = Router::new()
        .route("/v1/settings", get(serve_settings))
        .with_state(api);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    MockServer {
        addr,
        fetches,
        auth_headers,
    }
}

async fn serve_settings(State(api): State<MockApi>, headers: HeaderMap) -> Response {
    api.fetches.fetch_add(1, Ordering::SeqCst);
    if let Some(auth) = headers.get(axum::http::header::AUTHORIZATION) {
        api.auth_headers
            .lock()
            .unwrap()
            .push(auth.to_str().unwrap_or_default().to_string());
    }

    match api.response.as_ref() {
        MockResponse::Ok(value) => Json(value.clone()).into_response(),
        MockResponse::Status(code) => (*code, "unavailable").into_response(),
        MockResponse::Raw(body) => body.clone().into_response(),
    }
}

// =============================================================================
// Fake package manager
// =============================================================================

/// A fake package-manager executable backed by a shell script.
///
/// Every invocation is appended to a log file. `install` records the
/// requested version in a state file, which later `list` calls report as the
/// installed version — so install-then-probe behaves like the real thing.
pub struct FakePackageManager {
    pub dir: TempDir,
    pub script: PathBuf,
    log: PathBuf,
    state: PathBuf,
}

impl FakePackageManager {
    pub fn new(package: &str) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("invocations.log");
        let state = dir.path().join("installed-version");
        let script = dir.path().join("fake-npm");
        let body = format!(
            r#"#!/bin/sh
echo "$*" >> "{log}"
case "$1" in
  list)
    if [ -f "{state}" ]; then
      printf '{{"dependencies":{{"{package}":{{"version":"%s"}}}}}}' "$(cat "{state}")"
    else
      printf '{{"dependencies":{{}}}}'
    fi
    ;;
  install)
    echo "${{2##*#v}}" > "{state}"
    ;;
esac
"#,
            log = log.display(),
            state = state.display(),
        );
        make_executable(&script, &body);

        Self {
            dir,
            script,
            log,
            state,
        }
    }

    /// Pre-seed the installed version, as if a prior install had happened.
    pub fn set_installed(&self, version: &str) {
        std::fs::write(&self.state, format!("{version}\n")).unwrap();
    }

    /// The version the fake currently reports as installed.
    pub fn installed(&self) -> Option<String> {
        std::fs::read_to_string(&self.state)
            .ok()
            .map(|s| s.trim().to_string())
    }

    /// All recorded invocations, one argv line each.
    pub fn invocations(&self) -> Vec<String> {
        std::fs::read_to_string(&self.log)
            .map(|s| s.lines().map(str::to_owned).collect())
            .unwrap_or_default()
    }

    pub fn install_count(&self) -> usize {
        self.invocations()
            .iter()
            .filter(|line| line.starts_with("install "))
            .count()
    }

    /// Worker configuration pointing at this fake and its directory.
    pub fn worker_config(&self) -> WorkerConfig {
        WorkerConfig {
            package: "imgworker".to_string(),
            repo: "https://github.com/imgworker/imgworker.git".to_string(),
            script: "worker.sh".to_string(),
            runtime: "sh".to_string(),
            package_manager: self.script.display().to_string(),
            install_dir: self.dir.path().to_path_buf(),
        }
    }
}

/// Write `body` to `path` and mark it executable.
pub fn make_executable(path: &Path, body: &str) {
    std::fs::write(path, body).unwrap();
    let mut perms = std::fs::metadata(path).unwrap().permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(path, perms).unwrap();
}

/// Write the `worker.sh` script the launcher will run in `dir`.
pub fn write_worker_script(dir: &Path, body: &str) {
    std::fs::write(dir.join("worker.sh"), body).unwrap();
}

// =============================================================================
// Configuration builders
// =============================================================================

pub fn test_api_key() -> String {
    let id: String = std::iter::repeat('a').take(40).collect();
    let secret: String = std::iter::repeat('b').take(40).collect();
    format!("{id}{secret}")
}

/// Supervisor configuration against a mock server, with fast retries.
pub fn supervisor_config(addr: SocketAddr, worker: WorkerConfig) -> Config {
    Config {
        api_key: test_api_key(),
        host: format!("http://{addr}"),
        api_endpoint: "/v1/settings".to_string(),
        instance_id: Some("test-instance".to_string()),
        worker,
        retry: RetryConfig {
            base_delay_ms: 10,
            max_delay_ms: 100,
            max_attempts: None,
        },
    }
}

/// Configuration for settings-client tests; the worker section is unused.
pub fn api_config(addr: SocketAddr) -> Config {
    supervisor_config(addr, WorkerConfig::default())
}

// =============================================================================
// Polling helpers
// =============================================================================

/// Wait for a condition to become true with timeout
pub async fn wait_for<F, Fut>(
    condition: F,
    timeout_duration: Duration,
    poll_interval: Duration,
) -> bool
where
    F: Fn() -> Fut,
    Fut: Future<Output = bool>,
{
    let start = tokio::time::Instant::now();
    while start.elapsed() < timeout_duration {
        if condition().await {
            return true;
        }
        tokio::time::sleep(poll_interval).await;
    }
    false
}

/// Assert a condition eventually becomes true
pub async fn assert_eventually<F, Fut>(condition: F, timeout_duration: Duration, message: &str)
where
    F: Fn() -> Fut,
    Fut: Future<Output = bool>,
{
    let result = wait_for(condition, timeout_duration, Duration::from_millis(50)).await;
    assert!(result, "{}", message);
}
