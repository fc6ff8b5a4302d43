#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, Response};
use axum::Router;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use http_body_util::BodyExt;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

use bacillus_api::config::ServerConfig;
use bacillus_api::router::build_app_router;
use bacillus_api::state::AppState;
use bacillus_core::engine::Engine;
use bacillus_core::jobs::JobTable;
use bacillus_core::runlog::RunLog;

pub const TEST_USER: &str = "tester";
pub const TEST_PASSWORD: &str = "s3cret";

/// A job script that blocks until the file named by `$RELEASE` exists, then
/// exits with `$CODE` (default 0).
pub const BLOCKING_SCRIPT: &str = r#"echo "starting $BACILLUS_JOBTAG"
while [ ! -e "$RELEASE" ]; do sleep 0.05; done
exit "${CODE:-0}"
"#;

/// A parameterised job that echoes its parameters and exits.
pub const PARAMS_SCRIPT: &str = r#"#!/bin/sh
#-?s?TARGET?debug?what to build
#-?b?VERBOSE?on
#-?c?FLAVOUR?plain|fancy
echo "target=$TARGET flavour=$FLAVOUR"
"#;

/// Build a test `ServerConfig` rooted at `root`.
pub fn test_config(root: &Path) -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:9990".to_string()],
        request_timeout_secs: 30,
        job_home: root.join("workdir"),
        artifacts_dir: root.join("artifacts"),
        run_log_tail_lines: 30,
        running_jobs_limit: 8,
        fresh_run_log: true,
        attach_stdout: false,
        show_stages_on_finished: false,
        live_stages: true,
        indicator_style: Default::default(),
        basic_auth: true,
        auth_user: TEST_USER.to_string(),
        auth_password: TEST_PASSWORD.to_string(),
        demo_mode: false,
    }
}

/// A running test application with its scratch directory.
pub struct TestApp {
    pub dir: TempDir,
    pub state: AppState,
    pub app: Router,
}

impl TestApp {
    pub fn release_path(&self) -> PathBuf {
        self.dir.path().join("release")
    }

    /// Let every blocked [`BLOCKING_SCRIPT`] job finish.
    pub async fn release(&self) {
        tokio::fs::write(self.release_path(), b"go").await.unwrap();
    }

    pub async fn wait_idle(&self) {
        tokio::time::timeout(Duration::from_secs(10), async {
            while self.state.engine.registry_size() > 0 {
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await
        .expect("jobs should finish");
    }
}

/// Build the full application router (same middleware stack as production)
/// serving two blocking jobs, `build-foo` (exit 3) and `ok` (exit 0), plus a
/// parameterised job `pjob`.
pub async fn build_test_app() -> TestApp {
    build_test_app_with(|_| {}).await
}

pub async fn build_test_app_with(tweak: impl FnOnce(&mut ServerConfig)) -> TestApp {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(dir.path());
    tweak(&mut config);

    let script = dir.path().join("job.sh");
    tokio::fs::write(&script, BLOCKING_SCRIPT).await.unwrap();
    tokio::fs::create_dir_all(&config.job_home).await.unwrap();
    let params_script = config.job_home.join("params.sh");
    tokio::fs::write(&params_script, PARAMS_SCRIPT).await.unwrap();
    make_executable(&params_script);

    let release = dir.path().join("release");
    let specs = [
        format!(
            "build_foo::RELEASE={},CODE=3:sh {}",
            release.display(),
            script.display()
        ),
        format!("ok::RELEASE={}:sh {}", release.display(), script.display()),
        "pjob:::../params.sh".to_string(),
    ];
    let jobs = JobTable::from_specs(specs).unwrap();

    let run_log = RunLog::open(dir.path().join("run0.log"), true).await.unwrap();
    run_log.write_banner("test", &config.listen_addr()).await.unwrap();
    let engine = Arc::new(Engine::new(config.engine_config(), jobs, run_log));

    let state = AppState {
        config: Arc::new(config.clone()),
        engine,
        shutdown: CancellationToken::new(),
    };
    let app = build_app_router(state.clone(), &config);

    TestApp { dir, state, app }
}

#[cfg(unix)]
fn make_executable(path: &Path) {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).unwrap();
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) {}

pub fn basic_auth(user: &str, password: &str) -> String {
    format!("Basic {}", STANDARD.encode(format!("{user}:{password}")))
}

/// Send a request without credentials.
pub async fn get(app: &Router, uri: &str) -> Response<Body> {
    let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
    app.clone().oneshot(request).await.unwrap()
}

/// Send a GET with the test credentials.
pub async fn get_auth(app: &Router, uri: &str) -> Response<Body> {
    let request = Request::builder()
        .uri(uri)
        .header("authorization", basic_auth(TEST_USER, TEST_PASSWORD))
        .body(Body::empty())
        .unwrap();
    app.clone().oneshot(request).await.unwrap()
}

/// Send a POST with the test credentials and a JSON body.
pub async fn post_json_auth(app: &Router, uri: &str, body: serde_json::Value) -> Response<Body> {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header("authorization", basic_auth(TEST_USER, TEST_PASSWORD))
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    app.clone().oneshot(request).await.unwrap()
}

pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    response
        .into_body()
        .collect()
        .await
        .unwrap()
        .to_bytes()
        .to_vec()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

pub async fn body_text(response: Response<Body>) -> String {
    String::from_utf8(body_bytes(response).await).unwrap()
}
