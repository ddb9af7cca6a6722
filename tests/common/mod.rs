#![allow(dead_code)]

use std::process::{Child, Command, Stdio};
use std::sync::OnceLock;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use reqwest::StatusCode;
use serde_json::{json, Value};

static SERVER: OnceLock<TestServer> = OnceLock::new();

/// Tests that set shared PINs hold this so they don't revoke each other's sessions
pub static PIN_LOCK: Lazy<tokio::sync::Mutex<()>> = Lazy::new(|| tokio::sync::Mutex::new(()));

/// Secret the spawned server signs with, so tests can mint their own tokens
pub const TEST_SESSION_SECRET: &str = "integration-test-secret";

pub struct TestServer {
    pub port: u16,
    pub base_url: String,
    child: Child,
}

impl TestServer {
    fn spawn(extra_env: &[(&str, &str)]) -> Result<Self> {
        // Pick an unused port for isolation
        let port = portpicker::pick_unused_port().context("failed to pick free port")?;
        let base_url = format!("http://127.0.0.1:{}", port);

        let mut cmd = Command::new(env!("CARGO_BIN_EXE_school-ops"));
        cmd.env("OPS_API_PORT", port.to_string())
            .env("APP_ENV", "development")
            .env("SESSION_SECRET", TEST_SESSION_SECRET)
            .env("ATTENDANCE_ENABLE_BACKGROUND_RECONCILE", "false")
            .envs(extra_env.iter().copied())
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());

        // Inherit environment so the server can see DATABASE_URL
        let child = cmd.spawn().context("failed to spawn server binary")?;

        Ok(Self { port, base_url, child })
    }

    async fn wait_ready(&self, timeout: Duration) -> Result<()> {
        let client = reqwest::Client::new();
        let deadline = Instant::now() + timeout;
        loop {
            if Instant::now() > deadline {
                break;
            }
            let url = format!("{}/health", self.base_url);
            if let Ok(resp) = client.get(&url).send().await {
                if resp.status() == StatusCode::OK || resp.status() == StatusCode::SERVICE_UNAVAILABLE {
                    return Ok(());
                }
            }
            tokio::time::sleep(Duration::from_millis(150)).await;
        }
        anyhow::bail!("server did not become ready on {} within {:?}", self.base_url, timeout)
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

pub async fn ensure_server() -> Result<&'static TestServer> {
    ensure_server_with(&[]).await
}

/// Like `ensure_server`, with extra environment for the server process.
/// The first call in a test binary decides the environment.
pub async fn ensure_server_with(extra_env: &[(&str, &str)]) -> Result<&'static TestServer> {
    let server = SERVER.get_or_init(|| TestServer::spawn(extra_env).expect("failed to spawn server binary"));
    server.wait_ready(Duration::from_secs(15)).await?;
    Ok(server)
}

/// True when the server reports a reachable database; DB-backed tests skip otherwise
pub async fn database_available(server: &TestServer) -> Result<bool> {
    let res = reqwest::get(server.url("/health")).await?;
    if res.status() != StatusCode::OK {
        eprintln!("skipping: database unavailable (set DATABASE_URL to run DB-backed tests)");
        return Ok(false);
    }
    Ok(true)
}

/// Set a scope's PIN through the admin CLI, the way an operator would
pub fn set_pin(scope: &str, pin: &str) -> Result<()> {
    let status = Command::new(env!("CARGO_BIN_EXE_opsctl"))
        .args(["pin", "set", "--scope", scope, "--pin", pin])
        .env("APP_ENV", "development")
        .env("SESSION_SECRET", TEST_SESSION_SECRET)
        .stdin(Stdio::null())
        .status()
        .context("failed to run opsctl")?;
    anyhow::ensure!(status.success(), "opsctl pin set exited with {}", status);
    Ok(())
}

/// Unlock `scope` with `pin` and return the session token
pub async fn unlock(server: &TestServer, scope: &str, pin: &str) -> Result<String> {
    let res = reqwest::Client::new()
        .post(server.url(&format!("/pin/{}/unlock", scope)))
        .json(&json!({ "pin": pin }))
        .send()
        .await?;
    anyhow::ensure!(res.status() == StatusCode::CREATED, "unlock {} returned {}", scope, res.status());
    let body = res.json::<Value>().await?;
    body["data"]["token"]
        .as_str()
        .map(str::to_string)
        .context("unlock response without token")
}
