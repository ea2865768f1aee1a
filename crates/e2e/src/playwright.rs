//! Playwright browser automation
//!
//! A Node.js bridge process owns one browser page. Requests and responses
//! are exchanged as JSON lines over the child's stdin/stdout; locator chains
//! are sent as-is and rebuilt into Playwright locators on the Node side.

use std::io::Write;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use tempfile::TempPath;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::driver::{Browser, ElementState, PageDriver};
use crate::error::{E2eError, E2eResult};
use crate::locator::Chain;
use crate::wait::DEFAULT_TIMEOUT_MS;

const BRIDGE_SCRIPT: &str = include_str!("playwright_bridge.js");

/// Configuration for Playwright
#[derive(Debug, Clone, PartialEq)]
pub struct PlaywrightConfig {
    pub browser: Browser,
    pub headless: bool,
    pub viewport_width: u32,
    pub viewport_height: u32,

    /// Node executable running the bridge
    pub node_binary: String,

    /// Directory the bridge script is written to; `playwright` must resolve from here
    pub work_dir: PathBuf,

    /// Upper bound for a single bridge round-trip
    pub request_timeout: Duration,

    /// Playwright's own wait for navigation and actions on the page
    pub action_timeout: Duration,
}

impl Default for PlaywrightConfig {
    fn default() -> Self {
        Self {
            browser: Browser::Chromium,
            headless: true,
            viewport_width: 1280,
            viewport_height: 720,
            node_binary: "node".to_string(),
            work_dir: PathBuf::from("."),
            request_timeout: Duration::from_secs(60),
            action_timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
        }
    }
}

#[derive(Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum Request<'a> {
    Goto { url: &'a str },
    Query { chain: &'a Chain },
    Click { chain: &'a Chain },
    Fill { chain: &'a Chain, value: &'a str },
    Press { chain: &'a Chain, key: &'a str },
    Screenshot { chain: &'a Chain, mask: &'a [Chain] },
    Close,
}

#[derive(Serialize)]
struct Envelope<'a> {
    id: u64,
    timeout_ms: u64,
    #[serde(flatten)]
    request: Request<'a>,
}

#[derive(Debug, Deserialize)]
struct Response {
    id: u64,
    ok: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    elements: Vec<ElementState>,
    #[serde(default)]
    png: Option<String>,
}

struct BridgeIo {
    stdin: ChildStdin,
    stdout: Lines<BufReader<ChildStdout>>,
}

/// Page driver backed by a Playwright bridge process
pub struct PlaywrightDriver {
    engine: Browser,
    request_timeout: Duration,
    action_timeout: Duration,
    io: Mutex<BridgeIo>,
    next_id: AtomicU64,
    // Held so the child is killed when the driver drops
    _child: Child,
    _script: TempPath,
}

/// Check that the Playwright CLI is available
pub async fn check_installed() -> E2eResult<()> {
    let status = Command::new("npx")
        .args(["playwright", "--version"])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await;

    match status {
        Ok(status) if status.success() => Ok(()),
        _ => Err(E2eError::DriverNotFound),
    }
}

async fn read_response(stdout: &mut Lines<BufReader<ChildStdout>>, id: u64) -> E2eResult<Response> {
    loop {
        let line = stdout
            .next_line()
            .await?
            .ok_or_else(|| E2eError::Driver("playwright bridge exited".to_string()))?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<Response>(line) {
            Ok(response) if response.id == id => return Ok(response),
            Ok(response) => warn!(expected = id, got = response.id, "dropping stale bridge response"),
            // Anything else on stdout is console noise from the page
            Err(_) => debug!(line, "bridge output"),
        }
    }
}

impl PlaywrightDriver {
    /// Start a bridge process with a fresh browser page
    pub async fn launch(config: &PlaywrightConfig) -> E2eResult<Self> {
        let mut script = tempfile::Builder::new()
            .prefix("widget-e2e-bridge")
            .suffix(".js")
            .tempfile_in(&config.work_dir)?;
        script.write_all(BRIDGE_SCRIPT.as_bytes())?;
        let script = script.into_temp_path();

        info!(browser = %config.browser, "launching playwright bridge");

        let mut child = Command::new(&config.node_binary)
            .arg(&*script)
            .current_dir(&config.work_dir)
            .env("WIDGET_E2E_BROWSER", config.browser.as_str())
            .env("WIDGET_E2E_HEADLESS", if config.headless { "1" } else { "0" })
            .env("WIDGET_E2E_VIEWPORT_WIDTH", config.viewport_width.to_string())
            .env("WIDGET_E2E_VIEWPORT_HEIGHT", config.viewport_height.to_string())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| E2eError::Driver(format!("failed to spawn {}: {}", config.node_binary, e)))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| E2eError::Driver("bridge stdin unavailable".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| E2eError::Driver("bridge stdout unavailable".to_string()))?;
        let mut stdout = BufReader::new(stdout).lines();

        let ready = timeout(config.request_timeout, read_response(&mut stdout, 0))
            .await
            .map_err(|_| E2eError::Driver("playwright bridge did not become ready".to_string()))??;
        if !ready.ok {
            return Err(E2eError::Driver(
                ready.error.unwrap_or_else(|| "browser launch failed".to_string()),
            ));
        }

        Ok(Self {
            engine: config.browser,
            request_timeout: config.request_timeout,
            action_timeout: config.action_timeout,
            io: Mutex::new(BridgeIo { stdin, stdout }),
            next_id: AtomicU64::new(1),
            _child: child,
            _script: script,
        })
    }

    async fn request(&self, request: Request<'_>) -> E2eResult<Response> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut line = serde_json::to_string(&Envelope {
            id,
            timeout_ms: self.action_timeout.as_millis() as u64,
            request,
        })?;
        line.push('\n');

        let mut io = self.io.lock().await;
        io.stdin.write_all(line.as_bytes()).await?;
        io.stdin.flush().await?;

        let response = timeout(self.request_timeout, read_response(&mut io.stdout, id))
            .await
            .map_err(|_| {
                E2eError::Driver(format!(
                    "bridge request {} timed out after {} ms",
                    id,
                    self.request_timeout.as_millis()
                ))
            })??;

        if response.ok {
            Ok(response)
        } else {
            Err(E2eError::Driver(
                response.error.unwrap_or_else(|| "unknown bridge error".to_string()),
            ))
        }
    }
}

#[async_trait]
impl PageDriver for PlaywrightDriver {
    fn engine(&self) -> Browser {
        self.engine
    }

    async fn goto(&self, url: &str) -> E2eResult<()> {
        self.request(Request::Goto { url }).await.map(|_| ())
    }

    async fn query(&self, chain: &Chain) -> E2eResult<Vec<ElementState>> {
        Ok(self.request(Request::Query { chain }).await?.elements)
    }

    async fn click(&self, chain: &Chain) -> E2eResult<()> {
        self.request(Request::Click { chain }).await.map(|_| ())
    }

    async fn fill(&self, chain: &Chain, value: &str) -> E2eResult<()> {
        self.request(Request::Fill { chain, value }).await.map(|_| ())
    }

    async fn press(&self, chain: &Chain, key: &str) -> E2eResult<()> {
        self.request(Request::Press { chain, key }).await.map(|_| ())
    }

    async fn screenshot(&self, chain: &Chain, mask: &[Chain]) -> E2eResult<Vec<u8>> {
        let png = self
            .request(Request::Screenshot { chain, mask })
            .await?
            .png
            .ok_or_else(|| E2eError::Driver("screenshot response without image".to_string()))?;
        STANDARD
            .decode(png)
            .map_err(|e| E2eError::Driver(format!("invalid screenshot encoding: {}", e)))
    }

    async fn close(&self) -> E2eResult<()> {
        self.request(Request::Close).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::locator::LocatorStep;

    #[test]
    fn test_request_wire_format() {
        let chain = Chain(vec![LocatorStep::TestId("stVideo".into()), LocatorStep::Nth(1)]);
        let line = serde_json::to_value(Envelope {
            id: 7,
            timeout_ms: 5_000,
            request: Request::Fill { chain: &chain, value: "10" },
        })
        .unwrap();
        assert_eq!(
            line,
            serde_json::json!({
                "id": 7,
                "timeout_ms": 5000,
                "op": "fill",
                "chain": [{"test_id": "stVideo"}, {"nth": 1}],
                "value": "10"
            })
        );
    }

    #[test]
    fn test_response_defaults() {
        let response: Response = serde_json::from_str(r#"{"id":3,"ok":true}"#).unwrap();
        assert!(response.ok);
        assert!(response.elements.is_empty());
        assert!(response.png.is_none());
    }

    #[test]
    fn test_bridge_script_handles_every_step_kind() {
        for kind in ["test_id", "text", "role", "css", "nth", "has_text", "has", "'first'", "'last'"] {
            assert!(BRIDGE_SCRIPT.contains(kind), "bridge missing {}", kind);
        }
    }

    #[test]
    fn test_bridge_applies_request_timeout() {
        assert!(BRIDGE_SCRIPT.contains("page.setDefaultTimeout(req.timeout_ms)"));
        assert!(BRIDGE_SCRIPT.contains("page.setDefaultNavigationTimeout(req.timeout_ms)"));
    }
}
