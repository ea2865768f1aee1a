//! Application server management - spawning a fixture app and health checking it

use std::net::TcpListener;
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::time::Duration;

use tokio::time::{sleep, Instant};
use tracing::{info, warn};

use crate::error::{E2eError, E2eResult};

/// Handle to a running application process
pub struct AppServer {
    child: Child,
    base_url: String,
    port: u16,
}

impl AppServer {
    /// Run `script` under the application server and wait until it is healthy
    pub async fn spawn(config: &AppServerConfig, script: PathBuf) -> E2eResult<Self> {
        if !script.exists() {
            return Err(E2eError::ServerStartup(format!(
                "fixture script not found: {}",
                script.display()
            )));
        }

        let port = match config.port {
            Some(port) => port,
            None => find_free_port()?,
        };
        let base_url = format!("http://127.0.0.1:{}", port);

        info!(script = %script.display(), port, "spawning application server");

        let mut cmd = Command::new(&config.command);
        cmd.arg("run")
            .arg(&script)
            .arg("--server.port")
            .arg(port.to_string())
            .args(["--server.headless", "true"])
            .args(["--browser.gatherUsageStats", "false"])
            .args(&config.extra_args)
            .stdout(Stdio::null())
            .stderr(Stdio::piped());

        let child = cmd.spawn().map_err(|e| {
            E2eError::ServerStartup(format!("Failed to spawn {}: {}", config.command, e))
        })?;

        let server = AppServer {
            child,
            base_url,
            port,
        };

        server.wait_for_healthy(config.startup_timeout).await?;

        info!("Application is healthy at {}", server.base_url);
        Ok(server)
    }

    /// Poll the health endpoint until it answers
    async fn wait_for_healthy(&self, timeout: Duration) -> E2eResult<()> {
        let health_url = format!("{}/_stcore/health", self.base_url);
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(2))
            .build()?;

        let deadline = Instant::now() + timeout;
        let mut attempts = 0;

        while Instant::now() < deadline {
            attempts += 1;

            match client.get(&health_url).send().await {
                Ok(resp) if resp.status().is_success() => return Ok(()),
                Ok(resp) => warn!("Health check returned {}", resp.status()),
                Err(e) => {
                    if attempts == 1 {
                        info!("Waiting for application to start...");
                    }
                    // Connection refused is expected while the server boots
                    if !e.is_connect() {
                        warn!("Health check error: {}", e);
                    }
                }
            }

            sleep(Duration::from_millis(100)).await;
        }

        Err(E2eError::ServerHealthCheck(attempts))
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn stop(&mut self) -> E2eResult<()> {
        if let Ok(Some(_)) = self.child.try_wait() {
            return Ok(());
        }
        info!("Stopping application server (pid: {})", self.child.id());

        #[cfg(unix)]
        {
            use nix::sys::signal::{kill, Signal};
            use nix::unistd::Pid;

            let pid = Pid::from_raw(self.child.id() as i32);
            if kill(pid, Signal::SIGTERM).is_ok() {
                std::thread::sleep(Duration::from_millis(500));
            }
        }

        // Force kill if still running
        let _ = self.child.kill();
        let _ = self.child.wait();

        Ok(())
    }
}

impl Drop for AppServer {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

/// How fixture applications are launched
#[derive(Debug, Clone, PartialEq)]
pub struct AppServerConfig {
    /// Launcher executable, invoked as `<command> run <script> ...`
    pub command: String,

    /// Port to listen on (None = find free port)
    pub port: Option<u16>,

    pub startup_timeout: Duration,

    /// Appended after the generated server flags
    pub extra_args: Vec<String>,
}

impl Default for AppServerConfig {
    fn default() -> Self {
        Self {
            command: "streamlit".to_string(),
            port: None,
            startup_timeout: Duration::from_secs(30),
            extra_args: Vec::new(),
        }
    }
}

/// Ask the OS for an unused local port
pub fn find_free_port() -> E2eResult<u16> {
    let listener = TcpListener::bind("127.0.0.1:0")?;
    Ok(listener.local_addr()?.port())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_free_port() {
        let port = find_free_port().unwrap();
        assert!(port > 1024);
    }

    #[tokio::test]
    async fn test_missing_fixture_is_startup_error() {
        let config = AppServerConfig::default();
        let result = AppServer::spawn(&config, PathBuf::from("does/not/exist.py")).await;
        assert!(matches!(result, Err(E2eError::ServerStartup(_))));
    }
}
