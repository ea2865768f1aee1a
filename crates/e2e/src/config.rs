//! Harness configuration

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::app_run::AppRunOptions;
use crate::driver::{Browser, Theme};
use crate::error::{E2eError, E2eResult};
use crate::page::PageOptions;
use crate::playwright::PlaywrightConfig;
use crate::runner::RunnerConfig;
use crate::server::AppServerConfig;
use crate::visual::VisualConfig;
use crate::wait::{WaitOptions, DEFAULT_POLL_INTERVAL_MS, DEFAULT_TIMEOUT_MS};

/// Harness configuration, as read from `widget-e2e.toml`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// Browser settings
    pub browser: BrowserConfig,

    /// Fixture app settings
    pub app: AppConfig,

    /// Snapshot settings
    pub snapshots: SnapshotConfig,

    /// Timeouts
    pub timeouts: TimeoutConfig,

    /// Cases running at the same time
    pub jobs: usize,

    /// Themes themed cases expand to
    pub themes: Vec<Theme>,

    /// Where `test-results.json` is written
    pub output_dir: PathBuf,

    /// Extra scenario files to load
    pub scenarios_dir: Option<PathBuf>,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            browser: BrowserConfig::default(),
            app: AppConfig::default(),
            snapshots: SnapshotConfig::default(),
            timeouts: TimeoutConfig::default(),
            jobs: 1,
            themes: Theme::ALL.to_vec(),
            output_dir: PathBuf::from("test-results"),
            scenarios_dir: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    pub engine: Browser,
    pub headless: bool,
    pub viewport_width: u32,
    pub viewport_height: u32,
    /// Node executable running the Playwright bridge
    pub node_binary: String,
    /// Directory `playwright` resolves from
    pub work_dir: PathBuf,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            engine: Browser::Chromium,
            headless: true,
            viewport_width: 1280,
            viewport_height: 720,
            node_binary: "node".to_string(),
            work_dir: PathBuf::from("."),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Launcher executable for fixture scripts
    pub command: String,
    /// Directory holding `<fixture>.py` scripts
    pub fixtures_dir: PathBuf,
    /// Use an already running app instead of spawning fixtures
    pub url: Option<String>,
    pub extra_args: Vec<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            command: "streamlit".to_string(),
            fixtures_dir: PathBuf::from("e2e_playwright"),
            url: None,
            extra_args: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapshotConfig {
    pub baseline_dir: PathBuf,
    pub failure_dir: PathBuf,
    /// Allowed share of differing pixels, in percent
    pub threshold: f64,
    pub channel_tolerance: u8,
    /// Overwrite mismatching baselines instead of failing
    pub update: bool,
    pub capture_attempts: u32,
    pub retry_delay_ms: u64,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        let visual = VisualConfig::default();
        Self {
            baseline_dir: visual.baseline_dir,
            failure_dir: visual.failure_dir,
            threshold: visual.threshold,
            channel_tolerance: visual.channel_tolerance,
            update: visual.update_snapshots,
            capture_attempts: visual.capture_attempts,
            retry_delay_ms: visual.retry_delay.as_millis() as u64,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    pub action_ms: u64,
    pub assertion_ms: u64,
    pub poll_interval_ms: u64,
    pub app_run_ms: u64,
    pub app_start_ms: u64,
    pub case_ms: u64,
    pub driver_request_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            action_ms: DEFAULT_TIMEOUT_MS,
            assertion_ms: DEFAULT_TIMEOUT_MS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            app_run_ms: 30_000,
            app_start_ms: 30_000,
            case_ms: 120_000,
            driver_request_ms: 60_000,
        }
    }
}

impl HarnessConfig {
    pub fn from_toml(content: &str) -> E2eResult<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> E2eResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Load `path` when given and present, defaults otherwise
    pub fn load(path: Option<&Path>) -> E2eResult<Self> {
        match path {
            Some(path) if path.exists() => Self::from_file(path),
            Some(path) => Err(E2eError::Config(format!(
                "config file not found: {}",
                path.display()
            ))),
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> E2eResult<()> {
        if self.jobs == 0 {
            return Err(E2eError::Config("jobs must be at least 1".to_string()));
        }
        if !(0.0..=100.0).contains(&self.snapshots.threshold) {
            return Err(E2eError::Config(format!(
                "snapshot threshold must be a percentage, got {}",
                self.snapshots.threshold
            )));
        }
        if self.themes.is_empty() {
            return Err(E2eError::Config("at least one theme is required".to_string()));
        }
        if self.timeouts.poll_interval_ms == 0 {
            return Err(E2eError::Config("poll interval must be positive".to_string()));
        }
        Ok(())
    }

    pub fn playwright(&self) -> PlaywrightConfig {
        PlaywrightConfig {
            browser: self.browser.engine,
            headless: self.browser.headless,
            viewport_width: self.browser.viewport_width,
            viewport_height: self.browser.viewport_height,
            node_binary: self.browser.node_binary.clone(),
            work_dir: self.browser.work_dir.clone(),
            request_timeout: Duration::from_millis(self.timeouts.driver_request_ms),
            action_timeout: Duration::from_millis(self.timeouts.action_ms),
        }
    }

    pub fn server(&self) -> AppServerConfig {
        AppServerConfig {
            command: self.app.command.clone(),
            port: None,
            startup_timeout: Duration::from_millis(self.timeouts.app_start_ms),
            extra_args: self.app.extra_args.clone(),
        }
    }

    pub fn visual(&self) -> VisualConfig {
        VisualConfig {
            baseline_dir: self.snapshots.baseline_dir.clone(),
            failure_dir: self.snapshots.failure_dir.clone(),
            threshold: self.snapshots.threshold,
            channel_tolerance: self.snapshots.channel_tolerance,
            update_snapshots: self.snapshots.update,
            capture_attempts: self.snapshots.capture_attempts,
            retry_delay: Duration::from_millis(self.snapshots.retry_delay_ms),
        }
    }

    pub fn page_options(&self) -> PageOptions {
        let poll_interval = Duration::from_millis(self.timeouts.poll_interval_ms);
        PageOptions {
            action: WaitOptions::default()
                .with_timeout(Duration::from_millis(self.timeouts.action_ms))
                .with_poll_interval(poll_interval),
            assertion: WaitOptions::default()
                .with_timeout(Duration::from_millis(self.timeouts.assertion_ms))
                .with_poll_interval(poll_interval),
            app_run: AppRunOptions {
                timeout: Duration::from_millis(self.timeouts.app_run_ms),
                poll_interval,
                ..AppRunOptions::default()
            },
        }
    }

    pub fn runner(&self) -> RunnerConfig {
        RunnerConfig {
            jobs: self.jobs,
            case_timeout: Duration::from_millis(self.timeouts.case_ms),
            themes: self.themes.clone(),
            output_dir: self.output_dir.clone(),
        }
    }
}
