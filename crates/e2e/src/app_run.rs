//! Synchronizing with application re-runs
//!
//! After an interaction the application recomputes and re-renders. Its root
//! element (`data-testid="stApp"`) reports progress through
//! `data-test-connection-state`, `data-test-script-state` and, when the app
//! exposes it, `data-test-run-count`. Assertions issued before the run has
//! settled race the application.

use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::driver::{ElementState, PageDriver};
use crate::error::{E2eError, E2eResult};
use crate::locator::{Chain, LocatorStep};
use crate::wait::{poll_until, PollOutcome, Probe, WaitOptions, DEFAULT_POLL_INTERVAL_MS};

pub const APP_ROOT_TEST_ID: &str = "stApp";
pub const APP_VIEW_CONTAINER_TEST_ID: &str = "stAppViewContainer";

const CONNECTION_STATE_ATTR: &str = "data-test-connection-state";
const SCRIPT_STATE_ATTR: &str = "data-test-script-state";
const RUN_COUNT_ATTR: &str = "data-test-run-count";

/// Timing of the app-run wait
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppRunOptions {
    /// Grace period before polling so the triggered run has started
    pub initial_wait: Duration,
    /// Pause after settling so the frontend finishes rendering
    pub settle_delay: Duration,
    pub timeout: Duration,
    pub poll_interval: Duration,
}

impl Default for AppRunOptions {
    fn default() -> Self {
        Self {
            initial_wait: Duration::from_millis(210),
            settle_delay: Duration::from_millis(100),
            timeout: Duration::from_secs(30),
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
        }
    }
}

/// Completed-run generation counter observed before an interaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct AppRunToken(pub u64);

/// Script state reported by the application root
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptState {
    Running,
    NotRunning,
    Other(String),
}

impl ScriptState {
    fn parse(raw: &str) -> Self {
        match raw {
            "running" => ScriptState::Running,
            "notRunning" => ScriptState::NotRunning,
            other => ScriptState::Other(other.to_string()),
        }
    }
}

/// Phase of one interaction-then-assert cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CyclePhase {
    Idle,
    InteractionIssued,
    AppRunning,
    AssertionPolling,
    Passed,
    Failed,
}

#[derive(Debug)]
struct TrackerState {
    phase: CyclePhase,
    token: Option<AppRunToken>,
}

/// Per-page record of the cycle phase and the token captured at the last interaction
#[derive(Debug)]
pub struct RunTracker {
    state: Mutex<TrackerState>,
}

impl Default for RunTracker {
    fn default() -> Self {
        Self {
            state: Mutex::new(TrackerState {
                phase: CyclePhase::Idle,
                token: None,
            }),
        }
    }
}

impl RunTracker {
    pub fn phase(&self) -> CyclePhase {
        self.state.lock().phase
    }

    pub fn transition(&self, to: CyclePhase) {
        let mut state = self.state.lock();
        if state.phase != to {
            debug!(from = ?state.phase, ?to, "cycle phase");
            state.phase = to;
        }
    }

    pub(crate) fn interaction_issued(&self, token: Option<AppRunToken>) {
        let mut state = self.state.lock();
        // Several interactions before one wait: keep the oldest token
        if state.phase != CyclePhase::InteractionIssued {
            state.token = token;
        }
        state.phase = CyclePhase::InteractionIssued;
    }

    pub(crate) fn take_token(&self) -> Option<AppRunToken> {
        self.state.lock().token.take()
    }
}

fn app_root() -> Chain {
    Chain(vec![LocatorStep::TestId(APP_ROOT_TEST_ID.to_string())])
}

fn run_count(root: &ElementState) -> Option<u64> {
    root.attribute(RUN_COUNT_ATTR).and_then(|raw| raw.parse().ok())
}

/// Read the current run generation, if the application exposes one
pub async fn capture_token(driver: &dyn PageDriver) -> E2eResult<Option<AppRunToken>> {
    let roots = driver.query(&app_root()).await?;
    Ok(roots.first().and_then(run_count).map(AppRunToken))
}

/// Describe why the root is not settled, or `None` if it is
fn unsettled_reason(root: &ElementState, after: Option<AppRunToken>) -> Option<String> {
    if let Some(connection) = root.attribute(CONNECTION_STATE_ATTR) {
        if connection != "CONNECTED" {
            return Some(format!("connection state {}", connection));
        }
    }

    let script_state = root.attribute(SCRIPT_STATE_ATTR).map(ScriptState::parse);
    if script_state == Some(ScriptState::Running) {
        return Some("script state running".to_string());
    }

    if let (Some(token), Some(count)) = (after, run_count(root)) {
        if count <= token.0 {
            return Some(format!("run count {} has not advanced past {}", count, token.0));
        }
    }

    None
}

/// Block until the application has finished the run triggered by the last interaction
pub async fn wait_for_app_run(
    driver: &dyn PageDriver,
    options: AppRunOptions,
    after: Option<AppRunToken>,
) -> E2eResult<()> {
    sleep(options.initial_wait).await;

    let root_chain = app_root();
    let root = &root_chain;
    let wait = WaitOptions {
        timeout: options.timeout,
        poll_interval: options.poll_interval,
    };

    let outcome = poll_until(wait, move || async move {
        let roots = driver.query(root).await?;
        Ok(match roots.first() {
            None => Probe::Pending("application root not attached".to_string()),
            Some(state) => match unsettled_reason(state, after) {
                Some(reason) => Probe::Pending(reason),
                None => Probe::Ready(()),
            },
        })
    })
    .await?;

    match outcome {
        PollOutcome::Ready(()) => {
            sleep(options.settle_delay).await;
            Ok(())
        }
        PollOutcome::TimedOut { last_observed } => {
            warn!("application still busy after {:?}: {}", options.timeout, last_observed);
            Err(E2eError::AppRunTimeout {
                timeout_ms: options.timeout.as_millis() as u64,
                last_state: last_observed,
            })
        }
    }
}
