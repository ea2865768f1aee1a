#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use widget_e2e::app_run::AppRunOptions;
use widget_e2e::driver::{Browser, Theme};
use widget_e2e::runner::{RunnerConfig, TestRunner};
use widget_e2e::sessions::MockSessions;
use widget_e2e::visual::{SnapshotStore, VisualConfig};
use widget_e2e::wait::WaitOptions;
use widget_e2e::PageOptions;

pub fn snapshot_store(dir: &Path) -> Arc<SnapshotStore> {
    let config = VisualConfig {
        baseline_dir: dir.join("__snapshots__"),
        failure_dir: dir.join("failures"),
        retry_delay: Duration::from_millis(10),
        ..VisualConfig::default()
    };
    Arc::new(SnapshotStore::new(config).expect("snapshot store"))
}

pub fn mock_sessions(dir: &Path, engine: Browser) -> Arc<MockSessions> {
    Arc::new(MockSessions::with_standard_fixtures(snapshot_store(dir)).with_engine(engine))
}

/// Page timings short enough for cases that are expected to fail
pub fn impatient_options() -> PageOptions {
    let wait = WaitOptions::default()
        .with_timeout(Duration::from_millis(300))
        .with_poll_interval(Duration::from_millis(5));
    PageOptions {
        action: wait,
        assertion: wait,
        app_run: AppRunOptions {
            initial_wait: Duration::from_millis(5),
            settle_delay: Duration::from_millis(1),
            timeout: Duration::from_millis(300),
            poll_interval: Duration::from_millis(5),
        },
    }
}

pub fn runner(dir: &Path, sessions: Arc<MockSessions>, jobs: usize) -> TestRunner {
    let config = RunnerConfig {
        jobs,
        case_timeout: Duration::from_secs(30),
        themes: Theme::ALL.to_vec(),
        output_dir: dir.join("results"),
    };
    TestRunner::new(config, sessions)
}
