use std::path::PathBuf;
use std::process::Command;
use std::sync::Arc;

use widget_e2e::runner::{CaseFilter, TestRunner};
use widget_e2e::sessions::LiveSessions;
use widget_e2e::visual::SnapshotStore;
use widget_e2e::{suites, Browser, HarnessConfig};

fn in_path(bin: &str) -> bool {
    Command::new("sh")
        .arg("-lc")
        .arg(format!("command -v {bin} >/dev/null 2>&1"))
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

/// Video suite against real fixture apps in a real browser
///
/// Needs `npx playwright`, `streamlit`, and `WIDGET_E2E_FIXTURES` pointing at
/// the directory holding `st_video.py`.
///
/// Marked ignored because it installs nothing and drives a real browser.
#[tokio::test]
#[ignore]
async fn video_suite_passes_in_firefox() {
    if !in_path("npx") || !in_path("streamlit") {
        eprintln!("Skipping: npx or streamlit not available in PATH");
        return;
    }
    let Some(fixtures_dir) = std::env::var_os("WIDGET_E2E_FIXTURES").map(PathBuf::from) else {
        eprintln!("Skipping: WIDGET_E2E_FIXTURES not set");
        return;
    };
    if !fixtures_dir.join("st_video.py").exists() {
        panic!("expected fixture script in {}", fixtures_dir.display());
    }

    let workdir = tempfile::tempdir().expect("tempdir");
    let mut config = HarnessConfig::default();
    config.browser.engine = Browser::Firefox;
    config.app.fixtures_dir = fixtures_dir;
    config.snapshots.baseline_dir = workdir.path().join("__snapshots__");
    config.snapshots.failure_dir = workdir.path().join("failures");
    config.output_dir = workdir.path().join("results");

    let snapshots = Arc::new(SnapshotStore::new(config.visual()).expect("snapshot store"));
    let sessions = LiveSessions::new(
        config.playwright(),
        config.server(),
        config.app.fixtures_dir.clone(),
        config.page_options(),
        snapshots,
    );
    let runner = TestRunner::new(config.runner(), Arc::new(sessions));

    let cases = suites::video::cases().expect("bundled video scenario");
    let results = runner
        .run(&cases, &CaseFilter::default())
        .await
        .expect("run video suite");
    runner.write_results(&results).expect("write results");

    assert!(!results.has_harness_faults(), "{:#?}", results.results);
    assert!(results.is_success(), "{:#?}", results.results);
}
