//! Snapshot assertions through a session: retries, failure artifacts, masks and updates

mod common;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use image::{Rgba, RgbaImage};

use widget_e2e::driver::Browser;
use widget_e2e::error::E2eResult;
use widget_e2e::fixtures::EXPANDER_FIXTURE;
use widget_e2e::helpers::{get_expander, EXPANDER_TEST_ID};
use widget_e2e::runner::{CaseFilter, CaseStatus, TestCase};
use widget_e2e::session::SnapshotOptions;
use widget_e2e::sessions::{MockSessions, SessionFactory};
use widget_e2e::visual::{encode_png, SnapshotKey, SnapshotOutcome, SnapshotStore, VisualConfig};
use widget_e2e::{E2eError, TestSession};

fn store(dir: &Path, update_snapshots: bool) -> Arc<SnapshotStore> {
    Arc::new(
        SnapshotStore::new(VisualConfig {
            baseline_dir: dir.join("__snapshots__"),
            failure_dir: dir.join("failures"),
            update_snapshots,
            capture_attempts: 3,
            retry_delay: Duration::from_millis(10),
            ..VisualConfig::default()
        })
        .unwrap(),
    )
}

fn blank_png() -> Vec<u8> {
    encode_png(&RgbaImage::from_pixel(32, 16, Rgba([255, 255, 255, 255]))).unwrap()
}

/// Plant a baseline that no capture of the expander app will match
fn plant_stale_baseline(store: &SnapshotStore, test: &str, name: &str) -> Vec<u8> {
    let key = SnapshotKey {
        test: test.to_string(),
        name: name.to_string(),
        theme: None,
        browser: Browser::Chromium,
    };
    let png = blank_png();
    store.update_baseline(&key, &png).unwrap();
    png
}

fn screenshots(sessions: &MockSessions) -> usize {
    sessions.opened_pages()[0]
        .actions()
        .iter()
        .filter(|a| a.starts_with("screenshot"))
        .count()
}

#[tokio::test]
async fn mismatch_is_retried_then_leaves_artifacts() {
    let dir = tempfile::tempdir().unwrap();
    let store = store(dir.path(), false);
    let expected = plant_stale_baseline(&store, "test_stale", "first_expander");

    let sessions = MockSessions::with_standard_fixtures(store);
    let session = sessions.open(EXPANDER_FIXTURE, "test_stale", None).await.unwrap();
    session.open_app().await.unwrap();

    let expander = session.get_by_test_id(EXPANDER_TEST_ID).first();
    let err = session.assert_snapshot(&expander, "first_expander").await.unwrap_err();
    let diff_path = match &err {
        E2eError::SnapshotMismatch { name, diff_percent, diff_path, .. } => {
            assert_eq!(name, "first_expander");
            assert!(*diff_percent > 0.2, "{}", diff_percent);
            diff_path.clone()
        }
        other => panic!("unexpected error: {}", other),
    };
    assert!(err.is_assertion());
    assert_eq!(screenshots(&sessions), 3);

    assert!(diff_path.exists());
    let artifacts = diff_path.parent().unwrap();
    assert_eq!(artifacts, dir.path().join("failures").join("test_stale").join("first_expander-chromium"));
    assert_eq!(std::fs::read(artifacts.join("expected.png")).unwrap(), expected);
    assert!(image::open(artifacts.join("actual.png")).is_ok());

    // The baseline is untouched and the failure is not a record
    assert_eq!(std::fs::read(dir.path().join("__snapshots__/test_stale/first_expander-chromium.png")).unwrap(), expected);
    assert!(session.snapshot_records().is_empty());
}

#[tokio::test]
async fn single_capture_override_fails_on_first_mismatch() {
    let dir = tempfile::tempdir().unwrap();
    let store = store(dir.path(), false);
    plant_stale_baseline(&store, "test_once", "first_expander");

    let sessions = MockSessions::with_standard_fixtures(store);
    let session = sessions.open(EXPANDER_FIXTURE, "test_once", None).await.unwrap();
    session.open_app().await.unwrap();

    let options = SnapshotOptions {
        capture_attempts: Some(1),
        ..SnapshotOptions::default()
    };
    let expander = session.get_by_test_id(EXPANDER_TEST_ID).first();
    let err = session.assert_snapshot_with(&expander, "first_expander", options).await.unwrap_err();
    assert!(matches!(err, E2eError::SnapshotMismatch { .. }), "{}", err);
    assert_eq!(screenshots(&sessions), 1);
}

fn snapshot_first_expander(session: &TestSession) -> BoxFuture<'_, E2eResult<()>> {
    async move {
        session.open_app().await?;
        let expander = session.get_by_test_id(EXPANDER_TEST_ID).first();
        session.assert_snapshot(&expander, "first_expander").await?;
        Ok(())
    }
    .boxed()
}

#[tokio::test]
async fn mismatch_fails_the_case_without_a_harness_fault() {
    let dir = tempfile::tempdir().unwrap();
    let store = store(dir.path(), false);
    plant_stale_baseline(&store, "test_snapshot_stale", "first_expander");

    let sessions = Arc::new(MockSessions::with_standard_fixtures(store));
    let cases = vec![TestCase::native("test_snapshot_stale", EXPANDER_FIXTURE, snapshot_first_expander)];
    let results = common::runner(dir.path(), sessions, 1)
        .run(&cases, &CaseFilter::default())
        .await
        .unwrap();

    let result = results.result("test_snapshot_stale").unwrap();
    assert_eq!(result.status, CaseStatus::Failed);
    assert!(!result.harness_fault);
    assert!(result.error.as_deref().unwrap().starts_with("Snapshot mismatch: first_expander"));
    assert!(result.snapshots.is_empty());
}

#[tokio::test]
async fn update_mode_rewrites_baseline_after_retries() {
    let dir = tempfile::tempdir().unwrap();
    let store = store(dir.path(), true);
    let stale = plant_stale_baseline(&store, "test_refresh", "first_expander");

    let sessions = MockSessions::with_standard_fixtures(store);
    let session = sessions.open(EXPANDER_FIXTURE, "test_refresh", None).await.unwrap();
    session.open_app().await.unwrap();

    let expander = session.get_by_test_id(EXPANDER_TEST_ID).first();
    let outcome = session.assert_snapshot(&expander, "first_expander").await.unwrap();
    let baseline = dir.path().join("__snapshots__/test_refresh/first_expander-chromium.png");
    assert_eq!(outcome, SnapshotOutcome::Updated { baseline: baseline.clone() });
    assert_eq!(screenshots(&sessions), 3);
    assert_ne!(std::fs::read(&baseline).unwrap(), stale);
    assert!(!dir.path().join("failures").join("test_refresh").exists());

    // The rewritten baseline matches the next capture on the first try
    let outcome = session.assert_snapshot(&expander, "first_expander").await.unwrap();
    assert!(matches!(outcome, SnapshotOutcome::Matched { .. }), "{:?}", outcome);
    assert_eq!(screenshots(&sessions), 4);
    assert_eq!(session.snapshot_records().len(), 2);
}

#[tokio::test]
async fn masked_region_changes_do_not_fail_snapshots() {
    let dir = tempfile::tempdir().unwrap();
    let sessions = MockSessions::with_standard_fixtures(store(dir.path(), false));
    let session = sessions.open(EXPANDER_FIXTURE, "test_masked", None).await.unwrap();
    session.open_app().await.unwrap();

    let expander = get_expander(&session, "Expander with number input").await.unwrap();
    let widget = expander.get_by_test_id("stNumberInput");
    let masked = || SnapshotOptions {
        mask: vec![widget.clone()],
        capture_attempts: Some(1),
    };
    let unmasked = || SnapshotOptions {
        capture_attempts: Some(1),
        ..SnapshotOptions::default()
    };

    let outcome = session.assert_snapshot_with(&expander, "with_input_masked", masked()).await.unwrap();
    assert!(matches!(outcome, SnapshotOutcome::Recorded { .. }), "{:?}", outcome);
    let outcome = session.assert_snapshot_with(&expander, "with_input", unmasked()).await.unwrap();
    assert!(matches!(outcome, SnapshotOutcome::Recorded { .. }), "{:?}", outcome);

    let input = widget.locator("input");
    input.fill("10").await.unwrap();
    input.press("Enter").await.unwrap();
    session.wait_for_app_run(None).await.unwrap();
    assert_eq!(input.get_attribute("value").await.unwrap().as_deref(), Some("10.0"));

    let outcome = session.assert_snapshot_with(&expander, "with_input_masked", masked()).await.unwrap();
    assert!(matches!(outcome, SnapshotOutcome::Matched { .. }), "{:?}", outcome);

    let err = session
        .assert_snapshot_with(&expander, "with_input", unmasked())
        .await
        .unwrap_err();
    assert!(matches!(err, E2eError::SnapshotMismatch { .. }), "{}", err);
}
