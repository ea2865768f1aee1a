//! Expander suite against the in-memory fixture app

mod common;

use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;

use widget_e2e::app_run::CyclePhase;
use widget_e2e::driver::{Browser, Theme};
use widget_e2e::fixtures::{self, EXPANDER_FIXTURE};
use widget_e2e::helpers::{click_button, get_expander, EXPANDER_TEST_ID};
use widget_e2e::runner::{CaseFilter, CaseStatus, TestCase};
use widget_e2e::sessions::{MockSessions, SessionFactory};
use widget_e2e::suites::expander;
use widget_e2e::visual::{SnapshotKey, SnapshotOutcome};
use widget_e2e::error::E2eResult;
use widget_e2e::{expect, E2eError, TestSession};

#[tokio::test]
async fn expander_suite_passes_against_fixture() {
    let dir = tempfile::tempdir().unwrap();
    let sessions = common::mock_sessions(dir.path(), Browser::Chromium);
    let runner = common::runner(dir.path(), sessions.clone(), 3);

    let results = runner.run(&expander::cases(), &CaseFilter::default()).await.unwrap();

    for result in &results.results {
        assert_eq!(result.status, CaseStatus::Passed, "{}: {:?}", result.name, result.error);
    }
    // Themed case runs once per theme
    assert_eq!(results.total, 7);
    assert_eq!(results.passed, 7);
    assert!(results.result("test_expander_displays_correctly[dark_theme]").is_some());

    // Every case got its own page
    assert_eq!(sessions.opened_pages().len(), 7);
    assert!(sessions.opened_pages().iter().all(|page| page.is_closed()));
}

#[tokio::test]
async fn snapshots_are_recorded_then_matched() {
    let dir = tempfile::tempdir().unwrap();
    let filter = CaseFilter {
        name: Some("test_expander_displays_correctly".to_string()),
        tag: None,
    };

    let first = common::runner(dir.path(), common::mock_sessions(dir.path(), Browser::Chromium), 1)
        .run(&expander::cases(), &filter)
        .await
        .unwrap();
    assert!(first.is_success());
    for result in &first.results {
        assert_eq!(result.snapshots.len(), 6);
        assert!(result
            .snapshots
            .iter()
            .all(|s| matches!(s.outcome, SnapshotOutcome::Recorded { .. })));
    }

    let baseline = dir
        .path()
        .join("__snapshots__")
        .join("test_expander_displays_correctly")
        .join("st_expander-sidebar_collapsed-dark_theme-chromium.png");
    assert!(baseline.exists(), "missing {}", baseline.display());

    let second = common::runner(dir.path(), common::mock_sessions(dir.path(), Browser::Chromium), 1)
        .run(&expander::cases(), &filter)
        .await
        .unwrap();
    assert!(second.is_success());
    for result in &second.results {
        assert!(result
            .snapshots
            .iter()
            .all(|s| matches!(s.outcome, SnapshotOutcome::Matched { .. })));
    }
}

#[tokio::test]
async fn themes_get_distinct_baselines() {
    let dir = tempfile::tempdir().unwrap();
    let store = common::snapshot_store(dir.path());
    let key = |theme| SnapshotKey {
        test: "test_expander_displays_correctly".to_string(),
        name: "st_expander-with_input".to_string(),
        theme: Some(theme),
        browser: Browser::Chromium,
    };
    assert_ne!(store.baseline_path(&key(Theme::Light)), store.baseline_path(&key(Theme::Dark)));

    let filter = CaseFilter {
        name: Some("test_expander_displays_correctly".to_string()),
        tag: None,
    };
    common::runner(dir.path(), common::mock_sessions(dir.path(), Browser::Chromium), 2)
        .run(&expander::cases(), &filter)
        .await
        .unwrap();

    let light = std::fs::read(store.baseline_path(&key(Theme::Light))).unwrap();
    let dark = std::fs::read(store.baseline_path(&key(Theme::Dark))).unwrap();
    assert_ne!(light, dark);
}

#[tokio::test]
async fn failing_cases_do_not_affect_siblings() {
    let dir = tempfile::tempdir().unwrap();
    // The video app has no expanders, so only the absence check can pass
    let sessions = Arc::new(
        MockSessions::new(common::snapshot_store(dir.path()))
            .fixture(EXPANDER_FIXTURE, fixtures::video_app)
            .with_page_options(common::impatient_options()),
    );
    let results = common::runner(dir.path(), sessions, 4)
        .run(&expander::cases(), &CaseFilter::default())
        .await
        .unwrap();

    assert_eq!(results.total, 7);
    assert_eq!(results.passed, 1);
    assert_eq!(results.failed, 6);
    let passed = results.result("test_empty_expander_not_rendered").unwrap();
    assert_eq!(passed.status, CaseStatus::Passed);

    let failed = results.result("test_expander_collapses_and_expands").unwrap();
    let error = failed.error.as_deref().unwrap();
    assert!(error.contains("to_have_count"), "{}", error);
    assert!(error.contains("expected 5"), "{}", error);
    assert!(!failed.harness_fault);
    assert!(!results.has_harness_faults());
}

#[tokio::test]
async fn ambiguous_expander_label_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let sessions = MockSessions::with_standard_fixtures(common::snapshot_store(dir.path()))
        .with_page_options(common::impatient_options());
    let session = sessions.open(EXPANDER_FIXTURE, "ambiguous", None).await.unwrap();
    session.open_app().await.unwrap();

    // Two expanders are labelled "Expand me!"
    let err = get_expander(&session, "Expand me!").await.unwrap_err();
    assert!(matches!(err, E2eError::AssertionTimeout { .. }), "{}", err);

    let err = session.get_by_text("Expand me!").click().await.unwrap_err();
    assert!(matches!(err, E2eError::Ambiguous { count: 2, .. }), "{}", err);

    // An explicit index lifts strictness
    session.get_by_text("Expand me!").first().click().await.unwrap();
}

#[tokio::test]
async fn button_click_waits_for_the_run_it_triggers() {
    let dir = tempfile::tempdir().unwrap();
    let sessions = common::mock_sessions(dir.path(), Browser::Chromium);
    let session = sessions.open(EXPANDER_FIXTURE, "run_sync", None).await.unwrap();
    session.open_app().await.unwrap();

    let root = session.get_by_test_id("stApp");
    assert_eq!(root.get_attribute("data-test-run-count").await.unwrap().as_deref(), Some("1"));

    click_button(&session, "Show expander_1").await.unwrap();
    assert_eq!(session.page().phase(), CyclePhase::Idle);
    assert_eq!(root.get_attribute("data-test-run-count").await.unwrap().as_deref(), Some("2"));
    assert_eq!(
        root.get_attribute("data-test-script-state").await.unwrap().as_deref(),
        Some("notRunning")
    );

    // The run's output is present without any further waiting
    assert_eq!(session.get_by_test_id(EXPANDER_TEST_ID).count().await.unwrap(), 7);
    expect(&session.get_by_text("expander_1 write")).to_be_attached().await.unwrap();
}

#[tokio::test]
async fn collapsed_details_are_hidden_but_attached() {
    let dir = tempfile::tempdir().unwrap();
    let sessions = common::mock_sessions(dir.path(), Browser::Chromium);
    let session = sessions.open(EXPANDER_FIXTURE, "collapse", None).await.unwrap();
    session.open_app().await.unwrap();

    let expander = get_expander(&session, "Collapse me!").await.unwrap();
    let details = expander.get_by_test_id("stExpanderDetails");
    expect(&details).to_be_visible().await.unwrap();

    expander.locator("summary").click().await.unwrap();
    expect(&details).to_be_hidden().await.unwrap();
    expect(&details).to_be_attached().await.unwrap();
    assert_eq!(details.inner_text().await.unwrap(), "");
    assert!(details.text_content().await.unwrap().contains("I can collapse"));
}

fn click_collapsed_content(session: &TestSession) -> BoxFuture<'_, E2eResult<()>> {
    async move {
        session.open_app().await?;
        session.get_by_text("I can expand").click().await
    }
    .boxed()
}

#[tokio::test]
async fn clicking_collapsed_content_fails_the_case() {
    let dir = tempfile::tempdir().unwrap();
    let sessions = Arc::new(
        MockSessions::with_standard_fixtures(common::snapshot_store(dir.path()))
            .with_page_options(common::impatient_options()),
    );
    let cases = vec![TestCase::native("test_click_hidden", EXPANDER_FIXTURE, click_collapsed_content)];
    let results = common::runner(dir.path(), sessions.clone(), 1)
        .run(&cases, &CaseFilter::default())
        .await
        .unwrap();

    let result = results.result("test_click_hidden").unwrap();
    assert_eq!(result.status, CaseStatus::Failed);
    assert!(!result.harness_fault);
    let error = result.error.as_deref().unwrap();
    assert!(error.starts_with("click timed out"), "{}", error);
    assert!(error.contains("last observed hidden"), "{}", error);

    // Nothing was dispatched to the page
    let actions = sessions.opened_pages()[0].actions();
    assert!(actions.iter().all(|a| !a.starts_with("click")), "{:?}", actions);
}

#[tokio::test]
async fn click_waits_for_content_to_be_revealed() {
    let dir = tempfile::tempdir().unwrap();
    let sessions = common::mock_sessions(dir.path(), Browser::Chromium);
    let session = sessions.open(EXPANDER_FIXTURE, "reveal", None).await.unwrap();
    session.open_app().await.unwrap();

    let content = session.get_by_text("I can expand");
    let header = session
        .get_by_test_id("stAppViewBlockContainer")
        .locator("summary")
        .filter_has_text("Expand me!");
    let expand_later = async {
        session.wait_for_timeout(50).await;
        header.click().await
    };
    let (clicked, expanded) = tokio::join!(content.click(), expand_later);
    clicked.unwrap();
    expanded.unwrap();

    let actions: Vec<String> = sessions.opened_pages()[0]
        .actions()
        .into_iter()
        .filter(|a| a.starts_with("click"))
        .collect();
    assert_eq!(actions.len(), 2, "{:?}", actions);
    assert!(actions[1].contains("I can expand"), "{:?}", actions);
}
