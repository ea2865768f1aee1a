//! Runner behaviour: selection, timeouts, fault classification and reports

mod common;

use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use test_case::test_case;

use widget_e2e::driver::{Browser, Theme};
use widget_e2e::error::{E2eError, E2eResult};
use widget_e2e::fixtures::EXPANDER_FIXTURE;
use widget_e2e::runner::{CaseFilter, CaseStatus, RunnerConfig, TestCase, TestRunner, TestSuiteResult};
use widget_e2e::suites;
use widget_e2e::TestSession;

fn never_finishes(session: &TestSession) -> BoxFuture<'_, E2eResult<()>> {
    async move {
        session.wait_for_timeout(60_000).await;
        Ok(())
    }
    .boxed()
}

fn noop(_: &TestSession) -> BoxFuture<'_, E2eResult<()>> {
    async { Ok(()) }.boxed()
}

fn filter(name: Option<&str>, tag: Option<&str>) -> CaseFilter {
    CaseFilter {
        name: name.map(str::to_string),
        tag: tag.map(str::to_string),
    }
}

#[test_case(None, None, 12 ; "everything")]
#[test_case(None, Some("expander"), 7 ; "expander tag")]
#[test_case(None, Some("video"), 5 ; "video tag")]
#[test_case(None, Some("snapshot"), 5 ; "snapshot tag")]
#[test_case(Some("test_expander_displays_correctly"), None, 2 ; "case name expands to both themes")]
#[test_case(Some("test_expander_displays_correctly[dark_theme]"), None, 1 ; "variant name")]
#[test_case(Some("test_video_handles_start_time"), Some("video"), 1 ; "name and tag")]
fn test_plan_selection(name: Option<&str>, tag: Option<&str>, expected: usize) {
    let dir = tempfile::tempdir().unwrap();
    let runner = common::runner(dir.path(), common::mock_sessions(dir.path(), Browser::Chromium), 1);
    let cases = suites::all(None).unwrap();

    let planned = runner.plan(&cases, &filter(name, tag)).unwrap();
    assert_eq!(planned.len(), expected);
}

#[test]
fn test_unknown_name_is_config_error() {
    let dir = tempfile::tempdir().unwrap();
    let runner = common::runner(dir.path(), common::mock_sessions(dir.path(), Browser::Chromium), 1);
    let cases = suites::all(None).unwrap();

    let err = runner
        .plan(&cases, &filter(Some("test_expander_does_not_exist"), None))
        .unwrap_err();
    assert!(matches!(err, E2eError::Config(_)), "{}", err);
    assert!(err.to_string().contains("test_expander_does_not_exist"));
}

#[tokio::test]
async fn test_variant_filter_runs_one_theme() {
    let dir = tempfile::tempdir().unwrap();
    let sessions = common::mock_sessions(dir.path(), Browser::Chromium);
    let results = common::runner(dir.path(), sessions.clone(), 1)
        .run(
            &suites::expander::cases(),
            &filter(Some("test_expander_displays_correctly[dark_theme]"), None),
        )
        .await
        .unwrap();

    assert_eq!(results.total, 1);
    assert_eq!(results.results[0].theme, Some(Theme::Dark));
    assert!(results.is_success());
    assert!(sessions.opened_pages()[0]
        .url()
        .unwrap()
        .ends_with("embed_options=dark_theme"));
}

#[tokio::test]
async fn test_case_timeout_is_a_test_failure() {
    let dir = tempfile::tempdir().unwrap();
    let config = RunnerConfig {
        jobs: 2,
        case_timeout: Duration::from_millis(200),
        themes: Theme::ALL.to_vec(),
        output_dir: dir.path().join("results"),
    };
    let sessions = common::mock_sessions(dir.path(), Browser::Chromium);
    let runner = TestRunner::new(config, sessions);

    let cases = vec![
        TestCase::native("test_hangs", EXPANDER_FIXTURE, never_finishes),
        TestCase::native("test_returns", EXPANDER_FIXTURE, noop),
    ];
    let results = runner.run(&cases, &CaseFilter::default()).await.unwrap();

    let hung = results.result("test_hangs").unwrap();
    assert_eq!(hung.status, CaseStatus::Failed);
    assert!(!hung.harness_fault);
    assert!(hung.error.as_deref().unwrap().contains("timed out after 200 ms"));

    assert_eq!(results.result("test_returns").unwrap().status, CaseStatus::Passed);
}

#[tokio::test]
async fn test_missing_fixture_is_harness_fault() {
    let dir = tempfile::tempdir().unwrap();
    let runner = common::runner(dir.path(), common::mock_sessions(dir.path(), Browser::Chromium), 1);

    let cases = vec![TestCase::native("test_orphan", "st_missing", noop)];
    let results = runner.run(&cases, &CaseFilter::default()).await.unwrap();

    assert_eq!(results.failed, 1);
    assert!(results.has_harness_faults());
    assert!(results.results[0].error.as_deref().unwrap().contains("st_missing"));
}

#[tokio::test]
async fn test_results_report_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    let runner = common::runner(dir.path(), common::mock_sessions(dir.path(), Browser::Chromium), 2);
    let results = runner
        .run(&suites::all(None).unwrap(), &filter(None, Some("expander")))
        .await
        .unwrap();

    let path = runner.write_results(&results).unwrap();
    assert_eq!(path, dir.path().join("results").join("test-results.json"));

    let content = std::fs::read_to_string(&path).unwrap();
    let report: TestSuiteResult = serde_json::from_str(&content).unwrap();
    assert_eq!(report.engine, Browser::Chromium);
    assert_eq!(report.total, 7);
    assert_eq!(report.passed, 7);

    let themed = report.result("test_expander_displays_correctly[light_theme]").unwrap();
    assert_eq!(themed.theme, Some(Theme::Light));
    assert_eq!(themed.snapshots.len(), 6);
}
