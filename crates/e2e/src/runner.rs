//! Test runner: expands cases into variants, runs them on isolated sessions,
//! and aggregates the results

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::time::{timeout, Instant};
use tracing::{debug, error, info, warn};

use crate::driver::{Browser, Theme};
use crate::error::{E2eError, E2eResult};
use crate::scenario::{ScenarioCase, ScenarioSuite};
use crate::session::{SnapshotRecord, TestSession};
use crate::sessions::SessionFactory;

/// Body of a case written in Rust
pub type CaseFn = for<'a> fn(&'a TestSession) -> BoxFuture<'a, E2eResult<()>>;

#[derive(Clone)]
pub enum CaseBody {
    Native(CaseFn),
    Scenario(Arc<ScenarioCase>),
}

impl CaseBody {
    async fn run(&self, session: &TestSession) -> E2eResult<()> {
        match self {
            CaseBody::Native(body) => body(session).await,
            CaseBody::Scenario(case) => case.run(session).await,
        }
    }
}

impl fmt::Debug for CaseBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaseBody::Native(_) => f.write_str("Native"),
            CaseBody::Scenario(case) => write!(f, "Scenario({})", case.name),
        }
    }
}

/// A named, runnable test
#[derive(Debug, Clone)]
pub struct TestCase {
    pub name: String,
    /// Fixture app the case runs against
    pub fixture: String,
    pub tags: Vec<String>,
    /// Run once per configured theme
    pub themed: bool,
    pub skip_browsers: Vec<Browser>,
    pub body: CaseBody,
}

impl TestCase {
    pub fn native(name: &str, fixture: &str, body: CaseFn) -> Self {
        Self {
            name: name.to_string(),
            fixture: fixture.to_string(),
            tags: Vec::new(),
            themed: false,
            skip_browsers: Vec::new(),
            body: CaseBody::Native(body),
        }
    }

    pub fn themed(mut self) -> Self {
        self.themed = true;
        self
    }

    pub fn skip_browser(mut self, browser: Browser) -> Self {
        self.skip_browsers.push(browser);
        self
    }

    pub fn tag(mut self, tag: &str) -> Self {
        self.tags.push(tag.to_string());
        self
    }

    /// Cases compiled from a scenario suite
    pub fn from_suite(suite: &ScenarioSuite) -> Vec<Self> {
        suite
            .cases
            .iter()
            .map(|case| {
                let mut tags = suite.tags.clone();
                tags.extend(case.tags.iter().cloned());
                Self {
                    name: case.name.clone(),
                    fixture: suite.fixture.clone(),
                    tags,
                    themed: case.themed,
                    skip_browsers: case.skip_browsers.clone(),
                    body: CaseBody::Scenario(Arc::new(case.clone())),
                }
            })
            .collect()
    }

    /// Concrete runs of this case: one per theme when themed
    pub fn variants(&self, themes: &[Theme]) -> Vec<Variant> {
        if self.themed {
            themes
                .iter()
                .map(|theme| Variant {
                    name: format!("{}[{}]", self.name, theme),
                    theme: Some(*theme),
                })
                .collect()
        } else {
            vec![Variant {
                name: self.name.clone(),
                theme: None,
            }]
        }
    }

    fn matches(&self, filter: &CaseFilter) -> bool {
        if let Some(tag) = &filter.tag {
            if !self.tags.iter().any(|t| t == tag) {
                return false;
            }
        }
        true
    }
}

/// One concrete run of a case
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Variant {
    /// Display name, e.g. `test_expander_displays_correctly[dark_theme]`
    pub name: String,
    pub theme: Option<Theme>,
}

/// Selects which cases run
#[derive(Debug, Clone, Default)]
pub struct CaseFilter {
    /// Exact case name or variant name
    pub name: Option<String>,
    pub tag: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaseStatus {
    Passed,
    Failed,
    Skipped,
}

/// Result of running a single test
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestResult {
    pub name: String,
    pub status: CaseStatus,
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub theme: Option<Theme>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// The failure came from the harness or its environment, not the app
    #[serde(default)]
    pub harness_fault: bool,
    #[serde(default)]
    pub snapshots: Vec<SnapshotRecord>,
}

impl TestResult {
    fn skipped(variant: &Variant, reason: String) -> Self {
        Self {
            name: variant.name.clone(),
            status: CaseStatus::Skipped,
            duration_ms: 0,
            theme: variant.theme,
            error: Some(reason),
            harness_fault: false,
            snapshots: Vec::new(),
        }
    }
}

/// Result of running all tests
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestSuiteResult {
    pub engine: Browser,
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub duration_ms: u64,
    pub results: Vec<TestResult>,
}

impl TestSuiteResult {
    pub fn is_success(&self) -> bool {
        self.failed == 0
    }

    pub fn has_harness_faults(&self) -> bool {
        self.results.iter().any(|r| r.harness_fault)
    }

    pub fn result(&self, name: &str) -> Option<&TestResult> {
        self.results.iter().find(|r| r.name == name)
    }
}

/// Configuration for the test runner
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Cases running at the same time
    pub jobs: usize,
    /// Upper bound for one case, app start included
    pub case_timeout: Duration,
    /// Themes themed cases expand to
    pub themes: Vec<Theme>,
    pub output_dir: PathBuf,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            jobs: 1,
            case_timeout: Duration::from_secs(120),
            themes: Theme::ALL.to_vec(),
            output_dir: PathBuf::from("test-results"),
        }
    }
}

/// Main E2E test runner
pub struct TestRunner {
    config: RunnerConfig,
    sessions: Arc<dyn SessionFactory>,
}

impl TestRunner {
    pub fn new(config: RunnerConfig, sessions: Arc<dyn SessionFactory>) -> Self {
        Self { config, sessions }
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Variants selected by `filter`, paired with their case
    pub fn plan<'a>(&self, cases: &'a [TestCase], filter: &CaseFilter) -> E2eResult<Vec<(&'a TestCase, Variant)>> {
        plan(cases, filter, &self.config.themes)
    }

    /// Run every selected case and release shared resources afterwards
    pub async fn run(&self, cases: &[TestCase], filter: &CaseFilter) -> E2eResult<TestSuiteResult> {
        let planned = self.plan(cases, filter)?;
        let start = Instant::now();
        let engine = self.sessions.engine();

        info!("Running {} test(s) on {} with {} job(s)...", planned.len(), engine, self.config.jobs.max(1));

        let results: Vec<TestResult> = stream::iter(planned)
            .map(|(case, variant)| self.run_variant(case, variant))
            .buffered(self.config.jobs.max(1))
            .collect()
            .await;

        if let Err(e) = self.sessions.shutdown().await {
            warn!("failed to release sessions: {}", e);
        }

        let passed = results.iter().filter(|r| r.status == CaseStatus::Passed).count();
        let failed = results.iter().filter(|r| r.status == CaseStatus::Failed).count();
        let skipped = results.iter().filter(|r| r.status == CaseStatus::Skipped).count();
        let duration_ms = start.elapsed().as_millis() as u64;

        info!(
            "Test Results: {} passed, {} failed, {} skipped ({} ms)",
            passed, failed, skipped, duration_ms
        );

        Ok(TestSuiteResult {
            engine,
            total: results.len(),
            passed,
            failed,
            skipped,
            duration_ms,
            results,
        })
    }

    /// Run one variant on its own session; failures never escape
    async fn run_variant(&self, case: &TestCase, variant: Variant) -> TestResult {
        let engine = self.sessions.engine();
        if case.skip_browsers.contains(&engine) {
            info!("- {} (skipped on {})", variant.name, engine);
            return TestResult::skipped(&variant, format!("skipped on {}", engine));
        }

        let start = Instant::now();
        debug!(test = %variant.name, fixture = %case.fixture, "starting");

        let case_timeout = self.config.case_timeout;
        let mut snapshots = Vec::new();
        let outcome = timeout(case_timeout, async {
            let session = self.sessions.open(&case.fixture, &case.name, variant.theme).await?;
            let result = match session.open_app().await {
                Ok(()) => case.body.run(&session).await,
                Err(e) => Err(e),
            };
            snapshots = session.snapshot_records();
            if let Err(e) = session.close().await {
                warn!(test = %variant.name, "failed to close page: {}", e);
            }
            result
        })
        .await
        .unwrap_or_else(|_| Err(E2eError::CaseTimeout(case_timeout.as_millis() as u64)));

        let duration_ms = start.elapsed().as_millis() as u64;
        match outcome {
            Ok(()) => {
                info!("✓ {} ({} ms)", variant.name, duration_ms);
                TestResult {
                    name: variant.name,
                    status: CaseStatus::Passed,
                    duration_ms,
                    theme: variant.theme,
                    error: None,
                    harness_fault: false,
                    snapshots,
                }
            }
            Err(e) => {
                error!("✗ {} - {}", variant.name, e);
                TestResult {
                    name: variant.name,
                    status: CaseStatus::Failed,
                    duration_ms,
                    theme: variant.theme,
                    harness_fault: !e.is_assertion(),
                    error: Some(e.to_string()),
                    snapshots,
                }
            }
        }
    }

    /// Write test results to JSON file
    pub fn write_results(&self, results: &TestSuiteResult) -> E2eResult<PathBuf> {
        write_results(&self.config.output_dir, results)
    }
}

/// Variants of `cases` selected by `filter`, expanding themed cases over `themes`.
///
/// A name filter that selects nothing is a configuration error.
pub fn plan<'a>(
    cases: &'a [TestCase],
    filter: &CaseFilter,
    themes: &[Theme],
) -> E2eResult<Vec<(&'a TestCase, Variant)>> {
    let planned: Vec<(&TestCase, Variant)> = cases
        .iter()
        .filter(|case| case.matches(filter))
        .flat_map(|case| case.variants(themes).into_iter().map(move |variant| (case, variant)))
        .filter(|(case, variant)| match &filter.name {
            Some(name) => &case.name == name || &variant.name == name,
            None => true,
        })
        .collect();

    if let Some(name) = &filter.name {
        if planned.is_empty() {
            return Err(E2eError::Config(format!("Test not found: {}", name)));
        }
    }
    Ok(planned)
}

/// Write `results` as `test-results.json` under `output_dir`
pub fn write_results(output_dir: &Path, results: &TestSuiteResult) -> E2eResult<PathBuf> {
    std::fs::create_dir_all(output_dir)?;

    let path = output_dir.join("test-results.json");
    let json = serde_json::to_string_pretty(results)?;
    std::fs::write(&path, json)?;

    info!("Results written to: {}", path.display());
    Ok(path)
}
