//! Test sessions: one page against one running application, owned by one test

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::time::sleep;
use tracing::{debug, info};

use crate::driver::{Browser, Theme};
use crate::error::{E2eError, E2eResult};
use crate::locator::{Chain, Locator};
use crate::page::Page;
use crate::visual::{Evaluation, SnapshotKey, SnapshotOutcome, SnapshotStore};

/// Extra knobs for one snapshot assertion
#[derive(Debug, Clone, Default)]
pub struct SnapshotOptions {
    /// Regions blanked before capture (timestamps, random ids)
    pub mask: Vec<Locator>,
    /// Overrides the configured number of captures before a mismatch is final
    pub capture_attempts: Option<u32>,
}

/// Snapshot assertion that did not fail, kept for the run report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotRecord {
    pub name: String,
    #[serde(flatten)]
    pub outcome: SnapshotOutcome,
}

pub struct TestSession {
    /// Case name without the theme suffix
    name: String,
    page: Page,
    app_url: String,
    theme: Option<Theme>,
    snapshots: Arc<SnapshotStore>,
    records: Mutex<Vec<SnapshotRecord>>,
}

impl TestSession {
    pub fn new(
        name: impl Into<String>,
        page: Page,
        app_url: impl Into<String>,
        theme: Option<Theme>,
        snapshots: Arc<SnapshotStore>,
    ) -> Self {
        Self {
            name: name.into(),
            page,
            app_url: app_url.into(),
            theme,
            snapshots,
            records: Mutex::new(Vec::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn page(&self) -> &Page {
        &self.page
    }

    pub fn theme(&self) -> Option<Theme> {
        self.theme
    }

    pub fn engine(&self) -> Browser {
        self.page.engine()
    }

    /// App URL including the theme's embed option
    pub fn themed_url(&self) -> String {
        self.url_for("")
    }

    /// URL of `path` under the app, carrying the theme's embed option
    pub fn url_for(&self, path: &str) -> String {
        let path = path.trim_start_matches('/');
        let mut url = if path.is_empty() {
            self.app_url.clone()
        } else {
            format!("{}/{}", self.app_url.trim_end_matches('/'), path)
        };
        if let Some(theme) = self.theme {
            let separator = if url.contains('?') { '&' } else { '?' };
            url = format!("{}{}embed_options={}", url, separator, theme);
        }
        url
    }

    /// Navigate to the application and wait for its first run
    pub async fn open_app(&self) -> E2eResult<()> {
        self.open_path("").await
    }

    pub async fn open_path(&self, path: &str) -> E2eResult<()> {
        let url = self.url_for(path);
        info!(test = %self.name, url = %url, "opening app");
        self.page.goto(&url).await?;
        self.page.wait_for_app_loaded().await
    }

    pub fn get_by_test_id(&self, test_id: impl Into<String>) -> Locator {
        self.page.get_by_test_id(test_id)
    }

    pub fn get_by_text(&self, text: impl Into<String>) -> Locator {
        self.page.get_by_text(text)
    }

    pub fn get_by_role(&self, role: impl Into<String>, name: Option<&str>) -> Locator {
        self.page.get_by_role(role, name)
    }

    pub fn locator(&self, css: impl Into<String>) -> Locator {
        self.page.locator(css)
    }

    pub fn chain(&self, chain: Chain) -> Locator {
        self.page.chain(chain)
    }

    pub async fn wait_for_app_run(&self, timeout: Option<Duration>) -> E2eResult<()> {
        self.page.wait_for_app_run(timeout).await
    }

    pub async fn wait_for_timeout(&self, ms: u64) {
        self.page.wait_for_timeout(ms).await
    }

    pub async fn assert_snapshot(&self, locator: &Locator, name: &str) -> E2eResult<SnapshotOutcome> {
        self.assert_snapshot_with(locator, name, SnapshotOptions::default()).await
    }

    /// Capture `locator` and compare it with the baseline stored for `name`.
    ///
    /// A mismatch is retried with fresh captures so settling animations do
    /// not fail the test. Only the last capture is persisted: as the new
    /// baseline in update mode, as failure artifacts otherwise.
    pub async fn assert_snapshot_with(
        &self,
        locator: &Locator,
        name: &str,
        options: SnapshotOptions,
    ) -> E2eResult<SnapshotOutcome> {
        let key = SnapshotKey {
            test: self.name.clone(),
            name: name.to_string(),
            theme: self.theme,
            browser: self.engine(),
        };
        let config = self.snapshots.config();
        let attempts = options.capture_attempts.unwrap_or(config.capture_attempts).max(1);

        let mut attempt = 1;
        loop {
            let capture = locator.screenshot(&options.mask).await?;
            match self.snapshots.evaluate(&key, &capture)? {
                Evaluation::Passed(outcome) => {
                    debug!(snapshot = name, ?outcome, attempt, "snapshot passed");
                    self.records.lock().push(SnapshotRecord {
                        name: name.to_string(),
                        outcome: outcome.clone(),
                    });
                    return Ok(outcome);
                }
                Evaluation::Mismatch { diff, .. } if attempt >= attempts && config.update_snapshots => {
                    debug!(snapshot = name, "still {:.3}% off after {} captures", diff.diff_percent, attempt);
                    let outcome = self.snapshots.update_baseline(&key, &capture)?;
                    self.records.lock().push(SnapshotRecord {
                        name: name.to_string(),
                        outcome: outcome.clone(),
                    });
                    return Ok(outcome);
                }
                Evaluation::Mismatch { diff, diff_image } if attempt >= attempts => {
                    let diff_path = self.snapshots.persist_failure(&key, &capture, &diff_image)?;
                    return Err(E2eError::SnapshotMismatch {
                        name: name.to_string(),
                        diff_percent: diff.diff_percent,
                        threshold: config.threshold,
                        diff_path,
                    });
                }
                Evaluation::Mismatch { diff, .. } => {
                    debug!(
                        snapshot = name,
                        attempt,
                        "capture differs by {:.3}%, retrying",
                        diff.diff_percent
                    );
                    attempt += 1;
                    sleep(config.retry_delay).await;
                }
            }
        }
    }

    /// Snapshots that passed, recorded or updated during this session
    pub fn snapshot_records(&self) -> Vec<SnapshotRecord> {
        self.records.lock().clone()
    }

    pub async fn close(&self) -> E2eResult<()> {
        self.page.close().await
    }
}
