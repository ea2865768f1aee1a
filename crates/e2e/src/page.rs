//! A browser page bound to a driver, with the harness's timing defaults

use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{debug, warn};

use crate::app_run::{self, AppRunOptions, CyclePhase, RunTracker, APP_VIEW_CONTAINER_TEST_ID};
use crate::driver::{Browser, PageDriver};
use crate::error::E2eResult;
use crate::expect::expect;
use crate::locator::{Chain, Locator, LocatorStep};
use crate::wait::WaitOptions;

/// Timeouts applied to everything issued through a page
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PageOptions {
    /// Auto-wait before actions
    pub action: WaitOptions,
    /// Polling window of assertions
    pub assertion: WaitOptions,
    pub app_run: AppRunOptions,
}

struct PageInner {
    driver: Arc<dyn PageDriver>,
    options: PageOptions,
    tracker: RunTracker,
}

/// Cheaply cloneable page handle shared by every locator created from it
#[derive(Clone)]
pub struct Page {
    inner: Arc<PageInner>,
}

impl Page {
    pub fn new(driver: Arc<dyn PageDriver>, options: PageOptions) -> Self {
        Self {
            inner: Arc::new(PageInner {
                driver,
                options,
                tracker: RunTracker::default(),
            }),
        }
    }

    pub fn driver(&self) -> &dyn PageDriver {
        self.inner.driver.as_ref()
    }

    pub fn options(&self) -> &PageOptions {
        &self.inner.options
    }

    pub fn engine(&self) -> Browser {
        self.inner.driver.engine()
    }

    pub fn phase(&self) -> CyclePhase {
        self.inner.tracker.phase()
    }

    pub(crate) fn tracker(&self) -> &RunTracker {
        &self.inner.tracker
    }

    fn root_step(&self, step: LocatorStep) -> Locator {
        Locator::new(self.clone(), Chain(vec![step]))
    }

    pub fn get_by_test_id(&self, test_id: impl Into<String>) -> Locator {
        self.root_step(LocatorStep::TestId(test_id.into()))
    }

    pub fn get_by_text(&self, text: impl Into<String>) -> Locator {
        self.root_step(LocatorStep::Text(text.into()))
    }

    pub fn get_by_role(&self, role: impl Into<String>, name: Option<&str>) -> Locator {
        self.root_step(LocatorStep::Role {
            role: role.into(),
            name: name.map(String::from),
        })
    }

    pub fn locator(&self, css: impl Into<String>) -> Locator {
        self.root_step(LocatorStep::Css(css.into()))
    }

    /// Locator for an arbitrary chain, e.g. one read from a scenario file
    pub fn chain(&self, chain: Chain) -> Locator {
        Locator::new(self.clone(), chain)
    }

    pub async fn goto(&self, url: &str) -> E2eResult<()> {
        debug!(url, "goto");
        self.inner.tracker.transition(CyclePhase::Idle);
        self.driver().goto(url).await
    }

    /// Fixed sleep; prefer [`Page::wait_for_app_run`] or a polling assertion
    pub async fn wait_for_timeout(&self, ms: u64) {
        sleep(Duration::from_millis(ms)).await;
    }

    pub(crate) async fn before_interaction(&self) {
        let token = match app_run::capture_token(self.driver()).await {
            Ok(token) => token,
            Err(e) => {
                warn!("could not read app run count before interaction: {}", e);
                None
            }
        };
        self.inner.tracker.interaction_issued(token);
    }

    /// Wait for the run triggered by the last interaction to settle
    pub async fn wait_for_app_run(&self, timeout: Option<Duration>) -> E2eResult<()> {
        let mut options = self.inner.options.app_run;
        if let Some(timeout) = timeout {
            options.timeout = timeout;
        }

        let token = self.inner.tracker.take_token();
        self.inner.tracker.transition(CyclePhase::AppRunning);
        let result = app_run::wait_for_app_run(self.driver(), options, token).await;
        self.inner.tracker.transition(match result {
            Ok(()) => CyclePhase::Idle,
            Err(_) => CyclePhase::Failed,
        });
        result
    }

    /// Wait for the app shell to attach, then for the initial run to settle
    pub async fn wait_for_app_loaded(&self) -> E2eResult<()> {
        let container = self.get_by_test_id(APP_VIEW_CONTAINER_TEST_ID);
        expect(&container)
            .with_timeout(self.inner.options.app_run.timeout)
            .to_be_attached()
            .await?;
        self.wait_for_app_run(None).await
    }

    pub async fn close(&self) -> E2eResult<()> {
        self.driver().close().await
    }
}
