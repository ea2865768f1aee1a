//! Session factories: where test sessions get their app and their page

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::app_run::AppRunOptions;
use crate::driver::{Browser, PageDriver, Theme};
use crate::error::{E2eError, E2eResult};
use crate::fixtures;
use crate::mock::MockPage;
use crate::page::{Page, PageOptions};
use crate::playwright::{PlaywrightConfig, PlaywrightDriver};
use crate::server::{AppServer, AppServerConfig};
use crate::session::TestSession;
use crate::visual::SnapshotStore;
use crate::wait::WaitOptions;

/// Opens one isolated session per test case
#[async_trait]
pub trait SessionFactory: Send + Sync {
    /// Engine every session of this factory runs in
    fn engine(&self) -> Browser;

    async fn open(&self, fixture: &str, test: &str, theme: Option<Theme>) -> E2eResult<TestSession>;

    /// Release shared resources once the run is over
    async fn shutdown(&self) -> E2eResult<()> {
        Ok(())
    }
}

/// Real browser pages against fixture apps started on demand.
///
/// One application server is started per fixture and shared by every case
/// using it; each case still gets its own browser page.
pub struct LiveSessions {
    playwright: PlaywrightConfig,
    server: AppServerConfig,
    fixtures_dir: PathBuf,
    /// Already running app to use instead of spawning fixtures
    app_url: Option<String>,
    page_options: PageOptions,
    snapshots: Arc<SnapshotStore>,
    servers: tokio::sync::Mutex<HashMap<String, AppServer>>,
}

impl LiveSessions {
    pub fn new(
        playwright: PlaywrightConfig,
        server: AppServerConfig,
        fixtures_dir: PathBuf,
        page_options: PageOptions,
        snapshots: Arc<SnapshotStore>,
    ) -> Self {
        Self {
            playwright,
            server,
            fixtures_dir,
            app_url: None,
            page_options,
            snapshots,
            servers: tokio::sync::Mutex::new(HashMap::new()),
        }
    }

    pub fn with_app_url(mut self, app_url: Option<String>) -> Self {
        self.app_url = app_url;
        self
    }

    async fn app_url(&self, fixture: &str) -> E2eResult<String> {
        if let Some(url) = &self.app_url {
            return Ok(url.clone());
        }

        let mut servers = self.servers.lock().await;
        if let Some(server) = servers.get(fixture) {
            return Ok(server.base_url().to_string());
        }

        let script = self.fixtures_dir.join(format!("{}.py", fixture));
        let server = AppServer::spawn(&self.server, script).await?;
        let url = server.base_url().to_string();
        servers.insert(fixture.to_string(), server);
        Ok(url)
    }
}

#[async_trait]
impl SessionFactory for LiveSessions {
    fn engine(&self) -> Browser {
        self.playwright.browser
    }

    async fn open(&self, fixture: &str, test: &str, theme: Option<Theme>) -> E2eResult<TestSession> {
        let url = self.app_url(fixture).await?;
        let driver = PlaywrightDriver::launch(&self.playwright).await?;
        let page = Page::new(Arc::new(driver), self.page_options);
        Ok(TestSession::new(test, page, url, theme, self.snapshots.clone()))
    }

    async fn shutdown(&self) -> E2eResult<()> {
        let mut servers = self.servers.lock().await;
        for (fixture, mut server) in servers.drain() {
            info!(fixture = %fixture, "stopping fixture app");
            if let Err(e) = server.stop() {
                warn!(fixture = %fixture, "failed to stop fixture app: {}", e);
            }
        }
        Ok(())
    }
}

pub type FixtureBuilder = Arc<dyn Fn() -> MockPage + Send + Sync>;

/// In-memory pages built from registered fixture builders
pub struct MockSessions {
    engine: Browser,
    fixtures: HashMap<String, FixtureBuilder>,
    page_options: PageOptions,
    snapshots: Arc<SnapshotStore>,
    opened: Mutex<Vec<Arc<MockPage>>>,
}

impl MockSessions {
    pub fn new(snapshots: Arc<SnapshotStore>) -> Self {
        Self {
            engine: Browser::Chromium,
            fixtures: HashMap::new(),
            page_options: Self::fast_options(),
            snapshots,
            opened: Mutex::new(Vec::new()),
        }
    }

    /// Factory with the expander and video apps registered
    pub fn with_standard_fixtures(snapshots: Arc<SnapshotStore>) -> Self {
        Self::new(snapshots)
            .fixture(fixtures::EXPANDER_FIXTURE, fixtures::expander_app)
            .fixture(fixtures::VIDEO_FIXTURE, fixtures::video_app)
    }

    /// Timings scaled down for pages that respond instantly
    pub fn fast_options() -> PageOptions {
        let wait = WaitOptions::default()
            .with_timeout(Duration::from_secs(2))
            .with_poll_interval(Duration::from_millis(5));
        PageOptions {
            action: wait,
            assertion: wait,
            app_run: AppRunOptions {
                initial_wait: Duration::from_millis(10),
                settle_delay: Duration::from_millis(5),
                timeout: Duration::from_secs(2),
                poll_interval: Duration::from_millis(5),
            },
        }
    }

    pub fn with_engine(mut self, engine: Browser) -> Self {
        self.engine = engine;
        self
    }

    pub fn with_page_options(mut self, options: PageOptions) -> Self {
        self.page_options = options;
        self
    }

    pub fn fixture<F>(mut self, name: &str, builder: F) -> Self
    where
        F: Fn() -> MockPage + Send + Sync + 'static,
    {
        self.fixtures.insert(name.to_string(), Arc::new(builder));
        self
    }

    /// Every page handed out so far
    pub fn opened_pages(&self) -> Vec<Arc<MockPage>> {
        self.opened.lock().clone()
    }
}

#[async_trait]
impl SessionFactory for MockSessions {
    fn engine(&self) -> Browser {
        self.engine
    }

    async fn open(&self, fixture: &str, test: &str, theme: Option<Theme>) -> E2eResult<TestSession> {
        let builder = self
            .fixtures
            .get(fixture)
            .ok_or_else(|| E2eError::Config(format!("no mock fixture named {}", fixture)))?;

        debug!(fixture, test, "opening mock page");
        let page = Arc::new(builder().with_engine(self.engine));
        self.opened.lock().push(page.clone());

        let driver: Arc<dyn PageDriver> = page;
        Ok(TestSession::new(
            test,
            Page::new(driver, self.page_options),
            format!("http://mock.local/{}", fixture),
            theme,
            self.snapshots.clone(),
        ))
    }
}
