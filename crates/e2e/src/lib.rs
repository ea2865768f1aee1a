//! Widget E2E Test Framework
//!
//! Browser-driven end-to-end tests for the expander and video widgets:
//! - Spawns fixture apps as subprocesses and waits for their health endpoint
//! - Drives pages through a Playwright bridge (or an in-memory mock page)
//! - Synchronizes with application re-runs before asserting
//! - Polls assertions against live, re-resolved locators
//! - Compares element screenshots with stored baselines
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  TestRunner (variants, jobs)                │
//! │    └── SessionFactory -> TestSession per case               │
//! ├─────────────────────────────────────────────────────────────┤
//! │  TestSession                                                │
//! │    ├── Page ── Locator ── expect(..).to_have_*()            │
//! │    ├── wait_for_app_run()          (stApp run state)        │
//! │    └── assert_snapshot()  -> SnapshotStore (baselines)      │
//! ├─────────────────────────────────────────────────────────────┤
//! │  PageDriver                                                 │
//! │    ├── PlaywrightDriver   (node bridge, JSON lines)         │
//! │    └── MockPage           (in-memory tree, scripted runs)   │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod app_run;
pub mod config;
pub mod driver;
pub mod error;
pub mod expect;
pub mod fixtures;
pub mod helpers;
pub mod locator;
pub mod mock;
pub mod page;
pub mod playwright;
pub mod runner;
pub mod scenario;
pub mod server;
pub mod session;
pub mod sessions;
pub mod suites;
pub mod visual;
pub mod wait;

pub use config::HarnessConfig;
pub use driver::{Browser, ElementState, PageDriver, Theme};
pub use error::{E2eError, E2eResult};
pub use expect::{expect, TextMatch};
pub use locator::{Chain, Locator, LocatorStep};
pub use page::{Page, PageOptions};
pub use runner::{CaseFilter, CaseStatus, TestCase, TestRunner, TestSuiteResult};
pub use session::TestSession;
