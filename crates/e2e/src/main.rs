//! widget-e2e
//!
//! Runs the expander and video widget suites against fixture apps.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use widget_e2e::driver::{Browser, Theme};
use widget_e2e::runner::{self, CaseFilter, TestRunner};
use widget_e2e::sessions::{LiveSessions, MockSessions, SessionFactory};
use widget_e2e::visual::SnapshotStore;
use widget_e2e::{playwright, suites, HarnessConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum DriverKind {
    /// Real browser through Playwright
    Playwright,
    /// In-memory fixture pages
    Mock,
}

#[derive(Parser)]
#[command(name = "widget-e2e")]
#[command(about = "End-to-end tests for the expander and video widgets")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "WIDGET_E2E_CONFIG")]
    config: Option<PathBuf>,

    /// Run a single test (case or variant name)
    #[arg(short, long)]
    name: Option<String>,

    /// Run only tests with this tag
    #[arg(short, long)]
    tag: Option<String>,

    /// Browser engine
    #[arg(short, long, env = "WIDGET_E2E_BROWSER")]
    browser: Option<Browser>,

    /// Restrict themed tests to these themes
    #[arg(long, value_delimiter = ',')]
    themes: Vec<Theme>,

    /// Page driver
    #[arg(long, value_enum, default_value = "playwright", env = "WIDGET_E2E_DRIVER")]
    driver: DriverKind,

    /// Use a running app instead of spawning fixture scripts
    #[arg(long, env = "WIDGET_E2E_APP_URL")]
    app_url: Option<String>,

    /// Overwrite mismatching baselines
    #[arg(short, long, env = "WIDGET_E2E_UPDATE_SNAPSHOTS")]
    update_snapshots: bool,

    /// Cases running at the same time
    #[arg(short, long, env = "WIDGET_E2E_JOBS")]
    jobs: Option<usize>,

    /// Output directory for results
    #[arg(short, long, env = "WIDGET_E2E_OUTPUT")]
    output: Option<PathBuf>,

    /// Additional scenario directory
    #[arg(long, env = "WIDGET_E2E_SCENARIOS")]
    scenarios: Option<PathBuf>,

    /// Show the browser window
    #[arg(long)]
    headed: bool,

    /// List tests instead of running them
    #[arg(long)]
    list: bool,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

fn apply_overrides(cli: &Cli, config: &mut HarnessConfig) {
    if let Some(browser) = cli.browser {
        config.browser.engine = browser;
    }
    if !cli.themes.is_empty() {
        config.themes = cli.themes.clone();
    }
    if let Some(url) = &cli.app_url {
        config.app.url = Some(url.clone());
    }
    if cli.update_snapshots {
        config.snapshots.update = true;
    }
    if let Some(jobs) = cli.jobs {
        config.jobs = jobs;
    }
    if let Some(output) = &cli.output {
        config.output_dir = output.clone();
    }
    if let Some(dir) = &cli.scenarios {
        config.scenarios_dir = Some(dir.clone());
    }
    if cli.headed {
        config.browser.headless = false;
    }
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let mut config = HarnessConfig::load(cli.config.as_deref())?;
    apply_overrides(&cli, &mut config);
    config.validate()?;

    let cases = suites::all(config.scenarios_dir.as_deref())?;
    let filter = CaseFilter {
        name: cli.name.clone(),
        tag: cli.tag.clone(),
    };

    if cli.list {
        for (case, variant) in runner::plan(&cases, &filter, &config.themes)? {
            println!("{} ({})", variant.name, case.fixture);
        }
        return Ok(ExitCode::SUCCESS);
    }

    let snapshots = Arc::new(SnapshotStore::new(config.visual())?);
    let sessions: Arc<dyn SessionFactory> = match cli.driver {
        DriverKind::Playwright => {
            playwright::check_installed().await?;
            Arc::new(
                LiveSessions::new(
                    config.playwright(),
                    config.server(),
                    config.app.fixtures_dir.clone(),
                    config.page_options(),
                    snapshots,
                )
                .with_app_url(config.app.url.clone()),
            )
        }
        DriverKind::Mock => Arc::new(
            MockSessions::with_standard_fixtures(snapshots).with_engine(config.browser.engine),
        ),
    };

    let runner = TestRunner::new(config.runner(), sessions);

    let results = runner.run(&cases, &filter).await?;
    runner.write_results(&results)?;

    Ok(if results.has_harness_faults() {
        ExitCode::from(2)
    } else if results.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(1)
    })
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = if cli.debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    info!("widget-e2e v{}", env!("CARGO_PKG_VERSION"));

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::from(2)
        }
    }
}
