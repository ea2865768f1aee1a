//! Declarative YAML test scenarios
//!
//! A scenario file describes one suite: the fixture app it runs against and
//! a list of cases, each an ordered list of steps. Locators are written as
//! step chains, e.g. `[{test_id: stVideo}, {nth: 1}]`.

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::driver::Browser;
use crate::error::{E2eError, E2eResult};
use crate::expect::{expect, TextMatch};
use crate::helpers;
use crate::locator::Chain;
use crate::session::{SnapshotOptions, TestSession};

/// A suite of cases parsed from YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioSuite {
    pub suite: String,

    #[serde(default)]
    pub description: String,

    /// Fixture app every case runs against
    pub fixture: String,

    /// Tags applied to every case
    #[serde(default)]
    pub tags: Vec<String>,

    pub cases: Vec<ScenarioCase>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioCase {
    pub name: String,

    #[serde(default)]
    pub tags: Vec<String>,

    /// Run once per theme instead of once
    #[serde(default)]
    pub themed: bool,

    #[serde(default)]
    pub skip_browsers: Vec<Browser>,

    pub steps: Vec<ScenarioStep>,
}

/// A single step in a case
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ScenarioStep {
    /// Reload the app, optionally at a path relative to it
    Goto {
        #[serde(default)]
        path: String,
    },

    Click {
        locator: Chain,
        /// Wait for the run the click triggers
        #[serde(default)]
        wait_for_app_run: bool,
    },

    Fill {
        locator: Chain,
        value: String,
    },

    Press {
        locator: Chain,
        key: String,
        #[serde(default)]
        wait_for_app_run: bool,
    },

    WaitForAppRun {
        #[serde(default)]
        timeout_ms: Option<u64>,
    },

    Sleep {
        ms: u64,
    },

    /// Polling assertions; every check given is applied in field order
    Expect(ExpectStep),

    Snapshot {
        locator: Chain,
        name: String,
        #[serde(default)]
        mask: Vec<Chain>,
    },

    ClickButton {
        label: String,
    },

    ExpectException {
        message: String,
    },

    ClickOnExpander {
        label: String,
    },

    /// Log a message (for debugging)
    Log {
        message: String,
    },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExpectStep {
    pub locator: Chain,
    #[serde(default)]
    pub count: Option<usize>,
    #[serde(default)]
    pub visible: Option<bool>,
    #[serde(default)]
    pub attached: Option<bool>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub contains: Option<String>,
    #[serde(default)]
    pub not_contains: Option<String>,
    #[serde(default)]
    pub attribute: Option<AttributeExpectation>,
    /// Compare rendered text instead of text content
    #[serde(default)]
    pub inner_text: bool,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttributeExpectation {
    pub name: String,
    #[serde(default)]
    pub value: Option<String>,
    /// Regular expression the value must match
    #[serde(default)]
    pub pattern: Option<String>,
}

impl AttributeExpectation {
    fn expected(&self) -> E2eResult<TextMatch> {
        match (&self.value, &self.pattern) {
            (Some(value), None) => Ok(TextMatch::from(value.as_str())),
            (None, Some(pattern)) => TextMatch::pattern(pattern),
            _ => Err(E2eError::SpecParse(format!(
                "attribute {} needs exactly one of value or pattern",
                self.name
            ))),
        }
    }
}

impl ExpectStep {
    fn is_empty(&self) -> bool {
        self.count.is_none()
            && self.visible.is_none()
            && self.attached.is_none()
            && self.text.is_none()
            && self.contains.is_none()
            && self.not_contains.is_none()
            && self.attribute.is_none()
    }

    async fn run(&self, session: &TestSession) -> E2eResult<()> {
        let locator = session.chain(self.locator.clone());
        let mut expectation = expect(&locator).use_inner_text(self.inner_text);
        if let Some(ms) = self.timeout_ms {
            expectation = expectation.with_timeout(Duration::from_millis(ms));
        }

        if let Some(count) = self.count {
            expectation.to_have_count(count).await?;
        }
        match self.visible {
            Some(true) => expectation.to_be_visible().await?,
            Some(false) => expectation.to_be_hidden().await?,
            None => {}
        }
        match self.attached {
            Some(true) => expectation.to_be_attached().await?,
            Some(false) => expectation.not_to_be_attached().await?,
            None => {}
        }
        if let Some(text) = &self.text {
            expectation.to_have_text(text.as_str()).await?;
        }
        if let Some(text) = &self.contains {
            expectation.to_contain_text(text).await?;
        }
        if let Some(text) = &self.not_contains {
            expectation.not_to_contain_text(text).await?;
        }
        if let Some(attribute) = &self.attribute {
            expectation
                .to_have_attribute(&attribute.name, attribute.expected()?)
                .await?;
        }
        Ok(())
    }
}

impl ScenarioStep {
    /// Short label used in logs
    pub fn describe(&self) -> String {
        match self {
            ScenarioStep::Goto { path } => format!("goto:{}", path),
            ScenarioStep::Click { locator, .. } => format!("click:{}", locator),
            ScenarioStep::Fill { locator, .. } => format!("fill:{}", locator),
            ScenarioStep::Press { locator, key, .. } => format!("press:{}:{}", locator, key),
            ScenarioStep::WaitForAppRun { .. } => "wait_for_app_run".to_string(),
            ScenarioStep::Sleep { ms } => format!("sleep:{}ms", ms),
            ScenarioStep::Expect(step) => format!("expect:{}", step.locator),
            ScenarioStep::Snapshot { name, .. } => format!("snapshot:{}", name),
            ScenarioStep::ClickButton { label } => format!("click_button:{}", label),
            ScenarioStep::ExpectException { .. } => "expect_exception".to_string(),
            ScenarioStep::ClickOnExpander { label } => format!("click_on_expander:{}", label),
            ScenarioStep::Log { message } => format!("log:{}", message.chars().take(30).collect::<String>()),
        }
    }

    pub async fn run(&self, session: &TestSession) -> E2eResult<()> {
        match self {
            ScenarioStep::Goto { path } => session.open_path(path).await,
            ScenarioStep::Click { locator, wait_for_app_run } => {
                session.chain(locator.clone()).click().await?;
                if *wait_for_app_run {
                    session.wait_for_app_run(None).await?;
                }
                Ok(())
            }
            ScenarioStep::Fill { locator, value } => session.chain(locator.clone()).fill(value).await,
            ScenarioStep::Press { locator, key, wait_for_app_run } => {
                session.chain(locator.clone()).press(key).await?;
                if *wait_for_app_run {
                    session.wait_for_app_run(None).await?;
                }
                Ok(())
            }
            ScenarioStep::WaitForAppRun { timeout_ms } => {
                session.wait_for_app_run(timeout_ms.map(Duration::from_millis)).await
            }
            ScenarioStep::Sleep { ms } => {
                session.wait_for_timeout(*ms).await;
                Ok(())
            }
            ScenarioStep::Expect(step) => step.run(session).await,
            ScenarioStep::Snapshot { locator, name, mask } => {
                let options = SnapshotOptions {
                    mask: mask.iter().map(|m| session.chain(m.clone())).collect(),
                    capture_attempts: None,
                };
                session
                    .assert_snapshot_with(&session.chain(locator.clone()), name, options)
                    .await
                    .map(|_| ())
            }
            ScenarioStep::ClickButton { label } => helpers::click_button(session, label).await,
            ScenarioStep::ExpectException { message } => helpers::expect_exception(session, message).await,
            ScenarioStep::ClickOnExpander { label } => helpers::click_on_expander(session, label).await,
            ScenarioStep::Log { message } => {
                info!("[TEST LOG] {}", message);
                Ok(())
            }
        }
    }
}

impl ScenarioCase {
    pub async fn run(&self, session: &TestSession) -> E2eResult<()> {
        for (i, step) in self.steps.iter().enumerate() {
            debug!(case = %self.name, step = i + 1, "{}", step.describe());
            step.run(session).await?;
        }
        Ok(())
    }
}

impl ScenarioSuite {
    /// Parse a suite from YAML string
    pub fn from_yaml(yaml: &str) -> E2eResult<Self> {
        let suite: Self = serde_yaml::from_str(yaml)?;
        suite.validate()?;
        Ok(suite)
    }

    /// Parse a suite from a YAML file
    pub fn from_file(path: &Path) -> E2eResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
            .map_err(|e| E2eError::SpecParse(format!("{}: {}", path.display(), e)))
    }

    /// Load all suites from a directory
    pub fn load_all(dir: &Path) -> E2eResult<Vec<Self>> {
        let mut suites = Vec::new();

        for entry in walkdir::WalkDir::new(dir)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| {
                e.path()
                    .extension()
                    .map(|ext| ext == "yaml" || ext == "yml")
                    .unwrap_or(false)
            })
        {
            suites.push(Self::from_file(entry.path())?);
        }

        Ok(suites)
    }

    /// Reject suites that would only fail at run time
    pub fn validate(&self) -> E2eResult<()> {
        let mut seen = HashSet::new();
        for case in &self.cases {
            if case.name.trim().is_empty() {
                return Err(E2eError::SpecParse(format!("{}: case without a name", self.suite)));
            }
            if !seen.insert(case.name.as_str()) {
                return Err(E2eError::SpecParse(format!(
                    "{}: duplicate case {}",
                    self.suite, case.name
                )));
            }
            for step in &case.steps {
                if let ScenarioStep::Expect(expect) = step {
                    if expect.is_empty() {
                        return Err(E2eError::SpecParse(format!(
                            "{}: expect on {} checks nothing",
                            case.name, expect.locator
                        )));
                    }
                    if let Some(attribute) = &expect.attribute {
                        attribute.expected()?;
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::locator::LocatorStep;

    #[test]
    fn test_parse_suite() {
        let yaml = r#"
suite: widgets
fixture: st_video
tags: [video]
cases:
  - name: test_first_video
    skip_browsers: [webkit]
    steps:
      - action: expect
        locator: [{test_id: stVideo}, {nth: 0}]
        visible: true
        attribute:
          name: src
          pattern: '.*media.*.mp4'
      - action: click
        locator: [{test_id: stNumberInput}, {css: button.step-up}]
      - action: sleep
        ms: 2000
      - action: snapshot
        locator: [{test_id: stVideo}, {nth: 1}]
        name: video-updated-start
"#;
        let suite = ScenarioSuite::from_yaml(yaml).unwrap();
        assert_eq!(suite.fixture, "st_video");
        let case = &suite.cases[0];
        assert_eq!(case.skip_browsers, vec![Browser::Webkit]);
        assert!(!case.themed);
        assert_eq!(case.steps.len(), 4);
        match &case.steps[0] {
            ScenarioStep::Expect(step) => {
                assert_eq!(step.locator.steps()[1], LocatorStep::Nth(0));
                assert_eq!(step.visible, Some(true));
            }
            other => panic!("unexpected step {:?}", other),
        }
    }

    #[test]
    fn test_attribute_needs_value_or_pattern() {
        let yaml = r#"
suite: bad
fixture: st_video
cases:
  - name: test_attribute
    steps:
      - action: expect
        locator: [{test_id: stVideo}]
        attribute:
          name: src
"#;
        assert!(matches!(ScenarioSuite::from_yaml(yaml), Err(E2eError::SpecParse(_))));
    }

    #[test]
    fn test_duplicate_case_names_rejected() {
        let yaml = r#"
suite: dup
fixture: st_video
cases:
  - name: test_a
    steps: []
  - name: test_a
    steps: []
"#;
        assert!(ScenarioSuite::from_yaml(yaml).is_err());
    }

    #[test]
    fn test_empty_expect_rejected() {
        let yaml = r#"
suite: empty
fixture: st_video
cases:
  - name: test_nothing
    steps:
      - action: expect
        locator: [{test_id: stVideo}]
"#;
        assert!(ScenarioSuite::from_yaml(yaml).is_err());
    }

    #[test]
    fn test_load_all_walks_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("nested")).unwrap();
        std::fs::write(
            dir.path().join("nested/a.yaml"),
            "suite: a\nfixture: st_video\ncases: []\n",
        )
        .unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let suites = ScenarioSuite::load_all(dir.path()).unwrap();
        assert_eq!(suites.len(), 1);
        assert_eq!(suites[0].suite, "a");
    }
}
