//! Polling assertions
//!
//! Each assertion re-resolves its locator on every attempt and keeps polling
//! until the condition holds or the window closes. A timeout reports the last
//! observed state next to the expected one.

use std::fmt;
use std::time::Duration;

use regex::Regex;

use crate::app_run::CyclePhase;
use crate::driver::ElementState;
use crate::error::{E2eError, E2eResult};
use crate::locator::Locator;
use crate::wait::{poll_until, PollOutcome, Probe, WaitOptions};

/// Expected text or attribute value
#[derive(Debug, Clone)]
pub enum TextMatch {
    /// Equal after whitespace normalisation
    Exact(String),
    Pattern(Regex),
}

impl TextMatch {
    pub fn pattern(pattern: &str) -> E2eResult<Self> {
        Ok(TextMatch::Pattern(Regex::new(pattern)?))
    }

    pub fn matches(&self, actual: &str) -> bool {
        match self {
            TextMatch::Exact(expected) => normalize(expected) == normalize(actual),
            TextMatch::Pattern(re) => re.is_match(actual),
        }
    }

    /// Like [`matches`](Self::matches), but exact values compare verbatim
    pub fn matches_value(&self, actual: &str) -> bool {
        match self {
            TextMatch::Exact(expected) => expected == actual,
            TextMatch::Pattern(re) => re.is_match(actual),
        }
    }
}

impl fmt::Display for TextMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TextMatch::Exact(text) => write!(f, "{:?}", text),
            TextMatch::Pattern(re) => write!(f, "/{}/", re.as_str()),
        }
    }
}

impl From<&str> for TextMatch {
    fn from(text: &str) -> Self {
        TextMatch::Exact(text.to_string())
    }
}

impl From<String> for TextMatch {
    fn from(text: String) -> Self {
        TextMatch::Exact(text)
    }
}

impl From<Regex> for TextMatch {
    fn from(re: Regex) -> Self {
        TextMatch::Pattern(re)
    }
}

/// Collapse runs of whitespace and trim
pub fn normalize(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Start an assertion on `locator`
pub fn expect(locator: &Locator) -> Expectation {
    Expectation {
        locator: locator.clone(),
        options: locator.page().options().assertion,
        use_inner_text: false,
    }
}

pub struct Expectation {
    locator: Locator,
    options: WaitOptions,
    use_inner_text: bool,
}

fn single(elements: &[ElementState]) -> Result<&ElementState, String> {
    match elements {
        [] => Err("no matching element".to_string()),
        [one] => Ok(one),
        many => Err(format!("{} matching elements", many.len())),
    }
}

impl Expectation {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.options.timeout = timeout;
        self
    }

    /// Compare against rendered `innerText` instead of `textContent`
    pub fn use_inner_text(mut self, enabled: bool) -> Self {
        self.use_inner_text = enabled;
        self
    }

    fn text_of<'a>(&self, element: &'a ElementState) -> &'a str {
        if self.use_inner_text {
            &element.inner_text
        } else {
            &element.text
        }
    }

    /// Poll `check` until it accepts the resolved elements.
    ///
    /// `check` returns a description of the observed state when it rejects.
    async fn poll<F>(&self, assertion: &str, expected: String, check: F) -> E2eResult<()>
    where
        F: Fn(&[ElementState]) -> Result<(), String>,
    {
        let page = self.locator.page();
        page.tracker().transition(CyclePhase::AssertionPolling);

        let locator = &self.locator;
        let check = &check;
        let outcome = poll_until(self.options, move || async move {
            let elements = locator.resolve().await?;
            Ok(match check(&elements) {
                Ok(()) => Probe::Ready(()),
                Err(actual) => Probe::Pending(actual),
            })
        })
        .await;

        match outcome {
            Ok(PollOutcome::Ready(())) => {
                page.tracker().transition(CyclePhase::Passed);
                Ok(())
            }
            Ok(PollOutcome::TimedOut { last_observed }) => {
                page.tracker().transition(CyclePhase::Failed);
                Err(E2eError::AssertionTimeout {
                    assertion: assertion.to_string(),
                    locator: self.locator.to_string(),
                    expected,
                    actual: last_observed,
                })
            }
            Err(e) => {
                page.tracker().transition(CyclePhase::Failed);
                Err(e)
            }
        }
    }

    pub async fn to_have_count(&self, count: usize) -> E2eResult<()> {
        self.poll("to_have_count", count.to_string(), |elements| {
            if elements.len() == count {
                Ok(())
            } else {
                Err(elements.len().to_string())
            }
        })
        .await
    }

    pub async fn to_be_visible(&self) -> E2eResult<()> {
        self.poll("to_be_visible", "visible".to_string(), |elements| {
            let element = single(elements)?;
            if element.visible {
                Ok(())
            } else {
                Err("hidden".to_string())
            }
        })
        .await
    }

    /// Passes when nothing matches or every match is hidden
    pub async fn to_be_hidden(&self) -> E2eResult<()> {
        self.poll("to_be_hidden", "hidden or detached".to_string(), |elements| {
            let visible = elements.iter().filter(|e| e.visible).count();
            if visible == 0 {
                Ok(())
            } else {
                Err(format!("{} visible element(s)", visible))
            }
        })
        .await
    }

    pub async fn to_be_attached(&self) -> E2eResult<()> {
        self.poll("to_be_attached", "attached".to_string(), |elements| {
            single(elements).map(|_| ())
        })
        .await
    }

    pub async fn not_to_be_attached(&self) -> E2eResult<()> {
        self.poll("not_to_be_attached", "detached".to_string(), |elements| {
            if elements.is_empty() {
                Ok(())
            } else {
                Err(format!("{} attached element(s)", elements.len()))
            }
        })
        .await
    }

    pub async fn to_have_text(&self, expected: impl Into<TextMatch>) -> E2eResult<()> {
        let expected = expected.into();
        self.poll("to_have_text", expected.to_string(), |elements| {
            let text = self.text_of(single(elements)?);
            if expected.matches(text) {
                Ok(())
            } else {
                Err(format!("{:?}", text))
            }
        })
        .await
    }

    pub async fn to_contain_text(&self, expected: &str) -> E2eResult<()> {
        let needle = normalize(expected);
        self.poll("to_contain_text", format!("text containing {:?}", expected), |elements| {
            let text = normalize(self.text_of(single(elements)?));
            if text.contains(&needle) {
                Ok(())
            } else {
                Err(format!("{:?}", text))
            }
        })
        .await
    }

    /// Passes when the element is detached or its text lacks `unexpected`
    pub async fn not_to_contain_text(&self, unexpected: &str) -> E2eResult<()> {
        let needle = normalize(unexpected);
        self.poll(
            "not_to_contain_text",
            format!("text without {:?}", unexpected),
            |elements| match elements {
                [] => Ok(()),
                _ => {
                    let text = normalize(self.text_of(single(elements)?));
                    if text.contains(&needle) {
                        Err(format!("{:?}", text))
                    } else {
                        Ok(())
                    }
                }
            },
        )
        .await
    }

    pub async fn to_have_attribute(&self, name: &str, expected: impl Into<TextMatch>) -> E2eResult<()> {
        let expected = expected.into();
        self.poll(
            "to_have_attribute",
            format!("{}={}", name, expected),
            |elements| match single(elements)?.attribute(name) {
                Some(value) if expected.matches_value(value) => Ok(()),
                Some(value) => Err(format!("{}={:?}", name, value)),
                None => Err(format!("no {} attribute", name)),
            },
        )
        .await
    }
}
