//! Lazy, re-resolvable element handles
//!
//! A [`Locator`] is a chain of selection steps. Nothing is looked up until an
//! operation runs, and every operation resolves the chain again against the
//! live page, so a locator stays valid across application re-runs that
//! replace the DOM.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::driver::ElementState;
use crate::error::{E2eError, E2eResult};
use crate::page::Page;
use crate::wait::{poll_until, PollOutcome, Probe};

/// One selection step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocatorStep {
    /// Descendants whose `data-testid` equals the value
    TestId(String),
    /// Innermost descendants whose text contains the value (case-insensitive)
    Text(String),
    /// Descendants with an ARIA role, optionally filtered by accessible name
    Role {
        role: String,
        #[serde(default)]
        name: Option<String>,
    },
    /// Descendants matching a CSS selector
    Css(String),
    Nth(usize),
    First,
    Last,
    /// Keep current matches whose text contains the value
    HasText(String),
    /// Keep current matches that contain a match for the nested chain
    Has(Vec<LocatorStep>),
}

impl LocatorStep {
    fn is_index(&self) -> bool {
        matches!(self, LocatorStep::Nth(_) | LocatorStep::First | LocatorStep::Last)
    }
}

/// Ordered list of selection steps, resolved from the document root
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Chain(pub Vec<LocatorStep>);

impl Chain {
    pub fn test_id(test_id: impl Into<String>) -> Self {
        Chain(vec![LocatorStep::TestId(test_id.into())])
    }

    pub fn css(css: impl Into<String>) -> Self {
        Chain(vec![LocatorStep::Css(css.into())])
    }

    pub fn text(text: impl Into<String>) -> Self {
        Chain(vec![LocatorStep::Text(text.into())])
    }

    pub fn steps(&self) -> &[LocatorStep] {
        &self.0
    }

    pub fn push(&self, step: LocatorStep) -> Self {
        let mut steps = self.0.clone();
        steps.push(step);
        Chain(steps)
    }

    /// Whether the chain ends in an explicit index, which waives strictness
    pub fn is_indexed(&self) -> bool {
        self.0.last().map(LocatorStep::is_index).unwrap_or(false)
    }
}

impl From<Vec<LocatorStep>> for Chain {
    fn from(steps: Vec<LocatorStep>) -> Self {
        Chain(steps)
    }
}

fn write_steps(f: &mut fmt::Formatter<'_>, steps: &[LocatorStep]) -> fmt::Result {
    for (i, step) in steps.iter().enumerate() {
        if i > 0 {
            f.write_str(".")?;
        }
        match step {
            LocatorStep::TestId(id) => write!(f, "get_by_test_id({:?})", id)?,
            LocatorStep::Text(text) => write!(f, "get_by_text({:?})", text)?,
            LocatorStep::Role { role, name: Some(name) } => {
                write!(f, "get_by_role({:?}, name={:?})", role, name)?
            }
            LocatorStep::Role { role, name: None } => write!(f, "get_by_role({:?})", role)?,
            LocatorStep::Css(css) => write!(f, "locator({:?})", css)?,
            LocatorStep::Nth(n) => write!(f, "nth({})", n)?,
            LocatorStep::First => f.write_str("first")?,
            LocatorStep::Last => f.write_str("last")?,
            LocatorStep::HasText(text) => write!(f, "filter(has_text={:?})", text)?,
            LocatorStep::Has(inner) => {
                f.write_str("filter(has=")?;
                write_steps(f, inner)?;
                f.write_str(")")?;
            }
        }
    }
    Ok(())
}

impl fmt::Display for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return f.write_str("page");
        }
        write_steps(f, &self.0)
    }
}

/// Handle to zero or more elements on a page
#[derive(Clone)]
pub struct Locator {
    page: Page,
    chain: Chain,
}

impl fmt::Debug for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Locator").field(&self.chain.to_string()).finish()
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.chain.fmt(f)
    }
}

impl Locator {
    pub fn new(page: Page, chain: Chain) -> Self {
        Self { page, chain }
    }

    pub fn page(&self) -> &Page {
        &self.page
    }

    pub fn chain(&self) -> &Chain {
        &self.chain
    }

    fn then(&self, step: LocatorStep) -> Self {
        Self {
            page: self.page.clone(),
            chain: self.chain.push(step),
        }
    }

    pub fn get_by_test_id(&self, test_id: impl Into<String>) -> Self {
        self.then(LocatorStep::TestId(test_id.into()))
    }

    pub fn get_by_text(&self, text: impl Into<String>) -> Self {
        self.then(LocatorStep::Text(text.into()))
    }

    pub fn get_by_role(&self, role: impl Into<String>, name: Option<&str>) -> Self {
        self.then(LocatorStep::Role {
            role: role.into(),
            name: name.map(String::from),
        })
    }

    pub fn locator(&self, css: impl Into<String>) -> Self {
        self.then(LocatorStep::Css(css.into()))
    }

    pub fn nth(&self, index: usize) -> Self {
        self.then(LocatorStep::Nth(index))
    }

    pub fn first(&self) -> Self {
        self.then(LocatorStep::First)
    }

    pub fn last(&self) -> Self {
        self.then(LocatorStep::Last)
    }

    pub fn filter_has_text(&self, text: impl Into<String>) -> Self {
        self.then(LocatorStep::HasText(text.into()))
    }

    /// Keep matches containing an element matched by `inner`, resolved relative to each match
    pub fn filter_has(&self, inner: &Locator) -> Self {
        self.then(LocatorStep::Has(inner.chain.0.clone()))
    }

    /// Resolve against the live page
    pub async fn resolve(&self) -> E2eResult<Vec<ElementState>> {
        self.page.driver().query(&self.chain).await
    }

    pub async fn count(&self) -> E2eResult<usize> {
        Ok(self.resolve().await?.len())
    }

    /// One indexed locator per element currently matching
    pub async fn all(&self) -> E2eResult<Vec<Locator>> {
        let count = self.count().await?;
        Ok((0..count).map(|i| self.nth(i)).collect())
    }

    /// Wait for exactly one element to attach and return its state.
    ///
    /// Zero matches at the deadline is `NotFound`; several matches on a chain
    /// without an explicit index is `Ambiguous`.
    pub async fn element(&self) -> E2eResult<ElementState> {
        self.wait_single(false).await
    }

    /// Like [`element`](Self::element), but the element must also be visible.
    ///
    /// A match that stays hidden until the deadline fails the test with an
    /// `AssertionTimeout` naming the action.
    pub async fn actionable(&self, action: &str) -> E2eResult<ElementState> {
        match self.wait_single(true).await {
            Err(E2eError::AssertionTimeout { locator, expected, actual, .. }) => {
                Err(E2eError::AssertionTimeout {
                    assertion: action.to_string(),
                    locator,
                    expected,
                    actual,
                })
            }
            other => other,
        }
    }

    async fn wait_single(&self, visible: bool) -> E2eResult<ElementState> {
        const DETACHED: &str = "no matching element";

        let options = self.page.options().action;
        let outcome = poll_until(options, move || async move {
            let mut elements = self.resolve().await?;
            Ok(match elements.len() {
                0 => Probe::Pending(DETACHED.to_string()),
                count if count > 1 && !self.chain.is_indexed() => Probe::Ready(Err(count)),
                _ => {
                    let element = elements.remove(0);
                    if visible && !element.visible {
                        Probe::Pending("hidden".to_string())
                    } else {
                        Probe::Ready(Ok(element))
                    }
                }
            })
        })
        .await?;

        match outcome {
            PollOutcome::Ready(Ok(element)) => Ok(element),
            PollOutcome::Ready(Err(count)) => Err(E2eError::Ambiguous {
                locator: self.chain.to_string(),
                count,
            }),
            PollOutcome::TimedOut { last_observed } if last_observed == DETACHED => Err(E2eError::NotFound {
                locator: self.chain.to_string(),
            }),
            PollOutcome::TimedOut { last_observed } => Err(E2eError::AssertionTimeout {
                assertion: "element".to_string(),
                locator: self.chain.to_string(),
                expected: "visible".to_string(),
                actual: last_observed,
            }),
        }
    }

    pub async fn click(&self) -> E2eResult<()> {
        self.actionable("click").await?;
        debug!(locator = %self.chain, "click");
        self.page.before_interaction().await;
        self.page.driver().click(&self.chain).await
    }

    pub async fn fill(&self, value: &str) -> E2eResult<()> {
        self.actionable("fill").await?;
        debug!(locator = %self.chain, value, "fill");
        self.page.before_interaction().await;
        self.page.driver().fill(&self.chain, value).await
    }

    pub async fn press(&self, key: &str) -> E2eResult<()> {
        self.actionable("press").await?;
        debug!(locator = %self.chain, key, "press");
        self.page.before_interaction().await;
        self.page.driver().press(&self.chain, key).await
    }

    pub async fn inner_text(&self) -> E2eResult<String> {
        Ok(self.element().await?.inner_text)
    }

    pub async fn text_content(&self) -> E2eResult<String> {
        Ok(self.element().await?.text)
    }

    pub async fn get_attribute(&self, name: &str) -> E2eResult<Option<String>> {
        Ok(self.element().await?.attributes.get(name).cloned())
    }

    /// Non-waiting visibility check; false when nothing matches
    pub async fn is_visible(&self) -> E2eResult<bool> {
        Ok(self.resolve().await?.first().map(|e| e.visible).unwrap_or(false))
    }

    pub async fn screenshot(&self, mask: &[Locator]) -> E2eResult<Vec<u8>> {
        self.actionable("screenshot").await?;
        let mask: Vec<Chain> = mask.iter().map(|m| m.chain.clone()).collect();
        self.page.driver().screenshot(&self.chain, &mask).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chain_display_reads_like_call_chain() {
        let chain = Chain(vec![
            LocatorStep::TestId("stExpander".into()),
            LocatorStep::Nth(2),
            LocatorStep::Css("summary".into()),
        ]);
        assert_eq!(
            chain.to_string(),
            r#"get_by_test_id("stExpander").nth(2).locator("summary")"#
        );
    }

    #[test]
    fn test_chain_display_nests_has_filter() {
        let chain = Chain(vec![
            LocatorStep::TestId("stExpander".into()),
            LocatorStep::Has(vec![
                LocatorStep::Css("summary".into()),
                LocatorStep::HasText("expander_1".into()),
            ]),
        ]);
        assert_eq!(
            chain.to_string(),
            r#"get_by_test_id("stExpander").filter(has=locator("summary").filter(has_text="expander_1"))"#
        );
    }

    #[test]
    fn test_is_indexed_only_looks_at_last_step() {
        let indexed = Chain(vec![LocatorStep::TestId("stVideo".into()), LocatorStep::Nth(1)]);
        assert!(indexed.is_indexed());

        let scoped = indexed.push(LocatorStep::Css("video".into()));
        assert!(!scoped.is_indexed());
        assert!(Chain::default().to_string() == "page");
    }

    #[test]
    fn test_steps_deserialize_from_yaml() {
        let yaml = r#"
- test_id: stVideo
- nth: 1
- first
- role:
    role: button
    name: Update
"#;
        let chain: Chain = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(
            chain.steps(),
            &[
                LocatorStep::TestId("stVideo".into()),
                LocatorStep::Nth(1),
                LocatorStep::First,
                LocatorStep::Role { role: "button".into(), name: Some("Update".into()) },
            ]
        );
    }
}
