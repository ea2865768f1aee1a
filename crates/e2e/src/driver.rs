//! Page driver abstraction
//!
//! The harness never talks to a browser directly. Everything goes through
//! [`PageDriver`], which resolves locator chains to element states and
//! performs actions on elements the harness has already checked for
//! strictness.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{E2eError, E2eResult};
use crate::locator::Chain;

/// Browser engine a page runs in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Browser {
    #[default]
    Chromium,
    Firefox,
    Webkit,
}

impl Browser {
    pub fn as_str(&self) -> &'static str {
        match self {
            Browser::Chromium => "chromium",
            Browser::Firefox => "firefox",
            Browser::Webkit => "webkit",
        }
    }
}

impl fmt::Display for Browser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Browser {
    type Err = E2eError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "chromium" | "chrome" => Ok(Browser::Chromium),
            "firefox" => Ok(Browser::Firefox),
            "webkit" | "safari" => Ok(Browser::Webkit),
            other => Err(E2eError::Config(format!("unknown browser engine: {}", other))),
        }
    }
}

/// Visual theme a themed test variant runs under
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Theme {
    #[serde(rename = "light_theme")]
    Light,
    #[serde(rename = "dark_theme")]
    Dark,
}

impl Theme {
    pub const ALL: [Theme; 2] = [Theme::Light, Theme::Dark];

    /// Value passed to the app as `?embed_options=`
    pub fn as_str(&self) -> &'static str {
        match self {
            Theme::Light => "light_theme",
            Theme::Dark => "dark_theme",
        }
    }
}

impl fmt::Display for Theme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Theme {
    type Err = E2eError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "light" | "light_theme" => Ok(Theme::Light),
            "dark" | "dark_theme" => Ok(Theme::Dark),
            other => Err(E2eError::Config(format!("unknown theme: {}", other))),
        }
    }
}

/// Snapshot of one matched element as reported by the driver
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementState {
    pub tag: String,

    /// `textContent`, including text of hidden descendants
    #[serde(default)]
    pub text: String,

    /// `innerText`, rendered text only
    #[serde(default)]
    pub inner_text: String,

    pub visible: bool,

    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

impl ElementState {
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    pub fn test_id(&self) -> Option<&str> {
        self.attribute("data-testid")
    }
}

/// Operations the harness needs from a live page.
///
/// Action methods are only called once the harness has verified that the
/// chain resolves to exactly one element.
#[async_trait]
pub trait PageDriver: Send + Sync {
    /// Engine backing this page
    fn engine(&self) -> Browser;

    async fn goto(&self, url: &str) -> E2eResult<()>;

    /// Resolve a chain to the live set of matching elements in document order
    async fn query(&self, chain: &Chain) -> E2eResult<Vec<ElementState>>;

    async fn click(&self, chain: &Chain) -> E2eResult<()>;

    async fn fill(&self, chain: &Chain, value: &str) -> E2eResult<()>;

    async fn press(&self, chain: &Chain, key: &str) -> E2eResult<()>;

    /// PNG capture of the element's rendered bounds, with `mask` regions blanked
    async fn screenshot(&self, chain: &Chain, mask: &[Chain]) -> E2eResult<Vec<u8>>;

    async fn close(&self) -> E2eResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_browser_round_trips_through_str() {
        for browser in [Browser::Chromium, Browser::Firefox, Browser::Webkit] {
            assert_eq!(browser.as_str().parse::<Browser>().unwrap(), browser);
        }
        assert!("netscape".parse::<Browser>().is_err());
    }

    #[test]
    fn test_theme_accepts_short_names() {
        assert_eq!("dark".parse::<Theme>().unwrap(), Theme::Dark);
        assert_eq!("light_theme".parse::<Theme>().unwrap(), Theme::Light);
    }

    #[test]
    fn test_element_state_attribute_lookup() {
        let mut state = ElementState::default();
        state.attributes.insert("data-testid".into(), "stVideo".into());
        assert_eq!(state.test_id(), Some("stVideo"));
        assert_eq!(state.attribute("src"), None);
    }
}
