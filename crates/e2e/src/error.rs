//! Error types for E2E testing

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum E2eError {
    #[error("Application server failed to start: {0}")]
    ServerStartup(String),

    #[error("Application health check failed after {0} attempts")]
    ServerHealthCheck(usize),

    #[error("Playwright not found. Install with: npx playwright install")]
    DriverNotFound,

    #[error("Page driver error: {0}")]
    Driver(String),

    #[error("Scenario parse error: {0}")]
    SpecParse(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("No element matches {locator}")]
    NotFound { locator: String },

    #[error("{locator} resolved to {count} elements; index the locator to pick one")]
    Ambiguous { locator: String, count: usize },

    #[error("{assertion} timed out on {locator}: expected {expected}, last observed {actual}")]
    AssertionTimeout {
        assertion: String,
        locator: String,
        expected: String,
        actual: String,
    },

    #[error(
        "Snapshot mismatch: {name} differs by {diff_percent:.3}% (threshold: {threshold:.3}%), diff at {}",
        diff_path.display()
    )]
    SnapshotMismatch {
        name: String,
        diff_percent: f64,
        threshold: f64,
        diff_path: PathBuf,
    },

    #[error("Application did not finish running within {timeout_ms} ms (last state: {last_state})")]
    AppRunTimeout { timeout_ms: u64, last_state: String },

    #[error("Test case timed out after {0} ms")]
    CaseTimeout(u64),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Regex error: {0}")]
    Regex(#[from] regex::Error),
}

impl E2eError {
    /// Whether this error is a test failure rather than a harness fault
    pub fn is_assertion(&self) -> bool {
        matches!(
            self,
            E2eError::NotFound { .. }
                | E2eError::Ambiguous { .. }
                | E2eError::AssertionTimeout { .. }
                | E2eError::SnapshotMismatch { .. }
                | E2eError::AppRunTimeout { .. }
                | E2eError::CaseTimeout(_)
        )
    }
}

pub type E2eResult<T> = Result<T, E2eError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assertion_timeout_message_names_both_states() {
        let err = E2eError::AssertionTimeout {
            assertion: "to_have_count".to_string(),
            locator: "get_by_test_id(\"stVideo\")".to_string(),
            expected: "3".to_string(),
            actual: "2".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("to_have_count"));
        assert!(msg.contains("expected 3"));
        assert!(msg.contains("last observed 2"));
        assert!(err.is_assertion());
    }

    #[test]
    fn test_snapshot_mismatch_reports_diff_path() {
        let err = E2eError::SnapshotMismatch {
            name: "video_element_first".to_string(),
            diff_percent: 4.0,
            threshold: 0.2,
            diff_path: PathBuf::from("failures/video_element_first/diff.png"),
        };
        assert!(err.to_string().contains("failures/video_element_first/diff.png"));
    }

    #[test]
    fn test_infrastructure_errors_are_not_assertions() {
        assert!(!E2eError::DriverNotFound.is_assertion());
        assert!(!E2eError::ServerHealthCheck(3).is_assertion());
    }
}
