//! Widget suites

use std::path::Path;

use crate::error::E2eResult;
use crate::runner::TestCase;
use crate::scenario::ScenarioSuite;

pub mod expander;
pub mod video;

/// Every bundled case, plus cases from scenario files under `extra_dir`
pub fn all(extra_dir: Option<&Path>) -> E2eResult<Vec<TestCase>> {
    let mut cases = expander::cases();
    cases.extend(video::cases()?);

    if let Some(dir) = extra_dir {
        for suite in ScenarioSuite::load_all(dir)? {
            cases.extend(TestCase::from_suite(&suite));
        }
    }
    Ok(cases)
}
