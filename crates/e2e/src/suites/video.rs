//! Video widget suite, declared in `scenarios/st_video.yaml`

use crate::error::E2eResult;
use crate::runner::TestCase;
use crate::scenario::ScenarioSuite;

const SCENARIO: &str = include_str!("../../scenarios/st_video.yaml");

pub fn suite() -> E2eResult<ScenarioSuite> {
    ScenarioSuite::from_yaml(SCENARIO)
}

pub fn cases() -> E2eResult<Vec<TestCase>> {
    Ok(TestCase::from_suite(&suite()?))
}
