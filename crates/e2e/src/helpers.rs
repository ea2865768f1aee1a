//! Widget-level helpers shared by the suites

use crate::error::E2eResult;
use crate::expect::expect;
use crate::locator::Locator;
use crate::session::TestSession;

/// Clickable header of an expander
pub const EXPANDER_HEADER: &str = "summary";

pub const BUTTON_TEST_ID: &str = "stButton";
pub const EXCEPTION_TEST_ID: &str = "stException";
pub const EXPANDER_TEST_ID: &str = "stExpander";

/// The button widget whose label contains `label`
pub fn get_button(session: &TestSession, label: &str) -> Locator {
    session
        .get_by_test_id(BUTTON_TEST_ID)
        .get_by_role("button", Some(label))
}

/// Click the button labelled `label` and wait for the run it triggers
pub async fn click_button(session: &TestSession, label: &str) -> E2eResult<()> {
    get_button(session, label).click().await?;
    session.wait_for_app_run(None).await
}

/// An exception containing `message` must be shown
pub async fn expect_exception(session: &TestSession, message: &str) -> E2eResult<()> {
    let exception = session
        .get_by_test_id(EXCEPTION_TEST_ID)
        .filter_has_text(message);
    expect(&exception).to_be_visible().await
}

/// The single expander whose header contains `label`
pub async fn get_expander(session: &TestSession, label: &str) -> E2eResult<Locator> {
    let header = session.locator(EXPANDER_HEADER).filter_has_text(label);
    let expander = session.get_by_test_id(EXPANDER_TEST_ID).filter_has(&header);
    expect(&expander).to_have_count(1).await?;
    Ok(expander)
}

/// Toggle the expander labelled `label` by clicking its header
pub async fn click_on_expander(session: &TestSession, label: &str) -> E2eResult<()> {
    let expander = get_expander(session, label).await?;
    expander.locator(EXPANDER_HEADER).click().await
}
