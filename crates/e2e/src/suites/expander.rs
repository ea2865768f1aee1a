//! Expander widget suite

use futures::future::BoxFuture;
use futures::FutureExt;

use crate::error::E2eResult;
use crate::expect::expect;
use crate::fixtures::{EXPANDER_FIXTURE, NESTED_EXPANDER_MESSAGE};
use crate::helpers::{click_button, click_on_expander, expect_exception, get_expander, EXPANDER_HEADER, EXPANDER_TEST_ID};
use crate::runner::TestCase;
use crate::session::TestSession;

const MAIN_CONTAINER: &str = "stAppViewBlockContainer";

/// Snapshot names of the six expanders, in document order
pub const EXPANDER_SNAPSHOTS: [&str; 6] = [
    "st_expander-sidebar_collapsed",
    "st_expander-normal_expanded",
    "st_expander-normal_collapsed",
    "st_expander-with_input",
    "st_expander-long_expanded",
    "st_expander-long_collapsed",
];

pub fn cases() -> Vec<TestCase> {
    vec![
        TestCase::native("test_expander_displays_correctly", EXPANDER_FIXTURE, displays_correctly)
            .themed()
            .tag("expander")
            .tag("snapshot"),
        TestCase::native("test_expander_collapses_and_expands", EXPANDER_FIXTURE, collapses_and_expands)
            .tag("expander"),
        TestCase::native("test_empty_expander_not_rendered", EXPANDER_FIXTURE, empty_expander_not_rendered)
            .tag("expander"),
        TestCase::native("test_expander_session_state_set", EXPANDER_FIXTURE, session_state_set)
            .tag("expander"),
        TestCase::native(
            "test_nested_expanders_raises_exception",
            EXPANDER_FIXTURE,
            nested_expanders_raises_exception,
        )
        .tag("expander"),
        TestCase::native("test_expandable_state", EXPANDER_FIXTURE, expandable_state).tag("expander"),
    ]
}

fn displays_correctly(session: &TestSession) -> BoxFuture<'_, E2eResult<()>> {
    async move {
        let expanders = session.get_by_test_id(EXPANDER_TEST_ID);
        expect(&expanders).to_have_count(6).await?;

        for expander in expanders.all().await? {
            expect(&expander.locator(EXPANDER_HEADER)).to_be_visible().await?;
        }

        for (i, name) in EXPANDER_SNAPSHOTS.iter().enumerate() {
            session.assert_snapshot(&expanders.nth(i), name).await?;
        }
        Ok(())
    }
    .boxed()
}

fn collapses_and_expands(session: &TestSession) -> BoxFuture<'_, E2eResult<()>> {
    async move {
        let main_expanders = session
            .get_by_test_id(MAIN_CONTAINER)
            .get_by_test_id(EXPANDER_TEST_ID);
        expect(&main_expanders).to_have_count(5).await?;

        let expanders = main_expanders.all().await?;
        // First starts expanded, second collapsed; the toggle icon stays put either way
        for expander in expanders.iter().take(2) {
            let header = expander.locator(EXPANDER_HEADER);
            expect(&header).to_be_visible().await?;
            expect(&header.locator("svg").first()).to_be_visible().await?;
            header.click().await?;
            expect(&header.locator("svg").first()).to_be_visible().await?;
        }
        Ok(())
    }
    .boxed()
}

fn empty_expander_not_rendered(session: &TestSession) -> BoxFuture<'_, E2eResult<()>> {
    async move {
        expect(&session.get_by_text("Empty expander"))
            .not_to_be_attached()
            .await
    }
    .boxed()
}

fn session_state_set(session: &TestSession) -> BoxFuture<'_, E2eResult<()>> {
    async move {
        let main_expanders = session
            .get_by_test_id(MAIN_CONTAINER)
            .get_by_test_id(EXPANDER_TEST_ID);
        expect(&main_expanders).to_have_count(5).await?;

        // Show the number input
        let num_input = main_expanders
            .nth(2)
            .get_by_test_id("stNumberInput")
            .locator("input");
        num_input.fill("10").await?;
        num_input.press("Enter").await?;
        session.wait_for_app_run(None).await?;

        // Hide the number input
        main_expanders.nth(2).locator(EXPANDER_HEADER).click().await?;

        session.get_by_text("Update Num Input").click().await?;
        session.wait_for_app_run(None).await?;

        session.get_by_text("Print State Value").click().await?;
        session.wait_for_app_run(None).await?;

        let text_elements = session.get_by_test_id("stText");
        expect(&text_elements).to_have_count(2).await?;
        for i in 0..2 {
            expect(&text_elements.nth(i))
                .use_inner_text(true)
                .to_have_text("0.0")
                .await?;
        }
        Ok(())
    }
    .boxed()
}

fn nested_expanders_raises_exception(session: &TestSession) -> BoxFuture<'_, E2eResult<()>> {
    async move {
        click_button(session, "Nested expander (raises exception)").await?;
        expect_exception(session, NESTED_EXPANDER_MESSAGE).await
    }
    .boxed()
}

fn expandable_state(session: &TestSession) -> BoxFuture<'_, E2eResult<()>> {
    async move {
        click_button(session, "Show expander_1").await?;
        click_on_expander(session, "expander_1").await?;

        let expander_1 = get_expander(session, "expander_1").await?;
        let details = expander_1.get_by_test_id("stExpanderDetails");
        expect(&details).to_contain_text("expander_1 write").await?;

        // A distinct expander must not inherit expander_1's state
        click_button(session, "Show expander_2").await?;
        expect(&details).not_to_contain_text("expander_1 write").await?;
        expect(&details).to_be_hidden().await
    }
    .boxed()
}
