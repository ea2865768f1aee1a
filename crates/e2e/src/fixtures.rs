//! In-memory stand-ins for the widget fixture apps
//!
//! Each builder returns a [`MockPage`] whose tree and reactions follow what
//! the real fixture app renders, so the suites can run without a browser.

use crate::app_run::{APP_ROOT_TEST_ID, APP_VIEW_CONTAINER_TEST_ID};
use crate::helpers::{BUTTON_TEST_ID, EXCEPTION_TEST_ID, EXPANDER_HEADER, EXPANDER_TEST_ID};
use crate::locator::{Chain, LocatorStep};
use crate::mock::{Dom, Element, MockPage, NodeId};

pub const EXPANDER_FIXTURE: &str = "st_expander";
pub const VIDEO_FIXTURE: &str = "st_video";

const MAIN_CONTAINER_TEST_ID: &str = "stAppViewBlockContainer";
const DETAILS_TEST_ID: &str = "stExpanderDetails";
const NUMBER_INPUT_TEST_ID: &str = "stNumberInput";
const DYNAMIC_SLOT_TEST_ID: &str = "stVerticalBlock";

pub const NESTED_EXPANDER_MESSAGE: &str = "Expanders may not be nested inside other expanders.";
pub const SECOND_VIDEO_URL: &str = "https://www.w3schools.com/html/mov_bbb.mp4";

/// App root, view container and main block; returns the main block
fn app_shell(dom: &mut Dom) -> (NodeId, NodeId) {
    let root = dom.root();
    let app = dom.append(
        root,
        Element::new("div")
            .test_id(APP_ROOT_TEST_ID)
            .attr("data-test-connection-state", "CONNECTED")
            .attr("data-test-script-state", "notRunning")
            .attr("data-test-run-count", "1"),
    );
    let view = dom.append(app, Element::new("section").test_id(APP_VIEW_CONTAINER_TEST_ID));
    let main = dom.append(view, Element::new("div").test_id(MAIN_CONTAINER_TEST_ID));
    (app, main)
}

/// Expander with a header and a details block; returns the details node
fn expander(dom: &mut Dom, parent: NodeId, label: &str, expanded: bool) -> NodeId {
    let node = dom.append(parent, Element::new("details").test_id(EXPANDER_TEST_ID));
    let summary = dom.append(node, Element::new(EXPANDER_HEADER));
    dom.append(summary, Element::new("svg").attr("data-icon", "expand"));
    dom.append(summary, Element::new("span").text(label));
    let details = Element::new("div").test_id(DETAILS_TEST_ID);
    dom.append(node, if expanded { details } else { details.hidden() })
}

fn markdown(dom: &mut Dom, parent: NodeId, text: &str) -> NodeId {
    let block = dom.append(parent, Element::new("div").test_id("stMarkdown"));
    dom.append(block, Element::new("p").text(text))
}

fn button(dom: &mut Dom, parent: NodeId, label: &str) -> NodeId {
    let widget = dom.append(parent, Element::new("div").test_id(BUTTON_TEST_ID));
    let button = dom.append(widget, Element::new("button").attr("kind", "secondary"));
    dom.append(button, Element::new("p").text(label));
    button
}

fn button_chain(label: &str) -> Chain {
    Chain(vec![
        LocatorStep::TestId(BUTTON_TEST_ID.into()),
        LocatorStep::Role {
            role: "button".into(),
            name: Some(label.into()),
        },
    ])
}

fn number_input(dom: &Dom) -> Option<NodeId> {
    let chain = Chain(vec![
        LocatorStep::TestId(NUMBER_INPUT_TEST_ID.into()),
        LocatorStep::Css("input".into()),
        LocatorStep::First,
    ]);
    dom.find(&chain).ok()?.first().copied()
}

fn number_input_widget(dom: &mut Dom, parent: NodeId, label: &str, value: &str) -> NodeId {
    let widget = dom.append(parent, Element::new("div").test_id(NUMBER_INPUT_TEST_ID));
    dom.append(widget, Element::new("label").text(label));
    dom.append(widget, Element::new("input").attr("type", "number").attr("value", value));
    dom.append(widget, Element::new("button").class("step-down"));
    dom.append(widget, Element::new("button").class("step-up"));
    widget
}

fn parse_number(dom: &Dom, input: NodeId) -> f64 {
    dom.element(input)
        .attributes
        .get("value")
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(0.0)
}

/// Toggle the details sibling of a clicked expander header
fn toggle_expander(dom: &mut Dom, summary: NodeId) {
    let Some(expander) = dom.parent(summary) else { return };
    let details: Vec<NodeId> = dom
        .children(expander)
        .iter()
        .copied()
        .filter(|child| dom.element(*child).attributes.get("data-testid").map(String::as_str) == Some(DETAILS_TEST_ID))
        .collect();
    for node in details {
        let visible = dom.element(node).visible;
        dom.set_visible(node, !visible);
    }
}

fn dynamic_slot(dom: &Dom) -> Option<NodeId> {
    dom.find_test_id(DYNAMIC_SLOT_TEST_ID).first().copied()
}

fn show_dynamic_expander(dom: &mut Dom, label: &str) {
    let Some(slot) = dynamic_slot(dom) else { return };
    dom.clear_children(slot);
    let details = expander(dom, slot, label, false);
    markdown(dom, details, &format!("{} write", label));
}

/// Page emulating the expander fixture app
pub fn expander_app() -> MockPage {
    let mut dom = Dom::new();
    let (app, main) = app_shell(&mut dom);

    let sidebar = dom.append(app, Element::new("section").test_id("stSidebar"));
    let details = expander(&mut dom, sidebar, "Expand me!", false);
    markdown(&mut dom, details, "I am in the sidebar");

    let details = expander(&mut dom, main, "Collapse me!", true);
    markdown(&mut dom, details, "I can collapse");

    let details = expander(&mut dom, main, "Expand me!", false);
    markdown(&mut dom, details, "I can expand");

    let details = expander(&mut dom, main, "Expander with number input", true);
    number_input_widget(&mut dom, details, "number input", "0.0");

    let details = expander(&mut dom, main, "Expander long", true);
    markdown(&mut dom, details, &"Lorem ipsum dolor sit amet. ".repeat(8));

    let details = expander(&mut dom, main, "Collapsed long expander", false);
    markdown(&mut dom, details, &"Lorem ipsum dolor sit amet. ".repeat(8));

    button(&mut dom, main, "Update Num Input");
    button(&mut dom, main, "Print State Value");
    button(&mut dom, main, "Nested expander (raises exception)");
    button(&mut dom, main, "Show expander_1");
    button(&mut dom, main, "Show expander_2");
    dom.append(main, Element::new("div").test_id(DYNAMIC_SLOT_TEST_ID));

    MockPage::new(dom)
        .on_click(Chain::css(EXPANDER_HEADER), toggle_expander)
        .on_press_rerun(
            Chain(vec![
                LocatorStep::TestId(NUMBER_INPUT_TEST_ID.into()),
                LocatorStep::Css("input".into()),
            ]),
            "Enter",
            |dom, input| {
                let value = parse_number(dom, input);
                dom.set_attr(input, "value", &format!("{:.1}", value));
            },
        )
        .on_click_rerun(button_chain("Update Num Input"), |dom, _| {
            if let Some(input) = number_input(dom) {
                dom.set_attr(input, "value", "0.0");
            }
        })
        .on_click_rerun(button_chain("Print State Value"), |dom, button| {
            let Some(input) = number_input(dom) else { return };
            let value = format!("{:.1}", parse_number(dom, input));
            let Some(main) = dom.closest_test_id(button, MAIN_CONTAINER_TEST_ID) else { return };
            for _ in 0..2 {
                dom.append(main, Element::new("div").test_id("stText").text(&value));
            }
        })
        .on_click_rerun(button_chain("Nested expander (raises exception)"), |dom, button| {
            let Some(main) = dom.closest_test_id(button, MAIN_CONTAINER_TEST_ID) else { return };
            let exception = dom.append(main, Element::new("div").test_id(EXCEPTION_TEST_ID));
            dom.append(exception, Element::new("div").text("StreamlitAPIException"));
            dom.append(exception, Element::new("p").text(NESTED_EXPANDER_MESSAGE));
        })
        .on_click_rerun(button_chain("Show expander_1"), |dom, _| {
            show_dynamic_expander(dom, "expander_1")
        })
        .on_click_rerun(button_chain("Show expander_2"), |dom, _| {
            show_dynamic_expander(dom, "expander_2")
        })
}

/// Page emulating the video fixture app
pub fn video_app() -> MockPage {
    let mut dom = Dom::new();
    let (_, main) = app_shell(&mut dom);

    dom.append(
        main,
        Element::new("video")
            .test_id("stVideo")
            .attr("controls", "")
            .attr("src", "http://localhost:8501/media/7ac43b2e0f.mp4"),
    );
    dom.append(
        main,
        Element::new("video")
            .test_id("stVideo")
            .attr("controls", "")
            .attr("src", SECOND_VIDEO_URL)
            .attr("data-start-time", "6"),
    );
    dom.append(
        main,
        Element::new("video")
            .test_id("stVideo")
            .attr("controls", "")
            .attr("src", "http://localhost:8501/media/e91d5c08a3.webm"),
    );
    number_input_widget(&mut dom, main, "Start time (in seconds)", "6");

    MockPage::new(dom).on_click_rerun(
        Chain(vec![
            LocatorStep::TestId(NUMBER_INPUT_TEST_ID.into()),
            LocatorStep::Css("button.step-up".into()),
        ]),
        |dom, _| {
            let Some(input) = number_input(dom) else { return };
            let start = parse_number(dom, input) + 1.0;
            dom.set_attr(input, "value", &format!("{}", start));
            if let Some(video) = dom.find_test_id("stVideo").get(1).copied() {
                dom.set_attr(video, "data-start-time", &format!("{}", start));
            }
        },
    )
}
