//! In-memory page driver
//!
//! [`MockPage`] holds a small element tree and scripted reactions to clicks
//! and key presses. Reactions marked as re-runs emulate the application's
//! asynchronous recompute: the root reports `running` for a few queries
//! before the change lands and the run counter advances. It lets the suites
//! and the harness itself be exercised without a browser.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::app_run::APP_ROOT_TEST_ID;
use crate::driver::{Browser, ElementState, PageDriver, Theme};
use crate::error::{E2eError, E2eResult};
use crate::expect::normalize;
use crate::locator::{Chain, LocatorStep};
use crate::visual::encode_png;

pub type NodeId = usize;

/// Element description used to build a [`Dom`]
#[derive(Debug, Clone, Default)]
pub struct Element {
    pub tag: String,
    /// Own text, excluding children
    pub text: String,
    pub attributes: BTreeMap<String, String>,
    pub visible: bool,
}

impl Element {
    pub fn new(tag: &str) -> Self {
        Self {
            tag: tag.to_string(),
            visible: true,
            ..Default::default()
        }
    }

    pub fn test_id(self, test_id: &str) -> Self {
        self.attr("data-testid", test_id)
    }

    pub fn text(mut self, text: &str) -> Self {
        self.text = text.to_string();
        self
    }

    pub fn attr(mut self, name: &str, value: &str) -> Self {
        self.attributes.insert(name.to_string(), value.to_string());
        self
    }

    pub fn class(self, class: &str) -> Self {
        self.attr("class", class)
    }

    pub fn hidden(mut self) -> Self {
        self.visible = false;
        self
    }
}

#[derive(Debug, Clone)]
struct Node {
    element: Element,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

/// Arena element tree; node 0 is the document
#[derive(Debug, Clone)]
pub struct Dom {
    nodes: Vec<Node>,
}

impl Default for Dom {
    fn default() -> Self {
        Self::new()
    }
}

/// One `tag.class[attr="value"]` part of a CSS selector
#[derive(Debug, Default)]
struct Compound {
    tag: Option<String>,
    classes: Vec<String>,
    attrs: Vec<(String, Option<String>)>,
}

fn parse_compound(part: &str) -> E2eResult<Compound> {
    let unsupported = || E2eError::Driver(format!("unsupported css selector: {}", part));
    let mut compound = Compound::default();
    let mut rest = part;

    let tag_len = rest
        .find(|c: char| !(c.is_ascii_alphanumeric() || c == '-' || c == '_'))
        .unwrap_or(rest.len());
    if tag_len > 0 {
        compound.tag = Some(rest[..tag_len].to_ascii_lowercase());
        rest = &rest[tag_len..];
    }

    while !rest.is_empty() {
        if let Some(after_dot) = rest.strip_prefix('.') {
            let len = after_dot
                .find(|c: char| c == '.' || c == '[')
                .unwrap_or(after_dot.len());
            if len == 0 {
                return Err(unsupported());
            }
            compound.classes.push(after_dot[..len].to_string());
            rest = &after_dot[len..];
        } else if let Some(after_bracket) = rest.strip_prefix('[') {
            let end = after_bracket.find(']').ok_or_else(unsupported)?;
            let body = &after_bracket[..end];
            let attr = match body.split_once('=') {
                Some((name, value)) => (
                    name.trim().to_string(),
                    Some(value.trim().trim_matches(|c| c == '"' || c == '\'').to_string()),
                ),
                None => (body.trim().to_string(), None),
            };
            compound.attrs.push(attr);
            rest = &after_bracket[end + 1..];
        } else {
            return Err(unsupported());
        }
    }

    Ok(compound)
}

impl Dom {
    pub fn new() -> Self {
        Self {
            nodes: vec![Node {
                element: Element::new("#document"),
                parent: None,
                children: Vec::new(),
            }],
        }
    }

    pub fn root(&self) -> NodeId {
        0
    }

    pub fn append(&mut self, parent: NodeId, element: Element) -> NodeId {
        let id = self.nodes.len();
        self.nodes.push(Node {
            element,
            parent: Some(parent),
            children: Vec::new(),
        });
        self.nodes[parent].children.push(id);
        id
    }

    /// Detach a node (and its subtree) from the document
    pub fn remove(&mut self, id: NodeId) {
        if let Some(parent) = self.nodes[id].parent.take() {
            self.nodes[parent].children.retain(|child| *child != id);
        }
    }

    pub fn clear_children(&mut self, id: NodeId) {
        for child in std::mem::take(&mut self.nodes[id].children) {
            self.nodes[child].parent = None;
        }
    }

    pub fn element(&self, id: NodeId) -> &Element {
        &self.nodes[id].element
    }

    pub fn set_text(&mut self, id: NodeId, text: &str) {
        self.nodes[id].element.text = text.to_string();
    }

    pub fn set_attr(&mut self, id: NodeId, name: &str, value: &str) {
        self.nodes[id]
            .element
            .attributes
            .insert(name.to_string(), value.to_string());
    }

    pub fn remove_attr(&mut self, id: NodeId, name: &str) {
        self.nodes[id].element.attributes.remove(name);
    }

    pub fn set_visible(&mut self, id: NodeId, visible: bool) {
        self.nodes[id].element.visible = visible;
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id].parent
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id].children
    }

    /// Attached nodes in document order
    fn preorder(&self) -> Vec<NodeId> {
        let mut order = Vec::new();
        let mut stack = vec![self.root()];
        while let Some(id) = stack.pop() {
            order.push(id);
            stack.extend(self.nodes[id].children.iter().rev());
        }
        order
    }

    fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut found = Vec::new();
        let mut stack: Vec<NodeId> = self.nodes[id].children.iter().rev().copied().collect();
        while let Some(next) = stack.pop() {
            found.push(next);
            stack.extend(self.nodes[next].children.iter().rev());
        }
        found
    }

    /// Nearest ancestor (or the node itself) carrying `test_id`
    pub fn closest_test_id(&self, id: NodeId, test_id: &str) -> Option<NodeId> {
        let mut current = Some(id);
        while let Some(node) = current {
            if self.nodes[node].element.attributes.get("data-testid").map(String::as_str) == Some(test_id) {
                return Some(node);
            }
            current = self.nodes[node].parent;
        }
        None
    }

    pub fn is_attached(&self, id: NodeId) -> bool {
        let mut current = id;
        while let Some(parent) = self.nodes[current].parent {
            current = parent;
        }
        current == self.root()
    }

    /// Visible when the node and all its ancestors are
    pub fn is_visible(&self, id: NodeId) -> bool {
        let mut current = Some(id);
        while let Some(node) = current {
            if !self.nodes[node].element.visible {
                return false;
            }
            current = self.nodes[node].parent;
        }
        self.is_attached(id)
    }

    pub fn text_content(&self, id: NodeId) -> String {
        let mut text = self.nodes[id].element.text.clone();
        for child in &self.nodes[id].children {
            text.push_str(&self.text_content(*child));
        }
        text
    }

    fn collect_inner_text(&self, id: NodeId, parts: &mut Vec<String>) {
        if !self.nodes[id].element.visible {
            return;
        }
        let own = self.nodes[id].element.text.trim();
        if !own.is_empty() {
            parts.push(own.to_string());
        }
        for child in &self.nodes[id].children {
            self.collect_inner_text(*child, parts);
        }
    }

    pub fn inner_text(&self, id: NodeId) -> String {
        if !self.is_visible(id) {
            return String::new();
        }
        let mut parts = Vec::new();
        self.collect_inner_text(id, &mut parts);
        parts.join("\n")
    }

    fn role(&self, id: NodeId) -> Option<String> {
        let element = &self.nodes[id].element;
        if let Some(role) = element.attributes.get("role") {
            return Some(role.clone());
        }
        let implicit = match element.tag.as_str() {
            "button" => "button",
            "a" => "link",
            "input" if element.attributes.get("type").map(String::as_str) == Some("number") => "spinbutton",
            "input" | "textarea" => "textbox",
            "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => "heading",
            _ => return None,
        };
        Some(implicit.to_string())
    }

    fn matches_compound(&self, id: NodeId, compound: &Compound) -> bool {
        let element = &self.nodes[id].element;
        if let Some(tag) = &compound.tag {
            if &element.tag != tag {
                return false;
            }
        }
        let classes: HashSet<&str> = element
            .attributes
            .get("class")
            .map(|c| c.split_whitespace().collect())
            .unwrap_or_default();
        if !compound.classes.iter().all(|c| classes.contains(c.as_str())) {
            return false;
        }
        compound.attrs.iter().all(|(name, value)| match (element.attributes.get(name), value) {
            (Some(actual), Some(expected)) => actual == expected,
            (Some(_), None) => true,
            (None, _) => false,
        })
    }

    /// Descendants of any scope node accepted by `accept`, in document order
    fn select<F>(&self, scopes: &[NodeId], order: &HashMap<NodeId, usize>, accept: F) -> Vec<NodeId>
    where
        F: Fn(NodeId) -> bool,
    {
        let mut found: Vec<NodeId> = scopes
            .iter()
            .flat_map(|scope| self.descendants(*scope))
            .filter(|id| accept(*id))
            .collect();
        found.sort_by_key(|id| order.get(id).copied().unwrap_or(usize::MAX));
        found.dedup();
        found
    }

    fn resolve_from(
        &self,
        start: Vec<NodeId>,
        steps: &[LocatorStep],
        order: &HashMap<NodeId, usize>,
    ) -> E2eResult<Vec<NodeId>> {
        let mut current = start;

        for step in steps {
            current = match step {
                LocatorStep::TestId(test_id) => self.select(&current, order, |id| {
                    self.nodes[id].element.attributes.get("data-testid") == Some(test_id)
                }),
                LocatorStep::Text(text) => {
                    let needle = normalize(text).to_lowercase();
                    self.select(&current, order, |id| {
                        let own = normalize(&self.nodes[id].element.text).to_lowercase();
                        !own.is_empty() && own.contains(&needle)
                    })
                }
                LocatorStep::Role { role, name } => {
                    let name = name.as_ref().map(|n| normalize(n).to_lowercase());
                    self.select(&current, order, |id| {
                        self.role(id).as_deref() == Some(role.as_str())
                            && name.as_ref().map_or(true, |n| {
                                normalize(&self.text_content(id)).to_lowercase().contains(n)
                            })
                    })
                }
                LocatorStep::Css(css) => {
                    let mut scoped = current;
                    for part in css.split_whitespace() {
                        let compound = parse_compound(part)?;
                        scoped = self.select(&scoped, order, |id| self.matches_compound(id, &compound));
                    }
                    scoped
                }
                LocatorStep::Nth(index) => current.get(*index).copied().into_iter().collect(),
                LocatorStep::First => current.first().copied().into_iter().collect(),
                LocatorStep::Last => current.last().copied().into_iter().collect(),
                LocatorStep::HasText(text) => {
                    let needle = normalize(text).to_lowercase();
                    current
                        .into_iter()
                        .filter(|id| normalize(&self.text_content(*id)).to_lowercase().contains(&needle))
                        .collect()
                }
                LocatorStep::Has(inner) => {
                    let mut kept = Vec::new();
                    for id in current {
                        if !self.resolve_from(vec![id], inner, order)?.is_empty() {
                            kept.push(id);
                        }
                    }
                    kept
                }
            };
        }

        Ok(current)
    }

    /// Resolve a chain from the document root
    pub fn find(&self, chain: &Chain) -> E2eResult<Vec<NodeId>> {
        let order: HashMap<NodeId, usize> = self
            .preorder()
            .into_iter()
            .enumerate()
            .map(|(i, id)| (id, i))
            .collect();
        self.resolve_from(vec![self.root()], chain.steps(), &order)
    }

    pub fn find_test_id(&self, test_id: &str) -> Vec<NodeId> {
        self.find(&Chain::test_id(test_id)).unwrap_or_default()
    }

    pub fn state(&self, id: NodeId) -> ElementState {
        let element = &self.nodes[id].element;
        ElementState {
            tag: element.tag.clone(),
            text: self.text_content(id),
            inner_text: self.inner_text(id),
            visible: self.is_visible(id),
            attributes: element.attributes.clone(),
        }
    }

    /// Canonical description of what a subtree renders, skipping masked nodes
    fn render_into(&self, id: NodeId, masked: &HashSet<NodeId>, out: &mut String) {
        let element = &self.nodes[id].element;
        if masked.contains(&id) {
            out.push_str("<masked>");
            return;
        }
        if !element.visible {
            return;
        }
        out.push('<');
        out.push_str(&element.tag);
        for (name, value) in &element.attributes {
            out.push_str(&format!(" {}={:?}", name, value));
        }
        out.push('>');
        out.push_str(&element.text);
        for child in &self.nodes[id].children {
            self.render_into(*child, masked, out);
        }
        out.push_str("</>");
    }
}

type Handler = Arc<dyn Fn(&mut Dom, NodeId) + Send + Sync>;

#[derive(Clone, PartialEq)]
enum Trigger {
    Click,
    Press(String),
}

#[derive(Clone)]
struct Reaction {
    trigger: Trigger,
    target: Chain,
    rerun: bool,
    handler: Handler,
}

struct PendingRun {
    started: Instant,
    remaining_queries: usize,
    node: NodeId,
    handler: Handler,
}

struct MockState {
    dom: Dom,
    pending: Option<PendingRun>,
    url: Option<String>,
    closed: bool,
    actions: Vec<String>,
}

/// Scripted page used in place of a browser
pub struct MockPage {
    engine: Browser,
    rerun_queries: usize,
    rerun_latency: Duration,
    reactions: Vec<Reaction>,
    state: Mutex<MockState>,
}

const SCRIPT_STATE_ATTR: &str = "data-test-script-state";
const RUN_COUNT_ATTR: &str = "data-test-run-count";

impl MockPage {
    pub fn new(dom: Dom) -> Self {
        Self {
            engine: Browser::Chromium,
            rerun_queries: 2,
            rerun_latency: Duration::from_millis(50),
            reactions: Vec::new(),
            state: Mutex::new(MockState {
                dom,
                pending: None,
                url: None,
                closed: false,
                actions: Vec::new(),
            }),
        }
    }

    pub fn with_engine(mut self, engine: Browser) -> Self {
        self.engine = engine;
        self
    }

    /// Number of queries a re-run stays `running` before its change lands
    pub fn with_rerun_queries(mut self, queries: usize) -> Self {
        self.rerun_queries = queries;
        self
    }

    /// Time after which a re-run lands even if nobody polled
    pub fn with_rerun_latency(mut self, latency: Duration) -> Self {
        self.rerun_latency = latency;
        self
    }

    fn react<F>(mut self, trigger: Trigger, target: Chain, rerun: bool, handler: F) -> Self
    where
        F: Fn(&mut Dom, NodeId) + Send + Sync + 'static,
    {
        self.reactions.push(Reaction {
            trigger,
            target,
            rerun,
            handler: Arc::new(handler),
        });
        self
    }

    /// Frontend-only reaction applied as soon as a matching element is clicked
    pub fn on_click<F>(self, target: Chain, handler: F) -> Self
    where
        F: Fn(&mut Dom, NodeId) + Send + Sync + 'static,
    {
        self.react(Trigger::Click, target, false, handler)
    }

    /// Reaction applied by an emulated application re-run
    pub fn on_click_rerun<F>(self, target: Chain, handler: F) -> Self
    where
        F: Fn(&mut Dom, NodeId) + Send + Sync + 'static,
    {
        self.react(Trigger::Click, target, true, handler)
    }

    pub fn on_press_rerun<F>(self, target: Chain, key: &str, handler: F) -> Self
    where
        F: Fn(&mut Dom, NodeId) + Send + Sync + 'static,
    {
        self.react(Trigger::Press(key.to_string()), target, true, handler)
    }

    /// Copy of the current tree
    pub fn dom(&self) -> Dom {
        self.state.lock().dom.clone()
    }

    pub fn url(&self) -> Option<String> {
        self.state.lock().url.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Actions performed so far, e.g. `click get_by_text("Print")`
    pub fn actions(&self) -> Vec<String> {
        self.state.lock().actions.clone()
    }

    fn theme(state: &MockState) -> Option<Theme> {
        let url = state.url.as_deref()?;
        let (_, query) = url.split_once('?')?;
        query
            .split('&')
            .filter_map(|pair| pair.strip_prefix("embed_options="))
            .find_map(|value| value.parse().ok())
    }

    fn set_script_state(dom: &mut Dom, value: &str) {
        for root in dom.find_test_id(APP_ROOT_TEST_ID) {
            dom.set_attr(root, SCRIPT_STATE_ATTR, value);
        }
    }

    fn complete_run(dom: &mut Dom, run: PendingRun) {
        (run.handler)(dom, run.node);
        for root in dom.find_test_id(APP_ROOT_TEST_ID) {
            let count: u64 = dom
                .element(root)
                .attributes
                .get(RUN_COUNT_ATTR)
                .and_then(|c| c.parse().ok())
                .unwrap_or(0);
            dom.set_attr(root, RUN_COUNT_ATTR, &(count + 1).to_string());
            dom.set_attr(root, SCRIPT_STATE_ATTR, "notRunning");
        }
    }

    /// Land a pending re-run once enough queries or enough time went by
    fn advance(&self, state: &mut MockState, counts_as_query: bool) {
        let due = match state.pending.as_mut() {
            Some(run) => {
                if counts_as_query {
                    run.remaining_queries = run.remaining_queries.saturating_sub(1);
                }
                run.remaining_queries == 0 || run.started.elapsed() >= self.rerun_latency
            }
            None => false,
        };
        if due {
            if let Some(run) = state.pending.take() {
                debug!("mock app run completed");
                Self::complete_run(&mut state.dom, run);
            }
        }
    }

    fn open(&self) -> E2eResult<parking_lot::MutexGuard<'_, MockState>> {
        let state = self.state.lock();
        if state.closed {
            return Err(E2eError::Driver("page has been closed".to_string()));
        }
        Ok(state)
    }

    /// The single visible element an action targets
    fn target(state: &MockState, chain: &Chain) -> E2eResult<NodeId> {
        let found = state.dom.find(chain)?;
        match found.as_slice() {
            [] => Err(E2eError::NotFound {
                locator: chain.to_string(),
            }),
            [id] if state.dom.is_visible(*id) => Ok(*id),
            [_] => Err(E2eError::Driver(format!("{} is not visible", chain))),
            many => Err(E2eError::Ambiguous {
                locator: chain.to_string(),
                count: many.len(),
            }),
        }
    }

    fn dispatch(&self, state: &mut MockState, trigger: Trigger, node: NodeId) -> E2eResult<()> {
        let mut path = HashSet::new();
        let mut current = Some(node);
        while let Some(id) = current {
            path.insert(id);
            current = state.dom.parent(id);
        }

        for reaction in self.reactions.iter().filter(|r| r.trigger == trigger) {
            let matched = state
                .dom
                .find(&reaction.target)?
                .into_iter()
                .find(|id| path.contains(id));
            let Some(matched) = matched else { continue };

            if reaction.rerun {
                if let Some(previous) = state.pending.take() {
                    Self::complete_run(&mut state.dom, previous);
                }
                Self::set_script_state(&mut state.dom, "running");
                state.pending = Some(PendingRun {
                    started: Instant::now(),
                    remaining_queries: self.rerun_queries.max(1),
                    node: matched,
                    handler: reaction.handler.clone(),
                });
            } else {
                (reaction.handler)(&mut state.dom, matched);
            }
        }

        Ok(())
    }
}

#[async_trait]
impl PageDriver for MockPage {
    fn engine(&self) -> Browser {
        self.engine
    }

    async fn goto(&self, url: &str) -> E2eResult<()> {
        let mut state = self.open()?;
        state.url = Some(url.to_string());
        state.actions.push(format!("goto {}", url));
        Ok(())
    }

    async fn query(&self, chain: &Chain) -> E2eResult<Vec<ElementState>> {
        let mut state = self.open()?;
        self.advance(&mut state, true);
        let found = state.dom.find(chain)?;
        Ok(found.into_iter().map(|id| state.dom.state(id)).collect())
    }

    async fn click(&self, chain: &Chain) -> E2eResult<()> {
        let mut state = self.open()?;
        let node = Self::target(&state, chain)?;
        state.actions.push(format!("click {}", chain));
        self.dispatch(&mut state, Trigger::Click, node)
    }

    async fn fill(&self, chain: &Chain, value: &str) -> E2eResult<()> {
        let mut state = self.open()?;
        let node = Self::target(&state, chain)?;
        state.actions.push(format!("fill {} {:?}", chain, value));
        state.dom.set_attr(node, "value", value);
        Ok(())
    }

    async fn press(&self, chain: &Chain, key: &str) -> E2eResult<()> {
        let mut state = self.open()?;
        let node = Self::target(&state, chain)?;
        state.actions.push(format!("press {} {}", chain, key));
        self.dispatch(&mut state, Trigger::Press(key.to_string()), node)
    }

    async fn screenshot(&self, chain: &Chain, mask: &[Chain]) -> E2eResult<Vec<u8>> {
        let mut state = self.open()?;
        self.advance(&mut state, false);
        let node = Self::target(&state, chain)?;
        state.actions.push(format!("screenshot {}", chain));

        let mut masked = HashSet::new();
        for m in mask {
            masked.extend(state.dom.find(m)?);
        }

        let mut rendered = String::new();
        if let Some(theme) = Self::theme(&state) {
            rendered.push_str(theme.as_str());
        }
        state.dom.render_into(node, &masked, &mut rendered);

        let digest = Sha256::digest(rendered.as_bytes());
        let img = image::RgbaImage::from_fn(32, 16, |x, y| {
            let i = ((y * 32 + x) as usize * 3) % digest.len();
            image::Rgba([digest[i], digest[(i + 1) % digest.len()], digest[(i + 2) % digest.len()], 255])
        });
        encode_png(&img)
    }

    async fn close(&self) -> E2eResult<()> {
        let mut state = self.state.lock();
        state.closed = true;
        state.actions.push("close".to_string());
        Ok(())
    }
}
