#![allow(dead_code, reason = "Each test binary uses a different subset of the fakes")]
//! In-memory host capabilities for driving a `Navigator` in tests.

use core::cell::RefCell;
use core::time::Duration;
use std::collections::HashMap;
use std::rc::Rc;

use anyhow::{Result, anyhow, bail};
use futures::channel::oneshot;
use futures::future::{LocalBoxFuture, ready};
use serde_json::Value;
use tokio::task::LocalSet;
use tokio::time::sleep;
use url::{Position, Url};
use waypoint::{
    Browser, Document, ElementRef, Host, InsertionMode, Module, NavigationEvent, NavigationOptions,
    Navigator, NavigatorConfig, RawResponse, ScriptContext, ScriptEvaluator, Transport,
    TransportError, WireRequest,
};

pub const ORIGIN: &str = "https://site.test";

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Drive `scenario` inside a `LocalSet`, as the navigator requires.
pub async fn run_local(scenario: impl Future<Output = Result<()>>) -> Result<()> {
    LocalSet::new().run_until(scenario).await
}

/// Let every ready local task run until the runtime is idle.
pub async fn idle() {
    sleep(Duration::from_millis(1)).await;
}

struct Element {
    selector: String,
    html: String,
    offset: f64,
    removed: bool,
}

#[derive(Default)]
struct DocumentState {
    elements: Vec<Element>,
    title: String,
    stylesheets: Vec<(String, String)>,
    scripts: Vec<String>,
    insertions: Vec<InsertionMode>,
}

/// A document made of containers addressed by their exact selector.
#[derive(Default)]
pub struct FakeDocument {
    state: RefCell<DocumentState>,
}

impl FakeDocument {
    pub fn add_element(&self, selector: &str, html: &str, offset: f64) -> ElementRef {
        let mut state = self.state.borrow_mut();
        state.elements.push(Element {
            selector: selector.to_owned(),
            html: html.to_owned(),
            offset,
            removed: false,
        });
        ElementRef(state.elements.len() as u64 - 1)
    }

    pub fn remove_element(&self, selector: &str) {
        for element in &mut self.state.borrow_mut().elements {
            if element.selector == selector {
                element.removed = true;
            }
        }
    }

    pub fn html(&self, selector: &str) -> Option<String> {
        self.state
            .borrow()
            .elements
            .iter()
            .find(|element| !element.removed && element.selector == selector)
            .map(|element| element.html.clone())
    }

    pub fn add_existing_stylesheet(&self, url: &str) {
        self.state
            .borrow_mut()
            .stylesheets
            .push((url.to_owned(), "all".to_owned()));
    }

    pub fn add_existing_script(&self, url: &str) {
        self.state.borrow_mut().scripts.push(url.to_owned());
    }

    /// Stylesheets in the head, with their media.
    pub fn stylesheets(&self) -> Vec<(String, String)> {
        self.state.borrow().stylesheets.clone()
    }

    pub fn scripts(&self) -> Vec<String> {
        self.state.borrow().scripts.clone()
    }

    pub fn insertions(&self) -> Vec<InsertionMode> {
        self.state.borrow().insertions.clone()
    }
}

impl Document for FakeDocument {
    fn query(&self, selector: &str) -> Option<ElementRef> {
        self.state
            .borrow()
            .elements
            .iter()
            .position(|element| !element.removed && element.selector == selector)
            .map(|index| ElementRef(index as u64))
    }

    fn insert(&self, target: ElementRef, mode: InsertionMode, html: &str) -> Option<ElementRef> {
        let mut state = self.state.borrow_mut();
        state.insertions.push(mode);
        let index = target.0 as usize;
        let element = state.elements.get_mut(index)?;
        match mode {
            InsertionMode::ReplaceHtml => element.html = html.to_owned(),
            InsertionMode::Append => element.html.push_str(html),
            InsertionMode::Prepend => element.html.insert_str(0, html),
            InsertionMode::ReplaceElement => {
                element.removed = true;
                let replacement = Element {
                    selector: element.selector.clone(),
                    html: html.to_owned(),
                    offset: element.offset,
                    removed: false,
                };
                if html.trim().is_empty() {
                    return None;
                }
                state.elements.push(replacement);
                return Some(ElementRef(state.elements.len() as u64 - 1));
            }
        }
        Some(target)
    }

    fn offset_top(&self, element: ElementRef) -> f64 {
        self.state
            .borrow()
            .elements
            .get(element.0 as usize)
            .map_or(0.0, |found| found.offset)
    }

    fn title(&self) -> String {
        self.state.borrow().title.clone()
    }

    fn set_title(&self, title: &str) {
        title.clone_into(&mut self.state.borrow_mut().title);
    }

    fn append_stylesheet(&self, url: &str, media: &str) {
        self.state
            .borrow_mut()
            .stylesheets
            .push((url.to_owned(), media.to_owned()));
    }

    fn append_script(&self, url: &str) {
        self.state.borrow_mut().scripts.push(url.to_owned());
    }

    fn stylesheet_urls(&self) -> Vec<String> {
        self.state
            .borrow()
            .stylesheets
            .iter()
            .map(|(url, _)| url.clone())
            .collect()
    }

    fn script_urls(&self) -> Vec<String> {
        self.scripts()
    }
}

struct Entry {
    url: Url,
    state: Value,
}

struct BrowserState {
    entries: Vec<Entry>,
    index: usize,
    scroll_top: f64,
    assigned: Vec<String>,
    reloads: usize,
    animations: Vec<(f64, Duration)>,
}

/// A window with a session history stack. Popstate is not dispatched; tests move
/// through the stack with `go_back`/`go_forward` and hand the state to the navigator.
pub struct FakeBrowser {
    supported: bool,
    state: RefCell<BrowserState>,
}

impl FakeBrowser {
    pub fn new(url: Url, supported: bool) -> Self {
        Self {
            supported,
            state: RefCell::new(BrowserState {
                entries: vec![Entry {
                    url,
                    state: Value::Null,
                }],
                index: 0,
                scroll_top: 0.0,
                assigned: Vec::new(),
                reloads: 0,
                animations: Vec::new(),
            }),
        }
    }

    /// Path and query of every entry in the stack.
    pub fn entries(&self) -> Vec<String> {
        self.state
            .borrow()
            .entries
            .iter()
            .map(|entry| entry.url[Position::BeforePath..Position::AfterQuery].to_owned())
            .collect()
    }

    /// Stored state of every entry in the stack.
    pub fn states(&self) -> Vec<Value> {
        self.state
            .borrow()
            .entries
            .iter()
            .map(|entry| entry.state.clone())
            .collect()
    }

    pub fn current_state(&self) -> Value {
        let state = self.state.borrow();
        state.entries[state.index].state.clone()
    }

    pub fn go_back(&self) -> Result<Value> {
        let mut state = self.state.borrow_mut();
        if state.index == 0 {
            bail!("already at the first entry");
        }
        state.index -= 1;
        Ok(state.entries[state.index].state.clone())
    }

    pub fn go_forward(&self) -> Result<Value> {
        let mut state = self.state.borrow_mut();
        if state.index + 1 >= state.entries.len() {
            bail!("already at the last entry");
        }
        state.index += 1;
        Ok(state.entries[state.index].state.clone())
    }

    pub fn assigned(&self) -> Vec<String> {
        self.state.borrow().assigned.clone()
    }

    pub fn reloads(&self) -> usize {
        self.state.borrow().reloads
    }

    pub fn animations(&self) -> Vec<(f64, Duration)> {
        self.state.borrow().animations.clone()
    }
}

impl Browser for FakeBrowser {
    fn supports_history(&self) -> bool {
        self.supported
    }

    fn location(&self) -> Url {
        let state = self.state.borrow();
        state.entries[state.index].url.clone()
    }

    fn push_state(&self, entry_state: &Value, _title: Option<&str>, url: &str) {
        let location = self.location();
        let url = location.join(url).unwrap_or(location);
        let mut state = self.state.borrow_mut();
        let keep = state.index + 1;
        state.entries.truncate(keep);
        state.entries.push(Entry {
            url,
            state: entry_state.clone(),
        });
        state.index = keep;
    }

    fn replace_state(&self, entry_state: &Value, _title: Option<&str>) {
        let mut state = self.state.borrow_mut();
        let index = state.index;
        state.entries[index].state = entry_state.clone();
    }

    fn scroll_top(&self) -> f64 {
        self.state.borrow().scroll_top
    }

    fn set_scroll_top(&self, offset: f64) {
        self.state.borrow_mut().scroll_top = offset;
    }

    fn animate_scroll_to(&self, offset: f64, duration: Duration) {
        let mut state = self.state.borrow_mut();
        state.animations.push((offset, duration));
        state.scroll_top = offset;
    }

    fn assign(&self, url: &str) {
        self.state.borrow_mut().assigned.push(url.to_owned());
    }

    fn reload(&self) {
        self.state.borrow_mut().reloads += 1;
    }
}

enum Route {
    Ready(Result<RawResponse, TransportError>),
    Deferred(Option<oneshot::Receiver<RawResponse>>),
}

/// Transport answering from canned routes keyed by path and query.
#[derive(Default)]
pub struct ScriptedTransport {
    routes: RefCell<HashMap<String, Route>>,
    requests: RefCell<Vec<WireRequest>>,
}

impl ScriptedTransport {
    pub fn respond(&self, path: &str, response: RawResponse) {
        self.routes
            .borrow_mut()
            .insert(path.to_owned(), Route::Ready(Ok(response)));
    }

    pub fn respond_json(&self, path: &str, body: &Value) {
        self.respond(path, RawResponse::ok(body.to_string()));
    }

    pub fn respond_status(&self, path: &str, status: u16) {
        let response = RawResponse {
            status,
            ..RawResponse::ok("")
        };
        self.respond(path, response);
    }

    pub fn fail(&self, path: &str) {
        let error = TransportError::Request {
            url: path.to_owned(),
            reason: "connection refused".to_owned(),
        };
        self.routes
            .borrow_mut()
            .insert(path.to_owned(), Route::Ready(Err(error)));
    }

    /// Answer `path` only once the returned sender is used.
    pub fn defer(&self, path: &str) -> oneshot::Sender<RawResponse> {
        let (sender, receiver) = oneshot::channel();
        self.routes
            .borrow_mut()
            .insert(path.to_owned(), Route::Deferred(Some(receiver)));
        sender
    }

    pub fn requests(&self) -> Vec<WireRequest> {
        self.requests.borrow().clone()
    }

    pub fn requested_paths(&self) -> Vec<String> {
        self.requests
            .borrow()
            .iter()
            .map(|request| request.url[Position::BeforePath..Position::AfterQuery].to_owned())
            .collect()
    }

    pub fn last_request(&self) -> Result<WireRequest> {
        self.requests
            .borrow()
            .last()
            .cloned()
            .ok_or_else(|| anyhow!("no request was sent"))
    }
}

impl Transport for ScriptedTransport {
    fn send(&self, request: WireRequest) -> LocalBoxFuture<'static, Result<RawResponse, TransportError>> {
        let path = request.url[Position::BeforePath..Position::AfterQuery].to_owned();
        let url = request.url.to_string();
        self.requests.borrow_mut().push(request);
        let mut routes = self.routes.borrow_mut();
        match routes.get_mut(&path) {
            Some(Route::Ready(result)) => Box::pin(ready(result.clone())),
            Some(Route::Deferred(receiver)) => match receiver.take() {
                Some(receiver) => Box::pin(async move {
                    receiver.await.map_err(|_cancelled| TransportError::Request {
                        url,
                        reason: "response dropped".to_owned(),
                    })
                }),
                None => Box::pin(ready(Err(TransportError::Request {
                    url,
                    reason: "deferred response already consumed".to_owned(),
                }))),
            },
            None => Box::pin(ready(Ok(RawResponse {
                status: 404,
                ..RawResponse::ok("")
            }))),
        }
    }
}

/// Records evaluated scripts. A line `module NAME` registers a module that logs
/// `load NAME`/`unload NAME`; a line `throw` makes evaluation fail.
#[derive(Default)]
pub struct RecordingEvaluator {
    evaluated: RefCell<Vec<(String, String)>>,
    lifecycle: Rc<RefCell<Vec<String>>>,
}

impl RecordingEvaluator {
    /// URLs of evaluated scripts, in evaluation order.
    pub fn evaluated_urls(&self) -> Vec<String> {
        self.evaluated
            .borrow()
            .iter()
            .map(|(url, _)| url.clone())
            .collect()
    }

    pub fn evaluated_sources(&self) -> Vec<String> {
        self.evaluated
            .borrow()
            .iter()
            .map(|(_, source)| source.clone())
            .collect()
    }

    pub fn lifecycle(&self) -> Vec<String> {
        self.lifecycle.borrow().clone()
    }
}

impl ScriptEvaluator for RecordingEvaluator {
    fn eval_script(&self, source: &str, cx: &ScriptContext<'_>) -> Result<()> {
        self.evaluated
            .borrow_mut()
            .push((cx.url().to_owned(), source.to_owned()));
        for line in source.lines().map(str::trim) {
            if line == "throw" {
                bail!("script {} threw", cx.url());
            }
            if let Some(name) = line.strip_prefix("module ") {
                let (loaded, unloaded) = (Rc::clone(&self.lifecycle), Rc::clone(&self.lifecycle));
                let (load_name, unload_name) = (format!("load {name}"), format!("unload {name}"));
                cx.register_module(
                    Module::new()
                        .on_load(move || loaded.borrow_mut().push(load_name.clone()))
                        .on_unload(move || unloaded.borrow_mut().push(unload_name.clone())),
                );
            }
        }
        Ok(())
    }
}

/// A page at `https://site.test/` with a `#content` container and a navigator over it.
pub struct Harness {
    pub document: Rc<FakeDocument>,
    pub browser: Rc<FakeBrowser>,
    pub transport: Rc<ScriptedTransport>,
    pub scripts: Rc<RecordingEvaluator>,
    pub navigator: Navigator,
}

impl Harness {
    pub fn new() -> Result<Self> {
        Self::build(NavigatorConfig::default(), true, |_document| {})
    }

    pub fn unsupported() -> Result<Self> {
        Self::build(NavigatorConfig::default(), false, |_document| {})
    }

    /// `prepare` runs on the document before the navigator sees it.
    pub fn build(
        config: NavigatorConfig,
        supported: bool,
        prepare: impl FnOnce(&FakeDocument),
    ) -> Result<Self> {
        init_logging();
        let document = Rc::new(FakeDocument::default());
        document.set_title("Home");
        document.add_element("#content", "<p>home</p>", 120.0);
        prepare(&document);
        let browser = Rc::new(FakeBrowser::new(Url::parse(ORIGIN)?.join("/")?, supported));
        let transport = Rc::new(ScriptedTransport::default());
        let scripts = Rc::new(RecordingEvaluator::default());
        let host = Host {
            document: Rc::clone(&document) as Rc<dyn Document>,
            browser: Rc::clone(&browser) as Rc<dyn Browser>,
            transport: Rc::clone(&transport) as Rc<dyn Transport>,
            scripts: Rc::clone(&scripts) as Rc<dyn ScriptEvaluator>,
        };
        let navigator = Navigator::new(host, config);
        Ok(Self {
            document,
            browser,
            transport,
            scripts,
            navigator,
        })
    }

    pub fn options(&self) -> NavigationOptions {
        self.navigator.default_options()
    }

    /// Absolute URL on the test origin.
    pub fn url(path: &str) -> String {
        format!("{ORIGIN}{path}")
    }
}

/// Collects a description of every event delivered to the hooks it creates.
#[derive(Default, Clone)]
pub struct EventLog {
    entries: Rc<RefCell<Vec<String>>>,
}

impl EventLog {
    pub fn record(&self, event: &NavigationEvent<'_>) {
        let url = event
            .request()
            .map_or_else(String::new, |request| request.url.clone());
        let line = match event {
            NavigationEvent::End { outcome, .. } => format!("{:?} {url} {outcome:?}", event.kind()),
            NavigationEvent::History { direction, target, .. } => {
                format!("{:?} {direction:?} {target}", event.kind())
            }
            _ => format!("{:?} {url}", event.kind()),
        };
        self.entries.borrow_mut().push(line);
    }

    pub fn entries(&self) -> Vec<String> {
        self.entries.borrow().clone()
    }
}
