//! The navigation request controller.
//!
//! A [`Navigator`] turns a URL and a target container into a request, classifies the
//! response, and applies it: history entries, content insertion, assets, scrolling and
//! lifecycle events. It owns every registry of one page session and must be driven
//! from a tokio [`LocalSet`](tokio::task::LocalSet).

use core::cell::{Cell, RefCell};
use core::fmt;
use std::rc::Rc;

use log::{debug, info, trace, warn};
use serde_json::{Map, Value};
use tokio::sync::watch;
use tokio::task::{JoinHandle, spawn_local};
use tokio::time::timeout as tokio_timeout;
use tracing::{Instrument as _, info_span};
use url::Url;
use waypoint_js::{Module, ModuleRegistry, ScriptEvaluator};

use crate::assets::AssetLoader;
use crate::config::NavigatorConfig;
use crate::error::NavigationError;
use crate::events::{self, EventKind, Flow, Hook, Listeners, NavigationEvent, Outcome, dispatch};
use crate::history::{Direction, HistoryManager, HistoryStateRecord, StateExtras};
use crate::host::{Browser, Document, ElementRef};
use crate::link::{LinkActivation, is_navigation_click};
use crate::location::resolve;
use crate::options::NavigationOptions;
use crate::response::{ResponseEnvelope, normalize};
use crate::transport::{
    HEADER_FORMAT, HEADER_FRAGMENT, HEADER_NAVIGATION, HEADER_PARTIAL, Transport, WireRequest,
};

/// Capabilities of the page the navigator runs in.
#[derive(Clone)]
pub struct Host {
    pub document: Rc<dyn Document>,
    pub browser: Rc<dyn Browser>,
    pub transport: Rc<dyn Transport>,
    pub scripts: Rc<dyn ScriptEvaluator>,
}

/// One navigation, as seen by lifecycle hooks.
#[derive(Debug)]
pub struct NavigationRequest {
    pub id: u64,
    /// URL as requested, before resolution.
    pub url: String,
    /// Selector of the container being filled.
    pub target: String,
    pub options: NavigationOptions,
}

#[cfg(test)]
impl NavigationRequest {
    pub(crate) fn for_test(url: &str) -> Self {
        Self {
            id: 0,
            url: url.to_owned(),
            target: super::config::DEFAULT_TARGET.to_owned(),
            options: NavigationOptions::default(),
        }
    }
}

/// State merged into every history record the engine writes.
#[derive(Clone)]
pub enum GlobalState {
    Value(Map<String, Value>),
    /// Evaluated each time a record is written.
    Supplier(Rc<dyn Fn() -> Map<String, Value>>),
}

impl GlobalState {
    pub fn supplier(supplier: impl Fn() -> Map<String, Value> + 'static) -> Self {
        Self::Supplier(Rc::new(supplier))
    }

    fn snapshot(&self) -> Map<String, Value> {
        match self {
            Self::Value(map) => map.clone(),
            Self::Supplier(supplier) => supplier(),
        }
    }
}

impl fmt::Debug for GlobalState {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(map) => formatter.debug_tuple("Value").field(map).finish(),
            Self::Supplier(_) => formatter.write_str("Supplier(..)"),
        }
    }
}

/// Partial to request when a history transition refills `target`.
pub type PartialResolver = Rc<dyn Fn(&str) -> Option<String>>;

/// What a popstate notification led to.
#[derive(Debug)]
pub enum PopstateOutcome {
    /// Quiet period, unsupported environment, or a state the engine did not write.
    Ignored,
    /// The target container is gone; the browser loads the entry in full.
    FullPageLoad,
    /// A `history` hook cancelled the transition.
    Cancelled,
    Navigating(NavigationHandle),
}

/// Handle to the result of one navigation.
#[derive(Debug, Clone)]
pub struct NavigationHandle {
    id: u64,
    outcome: watch::Receiver<Option<Outcome>>,
}

impl NavigationHandle {
    fn settled(id: u64, outcome: Outcome) -> Self {
        let (_sender, receiver) = watch::channel(Some(outcome));
        Self {
            id,
            outcome: receiver,
        }
    }

    pub const fn id(&self) -> u64 {
        self.id
    }

    /// The outcome, if the navigation has ended.
    pub fn outcome(&self) -> Option<Outcome> {
        self.outcome.borrow().clone()
    }

    /// Wait for the navigation to end.
    pub async fn finished(mut self) -> Outcome {
        let settled = match self.outcome.wait_for(Option::is_some).await {
            Ok(outcome) => outcome.clone(),
            Err(_closed) => None,
        };
        settled
            .or_else(|| self.outcome.borrow().clone())
            .unwrap_or(Outcome::Cancelled)
    }
}

struct InFlight {
    request: Rc<NavigationRequest>,
    task: JoinHandle<()>,
    outcome: watch::Sender<Option<Outcome>>,
}

/// Arguments of the last successful navigation, replayed by [`Navigator::reload`].
#[derive(Clone)]
struct LastNavigation {
    url: String,
    target: String,
    options: NavigationOptions,
}

struct Engine {
    config: NavigatorConfig,
    host: Host,
    supported: bool,
    history: HistoryManager,
    assets: AssetLoader,
    modules: ModuleRegistry,
    listeners: RefCell<Listeners>,
    in_flight: RefCell<Option<InFlight>>,
    last: RefCell<Option<LastNavigation>>,
    global_state: RefCell<Option<GlobalState>>,
    partial_resolver: RefCell<Option<PartialResolver>>,
    sequence: Cell<u64>,
}

/// Shared handle to a navigation engine. Clones drive the same engine.
#[derive(Clone)]
pub struct Navigator {
    engine: Rc<Engine>,
}

impl fmt::Debug for Navigator {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("Navigator")
            .field("supported", &self.engine.supported)
            .field("navigating", &self.is_navigating())
            .field("current", &self.engine.history.current().id)
            .finish_non_exhaustive()
    }
}

impl Navigator {
    /// Set up an engine for the page described by `host`.
    ///
    /// When the browser supports history manipulation the current entry is replaced
    /// with an engine record and the assets already in the document are recorded.
    pub fn new(host: Host, config: NavigatorConfig) -> Self {
        let supported = host.browser.supports_history();
        let modules = ModuleRegistry::new();
        let history = HistoryManager::new(&*host.browser, &*host.document);
        let assets = AssetLoader::new(
            Rc::clone(&host.document),
            Rc::clone(&host.transport),
            Rc::clone(&host.scripts),
            modules.clone(),
        );
        let engine = Engine {
            config,
            host,
            supported,
            history,
            assets,
            modules,
            listeners: RefCell::new(Listeners::default()),
            in_flight: RefCell::new(None),
            last: RefCell::new(None),
            global_state: RefCell::new(None),
            partial_resolver: RefCell::new(None),
            sequence: Cell::new(0),
        };

        if supported {
            let location = engine.browser().location();
            engine
                .history
                .capture_current(engine.browser(), engine.document(), StateExtras::default());
            engine.assets.seed(&location);
            info!("Navigator ready at {location}");
        } else {
            info!("History manipulation unavailable, navigations fall back to full page loads");
        }

        Self {
            engine: Rc::new(engine),
        }
    }

    /// Whether navigations are handled in page; `false` means every navigation is a
    /// full page load.
    pub fn is_supported(&self) -> bool {
        self.engine.supported
    }

    pub fn is_navigating(&self) -> bool {
        self.engine.in_flight.borrow().is_some()
    }

    pub fn config(&self) -> &NavigatorConfig {
        &self.engine.config
    }

    /// Options every navigation starts from.
    pub fn default_options(&self) -> NavigationOptions {
        NavigationOptions::from_config(&self.engine.config)
    }

    pub fn current_state(&self) -> HistoryStateRecord {
        self.engine.history.current()
    }

    /// Load `url` into the container matching `target` (the configured default when
    /// `None`). Any navigation still in flight is cancelled first.
    ///
    /// # Errors
    /// [`NavigationError::MissingUrl`] for an empty URL, [`NavigationError::InvalidUrl`]
    /// when it does not resolve against the page location and
    /// [`NavigationError::InvalidTarget`] when no element matches the target. Nothing
    /// is requested in those cases.
    pub fn navigate(
        &self,
        url: &str,
        target: Option<&str>,
        options: NavigationOptions,
    ) -> Result<NavigationHandle, NavigationError> {
        let engine = &self.engine;
        if !engine.supported {
            info!("Full page load of {url}");
            engine.browser().assign(url);
            return Ok(NavigationHandle::settled(0, Outcome::FullPageLoad));
        }

        if url.trim().is_empty() {
            return Err(NavigationError::MissingUrl);
        }
        let resolved = resolve(&engine.browser().location(), url)?;
        let target = target.map_or_else(|| engine.config.default_target.clone(), str::to_owned);
        let Some(element) = engine.document().query(&target) else {
            return Err(NavigationError::InvalidTarget(target));
        };

        let mut options = options;
        if options.title.is_none() {
            options.title = Some(engine.document().title());
        }

        engine.cancel_in_flight();

        let id = engine.sequence.get().wrapping_add(1);
        engine.sequence.set(id);
        let request = Rc::new(NavigationRequest {
            id,
            url: url.to_owned(),
            target,
            options,
        });
        let (sender, receiver) = watch::channel(None);
        let handle = NavigationHandle {
            id,
            outcome: receiver,
        };

        let start = NavigationEvent::Start { request: &request };
        if engine.emit(request.options.callbacks.start.as_ref(), &start) == Flow::Cancel {
            debug!("Navigation {id} to {url} cancelled by a start hook");
            engine.finish(&request, Outcome::Cancelled, &sender);
            return Ok(handle);
        }
        // A start hook may itself have navigated.
        engine.cancel_in_flight();
        *engine.last.borrow_mut() = None;

        let wire = wire_request(&request, resolved);
        let span = info_span!("navigation", id, url = %request.url, target = %request.target);
        let task = spawn_local(
            Engine::run(Rc::clone(engine), Rc::clone(&request), wire, element).instrument(span),
        );
        *engine.in_flight.borrow_mut() = Some(InFlight {
            request,
            task,
            outcome: sender,
        });
        Ok(handle)
    }

    /// Replay the last successful navigation, or reload the page when there is none.
    ///
    /// # Errors
    /// Same as [`Navigator::navigate`].
    pub fn reload(&self) -> Result<Option<NavigationHandle>, NavigationError> {
        let last = self.engine.last.borrow().clone();
        match last {
            Some(last) => self
                .navigate(&last.url, Some(&last.target), last.options)
                .map(Some),
            None => {
                info!("Nothing to replay, reloading the page");
                self.engine.browser().reload();
                Ok(None)
            }
        }
    }

    /// Serve a back/forward transition to the native entry holding `state`.
    ///
    /// # Errors
    /// Same as [`Navigator::navigate`], for the URL stored in the record.
    pub fn handle_popstate(&self, state: &Value) -> Result<PopstateOutcome, NavigationError> {
        let engine = &self.engine;
        if !engine.supported || engine.history.is_quiet() {
            trace!("Ignoring popstate");
            return Ok(PopstateOutcome::Ignored);
        }
        let Some(record) = HistoryStateRecord::from_state(state) else {
            return Ok(PopstateOutcome::Ignored);
        };

        let transition = engine.history.resolve(&record);
        let target = transition
            .target
            .filter(|target| engine.document().query(target).is_some());
        let Some(target) = target else {
            info!("No container for {}, loading it in full", record.url);
            engine.browser().assign(&record.url);
            return Ok(PopstateOutcome::FullPageLoad);
        };

        let direction = transition.direction;
        let event = NavigationEvent::History {
            direction,
            target: &target,
            record: &record,
        };
        if engine.emit(None, &event) == Flow::Cancel {
            debug!("History transition to {} cancelled", record.url);
            return Ok(PopstateOutcome::Cancelled);
        }

        let url = record.url.clone();
        let scroll_top = match direction {
            Direction::Back => record.scroll_top,
            Direction::Forward => 0.0,
        };
        engine.history.adopt(record);

        let browser = Rc::clone(&engine.host.browser);
        let mut options = self.default_options().on_success(move |_event| {
            browser.set_scroll_top(scroll_top);
            Flow::Proceed
        });
        options.push_state = false;
        options.partial = engine.partial_for(&target);
        self.navigate(&url, Some(&target), options)
            .map(PopstateOutcome::Navigating)
    }

    /// Handle a click on a navigation-enabled link.
    ///
    /// Returns `Ok(None)` when the click should be left to the browser.
    ///
    /// # Errors
    /// Same as [`Navigator::navigate`].
    pub fn handle_link_click(
        &self,
        link: &LinkActivation,
    ) -> Result<Option<NavigationHandle>, NavigationError> {
        let engine = &self.engine;
        if !engine.supported || !is_navigation_click(link, &engine.browser().location()) {
            return Ok(None);
        }

        let mut options = self.default_options();
        let overrides = link.overrides();
        if let Some(overrides) = &overrides {
            overrides.apply(&mut options);
        }
        if let Some(fragment) = &link.fragment {
            options.fragment = Some(fragment.clone());
        }
        if let Some(partial) = &link.partial {
            options.partial = Some(partial.clone());
        }
        if let Some(format) = &link.format {
            match format.parse() {
                Ok(parsed) => options.format = parsed,
                Err(err) => warn!("Ignoring link format: {err}"),
            }
        }
        let target = link
            .target
            .clone()
            .or_else(|| overrides.and_then(|overrides| overrides.target));
        self.navigate(&link.href, target.as_deref(), options)
            .map(Some)
    }

    /// Register a module that belongs to no script. It is activated now and unloaded
    /// by the next navigation that loads scripts.
    pub fn register_module(&self, module: Module) {
        self.engine.modules.register(None, module);
    }

    pub fn modules(&self) -> &ModuleRegistry {
        &self.engine.modules
    }

    /// Listen to every event of `kind`.
    pub fn on(&self, kind: EventKind, hook: impl Fn(&NavigationEvent<'_>) -> Flow + 'static) {
        self.engine.listeners.borrow_mut().add(kind, events::hook(hook));
    }

    pub fn set_global_state(&self, state: GlobalState) {
        *self.engine.global_state.borrow_mut() = Some(state);
    }

    pub fn set_partial_resolver(&self, resolver: impl Fn(&str) -> Option<String> + 'static) {
        *self.engine.partial_resolver.borrow_mut() = Some(Rc::new(resolver));
    }
}

fn wire_request(request: &NavigationRequest, url: Url) -> WireRequest {
    let mut wire = WireRequest::get(url);
    wire.headers.push((HEADER_NAVIGATION, "true".to_owned()));
    wire.headers
        .push((HEADER_FORMAT, request.options.format.as_str().to_owned()));
    if let Some(fragment) = &request.options.fragment {
        wire.headers.push((HEADER_FRAGMENT, fragment.clone()));
    }
    if let Some(partial) = &request.options.partial {
        wire.headers.push((HEADER_PARTIAL, partial.clone()));
    }
    wire
}

impl Engine {
    fn document(&self) -> &dyn Document {
        &*self.host.document
    }

    fn browser(&self) -> &dyn Browser {
        &*self.host.browser
    }

    fn next_extras(&self, request: &NavigationRequest, with_options: bool) -> StateExtras {
        let state = self.global_state.borrow().clone();
        let global = state.map(|state| state.snapshot()).unwrap_or_default();
        StateExtras {
            target: Some(request.target.clone()),
            options: with_options.then(|| request.options.stored()),
            global,
        }
    }

    fn partial_for(&self, target: &str) -> Option<String> {
        let resolver = self.partial_resolver.borrow().clone();
        match resolver {
            Some(resolver) => resolver(target),
            None => self.config.default_partial.clone(),
        }
    }

    /// Deliver `event` to the listeners for its kind, then to `callback`.
    fn emit(&self, callback: Option<&Hook>, event: &NavigationEvent<'_>) -> Flow {
        let hooks = self.listeners.borrow().matching(event.kind());
        dispatch(hooks, callback, event)
    }

    fn cancel_in_flight(&self) {
        let Some(previous) = self.in_flight.borrow_mut().take() else {
            return;
        };
        previous.task.abort();
        debug!(
            "Navigation {} to {} superseded",
            previous.request.id, previous.request.url
        );
        self.finish(&previous.request, Outcome::Cancelled, &previous.outcome);
    }

    fn take_in_flight(&self, id: u64) -> Option<InFlight> {
        let mut slot = self.in_flight.borrow_mut();
        if slot.as_ref().is_some_and(|in_flight| in_flight.request.id == id) {
            slot.take()
        } else {
            None
        }
    }

    async fn run(
        engine: Rc<Self>,
        request: Rc<NavigationRequest>,
        wire: WireRequest,
        element: ElementRef,
    ) {
        trace!("Requesting {}", wire.url);
        let pending = engine.host.transport.send(wire);
        let timeout = request.options.timeout;
        let response = if timeout.is_zero() {
            Some(pending.await)
        } else {
            tokio_timeout(timeout, pending).await.ok()
        };

        let Some(in_flight) = engine.take_in_flight(request.id) else {
            return;
        };
        let outcome = match response {
            None => {
                warn!("Navigation to {} timed out after {timeout:?}", request.url);
                let event = NavigationEvent::Timeout { request: &request };
                engine.emit(request.options.callbacks.timeout.as_ref(), &event);
                Outcome::Timeout
            }
            Some(Err(err)) => engine.fail(&request, err.into()),
            Some(Ok(raw)) if !raw.is_success() => {
                engine.fail(&request, NavigationError::Status(raw.status))
            }
            Some(Ok(raw)) => {
                let base = engine.browser().location();
                match normalize(&raw, &request.url, &request.options, &base) {
                    Ok(envelope) => engine.succeed(&request, element, &envelope),
                    Err(err) => engine.fail(&request, err),
                }
            }
        };
        engine.finish(&request, outcome, &in_flight.outcome);
    }

    fn succeed(
        &self,
        request: &NavigationRequest,
        element: ElementRef,
        envelope: &ResponseEnvelope,
    ) -> Outcome {
        let (browser, document) = (self.browser(), self.document());
        let options = &request.options;

        self.history
            .capture_current(browser, document, self.next_extras(request, false));
        if options.push_state {
            self.history.push(
                browser,
                document,
                &envelope.display_url,
                envelope.title.as_deref(),
                self.next_extras(request, true),
            );
        }

        let target = document.insert(element, options.insertion, &envelope.content);

        let base = browser.location();
        let injected = self.assets.load_stylesheets(&base, &envelope.stylesheets);
        trace!("Injected {injected} stylesheets");
        if !options.no_scripts {
            let unloaded = self.modules.unload_active();
            trace!("Unloaded {unloaded} modules");
            let batch = self.assets.load_scripts(&base, &envelope.scripts);
            if !batch.is_empty() {
                debug!("Loading {} scripts", batch.len());
                let span = info_span!("scripts", navigation = request.id);
                drop(spawn_local(batch.run().instrument(span)));
            }
        }

        if let (Some(margin), Some(target)) = (options.scroll_to_target.margin(), target) {
            let offset = (document.offset_top(target) - margin).max(0.0);
            browser.animate_scroll_to(offset, options.scroll_speed);
        }

        let event = NavigationEvent::Success {
            request,
            response: envelope,
        };
        self.emit(options.callbacks.success.as_ref(), &event);

        *self.last.borrow_mut() = Some(LastNavigation {
            url: request.url.clone(),
            target: request.target.clone(),
            options: request.options.clone(),
        });
        info!("Navigated to {}", envelope.display_url);
        Outcome::Success
    }

    fn fail(&self, request: &NavigationRequest, error: NavigationError) -> Outcome {
        warn!("Navigation to {} failed: {error}", request.url);
        let (browser, document) = (self.browser(), self.document());
        self.history
            .capture_current(browser, document, self.next_extras(request, false));
        if request.options.push_state {
            self.history.push(
                browser,
                document,
                &request.url,
                request.options.title.as_deref(),
                self.next_extras(request, true),
            );
        }
        let event = NavigationEvent::Error {
            request,
            error: &error,
        };
        self.emit(request.options.callbacks.error.as_ref(), &event);
        Outcome::Error(error)
    }

    fn finish(
        &self,
        request: &NavigationRequest,
        outcome: Outcome,
        sender: &watch::Sender<Option<Outcome>>,
    ) {
        self.history.settle();
        let event = NavigationEvent::End {
            request,
            outcome: &outcome,
        };
        self.emit(request.options.callbacks.end.as_ref(), &event);
        sender.send_modify(|slot| *slot = Some(outcome));
    }
}
