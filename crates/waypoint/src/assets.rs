//! Stylesheet and script loading with per-session deduplication.
//!
//! Every asset URL is keyed after resolution against the page location. Stylesheets
//! and cross-origin scripts are handed to the document once. Same-origin scripts are
//! fetched here and evaluated through the host's [`ScriptEvaluator`] in document
//! order, once per page session; later navigations that include them only reactivate
//! the modules they registered.

use core::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use futures::stream::{FuturesUnordered, StreamExt as _};
use log::{debug, trace, warn};
use url::Url;
use waypoint_html::{ScriptRef, StylesheetRef};
use waypoint_js::{ModuleRegistry, ScriptContext, ScriptEvaluator};

use crate::host::Document;
use crate::location::{asset_key, is_same_origin};
use crate::transport::{Transport, WireRequest};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptOrigin {
    /// Same origin as the page; fetched and evaluated by the loader.
    Local,
    /// Injected into the document and left to it.
    External,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptState {
    /// Queued in a batch that has not evaluated it yet.
    Pending,
    Loaded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScriptEntry {
    pub origin: ScriptOrigin,
    pub state: ScriptState,
}

/// Assets known to be part of the page.
#[derive(Debug, Default)]
pub struct AssetRegistry {
    stylesheets: HashSet<String>,
    scripts: HashMap<String, ScriptEntry>,
}

impl AssetRegistry {
    pub fn has_stylesheet(&self, url: &str) -> bool {
        self.stylesheets.contains(url)
    }

    pub fn script(&self, url: &str) -> Option<ScriptEntry> {
        self.scripts.get(url).copied()
    }
}

/// Loads the assets listed by navigation responses.
pub struct AssetLoader {
    document: Rc<dyn Document>,
    transport: Rc<dyn Transport>,
    evaluator: Rc<dyn ScriptEvaluator>,
    modules: ModuleRegistry,
    registry: Rc<RefCell<AssetRegistry>>,
}

impl AssetLoader {
    pub fn new(
        document: Rc<dyn Document>,
        transport: Rc<dyn Transport>,
        evaluator: Rc<dyn ScriptEvaluator>,
        modules: ModuleRegistry,
    ) -> Self {
        Self {
            document,
            transport,
            evaluator,
            modules,
            registry: Rc::new(RefCell::new(AssetRegistry::default())),
        }
    }

    /// Record the assets already present in the document as loaded.
    pub fn seed(&self, base: &Url) {
        let stylesheets = self.document.stylesheet_urls();
        let scripts = self.document.script_urls();
        let mut registry = self.registry.borrow_mut();
        for url in stylesheets {
            registry.stylesheets.insert(asset_key(base, &url));
        }
        for url in scripts {
            let entry = ScriptEntry {
                origin: origin_of(base, &url),
                state: ScriptState::Loaded,
            };
            registry.scripts.insert(asset_key(base, &url), entry);
        }
        debug!(
            "Seeded asset registry with {} stylesheets and {} scripts",
            registry.stylesheets.len(),
            registry.scripts.len()
        );
    }

    /// Inject every stylesheet not yet part of the page.
    ///
    /// # Returns
    ///
    /// The number of stylesheets injected.
    pub fn load_stylesheets(&self, base: &Url, stylesheets: &[StylesheetRef]) -> usize {
        let fresh: Vec<(String, &str)> = {
            let mut registry = self.registry.borrow_mut();
            stylesheets
                .iter()
                .filter_map(|sheet| {
                    let key = asset_key(base, &sheet.url);
                    registry
                        .stylesheets
                        .insert(key.clone())
                        .then_some((key, sheet.media.as_str()))
                })
                .collect()
        };
        for (url, media) in &fresh {
            debug!("Injecting stylesheet {url} ({media})");
            self.document.append_stylesheet(url, media);
        }
        fresh.len()
    }

    /// Sort `scripts` into what can be handled right away and what must be fetched.
    ///
    /// Unseen cross-origin scripts are injected into the document. Local scripts that
    /// already ran have their modules reactivated. Unseen local scripts are marked
    /// pending and returned in a batch that evaluates them in list order.
    pub fn load_scripts(&self, base: &Url, scripts: &[ScriptRef]) -> ScriptBatch {
        let mut inject = Vec::new();
        let mut reactivate = Vec::new();
        let mut queued = Vec::new();
        {
            let mut registry = self.registry.borrow_mut();
            for script in scripts {
                let key = asset_key(base, &script.url);
                match registry.scripts.get(&key).copied() {
                    None => {
                        let origin = origin_of(base, &script.url);
                        let state = match origin {
                            ScriptOrigin::External => ScriptState::Loaded,
                            ScriptOrigin::Local => ScriptState::Pending,
                        };
                        registry
                            .scripts
                            .insert(key.clone(), ScriptEntry { origin, state });
                        match origin {
                            ScriptOrigin::External => inject.push(key),
                            ScriptOrigin::Local => queued.push(key),
                        }
                    }
                    Some(ScriptEntry {
                        origin: ScriptOrigin::Local,
                        state: ScriptState::Loaded,
                    }) => reactivate.push(key),
                    Some(entry) => trace!("Skipping script {key}: {entry:?}"),
                }
            }
        }

        for url in &inject {
            debug!("Injecting external script {url}");
            self.document.append_script(url);
        }
        for url in &reactivate {
            let count = self.modules.reactivate(url);
            trace!("Reactivated {count} modules of {url}");
        }

        ScriptBatch {
            urls: queued,
            transport: Rc::clone(&self.transport),
            evaluator: Rc::clone(&self.evaluator),
            modules: self.modules.clone(),
            registry: Rc::clone(&self.registry),
        }
    }

    /// Current entry for the resolved script URL `url`.
    pub fn script_entry(&self, url: &str) -> Option<ScriptEntry> {
        self.registry.borrow().script(url)
    }

    /// Whether the resolved stylesheet URL `url` is part of the page.
    pub fn has_stylesheet(&self, url: &str) -> bool {
        self.registry.borrow().has_stylesheet(url)
    }
}

fn origin_of(base: &Url, url: &str) -> ScriptOrigin {
    if is_same_origin(base, url) {
        ScriptOrigin::Local
    } else {
        ScriptOrigin::External
    }
}

/// Local scripts of one navigation, fetched concurrently and evaluated in order.
#[must_use = "scripts are only fetched when the batch is run"]
pub struct ScriptBatch {
    urls: Vec<String>,
    transport: Rc<dyn Transport>,
    evaluator: Rc<dyn ScriptEvaluator>,
    modules: ModuleRegistry,
    registry: Rc<RefCell<AssetRegistry>>,
}

impl ScriptBatch {
    pub fn is_empty(&self) -> bool {
        self.urls.is_empty()
    }

    pub fn len(&self) -> usize {
        self.urls.len()
    }

    /// Fetch every script and evaluate each as soon as it and all scripts before it
    /// have arrived. Failed fetches evaluate as empty scripts.
    ///
    /// # Returns
    ///
    /// The number of scripts evaluated.
    pub async fn run(self) -> usize {
        let mut fetches: FuturesUnordered<_> = self
            .urls
            .iter()
            .enumerate()
            .map(|(index, url)| self.fetch(index, url))
            .collect();

        let mut arrived: Vec<Option<String>> = vec![None; self.urls.len()];
        let mut head = 0;
        while let Some((index, body)) = fetches.next().await {
            if let Some(slot) = arrived.get_mut(index) {
                *slot = Some(body);
            }
            while let Some(body) = arrived.get_mut(head).and_then(Option::take) {
                if let Some(url) = self.urls.get(head) {
                    self.evaluate(url, &body);
                }
                head += 1;
            }
        }
        head
    }

    fn fetch(&self, index: usize, url: &str) -> impl Future<Output = (usize, String)> + 'static {
        let pending = match Url::parse(url) {
            Ok(parsed) => Some(self.transport.send(WireRequest::get(parsed))),
            Err(err) => {
                warn!("Cannot fetch script {url}: {err}");
                None
            }
        };
        let url = url.to_owned();
        async move {
            let Some(pending) = pending else {
                return (index, String::new());
            };
            let body = match pending.await {
                Ok(response) if response.is_success() => {
                    String::from_utf8_lossy(&response.body).into_owned()
                }
                Ok(response) => {
                    warn!("Script {url} answered with status {}", response.status);
                    String::new()
                }
                Err(err) => {
                    warn!("Script {url} failed to load: {err}");
                    String::new()
                }
            };
            (index, body)
        }
    }

    fn evaluate(&self, url: &str, source: &str) {
        trace!("Evaluating {url} ({} bytes)", source.len());
        let cx = ScriptContext::new(url, &self.modules);
        if let Err(err) = self.evaluator.eval_script(source, &cx) {
            warn!("Script {url} raised: {err:#}");
        }
        if let Some(entry) = self.registry.borrow_mut().scripts.get_mut(url) {
            entry.state = ScriptState::Loaded;
        }
    }
}
