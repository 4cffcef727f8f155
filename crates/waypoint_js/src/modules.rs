//! Module lifecycle registry.
//!
//! A module is a pair of callbacks tied to the script that registered it. Every module
//! registered or reactivated since the last navigation is "active"; the next navigation
//! that runs scripts unloads all of them before the new content's modules load.
//!
//! Ownership is per script URL, not per container: a script included by every page has
//! its modules unloaded and loaded again on each navigation.

use core::fmt;
use core::mem;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use log::{debug, trace};

type Callback = Rc<dyn Fn()>;

/// Activation and deactivation callbacks, both optional.
#[derive(Clone, Default)]
pub struct Module {
    on_load: Option<Callback>,
    on_unload: Option<Callback>,
}

impl fmt::Debug for Module {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("Module")
            .field("on_load", &self.on_load.is_some())
            .field("on_unload", &self.on_unload.is_some())
            .finish()
    }
}

impl Module {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn on_load(mut self, callback: impl Fn() + 'static) -> Self {
        self.on_load = Some(Rc::new(callback));
        self
    }

    #[must_use]
    pub fn on_unload(mut self, callback: impl Fn() + 'static) -> Self {
        self.on_unload = Some(Rc::new(callback));
        self
    }

    fn load(&self) {
        if let Some(callback) = &self.on_load {
            callback();
        }
    }

    fn unload(&self) {
        if let Some(callback) = &self.on_unload {
            callback();
        }
    }
}

#[derive(Default)]
struct RegistryState {
    by_url: HashMap<String, Vec<Rc<Module>>>,
    active: Vec<Rc<Module>>,
}

/// Shared handle to the module registry. Clones refer to the same registry.
///
/// Callbacks always run after the registry borrow is released, so a callback may
/// register further modules.
#[derive(Clone, Default)]
pub struct ModuleRegistry {
    state: Rc<RefCell<RegistryState>>,
}

impl fmt::Debug for ModuleRegistry {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.borrow();
        formatter
            .debug_struct("ModuleRegistry")
            .field("scripts", &state.by_url.len())
            .field("active", &state.active.len())
            .finish()
    }
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `module` under `owner`, mark it active and run its load callback.
    /// Modules without an owner are never reactivated.
    pub fn register(&self, owner: Option<&str>, module: Module) {
        let module = Rc::new(module);
        {
            let mut state = self.state.borrow_mut();
            if let Some(url) = owner {
                state
                    .by_url
                    .entry(url.to_owned())
                    .or_default()
                    .push(Rc::clone(&module));
            }
            state.active.push(Rc::clone(&module));
        }
        trace!("Registered module for {}", owner.unwrap_or("<inline>"));
        module.load();
    }

    /// Activate every module registered by the script at `url`.
    ///
    /// # Returns
    ///
    /// The number of modules activated.
    pub fn reactivate(&self, url: &str) -> usize {
        let modules = {
            let mut state = self.state.borrow_mut();
            let owned = state.by_url.get(url).cloned().unwrap_or_default();
            state.active.extend(owned.iter().map(Rc::clone));
            owned
        };
        for module in &modules {
            module.load();
        }
        if !modules.is_empty() {
            debug!("Reactivated {} module(s) from {url}", modules.len());
        }
        modules.len()
    }

    /// Run the unload callback of every active module and clear the active set.
    ///
    /// # Returns
    ///
    /// The number of modules unloaded.
    pub fn unload_active(&self) -> usize {
        let active = mem::take(&mut self.state.borrow_mut().active);
        for module in &active {
            module.unload();
        }
        active.len()
    }

    /// Number of currently active modules.
    pub fn active_count(&self) -> usize {
        self.state.borrow().active.len()
    }

    /// Number of modules registered by the script at `url`.
    pub fn owned_by(&self, url: &str) -> usize {
        self.state.borrow().by_url.get(url).map_or(0, Vec::len)
    }
}
