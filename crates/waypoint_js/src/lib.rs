//! Script evaluation seam and module lifecycle tracking.
//!
//! The navigation engine never runs JavaScript itself. Hosts plug an engine in through
//! [`ScriptEvaluator`]; scripts evaluated through it may register [`Module`]s whose
//! activation and deactivation follow the navigations that include their script.
#![allow(
    clippy::missing_inline_in_public_items,
    reason = "Inlining decisions left to compiler for this crate"
)]

use anyhow::Result;

pub mod modules;
pub use modules::{Module, ModuleRegistry};

/// Per-evaluation context: the URL the script was fetched from and the registry its
/// modules are recorded in.
#[derive(Debug, Clone, Copy)]
pub struct ScriptContext<'cx> {
    url: &'cx str,
    modules: &'cx ModuleRegistry,
}

impl<'cx> ScriptContext<'cx> {
    pub fn new(url: &'cx str, modules: &'cx ModuleRegistry) -> Self {
        Self { url, modules }
    }

    /// URL of the script being evaluated.
    pub fn url(&self) -> &'cx str {
        self.url
    }

    /// Register a module owned by the script being evaluated. The module is activated
    /// immediately and again on every later navigation that includes this script.
    pub fn register_module(&self, module: Module) {
        self.modules.register(Some(self.url), module);
    }
}

/// A minimal interface for evaluating classic scripts in the host page.
/// Keep this trait small so engines can be swapped.
pub trait ScriptEvaluator {
    /// Evaluate a classic script fetched from `cx.url()`.
    ///
    /// # Errors
    /// Returns an error if the engine fails to compile or run the script.
    fn eval_script(&self, source: &str, cx: &ScriptContext<'_>) -> Result<()>;
}

impl<F> ScriptEvaluator for F
where
    F: Fn(&str, &ScriptContext<'_>) -> Result<()>,
{
    fn eval_script(&self, source: &str, cx: &ScriptContext<'_>) -> Result<()> {
        self(source, cx)
    }
}
