#![allow(
    clippy::tests_outside_test_module,
    reason = "Integration test harness"
)]
//! Modules registered during evaluation belong to the evaluated script.

use core::cell::RefCell;
use std::rc::Rc;

use anyhow::{Result, bail};
use waypoint_js::{Module, ModuleRegistry, ScriptContext, ScriptEvaluator};

/// Evaluator that understands one statement per line: `module <name>` registers a
/// module logging its lifecycle, `fail` raises an error.
struct LineEvaluator {
    log: Rc<RefCell<Vec<String>>>,
}

impl ScriptEvaluator for LineEvaluator {
    fn eval_script(&self, source: &str, cx: &ScriptContext<'_>) -> Result<()> {
        for line in source.lines().map(str::trim) {
            if line == "fail" {
                bail!("script {} failed", cx.url());
            }
            if let Some(name) = line.strip_prefix("module ") {
                let on_load = Rc::clone(&self.log);
                let on_unload = Rc::clone(&self.log);
                let load_name = format!("load {name}");
                let unload_name = format!("unload {name}");
                cx.register_module(
                    Module::new()
                        .on_load(move || on_load.borrow_mut().push(load_name.clone()))
                        .on_unload(move || on_unload.borrow_mut().push(unload_name.clone())),
                );
            }
        }
        Ok(())
    }
}

#[test]
fn modules_follow_their_script() -> Result<()> {
    let log = Rc::new(RefCell::new(Vec::new()));
    let registry = ModuleRegistry::new();
    let evaluator = LineEvaluator {
        log: Rc::clone(&log),
    };

    evaluator.eval_script("module gallery", &ScriptContext::new("/gallery.js", &registry))?;
    evaluator.eval_script("module map", &ScriptContext::new("/map.js", &registry))?;
    registry.unload_active();
    registry.reactivate("/map.js");

    assert_eq!(
        *log.borrow(),
        ["load gallery", "load map", "unload gallery", "unload map", "load map"]
    );
    assert_eq!(registry.owned_by("/gallery.js"), 1);
    Ok(())
}

#[test]
fn evaluation_errors_name_the_script() {
    let registry = ModuleRegistry::new();
    let evaluator = LineEvaluator {
        log: Rc::new(RefCell::new(Vec::new())),
    };
    let result = evaluator.eval_script("fail", &ScriptContext::new("/broken.js", &registry));
    let message = result.err().map(|err| err.to_string());
    assert_eq!(message.as_deref(), Some("script /broken.js failed"));
}
