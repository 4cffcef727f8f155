//! History state records and their reconciliation with the native history stack.
//!
//! Exactly one record is current. It is refreshed (`replaceState`) when the user
//! leaves it and a new record is pushed for each destination. Record identifiers grow
//! strictly, which is what lets a popstate tell back from forward.

use core::cell::{Cell, RefCell};
use std::time::{SystemTime, UNIX_EPOCH};

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::host::{Browser, Document};
use crate::location::path_and_query;
use crate::options::StoredOptions;

/// Keys owned by the record itself; host-contributed state may not overwrite them.
const RESERVED_KEYS: [&str; 6] = ["id", "scrollTop", "url", "target", "title", "options"];

/// Identifier of a history record. Later records have larger identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StateId(pub u64);

/// Snapshot stored in a native history entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryStateRecord {
    pub id: StateId,
    #[serde(default)]
    pub scroll_top: f64,
    /// Path and query of the entry.
    pub url: String,
    /// Container that was replaced when navigating away from this entry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<StoredOptions>,
    /// Host-contributed global state.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl HistoryStateRecord {
    /// The record as stored in the native history entry.
    pub fn to_state(&self) -> Value {
        serde_json::to_value(self).unwrap_or_else(|err| {
            warn!("Failed to serialize history record {}: {err}", self.id.0);
            Value::Null
        })
    }

    /// Read a record back from a native history entry. Entries not written by the
    /// engine (including `null`) yield `None`.
    pub fn from_state(state: &Value) -> Option<Self> {
        if !state.is_object() {
            return None;
        }
        Self::deserialize(state)
            .map_err(|err| debug!("Ignoring foreign history state: {err}"))
            .ok()
    }
}

/// Fields merged into a record when it is captured or pushed.
#[derive(Debug, Clone, Default)]
pub struct StateExtras {
    pub target: Option<String>,
    pub options: Option<StoredOptions>,
    pub global: Map<String, Value>,
}

impl StateExtras {
    fn merge_into(self, record: &mut HistoryStateRecord) {
        if self.target.is_some() {
            record.target = self.target;
        }
        if self.options.is_some() {
            record.options = self.options;
        }
        for (key, value) in self.global {
            if RESERVED_KEYS.contains(&key.as_str()) {
                debug!("Global state key `{key}` collides with a record field, skipping");
                continue;
            }
            record.extra.insert(key, value);
        }
    }
}

/// Issues strictly increasing identifiers derived from the wall clock.
#[derive(Debug, Default)]
pub struct IdAllocator {
    last: Cell<u64>,
}

impl IdAllocator {
    /// Milliseconds since the epoch, bumped past the last issued or observed id.
    pub fn next(&self) -> StateId {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |elapsed| elapsed.as_millis() as u64);
        let id = now.max(self.last.get().saturating_add(1));
        self.last.set(id);
        StateId(id)
    }

    /// Make sure later ids exceed `id`.
    pub fn observe(&self, id: StateId) {
        if id.0 > self.last.get() {
            self.last.set(id.0);
        }
    }
}

/// Direction of a browser-triggered history transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Back,
}

impl Direction {
    /// Moving to a record with an identifier not below the current one is forward.
    pub fn between(outgoing: StateId, incoming: StateId) -> Self {
        if outgoing <= incoming {
            Self::Forward
        } else {
            Self::Back
        }
    }
}

/// Resolved history transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub direction: Direction,
    /// Container to refill; `None` when the record never stored one.
    pub target: Option<String>,
}

/// Owner of the current record and of the quiet flag.
///
/// The manager is quiet while it writes to native history and from construction until
/// the first navigation completes. Popstate notifications received while quiet are
/// echoes of the engine's own writes or of the initial page load and must be ignored.
#[derive(Debug)]
pub struct HistoryManager {
    current: RefCell<HistoryStateRecord>,
    ids: IdAllocator,
    writing: Cell<bool>,
    settling: Cell<bool>,
}

impl HistoryManager {
    /// Start with a record describing the page as loaded.
    pub fn new(browser: &dyn Browser, document: &dyn Document) -> Self {
        let ids = IdAllocator::default();
        let current = HistoryStateRecord {
            id: ids.next(),
            scroll_top: browser.scroll_top(),
            url: path_and_query(&browser.location()),
            target: None,
            title: Some(document.title()),
            options: None,
            extra: Map::new(),
        };
        Self {
            current: RefCell::new(current),
            ids,
            writing: Cell::new(false),
            settling: Cell::new(true),
        }
    }

    pub fn current(&self) -> HistoryStateRecord {
        self.current.borrow().clone()
    }

    pub fn is_quiet(&self) -> bool {
        self.writing.get() || self.settling.get()
    }

    /// End the initial quiet period.
    pub fn settle(&self) {
        self.settling.set(false);
    }

    /// Refresh the current record with the live scroll offset and location, merge
    /// `extras`, and replace the native entry with it.
    pub fn capture_current(
        &self,
        browser: &dyn Browser,
        document: &dyn Document,
        extras: StateExtras,
    ) -> HistoryStateRecord {
        let mut record = self.current();
        record.scroll_top = browser.scroll_top();
        record.url = path_and_query(&browser.location());
        extras.merge_into(&mut record);

        self.write(|| browser.replace_state(&record.to_state(), record.title.as_deref()));
        if let Some(title) = &record.title {
            document.set_title(title);
        }
        *self.current.borrow_mut() = record.clone();
        record
    }

    /// Push a native entry for `url` and make it current. Blank titles are dropped.
    pub fn push(
        &self,
        browser: &dyn Browser,
        document: &dyn Document,
        url: &str,
        title: Option<&str>,
        extras: StateExtras,
    ) -> HistoryStateRecord {
        let mut record = HistoryStateRecord {
            id: self.ids.next(),
            scroll_top: browser.scroll_top(),
            url: url.to_owned(),
            target: None,
            title: title
                .map(str::trim)
                .filter(|title| !title.is_empty())
                .map(str::to_owned),
            options: None,
            extra: Map::new(),
        };
        extras.merge_into(&mut record);

        self.write(|| browser.push_state(&record.to_state(), record.title.as_deref(), &record.url));
        if let Some(title) = &record.title {
            document.set_title(title);
        }
        *self.current.borrow_mut() = record.clone();
        record
    }

    /// Direction and container for a transition to `incoming`.
    pub fn resolve(&self, incoming: &HistoryStateRecord) -> Transition {
        let current = self.current.borrow();
        let direction = Direction::between(current.id, incoming.id);
        let target = match direction {
            Direction::Back => incoming.target.clone(),
            Direction::Forward => current.target.clone(),
        };
        Transition { direction, target }
    }

    /// Make `record` current without touching native history.
    pub fn adopt(&self, record: HistoryStateRecord) {
        self.ids.observe(record.id);
        *self.current.borrow_mut() = record;
    }

    fn write(&self, operation: impl FnOnce()) {
        let previous = self.writing.replace(true);
        operation();
        self.writing.set(previous);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: u64, target: &str) -> HistoryStateRecord {
        HistoryStateRecord {
            id: StateId(id),
            scroll_top: 0.0,
            url: "/".to_owned(),
            target: Some(target.to_owned()),
            title: None,
            options: None,
            extra: Map::new(),
        }
    }

    #[test]
    fn ids_strictly_increase() {
        let ids = IdAllocator::default();
        let mut last = ids.next();
        for _ in 0..1_000 {
            let next = ids.next();
            assert!(next > last);
            last = next;
        }
        ids.observe(StateId(last.0 + 500));
        assert!(ids.next().0 > last.0 + 500);
    }

    #[test]
    fn direction_compares_ids() {
        assert_eq!(Direction::between(StateId(100), StateId(50)), Direction::Back);
        assert_eq!(Direction::between(StateId(100), StateId(150)), Direction::Forward);
        assert_eq!(Direction::between(StateId(100), StateId(100)), Direction::Forward);
    }

    #[test]
    fn global_state_cannot_clobber_record_fields() {
        let mut target = record(1, "#a");
        let mut global = Map::new();
        global.insert("url".to_owned(), Value::from("/evil"));
        global.insert("section".to_owned(), Value::from("news"));
        StateExtras {
            global,
            ..StateExtras::default()
        }
        .merge_into(&mut target);
        assert_eq!(target.url, "/");
        assert_eq!(target.extra.get("section"), Some(&Value::from("news")));
    }

    #[test]
    fn state_uses_camel_case_and_flattens_extras() {
        let mut entry = record(7, "#main");
        entry.scroll_top = 120.0;
        entry.extra.insert("section".to_owned(), Value::from("news"));
        let state = entry.to_state();
        assert_eq!(state.get("scrollTop"), Some(&Value::from(120.0)));
        assert_eq!(state.get("section"), Some(&Value::from("news")));
        assert_eq!(HistoryStateRecord::from_state(&state), Some(entry));
    }

    #[test]
    fn foreign_states_are_rejected() {
        assert_eq!(HistoryStateRecord::from_state(&Value::Null), None);
        assert_eq!(
            HistoryStateRecord::from_state(&serde_json::json!({"page": 3})),
            None
        );
    }
}
