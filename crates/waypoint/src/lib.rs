//! In-page navigation engine.
//!
//! Fetches server-rendered content for a URL, inserts it into a container of the live
//! document, and keeps native browser history, stylesheets, scripts and script-defined
//! modules in step with what is displayed. The page itself is reached only through
//! the [`Document`], [`Browser`], [`Transport`] and [`ScriptEvaluator`] capabilities.
//!
//! Navigations run as local tasks, so a [`Navigator`] must be used from inside a
//! [`tokio::task::LocalSet`].
#![allow(
    clippy::missing_inline_in_public_items,
    reason = "Inlining decisions left to compiler for this crate"
)]

extern crate alloc;

pub mod assets;
pub mod config;
pub mod error;
pub mod events;
pub mod history;
pub mod host;
pub mod link;
pub mod location;
pub mod navigator;
pub mod options;
pub mod response;
pub mod transport;

pub use config::NavigatorConfig;
pub use error::{NavigationError, TransportError};
pub use events::{EventKind, Flow, Hook, NavigationEvent, Outcome};
pub use history::{Direction, HistoryStateRecord, StateId};
pub use host::{Browser, Document, ElementRef};
pub use link::{LinkActivation, Modifiers, MouseButton};
pub use navigator::{
    GlobalState, Host, NavigationHandle, NavigationRequest, Navigator, PopstateOutcome,
};
pub use options::{InsertionMode, NavigationOptions, OptionOverrides, ResponseFormat, ScrollPolicy};
pub use response::ResponseEnvelope;
pub use transport::{HttpTransport, RawResponse, Transport, WireRequest};
pub use waypoint_html::{Fragment, ScriptRef, StylesheetRef};
pub use waypoint_js::{Module, ModuleRegistry, ScriptContext, ScriptEvaluator};
