//! Capabilities the engine needs from the page it runs in.
//!
//! The engine never touches a live DOM or window directly. Hosts implement
//! [`Document`] and [`Browser`] over whatever they embed (a webview bridge, a headless
//! DOM, a test fake) and hand them to [`crate::Navigator::new`].

use core::time::Duration;

use serde_json::Value;
use url::Url;

use crate::options::InsertionMode;

/// Opaque handle to an element of the live document.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct ElementRef(pub u64);

/// The live document.
pub trait Document {
    /// First element matching `selector`.
    fn query(&self, selector: &str) -> Option<ElementRef>;

    /// Insert `html` relative to `target`.
    ///
    /// # Returns
    ///
    /// The element that now represents the target: `target` itself, or for
    /// [`InsertionMode::ReplaceElement`] the first inserted element (`None` when the
    /// markup contained no element).
    fn insert(&self, target: ElementRef, mode: InsertionMode, html: &str) -> Option<ElementRef>;

    /// Distance in pixels from the top of the document to `element`.
    fn offset_top(&self, element: ElementRef) -> f64;

    fn title(&self) -> String;

    fn set_title(&self, title: &str);

    /// Append `<link rel="stylesheet">` to the head.
    fn append_stylesheet(&self, url: &str, media: &str);

    /// Append an external `<script src>` to the body and let the document run it.
    fn append_script(&self, url: &str);

    /// `href`s of stylesheet links currently in the document.
    fn stylesheet_urls(&self) -> Vec<String>;

    /// `src`s of scripts currently in the document.
    fn script_urls(&self) -> Vec<String>;
}

/// The window: history, location, scrolling.
pub trait Browser {
    /// Whether `pushState`/`replaceState` style history manipulation is available.
    fn supports_history(&self) -> bool;

    fn location(&self) -> Url;

    /// Push a native history entry holding `state`.
    fn push_state(&self, state: &Value, title: Option<&str>, url: &str);

    /// Replace the state of the current native history entry.
    fn replace_state(&self, state: &Value, title: Option<&str>);

    fn scroll_top(&self) -> f64;

    fn set_scroll_top(&self, offset: f64);

    /// Animate the viewport to `offset` over `duration`.
    fn animate_scroll_to(&self, offset: f64, duration: Duration);

    /// Full page navigation to `url`.
    fn assign(&self, url: &str);

    /// Full page reload.
    fn reload(&self);
}
