//! Link activations and the rules for leaving them to the browser.

use log::warn;
use serde::Deserialize as _;
use serde_json::Value;
use url::Url;

use crate::location::without_fragment;
use crate::options::OptionOverrides;

/// Mouse button that activated a link.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MouseButton {
    #[default]
    Primary,
    /// Usually the wheel; opens a new tab in most browsers.
    Auxiliary,
    Secondary,
}

/// Modifier keys held during the activation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[allow(clippy::struct_excessive_bools, reason = "One flag per modifier key")]
pub struct Modifiers {
    pub meta: bool,
    pub ctrl: bool,
    pub alt: bool,
    pub shift: bool,
}

impl Modifiers {
    pub const fn any(self) -> bool {
        self.meta || self.ctrl || self.alt || self.shift
    }
}

/// A click on a navigation-enabled link, with the link's navigation attributes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LinkActivation {
    pub href: String,
    pub button: MouseButton,
    pub modifiers: Modifiers,
    /// Target container selector set on the link.
    pub target: Option<String>,
    pub fragment: Option<String>,
    pub partial: Option<String>,
    /// `html` or `json`.
    pub format: Option<String>,
    /// Options object carried by the link.
    pub overrides: Option<Value>,
}

impl LinkActivation {
    /// Plain primary-button click on `href`.
    pub fn new(href: impl Into<String>) -> Self {
        Self {
            href: href.into(),
            ..Self::default()
        }
    }

    /// The link's options object, if it carries a valid one.
    pub fn overrides(&self) -> Option<OptionOverrides> {
        let value = self.overrides.as_ref()?;
        OptionOverrides::deserialize(value)
            .map_err(|err| warn!("Ignoring invalid link options on {}: {err}", self.href))
            .ok()
    }
}

/// Whether an activation of `link` on the page at `location` should be handled by the
/// engine instead of the browser.
///
/// Clicks with a non-primary button or any modifier, links to another origin, bare
/// `#` links and links that only change the fragment of the current page are left to
/// the browser.
pub fn is_navigation_click(link: &LinkActivation, location: &Url) -> bool {
    if link.button != MouseButton::Primary || link.modifiers.any() {
        return false;
    }
    let href = link.href.trim();
    if href.is_empty() || href == "#" {
        return false;
    }
    let Ok(resolved) = location.join(href) else {
        warn!("Ignoring link with unresolvable href `{href}`");
        return false;
    };
    if resolved.origin() != location.origin() {
        return false;
    }
    let same_page = without_fragment(&resolved) == without_fragment(location);
    !(same_page && resolved.fragment().is_some())
}
