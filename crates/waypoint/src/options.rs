//! Per-navigation options.

use core::fmt;
use core::str::FromStr;
use core::time::Duration;
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use waypoint_html::Fragment;

use crate::config::NavigatorConfig;
use crate::events::{self, Flow, Hook, NavigationEvent};

/// How response content is placed into the target container.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum InsertionMode {
    /// Replace the container's children.
    #[default]
    #[serde(rename = "insert")]
    ReplaceHtml,
    /// Append after the container's existing children.
    #[serde(rename = "append")]
    Append,
    /// Insert before the container's existing children.
    #[serde(rename = "prepend")]
    Prepend,
    /// Replace the container itself; the first inserted element becomes the new target.
    #[serde(rename = "replace")]
    ReplaceElement,
}

/// Wire format requested from the server.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseFormat {
    Html,
    #[default]
    Json,
}

impl ResponseFormat {
    /// Value sent in the format signaling header.
    #[inline]
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Html => "html",
            Self::Json => "json",
        }
    }
}

/// Format name other than `html` or `json`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown response format `{0}`")]
pub struct UnknownFormat(pub String);

impl FromStr for ResponseFormat {
    type Err = UnknownFormat;

    #[inline]
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "html" => Ok(Self::Html),
            "json" => Ok(Self::Json),
            _ => Err(UnknownFormat(value.to_owned())),
        }
    }
}

/// Scrolling performed once new content is inserted.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub enum ScrollPolicy {
    #[default]
    Off,
    /// Scroll so the target's top edge is at the top of the viewport.
    Top,
    /// Scroll to the target's top edge minus a margin.
    Offset(f64),
}

impl ScrollPolicy {
    /// Margin subtracted from the target offset, or `None` when scrolling is off.
    #[inline]
    #[must_use]
    pub const fn margin(self) -> Option<f64> {
        match self {
            Self::Off => None,
            Self::Top => Some(0.0),
            Self::Offset(margin) => Some(margin),
        }
    }
}

/// `scrollToTarget` accepts either a flag or a margin in pixels.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(untagged)]
enum ScrollSetting {
    Flag(bool),
    Margin(f64),
}

impl From<ScrollSetting> for ScrollPolicy {
    fn from(setting: ScrollSetting) -> Self {
        match setting {
            ScrollSetting::Flag(false) => Self::Off,
            ScrollSetting::Flag(true) => Self::Top,
            ScrollSetting::Margin(margin) => Self::Offset(margin),
        }
    }
}

/// Custom narrowing of a response fragment into the markup to insert.
pub type ContentFilter = Rc<dyn Fn(&Fragment) -> String>;

/// Per-call lifecycle callbacks. Each runs after the engine-wide listeners for the
/// same event.
#[derive(Clone, Default)]
pub struct Callbacks {
    pub start: Option<Hook>,
    pub success: Option<Hook>,
    pub error: Option<Hook>,
    pub timeout: Option<Hook>,
    pub end: Option<Hook>,
}

impl fmt::Debug for Callbacks {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("Callbacks")
            .field("start", &self.start.is_some())
            .field("success", &self.success.is_some())
            .field("error", &self.error.is_some())
            .field("timeout", &self.timeout.is_some())
            .field("end", &self.end.is_some())
            .finish()
    }
}

/// Options of a single navigation.
///
/// Content narrowing applies at most one of `filter`, `elements` and `fragment`, in
/// that order of precedence.
#[derive(Clone)]
pub struct NavigationOptions {
    /// Push a history entry for the destination.
    pub push_state: bool,
    pub scroll_to_target: ScrollPolicy,
    pub scroll_speed: Duration,
    pub insertion: InsertionMode,
    /// Skip module unloading and script loading.
    pub no_scripts: bool,
    pub format: ResponseFormat,
    pub filter: Option<ContentFilter>,
    /// Insert the inner markup of the first element matching this selector.
    pub fragment: Option<String>,
    /// Insert every element matching this selector.
    pub elements: Option<String>,
    pub partial: Option<String>,
    /// Page title used when the response does not supply one. Unset means the document
    /// title at the time the navigation starts.
    pub title: Option<String>,
    /// Zero disables the timeout.
    pub timeout: Duration,
    pub callbacks: Callbacks,
}

impl fmt::Debug for NavigationOptions {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("NavigationOptions")
            .field("push_state", &self.push_state)
            .field("scroll_to_target", &self.scroll_to_target)
            .field("insertion", &self.insertion)
            .field("no_scripts", &self.no_scripts)
            .field("format", &self.format)
            .field("filter", &self.filter.is_some())
            .field("fragment", &self.fragment)
            .field("elements", &self.elements)
            .field("partial", &self.partial)
            .field("title", &self.title)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl Default for NavigationOptions {
    #[inline]
    fn default() -> Self {
        Self::from_config(&NavigatorConfig::default())
    }
}

impl NavigationOptions {
    /// Options seeded from engine-wide defaults.
    #[inline]
    #[must_use]
    pub fn from_config(config: &NavigatorConfig) -> Self {
        Self {
            push_state: true,
            scroll_to_target: ScrollPolicy::Off,
            scroll_speed: config.scroll_speed(),
            insertion: InsertionMode::ReplaceHtml,
            no_scripts: false,
            format: config.format,
            filter: None,
            fragment: None,
            elements: None,
            partial: config.default_partial.clone(),
            title: None,
            timeout: config.timeout(),
            callbacks: Callbacks::default(),
        }
    }

    /// Narrow responses with a custom function.
    #[inline]
    #[must_use]
    pub fn with_filter(mut self, filter: impl Fn(&Fragment) -> String + 'static) -> Self {
        self.filter = Some(Rc::new(filter));
        self
    }

    #[inline]
    #[must_use]
    pub fn on_start(mut self, hook: impl Fn(&NavigationEvent<'_>) -> Flow + 'static) -> Self {
        self.callbacks.start = Some(events::hook(hook));
        self
    }

    #[inline]
    #[must_use]
    pub fn on_success(mut self, hook: impl Fn(&NavigationEvent<'_>) -> Flow + 'static) -> Self {
        self.callbacks.success = Some(events::hook(hook));
        self
    }

    #[inline]
    #[must_use]
    pub fn on_error(mut self, hook: impl Fn(&NavigationEvent<'_>) -> Flow + 'static) -> Self {
        self.callbacks.error = Some(events::hook(hook));
        self
    }

    #[inline]
    #[must_use]
    pub fn on_timeout(mut self, hook: impl Fn(&NavigationEvent<'_>) -> Flow + 'static) -> Self {
        self.callbacks.timeout = Some(events::hook(hook));
        self
    }

    #[inline]
    #[must_use]
    pub fn on_end(mut self, hook: impl Fn(&NavigationEvent<'_>) -> Flow + 'static) -> Self {
        self.callbacks.end = Some(events::hook(hook));
        self
    }

    /// The subset stored alongside pushed history entries.
    #[inline]
    #[must_use]
    pub fn stored(&self) -> StoredOptions {
        StoredOptions {
            partial: self.partial.clone(),
            fragment: self.fragment.clone(),
        }
    }
}

/// Options persisted in history records.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partial: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fragment: Option<String>,
}

/// JSON options object carried by a link, e.g. `{"insert": "append", "noScripts": true}`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OptionOverrides {
    pub push_state: Option<bool>,
    pub target: Option<String>,
    scroll_to_target: Option<ScrollSetting>,
    /// Milliseconds.
    pub scroll_speed: Option<u64>,
    pub insert: Option<InsertionMode>,
    pub no_scripts: Option<bool>,
    pub format: Option<ResponseFormat>,
    pub fragment: Option<String>,
    pub elements: Option<String>,
    pub partial: Option<String>,
    pub title: Option<String>,
    /// Milliseconds.
    pub timeout_time: Option<u64>,
}

impl OptionOverrides {
    /// Overwrite every field of `options` this object sets.
    pub fn apply(&self, options: &mut NavigationOptions) {
        if let Some(push_state) = self.push_state {
            options.push_state = push_state;
        }
        if let Some(setting) = self.scroll_to_target {
            options.scroll_to_target = setting.into();
        }
        if let Some(speed) = self.scroll_speed {
            options.scroll_speed = Duration::from_millis(speed);
        }
        if let Some(insert) = self.insert {
            options.insertion = insert;
        }
        if let Some(no_scripts) = self.no_scripts {
            options.no_scripts = no_scripts;
        }
        if let Some(format) = self.format {
            options.format = format;
        }
        if let Some(fragment) = &self.fragment {
            options.fragment = Some(fragment.clone());
        }
        if let Some(elements) = &self.elements {
            options.elements = Some(elements.clone());
        }
        if let Some(partial) = &self.partial {
            options.partial = Some(partial.clone());
        }
        if let Some(title) = &self.title {
            options.title = Some(title.clone());
        }
        if let Some(timeout) = self.timeout_time {
            options.timeout = Duration::from_millis(timeout);
        }
    }
}
