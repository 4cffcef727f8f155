//! Engine-wide navigation defaults.
//!
//! Defaults can be loaded from environment variables or constructed programmatically.
//! Every navigation starts from these values before per-call options are applied.

use core::time::Duration;
use std::env;

use crate::options::ResponseFormat;

/// Selector of the container replaced when a navigation names no target.
pub const DEFAULT_TARGET: &str = "#content";
/// Time allowed for a navigation response before the request is abandoned.
pub const DEFAULT_TIMEOUT_MS: u64 = 60_000;
/// Duration of the scroll animation run after insertion.
pub const DEFAULT_SCROLL_SPEED_MS: u64 = 200;

/// Navigation defaults shared by every request issued through one navigator.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NavigatorConfig {
    /// Selector used when a navigation does not name a target container
    pub default_target: String,
    /// Response format requested from the server
    pub format: ResponseFormat,
    /// Request timeout in milliseconds; zero disables the timeout
    pub timeout_ms: u64,
    /// Scroll animation duration in milliseconds
    pub scroll_speed_ms: u64,
    /// Partial requested when none is given explicitly
    pub default_partial: Option<String>,
}

impl Default for NavigatorConfig {
    #[inline]
    fn default() -> Self {
        Self {
            default_target: DEFAULT_TARGET.to_owned(),
            format: ResponseFormat::Json,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            scroll_speed_ms: DEFAULT_SCROLL_SPEED_MS,
            default_partial: None,
        }
    }
}

impl NavigatorConfig {
    /// Load configuration from environment variables.
    ///
    /// Reads the following environment variables:
    /// - `WAYPOINT_TARGET`: Default target selector (default: `#content`)
    /// - `WAYPOINT_FORMAT`: `html` or `json` (default: `json`)
    /// - `WAYPOINT_TIMEOUT_MS`: Request timeout, `0` disables it (default: 60000)
    /// - `WAYPOINT_SCROLL_SPEED_MS`: Scroll animation duration (default: 200)
    /// - `WAYPOINT_PARTIAL`: Partial requested by default (default: none)
    ///
    /// Unparseable values fall back to their defaults.
    ///
    /// # Returns
    ///
    /// A new `NavigatorConfig` populated from environment variables
    #[inline]
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_vars(|name| env::var(name).ok())
    }

    fn from_vars(var: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let default_target = var("WAYPOINT_TARGET")
            .filter(|val| !val.trim().is_empty())
            .unwrap_or(defaults.default_target);
        let format = var("WAYPOINT_FORMAT")
            .and_then(|val| val.parse::<ResponseFormat>().ok())
            .unwrap_or(defaults.format);
        let timeout_ms = var("WAYPOINT_TIMEOUT_MS")
            .and_then(|val| val.parse::<u64>().ok())
            .unwrap_or(defaults.timeout_ms);
        let scroll_speed_ms = var("WAYPOINT_SCROLL_SPEED_MS")
            .and_then(|val| val.parse::<u64>().ok())
            .unwrap_or(defaults.scroll_speed_ms);
        let default_partial = var("WAYPOINT_PARTIAL").filter(|val| !val.trim().is_empty());
        Self {
            default_target,
            format,
            timeout_ms,
            scroll_speed_ms,
            default_partial,
        }
    }

    /// Request timeout as a `Duration`.
    #[inline]
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Scroll animation duration as a `Duration`.
    #[inline]
    #[must_use]
    pub const fn scroll_speed(&self) -> Duration {
        Duration::from_millis(self.scroll_speed_ms)
    }
}
