//! Stylesheet and script references carried by navigation responses.

use log::trace;
use serde::{Deserialize, Serialize};

use crate::fragment::{Fragment, Node};

/// Media query applied when a stylesheet does not name one.
pub const DEFAULT_MEDIA: &str = "all";

fn default_media() -> String {
    DEFAULT_MEDIA.to_owned()
}

/// A stylesheet to be linked from the document head.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StylesheetRef {
    pub url: String,
    #[serde(default = "default_media")]
    pub media: String,
}

impl StylesheetRef {
    /// Stylesheet applying to all media.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            media: default_media(),
        }
    }
}

/// A classic script referenced by URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptRef {
    pub url: String,
}

impl ScriptRef {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

/// Asset references removed from a fragment, in document order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractedAssets {
    pub stylesheets: Vec<StylesheetRef>,
    pub scripts: Vec<ScriptRef>,
}

/// Pull stylesheet links and local scripts out of `fragment`.
///
/// Every `<link rel="stylesheet">` is removed and, when it has an `href`, recorded.
/// `<script src>` elements are only removed when `is_local` accepts their URL; scripts
/// from other origins stay in the markup and are left to the document.
pub fn extract_assets(fragment: &Fragment, is_local: impl Fn(&str) -> bool) -> ExtractedAssets {
    let mut assets = ExtractedAssets::default();
    for node in fragment.elements() {
        match node.tag_name().as_deref() {
            Some("link") if is_stylesheet_link(&node) => {
                if let Some(url) = node.attr("href") {
                    let media = node
                        .attr("media")
                        .filter(|media| !media.trim().is_empty())
                        .unwrap_or_else(default_media);
                    assets.stylesheets.push(StylesheetRef { url, media });
                }
                fragment.remove(&node);
            }
            Some("script") => {
                let Some(url) = node.attr("src") else {
                    continue;
                };
                if is_local(&url) {
                    fragment.remove(&node);
                    assets.scripts.push(ScriptRef { url });
                } else {
                    trace!("Leaving cross-origin script {url} in content");
                }
            }
            _ => {}
        }
    }
    assets
}

fn is_stylesheet_link(node: &Node) -> bool {
    node.attr("rel").is_some_and(|rel| {
        rel.split_ascii_whitespace()
            .any(|token| token.eq_ignore_ascii_case("stylesheet"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stylesheet_media_defaults_to_all() {
        let fragment = Fragment::parse(
            r#"<link rel="stylesheet" href="/a.css"><link rel="stylesheet" href="/p.css" media="print"><p>x</p>"#,
        );
        let assets = extract_assets(&fragment, |_| true);
        assert_eq!(
            assets.stylesheets,
            vec![
                StylesheetRef::new("/a.css"),
                StylesheetRef {
                    url: "/p.css".to_owned(),
                    media: "print".to_owned()
                }
            ]
        );
        assert_eq!(fragment.to_html(), "<p>x</p>");
    }

    #[test]
    fn json_descriptor_without_media_uses_default() -> Result<(), serde_json::Error> {
        let parsed: StylesheetRef = serde_json::from_str(r#"{"url":"/x.css"}"#)?;
        assert_eq!(parsed.media, DEFAULT_MEDIA);
        Ok(())
    }
}
