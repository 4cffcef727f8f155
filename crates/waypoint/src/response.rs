//! Normalization of navigation responses into a [`ResponseEnvelope`].
//!
//! Metadata comes from the body first (JSON format), then from the response headers,
//! then from the request itself.

use alloc::borrow::Cow;
use core::str;

use log::warn;
use serde::Deserialize;
use serde_json::{Map, Value};
use url::Url;
use waypoint_html::{Fragment, Node, ScriptRef, Selector, StylesheetRef, extract_assets};

use crate::error::NavigationError;
use crate::location::is_same_origin;
use crate::options::{NavigationOptions, ResponseFormat};
use crate::transport::{HEADER_DATA, HEADER_DISPLAY_URL, HEADER_PARTIAL, HEADER_TITLE, RawResponse};

/// A response reduced to what the engine acts on, independent of wire format.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ResponseEnvelope {
    /// Markup to insert, already narrowed.
    pub content: String,
    /// URL to record in history.
    pub display_url: String,
    pub title: Option<String>,
    /// Partial the server actually rendered.
    pub partial: Option<String>,
    pub data: Map<String, Value>,
    /// Stylesheets to load, in document order.
    pub stylesheets: Vec<StylesheetRef>,
    /// Scripts to load, in document order.
    pub scripts: Vec<ScriptRef>,
    /// The decoded JSON body, for JSON responses.
    pub payload: Option<Value>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct JsonBody {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    css: Vec<StylesheetRef>,
    #[serde(default)]
    js: Vec<ScriptRef>,
    #[serde(default)]
    display_url: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    partial_used: Option<String>,
    #[serde(default)]
    data: Option<Map<String, Value>>,
}

/// Build the envelope for a successful response to `request_url`.
///
/// `base` is the page location, used to tell local scripts from cross-origin ones in
/// HTML responses.
///
/// # Errors
/// [`NavigationError::MalformedResponse`] for undecodable JSON bodies and
/// [`NavigationError::InvalidSelector`] for narrowing selectors that do not parse.
pub fn normalize(
    raw: &RawResponse,
    request_url: &str,
    options: &NavigationOptions,
    base: &Url,
) -> Result<ResponseEnvelope, NavigationError> {
    let mut envelope = match options.format {
        ResponseFormat::Json => from_json(raw, options)?,
        ResponseFormat::Html => from_html(raw, options, base)?,
    };

    if envelope.display_url.is_empty() {
        envelope.display_url = raw
            .header(HEADER_DISPLAY_URL)
            .map_or_else(|| request_url.to_owned(), str::to_owned);
    }
    if envelope.title.is_none() {
        envelope.title = raw
            .header(HEADER_TITLE)
            .map(str::to_owned)
            .or_else(|| options.title.clone());
    }
    if envelope.partial.is_none() {
        envelope.partial = raw.header(HEADER_PARTIAL).map(str::to_owned);
    }
    let data_header = envelope
        .data
        .is_empty()
        .then(|| raw.header(HEADER_DATA))
        .flatten();
    if let Some(header) = data_header {
        match serde_json::from_str::<Map<String, Value>>(header) {
            Ok(data) => envelope.data = data,
            Err(err) => warn!("Ignoring malformed {HEADER_DATA} header: {err}"),
        }
    }
    Ok(envelope)
}

fn from_json(
    raw: &RawResponse,
    options: &NavigationOptions,
) -> Result<ResponseEnvelope, NavigationError> {
    let text = decode_text(&raw.body);
    let payload: Value = serde_json::from_str(&text)
        .map_err(|err| NavigationError::MalformedResponse(err.to_string()))?;
    let body = JsonBody::deserialize(&payload)
        .map_err(|err| NavigationError::MalformedResponse(err.to_string()))?;

    let raw_content = body.content.unwrap_or_default();
    let content = if applies_narrowing(options) {
        narrow(&Fragment::parse(&raw_content), options)?
    } else {
        raw_content
    };
    Ok(ResponseEnvelope {
        content,
        display_url: body.display_url.unwrap_or_default(),
        title: body.title,
        partial: body.partial_used,
        data: body.data.unwrap_or_default(),
        stylesheets: body.css,
        scripts: body.js,
        payload: Some(payload),
    })
}

fn from_html(
    raw: &RawResponse,
    options: &NavigationOptions,
    base: &Url,
) -> Result<ResponseEnvelope, NavigationError> {
    let text = String::from_utf8_lossy(&raw.body);
    let fragment = Fragment::parse(&text);
    let assets = extract_assets(&fragment, |url| is_same_origin(base, url));
    Ok(ResponseEnvelope {
        content: narrow(&fragment, options)?,
        stylesheets: assets.stylesheets,
        scripts: assets.scripts,
        ..ResponseEnvelope::default()
    })
}

/// Body text of a JSON response. Bodies that are not valid UTF-8 are re-read byte for
/// byte as ISO-8859-1: Latin-1 payloads come out right, anything else is garbled.
fn decode_text(body: &[u8]) -> Cow<'_, str> {
    match str::from_utf8(body) {
        Ok(text) => Cow::Borrowed(text),
        Err(err) => {
            warn!("Response body is not valid UTF-8 ({err}), decoding as ISO-8859-1");
            Cow::Owned(body.iter().copied().map(char::from).collect())
        }
    }
}

fn applies_narrowing(options: &NavigationOptions) -> bool {
    options.filter.is_some() || options.elements.is_some() || options.fragment.is_some()
}

fn parse_selector(selector: &str) -> Result<Selector, NavigationError> {
    Selector::parse(selector).map_err(|err| {
        warn!("{err}");
        NavigationError::InvalidSelector(selector.to_owned())
    })
}

/// Apply the custom filter, the element selector or the fragment selector, in that
/// order of precedence. Without any of them the whole fragment is kept.
fn narrow(fragment: &Fragment, options: &NavigationOptions) -> Result<String, NavigationError> {
    if let Some(filter) = &options.filter {
        return Ok(filter(fragment));
    }
    if let Some(elements) = &options.elements {
        let selector = parse_selector(elements)?;
        return Ok(fragment
            .filter_or_find(&selector)
            .iter()
            .map(Node::outer_html)
            .collect());
    }
    if let Some(wanted) = &options.fragment {
        let selector = parse_selector(wanted)?;
        return Ok(fragment
            .filter_or_find(&selector)
            .first()
            .map(Node::inner_html)
            .unwrap_or_default());
    }
    Ok(fragment.to_html())
}
