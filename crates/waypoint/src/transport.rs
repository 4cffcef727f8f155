//! Request transport and signaling headers.

use core::fmt;

use bytes::Bytes;
use futures::future::LocalBoxFuture;
use log::trace;
use reqwest::Client;
use tokio::fs::read as tokio_fs_read;
use url::Url;

use crate::error::TransportError;

/// Marks a request as issued by the navigation engine.
pub const HEADER_NAVIGATION: &str = "X-Waypoint";
/// Requested wire format, `html` or `json`.
pub const HEADER_FORMAT: &str = "X-Waypoint-Format";
/// Selector of the fragment the client will keep.
pub const HEADER_FRAGMENT: &str = "X-Waypoint-Fragment";
/// Partial requested by the client, or the partial the server rendered.
pub const HEADER_PARTIAL: &str = "X-Waypoint-Partial";
/// URL to show in the address bar instead of the request URL.
pub const HEADER_DISPLAY_URL: &str = "X-Waypoint-Display-URL";
/// Page title for the new content.
pub const HEADER_TITLE: &str = "X-Waypoint-Title";
/// JSON object of extra data for the client.
pub const HEADER_DATA: &str = "X-Waypoint-Data";

/// A GET request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireRequest {
    pub url: Url,
    pub headers: Vec<(&'static str, String)>,
}

impl WireRequest {
    /// Plain GET without signaling headers.
    #[inline]
    #[must_use]
    pub const fn get(url: Url) -> Self {
        Self {
            url,
            headers: Vec::new(),
        }
    }

    /// Value of the header `name`, compared case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// Response as received, before any interpretation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub status: u16,
    /// Header names are stored lowercase.
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

impl RawResponse {
    /// `200 OK` with `body` and no headers.
    pub fn ok(body: impl Into<Bytes>) -> Self {
        Self {
            status: 200,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    #[must_use]
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.push((name.to_ascii_lowercase(), value.into()));
        self
    }

    #[inline]
    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }

    /// Value of the header `name`, compared case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// Something that can answer a [`WireRequest`].
///
/// Dropping the returned future aborts the request.
pub trait Transport {
    fn send(&self, request: WireRequest) -> LocalBoxFuture<'static, Result<RawResponse, TransportError>>;
}

/// Transport backed by `reqwest` for `http`/`https` and the filesystem for `file` URLs.
#[derive(Debug, Clone, Default)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    #[inline]
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

fn request_error(url: &Url, reason: &impl fmt::Display) -> TransportError {
    TransportError::Request {
        url: url.to_string(),
        reason: reason.to_string(),
    }
}

impl Transport for HttpTransport {
    fn send(&self, request: WireRequest) -> LocalBoxFuture<'static, Result<RawResponse, TransportError>> {
        let client = self.client.clone();
        Box::pin(async move {
            let url = request.url;
            match url.scheme() {
                "http" | "https" => {
                    let mut builder = client.get(url.clone());
                    for (name, value) in &request.headers {
                        builder = builder.header(*name, value.as_str());
                    }
                    let response = builder.send().await.map_err(|err| request_error(&url, &err))?;
                    let status = response.status().as_u16();
                    let headers = response
                        .headers()
                        .iter()
                        .filter_map(|(name, value)| {
                            value
                                .to_str()
                                .ok()
                                .map(|text| (name.as_str().to_owned(), text.to_owned()))
                        })
                        .collect();
                    let body = response.bytes().await.map_err(|err| request_error(&url, &err))?;
                    trace!("Fetched {url}: {status}, {} bytes", body.len());
                    Ok(RawResponse {
                        status,
                        headers,
                        body,
                    })
                }
                "file" => {
                    let path = url
                        .to_file_path()
                        .map_err(|()| request_error(&url, &"invalid file path"))?;
                    let data = tokio_fs_read(path)
                        .await
                        .map_err(|err| request_error(&url, &err))?;
                    Ok(RawResponse::ok(data))
                }
                other => Err(TransportError::UnsupportedScheme(other.to_owned())),
            }
        })
    }
}
