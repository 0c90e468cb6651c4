//! HTTP request and response types seen by hosted handlers.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

/// Base every simulated request URL is resolved against.
pub const LOCAL_ORIGIN: &str = "http://localhost/";

/// HTTP request method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    #[default]
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Head,
    Options,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
            Self::Head => "HEAD",
            Self::Options => "OPTIONS",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(Self::Get),
            "POST" => Ok(Self::Post),
            "PUT" => Ok(Self::Put),
            "PATCH" => Ok(Self::Patch),
            "DELETE" => Ok(Self::Delete),
            "HEAD" => Ok(Self::Head),
            "OPTIONS" => Ok(Self::Options),
            other => Err(format!("unsupported method '{other}'")),
        }
    }
}

// =============================================================================
// Request
// =============================================================================

/// The body of a request.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum RequestBody {
    #[default]
    Empty,
    Text(String),
    Json(Value),
}

impl RequestBody {
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Self::Json(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }

    /// The body as it would travel over the wire.
    pub fn to_wire(&self) -> Option<String> {
        match self {
            Self::Empty => None,
            Self::Text(text) => Some(text.clone()),
            Self::Json(value) => Some(value.to_string()),
        }
    }
}

/// A request URL resolved against [`LOCAL_ORIGIN`].
///
/// Resolution follows the WHATWG URL rules: dot segments are removed and
/// characters outside the URL code points are percent-encoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestUrl {
    url: Url,
}

impl RequestUrl {
    /// Resolves a relative `uri` (no leading slash) against [`LOCAL_ORIGIN`].
    pub fn local(uri: &str) -> Result<Self, url::ParseError> {
        let url = Url::parse(&format!("{LOCAL_ORIGIN}{uri}"))?;
        Ok(Self { url })
    }

    /// The full, normalized URL.
    pub fn href(&self) -> &str {
        self.url.as_str()
    }

    /// The path without leading slash, query or fragment.
    pub fn path(&self) -> &str {
        let path = self.url.path();
        path.strip_prefix('/').unwrap_or(path)
    }

    /// The raw query string, without `?`.
    pub fn query(&self) -> Option<&str> {
        self.url.query()
    }

    /// The path segment at `index`, counting from zero. Segments stay
    /// percent-encoded.
    pub fn path_step_at(&self, index: usize) -> Option<&str> {
        self.url
            .path_segments()?
            .nth(index)
            .filter(|s| !s.is_empty())
    }

    /// All decoded query parameters in order.
    pub fn search_params(&self) -> Vec<(String, String)> {
        self.url
            .query_pairs()
            .map(|(key, value)| (key.into_owned(), value.into_owned()))
            .collect()
    }

    /// The first decoded value of the query parameter `name`.
    pub fn search_param(&self, name: &str) -> Option<String> {
        self.url
            .query_pairs()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.into_owned())
    }
}

impl fmt::Display for RequestUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.href())
    }
}

/// An inbound HTTP request.
#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    pub url: RequestUrl,
    /// Header names are lower-cased.
    pub headers: BTreeMap<String, String>,
    pub body: RequestBody,
}

impl Request {
    /// Builds a request, lower-casing header names.
    pub fn new(
        method: Method,
        url: RequestUrl,
        headers: impl IntoIterator<Item = (String, String)>,
        body: RequestBody,
    ) -> Self {
        Self {
            method,
            url,
            headers: headers
                .into_iter()
                .map(|(k, v)| (k.to_ascii_lowercase(), v))
                .collect(),
            body,
        }
    }

    /// Looks up a header case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }
}

// =============================================================================
// Response
// =============================================================================

/// A response produced by a handler, or by the host on its behalf.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    pub body: Option<String>,
}

impl Default for Response {
    fn default() -> Self {
        Self::ok()
    }
}

impl Response {
    /// An empty `200` response.
    pub fn ok() -> Self {
        Self {
            status: 200,
            headers: BTreeMap::new(),
            body: None,
        }
    }

    /// A `200` response with a JSON body.
    pub fn json<T: Serialize + ?Sized>(body: &T) -> serde_json::Result<Self> {
        Ok(Self::ok().with_body(serde_json::to_string(body)?))
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers
            .insert(name.into().to_ascii_lowercase(), value.into());
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }
}

// =============================================================================
// Client Info
// =============================================================================

/// What the host knows about the caller.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ClientInfo {
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub correlation_id: Option<String>,
}

impl ClientInfo {
    /// Extracts client details from (lower-cased) request headers.
    pub fn from_headers(headers: &BTreeMap<String, String>) -> Self {
        Self {
            ip: headers
                .get("x-forwarded-for")
                .and_then(|v| v.split(',').next())
                .map(|v| v.trim().to_string()),
            user_agent: headers.get("user-agent").cloned(),
            correlation_id: headers.get("x-request-id").cloned(),
        }
    }
}
