use std::collections::BTreeMap;
use std::fmt;

use reqwest::StatusCode;
use serde::de::DeserializeOwned;

/// Status message used when the transport reports none.
pub const STATUS_MESSAGE_NOT_SET: &str = "Not set";

/// Header map ordered by name.
///
/// Names are stored exactly as supplied; [`Headers::get`] falls back to a
/// case-insensitive match as HTTP requires.
#[derive(Clone, Default, Eq, PartialEq)]
pub struct Headers(BTreeMap<String, String>);

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.0.insert(name.into(), value.into())
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        if let Some(value) = self.0.get(name) {
            return Some(value);
        }
        self.0
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Headers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.0.iter()).finish()
    }
}

impl<K, V> FromIterator<(K, V)> for Headers
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

impl<K, V, const N: usize> From<[(K, V); N]> for Headers
where
    K: Into<String>,
    V: Into<String>,
{
    fn from(pairs: [(K, V); N]) -> Self {
        pairs.into_iter().collect()
    }
}

/// One logical HTTP request. Immutable once handed to a dispatcher.
#[derive(Clone, PartialEq, Eq)]
pub struct Request {
    pub method: String,
    pub uri: String,
    pub body: Vec<u8>,
    pub headers: Headers,
}

impl Request {
    pub fn new(method: impl Into<String>, uri: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            uri: uri.into(),
            body: Vec::new(),
            headers: Headers::new(),
        }
    }

    pub fn get(uri: impl Into<String>) -> Self {
        Self::new("GET", uri)
    }

    pub fn post(uri: impl Into<String>) -> Self {
        Self::new("POST", uri)
    }

    pub fn put(uri: impl Into<String>) -> Self {
        Self::new("PUT", uri)
    }

    pub fn delete(uri: impl Into<String>) -> Self {
        Self::new("DELETE", uri)
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let header_names: Vec<&str> = self.headers.iter().map(|(name, _)| name).collect();
        f.debug_struct("Request")
            .field("method", &self.method)
            .field("uri", &self.uri)
            .field("body_len", &self.body.len())
            .field("headers", &header_names)
            .finish()
    }
}

/// Response payload after normalization.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum Body {
    /// The server sent no payload.
    #[default]
    Empty,
    /// The payload parsed as JSON.
    Json(serde_json::Value),
    /// The payload did not parse; kept verbatim.
    Text(String),
}

impl Body {
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    pub fn as_json(&self) -> Option<&serde_json::Value> {
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
}

/// Canonical record of one HTTP response.
#[derive(Clone, Debug, PartialEq)]
pub struct Response {
    /// `0` when the transport did not report a status.
    pub status_code: u16,
    pub status_message: String,
    pub headers: Headers,
    pub body: Body,
}

impl Default for Response {
    fn default() -> Self {
        Self {
            status_code: 0,
            status_message: STATUS_MESSAGE_NOT_SET.to_owned(),
            headers: Headers::new(),
            body: Body::Empty,
        }
    }
}

impl Response {
    /// Typed status, `None` for the `0` sentinel or other out-of-range values.
    pub fn status(&self) -> Option<StatusCode> {
        StatusCode::from_u16(self.status_code).ok()
    }

    pub fn is_success(&self) -> bool {
        self.status().is_some_and(|status| status.is_success())
    }

    /// Deserializes a JSON body into `T`.
    ///
    /// Text and empty bodies are reported as a serde error rather than being
    /// re-parsed.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        match &self.body {
            Body::Json(value) => T::deserialize(value),
            Body::Text(text) => serde_json::from_str(text),
            Body::Empty => serde_json::from_str(""),
        }
    }
}
