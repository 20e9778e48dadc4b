use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Method};

use crate::{codes, Request, TransportError, TransportOptions};

/// Unprocessed result of one HTTP exchange, before normalization.
///
/// Fields are optional because not every transport can report all of them.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RawResponse {
    pub status_code: Option<u16>,
    pub status_message: Option<String>,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

/// Performs a single physical HTTP exchange.
///
/// Implementations must not retry on their own; the dispatcher owns that
/// decision. Non-2xx statuses are successes at this layer.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: &Request) -> Result<RawResponse, TransportError>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    async fn send(&self, request: &Request) -> Result<RawResponse, TransportError> {
        (**self).send(request).await
    }
}

/// [`Transport`] backed by a pooled `reqwest::Client`.
#[derive(Clone)]
pub struct ReqwestTransport {
    http: reqwest::Client,
    options: TransportOptions,
}

impl fmt::Debug for ReqwestTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReqwestTransport")
            .field("options", &self.options)
            .finish()
    }
}

impl Default for ReqwestTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl ReqwestTransport {
    pub fn new() -> Self {
        Self::from_client(reqwest::Client::new())
    }

    /// Reuses an existing client, and with it its connection pool.
    pub fn from_client(http: reqwest::Client) -> Self {
        Self {
            http,
            options: TransportOptions::default(),
        }
    }

    pub fn with_options(mut self, options: TransportOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> &TransportOptions {
        &self.options
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: &Request) -> Result<RawResponse, TransportError> {
        let method = Method::from_bytes(request.method.as_bytes()).map_err(|err| {
            TransportError::new(
                codes::EINVALIDMETHOD,
                format!("invalid HTTP method '{}'", request.method),
            )
            .with_source(err)
        })?;

        let mut builder = self.http.request(method, &request.uri);
        if !request.headers.contains(header::USER_AGENT.as_str()) {
            builder = builder.header(header::USER_AGENT, &self.options.user_agent);
        }
        for (name, value) in request.headers.iter() {
            builder = builder.header(name, value);
        }
        if !request.body.is_empty() {
            builder = builder.body(request.body.clone());
        }
        if let Some(timeout_ms) = self.options.timeout_ms {
            builder = builder.timeout(Duration::from_millis(timeout_ms));
        }

        let response = builder.send().await.map_err(from_reqwest)?;

        let status = response.status();
        let headers = collect_headers(response.headers());
        let body = response.text().await.map_err(from_reqwest)?;

        Ok(RawResponse {
            status_code: Some(status.as_u16()),
            status_message: status.canonical_reason().map(str::to_owned),
            headers,
            body: (!body.is_empty()).then_some(body),
        })
    }
}

/// Flattens repeated header values into one comma-separated entry.
fn collect_headers(map: &header::HeaderMap) -> Vec<(String, String)> {
    let mut headers: Vec<(String, String)> = Vec::with_capacity(map.keys_len());
    for name in map.keys() {
        let value = map
            .get_all(name)
            .iter()
            .map(|value| String::from_utf8_lossy(value.as_bytes()).into_owned())
            .collect::<Vec<_>>()
            .join(", ");
        headers.push((name.as_str().to_owned(), value));
    }
    headers
}

fn from_reqwest(err: reqwest::Error) -> TransportError {
    let code = reqwest_error_code(&err);
    TransportError::new(code, err.to_string()).with_source(err)
}

fn reqwest_error_code(err: &reqwest::Error) -> &'static str {
    if err.is_timeout() {
        return codes::ETIMEDOUT;
    }
    if let Some(code) = io_error_code(err) {
        return code;
    }
    if err.is_connect() {
        if mentions_dns(err) {
            return codes::ENOTFOUND;
        }
        return codes::ECONNREFUSED;
    }
    if err.is_body() {
        return codes::ECONNRESET;
    }
    if err.is_builder() {
        return codes::EINVALIDREQUEST;
    }
    if err.is_decode() {
        return codes::EDECODE;
    }
    codes::EUNKNOWN
}

fn io_error_code(err: &(dyn StdError + 'static)) -> Option<&'static str> {
    use std::io::ErrorKind;

    let mut current = err.source();
    while let Some(cause) = current {
        if let Some(io) = cause.downcast_ref::<std::io::Error>() {
            match io.kind() {
                ErrorKind::ConnectionReset | ErrorKind::ConnectionAborted => {
                    return Some(codes::ECONNRESET)
                }
                ErrorKind::ConnectionRefused => return Some(codes::ECONNREFUSED),
                ErrorKind::BrokenPipe => return Some(codes::EPIPE),
                ErrorKind::TimedOut => return Some(codes::ETIMEDOUT),
                _ => {}
            }
        }
        current = cause.source();
    }
    None
}

fn mentions_dns(err: &(dyn StdError + 'static)) -> bool {
    let mut current: Option<&(dyn StdError + 'static)> = Some(err);
    while let Some(cause) = current {
        if cause.to_string().to_ascii_lowercase().contains("dns error") {
            return true;
        }
        current = cause.source();
    }
    false
}
