//! `resilient-http` sends one logical HTTP request and transparently retries
//! it when the outcome is transient.
//!
//! - [`Dispatcher::dispatch`] runs the attempt loop over any [`Transport`].
//! - [`ReqwestTransport`] is the bundled transport.
//! - [`RetryConfig`] selects the retriable statuses and error codes, the
//!   attempt budget and the base backoff.
//!
//! HTTP statuses are always returned as [`Response`] data; only transport
//! failures surface as [`TransportError`].

mod client;
mod error;
mod normalize;
mod options;
mod policy;
mod transport;
mod types;

pub use client::{sleep_for, Dispatcher};
pub use error::{codes, TransportError};
pub use normalize::normalize;
pub use options::{RetryConfig, TransportOptions};
pub use policy::{classify, next_backoff, should_retry, Classification, Outcome, RetryDecision};
pub use transport::{RawResponse, ReqwestTransport, Transport};
pub use types::{Body, Headers, Request, Response, STATUS_MESSAGE_NOT_SET};

pub type Result<T> = std::result::Result<T, TransportError>;
