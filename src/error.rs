use std::error::Error as StdError;

/// Machine-readable transport error codes.
///
/// The first group is the default retriable set; the rest are produced by
/// [`ReqwestTransport`](crate::ReqwestTransport) for failures that are never
/// worth repeating.
pub mod codes {
    pub const ETIMEDOUT: &str = "ETIMEDOUT";
    pub const ECONNRESET: &str = "ECONNRESET";
    pub const ENOTFOUND: &str = "ENOTFOUND";
    pub const ESOCKETTIMEDOUT: &str = "ESOCKETTIMEDOUT";
    pub const ECONNREFUSED: &str = "ECONNREFUSED";
    pub const EHOSTUNREACH: &str = "EHOSTUNREACH";
    pub const EPIPE: &str = "EPIPE";
    pub const EAI_AGAIN: &str = "EAI_AGAIN";

    pub const EINVALIDMETHOD: &str = "EINVALIDMETHOD";
    pub const EINVALIDREQUEST: &str = "EINVALIDREQUEST";
    pub const EDECODE: &str = "EDECODE";
    pub const EUNKNOWN: &str = "EUNKNOWN";

    /// Codes retried when no override is configured.
    pub const DEFAULT_RETRIABLE: [&str; 8] = [
        ETIMEDOUT,
        ECONNRESET,
        ENOTFOUND,
        ESOCKETTIMEDOUT,
        ECONNREFUSED,
        EHOSTUNREACH,
        EPIPE,
        EAI_AGAIN,
    ];
}

/// Error raised when a physical HTTP exchange fails below the HTTP layer.
///
/// HTTP statuses, including 4xx and 5xx, are never reported through this
/// type; they come back as a [`Response`](crate::Response).
#[derive(Debug, thiserror::Error)]
#[error("transport error {code}: {message}")]
pub struct TransportError {
    code: String,
    message: String,
    #[source]
    source: Option<Box<dyn StdError + Send + Sync>>,
}

impl TransportError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            source: None,
        }
    }

    /// Attaches the underlying error, keeping it reachable via `source()`.
    pub fn with_source(mut self, source: impl StdError + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn is_timeout(&self) -> bool {
        self.code == codes::ETIMEDOUT || self.code == codes::ESOCKETTIMEDOUT
    }
}
