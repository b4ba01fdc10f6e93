//! Error types for the endpoint caller.
//!
//! # Design
//! Errors are split by the seam they cross. `ConfigError` is raised at the
//! configuration boundary and never during a call. `RenderError` and
//! `TransportError` are produced during a call but never escape
//! `ApiCaller::execute`; they are folded into the recorded `CallResult`.
//! `StoreError` and `RegistryError` belong to the owner of the callers.

use std::time::Duration;

use thiserror::Error;

/// A configuration record or document was rejected.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required field is empty.
    #[error("endpoint field `{0}` is required")]
    MissingField(&'static str),

    /// A field holds a value outside its allowed range.
    #[error("endpoint field `{field}` is invalid: {reason}")]
    InvalidField { field: &'static str, reason: String },

    /// Two endpoints in one collection share an id.
    #[error("duplicate endpoint id `{0}`")]
    DuplicateId(String),

    /// Two endpoints in one collection share a display name.
    #[error("duplicate endpoint name `{0}`")]
    DuplicateName(String),

    /// The endpoints document is not valid JSON for the expected shape.
    #[error("failed to parse endpoints document: {0}")]
    Parse(#[from] serde_json::Error),

    /// The endpoints document could not be read.
    #[error("failed to read endpoints document: {0}")]
    Io(#[from] std::io::Error),
}

/// A template string could not be evaluated.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RenderError {
    /// An opening `{{` without a well-formed placeholder after it.
    #[error("malformed template expression at byte {offset}")]
    Malformed { offset: usize },

    /// A placeholder names a variable the renderer does not know.
    #[error("unknown template variable `{0}`")]
    UnknownVariable(String),
}

/// A single attempt failed without producing an HTTP response.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// The attempt exceeded its deadline.
    #[error("request timed out after {}s", .0.as_secs_f64())]
    Timeout(Duration),

    /// The host could not be resolved or the connection was refused.
    #[error("connection failed: {0}")]
    Connect(String),

    /// TLS negotiation or certificate validation failed.
    #[error("TLS error: {0}")]
    Tls(String),

    /// The connection broke while sending or receiving.
    #[error("I/O error: {0}")]
    Io(String),

    /// The request itself is unusable (bad URL, invalid header, protocol misuse).
    #[error("invalid request: {0}")]
    Request(String),

    /// The transport failed in a way that says nothing about the remote end.
    #[error("internal transport failure: {0}")]
    Internal(String),
}

impl TransportError {
    /// Whether another attempt may succeed where this one failed.
    ///
    /// Network-level failures are retryable; malformed requests and internal
    /// faults are not, since repeating them cannot change the outcome.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            TransportError::Timeout(_)
                | TransportError::Connect(_)
                | TransportError::Tls(_)
                | TransportError::Io(_)
        )
    }
}

/// The result store could not be read or written.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("result store I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("result store data is not valid JSON: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Errors surfaced by `EndpointRegistry` operations.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("no endpoint with id `{0}`")]
    UnknownEndpoint(String),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Store(#[from] StoreError),
}
