//! Execution engine for configured REST endpoints.
//!
//! # Overview
//! Each endpoint is described by an `EndpointConfig` (URL, method, headers,
//! body, authentication and call policy). An `ApiCaller` owns one endpoint's
//! last `CallResult` and, on `execute()`, renders templates, assembles the
//! request, runs it under the retry/timeout/SSL policy, truncates oversized
//! bodies and notifies listeners.
//!
//! # Design
//! - Requests and responses are plain data (`HttpRequest`/`HttpResponse`);
//!   network I/O sits behind the `Transport` trait.
//! - Template evaluation sits behind `TemplateRenderer`; persistence behind
//!   `ResultStore`. Both are supplied by the host.
//! - `EndpointRegistry` owns a set of callers and persists all their results
//!   after every call.
//! - `execute()` never fails. Errors surface only as recorded results and
//!   log entries.

pub mod auth;
pub mod caller;
pub mod config;
pub mod error;
pub mod headers;
pub mod http;
pub mod registry;
pub mod request;
pub mod result;
pub mod store;
pub mod template;
pub mod transport;
pub mod truncate;

pub use caller::{ApiCaller, ApiCallerBuilder, Listener, ResultSink};
pub use config::{AuthType, EndpointConfig, EndpointSet};
pub use error::{ConfigError, RegistryError, RenderError, StoreError, TransportError};
pub use http::{BasicAuth, HttpMethod, HttpRequest, HttpResponse};
pub use registry::{BatchPersister, EndpointRegistry};
pub use result::CallResult;
pub use store::{JsonFileStore, MemoryStore, ResultStore, StoredResults};
pub use template::{PassthroughRenderer, TemplateRenderer, VariableRenderer};
pub use transport::{Transport, TransportPolicy, UreqTransport};
