//! The per-endpoint API caller.
//!
//! # Design
//! `ApiCaller::execute` renders the endpoint's templates, assembles one
//! request and drives it through an explicit attempt state machine:
//!
//! ```text
//! Attempting(0) --status < 500--------------------> Succeeded
//!      |        --5xx / network error, n < retries-> Attempting(n + 1)
//!      |        --5xx, retries exhausted-----------> Failed(server response)
//!      |        --network error, exhausted---------> Failed(status 0)
//!      |        --non-retryable error--------------> Failed(status 0)
//! ```
//!
//! The terminal state becomes a `CallResult` that is committed in one write,
//! handed to the `ResultSink`, and announced to listeners once. Nothing is
//! committed until a terminal state is reached, so dropping the future
//! mid-call leaves the previous result visible. Once a result is committed,
//! persisting and announcing it runs on a spawned task that finishes even
//! if the `execute` future is dropped; that task holds `call_lock` until the
//! listeners have run.
//!
//! Overlapping `execute` calls on one caller are serialized by `call_lock`.
//! The configuration is an `Arc` snapshot taken at the start of each call;
//! `reconfigure` swaps it without touching a call in flight.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tracing::{debug, error, info, warn};

use crate::config::EndpointConfig;
use crate::error::{StoreError, TransportError};
use crate::http::{HttpRequest, HttpResponse};
use crate::request::assemble_request;
use crate::result::CallResult;
use crate::template::{PassthroughRenderer, TemplateRenderer};
use crate::transport::{Transport, TransportPolicy, UreqTransport};

/// Callback invoked after every completed `execute`.
pub type Listener = Arc<dyn Fn() + Send + Sync>;

/// Receives each committed result, typically to persist it.
#[async_trait]
pub trait ResultSink: Send + Sync {
    async fn record(&self, endpoint_id: &str, result: &CallResult) -> Result<(), StoreError>;
}

/// Where an attempt sequence currently stands.
#[derive(Debug)]
enum AttemptState {
    Attempting(u32),
    Succeeded(HttpResponse),
    Failed(Failure),
}

/// Why an attempt sequence ended without success.
#[derive(Debug)]
enum Failure {
    /// Retries ran out on 5xx responses; the last one is still the result.
    ServerError(HttpResponse),
    /// Retries ran out on network errors.
    Exhausted(TransportError),
    /// An error that retrying cannot fix.
    Unrecoverable(TransportError),
}

pub struct ApiCaller {
    config: RwLock<Arc<EndpointConfig>>,
    renderer: Arc<dyn TemplateRenderer>,
    transport: Arc<dyn Transport>,
    sink: Option<Arc<dyn ResultSink>>,
    result: RwLock<Option<CallResult>>,
    listeners: RwLock<Vec<Listener>>,
    call_lock: Arc<tokio::sync::Mutex<()>>,
}

impl std::fmt::Debug for ApiCaller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiCaller")
            .field("endpoint_id", &self.endpoint_id())
            .field("result", &*self.result.read())
            .field("listeners", &self.listeners.read().len())
            .finish_non_exhaustive()
    }
}

impl ApiCaller {
    pub fn builder(config: EndpointConfig) -> ApiCallerBuilder {
        ApiCallerBuilder::new(config)
    }

    /// A caller with the default transport and a passthrough renderer.
    pub fn new(config: EndpointConfig) -> Self {
        Self::builder(config).build()
    }

    /// The configuration snapshot the next call will use.
    pub fn config(&self) -> Arc<EndpointConfig> {
        Arc::clone(&self.config.read())
    }

    pub fn endpoint_id(&self) -> String {
        self.config.read().id.clone()
    }

    pub fn endpoint_name(&self) -> String {
        self.config.read().name.clone()
    }

    /// Replace the configuration wholesale. A call in flight keeps its snapshot.
    pub fn reconfigure(&self, config: EndpointConfig) {
        *self.config.write() = Arc::new(config);
    }

    pub fn last_result(&self) -> Option<CallResult> {
        self.result.read().clone()
    }

    pub fn status_code(&self) -> Option<u16> {
        self.result.read().as_ref().map(|r| r.status_code)
    }

    pub fn fetched_at(&self) -> Option<DateTime<Utc>> {
        self.result.read().as_ref().map(|r| r.fetched_at)
    }

    pub fn body(&self) -> Option<String> {
        self.result.read().as_ref().map(|r| r.body.clone())
    }

    pub fn headers(&self) -> Option<BTreeMap<String, String>> {
        self.result.read().as_ref().map(|r| r.headers.clone())
    }

    pub fn truncated(&self) -> bool {
        self.result.read().as_ref().is_some_and(|r| r.truncated)
    }

    pub fn add_listener<F>(&self, listener: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.listeners.write().push(Arc::new(listener));
    }

    /// Call the endpoint, record the outcome and notify listeners.
    ///
    /// Never fails: every error becomes part of the recorded result.
    pub async fn execute(&self) {
        let serialized = Arc::clone(&self.call_lock).lock_owned().await;
        let config = self.config();

        let result = match self.run_attempts(&config).await {
            AttemptState::Succeeded(response) => {
                info!(endpoint = %config.name, status = response.status, "API call completed");
                CallResult::from_response(response, config.max_response_bytes)
            }
            AttemptState::Failed(Failure::ServerError(response)) => {
                error!(
                    endpoint = %config.name,
                    status = response.status,
                    attempts = total_attempts(config.retries),
                    "API call failed with server error after all attempts"
                );
                CallResult::from_response(response, config.max_response_bytes)
            }
            AttemptState::Failed(Failure::Exhausted(err)) => {
                error!(endpoint = %config.name, error = %err, "all retry attempts failed");
                CallResult::failure(err.to_string())
            }
            AttemptState::Failed(Failure::Unrecoverable(err)) => {
                error!(endpoint = %config.name, error = %err, "unexpected error calling API");
                CallResult::failure(err.to_string())
            }
            AttemptState::Attempting(_) => {
                CallResult::failure("attempt sequence ended without an outcome")
            }
        };

        if result.truncated {
            warn!(
                endpoint = %config.name,
                stored_bytes = result.body.len(),
                limit = config.max_response_bytes,
                "response body truncated"
            );
        }

        *self.result.write() = Some(result.clone());

        let sink = self.sink.clone();
        let listeners: Vec<Listener> = self.listeners.read().clone();
        let endpoint_id = config.id.clone();
        let endpoint_name = config.name.clone();
        let publish = tokio::spawn(async move {
            let _serialized = serialized;
            if let Some(sink) = sink {
                if let Err(err) = sink.record(&endpoint_id, &result).await {
                    warn!(endpoint = %endpoint_name, error = %err, "failed to persist call result");
                }
            }
            for listener in listeners {
                listener();
            }
        });
        if let Err(err) = publish.await {
            error!(endpoint = %config.name, error = %err, "publishing call result failed");
        }
    }

    async fn run_attempts(&self, config: &EndpointConfig) -> AttemptState {
        let request = assemble_request(config, self.renderer.as_ref());
        let policy = TransportPolicy::from(config);

        if !policy.verify_ssl {
            warn!(
                endpoint = %config.name,
                url = %request.url,
                "SSL verification disabled for this call, use with caution"
            );
        }
        debug!(
            endpoint = %config.name,
            method = %request.method,
            url = %request.url,
            timeout_secs = config.timeout_seconds,
            verify_ssl = policy.verify_ssl,
            retries = config.retries,
            "calling API"
        );

        let mut state = AttemptState::Attempting(0);
        while let AttemptState::Attempting(attempt) = state {
            state = self.attempt(config, &request, &policy, attempt).await;
        }
        state
    }

    async fn attempt(
        &self,
        config: &EndpointConfig,
        request: &HttpRequest,
        policy: &TransportPolicy,
        attempt: u32,
    ) -> AttemptState {
        let retries = config.retries;
        if attempt > 0 {
            info!(
                endpoint = %config.name,
                attempt,
                retries,
                delay_secs = config.retry_delay_seconds,
                "retrying API call"
            );
            tokio::time::sleep(config.retry_delay()).await;
        }

        let outcome = match tokio::time::timeout(policy.timeout, self.transport.send(request, policy)).await {
            Ok(outcome) => outcome,
            Err(_) => Err(TransportError::Timeout(policy.timeout)),
        };

        match outcome {
            Ok(response) if response.status < 500 => AttemptState::Succeeded(response),
            Ok(response) if attempt < retries => {
                warn!(endpoint = %config.name, status = response.status, attempt = attempt + 1, "server error, will retry");
                AttemptState::Attempting(attempt + 1)
            }
            Ok(response) => AttemptState::Failed(Failure::ServerError(response)),
            Err(err) if err.is_retryable() => {
                warn!(
                    endpoint = %config.name,
                    url = %request.url,
                    attempt = attempt.saturating_add(1),
                    of = total_attempts(retries),
                    error = %err,
                    "error calling API"
                );
                if attempt < retries {
                    AttemptState::Attempting(attempt + 1)
                } else {
                    AttemptState::Failed(Failure::Exhausted(err))
                }
            }
            Err(err) => AttemptState::Failed(Failure::Unrecoverable(err)),
        }
    }

}

/// Attempts made when every one of them fails.
fn total_attempts(retries: u32) -> u32 {
    retries.saturating_add(1)
}

/// Builder for [`ApiCaller`].
pub struct ApiCallerBuilder {
    config: EndpointConfig,
    renderer: Arc<dyn TemplateRenderer>,
    transport: Arc<dyn Transport>,
    sink: Option<Arc<dyn ResultSink>>,
    seed: Option<CallResult>,
}

impl ApiCallerBuilder {
    fn new(config: EndpointConfig) -> Self {
        Self {
            config,
            renderer: Arc::new(PassthroughRenderer),
            transport: Arc::new(UreqTransport),
            sink: None,
            seed: None,
        }
    }

    pub fn renderer(mut self, renderer: Arc<dyn TemplateRenderer>) -> Self {
        self.renderer = renderer;
        self
    }

    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = transport;
        self
    }

    pub fn sink(mut self, sink: Arc<dyn ResultSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Start from a previously stored result.
    pub fn seed(mut self, result: Option<CallResult>) -> Self {
        self.seed = result;
        self
    }

    pub fn build(self) -> ApiCaller {
        ApiCaller {
            config: RwLock::new(Arc::new(self.config)),
            renderer: self.renderer,
            transport: self.transport,
            sink: self.sink,
            result: RwLock::new(self.seed),
            listeners: RwLock::new(Vec::new()),
            call_lock: Arc::new(tokio::sync::Mutex::new(())),
        }
    }
}
