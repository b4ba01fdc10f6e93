//! Execution of a single HTTP attempt.
//!
//! # Design
//! `Transport` is the I/O seam: it takes a fully assembled `HttpRequest` and
//! returns the raw `HttpResponse`, with any status code treated as data. It
//! does not retry and does not truncate; those policies belong to the
//! caller. The default `UreqTransport` runs ureq on the blocking pool so the
//! async runtime is never stalled by network I/O.

use std::io::ErrorKind;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;
use ureq::tls::TlsConfig;
use ureq::typestate::{WithBody, WithoutBody};
use ureq::{Agent, RequestBuilder};

use crate::config::EndpointConfig;
use crate::error::TransportError;
use crate::http::{HttpMethod, HttpRequest, HttpResponse};

/// Per-call network policy taken from the endpoint configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportPolicy {
    pub timeout: Duration,
    pub verify_ssl: bool,
}

impl From<&EndpointConfig> for TransportPolicy {
    fn from(config: &EndpointConfig) -> Self {
        Self {
            timeout: config.timeout(),
            verify_ssl: config.verify_ssl,
        }
    }
}

/// Performs one network round-trip.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(
        &self,
        request: &HttpRequest,
        policy: &TransportPolicy,
    ) -> Result<HttpResponse, TransportError>;
}

/// `Transport` backed by a ureq agent built for each attempt's policy.
#[derive(Debug, Clone, Copy, Default)]
pub struct UreqTransport;

#[async_trait]
impl Transport for UreqTransport {
    async fn send(
        &self,
        request: &HttpRequest,
        policy: &TransportPolicy,
    ) -> Result<HttpResponse, TransportError> {
        let request = request.clone();
        let policy = *policy;
        tokio::task::spawn_blocking(move || execute_blocking(&request, &policy))
            .await
            .map_err(|e| TransportError::Internal(format!("transport worker failed: {e}")))?
    }
}

fn build_agent(policy: &TransportPolicy) -> Agent {
    let mut config = Agent::config_builder()
        .http_status_as_error(false)
        .timeout_global(Some(policy.timeout));
    if !policy.verify_ssl {
        config = config.tls_config(TlsConfig::builder().disable_verification(true).build());
    }
    config.build().new_agent()
}

fn execute_blocking(
    request: &HttpRequest,
    policy: &TransportPolicy,
) -> Result<HttpResponse, TransportError> {
    let agent = build_agent(policy);
    let headers = request.wire_headers();
    let url = request.url.as_str();
    let body = request.body.as_deref();

    debug!(method = %request.method, %url, "sending HTTP request");

    let result = match request.method {
        HttpMethod::Get => send_without_body(with_headers(agent.get(url), &headers), body),
        HttpMethod::Delete => send_without_body(with_headers(agent.delete(url), &headers), body),
        HttpMethod::Post => send_with_body(with_headers(agent.post(url), &headers), body),
        HttpMethod::Put => send_with_body(with_headers(agent.put(url), &headers), body),
        HttpMethod::Patch => send_with_body(with_headers(agent.patch(url), &headers), body),
    };
    let mut response = result.map_err(|e| classify(e, policy.timeout))?;

    let status = response.status().as_u16();
    let headers = response
        .headers()
        .iter()
        .map(|(name, value)| {
            (
                name.as_str().to_string(),
                String::from_utf8_lossy(value.as_bytes()).into_owned(),
            )
        })
        .collect();
    let bytes = response
        .body_mut()
        .with_config()
        .limit(u64::MAX)
        .read_to_vec()
        .map_err(|e| classify(e, policy.timeout))?;

    debug!(%status, bytes = bytes.len(), "received HTTP response");

    Ok(HttpResponse {
        status,
        headers,
        body: String::from_utf8_lossy(&bytes).into_owned(),
    })
}

fn with_headers<B>(mut builder: RequestBuilder<B>, headers: &[(String, String)]) -> RequestBuilder<B> {
    for (name, value) in headers {
        builder = builder.header(name.as_str(), value.as_str());
    }
    builder
}

fn send_without_body(
    builder: RequestBuilder<WithoutBody>,
    body: Option<&str>,
) -> Result<ureq::http::Response<ureq::Body>, ureq::Error> {
    match body {
        Some(body) => builder.force_send_body().send(body.as_bytes()),
        None => builder.call(),
    }
}

fn send_with_body(
    builder: RequestBuilder<WithBody>,
    body: Option<&str>,
) -> Result<ureq::http::Response<ureq::Body>, ureq::Error> {
    match body {
        Some(body) => builder.send(body.as_bytes()),
        None => builder.send_empty(),
    }
}

/// Sort a ureq failure into retryable network errors and request errors.
fn classify(err: ureq::Error, timeout: Duration) -> TransportError {
    match &err {
        ureq::Error::Timeout(_) => TransportError::Timeout(timeout),
        ureq::Error::HostNotFound | ureq::Error::ConnectionFailed => {
            TransportError::Connect(err.to_string())
        }
        ureq::Error::Io(io) => match io.kind() {
            ErrorKind::TimedOut => TransportError::Timeout(timeout),
            ErrorKind::ConnectionRefused
            | ErrorKind::ConnectionAborted
            | ErrorKind::NotConnected
            | ErrorKind::AddrNotAvailable => TransportError::Connect(err.to_string()),
            _ => TransportError::Io(err.to_string()),
        },
        ureq::Error::Tls(_) => TransportError::Tls(err.to_string()),
        ureq::Error::Protocol(_) => TransportError::Io(err.to_string()),
        _ => {
            let text = err.to_string();
            let lower = text.to_ascii_lowercase();
            if lower.contains("tls") || lower.contains("certificate") {
                TransportError::Tls(text)
            } else {
                TransportError::Request(text)
            }
        }
    }
}
