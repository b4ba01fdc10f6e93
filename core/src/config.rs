//! Endpoint configuration records.
//!
//! # Design
//! An `EndpointConfig` is the fixed-shape record the configuration flow
//! produces. Optional fields carry serde defaults so hand-written JSON only
//! needs `name` and `url`. Validation happens once, when a record enters an
//! `EndpointSet` or a registry; callers never re-validate per call.
//!
//! Template-bearing fields (`url`, `headers`, `body` and the credentials)
//! hold raw templates. They are rendered at call time, not here.

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ConfigError;
use crate::http::HttpMethod;

pub const DEFAULT_TIMEOUT_SECONDS: u64 = 10;
pub const DEFAULT_VERIFY_SSL: bool = true;
pub const DEFAULT_MAX_RESPONSE_BYTES: usize = 10_240;
pub const DEFAULT_RETRIES: u32 = 0;
pub const DEFAULT_RETRY_DELAY_SECONDS: f64 = 1.0;
pub const DEFAULT_CONTENT_TYPE: &str = "application/json";

/// Authentication scheme applied to outgoing requests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthType {
    #[default]
    None,
    Basic,
    Bearer,
    ApiKey,
}

/// Identity and policy for one REST target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointConfig {
    #[serde(default)]
    pub id: String,
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub method: HttpMethod,
    #[serde(default)]
    pub headers: String,
    #[serde(default)]
    pub body: String,
    #[serde(default = "default_content_type")]
    pub content_type: String,
    #[serde(default)]
    pub auth_type: AuthType,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub bearer_token: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
    #[serde(default = "default_verify_ssl")]
    pub verify_ssl: bool,
    /// Upper bound on the stored body in bytes; `0` disables truncation.
    #[serde(default = "default_max_response_bytes")]
    pub max_response_bytes: usize,
    /// Additional attempts after the first one.
    #[serde(default)]
    pub retries: u32,
    #[serde(default = "default_retry_delay_seconds")]
    pub retry_delay_seconds: f64,
}

fn default_content_type() -> String {
    DEFAULT_CONTENT_TYPE.to_string()
}

fn default_timeout_seconds() -> u64 {
    DEFAULT_TIMEOUT_SECONDS
}

fn default_verify_ssl() -> bool {
    DEFAULT_VERIFY_SSL
}

fn default_max_response_bytes() -> usize {
    DEFAULT_MAX_RESPONSE_BYTES
}

fn default_retry_delay_seconds() -> f64 {
    DEFAULT_RETRY_DELAY_SECONDS
}

impl EndpointConfig {
    /// A GET endpoint with a fresh id and every policy at its default.
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            url: url.into(),
            method: HttpMethod::Get,
            headers: String::new(),
            body: String::new(),
            content_type: default_content_type(),
            auth_type: AuthType::None,
            username: String::new(),
            password: String::new(),
            bearer_token: String::new(),
            api_key: String::new(),
            timeout_seconds: DEFAULT_TIMEOUT_SECONDS,
            verify_ssl: DEFAULT_VERIFY_SSL,
            max_response_bytes: DEFAULT_MAX_RESPONSE_BYTES,
            retries: DEFAULT_RETRIES,
            retry_delay_seconds: DEFAULT_RETRY_DELAY_SECONDS,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_method(mut self, method: HttpMethod) -> Self {
        self.method = method;
        self
    }

    pub fn with_headers(mut self, headers: impl Into<String>) -> Self {
        self.headers = headers.into();
        self
    }

    pub fn with_body(mut self, body: impl Into<String>, content_type: impl Into<String>) -> Self {
        self.body = body.into();
        self.content_type = content_type.into();
        self
    }

    pub fn with_basic_auth(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.auth_type = AuthType::Basic;
        self.username = username.into();
        self.password = password.into();
        self
    }

    pub fn with_bearer_token(mut self, token: impl Into<String>) -> Self {
        self.auth_type = AuthType::Bearer;
        self.bearer_token = token.into();
        self
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.auth_type = AuthType::ApiKey;
        self.api_key = key.into();
        self
    }

    pub fn with_timeout_seconds(mut self, seconds: u64) -> Self {
        self.timeout_seconds = seconds;
        self
    }

    pub fn with_verify_ssl(mut self, verify: bool) -> Self {
        self.verify_ssl = verify;
        self
    }

    pub fn with_max_response_bytes(mut self, limit: usize) -> Self {
        self.max_response_bytes = limit;
        self
    }

    pub fn with_retries(mut self, retries: u32, delay_seconds: f64) -> Self {
        self.retries = retries;
        self.retry_delay_seconds = delay_seconds;
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    /// The pause before each retry. Invalid delays collapse to zero.
    pub fn retry_delay(&self) -> Duration {
        Duration::try_from_secs_f64(self.retry_delay_seconds).unwrap_or(Duration::ZERO)
    }

    /// Check field presence and ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.id.trim().is_empty() {
            return Err(ConfigError::MissingField("id"));
        }
        if self.name.trim().is_empty() {
            return Err(ConfigError::MissingField("name"));
        }
        if self.url.trim().is_empty() {
            return Err(ConfigError::MissingField("url"));
        }
        if self.timeout_seconds == 0 {
            return Err(ConfigError::InvalidField {
                field: "timeout_seconds",
                reason: "must be at least 1".to_string(),
            });
        }
        if !self.retry_delay_seconds.is_finite() || self.retry_delay_seconds < 0.0 {
            return Err(ConfigError::InvalidField {
                field: "retry_delay_seconds",
                reason: format!("must be a non-negative number, got {}", self.retry_delay_seconds),
            });
        }
        Ok(())
    }
}

/// A validated collection of endpoints with unique ids and names.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EndpointSet {
    endpoints: Vec<EndpointConfig>,
}

impl EndpointSet {
    /// Validate `endpoints`, assigning ids to records that have none.
    pub fn new(mut endpoints: Vec<EndpointConfig>) -> Result<Self, ConfigError> {
        let mut ids = HashSet::new();
        let mut names = HashSet::new();
        for endpoint in &mut endpoints {
            if endpoint.id.trim().is_empty() {
                endpoint.id = Uuid::new_v4().to_string();
            }
            endpoint.validate()?;
            if !ids.insert(endpoint.id.clone()) {
                return Err(ConfigError::DuplicateId(endpoint.id.clone()));
            }
            if !names.insert(endpoint.name.clone()) {
                return Err(ConfigError::DuplicateName(endpoint.name.clone()));
            }
        }
        Ok(Self { endpoints })
    }

    /// Parse and validate a `{ "endpoints": [...] }` document.
    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        let parsed: EndpointSet = serde_json::from_str(raw)?;
        Self::new(parsed.endpoints)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    pub fn to_json(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn get(&self, id: &str) -> Option<&EndpointConfig> {
        self.endpoints.iter().find(|e| e.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &EndpointConfig> {
        self.endpoints.iter()
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    pub fn into_vec(self) -> Vec<EndpointConfig> {
        self.endpoints
    }
}
