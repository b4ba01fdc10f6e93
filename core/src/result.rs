//! The last observed outcome of an endpoint call.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::http::HttpResponse;
use crate::truncate::truncate_body;

/// Status code recorded when no HTTP response was received.
pub const FAILED_STATUS: u16 = 0;

/// One committed call outcome. All fields are replaced together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallResult {
    pub status_code: u16,
    pub fetched_at: DateTime<Utc>,
    pub body: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub truncated: bool,
}

impl CallResult {
    /// Record a received response, applying the body size limit.
    pub fn from_response(response: HttpResponse, max_response_bytes: usize) -> Self {
        let HttpResponse {
            status,
            headers,
            body,
        } = response;
        let body = truncate_body(body, max_response_bytes);
        Self {
            status_code: status,
            fetched_at: Utc::now(),
            body: body.body,
            headers: headers.into_iter().collect(),
            truncated: body.truncated,
        }
    }

    /// Record a call that ended without a response.
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            status_code: FAILED_STATUS,
            fetched_at: Utc::now(),
            body: message.into(),
            headers: BTreeMap::new(),
            truncated: false,
        }
    }

    pub fn is_failure(&self) -> bool {
        self.status_code == FAILED_STATUS
    }
}
