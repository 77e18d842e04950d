// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Single outbound call: header injection, execution, and outcome
//! classification. Holds no session state of its own.

use std::sync::Arc;

use parking_lot::RwLock;
use reqwest::header::RETRY_AFTER;
use reqwest::{Client, Method};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::config::SessionConfig;
use crate::token::TokenStore;

/// Maximum number of error body characters surfaced in messages.
const MAX_MESSAGE_CHARS: usize = 200;

/// An outbound API call, described independently of the transport.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub body: Option<Value>,
    pub headers: Vec<(String, String)>,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self { method, path: path.into(), body: None, headers: Vec::new() }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self::new(Method::POST, path).with_body(body)
    }

    pub fn post_empty(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: impl Into<String>, body: Value) -> Self {
        Self::new(Method::PUT, path).with_body(body)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

/// Status and decoded body of a completed call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiResponse {
    pub status: u16,
    /// JSON body; non-JSON text is kept as a string, empty bodies are `null`.
    pub body: Value,
}

impl ApiResponse {
    /// Human-readable message: the body's `message` field, the raw text, or a
    /// generic fallback, truncated.
    pub fn message(&self) -> String {
        let text = match &self.body {
            Value::Object(map) => map.get("message").and_then(Value::as_str).unwrap_or(""),
            Value::String(s) => s.as_str(),
            _ => "",
        };
        let trimmed = text.trim();
        if trimmed.is_empty() {
            "Request failed.".to_owned()
        } else {
            trimmed.chars().take(MAX_MESSAGE_CHARS).collect()
        }
    }
}

/// Classified outcome of one dispatch.
#[derive(Debug, Clone, PartialEq)]
pub enum Dispatched {
    Success(ApiResponse),
    /// 401.
    AuthRejected(ApiResponse),
    /// 429, with the server's suggested wait if it gave one.
    RateLimited { response: ApiResponse, retry_after: Option<String> },
    /// Any other non-2xx status.
    Failed(ApiResponse),
    /// No response at all (connect error, timeout, broken body).
    Unreachable(String),
}

/// Classify a completed response. `retry_after_header` is the raw
/// `Retry-After` header, used when the body carries no `retryAfter` field.
pub fn classify(response: ApiResponse, retry_after_header: Option<String>) -> Dispatched {
    match response.status {
        200..=299 => Dispatched::Success(response),
        401 => Dispatched::AuthRejected(response),
        429 => {
            let retry_after = response
                .body
                .get("retryAfter")
                .and_then(|v| match v {
                    Value::String(s) => Some(s.clone()),
                    Value::Number(n) => Some(n.to_string()),
                    _ => None,
                })
                .or(retry_after_header);
            Dispatched::RateLimited { response, retry_after }
        }
        _ => Dispatched::Failed(response),
    }
}

/// Decode a response body: JSON when possible, else the raw text.
pub fn parse_body(bytes: &[u8]) -> Value {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Value::Null;
    }
    serde_json::from_slice(bytes)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(bytes).into_owned()))
}

/// Build the shared HTTP client. The cookie jar carries the refresh
/// credential between calls; this crate never reads it.
pub fn build_client(config: &SessionConfig) -> anyhow::Result<Client> {
    let client = Client::builder().cookie_store(true).timeout(config.timeout()).build()?;
    Ok(client)
}

/// Issues calls against the backend with the current credential attached.
pub struct RequestDispatcher {
    client: Client,
    config: SessionConfig,
    store: Arc<TokenStore>,
    region: RwLock<Option<String>>,
}

impl RequestDispatcher {
    pub fn new(client: Client, config: SessionConfig, store: Arc<TokenStore>) -> Self {
        let region = RwLock::new(config.region.clone());
        Self { client, config, store, region }
    }

    /// Replace the ambient region tag (e.g. after a late geolocation lookup).
    pub fn set_region(&self, region: Option<String>) {
        *self.region.write() = region;
    }

    pub fn region(&self) -> Option<String> {
        self.region.read().clone()
    }

    pub async fn dispatch(&self, request: &ApiRequest) -> Dispatched {
        let request_id = uuid::Uuid::new_v4().to_string();
        let mut builder = self
            .client
            .request(request.method.clone(), self.config.url(&request.path))
            .header("x-request-id", request_id.as_str());

        let credential = self.store.get();
        if let Some(ref credential) = credential {
            builder = builder.bearer_auth(credential.token());
        }
        if let Some(region) = self.region() {
            builder = builder.header(self.config.region_header.as_str(), region);
        }
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(ref body) = request.body {
            builder = builder.json(body);
        }

        let resp = match builder.send().await {
            Ok(resp) => resp,
            Err(e) => {
                debug!(%request_id, path = %request.path, err = %e, "request failed to send");
                return Dispatched::Unreachable(e.to_string());
            }
        };

        let status = resp.status().as_u16();
        let retry_after =
            resp.headers().get(RETRY_AFTER).and_then(|v| v.to_str().ok()).map(str::to_owned);
        let body = match resp.bytes().await {
            Ok(bytes) => parse_body(&bytes),
            Err(e) => return Dispatched::Unreachable(format!("failed to read response: {e}")),
        };

        debug!(
            %request_id,
            method = %request.method,
            path = %request.path,
            status,
            bearer = credential.is_some(),
            "dispatched"
        );
        classify(ApiResponse { status, body }, retry_after)
    }
}

#[cfg(test)]
#[path = "dispatch_tests.rs"]
mod tests;
