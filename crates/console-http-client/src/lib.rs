//! HTTP transport for console commands.
//!
//! Turns a registry descriptor plus invocation arguments into one request
//! against the console backend and classifies the response. A 401 trips the
//! shared [`UnauthorizedNotifier`] before the error reaches the caller.

#![cfg_attr(test, allow(clippy::expect_used))]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use console_client_core::{
    AuthInputError, CommandDescriptor, CommandTransport, DispatchError, HttpMethod,
    InvocationArgs, SessionCredentials, UnauthorizedNotifier, normalize_base_url,
};
use reqwest::{StatusCode, Url};
use serde_json::{Map, Value};
use thiserror::Error;
use uuid::Uuid;

pub const DEFAULT_TIMEOUT_MS: u64 = 10_000;
const MIN_TIMEOUT_MS: u64 = 250;

#[derive(Debug, Clone)]
pub struct HttpCommandClientConfig {
    pub base_url: String,
    pub timeout_ms: u64,
}

impl HttpCommandClientConfig {
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
        }
    }
}

#[derive(Debug, Error)]
pub enum HttpClientError {
    #[error(transparent)]
    BaseUrl(#[from] AuthInputError),
    #[error("http_client_build_failed:{message}")]
    Build { message: String },
}

/// Transport-level shape of one request, before it touches the network.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedRequest {
    pub method: HttpMethod,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
}

#[derive(Debug, Clone)]
pub struct HttpCommandClient {
    base_url: String,
    timeout: Duration,
    http: reqwest::Client,
    unauthorized: Arc<UnauthorizedNotifier>,
}

impl HttpCommandClient {
    /// Credentials are read from the notifier so that the token cleared on a
    /// 401 is the same token the next request would have sent.
    pub fn new(
        config: HttpCommandClientConfig,
        unauthorized: Arc<UnauthorizedNotifier>,
    ) -> Result<Self, HttpClientError> {
        let base_url = normalize_base_url(&config.base_url)?;
        let http = reqwest::Client::builder()
            .build()
            .map_err(|error| HttpClientError::Build {
                message: error.to_string(),
            })?;
        Ok(Self {
            base_url,
            timeout: Duration::from_millis(config.timeout_ms.max(MIN_TIMEOUT_MS)),
            http,
            unauthorized,
        })
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    #[must_use]
    pub fn credentials(&self) -> &SessionCredentials {
        self.unauthorized.credentials()
    }

    #[must_use]
    pub fn endpoint(&self, path: &str) -> Option<String> {
        let trimmed = path.trim();
        if trimmed.is_empty() {
            return None;
        }
        if trimmed.starts_with('/') {
            Some(format!("{}{}", self.base_url, trimmed))
        } else {
            Some(format!("{}/{}", self.base_url, trimmed))
        }
    }

    pub async fn send(&self, planned: PlannedRequest) -> Result<Value, DispatchError> {
        let endpoint = self
            .endpoint(&planned.path)
            .ok_or_else(|| DispatchError::transport("http_request_path_empty"))?;
        let mut url = Url::parse(&endpoint)
            .map_err(|error| DispatchError::transport(format!("invalid request url: {error}")))?;
        if !planned.query.is_empty() {
            url.query_pairs_mut().extend_pairs(planned.query.iter());
        }

        let method = match planned.method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Delete => reqwest::Method::DELETE,
            HttpMethod::Patch => reqwest::Method::PATCH,
        };
        let request_id = format!("req_{}", Uuid::new_v4().simple());
        let mut request = self
            .http
            .request(method, url)
            .header("x-request-id", request_id.as_str())
            .timeout(self.timeout);
        if let Some(token) = self.credentials().current() {
            request = request
                .bearer_auth(&*token)
                .header("x-api-key", &*token);
        }
        if let Some(body) = planned.body.as_ref() {
            request = request.json(body);
        }

        let response = request.send().await.map_err(|error| {
            tracing::debug!(request_id = %request_id, error = %error, "console request failed");
            DispatchError::transport(error.to_string())
        })?;
        self.classify(response).await
    }

    async fn classify(&self, response: reqwest::Response) -> Result<Value, DispatchError> {
        let status = response.status();
        if status == StatusCode::NO_CONTENT {
            return Ok(Value::Null);
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|error| DispatchError::transport(format!("read failed: {error}")))?;

        if !status.is_success() {
            let message = error_message_from_body(&bytes)
                .unwrap_or_else(|| format!("HTTP Error {}", status.as_u16()));
            if status == StatusCode::UNAUTHORIZED {
                self.unauthorized.notify_unauthorized();
                return Err(DispatchError::Unauthorized { message });
            }
            return Err(DispatchError::Http {
                status: status.as_u16(),
                message,
            });
        }

        Ok(decode_success_body(&bytes))
    }
}

#[async_trait]
impl CommandTransport for HttpCommandClient {
    async fn execute(
        &self,
        descriptor: &CommandDescriptor,
        args: &InvocationArgs,
    ) -> Result<Value, DispatchError> {
        self.send(plan_request(descriptor, args)).await
    }
}

/// Splits arguments between path, query string and body.
///
/// Path placeholders consume their argument. For GET and DELETE the rest goes
/// to the query string, minus nulls and any value already embedded in the
/// path. For POST and PATCH the rest is the JSON body, with a lone `request`
/// argument unwrapped.
#[must_use]
pub fn plan_request(descriptor: &CommandDescriptor, args: &InvocationArgs) -> PlannedRequest {
    let mut remaining = args.as_map().clone();
    let (path, consumed) = resolve_path(descriptor.path_template, &mut remaining);

    if descriptor.method.carries_body() {
        let body = if remaining.len() == 1 && remaining.contains_key("request") {
            remaining.shift_remove("request").unwrap_or(Value::Null)
        } else {
            Value::Object(remaining)
        };
        return PlannedRequest {
            method: descriptor.method,
            path,
            query: Vec::new(),
            body: Some(body),
        };
    }

    let query = remaining
        .into_iter()
        .filter(|(_, value)| !value.is_null())
        .map(|(key, value)| (key, value_to_param(&value)))
        .filter(|(_, value)| !consumed.contains(value))
        .collect();
    PlannedRequest {
        method: descriptor.method,
        path,
        query,
        body: None,
    }
}

/// Fills `:key` segments from `args`, removing each used key. Returns the
/// resolved path and the raw values that were embedded.
pub fn resolve_path(template: &str, args: &mut Map<String, Value>) -> (String, Vec<String>) {
    let mut consumed = Vec::new();
    let segments = template
        .split('/')
        .map(|segment| {
            let Some(placeholder) = segment.strip_prefix(':') else {
                return segment.to_string();
            };
            let key_len = placeholder
                .find(|ch: char| !(ch.is_ascii_alphanumeric() || ch == '_'))
                .unwrap_or(placeholder.len());
            let (key, suffix) = placeholder.split_at(key_len);
            match args.shift_remove(key) {
                Some(value) => {
                    let raw = value_to_param(&value);
                    let encoded = urlencoding::encode(&raw).into_owned();
                    consumed.push(raw);
                    format!("{encoded}{suffix}")
                }
                None => segment.to_string(),
            }
        })
        .collect::<Vec<_>>();
    (segments.join("/"), consumed)
}

fn value_to_param(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

/// Pulls a human message out of an error body: `{ "error": "..." }`,
/// `{ "message": "..." }` or `{ "error": { "message": "..." } }`.
pub fn error_message_from_body(body: &[u8]) -> Option<String> {
    let value = serde_json::from_slice::<Value>(body).ok()?;
    let message = match value.get("error") {
        Some(Value::String(message)) => Some(message.as_str()),
        Some(Value::Object(error)) => error.get("message").and_then(Value::as_str),
        _ => None,
    }
    .or_else(|| value.get("message").and_then(Value::as_str))?;
    non_empty_string(message)
}

fn decode_success_body(bytes: &[u8]) -> Value {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Value::Null;
    }
    serde_json::from_slice(bytes)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(bytes).into_owned()))
}

fn non_empty_string(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
