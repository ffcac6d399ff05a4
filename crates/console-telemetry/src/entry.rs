use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One telemetry record. `id` is the only dedup key and `timestamp` the only
/// ordering key.
pub trait LogEntry: Clone + Send + Sync + DeserializeOwned + 'static {
    fn id(&self) -> &str;

    /// Milliseconds since the unix epoch.
    fn timestamp(&self) -> i64;
}

/// A proxied request as recorded by the proxy monitor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestLogEntry {
    pub id: String,
    pub timestamp: i64,
    pub method: String,
    pub url: String,
    pub status: u16,
    /// Request duration in milliseconds.
    pub duration: u64,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub mapped_model: Option<String>,
    #[serde(default)]
    pub account_email: Option<String>,
    #[serde(default)]
    pub client_ip: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub request_body: Option<String>,
    #[serde(default)]
    pub response_body: Option<String>,
    #[serde(default)]
    pub input_tokens: Option<u32>,
    #[serde(default)]
    pub output_tokens: Option<u32>,
    #[serde(default)]
    pub protocol: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
}

impl RequestLogEntry {
    /// Same rule the backend applies when counting successes.
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..400).contains(&self.status)
    }
}

impl LogEntry for RequestLogEntry {
    fn id(&self) -> &str {
        &self.id
    }

    fn timestamp(&self) -> i64 {
        self.timestamp
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebugLogEntry {
    pub id: String,
    pub timestamp: i64,
    pub level: String,
    #[serde(default)]
    pub target: String,
    pub message: String,
    #[serde(default)]
    pub fields: Value,
}

impl LogEntry for DebugLogEntry {
    fn id(&self) -> &str {
        &self.id
    }

    fn timestamp(&self) -> i64 {
        self.timestamp
    }
}

/// Backend-side tallies. Never derived from the client view.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogStats {
    #[serde(default)]
    pub total_requests: u64,
    #[serde(default)]
    pub success_count: u64,
    #[serde(default)]
    pub error_count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogQuery {
    pub filter: String,
    pub errors_only: bool,
    /// 1-based.
    pub page: usize,
    pub page_size: usize,
}

impl Default for LogQuery {
    fn default() -> Self {
        Self {
            filter: String::new(),
            errors_only: false,
            page: 1,
            page_size: 100,
        }
    }
}

impl LogQuery {
    #[must_use]
    pub fn offset(&self) -> usize {
        self.page.max(1).saturating_sub(1).saturating_mul(self.limit())
    }

    #[must_use]
    pub fn limit(&self) -> usize {
        self.page_size.max(1)
    }

    /// First page of the same filter.
    #[must_use]
    pub fn first_page(&self) -> Self {
        Self {
            page: 1,
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_log_decodes_list_view_rows() {
        let entry: RequestLogEntry = serde_json::from_value(json!({
            "id": "log-1",
            "timestamp": 1_700_000_000_000_i64,
            "method": "POST",
            "url": "/v1/messages",
            "status": 429,
            "duration": 812,
            "model": "claude-sonnet",
            "account_email": "ops@example.com",
            "input_tokens": 1200
        }))
        .expect("request log");

        assert_eq!(entry.id(), "log-1");
        assert_eq!(entry.mapped_model, None);
        assert_eq!(entry.input_tokens, Some(1200));
        assert!(!entry.is_success());
    }

    #[test]
    fn success_covers_redirects_but_not_errors() {
        let mut entry: RequestLogEntry = serde_json::from_value(json!({
            "id": "log-2", "timestamp": 1, "method": "GET", "url": "/", "status": 200, "duration": 3
        }))
        .expect("request log");
        assert!(entry.is_success());
        entry.status = 302;
        assert!(entry.is_success());
        entry.status = 400;
        assert!(!entry.is_success());
        entry.status = 199;
        assert!(!entry.is_success());
    }

    #[test]
    fn query_offsets_follow_page_arithmetic() {
        let query = LogQuery {
            page: 3,
            page_size: 50,
            ..LogQuery::default()
        };
        assert_eq!(query.offset(), 100);
        assert_eq!(query.first_page().offset(), 0);

        let degenerate = LogQuery {
            page: 0,
            page_size: 0,
            ..LogQuery::default()
        };
        assert_eq!(degenerate.offset(), 0);
        assert_eq!(degenerate.limit(), 1);

        let far = LogQuery {
            page: usize::MAX,
            page_size: 100,
            ..LogQuery::default()
        };
        assert_eq!(far.offset(), usize::MAX);
    }
}
