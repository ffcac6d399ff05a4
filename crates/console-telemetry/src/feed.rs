use std::fmt;

use console_client_core::{Command, FeedSettings, InvocationArgs};

use crate::entry::LogQuery;

pub const REQUEST_LOG_EVENT: &str = "proxy://request";
pub const DEBUG_LOG_EVENT: &str = "debug-console://log";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeedKind {
    Requests,
    Debug,
}

impl FeedKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Requests => "requests",
            Self::Debug => "debug",
        }
    }

    #[must_use]
    pub fn event_name(self) -> &'static str {
        match self {
            Self::Requests => REQUEST_LOG_EVENT,
            Self::Debug => DEBUG_LOG_EVENT,
        }
    }

    #[must_use]
    pub fn list_command(self) -> Command {
        match self {
            Self::Requests => Command::GetProxyLogsFiltered,
            Self::Debug => Command::GetDebugConsoleLogs,
        }
    }

    /// Total matching the current filter, when the backend can count.
    #[must_use]
    pub fn count_command(self) -> Option<Command> {
        match self {
            Self::Requests => Some(Command::GetProxyLogsCountFiltered),
            Self::Debug => None,
        }
    }

    #[must_use]
    pub fn stats_command(self) -> Option<Command> {
        match self {
            Self::Requests => Some(Command::GetProxyStats),
            Self::Debug => None,
        }
    }

    #[must_use]
    pub fn clear_command(self) -> Command {
        match self {
            Self::Requests => Command::ClearProxyLogs,
            Self::Debug => Command::ClearDebugConsoleLogs,
        }
    }

    #[must_use]
    pub fn default_settings(self) -> FeedSettings {
        match self {
            Self::Requests => FeedSettings::requests(),
            Self::Debug => FeedSettings::debug(),
        }
    }
}

impl fmt::Display for FeedKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeedSpec {
    pub kind: FeedKind,
    pub settings: FeedSettings,
}

impl FeedSpec {
    #[must_use]
    pub fn new(kind: FeedKind, settings: FeedSettings) -> Self {
        Self { kind, settings }
    }

    #[must_use]
    pub fn with_defaults(kind: FeedKind) -> Self {
        Self::new(kind, kind.default_settings())
    }

    /// Arguments for the authoritative page pull.
    #[must_use]
    pub fn list_args(&self, query: &LogQuery) -> InvocationArgs {
        match self.kind {
            FeedKind::Requests => filter_args(query)
                .with("limit", query.limit())
                .with("offset", query.offset()),
            FeedKind::Debug => InvocationArgs::new(),
        }
    }

    #[must_use]
    pub fn count_args(&self, query: &LogQuery) -> InvocationArgs {
        match self.kind {
            FeedKind::Requests => filter_args(query),
            FeedKind::Debug => InvocationArgs::new(),
        }
    }

    /// Newest page of the active filter, used by the polling fallback.
    #[must_use]
    pub fn poll_args(&self, query: &LogQuery) -> InvocationArgs {
        self.list_args(&query.first_page())
    }
}

fn filter_args(query: &LogQuery) -> InvocationArgs {
    InvocationArgs::new()
        .with("filter", query.filter.as_str())
        .with("errorsOnly", query.errors_only)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_feed_pages_with_filter_arguments() {
        let spec = FeedSpec::with_defaults(FeedKind::Requests);
        let query = LogQuery {
            filter: "gemini".to_string(),
            errors_only: true,
            page: 2,
            page_size: 25,
        };

        assert_eq!(
            spec.list_args(&query).to_value(),
            json!({ "filter": "gemini", "errorsOnly": true, "limit": 25, "offset": 25 })
        );
        assert_eq!(
            spec.count_args(&query).to_value(),
            json!({ "filter": "gemini", "errorsOnly": true })
        );
        assert_eq!(spec.poll_args(&query).get("offset"), Some(&json!(0)));
        assert_eq!(spec.settings.capacity, 100);
    }

    #[test]
    fn debug_feed_has_no_server_side_counts() {
        let spec = FeedSpec::with_defaults(FeedKind::Debug);
        assert!(spec.list_args(&LogQuery::default()).is_empty());
        assert_eq!(FeedKind::Debug.count_command(), None);
        assert_eq!(FeedKind::Debug.stats_command(), None);
        assert_eq!(FeedKind::Debug.event_name(), "debug-console://log");
        assert_eq!(spec.settings.capacity, 5_000);
    }

    #[test]
    fn feed_commands_have_http_routes() {
        for kind in [FeedKind::Requests, FeedKind::Debug] {
            let commands = [Some(kind.list_command()), Some(kind.clear_command())]
                .into_iter()
                .chain([kind.count_command(), kind.stats_command()])
                .flatten();
            for command in commands {
                assert!(command.descriptor().is_some(), "{command} has no route");
            }
        }
    }
}
