use console_client_core::{ConsoleConfig, Dispatcher};

use crate::entry::{DebugLogEntry, LogQuery, RequestLogEntry};
use crate::error::TelemetryError;
use crate::feed::{FeedKind, FeedSpec};
use crate::monitor::{EnableOutcome, LiveFeed, RefreshOutcome};
use crate::subscription::EntrySubscription;

/// An entry delivered by either feed.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedEntry {
    Request(RequestLogEntry),
    Debug(DebugLogEntry),
}

/// The console's telemetry surface: both feeds behind one
/// `enable` / `disable` / `on_entry` API.
#[derive(Debug)]
pub struct TelemetryHub {
    requests: LiveFeed<RequestLogEntry>,
    debug: LiveFeed<DebugLogEntry>,
}

impl TelemetryHub {
    #[must_use]
    pub fn new(dispatcher: Dispatcher, config: &ConsoleConfig) -> Self {
        Self {
            requests: LiveFeed::new(
                FeedSpec::new(FeedKind::Requests, config.request_feed),
                dispatcher.clone(),
            ),
            debug: LiveFeed::new(FeedSpec::new(FeedKind::Debug, config.debug_feed), dispatcher),
        }
    }

    #[must_use]
    pub fn requests(&self) -> &LiveFeed<RequestLogEntry> {
        &self.requests
    }

    #[must_use]
    pub fn debug(&self) -> &LiveFeed<DebugLogEntry> {
        &self.debug
    }

    pub async fn enable(&self, feed: FeedKind) -> EnableOutcome {
        match feed {
            FeedKind::Requests => self.requests.enable().await,
            FeedKind::Debug => self.debug.enable().await,
        }
    }

    pub fn disable(&self, feed: FeedKind) -> bool {
        match feed {
            FeedKind::Requests => self.requests.disable(),
            FeedKind::Debug => self.debug.disable(),
        }
    }

    /// Delivers entries newly admitted into `feed`'s view until the returned
    /// subscription is dropped.
    pub fn on_entry(
        &self,
        feed: FeedKind,
        handler: impl Fn(FeedEntry) + Send + Sync + 'static,
    ) -> EntrySubscription {
        match feed {
            FeedKind::Requests => self
                .requests
                .on_entry(move |entry| handler(FeedEntry::Request(entry.clone()))),
            FeedKind::Debug => self
                .debug
                .on_entry(move |entry| handler(FeedEntry::Debug(entry.clone()))),
        }
    }

    pub async fn refresh(
        &self,
        feed: FeedKind,
        query: &LogQuery,
    ) -> Result<RefreshOutcome, TelemetryError> {
        match feed {
            FeedKind::Requests => self.requests.refresh(query).await,
            FeedKind::Debug => self.debug.refresh(query).await,
        }
    }

    pub async fn clear(&self, feed: FeedKind) -> Result<(), TelemetryError> {
        match feed {
            FeedKind::Requests => self.requests.clear_remote().await,
            FeedKind::Debug => self.debug.clear_remote().await,
        }
    }

    /// Stops both feeds.
    pub fn shutdown(&self) {
        self.requests.disable();
        self.debug.disable();
    }
}
