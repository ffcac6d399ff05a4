//! Live telemetry for the proxy console.
//!
//! Each feed keeps a bounded, deduplicated, newest-first view. Entries arrive
//! two ways: pushed (native events, or polling when events are unavailable)
//! and pulled (paginated authoritative queries). Pushes are buffered and
//! flushed on a debounce; a successful pull replaces the view outright.

#![cfg_attr(test, allow(clippy::expect_used))]

pub mod entry;
pub mod error;
pub mod feed;
pub mod hub;
pub mod monitor;
pub mod reconcile;
pub mod subscription;

pub use entry::{DebugLogEntry, LogEntry, LogQuery, LogStats, RequestLogEntry};
pub use error::TelemetryError;
pub use feed::{DEBUG_LOG_EVENT, FeedKind, FeedSpec, REQUEST_LOG_EVENT};
pub use hub::{FeedEntry, TelemetryHub};
pub use monitor::{EnableOutcome, LiveFeed, RefreshOutcome};
pub use reconcile::{FlushReport, StreamReconciler};
pub use subscription::{
    EntrySubscription, Mechanism, PollWatermark, SubscriptionHandle, SubscriptionSlot,
    SubscriptionState,
};
