use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use console_client_core::{Dispatcher, EventReceiver, InvocationArgs};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::entry::{LogEntry, LogQuery, LogStats};
use crate::error::TelemetryError;
use crate::feed::{FeedKind, FeedSpec};
use crate::reconcile::StreamReconciler;
use crate::subscription::{
    EntrySubscription, Mechanism, PollWatermark, SubscriptionHandle, SubscriptionSlot,
    SubscriptionState,
};

type EntryHandler<E> = Arc<dyn Fn(&E) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnableOutcome {
    Started(Mechanism),
    AlreadyStarting,
    AlreadyActive(Mechanism),
    /// The feed was disabled before the subscription came up.
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    Applied { entries: usize, total: Option<u64> },
    /// A disable or a newer pull landed first; nothing was applied.
    Discarded,
}

/// One live telemetry feed: the reconciled view, its push subscription and
/// the counts shown next to it.
///
/// Dropping the feed disables it, which aborts the subscription task and any
/// scheduled flush.
pub struct LiveFeed<E: LogEntry> {
    shared: Arc<FeedShared<E>>,
}

struct FeedShared<E: LogEntry> {
    spec: FeedSpec,
    dispatcher: Dispatcher,
    state: Mutex<FeedState<E>>,
}

struct FeedState<E: LogEntry> {
    reconciler: StreamReconciler<E>,
    slot: SubscriptionSlot,
    /// Bumped on every stop. Work started under an older generation is dropped.
    generation: u64,
    pull_epoch: u64,
    subscription: Option<SubscriptionHandle>,
    flush_task: Option<JoinHandle<()>>,
    query: LogQuery,
    stats: Option<LogStats>,
    total: Option<u64>,
    handlers: Vec<(u64, EntryHandler<E>)>,
    next_handler_id: u64,
}

impl<E: LogEntry> LiveFeed<E> {
    #[must_use]
    pub fn new(spec: FeedSpec, dispatcher: Dispatcher) -> Self {
        let state = FeedState {
            reconciler: StreamReconciler::new(spec.settings.capacity),
            slot: SubscriptionSlot::default(),
            generation: 0,
            pull_epoch: 0,
            subscription: None,
            flush_task: None,
            query: LogQuery {
                page_size: spec.settings.capacity,
                ..LogQuery::default()
            },
            stats: None,
            total: None,
            handlers: Vec::new(),
            next_handler_id: 0,
        };
        Self {
            shared: Arc::new(FeedShared {
                spec,
                dispatcher,
                state: Mutex::new(state),
            }),
        }
    }

    #[must_use]
    pub fn spec(&self) -> FeedSpec {
        self.shared.spec
    }

    /// Registers a callback for pushed entries, whichever mechanism delivered
    /// them. It runs when a flush admits the entry into the view, so entries
    /// dropped by an authoritative pull or already shown are never reported.
    ///
    /// The handler stays registered until the returned subscription is
    /// dropped.
    pub fn on_entry(&self, handler: impl Fn(&E) + Send + Sync + 'static) -> EntrySubscription {
        let id = {
            let mut state = self.shared.lock();
            state.next_handler_id += 1;
            let id = state.next_handler_id;
            state.handlers.push((id, Arc::new(handler)));
            id
        };
        let feed = Arc::downgrade(&self.shared);
        EntrySubscription::new(move || {
            if let Some(shared) = feed.upgrade() {
                shared
                    .lock()
                    .handlers
                    .retain(|(registered, _)| *registered != id);
            }
        })
    }

    /// Opens the push subscription: a native listener when the host can
    /// deliver events, the polling timer otherwise.
    pub async fn enable(&self) -> EnableOutcome {
        let shared = &self.shared;
        let feed = shared.spec.kind;
        let generation = {
            let mut state = shared.lock();
            match state.slot.state() {
                SubscriptionState::Starting => return EnableOutcome::AlreadyStarting,
                SubscriptionState::Active(mechanism) => {
                    return EnableOutcome::AlreadyActive(mechanism);
                }
                SubscriptionState::Idle => {}
            }
            state.slot.begin_start();
            state.generation
        };

        let receiver = match shared.dispatcher.listen(feed.event_name()).await {
            Some(Ok(receiver)) => Some(receiver),
            Some(Err(error)) => {
                tracing::warn!(
                    feed = %feed,
                    error = %error,
                    "native event registration failed; polling instead"
                );
                None
            }
            None => None,
        };

        let mut state = shared.lock();
        if state.generation != generation || state.slot.state() != SubscriptionState::Starting {
            tracing::debug!(feed = %feed, "feed disabled while starting");
            return EnableOutcome::Cancelled;
        }
        let (mechanism, task) = match receiver {
            Some(receiver) => (
                Mechanism::Native,
                tokio::spawn(run_native(Arc::downgrade(shared), generation, receiver)),
            ),
            None => (
                Mechanism::Polling,
                shared.spawn_polling(generation, &state),
            ),
        };
        state.slot.activate(mechanism);
        state.subscription = Some(SubscriptionHandle::new(mechanism, task));
        tracing::info!(feed = %feed, mechanism = %mechanism, "feed subscription active");
        EnableOutcome::Started(mechanism)
    }

    /// Cancels whichever mechanism is active. Returns `false` when the feed was
    /// already idle.
    pub fn disable(&self) -> bool {
        self.shared.disable()
    }

    /// Authoritative pull. On success the view is replaced, the counts are
    /// updated and pending pushes are dropped. On failure nothing changes.
    pub async fn refresh(&self, query: &LogQuery) -> Result<RefreshOutcome, TelemetryError> {
        let shared = &self.shared;
        let feed = shared.spec.kind;
        let (generation, epoch) = {
            let mut state = shared.lock();
            state.pull_epoch += 1;
            (state.generation, state.pull_epoch)
        };

        let value = shared
            .dispatcher
            .call(feed.list_command(), &shared.spec.list_args(query))
            .await?;
        let entries = decode_entries::<E>(feed, value)?;
        let (total, stats) = shared.pull_counts(query).await?;

        let mut state = shared.lock();
        if state.generation != generation || state.pull_epoch != epoch {
            tracing::debug!(feed = %feed, "discarding superseded pull result");
            return Ok(RefreshOutcome::Discarded);
        }
        let pulled = entries.len();
        state.reconciler.reconcile_with_authoritative(entries);
        state.query = query.clone();
        state.total = total.or_else(|| u64::try_from(pulled).ok());
        if stats.is_some() {
            state.stats = stats;
        }
        tracing::debug!(feed = %feed, entries = pulled, total = ?state.total, "applied authoritative pull");
        Ok(RefreshOutcome::Applied {
            entries: pulled,
            total: state.total,
        })
    }

    /// Clears the backend store and the local view.
    pub async fn clear_remote(&self) -> Result<(), TelemetryError> {
        let feed = self.shared.spec.kind;
        self.shared
            .dispatcher
            .call(feed.clear_command(), &InvocationArgs::new())
            .await?;

        let mut state = self.shared.lock();
        // Pulls started before the clear would bring deleted rows back.
        state.pull_epoch += 1;
        state.reconciler.reconcile_with_authoritative(Vec::new());
        state.total = Some(0);
        if feed.stats_command().is_some() {
            state.stats = Some(LogStats::default());
        }
        tracing::info!(feed = %feed, "feed cleared");
        Ok(())
    }

    #[must_use]
    pub fn view(&self) -> Vec<E> {
        self.shared.lock().reconciler.view().to_vec()
    }

    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.shared.lock().reconciler.pending_len()
    }

    #[must_use]
    pub fn stats(&self) -> Option<LogStats> {
        self.shared.lock().stats
    }

    #[must_use]
    pub fn total(&self) -> Option<u64> {
        self.shared.lock().total
    }

    #[must_use]
    pub fn query(&self) -> LogQuery {
        self.shared.lock().query.clone()
    }

    #[must_use]
    pub fn state(&self) -> SubscriptionState {
        self.shared.lock().slot.state()
    }

    #[must_use]
    pub fn mechanism(&self) -> Option<Mechanism> {
        self.shared.lock().slot.mechanism()
    }
}

impl<E: LogEntry> Drop for LiveFeed<E> {
    fn drop(&mut self) {
        self.shared.disable();
    }
}

impl<E: LogEntry> fmt::Debug for LiveFeed<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.lock();
        f.debug_struct("LiveFeed")
            .field("feed", &self.shared.spec.kind)
            .field("state", &state.slot.state())
            .field("view_len", &state.reconciler.view().len())
            .field("pending", &state.reconciler.pending_len())
            .finish()
    }
}

impl<E: LogEntry> FeedShared<E> {
    fn lock(&self) -> MutexGuard<'_, FeedState<E>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn disable(&self) -> bool {
        let (subscription, flush_task, dropped) = {
            let mut state = self.lock();
            if !state.slot.stop() {
                return false;
            }
            state.generation += 1;
            let dropped = state.reconciler.discard_pending();
            (state.subscription.take(), state.flush_task.take(), dropped)
        };
        drop(subscription);
        if let Some(task) = flush_task {
            task.abort();
        }
        tracing::info!(
            feed = %self.spec.kind,
            dropped_pending = dropped,
            "feed subscription stopped"
        );
        true
    }

    fn spawn_polling(self: &Arc<Self>, generation: u64, state: &FeedState<E>) -> JoinHandle<()> {
        let watermark = PollWatermark::seeded(state.reconciler.newest());
        tokio::spawn(run_polling(
            Arc::downgrade(self),
            generation,
            self.spec.settings.poll_interval(),
            watermark,
        ))
    }

    fn fall_back_to_polling(self: &Arc<Self>, generation: u64) {
        let mut state = self.lock();
        if state.generation != generation || !state.slot.degrade_to_polling() {
            return;
        }
        tracing::warn!(feed = %self.spec.kind, "native event channel closed; polling instead");
        let task = self.spawn_polling(generation, &state);
        if let Some(previous) = state
            .subscription
            .replace(SubscriptionHandle::new(Mechanism::Polling, task))
        {
            // Called from the native task itself, which is about to return.
            previous.detach();
        }
    }

    fn poll_args(&self, generation: u64) -> Option<InvocationArgs> {
        let state = self.lock();
        if state.generation != generation {
            return None;
        }
        Some(self.spec.poll_args(&state.query))
    }

    /// Buffers one pushed entry and schedules a flush. Returns `false` when the
    /// entry was dropped.
    fn push(self: &Arc<Self>, generation: u64, entry: E) -> bool {
        let mut state = self.lock();
        if state.generation != generation || state.slot.mechanism().is_none() {
            return false;
        }
        if !state.reconciler.ingest(entry) {
            return false;
        }
        if state.flush_task.is_none() {
            state.flush_task = Some(tokio::spawn(run_flush(
                Arc::downgrade(self),
                generation,
                self.spec.settings.flush_debounce(),
            )));
        }
        true
    }

    async fn refresh_counts(&self, generation: u64) {
        let query = {
            let state = self.lock();
            if state.generation != generation {
                return;
            }
            state.query.clone()
        };
        match self.pull_counts(&query).await {
            Ok((total, stats)) => {
                let mut state = self.lock();
                if state.generation != generation {
                    return;
                }
                if total.is_some() {
                    state.total = total;
                }
                if stats.is_some() {
                    state.stats = stats;
                }
            }
            Err(error) => {
                tracing::warn!(
                    feed = %self.spec.kind,
                    error = %error,
                    "count refresh failed; keeping previous counts"
                );
            }
        }
    }

    async fn pull_counts(
        &self,
        query: &LogQuery,
    ) -> Result<(Option<u64>, Option<LogStats>), TelemetryError> {
        let feed = self.spec.kind;
        let total = match feed.count_command() {
            Some(command) => {
                let value = self
                    .dispatcher
                    .call(command, &self.spec.count_args(query))
                    .await?;
                Some(decode_payload::<u64>(feed, value)?)
            }
            None => None,
        };
        let stats = match feed.stats_command() {
            Some(command) => {
                let value = self.dispatcher.call(command, &InvocationArgs::new()).await?;
                Some(decode_payload::<LogStats>(feed, value)?)
            }
            None => None,
        };
        Ok((total, stats))
    }
}

async fn run_native<E: LogEntry>(
    feed: Weak<FeedShared<E>>,
    generation: u64,
    mut receiver: EventReceiver,
) {
    while let Some(payload) = receiver.recv().await {
        let Some(shared) = feed.upgrade() else {
            return;
        };
        match serde_json::from_value::<E>(payload) {
            Ok(entry) => {
                shared.push(generation, entry);
            }
            Err(error) => {
                tracing::warn!(
                    feed = %shared.spec.kind,
                    error = %error,
                    "dropping undecodable push payload"
                );
            }
        }
    }
    if let Some(shared) = feed.upgrade() {
        shared.fall_back_to_polling(generation);
    }
}

async fn run_polling<E: LogEntry>(
    feed: Weak<FeedShared<E>>,
    generation: u64,
    period: Duration,
    mut watermark: PollWatermark,
) {
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        let Some(shared) = feed.upgrade() else {
            return;
        };
        let Some(args) = shared.poll_args(generation) else {
            return;
        };
        let kind = shared.spec.kind;
        let batch = match shared.dispatcher.call(kind.list_command(), &args).await {
            Ok(value) => decode_entries::<E>(kind, value),
            Err(error) => Err(TelemetryError::from(error)),
        };
        match batch {
            Ok(batch) => {
                for entry in watermark.admit(batch) {
                    shared.push(generation, entry);
                }
            }
            Err(error) => {
                tracing::warn!(feed = %kind, error = %error, "poll failed");
            }
        }
    }
}

async fn run_flush<E: LogEntry>(feed: Weak<FeedShared<E>>, generation: u64, delay: Duration) {
    tokio::time::sleep(delay).await;
    let Some(shared) = feed.upgrade() else {
        return;
    };
    let (report, admitted, handlers) = {
        let mut state = shared.lock();
        if state.generation != generation {
            return;
        }
        state.flush_task = None;
        let (report, admitted) = state.reconciler.flush_admitted();
        let handlers = state
            .handlers
            .iter()
            .map(|(_, handler)| handler.clone())
            .collect::<Vec<_>>();
        (report, admitted, handlers)
    };
    for entry in &admitted {
        for handler in &handlers {
            handler(entry);
        }
    }
    tracing::debug!(
        feed = %shared.spec.kind,
        merged = report.merged,
        duplicates = report.duplicates,
        evicted = report.evicted,
        "flushed pending entries"
    );
    shared.refresh_counts(generation).await;
}

fn decode_entries<E: LogEntry>(feed: FeedKind, value: Value) -> Result<Vec<E>, TelemetryError> {
    if value.is_null() {
        return Ok(Vec::new());
    }
    decode_payload(feed, value)
}

fn decode_payload<T: DeserializeOwned>(feed: FeedKind, value: Value) -> Result<T, TelemetryError> {
    serde_json::from_value(value).map_err(|error| TelemetryError::payload(feed, error))
}

#[cfg(test)]
mod tests;
