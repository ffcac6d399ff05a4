use std::collections::HashSet;
use std::fmt;

use tokio::task::JoinHandle;

use crate::entry::LogEntry;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mechanism {
    Native,
    Polling,
}

impl fmt::Display for Mechanism {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Native => "native",
            Self::Polling => "polling",
        })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SubscriptionState {
    #[default]
    Idle,
    Starting,
    Active(Mechanism),
}

/// Per-feed subscription state machine.
///
/// The transition methods are the only way to change state; each reports
/// whether the transition happened.
#[derive(Debug, Default)]
pub struct SubscriptionSlot {
    state: SubscriptionState,
}

impl SubscriptionSlot {
    #[must_use]
    pub fn state(&self) -> SubscriptionState {
        self.state
    }

    #[must_use]
    pub fn mechanism(&self) -> Option<Mechanism> {
        match self.state {
            SubscriptionState::Active(mechanism) => Some(mechanism),
            _ => None,
        }
    }

    /// `Idle -> Starting`.
    pub fn begin_start(&mut self) -> bool {
        if self.state != SubscriptionState::Idle {
            return false;
        }
        self.state = SubscriptionState::Starting;
        true
    }

    /// `Starting -> Active`. Fails if the slot was stopped while starting.
    pub fn activate(&mut self, mechanism: Mechanism) -> bool {
        if self.state != SubscriptionState::Starting {
            return false;
        }
        self.state = SubscriptionState::Active(mechanism);
        true
    }

    /// `Active(native) -> Active(polling)` after the native channel closed.
    pub fn degrade_to_polling(&mut self) -> bool {
        if self.state != SubscriptionState::Active(Mechanism::Native) {
            return false;
        }
        self.state = SubscriptionState::Active(Mechanism::Polling);
        true
    }

    /// Any state `-> Idle`. Returns `false` when already idle.
    pub fn stop(&mut self) -> bool {
        let was_running = self.state != SubscriptionState::Idle;
        self.state = SubscriptionState::Idle;
        was_running
    }
}

/// Owns the background task of one live subscription. Dropping the handle
/// aborts the task.
#[derive(Debug)]
pub struct SubscriptionHandle {
    mechanism: Mechanism,
    task: Option<JoinHandle<()>>,
}

impl SubscriptionHandle {
    #[must_use]
    pub fn new(mechanism: Mechanism, task: JoinHandle<()>) -> Self {
        Self {
            mechanism,
            task: Some(task),
        }
    }

    #[must_use]
    pub fn mechanism(&self) -> Mechanism {
        self.mechanism
    }

    /// Releases the task without aborting it. Used by a task that is
    /// replacing its own handle on the way out.
    pub fn detach(mut self) {
        self.task.take();
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Keeps one `on_entry` handler registered. Dropping it removes the handler.
#[must_use = "the handler is removed as soon as the subscription is dropped"]
pub struct EntrySubscription {
    release: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl EntrySubscription {
    pub(crate) fn new(release: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self {
            release: Some(Box::new(release)),
        }
    }
}

impl Drop for EntrySubscription {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl fmt::Debug for EntrySubscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntrySubscription")
            .field("registered", &self.release.is_some())
            .finish()
    }
}

/// Tracks what the polling fallback has already pushed, so repeated polls of
/// the newest page only surface new entries.
#[derive(Debug, Clone, Default)]
pub struct PollWatermark {
    newest: Option<i64>,
    ids_at_newest: HashSet<String>,
}

impl PollWatermark {
    /// Starts from the newest entries already on screen.
    #[must_use]
    pub fn seeded<'a>(newest: Option<(i64, impl IntoIterator<Item = &'a str>)>) -> Self {
        match newest {
            Some((timestamp, ids)) => Self {
                newest: Some(timestamp),
                ids_at_newest: ids.into_iter().map(str::to_string).collect(),
            },
            None => Self::default(),
        }
    }

    /// Keeps entries newer than the watermark, oldest first, and advances it.
    pub fn admit<E: LogEntry>(&mut self, batch: Vec<E>) -> Vec<E> {
        let mut admitted = batch
            .into_iter()
            .filter(|entry| match self.newest {
                None => true,
                Some(newest) => {
                    entry.timestamp() > newest
                        || (entry.timestamp() == newest && !self.ids_at_newest.contains(entry.id()))
                }
            })
            .collect::<Vec<_>>();
        admitted.sort_by_key(LogEntry::timestamp);

        for entry in &admitted {
            match self.newest {
                Some(newest) if entry.timestamp() < newest => {}
                Some(newest) if entry.timestamp() == newest => {
                    self.ids_at_newest.insert(entry.id().to_string());
                }
                _ => {
                    self.newest = Some(entry.timestamp());
                    self.ids_at_newest.clear();
                    self.ids_at_newest.insert(entry.id().to_string());
                }
            }
        }
        admitted
    }

    #[must_use]
    pub fn newest(&self) -> Option<i64> {
        self.newest
    }
}
