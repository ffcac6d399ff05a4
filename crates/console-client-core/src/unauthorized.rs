use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::Instant;

use crate::auth::SessionCredentials;

pub const DEFAULT_UNAUTHORIZED_DEBOUNCE: Duration = Duration::from_secs(2);

/// Broadcast once per burst of 401 responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnauthorizedSignal {
    pub sequence: u64,
}

/// Leading-edge debouncer for "the backend rejected our credential".
///
/// The first rejection in a window clears the session token and broadcasts
/// one [`UnauthorizedSignal`]. Further rejections inside the window are
/// absorbed so that a dozen concurrent failing calls raise one prompt.
#[derive(Debug)]
pub struct UnauthorizedNotifier {
    window: Duration,
    credentials: SessionCredentials,
    last_fired: Mutex<Option<Instant>>,
    sequence: AtomicU64,
    sender: broadcast::Sender<UnauthorizedSignal>,
}

impl UnauthorizedNotifier {
    #[must_use]
    pub fn new(credentials: SessionCredentials, window: Duration) -> Self {
        let (sender, _) = broadcast::channel(16);
        Self {
            window,
            credentials,
            last_fired: Mutex::new(None),
            sequence: AtomicU64::new(0),
            sender,
        }
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<UnauthorizedSignal> {
        self.sender.subscribe()
    }

    #[must_use]
    pub fn credentials(&self) -> &SessionCredentials {
        &self.credentials
    }

    #[must_use]
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Number of signals emitted so far.
    #[must_use]
    pub fn fired_count(&self) -> u64 {
        self.sequence.load(Ordering::SeqCst)
    }

    /// Records one rejected call. Returns `true` when this call opened a new
    /// window and the signal was emitted.
    pub fn notify_unauthorized(&self) -> bool {
        let now = Instant::now();
        {
            let mut last_fired = self
                .last_fired
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            let elapsed = last_fired.map(|previous| now.duration_since(previous));
            if let Some(elapsed) = elapsed.filter(|elapsed| *elapsed < self.window) {
                tracing::debug!(
                    since_ms = elapsed.as_millis() as u64,
                    "unauthorized response absorbed by debounce window"
                );
                return false;
            }
            *last_fired = Some(now);
        }

        let had_token = self.credentials.clear();
        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::warn!(
            sequence,
            had_token,
            "console backend rejected credentials; session token cleared"
        );
        // No subscribers is fine; the credential is already cleared.
        let _ = self.sender.send(UnauthorizedSignal { sequence });
        true
    }
}
