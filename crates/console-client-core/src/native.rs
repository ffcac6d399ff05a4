use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::dispatch::{EventReceiver, NativeBridge};
use crate::error::DispatchError;

type Handler = Arc<dyn Fn(Value) -> Result<Value, DispatchError> + Send + Sync>;

/// In-process native host.
///
/// Commands are plain synchronous handlers registered by name. Events are
/// fanned out to every live listener; listeners whose receiver was dropped are
/// pruned on the next emit.
pub struct LocalBridge {
    available: AtomicBool,
    events_enabled: AtomicBool,
    handlers: Mutex<HashMap<String, Handler>>,
    listeners: Mutex<HashMap<String, Vec<mpsc::UnboundedSender<Value>>>>,
}

impl Default for LocalBridge {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalBridge {
    #[must_use]
    pub fn new() -> Self {
        Self {
            available: AtomicBool::new(true),
            events_enabled: AtomicBool::new(true),
            handlers: Mutex::new(HashMap::new()),
            listeners: Mutex::new(HashMap::new()),
        }
    }

    pub fn register<F>(&self, command: impl Into<String>, handler: F)
    where
        F: Fn(Value) -> Result<Value, DispatchError> + Send + Sync + 'static,
    {
        self.handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(command.into(), Arc::new(handler));
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// When disabled, [`NativeBridge::listen`] fails and callers fall back to
    /// polling.
    pub fn set_events_enabled(&self, enabled: bool) {
        self.events_enabled.store(enabled, Ordering::SeqCst);
    }

    /// Pushes `payload` to every listener of `event`. Returns how many
    /// listeners received it.
    pub fn emit(&self, event: &str, payload: Value) -> usize {
        let mut listeners = self
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let Some(senders) = listeners.get_mut(event) else {
            return 0;
        };
        senders.retain(|sender| sender.send(payload.clone()).is_ok());
        senders.len()
    }

    /// Drops every listener of `event`, closing their channels.
    pub fn close_event(&self, event: &str) {
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(event);
    }

    #[must_use]
    pub fn listener_count(&self, event: &str) -> usize {
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(event)
            .map_or(0, |senders| {
                senders.iter().filter(|sender| !sender.is_closed()).count()
            })
    }
}

#[async_trait]
impl NativeBridge for LocalBridge {
    fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    async fn invoke(&self, command: &str, args: Value) -> Result<Value, DispatchError> {
        let handler = self
            .handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(command)
            .cloned();
        match handler {
            Some(handler) => handler(args),
            None => Err(DispatchError::transport(format!(
                "native host has no handler for `{command}`"
            ))),
        }
    }

    async fn listen(&self, event: &str) -> Result<EventReceiver, DispatchError> {
        if !self.events_enabled.load(Ordering::SeqCst) {
            return Err(DispatchError::transport(format!(
                "native host cannot deliver `{event}` events"
            )));
        }
        let (sender, receiver) = mpsc::unbounded_channel();
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(event.to_string())
            .or_default()
            .push(sender);
        Ok(receiver)
    }
}
