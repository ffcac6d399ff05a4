use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::command::{Command, CommandDescriptor, InvocationArgs};
use crate::error::DispatchError;

/// Stream of event payloads pushed by the native host.
pub type EventReceiver = mpsc::UnboundedReceiver<Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportKind {
    Native,
    Http,
}

impl TransportKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Native => "native",
            Self::Http => "http",
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// In-process host that can serve commands and push events.
#[async_trait]
pub trait NativeBridge: Send + Sync {
    /// Whether the host is reachable right now. Checked on every invocation.
    fn is_available(&self) -> bool;

    /// Whether [`NativeBridge::listen`] can deliver push events.
    fn supports_events(&self) -> bool {
        true
    }

    async fn invoke(&self, command: &str, args: Value) -> Result<Value, DispatchError>;

    async fn listen(&self, event: &str) -> Result<EventReceiver, DispatchError>;
}

/// Transport that executes a command from its registry descriptor.
#[async_trait]
pub trait CommandTransport: Send + Sync {
    async fn execute(
        &self,
        descriptor: &CommandDescriptor,
        args: &InvocationArgs,
    ) -> Result<Value, DispatchError>;
}

/// Single entry point for every console command.
///
/// The native host wins whenever it reports itself available; the command is
/// then forwarded verbatim without consulting the registry. Otherwise the
/// registry is consulted and the call goes to the HTTP transport.
#[derive(Clone, Default)]
pub struct Dispatcher {
    native: Option<Arc<dyn NativeBridge>>,
    http: Option<Arc<dyn CommandTransport>>,
}

impl Dispatcher {
    #[must_use]
    pub fn new(
        native: Option<Arc<dyn NativeBridge>>,
        http: Option<Arc<dyn CommandTransport>>,
    ) -> Self {
        Self { native, http }
    }

    #[must_use]
    pub fn http(transport: Arc<dyn CommandTransport>) -> Self {
        Self::new(None, Some(transport))
    }

    #[must_use]
    pub fn native(bridge: Arc<dyn NativeBridge>) -> Self {
        Self::new(Some(bridge), None)
    }

    /// Transport the next invocation would use.
    #[must_use]
    pub fn active_transport(&self) -> Option<TransportKind> {
        if self.available_native().is_some() {
            Some(TransportKind::Native)
        } else if self.http.is_some() {
            Some(TransportKind::Http)
        } else {
            None
        }
    }

    pub async fn invoke(&self, name: &str, args: &InvocationArgs) -> Result<Value, DispatchError> {
        if let Some(native) = self.available_native() {
            tracing::debug!(command = name, transport = "native", "dispatching command");
            return native.invoke(name, args.to_value()).await;
        }

        let Some(http) = self.http.as_ref() else {
            return Err(DispatchError::transport(format!(
                "no transport available for command `{name}`"
            )));
        };
        let Some(descriptor) = Command::from_name(name).and_then(Command::descriptor) else {
            tracing::warn!(command = name, "command has no http mapping");
            return Err(DispatchError::unsupported(name, TransportKind::Http));
        };

        tracing::debug!(
            command = name,
            transport = "http",
            method = descriptor.method.as_str(),
            path = descriptor.path_template,
            "dispatching command"
        );
        let result = http.execute(&descriptor, args).await;
        if let Err(error) = result.as_ref() {
            tracing::debug!(command = name, error_kind = error.kind(), %error, "command failed");
        }
        result
    }

    pub async fn call(&self, command: Command, args: &InvocationArgs) -> Result<Value, DispatchError> {
        self.invoke(command.name(), args).await
    }

    /// Invokes and decodes the result into `T`.
    pub async fn invoke_as<T: DeserializeOwned>(
        &self,
        command: Command,
        args: &InvocationArgs,
    ) -> Result<T, DispatchError> {
        let value = self.call(command, args).await?;
        serde_json::from_value(value).map_err(|error| DispatchError::Decode {
            command: command.name().to_string(),
            message: error.to_string(),
        })
    }

    /// Subscribes to a native push event.
    ///
    /// `None` means push delivery is not possible in the current environment
    /// and the caller should poll instead.
    pub async fn listen(&self, event: &str) -> Option<Result<EventReceiver, DispatchError>> {
        let native = self.available_native()?;
        if !native.supports_events() {
            return None;
        }
        Some(native.listen(event).await)
    }

    fn available_native(&self) -> Option<&Arc<dyn NativeBridge>> {
        self.native.as_ref().filter(|native| native.is_available())
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("native", &self.native.is_some())
            .field("http", &self.http.is_some())
            .field("active", &self.active_transport())
            .finish()
    }
}
