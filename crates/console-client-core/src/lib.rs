//! Client core for the proxy management console.
//!
//! Every console feature talks to the backend through [`Dispatcher::invoke`],
//! which forwards to the native host bridge when one is present and falls back
//! to the HTTP transport otherwise. The HTTP transport itself lives in
//! `console-http-client`; this crate owns the pieces both transports share:
//! the command registry, the session credential and the debounced
//! unauthorized signal.

#![cfg_attr(test, allow(clippy::expect_used))]

pub mod auth;
pub mod command;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod native;
pub mod unauthorized;

pub use auth::{AuthInputError, SessionCredentials, normalize_base_url};
pub use command::{Command, CommandDescriptor, HttpMethod, InvocationArgs};
pub use config::{ConfigError, ConsoleConfig, FeedSettings};
pub use dispatch::{CommandTransport, Dispatcher, EventReceiver, NativeBridge, TransportKind};
pub use error::DispatchError;
pub use native::LocalBridge;
pub use unauthorized::{UnauthorizedNotifier, UnauthorizedSignal};
