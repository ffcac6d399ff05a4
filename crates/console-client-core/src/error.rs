use crate::dispatch::TransportKind;

/// Failure of a single command invocation.
///
/// Only a success body that is not JSON is recovered locally (it comes back as
/// a string value); every variant here reaches the caller. Nothing retries.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
    #[error("command `{name}` is not supported in the {transport} transport")]
    UnsupportedCommand {
        name: String,
        transport: TransportKind,
    },
    #[error("{message}")]
    Transport { message: String },
    #[error("{message}")]
    Http { status: u16, message: String },
    #[error("{message}")]
    Unauthorized { message: String },
    #[error("failed to decode `{command}` result: {message}")]
    Decode { command: String, message: String },
}

impl DispatchError {
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    pub fn unsupported(name: impl Into<String>, transport: TransportKind) -> Self {
        Self::UnsupportedCommand {
            name: name.into(),
            transport,
        }
    }

    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            Self::Unauthorized { .. } => Some(401),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized { .. })
    }

    /// Short machine-readable class, used as a structured log field.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UnsupportedCommand { .. } => "registry",
            Self::Transport { .. } => "transport",
            Self::Http { .. } => "protocol",
            Self::Unauthorized { .. } => "unauthorized",
            Self::Decode { .. } => "decode",
        }
    }
}
