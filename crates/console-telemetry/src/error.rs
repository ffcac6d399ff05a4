use console_client_core::DispatchError;

use crate::feed::FeedKind;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TelemetryError {
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
    #[error("unexpected {feed} feed payload: {message}")]
    Payload { feed: FeedKind, message: String },
}

impl TelemetryError {
    pub(crate) fn payload(feed: FeedKind, error: impl std::fmt::Display) -> Self {
        Self::Payload {
            feed,
            message: error.to_string(),
        }
    }
}
