use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

pub const DEFAULT_CONSOLE_BASE_URL: &str = "http://127.0.0.1:8045";
pub const ENV_CONSOLE_BASE_URL: &str = "PROXY_CONSOLE_BASE_URL";
pub const ENV_CONSOLE_API_KEY: &str = "PROXY_CONSOLE_API_KEY";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthInputError {
    #[error("base url must not be empty")]
    EmptyBaseUrl,
    #[error("base url must use http:// or https:// and include a host")]
    InvalidBaseUrl,
    #[error("session token must not be empty")]
    EmptyToken,
}

/// Session-scoped bearer token.
///
/// Holds at most one value. The token is swapped as a whole on login and
/// cleared on logout or when the backend rejects it, so a reader never sees a
/// half-written credential. Nothing here touches disk.
#[derive(Clone, Default)]
pub struct SessionCredentials {
    slot: Arc<RwLock<Option<Arc<str>>>>,
}

impl SessionCredentials {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(token: &str) -> Result<Self, AuthInputError> {
        let credentials = Self::new();
        credentials.set(token)?;
        Ok(credentials)
    }

    pub fn set(&self, token: &str) -> Result<(), AuthInputError> {
        let token = normalize_token(token)?;
        *self.slot.write().unwrap_or_else(PoisonError::into_inner) = Some(Arc::from(token));
        Ok(())
    }

    /// Drops the live token. Returns `true` when a token was present.
    pub fn clear(&self) -> bool {
        self.slot
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .is_some()
    }

    #[must_use]
    pub fn current(&self) -> Option<Arc<str>> {
        self.slot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    #[must_use]
    pub fn is_present(&self) -> bool {
        self.slot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}

impl fmt::Debug for SessionCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionCredentials")
            .field("present", &self.is_present())
            .finish()
    }
}

/// Resolves the console backend base url: env override first, then the
/// configured value, then the local default.
pub fn resolve_console_base_url(
    configured: Option<&str>,
) -> Result<(String, &'static str), AuthInputError> {
    if let Some(base_url) = env_non_empty(ENV_CONSOLE_BASE_URL) {
        return normalize_base_url(&base_url).map(|normalized| (normalized, ENV_CONSOLE_BASE_URL));
    }
    if let Some(base_url) = configured
        .map(str::trim)
        .filter(|value| !value.is_empty())
    {
        return normalize_base_url(base_url).map(|normalized| (normalized, "config"));
    }
    normalize_base_url(DEFAULT_CONSOLE_BASE_URL).map(|normalized| (normalized, "default_local"))
}

/// Reads the session token seed from the environment, if any.
#[must_use]
pub fn env_session_token() -> Option<String> {
    std::env::var(ENV_CONSOLE_API_KEY)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

pub fn normalize_base_url(raw: &str) -> Result<String, AuthInputError> {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return Err(AuthInputError::EmptyBaseUrl);
    }
    if !(trimmed.starts_with("http://") || trimmed.starts_with("https://")) {
        return Err(AuthInputError::InvalidBaseUrl);
    }
    let Some((_, remainder)) = trimmed.split_once("://") else {
        return Err(AuthInputError::InvalidBaseUrl);
    };
    if remainder.trim().is_empty() || remainder.starts_with('/') {
        return Err(AuthInputError::InvalidBaseUrl);
    }
    Ok(trimmed.to_string())
}

fn normalize_token(raw: &str) -> Result<String, AuthInputError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(AuthInputError::EmptyToken);
    }
    Ok(trimmed.to_string())
}

fn env_non_empty(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().trim_end_matches('/').to_string())
        .filter(|value| !value.is_empty())
}
