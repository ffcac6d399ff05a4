use std::collections::HashMap;
use std::fmt;
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Delete,
    Patch,
}

impl HttpMethod {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Delete => "DELETE",
            Self::Patch => "PATCH",
        }
    }

    /// POST and PATCH send leftover arguments as a JSON body; GET and DELETE
    /// move them into the query string.
    #[must_use]
    pub fn carries_body(self) -> bool {
        matches!(self, Self::Post | Self::Patch)
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// HTTP mapping for one logical command. `path_template` may contain `:name`
/// segments that are filled from the invocation arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandDescriptor {
    pub name: &'static str,
    pub path_template: &'static str,
    pub method: HttpMethod,
}

impl CommandDescriptor {
    #[must_use]
    pub const fn new(name: &'static str, method: HttpMethod, path_template: &'static str) -> Self {
        Self {
            name,
            path_template,
            method,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    ListAccounts,
    GetCurrentAccount,
    SwitchAccount,
    DeleteAccount,
    RefreshAccountQuota,
    UpdateAccountLabel,
    GetProxyStatus,
    StartProxyService,
    StopProxyService,
    SetProxyMonitorEnabled,
    GetProxyStats,
    GetProxyLogsFiltered,
    GetProxyLogsCountFiltered,
    GetProxyLogDetail,
    ClearProxyLogs,
    GetTokenUsageByIp,
    GetDebugConsoleLogs,
    ClearDebugConsoleLogs,
    LoadConfig,
    SaveConfig,
    OpenDataFolder,
    ShowMainWindow,
}

impl Command {
    pub const ALL: [Command; 22] = [
        Self::ListAccounts,
        Self::GetCurrentAccount,
        Self::SwitchAccount,
        Self::DeleteAccount,
        Self::RefreshAccountQuota,
        Self::UpdateAccountLabel,
        Self::GetProxyStatus,
        Self::StartProxyService,
        Self::StopProxyService,
        Self::SetProxyMonitorEnabled,
        Self::GetProxyStats,
        Self::GetProxyLogsFiltered,
        Self::GetProxyLogsCountFiltered,
        Self::GetProxyLogDetail,
        Self::ClearProxyLogs,
        Self::GetTokenUsageByIp,
        Self::GetDebugConsoleLogs,
        Self::ClearDebugConsoleLogs,
        Self::LoadConfig,
        Self::SaveConfig,
        Self::OpenDataFolder,
        Self::ShowMainWindow,
    ];

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::ListAccounts => "list_accounts",
            Self::GetCurrentAccount => "get_current_account",
            Self::SwitchAccount => "switch_account",
            Self::DeleteAccount => "delete_account",
            Self::RefreshAccountQuota => "refresh_account_quota",
            Self::UpdateAccountLabel => "update_account_label",
            Self::GetProxyStatus => "get_proxy_status",
            Self::StartProxyService => "start_proxy_service",
            Self::StopProxyService => "stop_proxy_service",
            Self::SetProxyMonitorEnabled => "set_proxy_monitor_enabled",
            Self::GetProxyStats => "get_proxy_stats",
            Self::GetProxyLogsFiltered => "get_proxy_logs_filtered",
            Self::GetProxyLogsCountFiltered => "get_proxy_logs_count_filtered",
            Self::GetProxyLogDetail => "get_proxy_log_detail",
            Self::ClearProxyLogs => "clear_proxy_logs",
            Self::GetTokenUsageByIp => "get_token_usage_by_ip",
            Self::GetDebugConsoleLogs => "get_debug_console_logs",
            Self::ClearDebugConsoleLogs => "clear_debug_console_logs",
            Self::LoadConfig => "load_config",
            Self::SaveConfig => "save_config",
            Self::OpenDataFolder => "open_data_folder",
            Self::ShowMainWindow => "show_main_window",
        }
    }

    /// HTTP mapping, or `None` for commands only the native host can serve.
    #[must_use]
    pub fn descriptor(self) -> Option<CommandDescriptor> {
        use HttpMethod::{Delete, Get, Patch, Post};

        let (method, path) = match self {
            Self::ListAccounts => (Get, "/api/accounts"),
            Self::GetCurrentAccount => (Get, "/api/accounts/current"),
            Self::SwitchAccount => (Post, "/api/accounts/:accountId/switch"),
            Self::DeleteAccount => (Delete, "/api/accounts/:accountId"),
            Self::RefreshAccountQuota => (Post, "/api/accounts/:accountId/quota/refresh"),
            Self::UpdateAccountLabel => (Patch, "/api/accounts/:accountId"),
            Self::GetProxyStatus => (Get, "/api/proxy/status"),
            Self::StartProxyService => (Post, "/api/proxy/start"),
            Self::StopProxyService => (Post, "/api/proxy/stop"),
            Self::SetProxyMonitorEnabled => (Post, "/api/proxy/monitor"),
            Self::GetProxyStats => (Get, "/api/proxy/stats"),
            Self::GetProxyLogsFiltered => (Get, "/api/proxy/logs"),
            Self::GetProxyLogsCountFiltered => (Get, "/api/proxy/logs/count"),
            Self::GetProxyLogDetail => (Get, "/api/proxy/logs/:logId"),
            Self::ClearProxyLogs => (Delete, "/api/proxy/logs"),
            Self::GetTokenUsageByIp => (Get, "/api/proxy/stats/ip"),
            Self::GetDebugConsoleLogs => (Get, "/api/debug/logs"),
            Self::ClearDebugConsoleLogs => (Delete, "/api/debug/logs"),
            Self::LoadConfig => (Get, "/api/config"),
            Self::SaveConfig => (Post, "/api/config"),
            Self::OpenDataFolder | Self::ShowMainWindow => return None,
        };
        Some(CommandDescriptor::new(self.name(), method, path))
    }

    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        static BY_NAME: OnceLock<HashMap<&'static str, Command>> = OnceLock::new();
        BY_NAME
            .get_or_init(|| {
                Self::ALL
                    .iter()
                    .map(|command| (command.name(), *command))
                    .collect()
            })
            .get(name)
            .copied()
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Named arguments for one command invocation.
///
/// Transports read from a shared reference and build their own working copy,
/// so the caller's value is never modified by a dispatch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InvocationArgs(Map<String, Value>);

impl InvocationArgs {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert. Values that fail to serialize are stored as null.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        self.insert(key, serde_json::to_value(value).unwrap_or(Value::Null));
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.0.insert(key.into(), value)
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    #[must_use]
    pub fn to_value(&self) -> Value {
        Value::Object(self.0.clone())
    }

    /// Accepts a JSON object; anything else is rejected.
    #[must_use]
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(map) => Some(Self(map)),
            Value::Null => Some(Self::default()),
            _ => None,
        }
    }
}

impl From<Map<String, Value>> for InvocationArgs {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}
