use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use console_telemetry::FeedKind;
use serde_json::Value;

#[derive(Parser, Debug)]
#[command(name = "proxy-console")]
#[command(about = "Proxy management console client")]
pub struct ConsoleCli {
    /// TOML config file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Backend base url; takes precedence over env and config
    #[arg(long, global = true)]
    pub base_url: Option<String>,

    #[command(subcommand)]
    pub command: ConsoleCommand,
}

#[derive(Subcommand, Debug)]
pub enum ConsoleCommand {
    /// Invoke one command and print its result as JSON
    Invoke(InvokeArgs),
    /// Pull the newest page of a log feed, then follow it live
    Tail(TailArgs),
    /// List known commands and their HTTP routes
    Commands,
}

#[derive(Args, Debug)]
pub struct InvokeArgs {
    /// Command name, e.g. get_proxy_status
    pub command: String,

    /// Argument as key=value; the value is parsed as JSON when it can be
    #[arg(long = "arg", value_name = "KEY=VALUE", value_parser = parse_key_value)]
    pub args: Vec<(String, Value)>,

    /// Print JSON on one line
    #[arg(long)]
    pub compact: bool,
}

#[derive(Args, Debug)]
pub struct TailArgs {
    #[arg(long, value_enum, default_value_t = FeedArg::Requests)]
    pub feed: FeedArg,

    /// Substring filter (url, method, model, status, account)
    #[arg(long, default_value = "")]
    pub filter: String,

    /// Only failed requests (status outside 200..400)
    #[arg(long)]
    pub errors_only: bool,

    /// Entries in the initial page
    #[arg(long, default_value_t = 50)]
    pub limit: usize,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum FeedArg {
    Requests,
    Debug,
}

impl FeedArg {
    pub fn kind(self) -> FeedKind {
        match self {
            Self::Requests => FeedKind::Requests,
            Self::Debug => FeedKind::Debug,
        }
    }
}

fn parse_key_value(raw: &str) -> Result<(String, Value), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got `{raw}`"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("missing key in `{raw}`"));
    }
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((key.to_string(), value))
}
