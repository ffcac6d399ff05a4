#![allow(clippy::print_stdout, clippy::print_stderr)]
#![cfg_attr(test, allow(clippy::expect_used, clippy::panic))]

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use console_client_core::auth::env_session_token;
use console_client_core::{
    ConsoleConfig, Dispatcher, InvocationArgs, SessionCredentials, UnauthorizedNotifier,
    normalize_base_url,
};
use console_http_client::{HttpCommandClient, HttpCommandClientConfig};
use console_telemetry::{FeedEntry, FeedKind, LogQuery, TelemetryHub};

mod cli;
mod output;

use cli::{ConsoleCli, ConsoleCommand, InvokeArgs, TailArgs};

struct Session {
    config: ConsoleConfig,
    dispatcher: Dispatcher,
    unauthorized: Arc<UnauthorizedNotifier>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let ConsoleCli {
        config,
        base_url,
        command,
    } = ConsoleCli::parse();

    match command {
        ConsoleCommand::Commands => {
            output::print_registry();
            Ok(())
        }
        ConsoleCommand::Invoke(args) => {
            let session = connect(config.as_deref(), base_url.as_deref())?;
            invoke(&session, args).await
        }
        ConsoleCommand::Tail(args) => {
            let session = connect(config.as_deref(), base_url.as_deref())?;
            tail(&session, args).await
        }
    }
}

fn connect(config_path: Option<&Path>, base_url: Option<&str>) -> Result<Session> {
    let config = match config_path {
        Some(path) => ConsoleConfig::from_toml_file(path)
            .with_context(|| format!("load console config {}", path.display()))?,
        None => ConsoleConfig::default(),
    };
    let (config, source) = match base_url {
        Some(base_url) => {
            let base_url = normalize_base_url(base_url).context("invalid --base-url")?;
            (
                ConsoleConfig {
                    base_url,
                    ..config
                },
                "flag",
            )
        }
        None => config.resolve().context("resolve console base url")?,
    };

    let credentials = SessionCredentials::new();
    if let Some(token) = env_session_token() {
        credentials
            .set(&token)
            .context("invalid PROXY_CONSOLE_API_KEY")?;
    }
    let unauthorized = Arc::new(UnauthorizedNotifier::new(
        credentials,
        config.unauthorized_debounce(),
    ));
    let client = HttpCommandClient::new(
        HttpCommandClientConfig {
            base_url: config.base_url.clone(),
            timeout_ms: config.timeout_ms,
        },
        unauthorized.clone(),
    )
    .context("build console http client")?;

    tracing::info!(
        base_url = %config.base_url,
        source,
        authenticated = unauthorized.credentials().is_present(),
        "console backend resolved"
    );
    Ok(Session {
        config,
        dispatcher: Dispatcher::http(Arc::new(client)),
        unauthorized,
    })
}

async fn invoke(session: &Session, args: InvokeArgs) -> Result<()> {
    let mut invocation = InvocationArgs::new();
    for (key, value) in args.args {
        invocation.insert(key, value);
    }
    let value = session
        .dispatcher
        .invoke(&args.command, &invocation)
        .await
        .with_context(|| format!("command `{}` failed", args.command))?;
    output::print_json(&value, args.compact)
}

async fn tail(session: &Session, args: TailArgs) -> Result<()> {
    let feed = args.feed.kind();
    let hub = TelemetryHub::new(session.dispatcher.clone(), &session.config);
    let query = LogQuery {
        filter: args.filter.clone(),
        errors_only: args.errors_only,
        page: 1,
        page_size: args.limit,
    };

    hub.refresh(feed, &query)
        .await
        .with_context(|| format!("initial {feed} log pull"))?;
    match feed {
        FeedKind::Requests => {
            for entry in hub.requests().view().iter().rev() {
                println!("{}", output::format_request(entry));
            }
            eprintln!(
                "-- {}",
                output::format_counts(hub.requests().stats(), hub.requests().total())
            );
        }
        FeedKind::Debug => {
            for entry in hub.debug().view().iter().rev() {
                if output::debug_matches(entry, &args.filter) {
                    println!("{}", output::format_debug(entry));
                }
            }
        }
    }

    let filter = args.filter;
    let _printer = hub.on_entry(feed, move |entry| {
        let visible = match &entry {
            FeedEntry::Debug(debug) => output::debug_matches(debug, &filter),
            FeedEntry::Request(_) => true,
        };
        if visible {
            output::print_feed_entry(&entry);
        }
    });
    let outcome = hub.enable(feed).await;
    tracing::info!(feed = %feed, outcome = ?outcome, "following feed; ctrl-c to stop");

    let mut rejected = session.unauthorized.subscribe();
    let result = tokio::select! {
        signal = tokio::signal::ctrl_c() => signal.context("listen for ctrl-c"),
        rejected = rejected.recv() => match rejected {
            Ok(signal) => Err(anyhow::anyhow!(
                "backend rejected the session credential (signal {}); set PROXY_CONSOLE_API_KEY",
                signal.sequence
            )),
            Err(error) => Err(anyhow::anyhow!("unauthorized signal channel closed: {error}")),
        },
    };
    hub.shutdown();

    if feed == FeedKind::Requests {
        eprintln!(
            "-- {}",
            output::format_counts(hub.requests().stats(), hub.requests().total())
        );
    }
    result
}
