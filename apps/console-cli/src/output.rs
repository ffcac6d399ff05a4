use chrono::{DateTime, Local, Utc};
use console_client_core::Command;
use console_telemetry::{DebugLogEntry, FeedEntry, LogStats, RequestLogEntry};
use serde_json::Value;

pub fn print_json(value: &Value, compact: bool) -> anyhow::Result<()> {
    let rendered = if compact {
        serde_json::to_string(value)?
    } else {
        serde_json::to_string_pretty(value)?
    };
    println!("{rendered}");
    Ok(())
}

pub fn print_registry() {
    for command in Command::ALL {
        let route = command.descriptor().map_or_else(
            || "native only".to_string(),
            |descriptor| format!("{} {}", descriptor.method, descriptor.path_template),
        );
        println!("{:<32} {route}", command.name());
    }
}

pub fn print_feed_entry(entry: &FeedEntry) {
    match entry {
        FeedEntry::Request(entry) => println!("{}", format_request(entry)),
        FeedEntry::Debug(entry) => println!("{}", format_debug(entry)),
    }
}

pub fn format_request(entry: &RequestLogEntry) -> String {
    let mut line = format!(
        "{} {} {:<6} {}",
        format_time(entry.timestamp),
        entry.status,
        entry.method,
        entry.url
    );
    match (&entry.model, &entry.mapped_model) {
        (Some(model), Some(mapped)) if model != mapped => {
            line.push_str(&format!(" {model}->{mapped}"));
        }
        (Some(model), _) => line.push_str(&format!(" {model}")),
        _ => {}
    }
    line.push_str(&format!(" {}ms", entry.duration));
    if let (Some(input), Some(output)) = (entry.input_tokens, entry.output_tokens) {
        line.push_str(&format!(" tokens={input}/{output}"));
    }
    if let Some(account) = &entry.account_email {
        line.push_str(&format!(" [{account}]"));
    }
    if let Some(error) = entry.error.as_deref().filter(|error| !error.is_empty()) {
        line.push_str(&format!(" error={error}"));
    }
    line
}

pub fn format_debug(entry: &DebugLogEntry) -> String {
    let mut line = format!(
        "{} {:<5} {}",
        format_time(entry.timestamp),
        entry.level,
        entry.message
    );
    if !entry.target.is_empty() {
        line = format!("{line} ({})", entry.target);
    }
    line
}

pub fn format_counts(stats: Option<LogStats>, total: Option<u64>) -> String {
    let total = total.map_or_else(|| "?".to_string(), |total| total.to_string());
    match stats {
        Some(stats) => format!(
            "matching={total} total={} ok={} errors={}",
            stats.total_requests, stats.success_count, stats.error_count
        ),
        None => format!("entries={total}"),
    }
}

/// Case-insensitive match used for feeds the backend cannot filter.
pub fn debug_matches(entry: &DebugLogEntry, filter: &str) -> bool {
    if filter.is_empty() {
        return true;
    }
    let needle = filter.to_lowercase();
    entry.message.to_lowercase().contains(&needle)
        || entry.target.to_lowercase().contains(&needle)
        || entry.level.to_lowercase().contains(&needle)
}

fn format_time(timestamp_ms: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(timestamp_ms).map_or_else(
        || timestamp_ms.to_string(),
        |time| {
            time.with_timezone(&Local)
                .format("%H:%M:%S%.3f")
                .to_string()
        },
    )
}
