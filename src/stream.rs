//! Live status feed: repeated `GET {path}` turned into log lines.

use std::time::Duration;

use async_stream::stream;
use futures::Stream;
use serde::Serialize;
use serde_json::Value;
use time::macros::format_description;
use time::OffsetDateTime;
use tokio::time::{interval, sleep_until, Instant, MissedTickBehavior};
use tracing::debug;

use crate::client::MorkClient;
use crate::config::PlaygroundConfig;
use crate::envelope::Envelope;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Success,
    Error,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct StatusLogEntry {
    pub timestamp: String,
    pub level: LogLevel,
    pub message: String,
}

impl StatusLogEntry {
    pub fn new(level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            timestamp: clock_time(),
            level,
            message: message.into(),
        }
    }

    pub fn from_status(status: &Envelope) -> Self {
        if !status.is_success() {
            return Self::new(
                LogLevel::Error,
                status.message().unwrap_or("status request failed"),
            );
        }
        let message = match status.payload() {
            Some(Value::String(text)) => text.trim().to_string(),
            Some(Value::Object(map)) => match map.get("status").and_then(Value::as_str) {
                Some(word) if map.len() == 1 => format!("System status: {word}"),
                _ => Value::Object(map.clone()).to_string(),
            },
            Some(other) => other.to_string(),
            None => "No output".to_string(),
        };
        Self::new(LogLevel::Success, message)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StreamSettings {
    pub interval: Duration,
    pub max_duration: Duration,
}

impl StreamSettings {
    pub fn from_config(config: &PlaygroundConfig) -> Self {
        Self {
            interval: config.stream_interval,
            max_duration: config.stream_max_duration,
        }
    }
}

/// Queries `path` once per interval until `max_duration` elapses or the
/// stream is dropped. Failed requests become `Error` entries; the stream
/// keeps going.
pub fn status_stream(
    client: MorkClient,
    path: String,
    settings: StreamSettings,
) -> impl Stream<Item = StatusLogEntry> {
    stream! {
        let deadline = Instant::now() + settings.max_duration;
        let mut ticker = interval(settings.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        yield StatusLogEntry::new(LogLevel::Info, format!("Streaming status from {path}"));
        loop {
            tokio::select! {
                biased;
                _ = sleep_until(deadline) => break,
                _ = ticker.tick() => {}
            }
            let status = client.status(&path).await;
            debug!(path = %path, success = status.is_success(), "status stream tick");
            yield StatusLogEntry::from_status(&status);
        }
        yield StatusLogEntry::new(LogLevel::Info, "Status stream has been stopped");
    }
}

fn clock_time() -> String {
    let now = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());
    now.format(format_description!("[hour]:[minute]:[second]"))
        .unwrap_or_default()
}
