use serde::{Deserialize, Serialize};
use std::fs;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{PlaygroundError, Result};

pub const DEFAULT_SERVER_URL: &str = "http://127.0.0.1:8000";
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(3);
pub const DEFAULT_MAX_POLL_DURATION: Duration = Duration::from_secs(60);
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
pub const DEFAULT_STREAM_INTERVAL: Duration = Duration::from_secs(1);
pub const DEFAULT_STREAM_MAX_DURATION: Duration = Duration::from_secs(30);

/// Which endpoint layout the backend speaks for clear/copy/export/import.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApiDialect {
    /// `GET /clear/{expr}`, `GET /copy/{src}/{dst}`, `GET /export/{p}/{t}/?...`
    #[default]
    PathParams,
    /// `POST /clear`, `POST /copy {pattern, template}`, `POST /export {uri, format}`
    JsonBody,
}

impl FromStr for ApiDialect {
    type Err = PlaygroundError;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "path_params" | "path" => Ok(Self::PathParams),
            "json_body" | "json" => Ok(Self::JsonBody),
            other => Err(PlaygroundError::Config(format!(
                "unknown api dialect `{other}` (expected path-params or json-body)"
            ))),
        }
    }
}

/// On-disk shape; every field optional so partial files layer over defaults.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ConfigFile {
    pub server_url: Option<String>,
    pub dialect: Option<ApiDialect>,
    pub poll_interval_ms: Option<u64>,
    /// `0` disables the polling deadline.
    pub max_poll_secs: Option<u64>,
    pub request_timeout_secs: Option<u64>,
    pub stream_interval_ms: Option<u64>,
    pub stream_max_secs: Option<u64>,
}

/// Process-wide settings, built once at startup and never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaygroundConfig {
    pub server_url: String,
    pub dialect: ApiDialect,
    pub poll_interval: Duration,
    /// `None` polls until the backend answers, however long that takes.
    pub max_poll_duration: Option<Duration>,
    pub request_timeout: Duration,
    pub stream_interval: Duration,
    pub stream_max_duration: Duration,
}

impl Default for PlaygroundConfig {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.to_string(),
            dialect: ApiDialect::default(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_poll_duration: Some(DEFAULT_MAX_POLL_DURATION),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            stream_interval: DEFAULT_STREAM_INTERVAL,
            stream_max_duration: DEFAULT_STREAM_MAX_DURATION,
        }
    }
}

impl PlaygroundConfig {
    pub fn with_server_url(server_url: &str) -> Result<Self> {
        Ok(Self {
            server_url: normalize_server_url(server_url)?,
            ..Self::default()
        })
    }

    pub fn from_file(path: &str) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|e| PlaygroundError::Config(format!("cannot read {path}: {e}")))?;
        let file: ConfigFile =
            serde_json::from_str(&raw).map_err(|e| PlaygroundError::Config(e.to_string()))?;
        Self::default().apply_file(file)
    }

    /// Defaults, then an optional JSON file, then `MORK_*` environment variables.
    pub fn load(path: Option<&str>) -> Result<Self> {
        let base = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        base.apply_env(|key| std::env::var(key).ok())
    }

    pub fn apply_file(mut self, file: ConfigFile) -> Result<Self> {
        if let Some(url) = file.server_url {
            self.server_url = normalize_server_url(&url)?;
        }
        if let Some(dialect) = file.dialect {
            self.dialect = dialect;
        }
        if let Some(ms) = file.poll_interval_ms {
            self.poll_interval = positive_millis("poll_interval_ms", ms)?;
        }
        if let Some(secs) = file.max_poll_secs {
            self.max_poll_duration = deadline_from_secs(secs);
        }
        if let Some(secs) = file.request_timeout_secs {
            self.request_timeout = Duration::from_secs(secs.max(1));
        }
        if let Some(ms) = file.stream_interval_ms {
            self.stream_interval = positive_millis("stream_interval_ms", ms)?;
        }
        if let Some(secs) = file.stream_max_secs {
            self.stream_max_duration = Duration::from_secs(secs.max(1));
        }
        Ok(self)
    }

    pub fn apply_env<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(url) = lookup("MORK_SERVER_URL") {
            self.server_url = normalize_server_url(&url)?;
        }
        if let Some(dialect) = lookup("MORK_API_DIALECT") {
            self.dialect = dialect.parse()?;
        }
        if let Some(ms) = lookup("MORK_POLL_INTERVAL_MS") {
            self.poll_interval = positive_millis("MORK_POLL_INTERVAL_MS", parse_u64(&ms)?)?;
        }
        if let Some(secs) = lookup("MORK_MAX_POLL_SECS") {
            self.max_poll_duration = deadline_from_secs(parse_u64(&secs)?);
        }
        Ok(self)
    }
}

pub fn normalize_server_url(raw: &str) -> Result<String> {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return Err(PlaygroundError::Config(
            "server url cannot be empty".to_string(),
        ));
    }
    if !(trimmed.starts_with("http://") || trimmed.starts_with("https://")) {
        return Err(PlaygroundError::Config(format!(
            "server url must start with http:// or https://, got `{trimmed}`"
        )));
    }
    Ok(trimmed.to_string())
}

pub fn deadline_from_secs(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}

fn positive_millis(field: &str, ms: u64) -> Result<Duration> {
    if ms == 0 {
        return Err(PlaygroundError::Config(format!("{field} must be positive")));
    }
    Ok(Duration::from_millis(ms))
}

fn parse_u64(raw: &str) -> Result<u64> {
    raw.trim()
        .parse::<u64>()
        .map_err(|e| PlaygroundError::Config(format!("invalid number `{raw}`: {e}")))
}
