//! One wrapper per backend endpoint.
//!
//! Every public call performs exactly one HTTP request and folds whatever
//! happens (non-2xx status, transport failure, unparsable body) into an
//! [`Envelope`]. Nothing here retries; resubmitting is the caller's call.

use std::fmt;
use std::str::FromStr;

use reqwest::header::{HeaderValue, CONTENT_TYPE};
use reqwest::{Method, RequestBuilder, Url};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tracing::{debug, info};

use crate::config::{ApiDialect, PlaygroundConfig};
use crate::envelope::Envelope;
use crate::error::{PlaygroundError, Result};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataFormat {
    #[default]
    Metta,
    Json,
    Csv,
    Raw,
}

impl DataFormat {
    pub const ALL: [DataFormat; 4] = [
        DataFormat::Metta,
        DataFormat::Json,
        DataFormat::Csv,
        DataFormat::Raw,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            DataFormat::Metta => "metta",
            DataFormat::Json => "json",
            DataFormat::Csv => "csv",
            DataFormat::Raw => "raw",
        }
    }
}

impl fmt::Display for DataFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DataFormat {
    type Err = PlaygroundError;

    fn from_str(value: &str) -> Result<Self> {
        DataFormat::ALL
            .into_iter()
            .find(|format| format.as_str().eq_ignore_ascii_case(value.trim()))
            .ok_or_else(|| PlaygroundError::validation(format!("Unsupported format `{value}`")))
    }
}

/// How the graph database should materialize loaded data.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LoadType {
    #[default]
    Triples,
    NodeProperties,
    Labels,
}

impl LoadType {
    pub const ALL: [LoadType; 3] = [LoadType::Triples, LoadType::NodeProperties, LoadType::Labels];

    pub fn as_str(self) -> &'static str {
        match self {
            LoadType::Triples => "triples",
            LoadType::NodeProperties => "node-properties",
            LoadType::Labels => "labels",
        }
    }
}

impl fmt::Display for LoadType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LoadType {
    type Err = PlaygroundError;

    fn from_str(value: &str) -> Result<Self> {
        LoadType::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(value.trim()))
            .ok_or_else(|| PlaygroundError::validation(format!("Unsupported load type `{value}`")))
    }
}

/// File contents staged for `POST /upload`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UploadFile {
    pub name: String,
    pub bytes: Vec<u8>,
    pub mime: Option<String>,
}

#[derive(Clone, Debug)]
pub struct MorkClient {
    http: reqwest::Client,
    base_url: String,
    dialect: ApiDialect,
}

impl MorkClient {
    pub fn new(config: &PlaygroundConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(std::time::Duration::from_secs(2))
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| PlaygroundError::Config(e.to_string()))?;
        Url::parse(&config.server_url)
            .map_err(|e| PlaygroundError::Config(format!("invalid server url: {e}")))?;
        Ok(Self {
            http,
            base_url: config.server_url.clone(),
            dialect: config.dialect,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn dialect(&self) -> ApiDialect {
        self.dialect
    }

    pub async fn clear(&self, sub_expr: &str) -> Envelope {
        self.try_clear(sub_expr).await.into()
    }

    async fn try_clear(&self, sub_expr: &str) -> Result<Envelope> {
        match self.dialect {
            ApiDialect::PathParams => {
                let url = self.endpoint(&["clear", sub_expr])?;
                let body = self.execute(self.http.get(url)).await?;
                Ok(Envelope::success(
                    Value::String(body),
                    format!("Data under sub expression {sub_expr} cleared successfully"),
                ))
            }
            ApiDialect::JsonBody => {
                let url = self.endpoint(&["clear"])?;
                let body = self.execute(self.http.post(url)).await?;
                Ok(Envelope::success(
                    lenient_body(&body),
                    "All data cleared successfully",
                ))
            }
        }
    }

    pub async fn copy(&self, pattern: &str, template: &str) -> Envelope {
        self.try_copy(pattern, template).await.into()
    }

    async fn try_copy(&self, pattern: &str, template: &str) -> Result<Envelope> {
        let request = match self.dialect {
            ApiDialect::PathParams => self.http.get(self.endpoint(&["copy", pattern, template])?),
            ApiDialect::JsonBody => self
                .http
                .post(self.endpoint(&["copy"])?)
                .json(&json!({ "pattern": pattern, "template": template })),
        };
        let body = self.execute(request).await?;
        Ok(Envelope::success(
            lenient_body(&body),
            format!("Data copied from {pattern} to {template} successfully"),
        ))
    }

    pub async fn count(&self, pattern: &str) -> Envelope {
        self.try_count(pattern).await.into()
    }

    async fn try_count(&self, pattern: &str) -> Result<Envelope> {
        let request = self
            .http
            .post(self.endpoint(&["count"])?)
            .json(&json!({ "pattern": pattern }));
        let data = strict_json(&self.execute(request).await?)?;
        let count = data.get("count").and_then(Value::as_u64).ok_or_else(|| {
            PlaygroundError::Protocol(format!("count response has no numeric `count`: {data}"))
        })?;
        Ok(Envelope::success(
            json!({ "count": count, "pattern": pattern }),
            format!("Found {count} matching items"),
        ))
    }

    pub async fn export(
        &self,
        pattern: &str,
        template: &str,
        uri: Option<&str>,
        format: DataFormat,
    ) -> Envelope {
        self.try_export(pattern, template, uri, format).await.into()
    }

    async fn try_export(
        &self,
        pattern: &str,
        template: &str,
        uri: Option<&str>,
        format: DataFormat,
    ) -> Result<Envelope> {
        let uri = uri.map(str::trim).filter(|uri| !uri.is_empty());
        let request = match self.dialect {
            ApiDialect::PathParams => {
                let mut query: Vec<(&str, &str)> = Vec::new();
                if let Some(uri) = uri {
                    query.push(("uri", uri));
                }
                query.push(("format", format.as_str()));
                self.http
                    .get(self.endpoint(&["export", pattern, template, ""])?)
                    .query(&query)
            }
            ApiDialect::JsonBody => self
                .http
                .post(self.endpoint(&["export"])?)
                .json(&json!({ "uri": uri, "format": format.as_str() })),
        };
        let body = self.execute(request).await?;
        Ok(Envelope::success(
            Value::String(body),
            format!("Data exported successfully to {}", uri.unwrap_or("memory")),
        ))
    }

    pub async fn import(
        &self,
        pattern: &str,
        template: &str,
        uri: &str,
        format: DataFormat,
    ) -> Envelope {
        self.try_import(pattern, template, uri, format).await.into()
    }

    async fn try_import(
        &self,
        pattern: &str,
        template: &str,
        uri: &str,
        format: DataFormat,
    ) -> Result<Envelope> {
        let uri = uri.trim();
        let request = match self.dialect {
            ApiDialect::PathParams => self
                .http
                .get(self.endpoint(&["import", pattern, template])?)
                .query(&[("uri", uri)]),
            ApiDialect::JsonBody => self
                .http
                .post(self.endpoint(&["import"])?)
                .json(&json!({ "uri": uri, "format": format.as_str() })),
        };
        let body = self.execute(request).await?;
        Ok(Envelope::success(
            Value::String(body),
            format!("Import request for {uri} has successfully been sent"),
        ))
    }

    pub async fn upload(&self, file: &UploadFile) -> Envelope {
        self.try_upload(file).await.into()
    }

    async fn try_upload(&self, file: &UploadFile) -> Result<Envelope> {
        let mut part =
            reqwest::multipart::Part::bytes(file.bytes.clone()).file_name(file.name.clone());
        if let Some(mime) = file.mime.as_deref() {
            part = part
                .mime_str(mime)
                .map_err(|e| PlaygroundError::validation(format!("invalid mime type: {e}")))?;
        }
        let form = reqwest::multipart::Form::new().part("file", part);
        let request = self.http.post(self.endpoint(&["upload"])?).multipart(form);
        let data = lenient_body(&self.execute(request).await?);
        let echo = json!({
            "filename": file.name,
            "size": format!("{:.2} KB", file.bytes.len() as f64 / 1024.0),
            "type": file.mime.as_deref().unwrap_or("unknown"),
            "uploaded_at": now_rfc3339(),
        });
        Ok(Envelope::success(
            merge_payload(echo, data),
            "File uploaded successfully",
        ))
    }

    pub async fn transform(&self, expr: &str) -> Envelope {
        self.try_transform(expr).await.into()
    }

    async fn try_transform(&self, expr: &str) -> Result<Envelope> {
        let request = self
            .http
            .post(self.endpoint(&["transform", ""])?)
            .header(CONTENT_TYPE, HeaderValue::from_static("text/plain"))
            .body(expr.to_string());
        let body = self.execute(request).await?;
        let payload = if body.trim().is_empty() {
            "$".to_string()
        } else {
            body
        };
        Ok(Envelope::success(
            Value::String(payload),
            "A thread has started executing the transformation task",
        ))
    }

    pub async fn metta_thread(&self, location: &str, expression: &str) -> Envelope {
        self.try_metta_thread(location, expression).await.into()
    }

    async fn try_metta_thread(&self, location: &str, expression: &str) -> Result<Envelope> {
        let request = self
            .http
            .post(self.endpoint(&["metta-thread"])?)
            .json(&json!({ "location": location, "expression": expression }));
        let data = strict_json(&self.execute(request).await?)?;
        Ok(Envelope::success(
            merge_payload(json!({ "location": location, "expression": expression }), data),
            format!("MeTTa expression executed in thread {location}"),
        ))
    }

    pub async fn suspend(&self, location: &str) -> Envelope {
        self.try_suspend(location).await.into()
    }

    async fn try_suspend(&self, location: &str) -> Result<Envelope> {
        let request = self
            .http
            .post(self.endpoint(&["suspend"])?)
            .json(&json!({ "location": location }));
        let data = strict_json(&self.execute(request).await?)?;
        Ok(Envelope::success(
            merge_payload(
                json!({ "location": location, "suspended_at": now_rfc3339() }),
                data,
            ),
            format!("Thread at location {location} has been suspended"),
        ))
    }

    pub async fn busywait(&self, millis: u64, lock_expr: bool) -> Envelope {
        self.try_busywait(millis, lock_expr).await.into()
    }

    async fn try_busywait(&self, millis: u64, lock_expr: bool) -> Result<Envelope> {
        let request = self
            .http
            .post(self.endpoint(&["busywait"])?)
            .json(&json!({ "millis": millis, "lock_expr": lock_expr }));
        let data = strict_json(&self.execute(request).await?)?;
        Ok(Envelope::success(
            merge_payload(json!({ "duration": millis, "locked": lock_expr }), data),
            format!("Busywait started for {millis}ms"),
        ))
    }

    pub async fn stop(&self, wait_for_idle: bool) -> Envelope {
        self.try_stop(wait_for_idle).await.into()
    }

    async fn try_stop(&self, wait_for_idle: bool) -> Result<Envelope> {
        let request = self
            .http
            .post(self.endpoint(&["stop"])?)
            .json(&json!({ "wait_for_idle": wait_for_idle }));
        let data = strict_json(&self.execute(request).await?)?;
        let how = if wait_for_idle {
            "after waiting for idle"
        } else {
            "immediately"
        };
        Ok(Envelope::success(
            merge_payload(
                json!({ "wait_for_idle": wait_for_idle, "stopped_at": now_rfc3339() }),
                data,
            ),
            format!("Server operations stopped {how}"),
        ))
    }

    /// Plain `GET {path}` against the backend, used by the status panel and stream.
    pub async fn status(&self, path: &str) -> Envelope {
        self.try_status(path).await.into()
    }

    async fn try_status(&self, path: &str) -> Result<Envelope> {
        let segments: Vec<&str> = path
            .trim()
            .trim_start_matches('/')
            .split('/')
            .collect();
        let body = self.execute(self.http.get(self.endpoint(&segments)?)).await?;
        Ok(Envelope::success(
            lenient_body(&body),
            "Server status information retrieved successfully",
        ))
    }

    /// `GET /status/{token}`: the polling primitive for background operations.
    ///
    /// The payload is the parsed JSON body, or the raw text when the backend
    /// answers with something that is not JSON.
    pub async fn status_of(&self, token: &str) -> Envelope {
        self.try_status_of(token).await.into()
    }

    async fn try_status_of(&self, token: &str) -> Result<Envelope> {
        let body = self
            .execute(self.http.get(self.endpoint(&["status", token])?))
            .await?;
        Ok(Envelope::success(lenient_body(&body), "status"))
    }

    pub async fn neo4j_connect(&self, uri: &str, user: &str, password: &str) -> Envelope {
        self.try_neo4j_connect(uri, user, password).await.into()
    }

    async fn try_neo4j_connect(&self, uri: &str, user: &str, password: &str) -> Result<Envelope> {
        let request = self
            .http
            .post(self.endpoint(&["neo4j", "connect"])?)
            .json(&json!({ "uri": uri, "user": user, "password": password }));
        let data = strict_json(&self.execute(request).await?)?;
        Ok(Envelope::success(
            merge_payload(
                json!({ "uri": uri, "user": user, "connected_at": now_rfc3339() }),
                data,
            ),
            "Successfully connected to Neo4j database",
        ))
    }

    pub async fn neo4j_load(&self, load_type: LoadType) -> Envelope {
        self.try_neo4j_load(load_type).await.into()
    }

    async fn try_neo4j_load(&self, load_type: LoadType) -> Result<Envelope> {
        let request = self
            .http
            .post(self.endpoint(&["neo4j", "load"])?)
            .json(&json!({ "load_type": load_type.as_str() }));
        let data = strict_json(&self.execute(request).await?)?;
        Ok(Envelope::success(
            merge_payload(json!({ "load_type": load_type.as_str() }), data),
            format!("Successfully loaded data as {load_type}"),
        ))
    }

    /// Appends percent-encoded path segments to the base url.
    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| PlaygroundError::Config(format!("invalid server url: {e}")))?;
        url.path_segments_mut()
            .map_err(|_| PlaygroundError::Config("server url cannot be a base".to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn execute(&self, request: RequestBuilder) -> Result<String> {
        let request = request.build()?;
        let method: Method = request.method().clone();
        let url = request.url().clone();
        info!(method = %method, url = %url, "backend request");

        let response = self.http.execute(request).await?;
        let status = response.status();
        let body = response.text().await?;
        info!(method = %method, url = %url, status = %status.as_u16(), "backend response");

        if !status.is_success() {
            debug!(body = %body, "backend rejected request");
            return Err(PlaygroundError::Transport(format!(
                "Status ({}): {}",
                status.as_u16(),
                body.trim()
            )));
        }
        Ok(body)
    }
}

fn strict_json(body: &str) -> Result<Value> {
    Ok(serde_json::from_str(body)?)
}

fn lenient_body(body: &str) -> Value {
    serde_json::from_str(body).unwrap_or_else(|_| Value::String(body.to_string()))
}

/// Request echo first, backend fields layered on top.
fn merge_payload(echo: Value, data: Value) -> Value {
    let mut merged = match echo {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    match data {
        Value::Object(map) => merged.extend(map),
        Value::Null => {}
        other => {
            merged.insert("response".to_string(), other);
        }
    }
    Value::Object(merged)
}

fn now_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_default()
}
