use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::Value;

use super::{encode_component, require, BackendRequest};
use crate::client::{DataFormat, MorkClient, UploadFile};
use crate::envelope::Envelope;
use crate::error::{PlaygroundError, Result};
use crate::lifecycle::{interpret_completion_status, interpret_path_clear, PollVerdict};

pub const TRANSFORM_DONE_MESSAGE: &str = "Successfully transformed the space";
pub const UPLOAD_DONE_MESSAGE: &str = "Upload completed";
pub const COPY_DONE_MESSAGE: &str = "Copy completed";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClearRequest {
    pub sub_expr: String,
}

#[async_trait]
impl BackendRequest for ClearRequest {
    const NAME: &'static str = "clear";

    fn validate(&self) -> Result<()> {
        require(&self.sub_expr, "Sub expression is required")
    }

    async fn send(&self, client: &MorkClient) -> Envelope {
        client.clear(self.sub_expr.trim()).await
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CopyRequest {
    pub pattern: String,
    pub template: String,
}

#[async_trait]
impl BackendRequest for CopyRequest {
    const NAME: &'static str = "copy";

    fn validate(&self) -> Result<()> {
        both_required(&self.pattern, &self.template)
    }

    async fn send(&self, client: &MorkClient) -> Envelope {
        client.copy(&self.pattern, &self.template).await
    }

    fn poll_token(&self) -> Option<String> {
        Some(format!(
            "copy-{}-{}",
            encode_component(&self.pattern),
            encode_component(&self.template)
        ))
    }

    fn interpret(&self, status: Envelope, _submitted: &Envelope) -> PollVerdict {
        match status.payload() {
            Some(payload) => interpret_completion_status(payload, COPY_DONE_MESSAGE),
            None => PollVerdict::Complete(Envelope::failure("empty status response")),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CountRequest {
    pub pattern: String,
}

#[async_trait]
impl BackendRequest for CountRequest {
    const NAME: &'static str = "count";

    fn validate(&self) -> Result<()> {
        require(&self.pattern, "Pattern is required")
    }

    async fn send(&self, client: &MorkClient) -> Envelope {
        client.count(&self.pattern).await
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExportRequest {
    pub pattern: String,
    pub template: String,
    /// Empty exports into the response body.
    pub uri: String,
    pub format: DataFormat,
}

#[async_trait]
impl BackendRequest for ExportRequest {
    const NAME: &'static str = "export";

    fn validate(&self) -> Result<()> {
        both_required(&self.pattern, &self.template)
    }

    async fn send(&self, client: &MorkClient) -> Envelope {
        let uri = Some(self.uri.trim()).filter(|uri| !uri.is_empty());
        client
            .export(&self.pattern, &self.template, uri, self.format)
            .await
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImportRequest {
    pub pattern: String,
    pub template: String,
    pub uri: String,
    pub format: DataFormat,
}

#[async_trait]
impl BackendRequest for ImportRequest {
    const NAME: &'static str = "import";

    fn validate(&self) -> Result<()> {
        require(&self.uri, "URI is required")?;
        both_required(&self.pattern, &self.template)
    }

    async fn send(&self, client: &MorkClient) -> Envelope {
        client
            .import(&self.pattern, &self.template, &self.uri, self.format)
            .await
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UploadRequest {
    pub file: Option<PathBuf>,
}

impl UploadRequest {
    pub fn file_name(&self) -> Option<String> {
        self.file
            .as_deref()
            .and_then(Path::file_name)
            .map(|name| name.to_string_lossy().into_owned())
    }
}

#[async_trait]
impl BackendRequest for UploadRequest {
    const NAME: &'static str = "upload";

    fn validate(&self) -> Result<()> {
        match self.file_name() {
            Some(name) if !name.trim().is_empty() => Ok(()),
            _ => Err(PlaygroundError::validation("Please select a file to upload")),
        }
    }

    async fn send(&self, client: &MorkClient) -> Envelope {
        let (Some(path), Some(name)) = (self.file.as_deref(), self.file_name()) else {
            return Envelope::failure("Please select a file to upload");
        };
        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(err) => {
                return Envelope::failure(format!("Failed to read {}: {err}", path.display()))
            }
        };
        let file = UploadFile {
            mime: guess_mime(path).map(str::to_string),
            name,
            bytes,
        };
        client.upload(&file).await
    }

    fn poll_token(&self) -> Option<String> {
        self.file_name()
    }

    fn interpret(&self, status: Envelope, submitted: &Envelope) -> PollVerdict {
        let Some(payload) = status.payload() else {
            return PollVerdict::Complete(Envelope::failure("empty status response"));
        };
        interpret_path_clear(payload, "Upload failed.", || {
            let echo = submitted.payload().cloned().unwrap_or(Value::Null);
            Envelope::success(echo, UPLOAD_DONE_MESSAGE)
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransformRequest {
    pub expr: String,
}

#[async_trait]
impl BackendRequest for TransformRequest {
    const NAME: &'static str = "transform";

    fn validate(&self) -> Result<()> {
        require(&self.expr, "S-expression is required")
    }

    async fn send(&self, client: &MorkClient) -> Envelope {
        client.transform(&self.expr).await
    }

    fn poll_token(&self) -> Option<String> {
        Some(self.expr.clone())
    }

    fn interpret(&self, status: Envelope, _submitted: &Envelope) -> PollVerdict {
        let Some(payload) = status.payload() else {
            return PollVerdict::Complete(Envelope::failure("empty status response"));
        };
        interpret_path_clear(payload, "Transform failed.", || {
            Envelope::success(
                Value::String(TRANSFORM_DONE_MESSAGE.to_string()),
                TRANSFORM_DONE_MESSAGE,
            )
        })
    }
}

fn both_required(pattern: &str, template: &str) -> Result<()> {
    if pattern.trim().is_empty() || template.trim().is_empty() {
        return Err(PlaygroundError::validation(
            "Both pattern and template are required",
        ));
    }
    Ok(())
}

fn guess_mime(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "json" => Some("application/json"),
        "csv" => Some("text/csv"),
        "metta" | "txt" | "mm2" => Some("text/plain"),
        _ => None,
    }
}
