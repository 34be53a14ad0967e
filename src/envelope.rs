//! Uniform success/failure wrapper returned by every backend call.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::PlaygroundError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Success,
    #[serde(rename = "error")]
    Failure,
}

/// Outcome of one backend call or of a whole command lifecycle.
///
/// A `Success` always carries a payload and a `Failure` always carries a
/// message. Serializes as `{"status": "success" | "error", "data", "message"}`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Envelope<T = Value> {
    #[serde(rename = "status")]
    outcome: Outcome,
    #[serde(rename = "data", default, skip_serializing_if = "Option::is_none")]
    payload: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    message: Option<String>,
}

impl<T> Envelope<T> {
    pub fn success(payload: T, message: impl Into<String>) -> Self {
        Self {
            outcome: Outcome::Success,
            payload: Some(payload),
            message: Some(message.into()),
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        let message = message.into();
        let message = if message.trim().is_empty() {
            "Unknown error".to_string()
        } else {
            message
        };
        Self {
            outcome: Outcome::Failure,
            payload: None,
            message: Some(message),
        }
    }

    pub fn outcome(&self) -> Outcome {
        self.outcome
    }

    pub fn is_success(&self) -> bool {
        self.outcome == Outcome::Success
    }

    pub fn payload(&self) -> Option<&T> {
        self.payload.as_ref()
    }

    pub fn into_payload(self) -> Option<T> {
        self.payload
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Envelope<U> {
        Envelope {
            outcome: self.outcome,
            payload: self.payload.map(f),
            message: self.message,
        }
    }
}

impl<T> From<PlaygroundError> for Envelope<T> {
    fn from(err: PlaygroundError) -> Self {
        Self::failure(err.to_string())
    }
}

impl<T> From<crate::Result<Envelope<T>>> for Envelope<T> {
    fn from(result: crate::Result<Envelope<T>>) -> Self {
        result.unwrap_or_else(Envelope::from)
    }
}

impl Envelope<Value> {
    /// Text rendering used by the output viewers.
    pub fn render(&self) -> String {
        match (&self.outcome, &self.payload) {
            (Outcome::Success, Some(Value::String(text))) => text.clone(),
            (Outcome::Success, Some(value)) => {
                serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
            }
            (Outcome::Success, None) => "No output".to_string(),
            (Outcome::Failure, _) => format!(
                "error: {}",
                self.message.as_deref().unwrap_or("Unknown error")
            ),
        }
    }
}
