use async_trait::async_trait;
use rand::rngs::SysRng;
use rand::TryRng;

use super::{require, BackendRequest};
use crate::client::MorkClient;
use crate::envelope::Envelope;
use crate::error::{PlaygroundError, Result};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MettaThreadRequest {
    /// Empty picks a fresh `thread_…` location at submission time.
    pub location: String,
    pub expression: String,
}

impl MettaThreadRequest {
    pub fn resolved_location(&self) -> Result<String> {
        let location = self.location.trim();
        if location.is_empty() {
            generate_thread_location()
        } else {
            Ok(location.to_string())
        }
    }
}

#[async_trait]
impl BackendRequest for MettaThreadRequest {
    const NAME: &'static str = "metta-thread";

    fn validate(&self) -> Result<()> {
        require(&self.expression, "Expression is required")
    }

    async fn send(&self, client: &MorkClient) -> Envelope {
        match self.resolved_location() {
            Ok(location) => client.metta_thread(&location, &self.expression).await,
            Err(err) => err.into(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SuspendRequest {
    pub location: String,
}

#[async_trait]
impl BackendRequest for SuspendRequest {
    const NAME: &'static str = "suspend";

    fn validate(&self) -> Result<()> {
        require(&self.location, "Location is required")
    }

    async fn send(&self, client: &MorkClient) -> Envelope {
        client.suspend(self.location.trim()).await
    }
}

const THREAD_ID_LEN: usize = 11;

/// `thread_` followed by a random `[0-9a-z]` id.
pub fn generate_thread_location() -> Result<String> {
    const ALPHABET: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    let mut bytes = [0u8; THREAD_ID_LEN];
    let mut rng = SysRng;
    rng.try_fill_bytes(&mut bytes)
        .map_err(|e| PlaygroundError::Runtime(e.to_string()))?;
    let id: String = bytes
        .iter()
        .map(|byte| ALPHABET[usize::from(*byte) % ALPHABET.len()] as char)
        .collect();
    Ok(format!("thread_{id}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_location_gets_generated() {
        let request = MettaThreadRequest {
            location: "  ".to_string(),
            expression: "(exec (+ 1 2 3))".to_string(),
        };
        let first = request.resolved_location().unwrap();
        let second = request.resolved_location().unwrap();
        assert!(first.starts_with("thread_"));
        assert_ne!(first, second);

        let named = MettaThreadRequest {
            location: " worker ".to_string(),
            ..request
        };
        assert_eq!(named.resolved_location().unwrap(), "worker");
    }

    #[test]
    fn expression_and_location_are_required() {
        let err = MettaThreadRequest {
            location: String::new(),
            expression: String::new(),
        }
        .validate()
        .unwrap_err();
        assert_eq!(err.to_string(), "Expression is required");

        let err = SuspendRequest {
            location: String::new(),
        }
        .validate()
        .unwrap_err();
        assert_eq!(err.to_string(), "Location is required");
    }

    #[test]
    fn generated_ids_use_lowercase_base36() {
        let location = generate_thread_location().unwrap();
        let id = location.strip_prefix("thread_").expect("thread_ prefix");
        assert_eq!(id.len(), THREAD_ID_LEN);
        assert!(id.bytes().all(|b| b.is_ascii_digit() || b.is_ascii_lowercase()));
    }
}
