use std::ops::RangeInclusive;

use async_trait::async_trait;

use super::{require, BackendRequest};
use crate::client::MorkClient;
use crate::envelope::Envelope;
use crate::error::{PlaygroundError, Result};
use crate::lifecycle::{interpret_completion_status, PollVerdict};

pub const BUSYWAIT_RANGE_MS: RangeInclusive<u64> = 100..=10_000;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BusywaitRequest {
    pub millis: u64,
    /// Hold the expression lock for the whole wait.
    pub lock_expr: bool,
}

#[async_trait]
impl BackendRequest for BusywaitRequest {
    const NAME: &'static str = "busywait";

    fn validate(&self) -> Result<()> {
        if !BUSYWAIT_RANGE_MS.contains(&self.millis) {
            return Err(PlaygroundError::validation(format!(
                "Duration must be between {} and {} ms",
                BUSYWAIT_RANGE_MS.start(),
                BUSYWAIT_RANGE_MS.end()
            )));
        }
        Ok(())
    }

    async fn send(&self, client: &MorkClient) -> Envelope {
        client.busywait(self.millis, self.lock_expr).await
    }

    fn poll_token(&self) -> Option<String> {
        Some(format!("busywait-{}-{}", self.millis, self.lock_expr))
    }

    fn interpret(&self, status: Envelope, _submitted: &Envelope) -> PollVerdict {
        match status.payload() {
            Some(payload) => interpret_completion_status(
                payload,
                &format!("Busywait completed after {}ms", self.millis),
            ),
            None => PollVerdict::Complete(Envelope::failure("empty status response")),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StopRequest {
    pub wait_for_idle: bool,
}

#[async_trait]
impl BackendRequest for StopRequest {
    const NAME: &'static str = "stop";

    fn validate(&self) -> Result<()> {
        Ok(())
    }

    async fn send(&self, client: &MorkClient) -> Envelope {
        client.stop(self.wait_for_idle).await
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StatusRequest {
    pub path: String,
}

#[async_trait]
impl BackendRequest for StatusRequest {
    const NAME: &'static str = "status";

    fn validate(&self) -> Result<()> {
        require(&self.path, "Path is required")
    }

    async fn send(&self, client: &MorkClient) -> Envelope {
        client.status(&self.path).await
    }
}
