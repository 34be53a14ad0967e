use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::fsm::{self, LifecycleEvent, LifecyclePhase};
use super::poll::{PollHandle, PollSettings, Tick};
use crate::envelope::Envelope;
use crate::error::{PlaygroundError, Result};

/// What one poll tick concluded.
#[derive(Clone, Debug, PartialEq)]
pub enum PollVerdict {
    Pending,
    Complete(Envelope),
}

/// One command, as seen by the lifecycle controller.
///
/// `poll_token` decides the shape of the lifecycle: `None` settles on the
/// initiating call, `Some` keeps polling `query_status` until `interpret`
/// reports a terminal verdict.
#[async_trait]
pub trait LifecycleCommand: Send + Sync {
    fn name(&self) -> &str;

    fn validate(&self) -> Result<()>;

    /// The initiating backend call.
    async fn submit(&self) -> Envelope;

    fn poll_token(&self) -> Option<String> {
        None
    }

    async fn query_status(&self, _token: &str) -> Envelope {
        Envelope::failure(format!("{} does not report progress", self.name()))
    }

    /// Completion predicate. Only called with successful status responses.
    fn interpret(&self, status: Envelope, _submitted: &Envelope) -> PollVerdict {
        PollVerdict::Complete(status)
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub enum LifecycleState {
    #[default]
    Idle,
    Submitting,
    Polling {
        token: String,
        ticks: u32,
    },
    Settled(Envelope),
}

impl LifecycleState {
    pub fn phase(&self) -> LifecyclePhase {
        match self {
            LifecycleState::Idle => LifecyclePhase::Idle,
            LifecycleState::Submitting => LifecyclePhase::Submitting,
            LifecycleState::Polling { .. } => LifecyclePhase::Polling,
            LifecycleState::Settled(_) => LifecyclePhase::Settled,
        }
    }

    pub fn is_busy(&self) -> bool {
        self.phase().is_busy()
    }

    pub fn settled(&self) -> Option<&Envelope> {
        match self {
            LifecycleState::Settled(envelope) => Some(envelope),
            _ => None,
        }
    }
}

/// Published state, tagged with the lifecycle it belongs to.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LifecycleSnapshot {
    pub generation: u64,
    pub state: LifecycleState,
}

/// Write side handed to the spawned lifecycle task. Writes from a lifecycle
/// that has since been torn down or replaced are dropped.
#[derive(Clone)]
struct Publisher {
    tx: Arc<watch::Sender<LifecycleSnapshot>>,
    generation: u64,
    command: String,
}

impl Publisher {
    fn advance(&self, event: LifecycleEvent, next: LifecycleState) -> bool {
        let mut from = LifecyclePhase::Idle;
        let applied = self.tx.send_if_modified(|snapshot| {
            if snapshot.generation != self.generation {
                return false;
            }
            from = snapshot.state.phase();
            match fsm::transition(from, event) {
                Some(phase) if phase == next.phase() => {
                    snapshot.state = next;
                    true
                }
                _ => false,
            }
        });
        if applied {
            debug!(command = %self.command, from = from.label(), event = ?event, "lifecycle transition");
        } else {
            debug!(command = %self.command, event = ?event, "stale lifecycle write dropped");
        }
        applied
    }

    fn settle(&self, result: Envelope) -> bool {
        info!(
            command = %self.command,
            success = result.is_success(),
            message = result.message().unwrap_or_default(),
            "command settled"
        );
        self.advance(LifecycleEvent::Resolved, LifecycleState::Settled(result))
    }
}

/// Drives one command at a time from submission to a settled result.
///
/// Lifecycles run as tasks on the injected runtime; observers follow them
/// through [`LifecycleController::subscribe`]. Dropping the controller tears
/// down whatever is in flight.
pub struct LifecycleController {
    runtime: Handle,
    settings: PollSettings,
    tx: Arc<watch::Sender<LifecycleSnapshot>>,
    task: Option<JoinHandle<()>>,
}

impl LifecycleController {
    pub fn new(runtime: Handle, settings: PollSettings) -> Self {
        let (tx, _rx) = watch::channel(LifecycleSnapshot::default());
        Self {
            runtime,
            settings,
            tx: Arc::new(tx),
            task: None,
        }
    }

    pub fn settings(&self) -> PollSettings {
        self.settings
    }

    pub fn state(&self) -> LifecycleState {
        self.tx.borrow().state.clone()
    }

    pub fn snapshot(&self) -> LifecycleSnapshot {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<LifecycleSnapshot> {
        self.tx.subscribe()
    }

    pub fn is_busy(&self) -> bool {
        self.tx.borrow().state.is_busy()
    }

    /// Whether a lifecycle task (and so possibly a poll timer) is still alive.
    pub fn has_live_task(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Starts `command` unless one is already in flight.
    ///
    /// Validation runs first; a rejected request never reaches the network
    /// and leaves the current state untouched.
    pub fn submit(&mut self, command: Arc<dyn LifecycleCommand>) -> Result<()> {
        if self.is_busy() {
            return Err(PlaygroundError::Busy(command.name().to_string()));
        }
        command.validate()?;
        self.launch(command)
    }

    /// Like [`submit`](Self::submit), but tears down an in-flight lifecycle first.
    pub fn force_submit(&mut self, command: Arc<dyn LifecycleCommand>) -> Result<()> {
        command.validate()?;
        if self.cancel() {
            warn!(command = %command.name(), "in-flight command cancelled by forced submission");
        }
        self.launch(command)
    }

    /// Tears down the current lifecycle and returns to `Idle`.
    ///
    /// Returns whether a command was actually in flight. Safe to call any
    /// number of times.
    pub fn cancel(&mut self) -> bool {
        let was_busy = self.is_busy();
        if let Some(task) = self.task.take() {
            task.abort();
        }
        self.tx.send_if_modified(|snapshot| {
            if snapshot.state.phase() == LifecyclePhase::Idle {
                return false;
            }
            match fsm::transition(snapshot.state.phase(), LifecycleEvent::Teardown) {
                Some(LifecyclePhase::Idle) => {
                    snapshot.generation += 1;
                    snapshot.state = LifecycleState::Idle;
                    true
                }
                _ => false,
            }
        });
        was_busy
    }

    /// Resolves with the settled result of the current lifecycle, or `None`
    /// if it is torn down first (or nothing was submitted).
    pub async fn wait_settled(&self) -> Option<Envelope> {
        let mut rx = self.tx.subscribe();
        let generation = rx.borrow().generation;
        loop {
            {
                let snapshot = rx.borrow_and_update();
                if snapshot.generation != generation {
                    return None;
                }
                match &snapshot.state {
                    LifecycleState::Settled(result) => return Some(result.clone()),
                    LifecycleState::Idle => return None,
                    _ => {}
                }
            }
            if rx.changed().await.is_err() {
                return None;
            }
        }
    }

    fn launch(&mut self, command: Arc<dyn LifecycleCommand>) -> Result<()> {
        let mut started = None;
        self.tx.send_if_modified(|snapshot| {
            match fsm::transition(snapshot.state.phase(), LifecycleEvent::Submit) {
                Some(LifecyclePhase::Submitting) => {
                    snapshot.generation += 1;
                    snapshot.state = LifecycleState::Submitting;
                    started = Some(snapshot.generation);
                    true
                }
                _ => false,
            }
        });
        let generation =
            started.ok_or_else(|| PlaygroundError::Busy(command.name().to_string()))?;

        if let Some(previous) = self.task.take() {
            previous.abort();
        }

        info!(command = %command.name(), generation, "command submitted");
        let publisher = Publisher {
            tx: Arc::clone(&self.tx),
            generation,
            command: command.name().to_string(),
        };
        let settings = self.settings;
        self.task = Some(self.runtime.spawn(drive(command, publisher, settings)));
        Ok(())
    }
}

impl Drop for LifecycleController {
    fn drop(&mut self) {
        self.cancel();
    }
}

async fn drive(command: Arc<dyn LifecycleCommand>, publisher: Publisher, settings: PollSettings) {
    let submitted = command.submit().await;
    if !submitted.is_success() {
        publisher.settle(submitted);
        return;
    }

    let Some(token) = command.poll_token() else {
        publisher.settle(submitted);
        return;
    };

    if !publisher.advance(
        LifecycleEvent::Accepted,
        LifecycleState::Polling {
            token: token.clone(),
            ticks: 0,
        },
    ) {
        return;
    }
    info!(command = %command.name(), token = %token, "polling for completion");

    let mut handle = PollHandle::start(token, &settings);
    loop {
        if let Tick::Expired(after) = handle.next_tick().await {
            handle.cancel();
            publisher.settle(Envelope::failure(format!(
                "Polling timed out after {}s without a terminal status",
                after.as_secs()
            )));
            return;
        }

        let status = command.query_status(handle.token()).await;
        debug!(command = %command.name(), tick = handle.ticks(), success = status.is_success(), "status polled");
        let verdict = if status.is_success() {
            command.interpret(status, &submitted)
        } else {
            PollVerdict::Complete(status)
        };

        match verdict {
            PollVerdict::Pending => {
                let still_current = publisher.advance(
                    LifecycleEvent::Pending,
                    LifecycleState::Polling {
                        token: handle.token().to_string(),
                        ticks: handle.ticks(),
                    },
                );
                if !still_current {
                    handle.cancel();
                    return;
                }
            }
            PollVerdict::Complete(result) => {
                handle.cancel();
                publisher.settle(result);
                return;
            }
        }
    }
}

/// Completion predicate for operations that report
/// `{"status": "completed" | "error", "result", "message"}`.
pub fn interpret_completion_status(status: &Value, done_message: &str) -> PollVerdict {
    let Some(object) = status.as_object() else {
        return PollVerdict::Complete(Envelope::failure(format!(
            "malformed status response: {status}"
        )));
    };
    match object.get("status").and_then(Value::as_str) {
        Some("completed") => PollVerdict::Complete(Envelope::success(
            object.get("result").cloned().unwrap_or(Value::Null),
            done_message,
        )),
        Some("error") => PollVerdict::Complete(Envelope::failure(
            object
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("Operation failed"),
        )),
        Some(_) => PollVerdict::Pending,
        None => PollVerdict::Complete(Envelope::failure(format!(
            "malformed status response: {status}"
        ))),
    }
}

/// Reads the status word out of a status body: a JSON object's `status`
/// field, a JSON string, or the raw text.
pub fn status_word(status: &Value) -> Option<&str> {
    match status {
        Value::String(text) => Some(text.trim()),
        Value::Object(object) => object.get("status").and_then(Value::as_str),
        _ => None,
    }
}

/// Whether the backend reports the polled path as no longer busy.
pub fn is_path_clear(status: &Value) -> bool {
    if status.get("isClear").and_then(Value::as_bool) == Some(true) {
        return true;
    }
    matches!(status_word(status), Some("pathClear" | "clear"))
}

/// Completion predicate for operations that hold a path busy until done.
/// `done` builds the success result; `failed` is the fallback error text.
pub fn interpret_path_clear(
    status: &Value,
    failed: &str,
    done: impl FnOnce() -> Envelope,
) -> PollVerdict {
    if is_path_clear(status) {
        return PollVerdict::Complete(done());
    }
    match status_word(status) {
        Some("error") => PollVerdict::Complete(Envelope::failure(
            status
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or(failed),
        )),
        Some(_) => PollVerdict::Pending,
        None if status.get("isClear").is_some() => PollVerdict::Pending,
        None => PollVerdict::Complete(Envelope::failure(format!(
            "malformed status response: {status}"
        ))),
    }
}
