//! Per-command panels: form state, the controller that runs the command,
//! the last result and the toasts raised along the way.

use std::path::PathBuf;
use std::sync::Arc;

use futures::StreamExt;
use serde::Serialize;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::client::{DataFormat, LoadType, MorkClient};
use crate::commands::{
    bind, BusywaitRequest, ClearRequest, CommandKind, CopyRequest, CountRequest, ExportRequest,
    ImportRequest, MettaThreadRequest, Neo4jConnectRequest, Neo4jLoadRequest, StatusRequest,
    StopRequest, SuspendRequest, TransformRequest, UploadRequest,
};
use crate::config::PlaygroundConfig;
use crate::envelope::Envelope;
use crate::error::{PlaygroundError, Result};
use crate::lifecycle::{
    LifecycleCommand, LifecycleController, LifecyclePhase, LifecycleState, PollSettings,
};
use crate::stream::{status_stream, StatusLogEntry, StreamSettings};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationLevel {
    Info,
    Success,
    Error,
}

/// A toast raised by a panel.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub level: NotificationLevel,
    pub title: String,
    pub message: String,
}

impl Notification {
    fn new(level: NotificationLevel, title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level,
            title: title.into(),
            message: message.into(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PanelAction {
    /// The panel's main button. On the Neo4j panel this connects.
    Run,
    Connect,
    Load,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Neo4jForm {
    pub connect: Neo4jConnectRequest,
    pub load: Neo4jLoadRequest,
}

/// Editable inputs of a panel, prefilled with the playground defaults.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CommandForm {
    Clear(ClearRequest),
    Copy(CopyRequest),
    Count(CountRequest),
    Export(ExportRequest),
    Import(ImportRequest),
    Upload(UploadRequest),
    Transform(TransformRequest),
    MettaThread(MettaThreadRequest),
    Suspend(SuspendRequest),
    Busywait(BusywaitRequest),
    Stop(StopRequest),
    Status(StatusRequest),
    StatusStream(StatusRequest),
    Neo4j(Neo4jForm),
}

impl CommandForm {
    pub fn for_kind(kind: CommandKind) -> Self {
        match kind {
            CommandKind::Clear => CommandForm::Clear(ClearRequest {
                sub_expr: "$x".to_string(),
            }),
            CommandKind::Copy => CommandForm::Copy(CopyRequest {
                pattern: "(test (data $v) _)".to_string(),
                template: "(result $v)".to_string(),
            }),
            CommandKind::Count => CommandForm::Count(CountRequest {
                pattern: "(test (data $v) _)".to_string(),
            }),
            CommandKind::Export => CommandForm::Export(ExportRequest {
                pattern: "$x".to_string(),
                template: "$x".to_string(),
                uri: String::new(),
                format: DataFormat::Metta,
            }),
            CommandKind::Import => CommandForm::Import(ImportRequest {
                pattern: "$x".to_string(),
                template: "$x".to_string(),
                uri: String::new(),
                format: DataFormat::Json,
            }),
            CommandKind::Upload => CommandForm::Upload(UploadRequest::default()),
            CommandKind::Transform => CommandForm::Transform(TransformRequest {
                expr: "(Node Node)".to_string(),
            }),
            CommandKind::MettaThread => CommandForm::MettaThread(MettaThreadRequest {
                location: String::new(),
                expression: "(exec (+ 1 2 3))".to_string(),
            }),
            CommandKind::Suspend => CommandForm::Suspend(SuspendRequest {
                location: String::new(),
            }),
            CommandKind::Busywait => CommandForm::Busywait(BusywaitRequest {
                millis: 1000,
                lock_expr: false,
            }),
            CommandKind::Stop => CommandForm::Stop(StopRequest {
                wait_for_idle: true,
            }),
            CommandKind::Status => CommandForm::Status(StatusRequest {
                path: "/status".to_string(),
            }),
            CommandKind::StatusStream => CommandForm::StatusStream(StatusRequest {
                path: "/status".to_string(),
            }),
            CommandKind::Neo4j => CommandForm::Neo4j(Neo4jForm {
                connect: Neo4jConnectRequest {
                    uri: "bolt://localhost:7687".to_string(),
                    user: "neo4j".to_string(),
                    password: String::new(),
                },
                load: Neo4jLoadRequest {
                    load_type: LoadType::Triples,
                },
            }),
        }
    }

    pub fn kind(&self) -> CommandKind {
        match self {
            CommandForm::Clear(_) => CommandKind::Clear,
            CommandForm::Copy(_) => CommandKind::Copy,
            CommandForm::Count(_) => CommandKind::Count,
            CommandForm::Export(_) => CommandKind::Export,
            CommandForm::Import(_) => CommandKind::Import,
            CommandForm::Upload(_) => CommandKind::Upload,
            CommandForm::Transform(_) => CommandKind::Transform,
            CommandForm::MettaThread(_) => CommandKind::MettaThread,
            CommandForm::Suspend(_) => CommandKind::Suspend,
            CommandForm::Busywait(_) => CommandKind::Busywait,
            CommandForm::Stop(_) => CommandKind::Stop,
            CommandForm::Status(_) => CommandKind::Status,
            CommandForm::StatusStream(_) => CommandKind::StatusStream,
            CommandForm::Neo4j(_) => CommandKind::Neo4j,
        }
    }

    /// Binds the form's current values to `client`. The status stream has
    /// no lifecycle command and is rejected here.
    fn command(&self, action: PanelAction, client: &MorkClient) -> Result<Arc<dyn LifecycleCommand>> {
        let command = match self {
            CommandForm::Clear(request) => bind(client, request.clone()),
            CommandForm::Copy(request) => bind(client, request.clone()),
            CommandForm::Count(request) => bind(client, request.clone()),
            CommandForm::Export(request) => bind(client, request.clone()),
            CommandForm::Import(request) => bind(client, request.clone()),
            CommandForm::Upload(request) => bind(client, request.clone()),
            CommandForm::Transform(request) => bind(client, request.clone()),
            CommandForm::MettaThread(request) => bind(client, request.clone()),
            CommandForm::Suspend(request) => bind(client, request.clone()),
            CommandForm::Busywait(request) => bind(client, request.clone()),
            CommandForm::Stop(request) => bind(client, request.clone()),
            CommandForm::Status(request) => bind(client, request.clone()),
            CommandForm::Neo4j(form) => match action {
                PanelAction::Load => bind(client, form.load.clone()),
                PanelAction::Run | PanelAction::Connect => bind(client, form.connect.clone()),
            },
            CommandForm::StatusStream(_) => {
                return Err(PlaygroundError::Runtime(
                    "the status stream is not a lifecycle command".to_string(),
                ))
            }
        };
        Ok(command)
    }
}

struct StreamSession {
    task: JoinHandle<()>,
    entries: mpsc::UnboundedReceiver<StatusLogEntry>,
}

impl Drop for StreamSession {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// One command's screen. Owns its controller, so dropping the panel tears
/// down any lifecycle (and poll timer) it started.
pub struct CommandPanel {
    form: CommandForm,
    client: MorkClient,
    runtime: Handle,
    controller: LifecycleController,
    stream_settings: StreamSettings,
    in_flight: Option<PanelAction>,
    seen: (u64, LifecyclePhase),
    /// Last successful result; failures never replace it.
    output: Option<Envelope>,
    last_error: Option<String>,
    notifications: Vec<Notification>,
    neo4j_connected: bool,
    stream: Option<StreamSession>,
    status_log: Vec<StatusLogEntry>,
}

impl CommandPanel {
    pub fn new(kind: CommandKind, client: MorkClient, runtime: Handle, config: &PlaygroundConfig) -> Self {
        let controller = LifecycleController::new(runtime.clone(), PollSettings::from_config(config));
        Self {
            form: CommandForm::for_kind(kind),
            client,
            runtime,
            controller,
            stream_settings: StreamSettings::from_config(config),
            in_flight: None,
            seen: (0, LifecyclePhase::Idle),
            output: None,
            last_error: None,
            notifications: Vec::new(),
            neo4j_connected: false,
            stream: None,
            status_log: Vec::new(),
        }
    }

    pub fn kind(&self) -> CommandKind {
        self.form.kind()
    }

    pub fn form(&self) -> &CommandForm {
        &self.form
    }

    pub fn form_mut(&mut self) -> &mut CommandForm {
        &mut self.form
    }

    pub fn state(&self) -> LifecycleState {
        self.controller.state()
    }

    pub fn controller(&self) -> &LifecycleController {
        &self.controller
    }

    pub fn is_busy(&self) -> bool {
        self.controller.is_busy()
    }

    pub fn output(&self) -> Option<&Envelope> {
        self.output.as_ref()
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn notifications(&self) -> &[Notification] {
        &self.notifications
    }

    pub fn take_notifications(&mut self) -> Vec<Notification> {
        std::mem::take(&mut self.notifications)
    }

    pub fn neo4j_connected(&self) -> bool {
        self.neo4j_connected
    }

    pub fn status_log(&self) -> &[StatusLogEntry] {
        &self.status_log
    }

    pub fn clear_status_log(&mut self) {
        self.status_log.clear();
    }

    pub fn is_streaming(&self) -> bool {
        self.stream
            .as_ref()
            .is_some_and(|session| !session.task.is_finished())
    }

    /// Starts the panel's command. Returns whether anything was started;
    /// rejected submissions leave a notification behind instead.
    pub fn submit(&mut self, action: PanelAction) -> bool {
        if self.kind() == CommandKind::StatusStream {
            return self.start_stream();
        }
        if self.controller.is_busy() {
            debug!(command = %self.kind(), "submission ignored while busy");
            return false;
        }
        if action == PanelAction::Load && !self.neo4j_connected {
            self.notify(
                NotificationLevel::Error,
                "Connection Required",
                "Please establish a connection first",
            );
            return false;
        }

        let started = self
            .form
            .command(action, &self.client)
            .and_then(|command| self.controller.submit(command));
        match started {
            Ok(()) => {
                self.in_flight = Some(action);
                self.last_error = None;
                true
            }
            Err(err) if err.is_validation() => {
                self.notify(NotificationLevel::Error, "Validation Error", err.to_string());
                false
            }
            Err(err) => {
                self.notify(NotificationLevel::Error, "Error", err.to_string());
                false
            }
        }
    }

    /// Folds controller and stream progress into the panel. Returns whether
    /// anything visible changed.
    pub fn refresh(&mut self) -> bool {
        let mut changed = self.drain_stream();

        let snapshot = self.controller.snapshot();
        let phase = snapshot.state.phase();
        if (snapshot.generation, phase) == self.seen {
            return changed;
        }
        self.seen = (snapshot.generation, phase);
        changed = true;

        match snapshot.state {
            // Keyed on the phase change, so a late refresh that first sees
            // a later tick still announces the command once.
            LifecycleState::Polling { .. } => {
                let title = format!("{} Initiated", self.kind().label());
                self.notify(NotificationLevel::Info, title, "Waiting for the server to finish");
            }
            LifecycleState::Settled(result) => self.record(result),
            _ => {}
        }
        changed
    }

    /// Waits for the current lifecycle to settle and folds the result in.
    pub async fn wait(&mut self) -> Option<Envelope> {
        let settled = self.controller.wait_settled().await;
        self.refresh();
        settled
    }

    /// Waits for the next status stream entry. `None` once the stream has
    /// ended or was never started.
    pub async fn next_stream_entry(&mut self) -> Option<&StatusLogEntry> {
        let session = self.stream.as_mut()?;
        match session.entries.recv().await {
            Some(entry) => {
                self.status_log.push(entry);
                self.status_log.last()
            }
            None => {
                self.stream = None;
                self.notify(NotificationLevel::Info, "Stream Stopped", "Status stream has ended");
                None
            }
        }
    }

    /// Tears down the in-flight lifecycle and any running stream.
    pub fn cancel(&mut self) -> bool {
        let stopped_stream = self.stream.take().is_some();
        let cancelled = self.controller.cancel();
        if cancelled {
            info!(command = %self.kind(), "command cancelled");
        }
        self.in_flight = None;
        self.seen = {
            let snapshot = self.controller.snapshot();
            (snapshot.generation, snapshot.state.phase())
        };
        cancelled || stopped_stream
    }

    pub fn set_upload_file(&mut self, file: Option<PathBuf>) {
        if let CommandForm::Upload(request) = &mut self.form {
            request.file = file;
        }
    }

    fn record(&mut self, result: Envelope) {
        let action = self.in_flight.take().unwrap_or(PanelAction::Run);
        let kind = self.kind();
        let message = result.message().unwrap_or_default().to_string();

        let (level, title) = if result.is_success() {
            (NotificationLevel::Success, success_title(kind, action))
        } else {
            (NotificationLevel::Error, failure_title(kind, action))
        };
        if kind == CommandKind::Neo4j && action != PanelAction::Load {
            self.neo4j_connected = result.is_success();
        }
        if result.is_success() {
            self.output = Some(result);
        } else {
            self.last_error = Some(message.clone());
        }
        self.notify(level, title, message);
    }

    fn start_stream(&mut self) -> bool {
        if self.is_streaming() {
            return false;
        }
        let CommandForm::StatusStream(request) = &self.form else {
            return false;
        };
        if let Err(err) = crate::commands::BackendRequest::validate(request) {
            self.notify(NotificationLevel::Error, "Validation Error", err.to_string());
            return false;
        }

        let (tx, entries) = mpsc::unbounded_channel();
        let stream = status_stream(self.client.clone(), request.path.clone(), self.stream_settings);
        let task = self.runtime.spawn(async move {
            let mut stream = Box::pin(stream);
            while let Some(entry) = stream.next().await {
                if tx.send(entry).is_err() {
                    break;
                }
            }
        });
        self.status_log.clear();
        self.stream = Some(StreamSession { task, entries });
        true
    }

    fn drain_stream(&mut self) -> bool {
        let Some(session) = self.stream.as_mut() else {
            return false;
        };
        let mut changed = false;
        loop {
            match session.entries.try_recv() {
                Ok(entry) => {
                    self.status_log.push(entry);
                    changed = true;
                }
                Err(mpsc::error::TryRecvError::Empty) => break,
                Err(mpsc::error::TryRecvError::Disconnected) => {
                    self.stream = None;
                    self.notify(NotificationLevel::Info, "Stream Stopped", "Status stream has ended");
                    return true;
                }
            }
        }
        changed
    }

    fn notify(&mut self, level: NotificationLevel, title: impl Into<String>, message: impl Into<String>) {
        let notification = Notification::new(level, title, message);
        debug!(command = %self.kind(), title = %notification.title, "notification");
        self.notifications.push(notification);
    }
}

fn success_title(kind: CommandKind, action: PanelAction) -> String {
    let title = match kind {
        CommandKind::Clear => "Cleared",
        CommandKind::Copy => "Copy Completed",
        CommandKind::Export => "Export Complete",
        CommandKind::Import => "Import Complete",
        CommandKind::Upload => "Upload Completed",
        CommandKind::Transform => "Transform Completed",
        CommandKind::MettaThread => "Execution Complete",
        CommandKind::Suspend => "Thread Suspended",
        CommandKind::Busywait => "Busywait Completed",
        CommandKind::Stop => "Server Stopped",
        CommandKind::Status => "Status Retrieved",
        CommandKind::Neo4j if action == PanelAction::Load => "Data Loaded",
        CommandKind::Neo4j => "Connection Successful",
        CommandKind::Count | CommandKind::StatusStream => "Success",
    };
    title.to_string()
}

fn failure_title(kind: CommandKind, action: PanelAction) -> String {
    match kind {
        CommandKind::Neo4j if action == PanelAction::Load => "Load Failed".to_string(),
        CommandKind::Neo4j => "Connection Failed".to_string(),
        kind if kind.is_polled() => format!("{} Error", kind.label()),
        _ => "Error".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forms_start_from_playground_defaults() {
        let CommandForm::Copy(copy) = CommandForm::for_kind(CommandKind::Copy) else {
            panic!("copy form");
        };
        assert_eq!(copy.pattern, "(test (data $v) _)");
        assert_eq!(copy.template, "(result $v)");

        let CommandForm::Busywait(wait) = CommandForm::for_kind(CommandKind::Busywait) else {
            panic!("busywait form");
        };
        assert_eq!(wait.millis, 1000);
        assert!(!wait.lock_expr);

        for kind in CommandKind::ALL {
            assert_eq!(CommandForm::for_kind(kind).kind(), kind);
        }
    }

    #[test]
    fn titles_follow_command_and_action() {
        assert_eq!(success_title(CommandKind::Neo4j, PanelAction::Load), "Data Loaded");
        assert_eq!(success_title(CommandKind::Neo4j, PanelAction::Run), "Connection Successful");
        assert_eq!(failure_title(CommandKind::Copy, PanelAction::Run), "Copy Error");
        assert_eq!(failure_title(CommandKind::Count, PanelAction::Run), "Error");
    }

    #[tokio::test]
    async fn load_requires_connection_and_validation_stays_local() {
        let config = PlaygroundConfig::with_server_url("http://127.0.0.1:9").unwrap();
        let client = MorkClient::new(&config).unwrap();
        let mut panel = CommandPanel::new(CommandKind::Neo4j, client.clone(), Handle::current(), &config);

        assert!(!panel.submit(PanelAction::Load));
        assert_eq!(panel.notifications()[0].title, "Connection Required");
        assert_eq!(panel.notifications()[0].message, "Please establish a connection first");

        // Password is blank by default.
        assert!(!panel.submit(PanelAction::Connect));
        assert_eq!(panel.notifications()[1].title, "Validation Error");
        assert_eq!(panel.state(), LifecycleState::Idle);

        let mut upload = CommandPanel::new(CommandKind::Upload, client, Handle::current(), &config);
        assert!(!upload.submit(PanelAction::Run));
        assert_eq!(
            upload.take_notifications()[0].message,
            "Please select a file to upload"
        );
        assert!(upload.notifications().is_empty());
    }
}
