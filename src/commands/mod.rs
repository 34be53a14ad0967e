//! Typed requests for every backend command, and their lifecycle bindings.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

use crate::client::MorkClient;
use crate::envelope::Envelope;
use crate::error::{PlaygroundError, Result};
use crate::lifecycle::{LifecycleCommand, PollVerdict};

pub mod data;
pub mod metta;
pub mod neo4j;
pub mod system;

pub use data::{
    ClearRequest, CopyRequest, CountRequest, ExportRequest, ImportRequest, TransformRequest,
    UploadRequest,
};
pub use metta::{MettaThreadRequest, SuspendRequest};
pub use neo4j::{Neo4jConnectRequest, Neo4jLoadRequest};
pub use system::{BusywaitRequest, StatusRequest, StopRequest};

/// A request that knows its endpoint, its validation rules and, for
/// background operations, how to recognize completion.
#[async_trait]
pub trait BackendRequest: Send + Sync + 'static {
    const NAME: &'static str;

    fn validate(&self) -> Result<()>;

    async fn send(&self, client: &MorkClient) -> Envelope;

    /// `Some` marks the operation as asynchronous on the backend.
    fn poll_token(&self) -> Option<String> {
        None
    }

    fn interpret(&self, status: Envelope, _submitted: &Envelope) -> PollVerdict {
        PollVerdict::Complete(status)
    }
}

/// A request paired with the client it will be sent through.
pub struct Bound<R> {
    client: MorkClient,
    request: R,
}

impl<R: BackendRequest> Bound<R> {
    pub fn new(client: &MorkClient, request: R) -> Self {
        Self {
            client: client.clone(),
            request,
        }
    }

    pub fn request(&self) -> &R {
        &self.request
    }
}

#[async_trait]
impl<R: BackendRequest> LifecycleCommand for Bound<R> {
    fn name(&self) -> &str {
        R::NAME
    }

    fn validate(&self) -> Result<()> {
        self.request.validate()
    }

    async fn submit(&self) -> Envelope {
        self.request.send(&self.client).await
    }

    fn poll_token(&self) -> Option<String> {
        self.request.poll_token()
    }

    async fn query_status(&self, token: &str) -> Envelope {
        self.client.status_of(token).await
    }

    fn interpret(&self, status: Envelope, submitted: &Envelope) -> PollVerdict {
        self.request.interpret(status, submitted)
    }
}

pub fn bind<R: BackendRequest>(client: &MorkClient, request: R) -> Arc<dyn LifecycleCommand> {
    Arc::new(Bound::new(client, request))
}

pub(crate) fn require(value: &str, message: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(PlaygroundError::validation(message));
    }
    Ok(())
}

/// Everything outside `A-Z a-z 0-9 - _ . ! ~ * ' ( )`, the set browsers
/// leave alone in `encodeURIComponent`.
const COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

pub fn encode_component(raw: &str) -> String {
    utf8_percent_encode(raw, COMPONENT).to_string()
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CommandGroup {
    DataManagement,
    MettaExecution,
    SystemControl,
    Neo4jIntegration,
}

impl CommandGroup {
    pub const ALL: [CommandGroup; 4] = [
        CommandGroup::DataManagement,
        CommandGroup::MettaExecution,
        CommandGroup::SystemControl,
        CommandGroup::Neo4jIntegration,
    ];

    pub fn label(self) -> &'static str {
        match self {
            CommandGroup::DataManagement => "Data Management",
            CommandGroup::MettaExecution => "MeTTa Execution",
            CommandGroup::SystemControl => "System Control",
            CommandGroup::Neo4jIntegration => "Neo4j Integration",
        }
    }

    pub fn commands(self) -> impl Iterator<Item = CommandKind> {
        CommandKind::ALL
            .into_iter()
            .filter(move |kind| kind.group() == self)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CommandKind {
    Clear,
    Copy,
    Count,
    Export,
    Import,
    Upload,
    Transform,
    MettaThread,
    Suspend,
    Busywait,
    Stop,
    Status,
    StatusStream,
    Neo4j,
}

impl CommandKind {
    pub const ALL: [CommandKind; 14] = [
        CommandKind::Clear,
        CommandKind::Copy,
        CommandKind::Count,
        CommandKind::Export,
        CommandKind::Import,
        CommandKind::Upload,
        CommandKind::Transform,
        CommandKind::MettaThread,
        CommandKind::Suspend,
        CommandKind::Busywait,
        CommandKind::Stop,
        CommandKind::Status,
        CommandKind::StatusStream,
        CommandKind::Neo4j,
    ];

    pub fn id(self) -> &'static str {
        match self {
            CommandKind::Clear => "clear",
            CommandKind::Copy => "copy",
            CommandKind::Count => "count",
            CommandKind::Export => "export",
            CommandKind::Import => "import",
            CommandKind::Upload => "upload",
            CommandKind::Transform => "transform",
            CommandKind::MettaThread => "metta-thread",
            CommandKind::Suspend => "suspend",
            CommandKind::Busywait => "busywait",
            CommandKind::Stop => "stop",
            CommandKind::Status => "status",
            CommandKind::StatusStream => "status-stream",
            CommandKind::Neo4j => "neo4j",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            CommandKind::Clear => "Clear",
            CommandKind::Copy => "Copy",
            CommandKind::Count => "Count",
            CommandKind::Export => "Export",
            CommandKind::Import => "Import",
            CommandKind::Upload => "Upload",
            CommandKind::Transform => "Transform",
            CommandKind::MettaThread => "MeTTa Thread",
            CommandKind::Suspend => "Suspend",
            CommandKind::Busywait => "Busywait",
            CommandKind::Stop => "Stop",
            CommandKind::Status => "Status",
            CommandKind::StatusStream => "Status Stream",
            CommandKind::Neo4j => "Neo4j Setup",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            CommandKind::Clear => "Clear data under a sub expression",
            CommandKind::Copy => "Copy data matching patterns",
            CommandKind::Count => "Count items matching patterns",
            CommandKind::Export => "Export data to file",
            CommandKind::Import => "Import data from a file or URL",
            CommandKind::Upload => "Upload file to server",
            CommandKind::Transform => "Apply templates to patterns",
            CommandKind::MettaThread => "Execute MeTTa in thread",
            CommandKind::Suspend => "Suspend thread execution",
            CommandKind::Busywait => "Execute busywait operation",
            CommandKind::Stop => "Stop server operations",
            CommandKind::Status => "Get system status",
            CommandKind::StatusStream => "Stream system status",
            CommandKind::Neo4j => "Configure Neo4j connection",
        }
    }

    pub fn group(self) -> CommandGroup {
        match self {
            CommandKind::Clear
            | CommandKind::Copy
            | CommandKind::Count
            | CommandKind::Export
            | CommandKind::Import
            | CommandKind::Upload
            | CommandKind::Transform => CommandGroup::DataManagement,
            CommandKind::MettaThread | CommandKind::Suspend => CommandGroup::MettaExecution,
            CommandKind::Busywait
            | CommandKind::Stop
            | CommandKind::Status
            | CommandKind::StatusStream => CommandGroup::SystemControl,
            CommandKind::Neo4j => CommandGroup::Neo4jIntegration,
        }
    }

    /// Runs in the background on the backend and has to be polled.
    pub fn is_polled(self) -> bool {
        matches!(
            self,
            CommandKind::Copy | CommandKind::Upload | CommandKind::Transform | CommandKind::Busywait
        )
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for CommandKind {
    type Err = PlaygroundError;

    fn from_str(value: &str) -> Result<Self> {
        CommandKind::ALL
            .into_iter()
            .find(|kind| kind.id() == value.trim())
            .ok_or_else(|| PlaygroundError::validation(format!("Unknown command `{value}`")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_component_matches_browser_rules() {
        assert_eq!(encode_component("(test (data $v) _)"), "(test%20(data%20%24v)%20_)");
        assert_eq!(encode_component("a/b?c"), "a%2Fb%3Fc");
        assert_eq!(encode_component("λ"), "%CE%BB");
    }

    #[test]
    fn every_command_belongs_to_exactly_one_group() {
        let grouped: usize = CommandGroup::ALL
            .into_iter()
            .map(|group| group.commands().count())
            .sum();
        assert_eq!(grouped, CommandKind::ALL.len());
        assert_eq!(
            CommandGroup::MettaExecution.commands().collect::<Vec<_>>(),
            vec![CommandKind::MettaThread, CommandKind::Suspend]
        );
    }

    #[test]
    fn ids_round_trip_and_polled_set_is_fixed() {
        for kind in CommandKind::ALL {
            assert_eq!(kind.id().parse::<CommandKind>().unwrap(), kind);
        }
        let polled: Vec<_> = CommandKind::ALL.into_iter().filter(|k| k.is_polled()).collect();
        assert_eq!(
            polled,
            vec![
                CommandKind::Copy,
                CommandKind::Upload,
                CommandKind::Transform,
                CommandKind::Busywait
            ]
        );
        assert!("teleport".parse::<CommandKind>().is_err());
    }
}
