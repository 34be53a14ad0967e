//! Sidebar navigation over the command panels. Exactly one panel is live at
//! a time; switching away tears the previous one down.

use tokio::runtime::Handle;
use tracing::info;

use crate::client::MorkClient;
use crate::commands::{CommandGroup, CommandKind};
use crate::config::PlaygroundConfig;
use crate::error::Result;
use crate::panels::CommandPanel;

pub const DEFAULT_COMMAND: CommandKind = CommandKind::Transform;

pub struct Shell {
    config: PlaygroundConfig,
    client: MorkClient,
    runtime: Handle,
    panel: CommandPanel,
}

impl Shell {
    pub fn new(config: PlaygroundConfig, runtime: Handle) -> Result<Self> {
        let client = MorkClient::new(&config)?;
        Ok(Self::with_client(config, client, runtime))
    }

    pub fn with_client(config: PlaygroundConfig, client: MorkClient, runtime: Handle) -> Self {
        let panel = CommandPanel::new(DEFAULT_COMMAND, client.clone(), runtime.clone(), &config);
        info!(server = %config.server_url, dialect = ?config.dialect, "playground ready");
        Self {
            config,
            client,
            runtime,
            panel,
        }
    }

    /// Sidebar entries, in display order.
    pub fn groups() -> impl Iterator<Item = (CommandGroup, Vec<CommandKind>)> {
        CommandGroup::ALL
            .into_iter()
            .map(|group| (group, group.commands().collect()))
    }

    pub fn config(&self) -> &PlaygroundConfig {
        &self.config
    }

    pub fn client(&self) -> &MorkClient {
        &self.client
    }

    pub fn selected(&self) -> CommandKind {
        self.panel.kind()
    }

    pub fn panel(&self) -> &CommandPanel {
        &self.panel
    }

    pub fn panel_mut(&mut self) -> &mut CommandPanel {
        &mut self.panel
    }

    /// Switches panels. The outgoing panel is cancelled before the new one
    /// exists, so nothing it started can report into the new view.
    pub fn select(&mut self, kind: CommandKind) {
        if kind == self.selected() {
            return;
        }
        if self.panel.cancel() {
            info!(from = %self.selected(), to = %kind, "in-flight command torn down on navigation");
        }
        self.panel = CommandPanel::new(kind, self.client.clone(), self.runtime.clone(), &self.config);
    }
}
