use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use tokio::runtime::Handle;

use mork_playground::client::{DataFormat, LoadType};
use mork_playground::commands::{
    BusywaitRequest, ClearRequest, CommandGroup, CopyRequest, CountRequest, ExportRequest,
    ImportRequest, MettaThreadRequest, Neo4jConnectRequest, Neo4jLoadRequest, StatusRequest,
    StopRequest, SuspendRequest, TransformRequest, UploadRequest,
};
use mork_playground::config::{deadline_from_secs, ApiDialect, PlaygroundConfig};
use mork_playground::envelope::Envelope;
use mork_playground::error::Result;
use mork_playground::panels::{CommandForm, CommandPanel, Neo4jForm, NotificationLevel, PanelAction};
use mork_playground::shell::Shell;
use mork_playground::stream::LogLevel;

#[derive(Parser, Debug)]
#[command(name = "mork-playground")]
#[command(about = "Run MORK server commands from the terminal")]
#[command(version = concat!(env!("CARGO_PKG_VERSION"), " (", env!("MORK_PLAYGROUND_GIT_SHA"), ")"))]
struct Cli {
    /// JSON settings file layered under the environment.
    #[arg(long, env = "MORK_PLAYGROUND_CONFIG")]
    config: Option<String>,

    /// MORK server base URL (e.g. http://127.0.0.1:8000).
    #[arg(long)]
    server: Option<String>,

    /// Endpoint layout: path-params or json-body.
    #[arg(long)]
    dialect: Option<ApiDialect>,

    #[arg(long)]
    poll_interval_ms: Option<u64>,

    /// Give up polling after this many seconds; 0 waits indefinitely.
    #[arg(long)]
    max_poll_secs: Option<u64>,

    #[arg(long)]
    request_timeout_secs: Option<u64>,

    /// Print the full result envelope as JSON.
    #[arg(long, default_value_t = false)]
    json: bool,

    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Args, Debug)]
struct Neo4jArgs {
    #[arg(long, default_value = "bolt://localhost:7687")]
    uri: String,

    #[arg(long, default_value = "neo4j")]
    user: String,

    #[arg(long, env = "MORK_NEO4J_PASSWORD", hide_env_values = true)]
    password: String,
}

#[derive(Subcommand, Debug)]
enum CliCommand {
    /// Clear data under a sub expression.
    Clear {
        #[arg(default_value = "$x")]
        sub_expr: String,
    },
    /// Copy data matching a pattern into a template; waits for completion.
    Copy {
        #[arg(default_value = "(test (data $v) _)")]
        pattern: String,
        #[arg(default_value = "(result $v)")]
        template: String,
    },
    /// Count items matching a pattern.
    Count {
        #[arg(default_value = "(test (data $v) _)")]
        pattern: String,
    },
    Export {
        #[arg(default_value = "$x")]
        pattern: String,
        #[arg(default_value = "$x")]
        template: String,
        /// Destination; omit to receive the data in the response.
        #[arg(long)]
        uri: Option<String>,
        #[arg(long, default_value = "metta")]
        format: DataFormat,
    },
    Import {
        #[arg(long)]
        uri: String,
        #[arg(default_value = "$x")]
        pattern: String,
        #[arg(default_value = "$x")]
        template: String,
        #[arg(long, default_value = "json")]
        format: DataFormat,
    },
    /// Upload a local file; waits until the server has ingested it.
    Upload { file: PathBuf },
    /// Apply templates to patterns; waits for the space to clear.
    Transform {
        #[arg(default_value = "(Node Node)")]
        expr: String,
    },
    /// Execute a MeTTa expression in a thread.
    MettaThread {
        #[arg(default_value = "(exec (+ 1 2 3))")]
        expression: String,
        /// Thread location; generated when omitted.
        #[arg(long)]
        location: Option<String>,
    },
    Suspend { location: String },
    Busywait {
        #[arg(long, default_value_t = 1000)]
        millis: u64,
        #[arg(long, default_value_t = false)]
        lock_expr: bool,
    },
    Stop {
        /// Stop immediately instead of waiting for running work.
        #[arg(long, default_value_t = false)]
        no_wait: bool,
    },
    Status {
        #[arg(default_value = "/status")]
        path: String,
    },
    /// Follow a status endpoint, one line per poll.
    StatusStream {
        #[arg(default_value = "/status")]
        path: String,
        #[arg(long)]
        interval_ms: Option<u64>,
        #[arg(long)]
        max_secs: Option<u64>,
    },
    Neo4jConnect {
        #[command(flatten)]
        connection: Neo4jArgs,
    },
    /// Connect, then load data from Neo4j.
    Neo4jLoad {
        #[command(flatten)]
        connection: Neo4jArgs,
        #[arg(long, default_value = "triples")]
        load_type: LoadType,
    },
    /// List the available commands by group.
    Commands,
}

impl CliCommand {
    /// Form for the single-action commands.
    fn into_form(self) -> Option<CommandForm> {
        let form = match self {
            CliCommand::Clear { sub_expr } => CommandForm::Clear(ClearRequest { sub_expr }),
            CliCommand::Copy { pattern, template } => {
                CommandForm::Copy(CopyRequest { pattern, template })
            }
            CliCommand::Count { pattern } => CommandForm::Count(CountRequest { pattern }),
            CliCommand::Export {
                pattern,
                template,
                uri,
                format,
            } => CommandForm::Export(ExportRequest {
                pattern,
                template,
                uri: uri.unwrap_or_default(),
                format,
            }),
            CliCommand::Import {
                uri,
                pattern,
                template,
                format,
            } => CommandForm::Import(ImportRequest {
                pattern,
                template,
                uri,
                format,
            }),
            CliCommand::Upload { file } => CommandForm::Upload(UploadRequest { file: Some(file) }),
            CliCommand::Transform { expr } => CommandForm::Transform(TransformRequest { expr }),
            CliCommand::MettaThread {
                expression,
                location,
            } => CommandForm::MettaThread(MettaThreadRequest {
                location: location.unwrap_or_default(),
                expression,
            }),
            CliCommand::Suspend { location } => CommandForm::Suspend(SuspendRequest { location }),
            CliCommand::Busywait { millis, lock_expr } => {
                CommandForm::Busywait(BusywaitRequest { millis, lock_expr })
            }
            CliCommand::Stop { no_wait } => CommandForm::Stop(StopRequest {
                wait_for_idle: !no_wait,
            }),
            CliCommand::Status { path } => CommandForm::Status(StatusRequest { path }),
            CliCommand::Neo4jConnect { connection } => CommandForm::Neo4j(neo4j_form(
                connection,
                LoadType::Triples,
            )),
            CliCommand::StatusStream { .. } | CliCommand::Neo4jLoad { .. } | CliCommand::Commands => {
                return None
            }
        };
        Some(form)
    }
}

fn neo4j_form(connection: Neo4jArgs, load_type: LoadType) -> Neo4jForm {
    Neo4jForm {
        connect: Neo4jConnectRequest {
            uri: connection.uri,
            user: connection.user,
            password: connection.password,
        },
        load: Neo4jLoadRequest { load_type },
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    mork_playground::logging::init_tracing("mork_playground_cli");
    let cli = Cli::parse();

    match run(cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn resolve_config(cli: &Cli) -> Result<PlaygroundConfig> {
    let mut config = PlaygroundConfig::load(cli.config.as_deref())?;
    if let Some(server) = &cli.server {
        config.server_url = mork_playground::config::normalize_server_url(server)?;
    }
    if let Some(dialect) = cli.dialect {
        config.dialect = dialect;
    }
    if let Some(ms) = cli.poll_interval_ms {
        config.poll_interval = Duration::from_millis(ms.max(1));
    }
    if let Some(secs) = cli.max_poll_secs {
        config.max_poll_duration = deadline_from_secs(secs);
    }
    if let Some(secs) = cli.request_timeout_secs {
        config.request_timeout = Duration::from_secs(secs.max(1));
    }
    Ok(config)
}

async fn run(cli: Cli) -> Result<bool> {
    if matches!(cli.command, CliCommand::Commands) {
        print_commands();
        return Ok(true);
    }

    let mut config = resolve_config(&cli)?;
    let json = cli.json;
    match cli.command {
        CliCommand::StatusStream {
            path,
            interval_ms,
            max_secs,
        } => {
            if let Some(ms) = interval_ms {
                config.stream_interval = Duration::from_millis(ms.max(1));
            }
            if let Some(secs) = max_secs {
                config.stream_max_duration = Duration::from_secs(secs.max(1));
            }
            let mut shell = Shell::new(config, Handle::current())?;
            shell.select(mork_playground::commands::CommandKind::StatusStream);
            *shell.panel_mut().form_mut() = CommandForm::StatusStream(StatusRequest { path });
            Ok(follow_stream(shell.panel_mut()).await)
        }
        CliCommand::Neo4jLoad {
            connection,
            load_type,
        } => {
            let mut shell = Shell::new(config, Handle::current())?;
            shell.select(mork_playground::commands::CommandKind::Neo4j);
            *shell.panel_mut().form_mut() = CommandForm::Neo4j(neo4j_form(connection, load_type));
            let panel = shell.panel_mut();
            if !run_action(panel, PanelAction::Connect, json).await {
                return Ok(false);
            }
            Ok(run_action(panel, PanelAction::Load, json).await)
        }
        command => {
            let Some(form) = command.into_form() else {
                return Ok(false);
            };
            let mut shell = Shell::new(config, Handle::current())?;
            shell.select(form.kind());
            *shell.panel_mut().form_mut() = form;
            Ok(run_action(shell.panel_mut(), PanelAction::Run, json).await)
        }
    }
}

async fn run_action(panel: &mut CommandPanel, action: PanelAction, json: bool) -> bool {
    if !panel.submit(action) {
        report_notifications(panel);
        return false;
    }
    let settled = panel.wait().await;
    report_notifications(panel);
    match settled {
        Some(result) => {
            print_result(&result, json);
            result.is_success()
        }
        None => false,
    }
}

async fn follow_stream(panel: &mut CommandPanel) -> bool {
    if !panel.submit(PanelAction::Run) {
        report_notifications(panel);
        return false;
    }
    while let Some(entry) = panel.next_stream_entry().await {
        let level = match entry.level {
            LogLevel::Info => "info",
            LogLevel::Success => "ok",
            LogLevel::Error => "error",
        };
        println!("[{}] {level:<5} {}", entry.timestamp, entry.message);
    }
    panel.take_notifications();
    true
}

fn print_result(result: &Envelope, json: bool) {
    if json {
        match serde_json::to_string_pretty(result) {
            Ok(rendered) => println!("{rendered}"),
            Err(err) => eprintln!("error: {err}"),
        }
    } else if result.is_success() {
        println!("{}", result.render());
    }
}

fn report_notifications(panel: &mut CommandPanel) {
    for notification in panel.take_notifications() {
        let marker = match notification.level {
            NotificationLevel::Info => "•",
            NotificationLevel::Success => "✓",
            NotificationLevel::Error => "✗",
        };
        eprintln!("{marker} {}: {}", notification.title, notification.message);
    }
}

fn print_commands() {
    for group in CommandGroup::ALL {
        println!("{}", group.label());
        for kind in group.commands() {
            let mode = if kind.is_polled() { " (polled)" } else { "" };
            println!("  {:<14} {}{mode}", kind.id(), kind.description());
        }
    }
}
