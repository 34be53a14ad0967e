use clap::Parser;

use mork_playground::client::MorkClient;
use mork_playground::config::{ApiDialect, PlaygroundConfig};

#[derive(Parser, Debug)]
#[command(name = "mork-playground-ui")]
struct UiCli {
    /// Optional JSON settings file layered under the environment.
    #[arg(long, env = "MORK_PLAYGROUND_CONFIG")]
    config: Option<String>,

    /// MORK server address (e.g. http://127.0.0.1:8000).
    #[arg(long)]
    server: Option<String>,

    /// Endpoint layout: path-params or json-body.
    #[arg(long)]
    dialect: Option<ApiDialect>,
}

fn main() -> mork_playground::Result<()> {
    mork_playground::logging::init_tracing("mork_playground_ui");
    let cli = UiCli::parse();

    let mut config = PlaygroundConfig::load(cli.config.as_deref())?;
    if let Some(server) = cli.server.as_deref() {
        config.server_url = mork_playground::config::normalize_server_url(server)?;
    }
    if let Some(dialect) = cli.dialect {
        config.dialect = dialect;
    }
    let client = MorkClient::new(&config)?;

    // Lifecycles run here; iced drives the window on its own executor.
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .thread_name("mork-lifecycle")
        .enable_all()
        .build()
        .map_err(|err| mork_playground::PlaygroundError::Runtime(err.to_string()))?;

    mork_playground::iced_ui::launch_ui(mork_playground::iced_ui::IcedUiLaunchConfig {
        config,
        client,
        runtime: runtime.handle().clone(),
    })
    .map_err(|err| mork_playground::PlaygroundError::Runtime(err.to_string()))
}
