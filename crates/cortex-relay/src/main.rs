use std::io::{self, Write};
use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tokio::net::TcpListener;
use tracing::{debug, info};

use cortex_relay::api::{AppState, create_router};
use cortex_relay::config::{RelayConfig, default_config_path};
use cortex_relay::logging::{LogOpts, init_logging};

fn main() {
    if let Err(err) = try_main() {
        let _ = writeln!(io::stderr(), "{err:?}");
        std::process::exit(1);
    }
}

fn try_main() -> Result<()> {
    let cli = Cli::parse();

    // A missing .env is fine; a malformed one is not.
    match dotenvy::dotenv() {
        Ok(_) => {}
        Err(err) if err.not_found() => {}
        Err(err) => return Err(err).context("loading .env"),
    }

    init_logging(&cli.common.log);

    let config_path = cli.common.config.clone().or_else(default_config_path);
    debug!(path = ?config_path, "resolved config path");

    match cli.command {
        Command::Serve(cmd) => {
            let config = RelayConfig::load(config_path.as_deref())
                .context("invalid relay configuration")?;
            serve(config, cmd)
        }
        Command::Config { command } => handle_config(config_path, command),
    }
}

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Cortex Relay - cleaned SSE streaming in front of hosted agents.",
    propagate_version = true
)]
struct Cli {
    #[command(flatten)]
    common: CommonOpts,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Args)]
struct CommonOpts {
    /// Override the config file path
    #[arg(long, value_name = "PATH", global = true)]
    config: Option<PathBuf>,
    #[command(flatten)]
    log: LogOpts,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Start the HTTP server
    Serve(ServeCommand),
    /// Inspect configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[derive(Debug, Clone, Args)]
struct ServeCommand {
    /// Address to bind (overrides server.host)
    #[arg(long)]
    host: Option<String>,
    /// Port to listen on (overrides server.port)
    #[arg(short, long)]
    port: Option<u16>,
}

#[derive(Debug, Subcommand)]
enum ConfigCommand {
    /// Print the effective configuration with secrets masked
    Show,
    /// Print the config file path
    Path,
}

#[tokio::main]
async fn serve(mut config: RelayConfig, cmd: ServeCommand) -> Result<()> {
    if let Some(host) = cmd.host {
        config.server.host = host;
    }
    if let Some(port) = cmd.port {
        config.server.port = port;
    }

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .with_context(|| {
            format!(
                "invalid listen address {}:{}",
                config.server.host, config.server.port
            )
        })?;

    info!(
        upstream = %config.upstream.base_url(),
        database = %config.upstream.database,
        schema = %config.upstream.schema,
        agents = ?config.allowed_agents(),
        auth = config.auth.required_key().is_some(),
        "starting relay"
    );

    let state = AppState::new(config).context("building upstream client")?;
    let app = create_router(state);

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!("Listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("Shutdown signal received");
    }
}

fn handle_config(path: Option<PathBuf>, command: ConfigCommand) -> Result<()> {
    match command {
        ConfigCommand::Show => {
            let config = RelayConfig::load(path.as_deref())
                .context("invalid relay configuration")?;
            let rendered =
                toml::to_string_pretty(&config.redacted()).context("serializing config to TOML")?;
            println!("{rendered}");
        }
        ConfigCommand::Path => match path {
            Some(path) => println!("{}", path.display()),
            None => println!("(no config directory available)"),
        },
    }
    Ok(())
}
