//! cortex-chat - terminal client for a Cortex Relay server.
//!
//! Streams agent replies to stdout as they grow and keeps one history per
//! agent for the lifetime of the process.

use std::io::{self, Write};
use std::process::ExitCode;

use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};

use cortex_relay::client::{ConsumerUpdate, Conversation, RelayClient};
use cortex_relay::logging::{LogOpts, init_logging};
use cortex_relay_protocol::{AgentDescriptor, default_catalog, find_agent};

const DEFAULT_SERVER_URL: &str = "http://127.0.0.1:8000";

fn main() -> ExitCode {
    if let Err(err) = try_main() {
        let _ = writeln!(io::stderr(), "Error: {err:?}");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}

#[tokio::main]
async fn try_main() -> Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    init_logging(&cli.log);

    let client = RelayClient::new(&cli.server, cli.api_key.clone())
        .context("building relay client")?;
    let catalog = default_catalog();

    match cli.command {
        Command::Health => handle_health(&client).await,
        Command::Agents => {
            print_agents(&catalog);
            Ok(())
        }
        Command::Ask { agent, prompt } => {
            let agent = resolve_agent(&catalog, &agent)?;
            let mut conversation = Conversation::new();
            ask(&client, &mut conversation, agent, &prompt.join(" "), cli.debug_reasoning).await
        }
        Command::Chat { agent } => {
            let agent = match agent {
                Some(key) => resolve_agent(&catalog, &key)?,
                None => catalog.first().ok_or_else(|| anyhow!("no agents available"))?,
            };
            chat(&client, &catalog, agent, cli.debug_reasoning).await
        }
    }
}

#[derive(Debug, Parser)]
#[command(
    name = "cortex-chat",
    author,
    version,
    about = "Chat with hosted agents through a Cortex Relay server."
)]
struct Cli {
    /// Relay server URL
    #[arg(long, short = 's', default_value = DEFAULT_SERVER_URL, env = "CORTEX_RELAY_URL")]
    server: String,

    /// Shared secret sent as x-api-key
    #[arg(long, env = "API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Show the agent's reasoning/status stream on stderr
    #[arg(long, global = true)]
    debug_reasoning: bool,

    #[command(flatten)]
    log: LogOpts,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Check relay health
    Health,
    /// List available agents
    Agents,
    /// Ask a single question
    Ask {
        /// Agent UI key or upstream identifier
        #[arg(long, short = 'a')]
        agent: String,
        /// Question text
        #[arg(required = true, trailing_var_arg = true)]
        prompt: Vec<String>,
    },
    /// Interactive session (/agent <key>, /agents, /quit)
    Chat {
        /// Agent to start with
        #[arg(long, short = 'a')]
        agent: Option<String>,
    },
}

async fn handle_health(client: &RelayClient) -> Result<()> {
    let health = client.health().await.context("querying relay health")?;
    println!("Server: {}", client.base_url());
    println!("OK: {}", health.ok);
    println!("Database: {}", health.db);
    println!("Schema: {}", health.schema);
    println!("Agents: {}", health.allowed_agents.join(", "));
    Ok(())
}

fn print_agents(catalog: &[AgentDescriptor]) {
    for agent in catalog {
        println!("{} {}  ({})", agent.icon, agent.display_name, agent.upstream_agent);
    }
}

fn resolve_agent<'a>(catalog: &'a [AgentDescriptor], key: &str) -> Result<&'a AgentDescriptor> {
    find_agent(catalog, key).ok_or_else(|| anyhow!("unknown agent: {key}"))
}

async fn ask(
    client: &RelayClient,
    conversation: &mut Conversation,
    agent: &AgentDescriptor,
    prompt: &str,
    debug_reasoning: bool,
) -> Result<()> {
    let mut printer = ReplyPrinter::default();
    let reply = conversation
        .ask(client, agent, prompt, debug_reasoning, |update| printer.show(update))
        .await
        .with_context(|| format!("asking {}", agent.display_name))?;

    printer.finish(&reply);
    Ok(())
}

async fn chat(
    client: &RelayClient,
    catalog: &[AgentDescriptor],
    mut agent: &AgentDescriptor,
    debug_reasoning: bool,
) -> Result<()> {
    let mut conversation = Conversation::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    println!("{} {} - /agent <key>, /agents, /quit", agent.icon, agent.display_name);
    loop {
        print!("> ");
        io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match line.split_once(' ').map_or((line, ""), |(cmd, rest)| (cmd, rest.trim())) {
            ("/quit" | "/exit", _) => break,
            ("/agents", _) => print_agents(catalog),
            ("/agent", key) => match find_agent(catalog, key) {
                Some(next) => {
                    agent = next;
                    println!("{} {}", agent.icon, agent.display_name);
                }
                None => eprintln!("unknown agent: {key}"),
            },
            _ => {
                if let Err(err) = ask(client, &mut conversation, agent, line, debug_reasoning).await {
                    println!();
                    eprintln!("Error: {err:#}");
                }
            }
        }
    }
    Ok(())
}

/// Writes accumulated text to stdout as it grows.
#[derive(Debug, Default)]
struct ReplyPrinter {
    shown: String,
}

impl ReplyPrinter {
    fn show(&mut self, update: ConsumerUpdate) {
        match update {
            ConsumerUpdate::Text(text) => {
                let mut stdout = io::stdout();
                match text.strip_prefix(self.shown.as_str()) {
                    Some(suffix) => {
                        let _ = write!(stdout, "{suffix}");
                    }
                    // Rewritten from the start.
                    None => {
                        let _ = write!(stdout, "\n{text}");
                    }
                }
                let _ = stdout.flush();
                self.shown = text;
            }
            ConsumerUpdate::Reasoning(text) => eprintln!("[reasoning] {text}"),
        }
    }

    fn finish(&self, reply: &str) {
        if self.shown.is_empty() {
            println!("{reply}");
        } else {
            println!();
        }
    }
}
