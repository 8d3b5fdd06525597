//! hived - swarm node daemon and control client
//!
//! Usage:
//!
//!   hived [--config <PATH>] [--data-dir <PATH>] [--control <ADDR>] <COMMAND>
//!
//! `daemon` runs the node until `quit` or Ctrl+C. Every other command
//! connects to the control port of a running node, sends one request to
//! its brain and prints the replies.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};

use hive_content::MemoryContentStore;
use hive_core::{Address, Envelope, HiveError, HiveResult, Message};
use hive_crypto::Identity;
use hive_runtime::{init_logging, Node, NodeConfig};
use hive_time::SystemClock;
use hive_transport::ControlClient;

const DEFAULT_CONTROL: &str = "127.0.0.1:4881";

/// Hive swarm node
#[derive(Parser)]
#[command(name = "hived", version, about)]
struct Cli {
    /// JSON config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Data directory (overrides the config file)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Control listener address (overrides the config file)
    #[arg(long, global = true)]
    control: Option<SocketAddr>,

    /// Seconds to wait for each reply
    #[arg(long, global = true, default_value = "10")]
    timeout: u64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the node
    Daemon,
    /// Print the client version
    Version,
    /// Check that the node answers
    Ping,
    /// Everything the node knows
    Summary,
    /// Networks and peer transport addresses
    Network,
    /// Peers currently advertising themselves
    Online,
    /// Offer a content hash to the swarm
    Share { hash: String },
    /// Stop the node
    Quit,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("hived: {e}");
            ExitCode::FAILURE
        }
    }
}

fn load_config(cli: &Cli) -> HiveResult<NodeConfig> {
    let mut config = NodeConfig::load_or_default(cli.config.as_deref())?;
    if let Some(dir) = &cli.data_dir {
        config.data_dir = dir.clone();
    }
    if let Some(control) = cli.control {
        config.tcp = Some(control);
    }
    Ok(config)
}

async fn run(cli: Cli) -> HiveResult<()> {
    let config = load_config(&cli)?;
    let timeout = Duration::from_secs(cli.timeout);
    let request = match &cli.command {
        Command::Daemon => return run_daemon(config).await,
        Command::Version => {
            println!("hived {}", env!("CARGO_PKG_VERSION"));
            return Ok(());
        }
        Command::Ping => Message::Ping,
        Command::Summary => Message::Request {
            patterns: vec!["**".into()],
        },
        Command::Network => Message::Request {
            patterns: vec!["networks".into(), "peer/*/addresses".into()],
        },
        Command::Online => Message::Request {
            patterns: vec!["peer".into()],
        },
        Command::Share { hash } => Message::command("share").with_param("hash", hash.clone()),
        Command::Quit => Message::command("quit"),
    };

    let control = match config.tcp {
        Some(addr) => addr,
        None => DEFAULT_CONTROL
            .parse()
            .map_err(|e| HiveError::Config(format!("bad default control address: {e}")))?,
    };
    let mut client = ControlClient::connect(control).await?;
    let replies = client.request(Address::any_brain(), request, timeout).await?;
    print_replies(&cli.command, &replies);
    Ok(())
}

fn print_replies(command: &Command, replies: &[Message]) {
    let facts: Vec<&Message> = replies.iter().filter(|m| m.is_fact()).collect();
    match command {
        Command::Ping => {
            let signer = replies.iter().find_map(|m| match m {
                Message::Signature { signer, .. } => Some(signer.short()),
                _ => None,
            });
            match signer {
                Some(peer) => println!("pong from {peer}"),
                None => println!("pong"),
            }
        }
        Command::Share { .. } | Command::Quit => println!("ok"),
        _ if facts.is_empty() => println!("(nothing)"),
        _ => {
            for fact in facts {
                if let Some((bucket, value, validity)) = fact.fact() {
                    println!("{:<40} {value} {validity}", bucket.to_string());
                }
            }
        }
    }
}

async fn run_daemon(config: NodeConfig) -> HiveResult<()> {
    init_logging(&config.log)?;
    std::fs::create_dir_all(&config.data_dir)?;
    tracing::info!(data_dir = %config.data_dir.display(), "data directory ready");

    let identity = Arc::new(Identity::load_or_generate(&config.identity_path())?);
    let peer = identity.peer_id();
    tracing::info!(peer = %peer, "identity loaded");

    let content = Arc::new(MemoryContentStore::standalone(peer));
    let node = Node::build(config, identity, content, SystemClock::shared())?;
    let running = node.start().await?;
    if let Some(addr) = running.control_addr() {
        tracing::info!(control = %addr, "accepting control connections");
    }

    let dispatcher = running.dispatcher().clone();
    let wait = running.wait();
    tokio::pin!(wait);
    tokio::select! {
        _ = &mut wait => return Ok(()),
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("received Ctrl+C, shutting down");
        }
    }

    // Same path as a control `quit`, so the snapshot is closed cleanly
    let quit = Envelope::new(dispatcher.node_address(), dispatcher.brain_address(), Message::command("quit"));
    dispatcher.dispatch(quit, false)?;
    wait.await;
    Ok(())
}
