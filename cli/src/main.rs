// tether: command-line client for persistent TCP connections
//
// Sends one-way messages, performs validated request/response exchanges,
// listens for unsolicited messages, and runs a local echo server for manual
// testing.

mod config;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::*;
use std::sync::Arc;
use std::time::Duration;
use tether_core::protocol::{Reply, StringTransceiver};
use tether_core::transport::{TcpDialer, TextLink};
use tether_core::{ListenEvent, Sender, TextTransceiver};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

#[derive(Parser)]
#[command(name = "tether")]
#[command(about = "Tether: persistent connections with retries", long_about = None)]
#[command(version)]
struct Cli {
    /// Override the configured remote address
    #[arg(short, long, global = true)]
    address: Option<String>,

    /// Log at debug level unless RUST_LOG is set
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Send a one-way message
    Send { message: String },
    /// Send a request and wait for a validated reply
    Ask {
        message: String,
        /// Required reply prefix
        #[arg(long)]
        header: Option<String>,
        /// Minimum reply length in characters
        #[arg(long)]
        min: Option<usize>,
        /// Maximum reply length in characters
        #[arg(long)]
        max: Option<usize>,
    },
    /// Print messages pushed by the remote side
    Listen {
        /// Stop after this many seconds (default: until Ctrl-C or peer close)
        #[arg(short, long)]
        duration_secs: Option<u64>,
    },
    /// Run a local echo server
    EchoServer {
        #[arg(short, long, default_value = "7878")]
        port: u16,
    },
    /// Configure settings
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    Set { key: String, value: String },
    Get { key: String },
    List,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .init();

    let mut config = config::Config::load()?;
    let command = match cli.command {
        // Config edits always see the stored values, never the override
        Commands::Config { action } => return cmd_config(config, action),
        command => command,
    };
    if let Some(address) = cli.address {
        config.address = address;
    }

    match command {
        Commands::Send { message } => cmd_send(&config, message).await,
        Commands::Ask {
            message,
            header,
            min,
            max,
        } => cmd_ask(&config, message, header, min, max).await,
        Commands::Listen { duration_secs } => cmd_listen(&config, duration_secs).await,
        Commands::EchoServer { port } => cmd_echo_server(port).await,
        Commands::Config { action } => cmd_config(config, action),
    }
}

fn text_link(config: &config::Config) -> TextLink<TcpDialer> {
    TextLink::with_options(
        TcpDialer::new(config.address.clone()),
        config.link_options(),
        config.encoding,
    )
}

async fn cmd_send(config: &config::Config, message: String) -> Result<()> {
    let sender: Sender<String, _> = Sender::new(text_link(config));

    sender
        .connect(&config.connect_policy()?)
        .await
        .with_context(|| format!("Failed to connect to {}", config.address))?;
    let result = sender.send(&message, &config.exchange_policy()?).await;
    sender.disconnect().await;

    result.context("Failed to send message")?;
    println!("{} Sent to {}", "✓".green(), config.address.bright_cyan());
    Ok(())
}

async fn cmd_ask(
    config: &config::Config,
    message: String,
    header: Option<String>,
    min: Option<usize>,
    max: Option<usize>,
) -> Result<()> {
    let framing = config.framing(header, min, max)?;
    let policy = config.connect_policy()?;
    let transceiver = Arc::new(TextTransceiver::new(text_link(config)));
    let protocol = StringTransceiver::new(Arc::clone(&transceiver))
        .with_reconnect_policy(policy)
        .with_io_timeout(config.io_timeout());

    let reply = protocol
        .communicate(
            &message,
            config.retry.exchange_attempts,
            config.cooldown(),
            &framing,
        )
        .await;
    transceiver.disconnect().await;

    match reply {
        Reply::Valid(text) => {
            println!("{}", text);
            Ok(())
        }
        Reply::Exhausted { attempts } => {
            anyhow::bail!(
                "No valid reply from {} after {} attempt(s)",
                config.address,
                attempts
            )
        }
    }
}

async fn cmd_listen(config: &config::Config, duration_secs: Option<u64>) -> Result<()> {
    let transceiver = TextTransceiver::new(text_link(config));
    let mut events = transceiver.subscribe_listen();

    transceiver
        .connect(&config.connect_policy()?)
        .await
        .with_context(|| format!("Failed to connect to {}", config.address))?;
    transceiver.set_listening(true).await;

    println!(
        "{} Listening on {} {}",
        "●".green(),
        config.address.bright_cyan(),
        "(Ctrl-C to stop)".dimmed()
    );

    let deadline = tokio::time::sleep(
        duration_secs
            .map(Duration::from_secs)
            .unwrap_or(Duration::MAX),
    );
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(ListenEvent::MessageReceived(text)) => println!("{} {}", "←".bright_blue(), text),
                Ok(ListenEvent::ListenError(err)) => eprintln!("{} {}", "!".yellow(), err),
                Ok(ListenEvent::ListenDisconnected) => {
                    println!("{}", "Peer closed the connection".dimmed());
                    break;
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    eprintln!("{} {} message(s) dropped", "!".yellow(), skipped);
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            },
            _ = &mut deadline => break,
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    transceiver.set_listening(false).await;
    transceiver.disconnect().await;
    Ok(())
}

async fn cmd_echo_server(port: u16) -> Result<()> {
    let listener = TcpListener::bind(("127.0.0.1", port))
        .await
        .with_context(|| format!("Failed to bind port {}", port))?;
    let local = listener.local_addr()?;
    println!("{} Echo server on {}", "●".green(), local.to_string().bright_cyan());

    loop {
        let (mut socket, peer) = tokio::select! {
            accepted = listener.accept() => accepted.context("Accept failed")?,
            _ = tokio::signal::ctrl_c() => return Ok(()),
        };
        tracing::info!("Echo client connected: {}", peer);

        tokio::spawn(async move {
            let mut buf = vec![0u8; 4096];
            loop {
                match socket.read(&mut buf).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => {
                        if socket.write_all(&buf[..n]).await.is_err() {
                            break;
                        }
                    }
                }
            }
            tracing::info!("Echo client disconnected: {}", peer);
        });
    }
}

fn cmd_config(mut config: config::Config, action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Set { key, value } => {
            config.set(&key, &value)?;
            config.save()?;
            println!("{} Set {} = {}", "✓".green(), key.bright_cyan(), value);
        }

        ConfigAction::Get { key } => {
            if let Some(value) = config.get(&key) {
                println!("{} = {}", key.bright_cyan(), value);
            } else {
                anyhow::bail!("Unknown config key: {}", key);
            }
        }

        ConfigAction::List => {
            println!("{}", "Configuration".bold());
            println!();

            for (key, value) in config.list() {
                println!("  {:<20} {}", key.bright_cyan(), value);
            }

            println!();
            let file = config::Config::config_file()?;
            println!("  {}", file.display().to_string().dimmed());
        }
    }

    Ok(())
}
