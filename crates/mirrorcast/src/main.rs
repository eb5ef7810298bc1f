//! # mirrorcast
//!
//! Command-line entry point: `serve` runs the event server fed from stdin,
//! `watch` runs an observer that prints every event it receives.

#![deny(unsafe_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use mirrorcast_client::{ClientConfig, ConnectionStatus, EventClient};
use mirrorcast_core::logging::{LogFormat, init_subscriber};
use mirrorcast_server::{EventProducer, EventServer, ServerConfig};
use mirrorcast_settings::{Settings, load_settings_from_path, settings_path};
use tokio::io::BufReader;
use tokio_util::sync::CancellationToken;

/// Real-time event distribution.
#[derive(Parser, Debug)]
#[command(name = "mirrorcast", version, about = "Real-time event distribution")]
struct Cli {
    /// Settings file (defaults to `~/.mirrorcast/settings.json`).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the event server, emitting one event per JSON line on stdin.
    Serve {
        /// Host to bind (overrides settings).
        #[arg(long)]
        host: Option<String>,

        /// Port to bind, 0 for auto-assign (overrides settings).
        #[arg(long)]
        port: Option<u16>,
    },
    /// Connect to a server and print every event as a JSON line.
    Watch {
        /// WebSocket URL (overrides settings).
        #[arg(long)]
        url: Option<String>,

        /// Source account to subscribe to; repeatable.
        #[arg(long = "subscribe", value_name = "ID")]
        subscribe: Vec<String>,
    },
}

fn load(path: Option<&Path>) -> Result<Settings> {
    let path = path.map_or_else(settings_path, Path::to_path_buf);
    load_settings_from_path(&path)
        .with_context(|| format!("Failed to load settings from {}", path.display()))
}

fn init_logging(settings: &Settings) {
    let format = if settings.logging.json {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };
    init_subscriber(&settings.logging.level, format);
}

fn server_config(settings: &Settings, host: Option<String>, port: Option<u16>) -> ServerConfig {
    let mut config = ServerConfig::from(&settings.server);
    if let Some(host) = host {
        config.host = host;
    }
    if let Some(port) = port {
        config.port = port;
    }
    config
}

fn client_config(settings: &Settings, url: Option<String>) -> ClientConfig {
    let mut config = ClientConfig::from(&settings.client);
    if let Some(url) = url {
        config.url = url;
    }
    config
}

async fn serve(config: ServerConfig) -> Result<()> {
    let mut server = EventServer::new(config);
    match mirrorcast_server::metrics::install_recorder() {
        Ok(handle) => server = server.with_metrics(handle),
        Err(e) => tracing::warn!(error = %e, "metrics recorder unavailable, /metrics disabled"),
    }

    let mut producer = EventProducer::new();
    server.bind_producer(&mut producer);

    let (addr, handle) = server.listen().await.context("Failed to bind server")?;
    tracing::info!("mirrorcast listening on ws://{addr}{}", server.config().ws_path);

    // EOF on stdin stops the pump but not the server.
    let cancel = CancellationToken::new();
    let pump = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            match producer
                .pump_lines(BufReader::new(tokio::io::stdin()), cancel)
                .await
            {
                Ok(emitted) => tracing::info!(emitted, "stdin producer finished"),
                Err(e) => tracing::error!(error = %e, "stdin producer failed"),
            }
        })
    };

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    tracing::info!("Shutting down...");
    cancel.cancel();
    server.shutdown().await;
    let _ = handle.await;
    pump.abort();

    tracing::info!("Shutdown complete");
    Ok(())
}

async fn watch(config: ClientConfig, subscribe: Vec<String>) -> Result<()> {
    let client = Arc::new(EventClient::spawn(config).context("Invalid client configuration")?);

    let _printer = client.on_message(|event| match serde_json::to_string(event) {
        Ok(line) => println!("{line}"),
        Err(e) => tracing::warn!(error = %e, "failed to serialize event"),
    });

    // Subscriptions live on one transport; renew them on every connect.
    let resubscribe = {
        let client = client.clone();
        let mut status = client.status_watch();
        tokio::spawn(async move {
            loop {
                if *status.borrow_and_update() == ConnectionStatus::Connected {
                    for id in &subscribe {
                        if !client.subscribe(id.as_str()).await {
                            tracing::warn!(source_account_id = %id, "subscribe failed");
                        }
                    }
                }
                if status.changed().await.is_err() {
                    break;
                }
            }
        })
    };

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    resubscribe.abort();
    client.shutdown().await;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = load(cli.config.as_deref())?;
    init_logging(&settings);

    match cli.command {
        Command::Serve { host, port } => serve(server_config(&settings, host, port)).await,
        Command::Watch { url, subscribe } => watch(client_config(&settings, url), subscribe).await,
    }
}
