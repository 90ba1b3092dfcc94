//! privtx-node - stub privacy manager node.
//!
//! Serves the node HTTP and RPC APIs over an in-memory store. It can be
//! started by hand, or as the `nodeCommand` of a settings file, in which case
//! the settings file path arrives as the only argument.

use anyhow::{Context, Result};
use clap::Parser;
use privtx::settings::settings_dir;
use privtx::{BackendKind, Identity, MemoryStoreKind, NodeSettings};
use privtx_node::{NodeOptions, StubNode};
use std::path::{Path, PathBuf};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;
use url::Url;

#[derive(Parser, Debug)]
#[command(name = "privtx-node")]
#[command(about = "In-memory stub privacy manager node")]
struct Args {
    /// Settings file to take listener paths from
    config: Option<PathBuf>,

    /// Serve the HTTP API on this Unix socket
    #[arg(long)]
    socket: Option<PathBuf>,

    /// Serve the HTTP API on this TCP address (host:port)
    #[arg(long)]
    listen: Option<String>,

    /// Serve the binary RPC API on this Unix socket
    #[arg(long)]
    rpc_socket: Option<PathBuf>,

    /// Store semantics: content or recipient [default: content]
    #[arg(long)]
    store: Option<String>,

    /// The node's own public key (base64)
    #[arg(long)]
    identity: Option<String>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

/// Fill what the command line left open from a settings file.
fn apply_settings(options: &mut NodeOptions, store_from_args: bool, path: &Path) -> Result<()> {
    let settings = NodeSettings::load(path)
        .with_context(|| format!("Failed to read settings {}", path.display()))?;
    let work_dir = settings_dir(path);
    let socket = (!settings.socket.is_empty()).then(|| work_dir.join(&settings.socket));

    let transport = BackendKind::parse(&settings.transport)
        .with_context(|| format!("Unknown transport {:?}", settings.transport))?;
    match transport {
        BackendKind::Rpc => options.rpc_socket = options.rpc_socket.take().or(socket),
        BackendKind::Http => {
            options.socket = options.socket.take().or(socket);
            if options.listen.is_none() && !settings.url.is_empty() {
                let url = Url::parse(&settings.url)
                    .with_context(|| format!("Invalid url {:?}", settings.url))?;
                let host = url.host_str().unwrap_or("127.0.0.1");
                let port = url.port_or_known_default().unwrap_or(80);
                options.listen = Some(format!("{}:{}", host, port));
            }
        }
        BackendKind::Memory => {}
    }

    if !store_from_args && !settings.memory_store.is_empty() {
        options.store = MemoryStoreKind::parse(&settings.memory_store)
            .with_context(|| format!("Unknown memory store {:?}", settings.memory_store))?;
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Set up logging
    let log_level = if args.debug { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .with_writer(std::io::stderr)
        .init();

    info!("Starting privtx stub node");

    let store = match &args.store {
        Some(name) => {
            MemoryStoreKind::parse(name).with_context(|| format!("Unknown store {:?}", name))?
        }
        None => MemoryStoreKind::default(),
    };
    let identity = args
        .identity
        .as_deref()
        .map(Identity::from_base64)
        .transpose()
        .context("Invalid --identity")?;

    let mut options = NodeOptions {
        socket: args.socket,
        listen: args.listen,
        rpc_socket: args.rpc_socket,
        store,
        identity,
    };
    if let Some(path) = &args.config {
        apply_settings(&mut options, args.store.is_some(), path)?;
    }

    let node = StubNode::start(options).await?;

    // Print the bound address for callers that asked for port 0
    if let Some(addr) = node.tcp_addr() {
        println!("NODE_LISTEN={}", addr);
    }

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received, exiting");
    node.shutdown();

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const RECIPIENT_SETTINGS: &str = "socket = \"node.ipc\"\nmemoryStore = \"recipient\"\n";

    fn settings_file(dir: &Path, body: &str) -> PathBuf {
        let path = dir.join("node.toml");
        std::fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn test_settings_store_fills_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = settings_file(dir.path(), RECIPIENT_SETTINGS);

        let mut options = NodeOptions::default();
        apply_settings(&mut options, false, &path).unwrap();
        assert_eq!(options.store, MemoryStoreKind::RecipientIndexed);
        assert_eq!(options.socket, Some(dir.path().join("node.ipc")));
    }

    #[test]
    fn test_explicit_store_wins_over_settings() {
        let dir = tempfile::tempdir().unwrap();
        let path = settings_file(dir.path(), RECIPIENT_SETTINGS);

        let mut options = NodeOptions {
            store: MemoryStoreKind::ContentAddressed,
            ..Default::default()
        };
        apply_settings(&mut options, true, &path).unwrap();
        assert_eq!(options.store, MemoryStoreKind::ContentAddressed);
    }

    #[test]
    fn test_explicit_listener_wins_over_settings() {
        let dir = tempfile::tempdir().unwrap();
        let path = settings_file(dir.path(), "url = \"http://127.0.0.1:9101\"\n");

        let mut options = NodeOptions {
            listen: Some("127.0.0.1:0".to_string()),
            ..Default::default()
        };
        apply_settings(&mut options, false, &path).unwrap();
        assert_eq!(options.listen.as_deref(), Some("127.0.0.1:0"));

        let mut options = NodeOptions::default();
        apply_settings(&mut options, false, &path).unwrap();
        assert_eq!(options.listen.as_deref(), Some("127.0.0.1:9101"));
    }
}
