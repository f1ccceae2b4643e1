//! PinFleet
//!
//! Command-line front end for the IPFS Cluster fleet coordinator.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                            PinFleet                              │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  ┌──────────────┐    ┌──────────────┐    ┌──────────────┐       │
//! │  │  CLI / HTTP  │───▶│ Coordinator  │───▶│ Cluster nodes│       │
//! │  │   surface    │    │              │───▶│   Gateways   │       │
//! │  └──────────────┘    └──────────────┘    └──────────────┘       │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{error, info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use pinfleet::api::{ApiResponse, ApiServer};
use pinfleet::{Cid, ClusterCoordinator, CoordinatorConfig, PinFilter, UploadRequest};

// =============================================================================
// CLI Arguments
// =============================================================================

/// PinFleet - IPFS Cluster fleet coordination and gateway failover
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// YAML configuration file
    #[arg(long, env = "PINFLEET_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Cluster node endpoints in priority order (overrides config)
    #[arg(long = "node", env = "PINFLEET_NODES", value_delimiter = ',', global = true)]
    nodes: Vec<String>,

    /// Public gateways in preference order (overrides config)
    #[arg(long = "gateway", env = "PINFLEET_GATEWAYS", value_delimiter = ',', global = true)]
    gateways: Vec<String>,

    /// Online nodes required for HEALTHY (overrides config)
    #[arg(long, env = "PINFLEET_QUORUM", global = true)]
    quorum: Option<usize>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info", global = true)]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON", global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP API server
    Serve {
        /// Bind address
        #[arg(long, env = "PINFLEET_ADDR", default_value = "0.0.0.0:3001")]
        addr: String,
    },
    /// Fleet snapshot from the first reachable node
    Status,
    /// Peer listing from the first reachable node
    Peers,
    /// Pin listing, optionally filtered by state
    Pins {
        /// Comma separated states (queued, pinning, pinned, unpinned, error)
        #[arg(long)]
        filter: Option<String>,
    },
    /// Upload and pin a file
    Add {
        path: PathBuf,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        mimetype: Option<String>,
    },
    /// Pin status of a CID
    PinStatus { cid: String },
    /// Unpin a CID
    Unpin { cid: String },
    /// Download a CID through the public gateways
    Download {
        cid: String,
        /// Write to this file instead of stdout
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
    /// Gateway metadata for a CID
    Metadata { cid: String },
    /// Whether any gateway serves a CID
    Accessible { cid: String },
    /// Fastest public gateway
    BestGateway,
    /// Fleet health verdict
    Health,
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    init_logging(&args);

    let config = load_config(&args)?;
    let coordinator =
        Arc::new(ClusterCoordinator::init(config).context("Failed to initialize coordinator")?);

    match args.command {
        Command::Serve { addr } => {
            info!("Starting PinFleet API server");
            info!("  Nodes: {}", coordinator.config().nodes.join(", "));
            info!("  Gateways: {}", coordinator.config().gateways.join(", "));
            info!("  Healthy quorum: {}", coordinator.config().healthy_quorum);

            let server = Arc::new(ApiServer::new(coordinator.clone()));
            tokio::select! {
                result = server.serve(&addr) => {
                    if let Err(e) = &result {
                        error!("API server error: {}", e);
                    }
                    result?;
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("Received shutdown signal");
                }
            }
            coordinator.shutdown();
            info!("PinFleet shutdown complete");
            Ok(())
        }
        command => {
            let response = run_command(&coordinator, command).await;
            coordinator.shutdown();
            if let Some(response) = response {
                println!("{}", serde_json::to_string_pretty(&response)?);
                if !response.success {
                    std::process::exit(1);
                }
            }
            Ok(())
        }
    }
}

/// Run a one-shot command. `None` means output was already written.
async fn run_command(coordinator: &ClusterCoordinator, command: Command) -> Option<ApiResponse> {
    let response = match command {
        Command::Serve { .. } => return None,
        Command::Status => envelope(coordinator.status().await),
        Command::Peers => envelope(coordinator.peers().await),
        Command::Pins { filter } => match filter.as_deref().map(PinFilter::parse).transpose() {
            Ok(filter) => envelope(coordinator.list_pins(&filter.unwrap_or_default()).await),
            Err(e) => ApiResponse::from_error(&e),
        },
        Command::Add {
            path,
            name,
            mimetype,
        } => {
            let mut request = UploadRequest::from_path(path);
            if let Some(name) = name {
                request = request.with_name(name);
            }
            if let Some(mimetype) = mimetype {
                request = request.with_mimetype(mimetype);
            }
            envelope(coordinator.add(request).await)
        }
        Command::PinStatus { cid } => match Cid::parse(&cid) {
            Ok(cid) => envelope(coordinator.pin_status(&cid).await),
            Err(e) => ApiResponse::from_error(&e),
        },
        Command::Unpin { cid } => match Cid::parse(&cid) {
            Ok(cid) => envelope(
                coordinator
                    .unpin(&cid)
                    .await
                    .map(|outcome| serde_json::json!({ "cid": cid, "outcome": outcome })),
            ),
            Err(e) => ApiResponse::from_error(&e),
        },
        Command::Download { cid, output } => {
            let cid = match Cid::parse(&cid) {
                Ok(cid) => cid,
                Err(e) => return Some(ApiResponse::from_error(&e)),
            };
            let bytes = match coordinator.download(&cid).await {
                Ok(bytes) => bytes,
                Err(e) => return Some(ApiResponse::from_error(&e)),
            };
            match output {
                Some(path) => match tokio::fs::write(&path, &bytes).await {
                    Ok(()) => ApiResponse::ok(serde_json::json!({
                        "cid": cid,
                        "bytes": bytes.len(),
                        "path": path.display().to_string(),
                    })),
                    Err(e) => ApiResponse::from_error(&pinfleet::Error::from(e)),
                },
                None => {
                    return match write_flushed(&mut tokio::io::stdout(), &bytes).await {
                        Ok(()) => None,
                        Err(e) => Some(ApiResponse::from_error(&pinfleet::Error::from(e))),
                    };
                }
            }
        }
        Command::Metadata { cid } => match Cid::parse(&cid) {
            Ok(cid) => envelope(coordinator.metadata(&cid).await),
            Err(e) => ApiResponse::from_error(&e),
        },
        Command::Accessible { cid } => match Cid::parse(&cid) {
            Ok(cid) => {
                let accessible = coordinator.is_accessible(&cid).await;
                ApiResponse::ok(serde_json::json!({ "cid": cid, "accessible": accessible }))
            }
            Err(e) => ApiResponse::from_error(&e),
        },
        Command::BestGateway => envelope(
            coordinator
                .best_gateway()
                .await
                .map(|gateway| serde_json::json!({ "gateway": gateway })),
        ),
        Command::Health => envelope(coordinator.health_check().await),
    };
    Some(response)
}

async fn write_flushed<W: AsyncWrite + Unpin>(out: &mut W, bytes: &[u8]) -> std::io::Result<()> {
    out.write_all(bytes).await?;
    out.flush().await
}

fn envelope<T: serde::Serialize>(result: pinfleet::Result<T>) -> ApiResponse {
    match result {
        Ok(data) => ApiResponse::ok(data),
        Err(e) => ApiResponse::from_error(&e),
    }
}

// =============================================================================
// Configuration
// =============================================================================

fn load_config(args: &Args) -> anyhow::Result<CoordinatorConfig> {
    let mut config = match &args.config {
        Some(path) => CoordinatorConfig::from_yaml_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => CoordinatorConfig::default(),
    };

    if !args.nodes.is_empty() {
        config.nodes = args.nodes.clone();
    }
    if !args.gateways.is_empty() {
        config.gateways = args.gateways.clone();
    }
    if let Some(quorum) = args.quorum {
        config.healthy_quorum = quorum;
    }

    Ok(config)
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args) {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let mut filter = EnvFilter::from_default_env().add_directive(level.into());
    for directive in ["hyper=warn", "reqwest=warn", "h2=warn"] {
        if let Ok(directive) = directive.parse() {
            filter = filter.add_directive(directive);
        }
    }

    // stdout is reserved for command output
    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::pin::Pin;
    use std::task::{Context as TaskContext, Poll};

    struct BrokenPipe;

    impl AsyncWrite for BrokenPipe {
        fn poll_write(
            self: Pin<&mut Self>,
            _cx: &mut TaskContext<'_>,
            _buf: &[u8],
        ) -> Poll<std::io::Result<usize>> {
            Poll::Ready(Err(std::io::ErrorKind::BrokenPipe.into()))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut TaskContext<'_>) -> Poll<std::io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(
            self: Pin<&mut Self>,
            _cx: &mut TaskContext<'_>,
        ) -> Poll<std::io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    #[tokio::test]
    async fn test_write_flushed_writes_everything() {
        let mut out = Vec::new();

        write_flushed(&mut out, b"content").await.unwrap();

        assert_eq!(out, b"content");
    }

    #[tokio::test]
    async fn test_write_flushed_reports_write_errors() {
        let err = write_flushed(&mut BrokenPipe, b"content").await.unwrap_err();

        assert_eq!(err.kind(), std::io::ErrorKind::BrokenPipe);
    }
}
