use anyhow::{Context, Result};
use clap::Parser;
use ferry_server::{Server, ServerConfig, ServerOptions, create_router};
use std::path::PathBuf;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "ferry-server")]
#[command(about = "Ferry - in-memory data server with leader/follower replication", long_about = None)]
struct Args {
    /// YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Listen host
    #[arg(long)]
    host: Option<String>,

    /// RESP listen port
    #[arg(short, long)]
    port: Option<u16>,

    /// HTTP status port
    #[arg(long)]
    http_port: Option<u16>,

    /// Data directory (log and persisted config)
    #[arg(short, long)]
    data_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => ServerConfig::from_file(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => ServerConfig::default(),
    };
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(http_port) = args.http_port {
        config.server.http_port = http_port;
    }
    if let Some(data_dir) = args.data_dir {
        config.storage.data_dir = data_dir;
    }

    init_tracing(&config);
    info!("Starting Ferry Server v{}", env!("CARGO_PKG_VERSION"));

    ferry_server::metrics::init_metrics();

    let mut options = ServerOptions::new(config.server_addr(), &config.storage.data_dir);
    options.settings = config.replication.clone();
    let server = Server::start(options).await?;

    let app = create_router(server);
    let http_addr = config.http_addr();
    info!("HTTP status on http://{}", http_addr);

    let listener = tokio::net::TcpListener::bind(&http_addr)
        .await
        .with_context(|| format!("failed to bind {}", http_addr))?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn init_tracing(config: &ServerConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.level));

    if config.logging.format == "json" {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .pretty()
            .init();
    }
}
