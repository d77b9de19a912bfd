mod config;
mod error;
mod proxy;
mod server;
mod workflow;

use anyhow::{Context, Result};
use clap::Parser;
use dotenvy::dotenv;
use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::workflow::file_store::FileStore;
use crate::workflow::http_store::HttpStore;
use crate::workflow::store::WorkflowStore;

#[derive(Parser)]
#[command(name = "flowgate", about = "Gateway in front of a workflow orchestration control plane")]
enum Cli {
    /// Start the aggregation server (graph/grid endpoints)
    #[command(alias = "run")]
    Serve {
        /// Serve workflow metadata from an on-disk snapshot instead of
        /// the upstream API
        #[arg(long)]
        data_dir: Option<PathBuf>,
    },
    /// Start the forwarding proxy in front of the orchestration API
    Proxy,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    dotenv().ok();

    // Default to Serve when no subcommand is given, but still let
    // --help and --version work.
    let args: Vec<String> = std::env::args().collect();
    let cli = if args.len() <= 1 {
        Cli::Serve { data_dir: None }
    } else {
        Cli::parse()
    };

    init_tracing();

    match cli {
        Cli::Serve { data_dir } => run_server(data_dir).await?,
        Cli::Proxy => run_proxy().await?,
    }
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("flowgate=info,hyper=warn,reqwest=warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();
}

fn build_http_client(config: &config::Config) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .timeout(Duration::from_secs(config.upstream_timeout_secs))
        .build()
        .context("failed to build HTTP client")
}

async fn run_server(data_dir_flag: Option<PathBuf>) -> Result<()> {
    let config = Arc::new(config::Config::from_env());

    let data_dir = data_dir_flag.or_else(|| config.data_dir.clone());
    let store: Arc<dyn WorkflowStore> = match data_dir {
        Some(dir) => {
            tracing::info!(data_dir = %dir.display(), "Serving from on-disk snapshot");
            let store = FileStore::new(dir);
            store.load_all().await.context("failed to load workflow snapshot")?;
            Arc::new(store)
        }
        None => {
            tracing::info!(upstream = %config.upstream_base_url, "Serving from upstream metadata API");
            let client = build_http_client(&config)?;
            Arc::new(HttpStore::new(
                client,
                config.upstream_base_url.clone(),
                config.upstream_auth_token.clone(),
            ))
        }
    };

    let app = server::create_app(server::AppState {
        store,
        config: config.clone(),
    });

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = TcpListener::bind(&addr).await?;
    println!("Listening on http://{addr}");
    axum::serve(listener, app).await?;
    Ok(())
}

async fn run_proxy() -> Result<()> {
    let config = Arc::new(config::Config::from_env());
    if config.upstream_auth_token.is_empty() {
        tracing::warn!("UPSTREAM_AUTH_TOKEN is not set; forwarding without credentials");
    }

    let http_client = Arc::new(build_http_client(&config)?);
    let app = proxy::build_router(proxy::ProxyState {
        http_client,
        config: config.clone(),
    });

    let addr = format!("0.0.0.0:{}", config.proxy_port);
    let listener = TcpListener::bind(&addr).await?;
    println!("Proxying {} on http://{addr}", config.upstream_base_url);
    axum::serve(listener, app).await?;
    Ok(())
}
