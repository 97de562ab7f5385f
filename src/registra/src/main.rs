use anyhow::{Context, Result};
use clap::Parser;
use registra_config::{FileConfig, load_config};
use registra_core::{Memory, Registry, load_document};
use registra_gateway::Gateway;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(version, about = "Registra - API registry and lightweight gateway")]
struct Args {
    /// Path to config file (yaml/json/toml); defaults apply when omitted
    #[arg(short, long)]
    config: Option<String>,
    /// Seed document (yaml/json/toml), overrides `import.path`
    #[arg(short, long)]
    import: Option<String>,
    /// Override `gateway.port`
    #[arg(short, long)]
    port: Option<u16>,
    /// Load and publish, print the import report, then exit
    #[arg(long, default_value_t = false)]
    no_serve: bool,
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();
    let mut cfg = match &args.config {
        Some(path) => load_config(path)?,
        None => FileConfig::default(),
    };
    if let Some(port) = args.port {
        cfg.gateway.port = port;
    }
    if let Some(path) = &args.import {
        cfg.import.path = path.clone();
    }

    let telemetry = registra_tracing::init(
        cfg.service_name(env!("CARGO_PKG_NAME")),
        cfg.tracing.endpoint(),
        &cfg.tracing.logging_mode,
    )?;

    let result = run(&cfg, args.no_serve).await;
    if let Err(e) = &result {
        error!("registra stopped: {e:#}");
    }
    telemetry.shutdown();
    result
}

async fn run(cfg: &FileConfig, no_serve: bool) -> Result<()> {
    let store = Memory::open(&cfg.storage.engine, &cfg.storage.path)
        .with_context(|| format!("open {} store at `{}`", cfg.storage.engine, cfg.storage.path))?;
    let gateway = Arc::new(Gateway::new());
    let registry = Registry::new(Arc::new(store), gateway.clone())?;
    info!(engine = %cfg.storage.engine, apis = registry.list_apis()?.len(), "registry opened");

    if !cfg.import.path.is_empty() {
        let start = Instant::now();
        let doc = load_document(&cfg.import.path)?;
        if let Some(report) = registry.seed(doc)? {
            info!(path = %cfg.import.path, "import loaded in {}ms", start.elapsed().as_millis());
            if no_serve {
                println!("{}", serde_json::to_string_pretty(&report)?);
            }
        }
    }

    let published = registry.publish_all()?;
    info!(routes = published.len(), "routes published");

    if no_serve {
        return Ok(());
    }

    let addr: SocketAddr = cfg
        .gateway
        .addr()
        .parse()
        .with_context(|| format!("invalid gateway address {}", cfg.gateway.addr()))?;
    tokio::select! {
        served = gateway.serve(addr) => served,
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown requested");
            Ok(())
        }
    }
}
