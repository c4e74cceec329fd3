//! contactgraph gRPC server.
//!
//! Serves `contactgraph.IdentityService` over a durable contact database.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::signal;
use tonic::transport::Server;
use tracing::info;
use tracing_subscriber::EnvFilter;

use contactgraph::config::{ReconcilerConfig, RuntimeConfig};
use contactgraph::engine::runtime::ReconcileRuntime;
use contactgraph::storage::open_database;
use contactgraph::transport::IdentityServiceImpl;
use contactgraph::Reconciler;

const DEFAULT_PORT: u16 = 50051;
const DEFAULT_DATA_DIR: &str = "./contacts.db";

const USAGE: &str = "\
contactgraph-server - identity reconciliation gRPC server

USAGE:
    contactgraph-server [OPTIONS]

OPTIONS:
    -p, --port <PORT>         Port to listen on [env: CONTACTGRAPH_PORT] [default: 50051]
    -d, --data-dir <DIR>      Data directory [env: CONTACTGRAPH_DATA_DIR] [default: ./contacts.db]
    -w, --workers <N>         Reconcile worker threads [default: 4]
    -h, --help                Print help information

Log verbosity follows RUST_LOG (default: info).";

struct Config {
    addr: SocketAddr,
    data_dir: PathBuf,
    workers: usize,
}

fn parse_port(raw: &str) -> Result<u16, String> {
    raw.parse().map_err(|_| format!("invalid port number: {raw}"))
}

fn parse_args(args: &[String]) -> Result<Option<Config>, String> {
    let mut port = match std::env::var("CONTACTGRAPH_PORT") {
        Ok(raw) => parse_port(&raw)?,
        Err(_) => DEFAULT_PORT,
    };
    let mut data_dir = std::env::var_os("CONTACTGRAPH_DATA_DIR")
        .map_or_else(|| PathBuf::from(DEFAULT_DATA_DIR), PathBuf::from);
    let mut workers = RuntimeConfig::default().workers;

    let mut it = args.iter().skip(1);
    while let Some(arg) = it.next() {
        let mut value = || it.next().ok_or_else(|| format!("{arg} requires a value"));
        match arg.as_str() {
            "--port" | "-p" => port = parse_port(value()?)?,
            "--data-dir" | "-d" => data_dir = PathBuf::from(value()?),
            "--workers" | "-w" => {
                let raw = value()?;
                workers = raw.parse().map_err(|_| format!("invalid worker count: {raw}"))?;
            }
            "--help" | "-h" => return Ok(None),
            other => return Err(format!("unknown argument: {other}")),
        }
    }

    Ok(Some(Config {
        addr: SocketAddr::from(([127, 0, 0, 1], port)),
        data_dir,
        workers,
    }))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args: Vec<String> = std::env::args().collect();
    let config = match parse_args(&args) {
        Ok(Some(config)) => config,
        Ok(None) => {
            println!("{USAGE}");
            return Ok(());
        }
        Err(msg) => {
            eprintln!("error: {msg}\n\n{USAGE}");
            std::process::exit(2);
        }
    };

    info!(version = env!("CARGO_PKG_VERSION"), data_dir = %config.data_dir.display(), "starting contactgraph");

    // Holds the directory lock for the process lifetime.
    let store = Arc::new(open_database(&config.data_dir, None)?);
    let reconciler = Reconciler::with_config(store, ReconcilerConfig::default())?;
    let runtime = ReconcileRuntime::new(
        reconciler,
        RuntimeConfig {
            workers: config.workers,
            ..RuntimeConfig::default()
        },
    )?;
    let svc = IdentityServiceImpl::new(Arc::new(runtime)).into_server();

    info!(addr = %config.addr, workers = config.workers, "serving gRPC");
    Server::builder()
        .add_service(svc)
        .serve_with_shutdown(config.addr, async {
            let _ = signal::ctrl_c().await;
        })
        .await?;

    info!("shut down");
    Ok(())
}
