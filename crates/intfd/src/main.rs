//! intfd daemon entry point.
//!
//! Loads configuration, initializes logging, connects the store and runs the
//! event loop until SIGINT or an `exit` control request.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::sync::mpsc;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use sonic_intfd::{
    ControlServer, InterfaceStore, IntfMgr, IntfdConfig, MemoryStore, DEFAULT_CONFIG_PATH,
};
use sonic_intfd_arbiter::Arbiter;

/// Control request queue depth.
const CONTROL_QUEUE_DEPTH: usize = 16;

#[derive(Parser, Debug)]
#[command(name = "intfd", version, about = "SONiC interface forwarding-state daemon")]
struct Args {
    /// Configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Log level (overrides the configuration file; RUST_LOG wins over both)
    #[arg(long)]
    log_level: Option<String>,

    /// Redis host
    #[arg(long)]
    redis_host: Option<String>,

    /// Redis port
    #[arg(long)]
    redis_port: Option<u16>,

    /// Control socket path
    #[arg(long)]
    unixctl: Option<String>,

    /// Run against an empty in-process store instead of Redis
    #[arg(long)]
    memory: bool,
}

impl Args {
    fn apply_overrides(&self, config: &mut IntfdConfig) {
        if let Some(level) = &self.log_level {
            config.daemon.log_level = level.clone();
        }
        if let Some(host) = &self.redis_host {
            config.database.redis_host = host.clone();
        }
        if let Some(port) = self.redis_port {
            config.database.redis_port = port;
        }
        if let Some(path) = &self.unixctl {
            config.daemon.unixctl_path = path.clone();
        }
    }
}

fn init_logging(log_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true))
        .init();
}

async fn open_store(args: &Args, config: &IntfdConfig) -> anyhow::Result<Box<dyn InterfaceStore>> {
    if args.memory {
        info!("Using in-process store");
        return Ok(Box::new(MemoryStore::new()));
    }

    connect_redis(config).await
}

#[cfg(feature = "redis")]
async fn connect_redis(config: &IntfdConfig) -> anyhow::Result<Box<dyn InterfaceStore>> {
    let store = sonic_intfd::RedisStore::connect(&config.database)
        .await
        .context("connecting to Redis")?;
    Ok(Box::new(store))
}

#[cfg(not(feature = "redis"))]
async fn connect_redis(_config: &IntfdConfig) -> anyhow::Result<Box<dyn InterfaceStore>> {
    anyhow::bail!("built without Redis support; run with --memory")
}

async fn run(args: Args) -> anyhow::Result<()> {
    let mut config = IntfdConfig::load_or_default(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;
    args.apply_overrides(&mut config);
    config.validate()?;

    init_logging(&config.daemon.log_level);
    info!("--- Starting intfd ---");

    let mut store = open_store(&args, &config).await?;

    let arbiter = Arc::new(Arbiter::builtin());
    let mut mgr = IntfMgr::new(arbiter);
    mgr.load_initial_state(store.as_mut())
        .await
        .context("loading initial state")?;
    mgr.flush(store.as_mut())
        .await
        .context("writing initial forwarding state")?;

    let server = ControlServer::bind(&config.daemon.unixctl_path)
        .with_context(|| format!("binding {}", config.daemon.unixctl_path))?;
    let (control_tx, control_rx) = mpsc::channel(CONTROL_QUEUE_DEPTH);
    let control_task = tokio::spawn(server.serve(control_tx));

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for SIGINT: {}", e);
            std::future::pending::<()>().await;
        }
    };

    let result = sonic_intfd::run(&mut mgr, store.as_mut(), &config, control_rx, shutdown).await;
    control_task.abort();

    let stats = mgr.stats();
    info!(
        "intfd stopping: {} passes, {} transitions, {} writes, {} deletes, {} rejected deletions",
        stats.passes,
        stats.transitions,
        stats.store_writes,
        stats.store_deletes,
        stats.rejected_deletions
    );

    result.map_err(Into::into)
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    match run(args).await {
        Ok(()) => {
            info!("intfd exiting normally");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("intfd error: {:#}", e);
            eprintln!("intfd: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
