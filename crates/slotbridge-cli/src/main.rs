//! Command-line interface for the slot bridge daemon.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use tracing::info;

use slotbridge_core::{BridgeConfig, RuntimeError, Slot, UnitRuntime};
use slotbridge_devices::{Bridge, EndpointRegistry};
use slotbridge_session::{Session, SessionConfig, TcpDialer};
use slotbridge_storage::EndpointStore;

/// Bridge upstream devices into stable numbered endpoint slots.
#[derive(Parser, Debug)]
#[command(name = "slotbridge")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Action to perform.
    #[command(subcommand)]
    command: Command,

    /// Configuration file (JSON).
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Verbose output.
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the bridge daemon.
    Run {
        /// Upstream host, overriding the config file.
        #[arg(long)]
        host: Option<String>,
        /// Upstream port, overriding the config file.
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Print the persisted identity/slot bindings and exit.
    Bindings,
    /// Forget one identity, freeing its slot for reuse.
    Forget {
        /// Upstream identity to forget.
        identity: String,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();

    let default_filter = if args.verbose {
        "slotbridge=debug"
    } else {
        "slotbridge=info"
    };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();

    let config = load_config(args.config.as_deref())?;

    match args.command {
        Command::Run { host, port } => run_bridge(config, host, port).await,
        Command::Bindings => print_bindings(&config),
        Command::Forget { identity } => forget_identity(&config, &identity),
    }
}

fn load_config(path: Option<&std::path::Path>) -> Result<BridgeConfig> {
    match path {
        Some(path) => {
            let raw = fs::read_to_string(path)
                .with_context(|| format!("cannot read config file {}", path.display()))?;
            serde_json::from_str(&raw)
                .with_context(|| format!("cannot parse config file {}", path.display()))
        }
        None => Ok(BridgeConfig::default()),
    }
}

async fn run_bridge(
    mut config: BridgeConfig,
    host: Option<String>,
    port: Option<u16>,
) -> Result<()> {
    if let Some(host) = host {
        config.upstream.host = host;
    }
    if let Some(port) = port {
        config.upstream.port = port;
    }

    let registry = match &config.store_path {
        Some(path) => {
            let store = EndpointStore::open(path)
                .with_context(|| format!("cannot open endpoint store {}", path.display()))?;
            EndpointRegistry::with_store(store, config.slot_capacity)
        }
        None => EndpointRegistry::in_memory(config.slot_capacity),
    };

    info!(
        host = %config.upstream.host,
        port = config.upstream.port,
        slots = config.slot_capacity,
        "starting bridge"
    );

    let dialer = Arc::new(TcpDialer::new(
        config.upstream.host.clone(),
        config.upstream.port,
    ));
    let (session, events) = Session::spawn(SessionConfig::from(&config.upstream), dialer);
    let runtime = Arc::new(LogRuntime);

    Bridge::new(config, session, events, registry, runtime)
        .run()
        .await;
    Ok(())
}

fn print_bindings(config: &BridgeConfig) -> Result<()> {
    let store = open_store(config)?;
    let mut rows = store.bindings()?;
    rows.sort_by_key(|(_, slot)| *slot);
    if let Some(encoded) = store.load_slot_map()? {
        println!("slot map: {encoded}");
    }
    for (identity, slot) in rows {
        println!("{slot:>5}  {identity}");
    }
    Ok(())
}

fn forget_identity(config: &BridgeConfig, identity: &str) -> Result<()> {
    let store = open_store(config)?;
    let mut registry = EndpointRegistry::with_store(store, config.slot_capacity);
    match registry.forget(identity) {
        Some(slot) => {
            println!("freed slot {slot} ({identity})");
            Ok(())
        }
        None => anyhow::bail!("no binding for identity {identity}"),
    }
}

fn open_store(config: &BridgeConfig) -> Result<Arc<EndpointStore>> {
    let path = config
        .store_path
        .as_ref()
        .context("config has no store_path; nothing is persisted")?;
    EndpointStore::open(path).with_context(|| format!("cannot open endpoint store {}", path.display()))
}

/// Downstream runtime that only logs. Stands in until a concrete device
/// model backend is wired up.
struct LogRuntime;

#[async_trait]
impl UnitRuntime for LogRuntime {
    async fn install_unit(&self, slot: Slot) -> Result<(), RuntimeError> {
        info!(%slot, "unit installed");
        Ok(())
    }

    async fn report_attribute_changed(
        &self,
        slot: Slot,
        attribute: &str,
    ) -> Result<(), RuntimeError> {
        info!(%slot, attribute, "attribute changed");
        Ok(())
    }
}
