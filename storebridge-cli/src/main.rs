use anyhow::{Context, Result};
use clap::Parser;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use storebridge_core::config::Config;
use storebridge_core::core_channel::{Channel, LoopbackChannel};
use storebridge_core::core_codec::{ItemsChangeEvent, UpdateRequest};
use storebridge_core::core_gateway::{
    GatewayChannel, CURRENT_SESSION_DATE_KEY, FIRST_SESSION_DATE_KEY, INSTANCE_ID_KEY,
    LAST_SESSION_DATE_KEY,
};
use storebridge_core::core_storage::InMemoryStorage;
use storebridge_core::logging::{init_logging_with_config, LogConfig, LogLevel};
use storebridge_core::metrics::init_metrics;
use storebridge_core::{StorageGateway, StorageProxy};
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "storebridge")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Set the log level (trace, debug, info, warn, error)
    #[arg(short, long)]
    log_level: Option<String>,

    /// Enable JSON formatted logging
    #[arg(long)]
    json_logs: bool,

    /// Load configuration from a TOML file instead of the environment
    #[arg(short, long)]
    config: Option<std::path::PathBuf>,

    /// Subcommand to execute
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Parser, Debug)]
enum Command {
    /// Run one gateway and several proxies in-process and show the change traffic
    Demo {
        /// Number of connected proxies
        #[arg(long, default_value_t = 2)]
        clients: usize,

        /// Number of keys written by the first proxy
        #[arg(long, default_value_t = 5)]
        writes: usize,
    },
    /// Initialize a gateway twice over the same storage and print the identity values
    Seed,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => Config::from_env()?,
    };

    let level = args.log_level.as_deref().unwrap_or(&config.logging.level);
    let log_level = level.parse::<LogLevel>().unwrap_or_else(|_| {
        eprintln!("Invalid log level '{}', using 'info'", level);
        LogLevel::Info
    });

    let log_config = LogConfig::new(log_level)
        .json_format(args.json_logs || config.logging.json_format)
        .with_timestamp(config.logging.with_timestamp)
        .with_target(config.logging.with_target);

    init_logging_with_config(log_config)?;
    init_metrics();

    info!("storebridge started");

    match args.command {
        Some(Command::Demo { clients, writes }) => run_demo(&config, clients, writes).await?,
        Some(Command::Seed) => run_seed(&config).await?,
        None => {
            info!("No command specified. Use --help for usage information.");
        }
    }

    info!("storebridge finished");

    Ok(())
}

fn new_storage(config: &Config) -> Arc<InMemoryStorage> {
    Arc::new(InMemoryStorage::with_change_capacity(
        config.storage.change_channel_capacity,
    ))
}

async fn connect(gateway: &StorageGateway, config: &Config) -> Result<StorageProxy> {
    let server = GatewayChannel::new(gateway.clone()).into_server();
    let channel: Arc<dyn Channel> = Arc::new(LoopbackChannel::connect(server));
    Ok(StorageProxy::with_config(channel, &config.proxy).await?)
}

async fn run_demo(config: &Config, clients: usize, writes: usize) -> Result<()> {
    if clients == 0 {
        anyhow::bail!("demo needs at least one client");
    }

    let gateway = StorageGateway::new(new_storage(config), config.gateway.clone());

    let mut proxies = Vec::with_capacity(clients);
    let mut streams = Vec::with_capacity(clients);
    for _ in 0..clients {
        let proxy = connect(&gateway, config).await?;
        streams.push(proxy.on_did_change_items());
        proxies.push(proxy);
    }
    info!("Connected {} proxies", clients);

    let writer = &proxies[0];
    for i in 0..writes {
        writer
            .update_items(&UpdateRequest::new().insert(format!("demo.key{}", i), i.to_string()))
            .await?;
    }

    // Two quiet periods is enough for the last window to flush.
    tokio::time::sleep(config.gateway.debounce_delay * 2 + Duration::from_millis(20)).await;

    for (client, (_handle, receiver)) in streams.iter_mut().enumerate() {
        let mut events: Vec<ItemsChangeEvent> = Vec::new();
        while let Ok(event) = receiver.try_recv() {
            events.push(event);
        }
        if events.is_empty() {
            warn!("Client {} received no change events", client);
        }
        for event in events {
            let keys: BTreeMap<_, _> = event.items.into_iter().collect();
            println!("client {}: {}", client, serde_json::to_string(&keys)?);
        }
    }

    let snapshot: BTreeMap<_, _> = proxies[clients - 1].get_items().await?.into_iter().collect();
    println!("{}", serde_json::to_string_pretty(&snapshot)?);

    for proxy in &proxies {
        proxy.close();
    }
    gateway.shutdown();
    Ok(())
}

async fn run_seed(config: &Config) -> Result<()> {
    let storage = new_storage(config);

    for run in 1..=2 {
        let gateway = StorageGateway::new(storage.clone(), config.gateway.clone());
        let proxy = connect(&gateway, config).await?;
        let items = proxy.get_items().await?;

        println!("run {}:", run);
        for key in [
            INSTANCE_ID_KEY,
            FIRST_SESSION_DATE_KEY,
            LAST_SESSION_DATE_KEY,
            CURRENT_SESSION_DATE_KEY,
        ] {
            let value = items.get(key).map(String::as_str).unwrap_or("<absent>");
            println!("  {} = {}", key, value);
        }

        proxy.close();
        gateway.shutdown();

        if run == 1 {
            // Session dates have one-second resolution.
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
    }

    Ok(())
}
