//! Waypost - offline-durable location telemetry sync.
//!
//! Reads newline-delimited JSON fixes from stdin, filters and queues them
//! durably, and delivers batches to the configured collector in the
//! background. Run with: `cargo run -p waypost-service`

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::Mutex;
use tracing::{info, warn};

use waypost_service::{Config, parse_fix_line};
use waypost_store::Store;
use waypost_sync::{
    AlwaysOnline, BackoffConfig, DeviceIdentity, Settings, StoreSettings, SyncClient,
    SyncCoordinator, SyncScheduler, set_tracking_enabled, tracking_enabled,
};

/// Waypost - offline-durable location telemetry sync.
#[derive(Parser, Debug)]
#[command(name = "waypost")]
#[command(version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Path to configuration file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Collector endpoint URL (overrides config).
    #[arg(short, long, global = true)]
    endpoint: Option<String>,

    /// Database path (overrides config).
    #[arg(short, long, global = true)]
    database: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the sync service in the foreground (default behavior).
    Run,

    /// Show queue depth, device id, and the newest stored location.
    Status,

    /// Discard the persisted device id and mint a fresh one.
    ResetDeviceId,

    /// Delete every stored location, sent or not.
    Purge,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    match args.command {
        Some(Command::Status) => status(&args),
        Some(Command::ResetDeviceId) => reset_device_id(&args).await,
        Some(Command::Purge) => purge(&args),
        Some(Command::Run) | None => run_service(args).await,
    }
}

fn load_config(args: &Args) -> anyhow::Result<Config> {
    let mut config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::load_default().unwrap_or_default(),
    };

    // Override config with CLI args
    if let Some(endpoint) = &args.endpoint {
        config.collector.endpoint = endpoint.clone();
    }
    if let Some(db_path) = &args.database {
        config.storage.path = db_path.clone();
    }

    config.validate()?;
    Ok(config)
}

async fn run_service(args: Args) -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("waypost_service=info".parse()?)
                .add_directive("waypost_sync=info".parse()?)
                .add_directive("waypost_store=info".parse()?),
        )
        .init();

    let config = load_config(&args)?;

    info!("Opening database at {:?}", config.storage.path);
    let store = Arc::new(Mutex::new(Store::open(&config.storage.path)?));

    let settings = Arc::new(StoreSettings::new(Arc::clone(&store)));
    let identity = Arc::new(DeviceIdentity::new(Arc::clone(&settings) as Arc<dyn Settings>));
    let client = Arc::new(SyncClient::with_timeout(
        &config.collector.endpoint,
        config.collector.timeout(),
    )?);

    let coordinator = Arc::new(
        SyncCoordinator::new(Arc::clone(&store), identity, client)
            .min_distance(config.sync.min_distance_m)
            .batch_limit(config.sync.batch_limit),
    );

    let backoff = BackoffConfig {
        initial_delay: config.sync.backoff(),
        ..BackoffConfig::default()
    };
    let scheduler = SyncScheduler::new(Arc::clone(&coordinator), Arc::new(AlwaysOnline))
        .interval(config.sync.interval())
        .backoff(backoff);

    set_tracking_enabled(settings.as_ref(), true).await?;
    scheduler.schedule_periodic().await;
    info!(
        "Syncing to {} every {} minutes",
        config.collector.endpoint, config.sync.interval_mins
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down");
                break;
            }
            line = lines.next_line() => {
                match line? {
                    Some(line) => handle_line(&line, &coordinator, &scheduler, settings.as_ref()).await,
                    None => {
                        // Producer closed stdin; keep delivering until interrupted
                        tokio::signal::ctrl_c().await?;
                        info!("Shutting down");
                        break;
                    }
                }
            }
        }
    }

    scheduler.cancel().await;
    Ok(())
}

async fn handle_line(
    line: &str,
    coordinator: &SyncCoordinator,
    scheduler: &SyncScheduler,
    settings: &dyn Settings,
) {
    let fix = match parse_fix_line(line) {
        Ok(Some(fix)) => fix,
        Ok(None) => return,
        Err(e) => {
            warn!("Skipping intake line: {}", e);
            return;
        }
    };

    match tracking_enabled(settings).await {
        Ok(true) => {}
        Ok(false) => return,
        Err(e) => {
            warn!("Failed to read tracking flag: {}", e);
            return;
        }
    }

    if coordinator.accept_fix(fix).await {
        // Eager delivery; the periodic loop covers the offline case
        scheduler.schedule_once().await;
    }
}

fn status(args: &Args) -> anyhow::Result<()> {
    let config = load_config(args)?;
    let store = Store::open(&config.storage.path)?;

    let device_id = store
        .get_setting(waypost_sync::KEY_DEVICE_ID)?
        .unwrap_or_else(|| "(not yet created)".to_string());
    println!("Device id:  {}", device_id);
    println!("Database:   {}", config.storage.path.display());
    println!("Unsent:     {}", store.unsent_count()?);

    match store.last_record()? {
        Some(record) => println!(
            "Newest fix: {:.5}, {:.5} at {} ({})",
            record.latitude,
            record.longitude,
            record.timestamp,
            if record.sent { "sent" } else { "unsent" },
        ),
        None => println!("Newest fix: (none stored)"),
    }

    Ok(())
}

async fn reset_device_id(args: &Args) -> anyhow::Result<()> {
    let config = load_config(args)?;
    let store = Arc::new(Mutex::new(Store::open(&config.storage.path)?));
    let settings: Arc<dyn Settings> = Arc::new(StoreSettings::new(store));

    let identity = DeviceIdentity::new(settings);
    let id = identity.regenerate().await?;
    println!("New device id: {}", id);
    Ok(())
}

fn purge(args: &Args) -> anyhow::Result<()> {
    let config = load_config(args)?;
    let store = Store::open(&config.storage.path)?;
    let deleted = store.delete_all()?;
    println!("Deleted {} stored locations", deleted);
    Ok(())
}
