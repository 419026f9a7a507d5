//! Command line tool for Glint accessories
//!
//! Scans for accessories, runs the notification bridge against one, edits the notification
//! configuration and inspects the local configuration hash and signature cache.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use glint_ble_controller::ble::{self, BleAccessory};
use glint_bridge::paths::{config_path, glint_home, notifications_path, signatures_path};
use glint_bridge::{
    Accessory, AccessorySession, ApplicationConfiguration, BridgeConfig, Configuration, ConfigurationSnapshot,
    ContactConfiguration, LedColor, SignatureCache, SyncOutcome, Synchronizer, TracingAnalytics, Vibration,
};
use tokio::sync::{mpsc, watch};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "glint-ble")]
#[command(about = "Notification bridge for Glint accessories")]
struct Cli {
    /// Home directory (defaults to $GLINT_HOME or ~/.glint)
    #[arg(long, global = true)]
    home: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan for Glint accessories
    Scan {
        /// Scan duration in seconds
        #[arg(short, long, default_value = "5")]
        duration: u64,
    },
    /// Print the configuration hash an accessory should hold
    Hash,
    /// Bring an accessory's stored configuration up to date once
    Sync {
        /// Device name or address to connect to
        #[arg(short, long)]
        device: Option<String>,
    },
    /// Connect to an accessory and bridge notifications until it disconnects
    Run {
        /// Device name or address to connect to
        #[arg(short, long)]
        device: Option<String>,
    },
    /// List cached notification signatures, newest first
    Signatures,
    /// Edit application configurations
    App {
        #[command(subcommand)]
        action: AppAction,
    },
    /// Edit contact configurations
    Contact {
        #[command(subcommand)]
        action: ContactAction,
    },
}

#[derive(Subcommand)]
enum AppAction {
    /// Add or replace an application configuration
    Set {
        /// Bundle identifier, e.g. com.apple.MobileSMS
        identifier: String,
        /// none, blue, green, yellow, purple or red
        #[arg(short, long)]
        color: LedColor,
        /// none, one-pulse, two-pulses, three-pulses or four-pulses
        #[arg(short, long, default_value = "one-pulse")]
        vibration: Vibration,
        /// Keep the configuration but ignore its notifications
        #[arg(long)]
        deactivated: bool,
    },
    /// Remove an application configuration
    Remove { identifier: String },
}

#[derive(Subcommand)]
enum ContactAction {
    /// Add or replace a contact configuration
    Set {
        identifier: String,
        /// Name as it appears in notification titles (repeatable)
        #[arg(short, long = "name", required = true)]
        names: Vec<String>,
        #[arg(short, long)]
        color: LedColor,
    },
    /// Remove a contact configuration
    Remove { identifier: String },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let home = match cli.home {
        Some(home) => {
            std::fs::create_dir_all(&home)?;
            home
        }
        None => glint_home()?,
    };
    let config = BridgeConfig::load_or_create(&config_path(&home))?;

    match cli.command {
        Commands::Scan { duration } => scan(duration).await?,
        Commands::Hash => {
            let configuration = Configuration::load(&notifications_path(&home))?;
            let snapshot = ConfigurationSnapshot::from_configuration(&configuration);
            let hash = snapshot.packed_hash();
            println!(
                "{} application(s), {} contact(s)",
                snapshot.applications.len(),
                snapshot.contacts.len()
            );
            println!("  {hash}");
            println!("  packed: {:016x}", hash.packed());
        }
        Commands::Sync { device } => {
            let configuration = Configuration::load(&notifications_path(&home))?;
            let adapter = ble::get_adapter().await?;
            let peripheral = ble::find_device(&adapter, device.as_deref()).await?;
            let accessory = Arc::new(BleAccessory::connect(peripheral).await?);

            let snapshot = ConfigurationSnapshot::from_configuration(&configuration);
            let result = Synchronizer::new(accessory.clone()).ensure_matches(&snapshot).await;
            if let Err(e) = accessory.disconnect().await {
                tracing::warn!(accessory = accessory.name(), "failed to disconnect: {e}");
            }

            match result? {
                SyncOutcome::AlreadyMatched(hash) => println!("Already up to date ({hash})"),
                SyncOutcome::Updated { commands, hash } => {
                    println!("Wrote {commands} command(s), new hash {hash}")
                }
            }
        }
        Commands::Run { device } => run(&home, &config, device.as_deref()).await?,
        Commands::App { action } => {
            let path = notifications_path(&home);
            let mut configuration = Configuration::load(&path)?;
            match action {
                AppAction::Set {
                    identifier,
                    color,
                    vibration,
                    deactivated,
                } => configuration.upsert_application(ApplicationConfiguration {
                    activated: !deactivated,
                    ..ApplicationConfiguration::new(identifier, color, vibration)
                }),
                AppAction::Remove { identifier } => {
                    if !configuration.remove_application(&identifier) {
                        return Err(format!("no application configuration for {identifier}").into());
                    }
                }
            }
            save_configuration(&path, &configuration)?;
        }
        Commands::Contact { action } => {
            let path = notifications_path(&home);
            let mut configuration = Configuration::load(&path)?;
            match action {
                ContactAction::Set {
                    identifier,
                    names,
                    color,
                } => configuration.upsert_contact(ContactConfiguration::new(identifier, names, color)),
                ContactAction::Remove { identifier } => {
                    if !configuration.remove_contact(&identifier) {
                        return Err(format!("no contact configuration for {identifier}").into());
                    }
                }
            }
            save_configuration(&path, &configuration)?;
        }
        Commands::Signatures => {
            let cache = SignatureCache::open(signatures_path(&home), config.signature_cache_limit);
            let signatures = cache.snapshot();
            println!("{} signature(s):", signatures.len());
            for signature in signatures {
                println!("  {signature}");
            }
        }
    }

    Ok(())
}

/// Persist an edited configuration. A running bridge picks it up on its next reload.
fn save_configuration(path: &Path, configuration: &Configuration) -> Result<(), Box<dyn std::error::Error>> {
    configuration.save(path)?;
    let hash = ConfigurationSnapshot::from_configuration(configuration).packed_hash();
    println!(
        "Saved {} application(s), {} contact(s), hash {hash}",
        configuration.applications.len(),
        configuration.contacts.len()
    );
    Ok(())
}

async fn scan(duration: u64) -> Result<(), Box<dyn std::error::Error>> {
    println!("Scanning for Glint accessories ({duration} seconds)...");

    let adapter = ble::get_adapter().await?;
    let devices = ble::scan(&adapter, Duration::from_secs(duration)).await?;

    println!("\nFound {} devices:", devices.len());
    for device in devices {
        let rssi = device.rssi.map(|r| format!("{r} dBm")).unwrap_or_else(|| "N/A".to_string());
        let marker = if device.is_glint { " [GLINT]" } else { "" };
        println!("  {} ({}) RSSI: {}{}", device.name, device.address, rssi, marker);
    }

    Ok(())
}

async fn run(home: &Path, config: &BridgeConfig, device: Option<&str>) -> Result<(), Box<dyn std::error::Error>> {
    let path = notifications_path(home);
    let (configuration_tx, configuration_rx) = watch::channel(Configuration::load(&path)?);
    let cache = SignatureCache::open(signatures_path(home), config.signature_cache_limit);

    let adapter = ble::get_adapter().await?;
    let peripheral = ble::find_device(&adapter, device).await?;
    let accessory = Arc::new(BleAccessory::connect(peripheral).await?);
    println!("Connected to {} ({:?})", accessory.name(), accessory.mode());

    let session = AccessorySession::new(
        accessory.clone(),
        cache,
        configuration_rx,
        Arc::new(TracingAnalytics),
        config,
    );
    let (events_tx, events_rx) = mpsc::channel(32);
    let session = tokio::spawn(session.run(events_rx));

    // pick up edits to the configuration file
    let reload = tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(2));
        loop {
            interval.tick().await;
            match Configuration::load(&path) {
                Ok(configuration) => {
                    configuration_tx.send_if_modified(|current| {
                        let modified = *current != configuration;
                        if modified {
                            *current = configuration;
                        }
                        modified
                    });
                }
                Err(e) => tracing::warn!("keeping previous configuration: {e}"),
            }
        }
    });

    let result = accessory.listen(&adapter, events_tx).await;
    reload.abort();
    session.await?;
    result?;

    println!("Accessory disconnected");
    Ok(())
}
