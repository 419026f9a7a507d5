//! Simulated Accessory - drives a session against an accessory that prints what it receives
//!
//! Plays a V1 notification sequence, then switches to V2 and edits the configuration a few
//! times to show the debounced resynchronization.
//!
//! Usage:
//!   RUST_LOG=glint_bridge=debug cargo run --example simulated-accessory -p glint-bridge

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use glint_bridge::{
    Accessory, AccessoryEvent, AccessorySession, ApplicationConfiguration, BridgeConfig, Category, Command,
    Configuration, ConfigurationSnapshot, ContactConfiguration, LedColor, Notification, PackedHash,
    ProtocolMode, ProtocolVersion, SignatureCache, SyncState, TracingAnalytics, TransportError, Vibration,
};
use tokio::sync::{mpsc, watch};

struct PrintingAccessory {
    hash: Mutex<PackedHash>,
}

#[async_trait]
impl Accessory for PrintingAccessory {
    fn name(&self) -> &str {
        "simulated"
    }

    async fn write_command(&self, command: Command) -> Result<(), TransportError> {
        println!("  <- {command:?} {:02x?}", command.to_bytes());
        Ok(())
    }

    async fn read_configuration_hash(&self) -> Result<PackedHash, TransportError> {
        let hash = *self.hash.lock().map_err(|e| TransportError::Io(e.to_string()))?;
        println!("  -> hash {hash}");
        Ok(hash)
    }

    async fn write_configuration_hash(&self, hash: PackedHash) -> Result<(), TransportError> {
        println!("  <- hash {hash}");
        *self.hash.lock().map_err(|e| TransportError::Io(e.to_string()))? = hash;
        Ok(())
    }
}

fn configuration() -> Configuration {
    Configuration {
        applications: vec![
            ApplicationConfiguration::new("com.apple.MobileSMS", LedColor::Green, Vibration::TwoPulses),
            ApplicationConfiguration::new("com.apple.mobilephone", LedColor::Blue, Vibration::FourPulses),
        ],
        contacts: vec![ContactConfiguration::new(
            "1",
            vec!["Alexandra Hamilton".to_string(), "Alex".to_string()],
            LedColor::Purple,
        )],
        inner_ring: false,
    }
}

fn expected_hash(configuration: &watch::Sender<Configuration>) -> PackedHash {
    ConfigurationSnapshot::from_configuration(&configuration.borrow()).packed_hash()
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = BridgeConfig {
        debounce_secs: 1,
        ..BridgeConfig::default()
    };
    let accessory = Arc::new(PrintingAccessory {
        hash: Mutex::new(PackedHash::default()),
    });
    let (configuration_tx, configuration_rx) = watch::channel(configuration());
    let (events_tx, events_rx) = mpsc::channel(16);

    let session = AccessorySession::new(
        accessory,
        SignatureCache::in_memory(config.signature_cache_limit),
        configuration_rx,
        Arc::new(TracingAnalytics),
        &config,
    );
    let mut state = session.sync_state();
    let task = tokio::spawn(session.run(events_rx));

    println!("=== V1 ===");
    events_tx.send(AccessoryEvent::Ready(ProtocolMode::Phone)).await?;
    let now = Utc::now();
    let notifications = [
        Notification::new(ProtocolVersion::V1, Category::Social, "com.apple.MobileSMS", "Alex").with_date(now),
        Notification::new(ProtocolVersion::V1, Category::Social, "com.apple.MobileSMS", "Alex").with_date(now),
        Notification::new(ProtocolVersion::V1, Category::IncomingCall, "com.apple.mobilephone", "Unknown"),
        Notification::new(ProtocolVersion::V1, Category::Email, "com.x.mail", "Inbox").with_date(now),
    ];
    for notification in notifications {
        println!("{notification}");
        events_tx.send(AccessoryEvent::Notification(notification)).await?;
    }

    println!();
    println!("=== V2 ===");
    events_tx.send(AccessoryEvent::Ready(ProtocolMode::Automatic)).await?;
    let expected = SyncState::Synced(expected_hash(&configuration_tx));
    println!("state: {:?}", *state.wait_for(|s| *s == expected).await?);

    for color in [LedColor::Red, LedColor::Yellow] {
        configuration_tx.send_modify(|c| c.contacts[0].color = color);
        tokio::time::sleep(Duration::from_millis(200)).await;
    }
    let expected = SyncState::Synced(expected_hash(&configuration_tx));
    println!("state: {:?}", *state.wait_for(|s| *s == expected).await?);

    drop(events_tx);
    task.await?;
    Ok(())
}
