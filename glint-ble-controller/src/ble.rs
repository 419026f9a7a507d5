//! BLE client for Glint accessories
//!
//! Scans for accessories, connects to one and exposes it as a [`glint_bridge::Accessory`].

use std::time::Duration;

use async_trait::async_trait;
use btleplug::api::{Central, CentralEvent, Characteristic, Manager as _, Peripheral as _, ScanFilter, WriteType};
use btleplug::platform::{Adapter, Manager, Peripheral};
use futures::StreamExt;
use tokio::sync::mpsc;
use uuid::Uuid;

use glint_bridge::{Accessory, AccessoryEvent, ProtocolMode, TransportError};
use glint_proto::ble::{ANCS_V1_UUID, ANCS_V2_UUID, COMMAND_UUID, CONFIGURATION_HASH_UUID, NAME_PREFIX};
use glint_proto::{Command, Notification, PackedHash, ProtocolVersion};

/// A discovered BLE device
#[derive(Debug, Clone)]
pub struct GlintDevice {
    pub name: String,
    pub address: String,
    pub rssi: Option<i16>,
    pub is_glint: bool,
}

fn parse_uuid(s: &str) -> Result<Uuid, TransportError> {
    Uuid::parse_str(s).map_err(|e| TransportError::Io(format!("invalid UUID {s}: {e}")))
}

// Match "Glint-xxx" or "nimble [Glint-xxx]" format
fn is_glint_name(name: &str) -> bool {
    name.starts_with(NAME_PREFIX) || name.contains(&format!("[{NAME_PREFIX}"))
}

fn transport_error(e: btleplug::Error) -> TransportError {
    match e {
        btleplug::Error::NotConnected => TransportError::Disconnected,
        e => TransportError::Io(e.to_string()),
    }
}

/// Get the default Bluetooth adapter
pub async fn get_adapter() -> Result<Adapter, Box<dyn std::error::Error>> {
    let manager = Manager::new().await?;
    let adapters = manager.adapters().await?;
    adapters.into_iter().next().ok_or_else(|| "No Bluetooth adapter found".into())
}

/// Scan for BLE devices. Glint accessories have `is_glint = true`.
pub async fn scan(adapter: &Adapter, duration: Duration) -> Result<Vec<GlintDevice>, Box<dyn std::error::Error>> {
    adapter.start_scan(ScanFilter::default()).await?;
    tokio::time::sleep(duration).await;

    let peripherals = adapter.peripherals().await?;
    let mut devices = Vec::new();

    for peripheral in peripherals {
        if let Some(props) = peripheral.properties().await? {
            let name = props.local_name.unwrap_or_else(|| "Unknown".to_string());
            let address = peripheral.address().to_string();
            let is_glint = is_glint_name(&name);

            devices.push(GlintDevice {
                name,
                address,
                rssi: props.rssi,
                is_glint,
            });
        }
    }

    adapter.stop_scan().await?;
    Ok(devices)
}

/// Find an accessory by name/address pattern, or the first Glint accessory
pub async fn find_device(adapter: &Adapter, target: Option<&str>) -> Result<Peripheral, Box<dyn std::error::Error>> {
    adapter.start_scan(ScanFilter::default()).await?;
    tokio::time::sleep(Duration::from_secs(5)).await;

    let peripherals = adapter.peripherals().await?;

    for peripheral in peripherals {
        if let Some(props) = peripheral.properties().await? {
            let name = props.local_name.unwrap_or_default();
            let addr = peripheral.address().to_string();

            let matches = match target {
                Some(t) => name.contains(t) || addr.contains(t),
                None => is_glint_name(&name),
            };

            if matches {
                adapter.stop_scan().await?;
                tracing::info!("found device {name} ({addr})");
                return Ok(peripheral);
            }
        }
    }

    adapter.stop_scan().await?;
    Err("No Glint device found".into())
}

/// Decode a notification from one of the ANCS characteristics.
///
/// The characteristic decides the protocol version, whatever the payload says.
pub fn decode_notification(characteristic: Uuid, value: &[u8]) -> Result<Notification, TransportError> {
    let version = if characteristic == parse_uuid(ANCS_V2_UUID)? {
        ProtocolVersion::V2
    } else {
        ProtocolVersion::V1
    };

    let mut notification: Notification =
        serde_json::from_slice(value).map_err(|e| TransportError::Io(format!("invalid notification: {e}")))?;
    notification.version = version;
    Ok(notification)
}

/// A connected accessory with its services discovered
pub struct BleAccessory {
    name: String,
    peripheral: Peripheral,
    command: Characteristic,
    configuration_hash: Option<Characteristic>,
    notifications: Vec<Characteristic>,
    mode: ProtocolMode,
}

impl BleAccessory {
    pub async fn connect(peripheral: Peripheral) -> Result<Self, TransportError> {
        let name = peripheral
            .properties()
            .await
            .map_err(transport_error)?
            .and_then(|p| p.local_name)
            .unwrap_or_else(|| peripheral.address().to_string());

        tracing::debug!(accessory = %name, "connecting");
        peripheral.connect().await.map_err(transport_error)?;
        peripheral.discover_services().await.map_err(transport_error)?;

        let characteristics = peripheral.characteristics();
        let find = |uuid: &str| -> Result<Option<Characteristic>, TransportError> {
            let uuid = parse_uuid(uuid)?;
            Ok(characteristics.iter().find(|c| c.uuid == uuid).cloned())
        };

        let command = find(COMMAND_UUID)?.ok_or(TransportError::CharacteristicNotFound("command"))?;
        let configuration_hash = find(CONFIGURATION_HASH_UUID)?;
        let v1 = find(ANCS_V1_UUID)?;
        let v2 = find(ANCS_V2_UUID)?;

        let mode = ProtocolMode::from_characteristics(v2.is_some());
        tracing::info!(accessory = %name, ?mode, "services discovered");

        Ok(Self {
            name,
            peripheral,
            command,
            configuration_hash,
            notifications: v1.into_iter().chain(v2).collect(),
            mode,
        })
    }

    pub fn mode(&self) -> ProtocolMode {
        self.mode
    }

    /// Forward accessory events into `events` until the accessory disconnects or the
    /// receiver goes away
    pub async fn listen(&self, adapter: &Adapter, events: mpsc::Sender<AccessoryEvent>) -> Result<(), TransportError> {
        for characteristic in &self.notifications {
            self.peripheral.subscribe(characteristic).await.map_err(transport_error)?;
        }
        let mut notifications = self.peripheral.notifications().await.map_err(transport_error)?;
        let mut central = adapter.events().await.map_err(transport_error)?;
        let id = self.peripheral.id();

        if events.send(AccessoryEvent::Ready(self.mode)).await.is_err() {
            return Ok(());
        }

        loop {
            let event = tokio::select! {
                Some(value) = notifications.next() => match decode_notification(value.uuid, &value.value) {
                    Ok(notification) => AccessoryEvent::Notification(notification),
                    Err(e) => {
                        tracing::warn!(accessory = %self.name, "dropping notification: {e}");
                        continue;
                    }
                },
                Some(event) = central.next() => match event {
                    CentralEvent::DeviceDisconnected(d) if d == id => AccessoryEvent::Disconnected,
                    _ => continue,
                },
                else => AccessoryEvent::Disconnected,
            };

            let disconnected = event == AccessoryEvent::Disconnected;
            if events.send(event).await.is_err() || disconnected {
                return Ok(());
            }
        }
    }

    pub async fn disconnect(&self) -> Result<(), TransportError> {
        self.peripheral.disconnect().await.map_err(transport_error)
    }

    fn configuration_hash(&self) -> Result<&Characteristic, TransportError> {
        self.configuration_hash
            .as_ref()
            .ok_or(TransportError::CharacteristicNotFound("configuration hash"))
    }
}

#[async_trait]
impl Accessory for BleAccessory {
    fn name(&self) -> &str {
        &self.name
    }

    async fn write_command(&self, command: Command) -> Result<(), TransportError> {
        self.peripheral
            .write(&self.command, &command.to_bytes(), WriteType::WithResponse)
            .await
            .map_err(transport_error)
    }

    async fn read_configuration_hash(&self) -> Result<PackedHash, TransportError> {
        let data = self
            .peripheral
            .read(self.configuration_hash()?)
            .await
            .map_err(transport_error)?;
        if data.len() != PackedHash::LEN {
            return Err(TransportError::IncorrectLength {
                expected: PackedHash::LEN,
                actual: data.len(),
            });
        }
        Ok(PackedHash::from_bytes(&data)?)
    }

    async fn write_configuration_hash(&self, hash: PackedHash) -> Result<(), TransportError> {
        self.peripheral
            .write(self.configuration_hash()?, &hash.to_bytes(), WriteType::WithResponse)
            .await
            .map_err(transport_error)
    }
}
