//! Connection to one accessory, independent of transport

use async_trait::async_trait;

use glint_proto::{Command, Notification, PackedHash};

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("accessory disconnected")]
    Disconnected,
    #[error("characteristic not found: {0}")]
    CharacteristicNotFound(&'static str),
    #[error("expected {expected} bytes, got {actual}")]
    IncorrectLength { expected: usize, actual: usize },
    #[error("transport error: {0}")]
    Io(String),
}

impl From<std::io::Error> for TransportError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}

/// Writes and reads one connected accessory.
///
/// Implementations must deliver writes in the order they are awaited.
#[async_trait]
pub trait Accessory: Send + Sync {
    fn name(&self) -> &str;

    async fn write_command(&self, command: Command) -> Result<(), TransportError>;

    async fn read_configuration_hash(&self) -> Result<PackedHash, TransportError>;

    async fn write_configuration_hash(&self, hash: PackedHash) -> Result<(), TransportError>;
}

/// Everything a transport reports about an accessory
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessoryEvent {
    Notification(Notification),
    /// Services are discovered and the accessory accepts writes
    Ready(ProtocolMode),
    /// The accessory stopped accepting writes
    Unready(String),
    Disconnected,
}

/// Who decides on feedback for this accessory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProtocolMode {
    #[default]
    Unknown,
    /// The phone decides per notification (V1)
    Phone,
    /// The accessory decides from its synchronized settings (V2)
    Automatic,
}

impl ProtocolMode {
    /// V2 firmware exposes its own notification characteristic
    pub fn from_characteristics(has_v2_notifications: bool) -> Self {
        if has_v2_notifications {
            Self::Automatic
        } else {
            Self::Phone
        }
    }
}
