//! Glint wire protocol - notification, feedback command and configuration hash types

use std::fmt;
use std::io;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod ble;

// Command types
pub const CMD_NO_ACTION: u8 = 0x01;
pub const CMD_NOTIFICATION: u8 = 0x02;
pub const CMD_CLEAR_APPLICATIONS: u8 = 0x10;
pub const CMD_ADD_APPLICATION: u8 = 0x11;
pub const CMD_CLEAR_CONTACTS: u8 = 0x20;
pub const CMD_ADD_CONTACT: u8 = 0x21;

/// LED colors the accessory can render
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LedColor {
    #[default]
    None,
    Blue,
    Green,
    Yellow,
    Purple,
    Red,
}

impl LedColor {
    pub fn to_byte(self) -> u8 {
        match self {
            Self::None => 0,
            Self::Blue => 1,
            Self::Green => 2,
            Self::Yellow => 3,
            Self::Purple => 4,
            Self::Red => 5,
        }
    }

    pub fn from_byte(byte: u8) -> io::Result<Self> {
        match byte {
            0 => Ok(Self::None),
            1 => Ok(Self::Blue),
            2 => Ok(Self::Green),
            3 => Ok(Self::Yellow),
            4 => Ok(Self::Purple),
            5 => Ok(Self::Red),
            b => Err(io::Error::new(io::ErrorKind::InvalidData, format!("unknown color {b}"))),
        }
    }
}

impl FromStr for LedColor {
    type Err = io::Error;

    fn from_str(s: &str) -> io::Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(Self::None),
            "blue" => Ok(Self::Blue),
            "green" => Ok(Self::Green),
            "yellow" => Ok(Self::Yellow),
            "purple" => Ok(Self::Purple),
            "red" => Ok(Self::Red),
            _ => Err(io::Error::new(io::ErrorKind::InvalidInput, format!("unknown color {s:?}"))),
        }
    }
}

/// Vibration patterns the accessory can render
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Vibration {
    #[default]
    None,
    OnePulse,
    TwoPulses,
    ThreePulses,
    FourPulses,
}

impl Vibration {
    pub fn to_byte(self) -> u8 {
        match self {
            Self::None => 0,
            Self::OnePulse => 1,
            Self::TwoPulses => 2,
            Self::ThreePulses => 3,
            Self::FourPulses => 4,
        }
    }

    pub fn from_byte(byte: u8) -> io::Result<Self> {
        match byte {
            0 => Ok(Self::None),
            1 => Ok(Self::OnePulse),
            2 => Ok(Self::TwoPulses),
            3 => Ok(Self::ThreePulses),
            4 => Ok(Self::FourPulses),
            b => Err(io::Error::new(io::ErrorKind::InvalidData, format!("unknown vibration {b}"))),
        }
    }
}

impl FromStr for Vibration {
    type Err = io::Error;

    fn from_str(s: &str) -> io::Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(Self::None),
            "one-pulse" => Ok(Self::OnePulse),
            "two-pulses" => Ok(Self::TwoPulses),
            "three-pulses" => Ok(Self::ThreePulses),
            "four-pulses" => Ok(Self::FourPulses),
            _ => Err(io::Error::new(io::ErrorKind::InvalidInput, format!("unknown vibration {s:?}"))),
        }
    }
}

/// Notification protocol generation reported by the accessory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProtocolVersion {
    V1,
    V2,
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::V1 => f.write_str("1"),
            Self::V2 => f.write_str("2"),
        }
    }
}

/// ANCS notification category. Values 12-255 are reserved and may still appear.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Category {
    Other,
    IncomingCall,
    MissedCall,
    Voicemail,
    Social,
    Schedule,
    Email,
    News,
    HealthAndFitness,
    BusinessAndFinance,
    Location,
    Entertainment,
    Reserved(u8),
}

impl Category {
    pub fn from_byte(byte: u8) -> Self {
        match byte {
            0 => Self::Other,
            1 => Self::IncomingCall,
            2 => Self::MissedCall,
            3 => Self::Voicemail,
            4 => Self::Social,
            5 => Self::Schedule,
            6 => Self::Email,
            7 => Self::News,
            8 => Self::HealthAndFitness,
            9 => Self::BusinessAndFinance,
            10 => Self::Location,
            11 => Self::Entertainment,
            b => Self::Reserved(b),
        }
    }

    pub fn to_byte(self) -> u8 {
        match self {
            Self::Other => 0,
            Self::IncomingCall => 1,
            Self::MissedCall => 2,
            Self::Voicemail => 3,
            Self::Social => 4,
            Self::Schedule => 5,
            Self::Email => 6,
            Self::News => 7,
            Self::HealthAndFitness => 8,
            Self::BusinessAndFinance => 9,
            Self::Location => 10,
            Self::Entertainment => 11,
            Self::Reserved(b) => b,
        }
    }
}

/// ANCS event flags bitset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NotificationFlags(pub u8);

impl NotificationFlags {
    pub const SILENT: Self = Self(1 << 0);
    pub const IMPORTANT: Self = Self(1 << 1);
    pub const PRE_EXISTING: Self = Self(1 << 2);
    pub const POSITIVE_ACTION: Self = Self(1 << 3);
    pub const NEGATIVE_ACTION: Self = Self(1 << 4);

    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }
}

impl fmt::Display for NotificationFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#04x}", self.0)
    }
}

/// A notification forwarded by the accessory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub version: ProtocolVersion,
    pub category: Category,
    pub application_identifier: String,
    /// For messages and calls this is the sender's name, possibly truncated by ANCS
    pub title: String,
    pub date: Option<DateTime<Utc>>,
    /// Only reported by V1 firmware new enough to forward them
    pub flags: Option<NotificationFlags>,
}

impl Notification {
    pub fn new(
        version: ProtocolVersion,
        category: Category,
        application_identifier: impl Into<String>,
        title: impl Into<String>,
    ) -> Self {
        Self {
            version,
            category,
            application_identifier: application_identifier.into(),
            title: title.into(),
            date: None,
            flags: None,
        }
    }

    pub fn with_date(mut self, date: DateTime<Utc>) -> Self {
        self.date = Some(date);
        self
    }

    pub fn with_flags(mut self, flags: NotificationFlags) -> Self {
        self.flags = Some(flags);
        self
    }

    pub fn is_incoming_call(&self) -> bool {
        self.category == Category::IncomingCall
    }

    /// Stable identity used to suppress duplicate deliveries of the same notification
    pub fn signature(&self) -> String {
        let date = self
            .date
            .map(|d| d.timestamp().max(0).to_string())
            .unwrap_or_else(|| "none".to_string());

        [
            self.category.to_byte().to_string(),
            self.application_identifier.clone(),
            self.title.clone(),
            date,
        ]
        .join("~*~")
    }
}

impl fmt::Display for Notification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[v{} {:?}] {} \"{}\"",
            self.version, self.category, self.application_identifier, self.title
        )
    }
}

/// Commands written to the accessory's command characteristic
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Acknowledge a notification without producing feedback
    NoAction,
    /// Render feedback for a notification the phone accepted
    Notification {
        color: LedColor,
        vibration: Vibration,
        secondary_color: LedColor,
    },
    ClearApplications,
    AddApplication {
        identifier: String,
        color: LedColor,
        vibration: Vibration,
    },
    ClearContacts,
    AddContact {
        name: String,
        color: LedColor,
    },
}

impl Command {
    pub fn command_type(&self) -> u8 {
        match self {
            Self::NoAction => CMD_NO_ACTION,
            Self::Notification { .. } => CMD_NOTIFICATION,
            Self::ClearApplications => CMD_CLEAR_APPLICATIONS,
            Self::AddApplication { .. } => CMD_ADD_APPLICATION,
            Self::ClearContacts => CMD_CLEAR_CONTACTS,
            Self::AddContact { .. } => CMD_ADD_CONTACT,
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = vec![self.command_type()];
        match self {
            Self::NoAction | Self::ClearApplications | Self::ClearContacts => {}
            Self::Notification { color, vibration, secondary_color } => {
                buf.push(color.to_byte());
                buf.push(vibration.to_byte());
                buf.push(secondary_color.to_byte());
            }
            Self::AddApplication { identifier, color, vibration } => {
                buf.push(color.to_byte());
                buf.push(vibration.to_byte());
                push_string(&mut buf, identifier);
            }
            Self::AddContact { name, color } => {
                buf.push(color.to_byte());
                push_string(&mut buf, name);
            }
        }
        buf
    }

    pub fn from_bytes(data: &[u8]) -> io::Result<Self> {
        let (&command_type, body) = data
            .split_first()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "empty command"))?;

        match command_type {
            CMD_NO_ACTION => Ok(Self::NoAction),
            CMD_CLEAR_APPLICATIONS => Ok(Self::ClearApplications),
            CMD_CLEAR_CONTACTS => Ok(Self::ClearContacts),
            CMD_NOTIFICATION => {
                if body.len() < 3 {
                    return Err(io::Error::new(io::ErrorKind::InvalidData, "NOTIFICATION too short"));
                }
                Ok(Self::Notification {
                    color: LedColor::from_byte(body[0])?,
                    vibration: Vibration::from_byte(body[1])?,
                    secondary_color: LedColor::from_byte(body[2])?,
                })
            }
            CMD_ADD_APPLICATION => {
                if body.len() < 2 {
                    return Err(io::Error::new(io::ErrorKind::InvalidData, "ADD_APPLICATION too short"));
                }
                Ok(Self::AddApplication {
                    color: LedColor::from_byte(body[0])?,
                    vibration: Vibration::from_byte(body[1])?,
                    identifier: read_string(&body[2..])?,
                })
            }
            CMD_ADD_CONTACT => {
                if body.is_empty() {
                    return Err(io::Error::new(io::ErrorKind::InvalidData, "ADD_CONTACT too short"));
                }
                Ok(Self::AddContact {
                    color: LedColor::from_byte(body[0])?,
                    name: read_string(&body[1..])?,
                })
            }
            t => Err(io::Error::new(io::ErrorKind::InvalidData, format!("unknown command type {t:#04x}"))),
        }
    }
}

fn push_string(buf: &mut Vec<u8>, s: &str) {
    let bytes = s.as_bytes();
    let len = bytes.len().min(u16::MAX as usize);
    buf.extend_from_slice(&(len as u16).to_be_bytes());
    buf.extend_from_slice(&bytes[..len]);
}

fn read_string(data: &[u8]) -> io::Result<String> {
    if data.len() < 2 {
        return Err(io::Error::new(io::ErrorKind::InvalidData, "string length missing"));
    }
    let len = u16::from_be_bytes([data[0], data[1]]) as usize;
    if data.len() < 2 + len {
        return Err(io::Error::new(io::ErrorKind::InvalidData, "string truncated"));
    }
    String::from_utf8(data[2..2 + len].to_vec())
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

/// Two-word configuration hash stored on the accessory
///
/// `applications` summarizes the application partition and `contacts` the contact partition.
/// The accessory stores both as one little-endian `u64`, applications in the low word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PackedHash {
    pub applications: u32,
    pub contacts: u32,
}

impl PackedHash {
    pub const LEN: usize = 8;

    pub fn new(applications: u32, contacts: u32) -> Self {
        Self { applications, contacts }
    }

    pub fn from_packed(packed: u64) -> Self {
        Self {
            applications: packed as u32,
            contacts: (packed >> 32) as u32,
        }
    }

    pub fn packed(&self) -> u64 {
        u64::from(self.applications) | (u64::from(self.contacts) << 32)
    }

    pub fn to_bytes(&self) -> [u8; Self::LEN] {
        self.packed().to_le_bytes()
    }

    pub fn from_bytes(data: &[u8]) -> io::Result<Self> {
        let bytes: [u8; Self::LEN] = data.try_into().map_err(|_| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("configuration hash must be {} bytes, got {}", Self::LEN, data.len()),
            )
        })?;
        Ok(Self::from_packed(u64::from_le_bytes(bytes)))
    }
}

impl fmt::Display for PackedHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "applications={:08x} contacts={:08x}", self.applications, self.contacts)
    }
}
