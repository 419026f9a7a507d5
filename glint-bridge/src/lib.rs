//! Glint Bridge - turns phone notifications into accessory feedback
//!
//! V1 accessories ask the phone about every notification; the [`Arbitrator`] decides and
//! answers. V2 accessories decide on their own from a copy of the configuration that the
//! [`Synchronizer`] keeps current, verified by a [`PackedHash`].

mod accessory;
mod analytics;
mod arbitrator;
mod configuration;
pub mod hash;
pub mod paths;
mod rejection;
mod session;
mod signatures;
mod sync;

#[cfg(test)]
mod test_support;

pub use accessory::{Accessory, AccessoryEvent, ProtocolMode, TransportError};
pub use analytics::{AnalyticsEvent, AnalyticsSink, NotifiedEvent, TracingAnalytics};
pub use arbitrator::{Arbitrator, Clock, DateWindow, Dispatch, Policy, SystemClock, evaluate};
pub use configuration::{
    ApplicationConfiguration, BridgeConfig, ConfigError, Configuration, ContactConfiguration,
};
pub use hash::ConfigurationSnapshot;
pub use rejection::{Rejection, RejectionReason};
pub use session::{AccessorySession, SyncState};
pub use signatures::{DEFAULT_LIMIT, SignatureCache, SignatureGuard, Signatures};
pub use sync::{SyncOutcome, Synchronizer, commands_to_ensure};

// Re-export commonly used types
pub use glint_proto::{
    Category, Command, LedColor, Notification, NotificationFlags, PackedHash, ProtocolVersion, Vibration,
};
