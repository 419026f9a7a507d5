//! BLE GATT Service Protocol Constants for Glint accessories
//!
//! The accessory exposes one primary service. Which ANCS characteristic it carries tells the
//! phone which notification protocol generation the firmware speaks.

/// BLE Service UUID: 7e6d1000-3a1f-4c2b-9d10-5f2c8a000000
pub const SERVICE_UUID: &str = "7e6d1000-3a1f-4c2b-9d10-5f2c8a000000";

/// Command Characteristic UUID (write)
pub const COMMAND_UUID: &str = "7e6d1001-3a1f-4c2b-9d10-5f2c8a000000";

/// V1 ANCS Notification Characteristic UUID (notify): raw notifications for the phone to decide on
pub const ANCS_V1_UUID: &str = "7e6d1002-3a1f-4c2b-9d10-5f2c8a000000";

/// V2 ANCS Notification Characteristic UUID (notify): notifications the accessory already matched
pub const ANCS_V2_UUID: &str = "7e6d1003-3a1f-4c2b-9d10-5f2c8a000000";

/// Configuration Hash Characteristic UUID (read/write), 8 bytes little-endian
pub const CONFIGURATION_HASH_UUID: &str = "7e6d1004-3a1f-4c2b-9d10-5f2c8a000000";

/// Accessories advertise with this local name prefix
pub const NAME_PREFIX: &str = "Glint";
