//! Glint BLE Controller
//!
//! BLE transport for Glint accessories.
//!
//! # Example
//!
//! ```ignore
//! use glint_ble_controller::ble;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let adapter = ble::get_adapter().await?;
//!     let peripheral = ble::find_device(&adapter, None).await?;
//!     let accessory = ble::BleAccessory::connect(peripheral).await?;
//!     println!("{:?}", accessory.mode());
//!     Ok(())
//! }
//! ```

pub mod ble;

pub use ble::{BleAccessory, GlintDevice};
