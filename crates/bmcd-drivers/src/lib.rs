//! BMC protocol controllers
//!
//! This crate provides the per-protocol clients used to drive a
//! Baseboard Management Controller for power, boot device and user
//! management.
//!
//! # Supported Protocols
//!
//! - **IPMI**: Traditional BMC protocol, driven through `ipmitool`
//! - **Redfish**: Modern REST-based protocol for newer hardware
//!
//! # Example
//!
//! ```no_run
//! use bmcd_drivers::{BmcController, BootDevice, BootOptions, IpmiConfig, IpmiController};
//!
//! # async fn example() -> bmcd_drivers::Result<()> {
//! let controller = IpmiController::new(IpmiConfig::new("10.0.0.5", "admin", "password"));
//!
//! // Set PXE boot for next reboot
//! controller
//!     .set_boot_device(BootDevice::Pxe, BootOptions::default())
//!     .await?;
//!
//! // Power cycle to apply
//! controller.power_cycle().await?;
//! # Ok(())
//! # }
//! ```

pub mod controller;
pub mod error;
pub mod ipmi;
pub mod redfish;
pub mod types;

pub use controller::BmcController;
pub use error::{BmcError, Result};
pub use ipmi::IpmiController;
pub use redfish::RedfishController;
pub use types::{
    BootDevice, BootOptions, IpmiConfig, PowerAction, PowerState, RedfishConfig, UserRole,
    UserSpec,
};
