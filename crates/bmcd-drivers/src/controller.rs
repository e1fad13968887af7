//! BMC controller trait

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{BootDevice, BootOptions, PowerState, UserSpec};

/// Trait for a session with a single BMC
///
/// Implementations handle the protocol-specific details (IPMI, Redfish).
/// A controller is built for one call and dropped afterwards; it must not
/// carry state from one operation into the next.
#[async_trait]
pub trait BmcController: Send + Sync {
    /// Power on the machine
    async fn power_on(&self) -> Result<()>;

    /// Power off the machine (hard shutdown)
    async fn power_off(&self) -> Result<()>;

    /// Soft shutdown (ACPI shutdown signal)
    async fn soft_shutdown(&self) -> Result<()>;

    /// Power cycle the machine (off then on)
    async fn power_cycle(&self) -> Result<()>;

    /// Warm reset
    async fn power_reset(&self) -> Result<()>;

    /// Get current power state
    async fn get_power_state(&self) -> Result<PowerState>;

    /// Override the boot device, once or persistently depending on `options`
    async fn set_boot_device(&self, device: BootDevice, options: BootOptions) -> Result<()>;

    /// Create a BMC account
    async fn create_user(&self, user: &UserSpec) -> Result<()>;

    /// Change the password and role of an existing account
    async fn update_user(&self, user: &UserSpec) -> Result<()>;

    /// Remove an account
    async fn delete_user(&self, username: &str) -> Result<()>;
}
