//! Common types for BMC operations

use std::net::Ipv6Addr;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Power state of a machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PowerState {
    /// Machine is powered on
    On,
    /// Machine is powered off
    Off,
    /// Power state is unknown
    Unknown,
}

impl std::fmt::Display for PowerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PowerState::On => write!(f, "on"),
            PowerState::Off => write!(f, "off"),
            PowerState::Unknown => write!(f, "unknown"),
        }
    }
}

/// Requested power operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PowerAction {
    /// Power on
    On,
    /// Graceful (ACPI) shutdown
    Off,
    /// Immediate power off
    #[serde(rename = "hardoff", alias = "hard_off")]
    HardOff,
    /// Power off then on
    Cycle,
    /// Warm reset
    Reset,
    /// Query the current power state
    Status,
}

impl std::fmt::Display for PowerAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PowerAction::On => write!(f, "on"),
            PowerAction::Off => write!(f, "off"),
            PowerAction::HardOff => write!(f, "hardoff"),
            PowerAction::Cycle => write!(f, "cycle"),
            PowerAction::Reset => write!(f, "reset"),
            PowerAction::Status => write!(f, "status"),
        }
    }
}

/// Boot device selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BootDevice {
    /// Boot from network (PXE)
    Pxe,
    /// Boot from local disk
    Disk,
    /// Boot from CD/DVD
    Cdrom,
    /// Boot into BIOS setup
    Bios,
    /// No override (use default)
    None,
}

impl std::fmt::Display for BootDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BootDevice::Pxe => write!(f, "pxe"),
            BootDevice::Disk => write!(f, "disk"),
            BootDevice::Cdrom => write!(f, "cdrom"),
            BootDevice::Bios => write!(f, "bios"),
            BootDevice::None => write!(f, "none"),
        }
    }
}

/// Modifiers applied to a boot device override
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BootOptions {
    /// Keep the override for every subsequent boot instead of the next one only
    pub persistent: bool,
    /// Boot in UEFI mode rather than legacy BIOS mode
    pub efi_boot: bool,
}

/// Privilege level granted to a BMC account
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    Administrator,
    Operator,
    #[default]
    User,
}

impl UserRole {
    /// IPMI channel privilege level
    pub fn ipmi_privilege(&self) -> u8 {
        match self {
            UserRole::Administrator => 4,
            UserRole::Operator => 3,
            UserRole::User => 2,
        }
    }

    /// Redfish `RoleId`
    pub fn redfish_role(&self) -> &'static str {
        match self {
            UserRole::Administrator => "Administrator",
            UserRole::Operator => "Operator",
            UserRole::User => "ReadOnly",
        }
    }
}

/// Account to create or update on a BMC
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSpec {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub role: UserRole,
}

impl std::fmt::Debug for UserSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserSpec")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("role", &self.role)
            .finish()
    }
}

/// IPMI connection configuration
#[derive(Debug, Clone)]
pub struct IpmiConfig {
    /// BMC hostname or address
    pub host: String,
    /// BMC port (default 623)
    pub port: u16,
    /// Username
    pub username: String,
    /// Password
    pub password: String,
    /// ipmitool interface (default lanplus)
    pub interface: String,
    /// Path to the ipmitool binary
    pub binary: PathBuf,
}

impl IpmiConfig {
    /// Create new IPMI config
    pub fn new(
        host: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port: 623,
            username: username.into(),
            password: password.into(),
            interface: "lanplus".to_string(),
            binary: PathBuf::from("ipmitool"),
        }
    }

    /// Set custom port
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the ipmitool interface
    pub fn with_interface(mut self, interface: impl Into<String>) -> Self {
        self.interface = interface.into();
        self
    }

    /// Use a specific ipmitool binary
    pub fn with_binary(mut self, binary: impl Into<PathBuf>) -> Self {
        self.binary = binary.into();
        self
    }
}

/// Redfish REST API configuration
#[derive(Debug, Clone)]
pub struct RedfishConfig {
    /// Base URL (e.g., https://bmc.example.com)
    pub base_url: String,
    /// Username
    pub username: String,
    /// Password
    pub password: String,
    /// Skip TLS verification (for self-signed certs)
    pub insecure: bool,
    /// Per-request HTTP timeout
    pub timeout: Duration,
}

impl RedfishConfig {
    /// Create new Redfish config
    pub fn new(
        base_url: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            username: username.into(),
            password: password.into(),
            insecure: false,
            timeout: Duration::from_secs(30),
        }
    }

    /// Build a config for a bare host, assuming HTTPS on the default port
    pub fn for_host(
        host: &str,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        let base_url = if host.starts_with("http://") || host.starts_with("https://") {
            host.trim_end_matches('/').to_string()
        } else if host.parse::<Ipv6Addr>().is_ok() {
            format!("https://[{}]", host)
        } else {
            format!("https://{}", host)
        };
        Self::new(base_url, username, password)
    }

    /// Allow insecure TLS (self-signed certs)
    pub fn with_insecure(mut self, insecure: bool) -> Self {
        self.insecure = insecure;
        self
    }

    /// Set the per-request HTTP timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}
