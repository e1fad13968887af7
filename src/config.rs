//! Service configuration
//!
//! Every option can be given on the command line or through a `BMCD_*`
//! environment variable.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use bmcd_engine::{
    AuthResolver, CredentialEntry, DriverSettings, MemoryCredentialStore, Protocol,
    RegistryConfig,
};
use clap::Args;
use color_eyre::eyre::{Result, WrapErr};
use tracing::info;

#[derive(Args, Debug, Clone)]
pub struct ServeArgs {
    /// Address to listen on
    #[arg(long, env = "BMCD_LISTEN", default_value = "0.0.0.0:50051")]
    pub listen: SocketAddr,

    /// Drivers to try, highest priority first (ipmitool, redfish)
    #[arg(
        long = "drivers",
        env = "BMCD_DRIVERS",
        value_delimiter = ',',
        default_values_t = [Protocol::Ipmitool, Protocol::Redfish]
    )]
    pub drivers: Vec<Protocol>,

    /// Per-request deadline in seconds (0 disables it)
    #[arg(long, env = "BMCD_REQUEST_TIMEOUT", default_value_t = 120)]
    pub request_timeout: u64,

    /// Undelivered status messages buffered per streaming request
    #[arg(long, env = "BMCD_STATUS_BUFFER", default_value_t = 32)]
    pub status_buffer: usize,

    /// How long a status message may wait for a slow client, in milliseconds
    #[arg(long, env = "BMCD_STATUS_SEND_TIMEOUT_MS", default_value_t = 1000)]
    pub status_send_timeout_ms: u64,

    /// IPMI UDP port
    #[arg(long, env = "BMCD_IPMI_PORT", default_value_t = 623)]
    pub ipmi_port: u16,

    /// ipmitool interface
    #[arg(long, env = "BMCD_IPMI_INTERFACE", default_value = "lanplus")]
    pub ipmi_interface: String,

    /// Path to the ipmitool binary
    #[arg(long, env = "BMCD_IPMITOOL", default_value = "ipmitool")]
    pub ipmitool: PathBuf,

    /// Accept invalid TLS certificates from Redfish endpoints
    #[arg(long, env = "BMCD_REDFISH_INSECURE")]
    pub redfish_insecure: bool,

    /// Redfish HTTP timeout in seconds
    #[arg(long, env = "BMCD_REDFISH_TIMEOUT", default_value_t = 30)]
    pub redfish_timeout: u64,

    /// YAML file of stored BMC credentials
    #[arg(long, env = "BMCD_CREDENTIALS")]
    pub credentials: Option<PathBuf>,
}

impl ServeArgs {
    pub fn registry_config(&self) -> RegistryConfig {
        RegistryConfig {
            priority: self.drivers.clone(),
            settings: DriverSettings {
                ipmi_port: self.ipmi_port,
                ipmi_interface: self.ipmi_interface.clone(),
                ipmitool_path: self.ipmitool.clone(),
                redfish_insecure: self.redfish_insecure,
                redfish_timeout: Duration::from_secs(self.redfish_timeout),
            },
        }
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        (self.request_timeout > 0).then(|| Duration::from_secs(self.request_timeout))
    }

    pub fn status_send_timeout(&self) -> Duration {
        Duration::from_millis(self.status_send_timeout_ms)
    }

    /// Build the credential resolver, loading the credentials file if one is set
    pub fn auth_resolver(&self) -> Result<AuthResolver> {
        let resolver = AuthResolver::new();
        let Some(path) = &self.credentials else {
            return Ok(resolver);
        };

        let store = load_credentials(path)?;
        info!(path = %path.display(), hosts = store.len(), "Loaded stored credentials");
        Ok(resolver.with_store(Arc::new(store)))
    }
}

/// Parse a credentials file: a YAML list of `{host, username, password}`
pub fn load_credentials(path: &Path) -> Result<MemoryCredentialStore> {
    let contents = std::fs::read_to_string(path)
        .wrap_err_with(|| format!("Failed to read credentials file {}", path.display()))?;
    let entries: Vec<CredentialEntry> = serde_yaml::from_str(&contents)
        .wrap_err_with(|| format!("Failed to parse credentials file {}", path.display()))?;
    Ok(MemoryCredentialStore::from_entries(entries))
}
