//! IPMI protocol implementation
//!
//! IPMI (Intelligent Platform Management Interface) is the most common
//! BMC protocol for server hardware. Commands are issued through the
//! `ipmitool` binary over the LAN interface. Every operation spawns its
//! own child process which is killed if the calling future is dropped.
//!
//! The session password is passed through `IPMI_PASSWORD`. ipmitool has no
//! non-interactive way to read a new account's password, so `user set
//! password` still carries it on the command line.
//!
//! IPMI has no real account deletion: slots are fixed and most BMCs refuse
//! an empty name. A deleted account is a disabled slot with `NO ACCESS`
//! privilege, and such slots are free for reuse.

use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::controller::BmcController;
use crate::error::{BmcError, Result};
use crate::types::{BootDevice, BootOptions, IpmiConfig, PowerState, UserSpec};

/// Channel used for LAN user access
const LAN_CHANNEL: &str = "1";

/// Slot 1 is the anonymous user on most BMCs and must not be reused
const FIRST_ASSIGNABLE_SLOT: u8 = 2;

/// Privilege level that revokes all access
const NO_ACCESS_PRIVILEGE: u8 = 15;

/// IPMI controller using external ipmitool
#[derive(Debug)]
pub struct IpmiController {
    config: IpmiConfig,
}

impl IpmiController {
    /// Create a new IPMI controller
    pub fn new(config: IpmiConfig) -> Self {
        Self { config }
    }

    /// Get the BMC host
    pub fn host(&self) -> &str {
        &self.config.host
    }

    /// Build ipmitool connection args
    ///
    /// The password travels through `IPMI_PASSWORD` (`-E`) so it never
    /// shows up in the process list.
    fn base_args(&self) -> Vec<String> {
        vec![
            "-I".to_string(),
            self.config.interface.clone(),
            "-H".to_string(),
            self.config.host.clone(),
            "-p".to_string(),
            self.config.port.to_string(),
            "-U".to_string(),
            self.config.username.clone(),
            "-E".to_string(),
        ]
    }

    /// Execute an ipmitool command and return its stdout
    async fn execute_ipmi(&self, command: &[&str]) -> Result<String> {
        debug!(
            host = %self.config.host,
            command = %command.join(" "),
            "running ipmitool"
        );

        let output = Command::new(&self.config.binary)
            .args(self.base_args())
            .args(command)
            .env("IPMI_PASSWORD", &self.config.password)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    BmcError::InvalidConfig(format!(
                        "ipmitool not found at {}",
                        self.config.binary.display()
                    ))
                } else {
                    BmcError::CommandFailed(format!("failed to spawn ipmitool: {}", e))
                }
            })?;

        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).into_owned())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(classify_failure(stderr.trim()))
        }
    }

    async fn list_users(&self) -> Result<Vec<UserSlot>> {
        let listing = self.execute_ipmi(&["user", "list", LAN_CHANNEL]).await?;
        Ok(parse_user_list(&listing))
    }

    /// Slot of the active account named `username`
    async fn find_user_slot(&self, username: &str) -> Result<Option<u8>> {
        Ok(self
            .list_users()
            .await?
            .into_iter()
            .find(|slot| slot.is_active() && slot.name.as_deref() == Some(username))
            .map(|slot| slot.id))
    }

    async fn configure_user(&self, slot: &str, user: &UserSpec) -> Result<()> {
        self.execute_ipmi(&["user", "set", "name", slot, &user.username])
            .await?;
        self.execute_ipmi(&["user", "set", "password", slot, &user.password])
            .await?;
        self.grant_access(slot, user.role.ipmi_privilege()).await?;
        self.execute_ipmi(&["user", "enable", slot]).await?;
        Ok(())
    }

    /// Disable a slot and revoke its access, which marks it free
    async fn release_slot(&self, slot: &str) -> Result<()> {
        self.execute_ipmi(&["user", "disable", slot]).await?;
        self.grant_access(slot, NO_ACCESS_PRIVILEGE).await?;
        Ok(())
    }

    async fn grant_access(&self, slot: &str, privilege: u8) -> Result<()> {
        let privilege = format!("privilege={}", privilege);
        self.execute_ipmi(&[
            "channel",
            "setaccess",
            LAN_CHANNEL,
            slot,
            "link=on",
            "ipmi=on",
            "callin=on",
            &privilege,
        ])
        .await?;
        Ok(())
    }
}

/// Map ipmitool's stderr onto an error category
fn classify_failure(stderr: &str) -> BmcError {
    let lower = stderr.to_lowercase();
    if lower.contains("unauthorized") || lower.contains("rakp") || lower.contains("invalid user")
    {
        BmcError::AuthenticationFailed(stderr.to_string())
    } else if lower.contains("timeout") || lower.contains("timed out") {
        BmcError::Timeout(stderr.to_string())
    } else if lower.contains("unable to establish")
        || lower.contains("connection refused")
        || lower.contains("no route to host")
        || lower.contains("address lookup")
    {
        BmcError::ConnectionFailed(stderr.to_string())
    } else {
        BmcError::CommandFailed(stderr.to_string())
    }
}

/// One row of `ipmitool user list`
#[derive(Debug, Clone, PartialEq, Eq)]
struct UserSlot {
    id: u8,
    name: Option<String>,
    no_access: bool,
}

impl UserSlot {
    fn is_active(&self) -> bool {
        self.name.is_some() && !self.no_access
    }

    fn is_free(&self) -> bool {
        self.id >= FIRST_ASSIGNABLE_SLOT && !self.is_active()
    }
}

/// Parse `ipmitool user list` output
///
/// Empty slots have no name. Header and malformed lines are skipped.
fn parse_user_list(output: &str) -> Vec<UserSlot> {
    output
        .lines()
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            let id = fields.next()?.parse::<u8>().ok()?;
            let name = match fields.next() {
                None | Some("true") | Some("false") | Some("(Empty") => None,
                Some(name) => Some(name.to_string()),
            };
            Some(UserSlot {
                id,
                name,
                no_access: line.trim_end().ends_with("NO ACCESS"),
            })
        })
        .collect()
}

fn power_state_from_output(output: &str) -> PowerState {
    let lower = output.to_lowercase();
    if lower.contains("is on") {
        PowerState::On
    } else if lower.contains("is off") {
        PowerState::Off
    } else {
        PowerState::Unknown
    }
}

#[async_trait]
impl BmcController for IpmiController {
    async fn power_on(&self) -> Result<()> {
        self.execute_ipmi(&["chassis", "power", "on"]).await?;
        Ok(())
    }

    async fn power_off(&self) -> Result<()> {
        self.execute_ipmi(&["chassis", "power", "off"]).await?;
        Ok(())
    }

    async fn soft_shutdown(&self) -> Result<()> {
        self.execute_ipmi(&["chassis", "power", "soft"]).await?;
        Ok(())
    }

    async fn power_cycle(&self) -> Result<()> {
        self.execute_ipmi(&["chassis", "power", "cycle"]).await?;
        Ok(())
    }

    async fn power_reset(&self) -> Result<()> {
        self.execute_ipmi(&["chassis", "power", "reset"]).await?;
        Ok(())
    }

    async fn get_power_state(&self) -> Result<PowerState> {
        let output = self.execute_ipmi(&["chassis", "power", "status"]).await?;
        Ok(power_state_from_output(&output))
    }

    async fn set_boot_device(&self, device: BootDevice, options: BootOptions) -> Result<()> {
        let device_arg = device.to_string();
        let mut flags = Vec::new();
        if options.persistent {
            flags.push("persistent");
        }
        if options.efi_boot {
            flags.push("efiboot");
        }

        let options_arg = format!("options={}", flags.join(","));
        let mut command = vec!["chassis", "bootdev", device_arg.as_str()];
        if !flags.is_empty() {
            command.push(&options_arg);
        }

        self.execute_ipmi(&command).await?;
        Ok(())
    }

    async fn create_user(&self, user: &UserSpec) -> Result<()> {
        let slots = self.list_users().await?;
        let same_name = |slot: &UserSlot| slot.name.as_deref() == Some(user.username.as_str());

        if slots.iter().any(|slot| slot.is_active() && same_name(slot)) {
            return Err(BmcError::CommandFailed(format!(
                "user {} already exists",
                user.username
            )));
        }

        // Prefer the slot a previous account of the same name was released from
        let slot = slots
            .iter()
            .filter(|slot| slot.is_free())
            .min_by_key(|slot| !same_name(*slot))
            .map(|slot| slot.id.to_string())
            .ok_or_else(|| BmcError::CommandFailed("no free user slot".to_string()))?;

        if let Err(err) = self.configure_user(&slot, user).await {
            warn!(
                host = %self.config.host,
                slot = %slot,
                error = %err,
                "user setup failed, releasing slot"
            );
            if let Err(rollback) = self.release_slot(&slot).await {
                return Err(BmcError::CommandFailed(format!(
                    "{}; slot {} left partially configured: {}",
                    err, slot, rollback
                )));
            }
            return Err(err);
        }
        Ok(())
    }

    async fn update_user(&self, user: &UserSpec) -> Result<()> {
        let slot = self
            .find_user_slot(&user.username)
            .await?
            .ok_or_else(|| BmcError::UserNotFound(user.username.clone()))?
            .to_string();

        self.execute_ipmi(&["user", "set", "password", &slot, &user.password])
            .await?;
        self.grant_access(&slot, user.role.ipmi_privilege()).await?;
        Ok(())
    }

    async fn delete_user(&self, username: &str) -> Result<()> {
        let slot = self
            .find_user_slot(username)
            .await?
            .ok_or_else(|| BmcError::UserNotFound(username.to_string()))?
            .to_string();

        self.release_slot(&slot).await
    }
}
