//! Redfish protocol implementation
//!
//! Redfish is a modern REST-based BMC management protocol. It's becoming
//! the standard for newer server hardware, replacing IPMI for many use cases.
//! Each controller owns its own HTTP client, so connections never outlive
//! the controller.

use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use serde_json::{json, Value};
use tracing::debug;

use crate::controller::BmcController;
use crate::error::{BmcError, Result};
use crate::types::{BootDevice, BootOptions, PowerState, RedfishConfig, UserSpec};

const SYSTEMS_PATH: &str = "/redfish/v1/Systems";
const ACCOUNTS_PATH: &str = "/redfish/v1/AccountService/Accounts";

/// Redfish REST API controller
#[derive(Debug)]
pub struct RedfishController {
    config: RedfishConfig,
    client: reqwest::Client,
}

impl RedfishController {
    /// Create a new Redfish controller
    pub fn new(config: RedfishConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .danger_accept_invalid_certs(config.insecure)
            .timeout(config.timeout)
            .build()
            .map_err(|e| BmcError::InvalidConfig(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self { config, client })
    }

    /// Get the base URL
    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url, path)
    }

    async fn request(&self, method: Method, path: &str, body: Option<Value>) -> Result<Value> {
        debug!(method = %method, url = %self.url(path), "redfish request");

        let mut request = self
            .client
            .request(method, self.url(path))
            .basic_auth(&self.config.username, Some(&self.config.password))
            .header("Accept", "application/json");
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            return Err(status_error(status, path, &text));
        }
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text)
            .map_err(|e| BmcError::UnexpectedResponse(format!("{}: {}", path, e)))
    }

    async fn get(&self, path: &str) -> Result<Value> {
        self.request(Method::GET, path, None).await
    }

    /// Resolve the path of the first computer system the BMC manages
    async fn system_path(&self) -> Result<String> {
        let systems = self.get(SYSTEMS_PATH).await?;
        first_member(&systems).ok_or_else(|| {
            BmcError::UnexpectedResponse("no computer systems reported".to_string())
        })
    }

    async fn reset(&self, reset_type: &str) -> Result<()> {
        let system = self.system_path().await?;
        let path = format!("{}/Actions/ComputerSystem.Reset", system);
        self.request(Method::POST, &path, Some(json!({ "ResetType": reset_type })))
            .await?;
        Ok(())
    }

    async fn find_account(&self, username: &str) -> Result<Option<String>> {
        let accounts = self.get(ACCOUNTS_PATH).await?;
        for member in members(&accounts) {
            let account = self.get(&member).await?;
            if account.get("UserName").and_then(Value::as_str) == Some(username) {
                return Ok(Some(member));
            }
        }
        Ok(None)
    }
}

fn status_error(status: StatusCode, path: &str, body: &str) -> BmcError {
    let detail = format!("{} returned {}: {}", path, status, body.trim());
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => BmcError::AuthenticationFailed(detail),
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => BmcError::Timeout(detail),
        StatusCode::SERVICE_UNAVAILABLE | StatusCode::BAD_GATEWAY => {
            BmcError::ConnectionFailed(detail)
        }
        _ => BmcError::CommandFailed(detail),
    }
}

fn members(collection: &Value) -> Vec<String> {
    collection
        .get("Members")
        .and_then(Value::as_array)
        .map(|members| {
            members
                .iter()
                .filter_map(|m| m.get("@odata.id").and_then(Value::as_str))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn first_member(collection: &Value) -> Option<String> {
    members(collection).into_iter().next()
}

fn power_state_from_system(system: &Value) -> PowerState {
    match system.get("PowerState").and_then(Value::as_str) {
        Some("On") | Some("PoweringOn") => PowerState::On,
        Some("Off") | Some("PoweringOff") => PowerState::Off,
        _ => PowerState::Unknown,
    }
}

fn boot_override_body(device: BootDevice, options: BootOptions) -> Value {
    let target = match device {
        BootDevice::Pxe => "Pxe",
        BootDevice::Disk => "Hdd",
        BootDevice::Cdrom => "Cd",
        BootDevice::Bios => "BiosSetup",
        BootDevice::None => "None",
    };
    let enabled = if options.persistent { "Continuous" } else { "Once" };
    let mode = if options.efi_boot { "UEFI" } else { "Legacy" };

    json!({
        "Boot": {
            "BootSourceOverrideEnabled": enabled,
            "BootSourceOverrideTarget": target,
            "BootSourceOverrideMode": mode,
        }
    })
}

#[async_trait]
impl BmcController for RedfishController {
    async fn power_on(&self) -> Result<()> {
        self.reset("On").await
    }

    async fn power_off(&self) -> Result<()> {
        self.reset("ForceOff").await
    }

    async fn soft_shutdown(&self) -> Result<()> {
        self.reset("GracefulShutdown").await
    }

    async fn power_cycle(&self) -> Result<()> {
        self.reset("PowerCycle").await
    }

    async fn power_reset(&self) -> Result<()> {
        self.reset("ForceRestart").await
    }

    async fn get_power_state(&self) -> Result<PowerState> {
        let system_path = self.system_path().await?;
        let system = self.get(&system_path).await?;
        Ok(power_state_from_system(&system))
    }

    async fn set_boot_device(&self, device: BootDevice, options: BootOptions) -> Result<()> {
        let system = self.system_path().await?;
        self.request(
            Method::PATCH,
            &system,
            Some(boot_override_body(device, options)),
        )
        .await?;
        Ok(())
    }

    async fn create_user(&self, user: &UserSpec) -> Result<()> {
        if self.find_account(&user.username).await?.is_some() {
            return Err(BmcError::CommandFailed(format!(
                "user {} already exists",
                user.username
            )));
        }

        let body = json!({
            "UserName": user.username,
            "Password": user.password,
            "RoleId": user.role.redfish_role(),
            "Enabled": true,
        });
        self.request(Method::POST, ACCOUNTS_PATH, Some(body)).await?;
        Ok(())
    }

    async fn update_user(&self, user: &UserSpec) -> Result<()> {
        let account = self
            .find_account(&user.username)
            .await?
            .ok_or_else(|| BmcError::UserNotFound(user.username.clone()))?;

        let body = json!({
            "Password": user.password,
            "RoleId": user.role.redfish_role(),
        });
        self.request(Method::PATCH, &account, Some(body)).await?;
        Ok(())
    }

    async fn delete_user(&self, username: &str) -> Result<()> {
        let account = self
            .find_account(username)
            .await?
            .ok_or_else(|| BmcError::UserNotFound(username.to_string()))?;

        self.request(Method::DELETE, &account, None).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> RedfishConfig {
        RedfishConfig::new("https://bmc.local", "admin", "password")
    }

    #[test]
    fn test_redfish_controller_creation() {
        let controller = RedfishController::new(test_config()).unwrap();
        assert_eq!(controller.base_url(), "https://bmc.local");
        assert_eq!(
            controller.url(SYSTEMS_PATH),
            "https://bmc.local/redfish/v1/Systems"
        );
    }

    #[test]
    fn test_members_and_first_member() {
        let collection = json!({
            "Members": [
                { "@odata.id": "/redfish/v1/Systems/System.Embedded.1" },
                { "@odata.id": "/redfish/v1/Systems/2" }
            ]
        });
        assert_eq!(members(&collection).len(), 2);
        assert_eq!(
            first_member(&collection).as_deref(),
            Some("/redfish/v1/Systems/System.Embedded.1")
        );
        assert_eq!(first_member(&json!({})), None);
    }

    #[test]
    fn test_power_state_from_system() {
        assert_eq!(power_state_from_system(&json!({"PowerState": "On"})), PowerState::On);
        assert_eq!(power_state_from_system(&json!({"PowerState": "Off"})), PowerState::Off);
        assert_eq!(power_state_from_system(&json!({})), PowerState::Unknown);
    }

    #[test]
    fn test_boot_override_body() {
        let body = boot_override_body(
            BootDevice::Pxe,
            BootOptions {
                persistent: false,
                efi_boot: true,
            },
        );
        assert_eq!(body["Boot"]["BootSourceOverrideEnabled"], "Once");
        assert_eq!(body["Boot"]["BootSourceOverrideTarget"], "Pxe");
        assert_eq!(body["Boot"]["BootSourceOverrideMode"], "UEFI");

        let body = boot_override_body(
            BootDevice::Disk,
            BootOptions {
                persistent: true,
                efi_boot: false,
            },
        );
        assert_eq!(body["Boot"]["BootSourceOverrideEnabled"], "Continuous");
        assert_eq!(body["Boot"]["BootSourceOverrideTarget"], "Hdd");
        assert_eq!(body["Boot"]["BootSourceOverrideMode"], "Legacy");
    }

    #[test]
    fn test_status_error_mapping() {
        assert!(matches!(
            status_error(StatusCode::UNAUTHORIZED, "/redfish/v1/Systems", ""),
            BmcError::AuthenticationFailed(_)
        ));
        assert!(status_error(StatusCode::SERVICE_UNAVAILABLE, "/", "").is_connection());
        assert!(matches!(
            status_error(StatusCode::BAD_REQUEST, "/", "bad"),
            BmcError::CommandFailed(_)
        ));
    }

    #[tokio::test]
    async fn test_unreachable_bmc_is_connection_error() {
        let config = RedfishConfig::new("http://127.0.0.1:1", "admin", "password");
        let controller = RedfishController::new(config).unwrap();

        let err = controller.get_power_state().await.unwrap_err();
        assert!(err.is_connection(), "unexpected error: {err}");
    }
}
