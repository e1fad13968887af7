//! Request payloads and results

use bmcd_drivers::{BootDevice, BootOptions, PowerAction, PowerState, UserSpec};
use serde::{Deserialize, Serialize};

use crate::auth::Authn;
use crate::error::{Error, Result};

/// Category of action a driver may be able to perform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionCategory {
    Power,
    BootDevice,
    User,
}

impl ActionCategory {
    pub const ALL: [ActionCategory; 3] = [
        ActionCategory::Power,
        ActionCategory::BootDevice,
        ActionCategory::User,
    ];
}

impl std::fmt::Display for ActionCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActionCategory::Power => write!(f, "power"),
            ActionCategory::BootDevice => write!(f, "boot device"),
            ActionCategory::User => write!(f, "user"),
        }
    }
}

/// Power operation request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PowerRequest {
    #[serde(default)]
    pub authn: Option<Authn>,
    pub power_action: PowerAction,
}

/// Boot device override request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BootDeviceRequest {
    #[serde(default)]
    pub authn: Option<Authn>,
    pub boot_device: BootDevice,
    #[serde(default)]
    pub persistent: bool,
    #[serde(default)]
    pub efi_boot: bool,
}

/// Account management operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserAction {
    Create(UserSpec),
    Update(UserSpec),
    Delete { username: String },
}

impl UserAction {
    pub fn username(&self) -> &str {
        match self {
            UserAction::Create(user) | UserAction::Update(user) => &user.username,
            UserAction::Delete { username } => username,
        }
    }
}

/// Account management request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRequest {
    #[serde(default)]
    pub authn: Option<Authn>,
    pub user_action: UserAction,
}

/// The operation a driver is asked to perform, without authentication
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionPayload {
    Power(PowerAction),
    BootDevice {
        device: BootDevice,
        options: BootOptions,
    },
    User(UserAction),
}

impl ActionPayload {
    pub fn category(&self) -> ActionCategory {
        match self {
            ActionPayload::Power(_) => ActionCategory::Power,
            ActionPayload::BootDevice { .. } => ActionCategory::BootDevice,
            ActionPayload::User(_) => ActionCategory::User,
        }
    }

    /// Reject payloads no driver could act on
    pub fn validate(&self) -> Result<()> {
        let ActionPayload::User(action) = self else {
            return Ok(());
        };

        if action.username().is_empty() {
            return Err(Error::invalid_argument("username is required"));
        }
        if let UserAction::Create(user) = action {
            if user.password.is_empty() {
                return Err(Error::invalid_argument("password is required to create a user"));
            }
        }
        Ok(())
    }
}

impl std::fmt::Display for ActionPayload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActionPayload::Power(action) => write!(f, "power {}", action),
            ActionPayload::BootDevice { device, options } => {
                write!(f, "set boot device {}", device)?;
                if options.persistent {
                    write!(f, " (persistent)")?;
                }
                if options.efi_boot {
                    write!(f, " (efi)")?;
                }
                Ok(())
            }
            ActionPayload::User(action) => match action {
                UserAction::Create(user) => write!(f, "create user {}", user.username),
                UserAction::Update(user) => write!(f, "update user {}", user.username),
                UserAction::Delete { username } => write!(f, "delete user {}", username),
            },
        }
    }
}

/// Any inbound action request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionRequest {
    Power(PowerRequest),
    BootDevice(BootDeviceRequest),
    User(UserRequest),
}

impl ActionRequest {
    pub fn authn(&self) -> Option<&Authn> {
        match self {
            ActionRequest::Power(req) => req.authn.as_ref(),
            ActionRequest::BootDevice(req) => req.authn.as_ref(),
            ActionRequest::User(req) => req.authn.as_ref(),
        }
    }

    pub fn payload(&self) -> ActionPayload {
        match self {
            ActionRequest::Power(req) => ActionPayload::Power(req.power_action),
            ActionRequest::BootDevice(req) => ActionPayload::BootDevice {
                device: req.boot_device,
                options: BootOptions {
                    persistent: req.persistent,
                    efi_boot: req.efi_boot,
                },
            },
            ActionRequest::User(req) => ActionPayload::User(req.user_action.clone()),
        }
    }

    pub fn category(&self) -> ActionCategory {
        match self {
            ActionRequest::Power(_) => ActionCategory::Power,
            ActionRequest::BootDevice(_) => ActionCategory::BootDevice,
            ActionRequest::User(_) => ActionCategory::User,
        }
    }
}

impl From<PowerRequest> for ActionRequest {
    fn from(req: PowerRequest) -> Self {
        ActionRequest::Power(req)
    }
}

impl From<BootDeviceRequest> for ActionRequest {
    fn from(req: BootDeviceRequest) -> Self {
        ActionRequest::BootDevice(req)
    }
}

impl From<UserRequest> for ActionRequest {
    fn from(req: UserRequest) -> Self {
        ActionRequest::User(req)
    }
}

/// Typed outcome of a successful action
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionOutcome {
    /// Power state after the action (as reported for `status`, as requested otherwise)
    Power(PowerState),
    /// Boot device now in effect
    BootDevice(BootDevice),
    /// Account that was created, updated or deleted
    User(String),
}

/// Result of a successful action
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionResult {
    /// Driver that performed the action
    pub driver: String,
    pub outcome: ActionOutcome,
    /// `"<driver>: <message>"` for every driver that failed before this one
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub details: Vec<String>,
}

impl ActionResult {
    pub fn new(driver: impl Into<String>, outcome: ActionOutcome) -> Self {
        Self {
            driver: driver.into(),
            outcome,
            details: Vec::new(),
        }
    }

    pub fn with_details(mut self, details: Vec<String>) -> Self {
        self.details = details;
        self
    }
}
