//! Driver capability definition
//!
//! A driver implements one out-of-band management protocol. The executor
//! only sees this trait: which action categories a driver handles, and a
//! way to run one action against one host.

use std::collections::HashSet;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bmcd_drivers::{
    BmcController, IpmiConfig, IpmiController, PowerAction, PowerState,
    RedfishConfig, RedfishController,
};
use tracing::debug;

use crate::auth::Credentials;
use crate::context::RequestContext;
use crate::error::{Error, Result};
use crate::request::{ActionCategory, ActionOutcome, ActionPayload, ActionResult, UserAction};

/// Core trait for out-of-band protocol drivers
///
/// # Contract
///
/// `execute` must return promptly with `Cancelled`/`DeadlineExceeded` once
/// `ctx` ends, must only touch the connection it opens itself, and must
/// release that connection before returning on every path. Nothing from
/// one call may influence the next.
///
/// # Example
///
/// ```ignore
/// use bmcd_engine::{ActionCategory, ActionPayload, ActionResult, Credentials, Driver, RequestContext, Result};
/// use async_trait::async_trait;
///
/// struct EchoDriver;
///
/// #[async_trait]
/// impl Driver for EchoDriver {
///     fn name(&self) -> &str {
///         "echo"
///     }
///
///     fn supports(&self, category: ActionCategory) -> bool {
///         category == ActionCategory::Power
///     }
///
///     async fn execute(&self, ctx: &RequestContext, host: &str, credentials: &Credentials, payload: &ActionPayload) -> Result<ActionResult> {
///         todo!()
///     }
/// }
/// ```
#[async_trait]
pub trait Driver: Send + Sync {
    /// Driver name, used in logs, status messages and error details
    fn name(&self) -> &str;

    /// Whether this driver can perform actions of `category`
    fn supports(&self, category: ActionCategory) -> bool;

    /// Perform `payload` against `host`
    async fn execute(
        &self,
        ctx: &RequestContext,
        host: &str,
        credentials: &Credentials,
        payload: &ActionPayload,
    ) -> Result<ActionResult>;
}

/// Protocols with a built-in driver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Protocol {
    Ipmitool,
    Redfish,
}

impl Protocol {
    pub fn name(&self) -> &'static str {
        match self {
            Protocol::Ipmitool => "ipmitool",
            Protocol::Redfish => "redfish",
        }
    }
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Protocol {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ipmitool" | "ipmi" => Ok(Protocol::Ipmitool),
            "redfish" => Ok(Protocol::Redfish),
            other => Err(Error::invalid_argument(format!("unknown driver: {}", other))),
        }
    }
}

/// Connection settings shared by the built-in drivers
#[derive(Debug, Clone)]
pub struct DriverSettings {
    pub ipmi_port: u16,
    pub ipmi_interface: String,
    pub ipmitool_path: PathBuf,
    pub redfish_insecure: bool,
    pub redfish_timeout: Duration,
}

impl Default for DriverSettings {
    fn default() -> Self {
        Self {
            ipmi_port: 623,
            ipmi_interface: "lanplus".to_string(),
            ipmitool_path: PathBuf::from("ipmitool"),
            redfish_insecure: false,
            redfish_timeout: Duration::from_secs(30),
        }
    }
}

/// Driver backed by one of the `bmcd-drivers` controllers
///
/// Holds only configuration. Each call opens a fresh controller, and the
/// controller (child process or HTTP client) is dropped when the call ends.
#[derive(Debug, Clone)]
pub struct BmcDriver {
    protocol: Protocol,
    settings: DriverSettings,
    categories: HashSet<ActionCategory>,
}

impl BmcDriver {
    pub fn new(protocol: Protocol, settings: DriverSettings) -> Self {
        Self {
            protocol,
            settings,
            categories: ActionCategory::ALL.into_iter().collect(),
        }
    }

    /// Restrict the categories this driver is offered
    pub fn with_categories(mut self, categories: &[ActionCategory]) -> Self {
        self.categories = categories.iter().copied().collect();
        self
    }

    fn connect(&self, host: &str, credentials: &Credentials) -> Result<Box<dyn BmcController>> {
        let controller: Box<dyn BmcController> = match self.protocol {
            Protocol::Ipmitool => Box::new(IpmiController::new(
                IpmiConfig::new(host, &credentials.username, &credentials.password)
                    .with_port(self.settings.ipmi_port)
                    .with_interface(&self.settings.ipmi_interface)
                    .with_binary(&self.settings.ipmitool_path),
            )),
            Protocol::Redfish => Box::new(RedfishController::new(
                RedfishConfig::for_host(host, &credentials.username, &credentials.password)
                    .with_insecure(self.settings.redfish_insecure)
                    .with_timeout(self.settings.redfish_timeout),
            )?),
        };
        Ok(controller)
    }
}

async fn dispatch(
    controller: &dyn BmcController,
    payload: &ActionPayload,
) -> bmcd_drivers::Result<ActionOutcome> {
    match payload {
        ActionPayload::Power(action) => {
            let state = match action {
                PowerAction::On => controller.power_on().await.map(|_| PowerState::On)?,
                PowerAction::Off => controller.soft_shutdown().await.map(|_| PowerState::Off)?,
                PowerAction::HardOff => controller.power_off().await.map(|_| PowerState::Off)?,
                PowerAction::Cycle => controller.power_cycle().await.map(|_| PowerState::On)?,
                PowerAction::Reset => controller.power_reset().await.map(|_| PowerState::On)?,
                PowerAction::Status => controller.get_power_state().await?,
            };
            Ok(ActionOutcome::Power(state))
        }
        ActionPayload::BootDevice { device, options } => {
            controller.set_boot_device(*device, *options).await?;
            Ok(ActionOutcome::BootDevice(*device))
        }
        ActionPayload::User(action) => {
            match action {
                UserAction::Create(user) => controller.create_user(user).await?,
                UserAction::Update(user) => controller.update_user(user).await?,
                UserAction::Delete { username } => controller.delete_user(username).await?,
            }
            Ok(ActionOutcome::User(action.username().to_string()))
        }
    }
}

#[async_trait]
impl Driver for BmcDriver {
    fn name(&self) -> &str {
        self.protocol.name()
    }

    fn supports(&self, category: ActionCategory) -> bool {
        self.categories.contains(&category)
    }

    async fn execute(
        &self,
        ctx: &RequestContext,
        host: &str,
        credentials: &Credentials,
        payload: &ActionPayload,
    ) -> Result<ActionResult> {
        let controller = self.connect(host, credentials)?;

        debug!(driver = self.name(), host = %host, action = %payload, "dispatching to controller");

        let outcome = tokio::select! {
            biased;
            err = ctx.done() => return Err(err),
            outcome = dispatch(controller.as_ref(), payload) => outcome?,
        };

        Ok(ActionResult::new(self.name(), outcome))
    }
}

/// A driver that always succeeds with a fixed outcome (for testing)
#[derive(Debug)]
pub struct StaticDriver {
    name: String,
    outcome: ActionOutcome,
    calls: AtomicUsize,
}

impl StaticDriver {
    pub fn new(name: impl Into<String>, outcome: ActionOutcome) -> Self {
        Self {
            name: name.into(),
            outcome,
            calls: AtomicUsize::new(0),
        }
    }

    /// Number of times `execute` has been invoked
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Driver for StaticDriver {
    fn name(&self) -> &str {
        &self.name
    }

    fn supports(&self, _category: ActionCategory) -> bool {
        true
    }

    async fn execute(
        &self,
        _ctx: &RequestContext,
        _host: &str,
        _credentials: &Credentials,
        _payload: &ActionPayload,
    ) -> Result<ActionResult> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(ActionResult::new(self.name.clone(), self.outcome.clone()))
    }
}

/// A driver that always fails (for testing error handling)
#[derive(Debug)]
pub struct FailingDriver {
    name: String,
    error: Error,
    categories: Option<Vec<ActionCategory>>,
    calls: AtomicUsize,
}

impl FailingDriver {
    pub fn new(name: impl Into<String>, error: Error) -> Self {
        Self {
            name: name.into(),
            error,
            categories: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// Only claim support for `categories`
    pub fn with_categories(mut self, categories: &[ActionCategory]) -> Self {
        self.categories = Some(categories.to_vec());
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Driver for FailingDriver {
    fn name(&self) -> &str {
        &self.name
    }

    fn supports(&self, category: ActionCategory) -> bool {
        self.categories
            .as_ref()
            .map_or(true, |categories| categories.contains(&category))
    }

    async fn execute(
        &self,
        _ctx: &RequestContext,
        _host: &str,
        _credentials: &Credentials,
        _payload: &ActionPayload,
    ) -> Result<ActionResult> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(self.error.clone())
    }
}

/// A driver that sleeps before succeeding (for testing cancellation)
///
/// It deliberately ignores `ctx` so tests can check that the executor
/// enforces cancellation on its own.
#[derive(Debug)]
pub struct SleepDriver {
    name: String,
    duration: Duration,
    calls: AtomicUsize,
}

impl SleepDriver {
    pub fn new(name: impl Into<String>, duration: Duration) -> Self {
        Self {
            name: name.into(),
            duration,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Driver for SleepDriver {
    fn name(&self) -> &str {
        &self.name
    }

    fn supports(&self, _category: ActionCategory) -> bool {
        true
    }

    async fn execute(
        &self,
        _ctx: &RequestContext,
        _host: &str,
        _credentials: &Credentials,
        _payload: &ActionPayload,
    ) -> Result<ActionResult> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.duration).await;
        Ok(ActionResult::new(
            self.name.clone(),
            ActionOutcome::Power(PowerState::On),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Code;

    fn creds() -> Credentials {
        Credentials::new("admin", "password")
    }

    #[test]
    fn test_protocol_from_str() {
        assert_eq!("ipmitool".parse::<Protocol>().unwrap(), Protocol::Ipmitool);
        assert_eq!(" IPMI ".parse::<Protocol>().unwrap(), Protocol::Ipmitool);
        assert_eq!("redfish".parse::<Protocol>().unwrap(), Protocol::Redfish);

        let err = "smash".parse::<Protocol>().unwrap_err();
        assert_eq!(err.code, Code::InvalidArgument);
    }

    #[test]
    fn test_bmc_driver_categories() {
        let driver = BmcDriver::new(Protocol::Redfish, DriverSettings::default());
        assert_eq!(driver.name(), "redfish");
        assert!(ActionCategory::ALL.iter().all(|c| driver.supports(*c)));

        let driver = driver.with_categories(&[ActionCategory::Power]);
        assert!(driver.supports(ActionCategory::Power));
        assert!(!driver.supports(ActionCategory::User));
    }

    #[tokio::test]
    async fn test_bmc_driver_missing_ipmitool() {
        let settings = DriverSettings {
            ipmitool_path: PathBuf::from("/nonexistent/ipmitool"),
            ..DriverSettings::default()
        };
        let driver = BmcDriver::new(Protocol::Ipmitool, settings);

        let err = driver
            .execute(
                &RequestContext::new(),
                "10.0.0.5",
                &creds(),
                &ActionPayload::Power(PowerAction::Status),
            )
            .await
            .unwrap_err();
        assert_eq!(err.code, Code::InvalidArgument);
        assert!(err.message.contains("ipmitool not found"));
    }

    #[tokio::test]
    async fn test_bmc_driver_honours_cancelled_context() {
        let driver = BmcDriver::new(Protocol::Redfish, DriverSettings::default());
        let ctx = RequestContext::new();
        ctx.cancel();

        let err = driver
            .execute(
                &ctx,
                "http://127.0.0.1:1",
                &creds(),
                &ActionPayload::Power(PowerAction::On),
            )
            .await
            .unwrap_err();
        assert_eq!(err.code, Code::Cancelled);
    }

    #[tokio::test]
    async fn test_bmc_driver_unreachable_redfish() {
        let driver = BmcDriver::new(Protocol::Redfish, DriverSettings::default());

        let err = driver
            .execute(
                &RequestContext::new(),
                "http://127.0.0.1:1",
                &creds(),
                &ActionPayload::Power(PowerAction::Status),
            )
            .await
            .unwrap_err();
        assert_eq!(err.code, Code::Unavailable);
    }

    #[tokio::test]
    async fn test_static_driver() {
        let driver = StaticDriver::new("static", ActionOutcome::Power(PowerState::Off));

        let result = driver
            .execute(
                &RequestContext::new(),
                "bmc",
                &creds(),
                &ActionPayload::Power(PowerAction::Status),
            )
            .await
            .unwrap();
        assert_eq!(result.driver, "static");
        assert_eq!(result.outcome, ActionOutcome::Power(PowerState::Off));
        assert_eq!(driver.calls(), 1);
    }

    #[tokio::test]
    async fn test_failing_driver() {
        let driver = FailingDriver::new("broken", Error::internal("Something went wrong"))
            .with_categories(&[ActionCategory::User]);
        assert!(!driver.supports(ActionCategory::Power));
        assert!(driver.supports(ActionCategory::User));

        let err = driver
            .execute(
                &RequestContext::new(),
                "bmc",
                &creds(),
                &ActionPayload::Power(PowerAction::On),
            )
            .await
            .unwrap_err();
        assert!(err.message.contains("Something went wrong"));
        assert_eq!(driver.calls(), 1);
    }
}
