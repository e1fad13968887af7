//! Driver registry
//!
//! The registry is an ordered list of drivers. For each action category
//! it yields the drivers that support it, in registration order. That
//! order is the only authority on which driver is tried first.

use std::collections::HashSet;
use std::sync::Arc;

use crate::driver::{BmcDriver, Driver, DriverSettings, Protocol};
use crate::error::{Error, Result};
use crate::request::ActionCategory;

/// Configuration for the built-in drivers
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Drivers to register, highest priority first
    pub priority: Vec<Protocol>,
    pub settings: DriverSettings,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            priority: vec![Protocol::Ipmitool, Protocol::Redfish],
            settings: DriverSettings::default(),
        }
    }
}

/// Ordered collection of drivers
///
/// Built once at startup and shared read-only (usually behind an `Arc`)
/// by every request.
///
/// # Example
///
/// ```ignore
/// use bmcd_engine::{DriverRegistry, StaticDriver};
///
/// let mut registry = DriverRegistry::new();
/// registry.register(StaticDriver::new("test", outcome));
///
/// let candidates = registry.candidates(ActionCategory::Power);
/// ```
#[derive(Default)]
pub struct DriverRegistry {
    drivers: Vec<Arc<dyn Driver>>,
}

impl DriverRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the built-in drivers in the configured priority order
    pub fn from_config(config: &RegistryConfig) -> Result<Self> {
        if config.priority.is_empty() {
            return Err(Error::invalid_argument("at least one driver must be configured"));
        }

        let mut seen = HashSet::new();
        let mut registry = Self::new();
        for protocol in &config.priority {
            if !seen.insert(*protocol) {
                return Err(Error::invalid_argument(format!(
                    "driver {} listed more than once",
                    protocol
                )));
            }
            registry.register(BmcDriver::new(*protocol, config.settings.clone()));
        }
        Ok(registry)
    }

    /// Append a driver at the lowest priority
    pub fn register<D: Driver + 'static>(&mut self, driver: D) {
        self.drivers.push(Arc::new(driver));
    }

    /// Append a shared driver at the lowest priority
    pub fn register_arc(&mut self, driver: Arc<dyn Driver>) {
        self.drivers.push(driver);
    }

    /// Drivers able to perform `category`, highest priority first
    pub fn candidates(&self, category: ActionCategory) -> Vec<Arc<dyn Driver>> {
        self.drivers
            .iter()
            .filter(|driver| driver.supports(category))
            .cloned()
            .collect()
    }

    /// Names of all registered drivers, in priority order
    pub fn driver_names(&self) -> Vec<&str> {
        self.drivers.iter().map(|d| d.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.drivers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.drivers.is_empty()
    }
}

impl std::fmt::Debug for DriverRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DriverRegistry")
            .field("drivers", &self.driver_names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::{FailingDriver, StaticDriver};
    use crate::error::Code;
    use crate::request::ActionOutcome;
    use bmcd_drivers::PowerState;

    fn ok_driver(name: &str) -> StaticDriver {
        StaticDriver::new(name, ActionOutcome::Power(PowerState::On))
    }

    #[test]
    fn test_registry_new() {
        let registry = DriverRegistry::new();
        assert!(registry.is_empty());
        assert!(registry.candidates(ActionCategory::Power).is_empty());
    }

    #[test]
    fn test_registry_preserves_order() {
        let mut registry = DriverRegistry::new();
        registry.register(ok_driver("gamma"));
        registry.register(ok_driver("alpha"));
        registry.register(ok_driver("beta"));

        let names: Vec<String> = registry
            .candidates(ActionCategory::Power)
            .iter()
            .map(|d| d.name().to_string())
            .collect();
        assert_eq!(names, vec!["gamma", "alpha", "beta"]);
        assert_eq!(registry.driver_names(), vec!["gamma", "alpha", "beta"]);
    }

    #[test]
    fn test_registry_filters_by_category() {
        let mut registry = DriverRegistry::new();
        registry.register(
            FailingDriver::new("users-only", Error::internal("x"))
                .with_categories(&[ActionCategory::User]),
        );
        registry.register(ok_driver("everything"));

        let power: Vec<String> = registry
            .candidates(ActionCategory::Power)
            .iter()
            .map(|d| d.name().to_string())
            .collect();
        assert_eq!(power, vec!["everything"]);
        assert_eq!(registry.candidates(ActionCategory::User).len(), 2);
    }

    #[test]
    fn test_registry_register_arc() {
        let mut registry = DriverRegistry::new();
        let driver: Arc<dyn Driver> = Arc::new(ok_driver("shared"));
        registry.register_arc(driver.clone());

        assert_eq!(registry.len(), 1);
        assert!(Arc::ptr_eq(
            &registry.candidates(ActionCategory::BootDevice)[0],
            &driver
        ));
    }

    #[test]
    fn test_registry_from_config() {
        let config = RegistryConfig {
            priority: vec![Protocol::Redfish, Protocol::Ipmitool],
            settings: DriverSettings::default(),
        };
        let registry = DriverRegistry::from_config(&config).unwrap();
        assert_eq!(registry.driver_names(), vec!["redfish", "ipmitool"]);

        let default = DriverRegistry::from_config(&RegistryConfig::default()).unwrap();
        assert_eq!(default.driver_names(), vec!["ipmitool", "redfish"]);
    }

    #[test]
    fn test_registry_from_config_rejects_duplicates_and_empty() {
        let config = RegistryConfig {
            priority: vec![Protocol::Redfish, Protocol::Redfish],
            settings: DriverSettings::default(),
        };
        let err = DriverRegistry::from_config(&config).unwrap_err();
        assert_eq!(err.code, Code::InvalidArgument);

        let config = RegistryConfig {
            priority: vec![],
            settings: DriverSettings::default(),
        };
        assert!(DriverRegistry::from_config(&config).is_err());
    }

    #[test]
    fn test_registry_debug() {
        let mut registry = DriverRegistry::new();
        registry.register(ok_driver("test"));

        let debug = format!("{:?}", registry);
        assert!(debug.contains("DriverRegistry"));
        assert!(debug.contains("test"));
    }
}
