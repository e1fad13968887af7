//! BMC action engine
//!
//! Runs power, boot device and user management requests against a BMC by
//! trying an ordered list of protocol drivers until one succeeds.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │            ActionExecutor                │
//! │  - Resolve credentials                   │
//! │  - Try drivers in priority order         │
//! │  - Stream status messages                │
//! │  - Honour cancellation and deadlines     │
//! │                  │                       │
//! │                  ▼                       │
//! │  ┌─────────────────────────────────┐    │
//! │  │     DriverRegistry              │    │
//! │  │  ipmitool | redfish | ...       │    │
//! │  └─────────────────────────────────┘    │
//! └─────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! use bmcd_engine::{ActionExecutor, DriverRegistry, RequestContext, NoopSink};
//!
//! let registry = Arc::new(DriverRegistry::from_config(&RegistryConfig::default())?);
//! let result = ActionExecutor::new(request.into(), RequestContext::new(), registry, Arc::new(NoopSink))
//!     .run()
//!     .await?;
//! ```

pub mod auth;
pub mod context;
pub mod driver;
pub mod error;
pub mod executor;
pub mod registry;
pub mod request;
pub mod status;

pub use auth::*;
pub use context::*;
pub use driver::*;
pub use error::*;
pub use executor::*;
pub use registry::*;
pub use request::*;
pub use status::*;
