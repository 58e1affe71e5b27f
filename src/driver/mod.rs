//! Upgrade driver contract and the driver registry.
//!
//! A driver encapsulates *how* a planned step is actually executed: it
//! turns steps and lifecycle events into opaque [`WorkUnit`]s that the
//! chain builder sequences. Every hook is optional and defaults to a
//! no-op unit; only [`UpgradeDriver::start`] is mandatory. Drivers are
//! selected by name from a [`DriverRegistry`] at upgrade-creation time
//! and instantiated with caller-supplied key/value parameters.

pub mod noop;
pub mod shell;

use std::collections::BTreeMap;

use anyhow::Result;

pub use noop::NoopDriver;
pub use shell::ShellDriver;

use crate::chain::{NoopUnit, WorkUnit};
use crate::error::RolloutError;
use crate::model::{DriverParams, Host, Service, UpgradeTask};

fn noop_unit() -> Result<Box<dyn WorkUnit>> {
    Ok(Box::new(NoopUnit))
}

/// Pluggable strategy implementing how upgrade steps are executed.
///
/// All hooks default to no-op units so an implementation only satisfies
/// the subset its strategy needs. Hook methods take the upgrade task so
/// a driver can parameterize its work on the from/to versions.
pub trait UpgradeDriver: Send + Sync + std::fmt::Debug {
    /// Advertises whether this driver implements rollback.
    fn supports_rollback(&self) -> bool {
        false
    }

    /// Work to run once before any upgrade step.
    fn pre_upgrade(&self) -> Result<Box<dyn WorkUnit>> {
        noop_unit()
    }

    /// Called before the first step of each host (by-host plans only).
    fn pre_host_hook(&self, _upgrade: &UpgradeTask, _host: &Host) -> Result<Box<dyn WorkUnit>> {
        noop_unit()
    }

    /// Called after the last step of each host (by-host plans only).
    fn post_host_hook(&self, _upgrade: &UpgradeTask, _host: &Host) -> Result<Box<dyn WorkUnit>> {
        noop_unit()
    }

    /// Called before each service upgrade step (by-host plans only).
    fn pre_service_hook(
        &self,
        _upgrade: &UpgradeTask,
        _service: &Service,
    ) -> Result<Box<dyn WorkUnit>> {
        noop_unit()
    }

    /// Called after each service upgrade step (by-host plans only).
    fn post_service_hook(
        &self,
        _upgrade: &UpgradeTask,
        _service: &Service,
    ) -> Result<Box<dyn WorkUnit>> {
        noop_unit()
    }

    /// Work to upgrade a service on the given hosts. By-host plans pass
    /// a single host per call; by-service plans pass every host running
    /// the service.
    fn start(
        &self,
        upgrade: &UpgradeTask,
        service: &Service,
        hosts: &[Host],
    ) -> Result<Box<dyn WorkUnit>>;

    /// Control work enqueued when the upgrade is paused.
    fn pause(&self, _upgrade: &UpgradeTask) -> Result<Box<dyn WorkUnit>> {
        noop_unit()
    }

    /// Control work enqueued when the upgrade is continued.
    fn resume(&self, _upgrade: &UpgradeTask) -> Result<Box<dyn WorkUnit>> {
        noop_unit()
    }

    /// Control work enqueued when the upgrade is cancelled.
    fn cancel(&self, _upgrade: &UpgradeTask) -> Result<Box<dyn WorkUnit>> {
        noop_unit()
    }

    /// Control work enqueued when the upgrade is rolled back.
    fn rollback(&self, _upgrade: &UpgradeTask) -> Result<Box<dyn WorkUnit>> {
        noop_unit()
    }

    /// Control work enqueued when the upgrade is stopped.
    fn stop(&self, _upgrade: &UpgradeTask) -> Result<Box<dyn WorkUnit>> {
        noop_unit()
    }
}

/// Factory instantiating a driver from caller-supplied parameters.
pub type DriverFactory = fn(DriverParams) -> Result<Box<dyn UpgradeDriver>, RolloutError>;

/// Name-keyed registry of driver factories.
pub struct DriverRegistry {
    factories: BTreeMap<String, DriverFactory>,
}

impl DriverRegistry {
    /// A registry with no drivers.
    pub fn empty() -> Self {
        Self {
            factories: BTreeMap::new(),
        }
    }

    /// A registry with the built-in drivers: `noop` and `shell`.
    pub fn builtin() -> Self {
        let mut registry = Self::empty();
        registry.register("noop", NoopDriver::factory);
        registry.register("shell", ShellDriver::factory);
        registry
    }

    /// Registers a factory under a name, replacing any previous entry.
    pub fn register(&mut self, name: impl Into<String>, factory: DriverFactory) {
        self.factories.insert(name.into(), factory);
    }

    /// Registered driver names, sorted.
    pub fn names(&self) -> Vec<&str> {
        self.factories.keys().map(String::as_str).collect()
    }

    /// Instantiates the named driver with the given parameters.
    pub fn create(
        &self,
        name: &str,
        params: DriverParams,
    ) -> Result<Box<dyn UpgradeDriver>, RolloutError> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| RolloutError::UnknownDriver(name.to_string()))?;
        factory(params)
    }
}

impl Default for DriverRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_names() {
        let registry = DriverRegistry::builtin();
        assert_eq!(registry.names(), ["noop", "shell"]);
    }

    #[test]
    fn test_unknown_driver() {
        let registry = DriverRegistry::builtin();
        let err = registry.create("ansible", DriverParams::new()).unwrap_err();
        assert!(matches!(err, RolloutError::UnknownDriver(name) if name == "ansible"));
    }

    #[test]
    fn test_create_noop() {
        let registry = DriverRegistry::builtin();
        let driver = registry.create("noop", DriverParams::new()).unwrap();
        assert!(!driver.supports_rollback());
    }

    #[test]
    fn test_created_drivers_are_debuggable() {
        let registry = DriverRegistry::builtin();
        let driver = registry.create("noop", DriverParams::new()).unwrap();
        assert!(format!("{:?}", driver).contains("NoopDriver"));
    }

    #[test]
    fn test_register_replaces() {
        let mut registry = DriverRegistry::empty();
        registry.register("custom", NoopDriver::factory);
        assert_eq!(registry.names(), ["custom"]);
        assert!(registry.create("custom", DriverParams::new()).is_ok());
    }
}
