//! Driver that performs no real work.
//!
//! Useful for dry runs and for exercising planning and lifecycle
//! handling without touching any host.

use anyhow::Result;

use crate::chain::{NoopUnit, WorkUnit};
use crate::error::RolloutError;
use crate::model::{DriverParams, Host, Service, UpgradeTask};

use super::UpgradeDriver;

#[derive(Debug, Default)]
pub struct NoopDriver;

impl NoopDriver {
    /// Registry factory; accepts (and ignores) any parameters.
    pub fn factory(_params: DriverParams) -> Result<Box<dyn UpgradeDriver>, RolloutError> {
        Ok(Box::new(Self))
    }
}

impl UpgradeDriver for NoopDriver {
    fn start(
        &self,
        _upgrade: &UpgradeTask,
        _service: &Service,
        _hosts: &[Host],
    ) -> Result<Box<dyn WorkUnit>> {
        Ok(Box::new(NoopUnit))
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use uuid::Uuid;

    use super::*;
    use crate::chain::{AbortToken, Outcome};
    use crate::model::{UpgradeStatus, Version};

    fn upgrade() -> UpgradeTask {
        UpgradeTask {
            id: Uuid::new_v4(),
            cluster_id: Uuid::new_v4(),
            from_version: Version::Mitaka,
            to_version: Version::Newton,
            status: UpgradeStatus::InProgress,
            upgrade_start_time: Utc::now(),
            upgrade_end_time: None,
            driver: "noop".to_string(),
            driver_params: DriverParams::new(),
        }
    }

    #[test]
    fn test_start_returns_noop_unit() {
        let driver = NoopDriver;
        let upgrade = upgrade();
        let service = Service {
            id: Uuid::new_v4(),
            name: "nova-api".to_string(),
            version: Version::Mitaka,
        };
        let unit = driver.start(&upgrade, &service, &[]).unwrap();
        assert_eq!(unit.run(&AbortToken::new()).unwrap(), Outcome::Completed(0));
    }

    #[test]
    fn test_rollback_unsupported() {
        assert!(!NoopDriver.supports_rollback());
    }

    #[test]
    fn test_control_hooks_default_to_noop() {
        let driver = NoopDriver;
        let upgrade = upgrade();
        for unit in [
            driver.pre_upgrade().unwrap(),
            driver.pause(&upgrade).unwrap(),
            driver.resume(&upgrade).unwrap(),
            driver.cancel(&upgrade).unwrap(),
            driver.rollback(&upgrade).unwrap(),
            driver.stop(&upgrade).unwrap(),
        ] {
            assert_eq!(unit.run(&AbortToken::new()).unwrap(), Outcome::Completed(0));
        }
    }
}
