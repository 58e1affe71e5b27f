//! Upgrade lifecycle manager.
//!
//! Owns the state machine governing an upgrade's life. Every guard is
//! validated before any write, so a failed request leaves no partial
//! state behind; the inventory then applies the upgrade-task and
//! cluster writes atomically. Planning and chain building run
//! synchronously on the caller's thread; the built chain is handed to
//! the dispatcher and executes out-of-band, so every operation here
//! returns as soon as its work is enqueued.

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use crate::catalog::Catalog;
use crate::chain::{Chain, ChainHandle, Dispatcher, WorkUnit};
use crate::driver::{DriverRegistry, UpgradeDriver};
use crate::error::RolloutError;
use crate::inventory::Inventory;
use crate::model::{ClusterStatus, DriverParams, UpgradeStatus, UpgradeTask, Version};
use crate::planner::{PlannedStep, Planner, Strategy};

/// A created upgrade together with the handle of its dispatched chain.
///
/// Dropping the handle detaches the chain; it keeps running.
#[derive(Debug)]
pub struct DispatchedUpgrade {
    pub task: UpgradeTask,
    pub handle: ChainHandle,
}

/// Coordinates lifecycle transitions, planning and dispatch.
pub struct LifecycleManager {
    inventory: Arc<dyn Inventory>,
    catalog: Arc<Catalog>,
    registry: DriverRegistry,
    strategy: Strategy,
    dispatcher: Dispatcher,
}

impl LifecycleManager {
    pub fn new(
        inventory: Arc<dyn Inventory>,
        catalog: Arc<Catalog>,
        registry: DriverRegistry,
        strategy: Strategy,
    ) -> Self {
        Self {
            inventory,
            catalog,
            registry,
            strategy,
            dispatcher: Dispatcher::new(),
        }
    }

    /// Creates, plans and dispatches a new upgrade for a cluster.
    ///
    /// Guards, in order: the cluster exists, its version is known, no
    /// active upgrade occupies it, the target version is strictly
    /// higher, and the driver name resolves. All of them run before any
    /// state is written.
    pub fn create_upgrade(
        &self,
        cluster_id: Uuid,
        to_version: Version,
        driver_name: &str,
        params: DriverParams,
    ) -> Result<DispatchedUpgrade> {
        let cluster = self.inventory.cluster(cluster_id)?;

        let from_index = cluster
            .version
            .index()
            .ok_or(RolloutError::ClusterVersionUnknown(cluster_id))?;

        if matches!(
            cluster.status,
            ClusterStatus::UpgradeInProgress | ClusterStatus::UpgradePaused
        ) {
            return Err(RolloutError::UpgradeAlreadyInProgress(cluster_id).into());
        }

        match to_version.index() {
            Some(to_index) if to_index > from_index => {}
            _ => {
                return Err(RolloutError::CannotUpgradeToLowerVersion {
                    from: cluster.version,
                    to: to_version,
                }
                .into());
            }
        }

        let driver = self.registry.create(driver_name, params.clone())?;

        let task = self.inventory.create_upgrade_task(UpgradeTask {
            id: Uuid::new_v4(),
            cluster_id,
            from_version: cluster.version,
            to_version,
            status: UpgradeStatus::InProgress,
            upgrade_start_time: Utc::now(),
            upgrade_end_time: None,
            driver: driver_name.to_string(),
            driver_params: params,
        })?;

        let planner = Planner::new(&self.catalog, self.strategy);
        let plan = planner.plan(self.inventory.as_ref(), cluster_id)?;
        let chain = build_chain(driver.as_ref(), &task, &plan, self.strategy)?;

        info!(
            "created upgrade {} for cluster {}: {} -> {}, {} step(s), strategy {}",
            task.id,
            cluster.name,
            task.from_version,
            task.to_version,
            plan.len(),
            self.strategy
        );

        let handle = self.dispatcher.dispatch(chain)?;
        Ok(DispatchedUpgrade { task, handle })
    }

    /// Pauses an in-progress upgrade.
    pub fn pause_upgrade(&self, cluster_id: Uuid) -> Result<UpgradeTask> {
        self.transition(
            cluster_id,
            "pause",
            &[UpgradeStatus::InProgress],
            UpgradeStatus::Paused,
            false,
            |driver, task| driver.pause(task),
        )
    }

    /// Continues a paused upgrade.
    pub fn continue_upgrade(&self, cluster_id: Uuid) -> Result<UpgradeTask> {
        self.transition(
            cluster_id,
            "continue",
            &[UpgradeStatus::Paused],
            UpgradeStatus::InProgress,
            false,
            |driver, task| driver.resume(task),
        )
    }

    /// Cancels an active upgrade and stamps its end time.
    pub fn cancel_upgrade(&self, cluster_id: Uuid) -> Result<UpgradeTask> {
        self.transition(
            cluster_id,
            "cancel",
            &[UpgradeStatus::InProgress, UpgradeStatus::Paused],
            UpgradeStatus::Cancelled,
            true,
            |driver, task| driver.cancel(task),
        )
    }

    /// Rolls back an active upgrade.
    ///
    /// Rollback semantics beyond the status change belong to the
    /// driver's control unit; a driver advertises support via
    /// [`UpgradeDriver::supports_rollback`].
    pub fn rollback_upgrade(&self, cluster_id: Uuid) -> Result<UpgradeTask> {
        self.transition(
            cluster_id,
            "rollback",
            &[UpgradeStatus::InProgress, UpgradeStatus::Paused],
            UpgradeStatus::Rollback,
            false,
            |driver, task| driver.rollback(task),
        )
    }

    /// Returns an upgrade task by id.
    pub fn get_upgrade(&self, upgrade_id: Uuid) -> Result<UpgradeTask, RolloutError> {
        self.inventory
            .upgrade_task(upgrade_id)?
            .ok_or(RolloutError::UpgradeNotFound(upgrade_id))
    }

    /// Lists upgrade tasks, optionally filtered by cluster.
    pub fn list_upgrades(
        &self,
        cluster_id: Option<Uuid>,
    ) -> Result<Vec<UpgradeTask>, RolloutError> {
        self.inventory.upgrade_tasks(cluster_id)
    }

    /// Shared transition logic for pause/continue/cancel/rollback:
    /// locate the most recent task, then apply the source-state guard
    /// and both status writes as one atomic inventory operation before
    /// enqueuing the driver's control unit.
    fn transition<F>(
        &self,
        cluster_id: Uuid,
        action: &str,
        allowed: &[UpgradeStatus],
        to: UpgradeStatus,
        set_end_time: bool,
        control_unit: F,
    ) -> Result<UpgradeTask>
    where
        F: FnOnce(&dyn UpgradeDriver, &UpgradeTask) -> Result<Box<dyn WorkUnit>>,
    {
        self.inventory.cluster(cluster_id)?;
        let task = self
            .inventory
            .most_recent_upgrade_task(cluster_id)?
            .ok_or(RolloutError::UpgradeNotFound(cluster_id))?;

        let end_time = set_end_time.then(Utc::now);
        let updated = self
            .inventory
            .update_upgrade_state(task.id, allowed, to, end_time)
            .with_context(|| format!("cannot {} upgrade for cluster {}", action, cluster_id))?;

        let driver = self
            .registry
            .create(&updated.driver, updated.driver_params.clone())?;
        let unit = control_unit(driver.as_ref(), &updated)
            .with_context(|| format!("driver {} hook failed", action))?;

        let mut chain = Chain::new();
        chain.push(unit);
        // Fire-and-forget: the control unit runs out-of-band.
        self.dispatcher.dispatch(chain)?;

        info!("upgrade {} for cluster {}: {}", action, cluster_id, updated.status);
        Ok(updated)
    }
}

/// Sequences a plan's work units into one ordered chain.
///
/// The pre-upgrade unit always goes first. By-host plans keep each
/// host's steps contiguous and are wrapped with the host and service
/// hooks; by-service plans are the bare start units in plan order.
pub fn build_chain(
    driver: &dyn UpgradeDriver,
    upgrade: &UpgradeTask,
    plan: &[PlannedStep],
    strategy: Strategy,
) -> Result<Chain> {
    let mut chain = Chain::new();
    chain.push(driver.pre_upgrade().context("driver pre-upgrade hook failed")?);

    match strategy {
        Strategy::ByHost => {
            let mut current_host: Option<&crate::model::Host> = None;
            for step in plan {
                let host = step
                    .hosts
                    .first()
                    .context("by-host planned step carries no target host")?;

                if current_host.map(|h| h.id) != Some(host.id) {
                    if let Some(previous) = current_host {
                        chain.push(driver.post_host_hook(upgrade, previous)?);
                    }
                    chain.push(driver.pre_host_hook(upgrade, host)?);
                    current_host = Some(host);
                }

                chain.push(driver.pre_service_hook(upgrade, &step.service)?);
                chain.push(driver.start(upgrade, &step.service, &step.hosts)?);
                chain.push(driver.post_service_hook(upgrade, &step.service)?);
            }
            if let Some(previous) = current_host {
                chain.push(driver.post_host_hook(upgrade, previous)?);
            }
        }
        Strategy::ByService => {
            for step in plan {
                chain.push(driver.start(upgrade, &step.service, &step.hosts)?);
            }
        }
    }

    Ok(chain)
}
