//! Topology provider abstraction and its in-memory implementation.
//!
//! The [`Inventory`] trait is the seam between the orchestration engine
//! and whatever backs the persisted cluster state. It exposes the
//! topology queries the planner needs and the cluster/upgrade-task
//! writes the lifecycle manager performs. Each mutating operation is
//! atomic with respect to the others: an implementation must apply the
//! guard re-check and both row writes as one unit.
//!
//! [`MemoryInventory`] is the concrete implementation used by the CLI
//! and the test suite. A single mutex guards the whole state, which
//! closes the create-upgrade race between concurrent callers: the
//! "at most one active upgrade per cluster" check and the insert happen
//! under one lock acquisition.

use std::sync::Mutex;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::RolloutError;
use crate::model::{Cluster, ClusterStatus, Host, Service, UpgradeStatus, UpgradeTask, Version};

/// Persistence-backed topology and upgrade-task store.
///
/// Implementations must be `Send + Sync`; the lifecycle manager shares
/// the inventory with dispatched worker threads.
pub trait Inventory: Send + Sync {
    /// Returns the cluster, or [`RolloutError::ClusterNotFound`].
    fn cluster(&self, cluster_id: Uuid) -> Result<Cluster, RolloutError>;

    /// Hosts of a cluster in discovery order.
    fn hosts_by_cluster(&self, cluster_id: Uuid) -> Result<Vec<Host>, RolloutError>;

    /// Services running on a host, in discovery order.
    fn services_by_host(&self, host_id: Uuid) -> Result<Vec<Service>, RolloutError>;

    /// A service by name together with every host in the cluster running
    /// it, or `None` if the service is not deployed there.
    fn service_with_hosts(
        &self,
        cluster_id: Uuid,
        name: &str,
    ) -> Result<Option<(Service, Vec<Host>)>, RolloutError>;

    /// Persists a new upgrade task and moves its cluster to the matching
    /// status, atomically. Fails with
    /// [`RolloutError::UpgradeAlreadyInProgress`] if an active task
    /// already exists for the cluster.
    fn create_upgrade_task(&self, task: UpgradeTask) -> Result<UpgradeTask, RolloutError>;

    /// The most recently created upgrade task for a cluster, if any.
    fn most_recent_upgrade_task(
        &self,
        cluster_id: Uuid,
    ) -> Result<Option<UpgradeTask>, RolloutError>;

    /// An upgrade task by id, if it exists.
    fn upgrade_task(&self, upgrade_id: Uuid) -> Result<Option<UpgradeTask>, RolloutError>;

    /// All upgrade tasks, optionally filtered by cluster, in creation order.
    fn upgrade_tasks(&self, cluster_id: Option<Uuid>) -> Result<Vec<UpgradeTask>, RolloutError>;

    /// Moves an upgrade task to `to` and its cluster to the matching
    /// status, atomically. The task's current status must be one of
    /// `allowed`, re-checked under the same guard as the writes, so two
    /// racing transitions cannot both move the task from the same source
    /// state. `end_time` is set when given. Fails with
    /// [`RolloutError::Validation`] on a source-state mismatch.
    fn update_upgrade_state(
        &self,
        upgrade_id: Uuid,
        allowed: &[UpgradeStatus],
        to: UpgradeStatus,
        end_time: Option<DateTime<Utc>>,
    ) -> Result<UpgradeTask, RolloutError>;
}

#[derive(Debug, Default)]
struct State {
    clusters: Vec<Cluster>,
    hosts: Vec<Host>,
    services: Vec<Service>,
    // (service id, host id) pairs; one service may run on many hosts.
    placements: Vec<(Uuid, Uuid)>,
    upgrades: Vec<UpgradeTask>,
}

impl State {
    fn cluster(&self, cluster_id: Uuid) -> Result<&Cluster, RolloutError> {
        self.clusters
            .iter()
            .find(|c| c.id == cluster_id)
            .ok_or(RolloutError::ClusterNotFound(cluster_id))
    }

    fn cluster_mut(&mut self, cluster_id: Uuid) -> Result<&mut Cluster, RolloutError> {
        self.clusters
            .iter_mut()
            .find(|c| c.id == cluster_id)
            .ok_or(RolloutError::ClusterNotFound(cluster_id))
    }
}

/// In-memory topology and upgrade-task store.
#[derive(Debug, Default)]
pub struct MemoryInventory {
    state: Mutex<State>,
}

impl MemoryInventory {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        // A poisoned mutex means a panic while holding the lock; the
        // state itself is only ever mutated through complete operations.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Registers a discovered cluster.
    pub fn add_cluster(
        &self,
        name: impl Into<String>,
        version: Version,
        status: ClusterStatus,
    ) -> Cluster {
        let cluster = Cluster {
            id: Uuid::new_v4(),
            name: name.into(),
            version,
            status,
        };
        self.lock().clusters.push(cluster.clone());
        cluster
    }

    /// Registers a discovered host belonging to a cluster.
    pub fn add_host(
        &self,
        cluster_id: Uuid,
        hostname: impl Into<String>,
    ) -> Result<Host, RolloutError> {
        let mut state = self.lock();
        state.cluster(cluster_id)?;
        let host = Host {
            id: Uuid::new_v4(),
            hostname: hostname.into(),
            cluster_id,
        };
        state.hosts.push(host.clone());
        Ok(host)
    }

    /// Registers a service instance on a host.
    ///
    /// If a service with the same name already exists in the host's
    /// cluster, the host is added to its placement set; otherwise a new
    /// service record is created.
    pub fn add_service(
        &self,
        host_id: Uuid,
        name: impl Into<String>,
        version: Version,
    ) -> Result<Service, RolloutError> {
        let name = name.into();
        let mut state = self.lock();
        let host = state
            .hosts
            .iter()
            .find(|h| h.id == host_id)
            .ok_or_else(|| {
                RolloutError::Validation(format!("host not found in inventory: {}", host_id))
            })?
            .clone();

        let existing = state.services.iter().find(|s| {
            s.name == name
                && state.placements.iter().any(|&(sid, hid)| {
                    sid == s.id
                        && state
                            .hosts
                            .iter()
                            .any(|h| h.id == hid && h.cluster_id == host.cluster_id)
                })
        });

        let service = match existing {
            Some(service) => service.clone(),
            None => {
                let service = Service {
                    id: Uuid::new_v4(),
                    name,
                    version,
                };
                state.services.push(service.clone());
                service
            }
        };

        if !state
            .placements
            .iter()
            .any(|&(sid, hid)| sid == service.id && hid == host_id)
        {
            state.placements.push((service.id, host_id));
        }
        Ok(service)
    }
}

impl Inventory for MemoryInventory {
    fn cluster(&self, cluster_id: Uuid) -> Result<Cluster, RolloutError> {
        self.lock().cluster(cluster_id).cloned()
    }

    fn hosts_by_cluster(&self, cluster_id: Uuid) -> Result<Vec<Host>, RolloutError> {
        let state = self.lock();
        state.cluster(cluster_id)?;
        Ok(state
            .hosts
            .iter()
            .filter(|h| h.cluster_id == cluster_id)
            .cloned()
            .collect())
    }

    fn services_by_host(&self, host_id: Uuid) -> Result<Vec<Service>, RolloutError> {
        let state = self.lock();
        Ok(state
            .placements
            .iter()
            .filter(|&&(_, hid)| hid == host_id)
            .filter_map(|&(sid, _)| state.services.iter().find(|s| s.id == sid))
            .cloned()
            .collect())
    }

    fn service_with_hosts(
        &self,
        cluster_id: Uuid,
        name: &str,
    ) -> Result<Option<(Service, Vec<Host>)>, RolloutError> {
        let state = self.lock();
        state.cluster(cluster_id)?;

        for service in state.services.iter().filter(|s| s.name == name) {
            let hosts: Vec<Host> = state
                .hosts
                .iter()
                .filter(|h| {
                    h.cluster_id == cluster_id
                        && state
                            .placements
                            .iter()
                            .any(|&(sid, hid)| sid == service.id && hid == h.id)
                })
                .cloned()
                .collect();
            if !hosts.is_empty() {
                return Ok(Some((service.clone(), hosts)));
            }
        }
        Ok(None)
    }

    fn create_upgrade_task(&self, task: UpgradeTask) -> Result<UpgradeTask, RolloutError> {
        let mut state = self.lock();
        state.cluster(task.cluster_id)?;

        // Check-and-insert under one lock: two racing create calls for
        // the same cluster cannot both pass this guard.
        let active = state
            .upgrades
            .iter()
            .any(|u| u.cluster_id == task.cluster_id && u.status.is_active());
        if active {
            return Err(RolloutError::UpgradeAlreadyInProgress(task.cluster_id));
        }

        state.cluster_mut(task.cluster_id)?.status = task.status.cluster_status();
        state.upgrades.push(task.clone());
        Ok(task)
    }

    fn most_recent_upgrade_task(
        &self,
        cluster_id: Uuid,
    ) -> Result<Option<UpgradeTask>, RolloutError> {
        let state = self.lock();
        state.cluster(cluster_id)?;
        Ok(state
            .upgrades
            .iter()
            .filter(|u| u.cluster_id == cluster_id)
            .next_back()
            .cloned())
    }

    fn upgrade_task(&self, upgrade_id: Uuid) -> Result<Option<UpgradeTask>, RolloutError> {
        Ok(self
            .lock()
            .upgrades
            .iter()
            .find(|u| u.id == upgrade_id)
            .cloned())
    }

    fn upgrade_tasks(&self, cluster_id: Option<Uuid>) -> Result<Vec<UpgradeTask>, RolloutError> {
        Ok(self
            .lock()
            .upgrades
            .iter()
            .filter(|u| cluster_id.is_none_or(|id| u.cluster_id == id))
            .cloned()
            .collect())
    }

    fn update_upgrade_state(
        &self,
        upgrade_id: Uuid,
        allowed: &[UpgradeStatus],
        to: UpgradeStatus,
        end_time: Option<DateTime<Utc>>,
    ) -> Result<UpgradeTask, RolloutError> {
        let mut state = self.lock();
        let position = state
            .upgrades
            .iter()
            .position(|u| u.id == upgrade_id)
            .ok_or(RolloutError::UpgradeNotFound(upgrade_id))?;

        // Compare-and-swap under the lock: the source-state guard and
        // both row writes happen in one acquisition.
        let current = state.upgrades[position].status;
        if !allowed.contains(&current) {
            return Err(RolloutError::Validation(format!(
                "cannot transition upgrade {} from '{}' to '{}'",
                upgrade_id, current, to
            )));
        }

        let cluster_id = state.upgrades[position].cluster_id;
        state.cluster_mut(cluster_id)?.status = to.cluster_status();

        let task = &mut state.upgrades[position];
        task.status = to;
        if end_time.is_some() {
            task.upgrade_end_time = end_time;
        }
        Ok(task.clone())
    }
}
