//! Step planner: turns live topology into an ordered upgrade plan.
//!
//! Combines the cluster topology from the inventory with the scenario
//! catalog and produces the ordered list of planned steps for one of
//! two strategies:
//!
//! - **by-host**: hosts are upgraded one after another; within a host,
//!   services go in catalog order. Hosts are ordered by the most
//!   important (lowest-indexed) service they run, with role priority
//!   and discovery position as tie-breaks, so controllers running
//!   identity services go first.
//! - **by-service**: services are upgraded cluster-wide in catalog
//!   order; one step covers a service on every host running it.
//!
//! Planning is pure given the inventory contents and fully
//! deterministic: re-planning unchanged topology yields an identical
//! plan. Services unknown to the catalog and hosts running no cataloged
//! service are skipped.

use clap::ValueEnum;
use serde::Deserialize;
use strum::Display;
use tracing::debug;
use uuid::Uuid;

use crate::catalog::Catalog;
use crate::error::RolloutError;
use crate::inventory::Inventory;
use crate::model::{Host, Service};

/// Plan ordering strategy, selectable from the manifest or CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, Deserialize, ValueEnum)]
#[strum(serialize_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
    #[default]
    ByHost,
    ByService,
}

/// One planned upgrade action: a service on a set of target hosts.
///
/// Ephemeral; recomputed on every planning pass and never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedStep {
    /// Position of this step in the plan, starting at zero.
    pub ordinal: usize,
    pub service: Service,
    /// Target hosts: exactly one for by-host plans, every host running
    /// the service for by-service plans.
    pub hosts: Vec<Host>,
}

/// Computes ordered upgrade plans from topology and catalog.
pub struct Planner<'a> {
    catalog: &'a Catalog,
    strategy: Strategy,
}

impl<'a> Planner<'a> {
    pub fn new(catalog: &'a Catalog, strategy: Strategy) -> Self {
        Self { catalog, strategy }
    }

    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    /// Produces the ordered plan for a cluster.
    pub fn plan(
        &self,
        inventory: &dyn Inventory,
        cluster_id: Uuid,
    ) -> Result<Vec<PlannedStep>, RolloutError> {
        match self.strategy {
            Strategy::ByHost => self.plan_by_host(inventory, cluster_id),
            Strategy::ByService => self.plan_by_service(inventory, cluster_id),
        }
    }

    fn plan_by_host(
        &self,
        inventory: &dyn Inventory,
        cluster_id: Uuid,
    ) -> Result<Vec<PlannedStep>, RolloutError> {
        struct HostPlan {
            min_index: usize,
            role_rank: usize,
            discovery_pos: usize,
            host: Host,
            // (service index, service), sorted by index.
            services: Vec<(usize, Service)>,
        }

        let mut host_plans = Vec::new();
        for (discovery_pos, host) in inventory.hosts_by_cluster(cluster_id)?.into_iter().enumerate()
        {
            let mut services: Vec<(usize, Service)> = inventory
                .services_by_host(host.id)?
                .into_iter()
                .filter_map(|service| {
                    let index = self.catalog.service_index(&service.name);
                    if index.is_none() {
                        debug!(
                            "service {} on host {} is not in the catalog, skipping",
                            service.name, host.hostname
                        );
                    }
                    index.map(|i| (i, service))
                })
                .collect();

            if services.is_empty() {
                debug!("host {} runs no cataloged service, skipping", host.hostname);
                continue;
            }
            services.sort_by_key(|&(index, _)| index);

            let min_index = services[0].0;
            let role_rank = services
                .iter()
                .filter_map(|(_, service)| self.catalog.role_rank(&service.name))
                .min()
                .unwrap_or(usize::MAX);

            host_plans.push(HostPlan {
                min_index,
                role_rank,
                discovery_pos,
                host,
                services,
            });
        }

        // The most important host goes first: the one running the
        // earliest-indexed service, controllers before computes before
        // storages, discovery order last.
        host_plans.sort_by_key(|hp| (hp.min_index, hp.role_rank, hp.discovery_pos));

        let mut steps = Vec::new();
        for host_plan in host_plans {
            for (_, service) in host_plan.services {
                steps.push(PlannedStep {
                    ordinal: steps.len(),
                    service,
                    hosts: vec![host_plan.host.clone()],
                });
            }
        }
        Ok(steps)
    }

    fn plan_by_service(
        &self,
        inventory: &dyn Inventory,
        cluster_id: Uuid,
    ) -> Result<Vec<PlannedStep>, RolloutError> {
        // Validate the cluster up front so an unknown cluster fails the
        // same way for both strategies.
        inventory.cluster(cluster_id)?;

        let mut steps = Vec::new();
        for name in self.catalog.service_names() {
            let Some((service, hosts)) = inventory.service_with_hosts(cluster_id, name)? else {
                continue;
            };
            if hosts.is_empty() {
                continue;
            }
            steps.push(PlannedStep {
                ordinal: steps.len(),
                service,
                hosts,
            });
        }
        Ok(steps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Project, Role, ServiceEntry};
    use crate::inventory::MemoryInventory;
    use crate::model::{ClusterStatus, Version};

    fn small_catalog() -> Catalog {
        Catalog::new(vec![Project {
            name: "Demo".to_string(),
            services: vec![
                ServiceEntry {
                    name: "svc-api".to_string(),
                    roles: vec![Role::Controller],
                },
                ServiceEntry {
                    name: "svc-worker".to_string(),
                    roles: vec![Role::Compute],
                },
            ],
        }])
    }

    #[test]
    fn test_uncataloged_services_never_planned() {
        let catalog = small_catalog();
        let inventory = MemoryInventory::new();
        let cluster =
            inventory.add_cluster("lab", Version::Mitaka, ClusterStatus::ReadyForUpgrade);
        let host = inventory.add_host(cluster.id, "host-1").unwrap();
        inventory.add_service(host.id, "svc-api", Version::Mitaka).unwrap();
        inventory.add_service(host.id, "mysql", Version::Mitaka).unwrap();

        for strategy in [Strategy::ByHost, Strategy::ByService] {
            let plan = Planner::new(&catalog, strategy)
                .plan(&inventory, cluster.id)
                .unwrap();
            assert_eq!(plan.len(), 1);
            assert_eq!(plan[0].service.name, "svc-api");
        }
    }

    #[test]
    fn test_host_without_cataloged_services_excluded() {
        let catalog = small_catalog();
        let inventory = MemoryInventory::new();
        let cluster =
            inventory.add_cluster("lab", Version::Mitaka, ClusterStatus::ReadyForUpgrade);
        let planned = inventory.add_host(cluster.id, "host-1").unwrap();
        let ignored = inventory.add_host(cluster.id, "host-2").unwrap();
        inventory
            .add_service(planned.id, "svc-worker", Version::Mitaka)
            .unwrap();
        inventory.add_service(ignored.id, "mysql", Version::Mitaka).unwrap();

        let plan = Planner::new(&catalog, Strategy::ByHost)
            .plan(&inventory, cluster.id)
            .unwrap();
        assert_eq!(plan.len(), 1);
        assert_eq!(plan[0].hosts[0].id, planned.id);
    }

    #[test]
    fn test_unknown_cluster_fails_for_both_strategies() {
        let catalog = small_catalog();
        let inventory = MemoryInventory::new();
        for strategy in [Strategy::ByHost, Strategy::ByService] {
            let err = Planner::new(&catalog, strategy)
                .plan(&inventory, Uuid::new_v4())
                .unwrap_err();
            assert!(matches!(err, RolloutError::ClusterNotFound(_)));
        }
    }

    #[test]
    fn test_ordinals_are_contiguous() {
        let catalog = small_catalog();
        let inventory = MemoryInventory::new();
        let cluster =
            inventory.add_cluster("lab", Version::Mitaka, ClusterStatus::ReadyForUpgrade);
        for hostname in ["host-1", "host-2"] {
            let host = inventory.add_host(cluster.id, hostname).unwrap();
            inventory.add_service(host.id, "svc-api", Version::Mitaka).unwrap();
            inventory
                .add_service(host.id, "svc-worker", Version::Mitaka)
                .unwrap();
        }

        let plan = Planner::new(&catalog, Strategy::ByHost)
            .plan(&inventory, cluster.id)
            .unwrap();
        let ordinals: Vec<usize> = plan.iter().map(|s| s.ordinal).collect();
        assert_eq!(ordinals, (0..plan.len()).collect::<Vec<_>>());
    }
}
