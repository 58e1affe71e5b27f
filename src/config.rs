//! YAML manifest loading and validation.
//!
//! A manifest declares the upgrade settings (strategy, driver and its
//! parameters, optionally a custom scenario catalog) and the cluster
//! topology used to seed the in-memory inventory:
//!
//! ```yaml
//! strategy: by-host
//! driver:
//!   name: shell
//!   parameters:
//!     command: upgrade-service.sh
//! topology:
//!   clusters:
//!     - name: staging
//!       version: mitaka
//!       hosts:
//!         - hostname: ctl-1
//!           services: [keystone-wsgi-admin, nova-api]
//! ```

use std::collections::HashSet;
use std::fs::File;
use std::io::BufReader;

use camino::Utf8Path;
use serde::Deserialize;

use crate::catalog::{Catalog, Project};
use crate::error::RolloutError;
use crate::inventory::MemoryInventory;
use crate::model::{Cluster, ClusterStatus, DriverParams, Version};
use crate::planner::Strategy;

/// Top-level manifest structure.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Manifest {
    #[serde(default)]
    pub strategy: Strategy,
    #[serde(default)]
    pub driver: DriverConfig,
    /// Custom scenario catalog; the built-in one is used when absent.
    #[serde(default)]
    pub catalog: Option<CatalogConfig>,
    pub topology: Topology,
}

/// Driver selection and its open parameter map.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DriverConfig {
    pub name: String,
    #[serde(default)]
    pub parameters: DriverParams,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            name: "noop".to_string(),
            parameters: DriverParams::new(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CatalogConfig {
    pub projects: Vec<Project>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Topology {
    pub clusters: Vec<ClusterConfig>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClusterConfig {
    pub name: String,
    pub version: Version,
    #[serde(default = "default_cluster_status")]
    pub status: ClusterStatus,
    #[serde(default)]
    pub hosts: Vec<HostConfig>,
}

fn default_cluster_status() -> ClusterStatus {
    ClusterStatus::ReadyForUpgrade
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HostConfig {
    pub hostname: String,
    #[serde(default)]
    pub services: Vec<String>,
}

/// Loads a manifest from a YAML file.
pub fn load_manifest(path: &Utf8Path) -> Result<Manifest, RolloutError> {
    let file = File::open(path).map_err(|e| RolloutError::io(path.to_string(), e))?;
    let reader = BufReader::new(file);
    serde_yaml::from_reader(reader)
        .map_err(|e| RolloutError::Config(format!("failed to parse {}: {}", path, e)))
}

impl Manifest {
    /// Validates cross-field constraints the deserializer cannot check.
    pub fn validate(&self) -> Result<(), RolloutError> {
        if self.topology.clusters.is_empty() {
            return Err(RolloutError::Validation(
                "topology must declare at least one cluster".to_string(),
            ));
        }

        let mut cluster_names = HashSet::new();
        for cluster in &self.topology.clusters {
            if !cluster_names.insert(cluster.name.as_str()) {
                return Err(RolloutError::Validation(format!(
                    "duplicate cluster name: {}",
                    cluster.name
                )));
            }

            let mut hostnames = HashSet::new();
            for host in &cluster.hosts {
                if !hostnames.insert(host.hostname.as_str()) {
                    return Err(RolloutError::Validation(format!(
                        "duplicate hostname in cluster {}: {}",
                        cluster.name, host.hostname
                    )));
                }
            }
        }

        if let Some(ref catalog) = self.catalog {
            if catalog.projects.is_empty() {
                return Err(RolloutError::Validation(
                    "custom catalog must declare at least one project".to_string(),
                ));
            }
        }

        Ok(())
    }

    /// The effective scenario catalog.
    pub fn catalog(&self) -> Catalog {
        match &self.catalog {
            Some(config) => Catalog::new(config.projects.clone()),
            None => Catalog::builtin(),
        }
    }

    /// Seeds an in-memory inventory from the topology section.
    ///
    /// Service instances inherit their cluster's version. Returns the
    /// inventory together with the created clusters in manifest order.
    pub fn build_inventory(&self) -> Result<(MemoryInventory, Vec<Cluster>), RolloutError> {
        let inventory = MemoryInventory::new();
        let mut clusters = Vec::new();

        for cluster_config in &self.topology.clusters {
            let cluster = inventory.add_cluster(
                &cluster_config.name,
                cluster_config.version,
                cluster_config.status,
            );
            for host_config in &cluster_config.hosts {
                let host = inventory.add_host(cluster.id, &host_config.hostname)?;
                for service in &host_config.services {
                    inventory.add_service(host.id, service, cluster_config.version)?;
                }
            }
            clusters.push(cluster);
        }

        Ok((inventory, clusters))
    }
}
