//! Scenario catalog: the canonical rolling-upgrade order.
//!
//! The catalog is an immutable, ordered table of projects, each holding
//! an ordered list of services tagged with the host roles they may run
//! on. Position in the flattened table defines the total upgrade
//! precedence over service names (the "service index"). Services absent
//! from the catalog are unknown to the planner and are skipped.
//!
//! The built-in catalog reproduces the OpenStack rolling-upgrade
//! scenario (see the OpenStack OPS upgrades guide for the rationale
//! behind the order). A custom catalog can be supplied from the YAML
//! manifest instead.

use std::collections::HashMap;

use serde::Deserialize;
use strum::{Display, EnumString};

/// Host role a service may run on.
///
/// Roles carry an implicit priority — controller services are upgraded
/// before compute ones, compute before storage — used as a tie-break
/// when ordering hosts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Deserialize)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Controller,
    Compute,
    Storage,
}

impl Role {
    /// Upgrade priority of this role; lower ranks are upgraded first.
    pub fn rank(&self) -> usize {
        match self {
            Self::Controller => 0,
            Self::Compute => 1,
            Self::Storage => 2,
        }
    }
}

/// One service entry in the catalog.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ServiceEntry {
    /// Service name as reported by discovery (e.g. "nova-compute").
    pub name: String,
    /// Roles this service may run on.
    pub roles: Vec<Role>,
}

/// An ordered group of services belonging to one project.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Project {
    pub name: String,
    pub services: Vec<ServiceEntry>,
}

/// Immutable upgrade-precedence catalog.
///
/// Constructed once at startup, never mutated afterwards. The flattened
/// service index is precomputed on construction; a service name listed
/// more than once keeps its first position.
#[derive(Debug, Clone)]
pub struct Catalog {
    projects: Vec<Project>,
    index: HashMap<String, usize>,
    // Flattened (name, roles) pairs in index order, first occurrence only.
    flattened: Vec<(String, Vec<Role>)>,
}

impl Catalog {
    /// Builds a catalog from an ordered list of projects.
    pub fn new(projects: Vec<Project>) -> Self {
        let mut index = HashMap::new();
        let mut flattened = Vec::new();

        for project in &projects {
            for service in &project.services {
                if !index.contains_key(&service.name) {
                    index.insert(service.name.clone(), flattened.len());
                    flattened.push((service.name.clone(), service.roles.clone()));
                }
            }
        }

        Self {
            projects,
            index,
            flattened,
        }
    }

    /// The ordered projects making up this catalog.
    pub fn projects(&self) -> &[Project] {
        &self.projects
    }

    /// Position of a service in the flattened catalog, or `None` if the
    /// service is unknown.
    pub fn service_index(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    /// Roles of a service, or `None` if the service is unknown.
    pub fn roles(&self, name: &str) -> Option<&[Role]> {
        self.index
            .get(name)
            .map(|&i| self.flattened[i].1.as_slice())
    }

    /// Best (lowest) role rank among a service's roles.
    pub fn role_rank(&self, name: &str) -> Option<usize> {
        self.roles(name)
            .and_then(|roles| roles.iter().map(Role::rank).min())
    }

    /// Service names in catalog order, each exactly once.
    pub fn service_names(&self) -> impl Iterator<Item = &str> {
        self.flattened.iter().map(|(name, _)| name.as_str())
    }

    /// Number of distinct services known to the catalog.
    pub fn len(&self) -> usize {
        self.flattened.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flattened.is_empty()
    }

    /// The built-in OpenStack rolling-upgrade scenario.
    ///
    /// Services are upgraded project-by-project in the order specified
    /// here, and within a project in the order listed.
    pub fn builtin() -> Self {
        fn svc(name: &str, roles: &[Role]) -> ServiceEntry {
            ServiceEntry {
                name: name.to_string(),
                roles: roles.to_vec(),
            }
        }

        fn project(name: &str, services: Vec<ServiceEntry>) -> Project {
            Project {
                name: name.to_string(),
                services,
            }
        }

        use Role::{Compute, Controller, Storage};

        Self::new(vec![
            project("Keystone", vec![
                svc("keystone-wsgi-admin", &[Controller]),
                svc("keystone-wsgi-public", &[Controller]),
            ]),
            project("Glance", vec![
                svc("glance-api", &[Controller]),
                svc("glance-registry", &[Controller]),
            ]),
            project("Nova", vec![
                svc("nova-conductor", &[Controller]),
                svc("nova-scheduler", &[Controller]),
                svc("nova-cells", &[Controller]),
                svc("nova-cert", &[Controller]),
                svc("nova-console", &[Controller]),
                svc("nova-consoleauth", &[Controller]),
                svc("nova-network", &[Controller]),
                svc("nova-novncproxy", &[Controller]),
                svc("nova-serialproxy", &[Controller]),
                svc("nova-spicehtml5proxy", &[Controller]),
                svc("nova-xvpvncproxy", &[Controller]),
                svc("nova-api", &[Controller]),
                svc("nova-api-metadata", &[Controller]),
                svc("nova-api-os-compute", &[Controller]),
                svc("nova-compute", &[Compute]),
            ]),
            project("Neutron", vec![
                svc("neutron-server", &[Controller]),
                svc("neutron-openvswitch-agent", &[Controller, Compute]),
                svc("neutron-linuxbridge-agent", &[Controller, Compute]),
                svc("neutron-sriov-nic-agent", &[Controller, Compute]),
                svc("neutron-l3-agent", &[Controller]),
                svc("neutron-dhcp-agent", &[Controller]),
                svc("neutron-metering-agent", &[Controller]),
                svc("neutron-metadata-agent", &[Controller]),
                svc("neutron-ns-metadata-proxy", &[Controller]),
            ]),
            project("Cinder", vec![
                svc("cinder-api", &[Controller]),
                svc("cinder-scheduler", &[Controller]),
                svc("cinder-volume", &[Storage]),
            ]),
            project("Horizon", vec![
                svc("horizon-wsgi", &[Controller]),
            ]),
            project("Heat", vec![
                svc("heat-api", &[Controller]),
                svc("heat-engine", &[Controller]),
                svc("heat-api-cfn", &[Controller]),
                svc("heat-api-cloudwatch", &[Controller]),
            ]),
            project("Ceilometer", vec![
                svc("ceilometer-collector", &[Controller]),
                svc("ceilometer-agent-notification", &[Controller]),
                svc("ceilometer-polling", &[Controller]),
                svc("ceilometer-api", &[Controller]),
            ]),
            project("Aodh", vec![
                svc("aodh-evaluator", &[Controller]),
                svc("aodh-notifier", &[Controller]),
                svc("aodh-listener", &[Controller]),
                svc("aodh-api", &[Controller]),
            ]),
            project("Gnocchi", vec![
                svc("gnocchi-statsd", &[Controller]),
                svc("gnocchi-metricd", &[Controller]),
                svc("gnocchi-api", &[Controller]),
            ]),
            project("Swift", vec![
                svc("swift-proxy-server", &[Controller]),
                svc("swift-account-auditor", &[Storage]),
                svc("swift-account-reaper", &[Storage]),
                svc("swift-account-replicator", &[Storage]),
                svc("swift-account-server", &[Storage]),
                svc("swift-container-auditor", &[Storage]),
                svc("swift-container-reconciler", &[Storage]),
                svc("swift-container-replicator", &[Storage]),
                svc("swift-container-server", &[Storage]),
                svc("swift-container-sync", &[Storage]),
                svc("swift-container-updater", &[Storage]),
                svc("swift-object-auditor", &[Storage]),
                svc("swift-object-expirer", &[Storage]),
                svc("swift-object-reconstructor", &[Storage]),
                svc("swift-object-replicator", &[Storage]),
                svc("swift-object-server", &[Storage]),
                svc("swift-object-updater", &[Storage]),
            ]),
            project("Ironic", vec![
                svc("ironic-inspector", &[Controller]),
                svc("ironic-conductor", &[Controller]),
                svc("ironic-api", &[Controller]),
            ]),
        ])
    }
}
