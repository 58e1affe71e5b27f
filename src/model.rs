//! Core data model: clusters, hosts, services and upgrade tasks.
//!
//! These types mirror the persisted inventory records. `Cluster` and
//! `UpgradeTask` are the only records mutated by the lifecycle manager;
//! everything else is read-only topology produced by discovery.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

/// Open key/value parameter map passed to a driver at instantiation time.
pub type DriverParams = BTreeMap<String, String>;

/// Known release versions, in upgrade order.
///
/// The declaration order defines the upgrade path: an upgrade may only
/// target a version with a higher index than the cluster's current one.
/// `Unknown` is assigned to clusters whose version could not be
/// discovered and has no index.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub enum Version {
    Liberty,
    Mitaka,
    Newton,
    Unknown,
}

impl Version {
    /// Returns the position of this version on the upgrade path, or
    /// `None` for [`Version::Unknown`].
    pub fn index(&self) -> Option<usize> {
        match self {
            Self::Liberty => Some(0),
            Self::Mitaka => Some(1),
            Self::Newton => Some(2),
            Self::Unknown => None,
        }
    }
}

/// Lifecycle status of a cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum ClusterStatus {
    NotReadyForUpgrade,
    ReadyForUpgrade,
    UpgradeInProgress,
    UpgradePaused,
    UpgradeCancelled,
    UpgradeRollback,
}

/// Lifecycle status of an upgrade task, mirroring the subset of
/// [`ClusterStatus`] values an upgrade can be in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum UpgradeStatus {
    InProgress,
    Paused,
    Cancelled,
    Rollback,
}

impl UpgradeStatus {
    /// Returns true if the upgrade still occupies its cluster, i.e. it is
    /// either running or paused. At most one active upgrade may exist per
    /// cluster at any time.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::InProgress | Self::Paused)
    }

    /// Returns the cluster status corresponding to this upgrade status.
    pub fn cluster_status(&self) -> ClusterStatus {
        match self {
            Self::InProgress => ClusterStatus::UpgradeInProgress,
            Self::Paused => ClusterStatus::UpgradePaused,
            Self::Cancelled => ClusterStatus::UpgradeCancelled,
            Self::Rollback => ClusterStatus::UpgradeRollback,
        }
    }
}

/// A deployment being upgraded. Created by discovery; mutated only by
/// the lifecycle manager during an upgrade's life.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Cluster {
    pub id: Uuid,
    pub name: String,
    pub version: Version,
    pub status: ClusterStatus,
}

/// A machine within a cluster hosting zero or more services.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Host {
    pub id: Uuid,
    pub hostname: String,
    pub cluster_id: Uuid,
}

/// A named software component instance, running on one or more hosts.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Service {
    pub id: Uuid,
    pub name: String,
    pub version: Version,
}

/// The persisted record of one upgrade attempt for a cluster.
///
/// The most recent task for a cluster is the active one. The driver name
/// and parameters chosen at creation time are kept on the record so that
/// pause/continue/cancel/rollback can re-instantiate the same driver;
/// they are not part of the serialized public form.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UpgradeTask {
    pub id: Uuid,
    pub cluster_id: Uuid,
    pub from_version: Version,
    pub to_version: Version,
    pub status: UpgradeStatus,
    pub upgrade_start_time: DateTime<Utc>,
    pub upgrade_end_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing)]
    pub driver: String,
    #[serde(skip_serializing)]
    pub driver_params: DriverParams,
}
