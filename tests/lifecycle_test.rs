//! Lifecycle manager tests: creation guards, state transitions and
//! chain sequencing.

use std::sync::{Arc, Mutex};

use chrono::Utc;
use uuid::Uuid;

use rollout::catalog::Catalog;
use rollout::chain::{AbortToken, Outcome, WorkUnit};
use rollout::driver::{DriverRegistry, UpgradeDriver};
use rollout::error::RolloutError;
use rollout::inventory::{Inventory, MemoryInventory};
use rollout::lifecycle::{LifecycleManager, build_chain};
use rollout::model::{
    Cluster, ClusterStatus, DriverParams, Host, Service, UpgradeStatus, UpgradeTask, Version,
};
use rollout::planner::{PlannedStep, Strategy};

fn seeded_manager(
    version: Version,
    status: ClusterStatus,
    strategy: Strategy,
) -> (LifecycleManager, Cluster, Arc<MemoryInventory>) {
    let inventory = Arc::new(MemoryInventory::new());
    let cluster = inventory.add_cluster("staging", version, status);
    let ctl = inventory.add_host(cluster.id, "ctl-1").unwrap();
    inventory.add_service(ctl.id, "keystone-wsgi-admin", version).unwrap();
    let cmp = inventory.add_host(cluster.id, "cmp-1").unwrap();
    inventory.add_service(cmp.id, "nova-compute", version).unwrap();

    let manager = LifecycleManager::new(
        inventory.clone(),
        Arc::new(Catalog::builtin()),
        DriverRegistry::builtin(),
        strategy,
    );
    (manager, cluster, inventory)
}

fn rollout_error(err: &anyhow::Error) -> &RolloutError {
    err.downcast_ref::<RolloutError>().expect("typed error expected")
}

#[test]
fn test_create_upgrade_dispatches_and_persists() {
    let (manager, cluster, inventory) =
        seeded_manager(Version::Mitaka, ClusterStatus::ReadyForUpgrade, Strategy::ByHost);

    let dispatched = manager
        .create_upgrade(cluster.id, Version::Newton, "noop", DriverParams::new())
        .unwrap();

    assert_eq!(dispatched.task.from_version, Version::Mitaka);
    assert_eq!(dispatched.task.to_version, Version::Newton);
    assert_eq!(dispatched.task.status, UpgradeStatus::InProgress);
    assert!(dispatched.task.upgrade_end_time.is_none());
    assert_eq!(
        inventory.cluster(cluster.id).unwrap().status,
        ClusterStatus::UpgradeInProgress
    );
    assert!(format!("{:?}", dispatched).contains("DispatchedUpgrade"));

    // Noop units finish immediately.
    assert_eq!(dispatched.handle.wait().unwrap(), Outcome::Completed(0));
}

#[test]
fn test_create_upgrade_unknown_cluster() {
    let (manager, _, _) =
        seeded_manager(Version::Mitaka, ClusterStatus::ReadyForUpgrade, Strategy::ByHost);
    let err = manager
        .create_upgrade(Uuid::new_v4(), Version::Newton, "noop", DriverParams::new())
        .unwrap_err();
    assert!(matches!(rollout_error(&err), RolloutError::ClusterNotFound(_)));
}

#[test]
fn test_create_upgrade_rejects_unknown_version() {
    let (manager, cluster, _) =
        seeded_manager(Version::Unknown, ClusterStatus::ReadyForUpgrade, Strategy::ByHost);
    let err = manager
        .create_upgrade(cluster.id, Version::Newton, "noop", DriverParams::new())
        .unwrap_err();
    assert!(matches!(
        rollout_error(&err),
        RolloutError::ClusterVersionUnknown(id) if *id == cluster.id
    ));
}

#[test]
fn test_create_upgrade_rejects_occupied_cluster() {
    let (manager, cluster, _) =
        seeded_manager(Version::Liberty, ClusterStatus::ReadyForUpgrade, Strategy::ByHost);
    manager
        .create_upgrade(cluster.id, Version::Mitaka, "noop", DriverParams::new())
        .unwrap();

    let err = manager
        .create_upgrade(cluster.id, Version::Newton, "noop", DriverParams::new())
        .unwrap_err();
    assert!(matches!(
        rollout_error(&err),
        RolloutError::UpgradeAlreadyInProgress(_)
    ));
}

#[test]
fn test_create_upgrade_rejects_downgrade_and_same_version() {
    let (manager, cluster, _) =
        seeded_manager(Version::Mitaka, ClusterStatus::ReadyForUpgrade, Strategy::ByHost);

    for target in [Version::Liberty, Version::Mitaka, Version::Unknown] {
        let err = manager
            .create_upgrade(cluster.id, target, "noop", DriverParams::new())
            .unwrap_err();
        assert!(matches!(
            rollout_error(&err),
            RolloutError::CannotUpgradeToLowerVersion { .. }
        ));
    }
}

#[test]
fn test_create_upgrade_unknown_driver_leaves_no_state() {
    let (manager, cluster, inventory) =
        seeded_manager(Version::Mitaka, ClusterStatus::ReadyForUpgrade, Strategy::ByHost);

    let err = manager
        .create_upgrade(cluster.id, Version::Newton, "ansible", DriverParams::new())
        .unwrap_err();
    assert!(matches!(rollout_error(&err), RolloutError::UnknownDriver(_)));

    // The guard fired before any write happened.
    assert_eq!(
        inventory.cluster(cluster.id).unwrap().status,
        ClusterStatus::ReadyForUpgrade
    );
    assert!(manager.list_upgrades(Some(cluster.id)).unwrap().is_empty());
}

#[test]
fn test_pause_and_continue_round_trip() {
    let (manager, cluster, inventory) =
        seeded_manager(Version::Mitaka, ClusterStatus::ReadyForUpgrade, Strategy::ByHost);
    manager
        .create_upgrade(cluster.id, Version::Newton, "noop", DriverParams::new())
        .unwrap();

    let paused = manager.pause_upgrade(cluster.id).unwrap();
    assert_eq!(paused.status, UpgradeStatus::Paused);
    assert_eq!(
        inventory.cluster(cluster.id).unwrap().status,
        ClusterStatus::UpgradePaused
    );

    let resumed = manager.continue_upgrade(cluster.id).unwrap();
    assert_eq!(resumed.status, UpgradeStatus::InProgress);
    assert_eq!(
        inventory.cluster(cluster.id).unwrap().status,
        ClusterStatus::UpgradeInProgress
    );
}

#[test]
fn test_cancel_stamps_end_time() {
    let (manager, cluster, _) =
        seeded_manager(Version::Mitaka, ClusterStatus::ReadyForUpgrade, Strategy::ByHost);
    let created = manager
        .create_upgrade(cluster.id, Version::Newton, "noop", DriverParams::new())
        .unwrap();
    assert!(created.task.upgrade_end_time.is_none());

    let cancelled = manager.cancel_upgrade(cluster.id).unwrap();
    assert_eq!(cancelled.status, UpgradeStatus::Cancelled);
    assert!(cancelled.upgrade_end_time.is_some());
}

#[test]
fn test_rollback_from_paused() {
    let (manager, cluster, inventory) =
        seeded_manager(Version::Mitaka, ClusterStatus::ReadyForUpgrade, Strategy::ByHost);
    manager
        .create_upgrade(cluster.id, Version::Newton, "noop", DriverParams::new())
        .unwrap();
    manager.pause_upgrade(cluster.id).unwrap();

    let rolled = manager.rollback_upgrade(cluster.id).unwrap();
    assert_eq!(rolled.status, UpgradeStatus::Rollback);
    assert_eq!(
        inventory.cluster(cluster.id).unwrap().status,
        ClusterStatus::UpgradeRollback
    );
}

#[test]
fn test_invalid_source_states_rejected() {
    let (manager, cluster, _) =
        seeded_manager(Version::Mitaka, ClusterStatus::ReadyForUpgrade, Strategy::ByHost);
    manager
        .create_upgrade(cluster.id, Version::Newton, "noop", DriverParams::new())
        .unwrap();

    // In-progress upgrades cannot be continued.
    let err = manager.continue_upgrade(cluster.id).unwrap_err();
    assert!(matches!(rollout_error(&err), RolloutError::Validation(_)));

    // Cancelled is terminal for every transition.
    manager.cancel_upgrade(cluster.id).unwrap();
    for result in [
        manager.pause_upgrade(cluster.id),
        manager.continue_upgrade(cluster.id),
        manager.cancel_upgrade(cluster.id),
        manager.rollback_upgrade(cluster.id),
    ] {
        let err = result.unwrap_err();
        assert!(matches!(rollout_error(&err), RolloutError::Validation(_)));
    }
}

#[test]
fn test_transition_without_upgrade_fails() {
    let (manager, cluster, _) =
        seeded_manager(Version::Mitaka, ClusterStatus::ReadyForUpgrade, Strategy::ByHost);
    let err = manager.pause_upgrade(cluster.id).unwrap_err();
    assert!(matches!(rollout_error(&err), RolloutError::UpgradeNotFound(_)));
}

#[test]
fn test_get_and_list_upgrades() {
    let (manager, cluster, _) =
        seeded_manager(Version::Liberty, ClusterStatus::ReadyForUpgrade, Strategy::ByService);
    let created = manager
        .create_upgrade(cluster.id, Version::Mitaka, "noop", DriverParams::new())
        .unwrap();

    let fetched = manager.get_upgrade(created.task.id).unwrap();
    assert_eq!(fetched.id, created.task.id);

    let err = manager.get_upgrade(Uuid::new_v4()).unwrap_err();
    assert!(matches!(err, RolloutError::UpgradeNotFound(_)));

    assert_eq!(manager.list_upgrades(Some(cluster.id)).unwrap().len(), 1);
    assert!(manager.list_upgrades(Some(Uuid::new_v4())).unwrap().is_empty());
}

#[test]
fn test_new_upgrade_allowed_after_cancel() {
    let (manager, cluster, _) =
        seeded_manager(Version::Liberty, ClusterStatus::ReadyForUpgrade, Strategy::ByHost);
    manager
        .create_upgrade(cluster.id, Version::Mitaka, "noop", DriverParams::new())
        .unwrap();
    manager.cancel_upgrade(cluster.id).unwrap();

    let second = manager
        .create_upgrade(cluster.id, Version::Newton, "noop", DriverParams::new())
        .unwrap();
    assert_eq!(second.task.status, UpgradeStatus::InProgress);
    assert_eq!(manager.list_upgrades(Some(cluster.id)).unwrap().len(), 2);
}

/// Driver whose units record their label when executed, used to observe
/// the exact hook sequence a built chain runs.
#[derive(Debug)]
struct RecordingDriver {
    log: Arc<Mutex<Vec<String>>>,
}

struct LabelUnit {
    label: String,
    log: Arc<Mutex<Vec<String>>>,
}

impl WorkUnit for LabelUnit {
    fn describe(&self) -> String {
        self.label.clone()
    }

    fn run(&self, _abort: &AbortToken) -> anyhow::Result<Outcome> {
        self.log.lock().unwrap().push(self.label.clone());
        Ok(Outcome::Completed(0))
    }
}

impl RecordingDriver {
    fn unit(&self, label: String) -> anyhow::Result<Box<dyn WorkUnit>> {
        Ok(Box::new(LabelUnit {
            label,
            log: self.log.clone(),
        }))
    }
}

impl UpgradeDriver for RecordingDriver {
    fn pre_upgrade(&self) -> anyhow::Result<Box<dyn WorkUnit>> {
        self.unit("pre-upgrade".to_string())
    }

    fn pre_host_hook(&self, _upgrade: &UpgradeTask, host: &Host) -> anyhow::Result<Box<dyn WorkUnit>> {
        self.unit(format!("pre-host {}", host.hostname))
    }

    fn post_host_hook(&self, _upgrade: &UpgradeTask, host: &Host) -> anyhow::Result<Box<dyn WorkUnit>> {
        self.unit(format!("post-host {}", host.hostname))
    }

    fn pre_service_hook(
        &self,
        _upgrade: &UpgradeTask,
        service: &Service,
    ) -> anyhow::Result<Box<dyn WorkUnit>> {
        self.unit(format!("pre-service {}", service.name))
    }

    fn post_service_hook(
        &self,
        _upgrade: &UpgradeTask,
        service: &Service,
    ) -> anyhow::Result<Box<dyn WorkUnit>> {
        self.unit(format!("post-service {}", service.name))
    }

    fn start(
        &self,
        _upgrade: &UpgradeTask,
        service: &Service,
        hosts: &[Host],
    ) -> anyhow::Result<Box<dyn WorkUnit>> {
        let hostnames: Vec<&str> = hosts.iter().map(|h| h.hostname.as_str()).collect();
        self.unit(format!("start {} on {}", service.name, hostnames.join(",")))
    }
}

fn host(hostname: &str, cluster_id: Uuid) -> Host {
    Host {
        id: Uuid::new_v4(),
        hostname: hostname.to_string(),
        cluster_id,
    }
}

fn service(name: &str) -> Service {
    Service {
        id: Uuid::new_v4(),
        name: name.to_string(),
        version: Version::Mitaka,
    }
}

fn task(cluster_id: Uuid) -> UpgradeTask {
    UpgradeTask {
        id: Uuid::new_v4(),
        cluster_id,
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
fn test_build_chain_by_host_wraps_hooks_around_steps() {
    let cluster_id = Uuid::new_v4();
    let ctl = host("ctl-1", cluster_id);
    let cmp = host("cmp-1", cluster_id);

    let plan = vec![
        PlannedStep {
            ordinal: 0,
            service: service("keystone-wsgi-admin"),
            hosts: vec![ctl.clone()],
        },
        PlannedStep {
            ordinal: 1,
            service: service("nova-api"),
            hosts: vec![ctl.clone()],
        },
        PlannedStep {
            ordinal: 2,
            service: service("nova-compute"),
            hosts: vec![cmp.clone()],
        },
    ];

    let log = Arc::new(Mutex::new(Vec::new()));
    let driver = RecordingDriver { log: log.clone() };
    let chain = build_chain(&driver, &task(cluster_id), &plan, Strategy::ByHost).unwrap();
    chain.execute(&AbortToken::new()).unwrap();

    assert_eq!(
        *log.lock().unwrap(),
        [
            "pre-upgrade",
            "pre-host ctl-1",
            "pre-service keystone-wsgi-admin",
            "start keystone-wsgi-admin on ctl-1",
            "post-service keystone-wsgi-admin",
            "pre-service nova-api",
            "start nova-api on ctl-1",
            "post-service nova-api",
            "post-host ctl-1",
            "pre-host cmp-1",
            "pre-service nova-compute",
            "start nova-compute on cmp-1",
            "post-service nova-compute",
            "post-host cmp-1",
        ]
    );
}

#[test]
fn test_build_chain_by_service_uses_bare_start_units() {
    let cluster_id = Uuid::new_v4();
    let a = host("cmp-1", cluster_id);
    let b = host("cmp-2", cluster_id);

    let plan = vec![PlannedStep {
        ordinal: 0,
        service: service("nova-compute"),
        hosts: vec![a, b],
    }];

    let log = Arc::new(Mutex::new(Vec::new()));
    let driver = RecordingDriver { log: log.clone() };
    let chain = build_chain(&driver, &task(cluster_id), &plan, Strategy::ByService).unwrap();
    chain.execute(&AbortToken::new()).unwrap();

    assert_eq!(
        *log.lock().unwrap(),
        ["pre-upgrade", "start nova-compute on cmp-1,cmp-2"]
    );
}
