pub mod catalog;
pub mod chain;
pub mod cli;
pub mod config;
pub mod driver;
pub mod error;
pub mod inventory;
pub mod lifecycle;
pub mod model;
pub mod planner;
pub mod process;

use std::sync::Arc;

use anyhow::{Context, Result, bail};
use tracing::info;
use tracing_subscriber::{FmtSubscriber, filter::LevelFilter};

use crate::chain::Outcome;
use crate::driver::DriverRegistry;
use crate::lifecycle::LifecycleManager;
use crate::model::{Cluster, DriverParams};
use crate::planner::Planner;

pub fn init_logging(log_level: cli::LogLevel) -> Result<()> {
    let filter = match log_level {
        cli::LogLevel::Trace => LevelFilter::TRACE,
        cli::LogLevel::Debug => LevelFilter::DEBUG,
        cli::LogLevel::Info => LevelFilter::INFO,
        cli::LogLevel::Warn => LevelFilter::WARN,
        cli::LogLevel::Error => LevelFilter::ERROR,
    };

    tracing::subscriber::set_global_default(
        FmtSubscriber::builder().with_max_level(filter).finish(),
    )
    .context("failed to set global default tracing subscriber")
}

/// Finds a manifest cluster by name among the seeded inventory records.
fn find_cluster<'a>(clusters: &'a [Cluster], name: &str) -> Result<&'a Cluster> {
    clusters
        .iter()
        .find(|c| c.name == name)
        .with_context(|| format!("cluster '{}' not found in manifest topology", name))
}

/// Parses repeated `key=value` CLI overrides into driver parameters.
fn apply_param_overrides(params: &mut DriverParams, overrides: &[String]) -> Result<()> {
    for item in overrides {
        let Some((key, value)) = item.split_once('=') else {
            bail!("invalid driver parameter override '{}', expected key=value", item);
        };
        params.insert(key.to_string(), value.to_string());
    }
    Ok(())
}

/// Prints the ordered upgrade plan for a cluster without dispatching
/// anything.
pub fn run_plan(opts: &cli::PlanArgs) -> Result<()> {
    let manifest = config::load_manifest(opts.file.as_path())
        .with_context(|| format!("failed to load manifest from {}", opts.file))?;
    manifest.validate().context("manifest validation failed")?;

    let catalog = manifest.catalog();
    let (inventory, clusters) = manifest.build_inventory()?;
    let cluster = find_cluster(&clusters, &opts.cluster)?;
    let strategy = opts.strategy.unwrap_or(manifest.strategy);

    let plan = Planner::new(&catalog, strategy).plan(&inventory, cluster.id)?;
    info!(
        "plan for cluster {} ({} strategy): {} step(s)",
        cluster.name,
        strategy,
        plan.len()
    );
    for step in &plan {
        let hostnames: Vec<&str> = step.hosts.iter().map(|h| h.hostname.as_str()).collect();
        println!("{:3}. {} on {}", step.ordinal + 1, step.service.name, hostnames.join(", "));
    }
    Ok(())
}

/// Creates and dispatches an upgrade for a cluster from the manifest.
pub fn run_upgrade(opts: &cli::UpgradeArgs) -> Result<()> {
    let manifest = config::load_manifest(opts.file.as_path())
        .with_context(|| format!("failed to load manifest from {}", opts.file))?;
    manifest.validate().context("manifest validation failed")?;

    let catalog = manifest.catalog();
    let (inventory, clusters) = manifest.build_inventory()?;
    let cluster = find_cluster(&clusters, &opts.cluster)?.clone();
    let strategy = opts.strategy.unwrap_or(manifest.strategy);

    let driver_name = opts
        .driver
        .clone()
        .unwrap_or_else(|| manifest.driver.name.clone());
    let mut params = manifest.driver.parameters.clone();
    apply_param_overrides(&mut params, &opts.param)?;

    let manager = LifecycleManager::new(
        Arc::new(inventory),
        Arc::new(catalog),
        DriverRegistry::builtin(),
        strategy,
    );

    let dispatched = manager.create_upgrade(cluster.id, opts.to, &driver_name, params)?;
    info!(
        "upgrade {} dispatched for cluster {} ({} -> {})",
        dispatched.task.id, cluster.name, dispatched.task.from_version, dispatched.task.to_version
    );

    if opts.wait {
        match dispatched.handle.wait()? {
            Outcome::Completed(code) => info!("upgrade chain completed with code {}", code),
            Outcome::Aborted => info!("upgrade chain was aborted"),
        }
    }
    Ok(())
}

pub fn run_validate(opts: &cli::ValidateArgs) -> Result<()> {
    let manifest = config::load_manifest(opts.file.as_path())?;
    manifest.validate().context("manifest validation failed")?;
    info!("validation successful:\n{:#?}", manifest);
    Ok(())
}

pub fn run_drivers() -> Result<()> {
    for name in DriverRegistry::builtin().names() {
        println!("{}", name);
    }
    Ok(())
}
