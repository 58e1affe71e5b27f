//! Asynchronous work units, ordered chains and the dispatcher.
//!
//! A [`WorkUnit`] is one schedulable unit of remote work produced by a
//! driver. A [`Chain`] composes units in a fixed order; the
//! [`Dispatcher`] hands a chain to a dedicated worker thread and returns
//! immediately, so the caller that triggered planning never blocks on
//! execution. Within a chain units run strictly sequentially and
//! execution is fail-stop: a failing unit halts the remainder. No
//! cluster or upgrade status transition happens on failure; callers
//! observe the outcome externally.
//!
//! Cooperative cancellation flows through an [`AbortToken`] shared
//! between the handle and the running chain. The chain checks the token
//! at every unit boundary and each unit may observe it internally.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};

use anyhow::Result;
use tracing::{debug, error, info};

use crate::error::RolloutError;

/// Shared cancellation flag for a dispatched chain.
#[derive(Debug, Clone, Default)]
pub struct AbortToken(Arc<AtomicBool>);

impl AbortToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation. Idempotent.
    pub fn abort(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_aborted(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Terminal outcome of a unit or chain that did not fail.
///
/// Failure is a third terminal state, expressed as an `Err` carrying
/// [`RolloutError::Execution`] or whatever the unit raised.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The work finished; for process units this carries the exit code.
    Completed(i32),
    /// The work was cancelled via the abort token.
    Aborted,
}

/// One schedulable, awaitable unit of work.
///
/// Implementations must be `Send`; units are moved into the worker
/// thread that executes the chain. A unit may internally fan out into
/// parallel sub-work, which is the driver's concern, not the chain's.
pub trait WorkUnit: Send {
    /// Human-readable description used in logs.
    fn describe(&self) -> String;

    /// Runs the unit to completion, observing `abort` cooperatively.
    fn run(&self, abort: &AbortToken) -> Result<Outcome>;
}

/// A unit that does nothing and always succeeds.
///
/// Default return value for optional driver hooks.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopUnit;

impl WorkUnit for NoopUnit {
    fn describe(&self) -> String {
        "noop".to_string()
    }

    fn run(&self, _abort: &AbortToken) -> Result<Outcome> {
        Ok(Outcome::Completed(0))
    }
}

/// An ordered composition of work units, executed sequentially.
#[derive(Default)]
pub struct Chain {
    units: Vec<Box<dyn WorkUnit>>,
}

impl Chain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a unit; chains preserve exactly the append order.
    pub fn push(&mut self, unit: Box<dyn WorkUnit>) {
        self.units.push(unit);
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// Runs every unit in order on the current thread.
    ///
    /// Stops at the first failing unit and propagates its error, or
    /// returns [`Outcome::Aborted`] as soon as the token is observed at
    /// a unit boundary or reported by a running unit.
    pub fn execute(self, abort: &AbortToken) -> Result<Outcome> {
        let total = self.units.len();
        for (index, unit) in self.units.into_iter().enumerate() {
            if abort.is_aborted() {
                info!("chain aborted before unit {}/{}", index + 1, total);
                return Ok(Outcome::Aborted);
            }

            debug!("running unit {}/{}: {}", index + 1, total, unit.describe());
            match unit.run(abort) {
                Ok(Outcome::Completed(code)) => {
                    debug!("unit {}/{} completed with code {}", index + 1, total, code);
                }
                Ok(Outcome::Aborted) => {
                    info!("unit {}/{} aborted, halting chain", index + 1, total);
                    return Ok(Outcome::Aborted);
                }
                Err(e) => {
                    error!(
                        "unit {}/{} failed, halting chain: {}: {:#}",
                        index + 1,
                        total,
                        unit.describe(),
                        e
                    );
                    return Err(e);
                }
            }
        }
        Ok(Outcome::Completed(0))
    }
}

/// Handle to a dispatched chain.
///
/// Dropping the handle detaches the worker; the chain keeps running.
#[derive(Debug)]
pub struct ChainHandle {
    token: AbortToken,
    handle: JoinHandle<Result<Outcome>>,
}

impl ChainHandle {
    /// Requests cooperative cancellation of the running chain.
    pub fn abort(&self) {
        self.token.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Blocks until the chain finishes and returns its outcome.
    pub fn wait(self) -> Result<Outcome> {
        match self.handle.join() {
            Ok(result) => result,
            Err(_) => Err(RolloutError::Execution {
                command: "upgrade chain".to_string(),
                status: "worker thread panicked".to_string(),
            }
            .into()),
        }
    }
}

/// Submits chains to worker threads, fire-and-forget.
#[derive(Debug, Clone, Copy, Default)]
pub struct Dispatcher;

impl Dispatcher {
    pub fn new() -> Self {
        Self
    }

    /// Spawns a named worker thread that executes the chain and returns
    /// immediately with a handle for abort/wait.
    pub fn dispatch(&self, chain: Chain) -> Result<ChainHandle, RolloutError> {
        let token = AbortToken::new();
        let worker_token = token.clone();
        let units = chain.len();

        let handle = thread::Builder::new()
            .name("upgrade-chain".to_string())
            .spawn(move || {
                info!("upgrade chain started ({} unit(s))", units);
                let result = chain.execute(&worker_token);
                match &result {
                    Ok(outcome) => info!("upgrade chain finished: {:?}", outcome),
                    Err(e) => error!("upgrade chain failed: {:#}", e),
                }
                result
            })
            .map_err(|e| RolloutError::io("failed to spawn upgrade chain worker", e))?;

        Ok(ChainHandle { token, handle })
    }
}
