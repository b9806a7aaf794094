//! Shared registry of tracked masters and workers.
//!
//! Each map is guarded by its own lock. Readers clone the `Arc`s out and
//! release the lock before touching the filesystem, so descriptor I/O never
//! runs under a registry lock.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use fileinstall_config::CheckFlags;
use fileinstall_core::Workspace;
use tracing::{debug, warn};

use crate::master::MasterState;
use crate::worker::WorkerState;

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Default)]
pub struct Registry {
    masters: RwLock<HashMap<String, Arc<MasterState>>>,
    workers: RwLock<HashMap<String, Arc<WorkerState>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    // ---------------------------------------------------------------------
    // Masters
    // ---------------------------------------------------------------------

    pub fn master(&self, name: &str) -> Option<Arc<MasterState>> {
        read(&self.masters).get(name).cloned()
    }

    /// Look up a master, inserting the result of `make` if absent.
    ///
    /// The returned flag is true if a new entry was inserted.
    pub fn master_or_insert(
        &self,
        name: &str,
        make: impl FnOnce() -> MasterState,
    ) -> (Arc<MasterState>, bool) {
        let mut masters = write(&self.masters);
        if let Some(existing) = masters.get(name) {
            return (Arc::clone(existing), false);
        }
        let master = Arc::new(make());
        masters.insert(name.to_string(), Arc::clone(&master));
        (master, true)
    }

    pub fn remove_master(&self, name: &str) -> Option<Arc<MasterState>> {
        write(&self.masters).remove(name)
    }

    /// All tracked masters, ordered by name.
    pub fn masters(&self) -> Vec<Arc<MasterState>> {
        let mut masters: Vec<_> = read(&self.masters).values().cloned().collect();
        masters.sort_by(|a, b| a.name().cmp(b.name()));
        masters
    }

    /// Masters whose configuration declares `worker`.
    pub fn masters_requiring(&self, worker: &str) -> Vec<Arc<MasterState>> {
        self.masters()
            .into_iter()
            .filter(|m| m.requires(worker))
            .collect()
    }

    /// Does any tracked master declare `worker`?
    pub fn is_worker_required(&self, worker: &str) -> bool {
        self.masters().iter().any(|m| m.requires(worker))
    }

    /// Check flags of all tracked masters, OR-combined.
    ///
    /// Masters whose configuration cannot be loaded contribute nothing.
    pub fn check_flags(&self) -> CheckFlags {
        let masters = self.masters();
        let flags: Vec<CheckFlags> = masters
            .iter()
            .filter_map(|m| m.conf().ok().map(|c| c.checks))
            .collect();
        CheckFlags::any_of(&flags)
    }

    // ---------------------------------------------------------------------
    // Workers
    // ---------------------------------------------------------------------

    pub fn worker(&self, name: &str) -> Option<Arc<WorkerState>> {
        read(&self.workers).get(name).cloned()
    }

    /// Look up a worker, inserting a fresh unobserved one if absent.
    ///
    /// The returned flag is true if a new entry was inserted.
    pub fn worker_or_insert(&self, name: &str) -> (Arc<WorkerState>, bool) {
        let mut workers = write(&self.workers);
        if let Some(existing) = workers.get(name) {
            return (Arc::clone(existing), false);
        }
        let worker = Arc::new(WorkerState::new(name));
        workers.insert(name.to_string(), Arc::clone(&worker));
        (worker, true)
    }

    pub fn remove_worker(&self, name: &str) -> Option<Arc<WorkerState>> {
        write(&self.workers).remove(name)
    }

    pub fn has_worker(&self, name: &str) -> bool {
        read(&self.workers).contains_key(name)
    }

    /// All tracked workers, ordered by name.
    pub fn workers(&self) -> Vec<Arc<WorkerState>> {
        let mut workers: Vec<_> = read(&self.workers).values().cloned().collect();
        workers.sort_by(|a, b| a.name().cmp(b.name()));
        workers
    }

    /// Forget every master and worker.
    pub fn clear(&self) {
        write(&self.masters).clear();
        write(&self.workers).clear();
    }

    // ---------------------------------------------------------------------
    // Fan-out
    // ---------------------------------------------------------------------

    /// Create the descriptor for `worker` in every master requiring it.
    ///
    /// Returns the number of masters that matched, whether or not the write
    /// succeeded.
    pub fn activate_worker(&self, workspace: &dyn Workspace, worker: &str) -> usize {
        let masters = self.masters_requiring(worker);
        for master in &masters {
            if let Err(e) = master.create_descriptor(workspace, worker) {
                warn!("{}", e);
            }
        }
        debug!(worker, masters = masters.len(), "worker activated");
        masters.len()
    }

    /// Delete the descriptor for `worker` in every master requiring it.
    ///
    /// Returns the number of masters that matched.
    pub fn deactivate_worker(&self, workspace: &dyn Workspace, worker: &str) -> usize {
        let masters = self.masters_requiring(worker);
        for master in &masters {
            if let Err(e) = master.delete_descriptor(workspace, worker) {
                warn!("{}", e);
            }
        }
        debug!(worker, masters = masters.len(), "worker deactivated");
        masters.len()
    }
}
