//! Process registry: job key to active stage handles.
//!
//! The registry is service-owned and injected into the orchestrator; its
//! lifetime is the service process. Each entry tracks the currently active
//! cancellable sub-stage for one job. Stages execute strictly sequentially,
//! so at most one slot is occupied at any instant; the terminal analysis
//! stage never registers a slot and removes the entry when it exits.
//!
//! Both the orchestrator and the cancellation path treat "slot already
//! empty" as a legitimate race outcome (kill arriving after natural
//! completion), never as an error.

use ram_protocol::job_models::JobKey;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{watch, Mutex};

/// Cancellable reference to an active external process/service invocation.
///
/// `kill()` flips a watch channel the running stage task selects on; the
/// stage is responsible for propagating the signal to the external process
/// and settling its completion path.
#[derive(Debug)]
pub struct StageHandle {
    cancel: watch::Sender<bool>,
}

impl StageHandle {
    /// Create a handle and the receiver its stage task watches.
    pub fn new() -> (Self, watch::Receiver<bool>) {
        let (cancel, rx) = watch::channel(false);
        (Self { cancel }, rx)
    }

    /// Signal cancellation. Idempotent; safe after natural completion.
    pub fn kill(&self) {
        let _ = self.cancel.send(true);
    }
}

/// Which registry slot a stage occupies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageSlot {
    /// Road-network export (`export-road-network`).
    UpdateRn,
    /// Vector-tile generation (`generate-vector-tiles`).
    GenVt,
}

#[derive(Default)]
struct JobEntry {
    update_rn: Option<StageHandle>,
    gen_vt: Option<StageHandle>,
}

/// In-memory map from job key to the active sub-stage handle.
///
/// Cloning is cheap and shares the underlying map.
#[derive(Clone, Default)]
pub struct ProcessRegistry {
    jobs: Arc<Mutex<HashMap<JobKey, JobEntry>>>,
}

impl ProcessRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the handle for a stage that just started.
    pub async fn register(&self, key: JobKey, slot: StageSlot, handle: StageHandle) {
        let mut jobs = self.jobs.lock().await;
        let entry = jobs.entry(key).or_default();
        match slot {
            StageSlot::UpdateRn => entry.update_rn = Some(handle),
            StageSlot::GenVt => entry.gen_vt = Some(handle),
        }
    }

    /// Clear a slot after its stage completed. No-op when already empty.
    pub async fn clear(&self, key: JobKey, slot: StageSlot) {
        let mut jobs = self.jobs.lock().await;
        if let Some(entry) = jobs.get_mut(&key) {
            match slot {
                StageSlot::UpdateRn => entry.update_rn = None,
                StageSlot::GenVt => entry.gen_vt = None,
            }
        }
    }

    /// Take the earliest active stage handle for a key, clearing its slot.
    ///
    /// Sequential-stage precedence: `update_rn` wins over `gen_vt`. Returns
    /// `None` when neither slot is occupied (the terminal container stage,
    /// if anything, is active).
    pub async fn take_active(&self, key: JobKey) -> Option<(StageSlot, StageHandle)> {
        let mut jobs = self.jobs.lock().await;
        let entry = jobs.get_mut(&key)?;
        if let Some(handle) = entry.update_rn.take() {
            return Some((StageSlot::UpdateRn, handle));
        }
        if let Some(handle) = entry.gen_vt.take() {
            return Some((StageSlot::GenVt, handle));
        }
        None
    }

    /// Remove the entry for a key. Called when the terminal stage exits.
    pub async fn remove(&self, key: JobKey) {
        self.jobs.lock().await.remove(&key);
    }

    pub async fn contains(&self, key: JobKey) -> bool {
        self.jobs.lock().await.contains_key(&key)
    }

    /// Occupancy of the two slots, for assertions and operational tooling.
    pub async fn slot_state(&self, key: JobKey) -> (bool, bool) {
        let jobs = self.jobs.lock().await;
        match jobs.get(&key) {
            Some(entry) => (entry.update_rn.is_some(), entry.gen_vt.is_some()),
            None => (false, false),
        }
    }
}
