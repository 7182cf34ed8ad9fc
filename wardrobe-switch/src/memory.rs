//! In-memory [`SnapshotStore`] with an operation log.
//!
//! Nothing is persisted across restarts. Useful for tests and for servers that
//! only need per-session separation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;

use wardrobe_core::{Snapshot, SnapshotKey};

use crate::error::StoreError;
use crate::ports::SnapshotStore;

/// One recorded store call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreOp {
    Load(SnapshotKey),
    Save(SnapshotKey),
    Delete(SnapshotKey),
}

#[derive(Default)]
pub struct MemorySnapshotStore {
    snapshots: DashMap<SnapshotKey, Snapshot>,
    log: Mutex<Vec<StoreOp>>,
    latency: Option<Duration>,
    failing: AtomicBool,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every call sleeps for `latency` before completing.
    pub fn with_latency(latency: Duration) -> Self {
        Self { latency: Some(latency), ..Self::default() }
    }

    /// While set, every call fails with [`StoreError::Unavailable`].
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Insert without recording a call.
    pub fn seed(&self, snapshot: Snapshot) {
        self.snapshots.insert(snapshot.key(), snapshot);
    }

    pub fn get(&self, key: &SnapshotKey) -> Option<Snapshot> {
        self.snapshots.get(key).map(|s| s.clone())
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    /// Calls made so far, oldest first.
    pub fn ops(&self) -> Vec<StoreOp> {
        self.log.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn call_count(&self) -> usize {
        self.log.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    async fn begin(&self, op: StoreOp) -> Result<(), StoreError> {
        self.log.lock().unwrap_or_else(PoisonError::into_inner).push(op);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store set to fail".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl SnapshotStore for MemorySnapshotStore {
    async fn load(&self, key: &SnapshotKey) -> Result<Option<Snapshot>, StoreError> {
        self.begin(StoreOp::Load(key.clone())).await?;
        Ok(self.get(key))
    }

    async fn save(&self, snapshot: &Snapshot) -> Result<bool, StoreError> {
        self.begin(StoreOp::Save(snapshot.key())).await?;
        self.snapshots.insert(snapshot.key(), snapshot.clone());
        Ok(true)
    }

    async fn delete(&self, key: &SnapshotKey) -> Result<bool, StoreError> {
        self.begin(StoreOp::Delete(key.clone())).await?;
        Ok(self.snapshots.remove(key).is_some())
    }
}
