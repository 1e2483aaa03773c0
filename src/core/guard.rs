//! In-progress flags for price fetches and ledger mutations.
//!
//! Both guards reject rather than queue: a second caller is told the work is
//! already running and is expected to drop its request.

use crate::core::asset::AssetType;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Single "fetch in progress" flag owned by one acquisition pipeline.
#[derive(Debug, Default)]
pub struct FetchLock {
    in_flight: AtomicBool,
}

/// Clears the fetch flag when dropped, including on error or cancellation.
#[derive(Debug)]
pub struct FetchPermit<'a> {
    lock: &'a FetchLock,
}

impl FetchLock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn try_acquire(&self) -> Option<FetchPermit<'_>> {
        self.in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| FetchPermit { lock: self })
    }

    pub fn is_held(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }
}

impl Drop for FetchPermit<'_> {
    fn drop(&mut self) {
        self.lock.in_flight.store(false, Ordering::Release);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    Append,
    SetTotal,
    RemoveLot,
    Reset,
}

/// Lock key: operation kind plus the asset it touches, when it touches one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OperationKey {
    pub kind: OperationKind,
    pub asset: Option<AssetType>,
}

impl OperationKey {
    pub fn new(kind: OperationKind, asset: Option<AssetType>) -> Self {
        Self { kind, asset }
    }
}

/// Set of ledger operations currently settling.
#[derive(Debug, Clone, Default)]
pub struct OperationLocks {
    held: Arc<Mutex<HashSet<OperationKey>>>,
}

/// Releases its operation key when dropped. Owned, so it can travel with a
/// background persistence job.
#[derive(Debug)]
pub struct OperationPermit {
    key: OperationKey,
    held: Arc<Mutex<HashSet<OperationKey>>>,
}

impl OperationLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn try_lock(&self, key: OperationKey) -> Option<OperationPermit> {
        let mut held = self.held.lock().unwrap_or_else(|e| e.into_inner());
        if !held.insert(key) {
            debug!(?key, "Operation already in progress, dropping duplicate");
            return None;
        }
        Some(OperationPermit {
            key,
            held: Arc::clone(&self.held),
        })
    }

    #[cfg(test)]
    pub(crate) fn is_locked(&self, key: OperationKey) -> bool {
        self.held
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(&key)
    }
}

impl Drop for OperationPermit {
    fn drop(&mut self) {
        let mut held = self.held.lock().unwrap_or_else(|e| e.into_inner());
        held.remove(&self.key);
    }
}
