//! In-memory scan registry.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use postpulse_core::Scan;

/// `scan id → Scan`, shared by every scan task. Each scan is only mutated by
/// the task that owns its id.
#[derive(Debug, Default)]
pub struct ScanRegistry {
    scans: Mutex<HashMap<String, Scan>>,
}

impl ScanRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, scan: Scan) {
        self.lock().insert(scan.id.clone(), scan);
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<Scan> {
        self.lock().get(id).cloned()
    }

    /// Applies `transition` to the scan under `id`. Returns the updated scan
    /// only if `transition` reports that it changed state.
    pub fn transition(&self, id: &str, transition: impl FnOnce(&mut Scan) -> bool) -> Option<Scan> {
        let mut scans = self.lock();
        let scan = scans.get_mut(id)?;
        transition(scan).then(|| scan.clone())
    }

    /// Drops scans created before `cutoff`. Returns how many were removed.
    pub fn sweep(&self, cutoff: DateTime<Utc>) -> usize {
        let mut scans = self.lock();
        let before = scans.len();
        scans.retain(|_, scan| scan.created_at >= cutoff);
        before - scans.len()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Scan>> {
        self.scans
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}
