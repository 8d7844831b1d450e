use crate::error::{AppError, Result};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

/// Per-incident guards that refuse to wait.
///
/// A second request for an incident that already has a transition in flight
/// fails with `Conflict` instead of queueing behind it.
#[derive(Default)]
pub struct IncidentLocks {
    locks: DashMap<Uuid, Arc<Mutex<()>>>,
}

impl IncidentLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the incident or fail immediately
    pub fn try_acquire(&self, incident_id: Uuid) -> Result<IncidentGuard<'_>> {
        let lock = self
            .locks
            .entry(incident_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();

        let guard = lock.try_lock_owned().map_err(|_| {
            AppError::Conflict(format!(
                "A transition is already in progress for incident {}",
                incident_id
            ))
        })?;

        Ok(IncidentGuard {
            locks: self,
            incident_id,
            guard: Some(guard),
        })
    }

    /// Number of incidents with a live lock entry
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

/// Held for the duration of one transition request
pub struct IncidentGuard<'a> {
    locks: &'a IncidentLocks,
    incident_id: Uuid,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for IncidentGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        // Forget the entry once nobody else holds a handle to it
        self.locks
            .locks
            .remove_if(&self.incident_id, |_, lock| Arc::strong_count(lock) == 1);
    }
}
