//! Registry of running job instances.
//!
//! The registry is the only live record of which instances are running. It
//! is shared by every executor and every cancel request, so all access goes
//! through one mutex. The lock is never held across an `.await`.
//!
//! Capacity is enforced in two steps: a launch first takes a [`Reservation`]
//! (atomically checking the limit against registered *and* reserved slots),
//! and only converts it into a registered entry once its process has started.
//! Dropping either guard gives the slot back, so every early return releases
//! capacity without explicit cleanup.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::types::{InstanceId, Timestamp};

/// A running job instance as seen by the registry.
#[derive(Debug, Clone, Serialize)]
pub struct RunningJob {
    pub instance_id: InstanceId,
    pub tag: String,
    pub workdir: PathBuf,
    pub started_at: Timestamp,
    /// Fires to terminate the instance's process.
    #[serde(skip)]
    pub cancel: CancellationToken,
}

/// Result of a cancel request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum CancelOutcome {
    Cancelled,
    NotFound,
}

#[derive(Debug, Default)]
struct Slots {
    entries: HashMap<InstanceId, RunningJob>,
    reserved: usize,
    /// Instance ids picked by reservations that are not registered yet.
    claimed: HashSet<InstanceId>,
}

impl Slots {
    fn occupied(&self) -> usize {
        self.entries.len() + self.reserved
    }
}

/// Concurrency-limited map of instance id to running job.
#[derive(Debug)]
pub struct JobRegistry {
    limit: usize,
    slots: Mutex<Slots>,
}

impl JobRegistry {
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            slots: Mutex::new(Slots::default()),
        }
    }

    fn slots(&self) -> MutexGuard<'_, Slots> {
        // No invariant spans a panic point inside the critical sections.
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Maximum number of concurrently registered instances.
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Claim one slot for a launch in progress, or `None` when the limit is
    /// already reached.
    pub fn reserve(self: &Arc<Self>) -> Option<Reservation> {
        let mut slots = self.slots();
        if slots.occupied() >= self.limit {
            return None;
        }
        slots.reserved += 1;
        Some(Reservation {
            registry: Arc::clone(self),
            active: true,
            claimed: None,
        })
    }

    /// Insert an entry directly, without a prior reservation.
    ///
    /// Returns `false`, leaving the registry untouched, when the limit is
    /// already reached.
    pub fn register(&self, job: RunningJob) -> bool {
        let mut slots = self.slots();
        if slots.occupied() >= self.limit {
            return false;
        }
        slots.entries.insert(job.instance_id.clone(), job);
        true
    }

    pub fn lookup(&self, instance_id: &str) -> Option<RunningJob> {
        self.slots().entries.get(instance_id).cloned()
    }

    /// Fire the cancellation handle of a registered instance.
    ///
    /// Does not wait for the process to exit and does not remove the entry;
    /// the owning executor unregisters it once the process has been reaped.
    /// Cancelling an already-cancelled instance is harmless.
    pub fn cancel(&self, instance_id: &str) -> CancelOutcome {
        let token = self
            .slots()
            .entries
            .get(instance_id)
            .map(|job| job.cancel.clone());
        match token {
            Some(token) => {
                token.cancel();
                CancelOutcome::Cancelled
            }
            None => CancelOutcome::NotFound,
        }
    }

    /// Remove an entry. A missing entry is not an error.
    pub fn unregister(&self, instance_id: &str) -> Option<RunningJob> {
        self.slots().entries.remove(instance_id)
    }

    /// Number of registered (started) instances.
    pub fn len(&self) -> usize {
        self.slots().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All registered instances, oldest first.
    pub fn snapshot(&self) -> Vec<RunningJob> {
        let mut jobs: Vec<RunningJob> = self.slots().entries.values().cloned().collect();
        jobs.sort_by(|a, b| {
            a.started_at
                .cmp(&b.started_at)
                .then_with(|| a.instance_id.cmp(&b.instance_id))
        });
        jobs
    }
}

/// A claimed but not yet registered slot. Released on drop.
#[derive(Debug)]
pub struct Reservation {
    registry: Arc<JobRegistry>,
    active: bool,
    claimed: Option<InstanceId>,
}

impl Reservation {
    /// Claim `instance_id` for this launch. Fails when the id is registered
    /// or claimed by another reservation. A new claim replaces the previous
    /// one.
    pub fn claim_id(&mut self, instance_id: &str) -> bool {
        let mut slots = self.registry.slots();
        if slots.entries.contains_key(instance_id) || slots.claimed.contains(instance_id) {
            return false;
        }
        if let Some(previous) = self.claimed.take() {
            slots.claimed.remove(&previous);
        }
        slots.claimed.insert(instance_id.to_string());
        self.claimed = Some(instance_id.to_string());
        true
    }

    /// Turn the reserved slot into a registered entry.
    pub fn register(mut self, job: RunningJob) -> Registration {
        let instance_id = job.instance_id.clone();
        {
            let mut slots = self.registry.slots();
            slots.reserved -= 1;
            if let Some(claimed) = self.claimed.take() {
                slots.claimed.remove(&claimed);
            }
            slots.entries.insert(instance_id.clone(), job);
        }
        self.active = false;
        Registration {
            registry: Arc::clone(&self.registry),
            instance_id,
        }
    }
}

impl Drop for Reservation {
    fn drop(&mut self) {
        if self.active {
            let mut slots = self.registry.slots();
            slots.reserved -= 1;
            if let Some(claimed) = self.claimed.take() {
                slots.claimed.remove(&claimed);
            }
        }
    }
}

/// Ownership of a registered entry. Unregisters it on drop.
#[derive(Debug)]
pub struct Registration {
    registry: Arc<JobRegistry>,
    instance_id: InstanceId,
}

impl Registration {
    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.registry.unregister(&self.instance_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(id: &str) -> RunningJob {
        RunningJob {
            instance_id: id.to_string(),
            tag: "build".to_string(),
            workdir: PathBuf::from(format!("/tmp/bacillus__build_{id}")),
            started_at: chrono::Utc::now(),
            cancel: CancellationToken::new(),
        }
    }

    #[test]
    fn register_fails_silently_at_limit() {
        let registry = JobRegistry::new(2);
        assert!(registry.register(job("1")));
        assert!(registry.register(job("2")));
        assert!(!registry.register(job("3")));
        assert_eq!(registry.len(), 2);
        assert!(registry.lookup("3").is_none());
    }

    #[test]
    fn reservations_count_against_the_limit() {
        let registry = Arc::new(JobRegistry::new(2));
        let first = registry.reserve().expect("slot");
        let _second = registry.reserve().expect("slot");
        assert!(registry.reserve().is_none());
        assert!(!registry.register(job("x")));
        assert_eq!(registry.len(), 0);

        drop(first);
        let third = registry.reserve().expect("released slot is reusable");
        let registration = third.register(job("7"));
        assert_eq!(registration.instance_id(), "7");
        assert_eq!(registry.len(), 1);
        assert!(registry.reserve().is_none());
    }

    #[test]
    fn instance_ids_are_claimed_once() {
        let registry = Arc::new(JobRegistry::new(4));
        let mut first = registry.reserve().unwrap();
        let mut second = registry.reserve().unwrap();

        assert!(first.claim_id("7"));
        assert!(!second.claim_id("7"));
        let _registration = first.register(job("7"));
        assert!(!second.claim_id("7"));
        assert!(second.claim_id("8"));

        let mut third = registry.reserve().unwrap();
        assert!(!third.claim_id("8"));
        drop(second);
        assert!(third.claim_id("8"));
    }

    #[test]
    fn dropping_registration_unregisters() {
        let registry = Arc::new(JobRegistry::new(1));
        let registration = registry.reserve().unwrap().register(job("42"));
        assert!(registry.lookup("42").is_some());
        drop(registration);
        assert!(registry.lookup("42").is_none());
        assert!(registry.is_empty());
        assert!(registry.reserve().is_some());
    }

    #[test]
    fn cancel_fires_token_without_removing_entry() {
        let registry = JobRegistry::new(4);
        let j = job("5");
        let token = j.cancel.clone();
        registry.register(j);

        assert_eq!(registry.cancel("5"), CancelOutcome::Cancelled);
        assert!(token.is_cancelled());
        assert!(registry.lookup("5").is_some());

        // Idempotent.
        assert_eq!(registry.cancel("5"), CancelOutcome::Cancelled);
        assert_eq!(registry.cancel("nope"), CancelOutcome::NotFound);
    }

    #[test]
    fn cancel_after_unregister_is_a_noop() {
        let registry = JobRegistry::new(4);
        registry.register(job("9"));
        assert_eq!(registry.cancel("9"), CancelOutcome::Cancelled);
        assert!(registry.unregister("9").is_some());
        assert!(registry.unregister("9").is_none());
        assert_eq!(registry.cancel("9"), CancelOutcome::NotFound);
    }

    #[test]
    fn concurrent_reservations_never_overshoot() {
        let registry = Arc::new(JobRegistry::new(8));
        let handles: Vec<_> = (0..32)
            .map(|i| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || {
                    registry
                        .reserve()
                        .map(|r| r.register(job(&i.to_string())))
                })
            })
            .collect();
        let held: Vec<Registration> = handles
            .into_iter()
            .filter_map(|h| h.join().unwrap())
            .collect();
        assert_eq!(held.len(), 8);
        assert_eq!(registry.len(), 8);
        assert_eq!(registry.snapshot().len(), 8);
    }
}
