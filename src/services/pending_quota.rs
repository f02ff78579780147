//! Instant-model installs that were accepted but have not finished yet.
//!
//! Quota checks count pending installs and reserve atomically, so two
//! concurrent requests cannot both fit into the same free space. Entries are keyed by the sync task
//! that owns them and removed when that task ends, whatever its outcome.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::domain::errors::{DomainError, DomainResult};

#[derive(Debug, Clone, PartialEq)]
struct PendingEntry {
    llm_id: String,
    size_gb: f64,
}

#[derive(Debug, Clone, Default)]
pub struct PendingQuotaLedger {
    entries: Arc<Mutex<HashMap<String, PendingEntry>>>,
}

impl PendingQuotaLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, PendingEntry>> {
        // A panic while holding the lock leaves the map itself consistent.
        self.entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    pub fn insert(&self, task_id: &str, llm_id: &str, size_gb: f64) {
        self.lock().insert(
            task_id.to_string(),
            PendingEntry {
                llm_id: llm_id.to_string(),
                size_gb,
            },
        );
    }

    /// Drop the entry of a finished task. Returns the released size.
    pub fn remove(&self, task_id: &str) -> Option<f64> {
        self.lock().remove(task_id).map(|e| e.size_gb)
    }

    pub fn pending_gb(&self, llm_id: &str) -> f64 {
        pending_in(&self.lock(), llm_id)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Reserve `to_install_gb` under `reservation_id` if it fits into
    /// `quota_gb` next to what is installed and pending. The check and the
    /// insert happen under one lock. A quota of zero means unlimited and
    /// reserves nothing.
    pub fn try_reserve(
        &self,
        reservation_id: &str,
        llm_id: &str,
        quota_gb: i64,
        installed_gb: f64,
        to_install_gb: f64,
    ) -> DomainResult<()> {
        if quota_gb <= 0 {
            return Ok(());
        }
        let mut entries = self.lock();
        let pending = pending_in(&entries, llm_id);
        check_fits(quota_gb, installed_gb, pending, to_install_gb)?;
        entries.insert(
            reservation_id.to_string(),
            PendingEntry {
                llm_id: llm_id.to_string(),
                size_gb: to_install_gb,
            },
        );
        Ok(())
    }

    /// Check a held reservation against a fresh `installed_gb` reading.
    ///
    /// A sync task records its models as installed before it releases its
    /// entry, so a reading taken after the reservation sees every finished
    /// install. On rejection the reservation is released.
    pub fn confirm(&self, reservation_id: &str, llm_id: &str, quota_gb: i64, installed_gb: f64) -> DomainResult<()> {
        if quota_gb <= 0 {
            return Ok(());
        }
        let mut entries = self.lock();
        let Some(own) = entries.get(reservation_id).map(|e| e.size_gb) else {
            return Ok(());
        };
        let others = pending_in(&entries, llm_id) - own;
        if let Err(err) = check_fits(quota_gb, installed_gb, others, own) {
            entries.remove(reservation_id);
            return Err(err);
        }
        Ok(())
    }

    /// Move an entry to a new key, usually the id of the task that owns it.
    pub fn rekey(&self, from: &str, to: &str) {
        let mut entries = self.lock();
        if let Some(entry) = entries.remove(from) {
            entries.insert(to.to_string(), entry);
        }
    }
}

fn pending_in(entries: &HashMap<String, PendingEntry>, llm_id: &str) -> f64 {
    entries
        .values()
        .filter(|e| e.llm_id == llm_id)
        .map(|e| e.size_gb)
        .sum()
}

fn check_fits(quota_gb: i64, installed_gb: f64, pending_gb: f64, to_install_gb: f64) -> DomainResult<()> {
    #[allow(clippy::cast_precision_loss)]
    let quota = quota_gb as f64;
    if to_install_gb > quota - (installed_gb + pending_gb) {
        return Err(DomainError::OutOfQuota(format!(
            "instant model quota {quota_gb}GB: installed {installed_gb:.2}GB, pending {pending_gb:.2}GB, requested {to_install_gb:.2}GB"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pending_per_llm() {
        let ledger = PendingQuotaLedger::new();
        ledger.insert("t1", "llm-a", 2.0);
        ledger.insert("t2", "llm-a", 1.5);
        ledger.insert("t3", "llm-b", 4.0);

        assert!((ledger.pending_gb("llm-a") - 3.5).abs() < f64::EPSILON);
        assert_eq!(ledger.remove("t1"), Some(2.0));
        assert_eq!(ledger.remove("t1"), None);
        assert!((ledger.pending_gb("llm-a") - 1.5).abs() < f64::EPSILON);
        assert_eq!(ledger.len(), 2);
    }

    #[test]
    fn test_reserve_counts_pending() {
        let ledger = PendingQuotaLedger::new();
        ledger.try_reserve("r1", "llm-a", 10, 6.0, 3.0).unwrap();
        assert!((ledger.pending_gb("llm-a") - 3.0).abs() < f64::EPSILON);

        let err = ledger.try_reserve("r2", "llm-a", 10, 6.0, 2.0).unwrap_err();
        assert!(matches!(err, DomainError::OutOfQuota(_)));
        assert_eq!(ledger.len(), 1, "rejected request must not reserve");

        ledger.try_reserve("r3", "llm-a", 0, 600.0, 200.0).unwrap();
        assert_eq!(ledger.len(), 1, "unlimited quota reserves nothing");
    }

    #[test]
    fn test_confirm_releases_on_stale_reading() {
        let ledger = PendingQuotaLedger::new();
        ledger.try_reserve("r1", "llm-a", 10, 0.0, 6.0).unwrap();
        ledger.confirm("r1", "llm-a", 10, 4.0).unwrap();

        // Another install finished between the two readings.
        let err = ledger.confirm("r1", "llm-a", 10, 6.0).unwrap_err();
        assert!(matches!(err, DomainError::OutOfQuota(_)));
        assert!(ledger.is_empty());
    }

    #[test]
    fn test_rekey_moves_entry() {
        let ledger = PendingQuotaLedger::new();
        ledger.try_reserve("r1", "llm-a", 10, 0.0, 2.0).unwrap();
        ledger.rekey("r1", "task-1");
        assert_eq!(ledger.remove("r1"), None);
        assert_eq!(ledger.remove("task-1"), Some(2.0));
    }

    #[tokio::test]
    async fn test_concurrent_reservations_never_exceed_quota() {
        let ledger = PendingQuotaLedger::new();
        let handles: Vec<_> = (0..16)
            .map(|i| {
                let ledger = ledger.clone();
                tokio::spawn(async move { ledger.try_reserve(&format!("r{i}"), "llm", 10, 0.0, 3.0).is_ok() })
            })
            .collect();
        let mut accepted = 0;
        for handle in handles {
            if handle.await.unwrap() {
                accepted += 1;
            }
        }
        assert_eq!(accepted, 3);
        assert!((ledger.pending_gb("llm") - 9.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_concurrent_inserts() {
        let ledger = PendingQuotaLedger::new();
        let handles: Vec<_> = (0..16)
            .map(|i| {
                let ledger = ledger.clone();
                tokio::spawn(async move { ledger.insert(&format!("t{i}"), "llm", 1.0) })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(ledger.len(), 16);
        assert!((ledger.pending_gb("llm") - 16.0).abs() < f64::EPSILON);
    }
}
