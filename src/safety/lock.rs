//! Persistent trading lock (circuit breaker).
//!
//! The lock lives in the safety store and survives restarts. Reads fail
//! CLOSED: if the store cannot be read, or the stored record cannot be
//! parsed, the lock reports ENGAGED with a diagnostic reason. A broken
//! safety store must never let orders through.

use std::sync::Arc;
use tracing::{error, info, warn};

use crate::context::TimeProvider;
use crate::model::LockRecord;
use crate::persistence::store::{KvStore, StoreError};

pub const LOCK_KEY: &str = "trading_lock";

/// Observed state of the trading lock.
#[derive(Debug, Clone, PartialEq)]
pub enum LockStatus {
    Clear,
    Engaged(LockRecord),
}

impl LockStatus {
    pub fn is_engaged(&self) -> bool {
        matches!(self, LockStatus::Engaged(_))
    }
}

#[derive(Clone)]
pub struct TradingLock {
    store: Arc<dyn KvStore>,
    clock: Arc<dyn TimeProvider>,
}

impl TradingLock {
    pub fn new(store: Arc<dyn KvStore>, clock: Arc<dyn TimeProvider>) -> Self {
        Self { store, clock }
    }

    /// Engage the lock and persist the record before returning.
    pub fn engage(&self, reason: &str, locked_by: &str) -> Result<LockRecord, StoreError> {
        let record = LockRecord {
            reason: reason.to_string(),
            timestamp: self.clock.now(),
            locked_by: locked_by.to_string(),
        };
        let bytes = serde_json::to_vec(&record)?;
        self.store.put(LOCK_KEY, &bytes)?;
        warn!("🚨 TRADING LOCKED by {}: {}", locked_by, reason);
        Ok(record)
    }

    /// Current lock state. Any read or parse failure reports ENGAGED.
    pub fn status(&self) -> LockStatus {
        match self.store.get(LOCK_KEY) {
            Ok(None) => LockStatus::Clear,
            Ok(Some(bytes)) => match serde_json::from_slice::<LockRecord>(&bytes) {
                Ok(record) => LockStatus::Engaged(record),
                Err(e) => {
                    error!("Trading lock record unreadable, treating as engaged: {}", e);
                    LockStatus::Engaged(LockRecord {
                        reason: format!("Lock record unreadable: {}", e),
                        timestamp: self.clock.now(),
                        locked_by: "fail-closed".to_string(),
                    })
                }
            },
            Err(e) => {
                error!("Safety store unavailable, treating as engaged: {}", e);
                LockStatus::Engaged(LockRecord {
                    reason: format!("Safety store unavailable: {}", e),
                    timestamp: self.clock.now(),
                    locked_by: "fail-closed".to_string(),
                })
            }
        }
    }

    /// Manual clear. Only reachable through the operator surfaces.
    pub fn clear(&self, cleared_by: &str) -> Result<(), StoreError> {
        self.store.delete(LOCK_KEY)?;
        info!("✅ Trading lock cleared by {}", cleared_by);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::SimulatedTimeProvider;
    use crate::persistence::store::MemoryStore;

    fn lock_over(store: Arc<MemoryStore>) -> TradingLock {
        let clock = Arc::new(SimulatedTimeProvider::new(1_700_000_000_000));
        TradingLock::new(store, clock)
    }

    #[test]
    fn engage_then_status_then_clear() {
        let store = Arc::new(MemoryStore::new());
        let lock = lock_over(store);

        assert_eq!(lock.status(), LockStatus::Clear);

        lock.engage("verification mismatch on ticket 42", "position_verifier")
            .unwrap();
        match lock.status() {
            LockStatus::Engaged(record) => {
                assert_eq!(record.locked_by, "position_verifier");
                assert!(record.reason.contains("ticket 42"));
            }
            LockStatus::Clear => panic!("lock should be engaged"),
        }

        lock.clear("operator").unwrap();
        assert_eq!(lock.status(), LockStatus::Clear);
    }

    #[test]
    fn unreadable_store_reports_engaged() {
        let store = Arc::new(MemoryStore::new());
        let lock = lock_over(store.clone());

        store.poison_reads(true);
        let status = lock.status();
        assert!(status.is_engaged(), "store failure must fail closed");
    }

    #[test]
    fn corrupt_record_reports_engaged() {
        let store = Arc::new(MemoryStore::new());
        store.put(LOCK_KEY, b"{not json").unwrap();
        let lock = lock_over(store);
        assert!(lock.status().is_engaged());
    }

    #[test]
    fn lock_survives_reopen() {
        let store = Arc::new(MemoryStore::new());
        lock_over(store.clone())
            .engage("test crash", "test")
            .unwrap();

        // A fresh TradingLock over the same store sees the record.
        let reopened = lock_over(store);
        assert!(reopened.status().is_engaged());
    }
}
