//! Last-resort escalation path.
//!
//! A critical failure means the system can no longer prove what the broker
//! holds (an unverifiable fill, an unclosable position, a fatal retcode).
//! The handler engages the persistent trading lock, then terminates the
//! process with a non-zero exit code so the supervisor restarts it into a
//! locked state.

use std::sync::Arc;
use tracing::error;

use crate::error::TradeError;
use crate::metrics;
use crate::safety::lock::TradingLock;

/// Process termination seam. Production exits; tests record.
pub trait ProcessExit: Send + Sync {
    fn exit(&self, code: i32);
}

pub struct SystemExit;

impl ProcessExit for SystemExit {
    fn exit(&self, code: i32) {
        std::process::exit(code);
    }
}

#[derive(Clone)]
pub struct CriticalFailureHandler {
    lock: TradingLock,
    exit: Arc<dyn ProcessExit>,
}

impl CriticalFailureHandler {
    pub fn new(lock: TradingLock, exit: Arc<dyn ProcessExit>) -> Self {
        Self { lock, exit }
    }

    /// Engage the lock and terminate. Lock persistence is best-effort here:
    /// even if the store write fails we still exit, and the next startup
    /// fails closed on the unreadable store.
    ///
    /// Returns only when the exit seam is a test double; production never
    /// comes back from this call.
    pub fn escalate(&self, source: &str, reason: &str) -> TradeError {
        error!("💥 CRITICAL FAILURE in {}: {}", source, reason);
        metrics::record_critical_failure(source);

        if let Err(e) = self.lock.engage(reason, source) {
            error!("Failed to persist trading lock during escalation: {}", e);
        }

        self.exit.exit(1);
        TradeError::Critical(format!("{}: {}", source, reason))
    }
}
