//! Per-symbol cooldown between confirmed position closes.
//!
//! A symbol that closed a position within the cooldown window may not admit
//! a new order. Timestamps persist in the safety store so the window
//! survives restarts; an uninitialized symbol has no cooldown.

use std::sync::Arc;
use tracing::debug;

use crate::context::TimeProvider;
use crate::persistence::store::{KvStore, StoreError};

fn cooldown_key(symbol: &str) -> String {
    format!("cooldown/{}", symbol.to_uppercase())
}

#[derive(Clone)]
pub struct CooldownTracker {
    store: Arc<dyn KvStore>,
    clock: Arc<dyn TimeProvider>,
    window_ms: i64,
}

impl CooldownTracker {
    pub fn new(store: Arc<dyn KvStore>, clock: Arc<dyn TimeProvider>, window_minutes: u64) -> Self {
        Self {
            store,
            clock,
            window_ms: (window_minutes as i64) * 60_000,
        }
    }

    /// Record a confirmed close for `symbol` at the current time.
    pub fn record_close(&self, symbol: &str) -> Result<(), StoreError> {
        let now = self.clock.now_millis();
        self.store
            .put(&cooldown_key(symbol), now.to_string().as_bytes())?;
        debug!("Cooldown started for {} at {}ms", symbol, now);
        Ok(())
    }

    /// Milliseconds left in the window, or `None` when the symbol is free.
    /// A close recorded exactly `window` ago is outside the window.
    pub fn remaining(&self, symbol: &str) -> Result<Option<i64>, StoreError> {
        let bytes = match self.store.get(&cooldown_key(symbol))? {
            Some(bytes) => bytes,
            None => return Ok(None),
        };

        let text = std::str::from_utf8(&bytes)
            .map_err(|e| StoreError::Io(format!("Corrupt cooldown record: {}", e)))?;
        let closed_at: i64 = text
            .parse()
            .map_err(|e| StoreError::Io(format!("Corrupt cooldown record: {}", e)))?;

        let elapsed = self.clock.now_millis() - closed_at;
        if elapsed >= self.window_ms {
            Ok(None)
        } else {
            Ok(Some(self.window_ms - elapsed))
        }
    }
}
