//! Admission guard: every order intent passes these gates before the
//! executor may touch the broker.
//!
//! Gate order matters. The trading lock is checked first because it is the
//! cheapest and the most authoritative; live exclusivity next because it
//! reflects broker truth; the cooldown last. The first failed gate denies
//! and the rest are skipped.

use tracing::{info, warn};

use crate::broker::gateway::{BrokerGateway, PositionFilter};
use crate::broker::session::BrokerSession;
use crate::cooldown::CooldownTracker;
use crate::metrics;
use crate::model::AdmissionDecision;
use crate::safety::lock::{LockStatus, TradingLock};

#[derive(Clone)]
pub struct AdmissionGuard {
    lock: TradingLock,
    cooldown: CooldownTracker,
    magic: u64,
    max_active_trades: usize,
}

impl AdmissionGuard {
    pub fn new(
        lock: TradingLock,
        cooldown: CooldownTracker,
        magic: u64,
        max_active_trades: usize,
    ) -> Self {
        Self {
            lock,
            cooldown,
            magic,
            max_active_trades: max_active_trades.max(1),
        }
    }

    /// Evaluate the gates using an already-held broker session guard.
    /// Side-effect free: a denial changes nothing, an admission records
    /// nothing. The caller owns what happens next.
    pub async fn evaluate_locked(
        &self,
        gateway: &dyn BrokerGateway,
        symbol: &str,
    ) -> AdmissionDecision {
        // Gate 1: persistent trading lock, fail-closed.
        if let LockStatus::Engaged(record) = self.lock.status() {
            warn!("Admission denied for {}: trading locked ({})", symbol, record.reason);
            metrics::record_admission_denial("trading_locked");
            return AdmissionDecision::deny(format!(
                "Trading locked by {}: {}",
                record.locked_by, record.reason
            ));
        }

        // Gate 2: broker truth, not local bookkeeping; an unreadable broker
        // denies. One live position per (symbol, magic), and a cap on total
        // positions carrying this system's magic across all symbols.
        let filter = PositionFilter::by_magic(self.magic);
        match gateway.positions_get(&filter).await {
            Ok(positions) => {
                if let Some(open) = positions.iter().find(|p| p.symbol == symbol) {
                    warn!(
                        "Admission denied for {}: position {} already open",
                        symbol, open.ticket
                    );
                    metrics::record_admission_denial("position_open");
                    return AdmissionDecision::deny(format!(
                        "Position {} already open on {}",
                        open.ticket, symbol
                    ));
                }
                if positions.len() >= self.max_active_trades {
                    warn!(
                        "Admission denied for {}: {} active trades at the {} limit",
                        symbol,
                        positions.len(),
                        self.max_active_trades
                    );
                    metrics::record_admission_denial("active_limit");
                    return AdmissionDecision::deny(format!(
                        "Global limit reached: {} active trades",
                        positions.len()
                    ));
                }
            }
            Err(e) => {
                warn!("Admission denied for {}: position query failed: {}", symbol, e);
                metrics::record_admission_denial("broker_unreadable");
                return AdmissionDecision::deny(format!("Cannot verify open positions: {}", e));
            }
        }

        // Gate 3: per-symbol cooldown since the last confirmed close.
        match self.cooldown.remaining(symbol) {
            Ok(Some(remaining_ms)) => {
                let minutes = (remaining_ms + 59_999) / 60_000;
                warn!("Admission denied for {}: cooldown {}min remaining", symbol, minutes);
                metrics::record_admission_denial("cooldown");
                AdmissionDecision::deny(format!(
                    "Cooldown active on {}: {} minutes remaining",
                    symbol, minutes
                ))
            }
            Ok(None) => {
                info!("Admission granted for {}", symbol);
                AdmissionDecision::allow()
            }
            Err(e) => {
                warn!("Admission denied for {}: cooldown unreadable: {}", symbol, e);
                metrics::record_admission_denial("cooldown_unreadable");
                AdmissionDecision::deny(format!("Cannot read cooldown state: {}", e))
            }
        }
    }

    /// Standalone evaluation that takes its own session guard. Used by the
    /// read-only surfaces; the engine holds one guard across admission and
    /// submission instead.
    pub async fn evaluate(&self, session: &BrokerSession, symbol: &str) -> AdmissionDecision {
        let guard = session.lock().await;
        self.evaluate_locked(&**guard, symbol).await
    }
}
