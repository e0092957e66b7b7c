//! Position closer: flattens a ticket by dealing the opposite side.
//!
//! Each attempt takes its own session guard, re-reads the position (it may
//! close itself by stop between attempts), deals at a fresh price and
//! confirms by re-reading afterwards. A position that still exists after
//! the configured attempts is an unrecoverable state: the trading lock
//! engages exactly once and the process terminates.

use std::time::Duration;
use tracing::{info, warn};

use crate::broker::gateway::{BrokerGateway, CloseRequest, PositionFilter};
use crate::broker::retcode::{self, RetcodeClass};
use crate::broker::session::BrokerSession;
use crate::cooldown::CooldownTracker;
use crate::error::TradeError;
use crate::metrics;
use crate::model::{CloseConfirmation, PositionSnapshot, Side};
use crate::safety::critical::CriticalFailureHandler;

#[derive(Clone)]
pub struct PositionCloser {
    critical: CriticalFailureHandler,
    cooldown: CooldownTracker,
    max_attempts: usize,
    retry_delay: Duration,
    deviation_points: u32,
}

impl PositionCloser {
    pub fn new(
        critical: CriticalFailureHandler,
        cooldown: CooldownTracker,
        max_attempts: usize,
        retry_delay_ms: u64,
        deviation_points: u32,
    ) -> Self {
        Self {
            critical,
            cooldown,
            max_attempts: max_attempts.max(1),
            retry_delay: Duration::from_millis(retry_delay_ms),
            deviation_points,
        }
    }

    /// Close `ticket` and confirm it is gone from the venue.
    pub async fn close(
        &self,
        session: &BrokerSession,
        ticket: u64,
    ) -> Result<CloseConfirmation, TradeError> {
        let mut last_failure = String::new();
        // Symbol of the position a close deal actually went out for. A deal
        // whose response is lost may still have reached the venue, so a gone
        // ticket after this point is a confirmed close, not an "already
        // closed" one.
        let mut dealt_symbol: Option<String> = None;

        for attempt in 1..=self.max_attempts {
            if attempt > 1 {
                tokio::time::sleep(self.retry_delay).await;
                metrics::record_close_retry();
            }

            let guard = session.lock().await;
            let gateway = guard.as_ref();

            // Re-read inside the guard. The position can vanish on its own
            // between attempts (stop hit, manual intervention) and a vanished
            // position is a confirmed close.
            let position = match self.find(gateway, ticket).await {
                Ok(Some(p)) => p,
                Ok(None) => {
                    if let Some(symbol) = dealt_symbol.take() {
                        info!("✅ Ticket {} gone after close deal, confirmed closed", ticket);
                        self.record_cooldown(&symbol);
                        return Ok(CloseConfirmation {
                            ticket,
                            symbol,
                            already_closed: false,
                        });
                    }
                    info!("Ticket {} already gone from venue", ticket);
                    return Ok(CloseConfirmation {
                        ticket,
                        symbol: String::new(),
                        already_closed: true,
                    });
                }
                Err(e) => {
                    warn!("Close attempt {}: cannot read ticket {}: {}", attempt, ticket, e);
                    last_failure = e.to_string();
                    continue;
                }
            };

            match self.attempt_close(gateway, &position, &mut dealt_symbol).await {
                Ok(true) => {
                    info!("✅ Ticket {} closed and confirmed gone", ticket);
                    self.record_cooldown(&position.symbol);
                    return Ok(CloseConfirmation {
                        ticket,
                        symbol: position.symbol,
                        already_closed: false,
                    });
                }
                Ok(false) => {
                    warn!(
                        "Close attempt {}/{} for ticket {}: position still present",
                        attempt, self.max_attempts, ticket
                    );
                    last_failure = "position still present after close deal".to_string();
                }
                Err(e) => {
                    warn!(
                        "Close attempt {}/{} for ticket {} failed: {}",
                        attempt, self.max_attempts, ticket, e
                    );
                    last_failure = e;
                }
            }
        }

        Err(self.critical.escalate(
            "position_closer",
            &format!(
                "Cannot close ticket {} after {} attempts: {}",
                ticket, self.max_attempts, last_failure
            ),
        ))
    }

    async fn find(
        &self,
        gateway: &dyn BrokerGateway,
        ticket: u64,
    ) -> Result<Option<PositionSnapshot>, TradeError> {
        let positions = gateway
            .positions_get(&PositionFilter::by_ticket(ticket))
            .await?;
        Ok(positions.into_iter().next())
    }

    /// One deal at a fresh price, confirmed by re-reading. `Ok(true)` means
    /// the position is verifiably gone.
    async fn attempt_close(
        &self,
        gateway: &dyn BrokerGateway,
        position: &PositionSnapshot,
        dealt_symbol: &mut Option<String>,
    ) -> Result<bool, String> {
        let tick = gateway
            .current_tick(&position.symbol)
            .await
            .map_err(|e| e.to_string())?;

        // Closing a buy deals at the bid, closing a sell at the ask.
        let price = match position.side {
            Side::Buy => tick.bid,
            Side::Sell => tick.ask,
        };

        let request = CloseRequest {
            ticket: position.ticket,
            symbol: position.symbol.clone(),
            side: position.side.opposite(),
            volume: position.volume,
            price,
            deviation_points: self.deviation_points,
            magic: position.magic,
        };

        *dealt_symbol = Some(position.symbol.clone());
        let result = gateway
            .close_position(&request)
            .await
            .map_err(|e| e.to_string())?;

        match retcode::classify(result.retcode) {
            RetcodeClass::Done => {}
            _ => {
                return Err(format!(
                    "retcode {} ({})",
                    result.retcode,
                    retcode::describe(result.retcode)
                ));
            }
        }

        // Trust the re-read, not the retcode.
        let still_there = self
            .find(gateway, position.ticket)
            .await
            .map_err(|e| e.to_string())?;
        Ok(still_there.is_none())
    }

    fn record_cooldown(&self, symbol: &str) {
        if let Err(e) = self.cooldown.record_close(symbol) {
            warn!("Close confirmed but cooldown write failed for {}: {}", symbol, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::gateway::BrokerError;
    use crate::broker::mock::MockGateway;
    use crate::context::SimulatedTimeProvider;
    use crate::model::OrderResult;
    use crate::persistence::store::MemoryStore;
    use crate::safety::critical::ProcessExit;
    use crate::safety::lock::TradingLock;
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicI32, Ordering};
    use std::sync::Arc;

    struct NoopExit(AtomicI32);

    impl ProcessExit for NoopExit {
        fn exit(&self, code: i32) {
            self.0.fetch_add(1, Ordering::SeqCst);
            let _ = code;
        }
    }

    struct Fixture {
        closer: PositionCloser,
        lock: TradingLock,
        cooldown: CooldownTracker,
        exit: Arc<NoopExit>,
    }

    fn fixture(max_attempts: usize) -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(SimulatedTimeProvider::new(1_000_000));
        let lock = TradingLock::new(store.clone(), clock.clone());
        let cooldown = CooldownTracker::new(store, clock, 210);
        let exit = Arc::new(NoopExit(AtomicI32::new(0)));
        let handler = CriticalFailureHandler::new(lock.clone(), exit.clone());
        Fixture {
            closer: PositionCloser::new(handler, cooldown.clone(), max_attempts, 0, 20),
            lock,
            cooldown,
            exit,
        }
    }

    fn open_position(gateway: &MockGateway) {
        gateway.set_position(crate::model::PositionSnapshot {
            ticket: 555,
            symbol: "EURUSD".to_string(),
            side: Side::Buy,
            volume: dec!(0.1),
            stop_loss: dec!(1.09500),
            take_profit: dec!(1.10500),
            open_price: dec!(1.10010),
            magic: 777,
            open_time: 0,
        });
    }

    #[tokio::test]
    async fn close_confirms_and_starts_cooldown() {
        let f = fixture(2);
        let gateway = MockGateway::with_symbol("EURUSD");
        open_position(&gateway);
        let session = BrokerSession::new(Arc::new(gateway));

        let confirmation = f.closer.close(&session, 555).await.unwrap();
        assert!(!confirmation.already_closed);
        assert_eq!(confirmation.symbol, "EURUSD");
        assert!(f.cooldown.remaining("EURUSD").unwrap().is_some());
        assert!(!f.lock.status().is_engaged());
    }

    #[tokio::test]
    async fn already_gone_ticket_is_success() {
        let f = fixture(2);
        let gateway = MockGateway::with_symbol("EURUSD");
        let session = BrokerSession::new(Arc::new(gateway));

        let confirmation = f.closer.close(&session, 999).await.unwrap();
        assert!(confirmation.already_closed);
        assert_eq!(f.exit.0.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn lost_close_response_confirms_on_reread_and_starts_cooldown() {
        let f = fixture(2);
        let gateway = MockGateway::with_symbol("EURUSD");
        open_position(&gateway);
        // The deal lands but its response never comes back. The second
        // attempt finds the ticket gone, which is a confirmed close.
        gateway.lose_next_close_response();
        let session = BrokerSession::new(Arc::new(gateway));

        let confirmation = f.closer.close(&session, 555).await.unwrap();
        assert!(!confirmation.already_closed);
        assert_eq!(confirmation.symbol, "EURUSD");
        assert!(f.cooldown.remaining("EURUSD").unwrap().is_some());
        assert_eq!(f.exit.0.load(Ordering::SeqCst), 0);
        assert!(!f.lock.status().is_engaged());
    }

    #[tokio::test]
    async fn failed_attempt_then_success_does_not_escalate() {
        let f = fixture(2);
        let gateway = MockGateway::with_symbol("EURUSD");
        open_position(&gateway);
        gateway.push_close_result(Ok(OrderResult {
            retcode: retcode::REQUOTE,
            ticket: None,
            filled_volume: None,
            filled_price: None,
        }));
        let session = BrokerSession::new(Arc::new(gateway));

        let confirmation = f.closer.close(&session, 555).await.unwrap();
        assert!(!confirmation.already_closed);
        assert_eq!(f.exit.0.load(Ordering::SeqCst), 0);
        assert!(!f.lock.status().is_engaged());
    }

    #[tokio::test]
    async fn exhausted_attempts_escalate_exactly_once() {
        let f = fixture(2);
        let gateway = MockGateway::with_symbol("EURUSD");
        open_position(&gateway);
        for _ in 0..2 {
            gateway.push_close_result(Err(BrokerError::Network("bridge down".to_string())));
        }
        let session = BrokerSession::new(Arc::new(gateway));

        let err = f.closer.close(&session, 555).await.unwrap_err();
        assert!(matches!(err, TradeError::Critical(_)));
        assert!(f.lock.status().is_engaged());
        assert_eq!(f.exit.0.load(Ordering::SeqCst), 1);
        assert!(
            f.cooldown.remaining("EURUSD").unwrap().is_none(),
            "no confirmed close, no cooldown"
        );
    }
}
