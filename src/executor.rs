//! Order executor: validate, normalize, submit, classify.
//!
//! The executor never calls the broker for an intent that fails local
//! validation, and it submits at most one live request per attempt. Retries
//! happen only for the requote family of retcodes, always with a fresh tick.
//! A transport failure during placement is ambiguous (the order may or may
//! not exist at the venue) and is never retried from here.

use rust_decimal::Decimal;
use tracing::{info, warn};

use crate::broker::gateway::BrokerGateway;
use crate::broker::retcode::{self, RetcodeClass};
use crate::error::{ErrorClass, TradeError};
use crate::metrics;
use crate::model::{OrderIntent, OrderResult, Side, SymbolInfo, Tick, TradeMode};
use crate::safety::critical::CriticalFailureHandler;

/// A successfully placed order, carrying the intent exactly as it was sent
/// to the venue so the verifier can compare against it.
#[derive(Debug, Clone)]
pub struct SubmittedOrder {
    pub ticket: u64,
    pub intent: OrderIntent,
    pub result: OrderResult,
}

#[derive(Clone)]
pub struct OrderExecutor {
    critical: CriticalFailureHandler,
    max_attempts: usize,
}

impl OrderExecutor {
    pub fn new(critical: CriticalFailureHandler, max_attempts: usize) -> Self {
        Self {
            critical,
            max_attempts: max_attempts.max(1),
        }
    }

    /// Validate, normalize and submit under an already-held session guard.
    pub async fn execute_locked(
        &self,
        gateway: &dyn BrokerGateway,
        intent: &OrderIntent,
    ) -> Result<SubmittedOrder, TradeError> {
        // Intent-local checks never reach the venue.
        validate_intent(intent)?;

        let info = gateway.symbol_info(&intent.symbol).await?;
        let tick = gateway.current_tick(&intent.symbol).await?;

        validate(intent, &info, &tick)?;

        let mut normalized = intent.clone();
        normalized.volume = normalize_volume(intent.volume, &info)?;
        normalized.stop_loss = intent.stop_loss.map(|p| round_price(p, info.digits));
        normalized.take_profit = intent.take_profit.map(|p| round_price(p, info.digits));

        let mut last_retcode = 0u32;
        for attempt in 1..=self.max_attempts {
            // Fresh price every attempt; a requote means the previous one
            // is already stale.
            let tick = gateway.current_tick(&intent.symbol).await?;
            let entry = match normalized.side {
                Side::Buy => tick.ask,
                Side::Sell => tick.bid,
            };
            normalized.price = Some(round_price(intent.price.unwrap_or(entry), info.digits));
            normalized.expiration_time = if intent.expiration_secs > 0 {
                Some(tick.server_time + intent.expiration_secs)
            } else {
                None
            };

            metrics::record_order_submitted(&normalized.symbol);
            info!(
                "Submitting {:?} {} {} @ {} (attempt {}/{})",
                normalized.side,
                normalized.volume,
                normalized.symbol,
                normalized.price.unwrap_or_default(),
                attempt,
                self.max_attempts
            );

            let result = gateway.place_order(&normalized).await?;
            last_retcode = result.retcode;

            match retcode::classify(result.retcode) {
                RetcodeClass::Done => {
                    let ticket = result.ticket.ok_or_else(|| {
                        TradeError::Malformed(format!(
                            "Retcode {} reported done without a ticket",
                            result.retcode
                        ))
                    })?;
                    metrics::record_order_filled(&normalized.symbol);
                    info!(
                        "✅ Order filled: ticket {} {} {} @ {:?}",
                        ticket, normalized.symbol, normalized.volume, result.filled_price
                    );
                    return Ok(SubmittedOrder {
                        ticket,
                        intent: normalized,
                        result,
                    });
                }
                RetcodeClass::Retryable if attempt < self.max_attempts => {
                    warn!(
                        "Retcode {} ({}) on {}, retrying with fresh price",
                        result.retcode,
                        retcode::describe(result.retcode),
                        normalized.symbol
                    );
                    metrics::record_submit_retry(&normalized.symbol);
                }
                RetcodeClass::Retryable => break,
                RetcodeClass::NonFatal => {
                    return Err(TradeError::Rejected {
                        class: ErrorClass::NonFatal,
                        retcode: result.retcode,
                        description: retcode::describe(result.retcode).to_string(),
                    });
                }
                RetcodeClass::Fatal => {
                    return Err(self.critical.escalate(
                        "order_executor",
                        &format!(
                            "Fatal retcode {} ({}) on {}",
                            result.retcode,
                            retcode::describe(result.retcode),
                            normalized.symbol
                        ),
                    ));
                }
            }
        }

        Err(TradeError::Rejected {
            class: ErrorClass::Retryable,
            retcode: last_retcode,
            description: format!(
                "{} (retries exhausted after {} attempts)",
                retcode::describe(last_retcode),
                self.max_attempts
            ),
        })
    }
}

/// Checks that need nothing from the venue. These run before the first
/// gateway call so a malformed intent can never surface as a network error.
pub fn validate_intent(intent: &OrderIntent) -> Result<(), TradeError> {
    if intent.symbol.trim().is_empty() {
        return Err(TradeError::Validation("symbol is blank".to_string()));
    }
    if intent.volume <= Decimal::ZERO {
        return Err(TradeError::Validation(format!(
            "volume {} must be positive",
            intent.volume
        )));
    }
    if intent.expiration_secs < 0 {
        return Err(TradeError::Validation(format!(
            "expiration {}s must not be negative",
            intent.expiration_secs
        )));
    }
    for (name, price) in [
        ("price", intent.price),
        ("stop_loss", intent.stop_loss),
        ("take_profit", intent.take_profit),
    ] {
        if let Some(p) = price {
            if p <= Decimal::ZERO {
                return Err(TradeError::Validation(format!(
                    "{} {} must be positive",
                    name, p
                )));
            }
        }
    }
    Ok(())
}

/// Reject anything the venue would bounce, before the venue sees it.
pub fn validate(intent: &OrderIntent, info: &SymbolInfo, tick: &Tick) -> Result<(), TradeError> {
    validate_intent(intent)?;
    match info.trade_mode {
        TradeMode::Full => {}
        TradeMode::CloseOnly => {
            return Err(TradeError::Validation(format!(
                "{} is close-only at the venue",
                intent.symbol
            )));
        }
        TradeMode::Disabled => {
            return Err(TradeError::Validation(format!(
                "{} trading is disabled at the venue",
                intent.symbol
            )));
        }
    }
    let entry = intent.price.unwrap_or(match intent.side {
        Side::Buy => tick.ask,
        Side::Sell => tick.bid,
    });
    let min_distance = info.min_stop_distance();

    if let Some(sl) = intent.stop_loss {
        let ok = match intent.side {
            Side::Buy => sl < entry && entry - sl >= min_distance,
            Side::Sell => sl > entry && sl - entry >= min_distance,
        };
        if !ok {
            return Err(TradeError::Validation(format!(
                "stop loss {} too close to entry {} (min distance {})",
                sl, entry, min_distance
            )));
        }
    }
    if let Some(tp) = intent.take_profit {
        let ok = match intent.side {
            Side::Buy => tp > entry && tp - entry >= min_distance,
            Side::Sell => tp < entry && entry - tp >= min_distance,
        };
        if !ok {
            return Err(TradeError::Validation(format!(
                "take profit {} too close to entry {} (min distance {})",
                tp, entry, min_distance
            )));
        }
    }
    Ok(())
}

/// Floor the requested volume to the venue's step, clamp to the maximum.
/// Flooring below the venue minimum is a rejection, not a bump up: sending
/// more volume than requested is never acceptable.
pub fn normalize_volume(volume: Decimal, info: &SymbolInfo) -> Result<Decimal, TradeError> {
    if info.volume_step <= Decimal::ZERO {
        return Err(TradeError::Validation(format!(
            "symbol reports non-positive volume step {}",
            info.volume_step
        )));
    }
    let stepped = (volume / info.volume_step).floor() * info.volume_step;
    let clamped = stepped.min(info.volume_max);
    if clamped < info.volume_min {
        return Err(TradeError::Validation(format!(
            "volume {} floors to {} below venue minimum {}",
            volume, clamped, info.volume_min
        )));
    }
    Ok(clamped.normalize())
}

pub fn round_price(price: Decimal, digits: u32) -> Decimal {
    price.round_dp(digits)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::mock::MockGateway;
    use crate::context::SimulatedTimeProvider;
    use crate::persistence::store::MemoryStore;
    use crate::safety::critical::ProcessExit;
    use crate::safety::lock::TradingLock;
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicI32, Ordering};
    use std::sync::Arc;

    struct NoopExit(AtomicI32);

    impl ProcessExit for NoopExit {
        fn exit(&self, code: i32) {
            self.0.store(code, Ordering::SeqCst);
        }
    }

    fn executor(max_attempts: usize) -> (OrderExecutor, TradingLock, Arc<NoopExit>) {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(SimulatedTimeProvider::new(0));
        let lock = TradingLock::new(store, clock);
        let exit = Arc::new(NoopExit(AtomicI32::new(-1)));
        let handler = CriticalFailureHandler::new(lock.clone(), exit.clone());
        (OrderExecutor::new(handler, max_attempts), lock, exit)
    }

    fn intent() -> OrderIntent {
        OrderIntent {
            signal_id: "sig-1".to_string(),
            symbol: "EURUSD".to_string(),
            side: Side::Buy,
            volume: dec!(0.13),
            price: None,
            stop_loss: Some(dec!(1.09500)),
            take_profit: Some(dec!(1.10500)),
            deviation_points: 20,
            magic: 777,
            comment: "test".to_string(),
            expiration_secs: 300,
            expiration_time: None,
        }
    }

    #[test]
    fn volume_floors_to_step() {
        let info = MockGateway::fx_symbol_info();
        assert_eq!(normalize_volume(dec!(0.13), &info).unwrap(), dec!(0.1));
        assert_eq!(normalize_volume(dec!(0.19), &info).unwrap(), dec!(0.1));
        assert_eq!(normalize_volume(dec!(0.20), &info).unwrap(), dec!(0.2));
        assert_eq!(normalize_volume(dec!(0.1), &info).unwrap(), dec!(0.1));
    }

    #[test]
    fn volume_below_minimum_rejects() {
        let info = MockGateway::fx_symbol_info();
        assert!(matches!(
            normalize_volume(dec!(0.09), &info),
            Err(TradeError::Validation(_))
        ));
    }

    #[test]
    fn volume_clamps_to_maximum() {
        let info = MockGateway::fx_symbol_info();
        assert_eq!(normalize_volume(dec!(250), &info).unwrap(), dec!(100));
    }

    #[test]
    fn validation_rejects_close_only_symbol() {
        let mut info = MockGateway::fx_symbol_info();
        info.trade_mode = TradeMode::CloseOnly;
        let tick = Tick {
            bid: dec!(1.10000),
            ask: dec!(1.10010),
            server_time: 0,
        };
        assert!(matches!(
            validate(&intent(), &info, &tick),
            Err(TradeError::Validation(_))
        ));
    }

    #[test]
    fn validation_rejects_stop_on_wrong_side() {
        let info = MockGateway::fx_symbol_info();
        let tick = Tick {
            bid: dec!(1.10000),
            ask: dec!(1.10010),
            server_time: 0,
        };
        let mut bad = intent();
        bad.stop_loss = Some(dec!(1.20000)); // above entry on a buy
        assert!(validate(&bad, &info, &tick).is_err());
    }

    #[tokio::test]
    async fn blank_symbol_rejects_before_any_gateway_call() {
        let (executor, _, _) = executor(3);
        // The gateway knows nothing: any lookup for the blank symbol would
        // surface as an Api error, so the only way to get a Validation
        // error back is to reject before touching it.
        let gateway = MockGateway::new();

        let mut bad = intent();
        bad.symbol = "   ".to_string();
        let err = executor.execute_locked(&gateway, &bad).await.unwrap_err();
        assert!(matches!(err, TradeError::Validation(_)));
        assert!(!err.is_retryable());
        assert_eq!(gateway.place_calls(), 0);
    }

    #[tokio::test]
    async fn happy_path_fills_with_floored_volume() {
        let (executor, _, _) = executor(3);
        let gateway = MockGateway::with_symbol("EURUSD");

        let submitted = executor.execute_locked(&gateway, &intent()).await.unwrap();
        assert_eq!(submitted.intent.volume, dec!(0.1));
        assert_eq!(
            submitted.intent.expiration_time,
            Some(1_700_000_000 + 300),
            "expiration is anchored to the server tick"
        );
        assert!(submitted.ticket > 0);
        assert_eq!(gateway.place_calls(), 1);
    }

    #[tokio::test]
    async fn requote_retries_then_fills() {
        let (executor, _, _) = executor(3);
        let gateway = MockGateway::with_symbol("EURUSD");
        gateway.push_place_result(Ok(OrderResult {
            retcode: retcode::REQUOTE,
            ticket: None,
            filled_volume: None,
            filled_price: None,
        }));

        let submitted = executor.execute_locked(&gateway, &intent()).await.unwrap();
        assert!(submitted.ticket > 0);
        assert_eq!(gateway.place_calls(), 2);
    }

    #[tokio::test]
    async fn requote_exhaustion_surfaces_retryable_rejection() {
        let (executor, lock, _) = executor(2);
        let gateway = MockGateway::with_symbol("EURUSD");
        for _ in 0..2 {
            gateway.push_place_result(Ok(OrderResult {
                retcode: retcode::REQUOTE,
                ticket: None,
                filled_volume: None,
                filled_price: None,
            }));
        }

        let err = executor.execute_locked(&gateway, &intent()).await.unwrap_err();
        assert!(matches!(
            err,
            TradeError::Rejected {
                class: ErrorClass::Retryable,
                ..
            }
        ));
        assert_eq!(gateway.place_calls(), 2);
        assert!(!lock.status().is_engaged(), "requotes never engage the lock");
    }

    #[tokio::test]
    async fn fatal_retcode_engages_lock_and_requests_exit() {
        let (executor, lock, exit) = executor(3);
        let gateway = MockGateway::with_symbol("EURUSD");
        gateway.push_place_result(Ok(OrderResult {
            retcode: retcode::INSUFFICIENT_FUNDS,
            ticket: None,
            filled_volume: None,
            filled_price: None,
        }));

        let err = executor.execute_locked(&gateway, &intent()).await.unwrap_err();
        assert!(matches!(err, TradeError::Critical(_)));
        assert!(lock.status().is_engaged());
        assert_eq!(exit.0.load(Ordering::SeqCst), 1);
        assert_eq!(gateway.place_calls(), 1, "fatal codes are never retried");
    }

    #[tokio::test]
    async fn done_without_ticket_is_malformed_not_success() {
        let (executor, lock, _) = executor(3);
        let gateway = MockGateway::with_symbol("EURUSD");
        gateway.push_place_result(Ok(OrderResult {
            retcode: retcode::DONE,
            ticket: None,
            filled_volume: None,
            filled_price: None,
        }));

        let err = executor.execute_locked(&gateway, &intent()).await.unwrap_err();
        assert!(matches!(err, TradeError::Malformed(_)));
        assert!(!lock.status().is_engaged());
    }
}
