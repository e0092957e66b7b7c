//! Position verifier: compares the live position against the intent that
//! was sent to the venue.
//!
//! Runs under the same session guard that submitted the order, before any
//! other request can interleave. A missing ticket is terminal success (the
//! position closed before we looked); any field outside tolerance is a
//! mismatch, and mismatches are handled by closing, never by amending.

use rust_decimal::Decimal;
use tracing::{info, warn};

use crate::broker::gateway::{BrokerGateway, PositionFilter};
use crate::error::TradeError;
use crate::metrics;
use crate::model::{OrderIntent, Side, VerifyOutcome};

#[derive(Clone)]
pub struct PositionVerifier {
    /// SL/TP tolerance, in points. Brokers round stops server-side.
    tolerance_points: u32,
}

impl PositionVerifier {
    pub fn new(tolerance_points: u32) -> Self {
        Self { tolerance_points }
    }

    pub async fn verify_locked(
        &self,
        gateway: &dyn BrokerGateway,
        ticket: u64,
        intent: &OrderIntent,
    ) -> Result<VerifyOutcome, TradeError> {
        let positions = gateway
            .positions_get(&PositionFilter::by_ticket(ticket))
            .await?;
        let position = match positions.into_iter().next() {
            Some(p) => p,
            None => {
                info!("Ticket {} not found at venue, nothing to verify", ticket);
                return Ok(VerifyOutcome::NotFound);
            }
        };

        let info = gateway.symbol_info(&intent.symbol).await?;
        let stop_tolerance = Decimal::from(self.tolerance_points) * info.point;
        // Fills land inside the requested deviation or the venue requotes.
        let price_tolerance = Decimal::from(intent.deviation_points) * info.point;
        let volume_tolerance = info.volume_step / Decimal::from(10);

        // Side encoded 0 = buy, 1 = sell for the mismatch report.
        if position.side != intent.side {
            let code = |s: Side| match s {
                Side::Buy => Decimal::ZERO,
                Side::Sell => Decimal::ONE,
            };
            return Ok(self.mismatch(ticket, "side", code(intent.side), code(position.side)));
        }

        if (position.volume - intent.volume).abs() > volume_tolerance {
            return Ok(self.mismatch(ticket, "volume", intent.volume, position.volume));
        }

        if let Some(price) = intent.price {
            if (position.open_price - price).abs() > price_tolerance {
                return Ok(self.mismatch(ticket, "open_price", price, position.open_price));
            }
        }

        // A stop we never asked for is as much of a drift as a moved one:
        // an absent intent field requires a zero field on the position.
        match intent.stop_loss {
            Some(sl) => {
                if (position.stop_loss - sl).abs() > stop_tolerance {
                    return Ok(self.mismatch(ticket, "stop_loss", sl, position.stop_loss));
                }
            }
            None => {
                if !position.stop_loss.is_zero() {
                    return Ok(self.mismatch(
                        ticket,
                        "stop_loss",
                        Decimal::ZERO,
                        position.stop_loss,
                    ));
                }
            }
        }

        match intent.take_profit {
            Some(tp) => {
                if (position.take_profit - tp).abs() > stop_tolerance {
                    return Ok(self.mismatch(ticket, "take_profit", tp, position.take_profit));
                }
            }
            None => {
                if !position.take_profit.is_zero() {
                    return Ok(self.mismatch(
                        ticket,
                        "take_profit",
                        Decimal::ZERO,
                        position.take_profit,
                    ));
                }
            }
        }

        info!("✅ Ticket {} verified against intent {}", ticket, intent.signal_id);
        Ok(VerifyOutcome::Verified)
    }

    fn mismatch(
        &self,
        ticket: u64,
        field: &'static str,
        expected: Decimal,
        observed: Decimal,
    ) -> VerifyOutcome {
        warn!(
            "⚠️ Ticket {} {} mismatch: expected {}, observed {}",
            ticket, field, expected, observed
        );
        metrics::record_verify_mismatch(field);
        VerifyOutcome::Mismatch {
            field,
            expected,
            observed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::mock::MockGateway;
    use crate::model::PositionSnapshot;
    use rust_decimal_macros::dec;

    fn intent() -> OrderIntent {
        OrderIntent {
            signal_id: "sig-9".to_string(),
            symbol: "EURUSD".to_string(),
            side: Side::Buy,
            volume: dec!(0.1),
            price: Some(dec!(1.10010)),
            stop_loss: Some(dec!(1.09500)),
            take_profit: Some(dec!(1.10500)),
            deviation_points: 20,
            magic: 777,
            comment: String::new(),
            expiration_secs: 300,
            expiration_time: None,
        }
    }

    fn matching_position() -> PositionSnapshot {
        PositionSnapshot {
            ticket: 555,
            symbol: "EURUSD".to_string(),
            side: Side::Buy,
            volume: dec!(0.1),
            stop_loss: dec!(1.09500),
            take_profit: dec!(1.10500),
            open_price: dec!(1.10012),
            magic: 777,
            open_time: 0,
        }
    }

    #[tokio::test]
    async fn exact_position_verifies() {
        let gateway = MockGateway::with_symbol("EURUSD");
        gateway.set_position(matching_position());

        let outcome = PositionVerifier::new(2)
            .verify_locked(&gateway, 555, &intent())
            .await
            .unwrap();
        assert_eq!(outcome, VerifyOutcome::Verified);
    }

    #[tokio::test]
    async fn verification_is_repeatable_and_side_effect_free() {
        let gateway = MockGateway::with_symbol("EURUSD");
        gateway.set_position(matching_position());
        let verifier = PositionVerifier::new(2);

        for _ in 0..3 {
            let outcome = verifier.verify_locked(&gateway, 555, &intent()).await.unwrap();
            assert_eq!(outcome, VerifyOutcome::Verified);
        }
        assert_eq!(gateway.open_positions().len(), 1, "reads never mutate");
        assert_eq!(gateway.close_calls(), 0);
    }

    #[tokio::test]
    async fn missing_ticket_is_not_found() {
        let gateway = MockGateway::with_symbol("EURUSD");
        let outcome = PositionVerifier::new(2)
            .verify_locked(&gateway, 555, &intent())
            .await
            .unwrap();
        assert_eq!(outcome, VerifyOutcome::NotFound);
    }

    #[tokio::test]
    async fn stop_loss_within_tolerance_verifies() {
        let gateway = MockGateway::with_symbol("EURUSD");
        let mut pos = matching_position();
        pos.stop_loss = dec!(1.09502); // 2 points off, tolerance is 2
        gateway.set_position(pos);

        let outcome = PositionVerifier::new(2)
            .verify_locked(&gateway, 555, &intent())
            .await
            .unwrap();
        assert_eq!(outcome, VerifyOutcome::Verified);
    }

    #[tokio::test]
    async fn drifted_stop_loss_mismatches() {
        let gateway = MockGateway::with_symbol("EURUSD");
        let mut pos = matching_position();
        pos.stop_loss = dec!(1.09450); // 50 points off
        gateway.set_position(pos);

        let outcome = PositionVerifier::new(2)
            .verify_locked(&gateway, 555, &intent())
            .await
            .unwrap();
        match outcome {
            VerifyOutcome::Mismatch { field, .. } => assert_eq!(field, "stop_loss"),
            other => panic!("expected mismatch, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn unrequested_stop_loss_mismatches() {
        let gateway = MockGateway::with_symbol("EURUSD");
        gateway.set_position(matching_position());

        // The intent carried no stop, the booked position has one.
        let mut stopless = intent();
        stopless.stop_loss = None;
        let outcome = PositionVerifier::new(2)
            .verify_locked(&gateway, 555, &stopless)
            .await
            .unwrap();
        match outcome {
            VerifyOutcome::Mismatch {
                field,
                expected,
                observed,
            } => {
                assert_eq!(field, "stop_loss");
                assert_eq!(expected, Decimal::ZERO);
                assert_eq!(observed, dec!(1.09500));
            }
            other => panic!("expected mismatch, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn absent_stop_and_target_verify_against_zeroed_position() {
        let gateway = MockGateway::with_symbol("EURUSD");
        let mut pos = matching_position();
        pos.stop_loss = Decimal::ZERO;
        pos.take_profit = Decimal::ZERO;
        gateway.set_position(pos);

        let mut bare = intent();
        bare.stop_loss = None;
        bare.take_profit = None;
        let outcome = PositionVerifier::new(2)
            .verify_locked(&gateway, 555, &bare)
            .await
            .unwrap();
        assert_eq!(outcome, VerifyOutcome::Verified);
    }

    #[tokio::test]
    async fn wrong_side_mismatches() {
        let gateway = MockGateway::with_symbol("EURUSD");
        let mut pos = matching_position();
        pos.side = Side::Sell;
        gateway.set_position(pos);

        let outcome = PositionVerifier::new(2)
            .verify_locked(&gateway, 555, &intent())
            .await
            .unwrap();
        assert!(matches!(outcome, VerifyOutcome::Mismatch { field: "side", .. }));
    }

    #[tokio::test]
    async fn fill_outside_deviation_mismatches() {
        let gateway = MockGateway::with_symbol("EURUSD");
        let mut pos = matching_position();
        pos.open_price = dec!(1.10040); // 30 points past the requested 20
        gateway.set_position(pos);

        let outcome = PositionVerifier::new(2)
            .verify_locked(&gateway, 555, &intent())
            .await
            .unwrap();
        assert!(matches!(
            outcome,
            VerifyOutcome::Mismatch {
                field: "open_price",
                ..
            }
        ));
    }
}
