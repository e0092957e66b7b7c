use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Side {
    #[serde(rename = "BUY")]
    Buy,
    #[serde(rename = "SELL")]
    Sell,
}

impl Side {
    /// The side of the deal that flattens a position opened on this side.
    pub fn opposite(&self) -> Side {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }
}

/// Symbol trading availability reported by the venue.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum TradeMode {
    #[serde(rename = "FULL")]
    Full,
    #[serde(rename = "CLOSE_ONLY")]
    CloseOnly,
    #[serde(rename = "DISABLED")]
    Disabled,
}

/// A trade request as produced by a signal producer.
/// Immutable once handed to the executor; normalization happens on a copy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderIntent {
    pub signal_id: String,
    pub symbol: String,
    pub side: Side,
    pub volume: Decimal,
    /// Entry price. The executor fetches a fresh tick when absent.
    #[serde(default)]
    pub price: Option<Decimal>,
    #[serde(default)]
    pub stop_loss: Option<Decimal>,
    #[serde(default)]
    pub take_profit: Option<Decimal>,
    /// Max acceptable slippage, in points.
    pub deviation_points: u32,
    /// Application tag distinguishing our positions from manual ones.
    pub magic: u64,
    #[serde(default)]
    pub comment: String,
    /// Order lifetime from the server tick time, seconds. Zero disables
    /// the expiration.
    pub expiration_secs: i64,
    /// Absolute expiration, epoch seconds. Stamped by the executor from a
    /// fresh tick; producers leave it unset.
    #[serde(default)]
    pub expiration_time: Option<i64>,
}

/// What the venue reported back for a submitted deal.
///
/// Fields other than the retcode are optional on purpose: a malformed broker
/// response must surface as absence, never as zero.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderResult {
    pub retcode: u32,
    #[serde(default)]
    pub ticket: Option<u64>,
    #[serde(default)]
    pub filled_volume: Option<Decimal>,
    #[serde(default)]
    pub filled_price: Option<Decimal>,
}

/// Read-only mirror of a position held at the venue.
/// Always fetched fresh from the gateway; never cached across calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionSnapshot {
    pub ticket: u64,
    pub symbol: String,
    pub side: Side,
    pub volume: Decimal,
    pub stop_loss: Decimal,
    pub take_profit: Decimal,
    pub open_price: Decimal,
    pub magic: u64,
    /// Server time the position was opened, epoch seconds.
    pub open_time: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymbolInfo {
    pub digits: u32,
    pub point: Decimal,
    pub volume_step: Decimal,
    pub volume_min: Decimal,
    pub volume_max: Decimal,
    pub stop_level_points: u32,
    pub freeze_level_points: u32,
    pub trade_mode: TradeMode,
}

impl SymbolInfo {
    /// Minimum SL/TP distance in price units: the stricter of the venue's
    /// stops level and freeze level, converted from points.
    pub fn min_stop_distance(&self) -> Decimal {
        let points = self.stop_level_points.max(self.freeze_level_points);
        Decimal::from(points) * self.point
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tick {
    pub bid: Decimal,
    pub ask: Decimal,
    /// Venue server time, epoch seconds.
    pub server_time: i64,
}

/// Persistent circuit-breaker record. Presence alone means trading is
/// blocked; there is no boolean flag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LockRecord {
    pub reason: String,
    pub timestamp: DateTime<Utc>,
    pub locked_by: String,
}

/// Outcome of the pre-trade admission gate. Computed fresh on every call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdmissionDecision {
    pub allowed: bool,
    pub reason: String,
}

impl AdmissionDecision {
    pub fn allow() -> Self {
        Self {
            allowed: true,
            reason: String::new(),
        }
    }

    pub fn deny(reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            reason: reason.into(),
        }
    }
}

/// Result of comparing a live position against the intent that produced it.
#[derive(Debug, Clone, PartialEq)]
pub enum VerifyOutcome {
    Verified,
    /// The ticket no longer exists at the venue. Terminal success: there is
    /// nothing left to verify.
    NotFound,
    Mismatch {
        field: &'static str,
        expected: Decimal,
        observed: Decimal,
    },
}

/// Confirmation that a ticket is gone from the venue.
#[derive(Debug, Clone)]
pub struct CloseConfirmation {
    pub ticket: u64,
    pub symbol: String,
    /// True when the position was already gone before we sent anything.
    pub already_closed: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn side_opposite() {
        assert_eq!(Side::Buy.opposite(), Side::Sell);
        assert_eq!(Side::Sell.opposite(), Side::Buy);
    }

    #[test]
    fn min_stop_distance_uses_stricter_level() {
        let info = SymbolInfo {
            digits: 5,
            point: dec!(0.00001),
            volume_step: dec!(0.01),
            volume_min: dec!(0.01),
            volume_max: dec!(100),
            stop_level_points: 10,
            freeze_level_points: 25,
            trade_mode: TradeMode::Full,
        };
        assert_eq!(info.min_stop_distance(), dec!(0.00025));
    }

    #[test]
    fn order_result_tolerates_absent_fields() {
        let parsed: OrderResult = serde_json::from_str(r#"{"retcode": 10009}"#).unwrap();
        assert_eq!(parsed.retcode, 10009);
        assert!(parsed.ticket.is_none());
        assert!(parsed.filled_volume.is_none());
    }
}
