use async_trait::async_trait;
use thiserror::Error;

use crate::model::{OrderIntent, OrderResult, PositionSnapshot, Side, SymbolInfo, Tick};

#[derive(Error, Debug, Clone)]
pub enum BrokerError {
    /// Timeout or connection loss. Retryable at the executor.
    #[error("Network error: {0}")]
    Network(String),
    /// The bridge answered but the payload could not be decoded.
    #[error("Malformed response: {0}")]
    Malformed(String),
    /// Bridge-level error distinct from a well-formed-but-rejected result.
    #[error("API error: {0}")]
    Api(String),
}

/// Filter for `positions_get`. Empty filter returns every open position.
#[derive(Debug, Clone, Default)]
pub struct PositionFilter {
    pub symbol: Option<String>,
    pub ticket: Option<u64>,
    pub magic: Option<u64>,
}

impl PositionFilter {
    pub fn by_ticket(ticket: u64) -> Self {
        Self {
            ticket: Some(ticket),
            ..Default::default()
        }
    }

    pub fn by_magic(magic: u64) -> Self {
        Self {
            magic: Some(magic),
            ..Default::default()
        }
    }

    pub fn by_symbol_and_magic(symbol: &str, magic: u64) -> Self {
        Self {
            symbol: Some(symbol.to_string()),
            magic: Some(magic),
            ..Default::default()
        }
    }

    pub fn matches(&self, pos: &PositionSnapshot) -> bool {
        if let Some(ref symbol) = self.symbol {
            if &pos.symbol != symbol {
                return false;
            }
        }
        if let Some(ticket) = self.ticket {
            if pos.ticket != ticket {
                return false;
            }
        }
        if let Some(magic) = self.magic {
            if pos.magic != magic {
                return false;
            }
        }
        true
    }
}

/// Request to flatten an existing position with an opposing deal.
#[derive(Debug, Clone)]
pub struct CloseRequest {
    pub ticket: u64,
    pub symbol: String,
    pub side: Side,
    pub volume: rust_decimal::Decimal,
    pub price: rust_decimal::Decimal,
    pub deviation_points: u32,
    pub magic: u64,
}

/// Single logical connection to the broker trading terminal.
///
/// Every call may fail with a `BrokerError` distinct from a well-formed but
/// rejected `OrderResult`. Callers serialize access through `BrokerSession`;
/// implementations do not need their own locking.
#[async_trait]
pub trait BrokerGateway: Send + Sync {
    async fn place_order(&self, intent: &OrderIntent) -> Result<OrderResult, BrokerError>;

    async fn positions_get(
        &self,
        filter: &PositionFilter,
    ) -> Result<Vec<PositionSnapshot>, BrokerError>;

    async fn close_position(&self, request: &CloseRequest) -> Result<OrderResult, BrokerError>;

    async fn symbol_info(&self, symbol: &str) -> Result<SymbolInfo, BrokerError>;

    async fn current_tick(&self, symbol: &str) -> Result<Tick, BrokerError>;

    /// Gateway name for logs, e.g. "terminal-bridge".
    fn name(&self) -> &str;
}
