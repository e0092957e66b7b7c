//! Scripted gateway double for unit and integration tests.
//!
//! Not compiled out of the release build on purpose: operator rehearsals and
//! the integration tests under `tests/` both drive the engine against it.

use async_trait::async_trait;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::{HashMap, VecDeque};

use crate::broker::gateway::{
    BrokerError, BrokerGateway, CloseRequest, PositionFilter,
};
use crate::broker::retcode;
use crate::model::{OrderIntent, OrderResult, PositionSnapshot, SymbolInfo, Tick, TradeMode};

struct MockState {
    symbols: HashMap<String, SymbolInfo>,
    ticks: HashMap<String, Tick>,
    positions: HashMap<u64, PositionSnapshot>,
    place_script: VecDeque<Result<OrderResult, BrokerError>>,
    close_script: VecDeque<Result<OrderResult, BrokerError>>,
    next_ticket: u64,
    auto_open: bool,
    lose_close_response: bool,
    stop_loss_override: Option<Decimal>,
    place_calls: usize,
    close_calls: usize,
}

pub struct MockGateway {
    state: Mutex<MockState>,
}

impl Default for MockGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl MockGateway {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState {
                symbols: HashMap::new(),
                ticks: HashMap::new(),
                positions: HashMap::new(),
                place_script: VecDeque::new(),
                close_script: VecDeque::new(),
                next_ticket: 1000,
                auto_open: true,
                lose_close_response: false,
                stop_loss_override: None,
                place_calls: 0,
                close_calls: 0,
            }),
        }
    }

    /// Five-digit FX symbol with a 0.1 volume step, ready to trade.
    pub fn fx_symbol_info() -> SymbolInfo {
        SymbolInfo {
            digits: 5,
            point: dec!(0.00001),
            volume_step: dec!(0.1),
            volume_min: dec!(0.1),
            volume_max: dec!(100),
            stop_level_points: 10,
            freeze_level_points: 10,
            trade_mode: TradeMode::Full,
        }
    }

    pub fn with_symbol(symbol: &str) -> Self {
        let gw = Self::new();
        gw.set_symbol_info(symbol, Self::fx_symbol_info());
        gw.set_tick(
            symbol,
            Tick {
                bid: dec!(1.10000),
                ask: dec!(1.10010),
                server_time: 1_700_000_000,
            },
        );
        gw
    }

    pub fn set_symbol_info(&self, symbol: &str, info: SymbolInfo) {
        self.state.lock().symbols.insert(symbol.to_string(), info);
    }

    pub fn set_tick(&self, symbol: &str, tick: Tick) {
        self.state.lock().ticks.insert(symbol.to_string(), tick);
    }

    pub fn set_position(&self, pos: PositionSnapshot) {
        self.state.lock().positions.insert(pos.ticket, pos);
    }

    pub fn remove_position(&self, ticket: u64) {
        self.state.lock().positions.remove(&ticket);
    }

    /// When disabled, successful placements leave no position behind, as if
    /// the fill closed instantly (stop hit on the very next tick).
    pub fn set_auto_open(&self, auto_open: bool) {
        self.state.lock().auto_open = auto_open;
    }

    /// The next close deal reaches the venue (the position disappears) but
    /// its response comes back as a transport error.
    pub fn lose_next_close_response(&self) {
        self.state.lock().lose_close_response = true;
    }

    /// Every subsequent placement books this stop loss instead of the one
    /// requested, simulating broker-side drift.
    pub fn override_stop_loss(&self, stop_loss: Decimal) {
        self.state.lock().stop_loss_override = Some(stop_loss);
    }

    /// Queue the result of the next `place_order` call. When the script is
    /// empty, placements succeed with a generated ticket and exact fill.
    pub fn push_place_result(&self, result: Result<OrderResult, BrokerError>) {
        self.state.lock().place_script.push_back(result);
    }

    /// Queue the result of the next `close_position` call. When the script
    /// is empty, closes succeed and the position disappears.
    pub fn push_close_result(&self, result: Result<OrderResult, BrokerError>) {
        self.state.lock().close_script.push_back(result);
    }

    pub fn place_calls(&self) -> usize {
        self.state.lock().place_calls
    }

    pub fn close_calls(&self) -> usize {
        self.state.lock().close_calls
    }

    pub fn open_positions(&self) -> Vec<PositionSnapshot> {
        self.state.lock().positions.values().cloned().collect()
    }

    fn materialize(state: &mut MockState, intent: &OrderIntent, result: &OrderResult) {
        if let Some(ticket) = result.ticket {
            let snapshot = PositionSnapshot {
                ticket,
                symbol: intent.symbol.clone(),
                side: intent.side,
                volume: result.filled_volume.unwrap_or(intent.volume),
                stop_loss: state
                    .stop_loss_override
                    .or(intent.stop_loss)
                    .unwrap_or(Decimal::ZERO),
                take_profit: intent.take_profit.unwrap_or(Decimal::ZERO),
                open_price: result
                    .filled_price
                    .or(intent.price)
                    .unwrap_or(Decimal::ZERO),
                magic: intent.magic,
                open_time: 1_700_000_000,
            };
            state.positions.insert(ticket, snapshot);
        }
    }
}

#[async_trait]
impl BrokerGateway for MockGateway {
    async fn place_order(&self, intent: &OrderIntent) -> Result<OrderResult, BrokerError> {
        let mut state = self.state.lock();
        state.place_calls += 1;

        let result = match state.place_script.pop_front() {
            Some(scripted) => scripted,
            None => {
                state.next_ticket += 1;
                let ticket = state.next_ticket;
                Ok(OrderResult {
                    retcode: retcode::DONE,
                    ticket: Some(ticket),
                    filled_volume: Some(intent.volume),
                    filled_price: intent.price,
                })
            }
        };

        if let Ok(ref ok) = result {
            if ok.retcode == retcode::DONE && state.auto_open {
                Self::materialize(&mut state, intent, ok);
            }
        }
        result
    }

    async fn positions_get(
        &self,
        filter: &PositionFilter,
    ) -> Result<Vec<PositionSnapshot>, BrokerError> {
        let state = self.state.lock();
        Ok(state
            .positions
            .values()
            .filter(|p| filter.matches(p))
            .cloned()
            .collect())
    }

    async fn close_position(&self, request: &CloseRequest) -> Result<OrderResult, BrokerError> {
        let mut state = self.state.lock();
        state.close_calls += 1;

        if state.lose_close_response {
            state.lose_close_response = false;
            state.positions.remove(&request.ticket);
            return Err(BrokerError::Network("close response lost".to_string()));
        }

        let result = match state.close_script.pop_front() {
            Some(scripted) => scripted,
            None => Ok(OrderResult {
                retcode: retcode::DONE,
                ticket: Some(request.ticket),
                filled_volume: Some(request.volume),
                filled_price: Some(request.price),
            }),
        };

        if let Ok(ref ok) = result {
            if ok.retcode == retcode::DONE {
                state.positions.remove(&request.ticket);
            }
        }
        result
    }

    async fn symbol_info(&self, symbol: &str) -> Result<SymbolInfo, BrokerError> {
        self.state
            .lock()
            .symbols
            .get(symbol)
            .cloned()
            .ok_or_else(|| BrokerError::Api(format!("Symbol {} not found", symbol)))
    }

    async fn current_tick(&self, symbol: &str) -> Result<Tick, BrokerError> {
        self.state
            .lock()
            .ticks
            .get(symbol)
            .cloned()
            .ok_or_else(|| BrokerError::Api(format!("No tick for {}", symbol)))
    }

    fn name(&self) -> &str {
        "mock"
    }
}
