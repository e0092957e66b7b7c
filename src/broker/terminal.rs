//! HTTP gateway to the broker terminal bridge.
//!
//! The bridge is a thin sidecar in front of the trading terminal; it exposes
//! order placement, position queries and market data as JSON endpoints. All
//! transport failures surface as `BrokerError::Network` so callers can treat
//! them uniformly (no fill may be assumed).

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;

use crate::broker::gateway::{BrokerError, BrokerGateway, CloseRequest, PositionFilter};
use crate::config::BrokerConfig;
use crate::model::{OrderIntent, OrderResult, PositionSnapshot, SymbolInfo, Tick};

pub struct TerminalGateway {
    base_url: String,
    client: Client,
}

#[derive(Serialize)]
struct ClosePayload<'a> {
    ticket: u64,
    symbol: &'a str,
    side: &'a str,
    volume: String,
    price: String,
    deviation_points: u32,
    magic: u64,
}

impl TerminalGateway {
    pub fn new(config: &BrokerConfig) -> Result<Self, BrokerError> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()
            .map_err(|e| BrokerError::Network(format!("HTTP client init: {}", e)))?;

        Ok(TerminalGateway {
            base_url: config.bridge_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T, BrokerError> {
        let url = format!("{}{}", self.base_url, path);
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| BrokerError::Network(e.to_string()))?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| BrokerError::Network(e.to_string()))?;

        if !status.is_success() {
            return Err(BrokerError::Api(format!(
                "Bridge request {} failed {}: {}",
                path, status, text
            )));
        }

        serde_json::from_str(&text)
            .map_err(|e| BrokerError::Malformed(format!("Bridge response {}: {}", path, e)))
    }

    async fn post_json<B: Serialize, T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, BrokerError> {
        let url = format!("{}{}", self.base_url, path);
        let resp = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| BrokerError::Network(e.to_string()))?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| BrokerError::Network(e.to_string()))?;

        if !status.is_success() {
            return Err(BrokerError::Api(format!(
                "Bridge request {} failed {}: {}",
                path, status, text
            )));
        }

        serde_json::from_str(&text)
            .map_err(|e| BrokerError::Malformed(format!("Bridge response {}: {}", path, e)))
    }
}

#[async_trait]
impl BrokerGateway for TerminalGateway {
    async fn place_order(&self, intent: &OrderIntent) -> Result<OrderResult, BrokerError> {
        self.post_json("/order/send", intent).await
    }

    async fn positions_get(
        &self,
        filter: &PositionFilter,
    ) -> Result<Vec<PositionSnapshot>, BrokerError> {
        let mut query = Vec::new();
        if let Some(ref symbol) = filter.symbol {
            query.push(format!("symbol={}", symbol));
        }
        if let Some(ticket) = filter.ticket {
            query.push(format!("ticket={}", ticket));
        }
        if let Some(magic) = filter.magic {
            query.push(format!("magic={}", magic));
        }
        let path = if query.is_empty() {
            "/positions".to_string()
        } else {
            format!("/positions?{}", query.join("&"))
        };
        self.get_json(&path).await
    }

    async fn close_position(&self, request: &CloseRequest) -> Result<OrderResult, BrokerError> {
        let payload = ClosePayload {
            ticket: request.ticket,
            symbol: &request.symbol,
            side: match request.side {
                crate::model::Side::Buy => "BUY",
                crate::model::Side::Sell => "SELL",
            },
            volume: request.volume.to_string(),
            price: request.price.to_string(),
            deviation_points: request.deviation_points,
            magic: request.magic,
        };
        self.post_json("/position/close", &payload).await
    }

    async fn symbol_info(&self, symbol: &str) -> Result<SymbolInfo, BrokerError> {
        self.get_json(&format!("/symbol/{}", symbol)).await
    }

    async fn current_tick(&self, symbol: &str) -> Result<Tick, BrokerError> {
        self.get_json(&format!("/tick/{}", symbol)).await
    }

    fn name(&self) -> &str {
        "terminal-bridge"
    }
}
