//! NATS intake: order intents in, execution results out.
//!
//! Intents arrive on `trenda.execution.intent.>` and are handled strictly
//! one at a time; the broker terminal takes one caller anyway, and ordering
//! inside the engine is what the safety gates rely on. Every intent gets
//! exactly one result message on `trenda.execution.result`, including
//! denials and failures.

use futures::StreamExt;
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::engine::{ExecutionEngine, ExecutionOutcome};
use crate::model::OrderIntent;

pub const INTENT_SUBJECT: &str = "trenda.execution.intent.>";
pub const RESULT_SUBJECT: &str = "trenda.execution.result";

#[derive(Serialize)]
struct ResultMessage<'a> {
    signal_id: &'a str,
    status: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    ticket: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    detail: Option<String>,
}

pub async fn start_nats_engine(
    client: async_nats::Client,
    engine: Arc<ExecutionEngine>,
) -> Result<tokio::task::JoinHandle<()>, Box<dyn std::error::Error + Send + Sync>> {
    let mut subscription = client.subscribe(INTENT_SUBJECT).await.map_err(|e| {
        error!("❌ Failed to subscribe to {}: {}", INTENT_SUBJECT, e);
        e
    })?;
    info!("🚀 Listening for intents on '{}'", INTENT_SUBJECT);

    let handle = tokio::spawn(async move {
        while let Some(msg) = subscription.next().await {
            let intent = match serde_json::from_slice::<OrderIntent>(&msg.payload) {
                Ok(intent) => intent,
                Err(e) => {
                    warn!("Malformed intent payload dropped: {}", e);
                    continue;
                }
            };

            info!("Intent received: {} {}", intent.symbol, intent.signal_id);
            let result = engine.handle_intent(&intent).await;

            let message = match &result {
                Ok(ExecutionOutcome::Filled(report)) => ResultMessage {
                    signal_id: &intent.signal_id,
                    status: if report.verified { "filled" } else { "filled_unconfirmed" },
                    ticket: Some(report.ticket),
                    detail: None,
                },
                Ok(ExecutionOutcome::Denied { reason }) => ResultMessage {
                    signal_id: &intent.signal_id,
                    status: "denied",
                    ticket: None,
                    detail: Some(reason.clone()),
                },
                Err(e) => ResultMessage {
                    signal_id: &intent.signal_id,
                    status: "failed",
                    ticket: None,
                    detail: Some(e.to_string()),
                },
            };

            match serde_json::to_vec(&message) {
                Ok(payload) => {
                    if let Err(e) = client.publish(RESULT_SUBJECT, payload.into()).await {
                        error!("Failed to publish result for {}: {}", intent.signal_id, e);
                    }
                }
                Err(e) => error!("Failed to encode result for {}: {}", intent.signal_id, e),
            }
        }
        warn!("Intent subscription closed");
    });

    Ok(handle)
}
