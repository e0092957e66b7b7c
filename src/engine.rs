//! Execution engine: one intent in, one accounted-for outcome out.
//!
//! Pipeline: admission, validation, submission, verification, and (on
//! drift) defensive close. Admission and submission run under a single
//! session guard so two intents for the same symbol cannot both pass the
//! exclusivity gate; verification takes a second guard, and each close
//! attempt a third. Guards are never nested.

use std::sync::Arc;
use tracing::{info, warn};

use crate::admission::AdmissionGuard;
use crate::broker::session::BrokerSession;
use crate::closer::PositionCloser;
use crate::error::TradeError;
use crate::executor::OrderExecutor;
use crate::model::{OrderIntent, OrderResult, VerifyOutcome};
use crate::verifier::PositionVerifier;

/// Terminal state of a handled intent. Failures travel as `TradeError`.
#[derive(Debug, Clone)]
pub enum ExecutionOutcome {
    /// An admission gate refused the intent. Nothing touched the venue.
    Denied { reason: String },
    Filled(ExecutionReport),
}

#[derive(Debug, Clone)]
pub struct ExecutionReport {
    pub signal_id: String,
    pub ticket: u64,
    pub result: OrderResult,
    /// False when the position was already gone at verification time
    /// (closed by stop or externally). The fill itself still happened.
    pub verified: bool,
}

pub struct ExecutionEngine {
    session: Arc<BrokerSession>,
    admission: AdmissionGuard,
    executor: OrderExecutor,
    verifier: PositionVerifier,
    closer: PositionCloser,
}

impl ExecutionEngine {
    pub fn new(
        session: Arc<BrokerSession>,
        admission: AdmissionGuard,
        executor: OrderExecutor,
        verifier: PositionVerifier,
        closer: PositionCloser,
    ) -> Self {
        Self {
            session,
            admission,
            executor,
            verifier,
            closer,
        }
    }

    pub async fn handle_intent(
        &self,
        intent: &OrderIntent,
    ) -> Result<ExecutionOutcome, TradeError> {
        info!(
            "Handling intent {}: {:?} {} {}",
            intent.signal_id, intent.side, intent.volume, intent.symbol
        );

        // Phase 1: admission and submission under one guard.
        let submitted = {
            let guard = self.session.lock().await;
            let gateway: &dyn crate::broker::gateway::BrokerGateway = &**guard;

            let decision = self.admission.evaluate_locked(gateway, &intent.symbol).await;
            if !decision.allowed {
                return Ok(ExecutionOutcome::Denied {
                    reason: decision.reason,
                });
            }

            self.executor.execute_locked(gateway, intent).await?
        };

        // Phase 2: verification under its own guard.
        let outcome = {
            let guard = self.session.lock().await;
            let gateway: &dyn crate::broker::gateway::BrokerGateway = &**guard;
            self.verifier
                .verify_locked(gateway, submitted.ticket, &submitted.intent)
                .await
        };

        match outcome {
            Ok(VerifyOutcome::Verified) => Ok(ExecutionOutcome::Filled(ExecutionReport {
                signal_id: intent.signal_id.clone(),
                ticket: submitted.ticket,
                result: submitted.result,
                verified: true,
            })),
            Ok(VerifyOutcome::NotFound) => {
                info!(
                    "Ticket {} gone before verification, treating fill as final",
                    submitted.ticket
                );
                Ok(ExecutionOutcome::Filled(ExecutionReport {
                    signal_id: intent.signal_id.clone(),
                    ticket: submitted.ticket,
                    result: submitted.result,
                    verified: false,
                }))
            }
            Ok(VerifyOutcome::Mismatch {
                field,
                expected,
                observed,
            }) => {
                warn!(
                    "Ticket {} drifted on {}, closing defensively",
                    submitted.ticket, field
                );
                self.closer.close(&self.session, submitted.ticket).await?;
                Err(TradeError::Mismatch {
                    ticket: submitted.ticket,
                    field,
                    expected,
                    observed,
                })
            }
            // An unverifiable fill leaves position state unknown. Close it
            // rather than carry a position nobody vouches for.
            Err(e) => {
                warn!(
                    "Cannot verify ticket {} ({}), closing defensively",
                    submitted.ticket, e
                );
                self.closer.close(&self.session, submitted.ticket).await?;
                Err(e)
            }
        }
    }
}
