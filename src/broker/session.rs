use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};

use crate::broker::gateway::BrokerGateway;

/// Exclusive access to the single broker connection.
///
/// The terminal accepts one logical caller at a time, so every interaction
/// goes through this one mutex. A held guard spans exactly one logical
/// operation: admission + validate + submit, verify + decide, or a single
/// close attempt. Verification drops its guard before the closer acquires a
/// fresh one — two sequential acquisitions, never nested.
pub struct BrokerSession {
    gateway: Mutex<Arc<dyn BrokerGateway>>,
}

impl BrokerSession {
    pub fn new(gateway: Arc<dyn BrokerGateway>) -> Self {
        Self {
            gateway: Mutex::new(gateway),
        }
    }

    pub async fn lock(&self) -> MutexGuard<'_, Arc<dyn BrokerGateway>> {
        self.gateway.lock().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::mock::MockGateway;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn guard_serializes_access() {
        tokio_test::block_on(async {
            let session = Arc::new(BrokerSession::new(Arc::new(MockGateway::new())));
            let in_flight = Arc::new(AtomicUsize::new(0));

            let mut handles = Vec::new();
            for _ in 0..8 {
                let session = session.clone();
                let in_flight = in_flight.clone();
                handles.push(tokio::spawn(async move {
                    let _guard = session.lock().await;
                    let active = in_flight.fetch_add(1, Ordering::SeqCst);
                    assert_eq!(active, 0, "two logical operations held the session");
                    tokio::task::yield_now().await;
                    in_flight.fetch_sub(1, Ordering::SeqCst);
                }));
            }
            for h in handles {
                h.await.unwrap();
            }
        });
    }
}
