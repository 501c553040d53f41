use async_trait::async_trait;
use settle_core::payment::{PaymentGateway, PaymentIntent};
use settle_core::BoxError;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::info;
use uuid::Uuid;

/// Provider stand-in that honours idempotency keys.
///
/// The first charge for a key creates a provider transaction; every repeat
/// returns that same transaction without charging again. Latency and
/// failures can be injected.
#[derive(Default)]
pub struct SandboxPaymentGateway {
    charges: Mutex<HashMap<String, String>>,
    attempts: AtomicUsize,
    pending_failures: AtomicUsize,
    latency: Option<Duration>,
}

impl SandboxPaymentGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_latency(latency: Duration) -> Self {
        Self { latency: Some(latency), ..Self::default() }
    }

    /// Decline the next `count` charge calls
    pub fn fail_next(&self, count: usize) {
        self.pending_failures.store(count, Ordering::SeqCst);
    }

    /// Every call to `charge`, including declined and repeated ones
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Real-world charges executed (one per idempotency key)
    pub async fn charge_count(&self) -> usize {
        self.charges.lock().await.len()
    }
}

#[async_trait]
impl PaymentGateway for SandboxPaymentGateway {
    async fn charge(&self, intent: &PaymentIntent) -> Result<String, BoxError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        let declined = self
            .pending_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if declined {
            return Err(format!("charge {} declined by provider", intent.idempotency_key).into());
        }

        if intent.amount <= 0 {
            return Err(format!("invalid charge amount {}", intent.amount).into());
        }

        let mut charges = self.charges.lock().await;
        let transaction_id = charges
            .entry(intent.idempotency_key.clone())
            .or_insert_with(|| {
                info!(
                    order_id = %intent.order_id,
                    amount = intent.amount,
                    currency = %intent.currency,
                    "Sandbox charge executed"
                );
                format!("sbx_{}", Uuid::new_v4().simple())
            })
            .clone();

        Ok(transaction_id)
    }
}
