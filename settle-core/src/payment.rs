use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{Order, OrderId};
use crate::BoxError;

/// Operation prefix for charge idempotency keys. Refunds/cancellations get their own prefix.
pub const PAY_OPERATION: &str = "pay";

/// Deterministic idempotency key for `operation` on `order_id`. Never random.
pub fn idempotency_key(operation: &str, order_id: &OrderId) -> String {
    format!("{}:{}", operation, order_id)
}

/// Transient charge request handed to the payment provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentIntent {
    pub order_id: OrderId,
    pub amount: i64,
    pub currency: String,
    pub idempotency_key: String,
}

impl PaymentIntent {
    /// Build the charge for paying `order` in full. Every retry of the same
    /// payment yields the same idempotency key.
    pub fn for_order(order: &Order, currency: &str) -> Self {
        Self {
            order_id: order.id.clone(),
            amount: order.amount_minor_units,
            currency: currency.to_string(),
            idempotency_key: idempotency_key(PAY_OPERATION, &order.id),
        }
    }
}

/// Receipt of an executed charge, stored alongside the PAID transition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRecord {
    pub order_id: OrderId,
    pub provider_transaction_id: String,
    pub idempotency_key: String,
    pub amount: i64,
    pub currency: String,
    pub recorded_at: DateTime<Utc>,
}

impl PaymentRecord {
    pub fn from_charge(intent: &PaymentIntent, provider_transaction_id: &str, recorded_at: DateTime<Utc>) -> Self {
        Self {
            order_id: intent.order_id.clone(),
            provider_transaction_id: provider_transaction_id.to_string(),
            idempotency_key: intent.idempotency_key.clone(),
            amount: intent.amount,
            currency: intent.currency.clone(),
            recorded_at,
        }
    }
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Execute the charge and return the provider's transaction id.
    ///
    /// Repeated calls carrying the same `idempotency_key` must not produce
    /// another real-world charge.
    async fn charge(&self, intent: &PaymentIntent) -> Result<String, BoxError>;
}
