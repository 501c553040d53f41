use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::future::{BoxFuture, FutureExt};
use std::panic::AssertUnwindSafe;
use tracing::{error, warn};

use crate::models::{Order, OrderId, OrderStatus};
use crate::payment::PaymentRecord;
use crate::{BoxError, OrderError};

/// Repository trait for order data access outside of a transaction
#[async_trait]
pub trait OrderRepository: Send + Sync {
    async fn create(&self, order: &Order) -> Result<(), BoxError>;

    async fn find_by_id(&self, id: &OrderId) -> Result<Option<Order>, BoxError>;

    /// Same as `find_by_id`, but an order owned by someone else is reported as absent.
    async fn find_by_id_for_owner(&self, id: &OrderId, owner_id: &str) -> Result<Option<Order>, BoxError>;

    /// Persist the mutable fields (status, updated_at). Returns false when the order does not exist.
    async fn update(&self, order: &Order) -> Result<bool, BoxError>;

    /// Single atomic `UPDATE ... WHERE id = ? AND status = 'PENDING'`. Returns rows changed.
    async fn update_status_if_pending(
        &self,
        id: &OrderId,
        status: OrderStatus,
        updated_at: DateTime<Utc>,
    ) -> Result<u64, BoxError>;

    async fn update_status_if_pending_for_owner(
        &self,
        id: &OrderId,
        owner_id: &str,
        status: OrderStatus,
        updated_at: DateTime<Utc>,
    ) -> Result<u64, BoxError>;
}

/// Order persistence bound to one open transaction.
///
/// Handed explicitly to the unit of work by [`run_in_transaction`]; nothing is
/// looked up from ambient state.
#[async_trait]
pub trait OrderTransaction: Send {
    async fn find_by_id(&mut self, id: &OrderId) -> Result<Option<Order>, BoxError>;

    async fn update_status_if_pending(
        &mut self,
        id: &OrderId,
        status: OrderStatus,
        updated_at: DateTime<Utc>,
    ) -> Result<u64, BoxError>;

    async fn update_status_if_pending_for_owner(
        &mut self,
        id: &OrderId,
        owner_id: &str,
        status: OrderStatus,
        updated_at: DateTime<Utc>,
    ) -> Result<u64, BoxError>;

    async fn record_payment(&mut self, record: &PaymentRecord) -> Result<(), BoxError>;

    async fn commit(&mut self) -> Result<(), BoxError>;

    async fn rollback(&mut self) -> Result<(), BoxError>;
}

#[async_trait]
pub trait TransactionRunner: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn OrderTransaction>, BoxError>;
}

/// A rollback that failed after the unit of work returned an error.
/// `cause` is the error the work returned.
#[derive(Debug, thiserror::Error)]
#[error("rollback failed after `{cause}`: {source}")]
pub struct RollbackFailed {
    pub cause: OrderError,
    #[source]
    pub source: BoxError,
}

/// Run `work` atomically.
///
/// Commits when `work` returns `Ok`, rolls back when it returns `Err`. A panic
/// inside `work` rolls back first and is then resumed. Begin, commit and
/// rollback failures come back as [`OrderError::Transaction`], never as the
/// business error of `work`; a failed rollback carries that error as
/// [`RollbackFailed::cause`].
pub async fn run_in_transaction<T, F>(runner: &dyn TransactionRunner, work: F) -> Result<T, OrderError>
where
    T: Send,
    F: for<'t> FnOnce(&'t mut dyn OrderTransaction) -> BoxFuture<'t, Result<T, OrderError>> + Send,
{
    let mut tx = runner.begin().await.map_err(OrderError::Transaction)?;

    let outcome = AssertUnwindSafe(work(tx.as_mut())).catch_unwind().await;

    match outcome {
        Ok(Ok(value)) => {
            tx.commit().await.map_err(OrderError::Transaction)?;
            Ok(value)
        }
        Ok(Err(err)) => match tx.rollback().await {
            Ok(()) => Err(err),
            Err(rollback_err) => {
                warn!(error = %rollback_err, cause = %err, "Rollback after failed unit of work did not complete");
                Err(OrderError::Transaction(Box::new(RollbackFailed { cause: err, source: rollback_err })))
            }
        },
        Err(panic) => {
            if let Err(rollback_err) = tx.rollback().await {
                error!(error = %rollback_err, "Rollback after panic did not complete");
            }
            std::panic::resume_unwind(panic)
        }
    }
}
