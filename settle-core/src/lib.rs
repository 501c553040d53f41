pub mod clock;
pub mod context;
pub mod identity;
pub mod lock;
pub mod models;
pub mod payment;
pub mod policy;
pub mod repository;

pub use clock::{Clock, IdGenerator, SystemClock, UuidGenerator};
pub use context::{CallContext, Phase};
pub use identity::{Access, RequesterIdentity};
pub use lock::{DistributedLock, LockToken};
pub use models::{Order, OrderId, OrderStatus};
pub use payment::{PaymentGateway, PaymentIntent, PaymentRecord};
pub use policy::PaymentPolicy;
pub use repository::{run_in_transaction, OrderRepository, OrderTransaction, RollbackFailed, TransactionRunner};

/// Error type returned by every external collaborator (database, lock store, payment provider).
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, thiserror::Error)]
pub enum OrderError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error("Requester could not be resolved")]
    Unauthorized,
    #[error("Order not found")]
    NotFound,
    #[error("Conflict: {0}")]
    Conflict(ConflictKind),
    #[error("Internal service error: {0}")]
    Internal(String),
    /// The provider executed the charge but the order never reached PAID.
    /// Needs an operator (or an out-of-band retry) to reconcile.
    #[error("Order {order_id} was charged ({provider_transaction_id}) but the status change was not committed")]
    ReconciliationRequired {
        order_id: OrderId,
        provider_transaction_id: String,
    },
    /// The charge went through but the PAID write failed or timed out, so the
    /// order may still read PENDING.
    #[error("Order {order_id} was charged ({provider_transaction_id}) but recording the payment failed: {source}")]
    ChargeNotRecorded {
        order_id: OrderId,
        provider_transaction_id: String,
        #[source]
        source: Box<OrderError>,
    },
    #[error("Deadline exceeded during {0}")]
    DeadlineExceeded(Phase),
    #[error("Order store error: {0}")]
    Store(#[source] BoxError),
    #[error("Lock store error: {0}")]
    LockStore(#[source] BoxError),
    #[error("Payment gateway error: {0}")]
    Gateway(#[source] BoxError),
    #[error("Transaction error: {0}")]
    Transaction(#[source] BoxError),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConflictKind {
    #[error("a payment for this order is already in progress")]
    PaymentInProgress,
    #[error("order is {0} and cannot be paid")]
    NotPayable(OrderStatus),
    #[error("order was paid by a concurrent request")]
    AlreadyPaid,
}

impl OrderError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, OrderError::Conflict(_))
    }
}

pub type OrderResult<T> = Result<T, OrderError>;
