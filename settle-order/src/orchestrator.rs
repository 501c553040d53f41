use settle_core::clock::{Clock, IdGenerator};
use settle_core::context::{CallContext, Phase};
use settle_core::identity::{Access, RequesterIdentity};
use settle_core::lock::{pay_lock_key, DistributedLock};
use settle_core::models::{Order, OrderId, OrderStatus};
use settle_core::payment::{PaymentGateway, PaymentIntent, PaymentRecord};
use settle_core::policy::PaymentPolicy;
use settle_core::repository::{run_in_transaction, OrderRepository, TransactionRunner};
use settle_core::{ConflictKind, OrderError, OrderResult};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::guard::LockGuard;

/// External collaborators the orchestrator is wired with
pub struct Collaborators {
    pub repository: Arc<dyn OrderRepository>,
    pub transactions: Arc<dyn TransactionRunner>,
    pub gateway: Arc<dyn PaymentGateway>,
    pub lock: Arc<dyn DistributedLock>,
    pub clock: Arc<dyn Clock>,
    /// `None` leaves order creation unavailable
    pub ids: Option<Arc<dyn IdGenerator>>,
}

pub struct OrderOrchestrator {
    repository: Arc<dyn OrderRepository>,
    transactions: Arc<dyn TransactionRunner>,
    gateway: Arc<dyn PaymentGateway>,
    lock: Arc<dyn DistributedLock>,
    clock: Arc<dyn Clock>,
    ids: Option<Arc<dyn IdGenerator>>,
    policy: PaymentPolicy,
}

/// Result of the conditional PENDING -> PAID write
enum CommitOutcome {
    Paid,
    /// Zero rows matched; carries the status found on re-read
    NotApplied(Option<OrderStatus>),
}

impl OrderOrchestrator {
    pub fn new(collaborators: Collaborators, policy: PaymentPolicy) -> Self {
        Self {
            repository: collaborators.repository,
            transactions: collaborators.transactions,
            gateway: collaborators.gateway,
            lock: collaborators.lock,
            clock: collaborators.clock,
            ids: collaborators.ids,
            policy,
        }
    }

    /// Create a PENDING order owned by the requester
    pub async fn create_order(
        &self,
        ctx: &CallContext,
        requester: &RequesterIdentity,
        amount_minor_units: i64,
    ) -> OrderResult<Order> {
        if amount_minor_units <= 0 {
            return Err(OrderError::InvalidArgument(format!(
                "amount_minor_units must be positive, got {}",
                amount_minor_units
            )));
        }

        let owner_id = requester.subject().ok_or(OrderError::Unauthorized)?;

        let ids = self
            .ids
            .as_ref()
            .ok_or_else(|| OrderError::Internal("order id generator is not configured".to_string()))?;

        let order = Order::new_pending(ids.new_id(), owner_id, amount_minor_units, self.clock.now());

        ctx.within(Phase::Persist, self.policy.db_timeout, async {
            self.repository.create(&order).await.map_err(OrderError::Store)
        })
        .await?;

        info!(
            order_id = %order.id,
            owner_id = %order.owner_id,
            amount = order.amount_minor_units,
            "Order created"
        );
        Ok(order)
    }

    /// Charge a PENDING order and move it to PAID.
    ///
    /// At most one pay runs per order at a time (distributed lock), the PAID
    /// write is conditional on the order still being PENDING, and the charge
    /// carries a stable idempotency key so a retried payment never charges
    /// twice at the provider.
    pub async fn pay_order(
        &self,
        ctx: &CallContext,
        requester: &RequesterIdentity,
        order_id: &OrderId,
    ) -> OrderResult<()> {
        let access = requester.access()?;
        if order_id.as_str().trim().is_empty() {
            return Err(OrderError::InvalidArgument("order id is required".to_string()));
        }

        let guard = self.acquire_pay_lock(ctx, order_id).await?;
        let result = self.pay_locked(ctx, access, order_id).await;
        guard.release().await;

        result
    }

    async fn acquire_pay_lock(&self, ctx: &CallContext, order_id: &OrderId) -> OrderResult<LockGuard> {
        let key = pay_lock_key(order_id);

        let token = ctx
            .within(Phase::LockAcquire, self.policy.lock_acquire_timeout, async {
                self.lock
                    .try_acquire(&key, self.policy.lock_ttl)
                    .await
                    .map_err(OrderError::LockStore)
            })
            .await?;

        match token {
            Some(token) => {
                debug!(order_id = %order_id, "Payment lock acquired");
                Ok(LockGuard::new(self.lock.clone(), key, token, self.policy.lock_release_timeout))
            }
            None => {
                debug!(order_id = %order_id, "Payment already in progress");
                Err(OrderError::Conflict(ConflictKind::PaymentInProgress))
            }
        }
    }

    async fn pay_locked(&self, ctx: &CallContext, access: Access<'_>, order_id: &OrderId) -> OrderResult<()> {
        let order = ctx
            .within(Phase::Read, self.policy.db_timeout, async {
                let found = match access {
                    Access::Administrative => self.repository.find_by_id(order_id).await,
                    Access::Owner(owner_id) => self.repository.find_by_id_for_owner(order_id, owner_id).await,
                };
                found.map_err(OrderError::Store)
            })
            .await?
            .ok_or(OrderError::NotFound)?;

        if !order.status.can_transition_to(OrderStatus::Paid) {
            return Err(OrderError::Conflict(ConflictKind::NotPayable(order.status)));
        }

        let intent = PaymentIntent::for_order(&order, &self.policy.currency);

        let provider_transaction_id = ctx
            .within(Phase::Charge, self.policy.gateway_timeout, async {
                self.gateway.charge(&intent).await.map_err(OrderError::Gateway)
            })
            .await
            .map_err(|e| {
                warn!(order_id = %order.id, error = %e, "Charge failed; order stays PENDING");
                e
            })?;

        let outcome = self
            .commit_paid(ctx, access, &order, &intent, &provider_transaction_id)
            .await
            .map_err(|e| {
                error!(
                    order_id = %order.id,
                    provider_transaction_id = %provider_transaction_id,
                    error = %e,
                    "Charge succeeded but recording it failed; reconciliation required"
                );
                OrderError::ChargeNotRecorded {
                    order_id: order.id.clone(),
                    provider_transaction_id: provider_transaction_id.clone(),
                    source: Box::new(e),
                }
            })?;

        match outcome {
            CommitOutcome::Paid => {
                info!(
                    order_id = %order.id,
                    provider_transaction_id = %provider_transaction_id,
                    amount = order.amount_minor_units,
                    "Order paid"
                );
                Ok(())
            }
            // Same idempotency key, so the provider returned the existing charge
            CommitOutcome::NotApplied(Some(OrderStatus::Paid)) => {
                info!(order_id = %order.id, "Order was paid by a concurrent request");
                Err(OrderError::Conflict(ConflictKind::AlreadyPaid))
            }
            CommitOutcome::NotApplied(current) => {
                error!(
                    order_id = %order.id,
                    provider_transaction_id = %provider_transaction_id,
                    current_status = ?current,
                    "Order charged but no longer PENDING; reconciliation required"
                );
                Err(OrderError::ReconciliationRequired {
                    order_id: order.id.clone(),
                    provider_transaction_id,
                })
            }
        }
    }

    async fn commit_paid(
        &self,
        ctx: &CallContext,
        access: Access<'_>,
        order: &Order,
        intent: &PaymentIntent,
        provider_transaction_id: &str,
    ) -> OrderResult<CommitOutcome> {
        let order_id = order.id.clone();
        let owner_id = access.owner().map(str::to_string);
        let updated_at = self.clock.now().max(order.updated_at);
        let record = PaymentRecord::from_charge(intent, provider_transaction_id, updated_at);

        let work = run_in_transaction(self.transactions.as_ref(), move |tx| {
            Box::pin(async move {
                let rows = match owner_id.as_deref() {
                    None => tx.update_status_if_pending(&order_id, OrderStatus::Paid, updated_at).await,
                    Some(owner_id) => {
                        tx.update_status_if_pending_for_owner(&order_id, owner_id, OrderStatus::Paid, updated_at)
                            .await
                    }
                }
                .map_err(OrderError::Store)?;

                if rows == 0 {
                    let current = tx.find_by_id(&order_id).await.map_err(OrderError::Store)?;
                    return Ok(CommitOutcome::NotApplied(current.map(|o| o.status)));
                }

                tx.record_payment(&record).await.map_err(OrderError::Store)?;
                Ok(CommitOutcome::Paid)
            })
        });

        ctx.within(Phase::Commit, self.policy.db_timeout, work).await
    }
}
