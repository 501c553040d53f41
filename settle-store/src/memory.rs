//! In-memory adapters for the order store and the lock store.
//!
//! They follow the same contracts as the Postgres and Redis adapters and are
//! what the orchestrator and HTTP tests run against.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use settle_core::lock::{DistributedLock, LockToken};
use settle_core::models::{Order, OrderId, OrderStatus};
use settle_core::payment::PaymentRecord;
use settle_core::repository::{OrderRepository, OrderTransaction, TransactionRunner};
use settle_core::BoxError;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::time::Instant;

#[derive(Debug, Clone, Default)]
struct StoreState {
    orders: HashMap<OrderId, Order>,
    payments: HashMap<String, PaymentRecord>,
}

impl StoreState {
    fn find(&self, id: &OrderId, owner_id: Option<&str>) -> Option<Order> {
        self.orders
            .get(id)
            .filter(|order| owner_id.map_or(true, |owner| order.is_owned_by(owner)))
            .cloned()
    }

    fn update_if_pending(
        &mut self,
        id: &OrderId,
        owner_id: Option<&str>,
        status: OrderStatus,
        updated_at: DateTime<Utc>,
    ) -> u64 {
        match self.orders.get_mut(id) {
            Some(order)
                if order.status == OrderStatus::Pending
                    && owner_id.map_or(true, |owner| order.is_owned_by(owner)) =>
            {
                order.status = status;
                order.updated_at = updated_at;
                1
            }
            _ => 0,
        }
    }
}

/// Order repository and transaction runner backed by a shared map.
///
/// Transactions take the store mutex for their whole lifetime and work on a
/// staged copy, so an uncommitted transaction leaves no trace.
#[derive(Clone, Default)]
pub struct InMemoryOrderStore {
    state: Arc<Mutex<StoreState>>,
    fail_commits: Arc<AtomicBool>,
    creates: Arc<AtomicUsize>,
}

impl InMemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following commit fail (and discard its writes).
    pub fn fail_commits(&self, fail: bool) {
        self.fail_commits.store(fail, Ordering::SeqCst);
    }

    /// Number of successful `create` calls
    pub fn create_count(&self) -> usize {
        self.creates.load(Ordering::SeqCst)
    }

    pub async fn payments_for(&self, id: &OrderId) -> Vec<PaymentRecord> {
        let state = self.state.lock().await;
        state.payments.values().filter(|p| &p.order_id == id).cloned().collect()
    }
}

#[async_trait]
impl OrderRepository for InMemoryOrderStore {
    async fn create(&self, order: &Order) -> Result<(), BoxError> {
        let mut state = self.state.lock().await;
        if state.orders.contains_key(&order.id) {
            return Err(format!("duplicate order id {}", order.id).into());
        }
        state.orders.insert(order.id.clone(), order.clone());
        self.creates.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn find_by_id(&self, id: &OrderId) -> Result<Option<Order>, BoxError> {
        Ok(self.state.lock().await.find(id, None))
    }

    async fn find_by_id_for_owner(&self, id: &OrderId, owner_id: &str) -> Result<Option<Order>, BoxError> {
        Ok(self.state.lock().await.find(id, Some(owner_id)))
    }

    async fn update(&self, order: &Order) -> Result<bool, BoxError> {
        let mut state = self.state.lock().await;
        match state.orders.get_mut(&order.id) {
            Some(stored) => {
                stored.status = order.status;
                stored.updated_at = order.updated_at;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn update_status_if_pending(
        &self,
        id: &OrderId,
        status: OrderStatus,
        updated_at: DateTime<Utc>,
    ) -> Result<u64, BoxError> {
        Ok(self.state.lock().await.update_if_pending(id, None, status, updated_at))
    }

    async fn update_status_if_pending_for_owner(
        &self,
        id: &OrderId,
        owner_id: &str,
        status: OrderStatus,
        updated_at: DateTime<Utc>,
    ) -> Result<u64, BoxError> {
        Ok(self.state.lock().await.update_if_pending(id, Some(owner_id), status, updated_at))
    }
}

#[async_trait]
impl TransactionRunner for InMemoryOrderStore {
    async fn begin(&self) -> Result<Box<dyn OrderTransaction>, BoxError> {
        let guard = self.state.clone().lock_owned().await;
        let staged = guard.clone();
        Ok(Box::new(InMemoryTransaction {
            guard: Some(guard),
            staged,
            fail_commit: self.fail_commits.load(Ordering::SeqCst),
        }))
    }
}

pub struct InMemoryTransaction {
    guard: Option<OwnedMutexGuard<StoreState>>,
    staged: StoreState,
    fail_commit: bool,
}

impl InMemoryTransaction {
    fn ensure_open(&self) -> Result<(), BoxError> {
        if self.guard.is_none() {
            return Err("transaction already finished".into());
        }
        Ok(())
    }
}

#[async_trait]
impl OrderTransaction for InMemoryTransaction {
    async fn find_by_id(&mut self, id: &OrderId) -> Result<Option<Order>, BoxError> {
        self.ensure_open()?;
        Ok(self.staged.find(id, None))
    }

    async fn update_status_if_pending(
        &mut self,
        id: &OrderId,
        status: OrderStatus,
        updated_at: DateTime<Utc>,
    ) -> Result<u64, BoxError> {
        self.ensure_open()?;
        Ok(self.staged.update_if_pending(id, None, status, updated_at))
    }

    async fn update_status_if_pending_for_owner(
        &mut self,
        id: &OrderId,
        owner_id: &str,
        status: OrderStatus,
        updated_at: DateTime<Utc>,
    ) -> Result<u64, BoxError> {
        self.ensure_open()?;
        Ok(self.staged.update_if_pending(id, Some(owner_id), status, updated_at))
    }

    async fn record_payment(&mut self, record: &PaymentRecord) -> Result<(), BoxError> {
        self.ensure_open()?;
        self.staged
            .payments
            .entry(record.idempotency_key.clone())
            .or_insert_with(|| record.clone());
        Ok(())
    }

    async fn commit(&mut self) -> Result<(), BoxError> {
        let mut guard = self.guard.take().ok_or("transaction already finished")?;
        if self.fail_commit {
            return Err("commit rejected by store".into());
        }
        *guard = std::mem::take(&mut self.staged);
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), BoxError> {
        self.guard.take();
        Ok(())
    }
}

/// Lock store with expiring keys on the tokio clock
#[derive(Clone, Default)]
pub struct InMemoryLock {
    entries: Arc<Mutex<HashMap<String, (LockToken, Instant)>>>,
    unavailable: Arc<AtomicBool>,
}

impl InMemoryLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate the lock store being unreachable
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub async fn is_held(&self, key: &str) -> bool {
        let entries = self.entries.lock().await;
        entries.get(key).is_some_and(|(_, expires_at)| *expires_at > Instant::now())
    }

    fn check_available(&self) -> Result<(), BoxError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err("lock store unavailable".into());
        }
        Ok(())
    }
}

#[async_trait]
impl DistributedLock for InMemoryLock {
    async fn try_acquire(&self, key: &str, ttl: Duration) -> Result<Option<LockToken>, BoxError> {
        self.check_available()?;
        let mut entries = self.entries.lock().await;
        let now = Instant::now();

        if let Some((_, expires_at)) = entries.get(key) {
            if *expires_at > now {
                return Ok(None);
            }
        }

        let token = LockToken::generate();
        entries.insert(key.to_string(), (token.clone(), now + ttl));
        Ok(Some(token))
    }

    async fn release(&self, key: &str, token: &LockToken) -> Result<bool, BoxError> {
        self.check_available()?;
        let mut entries = self.entries.lock().await;
        match entries.get(key) {
            Some((holder, _)) if holder == token => {
                entries.remove(key);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pending(id: &str, owner: &str) -> Order {
        Order::new_pending(OrderId::new(id), owner, 1200, Utc::now())
    }

    #[tokio::test]
    async fn test_conditional_update_only_moves_pending_orders() {
        let store = InMemoryOrderStore::new();
        let order = pending("o-1", "u1");
        store.create(&order).await.unwrap();

        let first = store.update_status_if_pending(&order.id, OrderStatus::Paid, Utc::now()).await.unwrap();
        let second = store.update_status_if_pending(&order.id, OrderStatus::Paid, Utc::now()).await.unwrap();

        assert_eq!(first, 1);
        assert_eq!(second, 0);
        assert_eq!(store.find_by_id(&order.id).await.unwrap().unwrap().status, OrderStatus::Paid);
    }

    #[tokio::test]
    async fn test_owner_scoping_hides_foreign_orders() {
        let store = InMemoryOrderStore::new();
        let order = pending("o-1", "u1");
        store.create(&order).await.unwrap();

        assert!(store.find_by_id_for_owner(&order.id, "u2").await.unwrap().is_none());
        assert!(store.find_by_id_for_owner(&order.id, "u1").await.unwrap().is_some());

        let rows = store
            .update_status_if_pending_for_owner(&order.id, "u2", OrderStatus::Paid, Utc::now())
            .await
            .unwrap();
        assert_eq!(rows, 0);
        assert_eq!(store.find_by_id(&order.id).await.unwrap().unwrap().status, OrderStatus::Pending);
    }

    #[tokio::test]
    async fn test_duplicate_create_is_rejected() {
        let store = InMemoryOrderStore::new();
        let order = pending("o-1", "u1");
        store.create(&order).await.unwrap();

        assert!(store.create(&order).await.is_err());
        assert_eq!(store.create_count(), 1);
    }

    #[tokio::test]
    async fn test_update_keeps_amount() {
        let store = InMemoryOrderStore::new();
        let order = pending("o-1", "u1");
        store.create(&order).await.unwrap();

        let mut changed = order.clone();
        changed.amount_minor_units = 1;
        changed.status = OrderStatus::Canceled;
        assert!(store.update(&changed).await.unwrap());

        let stored = store.find_by_id(&order.id).await.unwrap().unwrap();
        assert_eq!(stored.amount_minor_units, 1200);
        assert_eq!(stored.status, OrderStatus::Canceled);
        assert!(!store.update(&pending("missing", "u1")).await.unwrap());
    }

    #[tokio::test]
    async fn test_dropped_transaction_discards_writes() {
        let store = InMemoryOrderStore::new();
        let order = pending("o-1", "u1");
        store.create(&order).await.unwrap();

        {
            let mut tx = store.begin().await.unwrap();
            let rows = tx.update_status_if_pending(&order.id, OrderStatus::Paid, Utc::now()).await.unwrap();
            assert_eq!(rows, 1);
        }

        assert_eq!(store.find_by_id(&order.id).await.unwrap().unwrap().status, OrderStatus::Pending);
    }

    #[tokio::test(start_paused = true)]
    async fn test_lock_is_exclusive_until_ttl() {
        let lock = InMemoryLock::new();
        let ttl = Duration::from_secs(15);

        let token = lock.try_acquire("lock:pay:o-1", ttl).await.unwrap().expect("first acquire");
        assert!(lock.try_acquire("lock:pay:o-1", ttl).await.unwrap().is_none());

        tokio::time::advance(Duration::from_secs(16)).await;
        let next = lock.try_acquire("lock:pay:o-1", ttl).await.unwrap().expect("acquire after expiry");

        // The first holder's token no longer owns the key
        assert!(!lock.release("lock:pay:o-1", &token).await.unwrap());
        assert!(lock.is_held("lock:pay:o-1").await);

        assert!(lock.release("lock:pay:o-1", &next).await.unwrap());
        assert!(!lock.is_held("lock:pay:o-1").await);
    }

    #[tokio::test]
    async fn test_unavailable_lock_store_errors() {
        let lock = InMemoryLock::new();
        lock.set_unavailable(true);
        assert!(lock.try_acquire("k", Duration::from_secs(1)).await.is_err());
    }
}
