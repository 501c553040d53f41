#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use settle_core::{
    BoxError, Clock, DistributedLock, IdGenerator, LockToken, OrderId, PaymentGateway, PaymentIntent, PaymentPolicy,
};
use settle_order::{Collaborators, OrderOrchestrator, SandboxPaymentGateway};
use settle_store::{InMemoryLock, InMemoryOrderStore};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

pub fn epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 9, 27, 12, 0, 0).unwrap()
}

#[derive(Default)]
pub struct SequentialIds(AtomicUsize);

impl IdGenerator for SequentialIds {
    fn new_id(&self) -> OrderId {
        OrderId::new(format!("order-{}", self.0.fetch_add(1, Ordering::SeqCst) + 1))
    }
}

/// Grants every acquire: stands in for a lock that failed to exclude
#[derive(Default)]
pub struct AlwaysGrantLock;

#[async_trait]
impl DistributedLock for AlwaysGrantLock {
    async fn try_acquire(&self, _key: &str, _ttl: Duration) -> Result<Option<LockToken>, BoxError> {
        Ok(Some(LockToken::generate()))
    }

    async fn release(&self, _key: &str, _token: &LockToken) -> Result<bool, BoxError> {
        Ok(true)
    }
}

/// Real lock whose release either errors or never returns
pub struct BrokenReleaseLock {
    pub inner: InMemoryLock,
    pub hang: bool,
}

#[async_trait]
impl DistributedLock for BrokenReleaseLock {
    async fn try_acquire(&self, key: &str, ttl: Duration) -> Result<Option<LockToken>, BoxError> {
        self.inner.try_acquire(key, ttl).await
    }

    async fn release(&self, _key: &str, _token: &LockToken) -> Result<bool, BoxError> {
        if self.hang {
            std::future::pending::<()>().await;
        }
        Err("connection reset".into())
    }
}

/// Gateway that runs `before_charge` and then delegates to a sandbox
pub struct HookedGateway<F> {
    pub sandbox: SandboxPaymentGateway,
    pub before_charge: F,
}

#[async_trait]
impl<F, Fut> PaymentGateway for HookedGateway<F>
where
    F: Fn(PaymentIntent) -> Fut + Send + Sync,
    Fut: std::future::Future<Output = ()> + Send,
{
    async fn charge(&self, intent: &PaymentIntent) -> Result<String, BoxError> {
        (self.before_charge)(intent.clone()).await;
        self.sandbox.charge(intent).await
    }
}

pub struct Harness {
    pub orchestrator: Arc<OrderOrchestrator>,
    pub store: InMemoryOrderStore,
    pub lock: InMemoryLock,
    pub gateway: Arc<SandboxPaymentGateway>,
}

pub struct HarnessBuilder {
    store: InMemoryOrderStore,
    lock: InMemoryLock,
    sandbox: Arc<SandboxPaymentGateway>,
    gateway: Option<Arc<dyn PaymentGateway>>,
    lock_override: Option<Arc<dyn DistributedLock>>,
    ids: Option<Arc<dyn IdGenerator>>,
    policy: PaymentPolicy,
}

impl HarnessBuilder {
    pub fn new() -> Self {
        Self {
            store: InMemoryOrderStore::new(),
            lock: InMemoryLock::new(),
            sandbox: Arc::new(SandboxPaymentGateway::new()),
            gateway: None,
            lock_override: None,
            ids: Some(Arc::new(SequentialIds::default())),
            policy: PaymentPolicy::default(),
        }
    }

    pub fn store(mut self, store: InMemoryOrderStore) -> Self {
        self.store = store;
        self
    }

    pub fn sandbox(mut self, sandbox: SandboxPaymentGateway) -> Self {
        self.sandbox = Arc::new(sandbox);
        self
    }

    pub fn gateway(mut self, gateway: Arc<dyn PaymentGateway>) -> Self {
        self.gateway = Some(gateway);
        self
    }

    pub fn lock(mut self, lock: Arc<dyn DistributedLock>) -> Self {
        self.lock_override = Some(lock);
        self
    }

    pub fn without_ids(mut self) -> Self {
        self.ids = None;
        self
    }

    pub fn policy(mut self, policy: PaymentPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn build(self) -> Harness {
        let lock: Arc<dyn DistributedLock> = match self.lock_override {
            Some(lock) => lock,
            None => Arc::new(self.lock.clone()),
        };
        let gateway: Arc<dyn PaymentGateway> = match self.gateway {
            Some(gateway) => gateway,
            None => self.sandbox.clone(),
        };

        let orchestrator = OrderOrchestrator::new(
            Collaborators {
                repository: Arc::new(self.store.clone()),
                transactions: Arc::new(self.store.clone()),
                gateway,
                lock,
                clock: Arc::new(FixedClock(epoch())),
                ids: self.ids,
            },
            self.policy,
        );

        Harness {
            orchestrator: Arc::new(orchestrator),
            store: self.store,
            lock: self.lock,
            gateway: self.sandbox,
        }
    }
}

pub fn harness() -> Harness {
    HarnessBuilder::new().build()
}
