mod common;

use common::{AlwaysGrantLock, HarnessBuilder};
use settle_core::lock::pay_lock_key;
use settle_core::{CallContext, ConflictKind, OrderError, OrderRepository, OrderStatus, RequesterIdentity};
use settle_order::SandboxPaymentGateway;
use std::sync::Arc;
use std::time::Duration;

#[tokio::test(start_paused = true)]
async fn test_concurrent_pays_charge_once() {
    let h = HarnessBuilder::new()
        .sandbox(SandboxPaymentGateway::with_latency(Duration::from_millis(200)))
        .build();
    let ctx = CallContext::unbounded();
    let u1 = RequesterIdentity::user("u1");
    let order = h.orchestrator.create_order(&ctx, &u1, 1200).await.unwrap();

    let (first, second) = tokio::join!(
        h.orchestrator.pay_order(&ctx, &u1, &order.id),
        h.orchestrator.pay_order(&ctx, &u1, &order.id),
    );

    let results = [first, second];
    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(results
        .iter()
        .any(|r| matches!(r, Err(OrderError::Conflict(ConflictKind::PaymentInProgress)))));

    assert_eq!(h.gateway.attempts(), 1);
    assert_eq!(h.gateway.charge_count().await, 1);
    assert_eq!(h.store.find_by_id(&order.id).await.unwrap().unwrap().status, OrderStatus::Paid);
    assert!(!h.lock.is_held(&pay_lock_key(&order.id)).await);
}

#[tokio::test(start_paused = true)]
async fn test_conditional_write_holds_without_lock() {
    let h = HarnessBuilder::new()
        .sandbox(SandboxPaymentGateway::with_latency(Duration::from_millis(200)))
        .lock(Arc::new(AlwaysGrantLock))
        .build();
    let ctx = CallContext::unbounded();
    let u1 = RequesterIdentity::user("u1");
    let order = h.orchestrator.create_order(&ctx, &u1, 1200).await.unwrap();

    let (first, second) = tokio::join!(
        h.orchestrator.pay_order(&ctx, &u1, &order.id),
        h.orchestrator.pay_order(&ctx, &u1, &order.id),
    );

    let results = [first, second];
    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(results
        .iter()
        .any(|r| matches!(r, Err(OrderError::Conflict(ConflictKind::AlreadyPaid)))));

    // Both reached the provider, but the shared idempotency key deduplicated them
    assert_eq!(h.gateway.attempts(), 2);
    assert_eq!(h.gateway.charge_count().await, 1);
    assert_eq!(h.store.payments_for(&order.id).await.len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_many_concurrent_pays_have_one_winner() {
    let h = HarnessBuilder::new()
        .sandbox(SandboxPaymentGateway::with_latency(Duration::from_millis(50)))
        .build();
    let u1 = RequesterIdentity::user("u1");
    let order = h
        .orchestrator
        .create_order(&CallContext::unbounded(), &u1, 1200)
        .await
        .unwrap();

    let mut handles = Vec::new();
    for _ in 0..8 {
        let orchestrator = h.orchestrator.clone();
        let requester = u1.clone();
        let id = order.id.clone();
        handles.push(tokio::spawn(async move {
            orchestrator
                .pay_order(&CallContext::with_timeout(Duration::from_secs(10)), &requester, &id)
                .await
        }));
    }

    let mut paid = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(()) => paid += 1,
            Err(err) => assert!(err.is_conflict(), "unexpected error: {err:?}"),
        }
    }

    assert_eq!(paid, 1);
    assert_eq!(h.gateway.charge_count().await, 1);
    assert_eq!(h.store.find_by_id(&order.id).await.unwrap().unwrap().status, OrderStatus::Paid);
}
