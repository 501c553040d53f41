use async_trait::async_trait;
use chrono::{DateTime, Utc};
use settle_core::models::{Order, OrderId, OrderStatus};
use settle_core::payment::PaymentRecord;
use settle_core::repository::{OrderRepository, OrderTransaction, TransactionRunner};
use settle_core::BoxError;
use sqlx::{PgExecutor, PgPool, Postgres, Transaction};

pub struct PgOrderRepository {
    pool: PgPool,
}

impl PgOrderRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

// Internal struct for type-safe querying
#[derive(sqlx::FromRow)]
struct OrderRow {
    id: String,
    owner_id: String,
    amount_minor_units: i64,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<OrderRow> for Order {
    type Error = BoxError;

    fn try_from(row: OrderRow) -> Result<Self, Self::Error> {
        Ok(Order {
            id: OrderId::new(row.id),
            owner_id: row.owner_id,
            amount_minor_units: row.amount_minor_units,
            status: row.status.parse()?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

// The statements below are shared by the pool-level repository and the
// transaction-bound handle; only the executor differs.

async fn insert_order<'e, E: PgExecutor<'e>>(executor: E, order: &Order) -> Result<(), BoxError> {
    sqlx::query(
        r#"
        INSERT INTO orders (id, owner_id, amount_minor_units, status, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(order.id.as_str())
    .bind(&order.owner_id)
    .bind(order.amount_minor_units)
    .bind(order.status.as_str())
    .bind(order.created_at)
    .bind(order.updated_at)
    .execute(executor)
    .await?;
    Ok(())
}

async fn fetch_order<'e, E: PgExecutor<'e>>(
    executor: E,
    id: &OrderId,
    owner_id: Option<&str>,
) -> Result<Option<Order>, BoxError> {
    let row: Option<OrderRow> = match owner_id {
        None => {
            sqlx::query_as(
                "SELECT id, owner_id, amount_minor_units, status, created_at, updated_at FROM orders WHERE id = $1",
            )
            .bind(id.as_str())
            .fetch_optional(executor)
            .await?
        }
        Some(owner_id) => {
            sqlx::query_as(
                "SELECT id, owner_id, amount_minor_units, status, created_at, updated_at FROM orders WHERE id = $1 AND owner_id = $2",
            )
            .bind(id.as_str())
            .bind(owner_id)
            .fetch_optional(executor)
            .await?
        }
    };

    row.map(Order::try_from).transpose()
}

async fn update_status_if_pending<'e, E: PgExecutor<'e>>(
    executor: E,
    id: &OrderId,
    owner_id: Option<&str>,
    status: OrderStatus,
    updated_at: DateTime<Utc>,
) -> Result<u64, BoxError> {
    let result = match owner_id {
        None => {
            sqlx::query(
                "UPDATE orders SET status = $1, updated_at = $2 WHERE id = $3 AND status = 'PENDING'",
            )
            .bind(status.as_str())
            .bind(updated_at)
            .bind(id.as_str())
            .execute(executor)
            .await?
        }
        Some(owner_id) => {
            sqlx::query(
                "UPDATE orders SET status = $1, updated_at = $2 WHERE id = $3 AND owner_id = $4 AND status = 'PENDING'",
            )
            .bind(status.as_str())
            .bind(updated_at)
            .bind(id.as_str())
            .bind(owner_id)
            .execute(executor)
            .await?
        }
    };

    Ok(result.rows_affected())
}

#[async_trait]
impl OrderRepository for PgOrderRepository {
    async fn create(&self, order: &Order) -> Result<(), BoxError> {
        insert_order(&self.pool, order).await
    }

    async fn find_by_id(&self, id: &OrderId) -> Result<Option<Order>, BoxError> {
        fetch_order(&self.pool, id, None).await
    }

    async fn find_by_id_for_owner(&self, id: &OrderId, owner_id: &str) -> Result<Option<Order>, BoxError> {
        fetch_order(&self.pool, id, Some(owner_id)).await
    }

    async fn update(&self, order: &Order) -> Result<bool, BoxError> {
        // amount_minor_units is immutable after creation
        let result = sqlx::query("UPDATE orders SET status = $1, updated_at = $2 WHERE id = $3")
            .bind(order.status.as_str())
            .bind(order.updated_at)
            .bind(order.id.as_str())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn update_status_if_pending(
        &self,
        id: &OrderId,
        status: OrderStatus,
        updated_at: DateTime<Utc>,
    ) -> Result<u64, BoxError> {
        update_status_if_pending(&self.pool, id, None, status, updated_at).await
    }

    async fn update_status_if_pending_for_owner(
        &self,
        id: &OrderId,
        owner_id: &str,
        status: OrderStatus,
        updated_at: DateTime<Utc>,
    ) -> Result<u64, BoxError> {
        update_status_if_pending(&self.pool, id, Some(owner_id), status, updated_at).await
    }
}

#[derive(Clone)]
pub struct PgTransactionRunner {
    pool: PgPool,
}

impl PgTransactionRunner {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TransactionRunner for PgTransactionRunner {
    async fn begin(&self) -> Result<Box<dyn OrderTransaction>, BoxError> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgOrderTransaction { tx: Some(tx) }))
    }
}

/// Open Postgres transaction. Dropping it unfinished rolls back.
pub struct PgOrderTransaction {
    tx: Option<Transaction<'static, Postgres>>,
}

impl PgOrderTransaction {
    fn open(&mut self) -> Result<&mut Transaction<'static, Postgres>, BoxError> {
        self.tx.as_mut().ok_or_else(|| "transaction already finished".into())
    }
}

#[async_trait]
impl OrderTransaction for PgOrderTransaction {
    async fn find_by_id(&mut self, id: &OrderId) -> Result<Option<Order>, BoxError> {
        let tx = self.open()?;
        fetch_order(&mut **tx, id, None).await
    }

    async fn update_status_if_pending(
        &mut self,
        id: &OrderId,
        status: OrderStatus,
        updated_at: DateTime<Utc>,
    ) -> Result<u64, BoxError> {
        let tx = self.open()?;
        update_status_if_pending(&mut **tx, id, None, status, updated_at).await
    }

    async fn update_status_if_pending_for_owner(
        &mut self,
        id: &OrderId,
        owner_id: &str,
        status: OrderStatus,
        updated_at: DateTime<Utc>,
    ) -> Result<u64, BoxError> {
        let tx = self.open()?;
        update_status_if_pending(&mut **tx, id, Some(owner_id), status, updated_at).await
    }

    async fn record_payment(&mut self, record: &PaymentRecord) -> Result<(), BoxError> {
        let tx = self.open()?;
        sqlx::query(
            r#"
            INSERT INTO payments (idempotency_key, order_id, provider_transaction_id, amount_minor_units, currency, recorded_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (idempotency_key) DO NOTHING
            "#,
        )
        .bind(&record.idempotency_key)
        .bind(record.order_id.as_str())
        .bind(&record.provider_transaction_id)
        .bind(record.amount)
        .bind(&record.currency)
        .bind(record.recorded_at)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    async fn commit(&mut self) -> Result<(), BoxError> {
        match self.tx.take() {
            Some(tx) => Ok(tx.commit().await?),
            None => Err("transaction already finished".into()),
        }
    }

    async fn rollback(&mut self) -> Result<(), BoxError> {
        match self.tx.take() {
            Some(tx) => Ok(tx.rollback().await?),
            None => Ok(()),
        }
    }
}
