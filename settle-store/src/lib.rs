pub mod app_config;
pub mod database;
pub mod memory;
pub mod order_repo;
pub mod redis_repo;

pub use database::DbClient;
pub use memory::{InMemoryLock, InMemoryOrderStore};
pub use order_repo::{PgOrderRepository, PgTransactionRunner};
pub use redis_repo::RedisClient;
