use async_trait::async_trait;
use std::time::Duration;
use uuid::Uuid;

use crate::models::OrderId;
use crate::BoxError;

/// Ownership token stored as the lock value
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LockToken(String);

impl LockToken {
    /// Fresh random token (128 bits, hex)
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Cross-process mutual exclusion with self-expiring ownership.
#[async_trait]
pub trait DistributedLock: Send + Sync {
    /// Atomic set-if-absent with the expiry attached at creation.
    /// `Ok(None)` means someone else holds the key.
    async fn try_acquire(&self, key: &str, ttl: Duration) -> Result<Option<LockToken>, BoxError>;

    /// Compare-and-delete: only removes the key while it still holds `token`.
    /// Returns whether anything was removed.
    async fn release(&self, key: &str, token: &LockToken) -> Result<bool, BoxError>;
}

pub fn pay_lock_key(order_id: &OrderId) -> String {
    format!("lock:pay:{}", order_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pay_lock_key() {
        assert_eq!(pay_lock_key(&OrderId::new("o-9")), "lock:pay:o-9");
    }

    #[test]
    fn test_tokens_are_unique() {
        let a = LockToken::generate();
        let b = LockToken::generate();
        assert_ne!(a, b);
        assert_eq!(a.as_str().len(), 32);
    }
}
