use std::time::Duration;

/// Currency and per-phase time budgets for order operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentPolicy {
    pub currency: String,
    pub lock_ttl: Duration,
    pub lock_acquire_timeout: Duration,
    /// Independent of the caller's deadline
    pub lock_release_timeout: Duration,
    pub db_timeout: Duration,
    /// Longer than the DB phases: the charge crosses into a third party
    pub gateway_timeout: Duration,
}

impl Default for PaymentPolicy {
    fn default() -> Self {
        Self {
            currency: "jpy".to_string(),
            lock_ttl: Duration::from_secs(15),
            lock_acquire_timeout: Duration::from_secs(1),
            lock_release_timeout: Duration::from_secs(1),
            db_timeout: Duration::from_secs(3),
            gateway_timeout: Duration::from_secs(5),
        }
    }
}
