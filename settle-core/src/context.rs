use std::fmt;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;

use crate::OrderError;

/// Suspension points of an order operation, used to label timeouts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    LockAcquire,
    Read,
    Charge,
    Commit,
    Persist,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::LockAcquire => "lock acquisition",
            Phase::Read => "order read",
            Phase::Charge => "payment charge",
            Phase::Commit => "status commit",
            Phase::Persist => "order insert",
        };
        f.write_str(name)
    }
}

/// Caller-supplied deadline for one inbound operation.
///
/// Every phase timeout is clamped to what remains of it.
#[derive(Debug, Clone, Copy, Default)]
pub struct CallContext {
    deadline: Option<Instant>,
}

impl CallContext {
    pub fn unbounded() -> Self {
        Self { deadline: None }
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self { deadline: Some(Instant::now() + timeout) }
    }

    pub fn remaining(&self) -> Option<Duration> {
        self.deadline.map(|d| d.saturating_duration_since(Instant::now()))
    }

    pub fn is_expired(&self) -> bool {
        self.remaining().is_some_and(|r| r.is_zero())
    }

    /// `limit`, shortened to the caller's remaining time
    pub fn budget(&self, limit: Duration) -> Duration {
        match self.remaining() {
            Some(remaining) => remaining.min(limit),
            None => limit,
        }
    }

    /// Run one phase under `min(limit, remaining)`. An already expired
    /// context fails without starting `fut`.
    pub async fn within<T, F>(&self, phase: Phase, limit: Duration, fut: F) -> Result<T, OrderError>
    where
        F: Future<Output = Result<T, OrderError>>,
    {
        if self.is_expired() {
            return Err(OrderError::DeadlineExceeded(phase));
        }
        match tokio::time::timeout(self.budget(limit), fut).await {
            Ok(result) => result,
            Err(_) => Err(OrderError::DeadlineExceeded(phase)),
        }
    }
}
