use settle_core::CallContext;
use settle_order::OrderOrchestrator;
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone)]
pub struct AuthConfig {
    pub secret: String,
    /// Role that may act on any order
    pub admin_role: String,
}

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<OrderOrchestrator>,
    pub auth: AuthConfig,
    pub request_timeout: Duration,
}

impl AppState {
    /// Fresh deadline for one inbound request
    pub fn call_context(&self) -> CallContext {
        CallContext::with_timeout(self.request_timeout)
    }
}
