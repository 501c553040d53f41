pub mod gateway;
mod guard;
pub mod orchestrator;

pub use gateway::SandboxPaymentGateway;
pub use orchestrator::{Collaborators, OrderOrchestrator};
