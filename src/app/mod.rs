mod orchestrator;
mod runtime;
mod service;
mod shutdown;
mod startup;
mod types;

#[cfg(test)]
mod tests;

pub use orchestrator::KioskcamOrchestrator;
pub use service::{DetectionHandle, DetectionService};
pub use types::{ComponentState, LifecycleAction, ShutdownReason};
