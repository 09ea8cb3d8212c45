pub mod orchestrator;
pub mod worker;

pub use orchestrator::DispatchOrchestrator;
pub use worker::WorkerPool;
