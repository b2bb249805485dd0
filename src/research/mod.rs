//! The research pipeline: decompose a question into a task graph, execute
//! the tasks in dependency order, review the findings and write them up.

pub mod decomposer;
pub mod executor;
pub mod graph;
pub mod orchestrator;
pub mod progress;
pub mod scheduler;
pub mod synthesizer;
pub mod types;
pub mod validator;

pub use orchestrator::Orchestrator;
pub use progress::{ExecutionStatus, ExecutionUpdate, ProgressSender};
pub use types::*;
