//! Planning: task model, requirement decomposition, dependency ordering

mod decomposer;
mod graph;
mod task;

pub use decomposer::TaskDecomposer;
pub use graph::{schedule, validate_task_sequence};
pub use task::{Task, TaskStatus};
