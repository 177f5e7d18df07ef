//! taskforge core library
//!
//! Turns a natural-language requirement into tool invocations and drives them
//! through a bounded, resumable control loop.
//!
//! - `tools` - Tool handler registry, built-in handlers, execution statistics
//! - `plan` - Task model, requirement decomposition, dependency validation
//! - `session` - Session/state model and the durable session store
//! - `engine` - Static (task list) and oracle-guided execution engines
//! - `oracle` - Decision oracle contract and HTTP adapter
//! - `process` - Background process tracking for `launch-process`

pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod oracle;
pub mod paths;
pub mod plan;
pub mod process;
pub mod session;
pub mod tools;

pub use config::TaskforgeConfig;
pub use context::ProjectContext;
pub use engine::{
    ExecutionEngine, ExecutionResult, ExecutionStrategy, GuidedExecutionEngine, StepResult,
    TaskExecutionEngine,
};
pub use error::{EngineError, OracleError, StoreError};
pub use session::{Session, SessionStatus, SessionStore, State};
pub use tools::{ToolCall, ToolRegistry, ToolResult};

/// Whole milliseconds in `elapsed`, saturating at `u64::MAX`
pub fn duration_ms(elapsed: std::time::Duration) -> u64 {
    u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)
}

/// Current Unix timestamp in seconds
#[inline]
pub fn unix_timestamp() -> i64 {
    chrono::Utc::now().timestamp()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn duration_ms_saturates() {
        assert_eq!(duration_ms(Duration::from_millis(1500)), 1500);
        assert_eq!(duration_ms(Duration::MAX), u64::MAX);
    }
}
