//! Execution engines
//!
//! Both engines drive a session through
//! `CREATED → PLANNING → EXECUTING → {COMPLETED | WAITING_USER | FAILED}`.
//! `TaskExecutionEngine` walks the decomposer's task list;
//! `GuidedExecutionEngine` asks a decision oracle what to do each round.
//! A round runs at most one tool call, and each execute/continue call runs at
//! most `max_execution_rounds` rounds before pausing in `WAITING_USER`.

mod guided;
mod runner;
pub mod strategy;
mod task_engine;

pub use guided::GuidedExecutionEngine;
pub use strategy::{ExecutionStrategy, SafetyVerdict, StrategyPreset};
pub use task_engine::TaskExecutionEngine;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::session::{ExecutionStep, Session, SessionStatus};
use crate::tools::{ToolCall, ToolResult};

/// What `execute` and `continue_conversation` report back
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub success: bool,
    pub session_id: String,
    pub final_status: SessionStatus,
    pub executed_steps: usize,
    /// Total rounds for the session across all calls
    pub execution_rounds: u32,
    /// Wall time of this call only
    pub execution_time_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub steps: Vec<ExecutionStep>,
}

impl ExecutionResult {
    pub(crate) fn from_session(session: &Session, execution_time_ms: u64) -> Self {
        let status = session.status();
        let error = (status == SessionStatus::Failed)
            .then(|| session.state.errors.last().map(|e| e.message.clone()))
            .flatten();
        Self {
            success: status == SessionStatus::Completed,
            session_id: session.id.clone(),
            final_status: status,
            executed_steps: session.steps.len(),
            execution_rounds: session.state.execution_round,
            execution_time_ms,
            summary: session.last_assistant_message().map(str::to_string),
            error,
            steps: session.steps.clone(),
        }
    }
}

/// Outcome of a single replayed tool call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    pub tool_call: ToolCall,
    pub result: ToolResult,
    pub duration_ms: u64,
    pub timestamp: i64,
}

impl StepResult {
    pub fn success(&self) -> bool {
        self.result.success
    }
}

#[async_trait]
pub trait ExecutionEngine: Send + Sync {
    /// Create a session for `requirement` and run it
    async fn execute(&self, requirement: &str) -> Result<ExecutionResult, EngineError>;

    /// Resume a paused session at its stored round counter
    async fn continue_conversation(&self, session_id: &str)
        -> Result<ExecutionResult, EngineError>;

    /// Run one tool call outside any session
    async fn execute_step(&self, call: &ToolCall) -> StepResult;

    /// Set the per-call round budget. Zero and negative values are rejected.
    fn set_max_execution_rounds(&self, rounds: i64) -> Result<(), EngineError>;

    fn max_execution_rounds(&self) -> usize;
}
