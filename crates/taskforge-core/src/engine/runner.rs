//! Session bookkeeping shared by both engines

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use super::{ExecutionResult, StepResult};
use crate::config::DEFAULT_MAX_EXECUTION_ROUNDS;
use crate::context::ProjectContext;
use crate::error::EngineError;
use crate::session::{ExecutionError, ExecutionStep, MessageRole, Session, SessionStatus, SessionStore};
use crate::tools::{ToolCall, ToolContext, ToolRegistry, ToolResult};

pub(crate) struct EngineRunner {
    pub registry: Arc<ToolRegistry>,
    pub store: Arc<SessionStore>,
    pub tool_ctx: ToolContext,
    pub project: ProjectContext,
    max_rounds: AtomicUsize,
}

impl EngineRunner {
    pub fn new(registry: Arc<ToolRegistry>, store: Arc<SessionStore>, tool_ctx: ToolContext) -> Self {
        let project = ProjectContext::detect(tool_ctx.working_dir());
        Self {
            registry,
            store,
            tool_ctx,
            project,
            max_rounds: AtomicUsize::new(DEFAULT_MAX_EXECUTION_ROUNDS),
        }
    }

    pub fn max_rounds(&self) -> usize {
        self.max_rounds.load(Ordering::Relaxed)
    }

    pub fn set_max_rounds(&self, rounds: i64) -> Result<(), EngineError> {
        if rounds <= 0 {
            return Err(EngineError::invalid_config(format!(
                "max_execution_rounds must be positive, got {}",
                rounds
            )));
        }
        let rounds = usize::try_from(rounds)
            .map_err(|_| EngineError::invalid_config(format!("max_execution_rounds too large: {}", rounds)))?;
        self.max_rounds.store(rounds, Ordering::Relaxed);
        Ok(())
    }

    pub fn load(&self, id: &str) -> Result<Session, EngineError> {
        self.store
            .get_session(id)
            .ok_or_else(|| EngineError::SessionNotFound(id.to_string()))
    }

    /// Move to `to`, rejecting backward moves
    pub fn transition(&self, id: &str, to: SessionStatus) -> Result<Session, EngineError> {
        let from = self.load(id)?.status();
        if from == to {
            return self.load(id);
        }
        if !from.can_transition_to(to) {
            return Err(EngineError::InvalidTransition { from, to });
        }
        let session = self
            .store
            .update_session(id, |s| s.state.status = to)?;
        tracing::debug!(session_id = %id, from = %from, to = %to, "Session transition");
        Ok(session)
    }

    /// Enter a resting state with a user-facing message and an optional error record
    pub fn settle(
        &self,
        id: &str,
        to: SessionStatus,
        message: String,
        error: Option<ExecutionError>,
    ) -> Result<Session, EngineError> {
        let from = self.load(id)?.status();
        if from != to && !from.can_transition_to(to) {
            return Err(EngineError::InvalidTransition { from, to });
        }
        let session = self.store.update_session(id, |s| {
            s.state.status = to;
            s.push_message(MessageRole::Assistant, message);
            if let Some(error) = error {
                s.state.errors.push(error);
            }
        })?;
        tracing::info!(
            session_id = %id,
            status = %to,
            rounds = session.state.execution_round,
            "Session settled"
        );
        Ok(session)
    }

    pub fn fail(&self, id: &str, code: &str, message: String) -> Result<Session, EngineError> {
        tracing::warn!(session_id = %id, code, error = %message, "Session failed");
        let error = ExecutionError::new(code, message.clone());
        self.settle(id, SessionStatus::Failed, message, Some(error))
    }

    /// Append an error without changing status
    pub fn record_error(&self, id: &str, error: ExecutionError) -> Result<Session, EngineError> {
        Ok(self
            .store
            .update_session(id, |s| s.state.errors.push(error))?)
    }

    /// Bump the round counter and return the new round number
    pub fn begin_round(&self, id: &str) -> Result<u32, EngineError> {
        let session = self
            .store
            .update_session(id, |s| s.state.execution_round += 1)?;
        Ok(session.state.execution_round)
    }

    pub async fn execute_step(&self, call: &ToolCall) -> StepResult {
        let start = Instant::now();
        let result = self.registry.execute(call, &self.tool_ctx).await;
        StepResult {
            tool_call: call.clone(),
            result,
            duration_ms: crate::duration_ms(start.elapsed()),
            timestamp: crate::unix_timestamp(),
        }
    }

    /// Execute `call` as `round` of session `id` and append the step
    pub async fn run_tool(
        &self,
        id: &str,
        task_id: &str,
        call: &ToolCall,
        round: u32,
    ) -> Result<ToolResult, EngineError> {
        let step = self.execute_step(call).await;
        tracing::info!(
            session_id = %id,
            tool = call.tool_name(),
            round,
            success = step.result.success,
            duration_ms = step.duration_ms,
            "Round executed"
        );
        let record = ExecutionStep {
            task_id: task_id.to_string(),
            tool_call: step.tool_call,
            result: step.result.clone(),
            duration_ms: step.duration_ms,
            timestamp: step.timestamp,
            round,
        };
        self.store.update_session(id, |s| s.steps.push(record))?;
        Ok(step.result)
    }

    pub fn result(&self, id: &str, started: Instant) -> Result<ExecutionResult, EngineError> {
        let session = self.load(id)?;
        Ok(ExecutionResult::from_session(&session, crate::duration_ms(started.elapsed())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn runner() -> EngineRunner {
        EngineRunner::new(
            Arc::new(ToolRegistry::new()),
            Arc::new(SessionStore::in_memory()),
            ToolContext::new(std::env::temp_dir()),
        )
    }

    #[test]
    fn max_rounds_must_be_positive() {
        let runner = runner();
        assert_eq!(runner.max_rounds(), DEFAULT_MAX_EXECUTION_ROUNDS);
        assert!(matches!(
            runner.set_max_rounds(0),
            Err(EngineError::InvalidConfig(_))
        ));
        assert!(runner.set_max_rounds(-3).is_err());
        runner.set_max_rounds(4).unwrap();
        assert_eq!(runner.max_rounds(), 4);
    }

    #[test]
    fn transitions_are_checked() {
        let runner = runner();
        let id = runner.store.create_session("req").unwrap().id;
        runner.transition(&id, SessionStatus::Planning).unwrap();
        runner.transition(&id, SessionStatus::Executing).unwrap();
        runner
            .settle(&id, SessionStatus::Completed, "done".into(), None)
            .unwrap();

        let err = runner.transition(&id, SessionStatus::Executing).unwrap_err();
        assert!(matches!(
            err,
            EngineError::InvalidTransition {
                from: SessionStatus::Completed,
                to: SessionStatus::Executing
            }
        ));
    }

    #[tokio::test]
    async fn unknown_tool_step_is_unsupported() {
        let runner = runner();
        let step = runner.execute_step(&ToolCall::new("teleport")).await;
        assert!(!step.success());
        assert_eq!(step.result.error_code.as_deref(), Some("unsupported_tool"));
    }

    #[tokio::test]
    async fn run_tool_appends_step_in_round_order() {
        let runner = runner();
        let id = runner.store.create_session("req").unwrap().id;
        for _ in 0..2 {
            let round = runner.begin_round(&id).unwrap();
            runner
                .run_tool(&id, "t", &ToolCall::new("teleport"), round)
                .await
                .unwrap();
        }
        let session = runner.load(&id).unwrap();
        let rounds: Vec<u32> = session.steps.iter().map(|s| s.round).collect();
        assert_eq!(rounds, vec![1, 2]);
        assert_eq!(session.state.execution_round, 2);
    }
}
