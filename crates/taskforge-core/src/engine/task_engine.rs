//! Static engine: runs the decomposer's task list in dependency order

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;

use super::runner::EngineRunner;
use super::{ExecutionEngine, ExecutionResult, StepResult};
use crate::context::ProjectContext;
use crate::error::EngineError;
use crate::plan::{schedule, TaskDecomposer, TaskStatus};
use crate::session::{MessageRole, SessionStatus, SessionStore};
use crate::tools::{ToolCall, ToolContext, ToolRegistry};

/// A flattened tool call with its position in the plan
struct PlannedCall {
    task_index: usize,
    task_id: String,
    call: ToolCall,
    last_in_task: bool,
}

pub struct TaskExecutionEngine {
    runner: EngineRunner,
    decomposer: TaskDecomposer,
}

impl TaskExecutionEngine {
    pub fn new(registry: Arc<ToolRegistry>, store: Arc<SessionStore>, tool_ctx: ToolContext) -> Self {
        Self {
            runner: EngineRunner::new(registry, store, tool_ctx),
            decomposer: TaskDecomposer::new(),
        }
    }

    /// Override the detected project context
    pub fn with_project_context(mut self, project: ProjectContext) -> Self {
        self.runner.project = project;
        self
    }

    pub fn store(&self) -> &Arc<SessionStore> {
        &self.runner.store
    }

    /// Decompose and schedule, then run. Returns once the session rests.
    async fn plan_and_run(&self, id: &str) -> Result<(), EngineError> {
        let session = self.runner.transition(id, SessionStatus::Planning)?;
        let tasks = self
            .decomposer
            .decompose(&session.requirement, &self.runner.project);

        if tasks.is_empty() {
            self.runner.settle(
                id,
                SessionStatus::Completed,
                "Nothing to do: the requirement is empty".to_string(),
                None,
            )?;
            return Ok(());
        }

        let ordered = match schedule(&tasks) {
            Ok(ordered) => ordered,
            Err(errors) => {
                self.runner.fail(
                    id,
                    "invalid_plan",
                    format!("Invalid task plan: {}", errors.join("; ")),
                )?;
                return Ok(());
            }
        };

        let plan_note = format!(
            "Planned {} task(s): {}",
            ordered.len(),
            ordered
                .iter()
                .map(|t| t.id.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        );
        self.runner.store.update_session(id, |s| {
            s.tasks = ordered;
            s.state.current_task_index = 0;
            s.push_message(MessageRole::System, plan_note);
        })?;

        self.runner.transition(id, SessionStatus::Executing)?;
        self.drive(id).await
    }

    /// Run planned calls until done, failed, or out of rounds for this call
    async fn drive(&self, id: &str) -> Result<(), EngineError> {
        let session = self.runner.load(id)?;
        let calls: Vec<PlannedCall> = session
            .tasks
            .iter()
            .enumerate()
            .flat_map(|(task_index, task)| {
                let count = task.tool_calls.len();
                task.tool_calls
                    .iter()
                    .enumerate()
                    .map(move |(i, call)| PlannedCall {
                        task_index,
                        task_id: task.id.clone(),
                        call: call.clone(),
                        last_in_task: i + 1 == count,
                    })
            })
            .collect();

        let budget = self.runner.max_rounds();
        let mut next = session.completed_call_count();
        let mut rounds_run = 0;

        loop {
            if next >= calls.len() {
                let session = self.runner.store.update_session(id, |s| {
                    for task in s.tasks.iter_mut().filter(|t| !t.status.is_terminal()) {
                        task.status = TaskStatus::Completed;
                    }
                })?;
                self.runner.settle(
                    id,
                    SessionStatus::Completed,
                    format!(
                        "Completed {} task(s) in {} round(s)",
                        session.tasks.len(),
                        session.state.execution_round
                    ),
                    None,
                )?;
                return Ok(());
            }

            if rounds_run >= budget {
                self.runner.settle(
                    id,
                    SessionStatus::WaitingUser,
                    format!(
                        "Paused after reaching the round budget of {} round(s); {} tool call(s) remain. \
                         Continue the session to resume.",
                        budget,
                        calls.len() - next
                    ),
                    None,
                )?;
                return Ok(());
            }

            let planned = &calls[next];
            let session = self.runner.store.update_session(id, |s| {
                s.state.execution_round += 1;
                s.state.current_task_index = planned.task_index;
                if let Some(task) = s.tasks.get_mut(planned.task_index) {
                    task.status = TaskStatus::Running;
                }
            })?;
            let round = session.state.execution_round;

            let result = self
                .runner
                .run_tool(id, &planned.task_id, &planned.call, round)
                .await?;
            rounds_run += 1;

            if !result.success {
                self.runner.store.update_session(id, |s| {
                    if let Some(task) = s.tasks.get_mut(planned.task_index) {
                        task.status = TaskStatus::Failed;
                    }
                })?;
                self.runner.fail(
                    id,
                    result.error_code.as_deref().unwrap_or("tool_error"),
                    format!(
                        "Task '{}' failed: {} returned: {}",
                        planned.task_id,
                        planned.call.tool_name(),
                        result.error_message()
                    ),
                )?;
                return Ok(());
            }

            if planned.last_in_task {
                self.runner.store.update_session(id, |s| {
                    if let Some(task) = s.tasks.get_mut(planned.task_index) {
                        task.status = TaskStatus::Completed;
                    }
                })?;
            }
            next += 1;
        }
    }
}

#[async_trait]
impl ExecutionEngine for TaskExecutionEngine {
    async fn execute(&self, requirement: &str) -> Result<ExecutionResult, EngineError> {
        let started = Instant::now();
        let session = self.runner.store.create_session(requirement)?;
        let id = session.id;
        tracing::info!(session_id = %id, engine = "static", "Execution started");

        let lock = self.runner.store.session_lock(&id);
        let _guard = lock.lock().await;
        self.plan_and_run(&id).await?;
        self.runner.result(&id, started)
    }

    async fn continue_conversation(&self, session_id: &str) -> Result<ExecutionResult, EngineError> {
        let started = Instant::now();
        let lock = self.runner.store.session_lock(session_id);
        let _guard = lock.lock().await;

        let session = self.runner.load(session_id)?;
        tracing::info!(
            session_id,
            status = %session.status(),
            round = session.state.execution_round,
            "Continuing session"
        );
        match session.status() {
            SessionStatus::WaitingUser => {
                self.runner.transition(session_id, SessionStatus::Executing)?;
                self.drive(session_id).await?;
            }
            // Interrupted mid-run
            SessionStatus::Executing => self.drive(session_id).await?,
            SessionStatus::Created | SessionStatus::Planning => {
                self.plan_and_run(session_id).await?
            }
            from => {
                return Err(EngineError::InvalidTransition {
                    from,
                    to: SessionStatus::Executing,
                })
            }
        }
        self.runner.result(session_id, started)
    }

    async fn execute_step(&self, call: &ToolCall) -> StepResult {
        self.runner.execute_step(call).await
    }

    fn set_max_execution_rounds(&self, rounds: i64) -> Result<(), EngineError> {
        self.runner.set_max_rounds(rounds)
    }

    fn max_execution_rounds(&self) -> usize {
        self.runner.max_rounds()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn engine(dir: &std::path::Path) -> TaskExecutionEngine {
        TaskExecutionEngine::new(
            Arc::new(ToolRegistry::with_builtin_tools().await),
            Arc::new(SessionStore::open(dir.join(".state/sessions.json"))),
            ToolContext::new(dir),
        )
    }

    #[tokio::test]
    async fn user_data_class_scenario() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(dir.path()).await;
        engine.set_max_execution_rounds(25).unwrap();

        let result = engine
            .execute("Create a simple User data class with name and email properties")
            .await
            .unwrap();

        assert_eq!(result.final_status, SessionStatus::Completed);
        assert!(result.success);
        assert!(result.execution_rounds <= 25);
        let content = std::fs::read_to_string(dir.path().join("User.kt")).unwrap();
        assert!(content.contains("name"));
        assert!(content.contains("email"));
        assert!(result.summary.unwrap().starts_with("Completed 1 task(s)"));
    }

    #[tokio::test]
    async fn budget_pauses_and_continue_resumes() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(dir.path()).await;
        engine.set_max_execution_rounds(2).unwrap();
        let requirement = "Build a REST API for products with validation and unit tests";

        let first = engine.execute(requirement).await.unwrap();
        assert_eq!(first.final_status, SessionStatus::WaitingUser);
        assert_eq!(first.execution_rounds, 2);
        assert_eq!(first.executed_steps, 2);
        assert!(first.summary.as_deref().unwrap().contains("round budget"));

        let second = engine.continue_conversation(&first.session_id).await.unwrap();
        assert_eq!(second.final_status, SessionStatus::WaitingUser);
        assert_eq!(second.execution_rounds, 4);

        let third = engine.continue_conversation(&first.session_id).await.unwrap();
        assert_eq!(third.final_status, SessionStatus::Completed);
        assert_eq!(third.execution_rounds, 5);

        let rounds: Vec<u32> = third.steps.iter().map(|s| s.round).collect();
        assert_eq!(rounds, vec![1, 2, 3, 4, 5]);
        assert!(dir.path().join("model/Product.kt").exists());
        assert!(dir.path().join("test/service/ProductServiceTest.kt").exists());

        let session = engine.store().get_session(&first.session_id).unwrap();
        assert!(session.tasks.iter().all(|t| t.status == TaskStatus::Completed));
    }

    #[tokio::test]
    async fn tool_failure_fails_session_and_keeps_steps() {
        let dir = tempfile::tempdir().unwrap();
        // A plain file where the model directory should go
        std::fs::write(dir.path().join("model"), "").unwrap();
        let engine = engine(dir.path()).await;

        let result = engine.execute("CRUD endpoints for Invoice").await.unwrap();

        assert_eq!(result.final_status, SessionStatus::Failed);
        assert!(!result.success);
        assert_eq!(result.executed_steps, 1);
        assert!(result.error.unwrap().contains("Task 'invoice-model' failed"));
        assert!(!dir.path().join("service/InvoiceService.kt").exists());

        let session = engine.store().get_session(&result.session_id).unwrap();
        assert_eq!(session.tasks[0].status, TaskStatus::Failed);
        assert_eq!(session.state.errors.len(), 1);
    }

    #[tokio::test]
    async fn empty_requirement_completes_without_steps() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(dir.path()).await;
        let result = engine.execute("   ").await.unwrap();
        assert_eq!(result.final_status, SessionStatus::Completed);
        assert_eq!(result.executed_steps, 0);
        assert_eq!(result.execution_rounds, 0);
    }

    #[tokio::test]
    async fn continue_rejects_unknown_and_finished_sessions() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(dir.path()).await;

        assert!(matches!(
            engine.continue_conversation("missing").await,
            Err(EngineError::SessionNotFound(_))
        ));

        let done = engine.execute("Create a User class").await.unwrap();
        assert!(matches!(
            engine.continue_conversation(&done.session_id).await,
            Err(EngineError::InvalidTransition {
                from: SessionStatus::Completed,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn concurrent_continues_are_serialized() {
        let dir = tempfile::tempdir().unwrap();
        let engine = Arc::new(engine(dir.path()).await);
        engine.set_max_execution_rounds(1).unwrap();
        let first = engine
            .execute("Build a REST API for orders with validation and tests")
            .await
            .unwrap();

        let a = tokio::spawn({
            let engine = engine.clone();
            let id = first.session_id.clone();
            async move { engine.continue_conversation(&id).await.unwrap() }
        });
        let b = tokio::spawn({
            let engine = engine.clone();
            let id = first.session_id.clone();
            async move { engine.continue_conversation(&id).await.unwrap() }
        });
        a.await.unwrap();
        b.await.unwrap();

        let session = engine.store().get_session(&first.session_id).unwrap();
        assert_eq!(session.state.execution_round, 3);
        let rounds: Vec<u32> = session.steps.iter().map(|s| s.round).collect();
        assert_eq!(rounds, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn execute_step_runs_outside_sessions() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(dir.path()).await;
        let step = engine
            .execute_step(
                &ToolCall::new("save-file")
                    .with_param("path", "notes.txt")
                    .with_param("file_content", "hi"),
            )
            .await;
        assert!(step.success());
        assert!(engine.store().is_empty());
        assert_eq!(step.result.metadata["tool_name"], "save-file");
    }

    #[tokio::test]
    async fn invalid_round_budget_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(dir.path()).await;
        assert!(engine.set_max_execution_rounds(0).is_err());
        assert!(engine.set_max_execution_rounds(-1).is_err());
        assert_eq!(engine.max_execution_rounds(), 25);
    }
}
