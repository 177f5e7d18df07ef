//! Oracle-guided engine
//!
//! Each round asks the oracle for one decision. Tool decisions pass the
//! execution strategy's safety gate first; successful tool rounds are
//! followed by a completion check. Requirement analysis runs once, before
//! round 1.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::runner::EngineRunner;
use super::strategy::{ExecutionStrategy, SafetyVerdict};
use super::{ExecutionEngine, ExecutionResult, StepResult};
use crate::context::ProjectContext;
use crate::error::EngineError;
use crate::oracle::{DecisionOracle, NextAction};
use crate::session::{ExecutionError, MessageRole, SessionStatus, SessionStore};
use crate::tools::{ToolCall, ToolContext, ToolMetadata, ToolRegistry};

/// `State.context` key holding a call gated on user confirmation
pub const PENDING_CONFIRMATION_KEY: &str = "pending_confirmation";
const ANALYSIS_KEY: &str = "analysis";
const PROGRESS_KEY: &str = "progress";
const STEP_TASK_ID: &str = "guided";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct PendingCall {
    call: ToolCall,
    confidence: f64,
    #[serde(default)]
    reasoning: String,
}

/// Whether the loop keeps going after a tool round
enum RoundOutcome {
    Continue,
    Settled,
}

pub struct GuidedExecutionEngine {
    runner: EngineRunner,
    oracle: Arc<dyn DecisionOracle>,
    strategy: ExecutionStrategy,
}

impl GuidedExecutionEngine {
    pub fn new(
        registry: Arc<ToolRegistry>,
        store: Arc<SessionStore>,
        tool_ctx: ToolContext,
        oracle: Arc<dyn DecisionOracle>,
    ) -> Self {
        Self {
            runner: EngineRunner::new(registry, store, tool_ctx),
            oracle,
            strategy: ExecutionStrategy::default(),
        }
    }

    pub fn with_strategy(mut self, strategy: ExecutionStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Override the detected project context
    pub fn with_project_context(mut self, project: ProjectContext) -> Self {
        self.runner.project = project;
        self
    }

    pub fn strategy(&self) -> &ExecutionStrategy {
        &self.strategy
    }

    pub fn store(&self) -> &Arc<SessionStore> {
        &self.runner.store
    }

    /// Run the tool call a session paused on, then keep going.
    /// The dangerous-pattern check still applies to approved calls.
    pub async fn approve_pending(&self, session_id: &str) -> Result<ExecutionResult, EngineError> {
        let started = Instant::now();
        let lock = self.runner.store.session_lock(session_id);
        let _guard = lock.lock().await;

        let session = self.runner.load(session_id)?;
        if session.status() != SessionStatus::WaitingUser {
            return Err(EngineError::InvalidTransition {
                from: session.status(),
                to: SessionStatus::Executing,
            });
        }
        let pending: PendingCall = session
            .state
            .context
            .get(PENDING_CONFIRMATION_KEY)
            .cloned()
            .and_then(|value| serde_json::from_value(value).ok())
            .ok_or_else(|| EngineError::NoPendingConfirmation(session_id.to_string()))?;

        self.runner.store.update_session(session_id, |s| {
            s.state.context.remove(PENDING_CONFIRMATION_KEY);
            s.push_message(
                MessageRole::User,
                format!("Approved {}", pending.call.tool_name()),
            );
        })?;
        self.runner.transition(session_id, SessionStatus::Executing)?;
        tracing::info!(session_id, tool = pending.call.tool_name(), "Pending tool call approved");

        if let SafetyVerdict::Denied(reason) = self.strategy.check_dangerous(&pending.call) {
            self.runner.fail(
                session_id,
                "safety_violation",
                format!("Safety check failed: {}", reason),
            )?;
            return self.runner.result(session_id, started);
        }

        let round = self.runner.begin_round(session_id)?;
        let outcome = self
            .run_tool_round(session_id, round, &pending.call, pending.confidence)
            .await?;
        if let RoundOutcome::Continue = outcome {
            self.drive(session_id, 1).await?;
        }
        self.runner.result(session_id, started)
    }

    /// Analyze the requirement, then run the decision loop
    async fn analyze_and_run(&self, id: &str) -> Result<(), EngineError> {
        let session = self.runner.transition(id, SessionStatus::Planning)?;
        let analysis = match self
            .oracle
            .analyze_requirement(&session.requirement, &self.runner.project)
            .await
        {
            Ok(analysis) => analysis,
            Err(e) => {
                self.runner
                    .fail(id, "oracle_error", format!("Oracle analysis failed: {}", e))?;
                return Ok(());
            }
        };

        let note = format!(
            "Analysis: {} (complexity: {}, estimated steps: {})",
            analysis.intent, analysis.complexity, analysis.estimated_steps
        );
        self.runner.store.update_session(id, |s| {
            s.state.context.insert(ANALYSIS_KEY.to_string(), json!(analysis));
            s.push_message(MessageRole::System, note);
        })?;

        self.runner.transition(id, SessionStatus::Executing)?;
        self.drive(id, 0).await
    }

    /// Decision loop. `rounds_run` counts rounds already spent in this call.
    async fn drive(&self, id: &str, mut rounds_run: usize) -> Result<(), EngineError> {
        let tools: Vec<ToolMetadata> = self.runner.registry.all_tool_metadata().await;
        let budget = self.runner.max_rounds();

        loop {
            if rounds_run >= budget {
                self.runner.settle(
                    id,
                    SessionStatus::WaitingUser,
                    format!(
                        "Reached the round budget of {} round(s) without a terminal decision. \
                         Continue the session to keep going.",
                        budget
                    ),
                    None,
                )?;
                return Ok(());
            }

            let round = self.runner.begin_round(id)?;
            rounds_run += 1;
            let session = self.runner.load(id)?;

            let decision = match self
                .oracle
                .decide_next_action(
                    &session.requirement,
                    &session.steps,
                    &tools,
                    &self.runner.project,
                )
                .await
            {
                Ok(decision) => decision,
                Err(e) => {
                    self.runner
                        .fail(id, "oracle_error", format!("Oracle decision failed: {}", e))?;
                    return Ok(());
                }
            };

            match decision {
                NextAction::Complete { reasoning } => {
                    self.runner.settle(
                        id,
                        SessionStatus::Completed,
                        or_default(reasoning, "Oracle declared the requirement complete"),
                        None,
                    )?;
                    return Ok(());
                }
                NextAction::WaitUser { reasoning } => {
                    self.runner.settle(
                        id,
                        SessionStatus::WaitingUser,
                        or_default(reasoning, "Oracle is waiting for user input"),
                        None,
                    )?;
                    return Ok(());
                }
                NextAction::Fail { reasoning } => {
                    self.runner.fail(
                        id,
                        "oracle_failed",
                        format!("Oracle reported failure: {}", or_default(reasoning, "no reason given")),
                    )?;
                    return Ok(());
                }
                NextAction::Malformed { raw, reason } => {
                    let message = format!("Oracle returned a malformed decision: {}", reason);
                    tracing::warn!(session_id = %id, round, raw = %raw, "Malformed oracle decision");
                    let error = ExecutionError::new("oracle_malformed", message.clone())
                        .with_details(raw);
                    self.runner
                        .settle(id, SessionStatus::Failed, message, Some(error))?;
                    return Ok(());
                }
                NextAction::ExecuteTool {
                    tool_name,
                    parameters,
                    reasoning,
                    confidence,
                } => {
                    let call = ToolCall::with_parameters(tool_name, parameters);
                    tracing::info!(
                        session_id = %id,
                        round,
                        tool = call.tool_name(),
                        confidence,
                        "Oracle chose tool"
                    );
                    if !reasoning.is_empty() {
                        let note = format!("Round {}: {} ({})", round, call.tool_name(), reasoning);
                        self.runner
                            .store
                            .update_session(id, |s| s.push_message(MessageRole::System, note))?;
                    }

                    let category = self
                        .runner
                        .registry
                        .get_handler(call.tool_name())
                        .await
                        .map(|handler| handler.metadata().category);

                    match self.strategy.check(&call, category) {
                        SafetyVerdict::Denied(reason) => {
                            self.runner.fail(
                                id,
                                "safety_violation",
                                format!("Safety check failed: {}", reason),
                            )?;
                            return Ok(());
                        }
                        SafetyVerdict::NeedsConfirmation(message) => {
                            let pending = PendingCall {
                                call,
                                confidence,
                                reasoning,
                            };
                            self.runner.store.update_session(id, |s| {
                                s.state
                                    .context
                                    .insert(PENDING_CONFIRMATION_KEY.to_string(), json!(pending));
                            })?;
                            self.runner
                                .settle(id, SessionStatus::WaitingUser, message, None)?;
                            return Ok(());
                        }
                        SafetyVerdict::Allowed => {
                            if let RoundOutcome::Settled =
                                self.run_tool_round(id, round, &call, confidence).await?
                            {
                                return Ok(());
                            }
                        }
                    }
                }
            }
        }
    }

    /// Execute one approved call, then handle failure or check completion
    async fn run_tool_round(
        &self,
        id: &str,
        round: u32,
        call: &ToolCall,
        confidence: f64,
    ) -> Result<RoundOutcome, EngineError> {
        let result = self.runner.run_tool(id, STEP_TASK_ID, call, round).await?;

        if !result.success {
            let code = result.error_code.as_deref().unwrap_or("tool_error");
            if self.strategy.is_low_confidence(confidence) {
                self.runner.fail(
                    id,
                    code,
                    format!(
                        "Tool '{}' failed at low confidence ({:.2} < {:.2}): {}",
                        call.tool_name(),
                        confidence,
                        self.strategy.low_confidence_threshold,
                        result.error_message()
                    ),
                )?;
                return Ok(RoundOutcome::Settled);
            }
            self.runner.record_error(
                id,
                ExecutionError::new(
                    code,
                    format!("Tool '{}' failed: {}", call.tool_name(), result.error_message()),
                ),
            )?;
            return Ok(RoundOutcome::Continue);
        }

        let session = self.runner.load(id)?;
        match self
            .oracle
            .evaluate_completion(&session.requirement, &session.steps, &self.runner.project)
            .await
        {
            Err(e) => {
                self.runner
                    .fail(id, "oracle_error", format!("Oracle evaluation failed: {}", e))?;
                Ok(RoundOutcome::Settled)
            }
            Ok(evaluation) if evaluation.completed => {
                self.runner.settle(
                    id,
                    SessionStatus::Completed,
                    or_default(evaluation.summary, "Requirement completed"),
                    None,
                )?;
                Ok(RoundOutcome::Settled)
            }
            Ok(evaluation) => {
                self.runner.store.update_session(id, |s| {
                    s.state.context.insert(
                        PROGRESS_KEY.to_string(),
                        json!({
                            "percentage": evaluation.percentage,
                            "missing_items": evaluation.missing_items,
                        }),
                    );
                })?;
                Ok(RoundOutcome::Continue)
            }
        }
    }
}

fn or_default(text: String, fallback: &str) -> String {
    if text.trim().is_empty() {
        fallback.to_string()
    } else {
        text
    }
}

#[async_trait]
impl ExecutionEngine for GuidedExecutionEngine {
    async fn execute(&self, requirement: &str) -> Result<ExecutionResult, EngineError> {
        let started = Instant::now();
        let session = self.runner.store.create_session(requirement)?;
        let id = session.id;
        tracing::info!(session_id = %id, engine = "guided", "Execution started");

        let lock = self.runner.store.session_lock(&id);
        let _guard = lock.lock().await;
        self.analyze_and_run(&id).await?;
        self.runner.result(&id, started)
    }

    /// Resume a paused session. A call awaiting confirmation is dropped and
    /// the oracle is consulted again; use `approve_pending` to run it instead.
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
                self.runner.store.update_session(session_id, |s| {
                    s.state.context.remove(PENDING_CONFIRMATION_KEY);
                })?;
                self.runner.transition(session_id, SessionStatus::Executing)?;
                self.drive(session_id, 0).await?;
            }
            SessionStatus::Executing => self.drive(session_id, 0).await?,
            SessionStatus::Created | SessionStatus::Planning => {
                self.analyze_and_run(session_id).await?
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
