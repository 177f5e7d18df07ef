//! Session, state, and audit-trail types

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::plan::Task;
use crate::tools::{ToolCall, ToolResult};

/// Session lifecycle status
///
/// `CREATED → PLANNING → EXECUTING → {WAITING_USER | COMPLETED | FAILED | CANCELLED}`.
/// The only backward edge is `WAITING_USER → EXECUTING` on resume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionStatus {
    #[default]
    Created,
    Planning,
    Executing,
    WaitingUser,
    Completed,
    Failed,
    Cancelled,
}

impl SessionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SessionStatus::Created => "CREATED",
            SessionStatus::Planning => "PLANNING",
            SessionStatus::Executing => "EXECUTING",
            SessionStatus::WaitingUser => "WAITING_USER",
            SessionStatus::Completed => "COMPLETED",
            SessionStatus::Failed => "FAILED",
            SessionStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SessionStatus::Completed | SessionStatus::Failed | SessionStatus::Cancelled
        )
    }

    pub fn can_transition_to(self, next: SessionStatus) -> bool {
        use SessionStatus::*;
        match self {
            Created => matches!(next, Planning | Executing | Failed | Cancelled),
            Planning => matches!(next, Executing | Completed | Failed | Cancelled),
            Executing => matches!(next, WaitingUser | Completed | Failed | Cancelled),
            WaitingUser => matches!(next, Executing | Completed | Failed | Cancelled),
            Completed | Failed | Cancelled => false,
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Accumulated failure record; never removed once added
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionError {
    pub message: String,
    pub code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    pub timestamp: i64,
}

impl ExecutionError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: code.into(),
            details: None,
            timestamp: crate::unix_timestamp(),
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct State {
    pub status: SessionStatus,
    pub current_task_index: usize,
    /// Total rounds run across every execute/continue call
    pub execution_round: u32,
    #[serde(default)]
    pub context: BTreeMap<String, Value>,
    #[serde(default)]
    pub errors: Vec<ExecutionError>,
}

/// One executed tool call, appended in round order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionStep {
    pub task_id: String,
    pub tool_call: ToolCall,
    pub result: ToolResult,
    pub duration_ms: u64,
    pub timestamp: i64,
    pub round: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
    System,
}

/// Conversation record kept alongside the steps
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionMessage {
    pub role: MessageRole,
    pub content: String,
    pub timestamp: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub requirement: String,
    pub state: State,
    #[serde(default)]
    pub tasks: Vec<Task>,
    #[serde(default)]
    pub steps: Vec<ExecutionStep>,
    #[serde(default)]
    pub messages: Vec<SessionMessage>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Session {
    pub fn new(requirement: impl Into<String>) -> Self {
        let now = crate::unix_timestamp();
        let requirement = requirement.into();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            messages: vec![SessionMessage {
                role: MessageRole::User,
                content: requirement.clone(),
                timestamp: now,
            }],
            requirement,
            state: State::default(),
            tasks: Vec::new(),
            steps: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn status(&self) -> SessionStatus {
        self.state.status
    }

    pub fn push_message(&mut self, role: MessageRole, content: impl Into<String>) {
        self.messages.push(SessionMessage {
            role,
            content: content.into(),
            timestamp: crate::unix_timestamp(),
        });
    }

    /// Most recent assistant message, used as the session summary
    pub fn last_assistant_message(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == MessageRole::Assistant)
            .map(|m| m.content.as_str())
    }

    /// Number of leading tool calls (in scheduled order) that already ran
    pub fn completed_call_count(&self) -> usize {
        self.steps.iter().filter(|s| s.result.success).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_serializes_screaming_snake() {
        assert_eq!(
            serde_json::to_string(&SessionStatus::WaitingUser).unwrap(),
            "\"WAITING_USER\""
        );
        let parsed: SessionStatus = serde_json::from_str("\"CANCELLED\"").unwrap();
        assert_eq!(parsed, SessionStatus::Cancelled);
        assert_eq!(SessionStatus::Executing.to_string(), "EXECUTING");
    }

    #[test]
    fn transitions_only_go_forward_except_resume() {
        use SessionStatus::*;
        assert!(Created.can_transition_to(Planning));
        assert!(Planning.can_transition_to(Executing));
        assert!(Executing.can_transition_to(WaitingUser));
        assert!(WaitingUser.can_transition_to(Executing));
        assert!(!Executing.can_transition_to(Planning));
        assert!(!Completed.can_transition_to(Executing));
        assert!(!Failed.can_transition_to(WaitingUser));
        assert!(!Executing.can_transition_to(Created));
    }

    #[test]
    fn new_session_records_requirement_message() {
        let mut session = Session::new("Create a User class");
        assert_eq!(session.status(), SessionStatus::Created);
        assert_eq!(session.messages.len(), 1);
        assert_eq!(session.messages[0].content, "Create a User class");
        assert!(session.last_assistant_message().is_none());

        session.push_message(MessageRole::Assistant, "done");
        assert_eq!(session.last_assistant_message(), Some("done"));
    }
}
