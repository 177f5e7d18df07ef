//! Decision oracle boundary
//!
//! The guided engine consults an external oracle for requirement analysis,
//! next-action decisions, and completion checks. Oracle replies are parsed
//! into strict types here; anything that does not fit becomes an error or a
//! `NextAction::Malformed`, never a panic.

mod http;

pub use http::HttpOracle;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::context::ProjectContext;
use crate::error::OracleError;
use crate::session::ExecutionStep;
use crate::tools::{Parameters, ToolMetadata};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequirementAnalysis {
    pub intent: String,
    #[serde(default)]
    pub complexity: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub prerequisites: Vec<String>,
    #[serde(default)]
    pub estimated_steps: u32,
    #[serde(default)]
    pub reasoning: String,
}

impl RequirementAnalysis {
    pub fn parse(text: &str) -> Result<Self, OracleError> {
        parse_json(text)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionEvaluation {
    pub completed: bool,
    #[serde(default)]
    pub percentage: f64,
    #[serde(default)]
    pub missing_items: Vec<String>,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub next_steps: Vec<String>,
}

impl CompletionEvaluation {
    pub fn parse(text: &str) -> Result<Self, OracleError> {
        let evaluation: Self = parse_json(text)?;
        if !(0.0..=100.0).contains(&evaluation.percentage) {
            return Err(OracleError::Malformed(format!(
                "percentage {} outside 0..=100",
                evaluation.percentage
            )));
        }
        Ok(evaluation)
    }
}

/// One oracle decision
#[derive(Debug, Clone, PartialEq)]
pub enum NextAction {
    ExecuteTool {
        tool_name: String,
        parameters: Parameters,
        reasoning: String,
        /// 0.0 to 1.0
        confidence: f64,
    },
    Complete {
        reasoning: String,
    },
    WaitUser {
        reasoning: String,
    },
    Fail {
        reasoning: String,
    },
    /// Reply could not be understood
    Malformed {
        raw: String,
        reason: String,
    },
}

#[derive(Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
enum RawAction {
    ExecuteTool {
        tool_name: String,
        #[serde(default)]
        parameters: Parameters,
        #[serde(default)]
        reasoning: String,
        #[serde(default = "full_confidence")]
        confidence: f64,
    },
    Complete {
        #[serde(default)]
        reasoning: String,
    },
    WaitUser {
        #[serde(default)]
        reasoning: String,
    },
    Fail {
        #[serde(default)]
        reasoning: String,
    },
}

fn full_confidence() -> f64 {
    1.0
}

impl NextAction {
    /// Parse a decision reply such as
    /// `{"action": "execute_tool", "tool_name": "view", "parameters": {...}, "confidence": 0.8}`.
    /// Code fences around the JSON are tolerated.
    pub fn parse(text: &str) -> Self {
        let malformed = |reason: String| NextAction::Malformed {
            raw: text.to_string(),
            reason,
        };
        let raw: RawAction = match parse_json(text) {
            Ok(raw) => raw,
            Err(e) => return malformed(e.to_string()),
        };
        match raw {
            RawAction::ExecuteTool {
                tool_name,
                parameters,
                reasoning,
                confidence,
            } => {
                if tool_name.trim().is_empty() {
                    return malformed("empty tool_name".to_string());
                }
                if !(0.0..=1.0).contains(&confidence) {
                    return malformed(format!("confidence {} outside 0..=1", confidence));
                }
                NextAction::ExecuteTool {
                    tool_name,
                    parameters,
                    reasoning,
                    confidence,
                }
            }
            RawAction::Complete { reasoning } => NextAction::Complete { reasoning },
            RawAction::WaitUser { reasoning } => NextAction::WaitUser { reasoning },
            RawAction::Fail { reasoning } => NextAction::Fail { reasoning },
        }
    }

    pub fn reasoning(&self) -> &str {
        match self {
            NextAction::ExecuteTool { reasoning, .. }
            | NextAction::Complete { reasoning }
            | NextAction::WaitUser { reasoning }
            | NextAction::Fail { reasoning } => reasoning,
            NextAction::Malformed { reason, .. } => reason,
        }
    }
}

/// External decision maker for the guided engine
#[async_trait]
pub trait DecisionOracle: Send + Sync {
    async fn analyze_requirement(
        &self,
        requirement: &str,
        context: &ProjectContext,
    ) -> Result<RequirementAnalysis, OracleError>;

    async fn decide_next_action(
        &self,
        requirement: &str,
        history: &[ExecutionStep],
        available_tools: &[ToolMetadata],
        context: &ProjectContext,
    ) -> Result<NextAction, OracleError>;

    async fn evaluate_completion(
        &self,
        requirement: &str,
        history: &[ExecutionStep],
        context: &ProjectContext,
    ) -> Result<CompletionEvaluation, OracleError>;
}

/// Deserialize JSON that may be wrapped in a Markdown code fence
fn parse_json<T: DeserializeOwned>(text: &str) -> Result<T, OracleError> {
    let body = strip_code_fence(text);
    if body.is_empty() {
        return Err(OracleError::Malformed("empty response".to_string()));
    }
    serde_json::from_str(body).map_err(|e| OracleError::Malformed(e.to_string()))
}

fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string ("json") on the opening fence line
    let rest = rest.split_once('\n').map(|(_, body)| body).unwrap_or("");
    rest.trim_end().trim_end_matches("```").trim()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_execute_tool() {
        let action = NextAction::parse(
            r#"{"action":"execute_tool","tool_name":"view","parameters":{"path":"."},"reasoning":"look","confidence":0.75}"#,
        );
        match action {
            NextAction::ExecuteTool {
                tool_name,
                parameters,
                confidence,
                ..
            } => {
                assert_eq!(tool_name, "view");
                assert_eq!(parameters["path"], json!("."));
                assert_eq!(confidence, 0.75);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn parses_terminal_actions_inside_fence() {
        let action = NextAction::parse("```json\n{\"action\":\"complete\",\"reasoning\":\"done\"}\n```");
        assert_eq!(
            action,
            NextAction::Complete {
                reasoning: "done".to_string()
            }
        );
        assert!(matches!(
            NextAction::parse(r#"{"action":"wait_user"}"#),
            NextAction::WaitUser { .. }
        ));
        assert_eq!(
            NextAction::parse(r#"{"action":"fail","reasoning":"stuck"}"#).reasoning(),
            "stuck"
        );
    }

    #[test]
    fn bad_replies_become_malformed() {
        for text in [
            "",
            "sure, I'll edit the file",
            r#"{"action":"dance"}"#,
            r#"{"action":"execute_tool"}"#,
            r#"{"action":"execute_tool","tool_name":" "}"#,
            r#"{"action":"execute_tool","tool_name":"view","confidence":7}"#,
            r#"{"action":"execute_tool","tool_name":"view","parameters":[1]}"#,
        ] {
            assert!(
                matches!(NextAction::parse(text), NextAction::Malformed { .. }),
                "{:?}",
                text
            );
        }
    }

    #[test]
    fn analysis_and_evaluation_parse() {
        let analysis = RequirementAnalysis::parse(
            r#"{"intent":"create class","complexity":"low","estimatedSteps":2}"#,
        )
        .unwrap();
        assert_eq!(analysis.estimated_steps, 2);
        assert!(analysis.prerequisites.is_empty());

        let eval = CompletionEvaluation::parse(
            r#"{"completed":true,"percentage":100,"summary":"all done","missingItems":[]}"#,
        )
        .unwrap();
        assert!(eval.completed);
        assert_eq!(eval.summary, "all done");

        assert!(matches!(
            CompletionEvaluation::parse(r#"{"completed":false,"percentage":140}"#),
            Err(OracleError::Malformed(_))
        ));
        assert!(RequirementAnalysis::parse("{}").is_err());
    }
}
