//! JSON-over-HTTP oracle adapter
//!
//! POSTs to `{base}/analyze`, `{base}/decide`, and `{base}/evaluate`. Reply
//! bodies go through the same parsers as any other oracle text.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Url;
use serde_json::{json, Value};

use super::{CompletionEvaluation, DecisionOracle, NextAction, RequirementAnalysis};
use crate::context::ProjectContext;
use crate::error::OracleError;
use crate::session::ExecutionStep;
use crate::tools::ToolMetadata;

const REQUEST_TIMEOUT_SECS: u64 = 120;
const ERROR_BODY_EXCERPT: usize = 500;

pub struct HttpOracle {
    base_url: Url,
    http: reqwest::Client,
}

impl HttpOracle {
    pub fn new(base_url: &str) -> Result<Self, OracleError> {
        // Trailing slash so `join` appends instead of replacing the last segment
        let normalized = format!("{}/", base_url.trim_end_matches('/'));
        let base_url = Url::parse(&normalized)
            .map_err(|e| OracleError::Transport(format!("invalid oracle URL '{}': {}", base_url, e)))?;
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| OracleError::Transport(e.to_string()))?;
        Ok(Self { base_url, http })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    async fn post(&self, endpoint: &str, body: Value) -> Result<String, OracleError> {
        let url = self
            .base_url
            .join(endpoint)
            .map_err(|e| OracleError::Transport(e.to_string()))?;
        tracing::debug!(url = %url, "Oracle request");

        let response = self
            .http
            .post(url)
            .json(&body)
            .send()
            .await
            .map_err(|e| OracleError::Transport(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| OracleError::Transport(e.to_string()))?;
        if !status.is_success() {
            let excerpt: String = text.chars().take(ERROR_BODY_EXCERPT).collect();
            return Err(OracleError::Service(format!("{}: {}", status, excerpt)));
        }
        Ok(text)
    }
}

fn tool_summaries(tools: &[ToolMetadata]) -> Vec<Value> {
    tools
        .iter()
        .map(|t| {
            json!({
                "name": t.name,
                "description": t.description,
                "category": t.category,
                "parameters": t.parameters_schema(),
            })
        })
        .collect()
}

#[async_trait]
impl DecisionOracle for HttpOracle {
    async fn analyze_requirement(
        &self,
        requirement: &str,
        context: &ProjectContext,
    ) -> Result<RequirementAnalysis, OracleError> {
        let text = self
            .post(
                "analyze",
                json!({ "requirement": requirement, "context": context }),
            )
            .await?;
        RequirementAnalysis::parse(&text)
    }

    async fn decide_next_action(
        &self,
        requirement: &str,
        history: &[ExecutionStep],
        available_tools: &[ToolMetadata],
        context: &ProjectContext,
    ) -> Result<NextAction, OracleError> {
        let text = self
            .post(
                "decide",
                json!({
                    "requirement": requirement,
                    "history": history,
                    "availableTools": tool_summaries(available_tools),
                    "context": context,
                }),
            )
            .await?;
        Ok(NextAction::parse(&text))
    }

    async fn evaluate_completion(
        &self,
        requirement: &str,
        history: &[ExecutionStep],
        context: &ProjectContext,
    ) -> Result<CompletionEvaluation, OracleError> {
        let text = self
            .post(
                "evaluate",
                json!({ "requirement": requirement, "history": history, "context": context }),
            )
            .await?;
        CompletionEvaluation::parse(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_keeps_path_prefix() {
        let oracle = HttpOracle::new("http://localhost:9000/oracle").unwrap();
        assert_eq!(
            oracle.base_url().join("decide").unwrap().as_str(),
            "http://localhost:9000/oracle/decide"
        );
        let oracle = HttpOracle::new("http://localhost:9000/").unwrap();
        assert_eq!(
            oracle.base_url().join("analyze").unwrap().as_str(),
            "http://localhost:9000/analyze"
        );
    }

    #[test]
    fn invalid_url_rejected() {
        assert!(matches!(
            HttpOracle::new("not a url"),
            Err(OracleError::Transport(_))
        ));
    }

    #[tokio::test]
    async fn unreachable_oracle_is_transport_error() {
        // Port 9 (discard) on loopback is closed in test environments
        let oracle = HttpOracle::new("http://127.0.0.1:9").unwrap();
        let err = oracle
            .analyze_requirement("x", &ProjectContext::default())
            .await
            .unwrap_err();
        assert!(matches!(err, OracleError::Transport(_)));
    }
}
