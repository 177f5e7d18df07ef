//! Execution strategy and the pre-execution safety gate
//!
//! Checks run in a fixed order: category allow-list, confirmation list,
//! then dangerous-pattern detection.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::tools::safety::dangerous_call_reason;
use crate::tools::{ToolCall, ToolCategory};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyPreset {
    /// No network, confirmation for deletes and process launches
    Conservative,
    #[default]
    Balanced,
    /// Everything allowed, no confirmations
    Aggressive,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionStrategy {
    pub allow_file_operations: bool,
    pub allow_network_operations: bool,
    pub allow_system_operations: bool,
    pub allow_repository_operations: bool,
    /// Tool names that pause the session for user approval
    pub confirmation_required: BTreeSet<String>,
    /// A failed tool call whose decision confidence is below this fails the session
    pub low_confidence_threshold: f64,
}

impl Default for ExecutionStrategy {
    fn default() -> Self {
        Self::from_preset(StrategyPreset::default())
    }
}

/// Outcome of the safety gate
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SafetyVerdict {
    Allowed,
    NeedsConfirmation(String),
    Denied(String),
}

impl ExecutionStrategy {
    pub fn from_preset(preset: StrategyPreset) -> Self {
        let confirm = |tools: &[&str]| tools.iter().map(|t| t.to_string()).collect();
        match preset {
            StrategyPreset::Conservative => Self {
                allow_file_operations: true,
                allow_network_operations: false,
                allow_system_operations: true,
                allow_repository_operations: true,
                confirmation_required: confirm(&["remove-files", "launch-process", "kill-process"]),
                low_confidence_threshold: 0.5,
            },
            StrategyPreset::Balanced => Self {
                allow_file_operations: true,
                allow_network_operations: true,
                allow_system_operations: true,
                allow_repository_operations: true,
                confirmation_required: confirm(&["remove-files"]),
                low_confidence_threshold: 0.3,
            },
            StrategyPreset::Aggressive => Self {
                allow_file_operations: true,
                allow_network_operations: true,
                allow_system_operations: true,
                allow_repository_operations: true,
                confirmation_required: BTreeSet::new(),
                low_confidence_threshold: 0.1,
            },
        }
    }

    pub fn allows_category(&self, category: ToolCategory) -> bool {
        match category {
            ToolCategory::File => self.allow_file_operations,
            ToolCategory::Network => self.allow_network_operations,
            ToolCategory::System => self.allow_system_operations,
            ToolCategory::Repository => self.allow_repository_operations,
        }
    }

    pub fn requires_confirmation(&self, tool_name: &str) -> bool {
        self.confirmation_required.contains(tool_name)
    }

    pub fn is_low_confidence(&self, confidence: f64) -> bool {
        confidence < self.low_confidence_threshold
    }

    /// Gate a proposed call. `category` is `None` for unregistered tools,
    /// which the registry rejects on its own.
    pub fn check(&self, call: &ToolCall, category: Option<ToolCategory>) -> SafetyVerdict {
        let name = call.tool_name();
        if let Some(category) = category {
            if !self.allows_category(category) {
                return SafetyVerdict::Denied(format!(
                    "{} operations are disabled by the execution strategy (tool '{}')",
                    category, name
                ));
            }
        }
        if self.requires_confirmation(name) {
            return SafetyVerdict::NeedsConfirmation(format!(
                "Tool '{}' requires user confirmation before it runs",
                name
            ));
        }
        self.check_dangerous(call)
    }

    /// Dangerous-pattern check alone, used again when a gated call is approved
    pub fn check_dangerous(&self, call: &ToolCall) -> SafetyVerdict {
        match dangerous_call_reason(call) {
            Some(reason) => {
                tracing::warn!(tool = call.tool_name(), reason = %reason, "Blocked dangerous tool call");
                SafetyVerdict::Denied(format!("dangerous operation blocked: {}", reason))
            }
            None => SafetyVerdict::Allowed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn presets_differ() {
        let conservative = ExecutionStrategy::from_preset(StrategyPreset::Conservative);
        assert!(!conservative.allow_network_operations);
        assert!(conservative.requires_confirmation("launch-process"));

        let balanced = ExecutionStrategy::default();
        assert!(balanced.allow_network_operations);
        assert!(balanced.requires_confirmation("remove-files"));
        assert!(!balanced.requires_confirmation("launch-process"));

        let aggressive = ExecutionStrategy::from_preset(StrategyPreset::Aggressive);
        assert!(aggressive.confirmation_required.is_empty());
        assert!(aggressive.low_confidence_threshold < balanced.low_confidence_threshold);
    }

    #[test]
    fn disabled_category_is_denied_first() {
        let strategy = ExecutionStrategy::from_preset(StrategyPreset::Conservative);
        let call = ToolCall::new("web-fetch").with_param("url", "https://example.com");
        match strategy.check(&call, Some(ToolCategory::Network)) {
            SafetyVerdict::Denied(reason) => assert!(reason.contains("network operations are disabled")),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn confirmation_before_pattern_check() {
        let strategy = ExecutionStrategy::default();
        let call = ToolCall::new("remove-files").with_param("file_paths", json!(["a.txt"]));
        assert!(matches!(
            strategy.check(&call, Some(ToolCategory::File)),
            SafetyVerdict::NeedsConfirmation(msg) if msg.contains("requires user confirmation")
        ));
    }

    #[test]
    fn destructive_command_denied() {
        let strategy = ExecutionStrategy::default();
        let call = ToolCall::new("launch-process").with_param("command", "rm -rf build/");
        assert!(matches!(
            strategy.check(&call, Some(ToolCategory::System)),
            SafetyVerdict::Denied(msg) if msg.contains("recursive force delete")
        ));

        let fine = ToolCall::new("launch-process").with_param("command", "ls -la");
        assert_eq!(strategy.check(&fine, Some(ToolCategory::System)), SafetyVerdict::Allowed);
    }

    #[test]
    fn traversal_delete_denied_when_not_gated() {
        let strategy = ExecutionStrategy::from_preset(StrategyPreset::Aggressive);
        let call =
            ToolCall::new("remove-files").with_param("file_paths", json!(["../outside.txt"]));
        assert!(matches!(
            strategy.check(&call, Some(ToolCategory::File)),
            SafetyVerdict::Denied(msg) if msg.contains("path traversal")
        ));
    }

    #[test]
    fn low_confidence_threshold() {
        let strategy = ExecutionStrategy::default();
        assert!(strategy.is_low_confidence(0.2));
        assert!(!strategy.is_low_confidence(0.3));
    }
}
