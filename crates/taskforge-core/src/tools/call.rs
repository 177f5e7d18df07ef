use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// String-keyed tool parameters. Ordered so snapshots serialize deterministically.
pub type Parameters = BTreeMap<String, Value>;

/// A single planned tool invocation.
///
/// Values are never mutated in place; the `with_*` builders consume and return
/// a new call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    tool_name: String,
    #[serde(default)]
    parameters: Parameters,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    expected_result: Option<String>,
}

impl ToolCall {
    pub fn new(tool_name: impl Into<String>) -> Self {
        Self {
            tool_name: tool_name.into(),
            parameters: Parameters::new(),
            expected_result: None,
        }
    }

    pub fn with_parameters(tool_name: impl Into<String>, parameters: Parameters) -> Self {
        Self {
            tool_name: tool_name.into(),
            parameters,
            expected_result: None,
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    pub fn with_expected_result(mut self, hint: impl Into<String>) -> Self {
        self.expected_result = Some(hint.into());
        self
    }

    pub fn tool_name(&self) -> &str {
        &self.tool_name
    }

    pub fn parameters(&self) -> &Parameters {
        &self.parameters
    }

    pub fn expected_result(&self) -> Option<&str> {
        self.expected_result.as_deref()
    }

    /// String parameter lookup
    pub fn param_str(&self, key: &str) -> Option<&str> {
        self.parameters.get(key).and_then(Value::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn builders_produce_new_values() {
        let base = ToolCall::new("save-file").with_param("path", "a.txt");
        let extended = base.clone().with_param("file_content", "hi");

        assert_eq!(base.parameters().len(), 1);
        assert_eq!(extended.parameters().len(), 2);
        assert_eq!(extended.param_str("file_content"), Some("hi"));
    }

    #[test]
    fn serializes_without_empty_hint() {
        let call = ToolCall::new("view").with_param("path", ".");
        let value = serde_json::to_value(&call).unwrap();
        assert_eq!(value, json!({"tool_name": "view", "parameters": {"path": "."}}));

        let hinted = call.with_expected_result("directory listing");
        assert_eq!(hinted.expected_result(), Some("directory listing"));
    }
}
