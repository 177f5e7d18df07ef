//! Tool metadata and declarative parameter validation

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::Parameters;

/// Capability category. Execution strategies enable or disable whole categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolCategory {
    /// Reads and writes inside the working directory
    File,
    /// Outbound HTTP
    Network,
    /// Process launch and control
    System,
    /// Read-only queries over the repository
    Repository,
}

impl std::fmt::Display for ToolCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ToolCategory::File => "file",
            ToolCategory::Network => "network",
            ToolCategory::System => "system",
            ToolCategory::Repository => "repository",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterType {
    String,
    Integer,
    Number,
    Boolean,
    Array,
    Object,
}

impl ParameterType {
    fn matches(self, value: &Value) -> bool {
        match self {
            ParameterType::String => value.is_string(),
            ParameterType::Integer => value.is_i64() || value.is_u64(),
            ParameterType::Number => value.is_number(),
            ParameterType::Boolean => value.is_boolean(),
            ParameterType::Array => value.is_array(),
            ParameterType::Object => value.is_object(),
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            ParameterType::String => "string",
            ParameterType::Integer => "integer",
            ParameterType::Number => "number",
            ParameterType::Boolean => "boolean",
            ParameterType::Array => "array",
            ParameterType::Object => "object",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolParameter {
    pub name: String,
    pub description: String,
    pub param_type: ParameterType,
    pub required: bool,
}

/// Describes a tool to callers and to the decision oracle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolMetadata {
    pub name: String,
    pub description: String,
    pub parameters: Vec<ToolParameter>,
    pub category: ToolCategory,
}

impl ToolMetadata {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        category: ToolCategory,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: Vec::new(),
            category,
        }
    }

    pub fn required(mut self, name: &str, param_type: ParameterType, description: &str) -> Self {
        self.parameters.push(ToolParameter {
            name: name.to_string(),
            description: description.to_string(),
            param_type,
            required: true,
        });
        self
    }

    pub fn optional(mut self, name: &str, param_type: ParameterType, description: &str) -> Self {
        self.parameters.push(ToolParameter {
            name: name.to_string(),
            description: description.to_string(),
            param_type,
            required: false,
        });
        self
    }

    /// Check presence of required parameters and the type of every declared one.
    ///
    /// Collects every violation instead of stopping at the first.
    pub fn validate(&self, params: &Parameters) -> ValidationResult {
        let mut errors = Vec::new();

        for param in &self.parameters {
            match params.get(&param.name) {
                None | Some(Value::Null) if param.required => {
                    errors.push(format!("Missing required parameter '{}'", param.name));
                }
                None | Some(Value::Null) => {}
                Some(value) if !param.param_type.matches(value) => {
                    errors.push(format!(
                        "Parameter '{}' must be of type {}",
                        param.name,
                        param.param_type.as_str()
                    ));
                }
                Some(_) => {}
            }
        }

        ValidationResult::from_errors(errors)
    }

    /// JSON schema view of the parameter list
    pub fn parameters_schema(&self) -> Value {
        let mut properties = serde_json::Map::new();
        for param in &self.parameters {
            properties.insert(
                param.name.clone(),
                json!({
                    "type": param.param_type.as_str(),
                    "description": param.description,
                }),
            );
        }
        let required: Vec<&str> = self
            .parameters
            .iter()
            .filter(|p| p.required)
            .map(|p| p.name.as_str())
            .collect();

        json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }
}

/// Outcome of parameter validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationResult {
    Valid,
    Invalid(Vec<String>),
}

impl ValidationResult {
    pub fn from_errors(errors: Vec<String>) -> Self {
        if errors.is_empty() {
            ValidationResult::Valid
        } else {
            ValidationResult::Invalid(errors)
        }
    }

    pub fn is_valid(&self) -> bool {
        matches!(self, ValidationResult::Valid)
    }

    pub fn errors(&self) -> &[String] {
        match self {
            ValidationResult::Valid => &[],
            ValidationResult::Invalid(errors) => errors,
        }
    }

    /// Combine with additional handler-specific violations
    pub fn with_errors(self, extra: Vec<String>) -> Self {
        let mut errors = match self {
            ValidationResult::Valid => Vec::new(),
            ValidationResult::Invalid(errors) => errors,
        };
        errors.extend(extra);
        ValidationResult::from_errors(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ToolMetadata {
        ToolMetadata::new("save-file", "Save a file", ToolCategory::File)
            .required("path", ParameterType::String, "Target path")
            .required("file_content", ParameterType::String, "Content")
            .optional("add_last_line_newline", ParameterType::Boolean, "Newline")
    }

    fn params(value: Value) -> Parameters {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn reports_every_missing_parameter() {
        let result = sample().validate(&Parameters::new());
        assert_eq!(
            result.errors(),
            &[
                "Missing required parameter 'path'".to_string(),
                "Missing required parameter 'file_content'".to_string(),
            ]
        );
    }

    #[test]
    fn reports_type_mismatches_alongside_missing() {
        let result = sample().validate(&params(json!({
            "path": 42,
            "add_last_line_newline": "yes"
        })));
        let errors = result.errors();
        assert_eq!(errors.len(), 3);
        assert!(errors.iter().any(|e| e.contains("'path' must be of type string")));
        assert!(errors.iter().any(|e| e.contains("'file_content'")));
        assert!(errors.iter().any(|e| e.contains("must be of type boolean")));
    }

    #[test]
    fn null_counts_as_missing() {
        let result = sample().validate(&params(json!({"path": "a", "file_content": null})));
        assert_eq!(result.errors().len(), 1);
    }

    #[test]
    fn valid_params_pass() {
        let result = sample().validate(&params(json!({"path": "a", "file_content": ""})));
        assert!(result.is_valid());
    }

    #[test]
    fn schema_lists_required_names() {
        let schema = sample().parameters_schema();
        assert_eq!(schema["required"], json!(["path", "file_content"]));
        assert_eq!(schema["properties"]["add_last_line_newline"]["type"], "boolean");
    }

    #[test]
    fn with_errors_turns_valid_into_invalid() {
        let result = ValidationResult::Valid.with_errors(vec!["bad".to_string()]);
        assert_eq!(result, ValidationResult::Invalid(vec!["bad".to_string()]));
        assert!(ValidationResult::Valid.with_errors(Vec::new()).is_valid());
    }
}
