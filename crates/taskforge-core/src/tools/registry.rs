//! Tool registry for managing available handlers
//!
//! Handlers are looked up by name. Every execution flows through the
//! `ExecutionMetadataManager`, which stamps timing metadata on the result and
//! updates per-tool statistics.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;

use crate::config::ToolSettings;
use crate::process::ProcessRegistry;
use crate::tools::metadata::{ToolMetadata, ValidationResult};
use crate::tools::stats::{ExecutionMetadataManager, ToolStatistics};
use crate::tools::{Parameters, ToolCall};

/// Tool execution result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub success: bool,
    pub output: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Machine-readable failure class (`invalid_parameters`, `unsupported_tool`, ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    /// Filled in by `ExecutionMetadataManager`, never by handlers
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
}

impl ToolResult {
    /// Create a success result
    pub fn success(output: impl Into<String>) -> Self {
        Self {
            success: true,
            output: output.into(),
            error: None,
            error_code: None,
            metadata: BTreeMap::new(),
        }
    }

    /// Create a success result with a pretty-printed JSON body
    pub fn success_data(data: Value) -> Self {
        let output = serde_json::to_string_pretty(&data).unwrap_or_else(|_| data.to_string());
        Self::success(output)
    }

    /// Create an error result, classifying the code from the message
    pub fn error(msg: impl std::fmt::Display) -> Self {
        let message = msg.to_string();
        let code = classify_error_code(&message);
        Self::error_with_code(code, message)
    }

    /// Create an error result with explicit code
    pub fn error_with_code(code: &str, msg: impl std::fmt::Display) -> Self {
        Self::error_with_output(code, msg, String::new())
    }

    /// Create an error result that still carries captured output
    pub fn error_with_output(
        code: &str,
        msg: impl std::fmt::Display,
        output: impl Into<String>,
    ) -> Self {
        Self {
            success: false,
            output: output.into(),
            error: Some(msg.to_string()),
            error_code: Some(code.to_string()),
            metadata: BTreeMap::new(),
        }
    }

    /// Validation failure listing every violated constraint
    pub fn invalid_parameters(errors: &[String]) -> Self {
        Self::error_with_code(
            "invalid_parameters",
            format!("Invalid parameters: {}", errors.join("; ")),
        )
    }

    /// No handler is registered under this name
    pub fn unsupported_tool(name: &str) -> Self {
        Self::error_with_code("unsupported_tool", format!("Unsupported tool: '{}'", name))
    }

    /// Error text, or an empty string for successes
    pub fn error_message(&self) -> &str {
        self.error.as_deref().unwrap_or("")
    }
}

/// Deserialize validated parameters into a handler's typed form
pub fn parse_params<T: serde::de::DeserializeOwned>(params: &Parameters) -> Result<T, ToolResult> {
    let value = Value::Object(params.iter().map(|(k, v)| (k.clone(), v.clone())).collect());
    serde_json::from_value(value).map_err(|e| ToolResult::invalid_parameters(&[e.to_string()]))
}

fn classify_error_code(message: &str) -> &'static str {
    let lower = message.to_ascii_lowercase();
    if lower.contains("invalid parameters") || lower.contains("missing required") {
        "invalid_parameters"
    } else if lower.contains("access denied")
        || lower.contains("not writable")
        || lower.contains("traversal")
    {
        "access_denied"
    } else if lower.contains("timed out") || lower.contains("timeout") {
        "timeout"
    } else if lower.contains("not found") {
        "not_found"
    } else {
        "tool_error"
    }
}

/// Context for tool execution
#[derive(Clone)]
pub struct ToolContext {
    /// Root every relative path resolves against
    pub working_dir: PathBuf,
    pub process_registry: Arc<ProcessRegistry>,
    pub settings: ToolSettings,
    pub http: reqwest::Client,
}

impl ToolContext {
    pub fn new(working_dir: impl Into<PathBuf>) -> Self {
        Self {
            working_dir: working_dir.into(),
            process_registry: Arc::new(ProcessRegistry::new()),
            settings: ToolSettings::default(),
            http: reqwest::Client::new(),
        }
    }

    /// Share a process registry across contexts
    pub fn with_process_registry(mut self, registry: Arc<ProcessRegistry>) -> Self {
        self.process_registry = registry;
        self
    }

    pub fn with_settings(mut self, settings: ToolSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }
}

/// Trait for tool handlers
///
/// `execute` always validates before calling `perform`, so a handler's side
/// effects never run on invalid input.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    /// Name, description, parameters, and category
    fn metadata(&self) -> ToolMetadata;

    /// Check parameters. Defaults to the declared parameter list; handlers
    /// override to add constraints and should start from the default.
    fn validate_parameters(&self, params: &Parameters) -> ValidationResult {
        self.metadata().validate(params)
    }

    /// Validate, then perform
    async fn execute(&self, params: &Parameters, ctx: &ToolContext) -> ToolResult {
        if let ValidationResult::Invalid(errors) = self.validate_parameters(params) {
            return ToolResult::invalid_parameters(&errors);
        }
        self.perform(params, ctx).await
    }

    /// Do the side-effecting work. Only called with valid parameters.
    async fn perform(&self, params: &Parameters, ctx: &ToolContext) -> ToolResult;
}

/// Registry for managing tool handlers
pub struct ToolRegistry {
    handlers: Arc<RwLock<HashMap<String, Arc<dyn ToolHandler>>>>,
    metadata_manager: ExecutionMetadataManager,
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            handlers: Arc::new(RwLock::new(HashMap::new())),
            metadata_manager: ExecutionMetadataManager::new(),
        }
    }

    /// Registry populated with every built-in handler
    pub async fn with_builtin_tools() -> Self {
        let registry = Self::new();
        crate::tools::register_all_tools(&registry).await;
        registry
    }

    /// Register a handler, replacing any previous one with the same name
    pub async fn register(&self, handler: Arc<dyn ToolHandler>) {
        let name = handler.metadata().name;
        let mut handlers = self.handlers.write().await;
        if handlers.insert(name.clone(), handler).is_some() {
            tracing::debug!(tool = %name, "Replaced tool handler");
        }
    }

    /// Get a handler by name
    pub async fn get_handler(&self, name: &str) -> Option<Arc<dyn ToolHandler>> {
        let handlers = self.handlers.read().await;
        handlers.get(name).cloned()
    }

    /// Metadata for every registered handler, sorted by name
    pub async fn all_tool_metadata(&self) -> Vec<ToolMetadata> {
        let handlers = self.handlers.read().await;
        let mut metadata: Vec<ToolMetadata> = handlers.values().map(|h| h.metadata()).collect();
        metadata.sort_by(|a, b| a.name.cmp(&b.name));
        metadata
    }

    /// Execute a tool call. Unknown names yield an `unsupported_tool` failure.
    pub async fn execute(&self, call: &ToolCall, ctx: &ToolContext) -> ToolResult {
        let name = call.tool_name();
        let start = Instant::now();

        match self.get_handler(name).await {
            Some(handler) => {
                tracing::debug!(tool = name, "ToolRegistry: executing");
                let result = handler.execute(call.parameters(), ctx).await;
                self.metadata_manager
                    .finish(name, call.parameters(), result, start.elapsed())
            }
            None => {
                tracing::warn!(tool = name, "ToolRegistry: unsupported tool");
                self.metadata_manager.finish_untracked(
                    name,
                    call.parameters(),
                    ToolResult::unsupported_tool(name),
                    start.elapsed(),
                )
            }
        }
    }

    /// Aggregate per-tool statistics
    pub fn statistics(&self) -> Vec<ToolStatistics> {
        self.metadata_manager.statistics()
    }

    pub fn metadata_manager(&self) -> &ExecutionMetadataManager {
        &self.metadata_manager
    }
}
