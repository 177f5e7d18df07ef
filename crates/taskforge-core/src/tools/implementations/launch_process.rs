//! launch-process tool - Run shell commands, blocking or in the background

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

use crate::process::run_foreground;
use crate::tools::metadata::{ParameterType, ToolCategory, ToolMetadata, ValidationResult};
use crate::tools::path_utils::resolve_workspace_path;
use crate::tools::registry::ToolHandler;
use crate::tools::truncation::{truncate_output, Keep};
use crate::tools::{parse_params, Parameters, ToolContext, ToolResult};

/// Upper bound on `max_wait_seconds`
const MAX_WAIT_SECONDS: u64 = 600;

pub struct LaunchProcessTool;

fn default_wait() -> bool {
    true
}

#[derive(Deserialize)]
struct Params {
    command: String,
    #[serde(default = "default_wait")]
    wait: bool,
    #[serde(default)]
    max_wait_seconds: Option<u64>,
    #[serde(default)]
    cwd: Option<String>,
}

#[async_trait]
impl ToolHandler for LaunchProcessTool {
    fn metadata(&self) -> ToolMetadata {
        ToolMetadata::new(
            "launch-process",
            "Run a shell command. With wait=true (default) blocks until exit or until \
             max_wait_seconds elapses, then kills the process tree. With wait=false returns a \
             process id for read-process / kill-process.",
            ToolCategory::System,
        )
        .required("command", ParameterType::String, "Shell command to run")
        .optional("wait", ParameterType::Boolean, "Block until the command exits (default: true)")
        .optional(
            "max_wait_seconds",
            ParameterType::Integer,
            "Timeout for blocking runs (default from config, max 600)",
        )
        .optional("cwd", ParameterType::String, "Directory to run in, relative to the working directory")
    }

    fn validate_parameters(&self, params: &Parameters) -> ValidationResult {
        let mut extra = Vec::new();
        if params
            .get("command")
            .and_then(|v| v.as_str())
            .is_some_and(|c| c.trim().is_empty())
        {
            extra.push("Parameter 'command' must not be empty".to_string());
        }
        if let Some(secs) = params.get("max_wait_seconds").and_then(|v| v.as_i64()) {
            if secs <= 0 || secs as u64 > MAX_WAIT_SECONDS {
                extra.push(format!(
                    "Parameter 'max_wait_seconds' must be between 1 and {}",
                    MAX_WAIT_SECONDS
                ));
            }
        }
        self.metadata().validate(params).with_errors(extra)
    }

    async fn perform(&self, params: &Parameters, ctx: &ToolContext) -> ToolResult {
        let params = match parse_params::<Params>(params) {
            Ok(p) => p,
            Err(e) => return e,
        };

        let cwd = match params.cwd.as_deref() {
            Some(dir) => match resolve_workspace_path(ctx.working_dir(), dir) {
                Ok(p) => p,
                Err(e) => return ToolResult::error(e),
            },
            None => ctx.working_dir().to_path_buf(),
        };
        if !cwd.is_dir() {
            return ToolResult::error(format!(
                "Working directory not found: {}",
                cwd.display()
            ));
        }

        if !params.wait {
            tracing::info!(command = %params.command, "launch-process: background");
            return match ctx.process_registry.spawn(&params.command, &cwd).await {
                Ok(id) => ToolResult::success(
                    json!({
                        "process_id": id,
                        "message": "Process started in background",
                    })
                    .to_string(),
                ),
                Err(e) => ToolResult::error(format!("Failed to spawn command: {}", e)),
            };
        }

        let timeout_secs = params
            .max_wait_seconds
            .unwrap_or(ctx.settings.default_process_timeout_secs);
        let limit = Duration::from_secs(timeout_secs);
        tracing::info!(command = %params.command, timeout_secs, "launch-process: blocking");

        let outcome = match run_foreground(&params.command, &cwd, limit).await {
            Ok(o) => o,
            Err(e) => return ToolResult::error(format!("Failed to spawn command: {}", e)),
        };
        let output = truncate_output(&outcome.output, Keep::Tail);

        if outcome.timed_out {
            ToolResult::error_with_output(
                "timeout",
                format!("Command timed out after {} seconds", timeout_secs),
                output,
            )
        } else if outcome.exit_code == 0 {
            ToolResult::success(output)
        } else {
            ToolResult::error_with_output(
                "command_failed",
                format!("Command exited with code {}", outcome.exit_code),
                output,
            )
        }
    }
}
