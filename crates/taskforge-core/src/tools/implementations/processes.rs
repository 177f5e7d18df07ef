//! read-process / kill-process / list-processes - Manage background processes

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use crate::tools::metadata::{ParameterType, ToolCategory, ToolMetadata};
use crate::tools::registry::ToolHandler;
use crate::tools::truncation::{truncate_output, Keep};
use crate::tools::{parse_params, Parameters, ToolContext, ToolResult};

#[derive(Deserialize)]
struct ProcessParams {
    process_id: String,
}

pub struct ReadProcessTool;

#[async_trait]
impl ToolHandler for ReadProcessTool {
    fn metadata(&self) -> ToolMetadata {
        ToolMetadata::new(
            "read-process",
            "Show the status and captured output of a background process.",
            ToolCategory::System,
        )
        .required("process_id", ParameterType::String, "Id returned by launch-process")
    }

    async fn perform(&self, params: &Parameters, ctx: &ToolContext) -> ToolResult {
        let params = match parse_params::<ProcessParams>(params) {
            Ok(p) => p,
            Err(e) => return e,
        };
        let registry = &ctx.process_registry;
        let Some(info) = registry.get(&params.process_id).await else {
            return ToolResult::error(format!("Process not found: {}", params.process_id));
        };
        let output = registry
            .output(&params.process_id)
            .await
            .unwrap_or_default();

        ToolResult::success_data(json!({
            "process_id": info.id,
            "command": info.command,
            "status": info.display_status(),
            "details": info.status,
            "output": truncate_output(&output, Keep::Tail),
        }))
    }
}

pub struct KillProcessTool;

#[async_trait]
impl ToolHandler for KillProcessTool {
    fn metadata(&self) -> ToolMetadata {
        ToolMetadata::new(
            "kill-process",
            "Terminate a running background process and its children.",
            ToolCategory::System,
        )
        .required("process_id", ParameterType::String, "Id returned by launch-process")
    }

    async fn perform(&self, params: &Parameters, ctx: &ToolContext) -> ToolResult {
        let params = match parse_params::<ProcessParams>(params) {
            Ok(p) => p,
            Err(e) => return e,
        };
        match ctx.process_registry.kill(&params.process_id).await {
            Ok(()) => ToolResult::success(format!("Killed process {}", params.process_id)),
            Err(e) => ToolResult::error(e),
        }
    }
}

pub struct ListProcessesTool;

#[async_trait]
impl ToolHandler for ListProcessesTool {
    fn metadata(&self) -> ToolMetadata {
        ToolMetadata::new(
            "list-processes",
            "List background processes started in this session.",
            ToolCategory::System,
        )
    }

    async fn perform(&self, _params: &Parameters, ctx: &ToolContext) -> ToolResult {
        let processes = ctx.process_registry.list().await;
        if processes.is_empty() {
            return ToolResult::success("No background processes");
        }
        let rows: Vec<_> = processes
            .iter()
            .map(|p| {
                json!({
                    "process_id": p.id,
                    "command": p.command,
                    "status": p.display_status(),
                    "pid": p.pid,
                })
            })
            .collect();
        ToolResult::success_data(json!(rows))
    }
}
