//! save-file tool - Create or overwrite files

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tokio::fs;

use crate::tools::metadata::{ParameterType, ToolCategory, ToolMetadata};
use crate::tools::path_utils::resolve_workspace_path;
use crate::tools::registry::ToolHandler;
use crate::tools::{parse_params, Parameters, ToolContext, ToolResult};

pub struct SaveFileTool;

fn default_true() -> bool {
    true
}

#[derive(Deserialize)]
struct Params {
    path: String,
    file_content: String,
    #[serde(default = "default_true")]
    add_last_line_newline: bool,
}

#[async_trait]
impl ToolHandler for SaveFileTool {
    fn metadata(&self) -> ToolMetadata {
        ToolMetadata::new(
            "save-file",
            "Create or overwrite a file. Creates parent directories if needed.",
            ToolCategory::File,
        )
        .required("path", ParameterType::String, "File path, relative to the working directory")
        .required("file_content", ParameterType::String, "Content to write")
        .optional(
            "add_last_line_newline",
            ParameterType::Boolean,
            "Ensure the file ends with a newline (default: true)",
        )
    }

    async fn perform(&self, params: &Parameters, ctx: &ToolContext) -> ToolResult {
        let params = match parse_params::<Params>(params) {
            Ok(p) => p,
            Err(e) => return e,
        };

        let path = match resolve_workspace_path(ctx.working_dir(), &params.path) {
            Ok(p) => p,
            Err(e) => return ToolResult::error(e),
        };

        if let Some(parent) = path.parent().filter(|p| !p.exists()) {
            tracing::debug!(dir = %parent.display(), "save-file: creating parent directory");
            if let Err(e) = fs::create_dir_all(parent).await {
                return ToolResult::error(format!("Failed to create directory: {}", e));
            }
        }

        let mut content = params.file_content;
        if params.add_last_line_newline && !content.ends_with('\n') {
            content.push('\n');
        }

        match fs::write(&path, &content).await {
            Ok(()) => ToolResult::success(
                json!({
                    "message": format!("Saved {} lines", content.lines().count()),
                    "bytes_written": content.len(),
                    "path": path.display().to_string(),
                })
                .to_string(),
            ),
            Err(e) => ToolResult::error(format!("Failed to write file: {}", e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::ToolCall;

    fn params(call: ToolCall) -> Parameters {
        call.parameters().clone()
    }

    #[tokio::test]
    async fn writes_file_with_trailing_newline_and_parents() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ToolContext::new(dir.path());
        let call = ToolCall::new("save-file")
            .with_param("path", "src/model/User.kt")
            .with_param("file_content", "data class User(val name: String)");

        let result = SaveFileTool.execute(&params(call), &ctx).await;

        assert!(result.success, "{:?}", result.error);
        let written = std::fs::read_to_string(dir.path().join("src/model/User.kt")).unwrap();
        assert_eq!(written, "data class User(val name: String)\n");
    }

    #[tokio::test]
    async fn newline_can_be_disabled() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ToolContext::new(dir.path());
        let call = ToolCall::new("save-file")
            .with_param("path", "a.txt")
            .with_param("file_content", "x")
            .with_param("add_last_line_newline", false);

        assert!(SaveFileTool.execute(&params(call), &ctx).await.success);
        assert_eq!(std::fs::read_to_string(dir.path().join("a.txt")).unwrap(), "x");
    }

    #[tokio::test]
    async fn missing_content_fails_without_writing() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ToolContext::new(dir.path());
        let call = ToolCall::new("save-file").with_param("path", "a.txt");

        let result = SaveFileTool.execute(&params(call), &ctx).await;

        assert!(!result.success);
        assert!(result.error_message().contains("file_content"));
        assert!(!dir.path().join("a.txt").exists());
    }

    #[tokio::test]
    async fn null_byte_path_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ToolContext::new(dir.path());
        let call = ToolCall::new("save-file")
            .with_param("path", "a\0.txt")
            .with_param("file_content", "x");

        let result = SaveFileTool.execute(&params(call), &ctx).await;
        assert!(!result.success);
        assert!(result.error_message().contains("null byte"));
    }
}
