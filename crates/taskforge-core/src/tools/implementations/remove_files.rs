//! remove-files tool - Delete files inside the working directory

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use crate::tools::metadata::{ParameterType, ToolCategory, ToolMetadata, ValidationResult};
use crate::tools::path_utils::{contains_traversal, resolve_workspace_path};
use crate::tools::registry::ToolHandler;
use crate::tools::{parse_params, Parameters, ToolContext, ToolResult};

pub struct RemoveFilesTool;

#[derive(Deserialize)]
struct Params {
    file_paths: Vec<String>,
}

#[async_trait]
impl ToolHandler for RemoveFilesTool {
    fn metadata(&self) -> ToolMetadata {
        ToolMetadata::new(
            "remove-files",
            "Delete one or more files. Directories are not removed.",
            ToolCategory::File,
        )
        .required("file_paths", ParameterType::Array, "Paths of the files to delete")
    }

    fn validate_parameters(&self, params: &Parameters) -> ValidationResult {
        let mut extra = Vec::new();
        if let Some(paths) = params.get("file_paths").and_then(|v| v.as_array()) {
            if paths.is_empty() {
                extra.push("Parameter 'file_paths' must not be empty".to_string());
            }
            for value in paths {
                match value.as_str() {
                    Some(p) if contains_traversal(p) => {
                        extra.push(format!("Path traversal not allowed: '{}'", p))
                    }
                    Some(p) if p.contains('\0') => {
                        extra.push(format!("Path contains a null byte: {:?}", p))
                    }
                    Some(_) => {}
                    None => extra.push("Parameter 'file_paths' must contain only strings".into()),
                }
            }
        }
        self.metadata().validate(params).with_errors(extra)
    }

    async fn perform(&self, params: &Parameters, ctx: &ToolContext) -> ToolResult {
        let params = match parse_params::<Params>(params) {
            Ok(p) => p,
            Err(e) => return e,
        };

        let mut removed = Vec::new();
        let mut failures = Vec::new();
        for raw in &params.file_paths {
            let path = match resolve_workspace_path(ctx.working_dir(), raw) {
                Ok(p) => p,
                Err(e) => {
                    failures.push(e);
                    continue;
                }
            };
            if path.is_dir() {
                failures.push(format!("'{}' is a directory", raw));
                continue;
            }
            match tokio::fs::remove_file(&path).await {
                Ok(()) => removed.push(raw.clone()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    failures.push(format!("File not found: {}", raw))
                }
                Err(e) => failures.push(format!("Failed to remove '{}': {}", raw, e)),
            }
        }

        tracing::info!(removed = removed.len(), failed = failures.len(), "remove-files");

        let summary = json!({ "removed": removed, "failed": failures }).to_string();
        if failures.is_empty() {
            ToolResult::success(summary)
        } else {
            ToolResult::error_with_output("tool_error", failures.join("; "), summary)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::ToolCall;

    #[tokio::test]
    async fn removes_listed_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "").unwrap();
        std::fs::write(dir.path().join("b.txt"), "").unwrap();
        let ctx = ToolContext::new(dir.path());
        let call = ToolCall::new("remove-files").with_param("file_paths", json!(["a.txt"]));

        let result = RemoveFilesTool.execute(call.parameters(), &ctx).await;

        assert!(result.success);
        assert!(!dir.path().join("a.txt").exists());
        assert!(dir.path().join("b.txt").exists());
    }

    #[tokio::test]
    async fn traversal_rejected_before_any_delete() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "").unwrap();
        let ctx = ToolContext::new(dir.path());
        let call = ToolCall::new("remove-files")
            .with_param("file_paths", json!(["a.txt", "../outside.txt"]));

        let result = RemoveFilesTool.execute(call.parameters(), &ctx).await;

        assert_eq!(result.error_code.as_deref(), Some("invalid_parameters"));
        assert!(dir.path().join("a.txt").exists());
    }

    #[tokio::test]
    async fn missing_file_reported_with_partial_output() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "").unwrap();
        let ctx = ToolContext::new(dir.path());
        let call = ToolCall::new("remove-files")
            .with_param("file_paths", json!(["a.txt", "missing.txt"]));

        let result = RemoveFilesTool.execute(call.parameters(), &ctx).await;

        assert!(!result.success);
        assert!(result.output.contains("a.txt"));
        assert!(result.error_message().contains("missing.txt"));
    }
}
